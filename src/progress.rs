//! Embedding progress reporting.
//!
//! `courier embed` and `courier store embed` report how many files have been
//! embedded so far. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts, and only when stderr is a terminal.

use std::io::Write;

#[derive(Clone, Debug)]
pub enum EmbedProgressEvent {
    /// Files matched in the input directory.
    Discovered { total: u64 },
    /// `n` of `total` files processed (embedded or skipped).
    Embedding { n: u64, total: u64 },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: EmbedProgressEvent);
}

/// Human-friendly progress on stderr: "embed  1,234 / 5,000 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: EmbedProgressEvent) {
        let line = match &event {
            EmbedProgressEvent::Discovered { total } => {
                format!("embed  found {} files\n", format_number(*total))
            }
            EmbedProgressEvent::Embedding { n, total } => format!(
                "embed  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: EmbedProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Human progress when stderr is a TTY, otherwise none.
pub fn reporter_for_tty() -> Box<dyn ProgressReporter> {
    if atty::is(atty::Stream::Stderr) {
        Box::new(StderrProgress)
    } else {
        Box::new(NoProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
