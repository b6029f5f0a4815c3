//! Logging setup.
//!
//! All diagnostics go through `tracing` and are written to **stderr**, so the
//! JSON every command prints on stdout stays machine-readable.
//!
//! `RUST_LOG` takes precedence over `[logging].level`:
//!
//! ```bash
//! RUST_LOG=debug courier chunk --input notes.txt
//! RUST_LOG=courier::gmail=trace courier gmail watch
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize the global subscriber. Only the first call has an effect.
///
/// `verbose` forces `debug` regardless of the configured level.
pub fn init(config: &LoggingConfig, verbose: bool) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(&config.level)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A subscriber may already be installed (tests); that is fine.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
