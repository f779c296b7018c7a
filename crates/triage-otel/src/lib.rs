use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};
use triage_core::Config;

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install the global subscriber: console output plus the development log
/// that the diagnostics layer samples from. Safe to call more than once; later
/// calls are no-ops.
pub fn init(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter, &cfg.logs_dir, &cfg.log_file);
}

fn install(filter: EnvFilter, dir: &Path, file_name: &str) {
    let console = fmt::layer().with_filter(filter.clone());
    let registry = tracing_subscriber::registry().with(console);

    if let Err(err) = std::fs::create_dir_all(dir) {
        let _ = registry.try_init();
        tracing::warn!(
            directory = %dir.display(),
            error = %err,
            "failed to create log directory; development log disabled"
        );
        return;
    }

    let writer = tracing_appender::rolling::never(dir, file_name);
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(nb)
        .with_filter(filter);
    if registry.with(file_layer).try_init().is_ok() {
        let _ = FILE_GUARD.set(guard);
    }
}
