use std::path::Path;

use crate::error::{Result, TaskflowError};

pub const LOG_FILE_BASENAME: &str = "taskflow";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 30;
pub const LOG_ENV_VAR: &str = "TASKFLOW_LOG";

/// Dependency logs stay at WARN; this crate is more verbose in debug builds.
pub fn default_log_spec() -> &'static str {
    if cfg!(debug_assertions) {
        "warn,taskflow_lib=debug"
    } else {
        "warn,taskflow_lib=info"
    }
}

/// Picks the log spec from `TASKFLOW_LOG`, then `RUST_LOG`, then the build default. Blank
/// values count as unset.
pub fn resolve_log_spec(taskflow_log: Option<&str>, rust_log: Option<&str>) -> String {
    taskflow_log
        .filter(|value| !value.trim().is_empty())
        .or_else(|| rust_log.filter(|value| !value.trim().is_empty()))
        .unwrap_or(default_log_spec())
        .to_string()
}

fn logging_error(err: impl std::fmt::Display) -> TaskflowError {
    TaskflowError::Logging {
        reason: err.to_string(),
    }
}

/// Starts the file logger under `log_dir` and installs the panic hook. Call once, early.
#[cfg(all(feature = "logging", not(test)))]
pub fn init_logging(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir).map_err(logging_error)?;
    start_file_logger(log_dir).map_err(logging_error)?;
    install_panic_hook();

    log::info!(
        "logger initialized dir={} rotate_size_bytes={} keep_files={}",
        log_dir.display(),
        LOG_ROTATE_SIZE_BYTES,
        LOG_ROTATE_KEEP_FILES
    );
    Ok(())
}

#[cfg(all(feature = "logging", not(test)))]
fn start_file_logger(log_dir: &Path) -> std::result::Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    let spec = resolve_log_spec(
        std::env::var(LOG_ENV_VAR).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    );

    Logger::try_with_str(spec)?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stdout(if cfg!(debug_assertions) {
            Duplicate::Info
        } else {
            Duplicate::None
        })
        .start()?;
    Ok(())
}

/// Without the `logging` feature the host owns the `log` backend; this only makes sure the
/// directory exists so callers need no feature checks.
#[cfg(any(not(feature = "logging"), test))]
pub fn init_logging(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir).map_err(logging_error)
}

#[cfg(all(feature = "logging", not(test)))]
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic payload>");
        let location = info
            .location()
            .map(|loc| format!("{loc}"))
            .unwrap_or_else(|| "<unknown>".to_string());
        let backtrace = std::backtrace::Backtrace::force_capture();

        log::error!("panic: payload={payload} location={location}\nbacktrace:\n{backtrace}");
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taskflow_log_wins_over_rust_log() {
        assert_eq!(
            resolve_log_spec(Some("trace"), Some("error")),
            "trace".to_string()
        );
    }

    #[test]
    fn blank_values_fall_through() {
        assert_eq!(resolve_log_spec(Some("  "), Some("info")), "info");
        assert_eq!(resolve_log_spec(None, Some("")), default_log_spec());
        assert_eq!(resolve_log_spec(None, None), default_log_spec());
    }

    #[test]
    fn default_spec_targets_this_crate() {
        assert!(default_log_spec().starts_with("warn,taskflow_lib="));
    }

    #[test]
    fn init_logging_reports_failures_as_crate_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let err = init_logging(&blocker.join("logs")).unwrap_err();
        assert!(matches!(err, TaskflowError::Logging { .. }));
        assert!(err.to_string().starts_with("Failed to initialize logging: "));
    }

    #[test]
    fn init_logging_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        init_logging(&logs).unwrap();
        assert!(logs.is_dir());
    }
}
