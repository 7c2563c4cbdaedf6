//! Logging bootstrap and panic policy.
//!
//! # Responsibility
//! - Initialize file-based rolling logs exactly once per process.
//! - Emit stable `event=... module=... status=...` diagnostic lines.
//! - Capture panics into the log and, once a crash store is attached, into
//!   a persisted crash report.
//!
//! # Invariants
//! - Logging init is idempotent for the same directory.
//! - Logging initialization must not panic.
//! - Re-initialization with a different directory is rejected.
//! - The panic hook is installed at most once and chains the previous hook.
//! - Panics raised inside [`contain_panic`] are logged but never persisted
//!   as crash reports; only panics that escape are.

use crate::crash::{CrashLogStore, CrashReport};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const LOG_FILE_BASENAME: &str = "hostkit";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();
static CRASH_SINK: OnceCell<Arc<CrashLogStore>> = OnceCell::new();

thread_local! {
    static CONTAINED_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

/// Initializes core logging with level and directory.
///
/// Returns `Ok(())` when logging is active, or a human-readable error string
/// when initialization fails.
///
/// # Invariants
/// - Calling this function repeatedly with the same `log_dir` is idempotent.
/// - Calling this function repeatedly with a different `level` is rejected.
/// - Re-initialization with a different `log_dir` is rejected.
/// - Initialization never panics.
///
/// # Errors
/// - Returns an error when `level` is unsupported.
/// - Returns an error when `log_dir` is empty, non-absolute, or cannot be created.
/// - Returns an error when logger backend setup fails.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let normalized_level = normalize_level(level)?;
    let normalized_dir = normalize_log_dir(log_dir)?;

    if let Some(state) = LOGGING_STATE.get() {
        return state.matches(normalized_level, &normalized_dir);
    }

    let init_level = normalized_level;
    let init_dir = normalized_dir.clone();

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, String> {
        std::fs::create_dir_all(&init_dir).map_err(|err| {
            format!(
                "failed to create log directory `{}`: {err}",
                init_dir.display()
            )
        })?;

        let logger = Logger::try_with_str(init_level)
            .map_err(|err| format!("invalid log level `{init_level}`: {err}"))?
            .log_to_file(
                FileSpec::default()
                    .directory(init_dir.as_path())
                    .basename(LOG_FILE_BASENAME),
            )
            .rotate(
                Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(MAX_LOG_FILES),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            // Format: [YYYY-MM-DD HH:MM:SS.ffffff TZ] LEVEL [module] file:line: message
            .format_for_files(flexi_logger::detailed_format)
            .start()
            .map_err(|err| format!("failed to start logger: {err}"))?;

        install_panic_hook_once();

        info!(
            "event=module_start module=logging status=ok platform={} build_mode={} version={} pid={}",
            std::env::consts::OS,
            build_mode(),
            env!("CARGO_PKG_VERSION"),
            std::process::id()
        );
        info!(
            "event=logging_init module=logging status=ok level={} log_dir={} crash_store={}",
            init_level,
            init_dir.display(),
            CRASH_SINK
                .get()
                .map(|store| store.dir().display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(LoggingState {
            level: init_level,
            log_dir: init_dir,
            _logger: logger,
        })
    })?;

    // A concurrent caller may have won the init race with another config.
    state.matches(normalized_level, &normalized_dir)
}

impl LoggingState {
    fn matches(&self, level: &str, log_dir: &Path) -> Result<(), String> {
        if self.log_dir != log_dir {
            return Err(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                self.log_dir.display(),
                log_dir.display()
            ));
        }
        if self.level != level {
            return Err(format!(
                "logging already initialized with level `{}`; refusing to switch to `{level}`",
                self.level
            ));
        }
        Ok(())
    }
}

/// Returns active logging status metadata.
///
/// Returns `None` when logging has not been initialized.
/// Returns `(level, log_dir)` when logging is active.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

/// Returns the default log level for current build mode.
///
/// - `debug` builds -> `debug`
/// - `release` builds -> `info`
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn build_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

/// Persists a crash report for every panic observed from now on.
///
/// Returns `false` when a store was already attached; the first one stays.
pub fn attach_crash_store(store: Arc<CrashLogStore>) -> bool {
    let attached = CRASH_SINK.set(store).is_ok();
    install_panic_hook_once();
    attached
}

/// Returns the attached crash store, if any.
pub fn crash_store() -> Option<Arc<CrashLogStore>> {
    CRASH_SINK.get().cloned()
}

/// Runs `op`, catching any panic it raises.
///
/// The panic hook still logs such a panic but does not save a crash report
/// for it, since the caller recovers.
pub fn contain_panic<T>(op: impl FnOnce() -> T) -> std::thread::Result<T> {
    CONTAINED_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = catch_unwind(AssertUnwindSafe(op));
    CONTAINED_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    result
}

fn panic_is_contained() -> bool {
    CONTAINED_DEPTH
        .try_with(|depth| depth.get() > 0)
        .unwrap_or(false)
}

/// Short text form of a panic payload.
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    sanitize_message(&message, MAX_PANIC_PAYLOAD_CHARS)
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Panic text can carry host data; it is sanitized and capped before logging.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = describe_panic(panic_info.payload());
        let contained = panic_is_contained();
        error!(
            "event=panic_captured module=logging status=error contained={} location={} payload={}",
            contained, location, payload
        );
        if let Some(store) = CRASH_SINK.get().filter(|_| !contained) {
            let report = CrashReport::from_panic(panic_info);
            if let Err(err) = store.save(&report.render()) {
                error!("event=crash_report module=logging status=error error={err}");
            }
        }
        previous_hook(panic_info);
    }));
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        contain_panic, describe_panic, init_logging, logging_status, normalize_level,
        normalize_log_dir, panic_is_contained, sanitize_message,
    };
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "hostkit-logging-{suffix}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(
            normalize_level("INFO").expect("INFO should normalize"),
            "info"
        );
        assert_eq!(
            normalize_level(" warning ").expect("warning should normalize"),
            "warn"
        );
    }

    #[test]
    fn normalize_log_dir_rejects_relative_path() {
        let error = normalize_log_dir("logs/dev").expect_err("relative paths must be rejected");
        assert!(error.contains("absolute"));
    }

    #[test]
    fn sanitize_message_removes_newlines_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn describe_panic_handles_str_string_and_other_payloads() {
        let from_str = std::panic::catch_unwind(|| panic!("boom")).expect_err("panics");
        assert_eq!(describe_panic(from_str.as_ref()), "boom");

        let from_string =
            std::panic::catch_unwind(|| panic!("{}", "multi\nline")).expect_err("panics");
        assert_eq!(describe_panic(from_string.as_ref()), "multi line");

        let other = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).expect_err("panics");
        assert_eq!(describe_panic(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn init_logging_is_idempotent_for_same_config_and_rejects_conflicts() {
        let log_dir = unique_temp_dir("idempotent");
        let log_dir_str = log_dir
            .to_str()
            .expect("temp dir should be valid UTF-8")
            .to_string();
        let second_dir = unique_temp_dir("different");
        let second_dir_str = second_dir
            .to_str()
            .expect("temp dir should be valid UTF-8")
            .to_string();

        init_logging("info", &log_dir_str).expect("first init should succeed");
        init_logging("info", &log_dir_str).expect("same config should be idempotent");

        let level_error =
            init_logging("debug", &log_dir_str).expect_err("level conflict should fail");
        assert!(level_error.contains("refusing to switch"));

        let dir_error =
            init_logging("info", &second_dir_str).expect_err("directory conflict should fail");
        assert!(dir_error.contains("refusing to switch"));

        let (active_level, active_dir) = logging_status().expect("logging should be active");
        assert_eq!(active_level, "info");
        assert_eq!(active_dir, log_dir);
    }

    #[test]
    fn contain_panic_marks_only_the_enclosed_scope() {
        assert!(!panic_is_contained());
        assert!(contain_panic(panic_is_contained).expect("no panic"));

        let nested = contain_panic(|| {
            let inner_caught = contain_panic(|| panic!("inner")).is_err();
            inner_caught && panic_is_contained()
        });
        assert!(nested.expect("outer scope does not panic"));

        let caught = contain_panic(|| panic!("outer")).expect_err("panics");
        assert_eq!(describe_panic(caught.as_ref()), "outer");
        assert!(!panic_is_contained());
    }
}
