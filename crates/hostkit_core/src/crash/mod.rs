//! Crash report formatting and persistence.

pub mod report;
pub mod store;

pub use report::CrashReport;
pub use store::{
    CrashLogStore, CrashStoreError, CrashStoreResult, CRASH_LOG_DIR, MAX_CRASH_LOGS,
};
