//! Multi-section crash report text.

use crate::config::BuildMode;
use crate::host::current_process_name;
use crate::logging::describe_panic;
use std::backtrace::Backtrace;
use std::fmt::Write;
use std::panic::PanicHookInfo;
use std::time::{SystemTime, UNIX_EPOCH};

const RULE: &str = "========================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub crash_type: String,
    pub unix_millis: u128,
    pub message: String,
    pub location: String,
    pub thread_name: String,
    pub backtrace: String,
}

impl CrashReport {
    pub fn new(crash_type: impl Into<String>, message: impl Into<String>) -> Self {
        let thread = std::thread::current();
        Self {
            crash_type: crash_type.into(),
            unix_millis: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis())
                .unwrap_or_default(),
            message: message.into(),
            location: "unknown".to_string(),
            thread_name: thread.name().unwrap_or("<unnamed>").to_string(),
            backtrace: String::new(),
        }
    }

    /// Report for a panic observed by the panic hook.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let mut report = Self::new("PANIC", describe_panic(info.payload()));
        if let Some(location) = info.location() {
            report.location = format!(
                "{}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        report.backtrace = Backtrace::force_capture().to_string();
        report
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        section(&mut out, "hostkit Crash Report");
        out.push('\n');
        let _ = writeln!(out, "Crash Time (unix ms): {}", self.unix_millis);
        let _ = writeln!(out, "Crash Type: {}", self.crash_type);
        out.push('\n');

        section(&mut out, "Module Information");
        let _ = writeln!(out, "Version: {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(out, "Build Mode: {}", BuildMode::current().as_str());
        let _ = writeln!(
            out,
            "Platform: {}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let _ = writeln!(out, "Process ID: {}", std::process::id());
        let _ = writeln!(out, "Process Name: {}", current_process_name());
        out.push('\n');

        section(&mut out, "Thread Information");
        let _ = writeln!(out, "Thread Name: {}", self.thread_name);
        out.push('\n');

        section(&mut out, "Panic");
        let _ = writeln!(out, "Message: {}", self.message);
        let _ = writeln!(out, "Location: {}", self.location);
        out.push('\n');

        section(&mut out, "Backtrace");
        if self.backtrace.is_empty() {
            out.push_str("<not captured>\n");
        } else {
            out.push_str(&self.backtrace);
            if !self.backtrace.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push('\n');

        section(&mut out, "End of Crash Report");
        out
    }
}

fn section(out: &mut String, title: &str) {
    out.push_str(RULE);
    out.push('\n');
    out.push_str(title);
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
}
