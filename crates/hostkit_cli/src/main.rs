//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `hostkit_core` linkage.
//! - Inspect a module data directory: config, host version cache and crash
//!   reports.

use hostkit_core::crash::CrashLogStore;
use hostkit_core::BootstrapConfig;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("hostkit_core ping={}", hostkit_core::ping());
    println!("hostkit_core version={}", hostkit_core::core_version());

    let Some(data_dir) = std::env::args_os().nth(1).map(PathBuf::from) else {
        return ExitCode::SUCCESS;
    };

    match BootstrapConfig::load(&data_dir) {
        Ok(config) => println!(
            "config host_package={} build_mode={} log_level={}",
            config.host_package,
            config.build_mode.as_str(),
            config.log_level
        ),
        Err(err) => {
            eprintln!("config error={err}");
            return ExitCode::FAILURE;
        }
    }

    let store = match CrashLogStore::open(&data_dir) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("crash store error={err}");
            return ExitCode::FAILURE;
        }
    };
    match store.list() {
        Ok(reports) => {
            println!("crash_reports count={}", reports.len());
            for path in reports {
                println!("crash_report file={}", path.display());
            }
        }
        Err(err) => {
            eprintln!("crash store error={err}");
            return ExitCode::FAILURE;
        }
    }
    if let Some(pending) = store.pending_file() {
        println!("crash_pending file={}", pending.display());
    }
    ExitCode::SUCCESS
}
