// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Module bootloader entry point.
//!
//! Parses the CLI surface, brings up the process context and idles until
//! interrupted. Module loading itself (DAG execution) lives outside this
//! crate; this binary exists so deployments have a process to run.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cybus::mainboard::{parse_arguments, ParseOutcome};
use cybus::transport::TransportConfig;
use cybus::ProcessContext;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_arguments(std::env::args()) {
        ParseOutcome::Run(args) => args,
        ParseOutcome::Help { usage } => {
            println!("{usage}");
            return ExitCode::SUCCESS;
        }
        ParseOutcome::Fail { message } => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "[mainboard] process_group={} sched_name={} dag_conf={:?}",
        args.process_group,
        args.sched_name,
        args.dag_conf
    );

    let context = match ProcessContext::init_global(TransportConfig::default()) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("failed to initialize process context: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Park until SIGINT/SIGTERM; module execution is handled by the
    // embedding framework.
    let handler: extern "C" fn(libc::c_int) = on_signal;
    // SAFETY: on_signal only touches an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
    while !STOP.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    context.shutdown();
    ExitCode::SUCCESS
}
