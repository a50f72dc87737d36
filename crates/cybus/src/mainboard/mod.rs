// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Module bootloader argument surface.
//!
//! The bootloader embedding this runtime is driven by a small CLI:
//!
//! | flag | long | effect |
//! |------|------|--------|
//! | `-h` | `--help` | print usage, exit 0 |
//! | `-d` | `--dag_conf` | DAG description path(s); repeatable, and every non-flag positional following a `-d` belongs to that `-d` |
//! | `-p` | `--process_group` | process namespace, default `mainboard_default` |
//! | `-s` | `--sched_name` | scheduler policy key, default `CYBER_DEFAULT` |
//!
//! Positionals not preceded by a `-d` are an error. Exit codes: 0 on
//! success/help, 1 on a missing required flag or stray positional.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

/// Default process namespace.
pub const DEFAULT_PROCESS_GROUP: &str = "mainboard_default";
/// Default scheduler policy key.
pub const DEFAULT_SCHED_NAME: &str = "CYBER_DEFAULT";

/// Parsed bootloader arguments.
#[derive(Debug, Clone, Parser, PartialEq, Eq)]
#[command(
    name = "mainboard",
    disable_help_flag = true,
    about = "Launch processing modules from DAG descriptions"
)]
pub struct ModuleArguments {
    /// DAG description file(s). Every non-flag value after a `-d` is
    /// appended to that group.
    #[arg(
        short = 'd',
        long = "dag_conf",
        num_args = 1..,
        action = ArgAction::Append,
        required = true,
        value_name = "CONFIG_FILE"
    )]
    pub dag_conf: Vec<PathBuf>,

    /// Process namespace this module runs in.
    #[arg(
        short = 'p',
        long = "process_group",
        default_value = DEFAULT_PROCESS_GROUP,
        value_name = "GROUP"
    )]
    pub process_group: String,

    /// Scheduler policy key.
    #[arg(
        short = 's',
        long = "sched_name",
        default_value = DEFAULT_SCHED_NAME,
        value_name = "POLICY"
    )]
    pub sched_name: String,

    /// Print usage information.
    #[arg(short = 'h', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

/// Outcome of parsing an argument vector.
#[derive(Debug)]
pub enum ParseOutcome {
    /// Arguments parsed; run the modules.
    Run(ModuleArguments),
    /// `-h`/`--help` was given; print `usage` and exit 0.
    Help { usage: String },
    /// Bad invocation; print `message` and exit 1.
    Fail { message: String },
}

/// Parse an argument vector (element 0 is the binary name).
#[must_use]
pub fn parse_arguments<I, T>(args: I) -> ParseOutcome
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match ModuleArguments::try_parse_from(args) {
        Ok(parsed) => ParseOutcome::Run(parsed),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            ParseOutcome::Help {
                usage: e.to_string(),
            }
        }
        Err(e) => ParseOutcome::Fail {
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> ParseOutcome {
        parse_arguments(std::iter::once("mainboard").chain(args.iter().copied()))
    }

    #[test]
    fn test_single_dag_conf() {
        match run(&["-d", "lidar.dag"]) {
            ParseOutcome::Run(parsed) => {
                assert_eq!(parsed.dag_conf, vec![PathBuf::from("lidar.dag")]);
                assert_eq!(parsed.process_group, DEFAULT_PROCESS_GROUP);
                assert_eq!(parsed.sched_name, DEFAULT_SCHED_NAME);
            }
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_positionals_after_dag_belong_to_it() {
        match run(&["-d", "a.dag", "b.dag", "c.dag", "-p", "group"]) {
            ParseOutcome::Run(parsed) => {
                assert_eq!(
                    parsed.dag_conf,
                    vec![
                        PathBuf::from("a.dag"),
                        PathBuf::from("b.dag"),
                        PathBuf::from("c.dag")
                    ]
                );
                assert_eq!(parsed.process_group, "group");
            }
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_dag_groups_accumulate() {
        match run(&["-d", "a.dag", "-d", "b.dag", "c.dag"]) {
            ParseOutcome::Run(parsed) => {
                assert_eq!(parsed.dag_conf.len(), 3);
            }
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dag_conf_fails() {
        assert!(matches!(run(&["-p", "group"]), ParseOutcome::Fail { .. }));
        assert!(matches!(run(&[]), ParseOutcome::Fail { .. }));
    }

    #[test]
    fn test_stray_positional_fails() {
        // A positional not preceded by -d is an error.
        assert!(matches!(
            run(&["stray.dag", "-d", "a.dag"]),
            ParseOutcome::Fail { .. }
        ));
    }

    #[test]
    fn test_help_flag() {
        match run(&["-h"]) {
            ParseOutcome::Help { usage } => assert!(usage.contains("dag_conf")),
            other => panic!("expected Help, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_group_and_sched() {
        match run(&["-d", "a.dag", "-p", "perception", "-s", "RT_PIPELINE"]) {
            ParseOutcome::Run(parsed) => {
                assert_eq!(parsed.process_group, "perception");
                assert_eq!(parsed.sched_name, "RT_PIPELINE");
            }
            other => panic!("expected Run, got {:?}", other),
        }
    }
}
