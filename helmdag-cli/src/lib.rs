// src/lib.rs

pub mod cli;
pub mod config;
pub mod display;
pub mod install;
pub mod logging;
pub mod plan;

use crate::cli::{CliArgs, Command};

/// Exit code on success.
pub const EXIT_OK: i32 = 0;
/// Exit code for setup problems (bad input file, no cluster access).
pub const EXIT_SETUP: i32 = 1;
/// Exit code for a failed install/upgrade run.
pub const EXIT_INSTALL: i32 = 2;

/// High-level entry point used by `main.rs`. Returns the process exit
/// code; errors are printed to stderr here.
pub async fn run(args: CliArgs) -> i32 {
    match args.command {
        Command::Plan(plan_args) => match plan::run(&plan_args) {
            Ok(()) => EXIT_OK,
            Err(err) => {
                eprintln!("error planning: {err:#}");
                EXIT_SETUP
            }
        },
        Command::Install(install_args) => {
            let (manager, charts, opts) = match install::prepare(&install_args).await {
                Ok(prepared) => prepared,
                Err(err) => {
                    eprintln!("error preparing install: {err:#}");
                    return EXIT_SETUP;
                }
            };
            match install::execute(&install_args, &manager, &charts, opts).await {
                Ok(releases) => {
                    for (chart, release) in &releases {
                        println!("Chart: {chart} => release: {release}");
                    }
                    EXIT_OK
                }
                Err(err) => {
                    if let Some(detail) = err.diagnostics() {
                        display::print_chart_error(detail);
                    }
                    eprintln!("error running installations: {err}");
                    EXIT_INSTALL
                }
            }
        }
    }
}
