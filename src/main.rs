/*!
 * Forklift - command line entry point
 *
 * Runs each argument as a shell command in its own forked task:
 *
 *     forklift [--timeout SECS] [--kill-all-on-error] [--] CMD...
 */

use forklift::core::config;
use forklift::{init_tracing, Executor, RunOptions, Task};
use miette::{miette, IntoDiagnostic};
use std::process::Command;
use std::time::Duration;
use tracing::info;

const USAGE: &str = "usage: forklift [--timeout SECS] [--kill-all-on-error] [--] CMD...";

#[derive(Debug, Default)]
struct Cli {
    options: RunOptions,
    commands: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> miette::Result<Cli> {
    let mut cli = Cli::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--timeout" => {
                let raw = args
                    .next()
                    .ok_or_else(|| miette!("--timeout needs a value\n{}", USAGE))?;
                let secs: u64 = raw
                    .parse()
                    .into_diagnostic()
                    .map_err(|e| e.wrap_err(format!("invalid --timeout '{}'", raw)))?;
                cli.options = cli.options.with_timeout(Duration::from_secs(secs));
            }
            "--kill-all-on-error" => {
                cli.options = cli.options.with_kill_all_on_error(true);
            }
            "-h" | "--help" => return Err(miette!("{}", USAGE)),
            "--" => {
                cli.commands.extend(args.by_ref());
            }
            _ => cli.commands.push(arg),
        }
    }

    if cli.commands.is_empty() {
        return Err(miette!("no commands given\n{}", USAGE));
    }
    Ok(cli)
}

/// Run a command through the shell, failing on a non-zero exit
fn run_shell(command: &str) -> anyhow::Result<i32> {
    let status = Command::new("sh").arg("-c").arg(command).status()?;
    match status.code() {
        Some(0) => Ok(0),
        Some(code) => anyhow::bail!("command exited with status {}", code),
        None => anyhow::bail!("command terminated by a signal"),
    }
}

fn main() -> miette::Result<()> {
    init_tracing();
    let timeout = config::init_from_env();
    info!(timeout_secs = timeout.as_secs(), "Forklift starting");

    let cli = parse_args(std::env::args().skip(1))?;

    let tasks: Vec<Task<'_>> = cli
        .commands
        .iter()
        .map(|command| Task::new(command.as_str(), move || run_shell(command)))
        .collect();

    let mut executor = Executor::new();
    executor.run_in_parallel(tasks, cli.options)?;

    info!(commands = cli.commands.len(), "All commands succeeded");
    Ok(())
}
