//! `gsd-enforce`: lifecycle hook enforcing delegation and artifact rules for
//! `/gsd:*` commands.
//!
//! Without a subcommand (or with `hook`) it reads one hook event from stdin.
//! The remaining subcommands inspect the effective policy and stored turns.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use gsd_enforce::exit_codes;
use gsd_enforce::hook::run_hook;
use gsd_enforce::io::policy_source::load_policy;
use gsd_enforce::io::settings::Settings;
use gsd_enforce::io::state_store::{FileStateStore, StateStore};
use gsd_enforce::logging;

#[derive(Parser)]
#[command(
    name = "gsd-enforce",
    version,
    about = "Turn-scoped policy enforcement hook for /gsd:* commands"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Decide one hook event read from stdin (default).
    Hook,
    /// Print the effective policy table and its source as JSON.
    Policy {
        /// Workspace to read `.planning/config.json` from.
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Print the stored turn state for a session as JSON (`null` if none).
    State { session_id: String },
    /// Remove the stored turn state for a session.
    Clear { session_id: String },
}

fn main() {
    let cli = Cli::parse();
    logging::init(Settings::debug_from_env());
    let settings = Settings::from_env();

    let code = match cli.command.unwrap_or(Command::Hook) {
        Command::Hook => run_hook(io::stdin().lock(), io::stdout().lock(), &settings),
        Command::Policy { cwd } => finish(cmd_policy(cwd, &settings)),
        Command::State { session_id } => finish(cmd_state(&session_id, &settings)),
        Command::Clear { session_id } => finish(cmd_clear(&session_id, &settings)),
    };
    std::process::exit(code);
}

fn finish(result: Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

fn cmd_policy(cwd: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let workspace = match cwd.or_else(|| settings.project_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    print_json(&load_policy(&workspace))
}

fn cmd_state(session_id: &str, settings: &Settings) -> Result<()> {
    let store = FileStateStore::new(&settings.state_dir);
    let state = store
        .read(session_id)
        .with_context(|| format!("read turn state for `{session_id}`"))?;
    print_json(&state)
}

fn cmd_clear(session_id: &str, settings: &Settings) -> Result<()> {
    let store = FileStateStore::new(&settings.state_dir);
    store
        .clear(session_id)
        .with_context(|| format!("clear turn state for `{session_id}`"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_hook() {
        let cli = Cli::parse_from(["gsd-enforce"]);
        assert!(cli.command.is_none());
        let cli = Cli::parse_from(["gsd-enforce", "hook"]);
        assert!(matches!(cli.command, Some(Command::Hook)));
    }

    #[test]
    fn parse_policy_with_cwd() {
        let cli = Cli::parse_from(["gsd-enforce", "policy", "--cwd", "/work"]);
        assert!(matches!(
            cli.command,
            Some(Command::Policy { cwd: Some(ref dir) }) if dir == &PathBuf::from("/work")
        ));
    }

    #[test]
    fn parse_state_and_clear() {
        let cli = Cli::parse_from(["gsd-enforce", "state", "abc"]);
        assert!(matches!(cli.command, Some(Command::State { ref session_id }) if session_id == "abc"));
        let cli = Cli::parse_from(["gsd-enforce", "clear", "abc"]);
        assert!(matches!(cli.command, Some(Command::Clear { ref session_id }) if session_id == "abc"));
    }
}
