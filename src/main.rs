mod app;
mod cli;
mod domain;
mod infra;

use crate::app::Core;
use crate::cli::CliInvocation;
use crate::domain::WatchTiming;
use crate::infra::resolve_state_dir;
use std::io::{self, Write};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    StateDir(#[from] crate::infra::ResolveStateDirError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),
}

fn main() {
    init_tracing();
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Command(command) => {
            let state_dir = resolve_state_dir()?;
            tracing::debug!(state_dir = %state_dir.display(), "opening core");
            let mut core = Core::open(state_dir, WatchTiming::default());
            crate::cli::run(command, &mut core)?;
            core.shutdown();
            Ok(())
        }
    }
}

fn print_help() {
    let text = format!(
        "{name} - live log of mail sent by a local WordPress Studio site\n\nUSAGE:\n  {name} select <site> [--json]           Validate the site, install the logger plugin, list entries\n  {name} reopen <n|site> [--json]         Same as select, for an entry of `recents` (1-based) or a path\n  {name} list <site> [--json] [--limit N] List logged mail, newest first\n  {name} show <site> <entry-id>           Print one message with headers\n  {name} delete <site> <entry-id>         Delete one logged message\n  {name} clear <site>                     Delete every logged message\n  {name} recents                          List recently selected sites (max 5)\n  {name} uninstall <site>                 Remove the logger plugin from the site\n  {name} watch <site>                     Select, then print a line per log change until stdin closes\n  {name} --help | --version\n\nOUTPUT:\n  list: timestamp<TAB>entry_id<TAB>to<TAB>subject\n  watch: entries<TAB>count<TAB>newest entry (list format)\n\nFILES:\n  <site>/wp-content/mu-plugins/wp-mail-logger.php   Logger plugin (never overwritten)\n  <site>/wp-content/uploads/wp-mail-logs/*.json     One file per sent message\n\nENV:\n  WPMAIL_STATE_DIR   Override state dir holding recent sites (default: ~/.wpmail)\n  RUST_LOG           Log filter for diagnostics on stderr (default: warn)\n",
        name = env!("CARGO_PKG_NAME")
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}
