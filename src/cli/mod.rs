use crate::app::{Core, RecentRef, SelectError, Selection};
use crate::domain::Entry;
use crate::infra::{ClearEntriesError, DeleteEntryError, ListEntriesError, UninstallShimError};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Command(CliCommand),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Select {
        root: PathBuf,
        json: bool,
    },
    Reopen {
        recent: RecentRef,
        json: bool,
    },
    List {
        root: PathBuf,
        json: bool,
        limit: Option<usize>,
    },
    Show {
        root: PathBuf,
        id: String,
    },
    Delete {
        root: PathBuf,
        id: String,
    },
    Clear {
        root: PathBuf,
    },
    Recents,
    Uninstall {
        root: PathBuf,
    },
    Watch {
        root: PathBuf,
    },
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

#[derive(Debug, Default)]
struct CommandArgs {
    positionals: Vec<String>,
    json: bool,
    limit: Option<usize>,
}

#[derive(Clone, Copy)]
struct AcceptedFlags {
    json: bool,
    limit: bool,
}

const NO_FLAGS: AcceptedFlags = AcceptedFlags {
    json: false,
    limit: false,
};

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1);
    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::PrintHelp);
    };

    let command = match subcommand.as_str() {
        "select" => {
            let args = collect_args(iter, AcceptedFlags { json: true, limit: false })?;
            let [root] = positionals(args.positionals, ["site"])?;
            CliCommand::Select {
                root: PathBuf::from(root),
                json: args.json,
            }
        }
        "reopen" => {
            let args = collect_args(iter, AcceptedFlags { json: true, limit: false })?;
            let [target] = positionals(args.positionals, ["recent"])?;
            CliCommand::Reopen {
                recent: parse_recent_ref(&target),
                json: args.json,
            }
        }
        "list" | "ls" => {
            let args = collect_args(iter, AcceptedFlags { json: true, limit: true })?;
            let [root] = positionals(args.positionals, ["site"])?;
            CliCommand::List {
                root: PathBuf::from(root),
                json: args.json,
                limit: args.limit,
            }
        }
        "show" => {
            let args = collect_args(iter, NO_FLAGS)?;
            let [root, id] = positionals(args.positionals, ["site", "entry-id"])?;
            CliCommand::Show {
                root: PathBuf::from(root),
                id,
            }
        }
        "delete" | "rm" => {
            let args = collect_args(iter, NO_FLAGS)?;
            let [root, id] = positionals(args.positionals, ["site", "entry-id"])?;
            CliCommand::Delete {
                root: PathBuf::from(root),
                id,
            }
        }
        "clear" => {
            let args = collect_args(iter, NO_FLAGS)?;
            let [root] = positionals(args.positionals, ["site"])?;
            CliCommand::Clear {
                root: PathBuf::from(root),
            }
        }
        "recents" => {
            let args = collect_args(iter, NO_FLAGS)?;
            let [] = positionals(args.positionals, [])?;
            CliCommand::Recents
        }
        "uninstall" => {
            let args = collect_args(iter, NO_FLAGS)?;
            let [root] = positionals(args.positionals, ["site"])?;
            CliCommand::Uninstall {
                root: PathBuf::from(root),
            }
        }
        "watch" => {
            let args = collect_args(iter, NO_FLAGS)?;
            let [root] = positionals(args.positionals, ["site"])?;
            CliCommand::Watch {
                root: PathBuf::from(root),
            }
        }
        other => return Err(CliParseError::UnknownSubcommand(other.to_string())),
    };

    Ok(CliInvocation::Command(command))
}

fn collect_args<'a>(
    mut args: impl Iterator<Item = &'a String>,
    accepted: AcceptedFlags,
) -> Result<CommandArgs, CliParseError> {
    let mut parsed = CommandArgs::default();
    let mut only_positionals = false;
    while let Some(arg) = args.next() {
        if only_positionals {
            parsed.positionals.push(arg.to_string());
            continue;
        }
        match arg.as_str() {
            "--" => only_positionals = true,
            "--json" if accepted.json => parsed.json = true,
            "--limit" | "-n" if accepted.limit => {
                let value = args
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--limit".to_string()))?;
                parsed.limit = Some(parse_usize_flag("--limit", value)?);
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(CliParseError::UnknownFlag(arg.to_string()));
            }
            _ => parsed.positionals.push(arg.to_string()),
        }
    }
    Ok(parsed)
}

fn positionals<const N: usize>(
    values: Vec<String>,
    names: [&'static str; N],
) -> Result<[String; N], CliParseError> {
    if values.len() > N {
        return Err(CliParseError::UnexpectedArgument(values[N].clone()));
    }
    if values.len() < N {
        return Err(CliParseError::MissingArgument(names[values.len()]));
    }
    values
        .try_into()
        .map_err(|_| CliParseError::MissingArgument(names[0]))
}

fn parse_recent_ref(value: &str) -> RecentRef {
    match value.parse::<usize>() {
        Ok(position) => RecentRef::Position(position),
        Err(_) => RecentRef::Path(PathBuf::from(value)),
    }
}

fn parse_usize_flag(flag: &str, value: &str) -> Result<usize, CliParseError> {
    value
        .parse::<usize>()
        .map_err(|_| CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    List(#[from] ListEntriesError),

    #[error(transparent)]
    Delete(#[from] DeleteEntryError),

    #[error(transparent)]
    Clear(#[from] ClearEntriesError),

    #[error(transparent)]
    Uninstall(#[from] UninstallShimError),

    #[error("entry not found: {0}\nHint: run `wpmail list <site>` and copy the id column.")]
    EntryNotFound(String),

    #[error("failed to encode json: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub fn run(command: CliCommand, core: &mut Core) -> Result<(), CliRunError> {
    // Not locked for the whole run: `watch` prints snapshots from the worker
    // thread while this thread waits on stdin.
    let mut out = io::BufWriter::new(io::stdout());
    let mut err = io::BufWriter::new(io::stderr());
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let result = run_with(command, core, &mut out, &mut err, &mut input);
    out.flush()?;
    err.flush()?;
    result
}

fn run_with(
    command: CliCommand,
    core: &mut Core,
    out: &mut impl Write,
    err: &mut impl Write,
    input: &mut impl BufRead,
) -> Result<(), CliRunError> {
    match command {
        CliCommand::Select { root, json } => {
            let selection = core.select_directory(&root)?;
            write_selection(out, err, &selection, json)
        }
        CliCommand::Reopen { recent, json } => {
            let selection = core.select_recent(recent)?;
            write_selection(out, err, &selection, json)
        }
        CliCommand::List { root, json, limit } => {
            let entries = core.list_entries(&root)?;
            let shown = limit.unwrap_or(entries.len()).min(entries.len());
            write_entries(out, &entries[..shown], json)?;
            Ok(())
        }
        CliCommand::Show { root, id } => {
            let entries = core.list_entries(&root)?;
            let Some(entry) = entries.iter().find(|entry| entry.id == id) else {
                return Err(CliRunError::EntryNotFound(id));
            };
            write_entry_detail(out, entry)?;
            Ok(())
        }
        CliCommand::Delete { root, id } => {
            core.delete_entry(&root, &id)?;
            let _ = write_line(out, &format!("deleted\t{id}"))?;
            Ok(())
        }
        CliCommand::Clear { root } => {
            let outcome = core.clear_all(&root)?;
            let _ = write_line(out, &format!("deleted\t{}", outcome.deleted))?;
            if outcome.failed > 0 {
                let _ = write_line(err, &format!("failed: {}", outcome.failed))?;
            }
            Ok(())
        }
        CliCommand::Recents => {
            for (idx, path) in core.recents().iter().enumerate() {
                if !write_line(out, &format!("{}\t{}", idx + 1, path.display()))? {
                    break;
                }
            }
            Ok(())
        }
        CliCommand::Uninstall { root } => {
            core.uninstall_shim(&root)?;
            let _ = write_line(out, &format!("uninstalled\t{}", root.display()))?;
            Ok(())
        }
        CliCommand::Watch { root } => {
            core.subscribe(Box::new(|entries: &[Entry]| {
                let mut out = io::stdout().lock();
                let _ = write_line(&mut out, &snapshot_line(entries));
                let _ = out.flush();
            }));
            let selection = core.select_directory(&root)?;
            let _ = write_line(out, &snapshot_line(&selection.entries))?;
            let status = match core.watched_root() {
                Some(watched) => format!(
                    "watching {} (close stdin or type q to stop)",
                    watched.display()
                ),
                None => format!("live updates unavailable for {}", selection.root.display()),
            };
            let _ = write_line(err, &status)?;
            out.flush()?;
            err.flush()?;

            let mut line = String::new();
            loop {
                line.clear();
                let read = input.read_line(&mut line)?;
                if read == 0 || line.trim() == "q" {
                    break;
                }
            }
            core.shutdown();
            core.unsubscribe();
            Ok(())
        }
    }
}

fn write_selection(
    out: &mut impl Write,
    err: &mut impl Write,
    selection: &Selection,
    json: bool,
) -> Result<(), CliRunError> {
    write_entries(out, &selection.entries, json)?;
    let _ = write_line(
        err,
        &format!(
            "selected {} ({} entries)",
            selection.root.display(),
            selection.entries.len()
        ),
    )?;
    Ok(())
}

fn write_entries(out: &mut impl Write, entries: &[Entry], json: bool) -> Result<(), CliRunError> {
    if json {
        let text = serde_json::to_string_pretty(entries)?;
        let _ = write_line(out, &text)?;
        return Ok(());
    }
    for entry in entries {
        if !write_line(out, &entry_line(entry))? {
            break;
        }
    }
    Ok(())
}

fn entry_line(entry: &Entry) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        single_line(&entry.display_timestamp()),
        entry.id,
        single_line(&entry.to),
        single_line(&entry.subject)
    )
}

fn snapshot_line(entries: &[Entry]) -> String {
    match entries.first() {
        Some(newest) => format!("entries\t{}\t{}", entries.len(), entry_line(newest)),
        None => "entries\t0".to_string(),
    }
}

fn write_entry_detail(out: &mut impl Write, entry: &Entry) -> io::Result<()> {
    writeln!(out, "Id: {}", entry.id)?;
    writeln!(out, "Date: {}", entry.display_timestamp())?;
    writeln!(out, "From: {}", entry.from)?;
    writeln!(out, "To: {}", entry.to)?;
    writeln!(out, "Subject: {}", entry.subject)?;
    if !entry.headers.trim().is_empty() {
        writeln!(out, "Headers:")?;
        for header in entry.headers.lines() {
            writeln!(out, "  {header}")?;
        }
    }
    for attachment in &entry.attachments {
        writeln!(out, "Attachment: {attachment}")?;
    }
    writeln!(out)?;
    writeln!(out, "{}", entry.message)
}

fn single_line(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}
