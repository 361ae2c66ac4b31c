// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! # billable — billable hours tracker
//!
//! Tracks time per client: select a client, start and stop a timer, and keep a
//! chronological list of sessions (start, end, duration) on local disk.
//!
//! ## Data file
//!
//! One JSON object mapping client name to a list of `[start, end, duration]` triples:
//!
//! ```text
//! {"Acme": [["2025-02-20 09:00:00", "2025-02-20 09:00:02", "0:00:02"]]}
//! ```
//!
//! Location: `$BILLABLE_TRACKER_DATA` if set; otherwise `billable_tracker_data.json` in the
//! working directory (debug builds) or `$HOME/.billable_tracker/` (release builds).
//!
//! ## Subcommands
//!
//! | Command    | Description |
//! |------------|-------------|
//! | `run`      | Interactive session (default): select a client, start/stop the timer, export. |
//! | `clients`  | List clients with their session counts. |
//! | `add`      | Add a client. |
//! | `remove`   | Remove a client and its history (asks first). |
//! | `reset`    | Clear a client's history (asks first). |
//! | `history`  | Print a client's sessions. |
//! | `save`     | Save one client's history as text. |
//! | `export`   | Export every client's sessions as CSV. |
//! | `manpage`  | Output Unix manual page in groff format to stdout. |
//! | `help`     | Show the man page in a pager (groff -man -Tascii \| less). |

mod config;
mod error;
mod export;
mod prompt;
mod record;
mod session;
mod store;
mod timer;

use chrono::TimeDelta;
use config::Config;
use error::{Result, TrackerError};
use prompt::{with_default_extension, Prompter, TerminalPrompter, CSV_FILES, TEXT_FILES};
use record::format_duration;
use session::{Flow, Session, SESSION_HELP};
use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::{self, Command, Stdio};
use std::sync::Arc;
use store::SessionStore;
use timer::{Clock, TimerController, TimerState};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use libc::{signal, SIG_IGN};

/// Window title while idle.
const IDLE_TITLE: &str = "Billable Hours Tracker";

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Loads the store; an unreadable file is reported and replaced by an empty store for this run.
fn open_store(config: &Config) -> SessionStore {
    let (store, load_err) = SessionStore::load_or_recover(&config.data_file);
    if let Some(e) = load_err {
        eprintln!("Error: {}", e);
    }
    store
}

/// Joins the remaining arguments into one client name.
fn client_arg(args: &[String], usage: &str) -> Result<String> {
    let name = args.join(" ");
    let name = name.trim();
    if name.is_empty() {
        return Err(TrackerError::Usage(usage.to_string()));
    }
    Ok(name.to_string())
}

/// Sets the terminal window title (OSC 0) on stderr, if stderr is a terminal.
fn set_title(text: &str) {
    let mut err = io::stderr();
    if err.is_terminal() {
        let _ = write!(err, "\x1b]0;{}\x07", text);
        let _ = err.flush();
    }
}

/// Interactive session on stdin/stdout. The elapsed time is shown in the terminal title while running.
fn cmd_run(config: &Config) -> Result<()> {
    let store = open_store(config);
    let timer = TimerController::new().on_tick(Arc::new(|elapsed: TimeDelta| {
        set_title(&format!("{} {}", IDLE_TITLE, format_duration(elapsed)));
    }));
    let mut session = Session::new(store, timer);
    println!("{}: data file {}", IDLE_TITLE, session.store().path().display());
    println!("Type help for a list of commands.");
    set_title(IDLE_TITLE);
    run_session(&mut session, &mut TerminalPrompter::stdio())
}

/// Reads commands until `quit` or end of input. A line that is not valid UTF-8 is
/// reported and skipped; any other read error stops a running timer and is returned.
fn run_session<C: Clock, R: BufRead, W: Write>(
    session: &mut Session<C>,
    ui: &mut TerminalPrompter<R, W>,
) -> Result<()> {
    loop {
        let prompt = match (session.timer().state(), session.timer().selected()) {
            (TimerState::Running { client, .. }, _) => format!("[{} running] > ", client),
            (TimerState::Idle, Some(selected)) => format!("[{}] > ", selected),
            (TimerState::Idle, None) => "> ".to_string(),
        };
        let line = match ui.read_line(&prompt) {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("end of input");
                session.finish(ui);
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                ui.notify_error("Error", "Input is not valid UTF-8; line ignored.");
                continue;
            }
            Err(e) => {
                session.finish(ui);
                return Err(e.into());
            }
        };
        if session.handle(&line, ui) == Flow::Quit {
            return Ok(());
        }
        if !session.timer().is_running() {
            set_title(IDLE_TITLE);
        }
    }
}

fn cmd_clients(store: &SessionStore) -> Result<()> {
    if store.is_empty() {
        println!("No clients.");
        return Ok(());
    }
    for client in store.clients() {
        let count = store.history(client).map_or(0, <[_]>::len);
        println!("{}  ({} sessions)", client, count);
    }
    Ok(())
}

fn cmd_add(args: &[String], store: &mut SessionStore) -> Result<()> {
    let name = client_arg(args, "Usage: billable add <name>")?;
    store.add_client(&name)?;
    println!("Added client: {}", name);
    Ok(())
}

fn cmd_remove(args: &[String], store: &mut SessionStore, ui: &mut dyn Prompter) -> Result<()> {
    let name = client_arg(args, "Usage: billable remove <name>")?;
    if !store.contains(&name) {
        return Err(TrackerError::UnknownClient(name));
    }
    if !ui.confirm("Confirm Removal", &format!("Are you sure you want to remove '{}'?", name)) {
        return Ok(());
    }
    store.remove_client(&name)?;
    println!("Removed client: {}", name);
    Ok(())
}

fn cmd_reset(args: &[String], store: &mut SessionStore, ui: &mut dyn Prompter) -> Result<()> {
    let name = client_arg(args, "Usage: billable reset <name>")?;
    if !store.contains(&name) {
        return Err(TrackerError::UnknownClient(name));
    }
    if !ui.confirm(
        "Reset History",
        &format!("Are you sure you want to reset history for '{}'?", name),
    ) {
        return Ok(());
    }
    store.reset_history(&name)?;
    println!("History cleared for {}", name);
    Ok(())
}

fn cmd_history(args: &[String], store: &SessionStore) -> Result<()> {
    let name = client_arg(args, "Usage: billable history <name>")?;
    let records = store
        .history(&name)
        .ok_or_else(|| TrackerError::UnknownClient(name.clone()))?;
    let mut out = io::stdout().lock();
    export::write_history_text(&mut out, &name, records)?;
    Ok(())
}

/// `save <name> [path]`: asks for the path when it is not given.
fn cmd_save(args: &[String], store: &SessionStore, ui: &mut dyn Prompter) -> Result<()> {
    let (name, path) = match args {
        [name] => (name, None),
        [name, path] => (name, Some(with_default_extension(path, TEXT_FILES))),
        _ => return Err(TrackerError::Usage("Usage: billable save <name> [path]".to_string())),
    };
    let records = store
        .history(name)
        .ok_or_else(|| TrackerError::UnknownClient(name.clone()))?;
    let Some(path) = path.or_else(|| ui.choose_save_file(TEXT_FILES)) else {
        return Ok(());
    };
    export::save_history_text(&path, name, records)?;
    println!("History saved to {}", path.display());
    Ok(())
}

/// `export [path]`: asks for the path when it is not given.
fn cmd_export(args: &[String], store: &SessionStore, ui: &mut dyn Prompter) -> Result<()> {
    let path = match args {
        [] => ui.choose_save_file(CSV_FILES),
        [path] => Some(with_default_extension(path, CSV_FILES)),
        _ => return Err(TrackerError::Usage("Usage: billable export [path]".to_string())),
    };
    let Some(path) = path else {
        return Ok(());
    };
    export::export_csv(&path, store.sessions())?;
    println!("All session data saved to {}", path.display());
    Ok(())
}

/// Groff man page source (shared by manpage and help).
fn manpage_content() -> String {
    let commands = SESSION_HELP
        .lines()
        .skip(1)
        .map(|l| format!(".B {}\n.br", l.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#".TH BILLABLE 1 "February 2025" "" "billable"
.SH NAME
billable \- billable hours tracker (per-client timer, session history, text and CSV export)
.SH SYNOPSIS
.B billable
.RI [ command ]
.RI [ args... ]
.PP
.B billable run
.PP
.B billable clients
.PP
.B billable add
.I name
.PP
.B billable remove
.I name
.PP
.B billable reset
.I name
.PP
.B billable history
.I name
.PP
.B billable save
.I name
.RI [ path ]
.PP
.B billable export
.RI [ path ]
.PP
.B billable manpage
.PP
.B billable help
.SH DESCRIPTION
.B billable
tracks billable time per client.
Select a client, start the timer, stop it, and the session (start, end, duration)
is appended to that client's history and saved immediately.
.SH "DATA FORMAT"
One JSON object mapping client name to a list of
.B [start, end, duration]
string triples. Timestamps are
.BR "YYYY\-MM\-DD HH:MM:SS" ;
durations are
.B H:MM:SS
(hours may exceed 24).
The whole file is rewritten on every change.
If the file cannot be parsed it is renamed to
.I file.YYMMDDHHMMSS.corrupt
and the run starts with no clients.
.SH COMMANDS
.TP
.B run
Interactive session (also the default when no command is given).
Only one timer runs at a time. Selecting another client while it runs asks whether to stop it;
.B quit
is refused until the timer is stopped. Session commands:
.PP
.RS
{commands}
.RE
.TP
.B clients
List clients and their session counts.
.TP
.B add
Add a client with an empty history. Fails if the name already exists.
.TP
.B remove
Remove a client and all of its sessions, after confirmation.
.TP
.B reset
Clear a client's sessions, after confirmation. The client is kept.
.TP
.B history
Print a client's sessions, numbered.
.TP
.B save
Save one client's history as text:
.B "N. Start: <start>, End: <end>, Duration: <duration>"
per line. Prompts for the path when omitted;
.B .txt
is appended when the path has no extension.
.TP
.B export
Write every client's sessions as CSV with header
.BR "Client,Start Time,End Time,Duration" .
Prompts for the path when omitted;
.B .csv
is appended when the path has no extension.
.TP
.B manpage
Write this manual page in groff format to stdout. Example:
.B "billable manpage | groff \-man \-Tascii | less"
.TP
.B help
Show this manual page in
.BR $PAGER ,
rendered by groff when it is installed.
.SH ENVIRONMENT
.TP
.B BILLABLE_TRACKER_DATA
Path of the data file, overriding the default location.
.TP
.B BILLABLE_DEBUG
If set to 1, true, or yes, log debug messages to stderr.
.TP
.B RUST_LOG
Log filter used when
.B BILLABLE_DEBUG
is not set (default: warn).
.TP
.B PAGER
Pager used by
.B help
(default: less \-R).
.SH FILES
.B billable_tracker_data.json
in the working directory (debug builds), or
.B $HOME/.billable_tracker/billable_tracker_data.json
(release builds).
.SH BUGS
Edits made to the data file by another program while a session is open are overwritten by the next save.
.SH AUTHORS
Robert August Vincent II <pillarsdotnet@gmail.com>
Co-author: Cursor-AI.
"#
    )
}

/// `billable manpage`: the groff source on stdout. A closed pipe (e.g. `| head`) is not an error.
fn cmd_manpage() -> Result<()> {
    let mut out = io::stdout().lock();
    match out.write_all(manpage_content().as_bytes()).and_then(|()| out.flush()) {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e.into()),
        _ => Ok(()),
    }
}

/// Shell pipelines tried in turn by `billable help`: rendered through groff, then the raw source.
fn help_pipelines() -> Vec<String> {
    let pager = env::var("PAGER")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "less -R".to_string());
    vec![format!("groff -man -Tascii 2>/dev/null | {}", pager), pager]
}

/// Feeds `text` to `sh -c pipeline`; true when the pipeline ran and exited cleanly.
fn page_through(pipeline: &str, text: &str) -> bool {
    let Ok(mut child) = Command::new("sh")
        .args(["-c", pipeline])
        .stdin(Stdio::piped())
        .spawn()
    else {
        return false;
    };
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(text.as_bytes());
    }
    child.wait().map(|s| s.success()).unwrap_or(false)
}

/// `billable help`: the man page in `$PAGER` (default `less -R`), rendered by groff when available.
fn cmd_help() -> Result<()> {
    let man = manpage_content();
    for pipeline in help_pipelines() {
        debug!(pipeline = %pipeline, "showing help");
        if page_through(&pipeline, &man) {
            return Ok(());
        }
    }
    Err(TrackerError::Usage(
        "billable: could not start a pager. Set PAGER, or read the manual with: billable manpage | man -l -"
            .to_string(),
    ))
}

fn main() {
    let config = Config::from_env();
    init_logging(config.debug);
    #[cfg(unix)]
    unsafe {
        signal(libc::SIGPIPE, SIG_IGN);
    }
    let mut args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().cloned();
    let rest: Vec<String> = if args.len() > 1 {
        args.drain(1..).collect()
    } else {
        Vec::new()
    };
    debug!(command = cmd.as_deref().unwrap_or("(none)"), data_file = %config.data_file.display(), "dispatching");

    let result = match cmd.as_deref() {
        None | Some("run") => cmd_run(&config),
        Some("clients") | Some("list") => cmd_clients(&open_store(&config)),
        Some("add") => cmd_add(&rest, &mut open_store(&config)),
        Some("remove") => cmd_remove(&rest, &mut open_store(&config), &mut TerminalPrompter::stdio()),
        Some("reset") => cmd_reset(&rest, &mut open_store(&config), &mut TerminalPrompter::stdio()),
        Some("history") => cmd_history(&rest, &open_store(&config)),
        Some("save") => cmd_save(&rest, &open_store(&config), &mut TerminalPrompter::stdio()),
        Some("export") => cmd_export(&rest, &open_store(&config), &mut TerminalPrompter::stdio()),
        Some("manpage") => cmd_manpage(),
        Some("help") | Some("--help") | Some("-h") => cmd_help(),
        Some(other) => Err(TrackerError::Usage(format!(
            "billable: unknown command \"{}\". Try: billable help",
            other
        ))),
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}
