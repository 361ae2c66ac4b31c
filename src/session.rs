// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Interactive session: one line in, one action out.
//!
//! Wires user commands to the store and the timer. All questions and output go through a [`Prompter`].

use crate::error::{Result, TrackerError};
use crate::export;
use crate::prompt::{with_default_extension, Prompter, CSV_FILES, TEXT_FILES};
use crate::record::format_duration;
use crate::store::SessionStore;
use crate::timer::{Clock, Selection, SystemClock, TimerController, TimerState};
use chrono::TimeDelta;

/// Whether the input loop should keep reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub const SESSION_HELP: &str = "\
Commands:
  clients          list clients
  add [name]       add a client
  remove [name]    remove a client and its history (default: selected)
  select <name>    select a client
  start            start the timer for the selected client
  stop             stop the timer and record the session
  toggle           start or stop
  status           show the selected client and elapsed time
  history          show the selected client's sessions
  reset            clear the selected client's history
  save [path]      save the selected client's history as text
  export [path]    export all clients to CSV
  help             show this list
  quit, exit       leave (refused while the timer runs)";

pub struct Session<C: Clock = SystemClock> {
    store: SessionStore,
    timer: TimerController<C>,
}

impl<C: Clock> Session<C> {
    pub fn new(store: SessionStore, timer: TimerController<C>) -> Self {
        Self { store, timer }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn timer(&self) -> &TimerController<C> {
        &self.timer
    }

    /// Runs one command line. Errors are reported through `ui`; the session stays usable.
    pub fn handle(&mut self, line: &str, ui: &mut dyn Prompter) -> Flow {
        match self.dispatch(line, ui) {
            Ok(flow) => flow,
            Err(TrackerError::TimerRunning) => {
                ui.notify_warning("Timer Running", &TrackerError::TimerRunning.to_string());
                Flow::Continue
            }
            Err(e) => {
                ui.notify_error("Error", &e.to_string());
                Flow::Continue
            }
        }
    }

    /// Input ended. A running timer is stopped so its session is kept.
    pub fn finish(&mut self, ui: &mut dyn Prompter) {
        if !self.timer.is_running() {
            return;
        }
        ui.notify_warning("Timer Running", "Input closed; stopping the timer.");
        let client = self.timer.active_client().unwrap_or_default().to_string();
        match self.timer.stop(&mut self.store) {
            Ok(record) => {
                let n = self.store.history(&client).map_or(0, <[_]>::len);
                ui.notify_info("Stopped", &record.history_line(n));
            }
            Err(e) => ui.notify_error("Error", &e.to_string()),
        }
    }

    fn dispatch(&mut self, line: &str, ui: &mut dyn Prompter) -> Result<Flow> {
        let line = line.trim();
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, rest)) => (c, Some(rest.trim()).filter(|a| !a.is_empty())),
            None => (line, None),
        };
        match cmd {
            "" => {}
            "clients" | "list" => self.list_clients(ui),
            "add" => self.add_client(arg, ui)?,
            "remove" => self.remove_client(arg, ui)?,
            "select" => self.select_client(arg, ui)?,
            "start" => self.start(ui)?,
            "stop" => self.stop(ui)?,
            "toggle" => self.toggle(ui)?,
            "status" => self.status(ui),
            "history" => self.show_history(ui)?,
            "reset" => self.reset_history(ui)?,
            "save" => self.save_history(arg, ui)?,
            "export" => self.export_all(arg, ui)?,
            "help" | "?" => ui.display(SESSION_HELP),
            "quit" | "exit" => {
                self.timer.request_close()?;
                return Ok(Flow::Quit);
            }
            other => {
                return Err(TrackerError::Usage(format!(
                    "Unknown command \"{}\". Type help for a list.",
                    other
                )))
            }
        }
        Ok(Flow::Continue)
    }

    fn selected_client(&self) -> Result<String> {
        self.timer
            .selected()
            .map(str::to_string)
            .ok_or(TrackerError::NoClientSelected)
    }

    fn list_clients(&self, ui: &mut dyn Prompter) {
        if self.store.is_empty() {
            ui.display("No clients.");
            return;
        }
        let lines: Vec<String> = self
            .store
            .sessions()
            .iter()
            .map(|(client, records)| {
                let marker = if self.timer.selected() == Some(client.as_str()) { "*" } else { " " };
                format!("{} {} ({} sessions)", marker, client, records.len())
            })
            .collect();
        ui.display(&lines.join("\n"));
    }

    fn add_client(&mut self, arg: Option<&str>, ui: &mut dyn Prompter) -> Result<()> {
        let name = match arg {
            Some(a) => a.to_string(),
            None => match ui.prompt_text("Add Client", "Enter client name:") {
                Some(n) => n,
                None => return Ok(()),
            },
        };
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        self.store.add_client(name)?;
        ui.notify_info("Added", name);
        Ok(())
    }

    fn remove_client(&mut self, arg: Option<&str>, ui: &mut dyn Prompter) -> Result<()> {
        let client = match arg {
            Some(a) => a.to_string(),
            None => self
                .timer
                .selected()
                .map(str::to_string)
                .ok_or_else(|| TrackerError::Usage("Please select a client to remove.".to_string()))?,
        };
        if !self.store.contains(&client) {
            return Err(TrackerError::UnknownClient(client));
        }
        if !ui.confirm(
            "Confirm Removal",
            &format!("Are you sure you want to remove '{}'?", client),
        ) {
            return Ok(());
        }
        self.timer.forget_client(&client);
        self.store.remove_client(&client)?;
        ui.notify_info("Removed", &client);
        Ok(())
    }

    fn select_client(&mut self, arg: Option<&str>, ui: &mut dyn Prompter) -> Result<()> {
        let client = arg.ok_or_else(|| TrackerError::Usage("Usage: select <name>".to_string()))?;
        if !self.store.contains(client) {
            return Err(TrackerError::UnknownClient(client.to_string()));
        }
        match self.timer.select_client(client, ui, &mut self.store)? {
            Selection::Switched { stopped } => {
                if let Some(record) = stopped {
                    ui.notify_info("Stopped", &record.duration_text());
                }
                ui.notify_info("Current Client", client);
                self.show_history(ui)?;
            }
            Selection::Kept => {
                if let Some(kept) = self.timer.selected() {
                    ui.notify_info("Current Client", kept);
                }
            }
        }
        Ok(())
    }

    fn start(&mut self, ui: &mut dyn Prompter) -> Result<()> {
        self.timer.start_selected()?;
        self.report_started(ui)
    }

    fn report_started(&self, ui: &mut dyn Prompter) -> Result<()> {
        if let TimerState::Running { client, start } = self.timer.state() {
            ui.notify_info("Started", &format!("{} at {}", client, start.format("%H:%M:%S")));
        }
        Ok(())
    }

    fn toggle(&mut self, ui: &mut dyn Prompter) -> Result<()> {
        match self.timer.toggle(&mut self.store)? {
            Some(record) => {
                ui.notify_info("Stopped", &record.duration_text());
                self.show_history(ui)
            }
            None => self.report_started(ui),
        }
    }

    fn stop(&mut self, ui: &mut dyn Prompter) -> Result<()> {
        let record = self.timer.stop(&mut self.store)?;
        ui.notify_info("Stopped", &record.duration_text());
        self.show_history(ui)
    }

    fn status(&self, ui: &mut dyn Prompter) {
        let client = self.timer.selected().unwrap_or("No client selected");
        let elapsed = self.timer.elapsed().unwrap_or_else(TimeDelta::zero);
        let state = if self.timer.is_running() { "running" } else { "stopped" };
        ui.display(&format!("{}  {}  ({})", client, format_duration(elapsed), state));
    }

    fn show_history(&self, ui: &mut dyn Prompter) -> Result<()> {
        let client = self.selected_client()?;
        let records = self.store.history(&client).unwrap_or_default();
        if records.is_empty() {
            ui.display(&format!("No sessions for {}.", client));
            return Ok(());
        }
        let lines: Vec<String> = records
            .iter()
            .enumerate()
            .map(|(i, r)| r.history_line(i + 1))
            .collect();
        ui.display(&lines.join("\n"));
        Ok(())
    }

    fn reset_history(&mut self, ui: &mut dyn Prompter) -> Result<()> {
        let client = self.selected_client()?;
        if !ui.confirm(
            "Reset History",
            &format!("Are you sure you want to reset history for '{}'?", client),
        ) {
            return Ok(());
        }
        self.store.reset_history(&client)?;
        self.show_history(ui)
    }

    fn save_history(&mut self, arg: Option<&str>, ui: &mut dyn Prompter) -> Result<()> {
        let client = self.selected_client()?;
        let path = match arg {
            Some(a) => with_default_extension(a, TEXT_FILES),
            None => match ui.choose_save_file(TEXT_FILES) {
                Some(p) => p,
                None => return Ok(()),
            },
        };
        let records = self.store.history(&client).unwrap_or_default();
        export::save_history_text(&path, &client, records)?;
        ui.notify_info("Saved", &format!("History saved to {}", path.display()));
        Ok(())
    }

    fn export_all(&mut self, arg: Option<&str>, ui: &mut dyn Prompter) -> Result<()> {
        let path = match arg {
            Some(a) => with_default_extension(a, CSV_FILES),
            None => match ui.choose_save_file(CSV_FILES) {
                Some(p) => p,
                None => return Ok(()),
            },
        };
        export::export_csv(&path, self.store.sessions())?;
        ui.notify_info("Exported", &format!("All session data saved to {}", path.display()));
        Ok(())
    }
}
