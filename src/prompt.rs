// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! The presentation collaborator: everything the tracker asks of the user goes through [`Prompter`].

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// File type offered by [`Prompter::choose_save_file`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileFilter {
    pub description: &'static str,
    /// Default extension including the dot, e.g. `.csv`.
    pub extension: &'static str,
}

pub const TEXT_FILES: FileFilter = FileFilter {
    description: "Text Files",
    extension: ".txt",
};

pub const CSV_FILES: FileFilter = FileFilter {
    description: "CSV Files",
    extension: ".csv",
};

pub trait Prompter {
    /// Free-text question; `None` when cancelled or left blank.
    fn prompt_text(&mut self, title: &str, message: &str) -> Option<String>;
    /// Yes/no question.
    fn confirm(&mut self, title: &str, message: &str) -> bool;
    fn notify_error(&mut self, title: &str, message: &str);
    fn notify_warning(&mut self, title: &str, message: &str);
    fn notify_info(&mut self, title: &str, message: &str);
    /// Asks for a destination path; the filter's extension is appended when the answer has none.
    fn choose_save_file(&mut self, filter: FileFilter) -> Option<PathBuf>;
    /// Rendered text (client list, history, timer readout).
    fn display(&mut self, text: &str);
}

/// Appends `filter.extension` if `answer` has no extension.
pub fn with_default_extension(answer: &str, filter: FileFilter) -> PathBuf {
    let path = PathBuf::from(answer);
    if path.extension().is_some() {
        path
    } else {
        PathBuf::from(format!("{}{}", answer, filter.extension))
    }
}

/// Line-oriented prompter: questions and messages go to `output`, answers come from `input`.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `prompt` and reads one line without its line ending; `Ok(None)` at end of input.
    /// A line that is not valid UTF-8 is consumed and reported as `ErrorKind::InvalidData`.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let _ = write!(self.output, "{}", prompt);
        let _ = self.output.flush();
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Answer to a question; unreadable input counts as no answer.
    fn answer(&mut self, prompt: &str) -> Option<String> {
        match self.read_line(prompt) {
            Ok(answer) => answer,
            Err(e) => {
                self.message("Error", &format!("could not read answer: {}", e));
                None
            }
        }
    }

    fn message(&mut self, title: &str, message: &str) {
        let _ = writeln!(self.output, "{}: {}", title, message);
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn prompt_text(&mut self, title: &str, message: &str) -> Option<String> {
        let answer = self.answer(&format!("{}: {} ", title, message))?;
        let answer = answer.trim();
        if answer.is_empty() {
            None
        } else {
            Some(answer.to_string())
        }
    }

    fn confirm(&mut self, title: &str, message: &str) -> bool {
        self.answer(&format!("{}: {} (y/n) ", title, message))
            .map(|a| {
                let a = a.trim();
                a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes")
            })
            .unwrap_or(false)
    }

    fn notify_error(&mut self, title: &str, message: &str) {
        self.message(title, message);
    }

    fn notify_warning(&mut self, title: &str, message: &str) {
        self.message(title, message);
    }

    fn notify_info(&mut self, title: &str, message: &str) {
        self.message(title, message);
    }

    fn choose_save_file(&mut self, filter: FileFilter) -> Option<PathBuf> {
        let prompt = format!("Save as ({}, *{}): ", filter.description, filter.extension);
        let answer = self.answer(&prompt)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }
        Some(with_default_extension(answer, filter))
    }

    fn display(&mut self, text: &str) {
        let _ = writeln!(self.output, "{}", text);
    }
}

/// Prompter with canned answers that records everything shown to it.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedPrompter {
    pub texts: std::collections::VecDeque<Option<String>>,
    pub confirms: std::collections::VecDeque<bool>,
    pub save_paths: std::collections::VecDeque<Option<PathBuf>>,
    pub errors: Vec<(String, String)>,
    pub warnings: Vec<(String, String)>,
    pub infos: Vec<(String, String)>,
    pub shown: Vec<String>,
    pub questions: Vec<String>,
}

#[cfg(test)]
impl Prompter for ScriptedPrompter {
    fn prompt_text(&mut self, title: &str, _message: &str) -> Option<String> {
        self.questions.push(title.to_string());
        self.texts.pop_front().flatten()
    }

    fn confirm(&mut self, title: &str, _message: &str) -> bool {
        self.questions.push(title.to_string());
        self.confirms.pop_front().unwrap_or(false)
    }

    fn notify_error(&mut self, title: &str, message: &str) {
        self.errors.push((title.to_string(), message.to_string()));
    }

    fn notify_warning(&mut self, title: &str, message: &str) {
        self.warnings.push((title.to_string(), message.to_string()));
    }

    fn notify_info(&mut self, title: &str, message: &str) {
        self.infos.push((title.to_string(), message.to_string()));
    }

    fn choose_save_file(&mut self, _filter: FileFilter) -> Option<PathBuf> {
        self.save_paths.pop_front().flatten()
    }

    fn display(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}
