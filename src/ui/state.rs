use std::collections::HashSet;

use crate::common::DisplayLine;

use super::projector::padding;

/// One row of the fixed-height window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Blank,
    Message(DisplayLine),
    /// The local line being composed; always last.
    Input(String),
}

/// Local front-end state.
pub struct AppState {
    pub lines: Vec<DisplayLine>,
    pub input_text: String,
    pub status: Option<String>,
    /// Ids of sends that have started but not yet resolved.
    pending_sends: HashSet<String>,
    max_visible_lines: usize,
}

impl AppState {
    pub fn new(max_visible_lines: usize) -> Self {
        Self {
            lines: Vec::new(),
            input_text: String::new(),
            status: None,
            pending_sends: HashSet::new(),
            max_visible_lines,
        }
    }

    pub fn set_lines(&mut self, lines: Vec<DisplayLine>) {
        self.lines = lines;
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn send_started(&mut self, id: String) {
        self.pending_sends.insert(id);
    }

    /// Marks a send as resolved, whichever way it went.
    pub fn send_finished(&mut self, id: &str) {
        self.pending_sends.remove(id);
    }

    pub fn is_sending(&self) -> bool {
        !self.pending_sends.is_empty()
    }

    /// Text for the status line: an explicit status wins, otherwise the
    /// sending indicator while any send is in flight.
    pub fn status_line(&self) -> Option<String> {
        match (&self.status, self.is_sending()) {
            (Some(status), _) => Some(status.clone()),
            (None, true) => Some(format!("sending {}...", self.pending_sends.len())),
            (None, false) => None,
        }
    }

    /// Blank rows on top, then messages, then the input line. Always
    /// `max_visible_lines` rows long (at least one, for the input).
    pub fn rows(&self) -> Vec<Row> {
        let shown = self.max_visible_lines.saturating_sub(1);
        let start = self.lines.len().saturating_sub(shown);
        let visible = &self.lines[start..];

        let mut rows = vec![Row::Blank; padding(visible.len(), self.max_visible_lines)];
        rows.extend(visible.iter().cloned().map(Row::Message));
        rows.push(Row::Input(self.input_text.clone()));
        rows
    }
}
