use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::common::{SyncCommand, SyncEvent};

use super::colors::rgb;
use super::state::{AppState, Row};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const RESET: &str = "\x1b[0m";

/// Line-based terminal front-end: each entered line is sent, `/refresh`,
/// `/sweep` and `/quit` drive the session directly.
pub struct ChatApp {
    state: AppState,
    username: String,
    my_color: &'static str,
    command_sender: mpsc::Sender<SyncCommand>,
    event_receiver: mpsc::Receiver<SyncEvent>,
}

impl ChatApp {
    pub fn new(
        username: &str,
        my_color: &'static str,
        max_visible_lines: usize,
        command_sender: mpsc::Sender<SyncCommand>,
        event_receiver: mpsc::Receiver<SyncEvent>,
    ) -> Self {
        Self {
            state: AppState::new(max_visible_lines),
            username: username.to_string(),
            my_color,
            command_sender,
            event_receiver,
        }
    }

    pub async fn run(mut self) -> io::Result<()> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        self.redraw()?;

        loop {
            tokio::select! {
                line = input.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_input(line).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                event = self.event_receiver.recv() => {
                    match event {
                        Some(event) => self.handle_sync_event(event),
                        None => break,
                    }
                }
            }
            self.redraw()?;
        }

        self.send_command(SyncCommand::Shutdown).await;
        Ok(())
    }

    /// Returns `false` when the user asked to leave.
    async fn handle_input(&mut self, line: String) -> bool {
        let command = match line.trim() {
            "/quit" => return false,
            "" => return true,
            "/refresh" => SyncCommand::Refresh,
            "/sweep" => SyncCommand::Sweep,
            text => SyncCommand::SendMessage(text.to_string()),
        };
        self.send_command(command).await;
        true
    }

    fn handle_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::MirrorUpdated(lines) => self.state.set_lines(lines),
            SyncEvent::SendStarted(id) => self.state.send_started(id),
            SyncEvent::SendCommitted { id, .. } => {
                self.state.send_finished(&id);
                self.state.clear_status();
            }
            SyncEvent::SendFailed { id, reason } => {
                self.state.send_finished(&id);
                self.state.set_status(format!("message not sent: {reason}"));
            }
            SyncEvent::FetchFailed(reason) => {
                log::warn!("Poll failed: {reason}");
            }
            SyncEvent::Swept { removed } => {
                log::debug!("Cleanup removed {removed} messages");
            }
        }
    }

    async fn send_command(&self, command: SyncCommand) {
        if let Err(err) = self.command_sender.send(command).await {
            log::warn!("Failed to send command to sync session: {err}");
        }
    }

    fn redraw(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write!(out, "{CLEAR_SCREEN}")?;
        out.write_all(render_rows(&self.state.rows(), &self.username, self.my_color).as_bytes())?;
        if let Some(status) = self.state.status_line() {
            writeln!(out, "[{status}]")?;
        }
        out.flush()
    }
}

fn paint(text: &str, color: &str) -> String {
    match rgb(color) {
        Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m{text}{RESET}"),
        None => text.to_string(),
    }
}

/// Renders the window, one terminal line per row.
pub fn render_rows(rows: &[Row], username: &str, my_color: &str) -> String {
    let mut rendered = String::new();
    for row in rows {
        match row {
            Row::Blank => rendered.push('\n'),
            Row::Message(line) => {
                let who = paint(&line.username, line.color);
                rendered.push_str(&format!("{who}: {}\n", line.text));
            }
            Row::Input(text) => {
                let who = paint(username, my_color);
                rendered.push_str(&format!("{who}> {text}\n"));
            }
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DisplayLine;

    #[test]
    fn renders_one_line_per_row_with_colors() {
        let rows = vec![
            Row::Blank,
            Row::Message(DisplayLine {
                id: "1".into(),
                username: "bob".into(),
                text: "hi".into(),
                color: "#81C784",
            }),
            Row::Input("draft".into()),
        ];

        let out = render_rows(&rows, "alice", "#E57373");
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "\x1b[38;2;129;199;132mbob\x1b[0m: hi");
        assert_eq!(lines[2], "\x1b[38;2;229;115;115malice\x1b[0m> draft");
    }

    fn app() -> (ChatApp, mpsc::Receiver<SyncCommand>) {
        let (command_tx, command_rx) = mpsc::channel(4);
        let (_event_tx, event_rx) = mpsc::channel(4);
        (
            ChatApp::new("alice", "#E57373", 6, command_tx, event_rx),
            command_rx,
        )
    }

    #[test]
    fn status_follows_send_events() {
        let (mut app, _commands) = app();

        app.handle_sync_event(SyncEvent::SendStarted("m1".into()));
        app.handle_sync_event(SyncEvent::SendStarted("m2".into()));
        app.handle_sync_event(SyncEvent::SendCommitted {
            id: "m1".into(),
            attempts: 1,
        });
        assert_eq!(app.state.status_line().as_deref(), Some("sending 1..."));

        app.handle_sync_event(SyncEvent::SendFailed {
            id: "m2".into(),
            reason: "lost".into(),
        });
        assert!(!app.state.is_sending());
        assert_eq!(
            app.state.status_line().as_deref(),
            Some("message not sent: lost")
        );
    }

    #[tokio::test]
    async fn typed_line_becomes_send_command() {
        let (mut app, mut commands) = app();

        assert!(app.handle_input("  hello ".into()).await);
        assert!(matches!(
            commands.recv().await,
            Some(SyncCommand::SendMessage(text)) if text == "hello"
        ));
        assert!(!app.handle_input("/quit".into()).await);
    }

    #[test]
    fn unknown_color_renders_plain() {
        assert_eq!(paint("x", "teal"), "x");
    }
}
