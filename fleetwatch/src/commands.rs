//! Remote command console: validates outbound `command` frames and keeps the
//! history of `command_show` results.

use chrono::{DateTime, Utc};

use crate::types::{CommandRequest, CommandResult, Server};
use crate::validate::FieldError;

pub const COMMAND_HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    pub server_code: String,
    pub server_name: String,
    pub command: String,
    pub result: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CommandConsole {
    history: Vec<CommandRecord>,
    pending: Option<CommandRequest>,
}

impl CommandConsole {
    /// Build the outbound frame, or say which field is wrong.
    pub fn submit(
        &mut self,
        roster: &[Server],
        server_code: &str,
        command: &str,
    ) -> Result<CommandRequest, FieldError> {
        let command = command.trim();
        if server_code.is_empty() || command.is_empty() {
            return Err(FieldError::new(
                "command",
                "select a server and enter a command",
            ));
        }
        if !roster.iter().any(|s| s.code == server_code) {
            return Err(FieldError::new(
                "server",
                format!("unknown server '{server_code}'"),
            ));
        }
        let req = CommandRequest {
            server_code: server_code.to_string(),
            command: command.to_string(),
            timestamp: Utc::now(),
        };
        self.pending = Some(req.clone());
        Ok(req)
    }

    pub fn is_executing(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a result. Results for servers not in the roster clear the
    /// pending flag but are not kept.
    pub fn on_result(&mut self, roster: &[Server], result: CommandResult) -> bool {
        self.pending = None;
        let Some(server) = roster.iter().find(|s| s.code == result.server_code) else {
            return false;
        };
        self.history.insert(
            0,
            CommandRecord {
                server_code: server.code.clone(),
                server_name: server.name.clone(),
                command: result.command,
                result: result.result,
                received_at: Utc::now(),
            },
        );
        self.history.truncate(COMMAND_HISTORY_CAP);
        true
    }

    /// Newest first.
    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }
}
