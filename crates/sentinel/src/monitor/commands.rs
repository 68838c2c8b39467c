//! Operator input.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SentinelError;

/// A line typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Approve the proposal of the incident matching the id prefix
    Approve(String),
    /// Dismiss the proposal of the incident matching the id prefix
    Ignore(String),
    /// Stop generating log records
    Pause,
    /// Resume generating log records
    Resume,
    /// Print the aggregate status
    Status,
    /// Print every incident
    List,
    /// Print the command summary
    Help,
    /// Stop the monitor
    Quit,
}

/// Usage text for interactive sessions.
pub const COMMAND_HELP: &str = "commands: approve <id>, ignore <id>, pause, resume, status, list, help, quit";

impl FromStr for OperatorCommand {
    type Err = SentinelError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(SentinelError::Command("empty input".to_string()));
        };
        let argument = words.next();
        if words.next().is_some() {
            return Err(SentinelError::Command(format!("too many arguments: {line}")));
        }

        let needs_id = |make: fn(String) -> Self| {
            argument
                .map(|id| make(id.to_string()))
                .ok_or_else(|| SentinelError::Command(format!("{verb} needs an incident id")))
        };

        match (verb.to_ascii_lowercase().as_str(), argument) {
            ("approve" | "a", _) => needs_id(Self::Approve),
            ("ignore" | "i", _) => needs_id(Self::Ignore),
            ("pause", None) => Ok(Self::Pause),
            ("resume", None) => Ok(Self::Resume),
            ("status", None) => Ok(Self::Status),
            ("list" | "ls", None) => Ok(Self::List),
            ("help" | "?", None) => Ok(Self::Help),
            ("quit" | "exit" | "q", None) => Ok(Self::Quit),
            (_, Some(_)) if matches!(verb, "pause" | "resume" | "status" | "list" | "help" | "quit") => {
                Err(SentinelError::Command(format!("{verb} takes no arguments")))
            }
            _ => Err(SentinelError::Command(format!("unknown command '{verb}'"))),
        }
    }
}

/// What to do with an incident once its proposal arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    /// Wait for an operator command
    #[default]
    Manual,
    /// Approve every proposal
    AutoApprove,
    /// Ignore every proposal
    AutoIgnore,
}

impl fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::AutoApprove => "auto-approve",
            Self::AutoIgnore => "auto-ignore",
        })
    }
}
