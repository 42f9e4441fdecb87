//! Error types for command lexing, resolution, binding, and execution.

use std::fmt;

use crate::core::settings::AccessLevel;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// A quote opened in the input line was never closed.
    UnterminatedQuote { position: usize },
    /// No command matches the given name, alias, or unambiguous prefix.
    UnknownCommand(String),
    /// More than one command shares the typed prefix.
    AmbiguousCommand {
        input: String,
        candidates: Vec<String>,
    },
    /// A required argument is missing or a value failed to coerce.
    Argument { name: String, reason: String },
    /// The session's access level is below the command's required level.
    PermissionDenied {
        command: String,
        required: AccessLevel,
    },
    /// The in-flight operation was interrupted.
    Cancelled,
    /// A handler's own logic failed, e.g. a collaborator call.
    Execution(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnterminatedQuote { position } => {
                write!(f, "unterminated quote at position {position}")
            }
            CommandError::UnknownCommand(name) => write!(f, "unknown command '{name}'"),
            CommandError::AmbiguousCommand { input, candidates } => write!(
                f,
                "ambiguous command '{input}': matches {}",
                candidates.join(", ")
            ),
            CommandError::Argument { name, reason } => {
                write!(f, "argument '{name}': {reason}")
            }
            CommandError::PermissionDenied { command, required } => {
                write!(f, "command '{command}' requires {required} access")
            }
            CommandError::Cancelled => f.write_str("operation cancelled"),
            CommandError::Execution(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for CommandError {}
