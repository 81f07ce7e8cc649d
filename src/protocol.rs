//! Command protocol shared by the CLI and the line daemon
//!
//! A request is one line of text, `<verb> <argument>`, with the verb matched
//! case-insensitively. The CLI builds [`Request`] values from its arguments;
//! the daemon parses them from the socket with [`Request::parse`].

use std::fmt;

/// One supervisor command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Store a definition from a file path, or from `content` under a name
    Add {
        target: String,
        content: Option<String>,
    },
    /// Delete a stored definition
    Remove { name: String },
    /// Start a unit (no-op if already running)
    Start { name: String },
    /// Stop a unit's process tree
    Stop { name: String },
    /// Report liveness
    Status { name: String },
    /// Relist the units on disk
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("unknown command: {0}")]
    UnknownVerb(String),
}

impl Request {
    /// Parse a request line, without its trailing newline
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::MalformedCommand("empty request".into()));
        }

        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add {
                target: required(verb, arg)?.to_string(),
                content: None,
            }),
            "remove" => Ok(Self::Remove {
                name: single_name(verb, arg)?,
            }),
            "start" => Ok(Self::Start {
                name: single_name(verb, arg)?,
            }),
            "stop" => Ok(Self::Stop {
                name: single_name(verb, arg)?,
            }),
            "status" => Ok(Self::Status {
                name: single_name(verb, arg)?,
            }),
            "daemon-reload" | "reload" => {
                if arg.is_empty() {
                    Ok(Self::Reload)
                } else {
                    Err(ProtocolError::MalformedCommand(format!(
                        "{} takes no argument",
                        verb
                    )))
                }
            }
            _ => Err(ProtocolError::UnknownVerb(verb.to_string())),
        }
    }

    /// Verb as written on the wire
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Status { .. } => "status",
            Self::Reload => "daemon-reload",
        }
    }

    /// The unit (or path) the request is about, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Add { target, .. } => Some(target),
            Self::Remove { name }
            | Self::Start { name }
            | Self::Stop { name }
            | Self::Status { name } => Some(name),
            Self::Reload => None,
        }
    }
}

/// Wire form, without a trailing newline. Inline `add` content is not sent.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{} {}", self.verb(), target),
            None => f.write_str(self.verb()),
        }
    }
}

fn required<'a>(verb: &str, arg: &'a str) -> Result<&'a str, ProtocolError> {
    if arg.is_empty() {
        return Err(ProtocolError::MalformedCommand(format!(
            "{} requires a unit name",
            verb
        )));
    }
    Ok(arg)
}

fn single_name(verb: &str, arg: &str) -> Result<String, ProtocolError> {
    let arg = required(verb, arg)?;
    if arg.contains(char::is_whitespace) {
        return Err(ProtocolError::MalformedCommand(format!(
            "{} takes a single unit name",
            verb
        )));
    }
    Ok(arg.to_string())
}
