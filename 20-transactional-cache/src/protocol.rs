//! Line-oriented console grammar.
//!
//! Each line is one command of one to three whitespace-separated words. The
//! command word is case-insensitive; keys and values are kept verbatim.

use anyhow::{Result, anyhow, bail};

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Set { key: String, value: String },
    Get { key: String },
    Unset { key: String },
    NumEqualTo { value: String },
    Begin,
    Commit,
    Rollback,
    End,
}

impl ConsoleCommand {
    /// Parses one line of input.
    ///
    /// The error message is what the console prints back, e.g.
    /// `SET needs three arguments` or `invalid command`.
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() || parts.len() > 3 {
            bail!("invalid command");
        }

        let command = parts[0].to_ascii_lowercase();
        match (command.as_str(), parts.as_slice()) {
            ("set", [_, key, value]) => Ok(ConsoleCommand::Set {
                key: key.to_string(),
                value: value.to_string(),
            }),
            ("set", _) => Err(anyhow!("SET needs three arguments")),
            ("get", [_, key]) => Ok(ConsoleCommand::Get {
                key: key.to_string(),
            }),
            ("get", _) => Err(anyhow!("GET needs two arguments")),
            ("unset", [_, key]) => Ok(ConsoleCommand::Unset {
                key: key.to_string(),
            }),
            ("unset", _) => Err(anyhow!("UNSET needs two arguments")),
            ("numequalto", [_, value]) => Ok(ConsoleCommand::NumEqualTo {
                value: value.to_string(),
            }),
            ("numequalto", _) => Err(anyhow!("NUMEQUALTO needs two arguments")),
            ("begin", [_]) => Ok(ConsoleCommand::Begin),
            ("begin", _) => Err(anyhow!("BEGIN needs one argument only")),
            ("commit", [_]) => Ok(ConsoleCommand::Commit),
            ("commit", _) => Err(anyhow!("COMMIT needs one argument only")),
            ("rollback", [_]) => Ok(ConsoleCommand::Rollback),
            ("rollback", _) => Err(anyhow!("ROLLBACK needs one argument only")),
            // END ignores trailing words.
            ("end", _) => Ok(ConsoleCommand::End),
            _ => Err(anyhow!("invalid command")),
        }
    }
}
