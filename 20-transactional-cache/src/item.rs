//! Records exchanged between the console, the transaction manager and the store.

use serde::{Deserialize, Serialize};

/// One logical key/value record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    pub key: String,
    pub value: String,
}

impl CacheItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Mutation an undo entry replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogCommand {
    Set,
    Unset,
}

/// The inverse of a mutation that was already applied.
///
/// `Set` restores `item.value` under `item.key`; `Unset` deletes `item.key`
/// and ignores `item.value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub command: LogCommand,
    pub item: CacheItem,
}

impl LogEntry {
    /// Undo entry that puts `item` back.
    pub fn restore(item: CacheItem) -> Self {
        Self {
            command: LogCommand::Set,
            item,
        }
    }

    /// Undo entry that deletes a key which did not exist before.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            command: LogCommand::Unset,
            item: CacheItem::new(key, ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_command_uses_uppercase_names_on_the_wire() {
        let entry = LogEntry::delete("k");
        let json = serde_json::to_string(&entry).expect("serialize entry");
        assert_eq!(json, r#"{"command":"UNSET","item":{"key":"k","value":""}}"#);
    }
}
