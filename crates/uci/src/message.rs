//! Messages written by an engine.

use crate::info::EngineInfo;

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// An option the engine supports. Only the name is kept.
    Option { name: String },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// End of a search. `mv` is `None` when the engine reports `(none)`,
    /// which happens in checkmate and stalemate positions.
    BestMove { mv: Option<String>, ponder: Option<String> },
    /// Anything else, kept for logging.
    Unknown(String),
}

impl EngineMessage {
    /// Parse one line of engine output. Never fails: lines the codec does
    /// not understand come back as [`EngineMessage::Unknown`].
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next().unwrap_or("") {
            "uciok" => EngineMessage::UciOk,
            "readyok" => EngineMessage::ReadyOk,
            "info" => match EngineInfo::parse(line) {
                Some(info) => EngineMessage::Info(info),
                None => EngineMessage::Unknown(line.to_string()),
            },
            "bestmove" => {
                let mv = parts
                    .next()
                    .filter(|m| *m != "(none)" && *m != "0000")
                    .map(|m| m.to_string());
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(|p| p.to_string()),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            "id" => {
                let rest: Vec<&str> = parts.collect();
                match rest.split_first() {
                    Some((&"name", value)) => EngineMessage::Id {
                        name: Some(value.join(" ")),
                        author: None,
                    },
                    Some((&"author", value)) => EngineMessage::Id {
                        name: None,
                        author: Some(value.join(" ")),
                    },
                    _ => EngineMessage::Unknown(line.to_string()),
                }
            }
            "option" => {
                // option name <words...> type <t> ...
                let rest: Vec<&str> = parts.collect();
                if rest.first() != Some(&"name") {
                    return EngineMessage::Unknown(line.to_string());
                }
                let name: Vec<&str> = rest[1..]
                    .iter()
                    .take_while(|w| **w != "type")
                    .copied()
                    .collect();
                if name.is_empty() {
                    EngineMessage::Unknown(line.to_string())
                } else {
                    EngineMessage::Option {
                        name: name.join(" "),
                    }
                }
            }
            _ => EngineMessage::Unknown(line.to_string()),
        }
    }
}
