//! UCI command formatting.

use crate::UciError;

/// Commands sent from the GUI side to an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Start UCI mode.
    Uci,
    /// Ask for a `readyok`.
    IsReady,
    /// Set an engine option. Only valid while the engine is idle.
    SetOption { name: String, value: Option<String> },
    /// Tell the engine the next search belongs to a different game.
    UciNewGame,
    /// Set up a position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start searching.
    Go(GoOptions),
    /// Stop the current search.
    Stop,
    /// Exit the engine.
    Quit,
}

/// Limits for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search to this depth.
    pub depth: Option<u32>,
    /// Search for at most this many milliseconds.
    pub movetime: Option<u64>,
}

impl EngineCommand {
    /// Builds a `setoption` command.
    ///
    /// Option names may contain spaces but never the word `value`, which the
    /// protocol uses as the separator.
    pub fn set_option(name: &str, value: impl ToString) -> Result<Self, UciError> {
        let name = name.trim();
        if name.is_empty() || name.split_whitespace().any(|w| w == "value") {
            return Err(UciError::InvalidCommand(format!(
                "invalid option name '{}'",
                name
            )));
        }
        Ok(EngineCommand::SetOption {
            name: name.to_string(),
            value: Some(value.to_string()),
        })
    }

    /// Format the command as a single protocol line (no trailing newline).
    pub fn to_uci(&self) -> String {
        match self {
            EngineCommand::Uci => "uci".to_string(),
            EngineCommand::IsReady => "isready".to_string(),
            EngineCommand::SetOption { name, value } => match value {
                Some(v) => format!("setoption name {} value {}", name, v),
                None => format!("setoption name {}", name),
            },
            EngineCommand::UciNewGame => "ucinewgame".to_string(),
            EngineCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(f) => format!("position fen {}", f),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            EngineCommand::Go(opts) => opts.to_uci(),
            EngineCommand::Stop => "stop".to_string(),
            EngineCommand::Quit => "quit".to_string(),
        }
    }
}

impl GoOptions {
    /// Limits for a depth search capped by a time budget.
    ///
    /// Engines stop at whichever limit is hit first.
    pub fn depth_and_time(depth: u32, movetime_ms: u64) -> Self {
        Self {
            depth: Some(depth),
            movetime: (movetime_ms > 0).then_some(movetime_ms),
        }
    }

    fn to_uci(&self) -> String {
        let mut parts = vec!["go".to_string()];
        if let Some(d) = self.depth {
            parts.push(format!("depth {}", d));
        }
        if let Some(t) = self.movetime {
            parts.push(format!("movetime {}", t));
        }
        parts.join(" ")
    }
}
