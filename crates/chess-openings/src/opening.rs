//! Named opening lines.

use serde::{Deserialize, Serialize};

/// A named opening and the moves that define it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    /// ECO code, e.g. "C50".
    #[serde(default)]
    pub eco: Option<String>,
    pub name: String,
    /// Moves from the starting position in UCI notation.
    pub moves: Vec<String>,
}

impl Opening {
    #[must_use]
    pub fn new(name: impl Into<String>, moves: Vec<String>) -> Self {
        Self {
            eco: None,
            name: name.into(),
            moves,
        }
    }

    #[must_use]
    pub fn with_eco(mut self, eco: impl Into<String>) -> Self {
        self.eco = Some(eco.into());
        self
    }

    /// Display name including the ECO code when known.
    pub fn label(&self) -> String {
        match &self.eco {
            Some(eco) => format!("{} ({})", self.name, eco),
            None => self.name.clone(),
        }
    }

    /// First move that is not well-formed UCI, if any.
    pub fn first_malformed_move(&self) -> Option<&str> {
        self.moves
            .iter()
            .map(String::as_str)
            .find(|mv| !is_uci_move(mv))
    }
}

/// Shape check for a UCI move such as `e2e4` or `e7e8q`.
pub fn is_uci_move(mv: &str) -> bool {
    let bytes = mv.as_bytes();
    let square = |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank);
    match bytes.len() {
        4 => square(bytes[0], bytes[1]) && square(bytes[2], bytes[3]),
        5 => {
            square(bytes[0], bytes[1])
                && square(bytes[2], bytes[3])
                && matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        let opening = Opening::new("Italian Game", vec!["e2e4".to_string()]).with_eco("C50");
        assert_eq!(opening.label(), "Italian Game (C50)");
        assert_eq!(Opening::new("Unnamed", vec![]).label(), "Unnamed");
    }

    #[test]
    fn test_uci_shape() {
        assert!(is_uci_move("e2e4"));
        assert!(is_uci_move("a7a8q"));
        assert!(!is_uci_move("e2e9"));
        assert!(!is_uci_move("Nf3"));
        assert!(!is_uci_move("e7e8k"));
        assert!(!is_uci_move(""));
    }

    #[test]
    fn test_first_malformed_move() {
        let opening = Opening::new("Broken", vec!["e2e4".to_string(), "e5".to_string()]);
        assert_eq!(opening.first_malformed_move(), Some("e5"));
    }
}
