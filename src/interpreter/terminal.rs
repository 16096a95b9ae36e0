// Captured program output

use crate::ast::SourceLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// Terminal shared between the worker (writer) and the host (reader)
pub type SharedTerminal = Arc<Mutex<MockTerminal>>;

/// Mock terminal for capturing printf output
#[derive(Debug, Clone, Default)]
pub struct MockTerminal {
    pub lines: Vec<TerminalLine>,
}

impl MockTerminal {
    pub fn new() -> Self {
        MockTerminal { lines: Vec::new() }
    }

    pub fn shared() -> SharedTerminal {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Print without newline. Output from the same source line is merged.
    pub fn print(&mut self, text: String, location: Option<SourceLocation>) {
        if let Some(last) = self.lines.last_mut() {
            if last.location == location {
                last.text.push_str(&text);
                return;
            }
        }
        self.lines.push(TerminalLine { text, location });
    }

    /// Everything printed so far, as one string
    pub fn contents(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    /// Get all lines as a vector of strings
    pub fn get_output(&self) -> Vec<String> {
        let mut result: Vec<String> = self
            .contents()
            .split('\n')
            .map(|s| s.to_string())
            .collect();
        // Remove trailing empty string if text ended with newline
        if result.last().is_some_and(|s| s.is_empty()) {
            result.pop();
        }
        result
    }
}

/// A chunk of terminal output with the statement that produced it
#[derive(Debug, Clone)]
pub struct TerminalLine {
    pub text: String,
    pub location: Option<SourceLocation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merges_prints_from_same_statement() {
        let mut term = MockTerminal::new();
        let here = Some(SourceLocation::new(3, 1));
        term.print("a".to_string(), here);
        term.print("b\n".to_string(), here);
        term.print("c\n".to_string(), Some(SourceLocation::new(4, 1)));
        assert_eq!(term.lines.len(), 2);
        assert_eq!(term.get_output(), vec!["ab".to_string(), "c".to_string()]);
    }

    #[test]
    fn split_lines_across_prints() {
        let mut term = MockTerminal::new();
        term.print("x".to_string(), Some(SourceLocation::new(1, 1)));
        term.print("y\nz".to_string(), Some(SourceLocation::new(2, 1)));
        assert_eq!(term.get_output(), vec!["xy".to_string(), "z".to_string()]);
        assert_eq!(term.contents(), "xy\nz");
    }
}
