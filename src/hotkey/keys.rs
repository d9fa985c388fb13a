//! Keyboard commands read from the terminal
//!
//! A bare Enter toggles recording, `a`/`abort` aborts and `q`/`quit` exits.

/// A recognised line of keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    /// Start recording if idle, stop it if recording
    Toggle,
    /// Abort the task in flight
    Abort,
    /// Shut the daemon down
    Quit,
}

impl KeyCommand {
    /// Parse one input line; `None` for anything unrecognised
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => Some(KeyCommand::Toggle),
            "a" | "abort" => Some(KeyCommand::Abort),
            "q" | "quit" | "exit" => Some(KeyCommand::Quit),
            _ => None,
        }
    }
}
