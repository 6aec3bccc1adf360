//! Command definitions
//!
//! Represents the one-byte commands a client sends during a session.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Close = b'0',
    Shutdown = b'1',
    Upload = b'2',
}

/// A parsed command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// End the session with a confirmation
    Close,

    /// End the session without a confirmation
    Shutdown,

    /// A frame carrying an artifact follows
    Upload,

    /// Unrecognized byte, ignored
    Noop { byte: u8 },
}

impl Command {
    /// Interpret a command byte. Never fails: unknown bytes are `Noop`.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' => Command::Close,
            b'1' => Command::Shutdown,
            b'2' => Command::Upload,
            other => Command::Noop { byte: other },
        }
    }

    /// Get the command type (None for `Noop`)
    pub fn command_type(&self) -> Option<CommandType> {
        match self {
            Command::Close => Some(CommandType::Close),
            Command::Shutdown => Some(CommandType::Shutdown),
            Command::Upload => Some(CommandType::Upload),
            Command::Noop { .. } => None,
        }
    }

    /// Wire byte for this command
    pub fn to_byte(&self) -> u8 {
        match self {
            Command::Noop { byte } => *byte,
            other => other.command_type().map(|t| t as u8).unwrap_or_default(),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Command::Noop { .. })
    }
}
