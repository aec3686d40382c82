use thiserror::Error;

/// Errors raised while decoding data read from the settlement layer:
/// coordinate tickets, ABI words and identities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid coordinate token '{0}'")]
    InvalidToken(String),

    #[error("Expected {expected} coordinates, got {got}")]
    WrongTokenCount { expected: usize, got: usize },

    #[error("Duplicate coordinate {0} in ticket")]
    DuplicateCoordinate(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hex data: {0}")]
    InvalidHex(String),

    #[error("ABI data too short: need {needed} bytes at offset {offset}, have {len}")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Integer overflow: value does not fit in {0} bits")]
    Overflow(u32),

    #[error("Invalid boolean word")]
    InvalidBool,

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("Unknown function selector 0x{0}")]
    UnknownSelector(String),

    #[error("Length mismatch: {participants} participants but {tickets} tickets")]
    LengthMismatch { participants: usize, tickets: usize },

    #[error("Entry count {count} disagrees with {entries} fetched entries")]
    CountMismatch { count: u64, entries: usize },
}
