// src/core/protocol/header.rs

//! Classification of the first line of a backend response, and of the greeting
//! line sent right after a connection is accepted.

pub const BUSY_MARKER: &str = "SERVER_BUSY";
pub const NOT_FOUND_MARKER: &str = "NOT_FOUND";
pub const ERROR_PREFIX: &str = "ERROR";
pub const OK_PREFIX: &str = "OK:";
pub const SNIPPETS_PREFIX: &str = "SNIPPETS_FOUND:";
pub const WELCOME_PREFIX: &str = "Welcome";

/// A parsed response header. Parsed once at the wire boundary and matched on
/// exhaustively everywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Busy,
    NotFound,
    /// The complete `ERROR...` line.
    Error(String),
    /// `OK:<N>`, N result rows follow.
    Ok(usize),
    /// `SNIPPETS_FOUND:<N>`, one `;`-separated line follows regardless of N.
    SnippetsFound(usize),
    Unknown(String),
}

impl Header {
    pub fn parse(line: &str) -> Self {
        if line == BUSY_MARKER {
            Header::Busy
        } else if line == NOT_FOUND_MARKER {
            Header::NotFound
        } else if line.starts_with(ERROR_PREFIX) {
            Header::Error(line.to_string())
        } else if let Some(rest) = line.strip_prefix(OK_PREFIX) {
            Header::Ok(parse_count(rest))
        } else if let Some(rest) = line.strip_prefix(SNIPPETS_PREFIX) {
            Header::SnippetsFound(parse_count(rest))
        } else {
            Header::Unknown(line.to_string())
        }
    }
}

/// The first line the backend sends on a fresh connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Greeting {
    /// No free slot: the backend parked this connection in its waiting queue.
    Busy,
    Welcome(String),
    Other(String),
}

impl Greeting {
    pub fn parse(line: &str) -> Self {
        if line == BUSY_MARKER {
            Greeting::Busy
        } else if line.starts_with(WELCOME_PREFIX) {
            Greeting::Welcome(line.to_string())
        } else {
            Greeting::Other(line.to_string())
        }
    }
}

/// Parses the count that follows a header prefix.
///
/// Only the leading run of digits is considered (`"12 files"` is 12), after an
/// optional `+`. Malformed, negative, or overflowing input yields 0 instead of
/// failing, so that a garbled count cannot desynchronize the stream.
pub fn parse_count(rest: &str) -> usize {
    let trimmed = rest.trim_start();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<usize>().unwrap_or(0)
}
