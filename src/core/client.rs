// src/core/client.rs

//! The typed request interface offered to callers (the HTTP facade, tests, or
//! any embedding application). Validates input before anything is queued and
//! maps raw replies onto per-operation outcomes.

use crate::core::MuxError;
use crate::core::connection::{ConnectionState, MuxHandle};
use crate::core::protocol::{Reply, ResultRow};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// Outcome of a search. Busy is distinct from an empty result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Busy,
    Results(Vec<ResultRow>),
}

/// Outcome of a snippet lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetOutcome {
    Busy,
    Snippets(Vec<String>),
}

impl SearchOutcome {
    pub fn is_busy(&self) -> bool {
        matches!(self, SearchOutcome::Busy)
    }
}

impl SnippetOutcome {
    pub fn is_busy(&self) -> bool {
        matches!(self, SnippetOutcome::Busy)
    }
}

// Busy serializes as `{"status":"busy"}`, results as `{"results":[...]}`.
impl Serialize for SearchOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            SearchOutcome::Busy => map.serialize_entry("status", "busy")?,
            SearchOutcome::Results(rows) => map.serialize_entry("results", rows)?,
        }
        map.end()
    }
}

impl Serialize for SnippetOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            SnippetOutcome::Busy => map.serialize_entry("status", "busy")?,
            SnippetOutcome::Snippets(snippets) => map.serialize_entry("snippets", snippets)?,
        }
        map.end()
    }
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    handle: MuxHandle,
}

impl SearchClient {
    pub fn new(handle: MuxHandle) -> Self {
        Self { handle }
    }

    pub fn backend_state(&self) -> ConnectionState {
        self.handle.state()
    }

    pub fn handle(&self) -> &MuxHandle {
        &self.handle
    }

    /// Runs `search <query>` against the backend.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, MuxError> {
        let command = search_command(query)?;
        match self.handle.submit(command).await?.await? {
            Reply::Busy => Ok(SearchOutcome::Busy),
            Reply::Results(rows) => Ok(SearchOutcome::Results(rows)),
            Reply::Snippets(_) => Err(MuxError::Protocol(
                "backend answered a search with snippets".to_string(),
            )),
        }
    }

    /// Runs `getsnippet <index>` against the backend.
    pub async fn get_snippets(&self, index: u64) -> Result<SnippetOutcome, MuxError> {
        match self.handle.submit(snippet_command(index)).await?.await? {
            Reply::Busy => Ok(SnippetOutcome::Busy),
            Reply::Snippets(snippets) => Ok(SnippetOutcome::Snippets(snippets)),
            // `NOT_FOUND` parses as an empty result set.
            Reply::Results(rows) if rows.is_empty() => Ok(SnippetOutcome::Snippets(Vec::new())),
            Reply::Results(_) => Err(MuxError::Protocol(
                "backend answered a snippet request with search results".to_string(),
            )),
        }
    }
}

/// Builds the `search` command line, rejecting blank or multi-line queries.
pub fn search_command(query: &str) -> Result<String, MuxError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(MuxError::Validation("Query is required".to_string()));
    }
    if query.contains(['\n', '\r']) {
        return Err(MuxError::Validation(
            "Query must be a single line".to_string(),
        ));
    }
    Ok(format!("search {query}"))
}

pub fn snippet_command(index: u64) -> String {
    format!("getsnippet {index}")
}
