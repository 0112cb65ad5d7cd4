// src/core/protocol/response.rs

//! The per-command response state machine.
//!
//! A `ResponseState` lives inside the outstanding command. The dispatcher hands
//! it every line that arrives while that command is outstanding; the state
//! machine decides whether the line is a header or body content and reports
//! when the command's result is complete.

use super::header::Header;
use crate::core::MuxError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static RESULT_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(\d+)\] (.*?) \| matches=(\d+)").expect("result row pattern is valid")
});

/// One row of a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultRow {
    Parsed {
        index: u64,
        path: String,
        matches: u64,
    },
    /// A body line that did not match the row pattern, kept verbatim.
    Unparsed { raw: String },
}

impl ResultRow {
    /// Parses `[<index>] <path> | matches=<count>`, falling back to `Unparsed`.
    pub fn parse(line: &str) -> Self {
        let parsed = RESULT_ROW.captures(line).and_then(|caps| {
            let index = caps[1].parse::<u64>().ok()?;
            let matches = caps[3].parse::<u64>().ok()?;
            Some(ResultRow::Parsed {
                index,
                path: caps[2].to_string(),
                matches,
            })
        });
        parsed.unwrap_or_else(|| ResultRow::Unparsed {
            raw: line.to_string(),
        })
    }
}

/// The successful outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The backend had no capacity. Not an error; the caller should retry.
    Busy,
    Results(Vec<ResultRow>),
    Snippets(Vec<String>),
}

/// Selects which body rule applies once the header has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Empty,
    SearchResults,
    Snippets,
}

/// Lifecycle position of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Pending,
    AwaitingHeader,
    AwaitingBody,
    Done,
}

/// What the state machine needs after consuming a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    NeedMore,
    Complete(Result<Reply, MuxError>),
}

#[derive(Debug, Default)]
pub struct ResponseState {
    stage: Stage,
    kind: ResponseKind,
    expected_lines: usize,
    lines: Vec<String>,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn expected_lines(&self) -> usize {
        self.expected_lines
    }

    pub fn collected_lines(&self) -> &[String] {
        &self.lines
    }

    /// Marks the command as written to the backend; the next line is its header.
    pub fn begin(&mut self) {
        self.stage = Stage::AwaitingHeader;
        self.kind = ResponseKind::Empty;
        self.expected_lines = 0;
        self.lines.clear();
    }

    /// Marks the command as finished without consuming any more lines.
    pub fn finish(&mut self) {
        self.stage = Stage::Done;
    }

    pub fn on_line(&mut self, line: &str) -> Step {
        match self.stage {
            Stage::AwaitingHeader => self.on_header(Header::parse(line)),
            Stage::AwaitingBody => self.on_body(line),
            Stage::Pending | Stage::Done => self.complete(Err(MuxError::Protocol(format!(
                "line received for a command that is not outstanding: {line}"
            )))),
        }
    }

    fn on_header(&mut self, header: Header) -> Step {
        match header {
            Header::Busy => self.complete(Ok(Reply::Busy)),
            Header::NotFound => self.complete(Ok(Reply::Results(Vec::new()))),
            Header::Error(line) => self.complete(Err(MuxError::Backend(line))),
            Header::Ok(0) => {
                self.kind = ResponseKind::SearchResults;
                self.complete(Ok(Reply::Results(Vec::new())))
            }
            Header::Ok(count) => {
                debug!("Backend reported {} results", count);
                self.kind = ResponseKind::SearchResults;
                self.expected_lines = count;
                self.lines.reserve(count.min(1024));
                self.stage = Stage::AwaitingBody;
                Step::NeedMore
            }
            Header::SnippetsFound(count) => {
                debug!("Backend reported {} snippets", count);
                self.kind = ResponseKind::Snippets;
                self.expected_lines = 1;
                self.stage = Stage::AwaitingBody;
                Step::NeedMore
            }
            Header::Unknown(line) => {
                self.complete(Err(MuxError::Protocol(format!("unknown header: {line}"))))
            }
        }
    }

    fn on_body(&mut self, line: &str) -> Step {
        match self.kind {
            ResponseKind::SearchResults => {
                self.lines.push(line.to_string());
                if self.lines.len() < self.expected_lines {
                    return Step::NeedMore;
                }
                let rows = self.lines.iter().map(|l| ResultRow::parse(l)).collect();
                self.complete(Ok(Reply::Results(rows)))
            }
            ResponseKind::Snippets => {
                self.lines.push(line.to_string());
                let snippets = split_snippets(line);
                self.complete(Ok(Reply::Snippets(snippets)))
            }
            // A body is only entered after a header set the kind.
            ResponseKind::Empty => self.complete(Ok(Reply::Results(Vec::new()))),
        }
    }

    fn complete(&mut self, result: Result<Reply, MuxError>) -> Step {
        self.stage = Stage::Done;
        Step::Complete(result)
    }
}

/// Splits a snippet body on `;`, dropping empty segments.
pub fn split_snippets(line: &str) -> Vec<String> {
    line.split(';')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
