// src/core/protocol/line_codec.rs

//! Implements the newline-delimited framing used by the search backend, as a
//! `tokio_util` `Encoder`/`Decoder` pair plus a push-style `feed` API.

use crate::core::MuxError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const LF: u8 = b'\n';
const CR: u8 = b'\r';

/// Splits a byte stream into `\n`-terminated lines.
///
/// The codec is stateful: a partial line at the end of one chunk stays in the
/// internal buffer until the rest of it arrives. No length limit is enforced.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Bytes pushed through `feed` that do not yet form a complete line.
    pending: BytesMut,
    /// Offset into the buffer already scanned for a terminator, so that a long
    /// partial line is not rescanned from the start on every chunk.
    scanned: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes an arbitrary chunk of bytes and returns every line it completed.
    ///
    /// Zero lines is a valid outcome; a trailing partial line is retained for the
    /// next call and never emitted here.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(line) = self.next_line(&mut pending) {
            lines.push(line);
        }
        self.pending = pending;
        lines
    }

    /// Number of bytes currently held back as an incomplete line.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// Pops one complete line off the front of `src`, if there is one.
    fn next_line(&mut self, src: &mut BytesMut) -> Option<String> {
        let start = self.scanned.min(src.len());
        match src[start..].iter().position(|b| *b == LF) {
            Some(offset) => {
                let end = start + offset;
                let mut line = &src[..end];
                if line.last() == Some(&CR) {
                    line = &line[..line.len() - 1];
                }
                let text = String::from_utf8_lossy(line).into_owned();
                src.advance(end + 1);
                self.scanned = 0;
                Some(text)
            }
            None => {
                self.scanned = src.len();
                None
            }
        }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = MuxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.next_line(src))
    }

    /// A dangling partial line at end of stream is dropped, never emitted.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.next_line(src) {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            tracing::debug!(
                "Discarding {} bytes of unterminated input at end of stream",
                src.len()
            );
            src.clear();
            self.scanned = 0;
        }
        Ok(None)
    }
}

/// Only `String` items are encoded, so `Framed<_, LineCodec>` is a `Sink` of
/// exactly one item type.
impl Encoder<String> for LineCodec {
    type Error = MuxError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.bytes().any(|b| b == LF || b == CR) {
            return Err(MuxError::Validation(
                "command text must not contain line terminators".to_string(),
            ));
        }
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(&[LF]);
        Ok(())
    }
}
