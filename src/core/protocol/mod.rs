// src/core/protocol/mod.rs

pub mod header;
pub mod line_codec;
pub mod response;

pub use header::{Greeting, Header};
pub use line_codec::LineCodec;
pub use response::{Reply, ResponseKind, ResponseState, ResultRow, Stage, Step};
