//! The BinaryCIF path: msgpack object reader, encoding-chain parser,
//! decoder pipeline, and row materializer.
//!
//! Layered design, innermost first:
//! - **msgpack**: streaming primitives over the shared byte buffer.
//! - **encoding**: the declarative transform chains attached to columns.
//! - **decode**: the pipeline that applies a chain to recover typed vectors.
//! - **read**: the block driver tying it all to the category registry.

mod decode;
mod encoding;
mod msgpack;
mod read;

pub(crate) use read::{read_block, read_header};
