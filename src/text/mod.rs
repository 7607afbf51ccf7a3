//! The textual mmCIF path: tokenizer plus block interpreter.
//!
//! Two-layer design:
//! - **Tokenizer**: a restartable, line-oriented token stream over the
//!   shared byte buffer, with one-token push-back.
//! - **Interpreter**: the `data_` / `loop_` / variable / save-frame state
//!   machine that routes matched values into the category registry.

mod interpret;
pub(crate) mod tokenize;

pub(crate) use interpret::read_block;
pub(crate) use tokenize::Tokenizer;
