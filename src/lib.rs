//! Streaming reader for mmCIF and BinaryCIF structural-biology files.
//!
//! Both serializations describe the same tabular model: a sequence of data
//! blocks, each holding categories (tables) with named keywords (columns)
//! and rows. This crate reads either form sequentially, delivering the rows
//! of a declared subset of categories to user callbacks while skipping
//! everything else as cheaply as possible. It knows nothing about the
//! meaning of any table; higher layers map rows onto domain objects.
//!
//! Two-layer design:
//! - **Text path**: a restartable line tokenizer plus the
//!   `data_`/`loop_`/save-frame interpreter.
//! - **Binary path**: a streaming msgpack reader, the declarative
//!   encoding-chain decoders, and a row materializer.
//!
//! Both paths share the category registry and the callback contract, so a
//! handler cannot tell which format produced its rows.
//!
//! ```ignore
//! struct Atoms;
//!
//! impl cif_stream::CategoryHandler for Atoms {
//!     fn row(&mut self, row: &cif_stream::Row) -> Result<(), cif_stream::Error> {
//!         println!("x = {:?}", row.get(0).as_f64());
//!         Ok(())
//!     }
//! }
//!
//! let mut reader = cif_stream::Reader::text_file("1abc.cif")?;
//! let cat = reader.register_category("_atom_site", Box::new(Atoms));
//! reader.register_keyword(cat, "Cartn_x", cif_stream::CellType::Str);
//! while reader.read_block()? {}
//! ```

mod binary;
mod buffer;
mod category;
mod error;
mod reader;
mod source;
mod text;

pub use category::{
    CategoryHandle, CategoryHandler, Cell, CellType, Row, UnknownCategoryHook, UnknownKeywordHook,
};
pub use error::Error;
pub use reader::Reader;
pub use source::MaybeGzip;
