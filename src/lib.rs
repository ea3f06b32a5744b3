//! Decoder for MongoDB Full-Time Diagnostic Data Capture (FTDC) files.
//!
//! An FTDC file is a sequence of BSON-framed records (§3): metadata
//! documents and metric chunks. Each metric chunk holds a BSON reference
//! sample plus a zlib-compressed, varint/RLE-encoded delta matrix that
//! reconstructs every subsequent sample in the chunk by running sum.
//!
//! [`Reader`] drives the whole pipeline; the component modules below can
//! also be used standalone for anything that only needs a piece of it.

pub mod chunk;
pub mod delta;
pub mod error;
pub mod reader;
pub mod record;
pub mod sample;
pub mod scalar;
pub mod schema_diff;
pub mod varint;

pub use chunk::{decode_chunk, Chunk};
pub use error::{FtdcError, Result};
pub use reader::{Chunks, DocType, FramedRecord, FramedRecords, Reader, Samples};
pub use record::{Metric, OriginalType};
pub use sample::reconstruct_sample;
pub use schema_diff::{diff_schema, SchemaDiff, TypeChange};
