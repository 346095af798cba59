//! cellpulse-io: footage stacks and tabular export for cellpulse.
//!
//! Footage is stored as a raw stack: the magic `CPFS`, then width, height
//! and frame count as little-endian `u32`, then every frame's `f32` values
//! in row-major order. Stacks are read through memmap2 and decoded in
//! parallel by frame index.
//!

mod error;
mod reader;
mod table;
mod writer;

pub use error::{Error, Result};
pub use reader::{FootageReader, MappedFileReader, StackHeader};
pub use table::TableWriter;
pub use writer::FootageWriter;

/// Leading bytes of a footage stack.
pub const MAGIC: [u8; 4] = *b"CPFS";

/// Size of the stack header in bytes.
pub const HEADER_LEN: usize = 16;
