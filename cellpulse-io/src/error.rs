//! Stack and export error types.

use thiserror::Error;

/// Result type for cellpulse-io operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reading or writing footage stacks and tables.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with the stack magic.
    #[error("not a footage stack: missing CPFS header")]
    BadMagic,

    /// A header dimension is zero.
    #[error("empty stack: {width}x{height} with {frames} frames")]
    EmptyStack {
        /// Stored width.
        width: usize,
        /// Stored height.
        height: usize,
        /// Stored frame count.
        frames: usize,
    },

    /// The file length disagrees with the header. `expected` is `None` when
    /// the header describes more bytes than fit in `usize`.
    #[error("stack length mismatch: header needs {}, file has {found} bytes",
        expected.map_or_else(|| "too many bytes".to_string(), |n| format!("{n} bytes")))]
    LengthMismatch {
        /// Length implied by the header.
        expected: Option<usize>,
        /// Actual file length.
        found: usize,
    },

    /// A footage dimension does not fit the `u32` header field.
    #[error("{name} {value} does not fit in a stack header")]
    DimensionOverflow {
        /// Which dimension.
        name: &'static str,
        /// Offending value.
        value: usize,
    },

    /// Frame or footage construction failed.
    #[error("core error: {0}")]
    Core(#[from] cellpulse_core::Error),
}
