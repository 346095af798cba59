//! Memory-mapped footage readers.
//!

use crate::{Error, Result, HEADER_LEN, MAGIC};
use cellpulse_core::{Footage, Frame};
use log::debug;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Dimensions stored in a stack header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackHeader {
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Number of frames.
    pub frames: usize,
}

impl StackHeader {
    /// Parses and checks the header against the total file length.
    ///
    /// # Errors
    /// Returns [`Error::BadMagic`], [`Error::EmptyStack`] or
    /// [`Error::LengthMismatch`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        let field = |i: usize| {
            let start = 4 + 4 * i;
            let raw = [bytes[start], bytes[start + 1], bytes[start + 2], bytes[start + 3]];
            u32::from_le_bytes(raw) as usize
        };
        let header = Self {
            width: field(0),
            height: field(1),
            frames: field(2),
        };
        if header.width == 0 || header.height == 0 || header.frames == 0 {
            return Err(Error::EmptyStack {
                width: header.width,
                height: header.height,
                frames: header.frames,
            });
        }
        let expected = header
            .width
            .checked_mul(header.height)
            .and_then(|n| n.checked_mul(4 * header.frames))
            .and_then(|n| n.checked_add(HEADER_LEN));
        if expected != Some(bytes.len()) {
            return Err(Error::LengthMismatch {
                expected,
                found: bytes.len(),
            });
        }
        Ok(header)
    }

    /// Bytes occupied by one frame.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.width * self.height * 4
    }
}

/// Reads footage stacks.
pub struct FootageReader {
    reader: MappedFileReader,
    header: StackHeader,
}

impl FootageReader {
    /// Opens a stack and validates its header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or is not a stack.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let header = StackHeader::parse(reader.as_bytes())?;
        Ok(Self { reader, header })
    }

    /// Stack dimensions.
    #[must_use]
    pub fn header(&self) -> StackHeader {
        self.header
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Decodes a single frame, `None` if `index` is out of range.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be built from the stored values.
    pub fn frame(&self, index: usize) -> Result<Option<Frame>> {
        if index >= self.header.frames {
            return Ok(None);
        }
        self.decode(index).map(Some)
    }

    /// Decodes every frame in parallel.
    ///
    /// # Errors
    /// Returns an error if the decoded frames do not form valid footage.
    pub fn read_footage(&self) -> Result<Footage> {
        let frames: Vec<Frame> = (0..self.header.frames)
            .into_par_iter()
            .map(|i| self.decode(i))
            .collect::<Result<_>>()?;
        debug!(
            "decoded {} frames of {}x{} from {}",
            frames.len(),
            self.header.width,
            self.header.height,
            self.reader.path().display()
        );
        Ok(Footage::new(frames)?)
    }

    fn decode(&self, index: usize) -> Result<Frame> {
        let size = self.header.frame_bytes();
        let start = HEADER_LEN + index * size;
        let values = self.reader.as_bytes()[start..start + size]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Frame::new(self.header.width, self.header.height, values)?)
    }
}
