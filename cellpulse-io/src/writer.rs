//! Footage stack writer.

use crate::{Error, Result, MAGIC};
use cellpulse_core::Footage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes footage in the stack format read by [`crate::FootageReader`].
pub struct FootageWriter {
    writer: BufWriter<File>,
}

impl FootageWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes the header followed by every frame.
    ///
    /// # Errors
    /// Returns an error if a dimension does not fit in `u32` or the write
    /// fails.
    pub fn write_footage(&mut self, footage: &Footage) -> Result<()> {
        let dims = [
            ("width", footage.width()),
            ("height", footage.height()),
            ("frame count", footage.len()),
        ];
        let mut header = MAGIC.to_vec();
        for (name, value) in dims {
            let value =
                u32::try_from(value).map_err(|_| Error::DimensionOverflow { name, value })?;
            header.extend_from_slice(&value.to_le_bytes());
        }
        self.writer.write_all(&header)?;
        for frame in footage {
            for v in frame.as_slice() {
                self.writer.write_all(&v.to_le_bytes())?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HEADER_LEN;
    use cellpulse_core::Frame;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_footage_layout() {
        let file = NamedTempFile::new().unwrap();
        let footage = Footage::new(vec![
            Frame::filled(3, 2, 0.5),
            Frame::filled(3, 2, 1.0),
        ])
        .unwrap();
        FootageWriter::create(file.path())
            .unwrap()
            .write_footage(&footage)
            .unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), HEADER_LEN + 2 * 3 * 2 * 4);
        assert_eq!(&data[..4], b"CPFS");
        assert_eq!(&data[4..8], &3u32.to_le_bytes());
        assert_eq!(&data[12..16], &2u32.to_le_bytes());
        assert_eq!(&data[16..20], &0.5f32.to_le_bytes());
    }
}
