//! Little-endian binary stream used by model files and component serialization.
//!
//! Strings and vectors are prefixed with their length as `u32`. Vectors of
//! [`Pod`] values are written as raw bytes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bytemuck::Pod;

use crate::error::{RendererError, RendererResult};

/// Upper bound for a single length prefix, guards against corrupt files.
const MAX_ELEMENTS: u32 = 1 << 28;

pub struct FileStreamWriter<W: Write> {
    inner: W,
}

impl FileStreamWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> RendererResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> FileStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write<T: Pod>(&mut self, value: &T) -> RendererResult<()> {
        self.inner.write_all(bytemuck::bytes_of(value))?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> RendererResult<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> RendererResult<()> {
        self.write(&(value as u8))
    }

    pub fn write_str(&mut self, value: &str) -> RendererResult<()> {
        self.write_len(value.len())?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_vec<T: Pod>(&mut self, values: &[T]) -> RendererResult<()> {
        self.write_len(values.len())?;
        self.write_bytes(bytemuck::cast_slice(values))
    }

    fn write_len(&mut self, len: usize) -> RendererResult<()> {
        let len = u32::try_from(len)
            .ok()
            .filter(|len| *len <= MAX_ELEMENTS)
            .ok_or_else(|| RendererError::ModelFormat(format!("length {len} is too large")))?;
        self.write(&len.to_le())
    }

    pub fn flush(&mut self) -> RendererResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct FileStreamReader<R: Read> {
    inner: R,
}

impl FileStreamReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> RendererResult<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> FileStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read<T: Pod>(&mut self) -> RendererResult<T> {
        let mut value = T::zeroed();
        self.inner.read_exact(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> RendererResult<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.inner.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_bool(&mut self) -> RendererResult<bool> {
        Ok(self.read::<u8>()? != 0)
    }

    pub fn read_string(&mut self) -> RendererResult<String> {
        let len = self.read_len()?;
        String::from_utf8(self.read_bytes(len)?)
            .map_err(|e| RendererError::ModelFormat(format!("invalid utf-8 string: {e}")))
    }

    pub fn read_vec<T: Pod>(&mut self) -> RendererResult<Vec<T>> {
        let len = self.read_len()?;
        let mut values = vec![T::zeroed(); len];
        self.inner
            .read_exact(bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    fn read_len(&mut self) -> RendererResult<usize> {
        let len = u32::from_le(self.read::<u32>()?);
        if len > MAX_ELEMENTS {
            return Err(RendererError::ModelFormat(format!(
                "length prefix {len} exceeds {MAX_ELEMENTS}"
            )));
        }
        Ok(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_strings_and_vectors() {
        let mut writer = FileStreamWriter::new(Vec::new());
        writer.write_str("models/cube.fmdl").unwrap();
        writer.write_vec(&[1u32, 2, 3]).unwrap();
        writer.write(&1.5f32).unwrap();
        writer.write_bool(true).unwrap();
        let bytes = writer.into_inner();

        let mut reader = FileStreamReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_string().unwrap(), "models/cube.fmdl");
        assert_eq!(reader.read_vec::<u32>().unwrap(), vec![1, 2, 3]);
        assert_eq!(reader.read::<f32>().unwrap(), 1.5);
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn test_truncated_stream() {
        let mut writer = FileStreamWriter::new(Vec::new());
        writer.write_vec(&[1u32, 2, 3]).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(8);

        let mut reader = FileStreamReader::new(Cursor::new(bytes));
        assert!(matches!(reader.read_vec::<u32>(), Err(RendererError::Io(_))));
    }

    #[test]
    fn test_oversized_length_prefix() {
        let bytes = u32::MAX.to_le_bytes().to_vec();
        let mut reader = FileStreamReader::new(Cursor::new(bytes));
        assert!(matches!(reader.read_string(), Err(RendererError::ModelFormat(_))));
    }
}
