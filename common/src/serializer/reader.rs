use thiserror::Error;

use crate::crypto::{Hash, HASH_SIZE};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Not enough bytes: requested {requested}, remaining {remaining}")]
    NotEnoughBytes { requested: usize, remaining: usize },

    #[error("Invalid value while decoding")]
    InvalidValue,

    #[error("Invalid UTF-8 string")]
    InvalidString,

    #[error("{0} trailing bytes left after decoding")]
    TrailingBytes(usize),
}

// Cursor over an immutable byte slice
pub struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn total_read(&self) -> usize {
        self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ReaderError> {
        if self.remaining() < count {
            return Err(ReaderError::NotEnoughBytes {
                requested: count,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes(bytes.try_into().expect("2 bytes")))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4 bytes")))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReaderError> {
        Ok(self.take(count)?.to_vec())
    }

    pub fn read_bytes_32(&mut self) -> Result<[u8; 32], ReaderError> {
        let bytes = self.take(32)?;
        Ok(bytes.try_into().expect("32 bytes"))
    }

    pub fn read_bytes_64(&mut self) -> Result<[u8; 64], ReaderError> {
        let bytes = self.take(64)?;
        Ok(bytes.try_into().expect("64 bytes"))
    }

    pub fn read_hash(&mut self) -> Result<Hash, ReaderError> {
        let bytes = self.take(HASH_SIZE)?;
        Ok(Hash::new(bytes.try_into().expect("hash size")))
    }

    // u32 length prefix, UTF-8 payload
    pub fn read_string(&mut self) -> Result<String, ReaderError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReaderError::InvalidString)
    }

    // u32 length prefix, raw payload
    pub fn read_byte_blob(&mut self) -> Result<Vec<u8>, ReaderError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }
}
