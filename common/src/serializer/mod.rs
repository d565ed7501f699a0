// Canonical byte serialization.
//
// Every type that participates in hashing or goes over the wire implements
// `Serializer`. The byte layout is the canonical form: content hashes are
// computed over it, so any change here is a consensus change.

mod reader;
mod writer;

pub use reader::{Reader, ReaderError};
pub use writer::Writer;

pub trait Serializer {
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader) -> Result<Self, ReaderError>
    where
        Self: Sized;

    fn size(&self) -> usize {
        self.to_bytes().len()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut writer = Writer::new(&mut bytes);
        self.write(&mut writer);
        bytes
    }

    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        let mut reader = Reader::new(bytes);
        let value = Self::read(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(ReaderError::TrailingBytes(reader.remaining()));
        }
        Ok(value)
    }
}

impl Serializer for bool {
    fn write(&self, writer: &mut Writer) {
        writer.write_bool(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_bool()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u8 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u8()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u16 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u16(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u16()
    }

    fn size(&self) -> usize {
        2
    }
}

impl Serializer for u32 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u32()
    }

    fn size(&self) -> usize {
        4
    }
}

impl Serializer for u64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for String {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_string()
    }
}

// Length-prefixed homogeneous list, u16 length
impl<T: Serializer> Serializer for Vec<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u16(self.len() as u16);
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u16()? as usize;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }

    fn size(&self) -> usize {
        2 + self.iter().map(Serializer::size).sum::<usize>()
    }
}

// Presence byte followed by the value
impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.write(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }

    fn size(&self) -> usize {
        1 + self.as_ref().map(Serializer::size).unwrap_or(0)
    }
}
