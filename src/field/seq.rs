//! Byte sequences (raw data and strings) and the size policies shared with lists.

use super::{take, IntField};
use crate::error::{CodecError, Result};
use std::borrow::Cow;

/// How the number of elements (or bytes) of a sequence is determined on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum SizePrefix {
    /// Everything up to the end of the bounded input.
    Remainder,
    /// Compile-time element count.
    Fixed(usize),
    /// Leading element count.
    Count(IntField),
    /// Leading total serialized length in bytes.
    Length(IntField),
}

impl SizePrefix {
    pub(crate) fn prefix_field(&self) -> Option<&IntField> {
        match self {
            SizePrefix::Count(f) | SizePrefix::Length(f) => Some(f),
            _ => None,
        }
    }

    /// Read the prefix (if any) and return its value.
    pub(crate) fn read_prefix(&mut self, src: &mut &[u8]) -> Result<Option<usize>> {
        match self {
            SizePrefix::Count(f) | SizePrefix::Length(f) => {
                f.read(src)?;
                let v = f.value();
                if v < 0 {
                    return Err(CodecError::InvalidMessageData(format!(
                        "negative sequence size {}",
                        v
                    )));
                }
                Ok(Some(v as usize))
            }
            _ => Ok(None),
        }
    }

    pub(crate) fn write_prefix(&self, n: usize, out: &mut Vec<u8>) -> Result<()> {
        match self.prefix_field() {
            Some(f) => {
                let mut p = f.clone();
                p.set_value(n as i64);
                p.write(out)
            }
            None => Ok(()),
        }
    }

    pub(crate) fn prefix_length(&self, n: usize) -> usize {
        match self.prefix_field() {
            Some(f) => {
                let mut p = f.clone();
                p.set_value(n as i64);
                p.length()
            }
            None => 0,
        }
    }

    pub(crate) fn min_prefix_length(&self) -> usize {
        self.prefix_field().map(IntField::min_length).unwrap_or(0)
    }
}

/// Raw byte array.
#[derive(Debug, Clone, PartialEq)]
pub struct BytesField {
    size: SizePrefix,
    data: Vec<u8>,
}

impl BytesField {
    pub fn new(size: SizePrefix) -> Self {
        let data = match size {
            SizePrefix::Fixed(n) => vec![0; n],
            _ => Vec::new(),
        };
        BytesField { size, data }
    }

    pub fn with_default(mut self, data: Vec<u8>) -> Self {
        self.set(data);
        self
    }

    pub fn size(&self) -> &SizePrefix {
        &self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set(&mut self, data: Vec<u8>) {
        self.data = data;
        if let SizePrefix::Fixed(n) = self.size {
            self.data.resize(n, 0);
        }
    }

    pub fn valid(&self) -> bool {
        match &self.size {
            SizePrefix::Fixed(n) => self.data.len() == *n,
            _ => true,
        }
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        let n = match &self.size {
            SizePrefix::Fixed(n) => *n,
            SizePrefix::Remainder => src.len(),
            _ => self.size.read_prefix(src)?.unwrap_or(0),
        };
        self.data = take(src, n)?.to_vec();
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        if let SizePrefix::Fixed(n) = self.size {
            let used = self.data.len().min(n);
            out.extend_from_slice(&self.data[..used]);
            out.resize(out.len() + (n - used), 0);
            return Ok(());
        }
        self.size.write_prefix(self.data.len(), out)?;
        out.extend_from_slice(&self.data);
        Ok(())
    }

    pub fn length(&self) -> usize {
        match self.size {
            SizePrefix::Fixed(n) => n,
            _ => self.size.prefix_length(self.data.len()) + self.data.len(),
        }
    }

    pub fn min_length(&self) -> usize {
        match self.size {
            SizePrefix::Fixed(n) => n,
            _ => self.size.min_prefix_length(),
        }
    }

    pub fn max_length(&self) -> usize {
        match self.size {
            SizePrefix::Fixed(n) => n,
            _ => usize::MAX,
        }
    }
}

/// Text field; bytes are kept verbatim, the string view stops at the first NUL.
#[derive(Debug, Clone, PartialEq)]
pub struct StringField {
    bytes: BytesField,
}

impl StringField {
    pub fn new(size: SizePrefix) -> Self {
        StringField {
            bytes: BytesField::new(size),
        }
    }

    pub fn with_default(mut self, s: &str) -> Self {
        self.set(s);
        self
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        let data = self.bytes.data();
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..end])
    }

    pub fn raw(&self) -> &[u8] {
        self.bytes.data()
    }

    pub fn set(&mut self, s: &str) {
        self.bytes.set(s.as_bytes().to_vec());
    }

    pub fn size(&self) -> &SizePrefix {
        self.bytes.size()
    }

    pub fn valid(&self) -> bool {
        self.bytes.valid() && std::str::from_utf8(self.bytes.data()).is_ok()
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        self.bytes.read(src)
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.bytes.write(out)
    }

    pub fn length(&self) -> usize {
        self.bytes.length()
    }

    pub fn min_length(&self) -> usize {
        self.bytes.min_length()
    }

    pub fn max_length(&self) -> usize {
        self.bytes.max_length()
    }
}

/// Opaque bytes: the whole remaining input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnknownField {
    data: Vec<u8>,
}

impl UnknownField {
    pub fn new(data: Vec<u8>) -> Self {
        UnknownField { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        self.data = src.to_vec();
        *src = &src[src.len()..];
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&self.data);
        Ok(())
    }

    pub fn length(&self) -> usize {
        self.data.len()
    }
}
