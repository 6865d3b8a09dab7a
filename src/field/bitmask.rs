//! Bitmask field: fixed-length integer read as named bits with a reserved-bit pattern.

use super::{mask, read_uint, write_uint, Endian};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskField {
    bytes: usize,
    endian: Endian,
    value: u64,
    default: u64,
    reserved_mask: u64,
    reserved_value: u64,
    bits: Vec<(u32, String)>,
    fail_on_reserved: bool,
}

impl BitmaskField {
    pub fn new(bytes: usize) -> Self {
        BitmaskField {
            bytes: bytes.clamp(1, 8),
            endian: Endian::Big,
            value: 0,
            default: 0,
            reserved_mask: 0,
            reserved_value: 0,
            bits: Vec::new(),
            fail_on_reserved: false,
        }
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_default(mut self, v: u64) -> Self {
        self.default = v;
        self.value = v;
        self
    }

    pub fn with_bit(mut self, idx: u32, name: impl Into<String>) -> Self {
        self.bits.push((idx, name.into()));
        self
    }

    /// Bits under `mask` must equal `value`; otherwise the field is invalid.
    pub fn with_reserved(mut self, mask: u64, value: u64) -> Self {
        self.reserved_mask = mask;
        self.reserved_value = value & mask;
        self
    }

    /// A reserved-bit violation on read is a hard error instead of a soft invalid mark.
    pub fn fail_on_reserved(mut self) -> Self {
        self.fail_on_reserved = true;
        self
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn set_value(&mut self, v: u64) {
        self.value = v & mask(self.bytes as u32 * 8);
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn bit(&self, idx: u32) -> bool {
        idx < 64 && (self.value >> idx) & 1 != 0
    }

    pub fn set_bit(&mut self, idx: u32, on: bool) {
        if idx >= self.bytes as u32 * 8 {
            return;
        }
        if on {
            self.value |= 1 << idx;
        } else {
            self.value &= !(1 << idx);
        }
    }

    pub fn bit_names(&self) -> &[(u32, String)] {
        &self.bits
    }

    pub fn bit_index(&self, name: &str) -> Option<u32> {
        self.bits.iter().find(|(_, n)| n == name).map(|(i, _)| *i)
    }

    pub fn bit_name(&self, idx: u32) -> Option<&str> {
        self.bits
            .iter()
            .find(|(i, _)| *i == idx)
            .map(|(_, n)| n.as_str())
    }

    pub fn reserved(&self) -> (u64, u64) {
        (self.reserved_mask, self.reserved_value)
    }

    pub fn valid(&self) -> bool {
        self.value & self.reserved_mask == self.reserved_value
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        self.value = read_uint(src, self.bytes, self.endian)?;
        if self.fail_on_reserved && !self.valid() {
            return Err(CodecError::InvalidMessageData(format!(
                "reserved bits violated in bitmask {:#x}",
                self.value
            )));
        }
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_uint(out, self.value, self.bytes, self.endian);
        Ok(())
    }

    pub fn length(&self) -> usize {
        self.bytes
    }
}
