//! Bitfield: several integer/enum/bitmask members packed into one storage integer.
//!
//! Members occupy consecutive bit ranges in declaration order, least significant bits first.
//! The member widths must add up to exactly the storage width.

use super::{mask, read_uint, write_uint, Endian, Field};
use crate::error::{DefinitionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct BitMember {
    pub name: String,
    pub bits: u32,
    pub field: Field,
}

impl BitMember {
    pub fn new(name: impl Into<String>, bits: u32, field: impl Into<Field>) -> Self {
        BitMember {
            name: name.into(),
            bits,
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitfieldField {
    bytes: usize,
    endian: Endian,
    members: Vec<BitMember>,
}

impl BitfieldField {
    pub fn new(
        name: &str,
        bytes: usize,
        endian: Endian,
        members: Vec<BitMember>,
    ) -> std::result::Result<Self, DefinitionError> {
        if !(1..=8).contains(&bytes) {
            return Err(DefinitionError::Invalid(format!(
                "bitfield `{}`: storage must be 1..=8 bytes, got {}",
                name, bytes
            )));
        }
        if let Some(m) = members.iter().find(|m| !m.field.is_bit_packable()) {
            return Err(DefinitionError::Invalid(format!(
                "bitfield `{}`: member `{}` must be an integer, enum or bitmask",
                name, m.name
            )));
        }
        if let Some(m) = members.iter().find(|m| m.bits == 0) {
            return Err(DefinitionError::Invalid(format!(
                "bitfield `{}`: member `{}` has zero width",
                name, m.name
            )));
        }
        let used: u32 = members.iter().map(|m| m.bits).sum();
        let declared = bytes as u32 * 8;
        if used != declared {
            return Err(DefinitionError::BitWidthMismatch {
                name: name.to_string(),
                used,
                declared,
            });
        }
        Ok(BitfieldField {
            bytes,
            endian,
            members,
        })
    }

    pub fn members(&self) -> &[BitMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Field> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.field)
    }

    pub fn member_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.members
            .iter_mut()
            .find(|m| m.name == name)
            .map(|m| &mut m.field)
    }

    pub fn valid(&self) -> bool {
        self.members.iter().all(|m| m.field.valid())
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        let raw = read_uint(src, self.bytes, self.endian)?;
        let mut pos = 0u32;
        for m in &mut self.members {
            let slice = (raw >> pos) & mask(m.bits);
            m.field.set_from_bits(slice, m.bits);
            pos += m.bits;
        }
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut raw = 0u64;
        let mut pos = 0u32;
        for m in &self.members {
            raw |= m.field.to_bits(m.bits) << pos;
            pos += m.bits;
        }
        write_uint(out, raw, self.bytes, self.endian);
        Ok(())
    }

    pub fn length(&self) -> usize {
        self.bytes
    }
}
