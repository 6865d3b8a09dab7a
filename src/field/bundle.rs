//! Bundle: named members serialized back to back.
//!
//! One integer member may be designated the bundle's remaining length: its value is the
//! serialized length of every member after it. On read the later members are bounded by that
//! length. Trailing bytes inside that region that no member reads are kept verbatim and written
//! back after the members; on write the length is derived from the members plus that tail.

use super::{take, Field, IntField, Member};
use crate::error::{CodecError, DefinitionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct BundleField {
    members: Vec<Member>,
    remaining_length: Option<usize>,
    trailing: Vec<u8>,
}

impl BundleField {
    pub fn new(members: Vec<Member>) -> Self {
        BundleField {
            members,
            remaining_length: None,
            trailing: Vec::new(),
        }
    }

    /// Designate member `idx` (an integer) as the length of everything after it.
    pub fn with_remaining_length(
        mut self,
        idx: usize,
    ) -> std::result::Result<Self, DefinitionError> {
        match self.members.get(idx) {
            Some(Member {
                field: Field::Int(_),
                ..
            }) => {
                self.remaining_length = Some(idx);
                self.refresh();
                Ok(self)
            }
            Some(m) => Err(DefinitionError::Invalid(format!(
                "remaining length member `{}` must be an integer",
                m.name
            ))),
            None => Err(DefinitionError::Invalid(format!(
                "remaining length member index {} out of range",
                idx
            ))),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn remaining_length_index(&self) -> Option<usize> {
        self.remaining_length
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

    pub fn member_at(&self, idx: usize) -> Option<&Field> {
        self.members.get(idx).map(|m| &m.field)
    }

    /// Bytes of the remaining-length region that followed the last member on read.
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    pub fn clear_trailing(&mut self) {
        self.trailing.clear();
    }

    fn tail_length(&self, idx: usize) -> usize {
        self.members[idx + 1..]
            .iter()
            .map(|m| m.field.length())
            .sum::<usize>()
            + self.trailing.len()
    }

    fn length_member(&self) -> Option<(usize, &IntField)> {
        let idx = self.remaining_length?;
        self.members.get(idx)?.field.as_int().map(|f| (idx, f))
    }

    /// Recompute the remaining-length member (after refreshing members). Returns true on change.
    pub fn refresh(&mut self) -> bool {
        let mut changed = self
            .members
            .iter_mut()
            .fold(false, |changed, m| m.field.refresh() || changed);
        if let Some(idx) = self.remaining_length {
            let tail = self.tail_length(idx) as i64;
            if let Some(f) = self.members[idx].field.as_int_mut() {
                if f.value() != tail {
                    f.set_value(tail);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Members bounded by the remaining length never run past it.
    pub fn reads_to_end(&self) -> bool {
        let head = self.remaining_length.map_or(self.members.len(), |idx| idx + 1);
        self.members[..head].iter().any(|m| m.field.reads_to_end())
    }

    pub fn valid(&self) -> bool {
        self.members.iter().all(|m| m.field.valid())
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        let split = match self.remaining_length {
            Some(idx) => idx + 1,
            None => self.members.len(),
        };
        for m in &mut self.members[..split] {
            m.field.read(src)?;
        }
        let Some((_, len_field)) = self.length_member() else {
            return Ok(());
        };
        let len = len_field.value();
        if len < 0 {
            return Err(CodecError::InvalidMessageData(format!(
                "negative remaining length {}",
                len
            )));
        }
        let mut region = take(src, len as usize)?;
        for m in &mut self.members[split..] {
            m.field
                .read(&mut region)
                .map_err(|e| e.bounded("bundle"))?;
        }
        self.trailing = region.to_vec();
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let Some((idx, len_field)) = self.length_member() else {
            for m in &self.members {
                m.field.write(out)?;
            }
            return Ok(());
        };
        let mut tail = Vec::new();
        for m in &self.members[idx + 1..] {
            m.field.write(&mut tail)?;
        }
        tail.extend_from_slice(&self.trailing);
        for m in &self.members[..idx] {
            m.field.write(out)?;
        }
        let mut len = len_field.clone();
        len.set_value(tail.len() as i64);
        len.write(out)?;
        out.extend_from_slice(&tail);
        Ok(())
    }

    pub fn length(&self) -> usize {
        match self.length_member() {
            Some((idx, len_field)) => {
                let tail = self.tail_length(idx);
                let mut len = len_field.clone();
                len.set_value(tail as i64);
                let head: usize = self.members[..idx].iter().map(|m| m.field.length()).sum();
                head + len.length() + tail
            }
            None => self.members.iter().map(|m| m.field.length()).sum(),
        }
    }

    pub fn min_length(&self) -> usize {
        self.members.iter().map(|m| m.field.min_length()).sum()
    }

    pub fn max_length(&self) -> usize {
        self.members
            .iter()
            .fold(0usize, |acc, m| acc.saturating_add(m.field.max_length()))
    }
}
