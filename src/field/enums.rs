//! Enum field: integer storage plus a (possibly sparse) table of named values.

use super::IntField;
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct EnumField {
    storage: IntField,
    names: Vec<(i64, String)>,
    fail_on_invalid: bool,
}

impl EnumField {
    /// `storage` carries width, signedness, endianness and the default value.
    pub fn new(storage: IntField) -> Self {
        EnumField {
            storage,
            names: Vec::new(),
            fail_on_invalid: false,
        }
    }

    pub fn with_value(mut self, value: i64, name: impl Into<String>) -> Self {
        self.names.push((value, name.into()));
        self
    }

    /// An unknown value on read is a hard `InvalidMessageData` error.
    pub fn fail_on_invalid(mut self) -> Self {
        self.fail_on_invalid = true;
        self
    }

    pub fn with_default(mut self, v: i64) -> Self {
        self.storage = self.storage.with_default(v);
        self
    }

    pub fn value(&self) -> i64 {
        self.storage.value()
    }

    pub fn set_value(&mut self, v: i64) {
        self.storage.set_value(v);
    }

    pub fn names(&self) -> &[(i64, String)] {
        &self.names
    }

    pub fn value_name(&self) -> Option<&str> {
        self.name_of(self.value())
    }

    pub fn name_of(&self, v: i64) -> Option<&str> {
        self.names
            .iter()
            .find(|(x, _)| *x == v)
            .map(|(_, n)| n.as_str())
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.names.iter().find(|(_, n)| n == name).map(|(v, _)| *v)
    }

    pub fn set_by_name(&mut self, name: &str) -> bool {
        match self.value_of(name) {
            Some(v) => {
                self.set_value(v);
                true
            }
            None => false,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.fail_on_invalid
    }

    pub fn storage(&self) -> &IntField {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut IntField {
        &mut self.storage
    }

    pub fn valid(&self) -> bool {
        self.value_name().is_some()
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        self.storage.read(src)?;
        if self.fail_on_invalid && !self.valid() {
            return Err(CodecError::InvalidMessageData(format!(
                "unknown enum value {}",
                self.value()
            )));
        }
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        self.storage.write(out)
    }

    pub fn length(&self) -> usize {
        self.storage.length()
    }

    pub fn min_length(&self) -> usize {
        self.storage.min_length()
    }

    pub fn max_length(&self) -> usize {
        self.storage.max_length()
    }
}
