//! Optional: one inner field plus a presence mode.
//!
//! The mode is not derived automatically; the owning message reconciles it with its controlling
//! condition (a bitmask bit or the transport version) during refresh and before each read.

use super::Field;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionalMode {
    /// Zero bytes on the wire; the inner field keeps its default.
    Missing,
    /// Always serialized.
    #[default]
    Exists,
    /// Present on read when input remains; written as missing.
    Tentative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalField {
    inner: Box<Field>,
    default_inner: Box<Field>,
    mode: OptionalMode,
}

impl OptionalField {
    pub fn new(inner: impl Into<Field>, mode: OptionalMode) -> Self {
        let inner = Box::new(inner.into());
        OptionalField {
            default_inner: inner.clone(),
            inner,
            mode,
        }
    }

    pub fn mode(&self) -> OptionalMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OptionalMode) {
        self.mode = mode;
    }

    pub fn is_present(&self) -> bool {
        self.mode == OptionalMode::Exists
    }

    /// The inner field when present.
    pub fn field(&self) -> Option<&Field> {
        match self.mode {
            OptionalMode::Exists => Some(&self.inner),
            _ => None,
        }
    }

    /// Inner field regardless of mode.
    pub fn inner(&self) -> &Field {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Field {
        &mut self.inner
    }

    pub fn refresh(&mut self) -> bool {
        self.is_present() && self.inner.refresh()
    }

    pub fn valid(&self) -> bool {
        match self.mode {
            OptionalMode::Exists => self.inner.valid(),
            _ => true,
        }
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        match self.mode {
            OptionalMode::Missing => {
                self.inner = self.default_inner.clone();
                Ok(())
            }
            OptionalMode::Tentative if src.is_empty() => {
                self.inner = self.default_inner.clone();
                self.mode = OptionalMode::Missing;
                Ok(())
            }
            OptionalMode::Tentative | OptionalMode::Exists => {
                self.inner.read(src)?;
                self.mode = OptionalMode::Exists;
                Ok(())
            }
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self.mode {
            OptionalMode::Exists => self.inner.write(out),
            _ => Ok(()),
        }
    }

    pub fn length(&self) -> usize {
        match self.mode {
            OptionalMode::Exists => self.inner.length(),
            _ => 0,
        }
    }

    pub fn min_length(&self) -> usize {
        match self.mode {
            OptionalMode::Exists => self.inner.min_length(),
            _ => 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length()
    }
}
