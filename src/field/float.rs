//! IEEE 754 floating point field.
//!
//! The raw bit pattern is stored, so re-serializing a decoded value is byte-exact even for NaN
//! payloads. Specials (NaN, infinities, sentinel values) are display names only.

use super::{read_uint, write_uint, Endian};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPrecision {
    F32,
    F64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatField {
    precision: FloatPrecision,
    endian: Endian,
    bits: u64,
    default_bits: u64,
    decimals: u8,
    ranges: Vec<(f64, f64)>,
    specials: Vec<(String, u64)>,
    units: Option<String>,
}

impl FloatField {
    pub fn new(precision: FloatPrecision) -> Self {
        FloatField {
            precision,
            endian: Endian::Big,
            bits: 0,
            default_bits: 0,
            decimals: 6,
            ranges: Vec::new(),
            specials: Vec::new(),
            units: None,
        }
    }

    pub fn f32() -> Self {
        Self::new(FloatPrecision::F32)
    }

    pub fn f64() -> Self {
        Self::new(FloatPrecision::F64)
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn with_default(mut self, v: f64) -> Self {
        self.bits = self.to_bits(v);
        self.default_bits = self.bits;
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_range(mut self, lo: f64, hi: f64) -> Self {
        self.ranges.push((lo.min(hi), lo.max(hi)));
        self
    }

    pub fn with_special(mut self, name: impl Into<String>, v: f64) -> Self {
        let bits = self.to_bits(v);
        self.specials.push((name.into(), bits));
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    fn to_bits(&self, v: f64) -> u64 {
        match self.precision {
            FloatPrecision::F32 => (v as f32).to_bits() as u64,
            FloatPrecision::F64 => v.to_bits(),
        }
    }

    fn from_bits(&self, bits: u64) -> f64 {
        match self.precision {
            FloatPrecision::F32 => f32::from_bits(bits as u32) as f64,
            FloatPrecision::F64 => f64::from_bits(bits),
        }
    }

    pub fn precision(&self) -> FloatPrecision {
        self.precision
    }

    pub fn value(&self) -> f64 {
        self.from_bits(self.bits)
    }

    pub fn set_value(&mut self, v: f64) {
        self.bits = self.to_bits(v);
    }

    pub fn raw_bits(&self) -> u64 {
        self.bits
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn specials(&self) -> &[(String, u64)] {
        &self.specials
    }

    /// Name of the current value if it matches a special (any NaN matches a NaN special).
    pub fn special_name(&self) -> Option<&str> {
        let current = self.value();
        self.specials
            .iter()
            .find(|(_, bits)| {
                *bits == self.bits || (current.is_nan() && self.from_bits(*bits).is_nan())
            })
            .map(|(n, _)| n.as_str())
    }

    pub fn valid(&self) -> bool {
        if self.ranges.is_empty() || self.special_name().is_some() {
            return true;
        }
        let v = self.value();
        self.ranges.iter().any(|&(lo, hi)| lo <= v && v <= hi)
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        self.bits = read_uint(src, self.length(), self.endian)?;
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_uint(out, self.bits, self.length(), self.endian);
        Ok(())
    }

    pub fn length(&self) -> usize {
        match self.precision {
            FloatPrecision::F32 => 4,
            FloatPrecision::F64 => 8,
        }
    }
}
