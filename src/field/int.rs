//! Integer field: fixed N-byte or base-128 var-length, with serialization offset, scaling,
//! valid ranges and named special values.

use super::{read_uint, sign_extend, take, write_uint, Endian};
use crate::error::{CodecError, Result};

/// Serialized width of an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    /// Exactly N bytes (1..=8).
    Fixed(usize),
    /// 7 bits per byte, high bit set on every byte but the last; between `min` and `max` bytes.
    Var { min: usize, max: usize },
}

const MAX_VAR_BYTES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct IntField {
    width: IntWidth,
    signed: bool,
    endian: Endian,
    value: i64,
    default: i64,
    offset: i64,
    scaling: Option<(i64, i64)>,
    ranges: Vec<(i64, i64)>,
    specials: Vec<(String, i64)>,
    units: Option<String>,
    fail_on_invalid: bool,
}

impl IntField {
    fn with_width(width: IntWidth, signed: bool) -> Self {
        IntField {
            width,
            signed,
            endian: Endian::Big,
            value: 0,
            default: 0,
            offset: 0,
            scaling: None,
            ranges: Vec::new(),
            specials: Vec::new(),
            units: None,
            fail_on_invalid: false,
        }
    }

    /// Fixed-width unsigned integer of `bytes` (clamped to 1..=8) bytes.
    pub fn unsigned(bytes: usize) -> Self {
        Self::with_width(IntWidth::Fixed(bytes.clamp(1, 8)), false)
    }

    /// Fixed-width two's complement integer of `bytes` (clamped to 1..=8) bytes.
    pub fn signed(bytes: usize) -> Self {
        Self::with_width(IntWidth::Fixed(bytes.clamp(1, 8)), true)
    }

    pub fn var_unsigned(min: usize, max: usize) -> Self {
        Self::with_width(Self::var_width(min, max), false)
    }

    pub fn var_signed(min: usize, max: usize) -> Self {
        Self::with_width(Self::var_width(min, max), true)
    }

    fn var_width(min: usize, max: usize) -> IntWidth {
        let min = min.clamp(1, MAX_VAR_BYTES);
        IntWidth::Var {
            min,
            max: max.clamp(min, MAX_VAR_BYTES),
        }
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Default (and current) value.
    pub fn with_default(mut self, v: i64) -> Self {
        self.default = v;
        self.value = v;
        self
    }

    /// Serialized as `value + offset`.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Stored integer represents `value * num / den`.
    pub fn with_scaling(mut self, num: i64, den: i64) -> Self {
        if num != 0 && den != 0 {
            self.scaling = Some((num, den));
        }
        self
    }

    /// Add an inclusive valid range. With no ranges declared every value is valid.
    pub fn with_range(mut self, lo: i64, hi: i64) -> Self {
        self.ranges.push((lo.min(hi), lo.max(hi)));
        self
    }

    /// Named special value; counts as valid even outside the declared ranges.
    pub fn with_special(mut self, name: impl Into<String>, v: i64) -> Self {
        self.specials.push((name.into(), v));
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Reading an invalid value fails with `InvalidMessageData` instead of marking it invalid.
    pub fn fail_on_invalid(mut self) -> Self {
        self.fail_on_invalid = true;
        self
    }

    pub fn width(&self) -> IntWidth {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn set_value(&mut self, v: i64) {
        self.value = v;
    }

    pub fn default_value(&self) -> i64 {
        self.default
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn scaling(&self) -> Option<(i64, i64)> {
        self.scaling
    }

    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }

    pub fn specials(&self) -> &[(String, i64)] {
        &self.specials
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Name of the current value if it is a declared special.
    pub fn special_name(&self) -> Option<&str> {
        self.specials
            .iter()
            .find(|(_, v)| *v == self.value)
            .map(|(n, _)| n.as_str())
    }

    pub fn scaled(&self) -> f64 {
        match self.scaling {
            Some((num, den)) => self.value as f64 * num as f64 / den as f64,
            None => self.value as f64,
        }
    }

    pub fn set_scaled(&mut self, x: f64) {
        self.value = match self.scaling {
            Some((num, den)) => (x * den as f64 / num as f64).round() as i64,
            None => x.round() as i64,
        };
    }

    pub fn valid(&self) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        self.ranges
            .iter()
            .any(|&(lo, hi)| lo <= self.value && self.value <= hi)
            || self.specials.iter().any(|(_, v)| *v == self.value)
    }

    /// Value as it goes on the wire (offset applied).
    pub(crate) fn wire_value(&self) -> i64 {
        self.value.wrapping_add(self.offset)
    }

    /// Set from `bits` raw wire bits (sign-extended for signed fields).
    pub(crate) fn set_wire_bits(&mut self, raw: u64, bits: u32) {
        let wire = if self.signed {
            sign_extend(raw, bits)
        } else {
            raw as i64
        };
        self.value = wire.wrapping_sub(self.offset);
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        match self.width {
            IntWidth::Fixed(n) => {
                let raw = read_uint(src, n, self.endian)?;
                self.set_wire_bits(raw, n as u32 * 8);
            }
            IntWidth::Var { max, .. } => self.read_var(src, max)?,
        }
        if self.fail_on_invalid && !self.valid() {
            return Err(CodecError::InvalidMessageData(format!(
                "integer value {} outside valid ranges",
                self.value
            )));
        }
        Ok(())
    }

    /// Only the encoding `write` would produce is accepted, so decoded values re-encode byte-exact.
    fn read_var(&mut self, src: &mut &[u8], max: usize) -> Result<()> {
        let start = *src;
        let mut acc = 0u64;
        let mut count = 0usize;
        loop {
            if count == max {
                return Err(CodecError::InvalidMessageData(format!(
                    "var-length integer longer than {} bytes",
                    max
                )));
            }
            let byte = take(src, 1)?[0];
            let group = (byte & 0x7f) as u64;
            match self.endian {
                Endian::Little => {
                    let shift = 7 * count as u32;
                    if shift < 64 {
                        acc |= group << shift;
                    }
                }
                Endian::Big => acc = (acc << 7) | group,
            }
            count += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        self.set_wire_bits(acc, (7 * count as u32).min(64));
        let mut canonical = Vec::with_capacity(count);
        if self.write(&mut canonical).is_err() || canonical[..] != start[..count] {
            return Err(CodecError::InvalidMessageData(format!(
                "non-canonical var-length integer encoding {:02x?}",
                &start[..count]
            )));
        }
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let wire = self.wire_value();
        match self.width {
            IntWidth::Fixed(n) => {
                if !fits(wire, n as u32 * 8, self.signed) {
                    return Err(CodecError::BufferOverflow(format!(
                        "value {} does not fit in {} byte(s)",
                        wire, n
                    )));
                }
                write_uint(out, wire as u64, n, self.endian);
                Ok(())
            }
            IntWidth::Var { min, max } => {
                let count = self.var_groups(wire).max(min);
                if count > max {
                    return Err(CodecError::BufferOverflow(format!(
                        "value {} needs {} var-length byte(s), at most {} allowed",
                        wire, count, max
                    )));
                }
                let groups: Vec<u8> = (0..count)
                    .map(|i| {
                        let shift = 7 * i as u32;
                        if self.signed {
                            ((wire >> shift) & 0x7f) as u8
                        } else {
                            (((wire as u64) >> shift) & 0x7f) as u8
                        }
                    })
                    .collect();
                let ordered: Box<dyn Iterator<Item = &u8>> = match self.endian {
                    Endian::Little => Box::new(groups.iter()),
                    Endian::Big => Box::new(groups.iter().rev()),
                };
                for (i, g) in ordered.enumerate() {
                    if i + 1 < count {
                        out.push(g | 0x80);
                    } else {
                        out.push(*g);
                    }
                }
                Ok(())
            }
        }
    }

    /// Minimal number of 7-bit groups for `wire`.
    fn var_groups(&self, wire: i64) -> usize {
        (1..=MAX_VAR_BYTES)
            .find(|&n| fits(wire, (7 * n as u32).min(64), self.signed))
            .unwrap_or(MAX_VAR_BYTES)
    }

    pub fn length(&self) -> usize {
        match self.width {
            IntWidth::Fixed(n) => n,
            IntWidth::Var { min, max } => self.var_groups(self.wire_value()).clamp(min, max),
        }
    }

    pub fn min_length(&self) -> usize {
        match self.width {
            IntWidth::Fixed(n) => n,
            IntWidth::Var { min, .. } => min,
        }
    }

    pub fn max_length(&self) -> usize {
        match self.width {
            IntWidth::Fixed(n) => n,
            IntWidth::Var { max, .. } => max,
        }
    }
}

fn fits(wire: i64, bits: u32, signed: bool) -> bool {
    if bits >= 64 {
        return true;
    }
    if signed {
        let half = 1i64 << (bits - 1);
        -half <= wire && wire < half
    } else {
        wire >= 0 && (wire as u64) < (1u64 << bits)
    }
}
