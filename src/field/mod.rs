//! Field codec: the closed set of field kinds and their common read/write plumbing.
//!
//! Every field reads from a `&mut &[u8]` (the slice is both the source and the
//! remaining-length bound, and is advanced past whatever the field consumed) and writes by
//! appending to a `Vec<u8>`. Composite fields own their members outright; cloning a field is a
//! deep copy.
//!
//! | Kind      | Type               | Wire form                                        |
//! |-----------|--------------------|--------------------------------------------------|
//! | Int       | [`IntField`]       | fixed N bytes or base-128 var-length             |
//! | Enum      | [`EnumField`]      | integer storage + name table                     |
//! | Bitmask   | [`BitmaskField`]   | fixed N bytes, named bits, reserved pattern      |
//! | Float     | [`FloatField`]     | IEEE 754 f32/f64                                 |
//! | String    | [`StringField`]    | bytes under a [`SizePrefix`] policy              |
//! | ArrayList | [`BytesField`], [`ListField`] | raw bytes / repeated elements         |
//! | Bitfield  | [`BitfieldField`]  | sub-fields packed into one storage integer       |
//! | Bundle    | [`BundleField`]    | members back to back, optional remaining length  |
//! | Optional  | [`OptionalField`]  | inner field or nothing                           |
//! | Variant   | [`VariantField`]   | one of several tagged bundles                    |
//! | Unknown   | [`UnknownField`]   | opaque bytes                                     |

mod bitfield;
mod bitmask;
mod bundle;
mod enums;
mod float;
mod int;
mod list;
mod optional;
mod seq;
mod variant;

pub use bitfield::{BitMember, BitfieldField};
pub use bitmask::BitmaskField;
pub use bundle::BundleField;
pub use enums::EnumField;
pub use float::{FloatField, FloatPrecision};
pub use int::{IntField, IntWidth};
pub use list::ListField;
pub use optional::{OptionalField, OptionalMode};
pub use seq::{BytesField, SizePrefix, StringField, UnknownField};
pub use variant::VariantField;

use crate::error::{CodecError, Result};
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of multi-byte numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Closed kind tag: what a generic (protocol-agnostic) renderer dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int,
    Enum,
    Bitmask,
    Float,
    String,
    Bitfield,
    Bundle,
    Optional,
    Variant,
    ArrayList,
    Unknown,
}

/// A field of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(IntField),
    Enum(EnumField),
    Bitmask(BitmaskField),
    Float(FloatField),
    String(StringField),
    Bytes(BytesField),
    List(ListField),
    Bitfield(BitfieldField),
    Bundle(BundleField),
    Optional(OptionalField),
    Variant(VariantField),
    Unknown(UnknownField),
}

/// A named field inside a bundle or message.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub field: Field,
}

impl Member {
    pub fn new(name: impl Into<String>, field: impl Into<Field>) -> Self {
        Member {
            name: name.into(),
            field: field.into(),
        }
    }
}

/// Visitor over field kinds; composite callbacks recurse by calling [`Field::accept`] on children.
pub trait FieldVisitor {
    fn visit_int(&mut self, name: &str, field: &IntField);
    fn visit_enum(&mut self, name: &str, field: &EnumField);
    fn visit_bitmask(&mut self, name: &str, field: &BitmaskField);
    fn visit_float(&mut self, name: &str, field: &FloatField);
    fn visit_string(&mut self, name: &str, field: &StringField);
    fn visit_bytes(&mut self, name: &str, field: &BytesField);
    fn visit_list(&mut self, name: &str, field: &ListField);
    fn visit_bitfield(&mut self, name: &str, field: &BitfieldField);
    fn visit_bundle(&mut self, name: &str, field: &BundleField);
    fn visit_optional(&mut self, name: &str, field: &OptionalField);
    fn visit_variant(&mut self, name: &str, field: &VariantField);
    fn visit_unknown(&mut self, name: &str, field: &UnknownField);
}

macro_rules! field_conversions {
    ($($variant:ident($ty:ty), $as_ref:ident, $as_mut:ident;)*) => {
        $(
            impl From<$ty> for Field {
                fn from(f: $ty) -> Self {
                    Field::$variant(f)
                }
            }
        )*

        impl Field {
            $(
                pub fn $as_ref(&self) -> Option<&$ty> {
                    match self {
                        Field::$variant(f) => Some(f),
                        _ => None,
                    }
                }

                pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                    match self {
                        Field::$variant(f) => Some(f),
                        _ => None,
                    }
                }
            )*
        }
    };
}

field_conversions! {
    Int(IntField), as_int, as_int_mut;
    Enum(EnumField), as_enum, as_enum_mut;
    Bitmask(BitmaskField), as_bitmask, as_bitmask_mut;
    Float(FloatField), as_float, as_float_mut;
    String(StringField), as_string, as_string_mut;
    Bytes(BytesField), as_bytes, as_bytes_mut;
    List(ListField), as_list, as_list_mut;
    Bitfield(BitfieldField), as_bitfield, as_bitfield_mut;
    Bundle(BundleField), as_bundle, as_bundle_mut;
    Optional(OptionalField), as_optional, as_optional_mut;
    Variant(VariantField), as_variant, as_variant_mut;
    Unknown(UnknownField), as_unknown, as_unknown_mut;
}

impl Field {
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Int(_) => FieldKind::Int,
            Field::Enum(_) => FieldKind::Enum,
            Field::Bitmask(_) => FieldKind::Bitmask,
            Field::Float(_) => FieldKind::Float,
            Field::String(_) => FieldKind::String,
            Field::Bytes(_) | Field::List(_) => FieldKind::ArrayList,
            Field::Bitfield(_) => FieldKind::Bitfield,
            Field::Bundle(_) => FieldKind::Bundle,
            Field::Optional(_) => FieldKind::Optional,
            Field::Variant(_) => FieldKind::Variant,
            Field::Unknown(_) => FieldKind::Unknown,
        }
    }

    /// Decode from `src`, advancing it past the consumed bytes.
    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        match self {
            Field::Int(f) => f.read(src),
            Field::Enum(f) => f.read(src),
            Field::Bitmask(f) => f.read(src),
            Field::Float(f) => f.read(src),
            Field::String(f) => f.read(src),
            Field::Bytes(f) => f.read(src),
            Field::List(f) => f.read(src),
            Field::Bitfield(f) => f.read(src),
            Field::Bundle(f) => f.read(src),
            Field::Optional(f) => f.read(src),
            Field::Variant(f) => f.read(src),
            Field::Unknown(f) => f.read(src),
        }
    }

    /// Encode by appending to `out`.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Field::Int(f) => f.write(out),
            Field::Enum(f) => f.write(out),
            Field::Bitmask(f) => f.write(out),
            Field::Float(f) => f.write(out),
            Field::String(f) => f.write(out),
            Field::Bytes(f) => f.write(out),
            Field::List(f) => f.write(out),
            Field::Bitfield(f) => f.write(out),
            Field::Bundle(f) => f.write(out),
            Field::Optional(f) => f.write(out),
            Field::Variant(f) => f.write(out),
            Field::Unknown(f) => f.write(out),
        }
    }

    /// Serialized length of the current value.
    pub fn length(&self) -> usize {
        match self {
            Field::Int(f) => f.length(),
            Field::Enum(f) => f.length(),
            Field::Bitmask(f) => f.length(),
            Field::Float(f) => f.length(),
            Field::String(f) => f.length(),
            Field::Bytes(f) => f.length(),
            Field::List(f) => f.length(),
            Field::Bitfield(f) => f.length(),
            Field::Bundle(f) => f.length(),
            Field::Optional(f) => f.length(),
            Field::Variant(f) => f.length(),
            Field::Unknown(f) => f.length(),
        }
    }

    pub fn min_length(&self) -> usize {
        match self {
            Field::Int(f) => f.min_length(),
            Field::Enum(f) => f.min_length(),
            Field::Bitmask(f) => f.length(),
            Field::Float(f) => f.length(),
            Field::String(f) => f.min_length(),
            Field::Bytes(f) => f.min_length(),
            Field::List(f) => f.min_length(),
            Field::Bitfield(f) => f.length(),
            Field::Bundle(f) => f.min_length(),
            Field::Optional(f) => f.min_length(),
            Field::Variant(f) => f.min_length(),
            Field::Unknown(_) => 0,
        }
    }

    /// Largest possible serialized length; `usize::MAX` when unbounded.
    pub fn max_length(&self) -> usize {
        match self {
            Field::Int(f) => f.max_length(),
            Field::Enum(f) => f.max_length(),
            Field::Bitmask(f) => f.length(),
            Field::Float(f) => f.length(),
            Field::String(f) => f.max_length(),
            Field::Bytes(f) => f.max_length(),
            Field::List(f) => f.max_length(),
            Field::Bitfield(f) => f.length(),
            Field::Bundle(f) => f.max_length(),
            Field::Optional(f) => f.max_length(),
            Field::Variant(f) => f.max_length(),
            Field::Unknown(_) => usize::MAX,
        }
    }

    /// Whether decoding may run on to the end of the available input rather than stopping at a
    /// boundary the encoding carries itself.
    pub fn reads_to_end(&self) -> bool {
        match self {
            Field::String(f) => matches!(f.size(), SizePrefix::Remainder),
            Field::Bytes(f) => matches!(f.size(), SizePrefix::Remainder),
            Field::List(f) => match f.size() {
                SizePrefix::Remainder => true,
                SizePrefix::Length(_) => false,
                _ => f.elem_length().is_none() && f.prototype().reads_to_end(),
            },
            Field::Bundle(f) => f.reads_to_end(),
            Field::Optional(f) => f.mode() == OptionalMode::Tentative || f.inner().reads_to_end(),
            Field::Variant(f) => f.reads_to_end(),
            Field::Unknown(_) => true,
            _ => false,
        }
    }

    /// Semantic validity of the current value; decoding does not depend on it.
    pub fn valid(&self) -> bool {
        match self {
            Field::Int(f) => f.valid(),
            Field::Enum(f) => f.valid(),
            Field::Bitmask(f) => f.valid(),
            Field::Float(f) => f.valid(),
            Field::String(f) => f.valid(),
            Field::Bytes(f) => f.valid(),
            Field::List(f) => f.valid(),
            Field::Bitfield(f) => f.valid(),
            Field::Bundle(f) => f.valid(),
            Field::Optional(f) => f.valid(),
            Field::Variant(f) => f.valid(),
            Field::Unknown(_) => true,
        }
    }

    /// Re-derive internally dependent state (remaining-length members). Returns true if anything changed.
    pub fn refresh(&mut self) -> bool {
        match self {
            Field::Bundle(f) => f.refresh(),
            Field::Optional(f) => f.refresh(),
            Field::Variant(f) => f.refresh(),
            Field::List(f) => f.refresh(),
            _ => false,
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Field::Int(f) => Value::Int(f.value()),
            Field::Enum(f) => Value::Int(f.value()),
            Field::Bitmask(f) => Value::Bits(f.value()),
            Field::Float(f) => Value::Float(f.value()),
            Field::String(f) => Value::Str(f.as_str().into_owned()),
            Field::Bytes(f) => Value::Bytes(f.data().to_vec()),
            Field::List(f) => Value::List(f.elements().iter().map(Field::value).collect()),
            Field::Bitfield(f) => Value::Bundle(
                f.members()
                    .iter()
                    .map(|m| (m.name.clone(), m.field.value()))
                    .collect(),
            ),
            Field::Bundle(f) => Value::Bundle(
                f.members()
                    .iter()
                    .map(|m| (m.name.clone(), m.field.value()))
                    .collect(),
            ),
            Field::Optional(f) => match f.field() {
                Some(inner) => inner.value(),
                None => Value::Missing,
            },
            Field::Variant(f) => match (f.current_name(), f.current_field()) {
                (Some(name), Some(inner)) => Value::Variant(name.to_string(), Box::new(inner.value())),
                _ => Value::Missing,
            },
            Field::Unknown(f) => Value::Bytes(f.data().to_vec()),
        }
    }

    /// Assign from a generic value. Returns false when the value shape does not fit this kind.
    pub fn set_value(&mut self, v: &Value) -> bool {
        match (self, v) {
            (Field::Int(f), Value::Float(x)) => {
                f.set_scaled(*x);
                true
            }
            (Field::Int(f), v) => match v.as_i64() {
                Some(x) => {
                    f.set_value(x);
                    true
                }
                None => false,
            },
            (Field::Enum(f), Value::Str(s)) => f.set_by_name(s),
            (Field::Enum(f), v) => match v.as_i64() {
                Some(x) => {
                    f.set_value(x);
                    true
                }
                None => false,
            },
            (Field::Bitmask(f), v) => match v.as_u64() {
                Some(x) => {
                    f.set_value(x);
                    true
                }
                None => false,
            },
            (Field::Float(f), v) => match v.as_f64() {
                Some(x) => {
                    f.set_value(x);
                    true
                }
                None => false,
            },
            (Field::String(f), Value::Str(s)) => {
                f.set(s);
                true
            }
            (Field::Bytes(f), Value::Bytes(b)) => {
                f.set(b.clone());
                true
            }
            (Field::Unknown(f), Value::Bytes(b)) => {
                f.set(b.clone());
                true
            }
            (Field::List(f), Value::List(items)) => f.set_values(items),
            (Field::Bitfield(f), Value::Bundle(items)) => items.iter().all(|(name, v)| {
                f.member_mut(name).map(|m| m.set_value(v)).unwrap_or(false)
            }),
            (Field::Bundle(f), Value::Bundle(items)) => items.iter().all(|(name, v)| {
                f.member_mut(name).map(|m| m.set_value(v)).unwrap_or(false)
            }),
            (Field::Optional(f), Value::Missing) => {
                f.set_mode(OptionalMode::Missing);
                true
            }
            (Field::Optional(f), v) => {
                f.set_mode(OptionalMode::Exists);
                f.inner_mut().set_value(v)
            }
            (Field::Variant(f), Value::Variant(name, inner)) => {
                f.select_by_name(name)
                    && f.current_field_mut().map(|c| c.set_value(inner)).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Dispatch to the visitor callback matching this field's kind.
    pub fn accept(&self, name: &str, visitor: &mut dyn FieldVisitor) {
        match self {
            Field::Int(f) => visitor.visit_int(name, f),
            Field::Enum(f) => visitor.visit_enum(name, f),
            Field::Bitmask(f) => visitor.visit_bitmask(name, f),
            Field::Float(f) => visitor.visit_float(name, f),
            Field::String(f) => visitor.visit_string(name, f),
            Field::Bytes(f) => visitor.visit_bytes(name, f),
            Field::List(f) => visitor.visit_list(name, f),
            Field::Bitfield(f) => visitor.visit_bitfield(name, f),
            Field::Bundle(f) => visitor.visit_bundle(name, f),
            Field::Optional(f) => visitor.visit_optional(name, f),
            Field::Variant(f) => visitor.visit_variant(name, f),
            Field::Unknown(f) => visitor.visit_unknown(name, f),
        }
    }

    /// Whether this kind can live inside a bitfield.
    pub(crate) fn is_bit_packable(&self) -> bool {
        matches!(self, Field::Int(_) | Field::Enum(_) | Field::Bitmask(_))
    }

    pub(crate) fn to_bits(&self, bits: u32) -> u64 {
        let raw = match self {
            Field::Int(f) => f.wire_value() as u64,
            Field::Enum(f) => f.storage().wire_value() as u64,
            Field::Bitmask(f) => f.value(),
            _ => 0,
        };
        raw & mask(bits)
    }

    pub(crate) fn set_from_bits(&mut self, raw: u64, bits: u32) {
        match self {
            Field::Int(f) => f.set_wire_bits(raw, bits),
            Field::Enum(f) => f.storage_mut().set_wire_bits(raw, bits),
            Field::Bitmask(f) => f.set_value(raw),
            _ => {}
        }
    }
}

pub(crate) fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

pub(crate) fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Split `n` bytes off the front of `src`.
pub(crate) fn take<'a>(src: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    let s: &'a [u8] = *src;
    if s.len() < n {
        return Err(CodecError::NotEnoughData {
            missing: n - s.len(),
        });
    }
    let (head, tail) = s.split_at(n);
    *src = tail;
    Ok(head)
}

/// Read an `n`-byte (1..=8) unsigned integer.
pub(crate) fn read_uint(src: &mut &[u8], n: usize, endian: Endian) -> Result<u64> {
    let bytes = take(src, n)?;
    Ok(match endian {
        Endian::Big => BigEndian::read_uint(bytes, n),
        Endian::Little => LittleEndian::read_uint(bytes, n),
    })
}

/// Write the low `n` bytes (1..=8) of `v`.
pub(crate) fn write_uint(out: &mut Vec<u8>, v: u64, n: usize, endian: Endian) {
    let mut buf = [0u8; 8];
    let v = v & mask(n as u32 * 8);
    match endian {
        Endian::Big => BigEndian::write_uint(&mut buf[..n], v, n),
        Endian::Little => LittleEndian::write_uint(&mut buf[..n], v, n),
    }
    out.extend_from_slice(&buf[..n]);
}
