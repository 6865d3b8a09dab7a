//! Message definition: an ordered tuple of named payload fields plus id, name and presence rules.
//!
//! Presence rules tie an optional field's mode to an earlier bitmask bit or to the transport
//! version. They are applied before each rule target is read and by [`Message::refresh`], which
//! reports whether any mode (or derived value) changed.

use crate::error::{DefinitionError, Result};
use crate::field::{Field, FieldVisitor, Member, OptionalMode, UnknownField};
use crate::value::Value;
use std::fmt;

/// Numeric message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MsgId(pub u64);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MsgId {
    fn from(v: u64) -> Self {
        MsgId(v)
    }
}

/// Why a message produced by the reader is not a regular decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Bytes that did not start a frame.
    Garbage,
    /// A complete frame whose checksum did not match.
    ChecksumFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Decoded by a registered message type.
    Regular,
    /// Well-framed but with an id no message type is registered for.
    RawData,
    Invalid(InvalidReason),
}

/// Condition controlling an optional field's presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Present when bit `bit` of the bitmask member `mask` is set.
    BitSet { mask: String, bit: u32 },
    /// Present when bit `bit` of the bitmask member `mask` is clear.
    BitClear { mask: String, bit: u32 },
    /// Present when the transport version is `>=` the value.
    VersionAtLeast(u64),
    /// Present when the transport version is `<` the value.
    VersionBelow(u64),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Bit { mask: usize, bit: u32, set: bool },
    VersionAtLeast(u64),
    VersionBelow(u64),
}

#[derive(Debug, Clone, PartialEq)]
struct PresenceRule {
    target: usize,
    condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MsgId,
    name: String,
    display_name: Option<String>,
    fields: Vec<Member>,
    rules: Vec<PresenceRule>,
    version_dependent: bool,
    version: u64,
    transport: Vec<Member>,
    class: MessageClass,
    frame_bytes: Vec<u8>,
}

impl Message {
    pub fn new(id: impl Into<MsgId>, name: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            name: name.into(),
            display_name: None,
            fields: Vec::new(),
            rules: Vec::new(),
            version_dependent: false,
            version: 0,
            transport: Vec::new(),
            class: MessageClass::Regular,
            frame_bytes: Vec::new(),
        }
    }

    /// Well-framed message with an unregistered id; the payload is kept as opaque bytes.
    pub fn raw_data(id: impl Into<MsgId>) -> Self {
        let mut m = Message::new(id, "RawData").with_field("data", UnknownField::default());
        m.class = MessageClass::RawData;
        m
    }

    /// Garbage or checksum-failed bytes, carried verbatim.
    pub fn invalid(reason: InvalidReason, bytes: &[u8]) -> Self {
        let name = match reason {
            InvalidReason::Garbage => "Garbage",
            InvalidReason::ChecksumFailure => "ChecksumFailure",
        };
        let mut m = Message::new(0, name).with_field("data", UnknownField::new(bytes.to_vec()));
        m.class = MessageClass::Invalid(reason);
        m.frame_bytes = bytes.to_vec();
        m
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Allow version presence rules (and receive the transport version).
    pub fn version_dependent(mut self) -> Self {
        self.version_dependent = true;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
        self.fields.push(Member::new(name, field));
        self
    }

    /// Attach a presence rule to the optional member `target`.
    ///
    /// Version rules require a version-dependent message; a bit rule's mask must be a bitmask
    /// member declared before the target.
    pub fn with_presence(
        mut self,
        target: &str,
        presence: Presence,
    ) -> std::result::Result<Self, DefinitionError> {
        let err = |reason: String| DefinitionError::Message {
            message: self.name.clone(),
            reason,
        };
        let target_idx = self
            .fields
            .iter()
            .position(|m| m.name == target)
            .ok_or_else(|| err(format!("no member `{}`", target)))?;
        if self.fields[target_idx].field.as_optional().is_none() {
            return Err(err(format!("presence target `{}` is not optional", target)));
        }
        let condition = match presence {
            Presence::BitSet { mask, bit } => Condition::Bit {
                mask: self.mask_index(&mask, target_idx, bit)?,
                bit,
                set: true,
            },
            Presence::BitClear { mask, bit } => Condition::Bit {
                mask: self.mask_index(&mask, target_idx, bit)?,
                bit,
                set: false,
            },
            Presence::VersionAtLeast(v) | Presence::VersionBelow(v) if !self.version_dependent => {
                return Err(err(format!(
                    "version condition ({}) on `{}` requires a version-dependent message",
                    v, target
                )));
            }
            Presence::VersionAtLeast(v) => Condition::VersionAtLeast(v),
            Presence::VersionBelow(v) => Condition::VersionBelow(v),
        };
        self.rules.push(PresenceRule {
            target: target_idx,
            condition,
        });
        self.refresh();
        Ok(self)
    }

    fn mask_index(
        &self,
        mask: &str,
        target_idx: usize,
        bit: u32,
    ) -> std::result::Result<usize, DefinitionError> {
        let err = |reason: String| DefinitionError::Message {
            message: self.name.clone(),
            reason,
        };
        let idx = self.fields[..target_idx]
            .iter()
            .position(|m| m.name == mask)
            .ok_or_else(|| err(format!("mask `{}` must be a member declared before its target", mask)))?;
        match self.fields[idx].field.as_bitmask() {
            Some(b) if bit < b.bytes() as u32 * 8 => Ok(idx),
            Some(_) => Err(err(format!("bit {} out of range for `{}`", bit, mask))),
            None => Err(err(format!("`{}` is not a bitmask", mask))),
        }
    }

    pub fn id(&self) -> MsgId {
        self.id
    }

    pub fn id_as_string(&self) -> String {
        self.id.to_string()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable name; falls back to the type name.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn class(&self) -> MessageClass {
        self.class
    }

    pub(crate) fn set_class(&mut self, class: MessageClass) {
        self.class = class;
    }

    pub fn is_version_dependent(&self) -> bool {
        self.version_dependent
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Transport-supplied version; ignored by version-independent messages.
    pub fn set_version(&mut self, version: u64) {
        if self.version_dependent {
            self.version = version;
        }
    }

    /// Fields supplied by frame layers rather than the payload (e.g. the version).
    pub fn transport_fields(&self) -> &[Member] {
        &self.transport
    }

    pub fn transport_field(&self, name: &str) -> Option<&Field> {
        self.transport
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.field)
    }

    pub fn set_transport_field(&mut self, name: &str, field: Field) {
        match self.transport.iter_mut().find(|m| m.name == name) {
            Some(m) => m.field = field,
            None => self.transport.push(Member::new(name, field)),
        }
    }

    /// Bytes of the whole frame this message was decoded from (empty for locally built ones).
    pub fn frame_bytes(&self) -> &[u8] {
        &self.frame_bytes
    }

    pub(crate) fn set_frame_bytes(&mut self, bytes: &[u8]) {
        self.frame_bytes = bytes.to_vec();
    }

    pub fn fields(&self) -> &[Member] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.field)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields
            .iter_mut()
            .find(|m| m.name == name)
            .map(|m| &mut m.field)
    }

    pub fn value(&self) -> Value {
        Value::Bundle(
            self.fields
                .iter()
                .map(|m| (m.name.clone(), m.field.value()))
                .collect(),
        )
    }

    fn condition_holds(&self, condition: &Condition) -> bool {
        match *condition {
            Condition::Bit { mask, bit, set } => self
                .fields
                .get(mask)
                .and_then(|m| m.field.as_bitmask())
                .map(|b| b.bit(bit) == set)
                .unwrap_or(false),
            Condition::VersionAtLeast(v) => self.version >= v,
            Condition::VersionBelow(v) => self.version < v,
        }
    }

    /// Mode the rules on member `idx` call for; `None` when no rule targets it.
    fn required_mode(&self, idx: usize) -> Option<OptionalMode> {
        let mut rules = self.rules.iter().filter(|r| r.target == idx).peekable();
        rules.peek()?;
        let present = rules.all(|r| self.condition_holds(&r.condition));
        Some(if present {
            OptionalMode::Exists
        } else {
            OptionalMode::Missing
        })
    }

    fn apply_presence(&mut self, idx: usize) -> bool {
        let Some(mode) = self.required_mode(idx) else {
            return false;
        };
        match self.fields[idx].field.as_optional_mut() {
            Some(opt) if opt.mode() != mode => {
                opt.set_mode(mode);
                true
            }
            _ => false,
        }
    }

    /// Decode the payload fields from `src`; trailing bytes are left unread.
    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        for idx in 0..self.fields.len() {
            self.apply_presence(idx);
            self.fields[idx].field.read(src)?;
        }
        Ok(())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        for m in &self.fields {
            m.field.write(out)?;
        }
        Ok(())
    }

    pub fn length(&self) -> usize {
        self.fields.iter().map(|m| m.field.length()).sum()
    }

    pub fn min_length(&self) -> usize {
        self.fields.iter().map(|m| m.field.min_length()).sum()
    }

    pub fn max_length(&self) -> usize {
        self.fields
            .iter()
            .fold(0usize, |acc, m| acc.saturating_add(m.field.max_length()))
    }

    /// True if some field may consume whatever input follows it (see [`Field::reads_to_end`]).
    pub fn reads_to_end(&self) -> bool {
        self.fields.iter().any(|m| m.field.reads_to_end())
    }

    /// Field validity; raw-data messages are valid, garbage and checksum failures are not.
    pub fn is_valid(&self) -> bool {
        !matches!(self.class, MessageClass::Invalid(_)) && self.fields.iter().all(|m| m.field.valid())
    }

    /// Reconcile optional modes with their conditions and re-derive dependent values.
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        for idx in 0..self.fields.len() {
            changed |= self.apply_presence(idx);
            changed |= self.fields[idx].field.refresh();
        }
        changed
    }

    /// Walk the payload fields in declaration order.
    pub fn accept(&self, visitor: &mut dyn FieldVisitor) {
        for m in &self.fields {
            m.field.accept(&m.name, visitor);
        }
    }
}
