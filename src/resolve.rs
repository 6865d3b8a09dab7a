//! Resolve a parsed protocol description into field prototypes, messages, a factory and a frame.

use crate::ast::*;
use crate::error::DefinitionError;
use crate::factory::MessageFactory;
use crate::field::{
    BitMember, BitfieldField, BitmaskField, BundleField, BytesField, Endian, EnumField, Field,
    FloatField, IntField, ListField, Member, OptionalField, OptionalMode, SizePrefix, StringField,
    VariantField,
};
use crate::frame::{ChecksumAlgo, ChecksumPlacement, Frame, Layer, LayerKind};
use crate::message::{Message, Presence};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type DefResult<T> = Result<T, DefinitionError>;

/// Largest `fixed(n)` a description may declare. For lists `n` is weighted by the element's
/// own pre-built content, so nested fixed sizes share one budget.
pub const MAX_FIXED_SIZE: usize = 1 << 16;

/// A fully resolved protocol.
#[derive(Debug, Clone)]
pub struct ResolvedProtocol {
    pub name: String,
    pub frame: Frame,
}

#[derive(Clone, Copy)]
enum TypeDef<'a> {
    Enum(&'a EnumDecl),
    Bitmask(&'a BitmaskDecl),
    Struct(&'a StructDecl),
    Bitfield(&'a BitfieldDecl),
    Variant(&'a VariantDecl),
}

struct Resolver<'a> {
    endian: Endian,
    types: HashMap<&'a str, TypeDef<'a>>,
}

/// Build the frame (with its message factory) described by `protocol`.
pub fn resolve(protocol: &Protocol) -> DefResult<ResolvedProtocol> {
    let resolver = Resolver::new(protocol)?;
    let frame_decl = match protocol.frames.as_slice() {
        [frame] => frame,
        [] => return Err(DefinitionError::Invalid("no frame declared".into())),
        _ => {
            return Err(DefinitionError::Invalid(
                "only one frame may be declared".into(),
            ))
        }
    };

    let mut seen = Vec::new();
    let mut messages = Vec::with_capacity(protocol.messages.len());
    for decl in &protocol.messages {
        if seen.contains(&decl.name.as_str()) {
            return Err(DefinitionError::Duplicate(format!("message {}", decl.name)));
        }
        seen.push(decl.name.as_str());
        messages.push(resolver.message(decl)?);
    }

    let (layers, id_names) = resolver.frame_layers(frame_decl)?;
    let factory = MessageFactory::new(messages).with_id_names(id_names);
    let frame = Frame::new(frame_decl.name.clone(), layers, Arc::new(factory))?;
    let name = protocol
        .name
        .clone()
        .unwrap_or_else(|| frame_decl.name.clone());
    debug!(
        protocol = %name,
        messages = frame.factory().prototypes().len(),
        layers = frame.layers().len(),
        "protocol definition loaded"
    );
    Ok(ResolvedProtocol { name, frame })
}

fn unknown(what: &str, name: &str) -> DefinitionError {
    DefinitionError::UnknownRef(format!("{} `{}`", what, name))
}

fn invalid(ctx: &str, reason: impl std::fmt::Display) -> DefinitionError {
    DefinitionError::Invalid(format!("`{}`: {}", ctx, reason))
}

impl<'a> Resolver<'a> {
    fn new(protocol: &'a Protocol) -> DefResult<Self> {
        let mut types = HashMap::new();
        let decls = protocol
            .enums
            .iter()
            .map(|d| (d.name.as_str(), TypeDef::Enum(d)))
            .chain(protocol.bitmasks.iter().map(|d| (d.name.as_str(), TypeDef::Bitmask(d))))
            .chain(protocol.structs.iter().map(|d| (d.name.as_str(), TypeDef::Struct(d))))
            .chain(protocol.bitfields.iter().map(|d| (d.name.as_str(), TypeDef::Bitfield(d))))
            .chain(protocol.variants.iter().map(|d| (d.name.as_str(), TypeDef::Variant(d))));
        for (name, def) in decls {
            if types.insert(name, def).is_some() {
                return Err(DefinitionError::Duplicate(format!("type {}", name)));
            }
        }
        let endian = match protocol.endian {
            Some(EndianSpec::Little) => Endian::Little,
            _ => Endian::Big,
        };
        Ok(Resolver { endian, types })
    }

    fn int(&self, ty: IntType) -> IntField {
        let f = match ty {
            IntType::Fixed { bytes, signed: false } => IntField::unsigned(bytes),
            IntType::Fixed { bytes, signed: true } => IntField::signed(bytes),
            IntType::Var { min, max, signed: false } => IntField::var_unsigned(min, max),
            IntType::Var { min, max, signed: true } => IntField::var_signed(min, max),
        };
        f.with_endian(self.endian)
    }

    fn fixed_bytes(&self, ctx: &str, ty: IntType) -> DefResult<usize> {
        match ty {
            IntType::Fixed { bytes, .. } => Ok(bytes),
            IntType::Var { .. } => Err(invalid(ctx, "storage must be fixed width")),
        }
    }

    fn size(&self, ctx: &str, spec: &SizeSpec, weight: usize) -> DefResult<SizePrefix> {
        Ok(match spec {
            SizeSpec::Fixed(n) if n.saturating_mul(weight) > MAX_FIXED_SIZE => {
                return Err(invalid(
                    ctx,
                    format!("fixed size {} exceeds the limit of {}", n, MAX_FIXED_SIZE),
                ))
            }
            SizeSpec::Fixed(n) => SizePrefix::Fixed(*n),
            SizeSpec::Count(t) => SizePrefix::Count(self.int(*t)),
            SizeSpec::Length(t) => SizePrefix::Length(self.int(*t)),
            SizeSpec::Rest => SizePrefix::Remainder,
        })
    }

    fn int_literal(ctx: &str, lit: &Literal) -> DefResult<i64> {
        lit.as_i64()
            .ok_or_else(|| invalid(ctx, format!("expected an integer, got {:?}", lit)))
    }

    fn float_literal(ctx: &str, lit: &Literal) -> DefResult<f64> {
        lit.as_f64()
            .ok_or_else(|| invalid(ctx, format!("expected a number, got {:?}", lit)))
    }

    fn int_field(&self, ctx: &str, ty: IntType, attrs: &FieldAttrs) -> DefResult<IntField> {
        let mut f = self.int(ty);
        if let Some(off) = attrs.offset {
            f = f.with_offset(off);
        }
        if let Some((num, den)) = attrs.scale {
            if num == 0 || den == 0 {
                return Err(invalid(ctx, "scale terms must be non-zero"));
            }
            f = f.with_scaling(num, den);
        }
        if let Some(units) = &attrs.units {
            f = f.with_units(units.clone());
        }
        for (lo, hi) in &attrs.ranges {
            f = f.with_range(Self::int_literal(ctx, lo)?, Self::int_literal(ctx, hi)?);
        }
        for (name, v) in &attrs.specials {
            f = f.with_special(name.clone(), Self::int_literal(ctx, v)?);
        }
        if let Some(d) = &attrs.default {
            let v = match d {
                Literal::Ident(name) => f
                    .specials()
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| unknown("special value", name))?,
                other => Self::int_literal(ctx, other)?,
            };
            f = f.with_default(v);
        }
        if attrs.strict {
            f = f.fail_on_invalid();
        }
        Ok(f)
    }

    fn float_field(&self, ctx: &str, double: bool, attrs: &FieldAttrs) -> DefResult<FloatField> {
        let mut f = if double {
            FloatField::f64()
        } else {
            FloatField::f32()
        }
        .with_endian(self.endian);
        for (lo, hi) in &attrs.ranges {
            f = f.with_range(Self::float_literal(ctx, lo)?, Self::float_literal(ctx, hi)?);
        }
        for (name, v) in &attrs.specials {
            f = f.with_special(name.clone(), Self::float_literal(ctx, v)?);
        }
        if let Some(d) = &attrs.decimals {
            f = f.with_decimals(*d);
        }
        if let Some(units) = &attrs.units {
            f = f.with_units(units.clone());
        }
        if let Some(d) = &attrs.default {
            f = f.with_default(Self::float_literal(ctx, d)?);
        }
        Ok(f)
    }

    fn enum_field(&self, ctx: &str, decl: &EnumDecl, attrs: &FieldAttrs) -> DefResult<EnumField> {
        let mut f = EnumField::new(self.int(decl.storage));
        for (name, v) in &decl.values {
            f = f.with_value(*v, name.clone());
        }
        let default = match &attrs.default {
            Some(Literal::Ident(name)) => Some(
                f.value_of(name)
                    .ok_or_else(|| unknown(&format!("{} value", decl.name), name))?,
            ),
            Some(other) => Some(Self::int_literal(ctx, other)?),
            None => decl.values.first().map(|(_, v)| *v),
        };
        if let Some(v) = default {
            f = f.with_default(v);
        }
        if decl.strict || attrs.strict {
            f = f.fail_on_invalid();
        }
        Ok(f)
    }

    fn bitmask_field(
        &self,
        ctx: &str,
        decl: &BitmaskDecl,
        attrs: &FieldAttrs,
    ) -> DefResult<BitmaskField> {
        let bytes = self.fixed_bytes(&decl.name, decl.storage)?;
        let mut f = BitmaskField::new(bytes).with_endian(self.endian);
        for (name, idx) in &decl.bits {
            if *idx >= bytes as u32 * 8 {
                return Err(invalid(&decl.name, format!("bit `{}` index {} out of range", name, idx)));
            }
            f = f.with_bit(*idx, name.clone());
        }
        if let Some((mask, value)) = decl.reserved {
            f = f.with_reserved(mask, value);
        }
        if decl.strict || attrs.strict {
            f = f.fail_on_reserved();
        }
        if let Some(d) = &attrs.default {
            f = f.with_default(Self::int_literal(ctx, d)? as u64);
        }
        Ok(f)
    }

    fn bundle(&self, decl: &StructDecl, stack: &mut Vec<String>) -> DefResult<BundleField> {
        let mut members = Vec::with_capacity(decl.fields.len());
        let mut remaining = None;
        for (idx, fd) in decl.fields.iter().enumerate() {
            let ctx = format!("{}.{}", decl.name, fd.name);
            if fd.attrs.condition.is_some() {
                return Err(invalid(&ctx, "presence conditions are only allowed on message fields"));
            }
            if members.iter().any(|m: &Member| m.name == fd.name) {
                return Err(DefinitionError::Duplicate(ctx));
            }
            if fd.attrs.remaining_length {
                if remaining.is_some() {
                    return Err(invalid(&decl.name, "more than one remaining_length member"));
                }
                remaining = Some(idx);
            }
            members.push(Member::new(fd.name.clone(), self.field(&ctx, &fd.ty, &fd.attrs, stack)?));
        }
        let bundle = BundleField::new(members);
        match remaining {
            Some(idx) => bundle.with_remaining_length(idx),
            None => Ok(bundle),
        }
    }

    fn bitfield(&self, decl: &BitfieldDecl, stack: &mut Vec<String>) -> DefResult<BitfieldField> {
        let bytes = self.fixed_bytes(&decl.name, decl.storage)?;
        let mut members = Vec::with_capacity(decl.fields.len());
        for fd in &decl.fields {
            let ctx = format!("{}.{}", decl.name, fd.name);
            let bits = fd
                .attrs
                .bits
                .ok_or_else(|| invalid(&ctx, "bitfield members need bits(n)"))?;
            members.push(BitMember::new(
                fd.name.clone(),
                bits,
                self.field(&ctx, &fd.ty, &fd.attrs, stack)?,
            ));
        }
        BitfieldField::new(&decl.name, bytes, self.endian, members)
    }

    fn variant(&self, decl: &VariantDecl, stack: &mut Vec<String>) -> DefResult<VariantField> {
        let mut alternatives = Vec::with_capacity(decl.alternatives.len());
        for alt in &decl.alternatives {
            let def = match self.types.get(alt.as_str()) {
                Some(TypeDef::Struct(s)) => *s,
                Some(_) => return Err(invalid(&decl.name, format!("alternative `{}` is not a struct", alt))),
                None => return Err(unknown("struct", alt)),
            };
            alternatives.push((alt.clone(), self.named_bundle(def, stack)?));
        }
        VariantField::new(alternatives)
    }

    fn named_bundle(&self, decl: &StructDecl, stack: &mut Vec<String>) -> DefResult<BundleField> {
        self.guard(&decl.name, stack, |r, stack| r.bundle(decl, stack))
    }

    /// Run `f` with `name` pushed on the resolution stack, rejecting recursive types.
    fn guard<T>(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        f: impl FnOnce(&Self, &mut Vec<String>) -> DefResult<T>,
    ) -> DefResult<T> {
        if stack.iter().any(|n| n == name) {
            return Err(invalid(name, "type refers to itself"));
        }
        stack.push(name.to_string());
        let res = f(self, stack);
        stack.pop();
        res
    }

    fn field(
        &self,
        ctx: &str,
        ty: &TypeSpec,
        attrs: &FieldAttrs,
        stack: &mut Vec<String>,
    ) -> DefResult<Field> {
        Ok(match ty {
            TypeSpec::Int(t) => self.int_field(ctx, *t, attrs)?.into(),
            TypeSpec::Float { double } => self.float_field(ctx, *double, attrs)?.into(),
            TypeSpec::String(size) => {
                let mut f = StringField::new(self.size(ctx, size, 1)?);
                match &attrs.default {
                    Some(Literal::Str(s)) => f = f.with_default(s),
                    Some(other) => return Err(invalid(ctx, format!("bad string default {:?}", other))),
                    None => {}
                }
                f.into()
            }
            TypeSpec::Bytes(size) => {
                let mut f = BytesField::new(self.size(ctx, size, 1)?);
                if let Some(Literal::Str(s)) = &attrs.default {
                    f = f.with_default(s.as_bytes().to_vec());
                }
                f.into()
            }
            TypeSpec::List {
                elem,
                size,
                elem_length,
            } => {
                let proto = self.field(ctx, elem, &FieldAttrs::default(), stack)?;
                let size = self.size(ctx, size, weight(&proto))?;
                let mut f = ListField::new(proto, size);
                if let Some(t) = elem_length {
                    f = f.with_elem_length(self.int(*t));
                }
                f.into()
            }
            TypeSpec::Optional { inner, mode } => {
                let inner = self.field(ctx, inner, attrs, stack)?;
                OptionalField::new(inner, opt_mode(*mode)).into()
            }
            TypeSpec::Named(name) => match self.types.get(name.as_str()) {
                Some(TypeDef::Enum(d)) => self.enum_field(ctx, d, attrs)?.into(),
                Some(TypeDef::Bitmask(d)) => self.bitmask_field(ctx, d, attrs)?.into(),
                Some(TypeDef::Struct(d)) => self.named_bundle(d, stack)?.into(),
                Some(TypeDef::Bitfield(d)) => self
                    .guard(&d.name, stack, |r, stack| r.bitfield(d, stack))?
                    .into(),
                Some(TypeDef::Variant(d)) => self
                    .guard(&d.name, stack, |r, stack| r.variant(d, stack))?
                    .into(),
                None => return Err(unknown("type", name)),
            },
        })
    }

    fn enum_value(&self, enum_name: &str, item: &str) -> DefResult<i64> {
        match self.types.get(enum_name) {
            Some(TypeDef::Enum(d)) => d
                .values
                .iter()
                .find(|(n, _)| n == item)
                .map(|(_, v)| *v)
                .ok_or_else(|| unknown(&format!("{} value", enum_name), item)),
            _ => Err(unknown("enum", enum_name)),
        }
    }

    fn message(&self, decl: &MessageDecl) -> DefResult<Message> {
        let id = match &decl.id {
            MsgIdRef::Number(n) => *n,
            MsgIdRef::Named { enum_name, item } => {
                let v = self.enum_value(enum_name, item)?;
                u64::try_from(v).map_err(|_| invalid(&decl.name, "negative message id"))?
            }
        };
        let mut msg = Message::new(id, decl.name.clone());
        if let Some(display) = &decl.display {
            msg = msg.with_display_name(display.clone());
        }
        if decl.versioned {
            msg = msg.version_dependent();
        }
        let mut stack = Vec::new();
        for fd in &decl.fields {
            let ctx = format!("{}.{}", decl.name, fd.name);
            if msg.field(&fd.name).is_some() {
                return Err(DefinitionError::Duplicate(ctx));
            }
            let mut field = self.field(&ctx, &fd.ty, &fd.attrs, &mut stack)?;
            if fd.attrs.condition.is_some() && field.as_optional().is_none() {
                field = OptionalField::new(field, OptionalMode::Missing).into();
            }
            msg = msg.with_field(fd.name.clone(), field);
        }
        for fd in &decl.fields {
            let Some(cond) = &fd.attrs.condition else {
                continue;
            };
            let presence = match cond {
                CondSpec::Version { op: CmpOp::AtLeast, value } => Presence::VersionAtLeast(*value),
                CondSpec::Version { op: CmpOp::Below, value } => Presence::VersionBelow(*value),
                CondSpec::Bit { mask, bit, negate } => {
                    let idx = self.bit_index(&msg, mask, bit)?;
                    if *negate {
                        Presence::BitClear { mask: mask.clone(), bit: idx }
                    } else {
                        Presence::BitSet { mask: mask.clone(), bit: idx }
                    }
                }
            };
            msg = msg.with_presence(&fd.name, presence)?;
        }
        Ok(msg)
    }

    fn bit_index(&self, msg: &Message, mask: &str, bit: &str) -> DefResult<u32> {
        if let Ok(idx) = bit.parse::<u32>() {
            return Ok(idx);
        }
        msg.field(mask)
            .and_then(Field::as_bitmask)
            .and_then(|b| b.bit_index(bit))
            .ok_or_else(|| unknown(&format!("bit of `{}`", mask), bit))
    }

    /// Layers in nesting order plus the id enum names (if the id is an enum).
    fn frame_layers(&self, decl: &FrameDecl) -> DefResult<(Vec<Layer>, Vec<(String, u64)>)> {
        let frame_err = |reason: String| DefinitionError::Frame {
            frame: decl.name.clone(),
            reason,
        };
        let payload_pos = decl
            .layers
            .iter()
            .position(|l| matches!(l.spec, LayerSpec::Payload))
            .ok_or_else(|| frame_err("missing payload".into()))?;

        let mut id_names = Vec::new();
        let mut nested = Vec::with_capacity(decl.layers.len());
        let mut suffixes = Vec::new();
        let mut stack = Vec::new();
        for (pos, l) in decl.layers.iter().enumerate() {
            let ctx = format!("{}.{}", decl.name, l.name);
            let kind = match &l.spec {
                LayerSpec::Sync { ty, value } => {
                    self.fixed_bytes(&ctx, *ty)?;
                    LayerKind::Sync {
                        field: self.int(*ty).with_default(*value),
                    }
                }
                LayerSpec::Size { ty, offset, max } => LayerKind::Size {
                    field: self.int(*ty).with_offset(*offset),
                    max: *max,
                },
                LayerSpec::Id { ty } => {
                    let field = self.field(&ctx, ty, &FieldAttrs::default(), &mut stack)?;
                    if let Some(e) = field.as_enum() {
                        id_names = e
                            .names()
                            .iter()
                            .map(|(v, n)| (n.clone(), *v as u64))
                            .collect();
                    }
                    LayerKind::Id { field }
                }
                LayerSpec::Transport { ty, version } => LayerKind::Transport {
                    field: self.int(*ty),
                    version: *version,
                },
                LayerSpec::Checksum { ty, algo, over } => {
                    let algo = ChecksumAlgo::from_name(algo)
                        .ok_or_else(|| frame_err(format!("unknown checksum algorithm `{}`", algo)))?;
                    let placement = if pos > payload_pos {
                        ChecksumPlacement::Suffix
                    } else {
                        ChecksumPlacement::Prefix
                    };
                    if placement == ChecksumPlacement::Suffix {
                        suffixes.push(over.clone());
                    } else if over.is_some() {
                        return Err(frame_err(format!(
                            "`{}`: `over` only applies to a checksum after the payload",
                            l.name
                        )));
                    }
                    LayerKind::Checksum {
                        field: self.int(*ty),
                        algo,
                        placement,
                    }
                }
                LayerSpec::Payload => LayerKind::Payload,
            };
            if pos > payload_pos && !matches!(kind, LayerKind::Checksum { .. }) {
                return Err(frame_err(format!(
                    "only checksums may follow the payload, found `{}`",
                    l.name
                )));
            }
            nested.push(Layer::new(l.name.clone(), kind));
        }

        let trailing = nested.split_off(payload_pos + 1);
        for (layer, over) in trailing.into_iter().zip(suffixes) {
            let at = match over {
                Some(name) => nested
                    .iter()
                    .position(|l| l.name == name)
                    .ok_or_else(|| unknown("layer", &name))?,
                None => nested
                    .iter()
                    .position(|l| !matches!(l.kind, LayerKind::Sync { .. }))
                    .unwrap_or(0),
            };
            nested.insert(at, layer);
        }
        Ok((nested, id_names))
    }
}

/// Rough count of the values a field prototype holds once built.
fn weight(f: &Field) -> usize {
    fn sum<'a>(fields: impl Iterator<Item = &'a Field>) -> usize {
        fields.map(weight).fold(1, usize::saturating_add)
    }
    match f {
        Field::Bytes(b) => 1 + b.data().len(),
        Field::String(s) => 1 + s.raw().len(),
        Field::List(l) => sum(l.elements().iter().chain(std::iter::once(l.prototype()))),
        Field::Bundle(b) => sum(b.members().iter().map(|m| &m.field)),
        Field::Bitfield(b) => sum(b.members().iter().map(|m| &m.field)),
        Field::Optional(o) => weight(o.inner()).saturating_add(1),
        Field::Variant(v) => v
            .current()
            .map(|b| sum(b.members().iter().map(|m| &m.field)))
            .unwrap_or(1)
            .saturating_mul(v.alternatives().count()),
        _ => 1,
    }
}

fn opt_mode(mode: OptModeSpec) -> OptionalMode {
    match mode {
        OptModeSpec::Missing => OptionalMode::Missing,
        OptModeSpec::Exists => OptionalMode::Exists,
        OptModeSpec::Tentative => OptionalMode::Tentative,
    }
}
