//! Variant: tagged union of bundle alternatives.
//!
//! Each alternative is a bundle whose first member (integer or enum) carries a constant tag, its
//! default value. Reading probes the tag of every alternative on a copy of the input and then
//! decodes the matching bundle in full. An unrecognized tag is a hard `InvalidMessageData`.

use super::{BundleField, Field};
use crate::error::{CodecError, DefinitionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct VariantField {
    /// Every entry holds a `Field::Bundle`.
    alternatives: Vec<(String, Field)>,
    tags: Vec<i64>,
    current: usize,
}

fn tag_of(bundle: &BundleField) -> Option<i64> {
    match bundle.member_at(0)? {
        Field::Int(f) => Some(f.default_value()),
        Field::Enum(f) => Some(f.storage().default_value()),
        _ => None,
    }
}

impl VariantField {
    /// The first alternative starts out selected.
    pub fn new(
        alternatives: Vec<(String, BundleField)>,
    ) -> std::result::Result<Self, DefinitionError> {
        if alternatives.is_empty() {
            return Err(DefinitionError::Invalid(
                "variant needs at least one alternative".into(),
            ));
        }
        let mut tags = Vec::with_capacity(alternatives.len());
        for (name, bundle) in &alternatives {
            let tag = tag_of(bundle).ok_or_else(|| {
                DefinitionError::Invalid(format!(
                    "variant alternative `{}` must start with an integer or enum tag",
                    name
                ))
            })?;
            if tags.contains(&tag) {
                return Err(DefinitionError::Duplicate(format!(
                    "variant tag {} (alternative `{}`)",
                    tag, name
                )));
            }
            tags.push(tag);
        }
        Ok(VariantField {
            alternatives: alternatives
                .into_iter()
                .map(|(name, b)| (name, Field::Bundle(b)))
                .collect(),
            tags,
            current: 0,
        })
    }

    /// `(name, tag)` of every alternative in declaration order.
    pub fn alternatives(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.alternatives
            .iter()
            .zip(&self.tags)
            .map(|((name, _), tag)| (name.as_str(), *tag))
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_name(&self) -> Option<&str> {
        self.alternatives.get(self.current).map(|(n, _)| n.as_str())
    }

    pub fn current_field(&self) -> Option<&Field> {
        self.alternatives.get(self.current).map(|(_, f)| f)
    }

    pub fn current_field_mut(&mut self) -> Option<&mut Field> {
        self.alternatives.get_mut(self.current).map(|(_, f)| f)
    }

    pub fn current(&self) -> Option<&BundleField> {
        self.current_field().and_then(Field::as_bundle)
    }

    pub fn current_mut(&mut self) -> Option<&mut BundleField> {
        self.current_field_mut().and_then(Field::as_bundle_mut)
    }

    /// Switch to alternative `idx`. Returns false when out of range.
    pub fn select(&mut self, idx: usize) -> bool {
        if idx < self.alternatives.len() {
            self.current = idx;
            true
        } else {
            false
        }
    }

    pub fn select_by_name(&mut self, name: &str) -> bool {
        match self.alternatives.iter().position(|(n, _)| n == name) {
            Some(idx) => self.select(idx),
            None => false,
        }
    }

    pub fn select_by_tag(&mut self, tag: i64) -> bool {
        match self.tags.iter().position(|t| *t == tag) {
            Some(idx) => self.select(idx),
            None => false,
        }
    }

    pub fn refresh(&mut self) -> bool {
        self.current_field_mut()
            .map(Field::refresh)
            .unwrap_or(false)
    }

    pub fn reads_to_end(&self) -> bool {
        self.alternatives.iter().any(|(_, f)| f.reads_to_end())
    }

    pub fn valid(&self) -> bool {
        self.current_field().map(Field::valid).unwrap_or(false)
    }

    /// Index of the alternative whose tag matches the head of `src`; nothing is consumed.
    fn probe(&self, src: &[u8]) -> Result<usize> {
        let mut missing: Option<usize> = None;
        for (idx, (_, alt)) in self.alternatives.iter().enumerate() {
            let Some(proto) = alt.as_bundle().and_then(|b| b.member_at(0)) else {
                continue;
            };
            let mut tag = proto.clone();
            let mut head = src;
            match tag.read(&mut head) {
                Ok(()) => {
                    if tag.value().as_i64() == Some(self.tags[idx]) {
                        return Ok(idx);
                    }
                }
                Err(CodecError::NotEnoughData { missing: m }) => {
                    missing = Some(missing.map_or(m, |x| x.min(m)));
                }
                Err(_) => {}
            }
        }
        match missing {
            Some(missing) => Err(CodecError::NotEnoughData { missing }),
            None => Err(CodecError::InvalidMessageData(
                "unrecognized variant tag".into(),
            )),
        }
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        let idx = self.probe(src)?;
        self.current = idx;
        self.alternatives[idx].1.read(src)
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self.current_field() {
            Some(f) => f.write(out),
            None => Ok(()),
        }
    }

    pub fn length(&self) -> usize {
        self.current_field().map(Field::length).unwrap_or(0)
    }

    pub fn min_length(&self) -> usize {
        self.alternatives
            .iter()
            .map(|(_, f)| f.min_length())
            .min()
            .unwrap_or(0)
    }

    pub fn max_length(&self) -> usize {
        self.alternatives
            .iter()
            .map(|(_, f)| f.max_length())
            .max()
            .unwrap_or(0)
    }
}
