//! Homogeneous list of elements cloned from a prototype field.
//!
//! Size policies: fixed count, count prefix, total-length prefix or "until end of input".
//! Elements may additionally carry their own serialized-length prefix; bytes inside such a
//! prefixed region that the element does not read are kept and written back with it.

use super::{take, Field, IntField, SizePrefix};
use crate::error::{CodecError, Result};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ListField {
    prototype: Box<Field>,
    elements: Vec<Field>,
    size: SizePrefix,
    elem_length: Option<IntField>,
    // unread bytes per element region, parallel to `elements`
    elem_tails: Vec<Vec<u8>>,
}

impl ListField {
    pub fn new(prototype: impl Into<Field>, size: SizePrefix) -> Self {
        let prototype = Box::new(prototype.into());
        let elements = match size {
            SizePrefix::Fixed(n) => vec![(*prototype).clone(); n],
            _ => Vec::new(),
        };
        ListField {
            prototype,
            elements,
            size,
            elem_length: None,
            elem_tails: Vec::new(),
        }
    }

    /// Prefix every element with its own serialized length.
    pub fn with_elem_length(mut self, prefix: IntField) -> Self {
        self.elem_length = Some(prefix);
        self
    }

    pub fn prototype(&self) -> &Field {
        &self.prototype
    }

    pub fn size(&self) -> &SizePrefix {
        &self.size
    }

    pub fn elem_length(&self) -> Option<&IntField> {
        self.elem_length.as_ref()
    }

    pub fn elements(&self) -> &[Field] {
        &self.elements
    }

    /// Mutable access to the elements; drops any bytes kept from element regions.
    pub fn elements_mut(&mut self) -> &mut Vec<Field> {
        self.elem_tails.clear();
        &mut self.elements
    }

    /// Unread bytes of element `idx`'s length-prefixed region.
    pub fn element_tail(&self, idx: usize) -> &[u8] {
        self.elem_tails.get(idx).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Append a default element and return it for editing.
    pub fn push_default(&mut self) -> &mut Field {
        let idx = self.elements.len();
        self.elements.push((*self.prototype).clone());
        &mut self.elements[idx]
    }

    pub fn set_values(&mut self, items: &[Value]) -> bool {
        let mut elems = Vec::with_capacity(items.len());
        for item in items {
            let mut e = (*self.prototype).clone();
            if !e.set_value(item) {
                return false;
            }
            elems.push(e);
        }
        self.elements = elems;
        self.elem_tails.clear();
        true
    }

    pub fn refresh(&mut self) -> bool {
        self.elements
            .iter_mut()
            .fold(false, |changed, e| e.refresh() || changed)
    }

    pub fn valid(&self) -> bool {
        let count_ok = match self.size {
            SizePrefix::Fixed(n) => self.elements.len() == n,
            _ => true,
        };
        count_ok && self.elements.iter().all(Field::valid)
    }

    pub fn read(&mut self, src: &mut &[u8]) -> Result<()> {
        let mut elems = Vec::new();
        let mut tails = Vec::new();
        let mut push = |(elem, tail): (Field, Vec<u8>)| {
            elems.push(elem);
            tails.push(tail);
        };
        match self.size {
            SizePrefix::Fixed(n) => {
                for _ in 0..n {
                    push(self.read_element(src)?);
                }
            }
            SizePrefix::Count(_) => {
                let count = self.size.read_prefix(src)?.unwrap_or(0);
                for _ in 0..count {
                    push(self.read_element(src)?);
                }
            }
            SizePrefix::Length(_) => {
                let len = self.size.read_prefix(src)?.unwrap_or(0);
                let mut region = take(src, len)?;
                while !region.is_empty() {
                    let before = region.len();
                    push(
                        self.read_element(&mut region)
                            .map_err(|e| e.bounded("list"))?,
                    );
                    if region.len() == before {
                        return Err(CodecError::InvalidMessageData(
                            "list element consumed no bytes".into(),
                        ));
                    }
                }
            }
            SizePrefix::Remainder => {
                while !src.is_empty() {
                    let before = src.len();
                    push(self.read_element(src)?);
                    if src.len() == before {
                        return Err(CodecError::InvalidMessageData(
                            "list element consumed no bytes".into(),
                        ));
                    }
                }
            }
        }
        self.elements = elems;
        self.elem_tails = tails;
        Ok(())
    }

    fn read_element(&self, src: &mut &[u8]) -> Result<(Field, Vec<u8>)> {
        let mut elem = (*self.prototype).clone();
        match &self.elem_length {
            Some(prefix) => {
                let mut p = prefix.clone();
                p.read(src)?;
                if p.value() < 0 {
                    return Err(CodecError::InvalidMessageData(format!(
                        "negative element length {}",
                        p.value()
                    )));
                }
                let mut chunk = take(src, p.value() as usize)?;
                elem.read(&mut chunk)
                    .map_err(|e| e.bounded("list element"))?;
                Ok((elem, chunk.to_vec()))
            }
            None => {
                elem.read(src)?;
                Ok((elem, Vec::new()))
            }
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        let padding;
        let elems: Vec<&Field> = match self.size {
            SizePrefix::Fixed(n) => {
                padding = vec![(*self.prototype).clone(); n.saturating_sub(self.elements.len())];
                self.elements.iter().take(n).chain(padding.iter()).collect()
            }
            _ => self.elements.iter().collect(),
        };
        for (i, e) in elems.iter().enumerate() {
            self.write_element(e, self.element_tail(i), &mut body)?;
        }
        match self.size {
            SizePrefix::Count(_) => self.size.write_prefix(elems.len(), out)?,
            SizePrefix::Length(_) => self.size.write_prefix(body.len(), out)?,
            _ => {}
        }
        out.extend_from_slice(&body);
        Ok(())
    }

    fn write_element(&self, elem: &Field, tail: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match &self.elem_length {
            Some(prefix) => {
                let mut tmp = Vec::new();
                elem.write(&mut tmp)?;
                tmp.extend_from_slice(tail);
                let mut p = prefix.clone();
                p.set_value(tmp.len() as i64);
                p.write(out)?;
                out.extend_from_slice(&tmp);
                Ok(())
            }
            None => elem.write(out),
        }
    }

    fn element_length(&self, elem: &Field, tail: &[u8]) -> usize {
        let n = elem.length() + tail.len();
        match &self.elem_length {
            Some(prefix) => {
                let mut p = prefix.clone();
                p.set_value(n as i64);
                p.length() + n
            }
            None => n,
        }
    }

    pub fn length(&self) -> usize {
        let body: usize = match self.size {
            SizePrefix::Fixed(n) => {
                let present: usize = self
                    .elements
                    .iter()
                    .take(n)
                    .enumerate()
                    .map(|(i, e)| self.element_length(e, self.element_tail(i)))
                    .sum();
                let missing = n.saturating_sub(self.elements.len());
                present + missing * self.element_length(&self.prototype, &[])
            }
            _ => self
                .elements
                .iter()
                .enumerate()
                .map(|(i, e)| self.element_length(e, self.element_tail(i)))
                .sum(),
        };
        match self.size {
            SizePrefix::Count(_) => self.size.prefix_length(self.elements.len()) + body,
            SizePrefix::Length(_) => self.size.prefix_length(body) + body,
            _ => body,
        }
    }

    pub fn min_length(&self) -> usize {
        match self.size {
            SizePrefix::Fixed(n) => {
                let per_elem = self.prototype.min_length()
                    + self.elem_length.as_ref().map(IntField::min_length).unwrap_or(0);
                n * per_elem
            }
            _ => self.size.min_prefix_length(),
        }
    }

    pub fn max_length(&self) -> usize {
        match self.size {
            SizePrefix::Fixed(n) => {
                let per_elem = self.prototype.max_length().saturating_add(
                    self.elem_length.as_ref().map(IntField::max_length).unwrap_or(0),
                );
                n.saturating_mul(per_elem)
            }
            _ => usize::MAX,
        }
    }
}
