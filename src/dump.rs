//! Format decoded messages for display (dump text). Uses each field's scaling, units, specials
//! and name tables.

use crate::field::{
    BitfieldField, BitmaskField, BundleField, BytesField, EnumField, FieldVisitor, FloatField,
    IntField, ListField, OptionalField, StringField, UnknownField, VariantField,
};
use crate::message::{Message, MessageClass};

pub fn hex_string(b: &[u8]) -> String {
    b.iter()
        .map(|x| format!("{:02x}", x))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Integer text: special name, or physical value with units followed by the raw value.
pub fn format_int(f: &IntField) -> String {
    if let Some(name) = f.special_name() {
        return format!("{} ({})", name, f.value());
    }
    let scaled = f.scaling().is_some();
    match (scaled, f.units()) {
        (false, None) => format!("{}", f.value()),
        (false, Some(u)) => format!("{} {}", f.value(), u),
        (true, None) => format!("{} ({})", f.scaled(), f.value()),
        (true, Some(u)) => format!("{} {} ({})", f.scaled(), u, f.value()),
    }
}

pub fn format_float(f: &FloatField) -> String {
    if let Some(name) = f.special_name() {
        return name.to_string();
    }
    let text = format!("{:.*}", f.decimals() as usize, f.value());
    match f.units() {
        Some(u) => format!("{} {}", text, u),
        None => text,
    }
}

pub fn format_enum(f: &EnumField) -> String {
    match f.value_name() {
        Some(name) => format!("{} ({})", name, f.value()),
        None => format!("{} (unknown)", f.value()),
    }
}

pub fn format_bitmask(f: &BitmaskField) -> String {
    let width = f.bytes() * 2;
    let set: Vec<String> = (0..f.bytes() as u32 * 8)
        .filter(|&i| f.bit(i))
        .map(|i| match f.bit_name(i) {
            Some(n) => n.to_string(),
            None => format!("bit{}", i),
        })
        .collect();
    format!("0x{:0width$x} [{}]", f.value(), set.join(", "), width = width)
}

/// Indented text tree built by visiting a message's fields.
#[derive(Debug, Default)]
pub struct TreeDump {
    out: String,
    depth: usize,
}

impl TreeDump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, name: &str, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        if text.is_empty() {
            self.out.push_str(name);
        } else {
            self.out.push_str(name);
            self.out.push_str(": ");
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }
}

impl FieldVisitor for TreeDump {
    fn visit_int(&mut self, name: &str, field: &IntField) {
        self.line(name, &format_int(field));
    }

    fn visit_enum(&mut self, name: &str, field: &EnumField) {
        self.line(name, &format_enum(field));
    }

    fn visit_bitmask(&mut self, name: &str, field: &BitmaskField) {
        self.line(name, &format_bitmask(field));
    }

    fn visit_float(&mut self, name: &str, field: &FloatField) {
        self.line(name, &format_float(field));
    }

    fn visit_string(&mut self, name: &str, field: &StringField) {
        self.line(name, &format!("{:?}", field.as_str()));
    }

    fn visit_bytes(&mut self, name: &str, field: &BytesField) {
        self.line(name, &format!("hex({})", hex_string(field.data())));
    }

    fn visit_list(&mut self, name: &str, field: &ListField) {
        if field.is_empty() {
            self.line(name, "[]");
            return;
        }
        self.line(name, &format!("[{}]", field.len()));
        self.nested(|d| {
            for (i, elem) in field.elements().iter().enumerate() {
                elem.accept(&format!("[{}]", i), d);
            }
        });
    }

    fn visit_bitfield(&mut self, name: &str, field: &BitfieldField) {
        self.line(name, "");
        self.nested(|d| {
            for m in field.members() {
                m.field.accept(&m.name, d);
            }
        });
    }

    fn visit_bundle(&mut self, name: &str, field: &BundleField) {
        self.line(name, "");
        self.nested(|d| {
            for m in field.members() {
                m.field.accept(&m.name, d);
            }
        });
    }

    fn visit_optional(&mut self, name: &str, field: &OptionalField) {
        match field.field() {
            Some(inner) => inner.accept(name, self),
            None => self.line(name, "<missing>"),
        }
    }

    fn visit_variant(&mut self, name: &str, field: &VariantField) {
        match (field.current_name(), field.current()) {
            (Some(alt), Some(bundle)) => {
                self.line(name, alt);
                self.nested(|d| {
                    for m in bundle.members() {
                        m.field.accept(&m.name, d);
                    }
                });
            }
            _ => self.line(name, "<none>"),
        }
    }

    fn visit_unknown(&mut self, name: &str, field: &UnknownField) {
        self.line(name, &format!("hex({})", hex_string(field.data())));
    }
}

/// Multi-line dump of a message: a header line, transport fields, then the payload tree.
pub fn dump_message(msg: &Message) -> String {
    let mut d = TreeDump::new();
    let header = match msg.class() {
        MessageClass::Regular => format!("{} (id {})", msg.display_name(), msg.id_as_string()),
        MessageClass::RawData => format!("raw data (id {})", msg.id_as_string()),
        MessageClass::Invalid(reason) => format!("invalid: {:?}", reason),
    };
    d.line(&header, "");
    d.nested(|d| {
        for m in msg.transport_fields() {
            m.field.accept(&format!("@{}", m.name), d);
        }
        msg.accept(d);
        if !msg.frame_bytes().is_empty() {
            d.line("frame", &hex_string(msg.frame_bytes()));
        }
    });
    d.finish()
}

/// First line of [`dump_message`].
pub fn summary_line(msg: &Message) -> String {
    dump_message(msg)
        .lines()
        .next()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
