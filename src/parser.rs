//! Parse protocol description source into AST using PEST.

use crate::ast::*;
use crate::error::DefinitionError;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct ProtocolParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;
type ParseResult<T> = Result<T, DefinitionError>;

fn perr(msg: impl Into<String>) -> DefinitionError {
    DefinitionError::Parse(msg.into())
}

/// Parse protocol source into AST.
pub fn parse(source: &str) -> ParseResult<Protocol> {
    let pairs = ProtocolParser::parse(Rule::file, source).map_err(|e| perr(e.to_string()))?;
    let pair = pairs.into_iter().next().ok_or_else(|| perr("empty parse"))?;
    build_protocol(pair)
}

fn build_protocol(pair: Pair) -> ParseResult<Protocol> {
    let mut protocol = Protocol::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::protocol_decl => {
                let s = inner.into_inner().next().ok_or_else(|| perr("protocol: name"))?;
                protocol.name = Some(string_value(s));
            }
            Rule::endian_decl => {
                let e = inner.into_inner().next().ok_or_else(|| perr("endian: value"))?;
                protocol.endian = Some(match e.as_str() {
                    "little" => EndianSpec::Little,
                    _ => EndianSpec::Big,
                });
            }
            Rule::enum_decl => protocol.enums.push(build_enum(inner)?),
            Rule::bitmask_decl => protocol.bitmasks.push(build_bitmask(inner)?),
            Rule::struct_decl => {
                let (name, fields) = build_named_fields(inner)?;
                protocol.structs.push(StructDecl { name, fields });
            }
            Rule::bitfield_decl => protocol.bitfields.push(build_bitfield(inner)?),
            Rule::variant_decl => {
                let mut it = inner.into_inner();
                let name = next_str(&mut it, "variant: name")?;
                let alternatives = it.map(|p| p.as_str().to_string()).collect();
                protocol.variants.push(VariantDecl { name, alternatives });
            }
            Rule::frame_decl => protocol.frames.push(build_frame(inner)?),
            Rule::message_decl => protocol.messages.push(build_message(inner)?),
            _ => {}
        }
    }
    Ok(protocol)
}

fn next_str(it: &mut pest::iterators::Pairs<Rule>, what: &str) -> ParseResult<String> {
    it.next()
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| perr(what))
}

fn string_value(pair: Pair) -> String {
    pair.into_inner()
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn build_enum(pair: Pair) -> ParseResult<EnumDecl> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "enum: name")?;
    let storage = build_int_type(it.next().ok_or_else(|| perr("enum: storage"))?)?;
    let mut strict = false;
    let mut values = Vec::new();
    for p in it {
        match p.as_rule() {
            Rule::strict_kw => strict = true,
            Rule::enum_item => {
                let mut item = p.into_inner();
                let n = next_str(&mut item, "enum item: name")?;
                let v = item.next().ok_or_else(|| perr("enum item: value"))?;
                values.push((n, parse_int(v.as_str())?));
            }
            _ => {}
        }
    }
    Ok(EnumDecl {
        name,
        storage,
        strict,
        values,
    })
}

fn build_bitmask(pair: Pair) -> ParseResult<BitmaskDecl> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "bitmask: name")?;
    let storage = build_int_type(it.next().ok_or_else(|| perr("bitmask: storage"))?)?;
    let mut decl = BitmaskDecl {
        name,
        storage,
        reserved: None,
        strict: false,
        bits: Vec::new(),
    };
    for p in it {
        match p.as_rule() {
            Rule::reserved_spec => {
                let nums = p
                    .into_inner()
                    .map(|n| parse_int(n.as_str()).map(|v| v as u64))
                    .collect::<ParseResult<Vec<_>>>()?;
                let mask = nums.first().copied().unwrap_or(0);
                decl.reserved = Some((mask, nums.get(1).copied().unwrap_or(0)));
            }
            Rule::strict_kw => decl.strict = true,
            Rule::bit_item => {
                let mut item = p.into_inner();
                let n = next_str(&mut item, "bit: name")?;
                let idx = item.next().ok_or_else(|| perr("bit: index"))?;
                let idx = u32::try_from(parse_int(idx.as_str())?)
                    .map_err(|_| perr(format!("bit `{}`: bad index", n)))?;
                decl.bits.push((n, idx));
            }
            _ => {}
        }
    }
    Ok(decl)
}

fn build_bitfield(pair: Pair) -> ParseResult<BitfieldDecl> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "bitfield: name")?;
    let storage = build_int_type(it.next().ok_or_else(|| perr("bitfield: storage"))?)?;
    let fields = it.map(build_field).collect::<ParseResult<Vec<_>>>()?;
    Ok(BitfieldDecl {
        name,
        storage,
        fields,
    })
}

fn build_named_fields(pair: Pair) -> ParseResult<(String, Vec<FieldDecl>)> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "struct: name")?;
    let fields = it.map(build_field).collect::<ParseResult<Vec<_>>>()?;
    Ok((name, fields))
}

fn build_frame(pair: Pair) -> ParseResult<FrameDecl> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "frame: name")?;
    let mut layers = Vec::new();
    for layer in it {
        let mut parts = layer.into_inner();
        let first = parts.next().ok_or_else(|| perr("frame: empty layer"))?;
        if first.as_rule() == Rule::payload_kw {
            layers.push(LayerDecl {
                name: "payload".into(),
                spec: LayerSpec::Payload,
            });
            continue;
        }
        let layer_name = first.as_str().to_string();
        let spec = parts
            .next()
            .ok_or_else(|| perr(format!("layer `{}`: missing spec", layer_name)))?;
        layers.push(LayerDecl {
            spec: build_layer_spec(&layer_name, spec)?,
            name: layer_name,
        });
    }
    Ok(FrameDecl { name, layers })
}

fn build_layer_spec(layer: &str, pair: Pair) -> ParseResult<LayerSpec> {
    let rule = pair.as_rule();
    let mut it = pair.into_inner();
    let mut opts = Vec::new();
    let spec = match rule {
        Rule::sync_layer => {
            let ty = build_int_type(it.next().ok_or_else(|| perr("sync: type"))?)?;
            let value = parse_int(it.next().ok_or_else(|| perr("sync: value"))?.as_str())?;
            LayerSpec::Sync { ty, value }
        }
        Rule::size_layer => {
            let ty = build_int_type(it.next().ok_or_else(|| perr("size: type"))?)?;
            opts.extend(it.map(layer_opt));
            let mut offset = 0;
            let mut max = None;
            for (k, v) in &opts {
                match k.as_str() {
                    "offset" => offset = parse_int(v)?,
                    "max" => {
                        max = Some(
                            usize::try_from(parse_int(v)?)
                                .map_err(|_| perr(format!("layer `{}`: bad max", layer)))?,
                        )
                    }
                    other => {
                        return Err(perr(format!("layer `{}`: unknown option `{}`", layer, other)))
                    }
                }
            }
            LayerSpec::Size { ty, offset, max }
        }
        Rule::id_layer => LayerSpec::Id {
            ty: build_type_spec(it.next().ok_or_else(|| perr("id: type"))?)?,
        },
        Rule::transport_layer => {
            let ty = build_int_type(it.next().ok_or_else(|| perr("transport: type"))?)?;
            LayerSpec::Transport {
                ty,
                version: it.next().is_some(),
            }
        }
        Rule::checksum_layer => {
            let ty = build_int_type(it.next().ok_or_else(|| perr("checksum: type"))?)?;
            let algo = next_str(&mut it, "checksum: algorithm")?;
            let mut over = None;
            for (k, v) in it.map(layer_opt) {
                match k.as_str() {
                    "over" => over = Some(v),
                    other => {
                        return Err(perr(format!("layer `{}`: unknown option `{}`", layer, other)))
                    }
                }
            }
            LayerSpec::Checksum { ty, algo, over }
        }
        other => return Err(perr(format!("layer `{}`: unexpected {:?}", layer, other))),
    };
    Ok(spec)
}

fn layer_opt(pair: Pair) -> (String, String) {
    let mut it = pair.into_inner();
    let k = it.next().map(|p| p.as_str().to_string()).unwrap_or_default();
    let v = it.next().map(|p| p.as_str().to_string()).unwrap_or_default();
    (k, v)
}

fn build_message(pair: Pair) -> ParseResult<MessageDecl> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "message: name")?;
    let id_pair = it
        .next()
        .and_then(|p| p.into_inner().next())
        .ok_or_else(|| perr(format!("message `{}`: id", name)))?;
    let id = match id_pair.as_rule() {
        Rule::qualified => {
            let mut q = id_pair.into_inner();
            MsgIdRef::Named {
                enum_name: next_str(&mut q, "message id: enum")?,
                item: next_str(&mut q, "message id: item")?,
            }
        }
        _ => {
            let v = parse_int(id_pair.as_str())?;
            MsgIdRef::Number(
                u64::try_from(v).map_err(|_| perr(format!("message `{}`: negative id", name)))?,
            )
        }
    };
    let mut decl = MessageDecl {
        name,
        id,
        display: None,
        versioned: false,
        fields: Vec::new(),
    };
    for p in it {
        match p.as_rule() {
            Rule::string => decl.display = Some(string_value(p)),
            Rule::versioned_kw => decl.versioned = true,
            Rule::field_decl => decl.fields.push(build_field(p)?),
            _ => {}
        }
    }
    Ok(decl)
}

fn build_field(pair: Pair) -> ParseResult<FieldDecl> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it, "field: name")?;
    let ty = build_type_spec(
        it.next()
            .ok_or_else(|| perr(format!("field `{}`: type", name)))?,
    )?;
    let mut attrs = FieldAttrs::default();
    for a in it {
        match a.as_rule() {
            Rule::ranges => {
                for item in a.into_inner() {
                    let mut bounds = item.into_inner();
                    let lo = parse_value(bounds.next().ok_or_else(|| perr("range: bound"))?)?;
                    let hi = match bounds.next() {
                        Some(p) => parse_value(p)?,
                        None => lo.clone(),
                    };
                    attrs.ranges.push((lo, hi));
                }
            }
            Rule::default_val => {
                let v = a.into_inner().next().ok_or_else(|| perr("default: value"))?;
                attrs.default = Some(match v.as_rule() {
                    Rule::string => Literal::Str(string_value(v)),
                    Rule::ident => Literal::Ident(v.as_str().to_string()),
                    _ => parse_value(v)?,
                });
            }
            Rule::special => {
                let mut s = a.into_inner();
                let n = next_str(&mut s, "special: name")?;
                let v = parse_value(s.next().ok_or_else(|| perr("special: value"))?)?;
                attrs.specials.push((n, v));
            }
            Rule::scale => {
                let mut s = a.into_inner();
                let num = parse_int(&next_str(&mut s, "scale: numerator")?)?;
                let den = parse_int(&next_str(&mut s, "scale: denominator")?)?;
                attrs.scale = Some((num, den));
            }
            Rule::offset => attrs.offset = Some(parse_int(&first_str(a)?)?),
            Rule::units => {
                let s = a.into_inner().next().ok_or_else(|| perr("units: value"))?;
                attrs.units = Some(string_value(s));
            }
            Rule::bits => {
                attrs.bits = Some(
                    u32::try_from(parse_int(&first_str(a)?)?)
                        .map_err(|_| perr(format!("field `{}`: bad bit count", name)))?,
                )
            }
            Rule::strict_kw => attrs.strict = true,
            Rule::remaining_kw => attrs.remaining_length = true,
            Rule::decimals => {
                attrs.decimals = Some(
                    u8::try_from(parse_int(&first_str(a)?)?)
                        .map_err(|_| perr(format!("field `{}`: bad decimals", name)))?,
                )
            }
            Rule::condition => attrs.condition = Some(build_condition(a)?),
            _ => {}
        }
    }
    Ok(FieldDecl { name, ty, attrs })
}

fn first_str(pair: Pair) -> ParseResult<String> {
    let what = format!("{:?}: value", pair.as_rule());
    next_str(&mut pair.into_inner(), &what)
}

fn build_condition(pair: Pair) -> ParseResult<CondSpec> {
    let c = pair
        .into_inner()
        .next()
        .ok_or_else(|| perr("condition: empty"))?;
    match c.as_rule() {
        Rule::version_cond => {
            let mut it = c.into_inner();
            it.next();
            let op = match it.next().map(|p| p.as_str()) {
                Some(">=") => CmpOp::AtLeast,
                _ => CmpOp::Below,
            };
            let v = parse_int(&next_str(&mut it, "version condition: value")?)?;
            Ok(CondSpec::Version {
                op,
                value: u64::try_from(v).map_err(|_| perr("version condition: negative"))?,
            })
        }
        _ => {
            let mut negate = false;
            let mut idents = Vec::new();
            for p in c.into_inner() {
                match p.as_rule() {
                    Rule::not_op => negate = true,
                    _ => idents.push(p.as_str().to_string()),
                }
            }
            match <[String; 2]>::try_from(idents) {
                Ok([mask, bit]) => Ok(CondSpec::Bit { mask, bit, negate }),
                Err(_) => Err(perr("bit condition: expected mask.bit")),
            }
        }
    }
}

fn build_int_type(pair: Pair) -> ParseResult<IntType> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| perr("integer type: empty"))?;
    match inner.as_rule() {
        Rule::prim_int => {
            let s = inner.as_str();
            let bits: usize = s[1..].parse().map_err(|_| perr(format!("bad type {}", s)))?;
            Ok(IntType::Fixed {
                bytes: bits / 8,
                signed: s.starts_with('i'),
            })
        }
        Rule::wide_int => {
            let mut it = inner.into_inner();
            let signed = next_str(&mut it, "integer kind")? == "int";
            let bytes = parse_int(&next_str(&mut it, "integer width")?)?;
            if !(1..=8).contains(&bytes) {
                return Err(perr(format!("integer width {} not in 1..=8", bytes)));
            }
            Ok(IntType::Fixed {
                bytes: bytes as usize,
                signed,
            })
        }
        Rule::var_int => {
            let mut it = inner.into_inner();
            let signed = next_str(&mut it, "varint kind")? == "varint";
            let min = parse_int(&next_str(&mut it, "varint min")?)?;
            let max = parse_int(&next_str(&mut it, "varint max")?)?;
            if min < 1 || max < min || max > 10 {
                return Err(perr(format!("var-length bounds {}..{} invalid", min, max)));
            }
            Ok(IntType::Var {
                min: min as usize,
                max: max as usize,
                signed,
            })
        }
        other => Err(perr(format!("unexpected integer type {:?}", other))),
    }
}

fn build_type_spec(pair: Pair) -> ParseResult<TypeSpec> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| perr("type: empty"))?;
    match inner.as_rule() {
        Rule::int_type => Ok(TypeSpec::Int(build_int_type(inner)?)),
        Rule::float_type => Ok(TypeSpec::Float {
            double: inner.as_str().starts_with("double"),
        }),
        Rule::string_type => Ok(TypeSpec::String(build_size(
            inner.into_inner().next().ok_or_else(|| perr("string: size"))?,
        )?)),
        Rule::bytes_type => Ok(TypeSpec::Bytes(build_size(
            inner.into_inner().next().ok_or_else(|| perr("bytes: size"))?,
        )?)),
        Rule::list_type => {
            let mut it = inner.into_inner();
            let elem = build_type_spec(it.next().ok_or_else(|| perr("list: element"))?)?;
            let size = build_size(it.next().ok_or_else(|| perr("list: size"))?)?;
            let elem_length = match it.next() {
                Some(p) => Some(build_int_type(
                    p.into_inner().next().ok_or_else(|| perr("elem_length: type"))?,
                )?),
                None => None,
            };
            Ok(TypeSpec::List {
                elem: Box::new(elem),
                size,
                elem_length,
            })
        }
        Rule::optional_type => {
            let mut it = inner.into_inner();
            let inner_ty = build_type_spec(it.next().ok_or_else(|| perr("optional: inner"))?)?;
            let mode = match it.next().map(|p| p.as_str().to_string()).as_deref() {
                Some("missing") => OptModeSpec::Missing,
                Some("tentative") => OptModeSpec::Tentative,
                _ => OptModeSpec::Exists,
            };
            Ok(TypeSpec::Optional {
                inner: Box::new(inner_ty),
                mode,
            })
        }
        Rule::type_ref => Ok(TypeSpec::Named(inner.as_str().to_string())),
        other => Err(perr(format!("unexpected type {:?}", other))),
    }
}

fn build_size(pair: Pair) -> ParseResult<SizeSpec> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| perr("size: empty"))?;
    match inner.as_rule() {
        Rule::fixed_size => {
            let n = parse_int(&first_str(inner)?)?;
            Ok(SizeSpec::Fixed(
                usize::try_from(n).map_err(|_| perr("fixed size: negative"))?,
            ))
        }
        Rule::count_size => Ok(SizeSpec::Count(build_int_type(
            inner.into_inner().next().ok_or_else(|| perr("count: type"))?,
        )?)),
        Rule::length_size => Ok(SizeSpec::Length(build_int_type(
            inner.into_inner().next().ok_or_else(|| perr("length: type"))?,
        )?)),
        _ => Ok(SizeSpec::Rest),
    }
}

fn parse_value(pair: Pair) -> ParseResult<Literal> {
    let s = pair.as_str();
    match pair.as_rule() {
        Rule::float_word => Ok(Literal::Float(match s {
            "nan" | "-nan" => f64::NAN,
            "-inf" => f64::NEG_INFINITY,
            _ => f64::INFINITY,
        })),
        _ if s.contains('.') => s
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| perr(format!("bad number {}", s))),
        _ => parse_int(s).map(Literal::Int),
    }
}

/// Decimal or `0x` hex integer, optionally negative.
pub fn parse_int(s: &str) -> ParseResult<i64> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    }
    .map_err(|_| perr(format!("bad integer {}", s)))?;
    if neg {
        Ok((magnitude as i64).wrapping_neg())
    } else {
        Ok(magnitude as i64)
    }
}
