//! Protocol description tests: syntax (parse) and semantics (resolve into frames and messages).

use commskit::ast::{
    CondSpec, EndianSpec, IntType, LayerSpec, MsgIdRef, OptModeSpec, SizeSpec, TypeSpec,
};
use commskit::field::OptionalMode;
use commskit::{parse, resolve, DefinitionError, Engine, Field, MessageClass, Value};

const FRAME: &str = r#"
frame F {
    sync: sync(u8, 0x7e);
    size: size(u8);
    id: id(u8);
    payload;
}
"#;

fn with_frame(body: &str) -> String {
    format!("{}\n{}", FRAME, body)
}

// ==================== Syntax ====================

#[test]
fn parse_empty_source() {
    let p = parse("").expect("empty source parses");
    assert!(p.messages.is_empty());
    assert!(p.frames.is_empty());
    assert!(p.name.is_none());
}

#[test]
fn parse_header_and_enum() {
    let p = parse(
        r#"
        // header
        protocol "acme";
        endian little;
        enum Ids: u16 { Ping = 1, Pong = 0x02, }
        /* block comment */
        message Ping = Ids.Ping { }
        "#,
    )
    .expect("parse");
    assert_eq!(p.name.as_deref(), Some("acme"));
    assert_eq!(p.endian, Some(EndianSpec::Little));
    assert_eq!(p.enums[0].values, vec![("Ping".to_string(), 1), ("Pong".to_string(), 2)]);
    assert_eq!(
        p.enums[0].storage,
        IntType::Fixed {
            bytes: 2,
            signed: false
        }
    );
    assert_eq!(
        p.messages[0].id,
        MsgIdRef::Named {
            enum_name: "Ids".into(),
            item: "Ping".into()
        }
    );
}

#[test]
fn parse_integer_storage_forms() {
    let p = parse("message M = 1 { a: uint(3); b: int(5); c: varuint(1, 4); d: varint(2, 3); }")
        .expect("parse");
    let types: Vec<&TypeSpec> = p.messages[0].fields.iter().map(|f| &f.ty).collect();
    assert_eq!(
        types,
        vec![
            &TypeSpec::Int(IntType::Fixed { bytes: 3, signed: false }),
            &TypeSpec::Int(IntType::Fixed { bytes: 5, signed: true }),
            &TypeSpec::Int(IntType::Var { min: 1, max: 4, signed: false }),
            &TypeSpec::Int(IntType::Var { min: 2, max: 3, signed: true }),
        ]
    );
}

#[test]
fn parse_frame_layers() {
    let p = parse(
        r#"
        frame F {
            sync: sync(u16, 0xabcd);
            size: size(u16, offset = 2, max = 100);
            id: id(u8);
            ver: transport(u8, version);
            payload;
            cs: checksum(u32, crc32, over = size);
        }
        "#,
    )
    .expect("parse");
    let layers = &p.frames[0].layers;
    assert_eq!(layers.len(), 6);
    assert!(matches!(layers[0].spec, LayerSpec::Sync { value: 0xabcd, .. }));
    assert!(matches!(
        layers[1].spec,
        LayerSpec::Size {
            offset: 2,
            max: Some(100),
            ..
        }
    ));
    assert!(matches!(layers[3].spec, LayerSpec::Transport { version: true, .. }));
    assert!(matches!(layers[4].spec, LayerSpec::Payload));
    match &layers[5].spec {
        LayerSpec::Checksum { algo, over, .. } => {
            assert_eq!(algo, "crc32");
            assert_eq!(over.as_deref(), Some("size"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn parse_optional_and_conditions() {
    let p = parse(
        r#"
        message M = 1 versioned {
            flags: Flags;
            a: optional<u8, tentative>;
            b: u8 if !flags.on;
            c: u8 if flags.3;
        }
        "#,
    )
    .expect("parse");
    let f = &p.messages[0].fields;
    assert_eq!(
        f[1].ty,
        TypeSpec::Optional {
            inner: Box::new(TypeSpec::Int(IntType::Fixed { bytes: 1, signed: false })),
            mode: OptModeSpec::Tentative,
        }
    );
    assert_eq!(
        f[2].attrs.condition,
        Some(CondSpec::Bit {
            mask: "flags".into(),
            bit: "on".into(),
            negate: true
        })
    );
    assert_eq!(
        f[3].attrs.condition,
        Some(CondSpec::Bit {
            mask: "flags".into(),
            bit: "3".into(),
            negate: false
        })
    );
}

#[test]
fn keywords_followed_by_attributes() {
    let p = parse(
        r#"
        enum Mode: u8 strict { A = 0 }
        message M = 1 versioned {
            a: double decimals(3);
            b: float units("m") special(Inf = inf);
            c: u8 strict [0..3];
            d: u8 remaining_length;
            e: string<rest>;
            f: u8 if version >= 2;
        }
        "#,
    )
    .expect("parse");
    assert!(p.enums[0].strict);
    let m = &p.messages[0];
    assert!(m.versioned);
    assert_eq!(m.fields[0].ty, TypeSpec::Float { double: true });
    assert_eq!(m.fields[0].attrs.decimals, Some(3));
    assert_eq!(m.fields[1].ty, TypeSpec::Float { double: false });
    assert_eq!(m.fields[1].attrs.units.as_deref(), Some("m"));
    assert!(m.fields[2].attrs.strict);
    assert!(m.fields[3].attrs.remaining_length);
    assert_eq!(m.fields[4].ty, TypeSpec::String(SizeSpec::Rest));
    assert!(m.fields[5].attrs.condition.is_some());

    // identifiers that merely start with a keyword stay identifiers
    let p = parse("message M = 1 { a: doubled; b: floaty; }").expect("parse");
    assert_eq!(p.messages[0].fields[0].ty, TypeSpec::Named("doubled".into()));
    assert_eq!(p.messages[0].fields[1].ty, TypeSpec::Named("floaty".into()));
}

#[test]
fn bundled_demo_protocol_loads() {
    let engine = Engine::from_dsl(include_str!("../demos/demo.dsl")).expect("demo loads");
    let names: Vec<String> = engine
        .create_all_messages()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "IntValues",
            "EnumValues",
            "BitmaskValues",
            "Bitfields",
            "Strings",
            "Lists",
            "Optionals",
            "FloatValues",
            "Variants",
        ]
    );
}

#[test]
fn syntax_errors_are_parse_errors() {
    for src in [
        "message M = 1 { a: u8 }",
        "message M { a: u8; }",
        "enum E u8 { A = 0 }",
        "message M = 1 { a: uint(9); }",
        "message M = 1 { a: varuint(3, 2); }",
        "frame F { s: size(u8, bogus = 1); payload; }",
    ] {
        assert!(
            matches!(parse(src), Err(DefinitionError::Parse(_))),
            "expected parse error for {:?}",
            src
        );
    }
}

// ==================== Semantics ====================

#[test]
fn resolves_protocol_name_and_id_names() {
    let src = r#"
        protocol "acme";
        enum Ids: u8 { Ping = 1, Pong = 2 }
        frame F { sync: sync(u8, 0x7e); id: id(Ids); payload; }
        message Ping = Ids.Ping "Ping Request" { seq: u8; }
        message Pong = Ids.Pong { }
    "#;
    let p = resolve(&parse(src).expect("parse")).expect("resolve");
    assert_eq!(p.name, "acme");
    let factory = p.frame.factory();
    assert_eq!(factory.id_names().len(), 2);
    let ping = p.frame.create_message("Ping", 0).expect("by id name");
    assert_eq!(ping.display_name(), "Ping Request");
    assert_eq!(p.frame.create_message("2", 0).map(|m| m.name().to_string()).as_deref(), Some("Pong"));
}

#[test]
fn little_endian_applies_to_frame_and_fields() {
    let src = r#"
        endian little;
        frame F { sync: sync(u16, 0xabcd); id: id(u8); payload; }
        message M = 1 { a: u16 = 0x0102; }
    "#;
    let engine = Engine::from_dsl(src).expect("engine");
    let msg = engine.create_message("1", 0).expect("message");
    assert_eq!(engine.write(&msg).expect("write"), vec![0xcd, 0xab, 1, 0x02, 0x01]);
}

#[test]
fn special_name_as_default() {
    let engine = Engine::from_dsl(&with_frame(
        "message M = 1 { a: u16 special(Unset = 0xffff) = Unset; }",
    ))
    .expect("engine");
    let msg = engine.create_message("1", 0).expect("message");
    assert_eq!(msg.field("a").map(Field::value), Some(Value::Int(0xffff)));
}

#[test]
fn conditions_become_optionals() {
    let engine = Engine::from_dsl(&with_frame(
        r#"
        bitmask Flags: u8 { on = 0 }
        message M = 1 {
            flags: Flags;
            when_off: u8 if !flags.on;
            when_on: u8 if flags.0;
        }
        "#,
    ))
    .expect("engine");
    let msg = engine.create_message("1", 0).expect("message");
    let mode = |name: &str| {
        msg.field(name)
            .and_then(Field::as_optional)
            .map(|o| o.mode())
    };
    assert_eq!(mode("when_off"), Some(OptionalMode::Exists));
    assert_eq!(mode("when_on"), Some(OptionalMode::Missing));

    let mut engine = engine;
    let msgs = engine.read_data(&[0x7e, 3, 1, 0x01, 9], true);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].class(), MessageClass::Regular);
    assert_eq!(msgs[0].field("when_off").map(Field::value), Some(Value::Missing));
    assert_eq!(msgs[0].field("when_on").map(Field::value), Some(Value::Int(9)));
}

fn expect_error(src: &str, check: fn(&DefinitionError) -> bool) {
    match parse(src).and_then(|p| resolve(&p)) {
        Err(e) => assert!(check(&e), "unexpected error {:?} for {}", e, src),
        Ok(_) => panic!("expected an error for {}", src),
    }
}

#[test]
fn definition_errors() {
    expect_error("message M = 1 { a: u8; }", |e| {
        matches!(e, DefinitionError::Invalid(_))
    });
    expect_error(&format!("{}{}message M = 1 {{ }}", FRAME, FRAME), |e| {
        matches!(e, DefinitionError::Invalid(_))
    });
    expect_error(&with_frame("message M = 1 { a: u8; } message M = 2 { }"), |e| {
        matches!(e, DefinitionError::Duplicate(_))
    });
    expect_error(&with_frame("message M = 1 { a: u8; a: u16; }"), |e| {
        matches!(e, DefinitionError::Duplicate(_))
    });
    expect_error(&with_frame("enum E: u8 { A = 0 } message M = E.B { }"), |e| {
        matches!(e, DefinitionError::UnknownRef(_))
    });
    expect_error(
        &with_frame("bitmask B: u8 { x = 0 } message M = 1 { b: B; c: u8 if b.y; }"),
        |e| matches!(e, DefinitionError::UnknownRef(_)),
    );
    expect_error(&with_frame("message M = 1 { a: bytes<fixed(0x7fffffffffffffff)>; }"), |e| {
        matches!(e, DefinitionError::Invalid(_))
    });
}

#[test]
fn frame_definition_errors() {
    let frame_err = |e: &DefinitionError| matches!(e, DefinitionError::Frame { .. });
    expect_error("frame F { id: id(u8); payload; cs: checksum(u8, md5); }", frame_err);
    expect_error("frame F { id: id(u8); payload; s: sync(u8, 1); }", frame_err);
    expect_error(
        "frame F { s: size(u8); cs: checksum(u8, sum, over = s); id: id(u8); payload; }",
        frame_err,
    );
    // a prefix checksum needs an enclosing size layer
    expect_error("frame F { cs: checksum(u8, sum); id: id(u8); payload; }", frame_err);
    expect_error("frame F { s: sync(u8, 1); payload; }", frame_err);
    expect_error(
        "frame F { id: id(u8); payload; cs: checksum(u8, sum, over = nope); }",
        |e| matches!(e, DefinitionError::UnknownRef(_)),
    );
}

#[test]
fn strict_enum_rejects_unknown_values() {
    let mut engine = Engine::from_dsl(&with_frame(
        r#"
        enum Kind: u8 strict { A = 0, B = 1 }
        message M = 1 { k: Kind; }
        "#,
    ))
    .expect("engine");
    let msgs = engine.read_data(&[0x7e, 2, 1, 5], true);
    assert!(msgs.iter().all(|m| !m.is_valid()));
    let total: usize = msgs.iter().map(|m| m.frame_bytes().len()).sum();
    assert_eq!(total, 4);
}

#[test]
fn struct_members_resolve_to_bundles() {
    let engine = Engine::from_dsl(&with_frame(
        r#"
        struct Point { x: i8; y: i8 = -1; }
        message M = 1 { p: Point; ps: list<Point, count(u8)>; }
        "#,
    ))
    .expect("engine");
    let mut msg = engine.create_message("1", 0).expect("message");
    assert_eq!(
        msg.field("p").map(Field::value),
        Some(Value::Bundle(vec![
            ("x".into(), Value::Int(0)),
            ("y".into(), Value::Int(-1)),
        ]))
    );
    assert!(msg.field_mut("ps").expect("ps").set_value(&Value::List(vec![
        Value::Bundle(vec![("x".into(), Value::Int(1)), ("y".into(), Value::Int(2))]),
    ])));
    assert_eq!(
        engine.write(&msg).expect("write"),
        vec![0x7e, 6, 1, 0x00, 0xff, 1, 1, 2]
    );
}
