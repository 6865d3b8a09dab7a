//! Field codec tests: primitives, combinators, size policies and failure statuses.

use commskit::error::{CodecError, ErrorStatus};
use commskit::field::{
    BitMember, BitfieldField, BitmaskField, BundleField, BytesField, Endian, EnumField, Field,
    FieldKind, FloatField, IntField, ListField, Member, OptionalField, OptionalMode, SizePrefix,
    StringField, VariantField,
};
use commskit::Value;
use proptest::prelude::*;

fn encode(f: &Field) -> Vec<u8> {
    let mut out = Vec::new();
    f.write(&mut out).expect("write");
    assert_eq!(out.len(), f.length(), "length() must match written bytes");
    out
}

fn decode(proto: &Field, bytes: &[u8]) -> Result<(Field, usize), CodecError> {
    let mut f = proto.clone();
    let mut src = bytes;
    f.read(&mut src)?;
    Ok((f, bytes.len() - src.len()))
}

#[test]
fn var_length_big_endian_emits_high_group_first() {
    let mut f = IntField::var_unsigned(1, 4);
    f.set_value(300);
    let f = Field::from(f);
    assert_eq!(encode(&f), vec![0x82, 0x2c]);
    let (back, used) = decode(&f, &[0x82, 0x2c, 0xff]).expect("read");
    assert_eq!(used, 2);
    assert_eq!(back.value(), Value::Int(300));
}

#[test]
fn var_length_little_endian_is_leb128() {
    let mut f = IntField::var_unsigned(1, 4).with_endian(Endian::Little);
    f.set_value(300);
    assert_eq!(encode(&f.into()), vec![0xac, 0x02]);
}

#[test]
fn var_length_respects_minimum_and_maximum() {
    let f: Field = IntField::var_unsigned(2, 3).into();
    assert_eq!(encode(&f), vec![0x80, 0x00]);
    let mut big = IntField::var_unsigned(1, 2);
    big.set_value(1 << 20);
    let mut out = Vec::new();
    assert!(matches!(
        big.write(&mut out),
        Err(CodecError::BufferOverflow(_))
    ));
    assert!(matches!(
        decode(&f, &[0x81, 0x82, 0x83, 0x04]),
        Err(CodecError::InvalidMessageData(_))
    ));
}

#[test]
fn var_length_rejects_non_canonical_encodings() {
    let loose: Field = IntField::var_unsigned(1, 4).into();
    // 1 padded with a leading zero group
    assert!(matches!(
        decode(&loose, &[0x80, 0x01]),
        Err(CodecError::InvalidMessageData(_))
    ));
    let padded: Field = IntField::var_unsigned(2, 4).into();
    // shorter than the declared minimum
    assert!(matches!(
        decode(&padded, &[0x01]),
        Err(CodecError::InvalidMessageData(_))
    ));
    let (back, used) = decode(&padded, &[0x80, 0x01]).expect("read");
    assert_eq!(used, 2);
    assert_eq!(back.value(), Value::Int(1));
    assert_eq!(encode(&back), vec![0x80, 0x01]);
}

#[test]
fn three_byte_signed_is_sign_extended() {
    let f: Field = IntField::signed(3).into();
    let (back, _) = decode(&f, &[0xff, 0xff, 0xfe]).expect("read");
    assert_eq!(back.value(), Value::Int(-2));
    assert_eq!(encode(&back), vec![0xff, 0xff, 0xfe]);
}

#[test]
fn serialization_offset() {
    let mut f = IntField::unsigned(1).with_offset(2);
    f.set_value(5);
    let f = Field::from(f);
    assert_eq!(encode(&f), vec![7]);
    let (back, _) = decode(&f, &[7]).expect("read");
    assert_eq!(back.value(), Value::Int(5));
}

#[test]
fn overflow_on_write() {
    let mut f = IntField::unsigned(1);
    f.set_value(256);
    let err = f.write(&mut Vec::new()).unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BufferOverflow);
}

#[test]
fn scaling_and_ranges() {
    let mut f = IntField::signed(2)
        .with_scaling(1, 100)
        .with_range(-500, 500)
        .with_special("Unknown", i16::MIN as i64);
    f.set_scaled(1.25);
    assert_eq!(f.value(), 125);
    assert!(f.valid());
    f.set_value(600);
    assert!(!f.valid());
    f.set_value(i16::MIN as i64);
    assert!(f.valid());
    assert_eq!(f.special_name(), Some("Unknown"));
}

#[test]
fn strict_int_fails_hard() {
    let f: Field = IntField::unsigned(1).with_range(0, 10).fail_on_invalid().into();
    assert!(matches!(
        decode(&f, &[11]),
        Err(CodecError::InvalidMessageData(_))
    ));
    let soft: Field = IntField::unsigned(1).with_range(0, 10).into();
    let (back, _) = decode(&soft, &[11]).expect("soft read");
    assert!(!back.valid());
}

fn sparse_enum() -> EnumField {
    EnumField::new(IntField::signed(2))
        .with_value(-1000, "Low")
        .with_value(-5, "Neg")
        .with_value(0, "Zero")
        .with_value(5, "Pos")
        .with_value(1000, "High")
}

#[test]
fn sparse_enum_values() {
    let f: Field = sparse_enum().into();
    let (back, _) = decode(&f, &[0xff, 0xfb]).expect("read");
    assert_eq!(back.as_enum().and_then(EnumField::value_name), Some("Neg"));
    assert!(back.valid());

    let (gap, _) = decode(&f, &[0x00, 0x01]).expect("read");
    assert!(!gap.valid());
    assert_eq!(encode(&gap), vec![0x00, 0x01]);

    let strict: Field = sparse_enum().fail_on_invalid().into();
    assert!(matches!(
        decode(&strict, &[0x00, 0x01]),
        Err(CodecError::InvalidMessageData(_))
    ));
}

#[test]
fn enum_set_by_name() {
    let mut f: Field = sparse_enum().into();
    assert!(f.set_value(&Value::Str("High".into())));
    assert_eq!(encode(&f), vec![0x03, 0xe8]);
    assert!(!f.set_value(&Value::Str("Nope".into())));
}

#[test]
fn bitmask_reserved_bits() {
    let mask = BitmaskField::new(1)
        .with_bit(0, "a")
        .with_bit(1, "b")
        .with_reserved(0xf0, 0);
    let f: Field = mask.clone().into();
    let (back, _) = decode(&f, &[0x12]).expect("soft read");
    assert!(!back.valid());
    assert_eq!(back.value(), Value::Bits(0x12));

    let strict: Field = mask.fail_on_reserved().into();
    assert!(matches!(
        decode(&strict, &[0x12]),
        Err(CodecError::InvalidMessageData(_))
    ));
    let (ok, _) = decode(&strict, &[0x02]).expect("read");
    let bits = ok.as_bitmask().expect("bitmask");
    assert!(bits.bit(1));
    assert!(!bits.bit(0));
    assert_eq!(bits.bit_index("b"), Some(1));
}

#[test]
fn float_bits_are_preserved() {
    let f: Field = FloatField::f64().with_endian(Endian::Little).into();
    let bytes = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xf8, 0x7f];
    let (back, _) = decode(&f, &bytes).expect("read");
    assert!(back.value().as_f64().map(f64::is_nan).unwrap_or(false));
    assert_eq!(encode(&back), bytes);
}

#[test]
fn fixed_string_is_zero_padded() {
    let f: Field = StringField::new(SizePrefix::Fixed(5)).with_default("ab").into();
    assert_eq!(encode(&f), b"ab\0\0\0".to_vec());
    let (back, used) = decode(&f, b"xyz\0\0tail").expect("read");
    assert_eq!(used, 5);
    assert_eq!(back.value(), Value::Str("xyz".into()));
    assert_eq!(encode(&back), b"xyz\0\0".to_vec());
}

#[test]
fn size_prefixed_bytes() {
    let f: Field = BytesField::new(SizePrefix::Count(IntField::unsigned(1)))
        .with_default(vec![9, 8, 7])
        .into();
    assert_eq!(encode(&f), vec![3, 9, 8, 7]);
    assert!(matches!(
        decode(&f, &[3, 9]),
        Err(CodecError::NotEnoughData { missing: 2 })
    ));
}

#[test]
fn remainder_takes_everything() {
    let f: Field = StringField::new(SizePrefix::Remainder).into();
    let (back, used) = decode(&f, b"rest").expect("read");
    assert_eq!(used, 4);
    assert_eq!(back.value(), Value::Str("rest".into()));
}

#[test]
fn count_prefixed_list_waits_for_data() {
    let f: Field = ListField::new(IntField::unsigned(2), SizePrefix::Count(IntField::unsigned(1))).into();
    let err = decode(&f, &[2, 0, 1, 0]).unwrap_err();
    assert_eq!(err.status(), ErrorStatus::NotEnoughData);
}

#[test]
fn length_prefixed_list_overrun_is_invalid() {
    let f: Field = ListField::new(IntField::unsigned(2), SizePrefix::Length(IntField::unsigned(1))).into();
    let err = decode(&f, &[3, 0, 1, 0, 2]).unwrap_err();
    assert_eq!(err.status(), ErrorStatus::InvalidMessageData);

    let (back, used) = decode(&f, &[4, 0, 1, 0, 2, 0xee]).expect("read");
    assert_eq!(used, 5);
    assert_eq!(back.value(), Value::List(vec![Value::Int(1), Value::Int(2)]));
}

#[test]
fn length_prefixed_list_of_strings() {
    let elem = StringField::new(SizePrefix::Count(IntField::unsigned(1)));
    let mut list = ListField::new(elem, SizePrefix::Length(IntField::unsigned(2)));
    assert!(list.set_values(&[Value::Str("ab".into()), Value::Str("c".into())]));
    let f: Field = list.into();
    let bytes = encode(&f);
    assert_eq!(bytes, vec![0, 5, 2, b'a', b'b', 1, b'c']);
    let (back, _) = decode(&f, &bytes).expect("read");
    assert_eq!(back.value(), f.value());
}

#[test]
fn per_element_length_keeps_unknown_tail() {
    let point = BundleField::new(vec![
        Member::new("x", IntField::unsigned(1)),
        Member::new("y", IntField::unsigned(1)),
    ]);
    let f: Field = ListField::new(point, SizePrefix::Count(IntField::unsigned(1)))
        .with_elem_length(IntField::unsigned(1))
        .into();
    // second element carries one extra byte a newer peer appended
    let bytes = [2, 2, 1, 2, 3, 3, 4, 0x99];
    let (back, used) = decode(&f, &bytes).expect("read");
    assert_eq!(used, bytes.len());
    let list = back.as_list().expect("list");
    assert_eq!(list.len(), 2);
    assert_eq!(
        list.elements()[1].value(),
        Value::Bundle(vec![("x".into(), Value::Int(3)), ("y".into(), Value::Int(4))])
    );
    assert_eq!(list.element_tail(1), &[0x99]);
    assert_eq!(encode(&back), bytes);
}

#[test]
fn fixed_count_list_pads_with_defaults() {
    let mut list = ListField::new(IntField::unsigned(1).with_default(7), SizePrefix::Fixed(3));
    assert!(list.set_values(&[Value::Int(1)]));
    let f: Field = list.into();
    assert_eq!(encode(&f), vec![1, 7, 7]);
    assert_eq!(f.min_length(), 3);
    assert_eq!(f.max_length(), 3);
}

fn packed() -> BitfieldField {
    BitfieldField::new(
        "Packed",
        2,
        Endian::Big,
        vec![
            BitMember::new("a", 4, IntField::unsigned(1)),
            BitMember::new(
                "b",
                2,
                EnumField::new(IntField::unsigned(1))
                    .with_value(0, "Off")
                    .with_value(1, "On"),
            ),
            BitMember::new("c", 10, IntField::signed(2)),
        ],
    )
    .expect("bitfield")
}

#[test]
fn bitfield_layout_is_lsb_first() {
    let mut f = packed();
    f.member_mut("a").expect("a").set_value(&Value::Int(0x3));
    f.member_mut("b").expect("b").set_value(&Value::Int(1));
    f.member_mut("c").expect("c").set_value(&Value::Int(2));
    // 2 << 6 | 1 << 4 | 3
    assert_eq!(encode(&f.into()), vec![0x00, 0x93]);
}

proptest! {
    #[test]
    fn bitfield_members_do_not_interfere(a in 0i64..16, b in 0i64..4, c in -512i64..512) {
        let mut f = packed();
        f.member_mut("a").expect("a").set_value(&Value::Int(a));
        f.member_mut("b").expect("b").set_value(&Value::Int(b));
        f.member_mut("c").expect("c").set_value(&Value::Int(c));
        let f: Field = f.into();
        let bytes = encode(&f);
        let (back, _) = decode(&f, &bytes).expect("read");
        let bf = back.as_bitfield().expect("bitfield");
        prop_assert_eq!(bf.member("a").map(Field::value), Some(Value::Int(a)));
        prop_assert_eq!(bf.member("b").map(Field::value), Some(Value::Int(b)));
        prop_assert_eq!(bf.member("c").map(Field::value), Some(Value::Int(c)));
    }

    #[test]
    fn var_signed_round_trip(v in -(1i64 << 27)..(1i64 << 27), little in any::<bool>()) {
        let endian = if little { Endian::Little } else { Endian::Big };
        let mut f = IntField::var_signed(1, 4).with_endian(endian);
        f.set_value(v);
        let f: Field = f.into();
        let bytes = encode(&f);
        let (back, used) = decode(&f, &bytes).expect("read");
        prop_assert_eq!(used, bytes.len());
        prop_assert_eq!(back.value(), Value::Int(v));
    }

    #[test]
    fn decoded_bytes_reencode_exactly(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let f: Field = BundleField::new(vec![
            Member::new("a", IntField::unsigned(2)),
            Member::new("b", sparse_enum()),
            Member::new("s", StringField::new(SizePrefix::Count(IntField::unsigned(1)))),
            Member::new("v", IntField::var_unsigned(1, 3)),
            Member::new("w", IntField::var_signed(2, 3).with_endian(Endian::Little)),
        ])
        .into();
        if let Ok((back, used)) = decode(&f, &bytes) {
            prop_assert_eq!(encode(&back), bytes[..used].to_vec());
        }
    }

    #[test]
    fn bounded_regions_reencode_exactly(bytes in proptest::collection::vec(any::<u8>(), 0..24)) {
        let items = ListField::new(IntField::unsigned(1), SizePrefix::Count(IntField::unsigned(1)))
            .with_elem_length(IntField::unsigned(1));
        let f: Field = BundleField::new(vec![
            Member::new("kind", IntField::unsigned(1)),
            Member::new("len", IntField::unsigned(1)),
            Member::new("v", IntField::unsigned(1)),
            Member::new("items", items),
        ])
        .with_remaining_length(1)
        .expect("bundle")
        .into();
        if let Ok((back, used)) = decode(&f, &bytes) {
            prop_assert_eq!(encode(&back), bytes[..used].to_vec());
        }
    }
}

#[test]
fn bundle_remaining_length_is_back_patched() {
    let mut b = BundleField::new(vec![
        Member::new("kind", IntField::unsigned(1).with_default(2)),
        Member::new("len", IntField::unsigned(1)),
        Member::new("name", StringField::new(SizePrefix::Remainder)),
    ])
    .with_remaining_length(1)
    .expect("bundle");
    b.member_mut("name")
        .expect("name")
        .set_value(&Value::Str("abc".into()));
    let mut f: Field = b.into();
    assert!(f.refresh());
    assert!(!f.refresh());
    let bytes = encode(&f);
    assert_eq!(bytes, vec![2, 3, b'a', b'b', b'c']);
    let (back, used) = decode(&f, &[2, 3, b'a', b'b', b'c', 0x55]).expect("read");
    assert_eq!(used, 5);
    assert_eq!(back.value(), f.value());
}

#[test]
fn skipped_bytes_survive_reencoding() {
    let bundle: Field = BundleField::new(vec![
        Member::new("len", IntField::unsigned(1)),
        Member::new("v", IntField::unsigned(1)),
    ])
    .with_remaining_length(0)
    .expect("bundle")
    .into();
    let (back, used) = decode(&bundle, &[0x03, 0x07, 0xee, 0xff]).expect("read");
    assert_eq!(used, 4);
    assert_eq!(encode(&back), vec![0x03, 0x07, 0xee, 0xff]);

    let list: Field = ListField::new(IntField::unsigned(1), SizePrefix::Count(IntField::unsigned(1)))
        .with_elem_length(IntField::unsigned(1))
        .into();
    let (back, used) = decode(&list, &[0x01, 0x02, 0x07, 0xee]).expect("read");
    assert_eq!(used, 4);
    assert_eq!(back.value(), Value::List(vec![Value::Int(7)]));
    assert_eq!(encode(&back), vec![0x01, 0x02, 0x07, 0xee]);
}

#[test]
fn optional_modes() {
    let proto = OptionalField::new(IntField::unsigned(1).with_default(4), OptionalMode::Missing);
    let f: Field = proto.clone().into();
    assert!(encode(&f).is_empty());
    assert_eq!(f.value(), Value::Missing);

    let mut tentative = proto;
    tentative.set_mode(OptionalMode::Tentative);
    let f: Field = tentative.into();
    let (empty, used) = decode(&f, &[]).expect("read");
    assert_eq!(used, 0);
    assert_eq!(empty.value(), Value::Missing);
    let (present, used) = decode(&f, &[9]).expect("read");
    assert_eq!(used, 1);
    assert_eq!(present.value(), Value::Int(9));
    assert_eq!(present.kind(), FieldKind::Optional);
}

fn variant() -> VariantField {
    let alt = |tag: i64, value: Field| {
        BundleField::new(vec![
            Member::new("tag", IntField::unsigned(1).with_default(tag)),
            Member::new("value", value),
        ])
    };
    VariantField::new(vec![
        ("small".into(), alt(0, IntField::unsigned(1).into())),
        ("wide".into(), alt(1, IntField::unsigned(4).into())),
        (
            "text".into(),
            alt(2, StringField::new(SizePrefix::Count(IntField::unsigned(1))).into()),
        ),
    ])
    .expect("variant")
}

#[test]
fn variant_discriminant_selects_alternative() {
    let f: Field = variant().into();
    let (back, used) = decode(&f, &[1, 0, 0, 1, 0]).expect("read");
    assert_eq!(used, 5);
    assert_eq!(
        back.as_variant().and_then(VariantField::current_name),
        Some("wide")
    );
    let (text, _) = decode(&f, &[2, 2, b'h', b'i']).expect("read");
    assert_eq!(
        text.value(),
        Value::Variant(
            "text".into(),
            Box::new(Value::Bundle(vec![
                ("tag".into(), Value::Int(2)),
                ("value".into(), Value::Str("hi".into())),
            ]))
        )
    );
}

#[test]
fn unknown_discriminant_is_invalid_data() {
    let f: Field = variant().into();
    let err = decode(&f, &[3, 0, 0, 0, 0]).unwrap_err();
    assert_eq!(err.status(), ErrorStatus::InvalidMessageData);
    let err = decode(&f, &[1, 0]).unwrap_err();
    assert_eq!(err.status(), ErrorStatus::NotEnoughData);
}

#[test]
fn variant_set_value_switches_alternative() {
    let mut f: Field = variant().into();
    let v = Value::Variant(
        "text".into(),
        Box::new(Value::Bundle(vec![("value".into(), Value::Str("x".into()))])),
    );
    assert!(f.set_value(&v));
    assert_eq!(encode(&f), vec![2, 1, b'x']);
}
