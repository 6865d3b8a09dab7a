//! Frame layer stack tests built directly from layers (no DSL).

use commskit::field::{
    EnumField, Field, IntField, OptionalField, OptionalMode, SizePrefix, StringField,
};
use commskit::frame::{ChecksumAlgo, ChecksumPlacement};
use commskit::{
    DefinitionError, Frame, FrameRead, Layer, LayerKind, Message, MessageClass, MessageFactory,
    Presence, Value,
};
use std::sync::Arc;

fn sync() -> Layer {
    Layer::new("sync", LayerKind::Sync {
        field: IntField::unsigned(1).with_default(0x7e),
    })
}

fn size(offset: i64) -> Layer {
    Layer::new("size", LayerKind::Size {
        field: IntField::unsigned(1).with_offset(offset),
        max: None,
    })
}

fn id() -> Layer {
    Layer::new("id", LayerKind::Id {
        field: IntField::unsigned(1).into(),
    })
}

fn payload() -> Layer {
    Layer::new("payload", LayerKind::Payload)
}

fn ping() -> Message {
    Message::new(1, "Ping").with_field("seq", IntField::unsigned(2))
}

fn with_seq(mut m: Message, seq: i64) -> Message {
    m.field_mut("seq").expect("seq").set_value(&Value::Int(seq));
    m
}

fn decoded(res: FrameRead) -> (Message, usize) {
    match res {
        FrameRead::Message { message, consumed } => (message, consumed),
        other => panic!("expected a message, got {:?}", other),
    }
}

#[test]
fn duplicate_ids_fall_through_to_next_type() {
    let strict = EnumField::new(IntField::unsigned(1))
        .with_value(1, "One")
        .fail_on_invalid();
    let factory = MessageFactory::new(vec![
        Message::new(2, "Narrow").with_field("kind", strict),
        Message::new(2, "Wide")
            .with_field("a", IntField::unsigned(1))
            .with_field("b", IntField::unsigned(1)),
    ]);
    let frame = Frame::new("F", vec![sync(), size(0), id(), payload()], Arc::new(factory))
        .expect("frame");

    let (msg, consumed) = decoded(frame.read_one(&[0x7e, 3, 2, 5, 6]));
    assert_eq!(consumed, 5);
    assert_eq!(msg.name(), "Wide");

    let (msg, _) = decoded(frame.read_one(&[0x7e, 2, 2, 1]));
    assert_eq!(msg.name(), "Narrow");
}

#[test]
fn prefix_checksum_covers_following_layers() {
    let factory = MessageFactory::new(vec![ping()]);
    let frame = Frame::new(
        "F",
        vec![
            sync(),
            size(0),
            Layer::new("crc", LayerKind::Checksum {
                field: IntField::unsigned(2),
                algo: ChecksumAlgo::Crc16,
                placement: ChecksumPlacement::Prefix,
            }),
            id(),
            payload(),
        ],
        Arc::new(factory),
    )
    .expect("frame");

    let bytes = frame.write(&with_seq(ping(), 9)).expect("write");
    let crc = ChecksumAlgo::Crc16.compute(&[1, 0, 9]);
    assert_eq!(
        bytes,
        vec![0x7e, 5, (crc >> 8) as u8, crc as u8, 1, 0, 9]
    );
    let (msg, consumed) = decoded(frame.read_one(&bytes));
    assert_eq!(consumed, bytes.len());
    assert_eq!(msg.field("seq").map(Field::value), Some(Value::Int(9)));

    let mut bad = bytes.clone();
    bad[6] ^= 0xff;
    match frame.read_one(&bad) {
        FrameRead::ChecksumFailure { message, consumed } => {
            assert_eq!(consumed, bad.len());
            assert_eq!(message.frame_bytes(), &bad[..]);
            assert!(!message.is_valid());
        }
        other => panic!("expected checksum failure, got {:?}", other),
    }
}

#[test]
fn crc32_suffix_over_whole_frame() {
    let factory = MessageFactory::new(vec![ping()]);
    let frame = Frame::new(
        "F",
        vec![
            Layer::new("crc", LayerKind::Checksum {
                field: IntField::unsigned(4),
                algo: ChecksumAlgo::Crc32,
                placement: ChecksumPlacement::Suffix,
            }),
            sync(),
            id(),
            payload(),
        ],
        Arc::new(factory),
    )
    .expect("frame");
    let bytes = frame.write(&with_seq(ping(), 0x0203)).expect("write");
    assert_eq!(bytes.len(), 1 + 1 + 2 + 4);
    let crc = ChecksumAlgo::Crc32.compute(&bytes[..4]);
    assert_eq!(&bytes[4..], &(crc as u32).to_be_bytes());
    let (_, consumed) = decoded(frame.read_one(&bytes));
    assert_eq!(consumed, 8);
}

#[test]
fn size_offset_is_applied() {
    let factory = MessageFactory::new(vec![ping()]);
    let frame = Frame::new("F", vec![sync(), size(2), id(), payload()], Arc::new(factory))
        .expect("frame");
    let bytes = frame.write(&with_seq(ping(), 1)).expect("write");
    assert_eq!(bytes, vec![0x7e, 5, 1, 0, 1]);
    let (msg, consumed) = decoded(frame.read_one(&bytes));
    assert_eq!(consumed, 5);
    assert_eq!(msg.field("seq").map(Field::value), Some(Value::Int(1)));
}

fn versioned_frame() -> Frame {
    let msg = Message::new(1, "Versioned")
        .version_dependent()
        .with_field("a", IntField::unsigned(1))
        .with_field(
            "b",
            OptionalField::new(IntField::unsigned(1), OptionalMode::Exists),
        )
        .with_presence("b", Presence::VersionAtLeast(2))
        .expect("rule");
    Frame::new(
        "F",
        vec![
            sync(),
            size(0),
            id(),
            Layer::new("version", LayerKind::Transport {
                field: IntField::unsigned(1),
                version: true,
            }),
            payload(),
        ],
        Arc::new(MessageFactory::new(vec![msg])),
    )
    .expect("frame")
}

#[test]
fn transport_version_drives_presence() {
    let frame = versioned_frame();

    let (msg, consumed) = decoded(frame.read_one(&[0x7e, 4, 1, 2, 10, 11]));
    assert_eq!(consumed, 6);
    assert_eq!(msg.version(), 2);
    assert_eq!(msg.field("b").map(Field::value), Some(Value::Int(11)));
    assert_eq!(
        msg.transport_field("version").map(Field::value),
        Some(Value::Int(2))
    );

    let (msg, consumed) = decoded(frame.read_one(&[0x7e, 3, 1, 1, 10]));
    assert_eq!(consumed, 5);
    assert_eq!(msg.field("b").map(Field::value), Some(Value::Missing));
}

#[test]
fn transport_version_is_written_from_message() {
    let frame = versioned_frame();
    let mut msg = frame.create_message("1", 0).expect("message");
    msg.set_version(3);
    msg.refresh();
    msg.field_mut("b").expect("b").set_value(&Value::Int(4));
    assert_eq!(frame.write(&msg).expect("write"), vec![0x7e, 4, 1, 3, 0, 4]);
}

#[test]
fn unknown_id_keeps_payload_bytes() {
    let frame = Frame::new(
        "F",
        vec![sync(), size(0), id(), payload()],
        Arc::new(MessageFactory::new(vec![ping()])),
    )
    .expect("frame");
    let (msg, consumed) = decoded(frame.read_one(&[0x7e, 3, 9, 0xaa, 0xbb, 0x7e]));
    assert_eq!(consumed, 5);
    assert_eq!(msg.class(), MessageClass::RawData);
    assert_eq!(
        msg.field("data").map(Field::value),
        Some(Value::Bytes(vec![0xaa, 0xbb]))
    );
    let mut rewritten = msg.clone();
    rewritten.refresh();
    assert_eq!(frame.write(&rewritten).expect("write"), vec![0x7e, 3, 9, 0xaa, 0xbb]);
}

#[test]
fn payload_must_be_innermost() {
    let err = Frame::new(
        "F",
        vec![sync(), payload(), id()],
        Arc::new(MessageFactory::default()),
    )
    .unwrap_err();
    assert!(matches!(err, DefinitionError::Frame { .. }));

    let err = Frame::new("F", vec![sync(), payload()], Arc::new(MessageFactory::default()))
        .unwrap_err();
    assert!(matches!(err, DefinitionError::Frame { .. }));
}

#[test]
fn incomplete_frames_report_missing_bytes() {
    let frame = Frame::new(
        "F",
        vec![sync(), size(0), id(), payload()],
        Arc::new(MessageFactory::new(vec![ping()])),
    )
    .expect("frame");
    assert_eq!(frame.read_one(&[0x7e]), FrameRead::NotEnoughData { missing: 1 });
    assert_eq!(frame.read_one(&[0x7e, 3, 1]), FrameRead::NotEnoughData { missing: 2 });
    assert!(matches!(frame.read_one(&[0x10, 3]), FrameRead::Garbage { .. }));
}

#[test]
fn crc16_suffix_checksum_bytes() {
    let frame = Frame::new(
        "F",
        vec![
            sync(),
            Layer::new("crc", LayerKind::Checksum {
                field: IntField::unsigned(2),
                algo: ChecksumAlgo::Crc16,
                placement: ChecksumPlacement::Suffix,
            }),
            size(0),
            id(),
            payload(),
        ],
        Arc::new(MessageFactory::new(vec![ping()])),
    )
    .expect("frame");

    // CRC-16/CCITT-FALSE over size | id | seq
    let bytes = frame.write(&with_seq(ping(), 0x1234)).expect("write");
    assert_eq!(bytes, vec![0x7e, 3, 1, 0x12, 0x34, 0x3b, 0xea]);
    let (msg, consumed) = decoded(frame.read_one(&bytes));
    assert_eq!(consumed, 7);
    assert_eq!(msg.field("seq").map(Field::value), Some(Value::Int(0x1234)));

    let mut bad = bytes.clone();
    bad[3] ^= 0x01;
    match frame.read_one(&bad) {
        FrameRead::ChecksumFailure { consumed, .. } => assert_eq!(consumed, 7),
        other => panic!("expected checksum failure, got {:?}", other),
    }
}

#[test]
fn unsized_frame_rejects_messages_reading_to_end() {
    let bare = |msg: Message| {
        Frame::new(
            "Bare",
            vec![sync(), id(), payload()],
            Arc::new(MessageFactory::new(vec![ping(), msg])),
        )
    };
    let rest = Message::new(2, "Rest").with_field("s", StringField::new(SizePrefix::Remainder));
    assert!(matches!(bare(rest), Err(DefinitionError::Frame { .. })));

    let tentative = Message::new(2, "Trailer").with_field(
        "t",
        OptionalField::new(IntField::unsigned(1), OptionalMode::Tentative),
    );
    assert!(matches!(bare(tentative), Err(DefinitionError::Frame { .. })));

    let counted = Message::new(2, "Counted").with_field(
        "s",
        StringField::new(SizePrefix::Count(IntField::unsigned(1))),
    );
    assert!(bare(counted).is_ok());

    let sized = Frame::new(
        "Sized",
        vec![sync(), size(0), id(), payload()],
        Arc::new(MessageFactory::new(vec![
            Message::new(2, "Rest").with_field("s", StringField::new(SizePrefix::Remainder)),
        ])),
    );
    assert!(sized.is_ok());
}

#[test]
fn unsized_frame_unknown_id_is_garbage() {
    let frame = Frame::new(
        "Bare",
        vec![sync(), id(), payload()],
        Arc::new(MessageFactory::new(vec![ping()])),
    )
    .expect("frame");
    assert!(matches!(
        frame.read_one(&[0x7e, 9, 0xaa, 0x7e, 1, 0, 5]),
        FrameRead::Garbage { .. }
    ));
    let (msg, consumed) = decoded(frame.read_one(&[0x7e, 1, 0, 5]));
    assert_eq!(consumed, 4);
    assert_eq!(msg.name(), "Ping");
}
