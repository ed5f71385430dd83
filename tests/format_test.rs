#![allow(missing_docs)]

use std::sync::Arc;

use nrbf::api::DEFAULT_MAX_SLOTS_PER_BYTE;
use nrbf::{
    ArrayObject, ClassShape, MemberType, Nrbf, NrbfError, Object, ObjectGraph, ObjectId,
    PrimitiveType, ReferenceKind, Value,
};

/// A `SerializedStreamHeader` pointing at `root`.
fn header(root: i32) -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend(root.to_le_bytes());
    out.extend((-1i32).to_le_bytes());
    out.extend(1i32.to_le_bytes());
    out.extend(0i32.to_le_bytes());
    out
}

fn stream(root: i32, body: &[u8]) -> Vec<u8> {
    let mut out = header(root);
    out.extend_from_slice(body);
    out
}

fn system_point() -> Arc<ClassShape> {
    Arc::new(ClassShape::new("P", None).member("x", MemberType::Primitive(PrimitiveType::Int32)))
}

// --- BIT-EXACT LAYOUTS ---

#[test]
fn test_header_layout() -> nrbf::Result<()> {
    let mut graph = ObjectGraph::new();
    let s = graph.add_string("hi");
    graph.set_root(s);

    let bytes = Nrbf::encode(&graph)?;
    let expected = stream(1, &[0x06, 1, 0, 0, 0, 2, b'h', b'i', 0x0B]);
    assert_eq!(bytes, expected);
    assert_eq!(
        &bytes[..17],
        &[0, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 0, 0, 0, 0]
    );
    Ok(())
}

#[test]
fn test_system_class_layout() -> nrbf::Result<()> {
    let mut graph = ObjectGraph::new();
    let root = graph.add_class(system_point(), vec![Value::from(5)]);
    graph.set_root(root);

    let expected = stream(
        1,
        &[
            0x04, 1, 0, 0, 0, // SystemClassWithMembersAndTypes, id 1
            1, b'P', // class name
            1, 0, 0, 0, 1, b'x', // one member named x
            0x00, 0x08, // Primitive, Int32
            5, 0, 0, 0, // x = 5
            0x0B,
        ],
    );
    assert_eq!(Nrbf::encode(&graph)?, expected);

    let decoded = Nrbf::decode(&expected)?;
    let root = decoded.root().expect("root is set");
    assert_eq!(decoded.class(root)?.field("x"), Some(&Value::from(5)));
    Ok(())
}

#[test]
fn test_library_precedes_class() -> nrbf::Result<()> {
    let shape = Arc::new(
        ClassShape::new("Demo.P", Some("Demo")).member("x", MemberType::Primitive(PrimitiveType::Int32)),
    );
    let mut graph = ObjectGraph::new();
    let root = graph.add_class(shape, vec![Value::from(5)]);
    graph.set_root(root);

    let mut body = vec![0x0C, 2, 0, 0, 0, 4];
    body.extend_from_slice(b"Demo");
    body.extend_from_slice(&[0x05, 1, 0, 0, 0, 6]);
    body.extend_from_slice(b"Demo.P");
    body.extend_from_slice(&[1, 0, 0, 0, 1, b'x', 0x00, 0x08, 2, 0, 0, 0, 5, 0, 0, 0, 0x0B]);
    assert_eq!(Nrbf::encode(&graph)?, stream(1, &body));
    Ok(())
}

#[test]
fn test_second_instance_uses_class_with_id() -> nrbf::Result<()> {
    let mut graph = ObjectGraph::new();
    let a = graph.add_class(system_point(), vec![Value::from(1)]);
    let b = graph.add_class(system_point(), vec![Value::from(2)]);
    let arr = graph.add_array(ArrayObject::single(
        MemberType::Object,
        vec![Value::Ref(a), Value::Ref(b)],
    ));
    graph.set_root(arr);

    let expected = stream(
        1,
        &[
            0x10, 1, 0, 0, 0, 2, 0, 0, 0, // ArraySingleObject, id 1, length 2
            0x04, 2, 0, 0, 0, 1, b'P', 1, 0, 0, 0, 1, b'x', 0x00, 0x08, 1, 0, 0, 0,
            0x01, 3, 0, 0, 0, 2, 0, 0, 0, // ClassWithId, id 3, metadata 2
            2, 0, 0, 0, 0x0B,
        ],
    );
    assert_eq!(Nrbf::encode(&graph)?, expected);
    Ok(())
}

#[test]
fn test_shared_reference_layout() -> nrbf::Result<()> {
    let mut graph = ObjectGraph::new();
    let s = graph.add_string("a");
    let arr = graph.add_array(ArrayObject::single(
        MemberType::String,
        vec![Value::Ref(s), Value::Ref(s), Value::Null],
    ));
    graph.set_root(arr);

    let expected = stream(
        1,
        &[
            0x11, 1, 0, 0, 0, 3, 0, 0, 0, // ArraySingleString
            0x06, 2, 0, 0, 0, 1, b'a', // BinaryObjectString id 2
            0x09, 2, 0, 0, 0, // MemberReference to 2
            0x0A, // ObjectNull
            0x0B,
        ],
    );
    assert_eq!(Nrbf::encode(&graph)?, expected);
    Ok(())
}

#[test]
fn test_long_string_length_prefix() -> nrbf::Result<()> {
    let text = "x".repeat(200);
    let mut graph = ObjectGraph::new();
    let s = graph.add_string(text.as_str());
    graph.set_root(s);

    let bytes = Nrbf::encode(&graph)?;
    // 200 = 0xC8 -> 0xC8 0x01 as a 7-bit varint
    assert_eq!(&bytes[22..24], &[0xC8, 0x01]);
    let decoded = Nrbf::decode(&bytes)?;
    assert_eq!(decoded.string(decoded.root().expect("root is set"))?, text);
    Ok(())
}

// --- MALFORMED INPUT ---

#[test]
fn test_every_truncation_fails_cleanly() -> nrbf::Result<()> {
    let shape = Arc::new(
        ClassShape::new("Demo.Node", Some("Demo"))
            .member("name", MemberType::String)
            .member("value", MemberType::Primitive(PrimitiveType::Double))
            .member("items", MemberType::ObjectArray)
            .member("next", MemberType::Object),
    );
    let mut graph = ObjectGraph::new();
    let name = graph.add_string("node");
    let ints = graph.add_array(ArrayObject::single(
        MemberType::Primitive(PrimitiveType::Int32),
        vec![Value::from(1), Value::from(2)],
    ));
    let items = graph.add_array(ArrayObject::single(
        MemberType::Object,
        vec![Value::Ref(ints), Value::Null, Value::Null, Value::from(7i64)],
    ));
    let root = graph.add_class(
        Arc::clone(&shape),
        vec![Value::Ref(name), Value::from(1.25), Value::Ref(items), Value::Null],
    );
    let child = graph.add_class(
        shape,
        vec![Value::Ref(name), Value::from(2.5), Value::Null, Value::Ref(root)],
    );
    graph.set_field(root, "next", Value::Ref(child))?;
    graph.set_root(root);

    let bytes = Nrbf::encode(&graph)?;
    Nrbf::decode(&bytes)?;
    for len in 0..bytes.len() {
        match Nrbf::decode(&bytes[..len]) {
            Err(e) => assert!(e.is_truncated(), "prefix {len}: unexpected error {e}"),
            Ok(_) => panic!("prefix of {len} bytes decoded"),
        }
    }
    Ok(())
}

#[test]
fn test_unknown_metadata_id() {
    let bytes = stream(1, &[0x01, 1, 0, 0, 0, 9, 0, 0, 0, 0x0B]);
    let err = Nrbf::decode(&bytes).expect_err("metadata id 9 is undefined");
    assert!(err.is_format());
    assert!(matches!(
        err,
        NrbfError::DanglingReference {
            kind: ReferenceKind::Metadata,
            ..
        }
    ));
    assert!(err.to_string().contains("unknown metadata id"));
}

#[test]
fn test_metadata_id_naming_a_string() {
    let bytes = stream(
        2,
        &[
            0x06, 1, 0, 0, 0, 1, b'a', // string id 1
            0x01, 2, 0, 0, 0, 1, 0, 0, 0, // ClassWithId metadata 1
            0x0B,
        ],
    );
    let err = Nrbf::decode(&bytes).expect_err("id 1 is not a class record");
    assert!(matches!(err, NrbfError::Format(_)));
}

/// A system class with one `Object` member holding `value_record`.
fn object_holder(value_record: &[u8]) -> Vec<u8> {
    let mut body = vec![
        0x04, 1, 0, 0, 0, 1, b'H', 1, 0, 0, 0, 1, b'o', 0x02,
    ];
    body.extend_from_slice(value_record);
    body
}

#[test]
fn test_dangling_member_reference() {
    let mut body = object_holder(&[0x09, 7, 0, 0, 0]);
    body.push(0x0B);
    let err = Nrbf::decode(&stream(1, &body)).expect_err("id 7 is undefined");
    assert!(matches!(
        err,
        NrbfError::DanglingReference {
            id,
            kind: ReferenceKind::Member,
        } if id == ObjectId::new(7)
    ));
}

#[test]
fn test_forward_reference_is_rejected() {
    let mut body = object_holder(&[0x09, 2, 0, 0, 0]);
    body.extend_from_slice(&[0x06, 2, 0, 0, 0, 1, b'a', 0x0B]);
    let err = Nrbf::decode(&stream(1, &body)).expect_err("forward references are unsupported");
    assert!(matches!(err, NrbfError::DanglingReference { .. }));
}

#[test]
fn test_reference_to_library_is_rejected() {
    let mut body = vec![0x0C, 5, 0, 0, 0, 1, b'L'];
    body.extend(object_holder(&[0x09, 5, 0, 0, 0]));
    body.push(0x0B);
    let err = Nrbf::decode(&stream(1, &body)).expect_err("id 5 is a library");
    assert!(err.is_format());
}

#[test]
fn test_unknown_record_tag() {
    let err = Nrbf::decode(&stream(1, &[0x63])).expect_err("tag 99 is unknown");
    assert!(err.is_format());
}

#[test]
fn test_method_records_are_unsupported() {
    for tag in [21u8, 22] {
        let err = Nrbf::decode(&stream(1, &[tag])).expect_err("method records are unsupported");
        assert!(err.is_format(), "tag {tag}: {err}");
    }
}

#[test]
fn test_unknown_primitive_type() {
    // MemberPrimitiveTyped with kind 4 (unused)
    let mut body = object_holder(&[0x08, 0x04, 0]);
    body.push(0x0B);
    assert!(Nrbf::decode(&stream(1, &body)).expect_err("kind 4").is_format());
}

#[test]
fn test_missing_header() {
    let err = Nrbf::decode(&[0x06, 1, 0, 0, 0, 0, 0x0B]).expect_err("no header");
    assert!(err.is_format());
}

#[test]
fn test_wrong_version() {
    let mut bytes = header(1);
    bytes[9] = 2;
    bytes.extend_from_slice(&[0x06, 1, 0, 0, 0, 0, 0x0B]);
    assert!(Nrbf::decode(&bytes).expect_err("version 2.0").is_format());
}

#[test]
fn test_root_never_defined() {
    let bytes = stream(3, &[0x06, 1, 0, 0, 0, 0, 0x0B]);
    assert!(matches!(
        Nrbf::decode(&bytes),
        Err(NrbfError::DanglingReference { .. })
    ));
}

#[test]
fn test_duplicate_id() {
    let bytes = stream(
        1,
        &[0x06, 1, 0, 0, 0, 0, 0x06, 1, 0, 0, 0, 0, 0x0B],
    );
    assert!(Nrbf::decode(&bytes).expect_err("id 1 twice").is_format());
}

#[test]
fn test_null_run_overflowing_array() {
    let bytes = stream(1, &[0x10, 1, 0, 0, 0, 2, 0, 0, 0, 0x0D, 3, 0x0B]);
    assert!(Nrbf::decode(&bytes).expect_err("3 nulls for 2 slots").is_format());
}

#[test]
fn test_top_level_reference_is_rejected() {
    let bytes = stream(1, &[0x06, 1, 0, 0, 0, 0, 0x09, 1, 0, 0, 0, 0x0B]);
    assert!(Nrbf::decode(&bytes).expect_err("reference outside an object").is_format());
}

#[test]
fn test_boxed_primitive_in_string_slot() {
    // ArraySingleString holding a boxed Int32
    let bytes = stream(1, &[0x11, 1, 0, 0, 0, 1, 0, 0, 0, 0x08, 0x08, 1, 0, 0, 0, 0x0B]);
    assert!(Nrbf::decode(&bytes).expect_err("boxed int in string array").is_format());
}

#[test]
fn test_class_in_string_slot_is_rejected() {
    let bytes = stream(
        1,
        &[
            0x11, 1, 0, 0, 0, 1, 0, 0, 0, // ArraySingleString, length 1
            0x04, 2, 0, 0, 0, 1, b'E', 0, 0, 0, 0, // empty system class
            0x0B,
        ],
    );
    assert!(Nrbf::decode(&bytes).expect_err("class in string array").is_format());
}

#[test]
fn test_invalid_boolean() {
    let mut body = object_holder(&[0x08, 0x01, 2]);
    body.push(0x0B);
    assert!(Nrbf::decode(&stream(1, &body)).expect_err("boolean 2").is_format());
}

#[test]
fn test_hostile_lengths_do_not_allocate() {
    // string claiming i32::MAX bytes
    let bytes = stream(1, &[0x06, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
    assert!(Nrbf::decode(&bytes).expect_err("huge string").is_truncated());

    // primitive array claiming i32::MAX elements
    let bytes = stream(1, &[0x0F, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0x7F, 0x08]);
    assert!(Nrbf::decode(&bytes).expect_err("huge primitive array").is_truncated());

    // object array claiming i32::MAX slots
    let bytes = stream(1, &[0x10, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0x7F]);
    assert!(matches!(
        Nrbf::decode(&bytes),
        Err(NrbfError::LimitExceeded(_))
    ));

    // class declaring i32::MAX members
    let bytes = stream(1, &[0x04, 1, 0, 0, 0, 1, b'P', 0xFF, 0xFF, 0xFF, 0x7F]);
    assert!(Nrbf::decode(&bytes).expect_err("huge member count").is_truncated());
}

/// `ArraySingleObject` of `length` slots filled by one `ObjectNullMultiple`.
fn null_filled_array(length: i32) -> Vec<u8> {
    let mut body = vec![0x10, 1, 0, 0, 0];
    body.extend(length.to_le_bytes());
    body.push(0x0E);
    body.extend(length.to_le_bytes());
    body.push(0x0B);
    stream(1, &body)
}

#[test]
fn test_null_runs_are_bounded_by_input_size() -> nrbf::Result<()> {
    let bytes = null_filled_array(0x00FF_FFFF);
    assert_eq!(bytes.len(), 32);
    assert!(matches!(
        Nrbf::decode(&bytes),
        Err(NrbfError::LimitExceeded(_))
    ));

    let budget = bytes.len() * DEFAULT_MAX_SLOTS_PER_BYTE;
    let graph = Nrbf::decode(&null_filled_array(budget as i32))?;
    let root = graph.root().expect("root");
    match graph.get(root) {
        Some(Object::Array(array)) => assert_eq!(array.items.len(), budget),
        other => panic!("expected an array, found {other:?}"),
    }

    let over = null_filled_array(budget as i32 + 1);
    assert!(matches!(
        Nrbf::decode(&over),
        Err(NrbfError::LimitExceeded(_))
    ));
    Nrbf::builder()
        .max_slots_per_byte(DEFAULT_MAX_SLOTS_PER_BYTE * 2)
        .decode(&over)?;
    Ok(())
}

#[test]
fn test_negative_length() {
    let bytes = stream(1, &[0x10, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0x0B]);
    assert!(Nrbf::decode(&bytes).expect_err("negative length").is_format());
}

#[test]
fn test_untyped_class_members_read_as_records() -> nrbf::Result<()> {
    // SystemClassWithMembers: member types are not declared, every value is a record
    let bytes = stream(
        1,
        &[
            0x02, 1, 0, 0, 0, 1, b'U', 2, 0, 0, 0, 1, b'a', 1, b'b',
            0x08, 0x08, 9, 0, 0, 0, // boxed Int32 9
            0x06, 2, 0, 0, 0, 2, b'h', b'i', // string
            0x0B,
        ],
    );
    let graph = Nrbf::decode(&bytes)?;
    let root = graph.root().expect("root is set");
    let class = graph.class(root)?;
    assert_eq!(class.field("a"), Some(&Value::from(9)));
    let b = graph.follow(root, "b")?.expect("b is set");
    assert_eq!(graph.string(b)?, "hi");
    Ok(())
}
