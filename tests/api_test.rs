#![allow(missing_docs)]

use std::sync::Arc;

use nrbf::{
    AllowList, ArrayObject, ClassShape, MemberType, Nrbf, NrbfError, NrbfInspector, ObjectGraph,
    PrimitiveType, RecordType, TrailingBytes, Value,
};

fn item_shape() -> Arc<ClassShape> {
    Arc::new(
        ClassShape::new("Demo.Item", Some("Demo"))
            .member("id", MemberType::Primitive(PrimitiveType::Int64))
            .member("label", MemberType::String),
    )
}

// Generator of data
fn create_item_list(count: usize) -> ObjectGraph {
    let mut graph = ObjectGraph::new();
    let items = (0..count)
        .map(|i| {
            let label = graph.add_string(format!("item-{i}"));
            Value::Ref(graph.add_class(item_shape(), vec![Value::from(i as i64), Value::Ref(label)]))
        })
        .collect();
    let list = graph.add_array(ArrayObject::single(MemberType::Object, items));
    graph.set_root(list);
    graph
}

fn create_chain(length: usize) -> ObjectGraph {
    let shape = Arc::new(ClassShape::new("Demo.Cell", Some("Demo")).member("next", MemberType::Object));
    let mut graph = ObjectGraph::new();
    let mut next = Value::Null;
    for _ in 0..length {
        next = Value::Ref(graph.add_class(Arc::clone(&shape), vec![next]));
    }
    graph.set_root(next.as_ref_node().expect("chain is not empty"));
    graph
}

// --- TESTS ---

/// Standard File IO
/// Validate `Nrbf::save`, `Nrbf::load`
#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_standard_file_io() -> nrbf::Result<()> {
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("items.bin");
    let graph = create_item_list(100);

    Nrbf::save(&file_path, &graph)?;
    let loaded = Nrbf::load(&file_path)?;

    let (a, b) = (graph.root().expect("root"), loaded.root().expect("root"));
    assert!(graph.structurally_eq(a, &loaded, b));
    assert_eq!(std::fs::read(&file_path)?, Nrbf::encode(&graph)?);
    Ok(())
}

#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_load_empty_file() -> nrbf::Result<()> {
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("empty.bin");
    std::fs::write(&file_path, b"")?;

    assert!(Nrbf::load(&file_path).expect_err("empty file").is_truncated());
    Ok(())
}

#[test]
fn test_load_missing_file() {
    let err = Nrbf::load("/definitely/not/here.bin").expect_err("missing file");
    assert!(matches!(err, NrbfError::Io(_)));
}

/// Pure Memory IO
/// Validate `Nrbf::write`
#[test]
fn test_memory_io() -> nrbf::Result<()> {
    let graph = create_item_list(10);
    let mut buffer = Vec::new();

    Nrbf::write(&mut buffer, &graph)?;

    assert_eq!(buffer, Nrbf::encode(&graph)?);
    Nrbf::decode(&buffer)?;
    Ok(())
}

/// Inspector
/// Validate metadata reuse: one full class record, then `ClassWithId`
#[test]
fn test_inspector_metadata_counts() -> nrbf::Result<()> {
    let bytes = Nrbf::encode(&create_item_list(5))?;
    let report = NrbfInspector::inspect(&bytes)?;

    assert_eq!(report.count(RecordType::ClassWithMembersAndTypes), 1);
    assert_eq!(report.count(RecordType::ClassWithId), 4);
    assert_eq!(report.count(RecordType::BinaryLibrary), 1);
    assert_eq!(report.count(RecordType::BinaryObjectString), 5);
    assert_eq!(report.count(RecordType::ArraySingleObject), 1);
    assert_eq!(report.count(RecordType::MessageEnd), 1);
    assert_eq!(report.root_id, 1);
    assert_eq!(report.total_bytes, bytes.len());

    let sequence = report.sequence();
    assert_eq!(sequence.first(), Some(&RecordType::SerializedStreamHeader));
    assert_eq!(sequence.last(), Some(&RecordType::MessageEnd));
    let library = sequence.iter().position(|t| *t == RecordType::BinaryLibrary);
    let class = sequence
        .iter()
        .position(|t| *t == RecordType::ClassWithMembersAndTypes);
    assert!(library < class);
    Ok(())
}

#[test]
fn test_inspector_reference_counts() -> nrbf::Result<()> {
    let mut graph = ObjectGraph::new();
    let s = graph.add_string("shared");
    let arr = graph.add_array(ArrayObject::single(
        MemberType::String,
        vec![Value::Ref(s), Value::Ref(s), Value::Ref(s)],
    ));
    graph.set_root(arr);

    let report = NrbfInspector::inspect(&Nrbf::encode(&graph)?)?;
    assert_eq!(report.count(RecordType::BinaryObjectString), 1);
    assert_eq!(report.count(RecordType::MemberReference), 2);

    let nested = report
        .records
        .iter()
        .find(|r| r.record_type == RecordType::BinaryObjectString)
        .expect("string record");
    assert_eq!(nested.depth, 1);
    assert_eq!(nested.object_id, Some(2));
    Ok(())
}

#[test]
fn test_inspector_report_formats() -> nrbf::Result<()> {
    let report = NrbfInspector::inspect(&Nrbf::encode(&create_item_list(2))?)?;
    let text = report.to_string();
    assert!(text.contains("ClassWithMembersAndTypes"));
    assert!(text.contains("ClassWithId"));
    Ok(())
}

/// Options
/// Validate `TrailingBytes`
#[test]
fn test_trailing_bytes_policy() -> nrbf::Result<()> {
    let mut bytes = Nrbf::encode(&create_item_list(1))?;
    bytes.extend_from_slice(&[0xDE, 0xAD]);

    Nrbf::decode(&bytes)?;
    let report = NrbfInspector::inspect(&bytes)?;
    assert_eq!(report.trailing_bytes, 2);

    let strict = Nrbf::builder().trailing(TrailingBytes::Reject);
    assert!(strict.decode(&bytes).expect_err("trailing bytes").is_format());
    Ok(())
}

#[test]
fn test_depth_limit() -> nrbf::Result<()> {
    let graph = create_chain(10);
    let shallow = Nrbf::builder().max_depth(3);

    assert!(matches!(
        shallow.encode(&graph),
        Err(NrbfError::LimitExceeded(_))
    ));

    let bytes = Nrbf::encode(&graph)?;
    assert!(matches!(
        shallow.decode(&bytes),
        Err(NrbfError::LimitExceeded(_))
    ));
    Nrbf::builder().max_depth(9).decode(&bytes)?;
    Ok(())
}

#[test]
fn test_object_limit() -> nrbf::Result<()> {
    let bytes = Nrbf::encode(&create_item_list(3))?;
    assert!(matches!(
        Nrbf::builder().max_objects(4).decode(&bytes),
        Err(NrbfError::LimitExceeded(_))
    ));
    Nrbf::builder().max_objects(8).decode(&bytes)?;
    Ok(())
}

#[test]
fn test_slot_limit() -> nrbf::Result<()> {
    let mut graph = ObjectGraph::new();
    let arr = graph.add_array(ArrayObject::single(MemberType::Object, vec![Value::Null; 1000]));
    graph.set_root(arr);
    let bytes = Nrbf::encode(&graph)?;

    assert!(matches!(
        Nrbf::builder().max_slots(999).decode(&bytes),
        Err(NrbfError::LimitExceeded(_))
    ));
    Nrbf::builder().max_slots(1000).decode(&bytes)?;
    Ok(())
}

/// Binder
/// Validate `AllowList`
#[test]
fn test_binder_rejects_unlisted_class() -> nrbf::Result<()> {
    let bytes = Nrbf::encode(&create_item_list(2))?;

    let strict = Nrbf::builder().binder(Arc::new(AllowList::new().allow("Demo", "Other.Type")));
    let err = strict.decode(&bytes).expect_err("Demo.Item is not listed");
    assert!(err.is_format());
    assert!(matches!(
        err,
        NrbfError::Rejected { ref class, ref library }
            if class == "Demo.Item" && library.as_deref() == Some("Demo")
    ));

    let open = Nrbf::builder().binder(Arc::new(AllowList::new().allow("Demo", "Demo.Item")));
    open.decode(&bytes)?;
    Ok(())
}

#[test]
fn test_binder_system_classes() -> nrbf::Result<()> {
    let shape = Arc::new(
        ClassShape::new("System.Version", None)
            .member("_Major", MemberType::Primitive(PrimitiveType::Int32)),
    );
    let mut graph = ObjectGraph::new();
    let root = graph.add_class(shape, vec![Value::from(4)]);
    graph.set_root(root);
    let bytes = Nrbf::encode(&graph)?;

    let listed = AllowList::new().allow_system("System.Version");
    Nrbf::builder().binder(Arc::new(listed)).decode(&bytes)?;

    let wrong_library = AllowList::new().allow("mscorlib", "System.Version");
    assert!(
        Nrbf::builder()
            .binder(Arc::new(wrong_library))
            .decode(&bytes)
            .is_err()
    );
    Ok(())
}

/// Batch
/// Validate `encode_batch`, `decode_batch`
#[test]
fn test_batch_round_trip() -> nrbf::Result<()> {
    let graphs: Vec<ObjectGraph> = (1..=8).map(create_item_list).collect();

    let encoded = Nrbf::encode_batch(&graphs)
        .into_iter()
        .collect::<nrbf::Result<Vec<_>>>()?;
    for (graph, bytes) in graphs.iter().zip(&encoded) {
        assert_eq!(&Nrbf::encode(graph)?, bytes);
    }

    let mut streams: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
    let garbage = [0xFFu8, 0x00];
    streams.push(&garbage);

    let decoded = Nrbf::decode_batch(&streams);
    assert_eq!(decoded.len(), 9);
    for (graph, result) in graphs.iter().zip(&decoded) {
        let result = result.as_ref().map_err(Clone::clone)?;
        assert!(graph.structurally_eq(
            graph.root().expect("root"),
            result,
            result.root().expect("root")
        ));
    }
    assert!(decoded[8].is_err());
    Ok(())
}

#[test]
fn test_error_is_clone_and_displays() {
    let err = Nrbf::decode(&[]).expect_err("empty input");
    let copy = err.clone();
    assert_eq!(err.to_string(), copy.to_string());
    assert!(err.to_string().starts_with("Truncated"));
}
