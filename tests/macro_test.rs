#![allow(missing_docs)]

use nrbf::rt::NrbfField;
use nrbf::{MemberType, Nrbf, NrbfClass, NrbfInspector, PrimitiveType, RecordType};

#[derive(NrbfClass, PartialEq, Debug, Clone)]
#[nrbf(class = "Demo.Address", library = "Demo.Model")]
struct Address {
    street: String,
    number: u16,
}

#[derive(NrbfClass, PartialEq, Debug, Clone)]
#[nrbf(class = "Demo.Person", library = "Demo.Model")]
struct Person {
    #[nrbf(rename = "<Name>k__BackingField")]
    name: String,
    age: i32,
    nickname: Option<String>,
    lucky: Option<i64>,
    scores: Vec<f64>,
    home: Address,
    work: Option<Address>,
}

#[derive(NrbfClass, PartialEq, Debug)]
struct Flags {
    on: bool,
    mask: u64,
    initial: char,
}

fn create_person() -> Person {
    Person {
        name: "Ada".to_string(),
        age: 36,
        nickname: None,
        lucky: Some(7),
        scores: vec![1.0, 2.5, -0.125],
        home: Address {
            street: "Main".to_string(),
            number: 12,
        },
        work: Some(Address {
            street: "Harbor".to_string(),
            number: 1,
        }),
    }
}

// --- TESTS ---

#[test]
fn test_derived_round_trip() -> nrbf::Result<()> {
    let person = create_person();
    let bytes = Nrbf::to_bytes(&person)?;
    let loaded: Person = Nrbf::from_bytes(&bytes)?;
    assert_eq!(person, loaded);
    Ok(())
}

#[test]
fn test_derived_shape() {
    let shape = <Person as NrbfClass>::shape();
    assert_eq!(shape.name, "Demo.Person");
    assert_eq!(shape.library.as_deref(), Some("Demo.Model"));

    let names: Vec<&str> = shape.members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "<Name>k__BackingField",
            "age",
            "nickname",
            "lucky",
            "scores",
            "home",
            "work"
        ]
    );
    assert_eq!(shape.members[1].ty, MemberType::Primitive(PrimitiveType::Int32));
    assert_eq!(shape.members[2].ty, MemberType::String);
    assert_eq!(shape.members[3].ty, MemberType::Object);
    assert_eq!(shape.members[4].ty, MemberType::PrimitiveArray(PrimitiveType::Double));
    assert_eq!(
        shape.members[5].ty,
        MemberType::Class {
            name: "Demo.Address".into(),
            library: "Demo.Model".into(),
        }
    );
}

#[test]
fn test_defaults_to_system_class_named_after_struct() -> nrbf::Result<()> {
    let shape = <Flags as NrbfClass>::shape();
    assert_eq!(shape.name, "Flags");
    assert!(shape.is_system());
    assert_eq!(
        <Flags as NrbfField>::member_type(),
        MemberType::SystemClass("Flags".into())
    );

    let flags = Flags {
        on: true,
        mask: u64::MAX,
        initial: 'ß',
    };
    let bytes = Nrbf::to_bytes(&flags)?;
    let report = NrbfInspector::inspect(&bytes)?;
    assert_eq!(report.count(RecordType::SystemClassWithMembersAndTypes), 1);
    assert_eq!(report.count(RecordType::BinaryLibrary), 0);

    let loaded: Flags = Nrbf::from_bytes(&bytes)?;
    assert_eq!(flags, loaded);
    Ok(())
}

#[test]
fn test_nested_classes_share_metadata() -> nrbf::Result<()> {
    let bytes = Nrbf::to_bytes(&create_person())?;
    let report = NrbfInspector::inspect(&bytes)?;

    // Person and the first Address carry metadata; the second Address reuses it.
    assert_eq!(report.count(RecordType::ClassWithMembersAndTypes), 2);
    assert_eq!(report.count(RecordType::ClassWithId), 1);
    assert_eq!(report.count(RecordType::BinaryLibrary), 1);
    assert_eq!(report.count(RecordType::MemberPrimitiveTyped), 1);
    assert_eq!(report.count(RecordType::ArraySinglePrimitive), 1);
    Ok(())
}

#[test]
fn test_wrong_root_class_is_rejected() -> nrbf::Result<()> {
    let bytes = Nrbf::to_bytes(&create_person())?;
    let err = Nrbf::from_bytes::<Address>(&bytes).expect_err("root is a Person");
    assert!(err.to_string().contains("Demo.Address"));
    Ok(())
}
