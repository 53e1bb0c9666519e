//! End-to-end codec checks against a known-good byte vector.

use docdb_bson::{doc, from_document, marshal, to_vec, unmarshal, Document, Kind, Value};
use serde::{Deserialize, Serialize};

/// `{first: int32 1, second: 2.0, third: "three", fourth: {}, fifth:
/// {v: "e", f: "i"}}` as produced by a legacy encoder.
const SAMPLE: [u8; 92] = [
    92, 0, 0, 0, 1, 115, 101, 99, 111, 110, 100, 0, 0, 0, 0, 0, 0, 0, 0, 64, 3, 102, 105, 102,
    116, 104, 0, 23, 0, 0, 0, 2, 118, 0, 2, 0, 0, 0, 101, 0, 2, 102, 0, 2, 0, 0, 0, 105, 0, 0, 3,
    102, 111, 117, 114, 116, 104, 0, 5, 0, 0, 0, 0, 2, 116, 104, 105, 114, 100, 0, 6, 0, 0, 0,
    116, 104, 114, 101, 101, 0, 16, 102, 105, 114, 115, 116, 0, 1, 0, 0, 0, 0,
];

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct EmptyStruct {}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct OtherStruct {
    f: String,
    v: String,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct ExampleStruct {
    first: i32,
    second: f64,
    third: String,
    fourth: EmptyStruct,
    fifth: OtherStruct,
}

fn expected_tree() -> Document {
    doc! {
        "first": 1,
        "second": 2.0,
        "third": "three",
        "fourth": doc! {},
        "fifth": doc! {"v": "e", "f": "i"},
    }
}

#[test]
fn decodes_sample_bytes() {
    let doc = Document::from_bytes(&SAMPLE).unwrap();
    assert_eq!(doc.get("first").int32(), 1);
    assert_eq!(doc.get("second").number(), 2.0);
    assert_eq!(doc.get("third").as_str(), "three");
    assert_eq!(doc.get("fourth").kind(), Kind::Document);
    assert_eq!(doc.get("fifth").get("f").as_str(), "i");
    assert_eq!(doc.get("fifth").get("v").as_str(), "e");
    assert_eq!(doc, expected_tree());
}

#[test]
fn serialize_then_deserialize_is_identity() {
    let doc = Document::from_bytes(&SAMPLE).unwrap();
    let reencoded = doc.to_bytes().unwrap();
    let doc2 = Document::from_bytes(&reencoded).unwrap();
    assert_eq!(doc, doc2);
}

#[test]
fn reencoding_foreign_bytes_preserves_the_tree() {
    // Key order in the sample differs from ours; the byte strings need
    // not match, but the trees must.
    let original = Document::from_bytes(&SAMPLE).unwrap();
    let ours = original.to_bytes().unwrap();
    assert_ne!(ours.as_slice(), &SAMPLE[..]);
    assert_eq!(Document::from_bytes(&ours).unwrap(), original);
}

#[test]
fn marshalled_record_matches_sample_tree() {
    let es = ExampleStruct {
        first: 1,
        second: 2.0,
        third: "three".into(),
        fourth: EmptyStruct {},
        fifth: OtherStruct {
            f: "i".into(),
            v: "e".into(),
        },
    };
    let value = marshal(&es).unwrap();
    assert_eq!(value, Value::Document(Document::from_bytes(&SAMPLE).unwrap()));
}

#[test]
fn unmarshal_sample_into_record() {
    let es: ExampleStruct = unmarshal(&SAMPLE).unwrap();
    assert_eq!(es.first, 1);
    assert_eq!(es.second, 2.0);
    assert_eq!(es.third, "three");
    assert_eq!(es.fifth.f, "i");
    assert_eq!(es.fifth.v, "e");
}

#[test]
fn unmarshal_then_marshal_round_trips() {
    let es: ExampleStruct = unmarshal(&SAMPLE).unwrap();
    let remarshalled = marshal(&es).unwrap();
    let original = Document::from_bytes(&SAMPLE).unwrap();
    assert_eq!(remarshalled, Value::Document(original));
}

#[test]
fn marshalled_map_matches_subdocument() {
    let map = std::collections::BTreeMap::from([("f", "i"), ("v", "e")]);
    let value = marshal(&map).unwrap();
    let sample = Document::from_bytes(&SAMPLE).unwrap();
    assert_eq!(&value, sample.get("fifth"));
}

#[test]
fn id_field_round_trips_through_bytes() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ExampleWithId {
        id_: String,
        other: String,
    }
    let ei = ExampleWithId {
        id_: "fooid".into(),
        other: "bar".into(),
    };
    let bytes = to_vec(&ei).unwrap();
    let parsed = Document::from_bytes(&bytes).unwrap();
    assert_eq!(parsed.get("_id").as_str(), "fooid");

    let back: ExampleWithId = unmarshal(&bytes).unwrap();
    assert_eq!(back.id_, "fooid");
}

#[test]
fn marshalled_array_uses_int64_elements() {
    let arr = marshal(&vec![1i64, 2, 3]).unwrap();
    assert_eq!(arr.elem(0).int64(), 1);
    assert_eq!(arr.elem(1).int64(), 2);
    assert_eq!(arr.elem(2).int64(), 3);
}

#[test]
fn date_round_trips_through_record() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dated {
        date: docdb_bson::DateTime,
    }
    let d = Dated {
        date: docdb_bson::DateTime::from_millis(1_234_567_890_123),
    };
    let bytes = to_vec(&d).unwrap();
    let doc = Document::from_bytes(&bytes).unwrap();
    assert_eq!(doc.get("date").kind(), Kind::DateTime);
    assert_eq!(doc.get("date").date_millis(), 1_234_567_890_123);
    let back: Dated = from_document(doc).unwrap();
    assert_eq!(back, d);
}
