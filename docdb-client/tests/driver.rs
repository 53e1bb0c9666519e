//! End-to-end driver tests against an in-process server speaking the real
//! wire format over an in-memory duplex transport.

use docdb_bson::{doc, Document};
use docdb_client::{ClientError, Connection};

/// `{first: int32 1, second: 2.0, third: "three", fourth: {}, fifth:
/// {v: "e", f: "i"}}`, the legacy-encoded sample document.
const SAMPLE: [u8; 92] = [
    92, 0, 0, 0, 1, 115, 101, 99, 111, 110, 100, 0, 0, 0, 0, 0, 0, 0, 0, 64, 3, 102, 105, 102,
    116, 104, 0, 23, 0, 0, 0, 2, 118, 0, 2, 0, 0, 0, 101, 0, 2, 102, 0, 2, 0, 0, 0, 105, 0, 0, 3,
    102, 111, 117, 114, 116, 104, 0, 5, 0, 0, 0, 0, 2, 116, 104, 105, 114, 100, 0, 6, 0, 0, 0,
    116, 104, 114, 101, 101, 0, 16, 102, 105, 114, 115, 116, 0, 1, 0, 0, 0, 0,
];

mod mock {
    use super::*;
    use docdb_protocol::{encode_reply, OpCode, Reply};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Shared server state, inspectable from the test body.
    #[derive(Default)]
    pub struct State {
        pub collections: HashMap<String, Vec<Document>>,
        pub pending_cursors: HashMap<i64, Vec<Document>>,
        pub killed: Vec<i64>,
        /// When set, query results are split into batches of this size
        /// and continued through get-more.
        pub batch_size: Option<usize>,
        next_cursor_id: i64,
    }

    pub type Shared = Arc<Mutex<State>>;

    pub fn shared() -> Shared {
        Arc::new(Mutex::new(State::default()))
    }

    pub fn shared_with_batches(batch_size: usize) -> Shared {
        let state = shared();
        state.lock().unwrap().batch_size = Some(batch_size);
        state
    }

    fn matches(doc: &Document, selector: &Document) -> bool {
        selector.iter().all(|(k, v)| doc.get(k) == v)
    }

    /// Little-endian cursor over a request payload.
    struct Cur<'a> {
        buf: &'a [u8],
        pos: usize,
    }

    impl<'a> Cur<'a> {
        fn new(buf: &'a [u8]) -> Cur<'a> {
            Cur { buf, pos: 0 }
        }

        fn i32(&mut self) -> i32 {
            let v = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
            self.pos += 4;
            v
        }

        fn i64(&mut self) -> i64 {
            let v = i64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
            self.pos += 8;
            v
        }

        fn cstring(&mut self) -> String {
            let rest = &self.buf[self.pos..];
            let nul = rest.iter().position(|&b| b == 0).unwrap();
            let s = std::str::from_utf8(&rest[..nul]).unwrap().to_owned();
            self.pos += nul + 1;
            s
        }

        fn doc(&mut self) -> Document {
            let len = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
            let doc = Document::from_bytes(&self.buf[self.pos..self.pos + len as usize]).unwrap();
            self.pos += len as usize;
            doc
        }
    }

    pub async fn serve(mut stream: DuplexStream, state: Shared) {
        loop {
            let mut len_bytes = [0u8; 4];
            if stream.read_exact(&mut len_bytes).await.is_err() {
                return;
            }
            let total = i32::from_le_bytes(len_bytes) as usize;
            let mut body = vec![0u8; total - 4];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }

            let request_id = i32::from_le_bytes(body[0..4].try_into().unwrap());
            let op_code = i32::from_le_bytes(body[8..12].try_into().unwrap());
            let mut cur = Cur::new(&body[12..]);

            let reply = match op_code {
                c if c == OpCode::Insert as i32 => {
                    cur.i32();
                    let name = cur.cstring();
                    let doc = cur.doc();
                    state.lock().unwrap().collections.entry(name).or_default().push(doc);
                    None
                }
                c if c == OpCode::Query as i32 => {
                    cur.i32();
                    let name = cur.cstring();
                    let skip = cur.i32();
                    let limit = cur.i32();
                    let query = cur.doc();
                    Some(handle_query(&state, &name, skip, limit, &query, request_id))
                }
                c if c == OpCode::GetMore as i32 => {
                    cur.i32();
                    let _name = cur.cstring();
                    let _n = cur.i32();
                    let cursor_id = cur.i64();
                    Some(handle_get_more(&state, cursor_id, request_id))
                }
                c if c == OpCode::Update as i32 => {
                    cur.i32();
                    let name = cur.cstring();
                    let flags = cur.i32();
                    let selector = cur.doc();
                    let update = cur.doc();
                    handle_update(&state, &name, flags, &selector, update);
                    None
                }
                c if c == OpCode::Delete as i32 => {
                    cur.i32();
                    let name = cur.cstring();
                    let flags = cur.i32();
                    let selector = cur.doc();
                    handle_delete(&state, &name, flags, &selector);
                    None
                }
                c if c == OpCode::KillCursors as i32 => {
                    cur.i32();
                    let count = cur.i32();
                    let mut state = state.lock().unwrap();
                    for _ in 0..count {
                        let id = cur.i64();
                        state.killed.push(id);
                        state.pending_cursors.remove(&id);
                    }
                    None
                }
                other => panic!("mock server got unexpected opcode {other}"),
            };

            if let Some(bytes) = reply {
                stream.write_all(&bytes).await.unwrap();
            }
        }
    }

    fn handle_query(
        state: &Shared,
        name: &str,
        skip: i32,
        limit: i32,
        query: &Document,
        request_id: i32,
    ) -> Vec<u8> {
        if let Some(db) = name.strip_suffix(".$cmd") {
            let result = run_command(state, db, query);
            return encode_reply(0, request_id, 0, 0, 0, &[result]).unwrap();
        }

        let mut state = state.lock().unwrap();
        let empty = Vec::new();
        let found = state.collections.get(name).unwrap_or(&empty);
        let mut selected: Vec<Document> = found
            .iter()
            .filter(|doc| matches(doc, query))
            .skip(skip as usize)
            .cloned()
            .collect();
        if limit > 0 {
            selected.truncate(limit as usize);
        }

        match state.batch_size {
            Some(batch) if limit == 0 && selected.len() > batch => {
                let rest = selected.split_off(batch);
                state.next_cursor_id += 1;
                let id = state.next_cursor_id;
                state.pending_cursors.insert(id, rest);
                encode_reply(0, request_id, 0, id, 0, &selected).unwrap()
            }
            _ => encode_reply(0, request_id, 0, 0, 0, &selected).unwrap(),
        }
    }

    fn handle_get_more(state: &Shared, cursor_id: i64, request_id: i32) -> Vec<u8> {
        let mut state = state.lock().unwrap();
        match state.pending_cursors.remove(&cursor_id) {
            None => {
                encode_reply(0, request_id, Reply::CURSOR_NOT_FOUND, 0, 0, &[]).unwrap()
            }
            Some(mut rest) => match state.batch_size {
                Some(batch) if rest.len() > batch => {
                    let remainder = rest.split_off(batch);
                    state.pending_cursors.insert(cursor_id, remainder);
                    encode_reply(0, request_id, 0, cursor_id, 0, &rest).unwrap()
                }
                _ => encode_reply(0, request_id, 0, 0, 0, &rest).unwrap(),
            },
        }
    }

    fn handle_update(state: &Shared, name: &str, flags: i32, selector: &Document, update: Document) {
        let multi = flags & 2 != 0;
        let upsert = flags & 1 != 0;
        let mut state = state.lock().unwrap();
        let docs = state.collections.entry(name.to_owned()).or_default();
        let mut touched = false;
        for doc in docs.iter_mut() {
            if matches(doc, selector) {
                *doc = update.clone();
                touched = true;
                if !multi {
                    break;
                }
            }
        }
        if !touched && upsert {
            docs.push(update);
        }
    }

    fn handle_delete(state: &Shared, name: &str, flags: i32, selector: &Document) {
        let single = flags & 1 != 0;
        let mut state = state.lock().unwrap();
        let docs = state.collections.entry(name.to_owned()).or_default();
        if single {
            if let Some(idx) = docs.iter().position(|doc| matches(doc, selector)) {
                docs.remove(idx);
            }
        } else {
            docs.retain(|doc| !matches(doc, selector));
        }
    }

    fn run_command(state: &Shared, db: &str, cmd: &Document) -> Document {
        if cmd.contains_key("count") {
            let full_name = format!("{db}.{}", cmd.get("count").as_str());
            let selector = cmd.get("query").as_document().cloned().unwrap_or_default();
            let state = state.lock().unwrap();
            let n = state
                .collections
                .get(&full_name)
                .map(|docs| docs.iter().filter(|d| matches(d, &selector)).count())
                .unwrap_or(0);
            return doc! {"n": n as f64, "ok": 1.0};
        }
        if let Some(dropped) = cmd.get_opt("drop") {
            let mut state = state.lock().unwrap();
            state.collections.remove(dropped.as_str());
            return doc! {"ok": 1.0};
        }
        // dropDatabase, repairDatabase, deleteIndexes and friends succeed
        // unconditionally.
        doc! {"ok": 1.0}
    }
}

fn sample_doc() -> Document {
    Document::from_bytes(&SAMPLE).unwrap()
}

fn connect_mock(state: mock::Shared) -> Connection {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(mock::serve(server, state));
    Connection::over(client)
}

#[tokio::test]
async fn insert_query_count_update_remove() {
    let conn = connect_mock(mock::shared());
    let coll = conn.database("db").collection("coll");
    let doc = sample_doc();

    coll.insert(&doc).await.unwrap();

    // The cursor yields exactly the inserted document.
    let mut cursor = coll.find_all(&doc! {}).await.unwrap();
    assert!(cursor.has_more().await.unwrap());
    let got = cursor.next().await.unwrap();
    assert_eq!(got, doc);
    assert_eq!(got.get("first").int32(), 1);
    assert_eq!(got.get("fifth").get("f").as_str(), "i");
    assert!(!cursor.has_more().await.unwrap());
    assert!(matches!(
        cursor.next().await,
        Err(ClientError::CursorExhausted)
    ));

    assert_eq!(coll.count(&doc! {}).await.unwrap(), 1);

    // Whole-document replace, then read it back.
    let new_doc = doc! {"first": "one", "second": "two", "third": "three"};
    coll.update(&doc! {}, &new_doc).await.unwrap();
    let updated = coll.find_one(&doc! {}).await.unwrap().unwrap();
    assert_eq!(updated.get("first").as_str(), "one");

    coll.remove(&doc! {"third": "three"}).await.unwrap();
    assert!(coll
        .find_one(&doc! {"third": "three"})
        .await
        .unwrap()
        .is_none());
    assert_eq!(coll.count(&doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn cursor_iterates_across_batches() {
    let conn = connect_mock(mock::shared_with_batches(2));
    let coll = conn.database("db").collection("coll");

    for i in 0..5 {
        coll.insert(&doc! {"n": i}).await.unwrap();
    }

    let mut cursor = coll.find_all(&doc! {}).await.unwrap();
    assert_ne!(cursor.id(), 0);

    let mut seen = Vec::new();
    while cursor.has_more().await.unwrap() {
        seen.push(cursor.next().await.unwrap().get("n").int32());
    }
    assert_eq!(seen, [0, 1, 2, 3, 4]);
    // The final batch reported cursor id 0: exhausted.
    assert_eq!(cursor.id(), 0);
}

#[tokio::test]
async fn closing_an_open_cursor_kills_it_server_side() {
    let state = mock::shared_with_batches(1);
    let conn = connect_mock(state.clone());
    let coll = conn.database("db").collection("coll");

    for i in 0..3 {
        coll.insert(&doc! {"n": i}).await.unwrap();
    }

    let mut cursor = coll.find_all(&doc! {}).await.unwrap();
    let id = cursor.id();
    assert_ne!(id, 0);
    cursor.close().await.unwrap();
    assert!(matches!(
        cursor.next().await,
        Err(ClientError::CursorClosed)
    ));

    // Synchronize on a round trip so the fire-and-forget kill has been
    // processed, then check it landed.
    coll.count(&doc! {}).await.unwrap();
    assert_eq!(state.lock().unwrap().killed, [id]);
}

#[tokio::test]
async fn upsert_inserts_when_nothing_matches() {
    let conn = connect_mock(mock::shared());
    let coll = conn.database("db").collection("coll");

    coll.update(&doc! {"k": 1}, &doc! {"k": 1, "v": "x"})
        .await
        .unwrap();
    assert_eq!(coll.count(&doc! {}).await.unwrap(), 0);

    coll.upsert(&doc! {"k": 1}, &doc! {"k": 1, "v": "x"})
        .await
        .unwrap();
    assert_eq!(coll.count(&doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn remove_one_leaves_other_matches() {
    let conn = connect_mock(mock::shared());
    let coll = conn.database("db").collection("coll");

    coll.insert(&doc! {"k": 1, "n": 1}).await.unwrap();
    coll.insert(&doc! {"k": 1, "n": 2}).await.unwrap();
    coll.remove_one(&doc! {"k": 1}).await.unwrap();
    assert_eq!(coll.count(&doc! {"k": 1}).await.unwrap(), 1);

    coll.remove(&doc! {"k": 1}).await.unwrap();
    assert_eq!(coll.count(&doc! {"k": 1}).await.unwrap(), 0);
}

#[tokio::test]
async fn update_all_replaces_every_match() {
    let conn = connect_mock(mock::shared());
    let coll = conn.database("db").collection("coll");

    coll.insert(&doc! {"k": 1, "n": 1}).await.unwrap();
    coll.insert(&doc! {"k": 1, "n": 2}).await.unwrap();
    coll.update_all(&doc! {"k": 1}, &doc! {"k": 2}).await.unwrap();
    assert_eq!(coll.count(&doc! {"k": 2}).await.unwrap(), 2);
}

#[tokio::test]
async fn ensure_index_registers_a_descriptor() {
    let conn = connect_mock(mock::shared());
    let db = conn.database("db");
    let coll = db.collection("coll");

    coll.ensure_index("first_1", &doc! {"first": 1}).await.unwrap();

    let desc = db
        .collection("system.indexes")
        .find_one(&doc! {"name": "first_1"})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(desc.get("ns").as_str(), "db.coll");
    assert_eq!(desc.get("key").get("first").int32(), 1);

    // The admin commands complete against the $cmd collection.
    coll.drop_indexes().await.unwrap();
    coll.drop().await.unwrap();
    db.drop().await.unwrap();
    db.repair(false, false).await.unwrap();
}

#[tokio::test]
async fn desynchronized_reply_poisons_the_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (client, mut server) = tokio::io::duplex(64 * 1024);
    // A broken server that answers with the wrong correlation id.
    tokio::spawn(async move {
        let mut len_bytes = [0u8; 4];
        server.read_exact(&mut len_bytes).await.unwrap();
        let mut body = vec![0u8; i32::from_le_bytes(len_bytes) as usize - 4];
        server.read_exact(&mut body).await.unwrap();
        let request_id = i32::from_le_bytes(body[0..4].try_into().unwrap());
        let bytes =
            docdb_protocol::encode_reply(0, request_id + 1000, 0, 0, 0, &[]).unwrap();
        server.write_all(&bytes).await.unwrap();
        // Stay alive so the failure is the mismatch, not an EOF.
        std::future::pending::<()>().await;
    });

    let conn = Connection::over(client);
    let coll = conn.database("db").collection("coll");

    let err = coll.find_all(&doc! {}).await.unwrap_err();
    assert!(matches!(err, ClientError::Desynchronized { .. }));
    assert!(!conn.is_live());

    // Everything afterwards fails fast.
    let err = coll.insert(&sample_doc()).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionPoisoned));
    let err = coll.find_one(&doc! {}).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionPoisoned));
}

#[tokio::test]
async fn transport_failure_poisons_the_connection() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    drop(server);

    let conn = Connection::over(client);
    let coll = conn.database("db").collection("coll");

    let err = coll.find_all(&doc! {}).await.unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));

    let err = coll.find_all(&doc! {}).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionPoisoned));
}

#[tokio::test]
async fn operations_fail_after_close() {
    let conn = connect_mock(mock::shared());
    let coll = conn.database("db").collection("coll");
    coll.insert(&sample_doc()).await.unwrap();

    conn.close().await.unwrap();
    let err = coll.find_all(&doc! {}).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
}
