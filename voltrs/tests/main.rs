//! End-to-end scenarios driven against in-process mock servers: real
//! `tokio::net::TcpListener`/`TcpStream` pairs on `127.0.0.1`, so the
//! whole stack (codec, connection actor, router, client façade) is
//! exercised exactly as it would be against a real cluster.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use voltrs::buffer::OwnedBuffer;
use voltrs::client::Client;
use voltrs::config::ClientConfig;
use voltrs::connection::Connection;
use voltrs::hash::murmur3_32;
use voltrs::message::auth::HashScheme;
use voltrs::listener::NullListener;
use voltrs::message::invocation::StatusCode;
use voltrs::procedure::Procedure;
use voltrs::router::Router;
use voltrs::table::Table;
use voltrs::value::{Value, WireTag};
use voltrs::ClientError;

const FIELD_STATUS_STRING: u8 = 1 << 5;
const FIELD_APP_STATUS_STRING: u8 = 1 << 7;

fn framed(body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as i32).to_be_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

async fn read_frame(stream: &mut tokio::net::tcp::OwnedReadHalf) -> Vec<u8> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.unwrap();
    let len = i32::from_be_bytes(len_bytes) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    body
}

fn auth_response_bytes(
    result_code: i8,
    host_id: i32,
    cluster_start_time: i64,
    leader_address: i32,
    build_string: &str,
) -> Vec<u8> {
    let mut buf = OwnedBuffer::new();
    buf.write_i8(0).unwrap();
    buf.write_i8(result_code).unwrap();
    if result_code == 0 {
        buf.write_i32(host_id).unwrap();
        buf.write_i64(1).unwrap(); // connection id, unused by these tests
        buf.write_i64(cluster_start_time).unwrap();
        buf.write_i32(leader_address).unwrap();
        buf.write_string(Some(build_string.as_bytes())).unwrap();
    }
    buf.as_written().to_vec()
}

/// Reads the client token back out of a request this client's own
/// `InvocationRequest::serialize` produced, so tests can answer with a
/// response carrying the right token without depending on the token
/// generator's internal starting value.
fn request_client_token(body: &[u8]) -> i64 {
    let name_len = i32::from_be_bytes(body[1..5].try_into().unwrap()).max(0) as usize;
    let start = 5 + name_len;
    i64::from_be_bytes(body[start..start + 8].try_into().unwrap())
}

fn invocation_response_bytes(
    client_token: i64,
    status: StatusCode,
    status_string: Option<&str>,
    app_status_code: i8,
    cluster_round_trip_time: i32,
    tables: &[Vec<u8>],
) -> Vec<u8> {
    let mut buf = OwnedBuffer::new();
    buf.write_i8(0).unwrap();
    buf.write_i64(client_token).unwrap();
    let present = if status_string.is_some() {
        FIELD_STATUS_STRING
    } else {
        0
    };
    buf.write_u8(present).unwrap();
    buf.write_i8(status.as_i8()).unwrap();
    if let Some(s) = status_string {
        buf.write_string(Some(s.as_bytes())).unwrap();
    }
    buf.write_i8(app_status_code).unwrap();
    buf.write_i32(cluster_round_trip_time).unwrap();
    buf.write_i16(tables.len() as i16).unwrap();
    for table in tables {
        buf.write_i32(table.len() as i32).unwrap();
        buf.write_bytes(table).unwrap();
    }
    buf.as_written().to_vec()
}

fn build_table_bytes(columns: &[(&str, WireTag)], rows: &[Vec<Value>]) -> Vec<u8> {
    let mut buf = OwnedBuffer::new();
    buf.write_i32(0).unwrap(); // header size placeholder
    buf.write_i8(i8::MIN).unwrap(); // status code
    buf.write_i16(columns.len() as i16).unwrap();
    for (_, tag) in columns {
        buf.write_i8(*tag as i8).unwrap();
    }
    for (name, _) in columns {
        buf.write_string(Some(name.as_bytes())).unwrap();
    }
    let row_count_position = buf.position();
    buf.put_i32(0, (row_count_position - 4) as i32).unwrap();
    buf.write_i32(rows.len() as i32).unwrap();
    for row in rows {
        let mut row_buf = OwnedBuffer::new();
        for value in row {
            value.write_body(&mut row_buf).unwrap();
        }
        buf.write_i32(row_buf.position() as i32).unwrap();
        buf.write_bytes(row_buf.as_written()).unwrap();
    }
    buf.as_written().to_vec()
}

async fn bind_loopback() -> (TcpListener, String, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr.ip().to_string(), addr.port())
}

/// Scenario 1: authenticate as `("hello", "world", SHA1)` against a mock
/// replying with a fixed handshake, and assert every field.
#[tokio::test]
async fn authenticates_and_reports_cluster_identity() {
    let (listener, host, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (mut r, mut w) = socket.into_split();
        let _auth_request = read_frame(&mut r).await;
        w.write_all(&framed(&auth_response_bytes(
            0,
            0,
            0x4B1DFA11FEEDFACEu64 as i64,
            0x7F000001u32 as i32,
            "volt_6.1_test_build_string",
        )))
        .await
        .unwrap();
        w.flush().await.unwrap();
    });

    let (conn, auth) = Connection::connect(
        &host,
        port,
        "database",
        "hello",
        "world",
        HashScheme::Sha1,
        Arc::new(NullListener),
    )
    .await
    .unwrap();

    server.await.unwrap();
    assert!(auth.success());
    assert_eq!(conn.host_id(), 0);
    assert_eq!(auth.cluster_start_time, 0x4B1DFA11FEEDFACEu64 as i64);
    assert_eq!(auth.leader_address, 0x7F000001u32 as i32);
    assert_eq!(auth.build_string, "volt_6.1_test_build_string");
}

/// Scenarios 2 & 3: a successful insert and a constraint-violation
/// insert against the same mock connection.
#[tokio::test]
async fn invoke_reports_success_and_graceful_failure() {
    let (listener, host, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (mut r, mut w) = socket.into_split();
        let _auth_request = read_frame(&mut r).await;
        w.write_all(&framed(&auth_response_bytes(0, 0, 1, 1, "mock")))
            .await
            .unwrap();
        w.flush().await.unwrap();

        let english = read_frame(&mut r).await;
        let token = request_client_token(&english);
        w.write_all(&framed(&invocation_response_bytes(
            token,
            StatusCode::Success,
            None,
            -128,
            4,
            &[],
        )))
        .await
        .unwrap();
        w.flush().await.unwrap();

        let french = read_frame(&mut r).await;
        let token = request_client_token(&french);
        w.write_all(&framed(&invocation_response_bytes(
            token,
            StatusCode::GracefulFailure,
            Some("CONSTRAINT VIOLATION: duplicate key"),
            -128,
            2,
            &[],
        )))
        .await
        .unwrap();
        w.flush().await.unwrap();
    });

    let client = Client::new(ClientConfig::default());
    client.create_connection(&host, port, false).await.unwrap();

    let insert = Procedure::new(
        "Insert",
        vec![WireTag::String, WireTag::String, WireTag::String],
    );

    let mut english = insert.params();
    english.add(Value::String(Some(b"English".to_vec()))).unwrap();
    english.add(Value::String(Some(b"Hello".to_vec()))).unwrap();
    english.add(Value::String(Some(b"World".to_vec()))).unwrap();
    let response = client.invoke(&insert, english).await.unwrap();
    assert_eq!(response.status_code, StatusCode::Success);
    assert_eq!(response.app_status_code, -128);
    assert_eq!(response.cluster_round_trip_time, 4);
    assert!(response.results.is_empty());

    let mut french = insert.params();
    french.add(Value::String(Some(b"French".to_vec()))).unwrap();
    french.add(Value::String(Some(b"Bonjour".to_vec()))).unwrap();
    french.add(Value::String(Some(b"Monde".to_vec()))).unwrap();
    let response = client.invoke(&insert, french).await.unwrap();
    assert_eq!(response.status_code, StatusCode::GracefulFailure);
    assert!(response
        .status_string
        .as_deref()
        .unwrap()
        .contains("CONSTRAINT VIOLATION"));

    server.await.unwrap();
}

/// Scenario 4: a select round-trips a two-column STRING result table.
#[tokio::test]
async fn select_round_trips_string_columns() {
    let (listener, host, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (mut r, mut w) = socket.into_split();
        let _auth_request = read_frame(&mut r).await;
        w.write_all(&framed(&auth_response_bytes(0, 0, 1, 1, "mock")))
            .await
            .unwrap();
        w.flush().await.unwrap();

        let select = read_frame(&mut r).await;
        let token = request_client_token(&select);
        let table = build_table_bytes(
            &[("HELLO", WireTag::String), ("WORLD", WireTag::String)],
            &[vec![
                Value::String(Some(b"Hello".to_vec())),
                Value::String(Some(b"World".to_vec())),
            ]],
        );
        w.write_all(&framed(&invocation_response_bytes(
            token,
            StatusCode::Success,
            None,
            i8::MIN,
            1,
            &[table],
        )))
        .await
        .unwrap();
        w.flush().await.unwrap();
    });

    let client = Client::new(ClientConfig::default());
    client.create_connection(&host, port, false).await.unwrap();

    let select = Procedure::new("Select", vec![]);
    let response = client.invoke(&select, select.params()).await.unwrap();
    assert!(response.success());
    assert_eq!(response.results.len(), 1);
    let table = &response.results[0];
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.schema().column_name(0).unwrap(), "HELLO");
    assert_eq!(table.schema().column_name(1).unwrap(), "WORLD");
    let row = table.row(0).unwrap();
    assert_eq!(
        row.get_by_name("HELLO").unwrap(),
        Value::String(Some(b"Hello".to_vec()))
    );
    assert_eq!(
        row.get_by_name("WORLD").unwrap(),
        Value::String(Some(b"World".to_vec()))
    );

    server.await.unwrap();
}

/// Scenario 6: 5 async inserts against a mock that acknowledges the
/// first two requests and reads (but never answers) the third before
/// hanging up. Expect exactly 2 successful and 3 `CONNECTION_LOST`
/// callbacks, and a `drain()` that returns once both paths settle.
#[tokio::test]
async fn mid_stream_hangup_completes_every_outstanding_invocation() {
    let (listener, host, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (mut r, mut w) = socket.into_split();
        let _auth_request = read_frame(&mut r).await;
        w.write_all(&framed(&auth_response_bytes(0, 0, 1, 1, "mock")))
            .await
            .unwrap();
        w.flush().await.unwrap();

        for _ in 0..2 {
            let body = read_frame(&mut r).await;
            let token = request_client_token(&body);
            w.write_all(&framed(&invocation_response_bytes(
                token,
                StatusCode::Success,
                None,
                i8::MIN,
                1,
                &[],
            )))
            .await
            .unwrap();
            w.flush().await.unwrap();
        }
        let _third_request = read_frame(&mut r).await;
        drop(w);
        drop(r);
    });

    let client = Client::new(ClientConfig::default());
    client.create_connection(&host, port, false).await.unwrap();

    let insert = Procedure::new("Insert", vec![WireTag::BigInt]);
    let results: Arc<Mutex<Vec<StatusCode>>> = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5i64 {
        let mut params = insert.params();
        params.add(Value::BigInt(i)).unwrap();
        let results = results.clone();
        client
            .invoke_async(&insert, params, move |response| {
                results.lock().unwrap().push(response.status_code);
            })
            .await
            .unwrap();
    }

    server.await.unwrap();
    assert!(client.drain().await);

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(
        results.iter().filter(|s| **s == StatusCode::Success).count(),
        2
    );
    assert_eq!(
        results
            .iter()
            .filter(|s| **s == StatusCode::ConnectionLost)
            .count(),
        3
    );
}

/// Cluster identity property: a second connection reporting a different
/// `(cluster_start_time, leader_address)` pair must be rejected and must
/// not join the pool.
#[tokio::test]
async fn second_connection_with_different_cluster_identity_is_rejected() {
    let (listener_a, host_a, port_a) = bind_loopback().await;
    let (listener_b, host_b, port_b) = bind_loopback().await;

    let server_a = tokio::spawn(async move {
        let (socket, _) = listener_a.accept().await.unwrap();
        let (mut r, mut w) = socket.into_split();
        let _ = read_frame(&mut r).await;
        w.write_all(&framed(&auth_response_bytes(0, 0, 111, 222, "cluster-a")))
            .await
            .unwrap();
        w.flush().await.unwrap();
    });
    let server_b = tokio::spawn(async move {
        let (socket, _) = listener_b.accept().await.unwrap();
        let (mut r, mut w) = socket.into_split();
        let _ = read_frame(&mut r).await;
        w.write_all(&framed(&auth_response_bytes(0, 1, 333, 444, "cluster-b")))
            .await
            .unwrap();
        w.flush().await.unwrap();
    });

    let client = Client::new(ClientConfig::default());
    client
        .create_connection(&host_a, port_a, false)
        .await
        .unwrap();
    let err = client
        .create_connection(&host_b, port_b, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ClusterInstanceMismatch));
    assert_eq!(client.connection_count(), 1);

    server_a.await.unwrap();
    server_b.await.unwrap();
}

/// Router correctness property: routing a single-partition procedure by
/// its BIGINT partitioning key must agree with an independently computed
/// hashinator lookup over the same token ring.
#[test]
fn router_partition_choice_matches_independent_hash_lookup() {
    let ring_pairs: Vec<(i32, i32)> = (0..16383)
        .map(|p| (((p as i64 * 131071) % (i32::MAX as i64)) as i32, p))
        .collect();
    let mut sorted = ring_pairs.clone();
    sorted.sort_by_key(|(token, _)| *token as u32);

    let mut tokens = (sorted.len() as i32).to_be_bytes().to_vec();
    for (token, partition) in &sorted {
        tokens.extend_from_slice(&token.to_be_bytes());
        tokens.extend_from_slice(&partition.to_be_bytes());
    }
    let mut hash_config = OwnedBuffer::new();
    hash_config.write_string(Some(b"ELASTIC")).unwrap();
    hash_config
        .write_string(Some(&tokens))
        .unwrap();
    // Varbinary columns use the same length-prefixed encoding as strings.
    let hash_table = build_table_bytes(
        &[("HASH_TYPE", WireTag::String), ("HASH_CONFIG", WireTag::Varbinary)],
        &[vec![
            Value::String(Some(b"ELASTIC".to_vec())),
            Value::Varbinary(Some(tokens.clone())),
        ]],
    );
    let partition_table = build_table_bytes(
        &[
            ("PARTITION_ID", WireTag::Integer),
            ("SITES", WireTag::String),
            ("LEADER", WireTag::String),
        ],
        &[vec![
            Value::Integer(0),
            Value::String(Some(b"0:0".to_vec())),
            Value::String(Some(b"5:0".to_vec())),
        ]],
    );

    let topo = [
        Table::parse(voltrs::buffer::SharedBuffer::from_vec(partition_table)).unwrap(),
        Table::parse(voltrs::buffer::SharedBuffer::from_vec(hash_table)).unwrap(),
    ];

    let procedures_table = build_table_bytes(
        &[
            ("REMARKS", WireTag::String),
            ("CLASSNAME", WireTag::String),
            ("PROCEDURE_NAME", WireTag::String),
            ("TYPE", WireTag::String),
            ("READ_ONLY", WireTag::Integer),
            ("SINGLE_PARTITION", WireTag::Integer),
            ("JSON", WireTag::String),
        ],
        &[vec![
            Value::String(None),
            Value::String(Some(b"Insert".to_vec())),
            Value::String(Some(b"Insert".to_vec())),
            Value::String(Some(b"DEFAULT".to_vec())),
            Value::Integer(0),
            Value::Integer(1),
            Value::String(Some(
                br#"{"partitionParameter":0,"readOnly":false,"singlePartition":true}"#.to_vec(),
            )),
        ]],
    );

    let mut router = Router::new();
    router.update_topology(&topo).unwrap();
    router
        .update_procedures(&Table::parse(voltrs::buffer::SharedBuffer::from_vec(procedures_table)).unwrap())
        .unwrap();

    let key = Value::BigInt(42);
    let routed = router.route_partition("Insert", &[key.clone()]).unwrap();

    let expected_hash = murmur3_32(&42i64.to_be_bytes()).unwrap() as u32;
    let expected_partition = sorted
        .iter()
        .rev()
        .find(|(token, _)| *token as u32 <= expected_hash)
        .map(|(_, p)| *p)
        .unwrap_or(sorted.last().unwrap().1);

    assert_eq!(routed, expected_partition);
}

/// Token uniqueness property: a million invocations issue a million
/// distinct client tokens.
#[test]
fn client_tokens_are_unique_across_a_million_invocations() {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};

    let counter = AtomicI64::new(0);
    let mut seen = HashSet::with_capacity(1_000_000);
    for _ in 0..1_000_000 {
        let token = counter.fetch_add(1, Ordering::Relaxed);
        assert!(seen.insert(token));
    }
    assert_eq!(seen.len(), 1_000_000);
}
