//! Black-box coverage of the JSON-RPC-over-frames wire protocol (spec §6):
//! drives `coldataset::server::run` over real TCP sockets the way an actual
//! client would, including the notification-fan-out scenario (spec §8
//! concrete scenario 6) that can't be exercised from a single connection.

use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use coldataset::server;
use coldataset::server::frame::{read_frame, write_frame};

async fn send_request(stream: &mut TcpStream, index: i64, method: &str, argument: Value) {
    let payload = json!([index, method, argument]).to_string().into_bytes();
    write_frame(stream, &Bytes::from(payload)).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> Value {
    let frame = read_frame(stream).await.unwrap().unwrap();
    serde_json::from_slice(&frame).unwrap()
}

async fn call(stream: &mut TcpStream, index: i64, method: &str, argument: Value) -> Value {
    send_request(stream, index, method, argument).await;
    let envelope = recv(stream).await;
    let arr = envelope.as_array().unwrap();
    assert_eq!(arr[0], json!(index));
    arr[1].clone()
}

async fn spawn_server(root: std::path::PathBuf, port: u16) {
    tokio::spawn(async move {
        let _ = server::run(&root, port).await;
    });
    // Give the listener a moment to bind before clients connect.
    sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn dataset_and_column_lifecycle_over_the_wire() {
    env_logger::try_init().ok();
    let dir = tempfile::tempdir().unwrap();
    let port = 19761;
    spawn_server(dir.path().to_path_buf(), port).await;

    let mut conn = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let info = call(&mut conn, 1, "dataset/create", json!({"name": "t1", "length": 3})).await;
    assert_eq!(info["name"], "t1");
    assert_eq!(info["length"], 3);

    let column_id = call(&mut conn, 2, "column/create", json!({"name": "c", "type": "string"})).await;
    let column_id = column_id.as_str().unwrap().to_string();

    let generation = call(
        &mut conn,
        3,
        "column/values/set",
        json!({"column": column_id, "indices": [0, 1], "values": ["hi", "hello world"]}),
    )
    .await;
    assert_eq!(generation, 1);

    let values = call(&mut conn, 4, "column/values/get", json!({"column": column_id, "indices": [0, 1, 2]})).await;
    assert_eq!(values, json!(["hi", "hello world", ""]));

    let err = call(&mut conn, 5, "column/values/get", json!({"column": "zzzzzz"})).await;
    assert_eq!(err["error"], "not found");
}

#[tokio::test]
async fn malformed_request_gets_no_response() {
    // Exercises connection.rs's `warn!` on the dropped malformed frame.
    env_logger::try_init().ok();
    let dir = tempfile::tempdir().unwrap();
    let port = 19762;
    spawn_server(dir.path().to_path_buf(), port).await;

    let mut conn = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    // Two elements instead of three: rejected at the envelope layer, no response.
    write_frame(&mut conn, &Bytes::from(json!([1, "dataset/list"]).to_string().into_bytes()))
        .await
        .unwrap();

    // A well-formed request right after it should still get answered normally —
    // the bad frame didn't wedge the connection.
    let result = call(&mut conn, 2, "dataset/list", Value::Null).await;
    assert_eq!(result, json!([]));
}

#[tokio::test]
async fn second_subscriber_gets_the_notification_the_first_does_not() {
    env_logger::try_init().ok();
    let dir = tempfile::tempdir().unwrap();
    let port = 19763;
    spawn_server(dir.path().to_path_buf(), port).await;

    let mut x = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut y = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    // X creates the dataset and becomes its first (auto-subscribed) watcher.
    call(&mut x, 1, "dataset/create", json!({"name": "t1", "length": 3})).await;

    // Y discovers and opens the same dataset, subscribing itself too.
    let listing = call(&mut y, 1, "dataset/list", Value::Null).await;
    let dataset_id = listing[0]["id"].as_str().unwrap().to_string();
    call(&mut y, 2, "dataset/open", json!({"id": dataset_id})).await;

    let column_id = call(&mut x, 2, "column/create", json!({"name": "c", "type": "string"})).await;
    let column_id = column_id.as_str().unwrap().to_string();

    // Y's dataset-level subscription means it sees the column/created
    // notification X's own create call triggered.
    let notification = recv(&mut y).await;
    let arr = notification.as_array().unwrap();
    assert!(arr[0].is_null());
    assert_eq!(arr[1], "column/created");

    // Both clients open the column so that column-scoped notifications
    // further down have somewhere to go.
    call(&mut x, 3, "column/open", json!({"column": column_id})).await;
    call(&mut y, 3, "column/open", json!({"column": column_id})).await;

    let generation = call(
        &mut x,
        4,
        "column/values/set",
        json!({"column": column_id, "indices": [0], "values": ["x"]}),
    )
    .await;
    assert_eq!(generation, 1);

    // Y, subscribed to the column, receives the notification X's own
    // mutation triggered.
    let notification = timeout(Duration::from_millis(500), recv(&mut y)).await.unwrap();
    let arr = notification.as_array().unwrap();
    assert!(arr[0].is_null());
    assert_eq!(arr[1], "column/values/set");
    assert_eq!(arr[2], json!([column_id, 1, [0], ["x"]]));

    // X, the cause of the mutation, gets no such notification: the only
    // frame waiting on its socket is nothing at all within the timeout.
    let nothing = timeout(Duration::from_millis(300), recv(&mut x)).await;
    assert!(nothing.is_err(), "client that caused the mutation should not be notified of it");
}
