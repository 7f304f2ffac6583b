//! Round-trip a message between two in-process connections.

use bytes::Bytes;
use sockframe_conn::{Connection, Transport};
use tokio::sync::oneshot;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let (left, right) = Transport::pair();
    let client = Connection::new(left);
    let server = Connection::new(right);
    client.open();
    server.open();

    // The server echoes the first message it receives.
    let (request_tx, request_rx) = oneshot::channel();
    server.receive(move |result| {
        let _ = request_tx.send(result);
    });

    client.send(Bytes::from_static(b"hello"), |result| {
        if let Err(err) = result {
            eprintln!("send failed: {err}");
        }
    });

    let request = request_rx
        .await
        .expect("server connection should stay alive")
        .expect("request should arrive");
    server.send(request, |_| {});

    let (reply_tx, reply_rx) = oneshot::channel();
    client.receive(move |result| {
        let _ = reply_tx.send(result);
    });
    let reply = reply_rx
        .await
        .expect("client connection should stay alive")
        .expect("reply should arrive");

    println!("reply: {}", String::from_utf8_lossy(reply.as_ref()));
}
