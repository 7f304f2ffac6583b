use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use sockframe_conn::{
    Connection, ConnectionError, ConnectionObserver, ConnectionOptions, Listener, Transport,
};
use sockframe_frame::{encode_frame, encode_header, HEADER_SIZE};
use sockframe_transport::WriteHalf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

type ReceiveResult = Result<Bytes, ConnectionError>;
type SendResult = Result<(), ConnectionError>;

fn queue_receive(conn: &Connection, results: &mpsc::UnboundedSender<ReceiveResult>) {
    let results = results.clone();
    conn.receive(move |result| {
        let _ = results.send(result);
    });
}

async fn send_frame(write: &mut WriteHalf, payload: &[u8]) {
    let mut wire = BytesMut::new();
    encode_frame(payload, &mut wire);
    write.write_all(&wire).await.unwrap();
}

#[tokio::test]
async fn receive_completes_with_peer_message() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    send_frame(&mut peer_write, b"hello").await;

    let message = rx.recv().await.unwrap().unwrap();
    assert_eq!(message.as_ref(), b"hello");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn pipelined_receives_complete_in_submission_order() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    for i in 0..5u32 {
        let results = results.clone();
        conn.receive(move |result| {
            let _ = results.send((i, result));
        });
    }

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    for i in 0..5u32 {
        send_frame(&mut peer_write, format!("msg-{i}").as_bytes()).await;
    }

    for expected in 0..5u32 {
        let (i, result) = rx.recv().await.unwrap();
        assert_eq!(i, expected);
        assert_eq!(result.unwrap().as_ref(), format!("msg-{expected}").as_bytes());
    }
}

#[tokio::test]
async fn receive_submitted_before_open_completes_after_open() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    conn.open();

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    send_frame(&mut peer_write, b"first").await;

    let message = rx.recv().await.unwrap().unwrap();
    assert_eq!(message.as_ref(), b"first");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn close_read_with_queued_reads_fails_all_in_order() {
    let (local, peer) = Transport::pair();
    let read_closed = Arc::new(AtomicUsize::new(0));
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let counter = Arc::clone(&read_closed);
    let observer = ConnectionObserver::default().with_read_closed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = closed_tx.send(());
    });
    let conn = Connection::with_options(
        local,
        ConnectionOptions {
            completion_queue: None,
            observer,
        },
    );
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    for i in 0..3u32 {
        let results = results.clone();
        conn.receive(move |result| {
            let _ = results.send((i, result));
        });
    }
    conn.close_read();

    // No more data ever arrives: the peer closes its write side.
    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    peer_write.close().await.unwrap();

    for expected in 0..3u32 {
        let (i, result) = rx.recv().await.unwrap();
        assert_eq!(i, expected);
        assert!(matches!(result, Err(ConnectionError::EndOfStream)));
    }

    closed_rx.recv().await.unwrap();
    assert_eq!(read_closed.load(Ordering::SeqCst), 1);
    assert!(closed_rx.try_recv().is_err());
}

#[tokio::test]
async fn receive_after_close_read_fails_immediately() {
    let (local, _peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.close_read();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    let result = rx.recv().await.unwrap();
    assert!(matches!(result, Err(ConnectionError::ReadClosed)));
}

#[tokio::test]
async fn empty_frames_never_satisfy_a_receive() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    send_frame(&mut peer_write, b"").await;
    send_frame(&mut peer_write, b"").await;
    send_frame(&mut peer_write, b"real").await;

    let message = rx.recv().await.unwrap().unwrap();
    assert_eq!(message.as_ref(), b"real");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn zero_length_send_transmits_header_only() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SendResult>();
    let sender = done_tx.clone();
    conn.send(Bytes::new(), move |result| {
        let _ = sender.send(result);
    });
    conn.send(Bytes::from_static(b"ab"), move |result| {
        let _ = done_tx.send(result);
    });

    assert!(done_rx.recv().await.unwrap().is_ok());
    assert!(done_rx.recv().await.unwrap().is_ok());

    let (mut peer_read, _peer_write) = peer.open().await.unwrap();
    let mut wire = [0u8; HEADER_SIZE * 2 + 2];
    peer_read.read_exact(&mut wire).await.unwrap();
    assert_eq!(&wire[..HEADER_SIZE], &encode_header(0));
    assert_eq!(&wire[HEADER_SIZE..HEADER_SIZE * 2], &encode_header(2));
    assert_eq!(&wire[HEADER_SIZE * 2..], b"ab");
}

#[tokio::test]
async fn close_write_with_empty_queue_closes_immediately() {
    let (local, peer) = Transport::pair();
    let write_closed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&write_closed);
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let observer = ConnectionObserver::default().with_write_closed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = closed_tx.send(());
    });
    let conn = Connection::with_options(
        local,
        ConnectionOptions {
            completion_queue: None,
            observer,
        },
    );
    conn.open();
    conn.close_write();

    let (mut peer_read, _peer_write) = peer.open().await.unwrap();
    let mut rest = Vec::new();
    peer_read.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SendResult>();
    conn.send(Bytes::from_static(b"late"), move |result| {
        let _ = done_tx.send(result);
    });
    let result = done_rx.recv().await.unwrap();
    assert!(matches!(result, Err(ConnectionError::WriteClosed)));

    closed_rx.recv().await.unwrap();
    assert_eq!(write_closed.load(Ordering::SeqCst), 1);
    assert!(closed_rx.try_recv().is_err());
}

#[tokio::test]
async fn close_write_drains_queued_writes_first() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    // Larger than the pair buffer, so the write spans several activations.
    let payload = vec![0xC3u8; 100_000];
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SendResult>();
    conn.send(payload.clone(), move |result| {
        let _ = done_tx.send(result);
    });
    conn.close_write();

    let (mut peer_read, _peer_write) = peer.open().await.unwrap();
    let mut wire = Vec::new();
    peer_read.read_to_end(&mut wire).await.unwrap();

    assert!(done_rx.recv().await.unwrap().is_ok());
    assert_eq!(&wire[..HEADER_SIZE], &encode_header(payload.len() as u64));
    assert_eq!(&wire[HEADER_SIZE..], payload.as_slice());
}

#[tokio::test]
async fn eof_mid_frame_fails_pending_reads() {
    let (local, peer) = Transport::pair();
    let read_closed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&read_closed);
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let observer = ConnectionObserver::default().with_read_closed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = closed_tx.send(());
    });
    let conn = Connection::with_options(
        local,
        ConnectionOptions {
            completion_queue: None,
            observer,
        },
    );
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    peer_write.write_all(&encode_header(10)).await.unwrap();
    peer_write.write_all(b"abc").await.unwrap();
    peer_write.close().await.unwrap();

    let result = rx.recv().await.unwrap();
    assert!(matches!(result, Err(ConnectionError::EndOfStream)));

    closed_rx.recv().await.unwrap();
    assert_eq!(read_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn write_completions_arrive_in_submission_order() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();
    let (_peer_read, _peer_write) = peer.open().await.unwrap();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    for i in 0..4u32 {
        let done_tx = done_tx.clone();
        conn.send(Bytes::from(format!("msg-{i}")), move |result| {
            let _ = done_tx.send((i, result));
        });
    }

    for expected in 0..4u32 {
        let (i, result) = done_rx.recv().await.unwrap();
        assert_eq!(i, expected);
        assert!(result.is_ok());
    }
}

#[tokio::test]
async fn writes_continue_after_close_read() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();
    conn.close_read();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SendResult>();
    conn.send(Bytes::from_static(b"still-works"), move |result| {
        let _ = done_tx.send(result);
    });
    assert!(done_rx.recv().await.unwrap().is_ok());

    let (mut peer_read, _peer_write) = peer.open().await.unwrap();
    let mut wire = [0u8; HEADER_SIZE + 11];
    peer_read.read_exact(&mut wire).await.unwrap();
    assert_eq!(&wire[HEADER_SIZE..], b"still-works");
}

#[tokio::test]
async fn reads_continue_after_close_write() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();
    conn.close_write();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    send_frame(&mut peer_write, b"inbound").await;

    let message = rx.recv().await.unwrap().unwrap();
    assert_eq!(message.as_ref(), b"inbound");
}

#[tokio::test]
async fn frame_assembled_across_dribbled_arrivals() {
    let (local, peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);

    let (_peer_read, mut peer_write) = peer.open().await.unwrap();
    let header = encode_header(8);
    for chunk in [&header[..3], &header[3..]] {
        peer_write.write_all(chunk).await.unwrap();
        peer_write.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    for chunk in [&b"dribbled"[..5], &b"dribbled"[5..]] {
        peer_write.write_all(chunk).await.unwrap();
        peer_write.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let message = rx.recv().await.unwrap().unwrap();
    assert_eq!(message.as_ref(), b"dribbled");
}

#[tokio::test]
async fn failed_open_fails_requests_and_notifies_both_directions() {
    let listener = Listener::bind("127.0.0.1", 0).await.unwrap();
    let port = listener.local_port().unwrap();
    drop(listener);

    let closed = Arc::new(AtomicUsize::new(0));
    let read_counter = Arc::clone(&closed);
    let write_counter = Arc::clone(&closed);
    let observer = ConnectionObserver::default()
        .with_read_closed(move || {
            read_counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_write_closed(move || {
            write_counter.fetch_add(1, Ordering::SeqCst);
        });

    let transport = Transport::remote("127.0.0.1", port).unwrap();
    let conn = Connection::with_options(
        transport,
        ConnectionOptions {
            completion_queue: None,
            observer,
        },
    );

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SendResult>();
    conn.send(Bytes::from_static(b"never"), move |result| {
        let _ = done_tx.send(result);
    });

    conn.open();

    assert!(matches!(
        rx.recv().await.unwrap(),
        Err(ConnectionError::Open(_))
    ));
    assert!(matches!(
        done_rx.recv().await.unwrap(),
        Err(ConnectionError::Open(_))
    ));

    // Both observer hooks fire exactly once even with zero in-flight I/O.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dropping_the_connection_fails_outstanding_requests() {
    let (local, _peer) = Transport::pair();
    let conn = Connection::new(local);
    conn.open();

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);
    drop(conn);

    let result = rx.recv().await.unwrap();
    assert!(matches!(result, Err(ConnectionError::ReadClosed)));
}

#[tokio::test]
async fn end_to_end_over_paired_connections() {
    let (left, right) = Transport::pair();
    let sender = Connection::new(left);
    let receiver = Connection::new(right);
    sender.open();
    receiver.open();

    let messages: Vec<&[u8]> = vec![b"alpha", b"", b"beta", b"gamma"];
    for payload in &messages {
        sender.send(Bytes::copy_from_slice(payload), |_| {});
    }

    let (results, mut rx) = mpsc::unbounded_channel();
    for _ in 0..3 {
        queue_receive(&receiver, &results);
    }

    // The empty message is absorbed on the wire; only three are deliverable.
    for expected in [&b"alpha"[..], b"beta", b"gamma"] {
        let message = rx.recv().await.unwrap().unwrap();
        assert_eq!(message.as_ref(), expected);
    }
}

#[tokio::test]
async fn end_to_end_over_tcp() {
    let listener = Listener::bind("127.0.0.1", 0).await.unwrap();
    let port = listener.local_port().unwrap();

    let server = tokio::spawn(async move {
        let transport = listener.accept().await.unwrap();
        let conn = Connection::new(transport);
        conn.open();

        let (results, mut rx) = mpsc::unbounded_channel();
        queue_receive(&conn, &results);
        let request = rx.recv().await.unwrap().unwrap();

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SendResult>();
        conn.send(request, move |result| {
            let _ = done_tx.send(result);
        });
        done_rx.recv().await.unwrap().unwrap();
    });

    let conn = Connection::remote("127.0.0.1", port).unwrap();
    conn.open();
    conn.send(Bytes::from_static(b"echo me"), |_| {});

    let (results, mut rx) = mpsc::unbounded_channel();
    queue_receive(&conn, &results);
    let reply = rx.recv().await.unwrap().unwrap();
    assert_eq!(reply.as_ref(), b"echo me");

    server.await.unwrap();
}
