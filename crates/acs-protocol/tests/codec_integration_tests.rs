//! AcsCodec over real Tokio streams, with a line-oriented peer on the far end.

use acs_core::{AccessState, Error};
use acs_protocol::{AcsCodec, Directive, Inbound, Outbound, OutboundBody, StatusReport};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Framed, FramedRead, LinesCodec};

fn terminal_and_raw(buffer_size: usize) -> (Framed<DuplexStream, AcsCodec>, DuplexStream) {
    let (terminal, backend) = tokio::io::duplex(buffer_size);
    (Framed::new(terminal, AcsCodec::new()), backend)
}

#[tokio::test]
async fn test_outbound_records_arrive_as_lines() {
    let (mut terminal, backend) = terminal_and_raw(1024);
    let mut lines = FramedRead::new(backend, LinesCodec::new());

    terminal
        .send(Outbound::new(
            0,
            OutboundBody::Status(StatusReport {
                state: AccessState::Idle,
                temperature: 25.0,
                pending_update: None,
            }),
        ))
        .await
        .unwrap();
    terminal
        .send(Outbound::new(1, OutboundBody::message("Booted (boot #3)")))
        .await
        .unwrap();

    let first: serde_json::Value =
        serde_json::from_str(&lines.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(first["Seq"], 0);
    assert_eq!(first["State"], "Idle");

    let second: serde_json::Value =
        serde_json::from_str(&lines.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["Seq"], 1);
    assert_eq!(second["Message"], "Booted (boot #3)");
}

#[tokio::test]
async fn test_inbound_split_across_writes() {
    let (mut terminal, mut backend) = terminal_and_raw(1024);

    let writer = tokio::spawn(async move {
        backend.write_all(b"{\"State\":").await.unwrap();
        tokio::task::yield_now().await;
        backend.write_all(b"\"Unlocked\"}\n").await.unwrap();
        backend
    });

    let received = terminal.next().await.unwrap().unwrap();
    assert_eq!(
        received,
        Inbound::Record(vec![Directive::SetState(AccessState::Unlocked)])
    );
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn test_malformed_line_does_not_end_stream() {
    let (mut terminal, mut backend) = terminal_and_raw(1024);

    backend
        .write_all(b"{oops\n{\"Identify\":true}\n")
        .await
        .unwrap();

    assert!(matches!(
        terminal.next().await.unwrap().unwrap(),
        Inbound::Malformed(_)
    ));
    assert_eq!(
        terminal.next().await.unwrap().unwrap(),
        Inbound::Record(vec![Directive::Identify])
    );
}

#[tokio::test]
async fn test_stream_ends_when_peer_closes() {
    let (mut terminal, mut backend) = terminal_and_raw(1024);
    backend.write_all(b"{\"PlaySong\":true}\n").await.unwrap();
    drop(backend);

    assert_eq!(
        terminal.next().await.unwrap().unwrap(),
        Inbound::Record(vec![Directive::PlayTone])
    );
    assert!(terminal.next().await.is_none());
}

#[tokio::test]
async fn test_oversized_line_is_an_error() {
    let (terminal, mut backend) = tokio::io::duplex(256 * 1024);
    let mut terminal = Framed::new(terminal, AcsCodec::with_max_frame_size(1024));

    let huge = vec![b'a'; 4096];
    backend.write_all(&huge).await.unwrap();

    let result = terminal.next().await.unwrap();
    assert!(matches!(result, Err(Error::FrameTooLarge { .. })));
}
