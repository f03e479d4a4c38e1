//! Read pump — forwards inbound payload bytes to the message pipeline.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Reads socket messages and forwards their payload bytes.
///
/// Frame assembly and decoding happen downstream; this pump only moves
/// bytes. Control pings are answered directly on the write channel. The
/// inbound sender is dropped on exit, which is how the pipeline learns the
/// connection is gone.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound_tx: mpsc::Sender<Vec<u8>>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        trace!(len = text.len(), "inbound text");
                        if inbound_tx.send(text.as_bytes().to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        trace!(len = data.len(), "inbound binary");
                        if inbound_tx.send(data.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("received pong");
                    }
                    Some(Ok(tungstenite::Message::Close(_))) => {
                        debug!("received close frame");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("socket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("socket stream ended");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn forwards_text_and_binary_payloads() {
        let messages: Vec<Result<tungstenite::Message, tungstenite::Error>> = vec![
            Ok(tungstenite::Message::Text("hello".into())),
            Ok(tungstenite::Message::Binary(vec![1, 2, 3].into())),
        ];
        let read = stream::iter(messages);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);

        read_pump(read, inbound_tx, write_tx, CancellationToken::new()).await;

        assert_eq!(inbound_rx.recv().await.unwrap(), b"hello");
        assert_eq!(inbound_rx.recv().await.unwrap(), vec![1, 2, 3]);
        assert!(inbound_rx.recv().await.is_none(), "sender dropped on exit");
    }

    #[tokio::test]
    async fn answers_control_ping_with_pong() {
        let messages: Vec<Result<tungstenite::Message, tungstenite::Error>> =
            vec![Ok(tungstenite::Message::Ping(vec![7].into()))];
        let read = stream::iter(messages);
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let (write_tx, mut write_rx) = mpsc::channel(16);

        read_pump(read, inbound_tx, write_tx, CancellationToken::new()).await;

        match write_rx.recv().await {
            Some(tungstenite::Message::Pong(data)) => assert_eq!(data.to_vec(), vec![7]),
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_on_close_frame() {
        let messages: Vec<Result<tungstenite::Message, tungstenite::Error>> = vec![
            Ok(tungstenite::Message::Close(None)),
            Ok(tungstenite::Message::Text("after close".into())),
        ];
        let read = stream::iter(messages);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);

        read_pump(read, inbound_tx, write_tx, CancellationToken::new()).await;

        assert!(inbound_rx.recv().await.is_none());
    }
}
