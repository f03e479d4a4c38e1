//! The message pipeline: raw bytes → frames → typed messages → cache
//! hydration → effect descriptors.
//!
//! Per-message failures are logged and skipped; nothing that arrives on
//! the wire can terminate the stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use heimlink_protocol::frame::{Frame, FrameAssembler};
use heimlink_protocol::message::{DecodedMessage, decode};

use crate::cache::DeviceCache;
use crate::poller::PollScheduler;
use crate::waiters::{PongStore, ReplyStore};

/// Side effects implied by a hydrated message.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start polling these URLs on the fixed interval.
    SchedulePolling(Vec<String>),
    /// Re-fetch everything currently scheduled, now.
    PollOnce,
    /// A protocol pong arrived for this transaction.
    RecordPong(String),
    /// A reply fragment arrived for this transaction.
    AppendReplyChunk {
        transaction_id: String,
        chunk: Vec<u8>,
    },
}

/// Pure-ish core of the pipeline: assembles frames, decodes and hydrates.
pub struct FrameProcessor {
    assembler: FrameAssembler,
    cache: Arc<DeviceCache>,
}

impl FrameProcessor {
    pub fn new(cache: Arc<DeviceCache>) -> Self {
        Self {
            assembler: FrameAssembler::new(),
            cache,
        }
    }

    /// Feeds raw bytes; returns every message that became complete, with
    /// the effects its hydration implies.
    pub fn process(&mut self, bytes: &[u8]) -> Vec<(DecodedMessage, Vec<Effect>)> {
        let frames = self.assembler.push(bytes);
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            match self.handle_frame(&frame) {
                Some(result) => out.push(result),
                None => continue,
            }
        }
        out
    }

    fn handle_frame(&self, frame: &Frame) -> Option<(DecodedMessage, Vec<Effect>)> {
        let message = match decode(frame) {
            Ok(message) => message,
            Err(e) => {
                // One bad payload must not wedge the stream.
                warn!(uri = ?frame.uri(), error = %e, "dropping undecodable frame");
                return None;
            }
        };
        trace!(kind = message.kind(), "decoded message");

        let effects = match &message {
            DecodedMessage::Devices(devices) => {
                let touched = self.cache.apply_devices(devices);
                trace!(entries = touched.len(), "device cache hydrated");

                // Endpoints whose data went stale name the URL to re-fetch.
                let mut poll_urls = Vec::new();
                for device in devices {
                    for endpoint in &device.endpoints {
                        let expired = endpoint
                            .data
                            .iter()
                            .any(|d| d.validity.as_deref() == Some("expired"));
                        if expired {
                            poll_urls.push(format!(
                                "/devices/{}/endpoints/{}/data",
                                device.id, endpoint.id
                            ));
                        }
                    }
                }
                if poll_urls.is_empty() {
                    Vec::new()
                } else {
                    vec![Effect::SchedulePolling(poll_urls)]
                }
            }
            DecodedMessage::Scenarios(scenarios) => {
                self.cache.apply_scenarios(scenarios);
                Vec::new()
            }
            DecodedMessage::GatewayInfo(_)
            | DecodedMessage::Groups(_)
            | DecodedMessage::Moments(_)
            | DecodedMessage::Areas(_) => Vec::new(),
            DecodedMessage::Raw {
                uri,
                transaction_id,
                body,
            } => {
                let mut effects = Vec::new();
                if uri == "/ping" {
                    effects.push(Effect::RecordPong(
                        transaction_id.clone().unwrap_or_default(),
                    ));
                } else if let Some(transaction_id) = transaction_id {
                    // PUT acknowledgements and chunked reply fragments both
                    // land here, keyed by their transaction.
                    effects.push(Effect::AppendReplyChunk {
                        transaction_id: transaction_id.clone(),
                        chunk: body.clone(),
                    });
                }
                effects
            }
        };

        Some((message, effects))
    }
}

/// Drives the pipeline over a link's inbound byte stream.
///
/// Effects are executed immediately against their owning stores; decoded
/// messages are forwarded to the subscriber, dropping (with a warning) when
/// the subscriber cannot keep up.
pub(crate) async fn run_pipeline(
    mut inbound: mpsc::Receiver<Vec<u8>>,
    cache: Arc<DeviceCache>,
    pongs: Arc<PongStore>,
    replies: Arc<ReplyStore>,
    scheduler: Arc<PollScheduler>,
    decoded_tx: mpsc::Sender<DecodedMessage>,
    cancel: CancellationToken,
) {
    let mut processor = FrameProcessor::new(cache);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            bytes = inbound.recv() => {
                let Some(bytes) = bytes else {
                    debug!("inbound stream ended");
                    break;
                };
                for (message, effects) in processor.process(&bytes) {
                    for effect in effects {
                        match effect {
                            Effect::SchedulePolling(urls) => scheduler.schedule(urls),
                            Effect::PollOnce => scheduler.poll_once().await,
                            Effect::RecordPong(transaction_id) => {
                                pongs.record(&transaction_id);
                            }
                            Effect::AppendReplyChunk { transaction_id, chunk } => {
                                replies.append(&transaction_id, &chunk);
                            }
                        }
                    }
                    if let Err(e) = decoded_tx.try_send(message) {
                        warn!("dropping decoded message: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(uri: &str, transaction_id: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nTransac-Id: {transaction_id}\r\nUri-Origin: {uri}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    #[test]
    fn devices_frame_hydrates_cache() {
        let cache = Arc::new(DeviceCache::new());
        let mut processor = FrameProcessor::new(cache.clone());

        let body = r#"[{"id": 1, "endpoints": [{"id": 1, "error": 0, "data": [{"name": "position", "value": 10}]}]}]"#;
        let results = processor.process(&response("/devices/data", "1", body));

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].0, DecodedMessage::Devices(_)));
        assert!(results[0].1.is_empty());
        assert_eq!(cache.device_count(), 1);
    }

    #[test]
    fn expired_validity_schedules_polling() {
        let cache = Arc::new(DeviceCache::new());
        let mut processor = FrameProcessor::new(cache);

        let body = r#"[{"id": 5, "endpoints": [{"id": 7, "error": 0, "data": [{"name": "position", "value": 10, "validity": "expired"}]}]}]"#;
        let results = processor.process(&response("/devices/data", "1", body));

        assert_eq!(
            results[0].1,
            vec![Effect::SchedulePolling(vec![
                "/devices/5/endpoints/7/data".into()
            ])]
        );
    }

    #[test]
    fn pong_frame_yields_record_pong() {
        let cache = Arc::new(DeviceCache::new());
        let mut processor = FrameProcessor::new(cache);

        let results = processor.process(&response("/ping", "1700000000123", ""));
        assert_eq!(
            results[0].1,
            vec![Effect::RecordPong("1700000000123".into())]
        );
    }

    #[test]
    fn unknown_reply_with_transaction_becomes_chunk() {
        let cache = Arc::new(DeviceCache::new());
        let mut processor = FrameProcessor::new(cache);

        let results = processor.process(&response("/configs/gateway/geoloc", "88", "chunk-a"));
        assert_eq!(
            results[0].1,
            vec![Effect::AppendReplyChunk {
                transaction_id: "88".into(),
                chunk: b"chunk-a".to_vec(),
            }]
        );
    }

    #[test]
    fn undecodable_frame_is_skipped_and_stream_continues() {
        let cache = Arc::new(DeviceCache::new());
        let mut processor = FrameProcessor::new(cache);

        let mut bytes = response("/devices/data", "1", "this is not json");
        bytes.extend_from_slice(&response("/info", "2", r#"{"productName": "hub"}"#));
        let results = processor.process(&bytes);

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].0, DecodedMessage::GatewayInfo(_)));
    }

    #[test]
    fn split_frame_completes_across_pushes() {
        let cache = Arc::new(DeviceCache::new());
        let mut processor = FrameProcessor::new(cache);

        let bytes = response("/info", "3", r#"{"productName": "hub"}"#);
        let (a, b) = bytes.split_at(bytes.len() / 2);
        assert!(processor.process(a).is_empty());
        let results = processor.process(b);
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn run_pipeline_executes_effects_and_forwards_messages() {
        let cache = Arc::new(DeviceCache::new());
        let pongs = Arc::new(PongStore::new());
        let replies = Arc::new(ReplyStore::new());
        let (commands_tx, _commands_rx) = mpsc::channel(16);
        let scheduler = Arc::new(PollScheduler::new(
            crate::poller::PollingConfig::default(),
            commands_tx,
        ));

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (decoded_tx, mut decoded_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let pong_rx = pongs.expect("42");

        let handle = tokio::spawn(run_pipeline(
            inbound_rx,
            cache,
            pongs,
            replies.clone(),
            scheduler.clone(),
            decoded_tx,
            cancel,
        ));

        inbound_tx.send(response("/ping", "42", "")).await.unwrap();
        inbound_tx
            .send(response("/configs/gateway/geoloc", "9", "frag"))
            .await
            .unwrap();
        let expired = r#"[{"id": 1, "endpoints": [{"id": 2, "data": [{"name": "p", "value": 0, "validity": "expired"}]}]}]"#;
        inbound_tx
            .send(response("/devices/data", "10", expired))
            .await
            .unwrap();
        drop(inbound_tx);

        handle.await.unwrap();

        pong_rx.await.expect("pong waiter resolved");
        assert_eq!(replies.take("9").unwrap(), b"frag");
        assert_eq!(
            scheduler.scheduled(),
            vec!["/devices/1/endpoints/2/data".to_string()]
        );

        // All three messages were forwarded.
        let mut kinds = Vec::new();
        while let Ok(message) = decoded_rx.try_recv() {
            kinds.push(message.kind());
        }
        assert_eq!(kinds, vec!["raw", "raw", "devices"]);
    }
}
