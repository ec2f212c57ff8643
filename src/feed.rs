//! Landmark feed from the pose-estimation service.
//!
//! Wire format: length-delimited frames over TCP, each frame one JSON object
//! `{ "landmarks": [{x, y, z, visibility?}], "timestamp"? }`. The service may
//! also answer `{ "success": false, "error": ... }` when no body was found.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::config::FeedConfig;
use crate::pose::{Landmark, LandmarkSet};

/// One message from the pose service.
///
/// Unknown fields (`world_landmarks`, `segmentation_mask`, ...) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LandmarkMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LandmarkMessage {
    /// Convert to a landmark set. `None` means "no body in this frame".
    pub fn into_landmark_set(self) -> Option<LandmarkSet> {
        if self.success == Some(false) {
            let reason = self.error.or(self.message).unwrap_or_default();
            log::debug!("[feed] service reported failure: {}", reason);
            return None;
        }
        match self.landmarks {
            Some(landmarks) if !landmarks.is_empty() => Some(LandmarkSet {
                landmarks,
                timestamp: self.timestamp,
            }),
            _ => None,
        }
    }
}

impl From<&LandmarkSet> for LandmarkMessage {
    fn from(set: &LandmarkSet) -> Self {
        Self {
            landmarks: Some(set.landmarks.clone()),
            timestamp: set.timestamp,
            ..Self::default()
        }
    }
}

/// Decode one JSON payload. Malformed payloads are logged and treated as absence.
pub fn decode_landmark_message(payload: &[u8]) -> Option<LandmarkSet> {
    match serde_json::from_slice::<LandmarkMessage>(payload) {
        Ok(msg) => msg.into_landmark_set(),
        Err(e) => {
            log::warn!("[feed] invalid landmark message: {}", e);
            None
        }
    }
}

pub fn encode_landmark_message(set: &LandmarkSet) -> Result<Bytes> {
    let data = serde_json::to_vec(&LandmarkMessage::from(set))?;
    Ok(Bytes::from(data))
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(4 * 1024 * 1024) // 4MB
        .new_codec();
    Framed::new(stream, codec)
}

pub async fn send_landmarks(stream: &mut MessageStream, set: &LandmarkSet) -> Result<()> {
    stream.send(encode_landmark_message(set)?).await?;
    Ok(())
}

/// Receive one raw frame.
pub async fn recv_frame(stream: &mut MessageStream) -> Result<Bytes> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bytes.freeze()),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow!("connection closed")),
    }
}

// --- latest-value slot ---

/// Publisher side of the latest-landmarks slot.
pub type LandmarkPublisher = watch::Sender<Option<LandmarkSet>>;

/// Frame-loop side of the latest-landmarks slot.
///
/// Only the newest set is kept; older unread sets are overwritten.
pub struct LatestLandmarks {
    rx: watch::Receiver<Option<LandmarkSet>>,
}

impl LatestLandmarks {
    pub fn new(rx: watch::Receiver<Option<LandmarkSet>>) -> Self {
        Self { rx }
    }

    /// Return the newest set if it arrived since the last call. Never waits.
    pub fn take_new(&mut self) -> Option<LandmarkSet> {
        // Err = publisher gone; nothing new will arrive
        if self.rx.has_changed().unwrap_or(false) {
            self.rx.borrow_and_update().clone()
        } else {
            None
        }
    }

    /// Wait for the next published set. `None` when the publisher is gone.
    pub async fn wait_new(&mut self) -> Option<LandmarkSet> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

pub fn latest_channel() -> (LandmarkPublisher, LatestLandmarks) {
    let (tx, rx) = watch::channel(None);
    (tx, LatestLandmarks::new(rx))
}

/// Read frames until the connection ends, publishing every decoded set.
pub async fn stream_landmarks(stream: &mut MessageStream, tx: &LandmarkPublisher) -> Result<()> {
    loop {
        let payload = recv_frame(stream).await?;
        if let Some(set) = decode_landmark_message(&payload) {
            tx.send(Some(set)).map_err(|_| anyhow!("landmark receiver dropped"))?;
        }
    }
}

/// Main feed loop: connect, stream, reconnect on error.
///
/// Returns once the frame loop has dropped its receiver.
pub async fn run_feed(config: FeedConfig, tx: LandmarkPublisher) {
    let delay = Duration::from_secs(config.reconnect_secs);
    loop {
        log::info!("[feed] connecting to {}...", config.addr);
        match TcpStream::connect(&config.addr).await {
            Ok(tcp) => {
                if let Err(e) = tcp.set_nodelay(true) {
                    log::warn!("[feed] set_nodelay: {}", e);
                }
                log::info!("[feed] connected");
                let mut stream = message_stream(tcp);
                if let Err(e) = stream_landmarks(&mut stream, &tx).await {
                    log::warn!("[feed] session error: {:#}", e);
                }
            }
            Err(e) => {
                log::warn!("[feed] connection failed: {}", e);
            }
        }
        if tx.is_closed() {
            log::info!("[feed] receiver closed, stopping");
            return;
        }
        log::info!("[feed] reconnecting in {}s...", config.reconnect_secs);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn sample_set(x: f32) -> LandmarkSet {
        LandmarkSet::new(vec![Landmark::new(x, 0.5, 0.0).with_visibility(0.9); 33])
            .with_timestamp(1.5)
    }

    #[test]
    fn test_decode_plain_message() {
        let json = br#"{"landmarks":[{"x":0.1,"y":0.2,"z":-0.3,"visibility":0.8},{"x":0.4,"y":0.5,"z":0.0}],"timestamp":12.5}"#;
        let set = decode_landmark_message(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.landmarks[0].visibility, Some(0.8));
        assert_eq!(set.landmarks[1].visibility, None);
        assert_eq!(set.timestamp, Some(12.5));
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let json = br#"{"success":true,"landmarks":[{"x":0.1,"y":0.2,"z":0.0,"visibility":null}],"world_landmarks":[[1,2,3]],"segmentation_mask":null}"#;
        let set = decode_landmark_message(json).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.timestamp, None);
    }

    #[test]
    fn test_decode_failure_reply_is_absence() {
        assert!(decode_landmark_message(br#"{"success":false,"error":"No pose detected"}"#).is_none());
        assert!(decode_landmark_message(br#"{"success":false,"message":"busy"}"#).is_none());
        assert!(decode_landmark_message(br#"{"landmarks":[]}"#).is_none());
        assert!(decode_landmark_message(b"not json").is_none());
    }

    #[test]
    fn test_encode_decode_matches() {
        let set = sample_set(0.25);
        let bytes = encode_landmark_message(&set).unwrap();
        assert_eq!(decode_landmark_message(&bytes), Some(set));
    }

    #[test]
    fn test_latest_only_newest() {
        let (tx, mut latest) = latest_channel();
        assert!(latest.take_new().is_none());

        tx.send(Some(sample_set(0.1))).unwrap();
        tx.send(Some(sample_set(0.2))).unwrap();
        let set = latest.take_new().unwrap();
        assert_eq!(set.landmarks[0].x, 0.2);
        // 同じ値は二度返さない
        assert!(latest.take_new().is_none());
    }

    #[test]
    fn test_latest_after_publisher_dropped() {
        let (tx, mut latest) = latest_channel();
        drop(tx);
        assert!(latest.take_new().is_none());
    }

    #[tokio::test]
    async fn test_tcp_stream_publishes_sets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(tcp);
            send_landmarks(&mut stream, &sample_set(0.3)).await.unwrap();
            stream
                .send(Bytes::from_static(br#"{"success":false,"error":"No pose detected"}"#))
                .await
                .unwrap();
            send_landmarks(&mut stream, &sample_set(0.7)).await.unwrap();
        });

        let (tx, mut latest) = latest_channel();
        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut stream = message_stream(tcp);
        let result = stream_landmarks(&mut stream, &tx).await;
        server.await.unwrap();

        // サーバーが切断するとエラーで戻る
        assert!(result.is_err());
        let set = latest.take_new().unwrap();
        assert_eq!(set.landmarks[0].x, 0.7);
        assert_eq!(set.timestamp, Some(1.5));
    }

    #[tokio::test]
    async fn test_run_feed_connects_and_publishes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(tcp);
            send_landmarks(&mut stream, &sample_set(0.4)).await.unwrap();
            // 接続を維持
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (tx, mut latest) = latest_channel();
        let config = FeedConfig {
            addr: addr.to_string(),
            reconnect_secs: 1,
        };
        let feed = tokio::spawn(run_feed(config, tx));

        let got = tokio::time::timeout(Duration::from_secs(3), latest.wait_new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.landmarks[0].x, 0.4);
        assert!(latest.take_new().is_none());
        feed.abort();
    }
}
