//! ClientPull polling loop.
//!
//! Enable segment data once, then repeat: request a frame, wait briefly,
//! query the tracked segment's translation and rotation. The wait is taken
//! through a [`Sleeper`] so tests can run the loop without real delays, and
//! a [`CancellationToken`] ends it promptly from outside.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, PollerConfig};
use crate::tcp::ViconTcpClient;
use crate::types::{Result, Rotation, Translation};

/// Source of delays for the polling loop.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// One decoded frame for the tracked segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseSample {
    /// 1-based count of decoded samples in this run
    pub frame_number: u64,
    pub subject: String,
    pub segment: String,
    pub translation: Translation,
    pub rotation: Option<Rotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Sample(PoseSample),
    /// The segment had no position in the requested frame
    Missing { subject: String, segment: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub frames: u64,
    pub missing: u64,
    pub cancelled: bool,
}

pub struct Poller<T = TokioSleeper> {
    config: PollerConfig,
    sleeper: T,
    cancel: CancellationToken,
}

impl Poller<TokioSleeper> {
    pub fn new(config: PollerConfig, cancel: CancellationToken) -> Self {
        Self::with_sleeper(config, TokioSleeper, cancel)
    }
}

impl<T: Sleeper> Poller<T> {
    pub fn with_sleeper(config: PollerConfig, sleeper: T, cancel: CancellationToken) -> Self {
        Self {
            config,
            sleeper,
            cancel,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drive the loop on an open client until cancelled, `max_frames` is
    /// reached, or a connection-level error occurs.
    ///
    /// Cancellation also interrupts a query waiting on its reply. The client
    /// is then disconnected, since the reply may still arrive. Errors are
    /// returned as-is; the caller owns the client and decides whether to
    /// reconnect.
    pub async fn run<S, F>(
        &self,
        client: &mut ViconTcpClient<S>,
        mut on_event: F,
    ) -> Result<PollSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(PollEvent),
    {
        self.config.validate()?;
        let subject = self.config.subject.as_str();
        let segment = self.config.segment.as_str();
        let mut summary = PollSummary::default();

        info!("Tracking {}/{}", subject, segment);
        let Some(enabled) = self.unless_cancelled(client.enable_segment_data()).await else {
            return Ok(self.abandon(client, summary).await);
        };
        enabled?;
        if !self.pause(self.config.settle_delay()).await {
            summary.cancelled = true;
            return Ok(summary);
        }

        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if self.config.max_frames.is_some_and(|max| summary.frames >= max) {
                break;
            }

            let Some(requested) = self.unless_cancelled(client.request_frame()).await else {
                summary = self.abandon(client, summary).await;
                break;
            };
            requested?;
            if !self.pause(self.config.poll_interval()).await {
                summary.cancelled = true;
                break;
            }

            let Some(translation) = self
                .unless_cancelled(client.get_segment_translation(subject, segment))
                .await
            else {
                summary = self.abandon(client, summary).await;
                break;
            };
            let translation = translation?;
            let Some(rotation) = self
                .unless_cancelled(client.get_segment_rotation_quaternion(subject, segment))
                .await
            else {
                summary = self.abandon(client, summary).await;
                break;
            };
            let rotation = rotation?;

            match translation {
                Some(translation) => {
                    summary.frames += 1;
                    on_event(PollEvent::Sample(PoseSample {
                        frame_number: summary.frames,
                        subject: subject.to_string(),
                        segment: segment.to_string(),
                        translation,
                        rotation,
                    }));
                }
                None => {
                    summary.missing += 1;
                    debug!("{}/{} not found in frame", subject, segment);
                    on_event(PollEvent::Missing {
                        subject: subject.to_string(),
                        segment: segment.to_string(),
                    });
                    if !self.pause(self.config.missing_backoff()).await {
                        summary.cancelled = true;
                        break;
                    }
                }
            }
        }

        info!(
            "Polling stopped after {} frames ({} missing)",
            summary.frames, summary.missing
        );
        Ok(summary)
    }

    /// Run a client call unless cancelled first.
    async fn unless_cancelled<F: Future>(&self, call: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            output = call => Some(output),
        }
    }

    async fn abandon<S>(
        &self,
        client: &mut ViconTcpClient<S>,
        mut summary: PollSummary,
    ) -> PollSummary
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!("Cancelled during a round-trip, closing connection");
        client.disconnect().await;
        summary.cancelled = true;
        summary
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.sleeper.sleep(duration) => true,
        }
    }
}

/// Connect, poll, and disconnect on every exit path.
pub async fn track<T, F>(
    client_config: &ClientConfig,
    poller: &Poller<T>,
    on_event: F,
) -> Result<PollSummary>
where
    T: Sleeper,
    F: FnMut(PollEvent),
{
    let mut client = ViconTcpClient::connect_with_config(client_config).await?;
    let result = poller.run(&mut client, on_event).await;
    if let Err(e) = &result {
        warn!("Polling failed: {}", e);
    }
    client.disconnect().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::encode_f64s;
    use crate::types::ViconError;
    use bytes::{BufMut, BytesMut};
    use std::sync::{Arc, Mutex};
    use tokio_test::io::Builder;

    /// Records requested delays and returns immediately.
    #[derive(Clone, Default)]
    struct RecordingSleeper {
        calls: Arc<Mutex<Vec<Duration>>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.calls.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    fn wire(command_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(4 + payload.len() as u32);
        buf.put_u32_le(command_id);
        buf.put_slice(payload);
        buf.to_vec()
    }

    const NAMES: &[u8] = b"robot_1\x00robot_1\x00";

    #[tokio::test]
    async fn test_single_frame_sample() {
        let mock = Builder::new()
            .write(&wire(9, &[]))
            .write(&wire(1, &[]))
            .write(&wire(6, NAMES))
            .read(&wire(6, &encode_f64s(&[10.0, 20.0, 30.0])))
            .write(&wire(12, NAMES))
            .read(&wire(12, &encode_f64s(&[0.0, 0.0, 0.0, 1.0])))
            .build();
        let mut client = ViconTcpClient::from_stream(mock, &ClientConfig::default());

        let sleeper = RecordingSleeper::default();
        let poller = Poller::with_sleeper(
            PollerConfig::new("robot_1").with_max_frames(1),
            sleeper.clone(),
            CancellationToken::new(),
        );

        let mut events = Vec::new();
        let summary = poller.run(&mut client, |e| events.push(e)).await.unwrap();

        assert_eq!(summary.frames, 1);
        assert!(!summary.cancelled);
        match &events[..] {
            [PollEvent::Sample(sample)] => {
                assert_eq!(sample.frame_number, 1);
                assert_eq!(sample.translation.x, 10.0);
                assert_eq!(sample.translation.z, 30.0);
                assert_eq!(sample.rotation.map(|q| q.w), Some(1.0));
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(
            *sleeper.calls.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(10)]
        );
    }

    #[tokio::test]
    async fn test_missing_object_backs_off() {
        let mock = Builder::new()
            .write(&wire(9, &[]))
            .write(&wire(1, &[]))
            .write(&wire(6, NAMES))
            .read(&wire(6, &[]))
            .write(&wire(12, NAMES))
            .read(&wire(12, &[]))
            .write(&wire(1, &[]))
            .write(&wire(6, NAMES))
            .read(&wire(6, &encode_f64s(&[1.0, 2.0, 3.0])))
            .write(&wire(12, NAMES))
            .read(&wire(12, &[]))
            .build();
        let mut client = ViconTcpClient::from_stream(mock, &ClientConfig::default());

        let sleeper = RecordingSleeper::default();
        let poller = Poller::with_sleeper(
            PollerConfig::new("robot_1").with_max_frames(1),
            sleeper.clone(),
            CancellationToken::new(),
        );

        let mut events = Vec::new();
        let summary = poller.run(&mut client, |e| events.push(e)).await.unwrap();

        assert_eq!(summary.frames, 1);
        assert_eq!(summary.missing, 1);
        assert!(matches!(events[0], PollEvent::Missing { .. }));
        match &events[1] {
            PollEvent::Sample(sample) => assert_eq!(sample.rotation, None),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(sleeper
            .calls
            .lock()
            .unwrap()
            .contains(&Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_frame() {
        let mock = Builder::new().build();
        let mut client = ViconTcpClient::from_stream(mock, &ClientConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let poller = Poller::with_sleeper(
            PollerConfig::new("robot_1"),
            RecordingSleeper::default(),
            cancel,
        );

        let summary = poller.run(&mut client, |_| {}).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_query() {
        let (stream, _server) = tokio::io::duplex(1024);
        let mut client = ViconTcpClient::from_stream(stream, &ClientConfig::default());

        let cancel = CancellationToken::new();
        let poller = Poller::with_sleeper(
            PollerConfig::new("robot_1"),
            RecordingSleeper::default(),
            cancel.clone(),
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let run = poller.run(&mut client, |_| {});
        let summary = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("query was not interrupted")
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connection_loss_stops_loop() {
        let mock = Builder::new()
            .write(&wire(9, &[]))
            .write(&wire(1, &[]))
            .write(&wire(6, NAMES))
            .build();
        let mut client = ViconTcpClient::from_stream(mock, &ClientConfig::default());
        let poller = Poller::with_sleeper(
            PollerConfig::new("robot_1"),
            RecordingSleeper::default(),
            CancellationToken::new(),
        );

        let err = poller.run(&mut client, |_| {}).await.unwrap_err();
        assert!(matches!(err, ViconError::ConnectionClosed));
        assert!(err.is_connection_level());
    }
}
