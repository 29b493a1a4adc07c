//! TCP client for the DataStream protocol.
//!
//! Responses carry no request identifier, so they are matched to requests
//! purely by arrival order. Every method takes `&mut self` and awaits its
//! full response before returning, which keeps exactly one query in flight
//! per connection.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::frame::{check_length, encode_frame};
use crate::payload;
use crate::tcp::transport::Transport;
use crate::types::{
    CommandId, Frame, Pose, Result, Rotation, Translation, COMMAND_ID_SIZE, LENGTH_FIELD_SIZE,
};

/// Client for one DataStream connection
pub struct ViconTcpClient<S = TcpStream> {
    transport: Transport<S>,
    max_frame_size: u32,
}

impl ViconTcpClient<TcpStream> {
    /// Connect to `host:port` with default settings
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_config(&ClientConfig::new(host, port)).await
    }

    /// Connect using the given configuration
    pub async fn connect_with_config(config: &ClientConfig) -> Result<Self> {
        let transport = Transport::connect(config).await?;
        Ok(Self {
            transport,
            max_frame_size: config.max_frame_size,
        })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.peer_addr()
    }
}

impl<S> ViconTcpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the protocol over an already connected stream
    pub fn from_stream(stream: S, config: &ClientConfig) -> Self {
        Self {
            transport: Transport::from_stream(stream, config),
            max_frame_size: config.max_frame_size,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the connection. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }

    /// Frame and send one command.
    pub async fn send_command(&mut self, command: CommandId, payload: Bytes) -> Result<()> {
        let frame = Frame::new(command).with_payload(payload);
        let bytes = encode_frame(&frame)?;
        debug!("Sending {:?} ({} payload bytes)", command, frame.payload.len());
        let sent = self.transport.send(&bytes).await;
        self.close_on_failure(sent).await
    }

    /// Read the next frame from the stream.
    ///
    /// Any connection-level failure, including a timeout or a bad length
    /// field, closes the connection before the error is returned: a reply may
    /// still be in flight and would be paired with the next request.
    pub async fn read_response(&mut self) -> Result<Frame> {
        let received = self.read_frame().await;
        self.close_on_failure(received).await
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let length_bytes = self.transport.receive_exact(LENGTH_FIELD_SIZE).await?;
        let length = u32::from_le_bytes([
            length_bytes[0],
            length_bytes[1],
            length_bytes[2],
            length_bytes[3],
        ]);

        check_length(length, self.max_frame_size)?;

        let id_bytes = self.transport.receive_exact(COMMAND_ID_SIZE).await?;
        let command_id = u32::from_le_bytes([id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]]);

        let payload_len = length as usize - COMMAND_ID_SIZE;
        let payload = if payload_len > 0 {
            self.transport.receive_exact(payload_len).await?
        } else {
            Bytes::new()
        };

        debug!("Received frame {} ({} payload bytes)", command_id, payload.len());
        Ok(Frame {
            command_id,
            payload,
        })
    }

    async fn close_on_failure<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection_level() && self.transport.is_connected() {
                warn!("Closing connection after error: {}", e);
                self.transport.disconnect().await;
            }
        }
        result
    }

    /// Send a query and wait for its response frame.
    ///
    /// Frames answering an earlier fire-and-forget command (GetFrame,
    /// EnableSegmentData) may still be queued ahead of the response; they
    /// are skipped.
    pub async fn request(&mut self, command: CommandId, payload: Bytes) -> Result<Frame> {
        self.send_command(command, payload).await?;
        loop {
            let frame = self.read_response().await?;
            match frame.command() {
                Some(stale) if stale != command && !stale.expects_response() => {
                    debug!("Skipping late reply to {:?}", stale);
                }
                _ => return Ok(frame),
            }
        }
    }

    /// Ask the server to include segment data in captured frames.
    ///
    /// The server needs a short moment before it honours frame requests
    /// after this; see [`PollerConfig::settle_delay_ms`](crate::config::PollerConfig).
    pub async fn enable_segment_data(&mut self) -> Result<()> {
        self.send_command(CommandId::EnableSegmentData, Bytes::new())
            .await
    }

    /// Trigger capture of a new frame (ClientPull).
    ///
    /// Only the send is confirmed. Pose data for the captured frame must be
    /// fetched with the query methods before the next request.
    pub async fn request_frame(&mut self) -> Result<()> {
        self.send_command(CommandId::GetFrame, Bytes::new()).await
    }

    /// Number of subjects in the current frame; 0 when the server has none.
    pub async fn get_subject_count(&mut self) -> Result<u32> {
        let frame = self
            .request(CommandId::GetSubjectCount, Bytes::new())
            .await?;
        Ok(payload::decode_count(&frame.payload).unwrap_or(0))
    }

    /// Name of the subject at `index`; empty when the server has none.
    pub async fn get_subject_name(&mut self, index: u32) -> Result<String> {
        let frame = self
            .request(CommandId::GetSubjectName, payload::encode_index(index))
            .await?;
        Ok(payload::decode_name(&frame.payload))
    }

    /// Number of segments of `subject`; 0 when unknown.
    pub async fn get_segment_count(&mut self, subject: &str) -> Result<u32> {
        let body = payload::encode_names(&[subject])?;
        let frame = self.request(CommandId::GetSegmentCount, body).await?;
        Ok(payload::decode_count(&frame.payload).unwrap_or(0))
    }

    /// Global position of a segment, or `None` if it is not available this frame.
    pub async fn get_segment_translation(
        &mut self,
        subject: &str,
        segment: &str,
    ) -> Result<Option<Translation>> {
        let body = payload::encode_names(&[subject, segment])?;
        let frame = self
            .request(CommandId::GetSegmentGlobalTranslation, body)
            .await?;
        Ok(payload::decode_f64s::<3>(&frame.payload).map(Translation::from))
    }

    /// Global orientation of a segment, or `None` if it is not available this frame.
    pub async fn get_segment_rotation_quaternion(
        &mut self,
        subject: &str,
        segment: &str,
    ) -> Result<Option<Rotation>> {
        let body = payload::encode_names(&[subject, segment])?;
        let frame = self
            .request(CommandId::GetSegmentGlobalRotationQuaternion, body)
            .await?;
        Ok(payload::decode_f64s::<4>(&frame.payload).map(Rotation::from))
    }

    /// Translation and rotation of a segment, queried in that order.
    pub async fn get_segment_pose(&mut self, subject: &str, segment: &str) -> Result<Pose> {
        let translation = self.get_segment_translation(subject, segment).await?;
        let rotation = self
            .get_segment_rotation_quaternion(subject, segment)
            .await?;
        Ok(Pose {
            translation,
            rotation,
        })
    }

    /// Names of all subjects in the current frame.
    pub async fn list_subjects(&mut self) -> Result<Vec<String>> {
        let count = self.get_subject_count().await?;
        let mut names = Vec::with_capacity(count as usize);
        for index in 0..count {
            names.push(self.get_subject_name(index).await?);
        }
        Ok(names)
    }
}

impl<S> std::fmt::Debug for ViconTcpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViconTcpClient")
            .field("connected", &self.is_connected())
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}
