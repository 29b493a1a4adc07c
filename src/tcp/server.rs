use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, error, info};

use crate::payload;
use crate::types::{CommandId, Frame, Result, Rotation, Translation, ViconError};
use crate::ViconFrameCodec as Codec;

/// Identifier assigned to each accepted connection
pub type SessionId = u64;

/// TCP server speaking the DataStream framing.
///
/// Intended for local testing and demos: the handler sees each request
/// frame and returns the response payload, or `None` to send nothing.
pub struct ViconTcpServer {
    listener: TcpListener,
    next_session_id: Arc<AtomicU64>,
}

impl ViconTcpServer {
    /// Bind to the specified address
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("DataStream server bound to {}", addr);

        Ok(Self {
            listener,
            next_session_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Get the local address this server is bound to
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener.local_addr().map_err(ViconError::Io)
    }

    /// Run the server with the provided handler function
    pub async fn run<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(SessionId, Frame) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        info!("DataStream server starting...");

        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    info!("New connection from {}", addr);

                    let handler = handler.clone();
                    let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(socket, handler, session_id).await
                        {
                            error!("Session {} error: {}", session_id, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Serve a [`SimulatedScene`] until the task is dropped
    pub async fn run_scene(self, scene: Arc<SimulatedScene>) -> Result<()> {
        self.run(move |session_id, frame| {
            let scene = scene.clone();
            async move { scene.respond(session_id, &frame) }
        })
        .await
    }

    /// Handle a single client connection
    async fn handle_connection<F, Fut>(
        socket: TcpStream,
        handler: F,
        session_id: SessionId,
    ) -> Result<()>
    where
        F: Fn(SessionId, Frame) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        info!("Starting session {}", session_id);

        let mut framed = Framed::new(socket, Codec::default());

        loop {
            match framed.try_next().await {
                Ok(Some(request)) => {
                    debug!("Session {} received command {}", session_id, request.command_id);
                    let command_id = request.command_id;
                    if let Some(payload) = handler(session_id, request).await {
                        framed
                            .send(Frame {
                                command_id,
                                payload,
                            })
                            .await?;
                    }
                }
                Ok(None) => {
                    info!("Session {} connection closed", session_id);
                    break;
                }
                Err(e) => {
                    error!("Session {} frame error: {}", session_id, e);
                    break;
                }
            }
        }

        info!("Session {} ended", session_id);
        Ok(())
    }
}

/// One rigid segment in a simulated capture volume.
#[derive(Debug, Clone)]
pub struct SimulatedSegment {
    pub name: String,
    /// `None` while the segment is occluded
    pub translation: Option<Translation>,
    pub rotation: Option<Rotation>,
}

#[derive(Debug, Clone)]
pub struct SimulatedSubject {
    pub name: String,
    pub segments: Vec<SimulatedSegment>,
}

/// Static capture volume answering the ClientPull command set.
///
/// Queries on a session that has not yet requested a frame get empty
/// payloads, as a real server does before its first capture.
#[derive(Debug, Default)]
pub struct SimulatedScene {
    subjects: Vec<SimulatedSubject>,
    captured: Mutex<HashSet<SessionId>>,
}

impl SimulatedScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rigid object whose single segment shares its name.
    pub fn with_object(
        self,
        name: &str,
        translation: Option<Translation>,
        rotation: Option<Rotation>,
    ) -> Self {
        self.with_subject(SimulatedSubject {
            name: name.to_string(),
            segments: vec![SimulatedSegment {
                name: name.to_string(),
                translation,
                rotation,
            }],
        })
    }

    pub fn with_subject(mut self, subject: SimulatedSubject) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn subjects(&self) -> &[SimulatedSubject] {
        &self.subjects
    }

    /// Response payload for a request, or `None` when nothing is sent back.
    pub fn respond(&self, session_id: SessionId, request: &Frame) -> Option<Bytes> {
        let Some(command) = request.command() else {
            debug!("Unknown command {}", request.command_id);
            return Some(Bytes::new());
        };

        match command {
            CommandId::EnableSegmentData => return Some(Bytes::new()),
            CommandId::GetFrame => {
                self.lock_captured().insert(session_id);
                return None;
            }
            _ => {}
        }

        if !self.lock_captured().contains(&session_id) {
            return Some(Bytes::new());
        }

        let response = match command {
            CommandId::GetSubjectCount => Some(payload::encode_count(self.subjects.len() as u32)),
            CommandId::GetSubjectName => payload::decode_index(&request.payload)
                .and_then(|index| self.subjects.get(index as usize))
                .and_then(|subject| payload::encode_name(&subject.name).ok()),
            CommandId::GetSegmentCount => {
                let names = payload::decode_names(&request.payload);
                names
                    .first()
                    .and_then(|name| self.subject(name))
                    .map(|subject| payload::encode_count(subject.segments.len() as u32))
            }
            CommandId::GetSegmentGlobalTranslation => self
                .segment_for(&request.payload)
                .and_then(|segment| segment.translation)
                .map(|t| payload::encode_f64s(&[t.x, t.y, t.z])),
            CommandId::GetSegmentGlobalRotationQuaternion => self
                .segment_for(&request.payload)
                .and_then(|segment| segment.rotation)
                .map(|q| payload::encode_f64s(&[q.x, q.y, q.z, q.w])),
            CommandId::GetFrame | CommandId::EnableSegmentData => None,
        };

        Some(response.unwrap_or_default())
    }

    fn subject(&self, name: &str) -> Option<&SimulatedSubject> {
        self.subjects.iter().find(|s| s.name == name)
    }

    fn segment_for(&self, request_payload: &[u8]) -> Option<&SimulatedSegment> {
        let names = payload::decode_names(request_payload);
        let [subject, segment] = names.as_slice() else {
            return None;
        };
        self.subject(subject)?
            .segments
            .iter()
            .find(|s| &s.name == segment)
    }

    fn lock_captured(&self) -> std::sync::MutexGuard<'_, HashSet<SessionId>> {
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SimulatedScene {
        SimulatedScene::new()
            .with_object(
                "robot_1",
                Some(Translation {
                    x: 10.0,
                    y: 20.0,
                    z: 30.0,
                }),
                Some(Rotation {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    w: 1.0,
                }),
            )
            .with_object("hidden", None, None)
    }

    fn query(command: CommandId, names: &[&str]) -> Frame {
        Frame::new(command).with_payload(payload::encode_names(names).unwrap())
    }

    #[test]
    fn test_fire_and_forget_replies() {
        let scene = scene();
        assert_eq!(
            scene.respond(1, &Frame::new(CommandId::EnableSegmentData)),
            Some(Bytes::new())
        );
        assert_eq!(scene.respond(1, &Frame::new(CommandId::GetFrame)), None);
    }

    #[test]
    fn test_no_data_before_first_frame() {
        let scene = scene();
        let response = scene.respond(1, &Frame::new(CommandId::GetSubjectCount));
        assert_eq!(response, Some(Bytes::new()));
    }

    #[test]
    fn test_capture_is_per_session() {
        let scene = scene();
        scene.respond(1, &Frame::new(CommandId::GetFrame));

        let count = Frame::new(CommandId::GetSubjectCount);
        assert_eq!(
            payload::decode_count(&scene.respond(1, &count).unwrap()),
            Some(2)
        );
        assert_eq!(scene.respond(2, &count), Some(Bytes::new()));
    }

    #[test]
    fn test_pose_queries() {
        let scene = scene();
        scene.respond(7, &Frame::new(CommandId::GetFrame));

        let translation = scene
            .respond(7, &query(CommandId::GetSegmentGlobalTranslation, &["robot_1", "robot_1"]))
            .unwrap();
        assert_eq!(payload::decode_f64s::<3>(&translation), Some([10.0, 20.0, 30.0]));

        let rotation = scene
            .respond(
                7,
                &query(CommandId::GetSegmentGlobalRotationQuaternion, &["robot_1", "robot_1"]),
            )
            .unwrap();
        assert_eq!(payload::decode_f64s::<4>(&rotation), Some([0.0, 0.0, 0.0, 1.0]));

        let occluded = scene
            .respond(7, &query(CommandId::GetSegmentGlobalTranslation, &["hidden", "hidden"]))
            .unwrap();
        assert!(occluded.is_empty());

        let unknown = scene
            .respond(7, &query(CommandId::GetSegmentGlobalTranslation, &["ghost", "ghost"]))
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_name_and_segment_count_queries() {
        let scene = scene();
        scene.respond(3, &Frame::new(CommandId::GetFrame));

        let name = scene
            .respond(
                3,
                &Frame::new(CommandId::GetSubjectName).with_payload(payload::encode_index(1)),
            )
            .unwrap();
        assert_eq!(payload::decode_name(&name), "hidden");

        let out_of_range = scene
            .respond(
                3,
                &Frame::new(CommandId::GetSubjectName).with_payload(payload::encode_index(9)),
            )
            .unwrap();
        assert!(out_of_range.is_empty());

        let segments = scene
            .respond(3, &query(CommandId::GetSegmentCount, &["robot_1"]))
            .unwrap();
        assert_eq!(payload::decode_count(&segments), Some(1));
    }
}
