//! # vicon-stream
//!
//! Async client for the Vicon DataStream TCP protocol in ClientPull mode.
//!
//! * **Pull-driven**: the client requests each capture frame, then queries it
//! * **Strictly sequential**: one command in flight per connection
//! * **Tolerant**: missing objects are `None`, not errors
//!
//! ## Quick Start
//!
//! ```no_run
//! use vicon_stream::ViconTcpClient;
//!
//! # async fn demo() -> vicon_stream::Result<()> {
//! let mut client = ViconTcpClient::connect("192.168.30.152", 801).await?;
//! client.enable_segment_data().await?;
//! tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!
//! client.request_frame().await?;
//! if let Some(position) = client.get_segment_translation("robot_1", "robot_1").await? {
//!     println!("robot_1 at {:.3}, {:.3}, {:.3}", position.x, position.y, position.z);
//! }
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! Every request and response is one frame:
//!
//! - LENGTH (4B LE): size of COMMAND plus PAYLOAD, never less than 4
//! - COMMAND (4B LE): command identifier
//! - PAYLOAD: command-specific bytes
//!
//! Responses carry no request identifier; they are paired with requests by
//! arrival order on the connection.
//!
//! ## Commands
//!
//! | ID | Name                                | Request payload          | Response payload  |
//! |----|-------------------------------------|--------------------------|-------------------|
//! | 1  | GetFrame                            | none                     | none              |
//! | 2  | GetSubjectCount                     | none                     | u32 count         |
//! | 3  | GetSubjectName                      | u32 index                | NUL-terminated    |
//! | 4  | GetSegmentCount                     | subject\0                | u32 count         |
//! | 6  | GetSegmentGlobalTranslation         | subject\0 segment\0      | 3 x f64 (x,y,z)   |
//! | 9  | EnableSegmentData                   | none                     | none              |
//! | 12 | GetSegmentGlobalRotationQuaternion  | subject\0 segment\0      | 4 x f64 (x,y,z,w) |

pub mod codec;
pub mod config;
pub mod frame;
pub mod payload;
pub mod poller;
pub mod tcp;
pub mod types;

// Re-export main types for convenience
pub use types::{
    CommandId, Frame, Pose, Result, Rotation, Translation, ViconError, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_PORT,
};

pub use codec::ViconFrameCodec;
pub use config::{ClientConfig, PollerConfig};
pub use frame::{encode_frame, try_decode_frame};
pub use poller::{track, PollEvent, PollSummary, Poller, PoseSample, Sleeper, TokioSleeper};
pub use tcp::{SimulatedScene, ViconTcpClient, ViconTcpServer};
