//! TCP transport, client and simulated server

pub mod client;
pub mod server;
pub mod transport;

pub use client::ViconTcpClient;
pub use server::{SessionId, SimulatedScene, SimulatedSegment, SimulatedSubject, ViconTcpServer};
pub use transport::{ConnectionState, Transport};
