//! List every subject the server is tracking.
//!
//! Usage: cargo run --example list_subjects -- [host] [port]

use std::error::Error;
use std::time::Duration;
use tracing::info;
use vicon_stream::{ViconTcpClient, DEFAULT_PORT};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.30.153".to_string());
    let port = match args.next() {
        Some(p) => p.parse()?,
        None => DEFAULT_PORT,
    };

    let mut client = ViconTcpClient::connect(&host, port).await?;
    client.enable_segment_data().await?;

    // Request a frame to populate the subject list
    client.request_frame().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let subjects = client.list_subjects().await;
    client.disconnect().await;
    let subjects = subjects?;

    info!("Found {} tracked objects", subjects.len());
    for (i, name) in subjects.iter().enumerate() {
        println!("  {}. {}", i + 1, name);
    }

    Ok(())
}
