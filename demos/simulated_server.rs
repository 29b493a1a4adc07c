//! Serve a fixed scene on 127.0.0.1:8010 for trying the listener offline.
//!
//! cargo run --example simulated_server
//! cargo run --bin vicon-listener -- robot_1 127.0.0.1 8010

use std::error::Error;
use std::sync::Arc;
use tracing::info;
use vicon_stream::{Rotation, SimulatedScene, Translation, ViconTcpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let scene = SimulatedScene::new()
        .with_object(
            "robot_1",
            Some(Translation {
                x: 1250.0,
                y: -340.5,
                z: 92.25,
            }),
            Some(Rotation {
                x: 0.0,
                y: 0.0,
                z: 0.3826834,
                w: 0.9238795,
            }),
        )
        .with_object("wand", None, None);

    let server = ViconTcpServer::bind("127.0.0.1:8010").await?;
    info!("Serving {} subjects", scene.subjects().len());

    server.run_scene(Arc::new(scene)).await?;

    Ok(())
}
