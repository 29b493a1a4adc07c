//! Print the pose of one tracked object for every frame.
//!
//! Usage: vicon-listener <object_name> [host] [port] [--json]

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vicon_stream::{
    ClientConfig, PollEvent, Poller, PollerConfig, PoseSample, ViconError, ViconTcpClient,
    DEFAULT_PORT,
};

const DEFAULT_HOST: &str = "192.168.30.152";

struct Args {
    object: String,
    host: String,
    port: u16,
    json: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut json = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            positional.push(arg);
        }
    }

    let mut positional = positional.into_iter();
    let object = positional.next().ok_or("missing <object_name>")?;
    let host = positional.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match positional.next() {
        Some(p) => p.parse().map_err(|_| format!("invalid port: {}", p))?,
        None => DEFAULT_PORT,
    };

    Ok(Args {
        object,
        host,
        port,
        json,
    })
}

fn print_sample(sample: &PoseSample, json: bool) {
    if json {
        match serde_json::to_string(sample) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize sample: {}", e),
        }
        return;
    }

    let t = &sample.translation;
    match &sample.rotation {
        Some(q) => println!(
            "Frame {}: Position: X={:.3}, Y={:.3}, Z={:.3} | Rotation: QX={:.3}, QY={:.3}, QZ={:.3}, QW={:.3}",
            sample.frame_number, t.x, t.y, t.z, q.x, q.y, q.z, q.w
        ),
        None => println!(
            "Frame {}: Position: X={:.3}, Y={:.3}, Z={:.3}",
            sample.frame_number, t.x, t.y, t.z
        ),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: vicon-listener <object_name> [host] [port] [--json]");
            eprintln!("Example: vicon-listener robot_1 192.168.30.152 801");
            return ExitCode::FAILURE;
        }
    };

    info!("Tracking object: {}", args.object);
    info!("Connecting to {}:{}...", args.host, args.port);

    let config = ClientConfig::new(args.host.clone(), args.port);
    let mut client = match ViconTcpClient::connect_with_config(&config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to connect to Vicon server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested by user");
            ctrl_c.cancel();
        }
    });

    let poller = Poller::new(PollerConfig::new(args.object.clone()), cancel);
    let json = args.json;
    let result = poller
        .run(&mut client, |event| match event {
            PollEvent::Sample(sample) => print_sample(&sample, json),
            PollEvent::Missing { subject, .. } => {
                println!("Could not find object {} or connection lost", subject)
            }
        })
        .await;

    client.disconnect().await;
    println!("Disconnected");

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let category = match &e {
                ViconError::ConnectionClosed => "connection closed",
                ViconError::Send(_) | ViconError::Receive(_) | ViconError::Io(_) => "I/O error",
                ViconError::MalformedFrame(_) | ViconError::FrameTooLarge { .. } => {
                    "protocol error"
                }
                ViconError::Timeout { .. } => "timeout",
                _ => "error",
            };
            eprintln!("Error ({}): {}", category, e);
            ExitCode::FAILURE
        }
    }
}
