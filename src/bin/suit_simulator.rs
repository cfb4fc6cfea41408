//! Suit simulator: plays one participant device against a running session
//! server. Sends the intake lines, then streams a synthetic walk cycle over
//! UDP and a heart rate over the control connection.
//!
//! Usage: suit_simulator [server_addr] [imu_port] [name]

use std::f32::consts::TAU;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use nalgebra::UnitQuaternion;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{info, warn};

use suit_capture::imu::format_datagram;
use suit_capture::math::from_euler_zxy;
use suit_capture::session::{ControlMessage, MessageType};
use suit_capture::skeleton::Joint;

const IMU_RATE_HZ: u64 = 100;
const STRIDE_HZ: f32 = 0.9;
const HEART_RATE_PERIOD: Duration = Duration::from_secs(1);

const STREAMED_JOINTS: [Joint; 11] = [
    Joint::Hip,
    Joint::Waist,
    Joint::Chest,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::LeftKnee,
    Joint::LeftAnkle,
    Joint::LeftFoot,
    Joint::RightHip,
    Joint::RightKnee,
    Joint::RightAnkle,
];

/// Sensor orientation of `joint` at `t` seconds into the walk.
fn walk_rotation(joint: Joint, t: f32) -> UnitQuaternion<f32> {
    let phase = (t * STRIDE_HZ * TAU).sin();
    let counter = -phase;
    // knees only bend, never hyperextend
    let bend = |p: f32| 35.0 * p.max(0.0);
    match joint {
        Joint::Hip => from_euler_zxy(0.0, 8.0 * phase, 3.0 * phase),
        Joint::Waist => from_euler_zxy(0.0, -4.0 * phase, 0.0),
        Joint::Chest => from_euler_zxy(2.0, -6.0 * phase, 0.0),
        Joint::RightShoulder => from_euler_zxy(0.0, 0.0, 5.0 * phase),
        Joint::LeftHip => from_euler_zxy(25.0 * phase, 0.0, 0.0),
        Joint::LeftKnee => from_euler_zxy(-bend(counter), 0.0, 0.0),
        Joint::LeftAnkle | Joint::LeftFoot => from_euler_zxy(10.0 * counter, 0.0, 0.0),
        Joint::RightHip => from_euler_zxy(25.0 * counter, 0.0, 0.0),
        Joint::RightKnee => from_euler_zxy(-bend(phase), 0.0, 0.0),
        Joint::RightAnkle | Joint::RightFoot => from_euler_zxy(10.0 * phase, 0.0, 0.0),
        _ => UnitQuaternion::identity(),
    }
}

fn simulated_heart_rate(t: f32) -> u32 {
    // warm up from rest towards ~140 bpm
    let effort = 1.0 - (-t / 60.0).exp();
    (72.0 + 68.0 * effort + 3.0 * (t * 0.7).sin()).round() as u32
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let server = args.next().unwrap_or_else(|| "127.0.0.1:7910".to_string());
    let imu_port: u16 = match args.next() {
        Some(p) => p.parse().with_context(|| format!("invalid imu port {p:?}"))?,
        None => 9100,
    };
    let name = args.next().unwrap_or_else(|| "Simulated".to_string());

    let tcp = TcpStream::connect(&server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;
    tcp.set_nodelay(true)?;
    let imu_target = SocketAddr::new(tcp.peer_addr()?.ip(), imu_port);
    info!("[tcp] connected to {server}");

    let mut lines = Framed::new(tcp, LinesCodec::new());
    let intake = [
        ControlMessage::Name(name.clone()),
        ControlMessage::Age(29),
        ControlMessage::HeartRateBaseline(68.0),
        ControlMessage::Height(1.72),
        ControlMessage::ImuConfig(imu_port),
    ];
    for msg in &intake {
        lines.send(msg.encode()).await?;
    }
    info!("[tcp] intake sent for {name}, streaming IMU to {imu_target}");

    let udp = UdpSocket::bind("0.0.0.0:0").await?;
    let mut imu_tick = tokio::time::interval(Duration::from_millis(1000 / IMU_RATE_HZ));
    let mut hr_tick = tokio::time::interval(HEART_RATE_PERIOD);
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = imu_tick.tick() => {
                let t = started.elapsed().as_secs_f32();
                for joint in STREAMED_JOINTS {
                    let datagram = format_datagram(joint, &walk_rotation(joint, t));
                    if let Err(e) = udp.send_to(datagram.as_bytes(), imu_target).await {
                        warn!("[udp] send failed: {e}");
                    }
                }
            }
            _ = hr_tick.tick() => {
                let bpm = simulated_heart_rate(started.elapsed().as_secs_f32());
                lines.send(ControlMessage::HeartRate(bpm).encode()).await?;
            }
            line = lines.next() => match line {
                Some(Ok(line)) => match ControlMessage::parse(&line) {
                    Ok(msg) if msg.message_type() == MessageType::SessionStart => {
                        println!("SESSION_START");
                    }
                    Ok(msg) if msg.message_type() == MessageType::SessionEnd => {
                        println!("SESSION_END");
                    }
                    Ok(other) => info!("[tcp] {}", other.message_type()),
                    Err(e) => warn!("[tcp] unreadable line: {e}"),
                },
                Some(Err(e)) => {
                    warn!("[tcp] read failed: {e}");
                    break;
                }
                None => {
                    info!("[tcp] server closed the connection");
                    break;
                }
            },
        }
    }
    Ok(())
}
