use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use nalgebra::UnitQuaternion;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::channel::{ImuChannel, MountYaw};
use super::datagram::{parse_datagram_bytes, DatagramError};
use super::Sensor;
use crate::dispatch::{Command, Dispatcher, ParticipantId};
use crate::skeleton::Joint;

/// When a receive counts as the end of an update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CycleTrigger {
    /// Publish whenever this joint reports.
    Designated(Joint),
    /// Publish after every accepted datagram.
    AnyJoint,
    /// Publish once every registered joint has reported since the last pass.
    AllRegistered,
}

impl Default for CycleTrigger {
    fn default() -> Self {
        CycleTrigger::Designated(Joint::Hip)
    }
}

impl FromStr for CycleTrigger {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "any" => Ok(CycleTrigger::AnyJoint),
            "all" => Ok(CycleTrigger::AllRegistered),
            name => Ok(CycleTrigger::Designated(name.parse()?)),
        }
    }
}

impl TryFrom<String> for CycleTrigger {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleTrigger::Designated(joint) => write!(f, "{joint}"),
            CycleTrigger::AnyJoint => f.write_str("any"),
            CycleTrigger::AllRegistered => f.write_str("all"),
        }
    }
}

/// Mount layout of the standard suit.
pub const DEFAULT_MOUNTS: [(Joint, MountYaw, f32); 12] = [
    (Joint::Hip, MountYaw::Back, 90.0),
    (Joint::Waist, MountYaw::Back, 90.0),
    (Joint::Chest, MountYaw::Back, 0.0),
    (Joint::RightShoulder, MountYaw::Right, 90.0),
    (Joint::LeftHip, MountYaw::Front, 0.0),
    (Joint::LeftKnee, MountYaw::Front, 0.0),
    (Joint::LeftAnkle, MountYaw::Front, 0.0),
    (Joint::LeftFoot, MountYaw::Front, 0.0),
    (Joint::RightHip, MountYaw::Front, 0.0),
    (Joint::RightKnee, MountYaw::Front, 0.0),
    (Joint::RightAnkle, MountYaw::Front, 0.0),
    (Joint::RightFoot, MountYaw::Front, 0.0),
];

#[derive(Default)]
struct ImuState {
    channels: BTreeMap<Joint, ImuChannel>,
    seen: BTreeSet<Joint>,
}

struct Shared {
    participant: ParticipantId,
    trigger: CycleTrigger,
    state: Mutex<ImuState>,
    dispatcher: Dispatcher,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, ImuState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn receive(&self, joint: Joint, raw: UnitQuaternion<f32>) -> Result<(), DatagramError> {
        let snapshot = {
            let mut state = self.lock();
            let channel = state
                .channels
                .get_mut(&joint)
                .ok_or(DatagramError::Unregistered(joint))?;
            channel.update(raw);
            state.seen.insert(joint);

            let complete = match self.trigger {
                CycleTrigger::Designated(j) => j == joint,
                CycleTrigger::AnyJoint => true,
                CycleTrigger::AllRegistered => state.seen.len() == state.channels.len(),
            };
            if !complete {
                return Ok(());
            }
            state.seen.clear();
            state.channels.clone()
        };

        let rotations = snapshot
            .into_iter()
            .map(|(joint, channel)| (joint, channel.final_rotation()))
            .collect();
        self.dispatcher.dispatch(Command::ImuRotations {
            id: self.participant,
            rotations,
        });
        Ok(())
    }

    fn handle_datagram(&self, bytes: &[u8]) {
        let result = parse_datagram_bytes(bytes).and_then(|(joint, q)| self.receive(joint, q));
        if let Err(e) = result {
            debug!(participant = self.participant, "[imu] dropped datagram: {e}");
        }
    }
}

/// Per-participant IMU ingestion: one UDP socket, one blocking receive thread.
pub struct ImuReceiver {
    shared: Arc<Shared>,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ImuReceiver {
    pub fn new(
        participant: ParticipantId,
        trigger: CycleTrigger,
        read_timeout: Duration,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                participant,
                trigger,
                state: Mutex::new(ImuState::default()),
                dispatcher,
            }),
            read_timeout,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            local_addr: None,
        }
    }

    /// Receiver with the standard suit mounts already registered.
    pub fn with_default_mounts(
        participant: ParticipantId,
        trigger: CycleTrigger,
        read_timeout: Duration,
        dispatcher: Dispatcher,
    ) -> Self {
        let receiver = Self::new(participant, trigger, read_timeout, dispatcher);
        for (joint, yaw, roll) in DEFAULT_MOUNTS {
            receiver.register_joint(joint, yaw, roll);
        }
        receiver
    }

    /// No-op when the joint is already registered.
    pub fn register_joint(&self, joint: Joint, yaw: MountYaw, roll_deg: f32) {
        self.shared
            .lock()
            .channels
            .entry(joint)
            .or_insert_with(|| ImuChannel::new(yaw, roll_deg));
    }

    pub fn registered_joints(&self) -> Vec<Joint> {
        self.shared.lock().channels.keys().copied().collect()
    }

    pub fn receive(&self, joint: Joint, raw: UnitQuaternion<f32>) -> Result<(), DatagramError> {
        self.shared.receive(joint, raw)
    }

    pub fn calibrate(&self) {
        let mut state = self.shared.lock();
        for channel in state.channels.values_mut() {
            channel.calibrate();
        }
        info!(
            participant = self.shared.participant,
            joints = state.channels.len(),
            "[imu] calibrated"
        );
    }

    pub fn channel(&self, joint: Joint) -> Option<ImuChannel> {
        self.shared.lock().channels.get(&joint).copied()
    }

    pub fn calibrated_joints(&self) -> Vec<Joint> {
        self.shared
            .lock()
            .channels
            .iter()
            .filter(|(_, c)| c.calibrated)
            .map(|(j, _)| *j)
            .collect()
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Clears the running flag without joining. The loop notices within one
    /// read timeout, so several receivers can be signalled before any join.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Clears the running flag and joins the receive thread.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(participant = self.shared.participant, "[imu] receive thread panicked");
            }
            info!(participant = self.shared.participant, "[imu] receiver stopped");
        }
    }
}

impl Sensor for ImuReceiver {
    type Endpoint = u16;

    fn connect(&mut self, port: u16) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr.filter(|_| self.worker.is_some()) {
            warn!(participant = self.shared.participant, "[imu] already streaming on {addr}");
            return Ok(addr);
        }

        let socket = UdpSocket::bind(("0.0.0.0", port))
            .with_context(|| format!("failed to bind IMU port {port}"))?;
        socket.set_read_timeout(Some(self.read_timeout))?;
        let addr = socket.local_addr()?;

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let shared = Arc::clone(&self.shared);
        let worker = thread::Builder::new()
            .name(format!("imu-{}", self.shared.participant))
            .spawn(move || receive_loop(socket, shared, running))
            .context("failed to spawn IMU receive thread")?;

        self.worker = Some(worker);
        self.local_addr = Some(addr);
        self.on_connected(addr);
        Ok(addr)
    }

    fn on_connected(&mut self, addr: SocketAddr) {
        info!(participant = self.shared.participant, "[imu] listening on {addr}");
        self.shared.dispatcher.dispatch(Command::ImuStreamOpened {
            id: self.shared.participant,
            port: addr.port(),
        });
    }
}

impl Drop for ImuReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop(socket: UdpSocket, shared: Arc<Shared>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 1024];
    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => shared.handle_datagram(&buf[..len]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                warn!(participant = shared.participant, "[imu] receive error: {e}");
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}
