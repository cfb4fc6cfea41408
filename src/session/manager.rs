use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{connection_loop, ParticipantLink};
use super::observer::SessionObserver;
use super::participant::{assign_folders, Participant};
use crate::config::Config;
use crate::dispatch::{Command, Dispatcher, ParticipantId};
use crate::imu::{CycleTrigger, ImuReceiver};

/// Handles created by the acceptor, picked up by the main loop on
/// `ParticipantJoined`.
struct PendingParticipant {
    link: ParticipantLink,
    imu: Arc<Mutex<ImuReceiver>>,
}

type Registry = Arc<Mutex<BTreeMap<ParticipantId, PendingParticipant>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepting participants.
    Lobby,
    Live,
    Recording,
    Ended,
}

/// Owns every participant and drives the session lifecycle. All methods run
/// on the main loop; network work happens on the runtime it was bound with.
pub struct SessionManager {
    config: Config,
    dispatcher: Dispatcher,
    observer: Box<dyn SessionObserver>,
    local_addr: SocketAddr,
    registry: Registry,
    accepting: CancellationToken,
    participants: BTreeMap<ParticipantId, Participant>,
    phase: SessionPhase,
    session_dir: Option<PathBuf>,
}

impl SessionManager {
    /// Binds the control listener and starts accepting on `runtime`.
    pub fn bind(
        config: Config,
        runtime: &Handle,
        dispatcher: Dispatcher,
        observer: Box<dyn SessionObserver>,
    ) -> Result<Self> {
        let addr = config.server.listen_addr.as_str();
        let std_listener = std::net::TcpListener::bind(addr)
            .with_context(|| format!("failed to bind control listener on {addr}"))?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let registry: Registry = Arc::new(Mutex::new(BTreeMap::new()));
        let accepting = CancellationToken::new();
        runtime.spawn(accept_loop(
            listener,
            AcceptContext {
                registry: Arc::clone(&registry),
                dispatcher: dispatcher.clone(),
                cancel: accepting.clone(),
                trigger: config.imu.cycle_trigger,
                read_timeout: config.imu.read_timeout(),
            },
        ));
        info!("[session] listening on {local_addr}");

        Ok(Self {
            config,
            dispatcher,
            observer,
            local_addr,
            registry,
            accepting,
            participants: BTreeMap::new(),
            phase: SessionPhase::Lobby,
            session_dir: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_dir(&self) -> Option<&std::path::Path> {
        self.session_dir.as_deref()
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// One main-loop step: applies everything dispatched so far, then
    /// captures the motion frames due after `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        for command in self.dispatcher.drain() {
            self.handle(command);
        }
        for participant in self.participants.values_mut() {
            participant.capture(dt);
        }
    }

    fn handle(&mut self, command: Command) {
        let id = command.participant();
        if let Command::ParticipantJoined { .. } = command {
            self.admit(id);
            return;
        }
        let Some(p) = self.participants.get_mut(&id) else {
            debug!(participant = id, "[session] command for unknown participant");
            return;
        };

        match command {
            Command::ParticipantJoined { .. } => {}
            Command::NameEntered { name, .. } => {
                self.observer.name_changed(id, &name);
                p.name = Some(name);
            }
            Command::AgeEntered { age, .. } => {
                p.set_age(age);
                self.observer.age_changed(id, age);
            }
            Command::HeightEntered { height_m, .. } => {
                if p.set_height(height_m) {
                    self.observer.skeleton_ready(id, height_m);
                } else {
                    debug!(participant = id, "[session] skeleton exists, height {height_m} ignored");
                }
            }
            Command::HeartRate { bpm, .. } => {
                let exertion = p.record_heart_rate(bpm);
                self.observer.heart_rate(id, bpm);
                if let Some(exertion) = exertion {
                    self.observer.exertion(id, exertion);
                }
            }
            Command::HeartRateBaseline { bpm, .. } => p.set_baseline(bpm),
            Command::ImuStreamOpened { port, .. } => {
                p.imu_port = Some(port);
                self.observer.imu_connected(id, port);
            }
            Command::ImuRotations { rotations, .. } => {
                if let Some(pose) = p.pose_mut() {
                    pose.apply_rotations(&rotations);
                    self.observer.pose_updated(id, pose);
                }
            }
            Command::ParticipantLeft { .. } => {
                p.connected = false;
                self.observer.participant_left(id);
            }
        }
    }

    fn admit(&mut self, id: ParticipantId) {
        let pending = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match pending {
            Some(PendingParticipant { link, imu }) => {
                let mut participant = Participant::new(id, link, imu);
                if self.phase != SessionPhase::Lobby {
                    participant.start_session();
                }
                self.participants.insert(id, participant);
                self.observer.participant_joined(id);
            }
            None => warn!(participant = id, "[session] joined without connection handles"),
        }
    }

    /// Stops accepting and moves every participant into the session.
    pub fn start_session(&mut self) {
        if self.phase != SessionPhase::Lobby {
            return;
        }
        self.accepting.cancel();
        for p in self.participants.values_mut() {
            p.start_session();
        }
        self.phase = SessionPhase::Live;
        info!(participants = self.participants.len(), "[session] started");
    }

    /// Creates the session folder and starts every participant's recording.
    pub fn start_recording(&mut self) -> Result<PathBuf> {
        match self.phase {
            SessionPhase::Recording => bail!("already recording"),
            SessionPhase::Ended => bail!("session has ended"),
            SessionPhase::Lobby => self.start_session(),
            SessionPhase::Live => {}
        }

        let name = format!("Session_{}", Local::now().format("%Y-%m-%dT%H-%M-%S"));
        let dir = self.config.recording.sessions_dir.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let folders = assign_folders(self.participants.values());
        for p in self.participants.values_mut() {
            let name = folders.get(&p.id).cloned().unwrap_or_else(|| p.folder_name());
            if let Err(e) = p.start_recording(&dir.join(name), &self.config) {
                error!(participant = p.id, "[session] recording not started: {e:#}");
            }
        }

        self.phase = SessionPhase::Recording;
        self.observer.recording_started(&dir);
        self.session_dir = Some(dir.clone());
        Ok(dir)
    }

    /// Sends SESSION_END, closes every output and connection.
    pub fn end_session(&mut self) {
        if self.phase == SessionPhase::Ended {
            return;
        }
        self.accepting.cancel();
        // signal every IMU thread first so their read timeouts overlap
        for p in self.participants.values() {
            p.request_imu_stop();
        }
        for p in self.participants.values_mut() {
            if let Some(summary) = p.end_session() {
                info!(
                    participant = p.id,
                    frames = summary.frames,
                    truncated = summary.truncated,
                    "[session] saved {}",
                    summary.path.display()
                );
            }
        }
        self.phase = SessionPhase::Ended;
        self.observer.session_ended();
    }

    pub fn calibrate(&mut self) {
        for p in self.participants.values() {
            p.calibrate();
        }
        info!(participants = self.participants.len(), "[imu] calibration requested");
    }
}

struct AcceptContext {
    registry: Registry,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    trigger: CycleTrigger,
    read_timeout: Duration,
}

async fn accept_loop(listener: TcpListener, ctx: AcceptContext) {
    let mut next_id: ParticipantId = 0;
    loop {
        let (stream, peer) = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("[tcp] accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let id = next_id;
        next_id += 1;
        info!(participant = id, "[tcp] connection from {peer}");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let imu = Arc::new(Mutex::new(ImuReceiver::with_default_mounts(
            id,
            ctx.trigger,
            ctx.read_timeout,
            ctx.dispatcher.clone(),
        )));
        ctx.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                PendingParticipant {
                    link: ParticipantLink::new(id, out_tx, cancel.clone()),
                    imu: Arc::clone(&imu),
                },
            );
        ctx.dispatcher.dispatch(Command::ParticipantJoined { id });
        tokio::spawn(connection_loop(
            id,
            stream,
            out_rx,
            cancel,
            ctx.dispatcher.clone(),
            imu,
        ));
    }
    info!("[tcp] no longer accepting participants");
}
