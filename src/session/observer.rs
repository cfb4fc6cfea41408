use std::path::Path;

use tracing::info;

use crate::dispatch::ParticipantId;
use crate::pose::PoseApplier;

/// Main-thread notifications for a UI layer. Every hook defaults to a no-op.
pub trait SessionObserver: Send {
    fn participant_joined(&mut self, _id: ParticipantId) {}
    fn participant_left(&mut self, _id: ParticipantId) {}
    fn name_changed(&mut self, _id: ParticipantId, _name: &str) {}
    fn age_changed(&mut self, _id: ParticipantId, _age: u32) {}
    fn skeleton_ready(&mut self, _id: ParticipantId, _height_m: f32) {}
    fn imu_connected(&mut self, _id: ParticipantId, _port: u16) {}
    fn heart_rate(&mut self, _id: ParticipantId, _bpm: u32) {}
    fn exertion(&mut self, _id: ParticipantId, _percent: f32) {}
    fn pose_updated(&mut self, _id: ParticipantId, _pose: &PoseApplier) {}
    fn recording_started(&mut self, _session_dir: &Path) {}
    fn session_ended(&mut self) {}
}

/// Observer for headless runs: writes lifecycle events to the log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn participant_joined(&mut self, id: ParticipantId) {
        info!(participant = id, "[session] joined");
    }

    fn participant_left(&mut self, id: ParticipantId) {
        info!(participant = id, "[session] disconnected");
    }

    fn name_changed(&mut self, id: ParticipantId, name: &str) {
        info!(participant = id, "[session] name = {name}");
    }

    fn age_changed(&mut self, id: ParticipantId, age: u32) {
        info!(participant = id, "[session] age = {age}");
    }

    fn skeleton_ready(&mut self, id: ParticipantId, height_m: f32) {
        info!(participant = id, "[session] skeleton built for {height_m:.2} m");
    }

    fn imu_connected(&mut self, id: ParticipantId, port: u16) {
        info!(participant = id, "[session] IMU stream on udp/{port}");
    }

    fn exertion(&mut self, id: ParticipantId, percent: f32) {
        tracing::debug!(participant = id, "[hr] exertion {percent:.1}%");
    }

    fn recording_started(&mut self, session_dir: &Path) {
        info!("[session] recording to {}", session_dir.display());
    }

    fn session_ended(&mut self) {
        info!("[session] ended");
    }
}
