use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use super::connection::ParticipantLink;
use super::heart_rate::{format_exertion, CsvLog, HeartRateMonitor, EXERTION_CSV, HEART_RATE_CSV};
use super::protocol::MessageType;
use crate::config::Config;
use crate::dispatch::ParticipantId;
use crate::imu::ImuReceiver;
use crate::pose::PoseApplier;
use crate::recorder::{CaptureClock, MotionLayout, MotionRecorder, RecordingSummary};
use crate::skeleton::SkeletonModel;

pub const MOTION_FILE: &str = "mocap.bvh";
pub const METADATA_FILE: &str = "participant.json";

/// Written next to the motion file when recording starts.
#[derive(Debug, Serialize)]
struct ParticipantMetadata<'a> {
    id: ParticipantId,
    name: Option<&'a str>,
    age: Option<u32>,
    height_m: f32,
    calibrated_joints: Vec<String>,
    recorded_at: String,
}

/// Main-thread state of one connected participant.
pub struct Participant {
    pub id: ParticipantId,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub height_m: Option<f32>,
    pub connected: bool,
    pub imu_port: Option<u16>,
    pub in_session: bool,
    link: ParticipantLink,
    imu: Arc<Mutex<ImuReceiver>>,
    applier: Option<PoseApplier>,
    recorder: MotionRecorder,
    clock: CaptureClock,
    heart_rate: HeartRateMonitor,
    hr_log: Option<CsvLog>,
    exertion_log: Option<CsvLog>,
    folder: Option<PathBuf>,
}

impl Participant {
    pub fn new(id: ParticipantId, link: ParticipantLink, imu: Arc<Mutex<ImuReceiver>>) -> Self {
        Self {
            id,
            name: None,
            age: None,
            height_m: None,
            connected: true,
            imu_port: None,
            in_session: false,
            link,
            imu,
            applier: None,
            recorder: MotionRecorder::default(),
            clock: CaptureClock::new(30.0),
            heart_rate: HeartRateMonitor::new(),
            hr_log: None,
            exertion_log: None,
            folder: None,
        }
    }

    fn imu(&self) -> MutexGuard<'_, ImuReceiver> {
        self.imu.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pose(&self) -> Option<&PoseApplier> {
        self.applier.as_ref()
    }

    pub fn pose_mut(&mut self) -> Option<&mut PoseApplier> {
        self.applier.as_mut()
    }

    pub fn heart_rate(&self) -> &HeartRateMonitor {
        &self.heart_rate
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Builds the skeleton on the first height; later heights are ignored.
    pub fn set_height(&mut self, height_m: f32) -> bool {
        if self.applier.is_some() {
            return false;
        }
        self.height_m = Some(height_m);
        self.applier = Some(PoseApplier::new(SkeletonModel::build(height_m)));
        true
    }

    pub fn set_age(&mut self, age: u32) {
        self.age = Some(age);
        self.heart_rate.set_age(age);
    }

    pub fn set_baseline(&mut self, bpm: f32) {
        self.heart_rate.set_baseline(bpm);
    }

    /// Logs a heart-rate sample and returns the exertion, if computable.
    pub fn record_heart_rate(&mut self, bpm: u32) -> Option<f32> {
        let now = Local::now();
        if let Some(log) = self.hr_log.as_mut() {
            if let Err(e) = log.append(now, &bpm.to_string()) {
                warn!(participant = self.id, "[hr] {e:#}");
            }
        }
        let exertion = self.heart_rate.record(bpm)?;
        if let Some(log) = self.exertion_log.as_mut() {
            if let Err(e) = log.append(now, &format_exertion(exertion)) {
                warn!(participant = self.id, "[hr] {e:#}");
            }
        }
        Some(exertion)
    }

    pub fn calibrate(&self) {
        self.imu().calibrate();
    }

    pub fn calibrated_joints(&self) -> Vec<String> {
        self.imu()
            .calibrated_joints()
            .into_iter()
            .map(|j| j.name().to_string())
            .collect()
    }

    pub fn start_session(&mut self) {
        self.in_session = true;
    }

    /// Folder name under the session directory.
    pub fn folder_name(&self) -> String {
        let fallback = format!("participant_{}", self.id);
        let Some(name) = self.name.as_deref().map(str::trim) else {
            return fallback;
        };
        let cleaned: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
            .collect();
        if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
            fallback
        } else {
            cleaned
        }
    }

    /// Opens every output in `folder` and starts streaming. SESSION_START goes
    /// out only once all of it succeeded.
    pub fn start_recording(&mut self, folder: &Path, config: &Config) -> Result<PathBuf> {
        fs::create_dir_all(folder)
            .with_context(|| format!("failed to create {}", folder.display()))?;

        let hr_log = CsvLog::create(&folder.join(HEART_RATE_CSV), "HeartRate")?;
        let exertion_log = CsvLog::create(&folder.join(EXERTION_CSV), "Exertion")?;

        if self.applier.is_none() {
            let height = config.skeleton.default_height_m;
            warn!(participant = self.id, "[session] no height received, using {height:.2} m");
            self.set_height(height);
        }
        let height_m = self.height_m.unwrap_or(config.skeleton.default_height_m);
        self.write_metadata(folder, height_m)?;

        let mut recorder = MotionRecorder::new(config.recording.queue_capacity);
        if let Some(applier) = &self.applier {
            let model = applier.model();
            let layout = MotionLayout::new(
                model.hierarchy.clone(),
                model.rest.clone(),
                config.recording.capture_fps,
            );
            recorder.begin(&folder.join(MOTION_FILE), layout)?;
        }

        self.recorder = recorder;
        self.hr_log = Some(hr_log);
        self.exertion_log = Some(exertion_log);
        self.clock = CaptureClock::new(config.recording.capture_fps);
        self.folder = Some(folder.to_path_buf());
        self.link.send(MessageType::SessionStart, "");

        info!(participant = self.id, "[session] recording into {}", folder.display());
        Ok(folder.to_path_buf())
    }

    fn write_metadata(&self, folder: &Path, height_m: f32) -> Result<()> {
        let meta = ParticipantMetadata {
            id: self.id,
            name: self.name.as_deref(),
            age: self.age,
            height_m,
            calibrated_joints: self.calibrated_joints(),
            recorded_at: Local::now().to_rfc3339(),
        };
        let path = folder.join(METADATA_FILE);
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &meta)?;
        writer.flush()?;
        Ok(())
    }

    /// Queues the frames due after `dt` seconds of main-loop time.
    pub fn capture(&mut self, dt: f64) {
        if !self.recorder.is_recording() {
            return;
        }
        let Some(applier) = &self.applier else {
            return;
        };
        for _ in 0..self.clock.advance(dt) {
            self.recorder.enqueue_frame(applier.snapshot());
        }
    }

    /// Tells the IMU thread to wind down without waiting for it.
    pub fn request_imu_stop(&self) {
        self.imu().request_stop();
    }

    pub fn end_session(&mut self) -> Option<RecordingSummary> {
        self.link.send(MessageType::SessionEnd, "");

        for log in [self.hr_log.take(), self.exertion_log.take()].into_iter().flatten() {
            if let Err(e) = log.close() {
                warn!(participant = self.id, "[hr] {e:#}");
            }
        }

        let summary = match self.recorder.finish() {
            Ok(summary) => summary,
            Err(e) => {
                warn!(participant = self.id, "[bvh] {e:#}");
                None
            }
        };

        self.imu().stop();
        self.link.close();
        self.in_session = false;
        summary
    }
}

/// Folder name per participant. A name already taken gets the participant id
/// appended, so no two participants share a folder.
pub fn assign_folders<'a>(
    participants: impl IntoIterator<Item = &'a Participant>,
) -> BTreeMap<ParticipantId, String> {
    let mut taken = BTreeSet::new();
    let mut folders = BTreeMap::new();
    for p in participants {
        let base = p.folder_name();
        let mut name = base.clone();
        let mut attempt = 0;
        while !taken.insert(name.clone()) {
            attempt += 1;
            name = match attempt {
                1 => format!("{base}_{}", p.id),
                n => format!("{base}_{}_{n}", p.id),
            };
        }
        folders.insert(p.id, name);
    }
    folders
}
