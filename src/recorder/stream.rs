use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::bvh::{MotionLayout, FRAMES_FIELD_WIDTH};
use crate::pose::PoseSnapshot;

pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// What the writer thread hands back when the queue closes.
struct WriterOutcome<W: Write> {
    writer: BufWriter<W>,
    /// Set once the header has reached the file.
    frames_field: Option<u64>,
    /// Frames whose whole line has been flushed.
    frames: usize,
    failed: bool,
}

/// Result of a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames: usize,
    /// The writer stopped on an I/O error; the file holds only `frames` frames.
    pub truncated: bool,
}

enum State {
    Idle,
    Streaming {
        path: PathBuf,
        tx: SyncSender<PoseSnapshot>,
        worker: JoinHandle<WriterOutcome<File>>,
    },
    Finished,
}

/// Streams pose snapshots to a BVH file on a background writer thread.
///
/// The header goes out with the first frame. `finish` patches the real frame
/// count into the fixed-width field reserved there.
pub struct MotionRecorder {
    queue_capacity: usize,
    state: State,
}

impl MotionRecorder {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            state: State::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Streaming { .. })
    }

    /// Opens `path` (creating parent directories) and starts the writer.
    pub fn begin(&mut self, path: &Path, layout: MotionLayout) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            warn!(path = %path.display(), "[bvh] begin ignored, recorder already used");
            return Ok(());
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        let (tx, rx) = mpsc::sync_channel(self.queue_capacity);
        let worker = thread::Builder::new()
            .name("bvh-writer".into())
            .spawn(move || writer_loop(BufWriter::new(file), layout, rx))
            .context("failed to spawn BVH writer")?;

        info!(path = %path.display(), "[bvh] recording started");
        self.state = State::Streaming {
            path: path.to_path_buf(),
            tx,
            worker,
        };
        Ok(())
    }

    /// Queues one frame. Blocks while the queue is full; no-op unless
    /// recording.
    pub fn enqueue_frame(&self, snapshot: PoseSnapshot) {
        if let State::Streaming { tx, .. } = &self.state {
            // the writer only hangs up after an I/O error, which it already logged
            if tx.send(snapshot).is_err() {
                debug!("[bvh] writer gone, frame discarded");
            }
        }
    }

    /// Closes the queue, joins the writer and patches the frame count.
    /// Returns `None` when there was nothing to finish.
    pub fn finish(&mut self) -> Result<Option<RecordingSummary>> {
        let (path, tx, worker) = match std::mem::replace(&mut self.state, State::Finished) {
            State::Streaming { path, tx, worker } => (path, tx, worker),
            other => {
                if matches!(other, State::Idle) {
                    self.state = State::Idle;
                }
                return Ok(None);
            }
        };
        drop(tx);

        let outcome = worker
            .join()
            .map_err(|_| anyhow::anyhow!("BVH writer thread panicked"))?;
        let WriterOutcome {
            writer,
            frames_field,
            frames,
            failed,
        } = outcome;

        // every frame was flushed by the writer; anything still buffered
        // belongs to the write that failed
        let (mut file, _) = writer.into_parts();
        match frames_field {
            Some(pos) => patch_frame_count(&mut file, pos, frames)
                .with_context(|| format!("failed to patch frame count in {}", path.display()))?,
            None if failed => {
                if let Err(e) = file.set_len(0) {
                    warn!(path = %path.display(), "[bvh] could not empty unusable file: {e}");
                }
            }
            None => {}
        }

        if failed {
            warn!(path = %path.display(), frames, "[bvh] recording truncated by write error");
        } else {
            info!(path = %path.display(), frames, "[bvh] recording finished");
        }
        Ok(Some(RecordingSummary {
            path,
            frames,
            truncated: failed,
        }))
    }
}

impl Default for MotionRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Drop for MotionRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("[bvh] finish on drop failed: {e:#}");
        }
    }
}

fn patch_frame_count(file: &mut File, pos: u64, frames: usize) -> io::Result<()> {
    let field = format!("{:>width$}", frames, width = FRAMES_FIELD_WIDTH);
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(field.as_bytes())?;
    file.flush()
}

fn writer_loop<W: Write>(
    mut writer: BufWriter<W>,
    layout: MotionLayout,
    rx: Receiver<PoseSnapshot>,
) -> WriterOutcome<W> {
    let (header, field) = layout.header();
    let mut frames_field = None;
    let mut frames = 0usize;
    let mut failed = false;

    for snapshot in rx.iter() {
        let result = (|| -> io::Result<()> {
            if frames_field.is_none() {
                writer.write_all(header.as_bytes())?;
            }
            writer.write_all(layout.frame_line(&snapshot).as_bytes())?;
            writer.flush()
        })();

        match result {
            Ok(()) => {
                frames_field.get_or_insert(field as u64);
                frames += 1;
            }
            Err(e) => {
                error!("[bvh] write failed after {frames} frames: {e}");
                failed = true;
                break;
            }
        }
    }

    WriterOutcome {
        writer,
        frames_field,
        frames,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonModel;

    fn layout() -> MotionLayout {
        let model = SkeletonModel::build(1.75);
        MotionLayout::new(model.hierarchy, model.rest, 30.0)
    }

    fn frames_literal(text: &str) -> &str {
        let line = text
            .lines()
            .find(|l| l.starts_with("Frames:"))
            .unwrap();
        &line["Frames:".len()..]
    }

    #[test]
    fn test_fifty_frames_patched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mocap.bvh");

        let mut rec = MotionRecorder::default();
        rec.begin(&path, layout()).unwrap();
        for _ in 0..50 {
            rec.enqueue_frame(PoseSnapshot::new());
        }
        let summary = rec.finish().unwrap().unwrap();
        assert_eq!(summary.frames, 50);
        assert!(!summary.truncated);

        let text = fs::read_to_string(&path).unwrap();
        let field = frames_literal(&text);
        assert_eq!(field.len(), FRAMES_FIELD_WIDTH);
        assert_eq!(field.trim(), "50");

        let motion_at = text.find("Frame Time:").unwrap();
        let frame_lines = text[motion_at..].lines().skip(1).count();
        assert_eq!(frame_lines, 50);
    }

    #[test]
    fn test_patch_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocap.bvh");
        let layout = layout();
        let (header, _) = layout.header();

        let mut rec = MotionRecorder::new(4);
        rec.begin(&path, layout.clone()).unwrap();
        for _ in 0..7 {
            rec.enqueue_frame(PoseSnapshot::new());
        }
        rec.finish().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let line = layout.frame_line(&PoseSnapshot::new());
        assert_eq!(text.len(), header.len() + 7 * line.len());
    }

    #[test]
    fn test_no_frames_leaves_file_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocap.bvh");
        let mut rec = MotionRecorder::default();
        rec.begin(&path, layout()).unwrap();
        let summary = rec.finish().unwrap().unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_finish_and_enqueue_are_safe_noops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocap.bvh");

        let mut rec = MotionRecorder::default();
        rec.enqueue_frame(PoseSnapshot::new());
        assert!(rec.finish().unwrap().is_none());

        rec.begin(&path, layout()).unwrap();
        rec.enqueue_frame(PoseSnapshot::new());
        assert!(rec.finish().unwrap().is_some());
        rec.enqueue_frame(PoseSnapshot::new());
        assert!(rec.finish().unwrap().is_none());
        assert!(!rec.is_recording());

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(frames_literal(&text).trim(), "1");
    }

    /// Accepts `capacity` bytes, then fails every write.
    struct FullDisk {
        data: Vec<u8>,
        capacity: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity - self.data.len();
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_counts_only_frames_on_disk() {
        let layout = layout();
        let (header, field) = layout.header();
        let line_len = layout.frame_line(&PoseSnapshot::new()).len();
        let sink = FullDisk {
            data: Vec::new(),
            capacity: header.len() + 5 * line_len + line_len / 2,
        };

        let (tx, rx) = mpsc::sync_channel(64);
        for _ in 0..20 {
            tx.send(PoseSnapshot::new()).unwrap();
        }
        drop(tx);
        let outcome = writer_loop(BufWriter::new(sink), layout, rx);

        assert!(outcome.failed);
        assert_eq!(outcome.frames, 5);
        assert_eq!(outcome.frames_field, Some(field as u64));
        let (sink, _) = outcome.writer.into_parts();
        let complete_lines = sink.data[header.len()..]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        assert_eq!(complete_lines, outcome.frames);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_error_reported_as_truncated() {
        let path = Path::new("/dev/full");
        if !path.exists() {
            return;
        }
        let mut rec = MotionRecorder::new(4);
        rec.begin(path, layout()).unwrap();
        // more than the queue holds: the producer must not hang once the writer quits
        for _ in 0..20 {
            rec.enqueue_frame(PoseSnapshot::new());
        }
        let summary = rec.finish().unwrap().unwrap();
        assert!(summary.truncated);
        assert_eq!(summary.frames, 0);
    }

    #[test]
    fn test_begin_fails_on_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let mut rec = MotionRecorder::default();
        assert!(rec.begin(&blocker.join("mocap.bvh"), layout()).is_err());
        assert!(!rec.is_recording());
    }
}
