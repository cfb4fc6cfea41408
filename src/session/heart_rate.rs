use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

pub const HEART_RATE_CSV: &str = "Heart_Rate.csv";
pub const EXERTION_CSV: &str = "Exertion.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Baseline / max heart-rate bookkeeping for one participant.
#[derive(Debug, Clone, Default)]
pub struct HeartRateMonitor {
    baseline: Option<f32>,
    max_hr: Option<u32>,
    last: Option<u32>,
}

impl HeartRateMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_baseline(&mut self, bpm: f32) {
        self.baseline = Some(bpm);
    }

    /// Age-predicted maximum: 220 - age.
    pub fn set_age(&mut self, age: u32) {
        self.max_hr = Some(220u32.saturating_sub(age));
    }

    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }

    pub fn max_hr(&self) -> Option<u32> {
        self.max_hr
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// Records a sample and returns its heart-rate reserve percentage once
    /// both the baseline and the age are known. Not clamped.
    pub fn record(&mut self, bpm: u32) -> Option<f32> {
        self.last = Some(bpm);
        let baseline = self.baseline?;
        let max = self.max_hr? as f32;
        if max <= baseline {
            return None;
        }
        Some((bpm as f32 - baseline) / (max - baseline) * 100.0)
    }
}

/// `Timestamp,<column>` CSV appended while recording.
pub struct CsvLog {
    writer: BufWriter<File>,
}

impl CsvLog {
    pub fn create(path: &Path, column: &str) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "Timestamp,{column}")?;
        Ok(Self { writer })
    }

    pub fn append(&mut self, at: DateTime<Local>, value: &str) -> Result<()> {
        writeln!(self.writer, "{},{}", at.format(TIMESTAMP_FORMAT), value)?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn format_exertion(exertion: f32) -> String {
    format!("{:.2}", exertion.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_exertion_needs_baseline_and_age() {
        let mut hr = HeartRateMonitor::new();
        assert_eq!(hr.record(100), None);
        hr.set_baseline(60.0);
        assert_eq!(hr.record(100), None);
        hr.set_age(40);
        assert_eq!(hr.max_hr(), Some(180));
        let e = hr.record(120).unwrap();
        assert!((e - 50.0).abs() < 1e-4, "e={e}");
        assert_eq!(hr.last(), Some(120));
    }

    #[test]
    fn test_exertion_degenerate_reserve() {
        let mut hr = HeartRateMonitor::new();
        hr.set_age(160);
        hr.set_baseline(70.0);
        assert_eq!(hr.record(90), None);
    }

    #[test]
    fn test_format_exertion_clamps() {
        assert_eq!(format_exertion(-12.0), "0.00");
        assert_eq!(format_exertion(42.345), "42.35");
        assert_eq!(format_exertion(130.0), "100.00");
    }

    #[test]
    fn test_csv_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HEART_RATE_CSV);
        let mut log = CsvLog::create(&path, "HeartRate").unwrap();
        let at = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        log.append(at, "72").unwrap();
        log.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Timestamp,HeartRate\n2025-03-04 05:06:07.000,72\n");
    }
}
