// replay.rs — run a recorded sensor session through the pipeline offline
//
// Recordings are plain JSON (optionally gzip-compressed, `.json.gz`):
//   { "initial": { "x": .., "y": .., "z": .. },
//     "events": [ { "type": "Acceleration", "x": .., "y": .., "z": .. },
//                 { "type": "PositionFix",  "x": .., "y": .., "z": .. } ] }
// Events are applied in file order, exactly as the live callbacks would be.

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::PResult;
use crate::filters::KalmanState;
use crate::motion::MotionCue;
use crate::pipeline::PositioningPipeline;
use crate::session_log::SessionRecord;
use crate::types::{LocationData, RawAccelerationSample};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecordedEvent {
    Acceleration { x: f64, y: f64, z: f64 },
    PositionFix { x: f64, y: f64, z: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedSession {
    pub initial: LocationData,
    pub events: Vec<RecordedEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// RFC 3339 wall-clock time of the replay run.
    pub generated_at: String,
    pub samples: u64,
    pub rejected_samples: u64,
    pub fixes: u64,
    pub rejected_fixes: u64,
    pub up_cues: u64,
    pub down_cues: u64,
    pub final_state: KalmanState,
    pub final_uncertainty: f64,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

pub fn load_session(path: impl AsRef<Path>) -> PResult<RecordedSession> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let session = if is_gzip(path) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(session)
}

pub fn save_session(path: impl AsRef<Path>, session: &RecordedSession) -> PResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, session)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, session)?;
        writer.flush()?;
    }
    Ok(())
}

/// Replay `session` and return one record per position fix plus a summary.
/// A rejected fix still produces a record; its filtered side is the
/// predicted state that was kept.
pub fn replay(
    session: &RecordedSession,
    config: &PipelineConfig,
) -> PResult<(Vec<SessionRecord>, ReplaySummary)> {
    let mut pipeline = PositioningPipeline::new(config, session.initial)?;
    let mut records = Vec::new();
    let mut up_cues = 0u64;
    let mut down_cues = 0u64;

    for event in &session.events {
        match *event {
            RecordedEvent::Acceleration { x, y, z } => {
                // Non-finite samples are logged and counted by the pipeline.
                if let Ok(out) = pipeline.on_acceleration(RawAccelerationSample::new(x, y, z)) {
                    match out.cue {
                        Some(MotionCue::Up) => up_cues += 1,
                        Some(MotionCue::Down) => down_cues += 1,
                        None => {}
                    }
                }
            }
            RecordedEvent::PositionFix { x, y, z } => {
                let raw = LocationData::new(x, y, z);
                let filtered = match pipeline.on_position_fix(raw) {
                    Ok(state) => state.location(),
                    Err(e) => {
                        debug!("[replay] fix #{} rejected: {}", records.len() + 1, e);
                        pipeline.current_state().location()
                    }
                };
                records.push(SessionRecord { raw, filtered });
            }
        }
    }

    let snapshot = pipeline.snapshot();
    let summary = ReplaySummary {
        generated_at: Utc::now().to_rfc3339(),
        samples: snapshot.samples,
        rejected_samples: snapshot.rejected_samples,
        fixes: snapshot.fixes,
        rejected_fixes: snapshot.rejected_fixes,
        up_cues,
        down_cues,
        final_state: snapshot.state,
        final_uncertainty: snapshot.state.position_uncertainty(),
    };
    info!(
        "[replay] {} samples, {} fixes ({} rejected), {} up / {} down cues",
        summary.samples, summary.fixes, summary.rejected_fixes, up_cues, down_cues
    );
    Ok((records, summary))
}
