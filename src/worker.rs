// worker.rs — dedicated processing thread for a positioning pipeline
//
// Sensor callbacks may arrive on any thread. They hand samples to a bounded
// queue; a single worker thread owns the pipeline, so the preprocessor and
// estimator are never touched concurrently. A full queue drops the sample.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{PResult, PositioningError};
use crate::pipeline::{PipelineSnapshot, PositioningPipeline};
use crate::types::{LocationData, RawAccelerationSample};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorkerInput {
    Acceleration(RawAccelerationSample),
    PositionFix(LocationData),
}

// Only `PipelineWorker::shutdown` can stop the thread.
#[derive(Debug)]
enum Command {
    Input(WorkerInput),
    Stop,
}

/// Cloneable producer side of the worker queue.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: Sender<Command>,
    dropped: Arc<AtomicU64>,
}

impl WorkerHandle {
    /// Non-blocking submit. `Ok(false)` means the queue was full and the
    /// input was dropped.
    pub fn submit(&self, input: WorkerInput) -> PResult<bool> {
        match self.sender.try_send(Command::Input(input)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    warn!("[worker] queue full, {} inputs dropped so far", dropped);
                }
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(PositioningError::QueueClosed),
        }
    }

    pub fn submit_acceleration(&self, sample: RawAccelerationSample) -> PResult<bool> {
        self.submit(WorkerInput::Acceleration(sample))
    }

    pub fn submit_fix(&self, fix: LocationData) -> PResult<bool> {
        self.submit(WorkerInput::PositionFix(fix))
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct PipelineWorker {
    handle: WorkerHandle,
    thread: JoinHandle<PipelineSnapshot>,
}

impl PipelineWorker {
    /// Move `pipeline` onto its own thread. Snapshots are published after
    /// every processed input; while the snapshot queue is full new ones are
    /// discarded.
    pub fn spawn(
        pipeline: PositioningPipeline,
        capacity: usize,
    ) -> PResult<(Self, Receiver<PipelineSnapshot>)> {
        if capacity == 0 {
            return Err(PositioningError::InvalidParameters(
                "worker queue capacity must be at least 1".to_string(),
            ));
        }

        let (input_tx, input_rx) = bounded::<Command>(capacity);
        let (snapshot_tx, snapshot_rx) = bounded::<PipelineSnapshot>(capacity);

        let thread = thread::Builder::new()
            .name("positioning-worker".to_string())
            .spawn(move || run(pipeline, input_rx, snapshot_tx))?;

        info!("[worker] started (queue capacity {})", capacity);

        let handle = WorkerHandle {
            sender: input_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        Ok((Self { handle, thread }, snapshot_rx))
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Drain queued inputs, stop the thread and return the final snapshot.
    pub fn shutdown(self) -> PResult<PipelineSnapshot> {
        // Blocking send: the stop command must not be dropped on a full queue.
        // A failed send means the thread is already gone; join it regardless.
        if self.handle.sender.send(Command::Stop).is_err() {
            warn!("[worker] thread exited before shutdown was requested");
        }
        let snapshot = self.thread.join().map_err(|_| PositioningError::WorkerPanicked)?;
        info!(
            "[worker] stopped after {} samples, {} fixes ({} dropped inputs)",
            snapshot.samples,
            snapshot.fixes,
            self.handle.dropped()
        );
        Ok(snapshot)
    }
}

fn run(
    mut pipeline: PositioningPipeline,
    inputs: Receiver<Command>,
    snapshots: Sender<PipelineSnapshot>,
) -> PipelineSnapshot {
    for command in inputs.iter() {
        let result = match command {
            Command::Input(WorkerInput::Acceleration(sample)) => {
                pipeline.on_acceleration(sample).map(|_| ())
            }
            Command::Input(WorkerInput::PositionFix(fix)) => pipeline.on_position_fix(fix).map(|_| ()),
            Command::Stop => break,
        };
        if let Err(e) = result {
            debug!("[worker] input rejected: {}", e);
        }

        // A full or disconnected consumer just misses this snapshot.
        let _ = snapshots.try_send(pipeline.snapshot());
    }
    pipeline.snapshot()
}
