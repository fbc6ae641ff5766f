// src/logging.rs
//
// Step-level event sinks for training runs. The training loop logs
// through `dyn EventSink`; swapping the sink never changes learning.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::types::Transition;

/// Receives one event per environment step.
pub trait EventSink {
    fn log_step(&mut self, episode: u64, step: u64, transition: &Transition);
}

/// Discards everything. The default sink for training runs.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_step(&mut self, _episode: u64, _step: u64, _transition: &Transition) {}
}

#[derive(Serialize)]
struct StepRecord<'a> {
    episode: u64,
    step: u64,
    action: usize,
    reward: f64,
    done: bool,
    observation: &'a [f64],
}

/// Appends one JSON line per step to a file.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl EventSink for FileSink {
    fn log_step(&mut self, episode: u64, step: u64, transition: &Transition) {
        let record = StepRecord {
            episode,
            step,
            action: transition.action,
            reward: transition.reward,
            done: transition.done,
            observation: transition.next_state.values(),
        };
        // Logging failures must not abort training.
        if serde_json::to_writer(&mut self.writer, &record).is_ok() {
            let _ = self.writer.write_all(b"\n");
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
