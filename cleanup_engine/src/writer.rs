use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use anyhow::Context;
use cleanup_formats::{write_snapshot, EnvironmentInfo, SnapshotError};

use crate::error::SessionError;

/// One snapshot to persist. Owns its data so the caller never waits on I/O.
#[derive(Debug, Clone)]
pub struct WriteJob {
    pub info: EnvironmentInfo,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub result: Result<(), SnapshotError>,
}

enum Command {
    Write(WriteJob),
    Shutdown,
}

/// Writes environment snapshots on a background thread; outcomes come back
/// on a result channel the session drains each tick.
pub struct SnapshotWriter {
    sender: Sender<Command>,
    results: Receiver<WriteOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    pub fn spawn() -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("cleanup_snapshot".to_string())
            .spawn(move || worker_loop(rx, result_tx))
            .context("spawning snapshot writer thread")?;
        Ok(Self {
            sender: tx,
            results: result_rx,
            worker: Some(worker),
        })
    }

    pub fn submit(&self, job: WriteJob) -> Result<(), SessionError> {
        self.sender
            .send(Command::Write(job))
            .map_err(|_| SessionError::WriterDisconnected)
    }

    /// Outcomes finished since the last call, without blocking.
    pub fn drain_results(&self) -> Vec<WriteOutcome> {
        self.results.try_iter().collect()
    }

    /// Flushes every queued job, stops the worker and returns the remaining
    /// outcomes.
    pub fn finish(mut self) -> Vec<WriteOutcome> {
        self.shutdown();
        self.drain_results()
    }

    fn shutdown(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("snapshot writer thread panicked");
            }
        }
    }
}

/// Queued jobs still reach disk when the writer is dropped without `finish`.
impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Receiver<Command>, results: Sender<WriteOutcome>) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Write(job) => {
                let result = write_snapshot(&job.path, &job.info);
                match &result {
                    Ok(()) => log::info!("Save Environment info. path={}", job.path.display()),
                    Err(err) => log::error!("snapshot write failed: {err}"),
                }
                let outcome = WriteOutcome {
                    path: job.path,
                    result,
                };
                if results.send(outcome).is_err() {
                    break;
                }
            }
            Command::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleanup_formats::{read_snapshot, snapshot_path};
    use tempfile::tempdir;

    #[test]
    fn jobs_are_written_before_shutdown() {
        let dir = tempdir().expect("tempdir");
        let writer = SnapshotWriter::spawn().expect("writer thread");
        for trial in 1..=3 {
            writer
                .submit(WriteJob {
                    info: EnvironmentInfo::named(format!("Layout{trial}")),
                    path: snapshot_path(dir.path(), trial),
                })
                .expect("queued");
        }
        let outcomes = writer.finish();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|outcome| outcome.result.is_ok()));

        let second = read_snapshot(&snapshot_path(dir.path(), 2)).expect("written");
        assert_eq!(second.environment_name, "Layout2");
    }

    #[test]
    fn failures_come_back_on_the_result_channel() {
        let dir = tempdir().expect("tempdir");
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").expect("blocker file");

        let writer = SnapshotWriter::spawn().expect("writer thread");
        writer
            .submit(WriteJob {
                info: EnvironmentInfo::named("LayoutA"),
                path: blocker.join("EnvironmentInfo01.json"),
            })
            .expect("queued");
        let outcomes = writer.finish();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
    }

    #[test]
    fn dropping_the_writer_flushes_queued_jobs() {
        let dir = tempdir().expect("tempdir");
        let path = snapshot_path(dir.path(), 7);
        {
            let writer = SnapshotWriter::spawn().expect("writer thread");
            writer
                .submit(WriteJob {
                    info: EnvironmentInfo::named("LayoutB"),
                    path: path.clone(),
                })
                .expect("queued");
        }
        let written = read_snapshot(&path).expect("written before drop returned");
        assert_eq!(written.environment_name, "LayoutB");
    }
}
