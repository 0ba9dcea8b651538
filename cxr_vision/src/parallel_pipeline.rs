// THEORY:
// The `parallel_pipeline` exports many samples at once. Decoding a radiograph,
// augmenting it and re-encoding it as JPEG is CPU-bound and independent per sample,
// so the work is spread over a small worker pool:
//
// - a dispatcher hands incoming tasks to the workers round-robin,
// - each worker runs the blocking load/transform/encode on tokio's blocking pool,
// - every task carries a oneshot sender for its own result.
//
// Results are collected in index order. Because the dataset seeds every index
// independently, the exported images do not depend on which worker ran first.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::core_modules::dataset::RadiologyDataset;
use crate::error::{Error, Result};
use crate::pipeline::{export_sample, ExportSummary};

pub struct ExportTask {
    pub index: usize,
    pub save_dir: PathBuf,
    pub result_sender: oneshot::Sender<Result<ExportSummary>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ExportTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the dispatcher and `worker_count` workers. Must be called from within
    /// a tokio runtime.
    pub fn new(dataset: Arc<RadiologyDataset>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ExportTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<ExportTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    warn!(worker = worker_idx, "export worker stopped; dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_id, mut worker_receiver)| {
                let dataset = Arc::clone(&dataset);
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        debug!(worker = worker_id, index = task.index, "exporting sample");
                        let dataset = Arc::clone(&dataset);
                        let ExportTask {
                            index,
                            save_dir,
                            result_sender,
                        } = task;
                        let result = tokio::task::spawn_blocking(move || {
                            export_index(&dataset, index, &save_dir)
                        })
                        .await
                        .unwrap_or(Err(Error::Worker("export task panicked")));

                        // The caller may have stopped waiting; nothing to do then.
                        let _ = result_sender.send(result);
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            workers,
        }
    }

    pub async fn export(&self, index: usize, save_dir: PathBuf) -> Result<ExportSummary> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = ExportTask {
            index,
            save_dir,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| Error::Worker("Failed to send task to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| Error::Worker("Failed to receive result from worker"))?
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Closes the task queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for (worker_id, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                warn!(worker = worker_id, error = %e, "export worker ended abnormally");
            }
        }
    }
}

/// Loads one sample and exports it into `save_dir/<report file stem>/`.
pub fn export_index(dataset: &RadiologyDataset, index: usize, save_dir: &Path) -> Result<ExportSummary> {
    let stem = dataset
        .xml_files()
        .get(index)
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or(Error::IndexOutOfRange {
            index,
            len: dataset.len(),
        })?;

    let sample_dir = save_dir.join(stem);
    std::fs::create_dir_all(&sample_dir).map_err(|e| Error::io(&sample_dir, e))?;

    let sample = dataset.get(index)?;
    export_sample(
        &sample,
        &sample_dir,
        dataset.transform().and_then(|t| t.normalization()),
    )
}

/// Batch exporter over a shared dataset.
pub struct ParallelExporter {
    dataset: Arc<RadiologyDataset>,
    worker_pool: WorkerPool,
}

impl ParallelExporter {
    /// `workers == 0` means one worker per CPU.
    pub fn new(dataset: Arc<RadiologyDataset>, workers: usize) -> Self {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        let worker_pool = WorkerPool::new(Arc::clone(&dataset), workers);
        Self {
            dataset,
            worker_pool,
        }
    }

    pub fn dataset(&self) -> &RadiologyDataset {
        &self.dataset
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Exports every index in `range`; results come back in index order and the
    /// first failure aborts the batch. A start past the last report is an error.
    pub async fn export_range(&self, range: Range<usize>, save_dir: &Path) -> Result<Vec<ExportSummary>> {
        if range.start >= self.dataset.len() {
            return Err(Error::IndexOutOfRange {
                index: range.start,
                len: self.dataset.len(),
            });
        }
        if range.end > self.dataset.len() {
            return Err(Error::IndexOutOfRange {
                index: range.end.saturating_sub(1),
                len: self.dataset.len(),
            });
        }

        let count = range.len();
        let summaries = try_join_all(
            range.map(|index| self.worker_pool.export(index, save_dir.to_path_buf())),
        )
        .await?;

        info!(
            samples = count,
            workers = self.worker_count(),
            save_dir = %save_dir.display(),
            "exported sample batch"
        );
        Ok(summaries)
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
