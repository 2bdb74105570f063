use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::pipeline::{Engine, PageReport};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running { done: usize, total: usize },
    Completed { pages: Vec<PageReport> },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: String,
    pub inputs: Vec<PathBuf>,
    pub out_dir: PathBuf,
}

#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("job '{0}' is already queued or running")]
    AlreadyActive(String),

    #[error("job worker has stopped")]
    WorkerStopped,
}

type StatusMap = Arc<Mutex<HashMap<String, JobStatus>>>;

/// Runs batch jobs one at a time on a background worker.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<BatchJob>,
    statuses: StatusMap,
}

impl JobQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(engine: Arc<Engine>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BatchJob>();
        let statuses: StatusMap = Arc::new(Mutex::new(HashMap::new()));
        let worker_statuses = statuses.clone();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                run_job(&engine, &worker_statuses, job).await;
            }
        });
        Self { sender, statuses }
    }

    /// Queues a job unless one with the same id is still queued or running.
    pub fn submit(&self, job: BatchJob) -> Result<(), SubmitError> {
        let id = job.id.clone();
        {
            let mut statuses = lock(&self.statuses);
            if statuses.get(&id).is_some_and(JobStatus::is_active) {
                return Err(SubmitError::AlreadyActive(id));
            }
            statuses.insert(id.clone(), JobStatus::Queued);
        }
        if self.sender.send(job).is_err() {
            set_status(
                &self.statuses,
                &id,
                JobStatus::Failed {
                    error: SubmitError::WorkerStopped.to_string(),
                },
            );
            return Err(SubmitError::WorkerStopped);
        }
        info!("queued job {}", id);
        Ok(())
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        lock(&self.statuses).get(id).cloned()
    }

    /// Polls until the job leaves the queue. `None` for unknown ids.
    pub async fn wait(&self, id: &str) -> Option<JobStatus> {
        loop {
            let status = self.status(id)?;
            if !status.is_active() {
                return Some(status);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

async fn run_job(engine: &Engine, statuses: &StatusMap, job: BatchJob) {
    let total = job.inputs.len();
    set_status(statuses, &job.id, JobStatus::Running { done: 0, total });

    if let Err(err) = std::fs::create_dir_all(&job.out_dir) {
        let error = format!(
            "failed to create output directory {}: {}",
            job.out_dir.display(),
            err
        );
        warn!("job {}: {}", job.id, error);
        set_status(statuses, &job.id, JobStatus::Failed { error });
        return;
    }

    let progress_statuses = statuses.clone();
    let progress_id = job.id.clone();
    let pages = engine
        .process_batch(&job.inputs, &job.out_dir, move |done, total| {
            set_status(
                &progress_statuses,
                &progress_id,
                JobStatus::Running { done, total },
            );
        })
        .await;

    let failed = pages.iter().filter(|page| !page.is_ok()).count();
    info!("job {} finished: {} pages, {} failed", job.id, total, failed);
    set_status(statuses, &job.id, JobStatus::Completed { pages });
}

fn set_status(statuses: &StatusMap, id: &str, status: JobStatus) {
    lock(statuses).insert(id.to_string(), status);
}

fn lock(statuses: &StatusMap) -> std::sync::MutexGuard<'_, HashMap<String, JobStatus>> {
    statuses.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::BubbleRecord;
    use crate::detect::Detector;
    use crate::font::Typeface;
    use crate::test_util::FixedMetrics;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::path::Path;

    struct OneBubble;

    impl Detector for OneBubble {
        fn detect(&self, _path: &Path, _image: &DynamicImage) -> anyhow::Result<Vec<BubbleRecord>> {
            let mut record = BubbleRecord::new([2, 2, 30, 30]);
            record.text = Some("あ".to_string());
            Ok(vec![record])
        }
    }

    fn queue() -> JobQueue {
        let engine = Engine::new(Box::new(OneBubble), Typeface::with_measure(FixedMetrics));
        JobQueue::start(Arc::new(engine))
    }

    fn job(id: &str, inputs: Vec<PathBuf>, out_dir: PathBuf) -> BatchJob {
        BatchJob {
            id: id.to_string(),
            inputs,
            out_dir,
        }
    }

    #[tokio::test]
    async fn duplicate_active_job_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.png");
        RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]))
            .save(&page)
            .unwrap();
        let out_dir = dir.path().join("out");
        let queue = queue();

        queue
            .submit(job("chapter-1", vec![page.clone()], out_dir.clone()))
            .unwrap();
        assert_eq!(queue.status("chapter-1"), Some(JobStatus::Queued));
        assert_eq!(
            queue.submit(job("chapter-1", vec![page.clone()], out_dir.clone())),
            Err(SubmitError::AlreadyActive("chapter-1".to_string()))
        );

        let Some(JobStatus::Completed { pages }) = queue.wait("chapter-1").await else {
            panic!("job did not complete");
        };
        assert_eq!(pages.len(), 1);
        assert!(pages[0].is_ok());
        assert!(out_dir.join("page.png").exists());

        queue
            .submit(job("chapter-1", vec![page], out_dir))
            .unwrap();
    }

    #[tokio::test]
    async fn unusable_output_directory_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let queue = queue();
        queue
            .submit(job("broken", vec![], blocker.join("out")))
            .unwrap();
        assert!(matches!(
            queue.wait("broken").await,
            Some(JobStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_job_has_no_status() {
        let queue = queue();
        assert_eq!(queue.status("nope"), None);
        assert_eq!(queue.wait("nope").await, None);
    }
}
