use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{error, info};
use uuid::Uuid;

use crate::pipeline::{AnalysisRequest, AnalysisSource, Pipeline, RunOutcome};
use crate::state::{Delta, RunBoard};

/// Fire-and-forget execution of analysis runs on a small worker pool. Runs share nothing but
/// the delta channel.
pub struct Runner {
    pool: Option<rayon::ThreadPool>,
    pipeline: Arc<Pipeline>,
    tx: Sender<Delta>,
    cancel_flags: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl Runner {
    pub fn new(pipeline: Arc<Pipeline>, tx: Sender<Delta>) -> Self {
        Self::with_threads(pipeline, tx, run_parallelism())
    }

    pub fn with_threads(pipeline: Arc<Pipeline>, tx: Sender<Delta>, threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("pitchscope-run-{i}"))
            .build()
            .ok();
        Self {
            pool,
            pipeline,
            tx,
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Moves the run to Processing on `board` and queues it. Fails when the run is not in a
    /// startable state.
    pub fn start(
        &self,
        board: &mut RunBoard,
        request: AnalysisRequest,
        source: AnalysisSource,
    ) -> Result<()> {
        let id = request.analysis_id;
        board.begin(id)?;

        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .expect("cancel flags lock poisoned")
            .insert(id, flag.clone());

        let pipeline = self.pipeline.clone();
        let tx = self.tx.clone();
        let flags = self.cancel_flags.clone();
        let job = move || {
            let progress_tx = tx.clone();
            let sink = move |percent: u8, message: &str| {
                let _ = progress_tx.send(Delta::Progress {
                    id,
                    percent,
                    message: message.to_string(),
                });
            };
            let outcome = pipeline.run(&request, &source, &sink, &flag);
            let delta = match outcome {
                Ok(RunOutcome::Completed(result)) => Delta::Completed { id, result },
                Ok(RunOutcome::Cancelled) => Delta::Cancelled { id },
                Err(err) => {
                    let error = format!("{err:#}");
                    error!(analysis = %id, %error, "analysis failed");
                    Delta::Failed { id, error }
                }
            };
            let _ = tx.send(delta);
            let mut flags = flags.lock().expect("cancel flags lock poisoned");
            // A regenerated run under the same id may already own the slot.
            if flags.get(&id).is_some_and(|current| Arc::ptr_eq(current, &flag)) {
                flags.remove(&id);
            }
        };

        info!(analysis = %id, "queued analysis");
        if let Some(pool) = self.pool.as_ref() {
            pool.spawn(job);
        } else {
            std::thread::spawn(job);
        }
        Ok(())
    }

    /// Marks a Processing run Cancelled and asks its worker to stop at the next stage boundary.
    pub fn cancel(&self, board: &mut RunBoard, id: Uuid) -> bool {
        if !board.cancel(id) {
            return false;
        }
        if let Some(flag) = self
            .cancel_flags
            .lock()
            .expect("cancel flags lock poisoned")
            .get(&id)
        {
            flag.store(true, Ordering::SeqCst);
        }
        true
    }

    pub fn in_flight(&self) -> usize {
        self.cancel_flags
            .lock()
            .expect("cancel flags lock poisoned")
            .len()
    }
}

fn run_parallelism() -> usize {
    env::var("PITCHSCOPE_RUN_THREADS")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(2)
        .clamp(1, 16)
}
