//! The scheduler control loop
//!
//! The scheduler owns the [`QueueRegistry`] and is the only code touching
//! it. Connections talk to it through a [`SchedulerHandle`]; finished jobs
//! report back over an internal channel. A queue runs at most one job at a
//! time: it is stepped only while not busy, and the busy flag is cleared
//! when the dispatched job ends.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commands::{QueueCommand, QueueReply};
use crate::error::DaemonError;
use crate::job::{Job, JobId, JobOutcome, JobRunner};
use crate::registry::QueueRegistry;

/// Requests buffered between connections and the scheduler
const REQUEST_BUFFER: usize = 64;

/// A dispatched job and the queue generation it was stepped from
struct Running {
    handle: JoinHandle<()>,
    generation: Option<u64>,
}

/// A dispatched job that ended
#[derive(Debug)]
pub struct Finished {
    pub job: Job,
    pub outcome: JobOutcome,
}

pub struct Scheduler {
    registry: QueueRegistry<Job>,
    runner: Arc<dyn JobRunner>,
    next_id: u64,
    running: HashMap<JobId, Running>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            registry: QueueRegistry::new(),
            runner,
            next_id: 1,
            running: HashMap::new(),
            finished_tx,
            finished_rx,
        }
    }

    pub fn registry(&self) -> &QueueRegistry<Job> {
        &self.registry
    }

    /// Number of dispatched jobs that have not reported back
    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Queue `command`, or run it at once when `queue` is empty
    pub fn submit(&mut self, queue: &str, command: &str) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;

        let job = Job {
            id,
            queue: queue.to_string(),
            command: command.to_string(),
        };
        if job.is_immediate() {
            self.dispatch(job, None);
        } else {
            tracing::debug!("{} queued on '{}'", id, queue);
            self.registry.submit(queue, job);
            self.pump(queue);
        }
        id
    }

    /// Forget a queue and its waiting jobs
    pub fn remove(&mut self, queue: &str) {
        self.registry.remove(queue);
    }

    /// Release the job's queue and start the next waiting job
    pub fn job_finished(&mut self, finished: Finished) {
        let Finished { job, outcome } = finished;
        let generation = self.running.remove(&job.id).and_then(|running| running.generation);
        if !outcome.success() {
            tracing::warn!("{} ended with {:?}", job.id, outcome.code);
        }
        let Some(generation) = generation else {
            return;
        };
        // The queue may have been removed and created again meanwhile
        if self.registry.generation(&job.queue) != Some(generation) {
            tracing::debug!("{}: queue '{}' is gone", job.id, job.queue);
            return;
        }
        self.registry.set_busy(&job.queue, false);
        self.pump(&job.queue);
    }

    /// Wait for the next dispatched job to end
    pub async fn next_finished(&mut self) -> Option<Finished> {
        self.finished_rx.recv().await
    }

    /// Apply a queue command
    pub fn handle(&mut self, command: QueueCommand) -> QueueReply {
        match command {
            QueueCommand::Submit { queue, command } => QueueReply::Submitted(self.submit(&queue, &command)),
            QueueCommand::Remove { queue } => {
                self.remove(&queue);
                QueueReply::Removed
            }
            QueueCommand::IsBusy { queue } => QueueReply::Flag(self.registry.is_busy(&queue)),
            QueueCommand::HasNext { queue } => QueueReply::Flag(self.registry.has_next(&queue)),
            QueueCommand::Names => QueueReply::Names(self.registry.names_snapshot()),
        }
    }

    fn pump(&mut self, queue: &str) {
        if self.registry.is_busy(queue) || !self.registry.has_next(queue) {
            return;
        }
        self.registry.set_busy(queue, true);
        let generation = self.registry.generation(queue);
        if let Some(job) = self.registry.step(queue) {
            self.dispatch(job, generation);
        }
    }

    fn dispatch(&mut self, job: Job, generation: Option<u64>) {
        let id = job.id;
        let runner = Arc::clone(&self.runner);
        let finished_tx = self.finished_tx.clone();
        let handle = tokio::spawn(async move {
            let outcome = runner.run(&job).await;
            let _ = finished_tx.send(Finished { job, outcome });
        });
        self.running.insert(id, Running { handle, generation });
    }

    /// Serve requests until cancelled or every handle is dropped. Jobs
    /// still running at that point are aborted.
    pub async fn run(mut self, mut requests: mpsc::Receiver<SchedulerRequest>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    let reply = self.handle(request.command);
                    let _ = request.reply.send(reply);
                }
                Some(finished) = self.finished_rx.recv() => self.job_finished(finished),
            }
        }

        for (id, running) in self.running.drain() {
            tracing::info!("Aborting {}", id);
            running.handle.abort();
        }
    }
}

/// A command waiting for its reply
pub struct SchedulerRequest {
    pub command: QueueCommand,
    pub reply: oneshot::Sender<QueueReply>,
}

/// Cloneable access to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    requests: mpsc::Sender<SchedulerRequest>,
}

impl SchedulerHandle {
    pub async fn request(&self, command: QueueCommand) -> Result<QueueReply, DaemonError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(SchedulerRequest { command, reply })
            .await
            .map_err(|_| DaemonError::SchedulerGone)?;
        rx.await.map_err(|_| DaemonError::SchedulerGone)
    }
}

/// Start the scheduler loop on the current runtime
pub fn spawn_scheduler(runner: Arc<dyn JobRunner>, cancel: CancellationToken) -> (SchedulerHandle, JoinHandle<()>) {
    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_BUFFER);
    let scheduler = Scheduler::new(runner);
    let task = tokio::spawn(scheduler.run(requests_rx, cancel));
    (SchedulerHandle { requests: requests_tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Records what started and holds every job until released
    #[derive(Default)]
    struct Gate {
        started: Mutex<Vec<String>>,
        release: Notify,
    }

    impl Gate {
        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRunner for Gate {
        async fn run(&self, job: &Job) -> JobOutcome {
            self.started.lock().unwrap().push(job.command.clone());
            self.release.notified().await;
            JobOutcome { code: Some(0) }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_one_job_per_queue_at_a_time() {
        let gate = Arc::new(Gate::default());
        let mut scheduler = Scheduler::new(gate.clone());

        scheduler.submit("q", "J1");
        scheduler.submit("q", "J2");
        scheduler.submit("q", "J3");
        settle().await;

        assert_eq!(gate.started(), vec!["J1"]);
        assert!(scheduler.registry().is_busy("q"));
        assert_eq!(scheduler.running(), 1);

        for expected in [vec!["J1", "J2"], vec!["J1", "J2", "J3"]] {
            gate.release.notify_one();
            let finished = scheduler.next_finished().await.unwrap();
            scheduler.job_finished(finished);
            settle().await;
            assert_eq!(gate.started(), expected);
        }

        gate.release.notify_one();
        let finished = scheduler.next_finished().await.unwrap();
        assert_eq!(finished.job.command, "J3");
        scheduler.job_finished(finished);

        assert!(!scheduler.registry().is_busy("q"));
        assert!(!scheduler.registry().has_next("q"));
        assert_eq!(scheduler.running(), 0);
    }

    #[tokio::test]
    async fn test_queues_run_side_by_side() {
        let gate = Arc::new(Gate::default());
        let mut scheduler = Scheduler::new(gate.clone());

        scheduler.submit("a", "A1");
        scheduler.submit("b", "B1");
        scheduler.submit("", "now");
        settle().await;

        let mut started = gate.started();
        started.sort();
        assert_eq!(started, vec!["A1", "B1", "now"]);
        assert_eq!(scheduler.registry().names_snapshot(), "a,b");
    }

    #[tokio::test]
    async fn test_remove_keeps_running_job() {
        let gate = Arc::new(Gate::default());
        let mut scheduler = Scheduler::new(gate.clone());

        scheduler.submit("q", "J1");
        scheduler.submit("q", "J2");
        settle().await;
        scheduler.remove("q");

        assert_eq!(scheduler.running(), 1);
        gate.release.notify_one();
        let finished = scheduler.next_finished().await.unwrap();
        assert_eq!(finished.job.command, "J1");
        scheduler.job_finished(finished);
        settle().await;

        assert_eq!(gate.started(), vec!["J1"]);
        assert!(scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_finish_of_removed_queue_leaves_new_queue_busy() {
        let gate = Arc::new(Gate::default());
        let mut scheduler = Scheduler::new(gate.clone());

        scheduler.submit("q", "OLD");
        settle().await;
        scheduler.remove("q");
        scheduler.submit("q", "NEW1");
        scheduler.submit("q", "NEW2");
        settle().await;
        assert_eq!(gate.started(), vec!["OLD", "NEW1"]);

        gate.release.notify_one();
        let finished = scheduler.next_finished().await.unwrap();
        assert_eq!(finished.job.command, "OLD");
        scheduler.job_finished(finished);
        settle().await;

        assert_eq!(gate.started(), vec!["OLD", "NEW1"]);
        assert!(scheduler.registry().is_busy("q"));
        assert!(scheduler.registry().has_next("q"));
        assert_eq!(scheduler.running(), 1);

        gate.release.notify_one();
        let finished = scheduler.next_finished().await.unwrap();
        assert_eq!(finished.job.command, "NEW1");
        scheduler.job_finished(finished);
        settle().await;
        assert_eq!(gate.started(), vec!["OLD", "NEW1", "NEW2"]);
    }

    #[tokio::test]
    async fn test_handle_commands() {
        let gate = Arc::new(Gate::default());
        let mut scheduler = Scheduler::new(gate);

        let reply = scheduler.handle(QueueCommand::Submit {
            queue: "q".into(),
            command: "J1".into(),
        });
        assert_eq!(reply, QueueReply::Submitted(JobId(1)));
        scheduler.handle(QueueCommand::Submit {
            queue: "q".into(),
            command: "J2".into(),
        });

        assert_eq!(
            scheduler.handle(QueueCommand::IsBusy { queue: "q".into() }),
            QueueReply::Flag(true)
        );
        assert_eq!(
            scheduler.handle(QueueCommand::HasNext { queue: "q".into() }),
            QueueReply::Flag(true)
        );
        assert_eq!(
            scheduler.handle(QueueCommand::Names),
            QueueReply::Names("q".into())
        );
        assert_eq!(
            scheduler.handle(QueueCommand::Remove { queue: "q".into() }),
            QueueReply::Removed
        );
        assert_eq!(
            scheduler.handle(QueueCommand::HasNext { queue: "q".into() }),
            QueueReply::Flag(false)
        );
    }

    #[tokio::test]
    async fn test_handle_stops_with_scheduler() {
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_scheduler(Arc::new(Gate::default()), cancel.clone());

        let reply = handle.request(QueueCommand::Names).await.unwrap();
        assert_eq!(reply, QueueReply::Names(String::new()));

        cancel.cancel();
        task.await.unwrap();
        assert!(matches!(
            handle.request(QueueCommand::Names).await,
            Err(DaemonError::SchedulerGone)
        ));
    }
}
