use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::runtime::JarvisRuntime;

/// Background job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Memory retention sweep.
    Cleanup,
    /// Trend and optimization recomputation.
    Learning,
}

impl Job {
    /// Stable label used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Learning => "learning",
        }
    }

    /// Runs one cycle synchronously.
    pub fn run(self, runtime: &JarvisRuntime) {
        match self {
            Self::Cleanup => {
                let report = runtime.cleanup_expired();
                tracing::debug!(job = self.name(), ?report, "cycle finished");
            }
            Self::Learning => {
                runtime.recompute_learning();
                tracing::debug!(job = self.name(), "cycle finished");
            }
        }
    }

    fn period(self, runtime: &JarvisRuntime) -> Duration {
        let config = runtime.config().current();
        Duration::from_millis(match self {
            Self::Cleanup => config.memory.cleanup_interval_ms,
            Self::Learning => config.learning.interval_ms,
        })
    }
}

/// Spawns the cleanup and learning loops.
pub struct Scheduler;

impl Scheduler {
    /// Starts both jobs on the current tokio runtime. Periods are read
    /// from the configuration once, here. A cycle that is still running
    /// when the next tick fires causes that tick to be skipped.
    #[must_use]
    pub fn spawn(runtime: Arc<JarvisRuntime>) -> SchedulerHandle {
        let (shutdown, signal) = watch::channel(false);
        let tasks = [Job::Cleanup, Job::Learning]
            .into_iter()
            .map(|job| spawn_job(job, Arc::clone(&runtime), signal.clone()))
            .collect();
        SchedulerHandle { shutdown, tasks }
    }
}

/// Handle to the running jobs.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals every job to stop and waits for the loops to exit. A cycle
    /// already handed to the blocking pool still runs to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "scheduler task ended abnormally");
            }
        }
    }
}

/// Clears the single-flight flag when the cycle ends, panics included.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn spawn_job(
    job: Job,
    runtime: Arc<JarvisRuntime>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let busy = Arc::new(AtomicBool::new(false));
    let mut ticker = time::interval(job.period(&runtime));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::spawn(async move {
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if busy.swap(true, Ordering::AcqRel) {
                        tracing::debug!(job = job.name(), "previous cycle still running, tick skipped");
                        continue;
                    }
                    let runtime = Arc::clone(&runtime);
                    let guard = BusyGuard(Arc::clone(&busy));
                    tokio::task::spawn_blocking(move || {
                        let _guard = guard;
                        job.run(&runtime);
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_memory::{TestResult, TestStatus};
    use jarvis_model::{JarvisConfig, TestType};

    fn fast_runtime() -> Arc<JarvisRuntime> {
        let mut config = JarvisConfig::default();
        config.learning.interval_ms = 10;
        config.memory.cleanup_interval_ms = 10;
        Arc::new(JarvisRuntime::builder(config).build().unwrap())
    }

    #[test]
    fn jobs_run_synchronously() {
        let runtime = fast_runtime();
        Job::Learning.run(&runtime);
        Job::Cleanup.run(&runtime);
        assert_eq!(runtime.insights().cycle, 1);
        assert_eq!(Job::Cleanup.period(&runtime), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn panicking_cycle_releases_the_busy_flag() {
        let busy = Arc::new(AtomicBool::new(true));
        let guard = BusyGuard(Arc::clone(&busy));
        let joined = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            panic!("cycle blew up");
        })
        .await;
        assert!(joined.is_err());
        assert!(!busy.load(Ordering::Acquire));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn scheduled_learning_publishes_and_stops() {
        let runtime = fast_runtime();
        for idx in 0..12 {
            runtime.record_outcome(crate::Outcome::Result(TestResult::new(
                format!("r{idx}"),
                "user-service",
                TestType::UnitTest,
                TestStatus::Passed,
                1.0,
            )));
        }
        let handle = Scheduler::spawn(Arc::clone(&runtime));
        for _ in 0..100 {
            if !runtime.insights().trends.is_empty() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;
        let snapshot = runtime.insights();
        assert!(snapshot.cycle >= 1);
        assert!(snapshot
            .optimizations
            .iter()
            .any(|o| o.name == "parallel_fast_tests"));

        time::sleep(Duration::from_millis(50)).await;
        let settled = runtime.insights().cycle;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runtime.insights().cycle, settled);
    }
}
