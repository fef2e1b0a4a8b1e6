//! Fixed-interval background tasks with explicit start/stop.
//!
//! Each [`IntervalTask`] owns at most one running loop. The loop invokes the
//! action, waits `period`, and repeats until stopped. Errors and panics from
//! the action are logged and the loop carries on. Cancellation is cooperative:
//! the action receives the loop's token, and `stop()` waits until the loop
//! has actually exited.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Minimum spacing between "still running" log lines.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task '{0}' is already running")]
    AlreadyStarted(String),

    #[error("task '{0}' is not running")]
    NotRunning(String),
}

type Action = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct IntervalTask {
    name: String,
    period: Duration,
    heartbeat: Duration,
    action: Action,
    running: Option<Running>,
}

impl IntervalTask {
    pub fn new<F, Fut>(name: impl Into<String>, period: Duration, action: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            period,
            heartbeat: HEARTBEAT_INTERVAL,
            action: Arc::new(move |token| action(token).boxed()),
            running: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawn the tick loop on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.running.is_some() {
            return Err(SchedulerError::AlreadyStarted(self.name.clone()));
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.name.clone(),
            self.period,
            self.heartbeat,
            Arc::clone(&self.action),
            cancel.clone(),
        ));
        tracing::info!(task = %self.name, period_secs = self.period.as_secs_f64(), "task started");
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        let Some(running) = self.running.take() else {
            return Err(SchedulerError::NotRunning(self.name.clone()));
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(task = %self.name, error = %e, "task loop ended abnormally");
        }
        tracing::info!(task = %self.name, "task stopped");
        Ok(())
    }
}

impl Drop for IntervalTask {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(
    name: String,
    period: Duration,
    heartbeat: Duration,
    action: Action,
    cancel: CancellationToken,
) {
    let mut last_heartbeat = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match AssertUnwindSafe(action(cancel.clone())).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let error = format!("{e:#}");
                tracing::error!(task = %name, %error, "task tick failed");
            }
            Err(panic) => {
                tracing::error!(task = %name, panic = %panic_message(&panic), "task tick panicked")
            }
        }
        ticks += 1;

        if last_heartbeat.elapsed() >= heartbeat {
            tracing::info!(task = %name, ticks, "task alive");
            last_heartbeat = Instant::now();
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {}
        }
    }

    tracing::debug!(task = %name, ticks, "task loop exited");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
