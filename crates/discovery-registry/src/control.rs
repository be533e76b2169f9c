//! Background control loop shared by servers and clients
//!
//! Each instance owns exactly one loop. It waits on a shutdown signal, an
//! internal error channel and, optionally, a periodic timer, logging errors
//! as they arrive.

use crate::error::Error;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Producer side of an instance's error channel.
///
/// Reporting never blocks. Errors reported after the loop has exited are
/// dropped.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: async_channel::Sender<Error>,
}

impl ErrorSink {
    /// Queue an error for the control loop to log
    pub fn report(&self, err: Error) {
        if let Err(e) = self.tx.try_send(err) {
            debug!("Control loop gone, dropping error: {}", e.into_inner());
        }
    }
}

/// A control loop that has not been started yet.
///
/// The error channel exists from construction, so errors reported before
/// `spawn` are buffered and logged once the loop runs.
pub struct ControlLoop {
    name: String,
    sink: ErrorSink,
    errors: async_channel::Receiver<Error>,
    ticker: Option<(Duration, TickFn)>,
}

impl ControlLoop {
    /// Create a loop identified by `name` in log output
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, errors) = async_channel::unbounded();
        Self {
            name: name.into(),
            sink: ErrorSink { tx },
            errors,
            ticker: None,
        }
    }

    /// Call `on_tick` once per `period`, first after one full period
    pub fn with_ticker(mut self, period: Duration, on_tick: impl FnMut() + Send + 'static) -> Self {
        self.ticker = Some((period, Box::new(on_tick)));
        self
    }

    /// Handle for reporting errors into this loop
    pub fn sink(&self) -> ErrorSink {
        self.sink.clone()
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self) -> ControlHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(self.name, self.errors, self.ticker, shutdown_rx));

        ControlHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running control loop
pub struct ControlHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ControlHandle {
    /// Signal shutdown and wait until the loop has drained and exited
    pub async fn stop(self) {
        // The loop may already be gone; awaiting the task still settles it
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("Control loop task ended abnormally: {}", e);
        }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    name: String,
    errors: async_channel::Receiver<Error>,
    ticker: Option<(Duration, TickFn)>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let (mut interval, mut on_tick) = match ticker {
        Some((period, on_tick)) => {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (Some(interval), Some(on_tick))
        }
        None => (None, None),
    };

    info!("{}: control loop started", name);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                while let Ok(err) = errors.try_recv() {
                    error!("{}: {}", name, err);
                }
                info!("{}: shutdown", name);
                return;
            }
            Ok(err) = errors.recv() => {
                error!("{}: {}", name, err);
            }
            _ = next_tick(&mut interval) => {
                if let Some(on_tick) = on_tick.as_mut() {
                    on_tick();
                }
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
