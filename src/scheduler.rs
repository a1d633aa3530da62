//! Send scheduling: a repeating, cancellable timer gated to working hours.
//!
//! The timer period can be changed while the scheduler runs. A change is
//! picked up when the timer is re-armed, so a wait already in flight runs
//! to its original deadline; across rapid changes the latest value wins.

use crate::config::ScheduleConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{DripError, Result};
use chrono::Timelike;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Working-hours gate. Dispatches are allowed in `[start_hour, end_hour)`
/// local time; the window does not wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl WorkingHours {
    /// Validate the window invariant (`0 <= start < end <= 24`).
    pub fn new(start_hour: u8, end_hour: u8) -> Result<Self> {
        if start_hour > 23 || end_hour > 24 || start_hour >= end_hour {
            return Err(DripError::Scheduler(format!(
                "invalid working hours window {start_hour}:00-{end_hour}:00 \
                 (start must be before end)"
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    /// Whether a tick at `hour` may dispatch.
    #[must_use]
    pub fn is_open(&self, hour: u32) -> bool {
        u32::from(self.start_hour) <= hour && hour < u32::from(self.end_hour)
    }
}

/// Cloneable handle for adjusting the scheduler period at runtime.
#[derive(Debug, Clone)]
pub struct ScheduleControl {
    interval_ms: Arc<AtomicU64>,
}

impl ScheduleControl {
    /// Create a control holding `interval` as its current period.
    #[must_use]
    pub fn for_interval(interval: Duration) -> Self {
        let control = Self {
            interval_ms: Arc::new(AtomicU64::new(1)),
        };
        control.set_interval(interval);
        control
    }

    /// Set the period used for the next scheduling cycle. A wait already
    /// in flight is not interrupted; the latest value wins.
    pub fn set_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.interval_ms.store(ms.max(1), Ordering::Relaxed);
    }

    /// Current period.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }
}

/// Handle for a running scheduler.
pub struct SchedulerHandle {
    control: ScheduleControl,
    stop_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Period control, cloneable into the command surface.
    #[must_use]
    pub fn control(&self) -> ScheduleControl {
        self.control.clone()
    }

    /// Stop the scheduler. No further tick will invoke the send action; a
    /// dispatch already past the gate check runs to completion.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    /// Wait until the background task has fully exited.
    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}

/// Repeating send timer. Never tracks image identity; it only triggers
/// the dispatcher at eligible times.
pub struct SendScheduler {
    dispatcher: Arc<Dispatcher>,
    window: WorkingHours,
    warmup: Duration,
    interval: Duration,
}

impl SendScheduler {
    /// Create a scheduler from config. Fails when the working-hours window
    /// or interval is invalid; nothing is spawned in that case.
    pub fn new(dispatcher: Arc<Dispatcher>, config: &ScheduleConfig) -> Result<Self> {
        let window = WorkingHours::new(config.start_hour, config.end_hour)?;
        if config.interval_minutes == 0 {
            return Err(DripError::Scheduler(
                "interval must be greater than zero".to_owned(),
            ));
        }
        Ok(Self {
            dispatcher,
            window,
            warmup: config.warmup(),
            interval: config.interval(),
        })
    }

    /// Override the warm-up delay before the first tick.
    #[must_use]
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Override the initial period (the operator can still change it later).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the timer loop and return its handle.
    pub fn start(self) -> SchedulerHandle {
        let control = ScheduleControl::for_interval(self.interval);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let dispatcher = self.dispatcher;
        let window = self.window;
        let warmup = self.warmup;
        let loop_control = control.clone();

        let join = tokio::spawn(async move {
            info!(
                "scheduler started: every {}s between {}:00 and {}:00, first tick in {}s",
                loop_control.interval().as_secs(),
                window.start_hour,
                window.end_hour,
                warmup.as_secs()
            );

            // First tick after the warm-up delay, then every current interval.
            tokio::select! {
                () = tokio::time::sleep(warmup) => {}
                _ = &mut stop_rx => {
                    info!("scheduler stopped before first tick");
                    return;
                }
            }

            loop {
                let hour = chrono::Local::now().hour();
                if window.is_open(hour) {
                    // A failed send never stops future ticks.
                    match dispatcher.dispatch().await {
                        DispatchOutcome::Sent { image } => {
                            info!("scheduled send delivered {image}");
                        }
                        DispatchOutcome::Failed(reason) => {
                            warn!("scheduled send failed: {reason}");
                        }
                    }
                } else {
                    info!(
                        "outside working hours ({}:00-{}:00), skipping send",
                        window.start_hour, window.end_hour
                    );
                }

                // The period is sampled when the timer is armed; later
                // changes apply from the next cycle.
                let wait = loop_control.interval();
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    _ = &mut stop_rx => {
                        info!("scheduler stopped");
                        return;
                    }
                }
            }
        });

        SchedulerHandle {
            control,
            stop_tx: Some(stop_tx),
            join,
        }
    }
}
