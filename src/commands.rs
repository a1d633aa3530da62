//! Operator command surface.
//!
//! Commands arrive as slash-command text from the messaging channel and
//! are parsed into a closed enum, keeping display labels out of the logic.

use crate::dispatch::{DispatchFailure, DispatchOutcome, Dispatcher};
use crate::history::HistoryStore;
use crate::pool::ImageSource;
use crate::scheduler::ScheduleControl;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

const HELP_TEXT: &str = "Commands:\n\
/stats - delivery statistics\n\
/send_now - send one image immediately\n\
/set_interval <15|30|45|60> - change the send interval (minutes)\n\
/reset_history - forget which images were sent\n\
/help - this message\n\n\
Images are sent on a schedule during working hours and never repeat until \
the history is reset.";

/// Named interval durations the operator can choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalChoice {
    Minutes15,
    Minutes30,
    Minutes45,
    Hour,
}

impl IntervalChoice {
    /// All supported choices, for display.
    pub const ALL: [Self; 4] = [Self::Minutes15, Self::Minutes30, Self::Minutes45, Self::Hour];

    /// Parse the minute count used in `/set_interval <minutes>`.
    #[must_use]
    pub fn parse(arg: &str) -> Option<Self> {
        match arg {
            "15" => Some(Self::Minutes15),
            "30" => Some(Self::Minutes30),
            "45" => Some(Self::Minutes45),
            "60" => Some(Self::Hour),
            _ => None,
        }
    }

    /// Minutes this choice stands for.
    #[must_use]
    pub fn minutes(self) -> u64 {
        match self {
            Self::Minutes15 => 15,
            Self::Minutes30 => 30,
            Self::Minutes45 => 45,
            Self::Hour => 60,
        }
    }

    /// Scheduler period for this choice.
    #[must_use]
    pub fn duration(self) -> Duration {
        Duration::from_secs(self.minutes() * 60)
    }
}

/// Operator command, one variant per supported action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Stats,
    SendNow,
    ResetHistory,
    ShowIntervals,
    SetInterval(IntervalChoice),
}

impl Command {
    /// Parse a slash command. Returns `None` for anything else.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split_whitespace();
        let head = parts.next()?;
        // Commands may carry a bot mention suffix ("/stats@my_bot").
        let head = head.split('@').next().unwrap_or(head);
        match head {
            "/start" => Some(Self::Start),
            "/help" => Some(Self::Help),
            "/stats" => Some(Self::Stats),
            "/send_now" => Some(Self::SendNow),
            "/reset_history" => Some(Self::ResetHistory),
            "/set_interval" => match parts.next() {
                // An unknown argument falls back to showing the choices.
                Some(arg) => Some(
                    IntervalChoice::parse(arg).map_or(Self::ShowIntervals, Self::SetInterval),
                ),
                None => Some(Self::ShowIntervals),
            },
            _ => None,
        }
    }
}

/// Pool totals against the current history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Images currently in the pool.
    pub total: usize,
    /// Images recorded as sent.
    pub sent: usize,
    /// Pool images not yet sent.
    pub unsent: usize,
}

/// Executes operator commands against the running service.
pub struct ControlSurface {
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn ImageSource>,
    history: Arc<Mutex<HistoryStore>>,
    schedule: ScheduleControl,
}

impl ControlSurface {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        source: Arc<dyn ImageSource>,
        history: Arc<Mutex<HistoryStore>>,
        schedule: ScheduleControl,
    ) -> Self {
        Self {
            dispatcher,
            source,
            history,
            schedule,
        }
    }

    /// Execute a command and render the reply text.
    pub async fn execute(&self, command: Command) -> String {
        match command {
            Command::Start | Command::Help => HELP_TEXT.to_owned(),
            Command::Stats => self.stats_reply().await,
            Command::SendNow => match self.dispatcher.dispatch().await {
                DispatchOutcome::Sent { image } => {
                    format!("Image sent to the channel: {image}")
                }
                DispatchOutcome::Failed(DispatchFailure::Exhausted) => {
                    "No unsent images left. Use /reset_history to make the pool eligible again."
                        .to_owned()
                }
                DispatchOutcome::Failed(reason) => format!("Send failed: {reason}"),
            },
            Command::ResetHistory => {
                let result = self.lock_history().reset();
                match result {
                    Ok(cleared) => format!(
                        "History reset. {cleared} delivery records cleared; every image is \
                         eligible again."
                    ),
                    Err(err) => {
                        warn!("history reset did not persist: {err}");
                        "History cleared in memory, but saving the empty record failed; \
                         check the log."
                            .to_owned()
                    }
                }
            }
            Command::ShowIntervals => {
                let choices = IntervalChoice::ALL
                    .iter()
                    .map(|c| c.minutes().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "Current interval: {} minutes.\nUse /set_interval <minutes> with one of: {choices}.",
                    self.schedule.interval().as_secs() / 60
                )
            }
            Command::SetInterval(choice) => {
                self.schedule.set_interval(choice.duration());
                info!("send interval changed to {} minutes", choice.minutes());
                format!(
                    "Interval changed to {} minutes. The new period applies from the next \
                     scheduling cycle.",
                    choice.minutes()
                )
            }
        }
    }

    /// Pool totals against the current history.
    pub async fn pool_stats(&self) -> anyhow::Result<PoolStats> {
        let pool = self.source.list().await?;
        let history = self.lock_history();
        let unsent = pool
            .iter()
            .filter(|id| !history.contains(id.as_str()))
            .count();
        Ok(PoolStats {
            total: pool.len(),
            sent: history.len(),
            unsent,
        })
    }

    async fn stats_reply(&self) -> String {
        match self.pool_stats().await {
            Ok(stats) => {
                let mut reply = format!(
                    "Statistics:\n\nImages in pool: {}\nImages sent: {}\nUnsent remaining: {}",
                    stats.total, stats.sent, stats.unsent
                );
                if stats.total > 0 {
                    let percentage = (stats.sent as f64 / stats.total as f64) * 100.0;
                    reply.push_str(&format!("\nProgress: {percentage:.1}%"));
                }
                reply
            }
            Err(err) => format!("Cannot read the image pool: {err}"),
        }
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, HistoryStore> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
