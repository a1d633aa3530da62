//! picdrip: periodic non-repeating image delivery to a messaging channel.
//!
//! A pool of images (a local folder or a remote Drive-style folder) is
//! drained one image at a time into a Telegram channel on a repeating,
//! operator-adjustable schedule gated to working hours. Images never
//! repeat: every successful delivery is recorded in a durable history
//! set, and only the unsent remainder is eligible for selection.
//!
//! # Architecture
//!
//! Independent stages wired together by explicit dependency injection:
//! - **History store**: durable set of already-delivered image ids
//! - **Selector**: uniform random pick over the unsent remainder
//! - **Dispatcher**: select → fetch → deliver → record, one at a time
//! - **Scheduler**: warm-up + repeating timer with a working-hours gate
//! - **Pool sources**: local-folder or remote-folder adapters
//! - **Channel**: Telegram Bot API adapter + operator command loop

pub mod channel;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod pool;
pub mod scheduler;
pub mod selector;

pub use config::BotConfig;
pub use dispatch::{DispatchFailure, DispatchOutcome, Dispatcher};
pub use error::{DripError, Result};
pub use history::HistoryStore;
pub use scheduler::{ScheduleControl, SchedulerHandle, SendScheduler};
