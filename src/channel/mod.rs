//! Messaging channel adapters and the operator command loop.
//!
//! Channel-specific adapters are pluggable behind [`ChannelAdapter`]; the
//! command loop owns parsing and execution of operator commands.

pub mod telegram;
pub mod traits;

use crate::channel::traits::{ChannelAdapter, ChannelCommand};
use crate::commands::{Command, ControlSurface};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Inbound command queue depth.
const COMMAND_QUEUE_SIZE: usize = 32;

/// Run the operator command loop.
///
/// The adapter's poll loop is respawned with doubling backoff whenever it
/// stops or fails, so a transient channel outage does not take the command
/// surface down with it.
pub async fn run_command_loop(
    adapter: Arc<dyn ChannelAdapter>,
    surface: Arc<ControlSurface>,
) -> anyhow::Result<()> {
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<ChannelCommand>(COMMAND_QUEUE_SIZE);

    let poll_adapter = Arc::clone(&adapter);
    let poller = tokio::spawn(async move {
        let mut backoff_secs = 2u64;
        loop {
            match poll_adapter.run(inbound_tx.clone()).await {
                Ok(()) => {
                    warn!("channel {} poll loop stopped; restarting", poll_adapter.id());
                }
                Err(err) => {
                    warn!(
                        "channel {} poll loop failed: {err}; retrying in {backoff_secs}s",
                        poll_adapter.id()
                    );
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs.saturating_mul(2)).min(60);
        }
    });

    info!("command loop started on channel {}", adapter.id());

    while let Some(message) = inbound_rx.recv().await {
        let Some(command) = Command::parse(&message.text) else {
            continue;
        };
        info!("executing {command:?} from {}", message.sender);
        let reply = surface.execute(command).await;
        if let Err(err) = adapter.send_text(&message.reply_target, &reply).await {
            warn!("cannot send command reply: {err}");
        }
    }

    poller.abort();
    Ok(())
}
