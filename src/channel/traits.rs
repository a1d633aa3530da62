use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Inbound operator command received from the messaging channel.
#[derive(Debug, Clone)]
pub struct ChannelCommand {
    pub sender: String,
    pub reply_target: String,
    pub text: String,
}

/// Channel adapter contract. New channels only need to implement this trait.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable channel identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Send a text reply to the channel-specific target.
    async fn send_text(&self, target: &str, text: &str) -> anyhow::Result<()>;

    /// Deliver an image file to the channel-specific target.
    async fn send_image(&self, target: &str, image: &Path) -> anyhow::Result<()>;

    /// Start receiving operator commands and forwarding them to the loop.
    async fn run(&self, inbound_tx: mpsc::Sender<ChannelCommand>) -> anyhow::Result<()>;

    /// Best-effort health probe.
    async fn health_check(&self) -> anyhow::Result<bool>;
}
