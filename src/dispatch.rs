//! Dispatch orchestration: one end-to-end send attempt.
//!
//! A dispatch lists the pool, selects an unsent image, materializes it
//! locally, delivers it to the channel, and only then records it as sent.
//! At most one dispatch runs at a time; scheduled ticks and manual
//! send-now requests share this entry point.

use crate::channel::traits::ChannelAdapter;
use crate::history::HistoryStore;
use crate::pool::{FetchedImage, ImageSource};
use crate::selector;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Why a dispatch attempt produced no delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFailure {
    /// The pool source could not be listed.
    #[error("image pool unavailable: {0}")]
    PoolUnavailable(String),

    /// Every pool image is already in the history.
    #[error("all images in the pool have been sent")]
    Exhausted,

    /// The selected image could not be materialized locally.
    #[error("image fetch failed: {0}")]
    FetchFailed(String),

    /// The channel rejected the delivery.
    #[error("image delivery failed: {0}")]
    DeliveryFailed(String),

    /// Another dispatch is already in flight.
    #[error("another dispatch is already in progress")]
    Busy,
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An image was delivered and recorded.
    Sent { image: String },
    /// The attempt stopped without mutating the history.
    Failed(DispatchFailure),
}

/// Coordinates pool source, selector, channel, and history for one send
/// attempt at a time.
pub struct Dispatcher {
    source: Arc<dyn ImageSource>,
    channel: Arc<dyn ChannelAdapter>,
    history: Arc<Mutex<HistoryStore>>,
    chat_id: String,
    // Serializes dispatches: each one reads then mutates the history
    // without transactional isolation.
    in_flight: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn ImageSource>,
        channel: Arc<dyn ChannelAdapter>,
        history: Arc<Mutex<HistoryStore>>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            channel,
            history,
            chat_id: chat_id.into(),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one send attempt.
    ///
    /// A request arriving while another dispatch is in flight is rejected
    /// with [`DispatchFailure::Busy`] rather than queued; the next
    /// scheduled tick retries naturally.
    pub async fn dispatch(&self) -> DispatchOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return DispatchOutcome::Failed(DispatchFailure::Busy);
        };

        let pool = match self.source.list().await {
            Ok(pool) => pool,
            Err(err) => {
                return DispatchOutcome::Failed(DispatchFailure::PoolUnavailable(err.to_string()));
            }
        };

        let selected = {
            let history = self.lock_history();
            selector::select_unsent(&pool, &history, &mut rand::thread_rng())
        };
        let Some(image) = selected else {
            warn!("all {} pool images have been sent", pool.len());
            return DispatchOutcome::Failed(DispatchFailure::Exhausted);
        };

        let fetched = match self.source.fetch(&image).await {
            Ok(fetched) => fetched,
            Err(err) => {
                return DispatchOutcome::Failed(DispatchFailure::FetchFailed(err.to_string()));
            }
        };

        if let Err(err) = self.channel.send_image(&self.chat_id, &fetched.path).await {
            // The image stays out of the history, eligible for the next pick.
            Self::cleanup(&fetched);
            return DispatchOutcome::Failed(DispatchFailure::DeliveryFailed(err.to_string()));
        }

        // Recorded only after confirmed delivery. A failed write keeps the
        // in-memory set authoritative for this process run.
        if let Err(err) = self.lock_history().add(image.clone()) {
            warn!("cannot persist history after sending '{image}': {err}");
        }

        Self::cleanup(&fetched);
        info!("image sent: {image}");
        DispatchOutcome::Sent { image }
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, HistoryStore> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a temporary fetched copy, best-effort.
    fn cleanup(fetched: &FetchedImage) {
        if !fetched.temporary {
            return;
        }
        if let Err(err) = std::fs::remove_file(&fetched.path) {
            warn!(
                "cannot remove cached image '{}': {err}",
                fetched.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    struct StaticSource {
        pool: Vec<String>,
        listing_fails: bool,
        fetch_fails: bool,
        temp_dir: Option<PathBuf>,
    }

    impl StaticSource {
        fn with_pool(ids: &[&str]) -> Self {
            Self {
                pool: ids.iter().map(|id| (*id).to_owned()).collect(),
                listing_fails: false,
                fetch_fails: false,
                temp_dir: None,
            }
        }
    }

    #[async_trait]
    impl ImageSource for StaticSource {
        fn id(&self) -> &'static str {
            "static"
        }

        async fn list(&self) -> anyhow::Result<Vec<String>> {
            if self.listing_fails {
                anyhow::bail!("listing offline");
            }
            Ok(self.pool.clone())
        }

        async fn fetch(&self, id: &str) -> anyhow::Result<FetchedImage> {
            if self.fetch_fails {
                anyhow::bail!("fetch offline");
            }
            match &self.temp_dir {
                Some(dir) => {
                    let path = dir.join(id);
                    std::fs::write(&path, b"bytes")?;
                    Ok(FetchedImage {
                        path,
                        temporary: true,
                    })
                }
                None => Ok(FetchedImage {
                    path: PathBuf::from(id),
                    temporary: false,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        delivery_fails: AtomicBool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChannelAdapter for RecordingChannel {
        fn id(&self) -> &'static str {
            "recording"
        }

        async fn send_text(&self, _target: &str, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_image(&self, _target: &str, image: &Path) -> anyhow::Result<()> {
            if self.delivery_fails.load(Ordering::SeqCst) {
                anyhow::bail!("channel rejected the upload");
            }
            self.sent
                .lock()
                .unwrap()
                .push(image.to_string_lossy().into_owned());
            Ok(())
        }

        async fn run(
            &self,
            _inbound_tx: mpsc::Sender<crate::channel::traits::ChannelCommand>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    fn history_in(dir: &tempfile::TempDir) -> Arc<Mutex<HistoryStore>> {
        Arc::new(Mutex::new(HistoryStore::open(
            dir.path().join("history.json"),
        )))
    }

    fn dispatcher(
        source: StaticSource,
        channel: Arc<RecordingChannel>,
        history: Arc<Mutex<HistoryStore>>,
    ) -> Dispatcher {
        Dispatcher::new(Arc::new(source), channel, history, "@test_channel")
    }

    #[tokio::test]
    async fn successful_dispatch_records_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = dispatcher(
            StaticSource::with_pool(&["a.jpg"]),
            Arc::clone(&channel),
            Arc::clone(&history),
        );

        let outcome = dispatcher.dispatch().await;
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                image: "a.jpg".to_owned()
            }
        );
        assert!(history.lock().unwrap().contains("a.jpg"));
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delivery_failure_leaves_history_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        let channel = Arc::new(RecordingChannel::default());
        channel.delivery_fails.store(true, Ordering::SeqCst);
        let dispatcher = dispatcher(
            StaticSource::with_pool(&["a.jpg", "b.jpg"]),
            Arc::clone(&channel),
            Arc::clone(&history),
        );

        let outcome = dispatcher.dispatch().await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Failed(DispatchFailure::DeliveryFailed(_))
        ));
        assert!(history.lock().unwrap().is_empty());

        // The image stays eligible: with delivery fixed it goes through.
        channel.delivery_fails.store(false, Ordering::SeqCst);
        let outcome = dispatcher.dispatch().await;
        assert!(matches!(outcome, DispatchOutcome::Sent { .. }));
    }

    #[tokio::test]
    async fn unavailable_pool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = StaticSource::with_pool(&[]);
        source.listing_fails = true;
        let dispatcher = dispatcher(
            source,
            Arc::new(RecordingChannel::default()),
            history_in(&dir),
        );

        assert!(matches!(
            dispatcher.dispatch().await,
            DispatchOutcome::Failed(DispatchFailure::PoolUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_without_history_change() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        let mut source = StaticSource::with_pool(&["a.jpg"]);
        source.fetch_fails = true;
        let dispatcher = dispatcher(
            source,
            Arc::new(RecordingChannel::default()),
            Arc::clone(&history),
        );

        assert!(matches!(
            dispatcher.dispatch().await,
            DispatchOutcome::Failed(DispatchFailure::FetchFailed(_))
        ));
        assert!(history.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_pool_is_distinct_from_other_failures() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        history.lock().unwrap().add("a.jpg").unwrap();
        let dispatcher = dispatcher(
            StaticSource::with_pool(&["a.jpg"]),
            Arc::new(RecordingChannel::default()),
            history,
        );

        assert_eq!(
            dispatcher.dispatch().await,
            DispatchOutcome::Failed(DispatchFailure::Exhausted)
        );
    }

    #[tokio::test]
    async fn temporary_fetches_are_cleaned_up_after_sending() {
        let dir = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let mut source = StaticSource::with_pool(&["a.jpg"]);
        source.temp_dir = Some(cache.path().to_path_buf());
        let dispatcher = dispatcher(
            source,
            Arc::new(RecordingChannel::default()),
            history_in(&dir),
        );

        let outcome = dispatcher.dispatch().await;
        assert!(matches!(outcome, DispatchOutcome::Sent { .. }));
        assert!(!cache.path().join("a.jpg").exists());
    }

    #[tokio::test]
    async fn concurrent_dispatch_is_rejected_as_busy() {
        struct BlockingChannel {
            release: tokio::sync::Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
        }

        #[async_trait]
        impl ChannelAdapter for BlockingChannel {
            fn id(&self) -> &'static str {
                "blocking"
            }

            async fn send_text(&self, _target: &str, _text: &str) -> anyhow::Result<()> {
                Ok(())
            }

            async fn send_image(&self, _target: &str, _image: &Path) -> anyhow::Result<()> {
                if let Some(rx) = self.release.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(())
            }

            async fn run(
                &self,
                _inbound_tx: mpsc::Sender<crate::channel::traits::ChannelCommand>,
            ) -> anyhow::Result<()> {
                Ok(())
            }

            async fn health_check(&self) -> anyhow::Result<bool> {
                Ok(true)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel();
        let channel = Arc::new(BlockingChannel {
            release: tokio::sync::Mutex::new(Some(release_rx)),
        });
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(StaticSource::with_pool(&["a.jpg", "b.jpg"])),
            channel,
            history_in(&dir),
            "@test_channel",
        ));

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.dispatch().await })
        };
        // Let the first dispatch reach the blocked delivery call.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(
            dispatcher.dispatch().await,
            DispatchOutcome::Failed(DispatchFailure::Busy)
        );

        release_tx.send(()).unwrap();
        assert!(matches!(
            first.await.unwrap(),
            DispatchOutcome::Sent { .. }
        ));
    }
}
