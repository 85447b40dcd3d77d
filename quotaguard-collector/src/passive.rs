use std::collections::HashMap;
use std::sync::Arc;

use quotaguard_core::{QuotaGuardError, SharedStore};
use quotaguard_types::{AccountId, PassiveCollectorConfig, Provider, QuotaInfo};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Raw vendor header bag for one ingest call.
pub type HeaderBag = HashMap<String, String>;

/// Parses a vendor-specific header bag into a [`QuotaInfo`].
///
/// One adapter per provider, registered in [`PassiveCollector`] the way the
/// teacher's router registers one capability trait implementation per
/// connector; here the "capability" is "what header shape this adapter
/// recognizes" rather than an asset class.
pub trait HeaderAdapter: Send + Sync {
    /// The provider this adapter parses headers for.
    fn provider(&self) -> Provider;

    /// Attempts to parse `headers` into a fresh snapshot for `account_id`.
    /// Returns `None` if the headers don't match this adapter's expected shape.
    fn parse(&self, account_id: &AccountId, headers: &HeaderBag) -> Option<QuotaInfo>;
}

struct IngestMessage {
    account_id: AccountId,
    provider: Option<Provider>,
    headers: HeaderBag,
}

/// Buffered ingestion of caller-submitted quota snapshots.
///
/// `ingest` is O(1) (a `try_send` on a bounded channel); a flusher task
/// drains whatever is buffered to the `Store` at `flush_period`. There are
/// no retries here — per the spec, the sender is authoritative.
pub struct PassiveCollector {
    tx: mpsc::Sender<IngestMessage>,
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<IngestMessage>>>,
    adapters: RwLock<Vec<Arc<dyn HeaderAdapter>>>,
    config: PassiveCollectorConfig,
}

impl PassiveCollector {
    /// Builds a passive collector with an empty adapter registry.
    #[must_use]
    pub fn new(config: PassiveCollectorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            adapters: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Registers a header adapter; later registrations are preferred when
    /// more than one adapter claims to recognize the same headers during
    /// auto-detection (last-registered-wins is not relied upon — the first
    /// match found while scanning in registration order is used).
    pub async fn register_adapter(&self, adapter: Arc<dyn HeaderAdapter>) {
        self.adapters.write().await.push(adapter);
    }

    /// Enqueues a snapshot for later flushing, parsed from `headers` by the
    /// adapter for `provider` if given, or by scanning all registered
    /// adapters for the first that recognizes the header shape.
    ///
    /// Non-blocking; fails with `QueueFull` once the bounded buffer is at
    /// capacity.
    pub fn ingest(
        &self,
        account_id: AccountId,
        provider: Option<Provider>,
        headers: HeaderBag,
    ) -> Result<(), QuotaGuardError> {
        self.tx
            .try_send(IngestMessage {
                account_id,
                provider,
                headers,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => QuotaGuardError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => {
                    QuotaGuardError::Other("passive ingest channel closed".to_owned())
                }
            })
    }

    async fn parse_message(&self, msg: &IngestMessage) -> Option<QuotaInfo> {
        let adapters = self.adapters.read().await;
        if let Some(provider) = &msg.provider {
            if let Some(adapter) = adapters.iter().find(|a| &a.provider() == provider) {
                return adapter.parse(&msg.account_id, &msg.headers);
            }
        }
        adapters.iter().find_map(|a| a.parse(&msg.account_id, &msg.headers))
    }

    /// Spawns the flusher task: on each `flush_period` tick, drains up to
    /// `flush_batch_max` buffered messages and writes each parsed snapshot
    /// to `store`.
    pub fn spawn_flusher(self: Arc<Self>, store: SharedStore) -> FlusherHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let collector = Arc::clone(&self);
        let period = self.config.flush_period;
        let batch_max = self.config.flush_batch_max;
        let handle = tokio::spawn(async move {
            let mut rx = collector
                .rx
                .lock()
                .await
                .take()
                .expect("flusher spawned more than once");
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut drained = 0usize;
                        while drained < batch_max {
                            match rx.try_recv() {
                                Ok(msg) => {
                                    if let Some(quota) = collector.parse_message(&msg).await {
                                        store.set_quota(quota).await;
                                    }
                                    drained += 1;
                                }
                                Err(_) => break,
                            }
                        }
                    }
                }
            }
        });
        FlusherHandle { inner: Some(handle), token }
    }
}

/// Small extension so the flusher can call `Quotas::set` without importing
/// the whole `Store` supertrait bound at the call site.
#[async_trait::async_trait]
trait SetQuota {
    async fn set_quota(&self, quota: QuotaInfo);
}

#[async_trait::async_trait]
impl SetQuota for dyn quotaguard_core::Store {
    async fn set_quota(&self, quota: QuotaInfo) {
        quotaguard_core::Quotas::set(self, quota).await;
    }
}

/// Handle to the passive collector's flusher task.
#[derive(Debug)]
pub struct FlusherHandle {
    inner: Option<tokio::task::JoinHandle<()>>,
    token: CancellationToken,
}

impl FlusherHandle {
    /// Requests cooperative shutdown and awaits the flusher's completion.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }
}

impl Drop for FlusherHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotaguard_types::{DimensionType, QuotaSource, WindowSemantics};

    struct FixedAdapter(Provider);

    impl HeaderAdapter for FixedAdapter {
        fn provider(&self) -> Provider {
            self.0.clone()
        }

        fn parse(&self, account_id: &AccountId, headers: &HeaderBag) -> Option<QuotaInfo> {
            let remaining: i64 = headers.get("x-remaining")?.parse().ok()?;
            Some(QuotaInfo {
                account_id: account_id.clone(),
                provider: self.0.clone(),
                tier: "pro".into(),
                dimensions: vec![quotaguard_types::Dimension {
                    dimension_type: DimensionType::Requests,
                    limit: 100,
                    used: 100 - remaining,
                    remaining,
                    reset_at: None,
                    window_semantics: WindowSemantics::Unknown,
                    source: QuotaSource::Passive,
                    confidence: 0.9,
                }],
                effective_remaining_pct: remaining as f64,
                virtual_used_pct: 0.0,
                is_throttled: false,
                source: QuotaSource::Passive,
                confidence: 0.9,
                collected_at: chrono::Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn ingest_fails_with_queue_full_when_saturated() {
        let mut config = PassiveCollectorConfig::default();
        config.queue_capacity = 1;
        let collector = PassiveCollector::new(config);
        let mut headers = HeaderBag::new();
        headers.insert("x-remaining".into(), "10".into());
        assert!(collector
            .ingest(AccountId::new("a1"), None, headers.clone())
            .is_ok());
        let result = collector.ingest(AccountId::new("a2"), None, headers);
        assert!(matches!(result, Err(QuotaGuardError::QueueFull)));
    }

    #[tokio::test]
    async fn flusher_drains_and_writes_parsed_snapshots() {
        let mut config = PassiveCollectorConfig::default();
        config.flush_period = std::time::Duration::from_millis(10);
        let collector = Arc::new(PassiveCollector::new(config));
        collector
            .register_adapter(Arc::new(FixedAdapter(Provider::OpenAiCodex)))
            .await;
        let mut headers = HeaderBag::new();
        headers.insert("x-remaining".into(), "42".into());
        collector
            .ingest(AccountId::new("a1"), Some(Provider::OpenAiCodex), headers)
            .unwrap();

        let store: SharedStore = Arc::new(quotaguard_store::MemoryStore::new(
            quotaguard_types::StoreConfig::default(),
        ));
        let handle = Arc::clone(&collector).spawn_flusher(Arc::clone(&store));
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        handle.stop().await;

        let quota = quotaguard_core::Quotas::get(&*store, &AccountId::new("a1"))
            .await
            .expect("quota should have been flushed");
        assert!((quota.effective_remaining_pct - 42.0).abs() < 1e-9);
    }
}
