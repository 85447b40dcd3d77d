use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use quotaguard_core::error::QuotaGuardError;
use quotaguard_core::fetcher::QuotaFetcher;
use quotaguard_types::{AccountCredentials, AccountId, QuotaInfo};

/// Scripted response for one [`MockFetcher`] call.
#[derive(Clone)]
pub enum FetchBehavior {
    /// Return this snapshot.
    Return(QuotaInfo),
    /// Fail with `QuotaGuardError::RateLimited { retry_after }`.
    RateLimited(Duration),
    /// Fail with `QuotaGuardError::AuthFailure`.
    AuthFailure(String),
    /// Fail with `QuotaGuardError::TransientFetchError`.
    Transient(String),
    /// Never resolve, to exercise the caller's own timeout.
    Hang,
}

/// Deterministic [`QuotaFetcher`] driven by per-account scripted behaviors,
/// in the manner of a connector that defers to an external controller
/// rather than hitting a real upstream.
#[derive(Default)]
pub struct MockFetcher {
    name: &'static str,
    rules: Mutex<HashMap<AccountId, Vec<FetchBehavior>>>,
    calls: Mutex<Vec<AccountId>>,
}

impl MockFetcher {
    /// Builds an empty mock fetcher; every account fails with
    /// `QuotaGuardError::TransientFetchError` until a rule is set.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a one-shot behavior for `account_id`. Behaviors for the same
    /// account are consumed in the order they were pushed; once exhausted,
    /// the last one pushed keeps repeating.
    pub fn push(&self, account_id: AccountId, behavior: FetchBehavior) {
        self.rules.lock().expect("mock fetcher rules poisoned").entry(account_id).or_default().push(behavior);
    }

    /// Number of times `fetch_quota` has been called, across all accounts.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock fetcher calls poisoned").len()
    }

    /// Accounts requested, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<AccountId> {
        self.calls.lock().expect("mock fetcher calls poisoned").clone()
    }
}

#[async_trait]
impl QuotaFetcher for MockFetcher {
    async fn fetch_quota(&self, account_id: &AccountId, _credentials: &AccountCredentials) -> Result<QuotaInfo, QuotaGuardError> {
        self.calls.lock().expect("mock fetcher calls poisoned").push(account_id.clone());

        let behavior = {
            let mut rules = self.rules.lock().expect("mock fetcher rules poisoned");
            match rules.get_mut(account_id) {
                Some(queue) if queue.len() > 1 => Some(queue.remove(0)),
                Some(queue) => queue.first().cloned(),
                None => None,
            }
        };

        match behavior {
            Some(FetchBehavior::Return(info)) => Ok(info),
            Some(FetchBehavior::RateLimited(retry_after)) => Err(QuotaGuardError::RateLimited { retry_after }),
            Some(FetchBehavior::AuthFailure(msg)) => Err(QuotaGuardError::AuthFailure {
                account_id: account_id.clone(),
                msg,
            }),
            Some(FetchBehavior::Transient(msg)) => Err(QuotaGuardError::TransientFetchError {
                account_id: account_id.clone(),
                msg,
            }),
            Some(FetchBehavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(QuotaGuardError::TransientFetchError {
                account_id: account_id.clone(),
                msg: "no rule configured".into(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
