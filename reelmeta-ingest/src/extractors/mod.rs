//! Extraction strategies and the hybrid extractor
//!
//! # Strategies
//! 1. **youtube_page** - YouTube watch-page metadata (no quota)
//! 2. **youtube_api** - YouTube Data API (quota-governed)
//! 3. **oembed** - YouTube and TikTok oEmbed endpoints
//! 4. **open_graph** - Instagram and TikTok page metadata
//!
//! # Parallel Execution
//! Every strategy registered for a platform runs as its own task under its
//! own timeout. Failures are isolated: one strategy failing, timing out or
//! panicking never cancels its siblings. The merge runs after all of them
//! have settled.

pub mod oembed;
pub mod open_graph;
pub mod registry;
pub mod youtube_api;
pub mod youtube_page;

use crate::fusion::{merge, FieldPriorityTable};
use crate::types::{
    CanonicalRecord, ExtractionError, ExtractionFailed, ExtractionStrategy, PartialRecord, StrategyFailure,
};
use crate::url::ContentUrl;
use reelmeta_common::{FieldName, Platform};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-platform strategy registry with priority-table merge
///
/// Built once at startup and shared behind an `Arc`.
pub struct HybridExtractor {
    strategies: HashMap<Platform, Vec<Arc<dyn ExtractionStrategy>>>,
    priorities: HashMap<Platform, FieldPriorityTable>,
    strategy_timeout: Duration,
}

impl HybridExtractor {
    pub fn new(strategy_timeout: Duration) -> Self {
        Self {
            strategies: HashMap::new(),
            priorities: HashMap::new(),
            strategy_timeout,
        }
    }

    /// Register a strategy under its platform (registration order is the
    /// fallback priority)
    pub fn register(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        let platform = strategy.platform();
        self.table_mut(platform).push_strategy(strategy.id());
        debug!(strategy = strategy.id(), platform = %platform, "Registered extraction strategy");
        self.strategies.entry(platform).or_default().push(strategy);
    }

    /// Explicit priority for one field (highest first)
    pub fn set_field_priority(&mut self, platform: Platform, field: FieldName, order: &[&str]) {
        self.table_mut(platform).set_field_order(field, order);
    }

    fn table_mut(&mut self, platform: Platform) -> &mut FieldPriorityTable {
        self.priorities
            .entry(platform)
            .or_insert_with(|| FieldPriorityTable::new::<&str>(platform, &[]))
    }

    pub fn strategies_for(&self, platform: Platform) -> &[Arc<dyn ExtractionStrategy>] {
        self.strategies.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn priority_table(&self, platform: Platform) -> Option<&FieldPriorityTable> {
        self.priorities.get(&platform)
    }

    pub fn strategy_timeout(&self) -> Duration {
        self.strategy_timeout
    }

    /// Extract and merge metadata for one content URL
    pub async fn extract(&self, url: &str) -> Result<CanonicalRecord, ExtractionFailed> {
        self.extract_with_cancel(url, &CancellationToken::new()).await
    }

    /// [`Self::extract`] bounded by a caller-level deadline
    ///
    /// On expiry every in-flight strategy task is aborted. Quota already
    /// charged stays charged.
    pub async fn extract_with_deadline(&self, url: &str, deadline: Duration) -> Result<CanonicalRecord, ExtractionFailed> {
        match tokio::time::timeout(deadline, self.extract(url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url, deadline_ms = deadline.as_millis() as u64, "Extraction deadline expired");
                Err(ExtractionFailed::Cancelled { url: url.to_string() })
            }
        }
    }

    /// [`Self::extract`] that stops early when `cancel` fires
    pub async fn extract_with_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<CanonicalRecord, ExtractionFailed> {
        let content = ContentUrl::parse(url).ok_or_else(|| ExtractionFailed::UnsupportedUrl(url.to_string()))?;
        let platform = content.platform;

        let strategies = self.strategies_for(platform);
        if strategies.is_empty() {
            return Err(ExtractionFailed::NoStrategies(platform));
        }

        let outcomes = match self.run_all(strategies, &content.normalized, cancel).await {
            Some(outcomes) => outcomes,
            None => {
                info!(url = %content.normalized, "Extraction cancelled by caller");
                return Err(ExtractionFailed::Cancelled {
                    url: content.normalized.clone(),
                });
            }
        };

        let mut partials: Vec<PartialRecord> = Vec::new();
        let mut failures: Vec<StrategyFailure> = Vec::new();

        for (strategy, outcome) in strategies.iter().zip(outcomes) {
            match outcome {
                Ok(partial) => {
                    debug!(
                        strategy = strategy.id(),
                        fields = partial.field_count(),
                        latency_ms = partial.latency_ms(),
                        "Strategy succeeded"
                    );
                    partials.push(partial);
                }
                Err(e) => {
                    warn!(
                        strategy = strategy.id(),
                        url = %content.normalized,
                        error = %e,
                        "Strategy failed (per-strategy error isolation)"
                    );
                    failures.push(StrategyFailure::new(strategy.id(), &e));
                }
            }
        }

        if partials.is_empty() {
            return Err(ExtractionFailed::AllStrategiesFailed {
                url: content.normalized.clone(),
                causes: failures,
            });
        }

        let fallback;
        let table = match self.priorities.get(&platform) {
            Some(table) => table,
            None => {
                fallback = FieldPriorityTable::new::<&str>(platform, &[]);
                &fallback
            }
        };

        Ok(merge(
            &content.record_key(),
            platform,
            &content.normalized,
            &partials,
            failures,
            table,
        ))
    }

    /// Run every strategy to completion, returning outcomes in registration
    /// order. `None` when cancelled.
    async fn run_all(
        &self,
        strategies: &[Arc<dyn ExtractionStrategy>],
        url: &str,
        cancel: &CancellationToken,
    ) -> Option<Vec<Result<PartialRecord, ExtractionError>>> {
        let mut tasks = JoinSet::new();

        for (idx, strategy) in strategies.iter().enumerate() {
            let strategy = Arc::clone(strategy);
            let url = url.to_string();
            let timeout = self.strategy_timeout;

            tasks.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, strategy.extract(&url)).await {
                    Ok(result) => result.and_then(|partial| {
                        if partial.strategy_id() == strategy.id() {
                            Ok(partial)
                        } else {
                            Err(ExtractionError::Internal(format!(
                                "strategy returned record tagged {}",
                                partial.strategy_id()
                            )))
                        }
                    }),
                    Err(_) => Err(ExtractionError::Timeout(timeout.as_millis() as u64)),
                };
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<Result<PartialRecord, ExtractionError>>> =
            strategies.iter().map(|_| None).collect();
        let mut join_errors: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return None;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, outcome))) => slots[idx] = Some(outcome),
                    Some(Err(join_error)) => join_errors.push(join_error.to_string()),
                },
            }
        }

        // Tasks that panicked never reported their index
        let panic_message = if join_errors.is_empty() {
            "strategy task ended without a result".to_string()
        } else {
            format!("strategy task panicked: {}", join_errors.join("; "))
        };

        Some(
            slots
                .into_iter()
                .map(|slot| slot.unwrap_or_else(|| Err(ExtractionError::Internal(panic_message.clone()))))
                .collect(),
        )
    }
}
