//! Block driver: applies every analyzer to the transactions of a block, in
//! slot order, recording pools as they appear and reconciling the
//! operations of hybrid exchanges.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    analyzer::{Analysis, AnalyzerContext, ExchangeAnalyzer, Failure},
    error::IndexerError,
    reconcile::{Correlation, Reconciler},
    types::{Block, DomainOperation, SlotNo, Transaction, TxHash},
};

/// Exponential backoff applied while operations wait for an unresolved
/// pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Analyses of a transaction, the first one included.
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        let base_delay_ms = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    /// Single analysis, deferred operations are reported as failures.
    pub fn none() -> Self {
        Self::new(1, 1, 1)
    }

    /// Delay before the retry following `attempt` analyses.
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt.saturating_sub(1) as u32);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(exp)
                .min(self.max_delay_ms),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, 250, 5_000)
    }
}

/// Operations of a single transaction, in extraction order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransactionOperations {
    pub tx_hash: TxHash,
    pub slot: SlotNo,
    pub operations: Vec<DomainOperation>,
    /// Operations that could not be extracted, retries exhausted.
    #[serde(skip)]
    pub failures: Vec<Failure>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockOperations {
    pub slot: SlotNo,
    pub hash: String,
    pub transactions: Vec<TransactionOperations>,
}

impl BlockOperations {
    pub fn operations(&self) -> impl Iterator<Item = &DomainOperation> {
        self.transactions.iter().flat_map(|tx| tx.operations.iter())
    }
}

/// Applies the configured analyzers to blocks.
///
/// `sleep` is awaited between retries of a transaction with unresolved
/// references, `tokio::time::sleep` in production.
pub struct Indexer<S> {
    analyzers: Vec<ExchangeAnalyzer>,
    ctx: AnalyzerContext,
    reconciler: Reconciler,
    retry: RetryPolicy,
    sleep: S,
    /// Last applied slot, with its block hash when known.
    last_block: Option<(SlotNo, Option<String>)>,
}

impl<S> Indexer<S> {
    /// Fails with the first configuration defect of `analyzers`.
    pub fn new(analyzers: Vec<ExchangeAnalyzer>, sleep: S) -> Result<Self, IndexerError> {
        for analyzer in &analyzers {
            analyzer.validate()?;
        }
        Ok(Self {
            analyzers,
            ctx: AnalyzerContext::in_memory(),
            reconciler: Reconciler::in_memory(Correlation::default()),
            retry: RetryPolicy::default(),
            sleep,
            last_block: None,
        })
    }

    pub fn with_context(mut self, ctx: AnalyzerContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Treats blocks up to `slot` as already applied.
    ///
    /// Without `hash` any block at `slot` is skipped, with it a different
    /// block at `slot` is out of order.
    pub fn resume_after(mut self, slot: SlotNo, hash: Option<String>) -> Self {
        self.last_block = Some((slot, hash));
        self
    }

    pub fn context(&self) -> &AnalyzerContext {
        &self.ctx
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn last_slot(&self) -> Option<SlotNo> {
        self.last_block.as_ref().map(|(slot, _)| *slot)
    }

    /// Applies the next block.
    ///
    /// Returns `None` for a block at or before the last applied slot,
    /// a different block at the last applied slot is out of order.
    pub async fn apply_block<Fut>(
        &mut self,
        block: &Block,
    ) -> Result<Option<BlockOperations>, IndexerError>
    where
        S: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        if let Some((slot, hash)) = &self.last_block {
            if *slot == block.slot && hash.as_ref().is_some_and(|hash| *hash != block.hash) {
                return Err(IndexerError::BlockOutOfOrder(*slot, block.slot));
            }
            if *slot >= block.slot {
                // Block already applied
                return Ok(None);
            }
        }
        if let Some(tx) = block.transactions.iter().find(|tx| tx.slot != block.slot) {
            return Err(IndexerError::SlotMismatch(tx.hash.clone(), tx.slot, block.slot));
        }

        let mut transactions = vec![];
        for tx in &block.transactions {
            let applied = self.apply_transaction(tx).await;
            if !applied.operations.is_empty() || !applied.failures.is_empty() {
                transactions.push(applied);
            }
        }

        self.last_block = Some((block.slot, Some(block.hash.clone())));
        let applied = BlockOperations {
            slot: block.slot,
            hash: block.hash.clone(),
            transactions,
        };
        debug!(
            slot = applied.slot,
            transactions = applied.transactions.len(),
            operations = applied.operations().count(),
            "block applied"
        );
        Ok(Some(applied))
    }

    async fn apply_transaction<Fut>(&self, tx: &Transaction) -> TransactionOperations
    where
        S: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut applied = TransactionOperations {
            tx_hash: tx.hash.clone(),
            slot: tx.slot,
            operations: vec![],
            failures: vec![],
        };
        for analyzer in &self.analyzers {
            let analysis = self.analyze(analyzer, tx).await;
            let operations = if analyzer.is_hybrid() {
                self.reconciler.reconcile(&self.ctx, analysis.operations)
            } else {
                analysis.operations
            };
            applied.operations.extend(operations);
            applied.failures.extend(analysis.failures);
        }
        applied
    }

    async fn analyze<Fut>(&self, analyzer: &ExchangeAnalyzer, tx: &Transaction) -> Analysis
    where
        S: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        let dex = analyzer.dex();
        let mut analysis = analyzer.analyze_transaction(&self.ctx, tx);
        self.record_pools(&analysis);

        let mut attempt = 1;
        while analysis.has_retryable() && attempt < self.retry.max_attempts {
            let delay = self.retry.next_delay(attempt);
            debug!(%dex, tx = %tx.hash, attempt, ?delay, "retrying unresolved references");
            (self.sleep)(delay).await;
            analysis.merge_retry(analyzer.analyze_transaction(&self.ctx, tx));
            attempt += 1;
        }
        if analysis.has_retryable() {
            warn!(
                %dex,
                tx = %tx.hash,
                outputs = ?analysis.deferred_outputs(),
                "unresolved references after {attempt} attempts"
            );
        }
        analysis
    }

    fn record_pools(&self, analysis: &Analysis) {
        for op in &analysis.operations {
            if let DomainOperation::LiquidityPoolState(pool) = op {
                if self.ctx.liquidity_pool_from_identifier(pool.dex, &pool.identifier).is_err() {
                    info!(dex = %pool.dex, pool = %pool.identifier, "new liquidity pool");
                }
                self.ctx.record(pool);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_double_up_to_max() {
        let retry = RetryPolicy::new(5, 100, 300);
        assert_eq!(retry.next_delay(1), Duration::from_millis(100));
        assert_eq!(retry.next_delay(2), Duration::from_millis(200));
        assert_eq!(retry.next_delay(3), Duration::from_millis(300));
        assert_eq!(retry.next_delay(30), Duration::from_millis(300));
    }

    #[test]
    fn test_retry_policy_clamps() {
        let retry = RetryPolicy::new(0, 0, 0);
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.base_delay_ms, 1);
        assert_eq!(retry.max_delay_ms, 1);
    }
}
