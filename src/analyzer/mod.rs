//! Analyzer contract.
//!
//! Every supported exchange implements either [`AmmAnalyzer`] (pool states and
//! pool orders) or [`HybridAnalyzer`] (order book, optionally backed by pools).
//! [`ExchangeAnalyzer`] wraps both and implements the shared part of
//! transaction analysis: start slot and address pre-filtering, order
//! completion and cancellation, and classification of failures.
//!
//! Analysis is pure apart from read-only [`AnalyzerContext`] lookups, so
//! analyzing the same transaction twice yields the same result.

mod config;
mod context;
pub mod helpers;

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

pub use config::*;
pub use context::*;

use crate::{
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Deposit, Dex, DomainOperation, LiquidityPoolState, OrderBookMatch, OrderBookOrder,
        Swap, Transaction, Withdraw, Zap,
    },
};

/// Failure to extract a single operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    /// Output the operation would have been extracted from.
    pub output_index: Option<u32>,
    pub error: AnalyzerError,
}

pub type Extracted<T> = Result<T, Failure>;

/// Pool based exchange.
pub trait AmmAnalyzer: Send + Sync {
    fn config(&self) -> &ExchangeConfig;

    fn validate(&self) -> AnalyzerResult<()> {
        self.config().validate()
    }

    fn liquidity_pool_states(&self, tx: &Transaction) -> Vec<Extracted<LiquidityPoolState>>;

    fn swap_orders(&self, ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Swap>>;

    fn deposit_orders(&self, _ctx: &AnalyzerContext, _tx: &Transaction) -> Vec<Extracted<Deposit>> {
        vec![]
    }

    fn withdraw_orders(
        &self,
        _ctx: &AnalyzerContext,
        _tx: &Transaction,
    ) -> Vec<Extracted<Withdraw>> {
        vec![]
    }

    fn zap_orders(&self, _ctx: &AnalyzerContext, _tx: &Transaction) -> Vec<Extracted<Zap>> {
        vec![]
    }
}

/// Order book exchange, optionally routing orders through pools.
pub trait HybridAnalyzer: Send + Sync {
    fn config(&self) -> &ExchangeConfig;

    fn validate(&self) -> AnalyzerResult<()> {
        self.config().validate()
    }

    /// Pool side of the exchange, if any.
    fn amm(&self) -> Option<&dyn AmmAnalyzer> {
        None
    }

    fn order_book_orders(
        &self,
        ctx: &AnalyzerContext,
        tx: &Transaction,
    ) -> Vec<Extracted<OrderBookOrder>>;

    fn order_book_matches(
        &self,
        ctx: &AnalyzerContext,
        tx: &Transaction,
    ) -> Vec<Extracted<OrderBookMatch>>;
}

/// Operations extracted from a transaction together with the failures of
/// the operations that could not be extracted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Analysis {
    pub operations: Vec<DomainOperation>,
    pub failures: Vec<Failure>,
}

impl Analysis {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.failures.is_empty()
    }

    pub fn has_retryable(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_retryable())
    }

    /// Outputs whose operations are waiting for an unresolved reference.
    pub fn deferred_outputs(&self) -> BTreeSet<u32> {
        self.failures
            .iter()
            .filter(|f| f.error.is_retryable())
            .filter_map(|f| f.output_index)
            .collect()
    }

    /// Folds in a re-analysis of the same transaction, taking the operations
    /// of previously deferred outputs from `retried`.
    pub fn merge_retry(&mut self, retried: Analysis) {
        let deferred = self.deferred_outputs();
        self.operations.extend(
            retried
                .operations
                .into_iter()
                .filter(|op| op.source_output().is_some_and(|i| deferred.contains(&i))),
        );
        self.failures.retain(|f| !f.error.is_retryable());
        self.failures.extend(
            retried
                .failures
                .into_iter()
                .filter(|f| f.error.is_retryable()),
        );
    }

    fn absorb<T: Into<DomainOperation>>(&mut self, dex: Dex, tx: &Transaction, items: Vec<Extracted<T>>) {
        for item in items {
            match item {
                Ok(op) => self.operations.push(op.into()),
                Err(Failure { output_index, error }) if error.is_mismatch() => {
                    debug!(%dex, tx = %tx.hash, ?output_index, %error, "output is not an operation");
                }
                Err(failure) if failure.error.is_retryable() => {
                    debug!(%dex, tx = %tx.hash, output_index = ?failure.output_index, error = %failure.error, "operation deferred");
                    self.failures.push(failure);
                }
                Err(failure) => {
                    warn!(%dex, tx = %tx.hash, output_index = ?failure.output_index, error = %failure.error, "operation skipped");
                    self.failures.push(failure);
                }
            }
        }
    }

    /// A closed order is reported once, however many rules closed it.
    fn finish(mut self) -> Self {
        let mut closed = HashSet::new();
        self.operations.retain(|op| match op {
            DomainOperation::OperationStatus(s) => closed.insert((s.closes.clone(), s.status)),
            _ => true,
        });
        self
    }
}

/// Analyzer of a single exchange.
pub enum ExchangeAnalyzer {
    Amm(Box<dyn AmmAnalyzer>),
    Hybrid(Box<dyn HybridAnalyzer>),
}

impl ExchangeAnalyzer {
    pub fn config(&self) -> &ExchangeConfig {
        match self {
            ExchangeAnalyzer::Amm(amm) => amm.config(),
            ExchangeAnalyzer::Hybrid(hybrid) => hybrid.config(),
        }
    }

    pub fn dex(&self) -> Dex {
        self.config().dex
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self, ExchangeAnalyzer::Hybrid(_))
    }

    pub fn validate(&self) -> AnalyzerResult<()> {
        match self {
            ExchangeAnalyzer::Amm(amm) => amm.validate(),
            ExchangeAnalyzer::Hybrid(hybrid) => hybrid.validate(),
        }
    }

    /// Extracts the exchange's operations from `tx`.
    ///
    /// Unrelated transactions and outputs that do not decode as any known
    /// operation produce nothing.
    pub fn analyze_transaction(&self, ctx: &AnalyzerContext, tx: &Transaction) -> Analysis {
        let config = self.config();
        let dex = config.dex;
        let mut analysis = Analysis::default();
        if !config.is_active(tx.slot) || !config.touches(tx) {
            return analysis;
        }

        match self {
            ExchangeAnalyzer::Amm(amm) => analyze_amm(amm.as_ref(), ctx, tx, &mut analysis),
            ExchangeAnalyzer::Hybrid(hybrid) => {
                if let Some(amm) = hybrid.amm() {
                    analyze_amm(amm, ctx, tx, &mut analysis);
                }
                analysis.absorb(dex, tx, hybrid.order_book_orders(ctx, tx));
                let matches = hybrid.order_book_matches(ctx, tx);
                if matches.iter().any(Result::is_ok) {
                    analysis.absorb(
                        dex,
                        tx,
                        helpers::spent_operation_inputs(dex, tx, &config.order_addresses, &config.cancel),
                    );
                }
                analysis.absorb(dex, tx, matches);
            }
        }

        analysis.absorb(
            dex,
            tx,
            helpers::cancelled_operation_inputs(dex, tx, &config.order_addresses, &config.cancel),
        );
        analysis.finish()
    }
}

fn analyze_amm(amm: &dyn AmmAnalyzer, ctx: &AnalyzerContext, tx: &Transaction, analysis: &mut Analysis) {
    let config = amm.config();
    let dex = config.dex;
    let pools = amm.liquidity_pool_states(tx);
    if pools.iter().any(Result::is_ok) {
        analysis.absorb(
            dex,
            tx,
            helpers::spent_operation_inputs(dex, tx, &config.order_addresses, &config.cancel),
        );
    }
    analysis.absorb(dex, tx, pools);
    analysis.absorb(dex, tx, amm.swap_orders(ctx, tx));
    analysis.absorb(dex, tx, amm.deposit_orders(ctx, tx));
    analysis.absorb(dex, tx, amm.withdraw_orders(ctx, tx));
    analysis.absorb(dex, tx, amm.zap_orders(ctx, tx));
}
