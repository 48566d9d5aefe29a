//! Reconciliation of hybrid exchange operations.
//!
//! A hybrid exchange reports orders routed through pools as swaps. A swap
//! with no pool for its pair can only be filled from the book, so it is
//! reported as an [`OrderBookOrder`] instead. Order book matches are tied
//! back to the order (or recorded swap) they fill, decrementing its
//! unfilled amount once per match.

mod ledger;

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use serde::Deserialize;
use tracing::debug;

pub use ledger::*;

use crate::{
    analyzer::AnalyzerContext,
    num,
    types::{DomainOperation, OrderBookMatch, OrderBookOrder, OrderConversion, Swap},
};

/// How a match is tied to a recorded swap when it does not consume the
/// swap's output directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correlation {
    /// Receiver credentials and consumed transaction must both agree.
    #[default]
    Conjunctive,
    /// Either receiver credentials or consumed transaction agree.
    Disjunctive,
}

impl Correlation {
    fn correlates(&self, swap: &Swap, fill: &OrderBookMatch) -> bool {
        let same_owner = swap.sender.pub_key_hash.is_some()
            && swap.sender.pub_key_hash == fill.receiver.pub_key_hash;
        let same_tx = swap.location.tx_hash == fill.matched_order.tx_hash;
        match self {
            Correlation::Conjunctive => same_owner && same_tx,
            Correlation::Disjunctive => same_owner || same_tx,
        }
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::Conjunctive => f.write_str("conjunctive"),
            Correlation::Disjunctive => f.write_str("disjunctive"),
        }
    }
}

impl FromStr for Correlation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conjunctive" => Ok(Correlation::Conjunctive),
            "disjunctive" => Ok(Correlation::Disjunctive),
            _ => Err(format!("unknown correlation: {s}")),
        }
    }
}

/// Book order standing in for a swap that cannot be routed through a pool.
pub fn order_from_swap(swap: &Swap) -> OrderBookOrder {
    OrderBookOrder {
        dex: swap.dex,
        identifier: swap.location.output_ref().to_string(),
        location: swap.location.clone(),
        address: swap.address.clone(),
        sender: swap.sender.clone(),
        from_token: swap.swap_in_token.clone(),
        to_token: swap.swap_out_token.clone(),
        original_amount: swap.swap_in_amount,
        unfilled_amount: swap.swap_in_amount,
        to_amount: swap.min_receive,
        price: num::ratio(swap.swap_in_amount, swap.min_receive),
        partial_fills: 0,
        batcher_fee: swap.batcher_fee,
        deposit: swap.deposit,
    }
}

fn apply_fill(order: &mut OrderBookOrder, fill: &OrderBookMatch) {
    order.unfilled_amount = order.unfilled_amount.saturating_sub(fill.matched_amount);
    order.partial_fills += 1;
}

/// Reconciles the operations of hybrid exchanges against an [`OrderLedger`].
pub struct Reconciler {
    ledger: Arc<dyn OrderLedger>,
    correlation: Correlation,
}

impl Reconciler {
    pub fn new(ledger: Arc<dyn OrderLedger>, correlation: Correlation) -> Self {
        Self {
            ledger,
            correlation,
        }
    }

    pub fn in_memory(correlation: Correlation) -> Self {
        Self::new(Arc::new(MemoryOrderLedger::new()), correlation)
    }

    pub fn ledger(&self) -> &Arc<dyn OrderLedger> {
        &self.ledger
    }

    pub fn correlation(&self) -> Correlation {
        self.correlation
    }

    /// Reconciles the operations of a single transaction, in order.
    ///
    /// Matches are applied before the transaction's statuses close the
    /// orders they consume.
    pub fn reconcile(
        &self,
        ctx: &AnalyzerContext,
        operations: Vec<DomainOperation>,
    ) -> Vec<DomainOperation> {
        let mut matched: HashMap<usize, Vec<DomainOperation>> = operations
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                DomainOperation::OrderBookMatch(fill) => Some((i, self.apply_match(fill))),
                _ => None,
            })
            .collect();

        let mut reconciled = Vec::with_capacity(operations.len());
        for (i, op) in operations.into_iter().enumerate() {
            if let Some(ops) = matched.remove(&i) {
                reconciled.extend(ops);
                continue;
            }
            reconciled.push(self.apply(ctx, op));
        }
        reconciled
    }

    fn apply(&self, ctx: &AnalyzerContext, op: DomainOperation) -> DomainOperation {
        match op {
            DomainOperation::Swap(swap) => {
                let routable = swap.pool_identifier.is_some()
                    || ctx
                        .liquidity_pool_from_pair(swap.dex, &swap.swap_in_token, &swap.swap_out_token)
                        .is_some();
                if routable {
                    self.ledger.save_swap(&swap);
                    return DomainOperation::Swap(swap);
                }
                let order = order_from_swap(&swap);
                debug!(dex = %swap.dex, order = %order.identifier, "swap without pool rests on the book");
                self.ledger.save_order(&order);
                DomainOperation::OrderBookOrder(order)
            }
            DomainOperation::OrderBookOrder(order) => {
                self.ledger.save_order(&order);
                DomainOperation::OrderBookOrder(order)
            }
            DomainOperation::OperationStatus(status) => {
                self.ledger.remove_swap(&status.closes);
                self.ledger.remove_order(&status.closes);
                DomainOperation::OperationStatus(status)
            }
            op => op,
        }
    }

    /// Operations reported for `fill`: the match itself, preceded by the
    /// conversion of the swap it fills when there is one.
    fn apply_match(&self, fill: &OrderBookMatch) -> Vec<DomainOperation> {
        let passthrough = vec![DomainOperation::OrderBookMatch(fill.clone())];
        let key = fill.key();

        if let Some(mut order) = self.ledger.order_at(&fill.matched_order) {
            if !self.ledger.mark_applied(&fill.matched_order, &key) {
                debug!(dex = %fill.dex, %key, "match already applied");
                return passthrough;
            }
            apply_fill(&mut order, fill);
            self.ledger.save_order(&order);
            return passthrough;
        }

        let swap = self.ledger.swap(&fill.matched_order).or_else(|| {
            self.ledger
                .swaps(fill.dex)
                .into_iter()
                .find(|swap| self.correlation.correlates(swap, fill))
        });
        let Some(swap) = swap else {
            return passthrough;
        };

        let replaced = swap.location.output_ref();
        self.ledger.remove_swap(&replaced);
        let mut order = order_from_swap(&swap);
        apply_fill(&mut order, fill);
        self.ledger.save_order(&order);
        self.ledger.mark_applied(&replaced, &key);
        debug!(dex = %fill.dex, %replaced, "swap converted by match");
        vec![
            DomainOperation::OrderConversion(OrderConversion { replaced, order }),
            DomainOperation::OrderBookMatch(fill.clone()),
        ]
    }
}
