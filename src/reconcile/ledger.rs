use std::collections::HashSet;

use dashmap::DashMap;

use crate::types::{Dex, OrderBookOrder, OutputRef, Swap};

/// Open swaps and order book orders of hybrid exchanges, keyed by the
/// output that carries them.
///
/// Applied matches are tracked per entry and forgotten with it.
pub trait OrderLedger: Send + Sync {
    fn swap(&self, at: &OutputRef) -> Option<Swap>;

    fn swaps(&self, dex: Dex) -> Vec<Swap>;

    fn save_swap(&self, swap: &Swap);

    fn remove_swap(&self, at: &OutputRef) -> Option<Swap>;

    fn order_at(&self, at: &OutputRef) -> Option<OrderBookOrder>;

    fn order(&self, dex: Dex, identifier: &str) -> Option<OrderBookOrder>;

    fn save_order(&self, order: &OrderBookOrder);

    fn remove_order(&self, at: &OutputRef) -> Option<OrderBookOrder>;

    /// Records that the match `key` was applied to the entry at `at`,
    /// `false` if it already was.
    fn mark_applied(&self, at: &OutputRef, key: &str) -> bool;
}

/// [`OrderLedger`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryOrderLedger {
    swaps: DashMap<OutputRef, Swap>,
    orders: DashMap<OutputRef, OrderBookOrder>,
    applied: DashMap<OutputRef, HashSet<String>>,
}

impl MemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swap_count(&self) -> usize {
        self.swaps.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Matches recorded against open entries.
    pub fn applied_count(&self) -> usize {
        self.applied.iter().map(|keys| keys.value().len()).sum()
    }
}

impl OrderLedger for MemoryOrderLedger {
    fn swap(&self, at: &OutputRef) -> Option<Swap> {
        self.swaps.get(at).map(|s| s.value().clone())
    }

    fn swaps(&self, dex: Dex) -> Vec<Swap> {
        self.swaps
            .iter()
            .filter(|s| s.value().dex == dex)
            .map(|s| s.value().clone())
            .collect()
    }

    fn save_swap(&self, swap: &Swap) {
        self.swaps.insert(swap.location.output_ref(), swap.clone());
    }

    fn remove_swap(&self, at: &OutputRef) -> Option<Swap> {
        self.applied.remove(at);
        self.swaps.remove(at).map(|(_, swap)| swap)
    }

    fn order_at(&self, at: &OutputRef) -> Option<OrderBookOrder> {
        self.orders.get(at).map(|o| o.value().clone())
    }

    fn order(&self, dex: Dex, identifier: &str) -> Option<OrderBookOrder> {
        self.orders
            .iter()
            .find(|o| o.value().dex == dex && o.value().identifier == identifier)
            .map(|o| o.value().clone())
    }

    fn save_order(&self, order: &OrderBookOrder) {
        self.orders.insert(order.location.output_ref(), order.clone());
    }

    fn remove_order(&self, at: &OutputRef) -> Option<OrderBookOrder> {
        self.applied.remove(at);
        self.orders.remove(at).map(|(_, order)| order)
    }

    fn mark_applied(&self, at: &OutputRef, key: &str) -> bool {
        self.applied.entry(at.clone()).or_default().insert(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_applied_keys_dropped_with_entry() {
        let ledger = MemoryOrderLedger::new();
        let open = OutputRef::new(testing::tx_hash(1), 0);
        let other = OutputRef::new(testing::tx_hash(2), 0);
        assert!(ledger.mark_applied(&open, "a"));
        assert!(!ledger.mark_applied(&open, "a"));
        assert!(ledger.mark_applied(&open, "b"));
        assert!(ledger.mark_applied(&other, "a"));
        assert_eq!(ledger.applied_count(), 3);

        ledger.remove_order(&open);
        assert_eq!(ledger.applied_count(), 1);
        ledger.remove_swap(&other);
        assert_eq!(ledger.applied_count(), 0);
        assert!(ledger.mark_applied(&open, "a"));
    }
}
