use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    error::{AnalyzerError, AnalyzerResult},
    types::{Dex, LiquidityPoolState, Token},
};

/// Durable pool storage behind the in-memory cache.
pub trait PoolStore: Send + Sync {
    fn liquidity_pool(&self, dex: Dex, identifier: &str) -> Option<LiquidityPoolState>;

    fn liquidity_pool_for_pair(&self, dex: Dex, x: &Token, y: &Token)
    -> Option<LiquidityPoolState>;

    fn save(&self, pool: &LiquidityPoolState);
}

/// [`PoolStore`] kept in memory, for replays and tests.
#[derive(Debug, Default)]
pub struct MemoryPoolStore {
    pools: DashMap<(Dex, String), LiquidityPoolState>,
}

impl MemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl PoolStore for MemoryPoolStore {
    fn liquidity_pool(&self, dex: Dex, identifier: &str) -> Option<LiquidityPoolState> {
        self.pools
            .get(&(dex, identifier.to_string()))
            .map(|p| p.value().clone())
    }

    fn liquidity_pool_for_pair(
        &self,
        dex: Dex,
        x: &Token,
        y: &Token,
    ) -> Option<LiquidityPoolState> {
        self.pools
            .iter()
            .find(|p| p.key().0 == dex && p.value().pairs(x, y))
            .map(|p| p.value().clone())
    }

    fn save(&self, pool: &LiquidityPoolState) {
        self.pools
            .insert((pool.dex, pool.identifier.clone()), pool.clone());
    }
}

fn pair_key(dex: Dex, x: &Token, y: &Token) -> (Dex, Token, Token) {
    if x <= y {
        (dex, x.clone(), y.clone())
    } else {
        (dex, y.clone(), x.clone())
    }
}

/// Shared view of known pools.
///
/// Lookups read through the cache into the store, [`Self::record`] writes
/// through both, so a pool recorded for an earlier transaction is visible
/// to every later one.
#[derive(derive_more::Debug)]
pub struct AnalyzerContext {
    pools: DashMap<(Dex, String), LiquidityPoolState>,
    pairs: DashMap<(Dex, Token, Token), String>,
    #[debug(skip)]
    store: Arc<dyn PoolStore>,
}

impl AnalyzerContext {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self {
            pools: DashMap::new(),
            pairs: DashMap::new(),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPoolStore::new()))
    }

    /// Resolves a pool by its exchange specific identifier.
    ///
    /// A miss is an [`AnalyzerError::UnresolvedReference`], the pool may
    /// simply not be indexed yet.
    pub fn liquidity_pool_from_identifier(
        &self,
        dex: Dex,
        identifier: &str,
    ) -> AnalyzerResult<LiquidityPoolState> {
        let key = (dex, identifier.to_string());
        if let Some(pool) = self.pools.get(&key) {
            return Ok(pool.value().clone());
        }
        let pool = self
            .store
            .liquidity_pool(dex, identifier)
            .ok_or_else(|| AnalyzerError::unresolved_pool(identifier))?;
        self.cache(&pool);
        Ok(pool)
    }

    /// Resolves the pool trading `x` against `y`, in either order.
    pub fn liquidity_pool_from_pair(
        &self,
        dex: Dex,
        x: &Token,
        y: &Token,
    ) -> Option<LiquidityPoolState> {
        let cached = self
            .pairs
            .get(&pair_key(dex, x, y))
            .map(|id| id.value().clone())
            .and_then(|id| self.pools.get(&(dex, id)).map(|p| p.value().clone()));
        if cached.is_some() {
            return cached;
        }
        let pool = self.store.liquidity_pool_for_pair(dex, x, y)?;
        self.cache(&pool);
        Some(pool)
    }

    /// Records a newly observed pool state, older states never replace newer.
    pub fn record(&self, pool: &LiquidityPoolState) {
        let key = (pool.dex, pool.identifier.clone());
        if let Some(existing) = self.pools.get(&key)
            && existing.location.slot > pool.location.slot
        {
            return;
        }
        self.cache(pool);
        self.store.save(pool);
    }

    fn cache(&self, pool: &LiquidityPoolState) {
        self.pairs.insert(
            pair_key(pool.dex, &pool.token_a(), &pool.token_b()),
            pool.identifier.clone(),
        );
        self.pools
            .insert((pool.dex, pool.identifier.clone()), pool.clone());
    }
}
