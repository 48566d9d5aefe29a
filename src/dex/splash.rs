//! Splash: Spectrum style pools with a treasury cut of the fee, kept in
//! the pool output until withdrawn.

use std::sync::LazyLock;

use super::spectrum::{self, OrderScripts};
use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{DefinitionTemplate, ParameterKey as K, common, constr, ignore, int},
    error::AnalyzerResult,
    types::{Asset, Deposit, Dex, LiquidityPoolState, Swap, Transaction, Utxo, Withdraw},
};

const POOL_SCRIPT_HASH: &str = "f002facfd69d51b63e7046c6d40349b0b17c8dd775ee415c66af3ccc";
const SWAP_SCRIPT_HASH: &str = "464eeee89f05aff787d40045af2a40a83fd96c513197d32fbc54ff02";
const DEPOSIT_SCRIPT_HASH: &str = "75c4570eb625ae881b32a34c52b159f6f3f3f2c7aaabf5bac4688133";
const REDEEM_SCRIPT_HASH: &str = "1e3ca24ffb8b46fc7ec1e2a3a9df7e2f5d8b71d3ad7b5a0ac1a5d8c2";
const START_SLOT: u64 = 125_500_000;
const FEE_DENOMINATOR: u64 = 100_000;

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            common::asset_class(K::PoolNftPolicyId, K::PoolNftAssetName),
            common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
            common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
            common::asset_class(K::LpTokenPolicyId, K::LpTokenAssetName),
            int(K::PoolFeeNumerator),
            int(K::TreasuryFee),
            int(K::TreasuryA),
            int(K::TreasuryB),
            // DAO policy
            ignore(),
            int(K::LqBound),
            // treasury address
            ignore(),
        ],
    )
});

#[derive(Clone, Debug)]
pub struct Splash {
    config: ExchangeConfig,
    orders: OrderScripts,
}

impl Default for Splash {
    fn default() -> Self {
        Self::new()
    }
}

impl Splash {
    pub fn new() -> Self {
        let orders = OrderScripts::new(SWAP_SCRIPT_HASH, DEPOSIT_SCRIPT_HASH, REDEEM_SCRIPT_HASH);
        Self {
            config: ExchangeConfig {
                dex: Dex::Splash,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                order_addresses: orders.all(),
                pool_identity: PoolIdentity::DatumNft,
                lp_token_policy: None,
                cancel: CancelRule::redeemer(spectrum::CANCEL_REDEEMER),
                fees: FeeSchedule::new(0, 2_000_000, 300, FEE_DENOMINATOR),
            },
            orders,
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let nft = spectrum::pool_nft(&params, utxo)?;
        let lp_token = Asset::new(
            params.bytes(K::LpTokenPolicyId)?,
            params.bytes(K::LpTokenAssetName)?,
        );
        let total_lp_tokens =
            helpers::burn_accounted_supply(tx, utxo.quantity(&lp_token.clone().into()))?;
        let parts = PoolParts::new(
            nft.unit(),
            params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
            params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
            spectrum::retained_fee(&params, FEE_DENOMINATOR)?,
        )
        .carve_outs(
            vec![params.amount(K::TreasuryA)?],
            vec![params.amount(K::TreasuryB)?],
        )
        .lp(Some(lp_token), total_lp_tokens)
        .extra("treasury_fee", params.amount(K::TreasuryFee)?)
        .extra("lq_bound", params.amount(K::LqBound)?);
        helpers::pool_state(self.config.dex, tx, utxo, parts, self.config.fees.min_pool_ada)
    }
}

impl AmmAnalyzer for Splash {
    fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn liquidity_pool_states(&self, tx: &Transaction) -> Vec<Extracted<LiquidityPoolState>> {
        helpers::extract_outputs(tx, &self.config.pool_addresses, |utxo| self.pool(tx, utxo))
    }

    fn swap_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Swap>> {
        helpers::extract_outputs(tx, &self.orders.swap, |utxo| {
            spectrum::swap(&self.config, tx, utxo)
        })
    }

    fn deposit_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Deposit>> {
        helpers::extract_outputs(tx, &self.orders.deposit, |utxo| {
            spectrum::deposit(&self.config, tx, utxo)
        })
    }

    fn withdraw_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Withdraw>> {
        helpers::extract_outputs(tx, &self.orders.redeem, |utxo| {
            spectrum::redeem(&self.config, tx, utxo)
        })
    }
}
