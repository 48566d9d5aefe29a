//! Minswap V2: a single pool script, pools named by their LP asset and
//! orders that only carry the LP asset and a direction.

use std::sync::LazyLock;

use alloy_primitives::U256;
use sha3::{Digest, Sha3_256};

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{
        DatumParameters, DefinitionTemplate, ParameterKey as K, StructuredValue, common, constr,
        custom, ignore, int, match_into,
    },
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Token, Transaction, Utxo,
        Withdraw,
    },
};

pub const POOL_SCRIPT_HASH: &str = "ea07b733d932129c378af627436e7cbc2ef0bf96e0036bb51b3bde6b";
pub const ORDER_SCRIPT_HASH: &str = "c3e28c36c3447315ba5a56f33da6a6ddc1770a876a8d9f0cb3a97c4c";
/// Policy of both the pool validity token and LP assets.
pub const VALIDITY_POLICY: &str = "f5808c2c990d86da54bfc97d89cee6efa20cd8461616359478d96b4c";
/// "MSP"
pub const VALIDITY_NAME: &str = "4d5350";
const START_SLOT: u64 = 128_247_239;
const CANCEL_REDEEMER: &str = "d87a80";
const FEE_DENOMINATOR: u64 = 10_000;

/// LP asset name of the pool trading `a` against `b`, which is also the
/// pool identifier: `sha3(sha3(a) ++ sha3(b))` over the asset units.
pub fn lp_asset_name(a: &Token, b: &Token) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(Sha3_256::digest(a.unit_bytes()));
    hasher.update(Sha3_256::digest(b.unit_bytes()));
    hex::encode(hasher.finalize())
}

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            // batching stake credential
            ignore(),
            common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
            common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
            int(K::TotalLpTokens),
            int(K::ReserveA),
            int(K::ReserveB),
            int(K::BidFee),
            int(K::AskFee),
            // fee sharing
            ignore(),
            // dynamic fee switch
            ignore(),
        ],
    )
});

/// Either `SpecificAmount` (0) captured under `specific` or `All` (1) with
/// the amount to keep captured under `deducted`.
fn amount_option(specific: Vec<K>, deducted: Vec<K>) -> DefinitionTemplate {
    let specific = constr(0, specific.into_iter().map(int).collect());
    let all = constr(1, deducted.into_iter().map(int).collect());
    custom(move |value, params| match value {
        StructuredValue::Constr { tag: 0, .. } => match_into(&specific, value, params),
        _ => match_into(&all, value, params),
    })
}

fn order_datum(step: DefinitionTemplate) -> DefinitionTemplate {
    constr(
        0,
        vec![
            // canceller
            ignore(),
            common::address(K::SenderPubKeyHash, K::SenderStakingKeyHash),
            ignore(),
            common::address(K::ReceiverPubKeyHash, K::ReceiverStakingKeyHash),
            ignore(),
            common::asset_class(K::LpTokenPolicyId, K::LpTokenAssetName),
            step,
            int(K::BatcherFee),
            // expiry
            ignore(),
        ],
    )
}

static SWAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        0,
        vec![
            common::boolean(K::Direction),
            amount_option(vec![K::SwapInAmount], vec![K::DeductedAmount]),
            int(K::MinReceive),
            ignore(),
        ],
    ))
});

static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        4,
        vec![
            amount_option(
                vec![K::DepositA, K::DepositB],
                vec![K::DeductedAmountA, K::DeductedAmountB],
            ),
            int(K::MinLpReceive),
            ignore(),
        ],
    ))
});

static WITHDRAW_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        5,
        vec![
            amount_option(vec![K::LpTokenAmount], vec![K::DeductedAmount]),
            int(K::MinReceiveA),
            int(K::MinReceiveB),
            ignore(),
        ],
    ))
});

#[derive(Clone, Debug)]
pub struct MinswapV2 {
    config: ExchangeConfig,
}

impl Default for MinswapV2 {
    fn default() -> Self {
        Self::new()
    }
}

impl MinswapV2 {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::MinswapV2,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                pool_identity: PoolIdentity::ValidityAsset(Asset::new(
                    VALIDITY_POLICY,
                    VALIDITY_NAME,
                )),
                lp_token_policy: Some(VALIDITY_POLICY.to_string()),
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(2_000_000, 2_000_000, 30, FEE_DENOMINATOR),
            },
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        helpers::check_pool_identity(utxo, &self.config.pool_identity)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let token_a = params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?;
        let token_b = params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?;
        let identifier = lp_asset_name(&token_a, &token_b);

        // Balances above the datum reserves are accumulated fees.
        let fees_a = fee_surplus(tx, utxo, &token_a, params.amount(K::ReserveA)?)?;
        let fees_b = fee_surplus(tx, utxo, &token_b, params.amount(K::ReserveB)?)?;
        let parts = PoolParts::new(
            identifier.clone(),
            token_a,
            token_b,
            PoolFee::from_basis(0, FEE_DENOMINATOR),
        )
        .carve_outs(vec![fees_a], vec![fees_b])
        .lp(
            Some(Asset::new(VALIDITY_POLICY, identifier)),
            params.amount(K::TotalLpTokens)?,
        );
        let mut pool = helpers::pool_state(self.config.dex, tx, utxo, parts, U256::ZERO)?;
        pool.buy_fee = PoolFee::new(params.amount(K::BidFee)?, U256::from(FEE_DENOMINATOR));
        pool.sell_fee = PoolFee::new(params.amount(K::AskFee)?, U256::from(FEE_DENOMINATOR));
        Ok(pool)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        let pool_identifier = params.bytes(K::LpTokenAssetName)?.to_string();
        let pool = ctx.liquidity_pool_from_identifier(self.config.dex, &pool_identifier)?;
        // direction 1 is A to B
        let (swap_in_token, swap_out_token) = match params.small(K::Direction)? {
            1 => (pool.token_a(), pool.token_b()),
            _ => (pool.token_b(), pool.token_a()),
        };
        let batcher_fee = params.amount(K::BatcherFee)?;
        let deposit = self.config.fees.deposit;
        let swap_in_amount = chosen_amount(
            tx,
            utxo,
            &params,
            &swap_in_token,
            (K::SwapInAmount, K::DeductedAmount),
            &[batcher_fee, deposit],
        )?;

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(pool_identifier),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_token,
            swap_out_token,
            swap_in_amount,
            min_receive: params.amount(K::MinReceive)?,
            batcher_fee,
            deposit,
        })
    }

    fn deposit(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
        let pool_identifier = params.bytes(K::LpTokenAssetName)?.to_string();
        let pool = ctx.liquidity_pool_from_identifier(self.config.dex, &pool_identifier)?;
        let (token_a, token_b) = (pool.token_a(), pool.token_b());
        let batcher_fee = params.amount(K::BatcherFee)?;
        let deposit = self.config.fees.deposit;
        let fees = [batcher_fee, deposit];

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(pool_identifier),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            deposit_a: chosen_amount(tx, utxo, &params, &token_a, (K::DepositA, K::DeductedAmountA), &fees)?,
            deposit_b: chosen_amount(tx, utxo, &params, &token_b, (K::DepositB, K::DeductedAmountB), &fees)?,
            token_a,
            token_b,
            min_lp_receive: params.amount(K::MinLpReceive)?,
            batcher_fee,
            deposit,
        })
    }

    fn withdraw(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
        let params = helpers::decode_datum(utxo, &WITHDRAW_DATUM)?;
        let lp_token = Asset::new(
            params.bytes(K::LpTokenPolicyId)?,
            params.bytes(K::LpTokenAssetName)?,
        );
        let lp_token_amount = chosen_amount(
            tx,
            utxo,
            &params,
            &lp_token.clone().into(),
            (K::LpTokenAmount, K::DeductedAmount),
            &[],
        )?;

        Ok(Withdraw {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(lp_token.name_hex.clone()),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            lp_token,
            lp_token_amount,
            min_receive_a: params.amount(K::MinReceiveA)?,
            min_receive_b: params.amount(K::MinReceiveB)?,
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }
}

fn fee_surplus(tx: &Transaction, utxo: &Utxo, token: &Token, reserve: U256) -> AnalyzerResult<U256> {
    utxo.quantity(token)
        .checked_sub(reserve)
        .ok_or_else(|| AnalyzerError::malformed(&tx.hash, "datum reserve exceeds pool balance"))
}

/// Amount named by the datum, or everything the order holds of `token`
/// (less fees) minus the deducted amount.
fn chosen_amount(
    tx: &Transaction,
    utxo: &Utxo,
    params: &DatumParameters,
    token: &Token,
    (specific, deducted): (K, K),
    native_fees: &[U256],
) -> AnalyzerResult<U256> {
    if params.contains(specific) {
        return params.amount(specific);
    }
    helpers::offered_amount(tx, utxo, token, native_fees)?
        .checked_sub(params.amount(deducted)?)
        .ok_or_else(|| AnalyzerError::malformed(&tx.hash, "deducted amount exceeds order balance"))
}

impl AmmAnalyzer for MinswapV2 {
    fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn liquidity_pool_states(&self, tx: &Transaction) -> Vec<Extracted<LiquidityPoolState>> {
        helpers::extract_outputs(tx, &self.config.pool_addresses, |utxo| self.pool(tx, utxo))
    }

    fn swap_orders(&self, ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Swap>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.swap(ctx, tx, utxo)
        })
    }

    fn deposit_orders(&self, ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Deposit>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.deposit(ctx, tx, utxo)
        })
    }

    fn withdraw_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Withdraw>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.withdraw(tx, utxo)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analyzer::ExchangeAnalyzer,
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::DomainOperation,
    };

    fn pool_datum(asset: &Asset) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                plutus::unit(),
                plutus::asset_class(&Token::Native),
                plutus::asset_class(&asset.clone().into()),
                plutus::int(1_000_000),
                plutus::int(500_000_000),
                plutus::int(2_000_000),
                plutus::int(30),
                plutus::int(50),
                plutus::none(),
                plutus::bool(false),
            ],
        )
    }

    fn pool_output(asset: &Asset) -> Utxo {
        UtxoBuilder::new(testing::script_address(POOL_SCRIPT_HASH, None))
            .lovelace(500_100_000)
            .asset(asset, 2_000_000)
            .asset(&Asset::new(VALIDITY_POLICY, VALIDITY_NAME), 1)
            .datum(&pool_datum(asset))
            .build()
    }

    fn swap_datum(lp_name: &str, direction: bool, amount: StructuredValue) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                StructuredValue::constr(0, vec![plutus::bytes(testing::PUB_KEY)]),
                plutus::address(testing::PUB_KEY, None),
                plutus::unit(),
                plutus::address(testing::PUB_KEY, None),
                plutus::unit(),
                plutus::asset_class(&Asset::new(VALIDITY_POLICY, lp_name).into()),
                StructuredValue::constr(
                    0,
                    vec![
                        plutus::bool(direction),
                        amount,
                        plutus::int(900),
                        plutus::unit(),
                    ],
                ),
                plutus::int(700_000),
                plutus::none(),
            ],
        )
    }

    #[test]
    fn test_lp_asset_name_depends_on_order() {
        let asset = Token::Asset(testing::asset(1));
        let name = lp_asset_name(&Token::Native, &asset);
        assert_eq!(name.len(), 64);
        assert_ne!(name, lp_asset_name(&asset, &Token::Native));
        assert_eq!(name, lp_asset_name(&Token::Native, &asset));
    }

    #[test]
    fn test_pool_reserves_exclude_fees() {
        let asset = testing::asset(1);
        let tx = TxBuilder::new(1, START_SLOT).output(pool_output(&asset)).build();
        let pools = MinswapV2::new().liquidity_pool_states(&tx);
        let pool = pools[0].as_ref().unwrap();

        assert_eq!(pool.identifier, lp_asset_name(&Token::Native, &asset.clone().into()));
        assert_eq!(pool.reserve_a, U256::from(500_000_000));
        assert_eq!(pool.reserve_b, U256::from(2_000_000));
        assert_eq!(pool.buy_fee, PoolFee::from_basis(30, 10_000));
        assert_eq!(pool.sell_fee, PoolFee::from_basis(50, 10_000));
        assert_eq!(pool.total_lp_tokens, U256::from(1_000_000));
    }

    #[test]
    fn test_swap_waits_for_pool() {
        let asset = testing::asset(1);
        let lp_name = lp_asset_name(&Token::Native, &asset.clone().into());
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(12_700_000)
                    .datum(&swap_datum(
                        &lp_name,
                        true,
                        StructuredValue::constr(0, vec![plutus::int(10_000_000)]),
                    ))
                    .build(),
            )
            .build();
        let analyzer = ExchangeAnalyzer::Amm(Box::new(MinswapV2::new()));
        let ctx = AnalyzerContext::in_memory();

        let analysis = analyzer.analyze_transaction(&ctx, &tx);
        assert!(analysis.operations.is_empty());
        assert!(analysis.has_retryable());
        assert_eq!(analysis.deferred_outputs().into_iter().collect::<Vec<_>>(), vec![0]);

        let pool_tx = TxBuilder::new(2, START_SLOT).output(pool_output(&asset)).build();
        let pools = MinswapV2::new().liquidity_pool_states(&pool_tx);
        ctx.record(pools[0].as_ref().unwrap());

        let analysis = analyzer.analyze_transaction(&ctx, &tx);
        assert!(analysis.failures.is_empty());
        let DomainOperation::Swap(swap) = &analysis.operations[0] else {
            panic!("expected swap");
        };
        assert_eq!(swap.swap_in_token, Token::Native);
        assert_eq!(swap.swap_out_token, Token::Asset(asset));
        assert_eq!(swap.swap_in_amount, U256::from(10_000_000));
        assert_eq!(swap.pool_identifier.as_deref(), Some(lp_name.as_str()));
    }

    #[test]
    fn test_swap_all_minus_deducted() {
        let asset = testing::asset(1);
        let lp_name = lp_asset_name(&Token::Native, &asset.clone().into());
        let ctx = AnalyzerContext::in_memory();
        let pool_tx = TxBuilder::new(2, START_SLOT).output(pool_output(&asset)).build();
        ctx.record(MinswapV2::new().liquidity_pool_states(&pool_tx)[0].as_ref().unwrap());

        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(3_000_000)
                    .asset(&asset, 800)
                    .datum(&swap_datum(
                        &lp_name,
                        false,
                        StructuredValue::constr(1, vec![plutus::int(300)]),
                    ))
                    .build(),
            )
            .build();
        let swaps = MinswapV2::new().swap_orders(&ctx, &tx);
        let swap = swaps[0].as_ref().unwrap();
        assert_eq!(swap.swap_in_token, Token::Asset(asset));
        assert_eq!(swap.swap_out_token, Token::Native);
        assert_eq!(swap.swap_in_amount, U256::from(500));
        assert_eq!(swap.batcher_fee, U256::from(700_000));
    }
}
