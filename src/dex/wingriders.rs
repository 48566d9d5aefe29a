//! WingRiders V1. Pools hold the validity token and the unissued share of
//! their LP asset, so the circulating supply follows from burn accounting.

use std::sync::LazyLock;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{DatumParameters, DefinitionTemplate, ParameterKey as K, common, constr, ignore, int},
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Token, Transaction, Utxo,
        Withdraw,
    },
};

const POOL_SCRIPT_HASH: &str = "e6c90a5923713af5786963dee0fdffd830ca7e0c86a041d9e5833e91";
const ORDER_SCRIPT_HASH: &str = "86ae9eebd8b97944a45201e4aec1330a72291af2d071644bba015959";
/// Policy of the validity token and of every pool's LP asset.
const VALIDITY_POLICY: &str = "026a18d04a0c642759bb3d83b12e3344894e5c1c7b2aeb1a2113a570";
const VALIDITY_NAME: &str = "4c";
const START_SLOT: u64 = 57_274_883;
const CANCEL_REDEEMER: &str = "d87a80";

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            // request script hash
            ignore(),
            constr(
                0,
                vec![
                    common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
                    common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
                    int(K::LastInteraction),
                    int(K::TreasuryA),
                    int(K::TreasuryB),
                ],
            ),
        ],
    )
});

fn order_datum(action: DefinitionTemplate) -> DefinitionTemplate {
    constr(
        0,
        vec![
            constr(
                0,
                vec![
                    common::address(K::SenderPubKeyHash, K::SenderStakingKeyHash),
                    // owner
                    ignore(),
                    int(K::Deadline),
                    common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
                    common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
                ],
            ),
            action,
        ],
    )
}

/// Direction 0 swaps `A` for `B`.
static SWAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        0,
        vec![common::boolean(K::Direction), int(K::MinReceive)],
    ))
});

static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| order_datum(constr(1, vec![int(K::MinLpReceive)])));

static WITHDRAW_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        2,
        vec![int(K::MinReceiveA), int(K::MinReceiveB)],
    ))
});

/// Legs of an order in the datum's order.
fn legs(params: &DatumParameters) -> AnalyzerResult<(Token, Token)> {
    Ok((
        params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
        params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
    ))
}

/// LP asset held by a pool or withdraw order, any asset under the
/// validity policy but the validity token itself.
fn lp_asset(utxo: &Utxo) -> AnalyzerResult<Asset> {
    utxo.assets_under(VALIDITY_POLICY)
        .find(|b| b.asset.name_hex != VALIDITY_NAME)
        .map(|b| b.asset.clone())
        .ok_or_else(|| AnalyzerError::mismatch("$", "no lp asset"))
}

#[derive(Clone, Debug)]
pub struct WingRiders {
    config: ExchangeConfig,
}

impl Default for WingRiders {
    fn default() -> Self {
        Self::new()
    }
}

impl WingRiders {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::WingRiders,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                pool_identity: PoolIdentity::ValidityAsset(Asset::new(
                    VALIDITY_POLICY,
                    VALIDITY_NAME,
                )),
                lp_token_policy: Some(VALIDITY_POLICY.to_string()),
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(2_000_000, 2_000_000, 35, 10_000)
                    .with_min_pool_ada(3_000_000),
            },
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        helpers::check_pool_identity(utxo, &self.config.pool_identity)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let lp_token = lp_asset(utxo)?;
        let total_lp_tokens =
            helpers::burn_accounted_supply(tx, utxo.quantity(&lp_token.clone().into()))?;
        let (token_a, token_b) = legs(&params)?;
        let fees = &self.config.fees;
        let parts = PoolParts::new(
            lp_token.name_hex.clone(),
            token_a,
            token_b,
            PoolFee::new(fees.fee_numerator, fees.fee_denominator),
        )
        .carve_outs(
            vec![params.amount(K::TreasuryA)?],
            vec![params.amount(K::TreasuryB)?],
        )
        .lp(Some(lp_token), total_lp_tokens)
        .extra("last_interaction", params.int(K::LastInteraction)?);
        helpers::pool_state(self.config.dex, tx, utxo, parts, fees.min_pool_ada)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        let (token_a, token_b) = legs(&params)?;
        let (swap_in_token, swap_out_token) = match params.small(K::Direction)? {
            0 => (token_a, token_b),
            _ => (token_b, token_a),
        };
        let fees = &self.config.fees;
        let swap_in_amount =
            helpers::offered_amount(tx, utxo, &swap_in_token, &[fees.batcher_fee, fees.deposit])?;
        let pool_identifier = ctx
            .liquidity_pool_from_pair(self.config.dex, &swap_in_token, &swap_out_token)
            .map(|pool| pool.identifier);

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_token,
            swap_out_token,
            swap_in_amount,
            min_receive: params.amount(K::MinReceive)?,
            batcher_fee: fees.batcher_fee,
            deposit: fees.deposit,
        })
    }

    fn deposit(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
        let (token_a, token_b) = legs(&params)?;
        let fees = &self.config.fees;
        let native_fees = [fees.batcher_fee, fees.deposit];
        let pool_identifier = ctx
            .liquidity_pool_from_pair(self.config.dex, &token_a, &token_b)
            .map(|pool| pool.identifier);

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            deposit_a: helpers::offered_amount(tx, utxo, &token_a, &native_fees)?,
            deposit_b: helpers::offered_amount(tx, utxo, &token_b, &native_fees)?,
            token_a,
            token_b,
            min_lp_receive: params.amount(K::MinLpReceive)?,
            batcher_fee: fees.batcher_fee,
            deposit: fees.deposit,
        })
    }

    fn withdraw(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
        let params = helpers::decode_datum(utxo, &WITHDRAW_DATUM)?;
        let lp_token = lp_asset(utxo)?;

        Ok(Withdraw {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(lp_token.name_hex.clone()),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            lp_token_amount: utxo.quantity(&lp_token.clone().into()),
            lp_token,
            min_receive_a: params.amount(K::MinReceiveA)?,
            min_receive_b: params.amount(K::MinReceiveB)?,
            batcher_fee: self.config.fees.batcher_fee,
            deposit: self.config.fees.deposit,
        })
    }
}

impl AmmAnalyzer for WingRiders {
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
    use alloy_primitives::U256;

    use super::*;
    use crate::{
        analyzer::ExchangeAnalyzer,
        datum::StructuredValue,
        num,
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::DomainOperation,
    };

    fn order(token_b: &Asset, action: StructuredValue) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                StructuredValue::constr(
                    0,
                    vec![
                        plutus::address(testing::PUB_KEY, None),
                        plutus::bytes(testing::PUB_KEY),
                        plutus::int(1_700_000_000_000),
                        plutus::asset_class(&Token::Native),
                        plutus::asset_class(&token_b.clone().into()),
                    ],
                ),
                action,
            ],
        )
    }

    #[test]
    fn test_pool_uses_burn_accounting_and_treasuries() {
        let asset = testing::asset(5);
        let lp = Asset::new(VALIDITY_POLICY, "77aa");
        let datum = StructuredValue::constr(
            0,
            vec![
                plutus::bytes(ORDER_SCRIPT_HASH),
                StructuredValue::constr(
                    0,
                    vec![
                        plutus::asset_class(&Token::Native),
                        plutus::asset_class(&asset.clone().into()),
                        plutus::int(1_650_000_000_000),
                        plutus::int(1_000_000),
                        plutus::int(40),
                    ],
                ),
            ],
        );
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(POOL_SCRIPT_HASH, None))
                    .lovelace(104_000_000)
                    .asset(&asset, 2_040)
                    .asset(&Asset::new(VALIDITY_POLICY, VALIDITY_NAME), 1)
                    .asset(&lp, 9_223_372_036_754_775_807)
                    .datum(&datum)
                    .build(),
            )
            .build();

        let pools = WingRiders::new().liquidity_pool_states(&tx);
        let pool = pools[0].as_ref().unwrap();
        assert_eq!(pool.identifier, "77aa");
        assert_eq!(pool.reserve_a, U256::from(100_000_000));
        assert_eq!(pool.reserve_b, U256::from(2_000));
        assert_eq!(
            pool.total_lp_tokens,
            num::MAX_INT - U256::from(9_223_372_036_754_775_807u64)
        );
        assert_eq!(pool.total_lp_tokens, U256::from(100_000_000));
        assert_eq!(pool.lp_token, Some(lp));
    }

    #[test]
    fn test_swap_direction_selects_legs() {
        let asset = testing::asset(5);
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(14_000_000)
                    .datum(&order(
                        &asset,
                        StructuredValue::constr(0, vec![plutus::bool(false), plutus::int(300)]),
                    ))
                    .build(),
            )
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(4_000_000)
                    .asset(&asset, 800)
                    .datum(&order(
                        &asset,
                        StructuredValue::constr(0, vec![plutus::bool(true), plutus::int(1)]),
                    ))
                    .build(),
            )
            .build();

        let ctx = AnalyzerContext::in_memory();
        let swaps = WingRiders::new().swap_orders(&ctx, &tx);
        let buy = swaps[0].as_ref().unwrap();
        assert_eq!(buy.swap_in_token, Token::Native);
        assert_eq!(buy.swap_in_amount, U256::from(10_000_000));
        let sell = swaps[1].as_ref().unwrap();
        assert_eq!(sell.swap_in_token, Token::Asset(asset));
        assert_eq!(sell.swap_in_amount, U256::from(800));
        assert_eq!(sell.swap_out_token, Token::Native);
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let asset = testing::asset(5);
        let lp = Asset::new(VALIDITY_POLICY, "77aa");
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(24_000_000)
                    .asset(&asset, 100)
                    .datum(&order(&asset, StructuredValue::constr(1, vec![plutus::int(9)])))
                    .build(),
            )
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(4_000_000)
                    .asset(&lp, 1_234)
                    .datum(&order(
                        &asset,
                        StructuredValue::constr(2, vec![plutus::int(1), plutus::int(2)]),
                    ))
                    .build(),
            )
            .build();

        let analysis = ExchangeAnalyzer::Amm(Box::new(WingRiders::new()))
            .analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.failures.is_empty());
        assert!(matches!(
            &analysis.operations[..],
            [DomainOperation::Deposit(d), DomainOperation::Withdraw(w)]
                if d.deposit_a == U256::from(20_000_000)
                    && d.deposit_b == U256::from(100)
                    && w.lp_token_amount == U256::from(1_234)
                    && w.pool_identifier.as_deref() == Some("77aa")
        ));
    }
}
