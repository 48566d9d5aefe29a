//! SundaeSwap V1: pools are named by a short identifier, which also derives
//! the pool NFT and LP asset names. Orders reference the pool by identifier.

use std::sync::LazyLock;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{DefinitionTemplate, ParameterKey as K, bytes, common, constr, ignore, int},
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Token, Transaction, Utxo,
        Withdraw, Zap,
    },
};

pub const POOL_SCRIPT_HASH: &str = "4020e7fc2de75a0729c3cc3af715b34d98381e0cdbcfa99c950bc3ac";
pub const ORDER_SCRIPT_HASH: &str = "ba158766c1bae60e2117ee8987621441fac66a5e0fb9c7aca58cf20a";
/// Policy of pool NFTs and LP assets.
pub const POOL_NFT_POLICY: &str = "0029cb7c88c7567b63d1a512c0ed626aa169688ec980730c0473b913";
/// Pool NFT name is `"p "` followed by the identifier.
const POOL_NFT_PREFIX: &str = "7020";
/// LP asset name is `"lp "` followed by the identifier.
const LP_PREFIX: &str = "6c7020";
const START_SLOT: u64 = 50_000_000;
const CANCEL_REDEEMER: &str = "d87a80";

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            constr(
                0,
                vec![
                    common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
                    common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
                ],
            ),
            bytes(K::PoolIdentifier),
            int(K::TotalLpTokens),
            constr(
                0,
                vec![int(K::PoolFeeNumerator), int(K::PoolFeeDenominator)],
            ),
        ],
    )
});

fn order_datum(action: DefinitionTemplate) -> DefinitionTemplate {
    constr(
        0,
        vec![
            bytes(K::PoolIdentifier),
            constr(
                0,
                vec![
                    constr(
                        0,
                        vec![
                            common::address(K::SenderPubKeyHash, K::SenderStakingKeyHash),
                            common::optional(ignore()),
                        ],
                    ),
                    // alternate address
                    ignore(),
                ],
            ),
            int(K::BatcherFee),
            action,
        ],
    )
}

/// The swapped coin is `A` (0) or `B` (1).
static SWAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        0,
        vec![
            common::boolean(K::Direction),
            int(K::SwapInAmount),
            common::optional(int(K::MinReceive)),
        ],
    ))
});

static WITHDRAW_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| order_datum(constr(1, vec![int(K::LpTokenAmount)])));

static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        2,
        vec![constr(1, vec![int(K::DepositA), int(K::DepositB)])],
    ))
});

/// Single sided deposit of one coin.
static ZAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        2,
        vec![constr(
            0,
            vec![common::boolean(K::Direction), int(K::SwapInAmount)],
        )],
    ))
});

#[derive(Clone, Debug)]
pub struct SundaeSwap {
    config: ExchangeConfig,
}

impl Default for SundaeSwap {
    fn default() -> Self {
        Self::new()
    }
}

impl SundaeSwap {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::SundaeSwap,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                pool_identity: PoolIdentity::NftPolicy(POOL_NFT_POLICY.to_string()),
                lp_token_policy: Some(POOL_NFT_POLICY.to_string()),
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(2_500_000, 2_000_000, 30, 10_000),
            },
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        let nft = helpers::nft_under(utxo, POOL_NFT_POLICY)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let identifier = params.bytes(K::PoolIdentifier)?.to_string();
        if nft.name_hex != format!("{POOL_NFT_PREFIX}{identifier}") {
            return Err(AnalyzerError::mismatch(
                "$.1",
                format!("pool nft {nft} does not match identifier {identifier}"),
            ));
        }
        let parts = PoolParts::new(
            identifier.clone(),
            params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
            params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
            PoolFee::new(
                params.amount(K::PoolFeeNumerator)?,
                params.amount(K::PoolFeeDenominator)?,
            ),
        )
        .lp(Some(lp_token(&identifier)), params.amount(K::TotalLpTokens)?);
        helpers::pool_state(self.config.dex, tx, utxo, parts, self.config.fees.min_pool_ada)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        let pool_identifier = params.bytes(K::PoolIdentifier)?.to_string();
        let pool = ctx.liquidity_pool_from_identifier(self.config.dex, &pool_identifier)?;
        let (swap_in_token, swap_out_token) = coins(params.small(K::Direction)?, &pool);

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(pool_identifier),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_token,
            swap_out_token,
            swap_in_amount: params.amount(K::SwapInAmount)?,
            min_receive: params.amount_or_zero(K::MinReceive)?,
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }

    fn deposit(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
        let pool_identifier = params.bytes(K::PoolIdentifier)?.to_string();
        let pool = ctx.liquidity_pool_from_identifier(self.config.dex, &pool_identifier)?;

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(pool_identifier),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            token_a: pool.token_a(),
            token_b: pool.token_b(),
            deposit_a: params.amount(K::DepositA)?,
            deposit_b: params.amount(K::DepositB)?,
            min_lp_receive: Default::default(),
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }

    fn withdraw(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
        let params = helpers::decode_datum(utxo, &WITHDRAW_DATUM)?;
        let pool_identifier = params.bytes(K::PoolIdentifier)?.to_string();

        Ok(Withdraw {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            lp_token: lp_token(&pool_identifier),
            pool_identifier: Some(pool_identifier),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            lp_token_amount: params.amount(K::LpTokenAmount)?,
            min_receive_a: Default::default(),
            min_receive_b: Default::default(),
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }

    fn zap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Zap> {
        let params = helpers::decode_datum(utxo, &ZAP_DATUM)?;
        let pool_identifier = params.bytes(K::PoolIdentifier)?.to_string();
        let pool = ctx.liquidity_pool_from_identifier(self.config.dex, &pool_identifier)?;
        let (swap_in_token, forward_token) = coins(params.small(K::Direction)?, &pool);

        Ok(Zap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(pool_identifier),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_token,
            forward_token,
            swap_in_amount: params.amount(K::SwapInAmount)?,
            min_lp_receive: Default::default(),
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }
}

fn lp_token(identifier: &str) -> Asset {
    Asset::new(POOL_NFT_POLICY, format!("{LP_PREFIX}{identifier}"))
}

/// Offered and received coin for a coin selector, 0 offers `A`.
fn coins(coin: u64, pool: &LiquidityPoolState) -> (Token, Token) {
    if coin == 0 {
        (pool.token_a(), pool.token_b())
    } else {
        (pool.token_b(), pool.token_a())
    }
}

impl AmmAnalyzer for SundaeSwap {
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

    fn zap_orders(&self, ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Zap>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.zap(ctx, tx, utxo)
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
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::DomainOperation,
    };

    const IDENT: &str = "0a1b";

    fn pool_output(asset: &Asset) -> Utxo {
        let datum = StructuredValue::constr(
            0,
            vec![
                StructuredValue::constr(
                    0,
                    vec![
                        plutus::asset_class(&Token::Native),
                        plutus::asset_class(&asset.clone().into()),
                    ],
                ),
                plutus::bytes(IDENT),
                plutus::int(7_000),
                StructuredValue::constr(0, vec![plutus::int(1), plutus::int(100)]),
            ],
        );
        UtxoBuilder::new(testing::script_address(POOL_SCRIPT_HASH, None))
            .lovelace(40_000_000)
            .asset(asset, 90_000)
            .asset(&Asset::new(POOL_NFT_POLICY, format!("{POOL_NFT_PREFIX}{IDENT}")), 1)
            .datum(&datum)
            .build()
    }

    fn order(action: StructuredValue) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                plutus::bytes(IDENT),
                StructuredValue::constr(
                    0,
                    vec![
                        StructuredValue::constr(
                            0,
                            vec![
                                plutus::address(testing::PUB_KEY, Some(testing::STAKE_KEY)),
                                plutus::none(),
                            ],
                        ),
                        plutus::none(),
                    ],
                ),
                plutus::int(2_500_000),
                action,
            ],
        )
    }

    fn order_output(action: StructuredValue) -> Utxo {
        UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
            .lovelace(10_000_000)
            .datum(&order(action))
            .build()
    }

    #[test]
    fn test_pool_fee_and_identifier_from_datum() {
        let asset = testing::asset(5);
        let tx = TxBuilder::new(1, START_SLOT).output(pool_output(&asset)).build();
        let pools = SundaeSwap::new().liquidity_pool_states(&tx);
        let pool = pools[0].as_ref().unwrap();
        assert_eq!(pool.identifier, IDENT);
        assert_eq!(pool.buy_fee, PoolFee::from_basis(1, 100));
        assert_eq!(pool.lp_token, Some(Asset::new(POOL_NFT_POLICY, "6c70200a1b")));
        assert_eq!(pool.total_lp_tokens, U256::from(7_000));
        assert_eq!(pool.reserve_b, U256::from(90_000));
    }

    #[test]
    fn test_orders_resolve_pool_by_identifier() {
        let asset = testing::asset(5);
        let ctx = AnalyzerContext::in_memory();
        let pool_tx = TxBuilder::new(2, START_SLOT).output(pool_output(&asset)).build();
        ctx.record(SundaeSwap::new().liquidity_pool_states(&pool_tx)[0].as_ref().unwrap());

        let tx = TxBuilder::new(1, START_SLOT + 1)
            .output(order_output(StructuredValue::constr(
                0,
                vec![
                    plutus::bool(true),
                    plutus::int(300),
                    plutus::some(plutus::int(1_000)),
                ],
            )))
            .output(order_output(StructuredValue::constr(
                2,
                vec![StructuredValue::constr(
                    0,
                    vec![plutus::bool(false), plutus::int(5_000_000)],
                )],
            )))
            .output(order_output(StructuredValue::constr(
                2,
                vec![StructuredValue::constr(
                    1,
                    vec![plutus::int(5_000_000), plutus::int(100)],
                )],
            )))
            .output(order_output(StructuredValue::constr(1, vec![plutus::int(42)])))
            .build();

        let analysis = ExchangeAnalyzer::Amm(Box::new(SundaeSwap::new())).analyze_transaction(&ctx, &tx);
        assert!(analysis.failures.is_empty());
        assert_eq!(analysis.operations.len(), 4);
        assert!(matches!(
            &analysis.operations[0],
            DomainOperation::Swap(s) if s.swap_in_token == Token::Asset(asset.clone())
                && s.swap_out_token == Token::Native
                && s.swap_in_amount == U256::from(300)
                && s.min_receive == U256::from(1_000)
                && s.batcher_fee == U256::from(2_500_000)
        ));
        assert!(matches!(
            &analysis.operations[1],
            DomainOperation::Deposit(d) if d.deposit_b == U256::from(100)
        ));
        assert!(matches!(
            &analysis.operations[2],
            DomainOperation::Withdraw(w) if w.lp_token == lp_token(IDENT)
                && w.lp_token_amount == U256::from(42)
        ));
        assert!(matches!(
            &analysis.operations[3],
            DomainOperation::Zap(z) if z.swap_in_token == Token::Native
                && z.forward_token == Token::Asset(asset.clone())
        ));
    }

    #[test]
    fn test_pool_nft_must_match_identifier() {
        let asset = testing::asset(5);
        let mut utxo = pool_output(&asset);
        utxo.assets.retain(|b| b.asset.policy_id != POOL_NFT_POLICY);
        utxo.assets.push(crate::types::AssetBalance {
            asset: Asset::new(POOL_NFT_POLICY, "7020ffff"),
            quantity: U256::from(1),
        });
        let tx = TxBuilder::new(1, START_SLOT).output(utxo).build();
        let pools = SundaeSwap::new().liquidity_pool_states(&tx);
        assert!(pools[0].as_ref().unwrap_err().error.is_mismatch());
    }
}
