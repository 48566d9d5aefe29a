//! Spectrum and its fork TeddySwap.
//!
//! Pools name their own NFT in the datum. Orders live at one script per
//! role (swap, deposit, redeem) and carry the pool NFT, so they never need
//! a pool lookup. The order extraction is shared with Splash.

use std::sync::LazyLock;

use alloy_primitives::U256;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{DatumParameters, DefinitionTemplate, ParameterKey as K, bytes, common, constr, ignore, int},
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Transaction, Utxo, Withdraw,
    },
};

const SPECTRUM_POOL_SCRIPT_HASH: &str = "e628bfd68c07a7a38fcd7d8df650812a9dfdbee54b1ed4c25c87ffbf";
const SPECTRUM_SWAP_SCRIPT_HASH: &str = "2618e94cdb06792f05ae9b1ec78b0231f4b7f4215b1b4cf52e6342de";
const SPECTRUM_DEPOSIT_SCRIPT_HASH: &str =
    "075e09eb0fa89e1dc34691b3c56a7f437e60ac5ea67b338f2e176e20";
const SPECTRUM_REDEEM_SCRIPT_HASH: &str =
    "83da79f531c19f9ce4d85359f56968a742cf05cc25ed3ca48c302dee";
const SPECTRUM_START_SLOT: u64 = 98_000_000;

const TEDDY_POOL_SCRIPT_HASH: &str = "28bbd1f7aebb3bc59e13597f333aeefb8f5ab78eda962de1d605b388";
const TEDDY_SWAP_SCRIPT_HASH: &str = "4ab17afc9a19a4f06b6fd229f9a6dc7c5b1bd8e94c67cd0ceb48e3a1";
const TEDDY_DEPOSIT_SCRIPT_HASH: &str = "9fd8d8a58ea2ed1a2e3ae1c6d77d7e0ca51a3b5e6f4cb58c9b7a0e12";
const TEDDY_REDEEM_SCRIPT_HASH: &str = "c2b8a0e2ef5a9d04a7de8d20f5e48c2b3d8e7a6f1e0c5b4d3a2f1e0d";
const TEDDY_START_SLOT: u64 = 109_000_000;

/// Refund of an order back to its owner.
pub(super) const CANCEL_REDEEMER: &str = "d8799f00000001ff";
const FEE_DENOMINATOR: u64 = 1_000;

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            common::asset_class(K::PoolNftPolicyId, K::PoolNftAssetName),
            common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
            common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
            common::asset_class(K::LpTokenPolicyId, K::LpTokenAssetName),
            int(K::PoolFeeNumerator),
            // stake admin policies
            ignore(),
            int(K::LqBound),
        ],
    )
});

static SWAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            common::asset_class(K::SwapInTokenPolicyId, K::SwapInTokenAssetName),
            common::asset_class(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName),
            common::asset_class(K::PoolNftPolicyId, K::PoolNftAssetName),
            int(K::PoolFeeNumerator),
            int(K::ExFeePerTokenNumerator),
            int(K::ExFeePerTokenDenominator),
            bytes(K::SenderPubKeyHash),
            common::optional(bytes(K::SenderStakingKeyHash)),
            int(K::SwapInAmount),
            int(K::MinReceive),
        ],
    )
});

fn liquidity_datum(tail: Vec<DefinitionTemplate>) -> DefinitionTemplate {
    let mut fields = vec![
        common::asset_class(K::PoolNftPolicyId, K::PoolNftAssetName),
        common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
        common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
        common::asset_class(K::LpTokenPolicyId, K::LpTokenAssetName),
        int(K::BatcherFee),
        bytes(K::SenderPubKeyHash),
        common::optional(bytes(K::SenderStakingKeyHash)),
    ];
    fields.extend(tail);
    constr(0, fields)
}

/// Deposit datums end with the collateral ADA returned with the LP.
static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| liquidity_datum(vec![int(K::DepositFee)]));

static REDEEM_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| liquidity_datum(vec![]));

/// Order scripts by role.
#[derive(Clone, Debug)]
pub(super) struct OrderScripts {
    pub swap: AddressSet,
    pub deposit: AddressSet,
    pub redeem: AddressSet,
}

impl OrderScripts {
    pub fn new(swap: &str, deposit: &str, redeem: &str) -> Self {
        Self {
            swap: AddressSet::script_hashes(&[swap]),
            deposit: AddressSet::script_hashes(&[deposit]),
            redeem: AddressSet::script_hashes(&[redeem]),
        }
    }

    pub fn all(&self) -> AddressSet {
        self.swap.union(&self.deposit).union(&self.redeem)
    }
}

/// Pool NFT named by the datum, which the output must hold.
pub(super) fn pool_nft(params: &DatumParameters, utxo: &Utxo) -> AnalyzerResult<Asset> {
    let nft = Asset::new(
        params.bytes(K::PoolNftPolicyId)?,
        params.bytes(K::PoolNftAssetName)?,
    );
    helpers::require_asset(utxo, &nft)?;
    Ok(nft)
}

fn lp_asset(params: &DatumParameters) -> AnalyzerResult<Asset> {
    Ok(Asset::new(
        params.bytes(K::LpTokenPolicyId)?,
        params.bytes(K::LpTokenAssetName)?,
    ))
}

/// Pool fee from the retained share `fee_num / denominator`.
pub(super) fn retained_fee(params: &DatumParameters, denominator: u64) -> AnalyzerResult<PoolFee> {
    let denominator = U256::from(denominator);
    let fee = denominator
        .checked_sub(params.amount(K::PoolFeeNumerator)?)
        .ok_or_else(|| AnalyzerError::mismatch("PoolFeeNumerator", "exceeds denominator"))?;
    Ok(PoolFee::new(fee, denominator))
}

pub(super) fn swap(config: &ExchangeConfig, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
    let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
    let min_receive = params.amount(K::MinReceive)?;
    let ex_fee_denominator = params.amount(K::ExFeePerTokenDenominator)?;
    if ex_fee_denominator.is_zero() {
        return Err(AnalyzerError::mismatch(
            K::ExFeePerTokenDenominator.to_string(),
            "zero denominator",
        ));
    }
    let batcher_fee = min_receive
        .checked_mul(params.amount(K::ExFeePerTokenNumerator)?)
        .ok_or_else(|| AnalyzerError::malformed(&tx.hash, "execution fee overflow"))?
        / ex_fee_denominator;
    let nft = Asset::new(
        params.bytes(K::PoolNftPolicyId)?,
        params.bytes(K::PoolNftAssetName)?,
    );

    Ok(Swap {
        dex: config.dex,
        location: helpers::location(tx, utxo.output_index),
        address: utxo.address.clone(),
        pool_identifier: Some(nft.unit()),
        sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
        swap_in_token: params.token(K::SwapInTokenPolicyId, K::SwapInTokenAssetName)?,
        swap_out_token: params.token(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName)?,
        swap_in_amount: params.amount(K::SwapInAmount)?,
        min_receive,
        batcher_fee,
        deposit: config.fees.deposit,
    })
}

pub(super) fn deposit(config: &ExchangeConfig, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
    let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
    let token_a = params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?;
    let token_b = params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?;
    let batcher_fee = params.amount(K::BatcherFee)?;
    let collateral = params.amount(K::DepositFee)?;
    let nft = Asset::new(
        params.bytes(K::PoolNftPolicyId)?,
        params.bytes(K::PoolNftAssetName)?,
    );

    Ok(Deposit {
        dex: config.dex,
        location: helpers::location(tx, utxo.output_index),
        address: utxo.address.clone(),
        pool_identifier: Some(nft.unit()),
        sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
        deposit_a: helpers::offered_amount(tx, utxo, &token_a, &[batcher_fee, collateral])?,
        deposit_b: helpers::offered_amount(tx, utxo, &token_b, &[batcher_fee, collateral])?,
        token_a,
        token_b,
        min_lp_receive: U256::ZERO,
        batcher_fee,
        deposit: collateral,
    })
}

pub(super) fn redeem(config: &ExchangeConfig, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
    let params = helpers::decode_datum(utxo, &REDEEM_DATUM)?;
    let lp_token = lp_asset(&params)?;
    let nft = Asset::new(
        params.bytes(K::PoolNftPolicyId)?,
        params.bytes(K::PoolNftAssetName)?,
    );

    Ok(Withdraw {
        dex: config.dex,
        location: helpers::location(tx, utxo.output_index),
        address: utxo.address.clone(),
        pool_identifier: Some(nft.unit()),
        sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
        lp_token_amount: utxo.quantity(&lp_token.clone().into()),
        lp_token,
        min_receive_a: U256::ZERO,
        min_receive_b: U256::ZERO,
        batcher_fee: params.amount(K::BatcherFee)?,
        deposit: config.fees.deposit,
    })
}

/// Spectrum or TeddySwap, which share contracts but not deployments.
#[derive(Clone, Debug)]
pub struct SpectrumAnalyzer {
    config: ExchangeConfig,
    orders: OrderScripts,
}

impl SpectrumAnalyzer {
    pub fn spectrum() -> Self {
        Self::deployed(
            Dex::Spectrum,
            SPECTRUM_START_SLOT,
            SPECTRUM_POOL_SCRIPT_HASH,
            OrderScripts::new(
                SPECTRUM_SWAP_SCRIPT_HASH,
                SPECTRUM_DEPOSIT_SCRIPT_HASH,
                SPECTRUM_REDEEM_SCRIPT_HASH,
            ),
        )
    }

    pub fn teddyswap() -> Self {
        Self::deployed(
            Dex::TeddySwap,
            TEDDY_START_SLOT,
            TEDDY_POOL_SCRIPT_HASH,
            OrderScripts::new(
                TEDDY_SWAP_SCRIPT_HASH,
                TEDDY_DEPOSIT_SCRIPT_HASH,
                TEDDY_REDEEM_SCRIPT_HASH,
            ),
        )
    }

    fn deployed(dex: Dex, start_slot: u64, pool_script: &str, orders: OrderScripts) -> Self {
        Self {
            config: ExchangeConfig {
                dex,
                start_slot,
                pool_addresses: AddressSet::script_hashes(&[pool_script]),
                order_addresses: orders.all(),
                pool_identity: PoolIdentity::DatumNft,
                lp_token_policy: None,
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(0, 2_000_000, 3, FEE_DENOMINATOR),
            },
            orders,
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let nft = pool_nft(&params, utxo)?;
        let lp_token = lp_asset(&params)?;
        let total_lp_tokens =
            helpers::burn_accounted_supply(tx, utxo.quantity(&lp_token.clone().into()))?;
        let parts = PoolParts::new(
            nft.unit(),
            params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
            params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
            retained_fee(&params, FEE_DENOMINATOR)?,
        )
        .lp(Some(lp_token), total_lp_tokens)
        .extra("lq_bound", params.amount(K::LqBound)?);
        helpers::pool_state(self.config.dex, tx, utxo, parts, self.config.fees.min_pool_ada)
    }
}

impl AmmAnalyzer for SpectrumAnalyzer {
    fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn liquidity_pool_states(&self, tx: &Transaction) -> Vec<Extracted<LiquidityPoolState>> {
        helpers::extract_outputs(tx, &self.config.pool_addresses, |utxo| self.pool(tx, utxo))
    }

    fn swap_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Swap>> {
        helpers::extract_outputs(tx, &self.orders.swap, |utxo| swap(&self.config, tx, utxo))
    }

    fn deposit_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Deposit>> {
        helpers::extract_outputs(tx, &self.orders.deposit, |utxo| {
            deposit(&self.config, tx, utxo)
        })
    }

    fn withdraw_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Withdraw>> {
        helpers::extract_outputs(tx, &self.orders.redeem, |utxo| {
            redeem(&self.config, tx, utxo)
        })
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::{
        analyzer::ExchangeAnalyzer,
        datum::StructuredValue,
        num,
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::{DomainOperation, OrderStatus, Token},
    };

    pub fn asset_class(asset: &Asset) -> StructuredValue {
        plutus::asset_class(&asset.clone().into())
    }

    pub fn swap_datum(nft: &Asset, quote: &Asset, base_amount: u64, min_quote: u64) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                plutus::asset_class(&Token::Native),
                asset_class(quote),
                asset_class(nft),
                plutus::int(997),
                plutus::int(1_000),
                plutus::int(1_000_000),
                plutus::bytes(testing::PUB_KEY),
                plutus::some(plutus::bytes(testing::STAKE_KEY)),
                plutus::int(base_amount),
                plutus::int(min_quote),
            ],
        )
    }

    fn pool_datum(nft: &Asset, y: &Asset, lq: &Asset) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                asset_class(nft),
                plutus::asset_class(&Token::Native),
                asset_class(y),
                asset_class(lq),
                plutus::int(997),
                StructuredValue::List(vec![]),
                plutus::int(0),
            ],
        )
    }

    #[test]
    fn test_pool_requires_its_nft() {
        let (nft, y, lq) = (testing::asset(20), testing::asset(21), testing::asset(22));
        let pool = |with_nft: bool| {
            let mut utxo = UtxoBuilder::new(testing::script_address(SPECTRUM_POOL_SCRIPT_HASH, None))
                .lovelace(80_000_000)
                .asset(&y, 4_000)
                .asset(&lq, 9_223_372_036_854_000_000)
                .datum(&pool_datum(&nft, &y, &lq));
            if with_nft {
                utxo = utxo.asset(&nft, 1);
            }
            TxBuilder::new(1, SPECTRUM_START_SLOT).output(utxo.build()).build()
        };

        let analyzer = SpectrumAnalyzer::spectrum();
        let pools = analyzer.liquidity_pool_states(&pool(true));
        let state = pools[0].as_ref().unwrap();
        assert_eq!(state.identifier, nft.unit());
        assert_eq!(state.buy_fee, PoolFee::from_basis(3, 1_000));
        assert_eq!(state.reserve_a, U256::from(80_000_000));
        assert_eq!(state.total_lp_tokens, num::MAX_INT - U256::from(9_223_372_036_854_000_000u64));
        assert_eq!(state.total_lp_tokens, U256::from(775_807));

        let pools = analyzer.liquidity_pool_states(&pool(false));
        assert!(pools[0].as_ref().unwrap_err().error.is_mismatch());
    }

    #[test]
    fn test_orders_are_read_by_role() {
        let (nft, y, lq) = (testing::asset(20), testing::asset(21), testing::asset(22));
        let analyzer = SpectrumAnalyzer::teddyswap();
        let redeem = StructuredValue::constr(
            0,
            vec![
                asset_class(&nft),
                plutus::asset_class(&Token::Native),
                asset_class(&y),
                asset_class(&lq),
                plutus::int(1_500_000),
                plutus::bytes(testing::PUB_KEY),
                plutus::none(),
            ],
        );
        let tx = TxBuilder::new(1, TEDDY_START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(TEDDY_SWAP_SCRIPT_HASH, None))
                    .lovelace(13_000_000)
                    .datum(&swap_datum(&nft, &y, 10_000_000, 2_000))
                    .build(),
            )
            .output(
                UtxoBuilder::new(testing::script_address(TEDDY_REDEEM_SCRIPT_HASH, None))
                    .lovelace(4_000_000)
                    .asset(&lq, 500)
                    .datum(&redeem)
                    .build(),
            )
            .build();

        let analysis = ExchangeAnalyzer::Amm(Box::new(analyzer))
            .analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.failures.is_empty());
        let [DomainOperation::Swap(swap), DomainOperation::Withdraw(withdraw)] =
            &analysis.operations[..]
        else {
            panic!("unexpected operations {:?}", analysis.operations);
        };
        assert_eq!(swap.dex, Dex::TeddySwap);
        assert_eq!(swap.swap_in_amount, U256::from(10_000_000));
        assert_eq!(swap.min_receive, U256::from(2_000));
        // 2_000 * 1_000 / 1_000_000
        assert_eq!(swap.batcher_fee, U256::from(2));
        assert_eq!(swap.pool_identifier, Some(nft.unit()));
        assert_eq!(withdraw.lp_token, lq);
        assert_eq!(withdraw.lp_token_amount, U256::from(500));
        assert_eq!(withdraw.batcher_fee, U256::from(1_500_000));
    }

    #[test]
    fn test_refund_cancels_order() {
        let input = UtxoBuilder::new(testing::script_address(SPECTRUM_SWAP_SCRIPT_HASH, None))
            .lovelace(3_000_000)
            .from_tx(&testing::tx_hash(4), 0)
            .build();
        let tx = TxBuilder::new(1, SPECTRUM_START_SLOT)
            .input(input.clone(), Some(CANCEL_REDEEMER))
            .build();
        let analysis = ExchangeAnalyzer::Amm(Box::new(SpectrumAnalyzer::spectrum()))
            .analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(matches!(
            &analysis.operations[..],
            [DomainOperation::OperationStatus(s)]
                if s.status == OrderStatus::Cancelled && s.closes == input.output_ref()
        ));
    }
}
