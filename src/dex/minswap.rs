//! Minswap V1: pools carry a validity token and a pool NFT, orders describe
//! a single step and are funded by the order output itself.

use std::sync::LazyLock;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{
        DefinitionTemplate, ParameterKey as K, common, constr, constr_capture, ignore, int,
    },
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Transaction, Utxo, Withdraw, Zap,
    },
};

pub const ORDER_SCRIPT_HASH: &str = "a65ca58a4e9d755fa830173d2a5caed458ac0c73f97db7faae2e7e3b";
pub const POOL_SCRIPT_HASH: &str = "e1317b152faac13426e6a83e06ff88a4d62cce3c1634ab0a5ec13309";
pub const POOL_NFT_POLICY: &str = "0be55d262b29f564998ff81efe21bdc0022621c12f15af08d0f2ddb1";
pub const VALIDITY_POLICY: &str = "13aa2accf2e1561723aa26871e071fdf32c867cff7e7d50ad470d62f";
/// "MINSWAP"
pub const VALIDITY_NAME: &str = "4d494e53574150";
pub const LP_POLICY: &str = "e4214b7cce62ac6fbba385d164df48e157eae5863521b4b67ca71d86";
const START_SLOT: u64 = 50_367_177;
/// `CancelOrder` redeemer, constructor 1.
const CANCEL_REDEEMER: &str = "d87a80";

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
            common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
            int(K::TotalLpTokens),
            // root k last
            ignore(),
            // profit sharing
            ignore(),
        ],
    )
});

fn order_datum(step: DefinitionTemplate) -> DefinitionTemplate {
    constr(
        0,
        vec![
            common::address(K::SenderPubKeyHash, K::SenderStakingKeyHash),
            common::address(K::ReceiverPubKeyHash, K::ReceiverStakingKeyHash),
            common::optional(ignore()),
            step,
            int(K::BatcherFee),
            int(K::DepositFee),
        ],
    )
}

/// `SwapExactIn` (0) and `SwapExactOut` (1) share their shape with `ZapIn`,
/// the step tag tells them apart.
static SWAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr_capture(
        K::Action,
        vec![
            common::asset_class(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName),
            int(K::MinReceive),
        ],
    ))
});

static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| order_datum(constr(2, vec![int(K::MinLpReceive)])));

static WITHDRAW_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        3,
        vec![int(K::MinReceiveA), int(K::MinReceiveB)],
    ))
});

static ZAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        4,
        vec![
            common::asset_class(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName),
            int(K::MinLpReceive),
        ],
    ))
});

#[derive(Clone, Debug)]
pub struct Minswap {
    config: ExchangeConfig,
}

impl Default for Minswap {
    fn default() -> Self {
        Self::new()
    }
}

impl Minswap {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::Minswap,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                pool_identity: PoolIdentity::ValidityAsset(Asset::new(
                    VALIDITY_POLICY,
                    VALIDITY_NAME,
                )),
                lp_token_policy: Some(LP_POLICY.to_string()),
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(2_000_000, 2_000_000, 30, 10_000),
            },
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        helpers::check_pool_identity(utxo, &self.config.pool_identity)?;
        let nft = helpers::nft_under(utxo, POOL_NFT_POLICY)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let fees = &self.config.fees;
        let parts = PoolParts::new(
            nft.name_hex.clone(),
            params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
            params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
            PoolFee::new(fees.fee_numerator, fees.fee_denominator),
        )
        .lp(
            Some(Asset::new(LP_POLICY, nft.name_hex)),
            params.amount(K::TotalLpTokens)?,
        );
        helpers::pool_state(self.config.dex, tx, utxo, parts, fees.min_pool_ada)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        if params.small(K::Action)? > 1 {
            return Err(AnalyzerError::mismatch("$.3", "not a swap step"));
        }
        let swap_out_token = params.token(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName)?;
        let except: Vec<Asset> = swap_out_token.asset().cloned().into_iter().collect();
        let swap_in_token = helpers::offered_token(utxo, &except)?;
        let batcher_fee = params.amount(K::BatcherFee)?;
        let deposit = params.amount(K::DepositFee)?;
        let swap_in_amount =
            helpers::offered_amount(tx, utxo, &swap_in_token, &[batcher_fee, deposit])?;
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
            batcher_fee,
            deposit,
        })
    }

    fn deposit(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
        let (token_a, token_b) = helpers::deposit_legs(utxo, &[])?;
        let batcher_fee = params.amount(K::BatcherFee)?;
        let deposit = params.amount(K::DepositFee)?;
        let pool_identifier = ctx
            .liquidity_pool_from_pair(self.config.dex, &token_a, &token_b)
            .map(|pool| pool.identifier);

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            deposit_a: helpers::offered_amount(tx, utxo, &token_a, &[batcher_fee, deposit])?,
            deposit_b: helpers::offered_amount(tx, utxo, &token_b, &[batcher_fee, deposit])?,
            token_a,
            token_b,
            min_lp_receive: params.amount(K::MinLpReceive)?,
            batcher_fee,
            deposit,
        })
    }

    fn withdraw(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
        let params = helpers::decode_datum(utxo, &WITHDRAW_DATUM)?;
        let lp_token = helpers::nft_under(utxo, LP_POLICY)?;

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
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: params.amount(K::DepositFee)?,
        })
    }

    fn zap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Zap> {
        let params = helpers::decode_datum(utxo, &ZAP_DATUM)?;
        let forward_token = params.token(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName)?;
        let except: Vec<Asset> = forward_token.asset().cloned().into_iter().collect();
        let swap_in_token = helpers::offered_token(utxo, &except)?;
        let batcher_fee = params.amount(K::BatcherFee)?;
        let deposit = params.amount(K::DepositFee)?;
        let pool_identifier = ctx
            .liquidity_pool_from_pair(self.config.dex, &swap_in_token, &forward_token)
            .map(|pool| pool.identifier);

        Ok(Zap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_amount: helpers::offered_amount(
                tx,
                utxo,
                &swap_in_token,
                &[batcher_fee, deposit],
            )?,
            swap_in_token,
            forward_token,
            min_lp_receive: params.amount(K::MinLpReceive)?,
            batcher_fee,
            deposit,
        })
    }
}

impl AmmAnalyzer for Minswap {
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
        types::{DomainOperation, OrderStatus, Token},
    };

    fn analyzer() -> ExchangeAnalyzer {
        ExchangeAnalyzer::Amm(Box::new(Minswap::new()))
    }

    fn order(step: StructuredValue) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                plutus::address(testing::PUB_KEY, Some(testing::STAKE_KEY)),
                plutus::address(testing::PUB_KEY, Some(testing::STAKE_KEY)),
                plutus::none(),
                step,
                plutus::int(2_000_000),
                plutus::int(2_000_000),
            ],
        )
    }

    fn order_address() -> String {
        testing::script_address(ORDER_SCRIPT_HASH, None)
    }

    #[test]
    fn test_swap_asset_for_native() {
        let asset = testing::asset(1);
        let datum = order(StructuredValue::constr(
            0,
            vec![plutus::asset_class(&Token::Native), plutus::int(1_000)],
        ));
        let tx = TxBuilder::new(1, START_SLOT + 10)
            .output(
                UtxoBuilder::new(order_address())
                    .lovelace(4_000_000)
                    .asset(&asset, 5_000)
                    .datum(&datum)
                    .build(),
            )
            .build();

        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.failures.is_empty());
        assert_eq!(analysis.operations.len(), 1);
        let DomainOperation::Swap(swap) = &analysis.operations[0] else {
            panic!("expected swap, got {:?}", analysis.operations[0]);
        };
        assert_eq!(swap.location.tx_hash, tx.hash);
        assert_eq!(swap.swap_out_token, Token::Native);
        assert_eq!(swap.swap_in_token, Token::Asset(asset));
        assert_eq!(swap.swap_in_amount, U256::from(5_000));
        assert_eq!(swap.min_receive, U256::from(1_000));
        assert_eq!(swap.sender.pub_key_hash.as_deref(), Some(testing::PUB_KEY));
        assert_eq!(swap.pool_identifier, None);
    }

    #[test]
    fn test_native_swap_deducts_fees() {
        let asset = testing::asset(2);
        let datum = order(StructuredValue::constr(
            1,
            vec![plutus::asset_class(&asset.clone().into()), plutus::int(10)],
        ));
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(order_address())
                    .lovelace(14_000_000)
                    .datum(&datum)
                    .build(),
            )
            .build();

        let swaps = Minswap::new().swap_orders(&AnalyzerContext::in_memory(), &tx);
        let swap = swaps[0].as_ref().unwrap();
        assert_eq!(swap.swap_in_token, Token::Native);
        assert_eq!(swap.swap_in_amount, U256::from(10_000_000));
    }

    #[test]
    fn test_deposit_withdraw_and_zap() {
        let asset = testing::asset(3);
        let lp = Asset::new(LP_POLICY, "abcd");
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(order_address())
                    .lovelace(104_000_000)
                    .asset(&asset, 700)
                    .datum(&order(StructuredValue::constr(2, vec![plutus::int(55)])))
                    .build(),
            )
            .output(
                UtxoBuilder::new(order_address())
                    .lovelace(4_000_000)
                    .asset(&lp, 900)
                    .datum(&order(StructuredValue::constr(
                        3,
                        vec![plutus::int(1), plutus::int(2)],
                    )))
                    .build(),
            )
            .output(
                UtxoBuilder::new(order_address())
                    .lovelace(54_000_000)
                    .datum(&order(StructuredValue::constr(
                        4,
                        vec![plutus::asset_class(&asset.clone().into()), plutus::int(3)],
                    )))
                    .build(),
            )
            .build();

        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.failures.is_empty());
        assert_eq!(analysis.operations.len(), 3);
        assert!(matches!(
            &analysis.operations[0],
            DomainOperation::Deposit(d) if d.deposit_a == U256::from(100_000_000)
                && d.deposit_b == U256::from(700)
                && d.min_lp_receive == U256::from(55)
        ));
        assert!(matches!(
            &analysis.operations[1],
            DomainOperation::Withdraw(w) if w.lp_token == lp
                && w.lp_token_amount == U256::from(900)
                && w.pool_identifier.as_deref() == Some("abcd")
        ));
        assert!(matches!(
            &analysis.operations[2],
            DomainOperation::Zap(z) if z.swap_in_token == Token::Native
                && z.swap_in_amount == U256::from(50_000_000)
                && z.forward_token == Token::Asset(asset.clone())
        ));
    }

    #[test]
    fn test_pool_state() {
        let asset = testing::asset(4);
        let datum = StructuredValue::constr(
            0,
            vec![
                plutus::asset_class(&Token::Native),
                plutus::asset_class(&asset.clone().into()),
                plutus::int(31_622_776),
                plutus::int(0),
                plutus::none(),
            ],
        );
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(POOL_SCRIPT_HASH, None))
                    .lovelace(1_000_000_000)
                    .asset(&asset, 1_000_000)
                    .asset(&Asset::new(VALIDITY_POLICY, VALIDITY_NAME), 1)
                    .asset(&Asset::new(POOL_NFT_POLICY, "beef"), 1)
                    .datum(&datum)
                    .build(),
            )
            .build();

        let pools = Minswap::new().liquidity_pool_states(&tx);
        let pool = pools[0].as_ref().unwrap();
        assert_eq!(pool.identifier, "beef");
        assert_eq!(pool.token_a, None);
        assert_eq!(pool.token_b, asset);
        assert_eq!(pool.reserve_a, U256::from(1_000_000_000));
        assert_eq!(pool.reserve_b, U256::from(1_000_000));
        assert_eq!(pool.total_lp_tokens, U256::from(31_622_776));
        assert_eq!(pool.lp_token, Some(Asset::new(LP_POLICY, "beef")));
    }

    #[test]
    fn test_pool_without_validity_token_is_skipped() {
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(POOL_SCRIPT_HASH, None))
                    .lovelace(1_000_000_000)
                    .asset(&Asset::new(POOL_NFT_POLICY, "beef"), 1)
                    .datum_hex("d87980")
                    .build(),
            )
            .build();
        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_cancel_order() {
        let order_input = UtxoBuilder::new(order_address())
            .lovelace(4_000_000)
            .from_tx(&testing::tx_hash(7), 3)
            .build();
        let tx = TxBuilder::new(1, START_SLOT)
            .input(order_input.clone(), Some(CANCEL_REDEEMER))
            .script(ORDER_SCRIPT_HASH)
            .build();

        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert_eq!(analysis.operations.len(), 1);
        assert!(matches!(
            &analysis.operations[0],
            DomainOperation::OperationStatus(s) if s.status == OrderStatus::Cancelled
                && s.closes == order_input.output_ref()
        ));
    }

    #[test]
    fn test_unrelated_and_early_transactions_yield_nothing() {
        let ctx = AnalyzerContext::in_memory();
        let unrelated = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::key_address(testing::PUB_KEY, None))
                    .lovelace(5_000_000)
                    .build(),
            )
            .build();
        assert!(analyzer().analyze_transaction(&ctx, &unrelated).is_empty());

        let early = TxBuilder::new(2, START_SLOT - 1)
            .output(
                UtxoBuilder::new(order_address())
                    .lovelace(5_000_000)
                    .datum_hex("d87980")
                    .build(),
            )
            .build();
        assert!(analyzer().analyze_transaction(&ctx, &early).is_empty());
    }
}
