//! WingRiders V2. The pool datum splits the fee into swap, protocol,
//! project and reserve parts and tracks a treasury for each recipient.

use std::sync::LazyLock;

use alloy_primitives::U256;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{
        DatumParameters, DefinitionTemplate, ParameterKey as K, bytes, common, constr, ignore, int,
    },
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Token, Transaction, Utxo,
        Withdraw, Zap,
    },
};

const POOL_SCRIPT_HASH: &str = "6b9c456aa650cb808a9ab54326e039d5235ed69f069c9664a8fe5b69";
const ORDER_SCRIPT_HASH: &str = "c134d839a64a5dfb9b155869ef3f34280751a622f69958baa8ffd29c";
const VALIDITY_POLICY: &str = "6fdc63a1d71dc2c65502b79baae7fb543185702b12c3c5fb639ed737";
const VALIDITY_NAME: &str = "4c";
const START_SLOT: u64 = 118_000_000;
const CANCEL_REDEEMER: &str = "d87a80";

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            // request validator hash
            ignore(),
            bytes(K::PoolAssetAPolicyId),
            bytes(K::PoolAssetAAssetName),
            bytes(K::PoolAssetBPolicyId),
            bytes(K::PoolAssetBAssetName),
            int(K::PoolFeeNumerator),
            int(K::ProtocolFee),
            int(K::ProjectFee),
            int(K::ReserveFee),
            int(K::PoolFeeDenominator),
            // agent fee
            int(K::BatcherFee),
            int(K::LastInteraction),
            int(K::TreasuryA),
            int(K::TreasuryB),
            int(K::ProjectTreasuryA),
            int(K::ProjectTreasuryB),
            int(K::ReserveTreasuryA),
            int(K::ReserveTreasuryB),
            // project and reserve beneficiaries
            ignore(),
            ignore(),
            // pool specifics
            ignore(),
        ],
    )
});

fn order_datum(action: DefinitionTemplate) -> DefinitionTemplate {
    constr(
        0,
        vec![
            int(K::DepositFee),
            common::address(K::SenderPubKeyHash, K::SenderStakingKeyHash),
            // owner, compensation datum and its type
            ignore(),
            ignore(),
            ignore(),
            int(K::Deadline),
            bytes(K::PoolAssetAPolicyId),
            bytes(K::PoolAssetAAssetName),
            bytes(K::PoolAssetBPolicyId),
            bytes(K::PoolAssetBAssetName),
            action,
            // scales
            ignore(),
            ignore(),
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

/// Deposit of a single leg, part of which is swapped first.
static ZAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        4,
        vec![common::boolean(K::Direction), int(K::MinLpReceive)],
    ))
});

fn legs(params: &DatumParameters) -> AnalyzerResult<(Token, Token)> {
    Ok((
        params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
        params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
    ))
}

fn lp_asset(utxo: &Utxo) -> AnalyzerResult<Asset> {
    utxo.assets_under(VALIDITY_POLICY)
        .find(|b| b.asset.name_hex != VALIDITY_NAME)
        .map(|b| b.asset.clone())
        .ok_or_else(|| AnalyzerError::mismatch("$", "no lp asset"))
}

fn sum(params: &DatumParameters, keys: &[K]) -> AnalyzerResult<U256> {
    keys.iter().try_fold(U256::ZERO, |acc, key| {
        acc.checked_add(params.amount(*key)?)
            .ok_or_else(|| AnalyzerError::mismatch(key.to_string(), "overflow"))
    })
}

#[derive(Clone, Debug)]
pub struct WingRidersV2 {
    config: ExchangeConfig,
}

impl Default for WingRidersV2 {
    fn default() -> Self {
        Self::new()
    }
}

impl WingRidersV2 {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::WingRidersV2,
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
        let fee = sum(
            &params,
            &[K::PoolFeeNumerator, K::ProtocolFee, K::ProjectFee, K::ReserveFee],
        )?;
        let parts = PoolParts::new(
            lp_token.name_hex.clone(),
            token_a,
            token_b,
            PoolFee::new(fee, params.amount(K::PoolFeeDenominator)?),
        )
        .carve_outs(
            vec![
                params.amount(K::TreasuryA)?,
                params.amount(K::ProjectTreasuryA)?,
                params.amount(K::ReserveTreasuryA)?,
            ],
            vec![
                params.amount(K::TreasuryB)?,
                params.amount(K::ProjectTreasuryB)?,
                params.amount(K::ReserveTreasuryB)?,
            ],
        )
        .lp(Some(lp_token), total_lp_tokens)
        .extra("agent_fee", params.amount(K::BatcherFee)?)
        .extra("last_interaction", params.int(K::LastInteraction)?);
        helpers::pool_state(self.config.dex, tx, utxo, parts, self.config.fees.min_pool_ada)
    }

    /// Pool of the order's pair, when already indexed.
    fn pool_for(&self, ctx: &AnalyzerContext, x: &Token, y: &Token) -> Option<String> {
        ctx.liquidity_pool_from_pair(self.config.dex, x, y)
            .map(|pool| pool.identifier)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        let (token_a, token_b) = legs(&params)?;
        let (swap_in_token, swap_out_token) = match params.small(K::Direction)? {
            0 => (token_a, token_b),
            _ => (token_b, token_a),
        };
        let batcher_fee = self.config.fees.batcher_fee;
        let deposit = params.amount(K::DepositFee)?;

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: self.pool_for(ctx, &swap_in_token, &swap_out_token),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_amount: helpers::offered_amount(
                tx,
                utxo,
                &swap_in_token,
                &[batcher_fee, deposit],
            )?,
            swap_in_token,
            swap_out_token,
            min_receive: params.amount(K::MinReceive)?,
            batcher_fee,
            deposit,
        })
    }

    fn deposit(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
        let (token_a, token_b) = legs(&params)?;
        let batcher_fee = self.config.fees.batcher_fee;
        let deposit = params.amount(K::DepositFee)?;

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: self.pool_for(ctx, &token_a, &token_b),
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
            deposit: params.amount(K::DepositFee)?,
        })
    }

    fn zap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Zap> {
        let params = helpers::decode_datum(utxo, &ZAP_DATUM)?;
        let (token_a, token_b) = legs(&params)?;
        let (swap_in_token, forward_token) = match params.small(K::Direction)? {
            0 => (token_a, token_b),
            _ => (token_b, token_a),
        };
        let batcher_fee = self.config.fees.batcher_fee;
        let deposit = params.amount(K::DepositFee)?;

        Ok(Zap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: self.pool_for(ctx, &swap_in_token, &forward_token),
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

impl AmmAnalyzer for WingRidersV2 {
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
