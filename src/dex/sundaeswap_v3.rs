//! SundaeSwap V3: pools are identified by a CIP-68 style NFT minted by the
//! pool script, orders describe both legs with amounts.

use std::sync::LazyLock;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{DefinitionTemplate, ParameterKey as K, bytes, common, constr, ignore, int, list},
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, Swap, Transaction, Utxo, Withdraw,
    },
};

/// Pool script, also the policy of pool NFTs and LP assets.
pub const POOL_SCRIPT_HASH: &str = "e0302560ced2fdcbfcb2602697df970cd0d6a38f94b32703f51c312b";
pub const ORDER_SCRIPT_HASH: &str = "fa6a58bbe2d0ff05534431c8e2f0ef2cbdc1602a8456e4b13c8f3077";
const POOL_NFT_PREFIX: &str = "000de140";
const LP_PREFIX: &str = "0014df10";
const START_SLOT: u64 = 123_500_000;
const CANCEL_REDEEMER: &str = "d87a80";
const FEE_DENOMINATOR: u64 = 10_000;

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            bytes(K::PoolIdentifier),
            list(vec![
                common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
                common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
            ]),
            int(K::TotalLpTokens),
            int(K::BidFee),
            int(K::AskFee),
            // fee manager
            ignore(),
            int(K::MarketOpen),
            int(K::ProtocolFees),
        ],
    )
});

/// `(policy, name, amount)` triple.
fn amount_of(policy: K, name: K, amount: K) -> DefinitionTemplate {
    list(vec![bytes(policy), bytes(name), int(amount)])
}

fn order_datum(details: DefinitionTemplate) -> DefinitionTemplate {
    constr(
        0,
        vec![
            common::optional(bytes(K::PoolIdentifier)),
            // owner signature
            constr(0, vec![bytes(K::SenderPubKeyHash)]),
            int(K::BatcherFee),
            constr(
                0,
                vec![
                    common::address(K::ReceiverPubKeyHash, K::ReceiverStakingKeyHash),
                    ignore(),
                ],
            ),
            details,
            // extension
            ignore(),
        ],
    )
}

static SWAP_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        1,
        vec![
            amount_of(
                K::SwapInTokenPolicyId,
                K::SwapInTokenAssetName,
                K::SwapInAmount,
            ),
            amount_of(
                K::SwapOutTokenPolicyId,
                K::SwapOutTokenAssetName,
                K::MinReceive,
            ),
        ],
    ))
});

static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        2,
        vec![list(vec![
            amount_of(K::PoolAssetAPolicyId, K::PoolAssetAAssetName, K::DepositA),
            amount_of(K::PoolAssetBPolicyId, K::PoolAssetBAssetName, K::DepositB),
        ])],
    ))
});

static WITHDRAW_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        3,
        vec![amount_of(
            K::LpTokenPolicyId,
            K::LpTokenAssetName,
            K::LpTokenAmount,
        )],
    ))
});

#[derive(Clone, Debug)]
pub struct SundaeSwapV3 {
    config: ExchangeConfig,
}

impl Default for SundaeSwapV3 {
    fn default() -> Self {
        Self::new()
    }
}

impl SundaeSwapV3 {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::SundaeSwapV3,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                pool_identity: PoolIdentity::NftPolicy(POOL_SCRIPT_HASH.to_string()),
                lp_token_policy: Some(POOL_SCRIPT_HASH.to_string()),
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(1_000_000, 2_000_000, 30, FEE_DENOMINATOR),
            },
        }
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        let nft = helpers::nft_under(utxo, POOL_SCRIPT_HASH)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let identifier = params.bytes(K::PoolIdentifier)?.to_string();
        if nft.name_hex != format!("{POOL_NFT_PREFIX}{identifier}") {
            return Err(AnalyzerError::mismatch(
                "$.0",
                format!("pool nft {nft} does not match identifier {identifier}"),
            ));
        }
        let token_a = params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?;
        let token_b = params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?;
        // protocol fees are collected in the native unit
        let protocol_fees = params.amount(K::ProtocolFees)?;
        let (carve_a, carve_b) = match (token_a.is_native(), token_b.is_native()) {
            (true, _) => (vec![protocol_fees], vec![]),
            (_, true) => (vec![], vec![protocol_fees]),
            _ => (vec![], vec![]),
        };
        let denominator = alloy_primitives::U256::from(FEE_DENOMINATOR);
        let mut parts = PoolParts::new(
            identifier.clone(),
            token_a,
            token_b,
            PoolFee::new(params.amount(K::BidFee)?, denominator),
        )
        .carve_outs(carve_a, carve_b)
        .lp(
            Some(Asset::new(POOL_SCRIPT_HASH, format!("{LP_PREFIX}{identifier}"))),
            params.amount(K::TotalLpTokens)?,
        )
        .extra("market_open", params.amount(K::MarketOpen)?)
        .extra("protocol_fees", protocol_fees);
        parts.sell_fee = PoolFee::new(params.amount(K::AskFee)?, denominator);
        helpers::pool_state(self.config.dex, tx, utxo, parts, self.config.fees.min_pool_ada)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        let swap_in_token = params.token(K::SwapInTokenPolicyId, K::SwapInTokenAssetName)?;
        let swap_out_token = params.token(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName)?;
        let pool_identifier = match params.bytes_opt(K::PoolIdentifier) {
            Some(identifier) => Some(identifier.to_string()),
            None => ctx
                .liquidity_pool_from_pair(self.config.dex, &swap_in_token, &swap_out_token)
                .map(|pool| pool.identifier),
        };

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::ReceiverStakingKeyHash),
            swap_in_token,
            swap_out_token,
            swap_in_amount: params.amount(K::SwapInAmount)?,
            min_receive: params.amount(K::MinReceive)?,
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }

    fn deposit(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: params.bytes_opt(K::PoolIdentifier).map(str::to_string),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::ReceiverStakingKeyHash),
            token_a: params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
            token_b: params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
            deposit_a: params.amount(K::DepositA)?,
            deposit_b: params.amount(K::DepositB)?,
            min_lp_receive: Default::default(),
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }

    fn withdraw(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
        let params = helpers::decode_datum(utxo, &WITHDRAW_DATUM)?;
        let lp_token = Asset::new(
            params.bytes(K::LpTokenPolicyId)?,
            params.bytes(K::LpTokenAssetName)?,
        );
        let pool_identifier = params.bytes_opt(K::PoolIdentifier).map(str::to_string).or_else(|| {
            lp_token
                .name_hex
                .strip_prefix(LP_PREFIX)
                .map(str::to_string)
        });

        Ok(Withdraw {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::ReceiverStakingKeyHash),
            lp_token,
            lp_token_amount: params.amount(K::LpTokenAmount)?,
            min_receive_a: Default::default(),
            min_receive_b: Default::default(),
            batcher_fee: params.amount(K::BatcherFee)?,
            deposit: self.config.fees.deposit,
        })
    }
}

impl AmmAnalyzer for SundaeSwapV3 {
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

    fn deposit_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Deposit>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.deposit(tx, utxo)
        })
    }

    fn withdraw_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Withdraw>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.withdraw(tx, utxo)
        })
    }
}
