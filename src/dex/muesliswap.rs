//! MuesliSwap: an order book whose orders may also be routed through
//! liquidity pools.
//!
//! Orders allowing partial fills rest on the book. The remaining orders are
//! reported as swaps, the reconciler turns those without a pool into book
//! orders.

use std::{collections::HashSet, sync::LazyLock};

use alloy_primitives::U256;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        Failure, FeeSchedule, HybridAnalyzer, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{DatumParameters, DefinitionTemplate, ParameterKey as K, bytes, common, constr, int},
    error::{AnalyzerError, AnalyzerResult},
    num,
    types::{
        Asset, Dex, LiquidityPoolState, OrderBookMatch, OrderBookOrder, PoolFee, Swap, Token,
        Transaction, Utxo,
    },
};

const POOL_SCRIPT_HASH: &str = "de9b756719341e79785aa13c164e7fe68c189ed04d61c9876b2fe53f";
const ORDER_SCRIPT_HASH: &str = "00fb107bfbd51b3a5638867d3688e986ba38ff34fb738f5bd42b20d5";
const POOL_NFT_POLICY: &str = "909133088303c49f3a30f1cc8ed553a73857a29779f6c6561cd8093f";
const LP_POLICY: &str = "af3d70acf4bd5b3abb319a7d75c89fb3e56eafcdd46b2e9b57a2557f";
const START_SLOT: u64 = 60_000_000;
const CANCEL_REDEEMER: &str = "d87980";

static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            common::asset_class(K::PoolAssetAPolicyId, K::PoolAssetAAssetName),
            common::asset_class(K::PoolAssetBPolicyId, K::PoolAssetBAssetName),
            int(K::TotalLpTokens),
            int(K::PoolFeeNumerator),
        ],
    )
});

/// Lovelace attached covers the matcher fee and the ADA returned with
/// the bought tokens.
static ORDER_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![constr(
            0,
            vec![
                common::address(K::SenderPubKeyHash, K::SenderStakingKeyHash),
                bytes(K::SwapOutTokenPolicyId),
                bytes(K::SwapOutTokenAssetName),
                bytes(K::SwapInTokenPolicyId),
                bytes(K::SwapInTokenAssetName),
                int(K::MinReceive),
                common::boolean(K::AllowPartial),
                int(K::BatcherFee),
            ],
        )],
    )
});

/// Order decoded from an order book output.
struct Order {
    params: DatumParameters,
    sell: Token,
    buy: Token,
    sell_amount: U256,
    buy_amount: U256,
    allow_partial: bool,
}

fn order(tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Order> {
    let params = helpers::decode_datum(utxo, &ORDER_DATUM)?;
    let sell = params.token(K::SwapInTokenPolicyId, K::SwapInTokenAssetName)?;
    let sell_amount = helpers::offered_amount(tx, utxo, &sell, &[params.amount(K::BatcherFee)?])?;
    Ok(Order {
        buy: params.token(K::SwapOutTokenPolicyId, K::SwapOutTokenAssetName)?,
        buy_amount: params.amount(K::MinReceive)?,
        allow_partial: params.small(K::AllowPartial)? == 1,
        sell,
        sell_amount,
        params,
    })
}

/// Pool side of MuesliSwap.
#[derive(Clone, Debug)]
pub struct MuesliPools {
    config: ExchangeConfig,
}

impl MuesliPools {
    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        let nft = helpers::nft_under(utxo, POOL_NFT_POLICY)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let parts = PoolParts::new(
            nft.name_hex.clone(),
            params.token(K::PoolAssetAPolicyId, K::PoolAssetAAssetName)?,
            params.token(K::PoolAssetBPolicyId, K::PoolAssetBAssetName)?,
            PoolFee::new(
                params.amount(K::PoolFeeNumerator)?,
                self.config.fees.fee_denominator,
            ),
        )
        .lp(
            Some(Asset::new(LP_POLICY, nft.name_hex)),
            params.amount(K::TotalLpTokens)?,
        );
        helpers::pool_state(self.config.dex, tx, utxo, parts, self.config.fees.min_pool_ada)
    }

    fn swap(&self, ctx: &AnalyzerContext, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let order = order(tx, utxo)?;
        if order.allow_partial {
            return Err(AnalyzerError::mismatch("$.0.6", "order rests on the book"));
        }
        let pool_identifier = ctx
            .liquidity_pool_from_pair(self.config.dex, &order.sell, &order.buy)
            .map(|pool| pool.identifier);

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier,
            sender: helpers::sender(&order.params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            swap_in_token: order.sell,
            swap_out_token: order.buy,
            swap_in_amount: order.sell_amount,
            min_receive: order.buy_amount,
            batcher_fee: order.params.amount(K::BatcherFee)?,
            deposit: U256::ZERO,
        })
    }
}

impl AmmAnalyzer for MuesliPools {
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
}

#[derive(Clone, Debug)]
pub struct MuesliSwap {
    pools: MuesliPools,
}

impl Default for MuesliSwap {
    fn default() -> Self {
        Self::new()
    }
}

impl MuesliSwap {
    pub fn new() -> Self {
        Self {
            pools: MuesliPools {
                config: ExchangeConfig {
                    dex: Dex::MuesliSwap,
                    start_slot: START_SLOT,
                    pool_addresses: AddressSet::script_hashes(&[POOL_SCRIPT_HASH]),
                    order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                    pool_identity: PoolIdentity::NftPolicy(POOL_NFT_POLICY.to_string()),
                    lp_token_policy: Some(LP_POLICY.to_string()),
                    cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                    fees: FeeSchedule::new(950_000, 1_700_000, 30, 10_000),
                },
            },
        }
    }

    fn book_order(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<OrderBookOrder> {
        let order = order(tx, utxo)?;
        if !order.allow_partial {
            return Err(AnalyzerError::mismatch("$.0.6", "order is routed as a swap"));
        }

        Ok(OrderBookOrder {
            dex: self.pools.config.dex,
            identifier: utxo.output_ref().to_string(),
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            sender: helpers::sender(&order.params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            from_token: order.sell,
            to_token: order.buy,
            original_amount: order.sell_amount,
            unfilled_amount: order.sell_amount,
            to_amount: order.buy_amount,
            price: num::ratio(order.sell_amount, order.buy_amount),
            partial_fills: 0,
            batcher_fee: order.params.amount(K::BatcherFee)?,
            deposit: U256::ZERO,
        })
    }

    /// Fill of the order consumed at `input_index`, in offered units.
    ///
    /// Payments to the creator in the bought token are credited in output
    /// order until the asked amount is covered, outputs in `credited` are
    /// already taken by orders consumed earlier in the transaction.
    fn fill(
        &self,
        tx: &Transaction,
        input_index: usize,
        input: &Utxo,
        credited: &mut HashSet<usize>,
    ) -> AnalyzerResult<OrderBookMatch> {
        let order = order(tx, input)?;
        let receiver =
            helpers::sender(&order.params, K::SenderPubKeyHash, K::SenderStakingKeyHash);
        let creator = receiver
            .pub_key_hash
            .as_deref()
            .ok_or_else(|| AnalyzerError::mismatch("$.0.0", "creator is not a key"))?;

        let mut paid = U256::ZERO;
        for (i, output) in tx.outputs.iter().enumerate() {
            if paid >= order.buy_amount && !paid.is_zero() {
                break;
            }
            let quantity = output.quantity(&order.buy);
            if quantity.is_zero()
                || credited.contains(&i)
                || helpers::payment_key_hash(&output.address).as_deref() != Some(creator)
            {
                continue;
            }
            credited.insert(i);
            paid = paid.saturating_add(quantity);
        }
        if paid.is_zero() {
            return Err(AnalyzerError::mismatch("$", "nothing paid to the creator"));
        }

        Ok(OrderBookMatch {
            dex: self.pools.config.dex,
            location: helpers::location(tx, input_index as u32),
            matched_order: input.output_ref(),
            receiver,
            matched_amount: num::pro_rata(order.sell_amount, paid, order.buy_amount)
                .min(order.sell_amount),
            matched_token: order.sell,
        })
    }
}

impl HybridAnalyzer for MuesliSwap {
    fn config(&self) -> &ExchangeConfig {
        &self.pools.config
    }

    fn amm(&self) -> Option<&dyn AmmAnalyzer> {
        Some(&self.pools)
    }

    fn order_book_orders(
        &self,
        _ctx: &AnalyzerContext,
        tx: &Transaction,
    ) -> Vec<Extracted<OrderBookOrder>> {
        helpers::extract_outputs(tx, &self.pools.config.order_addresses, |utxo| {
            self.book_order(tx, utxo)
        })
    }

    fn order_book_matches(
        &self,
        _ctx: &AnalyzerContext,
        tx: &Transaction,
    ) -> Vec<Extracted<OrderBookMatch>> {
        let config = &self.pools.config;
        let mut credited = HashSet::new();
        tx.inputs
            .iter()
            .enumerate()
            .filter(|(i, input)| {
                config.order_addresses.contains(&input.address)
                    && tx
                        .spend_redeemer(*i as u32)
                        .is_some_and(|r| !r.data.eq_ignore_ascii_case(&config.cancel.redeemer))
            })
            .map(|(i, input)| {
                self.fill(tx, i, input, &mut credited).map_err(|error| Failure {
                    output_index: None,
                    error,
                })
            })
            .collect()
    }
}
