//! Algorithms shared by exchange analyzers.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use itertools::Itertools;
use pallas_addresses::{Address, ShelleyDelegationPart, ShelleyPaymentPart};

use super::{AddressSet, CancelRule, Extracted, Failure, PoolIdentity};
use crate::{
    datum::{DatumParameters, DefinitionTemplate, ParameterKey, StructuredValue, match_template},
    error::{AnalyzerError, AnalyzerResult},
    num,
    types::{
        Asset, Dex, LiquidityPoolState, OperationLocation, OperationStatus, OrderStatus,
        PoolFee, RedeemerPurpose, SenderCredentials, Token, Transaction, Utxo,
    },
};

fn shelley_parts(address: &str) -> Option<(ShelleyPaymentPart, ShelleyDelegationPart)> {
    match Address::from_bech32(address).ok()? {
        Address::Shelley(shelley) => Some((shelley.payment().clone(), shelley.delegation().clone())),
        _ => None,
    }
}

/// Hash of the payment script of a script address.
pub fn payment_script_hash(address: &str) -> Option<String> {
    match shelley_parts(address)?.0 {
        ShelleyPaymentPart::Script(hash) => Some(hash.to_string()),
        ShelleyPaymentPart::Key(_) => None,
    }
}

/// Hash of the payment key of a key address.
pub fn payment_key_hash(address: &str) -> Option<String> {
    match shelley_parts(address)?.0 {
        ShelleyPaymentPart::Key(hash) => Some(hash.to_string()),
        ShelleyPaymentPart::Script(_) => None,
    }
}

/// Hash of the staking key or script of an address, if delegated by hash.
pub fn stake_key_hash(address: &str) -> Option<String> {
    shelley_parts(address)?
        .1
        .as_hash()
        .map(|hash| hash.to_string())
}

/// Decodes the output datum and matches it against `template`.
pub fn decode_datum(utxo: &Utxo, template: &DefinitionTemplate) -> AnalyzerResult<DatumParameters> {
    let datum = utxo
        .datum
        .as_deref()
        .ok_or_else(|| AnalyzerError::mismatch("$", "output carries no datum"))?;
    let value = StructuredValue::from_hex(datum)?;
    match_template(template, &value)
}

pub fn location(tx: &Transaction, index: u32) -> OperationLocation {
    OperationLocation::new(tx.hash.clone(), tx.slot, index)
}

pub fn sender(params: &DatumParameters, pkh: ParameterKey, skh: ParameterKey) -> SenderCredentials {
    SenderCredentials::new(
        params.bytes_opt(pkh).map(str::to_string),
        params.bytes_opt(skh).map(str::to_string),
    )
}

/// Applies `extract` to every output at `addresses`, tagging failures with
/// the output index.
pub fn extract_outputs<T, F>(tx: &Transaction, addresses: &AddressSet, extract: F) -> Vec<Extracted<T>>
where
    F: Fn(&Utxo) -> AnalyzerResult<T>,
{
    tx.outputs
        .iter()
        .filter(|u| addresses.contains(&u.address))
        .map(|u| {
            extract(u).map_err(|error| Failure {
                output_index: Some(u.output_index),
                error,
            })
        })
        .collect()
}

/// Amount of `token` put into an order: the output quantity less the
/// native fees when the token is the native unit.
pub fn offered_amount(
    tx: &Transaction,
    utxo: &Utxo,
    token: &Token,
    native_fees: &[U256],
) -> AnalyzerResult<U256> {
    let held = utxo.quantity(token);
    if !token.is_native() {
        return Ok(held);
    }
    subtract(tx, held, native_fees, "fees exceed order balance")
}

fn subtract(tx: &Transaction, from: U256, parts: &[U256], reason: &str) -> AnalyzerResult<U256> {
    let total = parts
        .iter()
        .try_fold(U256::ZERO, |acc, p| acc.checked_add(*p))
        .ok_or_else(|| AnalyzerError::malformed(&tx.hash, reason))?;
    from.checked_sub(total)
        .ok_or_else(|| AnalyzerError::malformed(&tx.hash, reason))
}

/// Reserve held by a pool: its balance less the declared carve-outs.
pub fn reserve(tx: &Transaction, balance: U256, carve_outs: &[U256]) -> AnalyzerResult<U256> {
    subtract(tx, balance, carve_outs, "carve-outs exceed pool balance")
}

/// Circulating LP supply under burn accounting, `MAX_INT - held`.
pub fn burn_accounted_supply(tx: &Transaction, held: U256) -> AnalyzerResult<U256> {
    num::MAX_INT
        .checked_sub(held)
        .ok_or_else(|| AnalyzerError::malformed(&tx.hash, "pool holds more than MAX_INT lp"))
}

/// Fails unless the output holds `asset`.
pub fn require_asset(utxo: &Utxo, asset: &Asset) -> AnalyzerResult<()> {
    if utxo.holds(asset) {
        Ok(())
    } else {
        Err(AnalyzerError::mismatch("$", format!("output does not hold {asset}")))
    }
}

/// The single asset held under `policy_id`, such as a pool NFT.
pub fn nft_under(utxo: &Utxo, policy_id: &str) -> AnalyzerResult<Asset> {
    let mut held = utxo.assets_under(policy_id);
    match (held.next(), held.next()) {
        (Some(balance), None) => Ok(balance.asset.clone()),
        (None, _) => Err(AnalyzerError::mismatch("$", format!("no asset under {policy_id}"))),
        (Some(_), Some(_)) => Err(AnalyzerError::mismatch(
            "$",
            format!("several assets under {policy_id}"),
        )),
    }
}

/// Checks the identity token a genuine pool output carries.
///
/// Identities resolved from the datum or a pool table are checked by the
/// analyzer itself.
pub fn check_pool_identity(utxo: &Utxo, identity: &PoolIdentity) -> AnalyzerResult<()> {
    match identity {
        PoolIdentity::ValidityAsset(asset) => require_asset(utxo, asset),
        PoolIdentity::NftPolicy(policy) => nft_under(utxo, policy).map(|_| ()),
        PoolIdentity::DatumNft | PoolIdentity::Table => Ok(()),
        PoolIdentity::None => Err(AnalyzerError::mismatch("$", "exchange has no pools")),
    }
}

/// Non-zero balances of native assets, excluding `except`.
pub fn held_assets<'a>(utxo: &'a Utxo, except: &'a [Asset]) -> Vec<&'a Asset> {
    utxo.assets
        .iter()
        .filter(|b| !b.quantity.is_zero() && !except.contains(&b.asset))
        .map(|b| &b.asset)
        .unique()
        .collect()
}

/// Token an order offers: its only held asset besides `except`, or the
/// native unit when it holds none.
pub fn offered_token(utxo: &Utxo, except: &[Asset]) -> AnalyzerResult<Token> {
    match held_assets(utxo, except).as_slice() {
        [] => Ok(Token::Native),
        [asset] => Ok(Token::Asset((*asset).clone())),
        _ => Err(AnalyzerError::mismatch("$", "order holds several assets")),
    }
}

/// Legs of a two-sided deposit order, the native unit first when present.
pub fn deposit_legs(utxo: &Utxo, except: &[Asset]) -> AnalyzerResult<(Token, Token)> {
    match held_assets(utxo, except).as_slice() {
        [asset] => Ok((Token::Native, Token::Asset((*asset).clone()))),
        [a, b] => Ok((Token::Asset((*a).clone()), Token::Asset((*b).clone()))),
        _ => Err(AnalyzerError::mismatch("$", "deposit must hold one or two assets")),
    }
}

/// Exchange neutral description of a pool output.
#[derive(Clone, Debug)]
pub struct PoolParts {
    pub identifier: String,
    pub token_a: Token,
    pub token_b: Token,
    pub carve_out_a: Vec<U256>,
    pub carve_out_b: Vec<U256>,
    pub lp_token: Option<Asset>,
    pub total_lp_tokens: U256,
    pub buy_fee: PoolFee,
    pub sell_fee: PoolFee,
    pub extra: BTreeMap<String, String>,
}

impl PoolParts {
    pub fn new(identifier: impl Into<String>, token_a: Token, token_b: Token, fee: PoolFee) -> Self {
        Self {
            identifier: identifier.into(),
            token_a,
            token_b,
            carve_out_a: vec![],
            carve_out_b: vec![],
            lp_token: None,
            total_lp_tokens: U256::ZERO,
            buy_fee: fee.clone(),
            sell_fee: fee,
            extra: BTreeMap::new(),
        }
    }

    pub fn carve_outs(mut self, a: Vec<U256>, b: Vec<U256>) -> Self {
        self.carve_out_a = a;
        self.carve_out_b = b;
        self
    }

    pub fn lp(mut self, lp_token: Option<Asset>, total_lp_tokens: U256) -> Self {
        self.lp_token = lp_token;
        self.total_lp_tokens = total_lp_tokens;
        self
    }

    pub fn extra(mut self, key: &str, value: impl ToString) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }
}

/// Builds the normalized pool state, placing the native leg (if any) in
/// `token_a` and deducting carve-outs plus `min_pool_ada` from the reserves.
pub fn pool_state(
    dex: Dex,
    tx: &Transaction,
    utxo: &Utxo,
    parts: PoolParts,
    min_pool_ada: U256,
) -> AnalyzerResult<LiquidityPoolState> {
    let PoolParts {
        identifier,
        token_a,
        token_b,
        carve_out_a,
        carve_out_b,
        lp_token,
        total_lp_tokens,
        buy_fee,
        sell_fee,
        extra,
    } = parts;
    let (token_a, token_b, mut carve_out_a, carve_out_b) = if token_b.is_native() {
        (token_b, token_a, carve_out_b, carve_out_a)
    } else {
        (token_a, token_b, carve_out_a, carve_out_b)
    };
    let token_b = token_b
        .into_asset()
        .ok_or_else(|| AnalyzerError::mismatch("$", "pool pairs the native unit with itself"))?;
    if token_a.is_native() {
        carve_out_a.push(min_pool_ada);
    }
    let reserve_a = reserve(tx, utxo.quantity(&token_a), &carve_out_a)?;
    let reserve_b = reserve(tx, utxo.quantity(&Token::Asset(token_b.clone())), &carve_out_b)?;
    Ok(LiquidityPoolState {
        dex,
        identifier,
        location: location(tx, utxo.output_index),
        address: utxo.address.clone(),
        token_a: token_a.into_asset(),
        token_b,
        reserve_a,
        reserve_b,
        lp_token,
        total_lp_tokens,
        buy_fee,
        sell_fee,
        extra,
    })
}

/// `Complete` status for every order input spent under a redeemer other
/// than the cancellation redeemer.
pub fn spent_operation_inputs(
    dex: Dex,
    tx: &Transaction,
    order_addresses: &AddressSet,
    cancel: &CancelRule,
) -> Vec<Extracted<OperationStatus>> {
    tx.inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| order_addresses.contains(&input.address))
        .filter_map(|(i, input)| {
            let redeemer = tx.spend_redeemer(i as u32)?;
            (!redeemer.data.eq_ignore_ascii_case(&cancel.redeemer)).then(|| {
                Ok(OperationStatus {
                    dex,
                    status: OrderStatus::Complete,
                    location: location(tx, i as u32),
                    closes: input.output_ref(),
                })
            })
        })
        .collect()
}

/// `Cancelled` status for every order input spent under the cancellation
/// redeemer.
///
/// Transactions not touching the order scripts, or missing a required
/// reference input, are rejected before any redeemer is compared.
pub fn cancelled_operation_inputs(
    dex: Dex,
    tx: &Transaction,
    order_addresses: &AddressSet,
    cancel: &CancelRule,
) -> Vec<Extracted<OperationStatus>> {
    let touches_orders = tx.script_hashes.iter().any(|h| order_addresses.has_script(h))
        || tx.inputs.iter().any(|i| order_addresses.contains(&i.address));
    if !touches_orders
        || !cancel
            .required_reference_tx_hashes
            .iter()
            .all(|h| tx.references_tx(h))
    {
        return vec![];
    }

    let mut statuses: Vec<Extracted<OperationStatus>> = tx
        .redeemers
        .iter()
        .filter(|r| r.purpose == RedeemerPurpose::Spend && r.index as usize >= tx.inputs.len())
        .map(|r| {
            Err(Failure {
                output_index: None,
                error: AnalyzerError::malformed(
                    &tx.hash,
                    format!("spend redeemer index {} out of range", r.index),
                ),
            })
        })
        .collect();

    statuses.extend(
        tx.inputs
            .iter()
            .enumerate()
            .filter(|(i, input)| {
                order_addresses.contains(&input.address)
                    && tx
                        .spend_redeemer(*i as u32)
                        .is_some_and(|r| r.data.eq_ignore_ascii_case(&cancel.redeemer))
            })
            .map(|(i, input)| {
                Ok(OperationStatus {
                    dex,
                    status: OrderStatus::Cancelled,
                    location: location(tx, i as u32),
                    closes: input.output_ref(),
                })
            }),
    );
    statuses
}
