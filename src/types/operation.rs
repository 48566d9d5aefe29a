use std::collections::BTreeMap;

use alloy_primitives::U256;
use fastnum::UD256;
use serde::Serialize;

use super::{Asset, Dex, OutputRef, SlotNo, Token, TxHash};
use crate::num;

/// Where an operation was observed: transaction, slot and the index of the
/// output (or consumed input, for statuses) within the transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct OperationLocation {
    pub tx_hash: TxHash,
    pub slot: SlotNo,
    pub index: u32,
}

impl OperationLocation {
    pub fn new(tx_hash: impl Into<TxHash>, slot: SlotNo, index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            slot,
            index,
        }
    }

    pub fn output_ref(&self) -> OutputRef {
        OutputRef::new(self.tx_hash.clone(), self.index)
    }
}

/// Fee as an exact fraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolFee {
    #[serde(with = "num::amount")]
    pub numerator: U256,
    #[serde(with = "num::amount")]
    pub denominator: U256,
}

impl PoolFee {
    pub fn new(numerator: U256, denominator: U256) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn from_basis(numerator: u64, denominator: u64) -> Self {
        Self::new(U256::from(numerator), U256::from(denominator))
    }

    /// Fee percentage, presentation only.
    pub fn percent(&self) -> UD256 {
        num::percent(self.numerator, self.denominator)
    }
}

/// Snapshot of a liquidity pool as of the output that carries it.
///
/// `token_a` is absent exactly when the pool pairs `token_b` against
/// the native unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LiquidityPoolState {
    pub dex: Dex,
    pub identifier: String,
    pub location: OperationLocation,
    pub address: String,
    pub token_a: Option<Asset>,
    pub token_b: Asset,
    #[serde(with = "num::amount")]
    pub reserve_a: U256,
    #[serde(with = "num::amount")]
    pub reserve_b: U256,
    pub lp_token: Option<Asset>,
    #[serde(with = "num::amount")]
    pub total_lp_tokens: U256,
    pub buy_fee: PoolFee,
    pub sell_fee: PoolFee,
    /// Exchange specific figures (treasuries, amplification, ...).
    pub extra: BTreeMap<String, String>,
}

impl LiquidityPoolState {
    pub fn token_a(&self) -> Token {
        Token::from(self.token_a.clone())
    }

    pub fn token_b(&self) -> Token {
        Token::Asset(self.token_b.clone())
    }

    /// Whether the pool trades exactly the given pair, in any order.
    pub fn pairs(&self, x: &Token, y: &Token) -> bool {
        let (a, b) = (self.token_a(), self.token_b());
        (&a == x && &b == y) || (&a == y && &b == x)
    }

    /// Price of `token_b` in units of `token_a`.
    pub fn price(&self) -> UD256 {
        num::ratio(self.reserve_a, self.reserve_b)
    }
}

/// Owner credentials of an order, as hex encoded key hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SenderCredentials {
    pub pub_key_hash: Option<String>,
    pub staking_key_hash: Option<String>,
}

impl SenderCredentials {
    pub fn new(pub_key_hash: Option<String>, staking_key_hash: Option<String>) -> Self {
        Self {
            pub_key_hash,
            staking_key_hash,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pub_key_hash.is_none() && self.staking_key_hash.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Swap {
    pub dex: Dex,
    pub location: OperationLocation,
    pub address: String,
    pub pool_identifier: Option<String>,
    pub sender: SenderCredentials,
    pub swap_in_token: Token,
    pub swap_out_token: Token,
    #[serde(with = "num::amount")]
    pub swap_in_amount: U256,
    #[serde(with = "num::amount")]
    pub min_receive: U256,
    #[serde(with = "num::amount")]
    pub batcher_fee: U256,
    #[serde(with = "num::amount")]
    pub deposit: U256,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Deposit {
    pub dex: Dex,
    pub location: OperationLocation,
    pub address: String,
    pub pool_identifier: Option<String>,
    pub sender: SenderCredentials,
    pub token_a: Token,
    pub token_b: Token,
    #[serde(with = "num::amount")]
    pub deposit_a: U256,
    #[serde(with = "num::amount")]
    pub deposit_b: U256,
    #[serde(with = "num::amount")]
    pub min_lp_receive: U256,
    #[serde(with = "num::amount")]
    pub batcher_fee: U256,
    #[serde(with = "num::amount")]
    pub deposit: U256,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Withdraw {
    pub dex: Dex,
    pub location: OperationLocation,
    pub address: String,
    pub pool_identifier: Option<String>,
    pub sender: SenderCredentials,
    pub lp_token: Asset,
    #[serde(with = "num::amount")]
    pub lp_token_amount: U256,
    #[serde(with = "num::amount")]
    pub min_receive_a: U256,
    #[serde(with = "num::amount")]
    pub min_receive_b: U256,
    #[serde(with = "num::amount")]
    pub batcher_fee: U256,
    #[serde(with = "num::amount")]
    pub deposit: U256,
}

/// One-sided deposit: part of `swap_in_token` is swapped into
/// `forward_token` and both are deposited.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Zap {
    pub dex: Dex,
    pub location: OperationLocation,
    pub address: String,
    pub pool_identifier: Option<String>,
    pub sender: SenderCredentials,
    pub swap_in_token: Token,
    pub forward_token: Token,
    #[serde(with = "num::amount")]
    pub swap_in_amount: U256,
    #[serde(with = "num::amount")]
    pub min_lp_receive: U256,
    #[serde(with = "num::amount")]
    pub batcher_fee: U256,
    #[serde(with = "num::amount")]
    pub deposit: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Complete,
    Cancelled,
}

/// Closes the order output `closes`, consumed at input `location.index`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct OperationStatus {
    pub dex: Dex,
    pub status: OrderStatus,
    pub location: OperationLocation,
    pub closes: OutputRef,
}

/// Limit order resting on an order book.
///
/// `price` is `original_amount / to_amount`, the amount offered per unit
/// asked, zero when nothing is asked.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderBookOrder {
    pub dex: Dex,
    pub identifier: String,
    pub location: OperationLocation,
    pub address: String,
    pub sender: SenderCredentials,
    pub from_token: Token,
    pub to_token: Token,
    #[serde(with = "num::amount")]
    pub original_amount: U256,
    #[serde(with = "num::amount")]
    pub unfilled_amount: U256,
    #[serde(with = "num::amount")]
    pub to_amount: U256,
    #[serde(serialize_with = "num::serialize_decimal")]
    pub price: UD256,
    pub partial_fills: u64,
    #[serde(with = "num::amount")]
    pub batcher_fee: U256,
    #[serde(with = "num::amount")]
    pub deposit: U256,
}

/// Fill of a resting order observed in a consuming transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderBookMatch {
    pub dex: Dex,
    pub location: OperationLocation,
    pub matched_order: OutputRef,
    pub receiver: SenderCredentials,
    pub matched_token: Token,
    #[serde(with = "num::amount")]
    pub matched_amount: U256,
}

impl OrderBookMatch {
    /// Key identifying this match across reprocessing.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.location.tx_hash, self.location.index, self.matched_order
        )
    }
}

/// A recorded swap replaced by an order book order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderConversion {
    pub replaced: OutputRef,
    pub order: OrderBookOrder,
}

/// Normalized result of analyzing a transaction.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainOperation {
    LiquidityPoolState(LiquidityPoolState),
    Swap(Swap),
    Deposit(Deposit),
    Withdraw(Withdraw),
    Zap(Zap),
    OperationStatus(OperationStatus),
    OrderBookOrder(OrderBookOrder),
    OrderBookMatch(OrderBookMatch),
    OrderConversion(OrderConversion),
}

impl DomainOperation {
    pub fn dex(&self) -> Dex {
        match self {
            DomainOperation::LiquidityPoolState(op) => op.dex,
            DomainOperation::Swap(op) => op.dex,
            DomainOperation::Deposit(op) => op.dex,
            DomainOperation::Withdraw(op) => op.dex,
            DomainOperation::Zap(op) => op.dex,
            DomainOperation::OperationStatus(op) => op.dex,
            DomainOperation::OrderBookOrder(op) => op.dex,
            DomainOperation::OrderBookMatch(op) => op.dex,
            DomainOperation::OrderConversion(op) => op.order.dex,
        }
    }

    pub fn location(&self) -> &OperationLocation {
        match self {
            DomainOperation::LiquidityPoolState(op) => &op.location,
            DomainOperation::Swap(op) => &op.location,
            DomainOperation::Deposit(op) => &op.location,
            DomainOperation::Withdraw(op) => &op.location,
            DomainOperation::Zap(op) => &op.location,
            DomainOperation::OperationStatus(op) => &op.location,
            DomainOperation::OrderBookOrder(op) => &op.location,
            DomainOperation::OrderBookMatch(op) => &op.location,
            DomainOperation::OrderConversion(op) => &op.order.location,
        }
    }

    /// Index of the transaction output the operation was extracted from,
    /// `None` for operations derived from consumed inputs.
    pub fn source_output(&self) -> Option<u32> {
        match self {
            DomainOperation::LiquidityPoolState(_)
            | DomainOperation::Swap(_)
            | DomainOperation::Deposit(_)
            | DomainOperation::Withdraw(_)
            | DomainOperation::Zap(_)
            | DomainOperation::OrderBookOrder(_) => Some(self.location().index),
            DomainOperation::OperationStatus(_)
            | DomainOperation::OrderBookMatch(_)
            | DomainOperation::OrderConversion(_) => None,
        }
    }
}

macro_rules! impl_from_operation {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for DomainOperation {
                fn from(value: $variant) -> Self {
                    DomainOperation::$variant(value)
                }
            }
        )*
    };
}

impl_from_operation!(
    LiquidityPoolState,
    Swap,
    Deposit,
    Withdraw,
    Zap,
    OperationStatus,
    OrderBookOrder,
    OrderBookMatch,
    OrderConversion
);
