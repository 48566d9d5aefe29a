use std::{collections::BTreeMap, fmt};

use alloy_primitives::{I256, U256};

use crate::{
    error::{AnalyzerError, AnalyzerResult},
    types::Token,
};

/// Names of the values captured from exchange datums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterKey {
    // Pool identity and legs
    PoolIdentifier,
    PoolNftPolicyId,
    PoolNftAssetName,
    PoolAssetAPolicyId,
    PoolAssetAAssetName,
    PoolAssetBPolicyId,
    PoolAssetBAssetName,
    LpTokenPolicyId,
    LpTokenAssetName,

    // Pool state
    TotalLpTokens,
    LqBound,
    ReserveA,
    ReserveB,
    TreasuryA,
    TreasuryB,
    ProjectTreasuryA,
    ProjectTreasuryB,
    ReserveTreasuryA,
    ReserveTreasuryB,
    PoolFeeNumerator,
    PoolFeeDenominator,
    BidFee,
    AskFee,
    ProtocolFee,
    ProjectFee,
    ReserveFee,
    TreasuryFee,
    ProtocolFees,
    AmplificationCoefficient,
    LastInteraction,
    MarketOpen,

    // Credentials
    SenderPubKeyHash,
    SenderStakingKeyHash,
    ReceiverPubKeyHash,
    ReceiverStakingKeyHash,
    SenderKeyHashes,

    // Orders
    Action,
    Direction,
    SwapInTokenPolicyId,
    SwapInTokenAssetName,
    SwapOutTokenPolicyId,
    SwapOutTokenAssetName,
    SwapInAmount,
    MinReceive,
    DepositA,
    DepositB,
    DeductedAmount,
    DeductedAmountA,
    DeductedAmountB,
    MinLpReceive,
    LpTokenAmount,
    MinReceiveA,
    MinReceiveB,
    BatcherFee,
    DepositFee,
    ExFeePerTokenNumerator,
    ExFeePerTokenDenominator,
    Deadline,
    AllowPartial,

    // Order book
    OfferTokenPolicyId,
    OfferTokenAssetName,
    OriginalOfferAmount,
    OfferAmount,
    AskTokenPolicyId,
    AskTokenAssetName,
    PriceNumerator,
    PriceDenominator,
    OrderNft,
    PartialFills,
    MakerFee,
    FillAmount,
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Captured value, byte strings are kept hex encoded.
#[derive(Clone, derive_more::Debug, PartialEq, Eq)]
pub enum ParameterValue {
    #[debug("{_0}")]
    Bytes(String),
    #[debug("{_0}")]
    Int(I256),
}

/// Parameters captured by matching a datum against a template.
///
/// A successful match may still leave keys unset when the template has
/// alternatives, accessors turn a missing key into a mismatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatumParameters(BTreeMap<ParameterKey, ParameterValue>);

impl DatumParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ParameterKey, value: ParameterValue) {
        self.0.insert(key, value);
    }

    pub fn insert_bytes(&mut self, key: ParameterKey, value: &[u8]) {
        self.insert(key, ParameterValue::Bytes(hex::encode(value)));
    }

    pub fn insert_int(&mut self, key: ParameterKey, value: I256) {
        self.insert(key, ParameterValue::Int(value));
    }

    pub fn get(&self, key: ParameterKey) -> Option<&ParameterValue> {
        self.0.get(&key)
    }

    pub fn contains(&self, key: ParameterKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterKey, &ParameterValue)> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: DatumParameters) {
        self.0.extend(other.0);
    }

    pub fn bytes(&self, key: ParameterKey) -> AnalyzerResult<&str> {
        match self.get(key) {
            Some(ParameterValue::Bytes(value)) => Ok(value),
            Some(ParameterValue::Int(_)) => Err(wrong_kind(key, "bytes")),
            None => Err(missing(key)),
        }
    }

    pub fn bytes_opt(&self, key: ParameterKey) -> Option<&str> {
        self.bytes(key).ok()
    }

    pub fn int(&self, key: ParameterKey) -> AnalyzerResult<I256> {
        match self.get(key) {
            Some(ParameterValue::Int(value)) => Ok(*value),
            Some(ParameterValue::Bytes(_)) => Err(wrong_kind(key, "int")),
            None => Err(missing(key)),
        }
    }

    /// Non-negative integer parameter.
    pub fn amount(&self, key: ParameterKey) -> AnalyzerResult<U256> {
        let value = self.int(key)?;
        crate::num::to_amount(value)
            .ok_or_else(|| AnalyzerError::mismatch(key.to_string(), "negative amount"))
    }

    /// Like [`Self::amount`], but a missing key reads as zero.
    pub fn amount_or_zero(&self, key: ParameterKey) -> AnalyzerResult<U256> {
        if self.contains(key) {
            self.amount(key)
        } else {
            Ok(U256::ZERO)
        }
    }

    /// Small non-negative integer, such as a constructor tag or flag.
    pub fn small(&self, key: ParameterKey) -> AnalyzerResult<u64> {
        let value = self.amount(key)?;
        u64::try_from(value).map_err(|_| AnalyzerError::mismatch(key.to_string(), "out of range"))
    }

    /// Token from a captured policy id and asset name pair.
    pub fn token(&self, policy: ParameterKey, name: ParameterKey) -> AnalyzerResult<Token> {
        Ok(Token::from_parts(self.bytes(policy)?, self.bytes(name)?))
    }
}

fn missing(key: ParameterKey) -> AnalyzerError {
    AnalyzerError::mismatch(key.to_string(), "missing parameter")
}

fn wrong_kind(key: ParameterKey, expected: &str) -> AnalyzerError {
    AnalyzerError::mismatch(key.to_string(), format!("expected {expected} parameter"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_accessors() {
        let mut params = DatumParameters::new();
        params.insert_bytes(ParameterKey::SwapInTokenPolicyId, &[0xaa]);
        params.insert_bytes(ParameterKey::SwapInTokenAssetName, &[]);
        params.insert_int(ParameterKey::MinReceive, I256::try_from(42).unwrap());
        params.insert_int(ParameterKey::Deadline, I256::try_from(-1).unwrap());

        assert_eq!(params.bytes(ParameterKey::SwapInTokenPolicyId).unwrap(), "aa");
        assert_eq!(params.amount(ParameterKey::MinReceive).unwrap(), U256::from(42));
        assert_eq!(params.small(ParameterKey::MinReceive).unwrap(), 42);
        assert!(params.amount(ParameterKey::Deadline).unwrap_err().is_mismatch());
        assert!(params.bytes(ParameterKey::MinReceive).unwrap_err().is_mismatch());
        assert!(params.int(ParameterKey::BatcherFee).unwrap_err().is_mismatch());
        assert_eq!(
            params.amount_or_zero(ParameterKey::BatcherFee).unwrap(),
            U256::ZERO
        );
        assert_eq!(
            params
                .token(
                    ParameterKey::SwapInTokenPolicyId,
                    ParameterKey::SwapInTokenAssetName
                )
                .unwrap(),
            Token::from_parts("aa", "")
        );
    }

    #[test]
    fn test_parameter_value_debug() {
        assert_eq!(
            format!("{:?}", ParameterValue::Bytes("ab".to_string())),
            "ab"
        );
        assert_eq!(
            format!("{:?}", ParameterValue::Int(I256::try_from(-7).unwrap())),
            "-7"
        );
    }
}
