use alloy_primitives::{I256, U256};
use fastnum::{
    UD256, bint,
    decimal::{Context, RoundingMode},
};

/// Burn-accounting total supply of LP tokens minted at pool creation.
///
/// Exchanges using burn accounting lock the whole supply at the pool and
/// release it on deposits, so circulating supply is `MAX_INT - held`.
pub const MAX_INT: U256 = U256::from_limbs([0x7fff_ffff_ffff_ffff, 0, 0, 0]);

/// Converts an exact integer amount into an unsigned decimal.
pub fn to_decimal(value: U256) -> UD256 {
    let unscaled =
        bint::UInt::<4>::from_le_slice(value.as_le_slice()).expect("to_decimal: U256 -> UInt::<4>");
    UD256::from_parts(
        unscaled,
        0,
        Context::default().with_rounding_mode(RoundingMode::Floor),
    )
}

/// Exact ratio of two amounts, zero when the denominator is zero.
pub fn ratio(numerator: U256, denominator: U256) -> UD256 {
    if denominator.is_zero() {
        return UD256::ZERO;
    }
    to_decimal(numerator) / to_decimal(denominator)
}

/// `value * numerator / denominator` rounded down, `value` when the
/// denominator is zero.
pub fn pro_rata(value: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return value;
    }
    value.saturating_mul(numerator) / denominator
}

/// Percentage `numerator / denominator * 100`, zero when the denominator is zero.
pub fn percent(numerator: U256, denominator: U256) -> UD256 {
    ratio(numerator.saturating_mul(U256::from(100)), denominator)
}

/// Converts a signed datum integer into a non-negative amount.
pub fn to_amount(value: I256) -> Option<U256> {
    if value.is_negative() {
        None
    } else {
        Some(value.into_raw())
    }
}

pub(crate) fn serialize_decimal<S: serde::Serializer>(
    value: &UD256,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Serde adaptor writing amounts as decimal strings and reading either
/// decimal/hex strings or plain JSON numbers.
pub mod amount {
    use std::str::FromStr;

    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) => U256::from_str(&s).map_err(de::Error::custom),
        }
    }
}

/// Signed counterpart of [`amount`], used by mint/burn quantities.
pub mod signed {
    use std::str::FromStr;

    use alloy_primitives::I256;
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &I256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<I256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => I256::try_from(n).map_err(de::Error::custom),
            Raw::Text(s) => I256::from_str(&s).map_err(de::Error::custom),
        }
    }
}
