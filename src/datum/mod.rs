//! Plutus datum decoding and template matching.
//!
//! Datums arrive as CBOR hex and are decoded into [`StructuredValue`], the
//! subset of Plutus data the supported exchanges use. A [`DefinitionTemplate`]
//! then describes the expected shape of a datum and names the parts to
//! capture, [`match_template`] walks both and collects [`DatumParameters`].

pub mod common;
mod error;
mod matcher;
mod params;
mod template;

use alloy_primitives::{I256, U256};
use pallas_codec::{minicbor, utils::Int};
use pallas_primitives::{BigInt, BoundedBytes, Constr, MaybeIndefArray, PlutusData};

pub use error::DatumError;
pub use matcher::{match_into, match_template};
pub use params::{DatumParameters, ParameterKey, ParameterValue};
pub use template::*;

/// Immutable decoded Plutus data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructuredValue {
    Int(I256),
    Bytes(Vec<u8>),
    List(Vec<StructuredValue>),
    /// Constructor with its logical index, not the CBOR tag.
    Constr {
        tag: u64,
        fields: Vec<StructuredValue>,
    },
}

impl StructuredValue {
    pub fn from_hex(datum: &str) -> Result<Self, DatumError> {
        let bytes = hex::decode(datum).map_err(|e| DatumError::Hex(e.to_string()))?;
        Self::from_cbor(&bytes)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, DatumError> {
        let data: PlutusData =
            minicbor::decode(bytes).map_err(|e| DatumError::Cbor(e.to_string()))?;
        Self::try_from(&data)
    }

    /// Canonical CBOR hex encoding of the value.
    pub fn to_hex(&self) -> Result<String, DatumError> {
        let data = PlutusData::from(self);
        minicbor::to_vec(&data)
            .map(hex::encode)
            .map_err(|e| DatumError::Cbor(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StructuredValue::Int(_) => "int",
            StructuredValue::Bytes(_) => "bytes",
            StructuredValue::List(_) => "list",
            StructuredValue::Constr { .. } => "constr",
        }
    }

    pub fn constr(tag: u64, fields: Vec<StructuredValue>) -> Self {
        StructuredValue::Constr { tag, fields }
    }

    pub fn int(value: i64) -> Self {
        StructuredValue::Int(I256::try_from(value).unwrap_or_default())
    }

    pub fn big(value: U256) -> Self {
        StructuredValue::Int(I256::from_raw(value))
    }

    pub fn bytes_hex(value: &str) -> Self {
        StructuredValue::Bytes(hex::decode(value).unwrap_or_default())
    }
}

fn constructor_index(tag: u64, any_constructor: Option<u64>) -> Result<u64, DatumError> {
    match tag {
        121..=127 => Ok(tag - 121),
        1280..=1400 => Ok(tag - 1280 + 7),
        102 => any_constructor.ok_or(DatumError::ConstructorTag(tag)),
        tag => Err(DatumError::ConstructorTag(tag)),
    }
}

fn big_to_signed(bytes: &[u8]) -> Result<I256, DatumError> {
    let unsigned = U256::try_from_be_slice(bytes).ok_or(DatumError::IntegerOverflow)?;
    I256::try_from(unsigned).map_err(|_| DatumError::IntegerOverflow)
}

impl TryFrom<&PlutusData> for StructuredValue {
    type Error = DatumError;

    fn try_from(value: &PlutusData) -> Result<Self, Self::Error> {
        Ok(match value {
            PlutusData::Constr(constr) => StructuredValue::Constr {
                tag: constructor_index(constr.tag, constr.any_constructor)?,
                fields: constr
                    .fields
                    .iter()
                    .map(StructuredValue::try_from)
                    .collect::<Result<_, _>>()?,
            },
            PlutusData::Map(_) => return Err(DatumError::UnsupportedShape("map")),
            PlutusData::Array(items) => StructuredValue::List(
                items
                    .iter()
                    .map(StructuredValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            PlutusData::BigInt(BigInt::Int(int)) => StructuredValue::Int(
                I256::try_from(i128::from(*int)).map_err(|_| DatumError::IntegerOverflow)?,
            ),
            PlutusData::BigInt(BigInt::BigUInt(bytes)) => {
                StructuredValue::Int(big_to_signed(bytes)?)
            }
            // CBOR negative bignum n encodes -1 - n
            PlutusData::BigInt(BigInt::BigNInt(bytes)) => StructuredValue::Int(
                I256::MINUS_ONE
                    .checked_sub(big_to_signed(bytes)?)
                    .ok_or(DatumError::IntegerOverflow)?,
            ),
            PlutusData::BoundedBytes(bytes) => StructuredValue::Bytes(bytes.to_vec()),
        })
    }
}

fn encode_tag(index: u64) -> (u64, Option<u64>) {
    match index {
        0..=6 => (121 + index, None),
        7..=127 => (1280 + index - 7, None),
        _ => (102, Some(index)),
    }
}

fn encode_array(items: &[StructuredValue]) -> MaybeIndefArray<PlutusData> {
    let items = items.iter().map(PlutusData::from).collect::<Vec<_>>();
    if items.is_empty() {
        MaybeIndefArray::Def(items)
    } else {
        MaybeIndefArray::Indef(items)
    }
}

impl From<&StructuredValue> for PlutusData {
    fn from(value: &StructuredValue) -> Self {
        match value {
            StructuredValue::Int(int) => PlutusData::BigInt(encode_int(*int)),
            StructuredValue::Bytes(bytes) => {
                PlutusData::BoundedBytes(BoundedBytes::from(bytes.clone()))
            }
            StructuredValue::List(items) => PlutusData::Array(encode_array(items)),
            StructuredValue::Constr { tag, fields } => {
                let (tag, any_constructor) = encode_tag(*tag);
                PlutusData::Constr(Constr {
                    tag,
                    any_constructor,
                    fields: encode_array(fields),
                })
            }
        }
    }
}

fn encode_int(value: I256) -> BigInt {
    if let Ok(small) = i128::try_from(value)
        && let Ok(int) = Int::try_from(small)
    {
        return BigInt::Int(int);
    }
    if value.is_negative() {
        let magnitude = value.unsigned_abs() - U256::from(1);
        BigInt::BigNInt(BoundedBytes::from(magnitude.to_be_bytes_trimmed_vec()))
    } else {
        BigInt::BigUInt(BoundedBytes::from(value.into_raw().to_be_bytes_trimmed_vec()))
    }
}
