use crate::error::AnalyzerError;

/// Failure to turn datum CBOR into a [`super::StructuredValue`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DatumError {
    #[error("invalid datum hex: {0}")]
    Hex(String),

    #[error("invalid datum cbor: {0}")]
    Cbor(String),

    #[error("unsupported datum shape: {0}")]
    UnsupportedShape(&'static str),

    #[error("invalid constructor tag: {0}")]
    ConstructorTag(u64),

    #[error("datum integer out of range")]
    IntegerOverflow,
}

impl From<DatumError> for AnalyzerError {
    fn from(value: DatumError) -> Self {
        AnalyzerError::mismatch("$", value.to_string())
    }
}
