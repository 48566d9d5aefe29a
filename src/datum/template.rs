use std::sync::Arc;

use alloy_primitives::{I256, U256};

use super::{DatumParameters, ParameterKey, StructuredValue};
use crate::error::AnalyzerResult;

/// Either a value the datum must contain or a key to capture it under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot<T> {
    Literal(T),
    Capture(ParameterKey),
}

/// Matcher delegated the whole node, used for alternatives and optional parts.
pub type CustomMatcher =
    Arc<dyn Fn(&StructuredValue, &mut DatumParameters) -> AnalyzerResult<()> + Send + Sync>;

/// Declarative shape of a datum.
#[derive(Clone, derive_more::Debug)]
pub enum DefinitionTemplate {
    Constr {
        tag: Slot<u64>,
        fields: Vec<DefinitionTemplate>,
    },
    Int(Slot<I256>),
    /// Byte string, literals are lowercase hex.
    Bytes(Slot<String>),
    List(Vec<DefinitionTemplate>),
    Custom(#[debug(skip)] CustomMatcher),
}

pub fn constr(tag: u64, fields: Vec<DefinitionTemplate>) -> DefinitionTemplate {
    DefinitionTemplate::Constr {
        tag: Slot::Literal(tag),
        fields,
    }
}

/// Constructor of any tag, the tag is captured under `key`.
pub fn constr_capture(key: ParameterKey, fields: Vec<DefinitionTemplate>) -> DefinitionTemplate {
    DefinitionTemplate::Constr {
        tag: Slot::Capture(key),
        fields,
    }
}

pub fn int(key: ParameterKey) -> DefinitionTemplate {
    DefinitionTemplate::Int(Slot::Capture(key))
}

pub fn int_literal(value: u64) -> DefinitionTemplate {
    DefinitionTemplate::Int(Slot::Literal(I256::from_raw(U256::from(value))))
}

pub fn bytes(key: ParameterKey) -> DefinitionTemplate {
    DefinitionTemplate::Bytes(Slot::Capture(key))
}

pub fn bytes_literal(hex: &str) -> DefinitionTemplate {
    DefinitionTemplate::Bytes(Slot::Literal(hex.to_ascii_lowercase()))
}

pub fn list(items: Vec<DefinitionTemplate>) -> DefinitionTemplate {
    DefinitionTemplate::List(items)
}

pub fn custom<F>(matcher: F) -> DefinitionTemplate
where
    F: Fn(&StructuredValue, &mut DatumParameters) -> AnalyzerResult<()> + Send + Sync + 'static,
{
    DefinitionTemplate::Custom(Arc::new(matcher))
}

/// Accepts any node without capturing anything.
pub fn ignore() -> DefinitionTemplate {
    custom(|_, _| Ok(()))
}
