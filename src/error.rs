use std::fmt;

use crate::types::Dex;

/// Kind of on-chain entity an analyzer failed to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    LiquidityPool,
    Order,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::LiquidityPool => write!(f, "liquidity pool"),
            ReferenceKind::Order => write!(f, "order"),
        }
    }
}

/// Error produced while analyzing a transaction.
///
/// Only [`AnalyzerError::UnresolvedReference`] is worth retrying,
/// mismatches are expected for every output that is not a recognized
/// operation and are dropped by the analyzers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("datum mismatch at {path}: {reason}")]
    DecodeMismatch { path: String, reason: String },

    #[error("unresolved {kind} reference: {identifier}")]
    UnresolvedReference {
        kind: ReferenceKind,
        identifier: String,
    },

    #[error("configuration defect, dex: {dex}, reason: {reason}")]
    ConfigurationDefect { dex: Dex, reason: String },

    #[error("malformed transaction {tx_hash}: {reason}")]
    MalformedTransaction { tx_hash: String, reason: String },
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

impl AnalyzerError {
    pub(crate) fn mismatch(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DecodeMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolved_pool(identifier: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            kind: ReferenceKind::LiquidityPool,
            identifier: identifier.into(),
        }
    }

    pub(crate) fn malformed(tx_hash: &str, reason: impl Into<String>) -> Self {
        Self::MalformedTransaction {
            tx_hash: tx_hash.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn defect(dex: Dex, reason: impl Into<String>) -> Self {
        Self::ConfigurationDefect {
            dex,
            reason: reason.into(),
        }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::DecodeMismatch { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnresolvedReference { .. })
    }
}

/// Error returned by the [`crate::indexer::Indexer`] driver.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("block out of order, expected after: {0}, got: {1}")]
    BlockOutOfOrder(u64, u64),

    #[error("transaction {0} at slot {1} does not belong to block at slot {2}")]
    SlotMismatch(String, u64, u64),

    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
