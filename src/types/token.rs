use std::fmt;

use serde::{Deserialize, Serialize};

/// Native asset identified by minting policy and hex encoded asset name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asset {
    pub policy_id: String,
    pub name_hex: String,
}

impl Asset {
    pub fn new(policy_id: impl Into<String>, name_hex: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            name_hex: name_hex.into(),
        }
    }

    /// Concatenated policy id and asset name, as used in ledger value maps.
    pub fn unit(&self) -> String {
        format!("{}{}", self.policy_id, self.name_hex)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.policy_id, self.name_hex)
    }
}

/// Either the native ledger unit (lovelace) or a native asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Token {
    Native,
    Asset(Asset),
}

impl Token {
    /// Builds a token from a Plutus asset class, where the empty
    /// policy id and empty name denote the native unit.
    pub fn from_parts(policy_id: &str, name_hex: &str) -> Self {
        if policy_id.is_empty() && name_hex.is_empty() {
            Token::Native
        } else {
            Token::Asset(Asset::new(policy_id, name_hex))
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Token::Native)
    }

    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Token::Native => None,
            Token::Asset(asset) => Some(asset),
        }
    }

    pub fn into_asset(self) -> Option<Asset> {
        match self {
            Token::Native => None,
            Token::Asset(asset) => Some(asset),
        }
    }

    /// Raw `policy ++ name` bytes, empty for the native unit.
    pub fn unit_bytes(&self) -> Vec<u8> {
        match self {
            Token::Native => vec![],
            Token::Asset(asset) => hex::decode(asset.unit()).unwrap_or_default(),
        }
    }
}

impl From<Asset> for Token {
    fn from(value: Asset) -> Self {
        Token::Asset(value)
    }
}

impl From<Option<Asset>> for Token {
    fn from(value: Option<Asset>) -> Self {
        value.map(Token::Asset).unwrap_or(Token::Native)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Native => write!(f, "lovelace"),
            Token::Asset(asset) => asset.fmt(f),
        }
    }
}
