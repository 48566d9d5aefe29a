use std::fmt;

use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};

use super::{Asset, SlotNo, Token, TxHash};
use crate::num;

/// Reference to a transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_hash: TxHash,
    pub output_index: u32,
}

impl OutputRef {
    pub fn new(tx_hash: impl Into<TxHash>, output_index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.output_index)
    }
}

/// Quantity of a native asset held by an output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(with = "num::amount")]
    pub quantity: U256,
}

/// Transaction output, either produced or consumed by a transaction.
///
/// Datum is the resolved inline or witnessed datum as CBOR hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: TxHash,
    pub output_index: u32,
    pub address: String,
    #[serde(default)]
    pub datum: Option<String>,
    #[serde(with = "num::amount")]
    pub lovelace: U256,
    #[serde(default)]
    pub assets: Vec<AssetBalance>,
}

impl Utxo {
    pub fn output_ref(&self) -> OutputRef {
        OutputRef::new(self.tx_hash.clone(), self.output_index)
    }

    /// Total quantity of `token` held by the output.
    pub fn quantity(&self, token: &Token) -> U256 {
        match token {
            Token::Native => self.lovelace,
            Token::Asset(asset) => self
                .assets
                .iter()
                .filter(|b| &b.asset == asset)
                .fold(U256::ZERO, |acc, b| acc.saturating_add(b.quantity)),
        }
    }

    pub fn holds(&self, asset: &Asset) -> bool {
        self.assets
            .iter()
            .any(|b| &b.asset == asset && !b.quantity.is_zero())
    }

    /// Balances of assets minted under `policy_id`.
    pub fn assets_under<'a>(
        &'a self,
        policy_id: &'a str,
    ) -> impl Iterator<Item = &'a AssetBalance> + 'a {
        self.assets
            .iter()
            .filter(move |b| b.asset.policy_id == policy_id && !b.quantity.is_zero())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemerPurpose {
    Spend,
    Mint,
    Cert,
    Reward,
}

/// Redeemer attached to a transaction, `index` points into the sorted
/// inputs for the spend purpose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redeemer {
    pub purpose: RedeemerPurpose,
    pub index: u32,
    /// Redeemer data as CBOR hex.
    pub data: String,
}

/// Minted (positive) or burned (negative) quantity of an asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMint {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(with = "num::signed")]
    pub amount: I256,
}

/// Decoded transaction as supplied by the chain follower.
///
/// Inputs are expected in ledger order, so spend redeemer indices
/// address them directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub slot: SlotNo,
    #[serde(default)]
    pub inputs: Vec<Utxo>,
    #[serde(default)]
    pub outputs: Vec<Utxo>,
    #[serde(default)]
    pub reference_inputs: Vec<OutputRef>,
    #[serde(default)]
    pub mints: Vec<AssetMint>,
    #[serde(default)]
    pub redeemers: Vec<Redeemer>,
    /// Hashes of all scripts executed or referenced by the transaction.
    #[serde(default)]
    pub script_hashes: Vec<String>,
}

impl Transaction {
    /// Spend redeemer attached to the input at `input_index`.
    pub fn spend_redeemer(&self, input_index: u32) -> Option<&Redeemer> {
        self.redeemers
            .iter()
            .find(|r| r.purpose == RedeemerPurpose::Spend && r.index == input_index)
    }

    pub fn touches_script(&self, script_hash: &str) -> bool {
        self.script_hashes.iter().any(|h| h == script_hash)
    }

    pub fn references_tx(&self, tx_hash: &str) -> bool {
        self.reference_inputs.iter().any(|r| r.tx_hash == tx_hash)
    }
}

/// Transactions of a single block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub slot: SlotNo,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utxo_quantity() {
        let asset = Asset::new("aa", "01");
        let utxo = Utxo {
            tx_hash: "00".to_string(),
            output_index: 1,
            address: "addr1".to_string(),
            datum: None,
            lovelace: U256::from(2_000_000),
            assets: vec![
                AssetBalance {
                    asset: asset.clone(),
                    quantity: U256::from(5),
                },
                AssetBalance {
                    asset: asset.clone(),
                    quantity: U256::from(7),
                },
            ],
        };
        assert_eq!(utxo.quantity(&Token::Native), U256::from(2_000_000));
        assert_eq!(utxo.quantity(&Token::Asset(asset.clone())), U256::from(12));
        assert_eq!(utxo.quantity(&Token::from_parts("bb", "")), U256::ZERO);
        assert!(utxo.holds(&asset));
        assert_eq!(utxo.assets_under("aa").count(), 2);
        assert_eq!(utxo.output_ref().to_string(), "00#1");
    }

    #[test]
    fn test_transaction_from_json() {
        let tx: Transaction = serde_json::from_str(
            r#"{
                "hash": "ab",
                "slot": 10,
                "outputs": [{
                    "tx_hash": "ab",
                    "output_index": 0,
                    "address": "addr1",
                    "lovelace": "3000000",
                    "assets": [{"policy_id": "cc", "name_hex": "", "quantity": 9}]
                }],
                "redeemers": [{"purpose": "spend", "index": 0, "data": "d87a80"}]
            }"#,
        )
        .unwrap();
        assert_eq!(tx.outputs[0].lovelace, U256::from(3_000_000));
        assert_eq!(tx.outputs[0].assets[0].quantity, U256::from(9));
        assert_eq!(tx.spend_redeemer(0).unwrap().data, "d87a80");
        assert!(tx.spend_redeemer(1).is_none());
    }
}
