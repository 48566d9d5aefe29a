//! Test fixtures: addresses, UTXOs, transactions and datum builders.
//!
//! [`TxBuilder`] and [`UtxoBuilder`] assemble transactions the way the chain
//! follower would supply them, [`plutus`] builds the Plutus data shapes the
//! exchange datums are made of.

use std::str::FromStr;

use alloy_primitives::U256;
use pallas_addresses::{
    Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart,
};
use pallas_crypto::hash::{Hash, Hasher};

use crate::{
    datum::StructuredValue,
    types::{
        Asset, AssetBalance, AssetMint, Dex, LiquidityPoolState, OperationLocation, OutputRef,
        PoolFee, Redeemer, RedeemerPurpose, SlotNo, Transaction, Utxo,
    },
};

/// Payment key hash of the default order owner.
pub const PUB_KEY: &str = "5a2f6bb5e6b1e1e5d31c1c5d1ab8c64b8e8f9a3f2fb4c0e4c5a9d7a7";

/// Staking key hash of the default order owner.
pub const STAKE_KEY: &str = "3b7a8f4c0d2e1a96b5c4d3e2f1a0b9c8d7e6f5a4b3c2d1e0f9a8b7c6";

fn hash28(hex: &str) -> Hash<28> {
    Hash::<28>::from_str(hex).unwrap()
}

fn delegation(stake: Option<&str>) -> ShelleyDelegationPart {
    match stake {
        Some(stake) => ShelleyDelegationPart::Key(hash28(stake)),
        None => ShelleyDelegationPart::Null,
    }
}

/// Mainnet bech32 address locked by the payment script `script_hash`.
pub fn script_address(script_hash: &str, stake: Option<&str>) -> String {
    ShelleyAddress::new(
        Network::Mainnet,
        ShelleyPaymentPart::Script(hash28(script_hash)),
        delegation(stake),
    )
    .to_bech32()
    .unwrap()
}

/// Mainnet bech32 address of the payment key `key_hash`.
pub fn key_address(key_hash: &str, stake: Option<&str>) -> String {
    ShelleyAddress::new(
        Network::Mainnet,
        ShelleyPaymentPart::Key(hash28(key_hash)),
        delegation(stake),
    )
    .to_bech32()
    .unwrap()
}

/// Deterministic transaction hash.
pub fn tx_hash(seed: u8) -> String {
    Hasher::<256>::hash(&[seed]).to_string()
}

/// Deterministic native asset.
pub fn asset(n: u8) -> Asset {
    Asset::new(
        Hasher::<224>::hash(&[n, 0xa5]).to_string(),
        hex::encode(format!("TOKEN{n}")),
    )
}

/// Pool state with round reserves, for context and reconciliation tests.
pub fn pool_state(
    dex: Dex,
    identifier: &str,
    token_a: Option<Asset>,
    token_b: Asset,
) -> LiquidityPoolState {
    LiquidityPoolState {
        dex,
        identifier: identifier.to_string(),
        location: OperationLocation::new(tx_hash(0), 1, 0),
        address: script_address(&Hasher::<224>::hash(identifier.as_bytes()).to_string(), None),
        token_a,
        token_b,
        reserve_a: U256::from(1_000_000_000u64),
        reserve_b: U256::from(500_000u64),
        lp_token: None,
        total_lp_tokens: U256::from(20_000_000u64),
        buy_fee: PoolFee::from_basis(30, 10000),
        sell_fee: PoolFee::from_basis(30, 10000),
        extra: Default::default(),
    }
}

#[derive(Clone, Debug)]
pub struct UtxoBuilder {
    utxo: Utxo,
}

impl UtxoBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            utxo: Utxo {
                tx_hash: String::new(),
                output_index: 0,
                address: address.into(),
                datum: None,
                lovelace: U256::ZERO,
                assets: vec![],
            },
        }
    }

    pub fn lovelace(mut self, lovelace: u64) -> Self {
        self.utxo.lovelace = U256::from(lovelace);
        self
    }

    pub fn asset(self, asset: &Asset, quantity: u64) -> Self {
        self.asset_big(asset, U256::from(quantity))
    }

    pub fn asset_big(mut self, asset: &Asset, quantity: U256) -> Self {
        self.utxo.assets.push(AssetBalance {
            asset: asset.clone(),
            quantity,
        });
        self
    }

    pub fn datum(mut self, datum: &StructuredValue) -> Self {
        self.utxo.datum = Some(datum.to_hex().unwrap());
        self
    }

    pub fn datum_hex(mut self, datum: &str) -> Self {
        self.utxo.datum = Some(datum.to_string());
        self
    }

    /// Marks the UTXO as produced by `tx_hash` at `output_index`.
    pub fn from_tx(mut self, tx_hash: &str, output_index: u32) -> Self {
        self.utxo.tx_hash = tx_hash.to_string();
        self.utxo.output_index = output_index;
        self
    }

    pub fn build(self) -> Utxo {
        self.utxo
    }
}

#[derive(Clone, Debug)]
pub struct TxBuilder {
    tx: Transaction,
}

impl TxBuilder {
    pub fn new(seed: u8, slot: SlotNo) -> Self {
        Self {
            tx: Transaction {
                hash: tx_hash(seed),
                slot,
                inputs: vec![],
                outputs: vec![],
                reference_inputs: vec![],
                mints: vec![],
                redeemers: vec![],
                script_hashes: vec![],
            },
        }
    }

    /// Adds a consumed input, spent under `redeemer` (CBOR hex) if given.
    pub fn input(mut self, utxo: Utxo, redeemer: Option<&str>) -> Self {
        if let Some(data) = redeemer {
            self.tx.redeemers.push(Redeemer {
                purpose: RedeemerPurpose::Spend,
                index: self.tx.inputs.len() as u32,
                data: data.to_string(),
            });
        }
        self.tx.inputs.push(utxo);
        self
    }

    /// Adds an output, its origin is set to this transaction.
    pub fn output(mut self, mut utxo: Utxo) -> Self {
        utxo.tx_hash = self.tx.hash.clone();
        utxo.output_index = self.tx.outputs.len() as u32;
        self.tx.outputs.push(utxo);
        self
    }

    pub fn script(mut self, script_hash: &str) -> Self {
        self.tx.script_hashes.push(script_hash.to_string());
        self
    }

    pub fn reference(mut self, output: OutputRef) -> Self {
        self.tx.reference_inputs.push(output);
        self
    }

    pub fn mint(mut self, asset: &Asset, amount: i64) -> Self {
        self.tx.mints.push(AssetMint {
            asset: asset.clone(),
            amount: amount.try_into().unwrap(),
        });
        self
    }

    pub fn build(self) -> Transaction {
        self.tx
    }
}

/// Builders for the Plutus data shapes shared by exchange datums.
pub mod plutus {
    use alloy_primitives::U256;

    use crate::{datum::StructuredValue, types::Token};

    pub fn int(value: u64) -> StructuredValue {
        StructuredValue::big(U256::from(value))
    }

    pub fn bytes(hex: &str) -> StructuredValue {
        StructuredValue::bytes_hex(hex)
    }

    pub fn unit() -> StructuredValue {
        StructuredValue::constr(0, vec![])
    }

    pub fn bool(value: bool) -> StructuredValue {
        StructuredValue::constr(value as u64, vec![])
    }

    pub fn some(value: StructuredValue) -> StructuredValue {
        StructuredValue::constr(0, vec![value])
    }

    pub fn none() -> StructuredValue {
        StructuredValue::constr(1, vec![])
    }

    pub fn asset_class(token: &Token) -> StructuredValue {
        let (policy, name) = match token {
            Token::Native => ("", ""),
            Token::Asset(asset) => (asset.policy_id.as_str(), asset.name_hex.as_str()),
        };
        StructuredValue::constr(0, vec![bytes(policy), bytes(name)])
    }

    /// `Address` with a key payment credential.
    pub fn address(pkh: &str, skh: Option<&str>) -> StructuredValue {
        let staking = match skh {
            Some(skh) => some(StructuredValue::constr(
                0,
                vec![StructuredValue::constr(0, vec![bytes(skh)])],
            )),
            None => none(),
        };
        StructuredValue::constr(
            0,
            vec![StructuredValue::constr(0, vec![bytes(pkh)]), staking],
        )
    }
}
