use std::collections::HashSet;

use alloy_primitives::U256;
use pallas_addresses::Address;

use super::helpers;
use crate::{
    datum::StructuredValue,
    error::{AnalyzerError, AnalyzerResult},
    types::{Asset, Dex, SlotNo, Transaction},
};

/// Recognizes an output address either verbatim or by its payment script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressMatcher {
    Address(String),
    ScriptHash(String),
}

/// Addresses of a single role (pool, order, ...).
///
/// Script hashes are resolved once, when the set is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet {
    matchers: Vec<AddressMatcher>,
    /// Hashes matched on the payment part of any address.
    payment_scripts: HashSet<String>,
    /// Payment scripts of every matcher, verbatim addresses included.
    scripts: HashSet<String>,
}

impl AddressSet {
    pub fn new(matchers: Vec<AddressMatcher>) -> Self {
        let payment_scripts: HashSet<String> = matchers
            .iter()
            .filter_map(|m| match m {
                AddressMatcher::ScriptHash(hash) => Some(hash.clone()),
                AddressMatcher::Address(_) => None,
            })
            .collect();
        let scripts = matchers
            .iter()
            .filter_map(|m| match m {
                AddressMatcher::Address(address) => helpers::payment_script_hash(address),
                AddressMatcher::ScriptHash(_) => None,
            })
            .chain(payment_scripts.iter().cloned())
            .collect();
        Self {
            matchers,
            payment_scripts,
            scripts,
        }
    }

    pub fn addresses(addresses: &[&str]) -> Self {
        Self::new(
            addresses
                .iter()
                .map(|a| AddressMatcher::Address(a.to_string()))
                .collect(),
        )
    }

    pub fn script_hashes(hashes: &[&str]) -> Self {
        Self::new(
            hashes
                .iter()
                .map(|h| AddressMatcher::ScriptHash(h.to_string()))
                .collect(),
        )
    }

    pub fn union(&self, other: &AddressSet) -> AddressSet {
        Self::new(self.matchers.iter().chain(other.matchers.iter()).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matchers(&self) -> &[AddressMatcher] {
        &self.matchers
    }

    /// Whether matching needs the payment script of the candidate address.
    pub fn needs_script_hash(&self) -> bool {
        !self.payment_scripts.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        if self.contains_verbatim(address) {
            return true;
        }
        self.needs_script_hash()
            && helpers::payment_script_hash(address)
                .is_some_and(|hash| self.payment_scripts.contains(&hash))
    }

    /// [`AddressSet::contains`] for an address whose payment script was
    /// already decoded.
    pub fn contains_decoded(&self, address: &str, script_hash: Option<&str>) -> bool {
        self.contains_verbatim(address)
            || script_hash.is_some_and(|hash| self.payment_scripts.contains(hash))
    }

    fn contains_verbatim(&self, address: &str) -> bool {
        self.matchers
            .iter()
            .any(|m| matches!(m, AddressMatcher::Address(expected) if expected == address))
    }

    /// Whether `script_hash` is one the role is recognized by.
    pub fn has_script(&self, script_hash: &str) -> bool {
        self.scripts.contains(script_hash)
    }

    /// Script hashes the role is recognized by, including the payment
    /// scripts of verbatim addresses.
    pub fn script_hash_list(&self) -> Vec<String> {
        let mut hashes: Vec<_> = self.scripts.iter().cloned().collect();
        hashes.sort();
        hashes
    }
}

/// Fee constants of an exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeSchedule {
    pub batcher_fee: U256,
    pub deposit: U256,
    pub fee_numerator: U256,
    pub fee_denominator: U256,
    /// Native amount locked in every pool and excluded from its reserve.
    pub min_pool_ada: U256,
}

impl FeeSchedule {
    pub fn new(batcher_fee: u64, deposit: u64, fee_numerator: u64, fee_denominator: u64) -> Self {
        Self {
            batcher_fee: U256::from(batcher_fee),
            deposit: U256::from(deposit),
            fee_numerator: U256::from(fee_numerator),
            fee_denominator: U256::from(fee_denominator),
            min_pool_ada: U256::ZERO,
        }
    }

    pub fn with_min_pool_ada(mut self, lovelace: u64) -> Self {
        self.min_pool_ada = U256::from(lovelace);
        self
    }
}

/// How pool outputs prove they are genuine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolIdentity {
    /// Every pool holds the same validity token.
    ValidityAsset(Asset),
    /// Each pool holds a unique NFT minted under the policy.
    NftPolicy(String),
    /// The pool NFT is named by the datum and must be held by the output.
    DatumNft,
    /// Pools are enumerated up front by the analyzer.
    Table,
    /// Order book only exchange.
    None,
}

/// Cancellation is a spend of an order input under `redeemer`, in a
/// transaction referencing every `required_reference_tx_hashes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelRule {
    pub redeemer: String,
    pub required_reference_tx_hashes: Vec<String>,
}

impl CancelRule {
    pub fn redeemer(redeemer: &str) -> Self {
        Self {
            redeemer: redeemer.to_ascii_lowercase(),
            required_reference_tx_hashes: vec![],
        }
    }
}

/// Compile-time configuration of an exchange analyzer.
#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    pub dex: Dex,
    pub start_slot: SlotNo,
    pub pool_addresses: AddressSet,
    pub order_addresses: AddressSet,
    pub pool_identity: PoolIdentity,
    pub lp_token_policy: Option<String>,
    pub cancel: CancelRule,
    pub fees: FeeSchedule,
}

impl ExchangeConfig {
    /// Checks the configuration is usable, run once at startup.
    pub fn validate(&self) -> AnalyzerResult<()> {
        let defect = |reason: String| AnalyzerError::defect(self.dex, reason);

        if self.order_addresses.is_empty() {
            return Err(defect("no order addresses".to_string()));
        }
        let has_pools = self.pool_identity != PoolIdentity::None;
        if has_pools && self.pool_addresses.is_empty() && self.pool_identity != PoolIdentity::Table
        {
            return Err(defect("no pool addresses".to_string()));
        }
        for matcher in self
            .pool_addresses
            .matchers()
            .iter()
            .chain(self.order_addresses.matchers())
        {
            match matcher {
                AddressMatcher::Address(address) => {
                    Address::from_bech32(address)
                        .map_err(|e| defect(format!("invalid address {address}: {e}")))?;
                }
                AddressMatcher::ScriptHash(hash) if !is_hash(hash) => {
                    return Err(defect(format!("invalid script hash {hash}")));
                }
                AddressMatcher::ScriptHash(_) => {}
            }
        }
        match &self.pool_identity {
            PoolIdentity::ValidityAsset(asset) if !is_hash(&asset.policy_id) => {
                return Err(defect(format!("invalid validity asset {asset}")));
            }
            PoolIdentity::NftPolicy(policy) if !is_hash(policy) => {
                return Err(defect(format!("invalid pool nft policy {policy}")));
            }
            _ => {}
        }
        if let Some(policy) = &self.lp_token_policy
            && !is_hash(policy)
        {
            return Err(defect(format!("invalid lp policy {policy}")));
        }
        if has_pools {
            if self.fees.fee_denominator.is_zero() {
                return Err(defect("zero fee denominator".to_string()));
            }
            if self.fees.fee_numerator > self.fees.fee_denominator {
                return Err(defect("fee numerator exceeds denominator".to_string()));
            }
        }
        StructuredValue::from_hex(&self.cancel.redeemer)
            .map_err(|e| defect(format!("invalid cancel redeemer: {e}")))?;
        Ok(())
    }

    pub fn is_active(&self, slot: SlotNo) -> bool {
        slot >= self.start_slot
    }

    /// Whether the transaction touches any of the exchange's pool or order
    /// addresses or scripts.
    pub fn touches(&self, tx: &Transaction) -> bool {
        let by_script = tx
            .script_hashes
            .iter()
            .any(|h| self.pool_addresses.has_script(h) || self.order_addresses.has_script(h));
        if by_script {
            return true;
        }
        let decode =
            self.pool_addresses.needs_script_hash() || self.order_addresses.needs_script_hash();
        tx.inputs.iter().chain(tx.outputs.iter()).any(|u| {
            let script_hash = decode
                .then(|| helpers::payment_script_hash(&u.address))
                .flatten();
            self.pool_addresses.contains_decoded(&u.address, script_hash.as_deref())
                || self.order_addresses.contains_decoded(&u.address, script_hash.as_deref())
        })
    }
}

/// 28-byte hex encoded hash (policy id, script or key hash).
pub(crate) fn is_hash(hash: &str) -> bool {
    hash.len() == 56 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}
