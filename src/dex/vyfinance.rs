//! VyFinance deploys a pool script and an order script per pair, so pools
//! and orders are recognized from a table of known deployments.

use std::sync::LazyLock;

use crate::{
    analyzer::{
        AddressSet, AmmAnalyzer, AnalyzerContext, CancelRule, ExchangeConfig, Extracted,
        FeeSchedule, PoolIdentity,
        helpers::{self, PoolParts},
    },
    datum::{
        DatumParameters, DefinitionTemplate, ParameterKey as K, bytes, constr, constr_capture, int,
    },
    error::{AnalyzerError, AnalyzerResult},
    types::{
        Asset, Deposit, Dex, LiquidityPoolState, PoolFee, SenderCredentials, Swap, Token,
        Transaction, Utxo, Withdraw, Zap,
    },
};

const START_SLOT: u64 = 62_000_000;
const CANCEL_REDEEMER: &str = "d87a80";
/// Hex length of a key hash.
const KEY_HASH_LEN: usize = 56;

/// A deployed pair.
#[derive(Clone, Copy, Debug)]
struct PoolEntry {
    pool_script: &'static str,
    order_script: &'static str,
    nft_policy: &'static str,
    lp: (&'static str, &'static str),
    token_a: (&'static str, &'static str),
    token_b: (&'static str, &'static str),
}

impl PoolEntry {
    fn identifier(&self) -> String {
        self.nft_policy.to_string()
    }

    fn lp_token(&self) -> Asset {
        Asset::new(self.lp.0, self.lp.1)
    }

    fn tokens(&self) -> (Token, Token) {
        (
            Token::from_parts(self.token_a.0, self.token_a.1),
            Token::from_parts(self.token_b.0, self.token_b.1),
        )
    }
}

const POOLS: &[PoolEntry] = &[
    // ADA / VYFI
    PoolEntry {
        pool_script: "cc1fe51961c0abc814b36394f717123c682bb0bae326df12696fb64a",
        order_script: "507b2563fe6b3d12852964c327b1066fd5782af7beae4331d792d96a",
        nft_policy: "b91d743e8d5a99cf095cb6b5d8f53060c661fccc9986d5ac67881fe8",
        lp: ("e2ee2a5ca6da82f93c9b14d2299dc8ff35924d8f878bc5015c9adc53", "4c50"),
        token_a: ("", ""),
        token_b: ("804f5544c1962a40546827cab750a88404dc7108c0f588b72964754f", "56594649"),
    },
    // ADA / MELD
    PoolEntry {
        pool_script: "7e8b1f919d9a0618e939e12c74026edb101682a2b5da50088640d5dc",
        order_script: "819c1f25abe39d404987fbf11304f39311f57ae2d9a204bf7108e784",
        nft_policy: "8dad9d8803b124c2c44fd3d0c9fef129288cb4a3cedc9e0d1e0d64ad",
        lp: ("d4ec41767863f2360bdb3ec39250a7cb8731d8e625144cf098e3eb9e", "4c50"),
        token_a: ("", ""),
        token_b: ("0a247b5b5d376fbf9af33c1785d8561b88c1d36b600837cd9716a0c9", "4d454c44"),
    },
];

/// Bar fees accrued in the pool are excluded from its reserves.
static POOL_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![int(K::TreasuryA), int(K::TreasuryB), int(K::TotalLpTokens)],
    )
});

fn order_datum(action: DefinitionTemplate) -> DefinitionTemplate {
    constr(0, vec![bytes(K::SenderKeyHashes), action])
}

static DEPOSIT_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| order_datum(constr(0, vec![int(K::MinLpReceive)])));

static WITHDRAW_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    order_datum(constr(
        1,
        vec![int(K::MinReceiveA), int(K::MinReceiveB)],
    ))
});

static ZAP_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| order_datum(constr(2, vec![int(K::MinLpReceive)])));

/// Action 3 swaps `A` for `B`, action 4 `B` for `A`.
static SWAP_DATUM: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| order_datum(constr_capture(K::Action, vec![int(K::MinReceive)])));

/// Owner credentials packed as payment key hash followed by the optional
/// staking key hash.
fn sender(params: &DatumParameters) -> AnalyzerResult<SenderCredentials> {
    let hashes = params.bytes(K::SenderKeyHashes)?;
    match hashes.len() {
        KEY_HASH_LEN => Ok(SenderCredentials::new(Some(hashes.to_string()), None)),
        len if len == 2 * KEY_HASH_LEN => {
            let (pkh, skh) = hashes.split_at(KEY_HASH_LEN);
            Ok(SenderCredentials::new(
                Some(pkh.to_string()),
                Some(skh.to_string()),
            ))
        }
        len => Err(AnalyzerError::mismatch(
            K::SenderKeyHashes.to_string(),
            format!("unexpected key hashes length {len}"),
        )),
    }
}

#[derive(Clone, Debug)]
pub struct VyFinance {
    config: ExchangeConfig,
}

impl Default for VyFinance {
    fn default() -> Self {
        Self::new()
    }
}

impl VyFinance {
    pub fn new() -> Self {
        let pools: Vec<&str> = POOLS.iter().map(|p| p.pool_script).collect();
        let orders: Vec<&str> = POOLS.iter().map(|p| p.order_script).collect();
        Self {
            config: ExchangeConfig {
                dex: Dex::VyFinance,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::script_hashes(&pools),
                order_addresses: AddressSet::script_hashes(&orders),
                pool_identity: PoolIdentity::Table,
                lp_token_policy: None,
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(1_900_000, 2_000_000, 30, 10_000),
            },
        }
    }

    fn entry(utxo: &Utxo, script: impl Fn(&PoolEntry) -> &'static str) -> AnalyzerResult<&'static PoolEntry> {
        let hash = helpers::payment_script_hash(&utxo.address);
        POOLS
            .iter()
            .find(|p| hash.as_deref() == Some(script(p)))
            .ok_or_else(|| AnalyzerError::mismatch("$", "unknown deployment"))
    }

    fn native_fees(&self) -> [alloy_primitives::U256; 2] {
        [self.config.fees.batcher_fee, self.config.fees.deposit]
    }

    fn pool(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<LiquidityPoolState> {
        let entry = Self::entry(utxo, |p| p.pool_script)?;
        helpers::nft_under(utxo, entry.nft_policy)?;
        let params = helpers::decode_datum(utxo, &POOL_DATUM)?;
        let (token_a, token_b) = entry.tokens();
        let fees = &self.config.fees;
        let parts = PoolParts::new(
            entry.identifier(),
            token_a,
            token_b,
            PoolFee::new(fees.fee_numerator, fees.fee_denominator),
        )
        .carve_outs(
            vec![params.amount(K::TreasuryA)?],
            vec![params.amount(K::TreasuryB)?],
        )
        .lp(Some(entry.lp_token()), params.amount(K::TotalLpTokens)?);
        helpers::pool_state(self.config.dex, tx, utxo, parts, fees.min_pool_ada)
    }

    fn swap(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Swap> {
        let entry = Self::entry(utxo, |p| p.order_script)?;
        let params = helpers::decode_datum(utxo, &SWAP_DATUM)?;
        let (token_a, token_b) = entry.tokens();
        let (swap_in_token, swap_out_token) = match params.small(K::Action)? {
            3 => (token_a, token_b),
            4 => (token_b, token_a),
            _ => return Err(AnalyzerError::mismatch("$.1", "not a swap")),
        };

        Ok(Swap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(entry.identifier()),
            sender: sender(&params)?,
            swap_in_amount: helpers::offered_amount(tx, utxo, &swap_in_token, &self.native_fees())?,
            swap_in_token,
            swap_out_token,
            min_receive: params.amount(K::MinReceive)?,
            batcher_fee: self.config.fees.batcher_fee,
            deposit: self.config.fees.deposit,
        })
    }

    fn deposit(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Deposit> {
        let entry = Self::entry(utxo, |p| p.order_script)?;
        let params = helpers::decode_datum(utxo, &DEPOSIT_DATUM)?;
        let (token_a, token_b) = entry.tokens();

        Ok(Deposit {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(entry.identifier()),
            sender: sender(&params)?,
            deposit_a: helpers::offered_amount(tx, utxo, &token_a, &self.native_fees())?,
            deposit_b: helpers::offered_amount(tx, utxo, &token_b, &self.native_fees())?,
            token_a,
            token_b,
            min_lp_receive: params.amount(K::MinLpReceive)?,
            batcher_fee: self.config.fees.batcher_fee,
            deposit: self.config.fees.deposit,
        })
    }

    fn withdraw(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Withdraw> {
        let entry = Self::entry(utxo, |p| p.order_script)?;
        let params = helpers::decode_datum(utxo, &WITHDRAW_DATUM)?;
        let lp_token = entry.lp_token();

        Ok(Withdraw {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(entry.identifier()),
            sender: sender(&params)?,
            lp_token_amount: utxo.quantity(&lp_token.clone().into()),
            lp_token,
            min_receive_a: params.amount(K::MinReceiveA)?,
            min_receive_b: params.amount(K::MinReceiveB)?,
            batcher_fee: self.config.fees.batcher_fee,
            deposit: self.config.fees.deposit,
        })
    }

    /// The zapped leg is whichever pool token the order holds, the native
    /// leg when it holds neither asset.
    fn zap(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<Zap> {
        let entry = Self::entry(utxo, |p| p.order_script)?;
        let params = helpers::decode_datum(utxo, &ZAP_DATUM)?;
        let (token_a, token_b) = entry.tokens();
        let holds = |t: &Token| t.asset().is_some_and(|a| utxo.holds(a));
        let (swap_in_token, forward_token) = if holds(&token_b) || (!holds(&token_a) && token_b.is_native()) {
            (token_b, token_a)
        } else {
            (token_a, token_b)
        };

        Ok(Zap {
            dex: self.config.dex,
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            pool_identifier: Some(entry.identifier()),
            sender: sender(&params)?,
            swap_in_amount: helpers::offered_amount(tx, utxo, &swap_in_token, &self.native_fees())?,
            swap_in_token,
            forward_token,
            min_lp_receive: params.amount(K::MinLpReceive)?,
            batcher_fee: self.config.fees.batcher_fee,
            deposit: self.config.fees.deposit,
        })
    }
}

impl AmmAnalyzer for VyFinance {
    fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn liquidity_pool_states(&self, tx: &Transaction) -> Vec<Extracted<LiquidityPoolState>> {
        helpers::extract_outputs(tx, &self.config.pool_addresses, |utxo| self.pool(tx, utxo))
    }

    fn swap_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Swap>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| self.swap(tx, utxo))
    }

    fn deposit_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Deposit>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.deposit(tx, utxo)
        })
    }

    fn withdraw_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Withdraw>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| {
            self.withdraw(tx, utxo)
        })
    }

    fn zap_orders(&self, _ctx: &AnalyzerContext, tx: &Transaction) -> Vec<Extracted<Zap>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| self.zap(tx, utxo))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;
    use crate::{
        analyzer::ExchangeAnalyzer,
        datum::StructuredValue,
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::DomainOperation,
    };

    fn vyfi() -> Asset {
        Asset::new(POOLS[0].token_b.0, POOLS[0].token_b.1)
    }

    fn order(action: StructuredValue) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                plutus::bytes(&format!("{}{}", testing::PUB_KEY, testing::STAKE_KEY)),
                action,
            ],
        )
    }

    fn order_output(lovelace: u64, vyfi_amount: u64, action: StructuredValue) -> Utxo {
        let mut utxo = UtxoBuilder::new(testing::script_address(POOLS[0].order_script, None))
            .lovelace(lovelace)
            .datum(&order(action));
        if vyfi_amount > 0 {
            utxo = utxo.asset(&vyfi(), vyfi_amount);
        }
        utxo.build()
    }

    #[test]
    fn test_pool_from_table() {
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(POOLS[0].pool_script, None))
                    .lovelace(30_500_000)
                    .asset(&vyfi(), 7_000)
                    .asset(&Asset::new(POOLS[0].nft_policy, ""), 1)
                    .datum(&StructuredValue::constr(
                        0,
                        vec![plutus::int(500_000), plutus::int(0), plutus::int(12_345)],
                    ))
                    .build(),
            )
            .build();

        let pools = VyFinance::new().liquidity_pool_states(&tx);
        let pool = pools[0].as_ref().unwrap();
        assert_eq!(pool.identifier, POOLS[0].nft_policy);
        assert_eq!(pool.reserve_a, U256::from(30_000_000));
        assert_eq!(pool.reserve_b, U256::from(7_000));
        assert_eq!(pool.total_lp_tokens, U256::from(12_345));
    }

    #[test]
    fn test_swap_directions_and_zap() {
        let tx = TxBuilder::new(1, START_SLOT)
            .output(order_output(13_900_000, 0, StructuredValue::constr(3, vec![plutus::int(10)])))
            .output(order_output(3_900_000, 250, StructuredValue::constr(4, vec![plutus::int(10)])))
            .output(order_output(3_900_000, 600, StructuredValue::constr(2, vec![plutus::int(1)])))
            .build();

        let analysis = ExchangeAnalyzer::Amm(Box::new(VyFinance::new()))
            .analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.failures.is_empty());
        let [
            DomainOperation::Swap(buy),
            DomainOperation::Swap(sell),
            DomainOperation::Zap(zap),
        ] = &analysis.operations[..]
        else {
            panic!("unexpected operations {:?}", analysis.operations);
        };
        assert_eq!(buy.swap_in_token, Token::Native);
        assert_eq!(buy.swap_in_amount, U256::from(10_000_000));
        assert_eq!(buy.sender.staking_key_hash.as_deref(), Some(testing::STAKE_KEY));
        assert_eq!(sell.swap_in_token, Token::Asset(vyfi()));
        assert_eq!(sell.swap_in_amount, U256::from(250));
        assert_eq!(zap.swap_in_token, Token::Asset(vyfi()));
        assert_eq!(zap.forward_token, Token::Native);
    }

    #[test]
    fn test_unknown_deployment_is_ignored() {
        let tx = TxBuilder::new(1, START_SLOT)
            .output(
                UtxoBuilder::new(testing::script_address(testing::PUB_KEY, None))
                    .lovelace(5_000_000)
                    .datum(&order(StructuredValue::constr(3, vec![plutus::int(1)])))
                    .build(),
            )
            .build();
        let analysis = ExchangeAnalyzer::Amm(Box::new(VyFinance::new()))
            .analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.is_empty());
    }
}
