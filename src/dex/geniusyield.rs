//! Genius Yield partial orders. Every order is tracked by an NFT minted at
//! placement, fills are read from the redeemer spending the order.

use std::sync::LazyLock;

use alloy_primitives::U256;

use crate::{
    analyzer::{
        AddressSet, AnalyzerContext, CancelRule, ExchangeConfig, Extracted, Failure, FeeSchedule,
        HybridAnalyzer, PoolIdentity, helpers,
    },
    datum::{
        DatumParameters, DefinitionTemplate, ParameterKey as K, StructuredValue, bytes, common,
        constr, ignore, int, match_template,
    },
    error::{AnalyzerError, AnalyzerResult},
    num,
    types::{Dex, OrderBookMatch, OrderBookOrder, Token, Transaction, Utxo},
};

const ORDER_SCRIPT_HASH: &str = "642c1f7bf79ca48c0f97239fcb2f3b42b92f2548184ab394e1e1e503";
const START_SLOT: u64 = 110_000_000;
const CANCEL_REDEEMER: &str = "d87980";

static ORDER_DATUM: LazyLock<DefinitionTemplate> = LazyLock::new(|| {
    constr(
        0,
        vec![
            bytes(K::SenderPubKeyHash),
            common::address(K::ReceiverPubKeyHash, K::SenderStakingKeyHash),
            common::asset_class(K::OfferTokenPolicyId, K::OfferTokenAssetName),
            int(K::OriginalOfferAmount),
            int(K::OfferAmount),
            common::asset_class(K::AskTokenPolicyId, K::AskTokenAssetName),
            constr(0, vec![int(K::PriceNumerator), int(K::PriceDenominator)]),
            bytes(K::OrderNft),
            // start and end of validity
            common::optional(ignore()),
            common::optional(ignore()),
            int(K::PartialFills),
            int(K::MakerFee),
            // taker fee, contained fee and contained payment
            ignore(),
            ignore(),
            ignore(),
        ],
    )
});

static PARTIAL_FILL: LazyLock<DefinitionTemplate> =
    LazyLock::new(|| constr(1, vec![int(K::FillAmount)]));

static COMPLETE_FILL: LazyLock<DefinitionTemplate> = LazyLock::new(|| constr(2, vec![]));

fn offered(params: &DatumParameters) -> AnalyzerResult<Token> {
    params.token(K::OfferTokenPolicyId, K::OfferTokenAssetName)
}

#[derive(Clone, Debug)]
pub struct GeniusYield {
    config: ExchangeConfig,
}

impl Default for GeniusYield {
    fn default() -> Self {
        Self::new()
    }
}

impl GeniusYield {
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig {
                dex: Dex::GeniusYield,
                start_slot: START_SLOT,
                pool_addresses: AddressSet::default(),
                order_addresses: AddressSet::script_hashes(&[ORDER_SCRIPT_HASH]),
                pool_identity: PoolIdentity::None,
                lp_token_policy: None,
                cancel: CancelRule::redeemer(CANCEL_REDEEMER),
                fees: FeeSchedule::new(0, 0, 0, 1),
            },
        }
    }

    fn order(&self, tx: &Transaction, utxo: &Utxo) -> AnalyzerResult<OrderBookOrder> {
        let params = helpers::decode_datum(utxo, &ORDER_DATUM)?;
        let original_amount = params.amount(K::OriginalOfferAmount)?;
        let denominator = params.amount(K::PriceDenominator)?;
        if denominator.is_zero() {
            return Err(AnalyzerError::mismatch("$.6.1", "zero price denominator"));
        }
        // asked amount for the whole original offer
        let to_amount = original_amount
            .checked_mul(params.amount(K::PriceNumerator)?)
            .ok_or_else(|| AnalyzerError::malformed(&tx.hash, "asked amount overflow"))?
            / denominator;

        Ok(OrderBookOrder {
            dex: self.config.dex,
            identifier: params.bytes(K::OrderNft)?.to_string(),
            location: helpers::location(tx, utxo.output_index),
            address: utxo.address.clone(),
            sender: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            from_token: offered(&params)?,
            to_token: params.token(K::AskTokenPolicyId, K::AskTokenAssetName)?,
            original_amount,
            unfilled_amount: params.amount(K::OfferAmount)?,
            to_amount,
            price: num::ratio(original_amount, to_amount),
            partial_fills: params.small(K::PartialFills)?,
            batcher_fee: params.amount(K::MakerFee)?,
            deposit: U256::ZERO,
        })
    }

    /// Amount filled by the redeemer spending the order at `input_index`.
    fn fill(&self, tx: &Transaction, input_index: usize, input: &Utxo) -> AnalyzerResult<OrderBookMatch> {
        let redeemer = tx
            .spend_redeemer(input_index as u32)
            .ok_or_else(|| AnalyzerError::mismatch("$", "order spent without redeemer"))?;
        let action = StructuredValue::from_hex(&redeemer.data)?;
        let params = helpers::decode_datum(input, &ORDER_DATUM)?;
        let matched_amount = match match_template(&PARTIAL_FILL, &action) {
            Ok(fill) => fill.amount(K::FillAmount)?,
            Err(_) => {
                match_template(&COMPLETE_FILL, &action)?;
                params.amount(K::OfferAmount)?
            }
        };

        Ok(OrderBookMatch {
            dex: self.config.dex,
            location: helpers::location(tx, input_index as u32),
            matched_order: input.output_ref(),
            receiver: helpers::sender(&params, K::SenderPubKeyHash, K::SenderStakingKeyHash),
            matched_token: offered(&params)?,
            matched_amount,
        })
    }
}

impl HybridAnalyzer for GeniusYield {
    fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    fn order_book_orders(
        &self,
        _ctx: &AnalyzerContext,
        tx: &Transaction,
    ) -> Vec<Extracted<OrderBookOrder>> {
        helpers::extract_outputs(tx, &self.config.order_addresses, |utxo| self.order(tx, utxo))
    }

    fn order_book_matches(
        &self,
        _ctx: &AnalyzerContext,
        tx: &Transaction,
    ) -> Vec<Extracted<OrderBookMatch>> {
        tx.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| self.config.order_addresses.contains(&input.address))
            .map(|(i, input)| {
                self.fill(tx, i, input).map_err(|error| Failure {
                    output_index: None,
                    error,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;
    use crate::{
        analyzer::ExchangeAnalyzer,
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::{Asset, DomainOperation, OrderStatus},
    };

    const NFT: &str = "a1b2c3d4";

    fn order_datum(asked: &Asset, offered_amount: u64, partial_fills: u64) -> StructuredValue {
        StructuredValue::constr(
            0,
            vec![
                plutus::bytes(testing::PUB_KEY),
                plutus::address(testing::PUB_KEY, None),
                plutus::asset_class(&Token::Native),
                plutus::int(100_000_000),
                plutus::int(offered_amount),
                plutus::asset_class(&asked.clone().into()),
                StructuredValue::constr(0, vec![plutus::int(1), plutus::int(50)]),
                plutus::bytes(NFT),
                plutus::none(),
                plutus::none(),
                plutus::int(partial_fills),
                plutus::int(300_000),
                plutus::int(0),
                plutus::unit(),
                plutus::int(0),
            ],
        )
    }

    fn analyzer() -> ExchangeAnalyzer {
        ExchangeAnalyzer::Hybrid(Box::new(GeniusYield::new()))
    }

    fn order_input(asked: &Asset) -> Utxo {
        UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
            .lovelace(100_000_000)
            .datum(&order_datum(asked, 100_000_000, 0))
            .from_tx(&testing::tx_hash(9), 0)
            .build()
    }

    #[test]
    fn test_order_prices_original_offer() {
        let asked = testing::asset(50);
        let tx = TxBuilder::new(1, START_SLOT)
            .output(order_input(&asked))
            .build();

        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        let [DomainOperation::OrderBookOrder(order)] = &analysis.operations[..] else {
            panic!("unexpected operations {:?}", analysis.operations);
        };
        assert_eq!(order.identifier, NFT);
        assert_eq!(order.to_token, Token::Asset(asked));
        assert_eq!(order.to_amount, U256::from(2_000_000));
        assert_eq!(order.price, udec256!(50));
        assert_eq!(order.unfilled_amount, U256::from(100_000_000));
    }

    #[test]
    fn test_partial_and_complete_fills() {
        let asked = testing::asset(50);
        let mut second = order_input(&asked);
        second.output_index = 1;
        let tx = TxBuilder::new(1, START_SLOT)
            .input(order_input(&asked), Some("d87a9f1a01312d00ff"))
            .input(second.clone(), Some("d87b80"))
            .output(
                UtxoBuilder::new(testing::script_address(ORDER_SCRIPT_HASH, None))
                    .lovelace(80_000_000)
                    .datum(&order_datum(&asked, 80_000_000, 1))
                    .build(),
            )
            .build();

        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(analysis.failures.is_empty());
        let fills: Vec<_> = analysis
            .operations
            .iter()
            .filter_map(|op| match op {
                DomainOperation::OrderBookMatch(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].matched_amount, U256::from(20_000_000));
        assert_eq!(fills[1].matched_amount, U256::from(100_000_000));
        assert_eq!(fills[1].matched_order, second.output_ref());
        assert!(analysis.operations.iter().any(|op| matches!(
            op,
            DomainOperation::OrderBookOrder(o) if o.partial_fills == 1
        )));
        assert_eq!(
            analysis
                .operations
                .iter()
                .filter(|op| matches!(
                    op,
                    DomainOperation::OperationStatus(s) if s.status == OrderStatus::Complete
                ))
                .count(),
            2
        );
    }

    #[test]
    fn test_cancel() {
        let asked = testing::asset(50);
        let input = order_input(&asked);
        let tx = TxBuilder::new(1, START_SLOT)
            .input(input.clone(), Some(CANCEL_REDEEMER))
            .build();
        let analysis = analyzer().analyze_transaction(&AnalyzerContext::in_memory(), &tx);
        assert!(matches!(
            &analysis.operations[..],
            [DomainOperation::OperationStatus(s)]
                if s.status == OrderStatus::Cancelled && s.closes == input.output_ref()
        ));
    }
}
