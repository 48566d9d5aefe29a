use std::io::Write;

use dex_indexer::{
    dex,
    error::IndexerError,
    indexer::Indexer,
    reconcile::Reconciler,
    stream,
};
use futures::{StreamExt, pin_mut};
use tokio::io::AsyncBufRead;
use tracing::{info, warn};

use crate::{config::ReplayConfig, error::Result};

/// Totals of a finished replay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub blocks: usize,
    pub operations: usize,
    pub failures: usize,
    /// Input lines that did not decode into a block.
    pub skipped: usize,
}

/// Feeds every block of `input` through the indexer, writing produced
/// operations to `out` as JSON lines.
pub async fn run<R, W>(config: &ReplayConfig, input: R, mut out: W) -> Result<Summary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let analyzers = config.exchanges.iter().copied().map(dex::analyzer).collect();
    let mut indexer = Indexer::new(analyzers, tokio::time::sleep)?
        .with_reconciler(Reconciler::in_memory(config.correlation))
        .with_retry(config.retry.clone());
    if let Some(slot) = config.after_slot {
        indexer = indexer.resume_after(slot, None);
    }

    let blocks = stream::blocks(input);
    pin_mut!(blocks);

    let mut summary = Summary::default();
    while let Some(block) = blocks.next().await {
        let block = match block {
            Ok(block) => block,
            Err(IndexerError::Decode(e)) => {
                warn!(error = %e, "skipping undecodable block");
                summary.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let Some(applied) = indexer.apply_block(&block).await? else {
            continue;
        };
        summary.blocks += 1;
        for tx in &applied.transactions {
            for op in &tx.operations {
                serde_json::to_writer(&mut out, op)?;
                writeln!(out)?;
                summary.operations += 1;
            }
            summary.failures += tx.failures.len();
        }
    }
    out.flush()?;

    info!(
        blocks = summary.blocks,
        operations = summary.operations,
        failures = summary.failures,
        skipped = summary.skipped,
        last_slot = ?indexer.last_slot(),
        "replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use dex_indexer::{
        datum::StructuredValue,
        dex::minswap,
        indexer::RetryPolicy,
        reconcile::Correlation,
        testing::{self, TxBuilder, UtxoBuilder, plutus},
        types::{Block, Dex, Token},
    };

    use super::*;

    async fn replay(config: &ReplayConfig, input: &[u8]) -> (Summary, String) {
        let mut out = vec![];
        let summary = run(config, input, &mut out).await.unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    fn swap_block(slot: u64) -> Block {
        let datum = StructuredValue::constr(
            0,
            vec![
                plutus::address(testing::PUB_KEY, None),
                plutus::address(testing::PUB_KEY, None),
                plutus::none(),
                StructuredValue::constr(
                    0,
                    vec![plutus::asset_class(&Token::Native), plutus::int(1_000)],
                ),
                plutus::int(2_000_000),
                plutus::int(2_000_000),
            ],
        );
        let tx = TxBuilder::new(slot as u8, slot)
            .output(
                UtxoBuilder::new(testing::script_address(minswap::ORDER_SCRIPT_HASH, None))
                    .lovelace(4_000_000)
                    .asset(&testing::asset(1), 5_000)
                    .datum(&datum)
                    .build(),
            )
            .build();
        Block {
            slot,
            hash: format!("{slot:064x}"),
            transactions: vec![tx],
        }
    }

    fn config() -> ReplayConfig {
        ReplayConfig {
            exchanges: vec![Dex::Minswap],
            correlation: Correlation::Conjunctive,
            retry: RetryPolicy::none(),
            after_slot: None,
        }
    }

    fn lines(blocks: &[Block]) -> Vec<u8> {
        blocks
            .iter()
            .map(|b| serde_json::to_string(b).unwrap() + "\n")
            .collect::<String>()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_replay_prints_operations() {
        let input = lines(&[swap_block(60_000_000), swap_block(60_000_001)]);
        let (summary, out) = replay(&config(), &input).await;
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.operations, 2);
        let first: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(first["kind"], "swap");
        assert_eq!(first["dex"], "Minswap");
    }

    #[tokio::test]
    async fn test_replay_skips_applied_slots() {
        let input = lines(&[swap_block(60_000_000), swap_block(60_000_001)]);
        let config = ReplayConfig {
            after_slot: Some(60_000_000),
            ..config()
        };
        let (summary, out) = replay(&config, &input).await;
        assert_eq!(summary.blocks, 1);
        assert_eq!(summary.operations, 1);
        assert_eq!(out.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_replay_skips_undecodable_lines() {
        let mut input = lines(&[swap_block(60_000_000)]);
        input.extend_from_slice(b"{\"slot\": \"soon\"}\n");
        input.extend(lines(&[swap_block(60_000_001)]));
        let (summary, _) = replay(&config(), &input).await;
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.skipped, 1);
    }
}
