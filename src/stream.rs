use futures::{Stream, stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{error::IndexerError, types::Block};

/// Returns stream of blocks read from newline-delimited JSON, one
/// [`Block`] per line, as supplied by the chain follower.
///
/// Blank lines are skipped. A line that does not decode yields
/// [`IndexerError::Decode`] and the stream moves on to the next line.
pub fn blocks<R>(reader: R) -> impl Stream<Item = Result<Block, IndexerError>>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let block = serde_json::from_str(&line).map_err(IndexerError::from);
                    return Some((block, lines));
                }
                Ok(None) => return None,
                Err(e) => return Some((Err(e.into()), lines)),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::io::BufReader;

    use super::*;

    #[tokio::test]
    async fn test_blocks_from_lines() {
        let input = b"{\"slot\": 10, \"hash\": \"aa\"}\n\n{\"slot\": 11}\nnot json\n";
        let blocks: Vec<_> = blocks(&input[..]).collect().await;
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].as_ref().unwrap().hash, "aa");
        assert_eq!(blocks[1].as_ref().unwrap().slot, 11);
        assert!(blocks[1].as_ref().unwrap().transactions.is_empty());
        assert!(matches!(blocks[2], Err(IndexerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_read_error_is_reported() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"slot\": 1}\n")
            .read_error(std::io::Error::other("connection reset"))
            .build();
        let mut blocks = Box::pin(blocks(BufReader::new(reader)));
        assert_eq!(blocks.next().await.unwrap().unwrap().slot, 1);
        assert!(matches!(blocks.next().await, Some(Err(IndexerError::Io(_)))));
    }
}
