use std::future::Future;

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    select,
};
use tracing::{debug, info};

use crate::{
    binding::RemoteBinding,
    error::CacheError,
    item::CacheItem,
    protocol::ConsoleCommand,
    transaction::TransactionManager,
};

/// How a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `END`.
    Requested,
    /// Input reached EOF.
    InputClosed,
    /// The shutdown future fired (Ctrl-C in the binary).
    Interrupted,
}

/// Reads commands from `input` until `END`, EOF or `shutdown`, writing replies to `output`.
///
/// However the session ends, every transaction still open is rolled back
/// before returning.
pub async fn run_session<B, R, W, F>(
    txn: &mut TransactionManager<B>,
    input: &mut R,
    output: &mut W,
    shutdown: F,
) -> Result<SessionEnd>
where
    B: RemoteBinding,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut line = String::new();

    // I/O failures end the session too; they are returned after cleanup.
    let outcome: std::io::Result<SessionEnd> = loop {
        line.clear();
        select! {
            _ = &mut shutdown => break Ok(SessionEnd::Interrupted),
            bytes_read = input.read_line(&mut line) => {
                match bytes_read {
                    Ok(0) => break Ok(SessionEnd::InputClosed),
                    Ok(_) => {}
                    Err(err) => break Err(err),
                }
                if line.trim().is_empty() {
                    continue;
                }
                let reply = match ConsoleCommand::parse(&line) {
                    Ok(ConsoleCommand::End) => break Ok(SessionEnd::Requested),
                    Ok(command) => execute(txn, command).await,
                    Err(err) => Some(err.to_string()),
                };
                if let Some(reply) = reply {
                    if let Err(err) = write_line(output, &reply).await {
                        break Err(err);
                    }
                }
            }
        }
    };

    info!(?outcome, depth = txn.depth(), "session ending");
    let cleanup = txn.end_session().await;
    let end = outcome?;
    if let Err(err) = cleanup {
        write_line(output, &error_line(&err)).await?;
    }
    Ok(end)
}

/// Runs one command, returning the line to print, if any.
pub async fn execute<B: RemoteBinding>(
    txn: &mut TransactionManager<B>,
    command: ConsoleCommand,
) -> Option<String> {
    debug!(?command, "executing");
    match command {
        ConsoleCommand::Set { key, value } => txn
            .set(CacheItem { key, value })
            .await
            .err()
            .map(|err| error_line(&err)),
        ConsoleCommand::Get { key } => Some(match txn.try_get(&key).await {
            Ok(Some(item)) => item.value,
            Ok(None) => "NULL".to_string(),
            Err(err) => error_line(&err),
        }),
        ConsoleCommand::Unset { key } => match txn.unset(&key).await {
            Ok(()) => None,
            Err(CacheError::NotFound(_)) => Some("NULL".to_string()),
            Err(err) => Some(error_line(&err)),
        },
        ConsoleCommand::NumEqualTo { value } => Some(match txn.get_count(&value).await {
            Ok(count) => count.to_string(),
            Err(err) => error_line(&err),
        }),
        ConsoleCommand::Begin => {
            txn.begin();
            None
        }
        ConsoleCommand::Commit => {
            txn.commit();
            None
        }
        ConsoleCommand::Rollback => match txn.rollback().await {
            Ok(()) => None,
            Err(CacheError::NoOpenTransaction) => Some("NO TRANSACTION".to_string()),
            Err(err) => Some(error_line(&err)),
        },
        // Handled by the session loop, which also runs cleanup.
        ConsoleCommand::End => None,
    }
}

fn error_line(err: &CacheError) -> String {
    format!("ERROR: {err}")
}

async fn write_line<W>(output: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::BufReader;

    use super::*;
    use crate::binding::LocalBinding;
    use crate::store::Store;

    async fn run_script(store: &Arc<Store>, script: &str) -> (SessionEnd, String) {
        let mut txn = TransactionManager::new(LocalBinding::new(Arc::clone(store)));
        let mut input = BufReader::new(script.as_bytes());
        let mut output = Vec::new();
        let end = run_session(&mut txn, &mut input, &mut output, std::future::pending())
            .await
            .expect("session runs");
        (end, String::from_utf8(output).expect("utf8 output"))
    }

    #[tokio::test]
    async fn basic_commands_print_expected_lines() {
        let store = Arc::new(Store::new());
        let script = "SET x 1\nGET x\nNUMEQUALTO 1\nSET x 2\nNUMEQUALTO 1\nUNSET x\nGET x\nEND\n";
        let (end, output) = run_script(&store, script).await;

        assert_eq!(end, SessionEnd::Requested);
        assert_eq!(output, "1\n1\n0\nNULL\n");
    }

    #[tokio::test]
    async fn nested_transactions_through_the_console() {
        let store = Arc::new(Store::new());
        let script = "\
BEGIN
SET a 10
GET a
BEGIN
SET a 20
GET a
ROLLBACK
GET a
ROLLBACK
GET a
ROLLBACK
END
";
        let (_, output) = run_script(&store, script).await;
        assert_eq!(output, "10\n20\n10\nNULL\nNO TRANSACTION\n");
    }

    #[tokio::test]
    async fn commit_makes_changes_survive_session_end() {
        let store = Arc::new(Store::new());
        let script = "BEGIN\nSET a 30\nBEGIN\nSET a 40\nCOMMIT\nCOMMIT\nGET a\nROLLBACK\nEND\n";
        let (_, output) = run_script(&store, script).await;

        assert_eq!(output, "40\nNO TRANSACTION\n");
        assert_eq!(store.get("a").expect("a kept").value, "40");
    }

    #[tokio::test]
    async fn open_transactions_are_undone_at_eof() {
        let store = Arc::new(Store::new());
        store.set(CacheItem::new("keep", "v"));

        let script = "BEGIN\nSET keep changed\nBEGIN\nSET extra 1\nUNSET keep\n";
        let (end, output) = run_script(&store, script).await;

        assert_eq!(end, SessionEnd::InputClosed);
        assert_eq!(output, "");
        assert_eq!(store.get("keep").expect("restored").value, "v");
        assert!(store.get("extra").is_err());
        assert_eq!(store.get_count("changed"), 0);
    }

    #[tokio::test]
    async fn parse_errors_are_reported_and_session_continues() {
        let store = Arc::new(Store::new());
        let script = "SET a\nFROB\n\nUNSET missing\nSET a 1\nGET a\nEND\n";
        let (_, output) = run_script(&store, script).await;
        assert_eq!(
            output,
            "SET needs three arguments\ninvalid command\nNULL\n1\n"
        );
    }

    #[tokio::test]
    async fn shutdown_interrupts_and_cleans_up() {
        let store = Arc::new(Store::new());
        let mut txn = TransactionManager::new(LocalBinding::new(Arc::clone(&store)));
        txn.begin();
        txn.set(CacheItem::new("k", "v")).await.expect("set");

        // Input that never yields a line.
        let (_writer, reader) = tokio::io::duplex(16);
        let mut input = BufReader::new(reader);
        let mut output = Vec::new();
        let end = run_session(&mut txn, &mut input, &mut output, async {})
            .await
            .expect("session runs");

        assert_eq!(end, SessionEnd::Interrupted);
        assert!(store.get("k").is_err());
    }

    #[tokio::test]
    async fn unreadable_input_still_rolls_back() {
        let store = Arc::new(Store::new());
        let mut txn = TransactionManager::new(LocalBinding::new(Arc::clone(&store)));
        let mut input = BufReader::new(&b"BEGIN\nSET k v\n\xff\n"[..]);
        let mut output = Vec::new();

        let result = run_session(&mut txn, &mut input, &mut output, std::future::pending()).await;

        assert!(result.is_err());
        assert_eq!(txn.depth(), 0);
        assert!(store.get("k").is_err());
        assert_eq!(store.get_count("v"), 0);
    }

    /// Writer whose every write fails, like stdout after the reader hung up.
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_output_still_rolls_back() {
        let store = Arc::new(Store::new());
        let mut txn = TransactionManager::new(LocalBinding::new(Arc::clone(&store)));
        let mut input = BufReader::new("BEGIN\nSET k v\nGET k\nSET k w\n".as_bytes());

        let result = run_session(&mut txn, &mut input, &mut BrokenPipe, std::future::pending()).await;

        assert!(result.is_err());
        assert!(store.get("k").is_err());
    }
}
