use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    remote::RemoteClient,
    session::run_session,
    transaction::TransactionManager,
};

/// Runs an interactive session against the server named in `args`.
pub async fn run(args: ClientArgs) -> Result<()> {
    let remote = RemoteClient::connect(args.server, args.connect_timeout())
        .await
        .with_context(|| format!("could not connect to server {}", args.server))?;

    let mut txn = TransactionManager::new(remote);
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    let end = run_session(&mut txn, &mut stdin, &mut stdout, async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "ctrl-c handler failed");
        }
    })
    .await?;

    info!(?end, "disconnecting");
    txn.into_binding().shutdown().await;
    Ok(())
}
