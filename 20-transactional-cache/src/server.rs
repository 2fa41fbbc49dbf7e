use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    message::{Request, Response, read_message, write_message},
    store::Store,
};

/// Accepts client connections and services their calls against one shared [`Store`].
pub struct CacheServer {
    listener: TcpListener,
    store: Arc<Store>,
}

impl CacheServer {
    pub fn new(listener: TcpListener, store: Arc<Store>) -> Self {
        Self { listener, store }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let CacheServer { listener, store } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &store);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, store: &Arc<Store>) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, store),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, store: &Arc<Store>) {
    let store = Arc::clone(store);
    tokio::spawn(async move {
        info!(%peer, "client connected");
        match handle_connection(stream, &store).await {
            Ok(calls) => info!(%peer, calls, "client disconnected"),
            Err(err) => warn!(%peer, error = ?err, "client connection closed with error"),
        }
    });
}

/// Services calls until the peer hangs up; returns how many were answered.
async fn handle_connection(stream: TcpStream, store: &Store) -> Result<u64> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut calls = 0;

    while let Some(request) = read_message::<_, Request>(&mut reader).await? {
        let response = dispatch(store, request);
        write_message(&mut writer, &response).await?;
        calls += 1;
    }

    Ok(calls)
}

/// Runs one call against the store and encodes its outcome.
pub fn dispatch(store: &Store, request: Request) -> Response {
    debug!(?request, "dispatching call");
    match request {
        Request::Get { key } => match store.get(&key) {
            Ok(item) => Response::Item { item },
            Err(err) => Response::from_error(&err),
        },
        Request::Set { item } => {
            store.set(item);
            Response::Ack { ok: true }
        }
        Request::Unset { key } => match store.unset(&key) {
            Ok(_) => Response::Ack { ok: true },
            Err(err) => Response::from_error(&err),
        },
        Request::GetCount { value } => Response::Count {
            count: store.get_count(&value),
        },
        Request::ExecuteLog { entries } => match store.execute_log(&entries) {
            Ok(()) => Response::Ack { ok: true },
            Err(err) => Response::from_error(&err),
        },
    }
}
