//! Client-side stub that forwards [`RemoteBinding`] calls to a [`crate::server::CacheServer`].

use std::{io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};
use tracing::{info, warn};

use crate::{
    binding::RemoteBinding,
    error::{CacheError, Result},
    item::{CacheItem, LogEntry},
    message::{Request, Response, read_message, write_message},
};

pub struct RemoteClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    server: SocketAddr,
}

impl RemoteClient {
    /// Opens a connection, giving up after `connect_timeout`.
    ///
    /// The timeout only bounds connection establishment. Once connected, a
    /// call blocks until the server answers or the connection drops.
    pub async fn connect(server: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(server))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {server} timed out"),
                )
            })??;

        info!(%server, "connected");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            server,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// Closes the write half so the server sees a clean disconnect.
    pub async fn shutdown(mut self) {
        if let Err(error) = self.writer.shutdown().await {
            warn!(?error, "failed to shutdown client writer cleanly");
        }
    }

    async fn call(&mut self, request: &Request) -> Result<Response> {
        write_message(&mut self.writer, request).await?;
        match read_message::<_, Response>(&mut self.reader).await? {
            Some(Response::Error { kind, message }) => Err(Response::into_error(kind, message)),
            Some(response) => Ok(response),
            None => Err(CacheError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ))),
        }
    }

    async fn call_ack(&mut self, request: &Request) -> Result<bool> {
        match self.call(request).await? {
            Response::Ack { ok } => Ok(ok),
            other => Err(unexpected(other)),
        }
    }
}

impl RemoteBinding for RemoteClient {
    async fn get(&mut self, key: &str) -> Result<CacheItem> {
        let request = Request::Get {
            key: key.to_string(),
        };
        match self.call(&request).await? {
            Response::Item { item } => Ok(item),
            other => Err(unexpected(other)),
        }
    }

    async fn set(&mut self, item: CacheItem) -> Result<bool> {
        self.call_ack(&Request::Set { item }).await
    }

    async fn unset(&mut self, key: &str) -> Result<bool> {
        self.call_ack(&Request::Unset {
            key: key.to_string(),
        })
        .await
    }

    async fn get_count(&mut self, value: &str) -> Result<u64> {
        let request = Request::GetCount {
            value: value.to_string(),
        };
        match self.call(&request).await? {
            Response::Count { count } => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    async fn execute_log(&mut self, entries: Vec<LogEntry>) -> Result<bool> {
        self.call_ack(&Request::ExecuteLog { entries }).await
    }
}

fn unexpected(response: Response) -> CacheError {
    CacheError::Protocol(format!("unexpected response {response:?}"))
}
