// Readiness - Poll a node's query endpoint until it answers
use crate::rpc::client::{RpcClient, RpcClientError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Readiness errors
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("{endpoint} not ready after {timeout:?}")]
    Timeout {
        endpoint: SocketAddr,
        timeout: Duration,
    },

    #[error("Readiness wait cancelled")]
    Cancelled,

    #[error("RPC client error: {0}")]
    Client(#[from] RpcClientError),
}

/// Probe `endpoint` with `system_version` every `interval` until it answers,
/// `timeout` elapses or `token` is cancelled. Any well-formed JSON-RPC answer,
/// including an error object, counts as ready.
pub async fn wait_until_ready(
    endpoint: SocketAddr,
    interval: Duration,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<(), ReadinessError> {
    let client = RpcClient::new(endpoint)?;

    let poll = async {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match client.version().await {
                Ok(_) => {
                    debug!("{} ready after {} probe(s)", endpoint, attempts);
                    return;
                }
                Err(e @ RpcClientError::Remote { .. }) => {
                    debug!("{} answered probe with error: {}", endpoint, e);
                    return;
                }
                Err(e) => {
                    if !e.is_unreachable() {
                        debug!("{} sent a malformed probe reply: {}", endpoint, e);
                    }
                    tokio::time::sleep(interval).await;
                }
            }
        }
    };

    tokio::select! {
        _ = token.cancelled() => Err(ReadinessError::Cancelled),
        result = tokio::time::timeout(timeout, poll) => {
            result.map_err(|_| ReadinessError::Timeout { endpoint, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::ports::allocate_port;
    use crate::rpc::server::RpcServer;
    use std::net::Ipv4Addr;
    use std::time::Instant;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_ready_once_server_bound() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, allocate_port().unwrap()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let server = RpcServer::new(addr).start_background(tx).await.unwrap();

        let token = CancellationToken::new();
        wait_until_ready(addr, Duration::from_millis(20), Duration::from_secs(2), &token)
            .await
            .unwrap();

        server.stop().await;
    }

    #[tokio::test]
    async fn test_ready_when_server_binds_late() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, allocate_port().unwrap()));
        let (tx, _rx) = mpsc::unbounded_channel();

        let late = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            RpcServer::new(addr).start_background(tx).await.unwrap()
        });

        let token = CancellationToken::new();
        wait_until_ready(addr, Duration::from_millis(20), Duration::from_secs(3), &token)
            .await
            .unwrap();

        late.await.unwrap().stop().await;
    }

    #[tokio::test]
    async fn test_timeout_when_nothing_listens() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, allocate_port().unwrap()));
        let token = CancellationToken::new();

        let started = Instant::now();
        let err = wait_until_ready(addr, Duration::from_millis(20), Duration::from_millis(200), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_non_json_rpc_answer_is_not_ready() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot here!",
                    )
                    .await;
                let _ = stream.shutdown().await;
            }
        });

        let token = CancellationToken::new();
        let err = wait_until_ready(addr, Duration::from_millis(20), Duration::from_millis(300), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::Timeout { .. }));

        responder.abort();
    }

    #[tokio::test]
    async fn test_cancelled() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, allocate_port().unwrap()));
        let token = CancellationToken::new();
        token.cancel();

        let err = wait_until_ready(addr, Duration::from_millis(20), Duration::from_secs(5), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::Cancelled));
    }
}
