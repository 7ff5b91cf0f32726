use super::{Request, Response, Transport};
use crate::error::TransportError;
use async_bincode::{tokio::AsyncBincodeStream, AsyncDestination};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{io::BufStream, net::TcpStream, time};

pub const DEFAULT_PORT: u16 = 7070;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

type Framed = AsyncBincodeStream<BufStream<TcpStream>, Response, Request, AsyncDestination>;

/// Sends each envelope over a fresh TCP connection framed with bincode.
#[derive(Debug, Clone)]
pub struct TcpClient {
    timeout: Duration,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl TcpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// `domain` may carry a port; [`DEFAULT_PORT`] is used otherwise.
    /// Bare IPv6 literals are bracketed.
    fn address(domain: &str) -> String {
        if let Some(rest) = domain.strip_prefix('[') {
            let has_port = rest
                .split_once("]:")
                .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
            return if has_port {
                domain.to_owned()
            } else {
                format!("{domain}:{DEFAULT_PORT}")
            };
        }
        if domain.matches(':').count() > 1 {
            return format!("[{domain}]:{DEFAULT_PORT}");
        }
        let has_port = domain
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        if has_port {
            domain.to_owned()
        } else {
            format!("{domain}:{DEFAULT_PORT}")
        }
    }

    async fn connect(&self, domain: &str) -> Result<Framed, TransportError> {
        let sock = TcpStream::connect(Self::address(domain)).await?;
        let sock = BufStream::new(sock);
        let sock = AsyncBincodeStream::from(sock).for_async();
        Ok(sock)
    }

    async fn send_recv(&self, domain: &str, req: Request) -> Result<Response, TransportError> {
        let mut sock = self.connect(domain).await?;
        sock.send(req).await.map_err(frame_error)?;
        sock.next()
            .await
            .ok_or(TransportError::Closed)?
            .map_err(frame_error)
    }
}

/// Socket failures inside the codec stay I/O errors; anything else means
/// the frame itself was bad.
fn frame_error(e: bincode::Error) -> TransportError {
    match *e {
        bincode::ErrorKind::Io(e) => TransportError::Io(e),
        other => TransportError::Malformed(other.to_string()),
    }
}

#[async_trait]
impl Transport for TcpClient {
    async fn round_trip(&self, domain: &str, request: Request) -> Result<Response, TransportError> {
        tracing::trace!(domain, method = %request.method, "tcp round trip");
        time::timeout(self.timeout, self.send_recv(domain, request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}
