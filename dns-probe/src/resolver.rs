//! The DNS exchange itself.
//!
//! [`ResolverClient`] is the seam between the prober and the network. The
//! default implementation, [`NetworkResolver`], sends one query over UDP and
//! repeats it over TCP only when the UDP answer comes back truncated.

use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use hickory_proto::error::ProtoError;
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

use crate::query::ProbeContext;

/// Largest UDP response we are prepared to read.
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Why a DNS exchange failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The probe deadline passed before a response arrived.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The probe was cancelled before a response arrived.
    #[error("context canceled")]
    Canceled,

    #[error("Failed to resolve server address '{server}': {source}")]
    Resolve {
        server: String,
        #[source]
        source: io::Error,
    },

    #[error("Server address '{0}' resolved to no addresses")]
    NoAddress(String),

    #[error("{stage} failed: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Malformed DNS message: {0}")]
    Proto(#[from] ProtoError),

    #[error("Response id {received} does not match query id {expected}")]
    IdMismatch { expected: u16, received: u16 },

    #[error("Response of {0} bytes exceeds the TCP frame limit")]
    Oversized(usize),
}

impl ExchangeError {
    fn io(stage: &'static str, source: io::Error) -> Self {
        Self::Io { stage, source }
    }

    /// Whether the probe context expired or was cancelled.
    pub fn is_context_done(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Canceled)
    }

    /// Whether anything in the error's source chain reports itself as a
    /// transport timeout.
    pub fn reports_timeout(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                if io_err.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }
}

/// Performs one DNS exchange with a server.
#[async_trait]
pub trait ResolverClient: Send + Sync {
    /// Send `message` to `server` (`host:port`) and wait for its response,
    /// bounded by `ctx`.
    async fn exchange(
        &self,
        message: &Message,
        server: &str,
        ctx: &ProbeContext,
    ) -> Result<Message, ExchangeError>;
}

/// UDP resolver client with TCP fallback on truncation.
#[derive(Debug, Clone, Default)]
pub struct NetworkResolver;

impl NetworkResolver {
    pub fn new() -> Self {
        Self
    }

    async fn exchange_inner(
        &self,
        message: &Message,
        server: &str,
    ) -> Result<Message, ExchangeError> {
        let addr = resolve_server(server).await?;
        let request = message.to_bytes()?;

        let response = udp_exchange(addr, &request, message.id()).await?;
        if !response.truncated() {
            return Ok(response);
        }

        debug!(server = %addr, "UDP response truncated, retrying over TCP");
        tcp_exchange(addr, &request, message.id()).await
    }
}

#[async_trait]
impl ResolverClient for NetworkResolver {
    async fn exchange(
        &self,
        message: &Message,
        server: &str,
        ctx: &ProbeContext,
    ) -> Result<Message, ExchangeError> {
        ctx.run(self.exchange_inner(message, server)).await
    }
}

async fn resolve_server(server: &str) -> Result<SocketAddr, ExchangeError> {
    tokio::net::lookup_host(server)
        .await
        .map_err(|source| ExchangeError::Resolve {
            server: server.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ExchangeError::NoAddress(server.to_string()))
}

async fn udp_exchange(
    addr: SocketAddr,
    request: &[u8],
    id: u16,
) -> Result<Message, ExchangeError> {
    let bind_addr: SocketAddr = if addr.is_ipv4() {
        (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| ExchangeError::io("UDP bind", e))?;
    // Connected so ICMP errors (e.g. port unreachable) surface on recv.
    socket
        .connect(addr)
        .await
        .map_err(|e| ExchangeError::io("UDP connect", e))?;

    let bytes_sent = socket
        .send(request)
        .await
        .map_err(|e| ExchangeError::io("UDP send", e))?;
    trace!(server = %addr, bytes_sent, "UDP query sent");

    let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    loop {
        let len = socket
            .recv(&mut recv_buf)
            .await
            .map_err(|e| ExchangeError::io("UDP receive", e))?;

        let response = Message::from_bytes(&recv_buf[..len])?;
        if response.id() != id {
            debug!(
                server = %addr,
                expected = id,
                received = response.id(),
                "Ignoring UDP response with mismatched id"
            );
            continue;
        }

        trace!(server = %addr, bytes_received = len, "UDP response received");
        return Ok(response);
    }
}

async fn tcp_exchange(
    addr: SocketAddr,
    request: &[u8],
    id: u16,
) -> Result<Message, ExchangeError> {
    let frame_len = u16::try_from(request.len())
        .map_err(|_| ExchangeError::Oversized(request.len()))?;

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ExchangeError::io("TCP connect", e))?;

    let mut frame = Vec::with_capacity(request.len() + 2);
    frame.extend_from_slice(&frame_len.to_be_bytes());
    frame.extend_from_slice(request);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| ExchangeError::io("TCP send", e))?;

    let len = stream
        .read_u16()
        .await
        .map_err(|e| ExchangeError::io("TCP receive", e))?;
    let mut buf = vec![0u8; usize::from(len)];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| ExchangeError::io("TCP receive", e))?;

    let response = Message::from_bytes(&buf)?;
    if response.id() != id {
        return Err(ExchangeError::IdMismatch {
            expected: id,
            received: response.id(),
        });
    }

    trace!(server = %addr, bytes_received = buf.len(), "TCP response received");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, OpCode, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{RData, Record};
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    use crate::query::Query;

    fn make_query(server: &str) -> (Message, ProbeContext) {
        let ctx = ProbeContext::with_timeout(Duration::from_secs(2));
        let message = Query::new("example.com", server, ctx.clone())
            .to_message()
            .unwrap();
        (message, ctx)
    }

    fn make_response(query: &Message, rcode: ResponseCode, answers: usize) -> Message {
        let mut response = Message::new();
        response
            .set_id(query.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_response_code(rcode);

        for q in query.queries() {
            response.add_query(q.clone());
        }
        if let Some(question) = query.queries().first() {
            for i in 0..answers {
                let ip = Ipv4Addr::new(192, 0, 2, i as u8 + 1);
                response.add_answer(Record::from_rdata(
                    question.name().clone(),
                    60,
                    RData::A(A(ip)),
                ));
            }
        }
        response
    }

    /// Answer every UDP query with `transform(query)`.
    async fn spawn_udp_responder<F>(transform: F) -> SocketAddr
    where
        F: Fn(&Message) -> Vec<Message> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let query = Message::from_bytes(&buf[..len]).unwrap();
                for reply in transform(&query) {
                    let bytes = reply.to_bytes().unwrap();
                    socket.send_to(&bytes, peer).await.unwrap();
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_udp_exchange_success() {
        let respond = |q: &Message| vec![make_response(q, ResponseCode::NoError, 2)];
        let addr = spawn_udp_responder(respond).await;
        let (message, ctx) = make_query(&addr.to_string());

        let response = NetworkResolver::new()
            .exchange(&message, &addr.to_string(), &ctx)
            .await
            .unwrap();

        assert_eq!(response.id(), message.id());
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 2);
    }

    #[tokio::test]
    async fn test_udp_exchange_ignores_mismatched_id() {
        let addr = spawn_udp_responder(|q| {
            let mut stray = make_response(q, ResponseCode::ServFail, 0);
            stray.set_id(q.id().wrapping_add(1));
            vec![stray, make_response(q, ResponseCode::NXDomain, 0)]
        })
        .await;
        let (message, ctx) = make_query(&addr.to_string());

        let response = NetworkResolver::new()
            .exchange(&message, &addr.to_string(), &ctx)
            .await
            .unwrap();

        assert_eq!(response.response_code(), ResponseCode::NXDomain);
    }

    #[tokio::test]
    async fn test_truncated_response_falls_back_to_tcp() {
        let addr = spawn_udp_responder(|q| {
            let mut truncated = make_response(q, ResponseCode::NoError, 0);
            truncated.set_truncated(true);
            vec![truncated]
        })
        .await;

        let listener = TcpListener::bind(addr).await.unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let len = stream.read_u16().await.unwrap();
            let mut buf = vec![0u8; usize::from(len)];
            stream.read_exact(&mut buf).await.unwrap();

            let query = Message::from_bytes(&buf).unwrap();
            let reply = make_response(&query, ResponseCode::NoError, 3)
                .to_bytes()
                .unwrap();
            stream.write_u16(reply.len() as u16).await.unwrap();
            stream.write_all(&reply).await.unwrap();
        });

        let (message, ctx) = make_query(&addr.to_string());
        let response = NetworkResolver::new()
            .exchange(&message, &addr.to_string(), &ctx)
            .await
            .unwrap();

        assert!(!response.truncated());
        assert_eq!(response.answers().len(), 3);
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        let addr = spawn_udp_responder(|_| Vec::new()).await;
        let ctx = ProbeContext::with_timeout(Duration::from_millis(50));
        let message = Query::new("example.com", addr.to_string(), ctx.clone())
            .to_message()
            .unwrap();

        let err = NetworkResolver::new()
            .exchange(&message, &addr.to_string(), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::DeadlineExceeded));
        assert!(err.is_context_done());
    }

    #[tokio::test]
    async fn test_unresolvable_server() {
        let (message, ctx) = make_query("not a server");

        let err = NetworkResolver::new()
            .exchange(&message, "not a server", &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::Resolve { .. }));
        assert!(!err.is_context_done());
    }

    #[test]
    fn test_reports_timeout_from_io_source() {
        let err = ExchangeError::io(
            "UDP receive",
            io::Error::new(io::ErrorKind::TimedOut, "timed out"),
        );
        assert!(err.reports_timeout());
        assert!(!err.is_context_done());
    }

    #[test]
    fn test_reports_timeout_other_io_kinds() {
        let err = ExchangeError::io(
            "UDP receive",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert!(!err.reports_timeout());
        assert!(!ExchangeError::DeadlineExceeded.reports_timeout());
        assert!(!ExchangeError::NoAddress("x".to_string()).reports_timeout());
    }
}
