//! TCP mesh fabric for multi-process groups.
//!
//! Each rank listens on `base port + rank` and dials every lower rank, so
//! every pair of members ends up with exactly one stream between them. The
//! dialer announces its rank with a hello frame; the acceptor learns who is
//! on the other end from that frame alone. Wiring is the only phase with a
//! deadline: members may start in any order, so dials are retried until the
//! peer's listener comes up or the rendezvous window closes. Once the mesh
//! is wired, reads and writes block indefinitely.
//!
//! Frames travel as a 4-byte little-endian length prefix followed by the
//! bincode encoding of [`Frame`].

use crate::topology::{GroupIdentity, Rank};
use crate::transport::mesh::{Frame, FrameSink, FrameSource, MeshTransport, HELLO_TAG};
use crate::transport::TransportError;
use async_trait::async_trait;
use socket2::Socket;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

/// A group endpoint wired over TCP streams.
pub type TcpTransport = MeshTransport<TcpFrameSink, TcpFrameSource>;

/// Bytes of framing and encoding overhead tolerated on top of the payload.
const FRAME_ENVELOPE: usize = 64;

/// Parameters for wiring a TCP mesh.
#[derive(Clone, Debug)]
pub struct TcpFabricConfig {
    pub host: String,
    /// Base port; rank r listens on `port + r`.
    pub port: u16,
    /// Kernel send and receive buffer size applied to every stream.
    pub socket_buffer: usize,
    /// Upper bound on an encoded frame, derived from the buffer capacity.
    pub frame_limit: usize,
    /// How long a member keeps dialing and accepting before giving up.
    pub rendezvous_timeout: Duration,
    /// Pause between dial attempts while a peer's listener comes up.
    pub retry_delay: Duration,
}

impl TcpFabricConfig {
    pub fn new(host: &str, port: u16, capacity: usize) -> Self {
        Self {
            host: host.to_string(),
            port,
            socket_buffer: crate::defaults::SOCKET_BUFFER,
            frame_limit: capacity.saturating_add(FRAME_ENVELOPE),
            rendezvous_timeout: crate::defaults::RENDEZVOUS_TIMEOUT,
            retry_delay: crate::defaults::DIAL_RETRY_DELAY,
        }
    }
}

/// Outbound half of the stream to one peer.
#[derive(Debug)]
pub struct TcpFrameSink {
    rank: Rank,
    peer: Rank,
    half: OwnedWriteHalf,
}

/// Inbound half of the stream from one peer.
#[derive(Debug)]
pub struct TcpFrameSource {
    rank: Rank,
    peer: Rank,
    half: OwnedReadHalf,
    limit: usize,
}

#[async_trait]
impl FrameSink for TcpFrameSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        write_frame(&mut self.half, &frame)
            .await
            .map_err(|err| disconnect_hint(err, self.rank, self.peer))
    }
}

#[async_trait]
impl FrameSource for TcpFrameSource {
    async fn recv_frame(&mut self) -> Result<Frame, TransportError> {
        read_frame(&mut self.half, self.rank, self.limit)
            .await
            .map_err(|err| disconnect_hint(err, self.rank, self.peer))
    }
}

/// Wire the full mesh for one member.
///
/// Dials every lower rank, accepts every higher one, and returns once all
/// `size - 1` links are up. A missing peer surfaces as
/// [`TransportError::RendezvousTimeout`] when the window closes.
pub async fn wire(
    identity: GroupIdentity,
    config: &TcpFabricConfig,
) -> Result<TcpTransport, TransportError> {
    let own = identity.rank();
    let size = identity.size();
    let mut sinks = BTreeMap::new();
    let mut sources = BTreeMap::new();
    if size == 1 {
        debug!(rank = own, "single-member group, nothing to wire");
        return Ok(MeshTransport::new(identity, sinks, sources));
    }

    let deadline = Instant::now() + config.rendezvous_timeout;
    let listen_port = config.port + own as u16;
    let listener = TcpListener::bind((config.host.as_str(), listen_port)).await?;
    debug!(rank = own, port = listen_port, "listening for higher ranks");

    for peer in 0..own {
        let stream = dial(config, own, peer, deadline).await?;
        let stream = tune(stream, config.socket_buffer)?;
        let (read_half, write_half) = stream.into_split();
        let mut sink = TcpFrameSink {
            rank: own,
            peer,
            half: write_half,
        };
        sink.send_frame(Frame {
            src: own,
            tag: HELLO_TAG,
            payload: Vec::new(),
        })
        .await?;
        debug!(rank = own, peer, "connected to lower rank");
        sinks.insert(peer, sink);
        sources.insert(
            peer,
            TcpFrameSource {
                rank: own,
                peer,
                half: read_half,
                limit: config.frame_limit,
            },
        );
    }

    for _ in own + 1..size {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (stream, _) = timeout(remaining, listener.accept())
            .await
            .map_err(|_| TransportError::RendezvousTimeout { rank: own })??;
        let stream = tune(stream, config.socket_buffer)?;
        let (mut read_half, write_half) = stream.into_split();
        let remaining = deadline.saturating_duration_since(Instant::now());
        let hello = timeout(remaining, read_frame(&mut read_half, own, config.frame_limit))
            .await
            .map_err(|_| TransportError::RendezvousTimeout { rank: own })??;
        if hello.tag != HELLO_TAG {
            return Err(TransportError::UnexpectedFrame {
                rank: own,
                expected_src: hello.src,
                expected_tag: HELLO_TAG,
                src: hello.src,
                tag: hello.tag,
            });
        }
        let peer = hello.src;
        if peer <= own || peer >= size || sinks.contains_key(&peer) {
            return Err(TransportError::UnknownPeer { rank: own, peer });
        }
        debug!(rank = own, peer, "accepted higher rank");
        sinks.insert(
            peer,
            TcpFrameSink {
                rank: own,
                peer,
                half: write_half,
            },
        );
        sources.insert(
            peer,
            TcpFrameSource {
                rank: own,
                peer,
                half: read_half,
                limit: config.frame_limit,
            },
        );
    }

    debug!(rank = own, links = sinks.len(), "mesh wired");
    Ok(MeshTransport::new(identity, sinks, sources))
}

async fn dial(
    config: &TcpFabricConfig,
    own: Rank,
    peer: Rank,
    deadline: Instant,
) -> Result<TcpStream, TransportError> {
    let port = config.port + peer as u16;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::RendezvousTimeout { rank: own });
        }
        match timeout(remaining, TcpStream::connect((config.host.as_str(), port))).await {
            Err(_) => return Err(TransportError::RendezvousTimeout { rank: own }),
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(err)) => {
                trace!(rank = own, peer, error = %err, "listener not ready, retrying");
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}

/// Disable Nagle and size the kernel buffers on a freshly connected stream.
fn tune(stream: TcpStream, buffer: usize) -> Result<TcpStream, TransportError> {
    let std_stream = stream.into_std()?;
    let socket = Socket::from(std_stream.try_clone()?);
    socket.set_nodelay(true)?;
    socket.set_recv_buffer_size(buffer)?;
    socket.set_send_buffer_size(buffer)?;
    Ok(TcpStream::from_std(std_stream)?)
}

async fn write_frame(half: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), TransportError> {
    let encoded = bincode::serialize(frame)?;
    half.write_all(&(encoded.len() as u32).to_le_bytes()).await?;
    half.write_all(&encoded).await?;
    half.flush().await?;
    Ok(())
}

async fn read_frame(
    half: &mut OwnedReadHalf,
    rank: Rank,
    limit: usize,
) -> Result<Frame, TransportError> {
    let mut len_bytes = [0u8; 4];
    half.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > limit {
        return Err(TransportError::OversizedFrame { rank, len, limit });
    }
    let mut encoded = vec![0u8; len];
    half.read_exact(&mut encoded).await?;
    Ok(bincode::deserialize(&encoded)?)
}

/// A torn stream reads as a peer disconnect rather than a bare I/O error,
/// matching what the in-process fabric reports.
fn disconnect_hint(err: TransportError, rank: Rank, peer: Rank) -> TransportError {
    match err {
        TransportError::Io(io) if is_disconnect(&io) => {
            TransportError::Disconnected { rank, peer }
        }
        other => other,
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{GroupTransport, PATTERN_TAG};

    fn test_config(port: u16) -> TcpFabricConfig {
        let mut config = TcpFabricConfig::new("127.0.0.1", port, 4096);
        config.rendezvous_timeout = Duration::from_secs(5);
        config
    }

    #[tokio::test]
    async fn two_ranks_exchange_over_a_wired_mesh() {
        const PORT: u16 = 21700;
        let upper = tokio::spawn(async move {
            let identity = GroupIdentity::new(1, 2).unwrap();
            let mut mesh = wire(identity, &test_config(PORT)).await.unwrap();
            let mut buf = [0u8; 6];
            mesh.recv(&mut buf, 0, PATTERN_TAG).await.unwrap();
            mesh.send(&buf, 0, PATTERN_TAG).await.unwrap();
            mesh.close().await.unwrap();
            buf
        });

        let identity = GroupIdentity::new(0, 2).unwrap();
        let mut mesh = wire(identity, &test_config(PORT)).await.unwrap();
        mesh.send(b"abc123", 1, PATTERN_TAG).await.unwrap();
        let mut echoed = [0u8; 6];
        mesh.recv(&mut echoed, 1, PATTERN_TAG).await.unwrap();
        mesh.close().await.unwrap();

        assert_eq!(&echoed, b"abc123");
        assert_eq!(&upper.await.unwrap(), b"abc123");
    }

    #[tokio::test]
    async fn rendezvous_gives_up_when_a_peer_never_arrives() {
        const PORT: u16 = 21710;
        let mut config = test_config(PORT);
        config.rendezvous_timeout = Duration::from_millis(200);
        let identity = GroupIdentity::new(0, 2).unwrap();
        let err = wire(identity, &config).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::RendezvousTimeout { rank: 0 }
        ));
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected_before_the_payload_is_read() {
        const PORT: u16 = 21720;
        let listener = TcpListener::bind(("127.0.0.1", PORT)).await.unwrap();
        let writer = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", PORT)).await.unwrap();
            stream.write_all(&(1_000_000u32).to_le_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            // Keep the stream open so the reader fails on the length, not EOF.
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let (stream, _) = listener.accept().await.unwrap();
        let (mut read_half, _write_half) = stream.into_split();
        let err = read_frame(&mut read_half, 0, 4096).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::OversizedFrame {
                rank: 0,
                len: 1_000_000,
                limit: 4096,
            }
        ));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn a_torn_stream_reads_as_a_disconnect() {
        const PORT: u16 = 21730;
        let listener = TcpListener::bind(("127.0.0.1", PORT)).await.unwrap();
        let dialer = tokio::spawn(async move {
            let stream = TcpStream::connect(("127.0.0.1", PORT)).await.unwrap();
            drop(stream);
        });

        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut source = TcpFrameSource {
            rank: 3,
            peer: 5,
            half: read_half,
            limit: 4096,
        };
        let err = source.recv_frame().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Disconnected { rank: 3, peer: 5 }
        ));
        dialer.await.unwrap();
    }
}
