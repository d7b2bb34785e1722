//! Pairwise-link mesh with linear collective algorithms.
//!
//! A [`MeshTransport`] owns one framed link per peer, split into a
//! [`FrameSink`] (outbound) and a [`FrameSource`] (inbound) so the two
//! directions can make progress independently. The collectives are built
//! directly on those links:
//!
//! - broadcast and scatter fan out from the root one peer at a time, in
//!   ascending rank order;
//! - reduce accumulates contributions into the root in ascending rank order,
//!   so the combination order is identical on every run;
//! - all-to-all walks rotation rounds (send to `rank + k`, receive from
//!   `rank - k`) with both directions of a round overlapped, so no pair of
//!   ranks can block on each other's writes.
//!
//! The fabrics ([`channel`](crate::transport::channel) and
//! [`tcp`](crate::transport::tcp)) only supply the halves; every correctness
//! check (frame origin, tag, byte count, segmentation) lives here so both
//! fabrics behave identically.

use crate::payload::{Element, ELEMENT_WIDTH};
use crate::topology::{GroupIdentity, Rank};
use crate::transport::{GroupTransport, ReduceOp, Tag, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Tag a dialer uses to announce its rank while the mesh is being wired.
pub(crate) const HELLO_TAG: Tag = u32::MAX;

// Tags reserved for the collective primitives. The harness is strictly
// sequential, so these only serve to catch wiring bugs, never to demultiplex.
const BCAST_TAG: Tag = u32::MAX - 1;
const SCATTER_TAG: Tag = u32::MAX - 2;
const REDUCE_TAG: Tag = u32::MAX - 3;
const ALL_TO_ALL_TAG: Tag = u32::MAX - 4;

/// One message on a pairwise link: the sender's rank, a tag, and the bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub src: Rank,
    pub tag: Tag,
    pub payload: Vec<u8>,
}

/// Outbound half of the link to one peer.
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver a frame to the peer. Resolves when the frame is handed to the
    /// underlying channel or socket, not when the peer consumes it.
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;
}

/// Inbound half of the link from one peer.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame from the peer, suspending until one arrives.
    async fn recv_frame(&mut self) -> Result<Frame, TransportError>;
}

/// A group endpoint built from per-peer framed links.
///
/// Owns one sink and one source for every rank except its own. All the
/// blocking primitives of [`GroupTransport`] are implemented here; the link
/// types only move frames.
#[derive(Debug)]
pub struct MeshTransport<S, R> {
    identity: GroupIdentity,
    sinks: BTreeMap<Rank, S>,
    sources: BTreeMap<Rank, R>,
}

impl<S: FrameSink, R: FrameSource> MeshTransport<S, R> {
    /// Assemble an endpoint from fully wired link halves.
    ///
    /// The maps must hold exactly one entry per peer; the fabrics guarantee
    /// this before construction.
    pub fn new(identity: GroupIdentity, sinks: BTreeMap<Rank, S>, sources: BTreeMap<Rank, R>) -> Self {
        debug_assert_eq!(sinks.len(), identity.size() as usize - 1);
        debug_assert_eq!(sources.len(), identity.size() as usize - 1);
        debug_assert!(!sinks.contains_key(&identity.rank()));
        Self {
            identity,
            sinks,
            sources,
        }
    }

    async fn send_payload(
        &mut self,
        payload: Vec<u8>,
        dest: Rank,
        tag: Tag,
    ) -> Result<(), TransportError> {
        let rank = self.identity.rank();
        let sink = self
            .sinks
            .get_mut(&dest)
            .ok_or(TransportError::UnknownPeer { rank, peer: dest })?;
        trace!(rank, dest, tag, bytes = payload.len(), "sending frame");
        sink.send_frame(Frame {
            src: rank,
            tag,
            payload,
        })
        .await
    }

    async fn recv_tagged(&mut self, source: Rank, tag: Tag) -> Result<Frame, TransportError> {
        let rank = self.identity.rank();
        let link = self
            .sources
            .get_mut(&source)
            .ok_or(TransportError::UnknownPeer { rank, peer: source })?;
        let frame = link.recv_frame().await?;
        check_frame(rank, &frame, source, tag)?;
        trace!(rank, source, tag, bytes = frame.payload.len(), "received frame");
        Ok(frame)
    }

    async fn recv_exact(
        &mut self,
        buf: &mut [u8],
        source: Rank,
        tag: Tag,
    ) -> Result<(), TransportError> {
        let frame = self.recv_tagged(source, tag).await?;
        if frame.payload.len() != buf.len() {
            return Err(TransportError::CountMismatch {
                rank: self.identity.rank(),
                got: frame.payload.len(),
                want: buf.len(),
            });
        }
        buf.copy_from_slice(&frame.payload);
        Ok(())
    }
}

#[async_trait]
impl<S: FrameSink, R: FrameSource> GroupTransport for MeshTransport<S, R> {
    fn identity(&self) -> GroupIdentity {
        self.identity
    }

    async fn send(&mut self, buf: &[u8], dest: Rank, tag: Tag) -> Result<(), TransportError> {
        self.send_payload(buf.to_vec(), dest, tag).await
    }

    async fn recv(
        &mut self,
        buf: &mut [u8],
        source: Rank,
        tag: Tag,
    ) -> Result<(), TransportError> {
        self.recv_exact(buf, source, tag).await
    }

    async fn broadcast(&mut self, buf: &mut [u8], root: Rank) -> Result<(), TransportError> {
        let id = self.identity;
        if id.is(root) {
            for peer in id.peers() {
                self.send_payload(buf.to_vec(), peer, BCAST_TAG).await?;
            }
            Ok(())
        } else {
            self.recv_exact(buf, root, BCAST_TAG).await
        }
    }

    async fn scatter(
        &mut self,
        send: Option<&[u8]>,
        recv: &mut [u8],
        root: Rank,
    ) -> Result<(), TransportError> {
        let id = self.identity;
        if id.is(root) {
            let send = send.ok_or(TransportError::MissingScatterSource { rank: id.rank() })?;
            let width = segment_width(id.rank(), send.len(), id.size(), recv.len())?;
            for peer in 0..id.size() {
                let segment = &send[peer as usize * width..][..recv.len()];
                if peer == id.rank() {
                    recv.copy_from_slice(segment);
                } else {
                    self.send_payload(segment.to_vec(), peer, SCATTER_TAG).await?;
                }
            }
            Ok(())
        } else {
            self.recv_exact(recv, root, SCATTER_TAG).await
        }
    }

    async fn reduce(
        &mut self,
        send: &[Element],
        recv: Option<&mut [Element]>,
        op: ReduceOp,
        root: Rank,
    ) -> Result<(), TransportError> {
        let id = self.identity;
        if id.is(root) {
            let recv =
                recv.ok_or(TransportError::MissingReduceDestination { rank: id.rank() })?;
            if recv.len() < send.len() {
                return Err(TransportError::CountMismatch {
                    rank: id.rank(),
                    got: recv.len(),
                    want: send.len(),
                });
            }
            let count = send.len();
            recv[..count].copy_from_slice(send);
            for peer in id.peers() {
                let frame = self.recv_tagged(peer, REDUCE_TAG).await?;
                if frame.payload.len() != count * ELEMENT_WIDTH {
                    return Err(TransportError::CountMismatch {
                        rank: id.rank(),
                        got: frame.payload.len(),
                        want: count * ELEMENT_WIDTH,
                    });
                }
                for (slot, chunk) in recv[..count]
                    .iter_mut()
                    .zip(frame.payload.chunks_exact(ELEMENT_WIDTH))
                {
                    let contribution =
                        Element::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    *slot = op.apply(*slot, contribution);
                }
            }
            Ok(())
        } else {
            self.send_payload(elements_to_bytes(send), root, REDUCE_TAG)
                .await
        }
    }

    async fn all_to_all(
        &mut self,
        send: &[u8],
        recv: &mut [u8],
        count: usize,
    ) -> Result<(), TransportError> {
        let id = self.identity;
        let own = id.rank();
        let size = id.size();
        let send_width = segment_width(own, send.len(), size, count)?;
        let recv_width = segment_width(own, recv.len(), size, count)?;

        // Own segment moves without touching a link.
        recv[own as usize * recv_width..][..count]
            .copy_from_slice(&send[own as usize * send_width..][..count]);

        // Rotation rounds: in round k every rank sends to rank + k while
        // receiving from rank - k, and the two halves run concurrently.
        // Each round is a ring permutation whose send is matched by a
        // simultaneously posted receive, so the exchange drains no matter
        // how large the segments are.
        for k in 1..size {
            let dest = (own + k) % size;
            let source = (own + size - k) % size;
            let outbound = Frame {
                src: own,
                tag: ALL_TO_ALL_TAG,
                payload: send[dest as usize * send_width..][..count].to_vec(),
            };
            let sink = self
                .sinks
                .get_mut(&dest)
                .ok_or(TransportError::UnknownPeer { rank: own, peer: dest })?;
            let link = self
                .sources
                .get_mut(&source)
                .ok_or(TransportError::UnknownPeer {
                    rank: own,
                    peer: source,
                })?;
            let (sent, received) = tokio::join!(sink.send_frame(outbound), link.recv_frame());
            sent?;
            let frame = received?;
            check_frame(own, &frame, source, ALL_TO_ALL_TAG)?;
            if frame.payload.len() != count {
                return Err(TransportError::CountMismatch {
                    rank: own,
                    got: frame.payload.len(),
                    want: count,
                });
            }
            recv[source as usize * recv_width..][..count].copy_from_slice(&frame.payload);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.sinks.is_empty() || !self.sources.is_empty() {
            debug!(rank = self.identity.rank(), "closing mesh endpoint");
        }
        self.sinks.clear();
        self.sources.clear();
        Ok(())
    }
}

fn check_frame(
    rank: Rank,
    frame: &Frame,
    expected_src: Rank,
    expected_tag: Tag,
) -> Result<(), TransportError> {
    if frame.src != expected_src || frame.tag != expected_tag {
        return Err(TransportError::UnexpectedFrame {
            rank,
            expected_src,
            expected_tag,
            src: frame.src,
            tag: frame.tag,
        });
    }
    Ok(())
}

/// Width of one per-peer segment of a buffer divided into `segments` equal
/// parts, of which the first `count` bytes are transmitted.
fn segment_width(
    rank: Rank,
    len: usize,
    segments: u32,
    count: usize,
) -> Result<usize, TransportError> {
    let parts = segments as usize;
    let width = len / parts;
    if len % parts != 0 || width < count {
        return Err(TransportError::BadSegmentation {
            rank,
            len,
            segments,
            count,
        });
    }
    Ok(width)
}

fn elements_to_bytes(elements: &[Element]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(elements.len() * ELEMENT_WIDTH);
    for element in elements {
        bytes.extend_from_slice(&element.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel::{ChannelFabric, ChannelTransport};
    use crate::transport::PATTERN_TAG;

    async fn on_group<F, T>(size: u32, body: F) -> Vec<T>
    where
        F: Fn(ChannelTransport) -> tokio::task::JoinHandle<T>,
        T: Send + 'static,
    {
        let mut handles = Vec::new();
        for endpoint in ChannelFabric::build(size).unwrap() {
            handles.push(body(endpoint));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        outcomes
    }

    #[tokio::test]
    async fn broadcast_overwrites_every_non_root_buffer() {
        let buffers = on_group(3, |mut endpoint| {
            tokio::spawn(async move {
                let rank = endpoint.identity().rank();
                let mut buf = vec![rank as u8; 16];
                endpoint.broadcast(&mut buf, 2).await.unwrap();
                buf
            })
        })
        .await;
        for buf in buffers {
            assert_eq!(buf, vec![2u8; 16]);
        }
    }

    #[tokio::test]
    async fn scatter_delivers_one_distinct_segment_per_rank() {
        let received = on_group(4, |mut endpoint| {
            tokio::spawn(async move {
                let id = endpoint.identity();
                let source: Vec<u8> = if id.is(0) {
                    // Four 8-byte segments, segment i filled with i.
                    (0..4u8).flat_map(|i| [i; 8]).collect()
                } else {
                    Vec::new()
                };
                let send = if id.is(0) { Some(&source[..]) } else { None };
                let mut recv = vec![0xFFu8; 3];
                endpoint.scatter(send, &mut recv, 0).await.unwrap();
                (id.rank(), recv)
            })
        })
        .await;
        for (rank, recv) in received {
            assert_eq!(recv, vec![rank as u8; 3]);
        }
    }

    #[tokio::test]
    async fn scatter_root_requires_a_source_buffer() {
        let mut endpoints = ChannelFabric::build(1).unwrap();
        let err = endpoints[0]
            .scatter(None, &mut [0u8; 4], 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingScatterSource { rank: 0 }
        ));
    }

    #[tokio::test]
    async fn scatter_rejects_a_source_too_small_for_the_group() {
        let mut endpoints = ChannelFabric::build(1).unwrap();
        // 7 bytes cannot be cut into one 8-byte segment.
        let source = [0u8; 7];
        let err = endpoints[0]
            .scatter(Some(&source), &mut [0u8; 8], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::BadSegmentation { .. }));
    }

    #[tokio::test]
    async fn reduce_combines_in_every_slot() {
        for (op, expected) in [
            (ReduceOp::Sum, 1 + 2 + 3),
            (ReduceOp::Min, 1),
            (ReduceOp::Max, 3),
        ] {
            let results = on_group(3, move |mut endpoint| {
                tokio::spawn(async move {
                    let rank = endpoint.identity().rank();
                    let send = vec![rank as Element + 1; 5];
                    let mut recv = vec![0 as Element; 5];
                    let dest = if rank == 0 { Some(&mut recv[..]) } else { None };
                    endpoint.reduce(&send, dest, op, 0).await.unwrap();
                    (rank, recv)
                })
            })
            .await;
            for (rank, recv) in results {
                if rank == 0 {
                    assert_eq!(recv, vec![expected; 5]);
                } else {
                    assert_eq!(recv, vec![0; 5], "non-root buffers stay untouched");
                }
            }
        }
    }

    #[tokio::test]
    async fn reduce_root_requires_a_destination() {
        let mut endpoints = ChannelFabric::build(1).unwrap();
        let err = endpoints[0]
            .reduce(&[1, 2], None, ReduceOp::Sum, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingReduceDestination { rank: 0 }
        ));
    }

    #[tokio::test]
    async fn reduce_rejects_a_short_destination() {
        let mut endpoints = ChannelFabric::build(1).unwrap();
        let mut recv = [0 as Element; 1];
        let err = endpoints[0]
            .reduce(&[1, 2], Some(&mut recv), ReduceOp::Sum, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::CountMismatch { got: 1, want: 2, .. }
        ));
    }

    #[tokio::test]
    async fn all_to_all_routes_every_segment_to_its_destination() {
        const SIZE: u32 = 4;
        const WIDTH: usize = 8;
        const COUNT: usize = 5;
        let results = on_group(SIZE, |mut endpoint| {
            tokio::spawn(async move {
                let rank = endpoint.identity().rank();
                // Segment for destination d carries (rank, d) in its bytes.
                let mut send = vec![0u8; WIDTH * SIZE as usize];
                for dest in 0..SIZE {
                    send[dest as usize * WIDTH..][..WIDTH]
                        .fill((rank * 10 + dest) as u8);
                }
                let mut recv = vec![0u8; WIDTH * SIZE as usize];
                endpoint.all_to_all(&send, &mut recv, COUNT).await.unwrap();
                (rank, recv)
            })
        })
        .await;
        for (rank, recv) in results {
            for source in 0..SIZE {
                let segment = &recv[source as usize * WIDTH..][..WIDTH];
                assert_eq!(&segment[..COUNT], vec![(source * 10 + rank) as u8; COUNT]);
                assert_eq!(&segment[COUNT..], vec![0u8; WIDTH - COUNT], "bytes past the count stay untouched");
            }
        }
    }

    #[tokio::test]
    async fn mismatched_tags_surface_as_unexpected_frames() {
        let mut endpoints = ChannelFabric::build(2).unwrap();
        let mut receiver = endpoints.pop().unwrap();
        let mut sender = endpoints.pop().unwrap();
        sender.send(b"ping", 1, 7).await.unwrap();
        let err = receiver.recv(&mut [0u8; 4], 0, PATTERN_TAG).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnexpectedFrame {
                rank: 1,
                expected_src: 0,
                expected_tag: PATTERN_TAG,
                src: 0,
                tag: 7,
            }
        ));
    }

    #[tokio::test]
    async fn short_frames_surface_as_count_mismatches() {
        let mut endpoints = ChannelFabric::build(2).unwrap();
        let mut receiver = endpoints.pop().unwrap();
        let mut sender = endpoints.pop().unwrap();
        sender.send(b"abc", 1, PATTERN_TAG).await.unwrap();
        let err = receiver
            .recv(&mut [0u8; 1024], 0, PATTERN_TAG)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::CountMismatch {
                rank: 1,
                got: 3,
                want: 1024,
            }
        ));
    }

    #[tokio::test]
    async fn sending_to_the_own_rank_is_refused() {
        let mut endpoints = ChannelFabric::build(2).unwrap();
        let err = endpoints[0].send(b"x", 0, PATTERN_TAG).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer { rank: 0, peer: 0 }));
    }

    #[tokio::test]
    async fn close_is_safe_to_call_twice() {
        let mut endpoints = ChannelFabric::build(2).unwrap();
        let endpoint = &mut endpoints[0];
        endpoint.close().await.unwrap();
        endpoint.close().await.unwrap();
        let err = endpoint.send(b"x", 1, PATTERN_TAG).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer { rank: 0, peer: 1 }));
    }

    #[test]
    fn segment_width_enforces_equal_division() {
        assert_eq!(segment_width(0, 32, 4, 8).unwrap(), 8);
        assert!(matches!(
            segment_width(0, 33, 4, 8),
            Err(TransportError::BadSegmentation { .. })
        ));
        assert!(matches!(
            segment_width(0, 32, 4, 9),
            Err(TransportError::BadSegmentation { .. })
        ));
    }
}
