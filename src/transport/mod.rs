//! # Group Communication Transport
//!
//! The harness drives one trait, [`GroupTransport`]: point-to-point send and
//! receive plus the four collective primitives, each a blocking call from the
//! caller's perspective (the future resolves when the operation's contract is
//! satisfied). Two fabrics implement it:
//!
//! - [`channel`]: per-pair in-process channels, ranks as Tokio tasks. Used by
//!   tests and `--fabric local` runs.
//! - [`tcp`]: a full TCP mesh between one OS process per rank, the
//!   benchmark's real deployment shape.
//!
//! Both share the collective algorithms in [`mesh`], which operate over any
//! per-peer framed link. Algorithm shape (linear fan-out, accumulation
//! order) is owned by this layer, not by the harness: the patterns only see
//! the blocking primitive.

use crate::payload::Element;
use crate::topology::{GroupIdentity, Rank};
use async_trait::async_trait;
use thiserror::Error;

pub mod channel;
pub mod mesh;
pub mod tcp;

pub use mesh::{Frame, MeshTransport};

/// Message tag carried by point-to-point frames.
pub type Tag = u32;

/// The tag the benchmark patterns use for their explicit sends and receives.
pub const PATTERN_TAG: Tag = 0;

/// Combinator applied element-wise by the reduce primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    /// Combine two contributions for one element slot.
    pub fn apply(self, a: Element, b: Element) -> Element {
        match self {
            ReduceOp::Sum => a.wrapping_add(b),
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }
}

/// Transport-level failures.
///
/// All of them are unrecoverable by contract: the harness never retries a
/// failed communication call, it reports and terminates. Diagnostics carry
/// the local rank; peer processes are not informed and will stall in their
/// next collective, which is the harness's documented failure model.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No link exists to the named peer (self, out of range, or closed).
    #[error("rank {rank}: no link to peer {peer}")]
    UnknownPeer { rank: Rank, peer: Rank },

    /// The peer's end of the link is gone.
    #[error("rank {rank}: peer {peer} closed the connection")]
    Disconnected { rank: Rank, peer: Rank },

    /// A frame arrived whose origin or tag disagrees with the posted receive.
    #[error(
        "rank {rank}: expected a frame from rank {expected_src} tagged {expected_tag}, \
         got one from rank {src} tagged {tag}"
    )]
    UnexpectedFrame {
        rank: Rank,
        expected_src: Rank,
        expected_tag: Tag,
        src: Rank,
        tag: Tag,
    },

    /// A frame's payload length disagrees with the posted buffer.
    #[error("rank {rank}: received {got} bytes where {want} were posted")]
    CountMismatch { rank: Rank, got: usize, want: usize },

    /// A buffer cannot be divided into the per-peer segments an operation
    /// requires.
    #[error(
        "rank {rank}: a {len}-byte buffer cannot supply {segments} equal segments \
         of at least {count} bytes"
    )]
    BadSegmentation {
        rank: Rank,
        len: usize,
        segments: u32,
        count: usize,
    },

    /// The scatter root was invoked without a send buffer.
    #[error("rank {rank}: the scatter root must supply a send buffer")]
    MissingScatterSource { rank: Rank },

    /// The reduce root was invoked without a receive buffer.
    #[error("rank {rank}: the reduce root must supply a receive buffer")]
    MissingReduceDestination { rank: Rank },

    /// An incoming frame announced a length past the sanity bound.
    #[error("rank {rank}: incoming frame of {len} bytes exceeds the {limit}-byte bound")]
    OversizedFrame {
        rank: Rank,
        len: usize,
        limit: usize,
    },

    /// The group did not finish wiring within the rendezvous window.
    #[error("rank {rank}: rendezvous with the group timed out")]
    RendezvousTimeout { rank: Rank },

    /// Frame encode/decode failure.
    #[error("frame codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Socket-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Blocking group communication over a fixed set of ranks.
///
/// Every method suspends until its contract is satisfied; the harness issues
/// exactly one call at a time, so implementations may assume no overlapping
/// operations from the same endpoint.
#[async_trait]
pub trait GroupTransport: Send {
    /// The identity this endpoint was wired with.
    fn identity(&self) -> GroupIdentity;

    /// Send `buf` to `dest`. Sending to the own rank is an error; the
    /// patterns skip self explicitly.
    async fn send(&mut self, buf: &[u8], dest: Rank, tag: Tag) -> Result<(), TransportError>;

    /// Receive into `buf` from `source`. The incoming frame must carry
    /// exactly `buf.len()` bytes and the given tag.
    async fn recv(&mut self, buf: &mut [u8], source: Rank, tag: Tag)
        -> Result<(), TransportError>;

    /// Distribute `buf` from `root` to every member; non-root buffers are
    /// overwritten with the root's content.
    async fn broadcast(&mut self, buf: &mut [u8], root: Rank) -> Result<(), TransportError>;

    /// Deliver to every rank the first `recv.len()` bytes of its segment of
    /// the root's send buffer, which is divided into group-size equal
    /// segments. `send` is read only on the root; other ranks pass `None`
    /// (a supplied buffer is ignored there, never read).
    async fn scatter(
        &mut self,
        send: Option<&[u8]>,
        recv: &mut [u8],
        root: Rank,
    ) -> Result<(), TransportError>;

    /// Combine every member's `send` elements with `op` into the root's
    /// receive window. `recv` is written only on the root — its first
    /// `send.len()` elements; capacity beyond that is left untouched.
    async fn reduce(
        &mut self,
        send: &[Element],
        recv: Option<&mut [Element]>,
        op: ReduceOp,
        root: Rank,
    ) -> Result<(), TransportError>;

    /// Exchange per-destination data between all members. Both buffers are
    /// divided into group-size equal segments; the first `count` bytes of
    /// send segment `j` arrive in rank `j`'s receive segment for this rank.
    async fn all_to_all(
        &mut self,
        send: &[u8],
        recv: &mut [u8],
        count: usize,
    ) -> Result<(), TransportError>;

    /// Release the endpoint's links. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TransportError>;
}
