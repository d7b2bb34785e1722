//! # Payload Buffer Management
//!
//! Every pattern transmits from (and receives into) fixed-capacity buffers
//! owned exclusively by one process. The rules this module enforces:
//!
//! - **Oversized allocation**: buffers are allocated at the run's configured
//!   maximum capacity, not at the message size actually transmitted, so a
//!   sweep over message sizes exercises the same memory layout every time.
//!   Roles that hold per-destination data (a scatter source, the all-to-all
//!   buffers) scale that capacity by the group size.
//! - **Deterministic content**: fills depend only on `(owner rank, peer
//!   rank)` — no randomness, no time. A receiver can recompute the expected
//!   byte for any segment after the fact.
//! - **Fallible allocation**: an allocation request that cannot be satisfied
//!   surfaces as a typed [`AllocationError`] naming the rank and the
//!   requested size; it never aborts the process from inside the allocator.
//! - **Release exactly once**: buffers release on drop, on every exit path.
//!   Tests observe releases through an optional [`ReleaseProbe`].

use crate::topology::Rank;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Element type carried by the Reduce pattern's numeric buffers.
pub type Element = i32;

/// Width in bytes of one reduce element.
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<Element>();

/// Sizing rule for one run: the capacity buffers are allocated at, and the
/// active window actually transmitted per iteration.
///
/// `active_size ≤ capacity` is validated when the configuration is built;
/// the plan itself is a plain value threaded into buffer construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPlan {
    /// Allocation capacity in bytes: the largest message size the run
    /// supports, independent of what an iteration transmits.
    pub capacity: usize,

    /// Bytes transmitted per iteration. Always ≤ `capacity`.
    pub active_size: usize,
}

impl BufferPlan {
    /// Width of one per-peer segment in a group-scaled buffer.
    pub fn segment_width(&self) -> usize {
        self.capacity
    }

    /// Total bytes for a buffer holding one segment per group member.
    pub fn scaled_capacity(&self, group_size: u32) -> usize {
        self.capacity * group_size as usize
    }

    /// Elements transmitted per reduce iteration: `active_size` divided by
    /// the element width, floored, but never zero — an undersized message
    /// size still reduces a single element.
    pub fn element_count(&self) -> usize {
        (self.active_size / ELEMENT_WIDTH).max(1)
    }

    /// Elements held by a full-capacity element buffer.
    pub fn capacity_elements(&self) -> usize {
        (self.capacity / ELEMENT_WIDTH).max(1)
    }
}

/// The deterministic byte for uniformly filled data owned by `owner`.
pub fn uniform_byte(owner: Rank) -> u8 {
    b'A' + (owner % 26) as u8
}

/// The deterministic byte for data owned by `owner` in the segment destined
/// for (or received from the perspective of) `peer`.
///
/// Segments for peers `j` and `k` therefore differ exactly when
/// `(owner + j) mod 26 ≠ (owner + k) mod 26`.
pub fn segment_byte(owner: Rank, peer: Rank) -> u8 {
    b'A' + ((owner as u64 + peer as u64) % 26) as u8
}

/// Error raised when a buffer request cannot be satisfied.
///
/// Attributed to the requesting process; the failing process reports it and
/// exits. Peers are not notified — they will stall in the next collective,
/// which is the documented (not masked) behavior of the harness.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rank {rank}: failed to allocate {requested} bytes for the {purpose} buffer")]
pub struct AllocationError {
    pub rank: Rank,
    pub requested: usize,
    pub purpose: &'static str,
}

/// Counts releases of the buffers it is attached to.
///
/// `Drop` already guarantees at-most-once release per buffer; the probe lets
/// tests assert exactly-once across early-exit paths.
#[derive(Clone, Debug, Default)]
pub struct ReleaseProbe {
    released: Arc<AtomicUsize>,
}

impl ReleaseProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffer releases observed so far.
    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn mark_released(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A contiguous byte buffer owned by exactly one process.
#[derive(Debug)]
pub struct PayloadBuffer {
    bytes: Vec<u8>,
    rank: Rank,
    probe: Option<ReleaseProbe>,
}

impl PayloadBuffer {
    /// Allocate a zeroed buffer of exactly `bytes` bytes.
    ///
    /// Uses fallible reservation so an unsatisfiable request becomes an
    /// [`AllocationError`] carrying the requesting rank, the byte count, and
    /// the buffer's purpose, instead of an allocator abort.
    pub fn allocate(rank: Rank, bytes: usize, purpose: &'static str) -> Result<Self, AllocationError> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| AllocationError {
                rank,
                requested: bytes,
                purpose,
            })?;
        data.resize(bytes, 0);
        trace!(rank, bytes, purpose, "allocated payload buffer");
        Ok(Self {
            bytes: data,
            rank,
            probe: None,
        })
    }

    /// Attach a release probe (test instrumentation).
    pub fn with_probe(mut self, probe: &ReleaseProbe) -> Self {
        self.probe = Some(probe.clone());
        self
    }

    /// Fill every byte with this owner's uniform pattern.
    pub fn fill_uniform(&mut self, owner: Rank) {
        let value = uniform_byte(owner);
        self.bytes.fill(value);
    }

    /// Divide the buffer into `segments` equal parts and fill part `i` with
    /// the byte destined for peer `i`.
    pub fn fill_per_peer(&mut self, owner: Rank, segments: u32) {
        let width = self.bytes.len() / segments as usize;
        for peer in 0..segments {
            let start = peer as usize * width;
            self.bytes[start..start + width].fill(segment_byte(owner, peer));
        }
    }

    /// Total allocated bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The whole allocation.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The whole allocation, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// The active window: the first `len` bytes.
    pub fn window(&self, len: usize) -> &[u8] {
        &self.bytes[..len]
    }

    /// The active window, writable.
    pub fn window_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.bytes[..len]
    }
}

impl Drop for PayloadBuffer {
    fn drop(&mut self) {
        if let Some(probe) = &self.probe {
            probe.mark_released();
        }
        trace!(rank = self.rank, bytes = self.bytes.len(), "released payload buffer");
    }
}

/// A numeric buffer for the Reduce pattern, one [`Element`] per slot.
#[derive(Debug)]
pub struct ElementBuffer {
    elements: Vec<Element>,
    rank: Rank,
    probe: Option<ReleaseProbe>,
}

impl ElementBuffer {
    /// Allocate a zeroed buffer of `count` elements.
    pub fn allocate(rank: Rank, count: usize, purpose: &'static str) -> Result<Self, AllocationError> {
        let mut data = Vec::new();
        data.try_reserve_exact(count)
            .map_err(|_| AllocationError {
                rank,
                requested: count * ELEMENT_WIDTH,
                purpose,
            })?;
        data.resize(count, 0);
        trace!(rank, count, purpose, "allocated element buffer");
        Ok(Self {
            elements: data,
            rank,
            probe: None,
        })
    }

    /// Attach a release probe (test instrumentation).
    pub fn with_probe(mut self, probe: &ReleaseProbe) -> Self {
        self.probe = Some(probe.clone());
        self
    }

    /// Set every element to this rank's reduce contribution, `rank + 1`.
    pub fn fill_contribution(&mut self, owner: Rank) {
        self.elements.fill(owner as Element + 1);
    }

    /// Total allocated elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.elements
    }

    /// The active window: the first `count` elements.
    pub fn window(&self, count: usize) -> &[Element] {
        &self.elements[..count]
    }

    /// The active window, writable.
    pub fn window_mut(&mut self, count: usize) -> &mut [Element] {
        &mut self.elements[..count]
    }
}

impl Drop for ElementBuffer {
    fn drop(&mut self) {
        if let Some(probe) = &self.probe {
            probe.mark_released();
        }
        trace!(rank = self.rank, elements = self.elements.len(), "released element buffer");
    }
}
