//! Communication pattern executors.
//!
//! Every pattern follows the same lifecycle: buffers are allocated and
//! deterministically filled up front, the primitive is driven for the full
//! iteration budget, and the buffers release when the executor drops —
//! including on the error path. Executors never inspect the data they move;
//! content assertions live in the tests, which recompute expected bytes from
//! the fill rules in [`crate::payload`].
//!
//! A pattern runs on whatever [`GroupTransport`] it is handed, so the same
//! executor drives both the in-process and the TCP fabric.

mod all_to_all;
mod broadcast;
mod ping_pong;
mod reduce;
mod scatter;

pub use all_to_all::AllToAll;
pub use broadcast::Broadcast;
pub use ping_pong::PingPong;
pub use reduce::Reduce;
pub use scatter::Scatter;

use crate::cli::PatternKind;
use crate::payload::{AllocationError, BufferPlan, ElementBuffer, PayloadBuffer, ReleaseProbe};
use crate::topology::{GroupIdentity, Rank};
use crate::transport::{GroupTransport, TransportError};
use async_trait::async_trait;

/// Run-time parameters shared by every pattern.
#[derive(Clone, Copy, Debug)]
pub struct RunSpec {
    /// Fixed number of iterations to drive. Never adjusted at run time.
    pub iterations: usize,

    /// Bytes transmitted per operation; the buffers are usually larger.
    pub message_size: usize,

    /// The distinguished rank: hub for ping-pong, root for the rooted
    /// collectives. All-to-all has no distinguished rank and ignores it.
    pub role: Rank,
}

/// A benchmark pattern wired to its buffers.
#[async_trait]
pub trait CommPattern: Send {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Drive the pattern for the full iteration budget.
    ///
    /// Strictly sequential and blocking: each communication call must
    /// complete before the next is issued, and the future suspends
    /// indefinitely if a peer stops cooperating.
    async fn run(
        &mut self,
        transport: &mut dyn GroupTransport,
        spec: &RunSpec,
    ) -> Result<(), TransportError>;
}

/// Allocate and fill the buffers for one pattern instance.
///
/// `role` only affects the patterns with a distinguished rank; it decides
/// which member carries the root-side buffers.
pub fn build_pattern(
    kind: PatternKind,
    identity: GroupIdentity,
    plan: BufferPlan,
    role: Rank,
    probe: Option<&ReleaseProbe>,
) -> Result<Box<dyn CommPattern>, AllocationError> {
    match kind {
        PatternKind::PingPong => Ok(Box::new(PingPong::prepare(identity, plan, probe)?)),
        PatternKind::Broadcast => Ok(Box::new(Broadcast::prepare(identity, plan, probe)?)),
        PatternKind::Scatter => Ok(Box::new(Scatter::prepare(identity, plan, role, probe)?)),
        PatternKind::Reduce => Ok(Box::new(Reduce::prepare(identity, plan, role, probe)?)),
        PatternKind::AllToAll => Ok(Box::new(AllToAll::prepare(identity, plan, probe)?)),
        PatternKind::All => unreachable!("'all' is expanded before patterns are built"),
    }
}

fn probed(buffer: PayloadBuffer, probe: Option<&ReleaseProbe>) -> PayloadBuffer {
    match probe {
        Some(probe) => buffer.with_probe(probe),
        None => buffer,
    }
}

fn probed_elements(buffer: ElementBuffer, probe: Option<&ReleaseProbe>) -> ElementBuffer {
    match probe {
        Some(probe) => buffer.with_probe(probe),
        None => buffer,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{CommPattern, RunSpec};
    use crate::topology::GroupIdentity;
    use crate::transport::channel::ChannelFabric;
    use crate::transport::GroupTransport;

    /// Run one pattern instance per rank over an in-process group and hand
    /// the executors back for content inspection, ordered by rank.
    pub(crate) async fn run_group<P, F>(size: u32, spec: RunSpec, build: F) -> Vec<P>
    where
        P: CommPattern + 'static,
        F: Fn(GroupIdentity) -> P,
    {
        let mut handles = Vec::new();
        for mut transport in ChannelFabric::build(size).unwrap() {
            let mut pattern = build(transport.identity());
            handles.push(tokio::spawn(async move {
                pattern.run(&mut transport, &spec).await.unwrap();
                transport.close().await.unwrap();
                pattern
            }));
        }
        let mut patterns = Vec::new();
        for handle in handles {
            patterns.push(handle.await.unwrap());
        }
        patterns
    }
}
