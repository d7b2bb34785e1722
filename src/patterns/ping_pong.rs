//! Hub-and-spoke point-to-point exchange.
//!
//! The hub walks its peers in ascending rank order and performs a blocking
//! send followed by a blocking receive with each; every peer mirrors that
//! with a receive followed by a send. One iteration is one full sweep over
//! the group. Hub and peers reuse a single buffer for both directions, so
//! what travels after the first exchange is whatever arrived last — the
//! pattern measures the exchange, not the content.

use crate::patterns::{probed, CommPattern, RunSpec};
use crate::payload::{AllocationError, BufferPlan, PayloadBuffer, ReleaseProbe};
use crate::topology::GroupIdentity;
use crate::transport::{GroupTransport, TransportError, PATTERN_TAG};
use async_trait::async_trait;

pub struct PingPong {
    identity: GroupIdentity,
    payload: PayloadBuffer,
}

impl PingPong {
    /// Allocate the exchange buffer at full capacity and fill it with the
    /// owner's uniform byte.
    pub fn prepare(
        identity: GroupIdentity,
        plan: BufferPlan,
        probe: Option<&ReleaseProbe>,
    ) -> Result<Self, AllocationError> {
        let rank = identity.rank();
        let mut payload = probed(
            PayloadBuffer::allocate(rank, plan.capacity, "ping-pong payload")?,
            probe,
        );
        payload.fill_uniform(rank);
        Ok(Self { identity, payload })
    }

    pub fn payload(&self) -> &PayloadBuffer {
        &self.payload
    }
}

#[async_trait]
impl CommPattern for PingPong {
    fn name(&self) -> &'static str {
        "ping-pong"
    }

    async fn run(
        &mut self,
        transport: &mut dyn GroupTransport,
        spec: &RunSpec,
    ) -> Result<(), TransportError> {
        let id = self.identity;
        let len = spec.message_size;
        if id.is(spec.role) {
            for _ in 0..spec.iterations {
                for peer in id.peers() {
                    transport
                        .send(self.payload.window(len), peer, PATTERN_TAG)
                        .await?;
                    transport
                        .recv(self.payload.window_mut(len), peer, PATTERN_TAG)
                        .await?;
                }
            }
        } else {
            for _ in 0..spec.iterations {
                transport
                    .recv(self.payload.window_mut(len), spec.role, PATTERN_TAG)
                    .await?;
                transport
                    .send(self.payload.window(len), spec.role, PATTERN_TAG)
                    .await?;
            }
        }
        Ok(())
    }
}
