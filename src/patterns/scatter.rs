//! Root-to-all distribution of per-destination segments.
//!
//! The root holds a source buffer scaled to one capacity-wide segment per
//! member, segment `i` filled with the byte for peer `i`. Each iteration
//! delivers the first message-size bytes of segment `i` into rank `i`'s
//! receive window — including the root's own segment, which moves by copy.

use crate::patterns::{probed, CommPattern, RunSpec};
use crate::payload::{AllocationError, BufferPlan, PayloadBuffer, ReleaseProbe};
use crate::topology::{GroupIdentity, Rank};
use crate::transport::{GroupTransport, TransportError};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Scatter {
    source: Option<PayloadBuffer>,
    received: PayloadBuffer,
}

impl Scatter {
    /// Allocate the receive buffer everywhere and the scaled source on the
    /// root only.
    pub fn prepare(
        identity: GroupIdentity,
        plan: BufferPlan,
        role: Rank,
        probe: Option<&ReleaseProbe>,
    ) -> Result<Self, AllocationError> {
        let rank = identity.rank();
        let received = probed(
            PayloadBuffer::allocate(rank, plan.capacity, "scatter receive")?,
            probe,
        );
        let source = if identity.is(role) {
            let mut buf = probed(
                PayloadBuffer::allocate(
                    rank,
                    plan.scaled_capacity(identity.size()),
                    "scatter source",
                )?,
                probe,
            );
            buf.fill_per_peer(rank, identity.size());
            Some(buf)
        } else {
            None
        };
        Ok(Self { source, received })
    }

    pub fn received(&self) -> &PayloadBuffer {
        &self.received
    }
}

#[async_trait]
impl CommPattern for Scatter {
    fn name(&self) -> &'static str {
        "scatter"
    }

    async fn run(
        &mut self,
        transport: &mut dyn GroupTransport,
        spec: &RunSpec,
    ) -> Result<(), TransportError> {
        let len = spec.message_size;
        for _ in 0..spec.iterations {
            let send = self.source.as_ref().map(PayloadBuffer::as_slice);
            transport
                .scatter(send, self.received.window_mut(len), spec.role)
                .await?;
        }
        Ok(())
    }
}
