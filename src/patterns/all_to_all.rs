//! Full personalized exchange: every member sends a distinct segment to
//! every member, including itself.

use crate::patterns::{probed, CommPattern, RunSpec};
use crate::payload::{AllocationError, BufferPlan, PayloadBuffer, ReleaseProbe};
use crate::topology::GroupIdentity;
use crate::transport::{GroupTransport, TransportError};
use async_trait::async_trait;

/// Both buffers hold one capacity-wide segment per member; each iteration
/// moves the first message-size bytes of every segment.
pub struct AllToAll {
    send: PayloadBuffer,
    received: PayloadBuffer,
}

impl AllToAll {
    pub fn prepare(
        identity: GroupIdentity,
        plan: BufferPlan,
        probe: Option<&ReleaseProbe>,
    ) -> Result<Self, AllocationError> {
        let rank = identity.rank();
        let size = identity.size();
        let mut send = probed(
            PayloadBuffer::allocate(rank, plan.scaled_capacity(size), "all-to-all send")?,
            probe,
        );
        send.fill_per_peer(rank, size);
        let received = probed(
            PayloadBuffer::allocate(rank, plan.scaled_capacity(size), "all-to-all receive")?,
            probe,
        );
        Ok(Self { send, received })
    }

    pub fn received(&self) -> &PayloadBuffer {
        &self.received
    }
}

#[async_trait]
impl CommPattern for AllToAll {
    fn name(&self) -> &'static str {
        "all-to-all"
    }

    async fn run(
        &mut self,
        transport: &mut dyn GroupTransport,
        spec: &RunSpec,
    ) -> Result<(), TransportError> {
        for _ in 0..spec.iterations {
            transport
                .all_to_all(
                    self.send.as_slice(),
                    self.received.as_mut_slice(),
                    spec.message_size,
                )
                .await?;
        }
        Ok(())
    }
}
