//! One-to-all distribution from a configurable root.

use crate::patterns::{probed, CommPattern, RunSpec};
use crate::payload::{AllocationError, BufferPlan, PayloadBuffer, ReleaseProbe};
use crate::topology::GroupIdentity;
use crate::transport::{GroupTransport, TransportError};
use async_trait::async_trait;

/// Every member holds one full-capacity buffer; each iteration overwrites
/// the non-root windows with the root's.
pub struct Broadcast {
    payload: PayloadBuffer,
}

impl Broadcast {
    pub fn prepare(
        identity: GroupIdentity,
        plan: BufferPlan,
        probe: Option<&ReleaseProbe>,
    ) -> Result<Self, AllocationError> {
        let rank = identity.rank();
        let mut payload = probed(
            PayloadBuffer::allocate(rank, plan.capacity, "broadcast payload")?,
            probe,
        );
        payload.fill_uniform(rank);
        Ok(Self { payload })
    }

    pub fn payload(&self) -> &PayloadBuffer {
        &self.payload
    }
}

#[async_trait]
impl CommPattern for Broadcast {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn run(
        &mut self,
        transport: &mut dyn GroupTransport,
        spec: &RunSpec,
    ) -> Result<(), TransportError> {
        let len = spec.message_size;
        for _ in 0..spec.iterations {
            transport
                .broadcast(self.payload.window_mut(len), spec.role)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::testing::run_group;
    use crate::payload::uniform_byte;

    #[tokio::test]
    async fn four_members_converge_on_the_byte_of_root_two() {
        let plan = BufferPlan {
            capacity: 4096,
            active_size: 1024,
        };
        let spec = RunSpec {
            iterations: 8,
            message_size: 1024,
            role: 2,
        };
        let patterns = run_group(4, spec, |id| Broadcast::prepare(id, plan, None).unwrap()).await;

        for (rank, pattern) in patterns.iter().enumerate() {
            let buf = pattern.payload();
            // 'C' for root rank 2.
            assert_eq!(buf.window(1024), vec![b'C'; 1024].as_slice());
            assert_eq!(
                &buf.as_slice()[1024..],
                vec![uniform_byte(rank as u32); 4096 - 1024].as_slice(),
                "capacity past the window keeps the owner's fill"
            );
        }
    }

    #[tokio::test]
    async fn a_single_member_broadcast_is_a_no_op() {
        let plan = BufferPlan {
            capacity: 128,
            active_size: 128,
        };
        let spec = RunSpec {
            iterations: 3,
            message_size: 128,
            role: 0,
        };
        let patterns = run_group(1, spec, |id| Broadcast::prepare(id, plan, None).unwrap()).await;
        assert_eq!(
            patterns[0].payload().as_slice(),
            vec![uniform_byte(0); 128].as_slice()
        );
    }
}
