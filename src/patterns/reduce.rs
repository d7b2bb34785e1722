//! All-to-root element-wise sum.
//!
//! Every member contributes `rank + 1` in each element slot; the root
//! combines the contributions into its result buffer. The element count is
//! the message size divided by the element width, floored, but at least one,
//! so an undersized message still reduces a single element.

use crate::patterns::{probed_elements, CommPattern, RunSpec};
use crate::payload::{AllocationError, BufferPlan, ElementBuffer, ReleaseProbe, ELEMENT_WIDTH};
use crate::topology::{GroupIdentity, Rank};
use crate::transport::{GroupTransport, ReduceOp, TransportError};
use async_trait::async_trait;

pub struct Reduce {
    contribution: ElementBuffer,
    result: Option<ElementBuffer>,
}

impl Reduce {
    /// Allocate the contribution buffer everywhere and the result buffer on
    /// the root only, both at full element capacity.
    pub fn prepare(
        identity: GroupIdentity,
        plan: BufferPlan,
        role: Rank,
        probe: Option<&ReleaseProbe>,
    ) -> Result<Self, AllocationError> {
        let rank = identity.rank();
        let mut contribution = probed_elements(
            ElementBuffer::allocate(rank, plan.capacity_elements(), "reduce contribution")?,
            probe,
        );
        contribution.fill_contribution(rank);
        let result = if identity.is(role) {
            Some(probed_elements(
                ElementBuffer::allocate(rank, plan.capacity_elements(), "reduce result")?,
                probe,
            ))
        } else {
            None
        };
        Ok(Self {
            contribution,
            result,
        })
    }

    pub fn result(&self) -> Option<&ElementBuffer> {
        self.result.as_ref()
    }
}

#[async_trait]
impl CommPattern for Reduce {
    fn name(&self) -> &'static str {
        "reduce"
    }

    async fn run(
        &mut self,
        transport: &mut dyn GroupTransport,
        spec: &RunSpec,
    ) -> Result<(), TransportError> {
        let count = (spec.message_size / ELEMENT_WIDTH).max(1);
        for _ in 0..spec.iterations {
            let send = self.contribution.window(count);
            let recv = self.result.as_mut().map(|buf| buf.window_mut(count));
            transport.reduce(send, recv, ReduceOp::Sum, spec.role).await?;
        }
        Ok(())
    }
}
