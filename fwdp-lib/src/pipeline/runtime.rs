//! Pipeline runtime (spec.md §4.10).
//!
//! Feeds a worker's packet batch through a configured sequence of module
//! handlers, rotating `input`/`output` between stages, and finally
//! handing `output` + `bypass` off to transmit. `drop` is returned too so
//! the caller (normally the NIC collaborator, out of scope per spec.md
//! §1) can free those descriptors' mbufs.

use super::module::{HandlerContext, PipelineFunction};
use super::packet::PacketFront;
use crate::clock::DpClock;
use crate::error::Result;
use crate::logging::DpLogger;

/// Final disposition of a batch after it has traversed every stage.
pub struct PipelineOutcome {
    pub transmit: Vec<super::packet::PacketDescriptor>,
    pub dropped: Vec<super::packet::PacketDescriptor>,
}

pub struct Pipeline {
    pub name: String,
    pub functions: Vec<PipelineFunction>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, functions: Vec<PipelineFunction>) -> Self {
        Self { name: name.into(), functions }
    }

    /// Run one batch through every function/chain's modules in order.
    pub fn run(&self, mut front: PacketFront, worker_idx: usize, clock: &dyn DpClock, logger: DpLogger) -> Result<PipelineOutcome> {
        for function in &self.functions {
            for module in function.primary_modules() {
                let ctx = HandlerContext { worker_idx, now: clock.now_ns(), logger, clock };
                module.handle(&mut front, &ctx)?;
                front.rotate();
            }
        }

        // Final output (whatever the last stage routed to `output`,
        // after the last rotate now sitting in `input`) plus anything
        // routed to `bypass` goes to transmit.
        let mut transmit: Vec<_> = front.input.into_iter().collect();
        transmit.extend(front.bypass);
        let dropped: Vec<_> = front.drop.into_iter().collect();
        Ok(PipelineOutcome { transmit, dropped })
    }
}
