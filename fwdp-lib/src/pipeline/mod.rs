//! Packet batch data model and module-handler runtime (spec.md §4.10).

mod module;
mod packet;
mod runtime;

pub use module::{Chain, HandlerContext, ModuleKind, PipelineFunction, PipelineModule};
pub use packet::{EtherType, L3L4Fields, Mbuf, PacketDescriptor, PacketFront, ParsedHeaders, TransportProto, MBUF_MAX_SIZE};
pub use runtime::{Pipeline, PipelineOutcome};
