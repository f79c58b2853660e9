//! Stateful firewall: sharded TTL hash table, generational layer map,
//! sync transport, and the pipeline-facing lookup/ingestion handler
//! (spec.md §1 item 1, §3, §4.6, §4.7, §4.8).

pub mod handler;
pub mod hash;
pub mod key;
pub mod layer;
pub mod map;
pub mod sync;

pub use handler::{FwState, Timeouts};
pub use hash::HashKind;
pub use key::{fold_tcp_flags, Fw4Key, Fw6Key, FwKey, FwStateValue, FWSTATE_ACK, FWSTATE_FIN, FWSTATE_RST, FWSTATE_SYN};
pub use layer::{LayerEntry, LayerLookup, LayerMap};
pub use map::{Fwmap, MapKey, MergeValue, PutOutcome};
pub use sync::{SyncFrame, SyncSocket, SyncTransportConfig, ADDR_TYPE_IP4, ADDR_TYPE_IP6, SYNC_FRAME_LEN};
