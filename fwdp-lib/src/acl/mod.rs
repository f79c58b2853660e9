//! ACL match engine: compiled multi-dimensional packet classifier
//! (spec.md §1 item 2, §4.3, §4.4, §4.5).

pub mod action;
pub mod bitset;
pub mod compiler;
pub mod handler;
pub mod value_table;

pub use action::{pack_action, unpack_action, ActionKind, UnpackedAction, ACL_RULE_KEEP_STATE_FLAG, ACL_RULE_LOG_FLAG};
pub use bitset::RuleBitset;
pub use compiler::{AclCompiler, AclRule, CompiledAcl, PortRange};
pub use handler::{AclHandler, AclOutcome, StateChecker};
pub use value_table::{RangeRegistry, ValueTable};
