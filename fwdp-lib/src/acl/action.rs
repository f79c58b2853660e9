//! Action encoding (spec.md §4.4).
//!
//! Each compiled action is a single `u32`:
//!
//! ```text
//! bit 31 .......... 16 15              14 .......... 7 6 ........ 0
//! [   category_mask  ][ non_terminate ][     flags     ][ kind    ]
//! ```
//!
//! `category_mask` is a bitmask of devices the action applies to;
//! `non_terminate` means evaluation continues past this action even if it
//! would otherwise be terminating; `flags` carries per-action bits such
//! as "log"; `kind` (7 bits) selects [`ActionKind`].

pub const ACL_RULE_LOG_FLAG: u8 = 1 << 0;
pub const ACL_RULE_KEEP_STATE_FLAG: u8 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActionKind {
    Pass = 0,
    Deny = 1,
    Count = 2,
    CheckState = 3,
}

impl ActionKind {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x7F {
            0 => ActionKind::Pass,
            1 => ActionKind::Deny,
            2 => ActionKind::Count,
            3 => ActionKind::CheckState,
            other => panic!("impossible action kind bits: {other}"),
        }
    }
}

/// Pack an action per spec.md §4.4's bit layout.
pub fn pack_action(category_mask: u16, non_terminate: bool, kind: ActionKind, flags: u8) -> u32 {
    let non_terminate_bit = if non_terminate { 1u32 } else { 0u32 };
    ((category_mask as u32) << 16)
        | (non_terminate_bit << 15)
        | ((flags as u32) << 7)
        | (kind as u32 & 0x7F)
}

pub struct UnpackedAction {
    pub category_mask: u16,
    pub non_terminate: bool,
    pub kind: ActionKind,
    pub flags: u8,
}

pub fn unpack_action(word: u32) -> UnpackedAction {
    UnpackedAction {
        category_mask: (word >> 16) as u16,
        non_terminate: (word >> 15) & 1 != 0,
        kind: ActionKind::from_bits(word as u8),
        flags: ((word >> 7) & 0xFF) as u8,
    }
}
