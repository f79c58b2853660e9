//! Sub-allocator accounting (spec.md §4.1 "Sub-allocator (`memory_context`)").
//!
//! A named view over a shared [`Arena`](super::allocator::Arena) that
//! tracks cumulative `allocated`/`freed` totals per logical owner
//! (module or agent instance). Totals are read by the introspection
//! path (spec.md §6 "List agents").

use super::allocator::Arena;
use crate::error::Result;
use std::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTotals {
    pub allocated: u64,
    pub freed: u64,
}

impl MemoryTotals {
    pub fn in_use(&self) -> u64 {
        self.allocated.saturating_sub(self.freed)
    }
}

pub struct MemoryContext {
    name: String,
    arena: Mutex<Arena>,
    totals: Mutex<MemoryTotals>,
}

impl MemoryContext {
    pub fn new(name: impl Into<String>, arena: Arena) -> Self {
        Self { name: name.into(), arena: Mutex::new(arena), totals: Mutex::new(MemoryTotals::default()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alloc(&self, size: usize) -> Result<usize> {
        let mut arena = self.arena.lock().expect("arena lock poisoned");
        let offset = arena.alloc(size)?;
        let mut totals = self.totals.lock().expect("totals lock poisoned");
        totals.allocated += size as u64;
        Ok(offset)
    }

    pub fn free(&self, offset: usize, size: usize) {
        let mut arena = self.arena.lock().expect("arena lock poisoned");
        arena.free(offset, size);
        let mut totals = self.totals.lock().expect("totals lock poisoned");
        totals.freed += size as u64;
    }

    pub fn totals(&self) -> MemoryTotals {
        *self.totals.lock().expect("totals lock poisoned")
    }

    pub fn with_arena<R>(&self, f: impl FnOnce(&mut Arena) -> R) -> R {
        let mut arena = self.arena.lock().expect("arena lock poisoned");
        f(&mut arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_allocated_and_freed_totals() {
        let ctx = MemoryContext::new("acl", Arena::new(1 << 16));
        let off = ctx.alloc(128).unwrap();
        assert_eq!(ctx.totals().allocated, 128);
        ctx.free(off, 128);
        assert_eq!(ctx.totals().freed, 128);
        assert_eq!(ctx.totals().in_use(), 0);
    }
}
