//! Offset-relative pointers (spec.md §3 "Offset pointer", §4.1).
//!
//! An [`Offset<T>`] stores `target_address - &field` as a signed 64-bit
//! delta instead of an absolute address, so the same bytes resolve
//! correctly in every process that maps the owning arena at a different
//! virtual base. Zero means null.
//!
//! This is the Rust answer to the "offset-relative pointers in a
//! manually-mapped shared region" pattern flagged in Design Notes §9: the
//! delta is computed and resolved at the field's own address rather than
//! a fixed arena base, so copying a structure containing one without
//! fix-up is caught by construction (the raw delta from the old location
//! is meaningless at the new one) rather than silently producing a
//! dangling pointer that merely happens to work.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};

/// A field-relative offset pointer to a `T` living in the same shared
/// arena. Stored value is `target_address - &self as i64`; zero is null.
#[repr(transparent)]
pub struct Offset<T> {
    delta: AtomicI64,
    _marker: PhantomData<*const T>,
}

// SAFETY: Offset<T> only ever stores an integer delta; sending it across
// threads is sound as long as T itself is Send, which callers guarantee
// by construction (the shared arena is the actual source of truth).
unsafe impl<T> Send for Offset<T> {}
unsafe impl<T> Sync for Offset<T> {}

impl<T> Offset<T> {
    pub const fn null() -> Self {
        Self { delta: AtomicI64::new(0), _marker: PhantomData }
    }

    pub fn is_null(&self) -> bool {
        self.delta.load(Ordering::Acquire) == 0
    }

    /// `ADDR_OF(field)`: resolve to the absolute address of the pointee,
    /// or `None` if null. `unsafe` because the caller must guarantee the
    /// resolved address stays within the arena's lifetime.
    ///
    /// # Safety
    /// The delta must have been produced by [`Offset::set`] or
    /// [`Offset::equate`] called on this same field instance, and the
    /// target object must still be alive.
    pub unsafe fn resolve(&self) -> Option<*const T> {
        let delta = self.delta.load(Ordering::Acquire);
        if delta == 0 {
            return None;
        }
        let self_addr = self as *const Self as i64;
        Some((self_addr + delta) as *const T)
    }

    /// Non-atomic store of `target - &self`. Mirrors `p = q` in the
    /// original: a plain assignment, not a cross-process transfer.
    pub fn set(&self, target: *const T) {
        let self_addr = self as *const Self as i64;
        let target_addr = target as i64;
        self.delta.store(target_addr.wrapping_sub(self_addr), Ordering::Release);
    }

    pub fn clear(&self) {
        self.delta.store(0, Ordering::Release);
    }

    /// `EQUATE_OFFSET(&dst, &src)`: copy the *absolute* target address
    /// from `src` into `dst`, recomputing the delta against `dst`'s own
    /// address. Required whenever `dst` and `src` have different bases
    /// (e.g. control-plane propagation of a config generation into a
    /// freshly allocated successor) — copying the raw delta would resolve
    /// to the wrong address.
    ///
    /// # Safety
    /// `src` must currently resolve to a live object of type `T`.
    pub unsafe fn equate(&self, src: &Offset<T>) {
        match src.resolve() {
            Some(target) => self.set(target),
            None => self.clear(),
        }
    }
}

impl<T> Default for Offset<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> std::fmt::Debug for Offset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Offset").field("delta", &self.delta.load(Ordering::Relaxed)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Anchor {
        value: u32,
        next: Offset<Anchor>,
    }

    #[test]
    fn null_by_default() {
        let o: Offset<u32> = Offset::null();
        assert!(o.is_null());
        unsafe {
            assert!(o.resolve().is_none());
        }
    }

    #[test]
    fn resolves_to_set_target() {
        let a = Anchor { value: 1, next: Offset::null() };
        let b = Anchor { value: 2, next: Offset::null() };
        a.next.set(&b as *const Anchor);
        unsafe {
            let resolved = a.next.resolve().expect("non-null");
            assert_eq!((*resolved).value, 2);
        }
    }

    #[test]
    fn equate_transfers_absolute_target_not_raw_delta() {
        let target = Anchor { value: 42, next: Offset::null() };
        let src = Anchor { value: 0, next: Offset::null() };
        src.next.set(&target as *const Anchor);

        // dst lives at a different address than src, so copying the raw
        // delta would resolve incorrectly; equate must recompute it.
        let dst = Anchor { value: 0, next: Offset::null() };
        unsafe {
            dst.next.equate(&src.next);
            let resolved = dst.next.resolve().expect("non-null");
            assert_eq!((*resolved).value, 42);
        }
    }

    #[test]
    fn clear_makes_null() {
        let a = Anchor { value: 1, next: Offset::null() };
        let b = Anchor { value: 2, next: Offset::null() };
        a.next.set(&b as *const Anchor);
        a.next.clear();
        assert!(a.next.is_null());
    }
}
