//! Single-slot permits used for slot ownership and poll reentrancy.
//!
//! The engine targets single-threaded cooperative scheduling, so a permit is
//! a plain `Cell<bool>` rather than an atomic: tasks interleave only at
//! explicit yield points, never inside a permit operation. An [`Endpoint`]
//! carries two independent permits — one for "who owns the request slot"
//! and one for "who is currently parsing" — so the two concerns stay
//! testable in isolation.
//!
//! [`Endpoint`]: crate::Endpoint

use core::cell::Cell;

/// A single-slot, non-blocking permit.
#[derive(Debug, Default)]
pub struct Permit {
    held: Cell<bool>,
}

impl Permit {
    /// Create a released permit.
    pub const fn new() -> Self {
        Self {
            held: Cell::new(false),
        }
    }

    /// Take the permit. Returns `false` if it is already held.
    pub fn try_acquire(&self) -> bool {
        !self.held.replace(true)
    }

    /// Give the permit back.
    pub fn release(&self) {
        self.held.set(false);
    }

    /// Whether the permit is currently held.
    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    /// Take the permit with scope-bound release.
    ///
    /// Used around the poll body: the guard drops on every exit path, so a
    /// parser fault can never leave the permit wedged.
    pub fn guard(&self) -> Option<PermitGuard<'_>> {
        if self.try_acquire() {
            Some(PermitGuard { permit: self })
        } else {
            None
        }
    }
}

/// RAII guard returned by [`Permit::guard`]; releases on drop.
#[derive(Debug)]
pub struct PermitGuard<'a> {
    permit: &'a Permit,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        self.permit.release();
    }
}
