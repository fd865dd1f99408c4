//! Local and parameter slot tracking for code generators.
//!
//! Two services a backend needs while walking a method body:
//!
//! - **Null-check memoization**: within one basic block, a value proven
//!   non-null does not need to be checked again. The memo is per slot and
//!   invalidated at block boundaries.
//! - **Duplication before mutation**: when a slot is about to be stored
//!   into while its current value is also live on the operand stack, the
//!   live occurrences must be materialized first, or they would observe
//!   the new value.
//!
//! Slot addresses are memoized the same way: the first address-of
//! computation is emitted once and reused.

/// One tracked local or parameter slot.
#[derive(Clone, Debug, Default)]
struct Slot {
    /// Proven non-null within the current basic block
    not_null: bool,
    /// An address-of computation has been emitted for this slot
    address_taken: bool,
    /// Bumped on every store; stack values carry the version they loaded
    version: u32,
}

/// The slot table for one method's locals or parameters.
#[derive(Debug, Default)]
pub struct LocalSlots {
    slots: Vec<Slot>,
}

/// One operand-stack entry as the coder tracks it: either the live value
/// of a slot (at a particular store version) or a detached temporary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackedValue {
    /// The current value of slot `slot` as of store `version`
    SlotValue {
        /// Slot index
        slot: usize,
        /// The slot version this value was loaded at
        version: u32,
    },
    /// A value with no slot aliasing (duplicated or computed)
    Temporary,
}

/// The coder's model of the operand stack, for alias tracking only.
#[derive(Debug, Default)]
pub struct TrackedStack {
    items: Vec<TrackedValue>,
}

impl LocalSlots {
    /// Create a table of `count` slots.
    #[must_use]
    pub fn new(count: usize) -> LocalSlots {
        LocalSlots {
            slots: vec![Slot::default(); count],
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Grow the table to at least `count` slots.
    pub fn ensure(&mut self, count: usize) {
        if self.slots.len() < count {
            self.slots.resize(count, Slot::default());
        }
    }

    /// True if a null check must be emitted for `slot`; a repeated check
    /// on a value already proven non-null within the same basic block is
    /// skipped.
    #[must_use]
    pub fn needs_null_check(&self, slot: usize) -> bool {
        self.slots.get(slot).is_none_or(|entry| !entry.not_null)
    }

    /// Record that `slot` has been null-checked (or assigned a value
    /// known non-null).
    pub fn mark_null_checked(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.not_null = true;
        }
    }

    /// Invalidate every null-check memo; called at basic-block
    /// boundaries, where control flow may join values of unknown
    /// provenance.
    pub fn begin_block(&mut self) {
        for entry in &mut self.slots {
            entry.not_null = false;
        }
    }

    /// True if an address-of computation must be emitted for `slot`;
    /// subsequent uses reuse the memoized address.
    pub fn needs_address_of(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry) => !std::mem::replace(&mut entry.address_taken, true),
            None => true,
        }
    }

    /// Current store version of `slot`.
    #[must_use]
    pub fn version(&self, slot: usize) -> u32 {
        self.slots.get(slot).map_or(0, |entry| entry.version)
    }

    /// Record a load of `slot` onto the tracked stack.
    pub fn load(&self, slot: usize, stack: &mut TrackedStack) {
        stack.items.push(TrackedValue::SlotValue {
            slot,
            version: self.version(slot),
        });
    }

    /// Prepare to store into `slot`: every operand-stack entry still
    /// aliasing the slot's current value is detached (the backend emits a
    /// duplication for each), then the slot version advances and its
    /// null-check memo resets. Returns the number of values duplicated.
    pub fn prepare_store(&mut self, slot: usize, stack: &mut TrackedStack) -> usize {
        let current = self.version(slot);
        let mut duplicated = 0;
        for item in &mut stack.items {
            if *item
                == (TrackedValue::SlotValue {
                    slot,
                    version: current,
                })
            {
                *item = TrackedValue::Temporary;
                duplicated += 1;
            }
        }
        if let Some(entry) = self.slots.get_mut(slot) {
            entry.version = entry.version.wrapping_add(1);
            entry.not_null = false;
        }
        duplicated
    }
}

impl TrackedStack {
    /// An empty tracked stack.
    #[must_use]
    pub fn new() -> TrackedStack {
        TrackedStack::default()
    }

    /// Push a non-aliasing value.
    pub fn push_temporary(&mut self) {
        self.items.push(TrackedValue::Temporary);
    }

    /// Pop the top tracked value.
    pub fn pop(&mut self) -> Option<TrackedValue> {
        self.items.pop()
    }

    /// Current tracked depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    /// The tracked items, bottom to top.
    #[must_use]
    pub fn items(&self) -> &[TrackedValue] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_checks_are_memoized_per_block() {
        let mut slots = LocalSlots::new(2);
        assert!(slots.needs_null_check(0));
        slots.mark_null_checked(0);
        assert!(!slots.needs_null_check(0));
        assert!(slots.needs_null_check(1));

        // A block boundary forgets every proof
        slots.begin_block();
        assert!(slots.needs_null_check(0));
    }

    #[test]
    fn store_invalidates_null_proof() {
        let mut slots = LocalSlots::new(1);
        let mut stack = TrackedStack::new();
        slots.mark_null_checked(0);
        slots.prepare_store(0, &mut stack);
        assert!(slots.needs_null_check(0));
    }

    #[test]
    fn live_stack_values_are_duplicated_before_store() {
        let mut slots = LocalSlots::new(2);
        let mut stack = TrackedStack::new();

        // Load slot 0 twice and slot 1 once
        slots.load(0, &mut stack);
        slots.load(0, &mut stack);
        slots.load(1, &mut stack);
        assert_eq!(stack.depth(), 3);

        // Storing into slot 0 must detach both live copies, but not the
        // value from slot 1
        let duplicated = slots.prepare_store(0, &mut stack);
        assert_eq!(duplicated, 2);
        assert_eq!(stack.items()[0], TrackedValue::Temporary);
        assert_eq!(stack.items()[1], TrackedValue::Temporary);
        assert!(matches!(
            stack.items()[2],
            TrackedValue::SlotValue { slot: 1, .. }
        ));
    }

    #[test]
    fn stale_versions_are_not_duplicated_again() {
        let mut slots = LocalSlots::new(1);
        let mut stack = TrackedStack::new();
        slots.load(0, &mut stack);
        assert_eq!(slots.prepare_store(0, &mut stack), 1);
        // The remaining entry is a temporary now; a second store finds no
        // live aliases
        assert_eq!(slots.prepare_store(0, &mut stack), 0);
    }

    #[test]
    fn loads_after_a_store_track_the_new_version() {
        let mut slots = LocalSlots::new(1);
        let mut stack = TrackedStack::new();
        slots.load(0, &mut stack);
        slots.prepare_store(0, &mut stack);
        slots.load(0, &mut stack);
        // Only the fresh load aliases the slot now
        assert_eq!(slots.prepare_store(0, &mut stack), 1);
    }

    #[test]
    fn address_of_is_memoized() {
        let mut slots = LocalSlots::new(1);
        assert!(slots.needs_address_of(0));
        assert!(!slots.needs_address_of(0));
    }
}
