//! Generation-tagged caches and typed arenas.
//!
//! Derived analysis values (superclass lists, attribute maps, inferred
//! parameter and return types) are stored in [`Cell`]s tagged with the
//! generation of the module that owns them. Invalidating a module is a
//! single counter bump: every cell tagged with an older generation misses
//! on its next query and recomputes. This replaces ad hoc "set to None"
//! invalidation with an explicit, testable state transition.
//!
//! A cell also models re-entrant computation: while a value is being
//! computed the cell reports [`CellQuery::InProgress`], which callers must
//! treat as "unknown for this attempt" rather than recursing.

use std::marker::PhantomData;

// ============================================================================
// Generations
// ============================================================================

/// Monotonic invalidation counter owned by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// The initial generation of a freshly loaded module.
    pub fn initial() -> Self {
        Generation(0)
    }

    /// The next generation after an invalidation.
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

// ============================================================================
// Cache Cells
// ============================================================================

/// A single-slot, invalidation-aware cache.
#[derive(Debug, Clone, Default)]
pub struct Cell<T> {
    state: CellState<T>,
}

#[derive(Debug, Clone, Default)]
enum CellState<T> {
    #[default]
    Empty,
    InProgress,
    Ready {
        generation: Generation,
        value: T,
    },
}

/// Result of querying a [`Cell`] against the owner's current generation.
#[derive(Debug, PartialEq, Eq)]
pub enum CellQuery<'a, T> {
    /// A value computed under the current generation.
    Hit(&'a T),
    /// No valid value; the caller should compute one.
    Miss,
    /// The value is being computed further up the call stack.
    InProgress,
}

impl<T> Cell<T> {
    /// Create an empty cell.
    pub fn new() -> Self {
        Cell {
            state: CellState::Empty,
        }
    }

    /// Query the cell. A value stored under an older generation is a miss.
    pub fn query(&self, current: Generation) -> CellQuery<'_, T> {
        match &self.state {
            CellState::Empty => CellQuery::Miss,
            CellState::InProgress => CellQuery::InProgress,
            CellState::Ready { generation, value } if *generation == current => {
                CellQuery::Hit(value)
            }
            CellState::Ready { .. } => CellQuery::Miss,
        }
    }

    /// Mark the cell as being computed.
    pub fn begin(&mut self) {
        self.state = CellState::InProgress;
    }

    /// Store a value computed under `generation`.
    pub fn fill(&mut self, generation: Generation, value: T) {
        self.state = CellState::Ready { generation, value };
    }

    /// Drop any stored or in-progress state.
    ///
    /// Used when a computation was interrupted by re-entrancy: the partial
    /// answer must not poison the cache.
    pub fn reset(&mut self) {
        self.state = CellState::Empty;
    }
}

// ============================================================================
// Arena Indices
// ============================================================================

/// A typed index into an [`Arena`].
pub trait Idx: Copy + Eq {
    fn from_usize(i: usize) -> Self;
    fn as_usize(self) -> usize;
}

/// Define a u32-backed arena index type.
#[macro_export]
macro_rules! define_idx {
    ($(#[$meta:meta])* $vis:vis struct $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name(u32);

        impl $crate::cache::Idx for $name {
            fn from_usize(i: usize) -> Self {
                $name(i as u32)
            }
            fn as_usize(self) -> usize {
                self.0 as usize
            }
        }
    };
}

// ============================================================================
// Arenas
// ============================================================================

/// Append-only storage addressed by a typed index.
///
/// Identity of analysis entities (objects, bindings, scopes) is index
/// identity; entities are never removed, only superseded when their owning
/// module is rebuilt under a newer generation.
#[derive(Debug, Default)]
pub struct Arena<I: Idx, T> {
    items: Vec<T>,
    _marker: PhantomData<I>,
}

impl<I: Idx, T> Arena<I, T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Arena {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Store an item and return its index.
    pub fn alloc(&mut self, item: T) -> I {
        let idx = I::from_usize(self.items.len());
        self.items.push(item);
        idx
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<I: Idx, T> std::ops::Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, idx: I) -> &T {
        &self.items[idx.as_usize()]
    }
}

impl<I: Idx, T> std::ops::IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, idx: I) -> &mut T {
        &mut self.items[idx.as_usize()]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cells {
        use super::*;

        #[test]
        fn empty_cell_misses() {
            let cell: Cell<u32> = Cell::new();
            assert_eq!(cell.query(Generation::initial()), CellQuery::Miss);
        }

        #[test]
        fn filled_cell_hits_under_same_generation() {
            let generation = Generation::initial();
            let mut cell = Cell::new();
            cell.fill(generation, 7u32);
            assert_eq!(cell.query(generation), CellQuery::Hit(&7));
        }

        #[test]
        fn generation_bump_invalidates() {
            let generation = Generation::initial();
            let mut cell = Cell::new();
            cell.fill(generation, 7u32);
            assert_eq!(cell.query(generation.next()), CellQuery::Miss);
        }

        #[test]
        fn in_progress_is_reported() {
            let mut cell: Cell<u32> = Cell::new();
            cell.begin();
            assert_eq!(cell.query(Generation::initial()), CellQuery::InProgress);
            cell.reset();
            assert_eq!(cell.query(Generation::initial()), CellQuery::Miss);
        }
    }

    mod arenas {
        use super::*;

        define_idx! {
            struct TestId
        }

        #[test]
        fn alloc_and_index() {
            let mut arena: Arena<TestId, &str> = Arena::new();
            let a = arena.alloc("first");
            let b = arena.alloc("second");
            assert_ne!(a, b);
            assert_eq!(arena[a], "first");
            assert_eq!(arena[b], "second");
            assert_eq!(arena.len(), 2);
        }
    }
}
