//! The time capsule: a snapshot/restore mechanism over a single mutable
//! buffer, implemented as a tree of instants connected by `redo`/`undo`
//! thunks rather than as a persistent (copy-on-write) data structure.
//!
//! Realizing an instant other than the one currently "live" walks up to
//! their last common ancestor (undoing along the way) and back down to the
//! target (redoing along the way). This gives O(path length) snapshot
//! restoration at the cost of single-writer acquire semantics: only one
//! instant may hold the data at a time.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::error::{Result, SchedulerError};

type Thunk<D> = Rc<dyn Fn(&mut D)>;

struct Node<D> {
    parent: Option<usize>,
    generation: u32,
    redo: Thunk<D>,
    undo: Thunk<D>,
}

struct Arena<D> {
    nodes: Vec<Node<D>>,
    data: D,
    current: usize,
    count: u32,
}

impl<D> Arena<D> {
    fn last_common_ancestor(&self, mut a: usize, mut b: usize) -> usize {
        while self.nodes[a].generation > self.nodes[b].generation {
            a = self.nodes[a].parent.expect("generation > 0 implies a parent");
        }
        while self.nodes[b].generation > self.nodes[a].generation {
            b = self.nodes[b].parent.expect("generation > 0 implies a parent");
        }
        while a != b {
            a = self.nodes[a].parent.expect("distinct instants share a root");
            b = self.nodes[b].parent.expect("distinct instants share a root");
        }
        a
    }

    /// Repositions `data` from `self.current` to `target`, running undo and
    /// redo thunks along the path through their last common ancestor.
    fn travel_to(&mut self, target: usize) {
        let ancestor = self.last_common_ancestor(self.current, target);

        let mut cursor = self.current;
        while cursor != ancestor {
            let undo = self.nodes[cursor].undo.clone();
            undo(&mut self.data);
            cursor = self.nodes[cursor].parent.expect("walked past the ancestor");
        }

        let mut path = Vec::new();
        let mut cursor = target;
        while cursor != ancestor {
            path.push(cursor);
            cursor = self.nodes[cursor].parent.expect("walked past the ancestor");
        }
        for &idx in path.iter().rev() {
            let redo = self.nodes[idx].redo.clone();
            redo(&mut self.data);
        }

        self.current = target;
    }
}

/// A logical position in a time capsule's history tree.
///
/// Cloning an `Instant` is cheap (it shares the underlying arena via `Rc`);
/// clones refer to the same position.
pub struct Instant<D> {
    arena: Rc<RefCell<Arena<D>>>,
    index: usize,
}

impl<D> Clone for Instant<D> {
    fn clone(&self) -> Self {
        Instant {
            arena: self.arena.clone(),
            index: self.index,
        }
    }
}

impl<D: 'static> Instant<D> {
    /// Creates a fresh time capsule rooted at `data`, returning its root
    /// instant.
    pub fn create(data: D) -> Self {
        let root = Node {
            parent: None,
            generation: 0,
            redo: Rc::new(|_: &mut D| {}),
            undo: Rc::new(|_: &mut D| {}),
        };
        let arena = Arena {
            nodes: vec![root],
            data,
            current: 0,
            count: 0,
        };
        Instant {
            arena: Rc::new(RefCell::new(arena)),
            index: 0,
        }
    }

    /// Returns a child instant that applies `redo` on top of `self` and
    /// `undo` to revert it. Building the child does not touch the live
    /// data — only `acquire` ever runs a thunk.
    pub fn modify(
        &self,
        redo: impl Fn(&mut D) + 'static,
        undo: impl Fn(&mut D) + 'static,
    ) -> Instant<D> {
        let mut arena = self.arena.borrow_mut();
        let generation = arena.nodes[self.index].generation + 1;
        let index = arena.nodes.len();
        arena.nodes.push(Node {
            parent: Some(self.index),
            generation,
            redo: Rc::new(redo),
            undo: Rc::new(undo),
        });
        Instant {
            arena: self.arena.clone(),
            index,
        }
    }

    /// Realizes the data at this instant's position, returning a handle to
    /// the live buffer. Increments the acquisition count if the data is
    /// already positioned here.
    pub fn acquire(&self) -> Result<DataHandle<D>> {
        {
            let arena = self.arena.borrow();
            if arena.count > 0 && arena.current != self.index {
                tracing::trace!(
                    instant = self.index,
                    held_at = arena.current,
                    "acquire rejected: capsule already held elsewhere"
                );
                return Err(SchedulerError::TimeCapsuleAlreadyAcquired);
            }
        }
        let mut arena = self.arena.borrow_mut();
        if arena.count == 0 {
            tracing::trace!(from = arena.current, to = self.index, "capsule traveling to instant");
            arena.travel_to(self.index);
        }
        arena.count += 1;
        tracing::trace!(instant = self.index, count = arena.count, "capsule acquired");
        Ok(DataHandle {
            arena: self.arena.clone(),
        })
    }

    /// Releases one reference acquired via [`Instant::acquire`].
    pub fn release(&self) -> Result<()> {
        let mut arena = self.arena.borrow_mut();
        if arena.count == 0 {
            tracing::trace!(instant = self.index, "release rejected: capsule not acquired");
            return Err(SchedulerError::TimeCapsuleNotAcquired);
        }
        if arena.current != self.index {
            tracing::trace!(
                instant = self.index,
                held_at = arena.current,
                "release rejected: capsule held at a different instant"
            );
            return Err(SchedulerError::TimeCapsuleAcquiredElsewhere);
        }
        arena.count -= 1;
        tracing::trace!(instant = self.index, count = arena.count, "capsule released");
        Ok(())
    }

    /// Acquires this instant, runs `f` against the live data, and releases
    /// — even if `f` panics.
    pub fn query<R>(&self, f: impl FnOnce(&mut D) -> R) -> Result<R> {
        let handle = self.acquire()?;
        let _guard = ReleaseOnDrop { instant: self };
        let mut data = handle.get_mut();
        Ok(f(&mut data))
    }
}

struct ReleaseOnDrop<'a, D> {
    instant: &'a Instant<D>,
}

impl<D> Drop for ReleaseOnDrop<'_, D> {
    fn drop(&mut self) {
        let _ = self.instant.release();
    }
}

/// A handle to the live data behind an acquired [`Instant`].
pub struct DataHandle<D> {
    arena: Rc<RefCell<Arena<D>>>,
}

impl<D> DataHandle<D> {
    /// Borrows the live data immutably.
    pub fn get(&self) -> Ref<'_, D> {
        Ref::map(self.arena.borrow(), |a| &a.data)
    }

    /// Borrows the live data mutably.
    pub fn get_mut(&self) -> RefMut<'_, D> {
        RefMut::map(self.arena.borrow_mut(), |a| &mut a.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_applies_modifications() {
        let root = Instant::create(0i32);
        let one = root.modify(|d| *d += 1, |d| *d -= 1);
        {
            let handle = one.acquire().unwrap();
            assert_eq!(*handle.get(), 1);
        }
        one.release().unwrap();
    }

    #[test]
    fn round_trip_restores_prior_value() {
        let root = Instant::create(0i32);
        let one = root.modify(|d| *d += 1, |d| *d -= 1);
        let two = one.modify(|d| *d += 10, |d| *d -= 10);

        let observed_at_two = two.query(|d| *d).unwrap();
        assert_eq!(observed_at_two, 11);

        let observed_at_root = root.query(|d| *d).unwrap();
        assert_eq!(observed_at_root, 0);

        // Reacquiring `two` must reproduce the same value as the first time.
        let observed_again = two.query(|d| *d).unwrap();
        assert_eq!(observed_again, observed_at_two);
    }

    #[test]
    fn sibling_branches_are_isolated() {
        let root = Instant::create(String::from("root"));
        let left = root.modify(
            |d| d.push_str("-left"),
            |d| {
                let len = d.len() - "-left".len();
                d.truncate(len);
            },
        );
        let right = root.modify(
            |d| d.push_str("-right"),
            |d| {
                let len = d.len() - "-right".len();
                d.truncate(len);
            },
        );

        assert_eq!(left.query(|d| d.clone()).unwrap(), "root-left");
        assert_eq!(right.query(|d| d.clone()).unwrap(), "root-right");
        assert_eq!(root.query(|d| d.clone()).unwrap(), "root");
    }

    #[test]
    fn acquire_fails_when_held_elsewhere() {
        let root = Instant::create(0i32);
        let one = root.modify(|d| *d += 1, |d| *d -= 1);
        let _held = root.acquire().unwrap();
        let err = one.acquire().unwrap_err();
        assert!(matches!(err, SchedulerError::TimeCapsuleAlreadyAcquired));
    }

    #[test]
    fn release_without_acquire_fails() {
        let root = Instant::create(0i32);
        let err = root.release().unwrap_err();
        assert!(matches!(err, SchedulerError::TimeCapsuleNotAcquired));
    }

    #[test]
    fn release_at_wrong_instant_fails() {
        let root = Instant::create(0i32);
        let one = root.modify(|d| *d += 1, |d| *d -= 1);
        let _handle = root.acquire().unwrap();
        let err = one.release().unwrap_err();
        assert!(matches!(err, SchedulerError::TimeCapsuleAcquiredElsewhere));
    }

    #[test]
    fn reacquiring_same_instant_increments_count() {
        let root = Instant::create(0i32);
        let _a = root.acquire().unwrap();
        let _b = root.acquire().unwrap();
        root.release().unwrap();
        root.release().unwrap();
        assert!(root.release().is_err());
    }
}
