#![forbid(unsafe_code)]

//! Generational, index-linked doubly-linked list.
//!
//! [`LinkedSlab<T>`] stores its nodes in a slot vector and links them by
//! index instead of by pointer. Every insertion returns a [`NodeKey`] that
//! stays valid until that node is removed; a key whose node has been removed
//! (even if the slot was reused) is rejected by every lookup.
//!
//! # Operations
//!
//! | Operation                         | Complexity |
//! |-----------------------------------|------------|
//! | `push_front` / `push_back`        | O(1)       |
//! | `insert_before` / `insert_after`  | O(1)       |
//! | `remove`                          | O(1)       |
//! | `next` / `prev` / `get`           | O(1)       |
//! | `insert_at` / `locate`            | O(k) where k = steps walked |
//!
//! # Positions
//!
//! [`LinkedSlab::insert_at`] and [`LinkedSlab::locate`] take a signed
//! position. Non-negative positions count from the front, negative
//! positions count from the back with `-1` naming the last node:
//!
//! ```text
//! nodes:        A    B    C
//! front pos:    0    1    2
//! back pos:    -3   -2   -1
//! ```
//!
//! ```
//! use sigwire_list::LinkedSlab;
//!
//! let mut list = LinkedSlab::new();
//! let a = list.push_back('a');
//! list.push_back('c');
//! list.insert_at(1, 'b');
//! assert_eq!(list.values().copied().collect::<String>(), "abc");
//!
//! list.remove(a);
//! assert_eq!(list.values().copied().collect::<String>(), "bc");
//! assert!(list.get(a).is_none());
//! ```

use std::fmt;

/// Stable handle to a node in a [`LinkedSlab`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    index: u32,
    generation: u32,
}

impl NodeKey {
    /// A key that never names a node. Useful as a placeholder while the
    /// real key is not yet known.
    pub const DANGLING: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Slot index of the node.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation the slot had when the node was inserted.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({}v{})", self.index, self.generation)
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Front to back (following `next`).
    Forward,
    /// Back to front (following `prev`).
    Backward,
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
struct SlotEntry<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Doubly-linked list over a slot arena.
#[derive(Clone)]
pub struct LinkedSlab<T> {
    slots: Vec<SlotEntry<T>>,
    free_list: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> Default for LinkedSlab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for LinkedSlab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

impl<T> LinkedSlab<T> {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Create an empty list with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Number of linked nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Key of the first node.
    #[inline]
    #[must_use]
    pub fn front(&self) -> Option<NodeKey> {
        self.head.map(|i| self.key_at(i))
    }

    /// Key of the last node.
    #[inline]
    #[must_use]
    pub fn back(&self) -> Option<NodeKey> {
        self.tail.map(|i| self.key_at(i))
    }

    /// Whether `key` names a live node.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.node(key).is_some()
    }

    #[must_use]
    pub fn get(&self, key: NodeKey) -> Option<&T> {
        self.node(key).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut T> {
        self.node_mut(key).map(|n| &mut n.value)
    }

    /// Key of the node after `key`, or `None` if `key` is last or stale.
    #[must_use]
    pub fn next(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key)?.next.map(|i| self.key_at(i))
    }

    /// Key of the node before `key`, or `None` if `key` is first or stale.
    #[must_use]
    pub fn prev(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key)?.prev.map(|i| self.key_at(i))
    }

    /// Neighbour of `key` in the given direction.
    #[must_use]
    pub fn step(&self, key: NodeKey, direction: Direction) -> Option<NodeKey> {
        match direction {
            Direction::Forward => self.next(key),
            Direction::Backward => self.prev(key),
        }
    }

    /// Append a node.
    pub fn push_back(&mut self, value: T) -> NodeKey {
        let index = self.alloc(Node {
            value,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.link_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.key_at(index)
    }

    /// Prepend a node.
    pub fn push_front(&mut self, value: T) -> NodeKey {
        let index = self.alloc(Node {
            value,
            prev: None,
            next: self.head,
        });
        match self.head {
            Some(head) => self.link_mut(head).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.key_at(index)
    }

    /// Insert a node immediately before `at`.
    ///
    /// # Panics
    ///
    /// Panics if `at` is stale.
    pub fn insert_before(&mut self, at: NodeKey, value: T) -> NodeKey {
        assert!(self.contains(at), "insert_before: stale key {at:?}");
        let at_index = at.index;
        let prev = self.link_mut(at_index).prev;
        let index = self.alloc(Node {
            value,
            prev,
            next: Some(at_index),
        });
        self.link_mut(at_index).prev = Some(index);
        match prev {
            Some(p) => self.link_mut(p).next = Some(index),
            None => self.head = Some(index),
        }
        self.key_at(index)
    }

    /// Insert a node immediately after `at`.
    ///
    /// # Panics
    ///
    /// Panics if `at` is stale.
    pub fn insert_after(&mut self, at: NodeKey, value: T) -> NodeKey {
        assert!(self.contains(at), "insert_after: stale key {at:?}");
        let at_index = at.index;
        let next = self.link_mut(at_index).next;
        let index = self.alloc(Node {
            value,
            prev: Some(at_index),
            next,
        });
        self.link_mut(at_index).next = Some(index);
        match next {
            Some(n) => self.link_mut(n).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.key_at(index)
    }

    /// Insert a node at a signed position.
    ///
    /// For `index >= 0`, walk forward `index` steps from the front and insert
    /// before the node reached; append if the walk runs off the back.
    /// For `index < 0`, walk backward `-index - 1` steps from the back and
    /// insert after the node reached; prepend if the walk runs off the front.
    /// `-1` therefore always appends and `0` always prepends.
    pub fn insert_at(&mut self, index: isize, value: T) -> NodeKey {
        if index >= 0 {
            match self.walk(self.front(), Direction::Forward, index.unsigned_abs()) {
                Some(at) => self.insert_before(at, value),
                None => self.push_back(value),
            }
        } else {
            match self.walk(self.back(), Direction::Backward, index.unsigned_abs() - 1) {
                Some(at) => self.insert_after(at, value),
                None => self.push_front(value),
            }
        }
    }

    /// Resolve a signed start position for a directional scan.
    ///
    /// Non-negative positions walk forward from the front and scan forward;
    /// negative positions walk backward from the back (`-1` = last node) and
    /// scan backward. Returns `None` when the walk runs off the list.
    #[must_use]
    pub fn locate(&self, position: isize) -> Option<(NodeKey, Direction)> {
        if position >= 0 {
            self.walk(self.front(), Direction::Forward, position.unsigned_abs())
                .map(|key| (key, Direction::Forward))
        } else {
            self.walk(self.back(), Direction::Backward, position.unsigned_abs() - 1)
                .map(|key| (key, Direction::Backward))
        }
    }

    /// Unlink and return the node named by `key`.
    pub fn remove(&mut self, key: NodeKey) -> Option<T> {
        self.node(key)?;
        let slot = &mut self.slots[key.index()];
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        match node.prev {
            Some(p) => self.link_mut(p).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.link_mut(n).prev = node.prev,
            None => self.tail = node.prev,
        }

        self.free_list.push(key.index);
        self.len -= 1;
        Some(node.value)
    }

    /// Remove every node, returning the values front to back.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(key) = self.front() {
            if let Some(value) = self.remove(key) {
                out.push(value);
            }
        }
        out
    }

    /// Keys front to back. Reverse with `.rev()`.
    pub fn keys(&self) -> Keys<'_, T> {
        Keys {
            list: self,
            front: self.head,
            back: self.tail,
            remaining: self.len,
        }
    }

    /// Values front to back.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.keys().filter_map(move |key| self.get(key))
    }

    /// Keys starting at `start` and moving in `direction`, `start` included.
    pub fn keys_from(
        &self,
        start: Option<NodeKey>,
        direction: Direction,
    ) -> impl Iterator<Item = NodeKey> + '_ {
        std::iter::successors(start.filter(|k| self.contains(*k)), move |key| {
            self.step(*key, direction)
        })
    }

    fn walk(&self, start: Option<NodeKey>, direction: Direction, steps: usize) -> Option<NodeKey> {
        let mut cursor = start?;
        for _ in 0..steps {
            cursor = self.step(cursor, direction)?;
        }
        Some(cursor)
    }

    fn alloc(&mut self, node: Node<T>) -> u32 {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none(), "free list holds an occupied slot");
            slot.node = Some(node);
            index
        } else {
            let index = self.slots.len();
            assert!(index < u32::MAX as usize, "linked slab capacity exceeded");
            let index = index as u32;
            self.slots.push(SlotEntry {
                generation: 0,
                node: Some(node),
            });
            index
        }
    }

    #[inline]
    fn key_at(&self, index: u32) -> NodeKey {
        NodeKey {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    #[inline]
    fn node(&self, key: NodeKey) -> Option<&Node<T>> {
        let slot = self.slots.get(key.index())?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_ref()
    }

    #[inline]
    fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node<T>> {
        let slot = self.slots.get_mut(key.index())?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_mut()
    }

    // Links are only followed between live nodes.
    #[inline]
    fn link_mut(&mut self, index: u32) -> &mut Node<T> {
        self.slots[index as usize]
            .node
            .as_mut()
            .expect("linked slab: dangling link")
    }
}

/// Iterator over the keys of a [`LinkedSlab`].
pub struct Keys<'a, T> {
    list: &'a LinkedSlab<T>,
    front: Option<u32>,
    back: Option<u32>,
    remaining: usize,
}

impl<T> Iterator for Keys<'_, T> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front?;
        self.remaining -= 1;
        let node = self.list.slots[index as usize].node.as_ref()?;
        self.front = node.next;
        Some(self.list.key_at(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Keys<'_, T> {
    fn next_back(&mut self) -> Option<NodeKey> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back?;
        self.remaining -= 1;
        let node = self.list.slots[index as usize].node.as_ref()?;
        self.back = node.prev;
        Some(self.list.key_at(index))
    }
}

impl<T> ExactSizeIterator for Keys<'_, T> {}
