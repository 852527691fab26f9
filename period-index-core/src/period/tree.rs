use std::collections::HashMap;
use std::hash::Hash;

use super::collection::PeriodError;
use super::time::{Instant, MaxEnd, Period};

/// Visit order for [`PeriodTree::depth_first_traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
  PreOrder,
  InOrder,
  PostOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
  Red,
  Black,
}

/// Index of a node slot in the arena. The reserved value [`NodeId::NIL`]
/// is the leaf sentinel: it reads as a black node and contributes nothing
/// to the subtree `max_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(usize);

impl NodeId {
  const NIL: NodeId = NodeId(usize::MAX);

  fn is_nil(self) -> bool {
    self == NodeId::NIL
  }

  fn index(self) -> usize {
    self.0
  }
}

/// One element of the tree: the entry (key, payload, period) plus the
/// red-black structure and the per-subtree `max_end` augmentation.
#[derive(Debug)]
struct Node<K, P> {
  key: K,
  payload: P,
  period: Period,
  colour: Colour,
  parent: NodeId,
  left: NodeId,
  right: NodeId,
  max_end: MaxEnd,
}

/// An augmented red-black interval tree keyed by period start.
///
/// `PeriodTree` is the single-threaded core: it stores (key, payload,
/// period) entries in an arena of slots addressed by integer ids, keeps a
/// `key -> slot` index for O(1) lookup by identifier, and maintains the
/// per-subtree maximum period end through every structural mutation so
/// that overlap queries can prune whole subtrees.
///
/// Entries are ordered by period start; entries with equal starts go to
/// the right. An unbounded period end propagates [`MaxEnd::Unbounded`]
/// through the augmentation and defeats pruning on that subtree.
///
/// For a thread-safe wrapper with batch mutation see
/// [`PeriodCollection`](super::collection::PeriodCollection).
#[derive(Debug)]
pub struct PeriodTree<K, P> {
  slots: Vec<Option<Node<K, P>>>,
  free: Vec<NodeId>,
  root: NodeId,
  key_index: HashMap<K, NodeId>,
}

impl<K: Eq + Hash + Clone, P> Default for PeriodTree<K, P> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Eq + Hash + Clone, P> PeriodTree<K, P> {
  /// Create an empty tree.
  pub fn new() -> Self {
    PeriodTree {
      slots: Vec::new(),
      free: Vec::new(),
      root: NodeId::NIL,
      key_index: HashMap::new(),
    }
  }

  /// Number of entries in the tree.
  pub fn len(&self) -> usize {
    self.key_index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.key_index.is_empty()
  }

  /// Returns true if `key` is present.
  pub fn contains_key(&self, key: &K) -> bool {
    self.key_index.contains_key(key)
  }

  /// Look up the payload stored under `key`.
  ///
  /// # Errors
  /// Returns `UnknownKey` when the key is not present.
  pub fn contents_of_key(&self, key: &K) -> Result<&P, PeriodError> {
    match self.key_index.get(key) {
      Some(&id) => Ok(&self.node(id).payload),
      None => Err(PeriodError::UnknownKey),
    }
  }

  // ---------- slot management ----------

  fn node(&self, id: NodeId) -> &Node<K, P> {
    self.slots[id.index()]
      .as_ref()
      .expect("internal invariant: node id refers to a freed slot")
  }

  fn node_mut(&mut self, id: NodeId) -> &mut Node<K, P> {
    self.slots[id.index()]
      .as_mut()
      .expect("internal invariant: node id refers to a freed slot")
  }

  fn alloc(&mut self, node: Node<K, P>) -> NodeId {
    match self.free.pop() {
      Some(id) => {
        self.slots[id.index()] = Some(node);
        id
      }
      None => {
        self.slots.push(Some(node));
        NodeId(self.slots.len() - 1)
      }
    }
  }

  fn release(&mut self, id: NodeId) -> Node<K, P> {
    let node = self.slots[id.index()]
      .take()
      .expect("internal invariant: releasing a slot that is already free");
    self.free.push(id);
    node
  }

  // ---------- structural helpers ----------

  /// Colour of a slot; the leaf sentinel reads as black so red-red
  /// detection treats leaves uniformly.
  fn colour_of(&self, id: NodeId) -> Colour {
    if id.is_nil() {
      Colour::Black
    } else {
      self.node(id).colour
    }
  }

  fn is_left_child(&self, id: NodeId) -> bool {
    let parent = self.node(id).parent;
    !parent.is_nil() && self.node(parent).left == id
  }

  fn sibling(&self, id: NodeId) -> NodeId {
    let parent = self.node(id).parent;
    if parent.is_nil() {
      return NodeId::NIL;
    }
    if self.node(parent).left == id {
      self.node(parent).right
    } else {
      self.node(parent).left
    }
  }

  fn minimum(&self, mut id: NodeId) -> NodeId {
    while !self.node(id).left.is_nil() {
      id = self.node(id).left;
    }
    id
  }

  /// In-order successor: leftmost node of the right subtree when there is
  /// one, otherwise the nearest ancestor whose left subtree holds `id`.
  fn successor(&self, id: NodeId) -> NodeId {
    let right = self.node(id).right;
    if !right.is_nil() {
      return self.minimum(right);
    }
    let mut current = id;
    let mut parent = self.node(id).parent;
    while !parent.is_nil() && self.node(parent).right == current {
      current = parent;
      parent = self.node(parent).parent;
    }
    parent
  }

  /// True iff `period` belongs in the left subtree of `id`. Equal starts
  /// go right.
  fn period_to_left(&self, id: NodeId, period: &Period) -> bool {
    period.starts_before(&self.node(id).period)
  }

  /// Recompute a node's `max_end` from its own period end and its
  /// children. An unbounded end anywhere makes the whole subtree
  /// unbounded; absent leaves contribute nothing.
  fn recompute_max_end(&self, id: NodeId) -> MaxEnd {
    let n = self.node(id);
    let mut max = MaxEnd::from(n.period.end);
    if !n.left.is_nil() {
      max = max.max(self.node(n.left).max_end);
    }
    if !n.right.is_nil() {
      max = max.max(self.node(n.right).max_end);
    }
    max
  }

  /// Recompute `max_end` for `id` and every ancestor up to the root.
  fn update_max_end_upward(&mut self, mut id: NodeId) {
    while !id.is_nil() {
      let max = self.recompute_max_end(id);
      self.node_mut(id).max_end = max;
      id = self.node(id).parent;
    }
  }

  // ---------- rotations ----------

  fn rotate_left(&mut self, x: NodeId) {
    let y = self.node(x).right;
    debug_assert!(!y.is_nil(), "rotate_left without a right child");

    let y_left = self.node(y).left;
    self.node_mut(x).right = y_left;
    if !y_left.is_nil() {
      self.node_mut(y_left).parent = x;
    }

    let x_parent = self.node(x).parent;
    self.node_mut(y).parent = x_parent;
    if x_parent.is_nil() {
      self.root = y;
    } else if self.node(x_parent).left == x {
      self.node_mut(x_parent).left = y;
    } else {
      self.node_mut(x_parent).right = y;
    }

    self.node_mut(y).left = x;
    self.node_mut(x).parent = y;

    // The demoted node first: the new parent's recomputation reads it.
    let max_x = self.recompute_max_end(x);
    self.node_mut(x).max_end = max_x;
    let max_y = self.recompute_max_end(y);
    self.node_mut(y).max_end = max_y;
  }

  fn rotate_right(&mut self, x: NodeId) {
    let y = self.node(x).left;
    debug_assert!(!y.is_nil(), "rotate_right without a left child");

    let y_right = self.node(y).right;
    self.node_mut(x).left = y_right;
    if !y_right.is_nil() {
      self.node_mut(y_right).parent = x;
    }

    let x_parent = self.node(x).parent;
    self.node_mut(y).parent = x_parent;
    if x_parent.is_nil() {
      self.root = y;
    } else if self.node(x_parent).left == x {
      self.node_mut(x_parent).left = y;
    } else {
      self.node_mut(x_parent).right = y;
    }

    self.node_mut(y).right = x;
    self.node_mut(x).parent = y;

    let max_x = self.recompute_max_end(x);
    self.node_mut(x).max_end = max_x;
    let max_y = self.recompute_max_end(y);
    self.node_mut(y).max_end = max_y;
  }

  // ---------- insertion ----------

  /// Insert a new entry.
  ///
  /// # Errors
  /// Returns `DuplicateKey` when `key` is already present; the tree is
  /// left untouched in that case.
  pub fn insert(&mut self, key: K, period: Period, payload: P) -> Result<(), PeriodError> {
    if self.key_index.contains_key(&key) {
      return Err(PeriodError::DuplicateKey);
    }
    self.insert_unchecked(key, period, payload);
    Ok(())
  }

  /// Insertion after the duplicate check. Descends from the root folding
  /// the new end into every visited node's `max_end` (an unbounded end
  /// propagates `Unbounded` along the whole path), links the new node red
  /// and restores the red-black properties.
  fn insert_unchecked(&mut self, key: K, period: Period, payload: P) {
    let end = MaxEnd::from(period.end);

    let mut parent = NodeId::NIL;
    let mut current = self.root;
    while !current.is_nil() {
      let max = self.node(current).max_end.max(end);
      self.node_mut(current).max_end = max;
      parent = current;
      current = if self.period_to_left(current, &period) {
        self.node(current).left
      } else {
        self.node(current).right
      };
    }

    let id = self.alloc(Node {
      key: key.clone(),
      payload,
      period,
      colour: Colour::Red,
      parent,
      left: NodeId::NIL,
      right: NodeId::NIL,
      max_end: end,
    });
    self.key_index.insert(key, id);

    if parent.is_nil() {
      self.root = id;
    } else if self.period_to_left(parent, &period) {
      self.node_mut(parent).left = id;
    } else {
      self.node_mut(parent).right = id;
    }

    self.insert_fixup(id);
  }

  fn insert_fixup(&mut self, mut z: NodeId) {
    while self.colour_of(self.node(z).parent) == Colour::Red {
      let parent = self.node(z).parent;
      // A red parent is never the root, so the grandparent is real.
      let grandparent = self.node(parent).parent;
      let uncle = self.sibling(parent);

      if self.colour_of(uncle) == Colour::Red {
        self.node_mut(parent).colour = Colour::Black;
        self.node_mut(uncle).colour = Colour::Black;
        self.node_mut(grandparent).colour = Colour::Red;
        z = grandparent;
      } else if self.is_left_child(parent) {
        if !self.is_left_child(z) {
          // inside grandchild: rotate it to the outside first
          z = parent;
          self.rotate_left(z);
        }
        let parent = self.node(z).parent;
        let grandparent = self.node(parent).parent;
        self.node_mut(parent).colour = Colour::Black;
        self.node_mut(grandparent).colour = Colour::Red;
        self.rotate_right(grandparent);
      } else {
        if self.is_left_child(z) {
          z = parent;
          self.rotate_right(z);
        }
        let parent = self.node(z).parent;
        let grandparent = self.node(parent).parent;
        self.node_mut(parent).colour = Colour::Black;
        self.node_mut(grandparent).colour = Colour::Red;
        self.rotate_left(grandparent);
      }
    }
    let root = self.root;
    self.node_mut(root).colour = Colour::Black;
  }

  // ---------- deletion ----------

  /// Remove the entry stored under `key`, returning its payload.
  ///
  /// Removing an absent key is a no-op and returns `None`.
  pub fn delete(&mut self, key: &K) -> Option<P> {
    let id = self.key_index.get(key).copied()?;
    Some(self.remove_node(id))
  }

  /// Physically remove a node. When the node has two children the
  /// in-order successor's entry is moved into its slot (the key index is
  /// re-pointed accordingly) and the successor's slot is the one spliced
  /// out of the tree.
  fn remove_node(&mut self, n: NodeId) -> P {
    let two_children = !self.node(n).left.is_nil() && !self.node(n).right.is_nil();
    let y = if two_children { self.successor(n) } else { n };

    if y != n {
      self.swap_entries(n, y);
      let moved_key = self.node(n).key.clone();
      self.key_index.insert(moved_key, n);
    }

    // y has at most one real child; splice that child into y's place
    let y_colour = self.node(y).colour;
    let y_left = self.node(y).left;
    let child = if !y_left.is_nil() {
      y_left
    } else {
      self.node(y).right
    };
    let y_parent = self.node(y).parent;
    self.transplant(y, child);

    // The splice changed subtree contents from the splice point to the
    // root; this pass also refreshes `n`, whose period was rewritten by
    // the entry move above.
    self.update_max_end_upward(y_parent);

    if y_colour == Colour::Black {
      self.delete_fixup(child, y_parent);
    }

    let node = self.release(y);
    self.key_index.remove(&node.key);
    node.payload
  }

  /// Swap the entry fields (key, payload, period) of two slots, leaving
  /// the structural fields in place.
  fn swap_entries(&mut self, a: NodeId, b: NodeId) {
    let mut taken = self.slots[a.index()]
      .take()
      .expect("internal invariant: swapping a freed slot");
    {
      let other = self.slots[b.index()]
        .as_mut()
        .expect("internal invariant: swapping a freed slot");
      std::mem::swap(&mut taken.key, &mut other.key);
      std::mem::swap(&mut taken.payload, &mut other.payload);
      std::mem::swap(&mut taken.period, &mut other.period);
    }
    self.slots[a.index()] = Some(taken);
  }

  /// Replace the subtree rooted at `u` with the subtree rooted at `v`
  /// (which may be the leaf sentinel).
  fn transplant(&mut self, u: NodeId, v: NodeId) {
    let parent = self.node(u).parent;
    if parent.is_nil() {
      self.root = v;
    } else if self.node(parent).left == u {
      self.node_mut(parent).left = v;
    } else {
      self.node_mut(parent).right = v;
    }
    if !v.is_nil() {
      self.node_mut(v).parent = parent;
    }
  }

  /// Restore the equal-black-height property after removing a black node.
  ///
  /// `x` is the spliced-in child carrying the extra black and may be the
  /// leaf sentinel, so its parent is tracked explicitly.
  fn delete_fixup(&mut self, mut x: NodeId, mut parent: NodeId) {
    while x != self.root && self.colour_of(x) == Colour::Black {
      let x_is_left = self.node(parent).left == x;
      let mut s = if x_is_left {
        self.node(parent).right
      } else {
        self.node(parent).left
      };

      // Case 1: red sibling. Rotate it above the parent; the new sibling
      // is black.
      if self.colour_of(s) == Colour::Red {
        self.node_mut(s).colour = Colour::Black;
        self.node_mut(parent).colour = Colour::Red;
        if x_is_left {
          self.rotate_left(parent);
          s = self.node(parent).right;
        } else {
          self.rotate_right(parent);
          s = self.node(parent).left;
        }
      }

      // Case 2: sibling is a leaf, or black with two black children.
      // Push the extra black up to the parent.
      let sibling_absorbs = s.is_nil()
        || (self.colour_of(self.node(s).left) == Colour::Black
          && self.colour_of(self.node(s).right) == Colour::Black);
      if sibling_absorbs {
        if !s.is_nil() {
          self.node_mut(s).colour = Colour::Red;
        }
        x = parent;
        parent = self.node(x).parent;
        continue;
      }

      if x_is_left {
        // Case 3: outside child black, inside child red. Rotate the red
        // child above the sibling to reduce to case 4.
        if self.colour_of(self.node(s).right) == Colour::Black {
          let inside = self.node(s).left;
          self.node_mut(inside).colour = Colour::Black;
          self.node_mut(s).colour = Colour::Red;
          self.rotate_right(s);
          s = self.node(parent).right;
        }
        // Case 4: outside child red. Terminal rotation.
        let parent_colour = self.node(parent).colour;
        self.node_mut(s).colour = parent_colour;
        self.node_mut(parent).colour = Colour::Black;
        let outside = self.node(s).right;
        self.node_mut(outside).colour = Colour::Black;
        self.rotate_left(parent);
      } else {
        if self.colour_of(self.node(s).left) == Colour::Black {
          let inside = self.node(s).right;
          self.node_mut(inside).colour = Colour::Black;
          self.node_mut(s).colour = Colour::Red;
          self.rotate_left(s);
          s = self.node(parent).left;
        }
        let parent_colour = self.node(parent).colour;
        self.node_mut(s).colour = parent_colour;
        self.node_mut(parent).colour = Colour::Black;
        let outside = self.node(s).left;
        self.node_mut(outside).colour = Colour::Black;
        self.rotate_right(parent);
      }
      x = self.root;
    }

    if !x.is_nil() {
      self.node_mut(x).colour = Colour::Black;
    }
  }

  // ---------- update ----------

  /// Insert or replace the entry stored under `key`.
  ///
  /// An absent key inserts. A present key with an unchanged period swaps
  /// the payload in place; a changed period deletes and re-inserts so the
  /// entry moves to its new position.
  pub fn update(&mut self, key: K, period: Period, payload: P) {
    match self.key_index.get(&key).copied() {
      None => self.insert_unchecked(key, period, payload),
      Some(id) => {
        if self.node(id).period == period {
          self.node_mut(id).payload = payload;
        } else {
          self.remove_node(id);
          self.insert_unchecked(key, period, payload);
        }
      }
    }
  }

  // ---------- queries ----------

  /// Returns true if any stored period contains `t`.
  ///
  /// Single descent: a node's left subtree is taken only while its
  /// `max_end` proves it can still contain a period open at `t`.
  pub fn any_contains_time(&self, t: Instant) -> bool {
    let mut current = self.root;
    while !current.is_nil() {
      let n = self.node(current);
      if n.period.contains_time(t) {
        return true;
      }
      let left = n.left;
      current = if !left.is_nil() && self.node(left).max_end.exceeds(t) {
        left
      } else {
        n.right
      };
    }
    false
  }

  /// All payloads whose period contains `t`, ordered by period start
  /// ascending.
  pub fn contains_time(&self, t: Instant) -> Vec<P>
  where
    P: Clone,
  {
    let mut out = Vec::new();
    self.collect_contains_time(self.root, t, &mut out);
    out
  }

  fn collect_contains_time(&self, id: NodeId, t: Instant, out: &mut Vec<P>)
  where
    P: Clone,
  {
    if id.is_nil() || !self.node(id).max_end.exceeds(t) {
      return;
    }
    let n = self.node(id);
    self.collect_contains_time(n.left, t, out);
    if n.period.contains_time(t) {
      out.push(n.payload.clone());
    }
    self.collect_contains_time(n.right, t, out);
  }

  /// All payloads whose period intersects `query`, ordered by period
  /// start ascending.
  pub fn intersecting(&self, query: &Period) -> Vec<P>
  where
    P: Clone,
  {
    let mut out = Vec::new();
    self.collect_intersecting(self.root, query, &mut out);
    out
  }

  /// A subtree can hold an intersecting period only if some end in it
  /// lies strictly after the query start. A query with no start admits
  /// every subtree.
  fn subtree_admits(&self, id: NodeId, query: &Period) -> bool {
    match query.start {
      Some(start) => self.node(id).max_end.exceeds(start),
      None => true,
    }
  }

  fn collect_intersecting(&self, id: NodeId, query: &Period, out: &mut Vec<P>)
  where
    P: Clone,
  {
    if id.is_nil() {
      return;
    }
    let n = self.node(id);
    // No early termination on n.start >= query.end: the right subtree
    // may still hold in-order successors that reach back into the query.
    if !n.left.is_nil() && self.subtree_admits(n.left, query) {
      self.collect_intersecting(n.left, query, out);
    }
    if n.period.intersects(query) {
      out.push(n.payload.clone());
    }
    if !n.right.is_nil() && self.subtree_admits(n.right, query) {
      self.collect_intersecting(n.right, query, out);
    }
  }

  /// Returns true if any stored period intersects `query`. Same pruning
  /// as [`PeriodTree::intersecting`], stopping at the first hit; the node
  /// is tested before its right subtree.
  pub fn any_intersecting(&self, query: &Period) -> bool {
    self.probe_intersecting(self.root, query)
  }

  fn probe_intersecting(&self, id: NodeId, query: &Period) -> bool {
    if id.is_nil() {
      return false;
    }
    let n = self.node(id);
    if !n.left.is_nil() && self.subtree_admits(n.left, query) && self.probe_intersecting(n.left, query) {
      return true;
    }
    if n.period.intersects(query) {
      return true;
    }
    !n.right.is_nil() && self.subtree_admits(n.right, query) && self.probe_intersecting(n.right, query)
  }

  /// All payloads in the requested depth-first order.
  pub fn depth_first_traverse(&self, order: TraversalOrder) -> Vec<P>
  where
    P: Clone,
  {
    let mut out = Vec::with_capacity(self.len());
    self.traverse_node(self.root, order, &mut out);
    out
  }

  fn traverse_node(&self, id: NodeId, order: TraversalOrder, out: &mut Vec<P>)
  where
    P: Clone,
  {
    if id.is_nil() {
      return;
    }
    let n = self.node(id);
    match order {
      TraversalOrder::PreOrder => {
        out.push(n.payload.clone());
        self.traverse_node(n.left, order, out);
        self.traverse_node(n.right, order, out);
      }
      TraversalOrder::InOrder => {
        self.traverse_node(n.left, order, out);
        out.push(n.payload.clone());
        self.traverse_node(n.right, order, out);
      }
      TraversalOrder::PostOrder => {
        self.traverse_node(n.left, order, out);
        self.traverse_node(n.right, order, out);
        out.push(n.payload.clone());
      }
    }
  }

  /// Keys currently present, in no particular order. Used by conditional
  /// deletion to snapshot the key set before mutating.
  pub(crate) fn keys(&self) -> Vec<K> {
    self.key_index.keys().cloned().collect()
  }

  pub(crate) fn payload_of(&self, key: &K) -> Option<&P> {
    self
      .key_index
      .get(key)
      .map(|&id| &self.node(id).payload)
  }
}
