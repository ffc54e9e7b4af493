//! Point quadtree for range culling
//!
//! Items are stored by their last known position in the leaf whose bound
//! contains it. Leaves split into four equal quadrants once they exceed the
//! per-node capacity, as long as they are still wider than the minimum node
//! size. Branches never merge back: the index is sized for transient,
//! viewport-driven workloads and only grows.

use crate::constants::spatial::LEAF_INLINE;
use crate::util::rect::Rect;
use crate::util::vec2::Vec2;
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::hash::Hash;
use tracing::{debug, trace};

type LeafItems<T> = SmallVec<[(Vec2, T); LEAF_INLINE]>;

enum NodeKind<T> {
    Leaf(LeafItems<T>),
    Branch(Box<[Node<T>; 4]>),
}

struct Node<T> {
    bounds: Rect,
    depth: u32,
    kind: NodeKind<T>,
}

impl<T: Clone + PartialEq> Node<T> {
    fn leaf(bounds: Rect, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            kind: NodeKind::Leaf(SmallVec::new()),
        }
    }

    fn insert(&mut self, position: Vec2, item: T, max_items: usize, min_node_size: f32) {
        let should_split = match &mut self.kind {
            NodeKind::Branch(children) => {
                let quadrant = self.bounds.quadrant_of(position);
                children[quadrant].insert(position, item, max_items, min_node_size);
                false
            }
            NodeKind::Leaf(items) => {
                items.push((position, item));
                items.len() > max_items && self.bounds.width() > min_node_size
            }
        };

        if should_split {
            self.split(max_items, min_node_size);
        }
    }

    fn split(&mut self, max_items: usize, min_node_size: f32) {
        let depth = self.depth + 1;
        let mut children = Box::new(self.bounds.quadrants().map(|b| Node::leaf(b, depth)));

        let previous = std::mem::replace(&mut self.kind, NodeKind::Leaf(SmallVec::new()));
        if let NodeKind::Leaf(items) = previous {
            trace!("Splitting node at depth {} ({} items)", self.depth, items.len());
            for (position, item) in items {
                let quadrant = self.bounds.quadrant_of(position);
                children[quadrant].insert(position, item, max_items, min_node_size);
            }
        }
        self.kind = NodeKind::Branch(children);
    }

    fn remove(&mut self, position: Vec2, item: &T) -> bool {
        match &mut self.kind {
            NodeKind::Branch(children) => {
                let quadrant = self.bounds.quadrant_of(position);
                children[quadrant].remove(position, item)
            }
            NodeKind::Leaf(items) => match items.iter().position(|(_, stored)| stored == item) {
                Some(index) => {
                    items.swap_remove(index);
                    true
                }
                None => false,
            },
        }
    }

    fn query<F: FnMut(&T)>(&self, range: &Rect, visit: &mut F) {
        if !self.bounds.intersects(range) {
            return;
        }
        match &self.kind {
            NodeKind::Leaf(items) => {
                for (position, item) in items {
                    if range.contains(*position) {
                        visit(item);
                    }
                }
            }
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.query(range, visit);
                }
            }
        }
    }

    fn collect_stats(&self, stats: &mut QuadTreeStats) {
        stats.node_count += 1;
        stats.max_depth = stats.max_depth.max(self.depth);
        match &self.kind {
            NodeKind::Leaf(items) => {
                stats.leaf_count += 1;
                stats.max_items_per_leaf = stats.max_items_per_leaf.max(items.len());
            }
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.collect_stats(stats);
                }
            }
        }
    }
}

/// Shape of a quadtree at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadTreeStats {
    pub item_count: usize,
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_depth: u32,
    pub max_items_per_leaf: usize,
}

/// Dynamic point index keyed by item identity
pub struct QuadTree<T> {
    root: Node<T>,
    positions: HashMap<T, Vec2>,
    max_items_per_node: usize,
    min_node_size: f32,
}

impl<T: Clone + Eq + Hash> QuadTree<T> {
    pub fn new(bounds: Rect, max_items_per_node: usize, min_node_size: f32) -> Self {
        Self {
            root: Node::leaf(bounds, 0),
            positions: HashMap::new(),
            max_items_per_node: max_items_per_node.max(1),
            min_node_size,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.root.bounds
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    /// Last position recorded for `item`
    pub fn position_of(&self, item: &T) -> Option<Vec2> {
        self.positions.get(item).copied()
    }

    /// Insert `item` at `position`.
    ///
    /// Positions outside the root bound are dropped and `false` is returned;
    /// nothing is recorded for them. Inserting an item that is already present
    /// moves it.
    pub fn insert(&mut self, position: Vec2, item: T) -> bool {
        if !self.root.bounds.contains(position) {
            debug!(
                "Dropping quadtree insert outside bounds at ({:.2}, {:.2})",
                position.x, position.y
            );
            return false;
        }

        if let Some(previous) = self.positions.remove(&item) {
            self.root.remove(previous, &item);
        }

        self.root
            .insert(position, item.clone(), self.max_items_per_node, self.min_node_size);
        self.positions.insert(item, position);
        true
    }

    /// Remove `item` using its last recorded position
    pub fn remove(&mut self, item: &T) -> bool {
        match self.positions.remove(item) {
            Some(position) => self.root.remove(position, item),
            None => false,
        }
    }

    /// Move `item` to `position` (remove followed by insert).
    ///
    /// An item moved outside the root bound is removed and not re-added.
    pub fn update(&mut self, position: Vec2, item: T) -> bool {
        self.remove(&item);
        self.insert(position, item)
    }

    /// Every item whose stored position lies inside `range`
    pub fn query_range(&self, range: &Rect) -> Vec<T> {
        let mut found = Vec::new();
        self.query_range_with(range, |item| found.push(item.clone()));
        found
    }

    /// Visit every item whose stored position lies inside `range` without allocating
    pub fn query_range_with<F: FnMut(&T)>(&self, range: &Rect, mut visit: F) {
        self.root.query(range, &mut visit);
    }

    /// Drop every item and collapse back to a single leaf
    pub fn clear(&mut self) {
        self.root = Node::leaf(self.root.bounds, 0);
        self.positions.clear();
    }

    pub fn stats(&self) -> QuadTreeStats {
        let mut stats = QuadTreeStats {
            item_count: self.positions.len(),
            ..Default::default()
        };
        self.root.collect_stats(&mut stats);
        stats
    }
}
