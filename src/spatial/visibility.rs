//! Per-layer viewport culling
//!
//! Each named layer owns its own quadtree and the set of items currently
//! inside the margin-expanded viewport. A recompute diffs the new query
//! result against that set and notifies items that left (first) and
//! entered (second). Items inserted or moved between recomputes are checked
//! one at a time against the last viewport, so the camera guard stays valid.

use crate::constants::visibility::{
    MARGIN, MAX_ITEMS_PER_NODE, MIN_NODE_SIZE, RECT_EPSILON, UPDATE_THRESHOLD,
};
use crate::spatial::quadtree::{QuadTree, QuadTreeStats};
use crate::spatial::viewport::{visible_bounds, ViewportCamera};
use crate::util::rect::Rect;
use crate::util::vec2::Vec2;
use hashbrown::{HashMap, HashSet};
use std::hash::Hash;
use tracing::debug;

/// Capability every tracked item must provide.
///
/// Implementations may only toggle their own presentation; they have no way
/// to reach the tracker that is mid-diff.
pub trait VisibilityObject {
    fn on_visibility_changed(&self, visible: bool);
}

/// Tunables for the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilitySettings {
    pub max_items_per_node: usize,
    pub min_node_size: f32,
    /// Camera travel required before a recompute runs
    pub update_threshold: f32,
    /// Margin added to the viewport on every side
    pub margin: f32,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            max_items_per_node: MAX_ITEMS_PER_NODE,
            min_node_size: MIN_NODE_SIZE,
            update_threshold: UPDATE_THRESHOLD,
            margin: MARGIN,
        }
    }
}

/// Enter/exit counts produced by one recompute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityDelta {
    pub entered: usize,
    pub exited: usize,
}

/// Per-layer snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub visible: usize,
    pub total: usize,
    pub tree: QuadTreeStats,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    pub recomputes: u64,
    pub skipped: u64,
    pub entered: u64,
    pub exited: u64,
}

struct LayerIndex<T> {
    tree: QuadTree<T>,
    visible: HashSet<T>,
    total: usize,
}

pub struct VisibilityTracker<T> {
    settings: VisibilitySettings,
    layers: HashMap<String, LayerIndex<T>>,
    last_camera: Option<Vec2>,
    last_rect: Option<Rect>,
    stats: VisibilityStats,
}

impl<T: VisibilityObject + Clone + Eq + Hash> VisibilityTracker<T> {
    pub fn new(settings: VisibilitySettings) -> Self {
        Self {
            settings,
            layers: HashMap::new(),
            last_camera: None,
            last_rect: None,
            stats: VisibilityStats::default(),
        }
    }

    pub fn settings(&self) -> &VisibilitySettings {
        &self.settings
    }

    /// (Re)create `layer` with an empty tree covering `world_bounds`
    pub fn reset_layer(&mut self, layer: &str, world_bounds: Rect) {
        let index = LayerIndex {
            tree: QuadTree::new(
                world_bounds,
                self.settings.max_items_per_node,
                self.settings.min_node_size,
            ),
            visible: HashSet::new(),
            total: 0,
        };
        self.layers.insert(layer.to_string(), index);
        self.invalidate();
    }

    /// Tear down `layer`, hiding everything it still shows
    pub fn remove_layer(&mut self, layer: &str) -> bool {
        match self.layers.remove(layer) {
            Some(index) => {
                for item in &index.visible {
                    item.on_visibility_changed(false);
                }
                self.stats.exited += index.visible.len() as u64;
                true
            }
            None => false,
        }
    }

    /// Tear down every layer
    pub fn dispose(&mut self) {
        let names: Vec<String> = self.layers.keys().cloned().collect();
        for name in names {
            self.remove_layer(&name);
        }
        self.last_camera = None;
        self.last_rect = None;
    }

    pub fn has_layer(&self, layer: &str) -> bool {
        self.layers.contains_key(layer)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Index `item` on `layer`, showing it at once if it lands inside the last viewport.
    /// Unknown layers and out-of-bounds positions are no-ops.
    pub fn insert(&mut self, layer: &str, position: Vec2, item: T) -> bool {
        let Some(index) = self.layers.get_mut(layer) else {
            return false;
        };
        let inserted = index.tree.insert(position, item.clone());
        index.total = index.tree.len();
        let inside = inserted && self.last_rect.is_some_and(|rect| rect.contains(position));
        Self::reconcile(index, &mut self.stats, item, inside);
        inserted
    }

    /// Drop `item` from `layer`, firing an exit if it was visible
    pub fn remove(&mut self, layer: &str, item: &T) -> bool {
        let Some(index) = self.layers.get_mut(layer) else {
            return false;
        };
        let removed = index.tree.remove(item);
        index.total = index.tree.len();
        if index.visible.remove(item) {
            item.on_visibility_changed(false);
            self.stats.exited += 1;
        }
        removed
    }

    /// Move `item` within `layer`, firing its enter or exit if it crossed the last viewport.
    ///
    /// Before the first recompute there is no viewport and nothing fires.
    pub fn update_position(&mut self, layer: &str, position: Vec2, item: T) -> bool {
        let Some(index) = self.layers.get_mut(layer) else {
            return false;
        };
        let updated = index.tree.update(position, item.clone());
        index.total = index.tree.len();
        let inside = updated && self.last_rect.is_some_and(|rect| rect.contains(position));
        Self::reconcile(index, &mut self.stats, item, inside);
        updated
    }

    /// Bring one item's visible flag in line with `inside`
    fn reconcile(index: &mut LayerIndex<T>, stats: &mut VisibilityStats, item: T, inside: bool) {
        if inside {
            if !index.visible.contains(&item) {
                item.on_visibility_changed(true);
                stats.entered += 1;
                index.visible.insert(item);
            }
        } else if index.visible.remove(&item) {
            item.on_visibility_changed(false);
            stats.exited += 1;
        }
    }

    /// Forget the last camera state so the next recompute always runs
    pub fn invalidate(&mut self) {
        self.last_camera = None;
        self.last_rect = None;
    }

    /// Recompute against a viewport rectangle supplied by the presentation layer.
    ///
    /// The rectangle centre stands in for the camera position.
    pub fn recompute_visibility(&mut self, viewport: Rect) -> Option<VisibilityDelta> {
        let expanded = viewport.expand(self.settings.margin);
        self.apply(viewport.center(), expanded)
    }

    /// Recompute against a camera, projecting its viewport corners
    pub fn update_visibility<C: ViewportCamera + ?Sized>(
        &mut self,
        camera: &C,
    ) -> Option<VisibilityDelta> {
        let bounds = visible_bounds(camera, self.settings.margin);
        self.apply(camera.position(), bounds)
    }

    fn apply(&mut self, camera: Vec2, bounds: Rect) -> Option<VisibilityDelta> {
        if let (Some(last_camera), Some(last_rect)) = (self.last_camera, self.last_rect) {
            let moved = camera.distance_to(last_camera);
            if moved < self.settings.update_threshold
                || bounds.approx_eq(&last_rect, RECT_EPSILON)
            {
                self.stats.skipped += 1;
                return None;
            }
        }

        self.last_camera = Some(camera);
        self.last_rect = Some(bounds);

        let mut delta = VisibilityDelta::default();
        for (name, index) in self.layers.iter_mut() {
            let mut now_visible = HashSet::with_capacity(index.visible.len());
            index
                .tree
                .query_range_with(&bounds, |item| {
                    now_visible.insert(item.clone());
                });

            for item in index.visible.difference(&now_visible) {
                item.on_visibility_changed(false);
                delta.exited += 1;
            }
            for item in now_visible.difference(&index.visible) {
                item.on_visibility_changed(true);
                delta.entered += 1;
            }

            index.visible = now_visible;
            debug!(
                "Layer '{}': {}/{} visible",
                name,
                index.visible.len(),
                index.total
            );
        }

        self.stats.recomputes += 1;
        self.stats.entered += delta.entered as u64;
        self.stats.exited += delta.exited as u64;
        Some(delta)
    }

    pub fn is_visible(&self, layer: &str, item: &T) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|index| index.visible.contains(item))
    }

    pub fn visible_count(&self, layer: &str) -> usize {
        self.layers.get(layer).map_or(0, |index| index.visible.len())
    }

    pub fn total_count(&self, layer: &str) -> usize {
        self.layers.get(layer).map_or(0, |index| index.total)
    }

    /// Items on `layer` inside `range`, regardless of visibility
    pub fn query(&self, layer: &str, range: &Rect) -> Vec<T> {
        self.layers
            .get(layer)
            .map(|index| index.tree.query_range(range))
            .unwrap_or_default()
    }

    pub fn layer_stats(&self, layer: &str) -> Option<LayerStats> {
        self.layers.get(layer).map(|index| LayerStats {
            visible: index.visible.len(),
            total: index.total,
            tree: index.tree.stats(),
        })
    }

    pub fn total_visible(&self) -> usize {
        self.layers.values().map(|index| index.visible.len()).sum()
    }

    pub fn stats(&self) -> VisibilityStats {
        self.stats
    }
}

impl<T: VisibilityObject + Clone + Eq + Hash> Default for VisibilityTracker<T> {
    fn default() -> Self {
        Self::new(VisibilitySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::viewport::OrthographicCamera;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(u32, bool)>>>;

    #[derive(Clone)]
    struct Marker {
        id: u32,
        log: Log,
    }

    impl PartialEq for Marker {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for Marker {}

    impl Hash for Marker {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl VisibilityObject for Marker {
        fn on_visibility_changed(&self, visible: bool) {
            self.log.borrow_mut().push((self.id, visible));
        }
    }

    fn settings() -> VisibilitySettings {
        VisibilitySettings {
            max_items_per_node: 2,
            min_node_size: 1.0,
            update_threshold: 0.5,
            margin: 0.0,
        }
    }

    fn world() -> Rect {
        Rect::from_center_half_extents(Vec2::ZERO, Vec2::new(100.0, 100.0))
    }

    fn tracker_with(points: &[(u32, Vec2)]) -> (VisibilityTracker<Marker>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut tracker = VisibilityTracker::new(settings());
        tracker.reset_layer("units", world());
        for (id, p) in points {
            tracker.insert("units", *p, Marker { id: *id, log: log.clone() });
        }
        (tracker, log)
    }

    fn drain(log: &Log) -> Vec<(u32, bool)> {
        let mut events = std::mem::take(&mut *log.borrow_mut());
        events.sort_unstable();
        events
    }

    fn points() -> Vec<(u32, Vec2)> {
        vec![
            (1, Vec2::new(1.0, 1.0)),
            (2, Vec2::new(5.0, 5.0)),
            (3, Vec2::new(12.0, 1.0)),
            (4, Vec2::new(15.0, 5.0)),
            (5, Vec2::new(-50.0, -50.0)),
        ]
    }

    #[test]
    fn test_first_recompute_reports_entries() {
        let (mut tracker, log) = tracker_with(&points());
        let delta = tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        assert_eq!(delta, Some(VisibilityDelta { entered: 2, exited: 0 }));
        assert_eq!(drain(&log), vec![(1, true), (2, true)]);
        assert_eq!(tracker.visible_count("units"), 2);
        assert_eq!(tracker.total_count("units"), 5);
    }

    #[test]
    fn test_unchanged_viewport_is_idempotent() {
        let (mut tracker, log) = tracker_with(&points());
        let view = Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
        tracker.recompute_visibility(view);
        drain(&log);

        assert_eq!(tracker.recompute_visibility(view), None);
        assert!(drain(&log).is_empty());
        assert_eq!(tracker.stats().skipped, 1);
    }

    #[test]
    fn test_small_camera_move_is_skipped() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        drain(&log);

        let nudged = Rect::new(Vec2::new(0.2, 0.0), Vec2::new(10.2, 10.0));
        assert_eq!(tracker.recompute_visibility(nudged), None);
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_diff_between_viewports() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        drain(&log);

        // Overlaps item 2 only, adds 3 and 4
        let delta = tracker.recompute_visibility(Rect::new(Vec2::new(4.0, 0.0), Vec2::new(16.0, 6.0)));
        assert_eq!(delta, Some(VisibilityDelta { entered: 2, exited: 1 }));
        assert_eq!(drain(&log), vec![(1, false), (3, true), (4, true)]);
        assert!(tracker.is_visible("units", &Marker { id: 2, log: log.clone() }));
    }

    #[test]
    fn test_exits_fire_before_enters() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        log.borrow_mut().clear();

        tracker.recompute_visibility(Rect::new(Vec2::new(11.0, 0.0), Vec2::new(16.0, 6.0)));
        let events = log.borrow().clone();
        let first_enter = events.iter().position(|(_, v)| *v).unwrap();
        let last_exit = events.iter().rposition(|(_, v)| !*v).unwrap();
        assert!(last_exit < first_enter);
    }

    #[test]
    fn test_margin_expands_query() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut tracker = VisibilityTracker::new(VisibilitySettings { margin: 2.0, ..settings() });
        tracker.reset_layer("units", world());
        tracker.insert("units", Vec2::new(11.5, 5.0), Marker { id: 9, log: log.clone() });

        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        assert_eq!(drain(&log), vec![(9, true)]);
    }

    #[test]
    fn test_remove_fires_exit() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        drain(&log);

        let marker = Marker { id: 1, log: log.clone() };
        assert!(tracker.remove("units", &marker));
        assert_eq!(drain(&log), vec![(1, false)]);
        assert_eq!(tracker.total_count("units"), 4);

        // Hidden items leave quietly
        let hidden = Marker { id: 5, log: log.clone() };
        assert!(tracker.remove("units", &hidden));
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_update_position_reconciles_single_item() {
        let (mut tracker, log) = tracker_with(&points());
        let view = Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
        tracker.recompute_visibility(view);
        drain(&log);

        // Walks into the viewport
        tracker.update_position("units", Vec2::new(3.0, 3.0), Marker { id: 5, log: log.clone() });
        assert_eq!(drain(&log), vec![(5, true)]);
        assert_eq!(tracker.visible_count("units"), 3);

        // Moves inside it: quiet
        tracker.update_position("units", Vec2::new(4.0, 3.0), Marker { id: 5, log: log.clone() });
        assert!(drain(&log).is_empty());

        // Walks out again
        tracker.update_position("units", Vec2::new(40.0, 3.0), Marker { id: 1, log: log.clone() });
        assert_eq!(drain(&log), vec![(1, false)]);
        assert_eq!(tracker.visible_count("units"), 2);

        // The guard still holds and a forced recompute agrees
        assert_eq!(tracker.recompute_visibility(view), None);
        tracker.invalidate();
        assert_eq!(
            tracker.recompute_visibility(view),
            Some(VisibilityDelta { entered: 0, exited: 0 })
        );
        assert_eq!(tracker.stats().recomputes, 2);
    }

    #[test]
    fn test_insert_inside_last_viewport_shows_at_once() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        drain(&log);

        tracker.insert("units", Vec2::new(6.0, 6.0), Marker { id: 7, log: log.clone() });
        tracker.insert("units", Vec2::new(60.0, 6.0), Marker { id: 8, log: log.clone() });
        assert_eq!(drain(&log), vec![(7, true)]);
        assert_eq!(tracker.stats().entered, 3);
    }

    #[test]
    fn test_moves_before_first_recompute_are_quiet() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.update_position("units", Vec2::new(2.0, 2.0), Marker { id: 5, log: log.clone() });
        assert!(drain(&log).is_empty());
        assert_eq!(tracker.visible_count("units"), 0);
    }

    #[test]
    fn test_unknown_layer_is_noop() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut tracker: VisibilityTracker<Marker> = VisibilityTracker::new(settings());
        let marker = Marker { id: 1, log: log.clone() };
        assert!(!tracker.insert("missing", Vec2::ZERO, marker.clone()));
        assert!(!tracker.remove("missing", &marker));
        assert!(!tracker.update_position("missing", Vec2::ZERO, marker));
        assert_eq!(tracker.visible_count("missing"), 0);
        assert!(tracker.recompute_visibility(world()).is_some());
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_layers_are_independent() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.reset_layer("terrain", world());
        tracker.insert("terrain", Vec2::new(2.0, 2.0), Marker { id: 100, log: log.clone() });

        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        assert_eq!(tracker.visible_count("units"), 2);
        assert_eq!(tracker.visible_count("terrain"), 1);
        assert_eq!(tracker.total_visible(), 3);
    }

    #[test]
    fn test_reset_layer_clears_state() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        drain(&log);

        tracker.reset_layer("units", world());
        assert_eq!(tracker.visible_count("units"), 0);
        assert_eq!(tracker.total_count("units"), 0);
    }

    #[test]
    fn test_remove_layer_hides_visible_items() {
        let (mut tracker, log) = tracker_with(&points());
        tracker.recompute_visibility(Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)));
        drain(&log);

        assert!(tracker.remove_layer("units"));
        assert_eq!(drain(&log), vec![(1, false), (2, false)]);
        assert!(!tracker.has_layer("units"));
    }

    #[test]
    fn test_camera_feed() {
        let (mut tracker, log) = tracker_with(&points());
        let camera = OrthographicCamera::new(Vec2::new(5.0, 5.0), 5.0, 1.0);
        let delta = tracker.update_visibility(&camera).unwrap();
        assert_eq!(delta.entered, 2);
        assert_eq!(drain(&log), vec![(1, true), (2, true)]);

        let moved = OrthographicCamera::new(Vec2::new(12.0, 5.0), 5.0, 1.0);
        tracker.update_visibility(&moved);
        assert_eq!(drain(&log), vec![(1, false), (2, false), (3, true), (4, true)]);
    }
}
