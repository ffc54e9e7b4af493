//! Prometheus-compatible simulation metrics
//!
//! Counters are fed from each [`TickReport`], gauges from a [`World`]
//! snapshot. Rendering is pull-only: the host decides where the text goes.

use crate::sim::performance::{PerformanceMonitor, PerformanceStatus};
use crate::sim::world::{TickReport, World};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the simulation
#[derive(Debug)]
pub struct Metrics {
    // World gauges
    pub entities: AtomicU64,
    pub alive_entities: AtomicU64,
    pub formations: AtomicU64,
    pub formations_in_combat: AtomicU64,
    pub indexed_items: AtomicU64,
    pub visible_items: AtomicU64,

    // Tick counters
    pub visibility_recomputes: AtomicU64,
    pub visibility_entered: AtomicU64,
    pub visibility_exited: AtomicU64,
    pub tasks_started: AtomicU64,
    pub damage_events: AtomicU64,
    pub deaths: AtomicU64,
    pub entities_moved: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Performance status (0=Excellent, 1=Good, 2=Warning, 3=Critical, 4=Catastrophic)
    pub performance_status: AtomicU64,
    pub budget_usage_percent: AtomicU64,

    /// Simulation clock in milliseconds
    pub sim_time_ms: AtomicU64,

    #[cfg(feature = "metrics_extended")]
    pub quadtree_nodes: AtomicU64,
    #[cfg(feature = "metrics_extended")]
    pub quadtree_max_depth: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            entities: AtomicU64::new(0),
            alive_entities: AtomicU64::new(0),
            formations: AtomicU64::new(0),
            formations_in_combat: AtomicU64::new(0),
            indexed_items: AtomicU64::new(0),
            visible_items: AtomicU64::new(0),
            visibility_recomputes: AtomicU64::new(0),
            visibility_entered: AtomicU64::new(0),
            visibility_exited: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            damage_events: AtomicU64::new(0),
            deaths: AtomicU64::new(0),
            entities_moved: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            performance_status: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            sim_time_ms: AtomicU64::new(0),
            #[cfg(feature = "metrics_extended")]
            quadtree_nodes: AtomicU64::new(0),
            #[cfg(feature = "metrics_extended")]
            quadtree_max_depth: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Fold one tick's counts into the counters
    pub fn record_tick(&self, report: &TickReport) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        if report.visibility_recomputed {
            self.visibility_recomputes.fetch_add(1, Ordering::Relaxed);
        }
        self.visibility_entered.fetch_add(report.entered as u64, Ordering::Relaxed);
        self.visibility_exited.fetch_add(report.exited as u64, Ordering::Relaxed);
        self.tasks_started.fetch_add(report.tasks_started as u64, Ordering::Relaxed);
        self.damage_events.fetch_add(report.damage_events as u64, Ordering::Relaxed);
        self.deaths.fetch_add(report.deaths as u64, Ordering::Relaxed);
        self.entities_moved.fetch_add(report.moved as u64, Ordering::Relaxed);
        self.sim_time_ms.store((report.time * 1000.0) as u64, Ordering::Relaxed);
    }

    /// Refresh world gauges
    pub fn observe_world(&self, world: &World) {
        let entities = world.entities();
        self.entities.store(entities.len() as u64, Ordering::Relaxed);
        self.alive_entities.store(entities.alive_count() as u64, Ordering::Relaxed);
        self.formations.store(world.formations().len() as u64, Ordering::Relaxed);
        self.formations_in_combat.store(
            world.formations().iter().filter(|f| f.in_combat()).count() as u64,
            Ordering::Relaxed,
        );

        let tracker = world.tracker();
        let indexed: usize = tracker.layer_names().map(|l| tracker.total_count(l)).sum();
        self.indexed_items.store(indexed as u64, Ordering::Relaxed);
        self.visible_items.store(tracker.total_visible() as u64, Ordering::Relaxed);

        #[cfg(feature = "metrics_extended")]
        {
            let (nodes, depth) = tracker
                .layer_names()
                .filter_map(|l| tracker.layer_stats(l))
                .fold((0usize, 0u32), |(nodes, depth), s| {
                    (nodes + s.tree.node_count, depth.max(s.tree.max_depth))
                });
            self.quadtree_nodes.store(nodes as u64, Ordering::Relaxed);
            self.quadtree_max_depth.store(u64::from(depth), Ordering::Relaxed);
        }
    }

    pub fn record_performance(&self, monitor: &PerformanceMonitor) {
        self.performance_status
            .store(monitor.status().as_gauge(), Ordering::Relaxed);
        self.budget_usage_percent
            .store(monitor.budget_usage_percent() as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn status_name(&self) -> &'static str {
        PerformanceStatus::from_gauge(self.performance_status.load(Ordering::Relaxed)).name()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // World
        metric!("kingdom_sim_entities", "Number of spawned entities", "gauge",
            self.entities.load(Ordering::Relaxed));
        metric!("kingdom_sim_entities_alive", "Entities without fatal damage", "gauge",
            self.alive_entities.load(Ordering::Relaxed));
        metric!("kingdom_sim_formations", "Number of formations", "gauge",
            self.formations.load(Ordering::Relaxed));
        metric!("kingdom_sim_formations_in_combat", "Formations currently engaged", "gauge",
            self.formations_in_combat.load(Ordering::Relaxed));

        // Visibility
        metric!("kingdom_sim_indexed_items", "Items indexed across all layers", "gauge",
            self.indexed_items.load(Ordering::Relaxed));
        metric!("kingdom_sim_visible_items", "Items inside the expanded viewport", "gauge",
            self.visible_items.load(Ordering::Relaxed));
        metric!("kingdom_sim_visibility_recomputes_total", "Visibility recomputes", "counter",
            self.visibility_recomputes.load(Ordering::Relaxed));
        metric!("kingdom_sim_visibility_entered_total", "Items that became visible", "counter",
            self.visibility_entered.load(Ordering::Relaxed));
        metric!("kingdom_sim_visibility_exited_total", "Items that became hidden", "counter",
            self.visibility_exited.load(Ordering::Relaxed));

        // Behavior
        metric!("kingdom_sim_tasks_started_total", "Tasks that executed", "counter",
            self.tasks_started.load(Ordering::Relaxed));
        metric!("kingdom_sim_damage_events_total", "Strikes that dealt damage", "counter",
            self.damage_events.load(Ordering::Relaxed));
        metric!("kingdom_sim_deaths_total", "Entities killed", "counter",
            self.deaths.load(Ordering::Relaxed));
        metric!("kingdom_sim_entities_moved_total", "Position changes flushed to the index", "counter",
            self.entities_moved.load(Ordering::Relaxed));

        // Performance
        metric!("kingdom_sim_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("kingdom_sim_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("kingdom_sim_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("kingdom_sim_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("kingdom_sim_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("kingdom_sim_performance_status", "Performance status (0=Excellent, 4=Catastrophic)", "gauge",
            self.performance_status.load(Ordering::Relaxed));
        metric!("kingdom_sim_budget_usage_percent", "Tick budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP kingdom_sim_performance_state Human-readable performance state\n# TYPE kingdom_sim_performance_state gauge\nkingdom_sim_performance_state{{state=\"{}\"}} 1\n",
            self.status_name()
        ));

        #[cfg(feature = "metrics_extended")]
        {
            metric!("kingdom_sim_quadtree_nodes", "Quadtree nodes across all layers", "gauge",
                self.quadtree_nodes.load(Ordering::Relaxed));
            metric!("kingdom_sim_quadtree_max_depth", "Deepest quadtree node", "gauge",
                self.quadtree_max_depth.load(Ordering::Relaxed));
        }

        metric!("kingdom_sim_time_milliseconds", "Simulation clock", "gauge",
            self.sim_time_ms.load(Ordering::Relaxed));
        metric!("kingdom_sim_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON rendering of the same registry
    pub fn to_json(&self) -> String {
        #[allow(unused_mut)]
        let mut value = json!({
            "world": {
                "entities": self.entities.load(Ordering::Relaxed),
                "alive": self.alive_entities.load(Ordering::Relaxed),
                "formations": self.formations.load(Ordering::Relaxed),
                "formations_in_combat": self.formations_in_combat.load(Ordering::Relaxed),
            },
            "visibility": {
                "indexed": self.indexed_items.load(Ordering::Relaxed),
                "visible": self.visible_items.load(Ordering::Relaxed),
                "recomputes": self.visibility_recomputes.load(Ordering::Relaxed),
                "entered": self.visibility_entered.load(Ordering::Relaxed),
                "exited": self.visibility_exited.load(Ordering::Relaxed),
            },
            "behavior": {
                "tasks_started": self.tasks_started.load(Ordering::Relaxed),
                "damage_events": self.damage_events.load(Ordering::Relaxed),
                "deaths": self.deaths.load(Ordering::Relaxed),
                "moved": self.entities_moved.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
                "status": self.performance_status.load(Ordering::Relaxed),
                "status_name": self.status_name(),
                "budget_percent": self.budget_usage_percent.load(Ordering::Relaxed),
            },
            "sim_time_ms": self.sim_time_ms.load(Ordering::Relaxed),
            "uptime_seconds": self.uptime_seconds(),
        });

        #[cfg(feature = "metrics_extended")]
        {
            value["quadtree"] = json!({
                "nodes": self.quadtree_nodes.load(Ordering::Relaxed),
                "max_depth": self.quadtree_max_depth.load(Ordering::Relaxed),
            });
        }

        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::sim::entity::SpawnDesc;
    use crate::sim::world::ViewportFeed;
    use crate::util::rect::Rect;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.entities.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_time_us.load(Ordering::Relaxed), 1090);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1040);
        assert!(metrics.tick_time_p99_us.load(Ordering::Relaxed) >= metrics.tick_time_p95_us.load(Ordering::Relaxed));
    }

    #[test]
    fn test_record_tick_accumulates() {
        let metrics = Metrics::new();
        let report = TickReport {
            tick: 1,
            time: 0.5,
            visibility_recomputed: true,
            entered: 3,
            exited: 1,
            tasks_started: 2,
            damage_events: 1,
            deaths: 0,
            moved: 4,
        };
        metrics.record_tick(&report);
        metrics.record_tick(&TickReport { tick: 2, time: 1.0, ..report.clone() });

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.visibility_recomputes.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.visibility_entered.load(Ordering::Relaxed), 6);
        assert_eq!(metrics.entities_moved.load(Ordering::Relaxed), 8);
        assert_eq!(metrics.sim_time_ms.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn test_observe_world() {
        let mut world = World::new(SimConfig::default());
        world.reset_layer("objects", Rect::new(Vec2::new(-50.0, -50.0), Vec2::new(50.0, 50.0)));
        for i in 0..4 {
            world
                .spawn(SpawnDesc::new("tree", Vec2::new(i as f32 * 10.0, 0.0)).on_layer("objects"))
                .unwrap();
        }
        world.tick(0.1, ViewportFeed::Rect(Rect::new(Vec2::new(-5.0, -5.0), Vec2::new(5.0, 5.0))));

        let metrics = Metrics::new();
        metrics.observe_world(&world);
        assert_eq!(metrics.entities.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.indexed_items.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.visible_items.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.formations.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.entities.store(50, Ordering::Relaxed);
        metrics.deaths.store(3, Ordering::Relaxed);

        let output = metrics.to_prometheus();
        assert!(output.contains("kingdom_sim_entities 50"));
        assert!(output.contains("kingdom_sim_deaths_total 3"));
        assert!(output.contains("# TYPE kingdom_sim_tick_count counter"));
        assert!(output.contains("kingdom_sim_performance_state{state=\"excellent\"} 1"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.visible_items.store(12, Ordering::Relaxed);
        metrics.performance_status.store(3, Ordering::Relaxed);

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["visibility"]["visible"], 12);
        assert_eq!(parsed["performance"]["status_name"], "critical");
    }
}
