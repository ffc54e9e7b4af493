//! Tick budget monitoring
//!
//! Tracks how much of the fixed step each tick consumes and classifies the
//! result into a status band exported through metrics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Performance status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    /// Under 30% of the step
    Excellent,
    Good,
    Warning,
    /// Over 90% of the step
    Critical,
    /// At least 150% of the step
    Catastrophic,
}

impl PerformanceStatus {
    pub fn as_gauge(&self) -> u64 {
        match self {
            PerformanceStatus::Excellent => 0,
            PerformanceStatus::Good => 1,
            PerformanceStatus::Warning => 2,
            PerformanceStatus::Critical => 3,
            PerformanceStatus::Catastrophic => 4,
        }
    }

    pub fn from_gauge(value: u64) -> Self {
        match value {
            0 => PerformanceStatus::Excellent,
            1 => PerformanceStatus::Good,
            2 => PerformanceStatus::Warning,
            3 => PerformanceStatus::Critical,
            _ => PerformanceStatus::Catastrophic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PerformanceStatus::Excellent => "excellent",
            PerformanceStatus::Good => "good",
            PerformanceStatus::Warning => "warning",
            PerformanceStatus::Critical => "critical",
            PerformanceStatus::Catastrophic => "catastrophic",
        }
    }
}

/// Performance monitor that tracks tick durations
pub struct PerformanceMonitor {
    tick_durations: VecDeque<Duration>,
    max_samples: usize,
    /// Target tick duration (budget)
    target_tick_duration: Duration,
    // Fractions of budget
    excellent_threshold: f32,
    warning_threshold: f32,
    critical_threshold: f32,
    catastrophic_threshold: f32,
    status: PerformanceStatus,
    tick_start: Option<Instant>,
    last_entity_count: usize,
}

impl PerformanceMonitor {
    pub fn new(tick_rate: u32) -> Self {
        let target_tick_duration = Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32);
        let max_samples = (tick_rate as usize * 2).max(10);

        Self {
            tick_durations: VecDeque::with_capacity(max_samples),
            max_samples,
            target_tick_duration,
            excellent_threshold: 0.3,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            catastrophic_threshold: 1.5,
            status: PerformanceStatus::Excellent,
            tick_start: None,
            last_entity_count: 0,
        }
    }

    pub fn tick_start(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Stop timing; returns the measured duration when a tick was open
    pub fn tick_end(&mut self, entity_count: usize) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let duration = start.elapsed();
        self.record_tick(duration);
        self.last_entity_count = entity_count;
        Some(duration)
    }

    fn record_tick(&mut self, duration: Duration) {
        self.tick_durations.push_back(duration);
        while self.tick_durations.len() > self.max_samples {
            self.tick_durations.pop_front();
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        if self.tick_durations.len() < 10 {
            // Not enough data yet
            return;
        }

        let ratio = self.budget_usage_percent() / 100.0;
        self.status = if ratio < self.excellent_threshold {
            PerformanceStatus::Excellent
        } else if ratio < self.warning_threshold {
            PerformanceStatus::Good
        } else if ratio < self.critical_threshold {
            PerformanceStatus::Warning
        } else if ratio < self.catastrophic_threshold {
            PerformanceStatus::Critical
        } else {
            PerformanceStatus::Catastrophic
        };
    }

    pub fn average_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.tick_durations.iter().sum();
        sum / self.tick_durations.len() as u32
    }

    pub fn p95_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.tick_durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted.get(idx.min(sorted.len() - 1)).copied().unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    /// Average tick as a percentage of the budget (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        let avg = self.average_tick_duration();
        (avg.as_secs_f32() / self.target_tick_duration.as_secs_f32()) * 100.0
    }

    pub fn last_entity_count(&self) -> usize {
        self.last_entity_count
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, {} entities",
            self.status,
            self.budget_usage_percent(),
            self.last_entity_count
        )
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(crate::constants::sim::TICK_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(monitor: &mut PerformanceMonitor, tick: Duration) {
        for _ in 0..20 {
            monitor.record_tick(tick);
        }
    }

    #[test]
    fn test_performance_monitor_new() {
        let monitor = PerformanceMonitor::new(30);
        assert_eq!(monitor.status(), PerformanceStatus::Excellent);
        assert_eq!(monitor.average_tick_duration(), Duration::ZERO);
    }

    #[test]
    fn test_status_bands() {
        // Budget at 30Hz is ~33.3ms
        let cases = [
            (5, PerformanceStatus::Excellent),
            (16, PerformanceStatus::Good),
            (27, PerformanceStatus::Warning),
            (40, PerformanceStatus::Critical),
            (60, PerformanceStatus::Catastrophic),
        ];
        for (ms, expected) in cases {
            let mut monitor = PerformanceMonitor::new(30);
            fill(&mut monitor, Duration::from_millis(ms));
            assert_eq!(monitor.status(), expected, "{}ms", ms);
        }
    }

    #[test]
    fn test_gauge_round_trip() {
        for status in [
            PerformanceStatus::Excellent,
            PerformanceStatus::Good,
            PerformanceStatus::Warning,
            PerformanceStatus::Critical,
            PerformanceStatus::Catastrophic,
        ] {
            assert_eq!(PerformanceStatus::from_gauge(status.as_gauge()), status);
        }
        assert_eq!(PerformanceStatus::from_gauge(99), PerformanceStatus::Catastrophic);
    }

    #[test]
    fn test_too_few_samples_keeps_status() {
        let mut monitor = PerformanceMonitor::new(30);
        for _ in 0..5 {
            monitor.record_tick(Duration::from_millis(100));
        }
        assert_eq!(monitor.status(), PerformanceStatus::Excellent);
    }

    #[test]
    fn test_tick_timing() {
        let mut monitor = PerformanceMonitor::new(30);
        assert_eq!(monitor.tick_end(3), None);

        monitor.tick_start();
        std::thread::sleep(Duration::from_millis(1));
        let measured = monitor.tick_end(10).unwrap();

        assert!(measured >= Duration::from_millis(1));
        assert_eq!(monitor.last_entity_count(), 10);
        assert!(monitor.status_message().contains("10 entities"));
    }
}
