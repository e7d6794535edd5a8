//! Progress events and the arithmetic that places them on a 0–100 scale.
//!
//! Every percent the orchestrator reports comes out of [`ProgressMap`], so the
//! per-item shares, the download/install split and the byte scaling live in
//! one place that needs no I/O to test.

use serde::Serialize;

/// Portion of an item's share spent downloading; installing takes the rest.
pub const DOWNLOAD_SHARE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connecting,
    Downloading,
    Installing,
    Completed,
    Failed,
    Error,
    Cancelled,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Connecting => "Connecting",
            Phase::Downloading => "Downloading",
            Phase::Installing => "Installing",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
            Phase::Error => "Error",
            Phase::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub percent: f64,
    pub phase: Phase,
    pub current_item: String,
    pub total_items: usize,
    /// 1-based position of the item this event belongs to; `None` for run-level events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
}

impl ProgressEvent {
    pub fn new(percent: f64, phase: Phase, current_item: impl Into<String>, total_items: usize) -> Self {
        Self {
            percent: clamp_percent(percent),
            phase,
            current_item: current_item.into(),
            total_items,
            item_index: None,
        }
    }

    pub fn for_item(mut self, index: usize) -> Self {
        self.item_index = Some(index + 1);
        self
    }

    /// True for the single event that closes out one item.
    pub fn is_item_terminal(&self) -> bool {
        self.item_index.is_some()
            && matches!(self.phase, Phase::Completed | Phase::Failed | Phase::Error)
    }

    /// `Phase (i of N)` style status line
    pub fn status(&self) -> String {
        match self.item_index {
            Some(index) => format!("{} ({} of {})", self.phase.label(), index, self.total_items),
            None => self.phase.label().to_string(),
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Maps item positions and byte counts onto the overall percentage.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMap {
    total: usize,
}

impl ProgressMap {
    pub fn new(total: usize) -> Self {
        Self { total }
    }

    fn share(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 / self.total as f64
        }
    }

    pub fn item_start(&self, index: usize) -> f64 {
        clamp_percent(index as f64 * self.share())
    }

    pub fn item_end(&self, index: usize) -> f64 {
        if index + 1 >= self.total {
            return 100.0;
        }
        clamp_percent((index + 1) as f64 * self.share())
    }

    /// Sub-range of the overall scale covered by downloading item `index`.
    pub fn download_range(&self, index: usize) -> (f64, f64) {
        let start = self.item_start(index);
        let end = start + (self.item_end(index) - start) * DOWNLOAD_SHARE;
        (start, clamp_percent(end))
    }

    /// Where installing item `index` begins, right after its download range.
    pub fn install_start(&self, index: usize) -> f64 {
        self.download_range(index).1
    }
}

/// Position within `range` after `done` of `total` bytes.
///
/// An unknown or zero total keeps the result at the start of the range; an
/// inverted range collapses to its start.
pub fn scale(range: (f64, f64), done: u64, total: Option<u64>) -> f64 {
    let start = clamp_percent(range.0);
    let end = clamp_percent(range.1).max(start);
    match total {
        Some(total) if total > 0 => {
            let fraction = (done as f64 / total as f64).min(1.0);
            start + (end - start) * fraction
        }
        _ => start,
    }
}

/// Aggregate counts folded from a stream of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record(&mut self, event: &ProgressEvent) {
        if event.phase == Phase::Cancelled {
            self.cancelled = true;
        }
        if !event.is_item_terminal() {
            return;
        }
        match event.phase {
            Phase::Completed => self.completed += 1,
            Phase::Failed | Phase::Error => self.failed += 1,
            _ => {}
        }
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ProgressEvent>) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.record(event);
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_job_has_no_share() {
        let map = ProgressMap::new(0);
        assert_eq!(map.item_start(0), 0.0);
        let (start, end) = map.download_range(3);
        assert!(start <= end);
        assert!(end <= 100.0);
    }

    #[test]
    fn item_boundaries_partition_the_scale() {
        let map = ProgressMap::new(4);
        assert_eq!(map.item_start(0), 0.0);
        assert_eq!(map.item_end(0), 25.0);
        assert_eq!(map.item_start(1), 25.0);
        assert_eq!(map.item_end(3), 100.0);
    }

    #[test]
    fn last_item_always_ends_at_hundred() {
        let map = ProgressMap::new(3);
        assert_eq!(map.item_end(2), 100.0);
    }

    #[test]
    fn download_occupies_first_forty_percent_of_item() {
        let map = ProgressMap::new(2);
        let (start, end) = map.download_range(1);
        assert_eq!(start, 50.0);
        assert!((end - 70.0).abs() < 1e-9);
        assert_eq!(map.install_start(1), end);
        assert!(end < map.item_end(1));
    }

    #[test]
    fn scale_is_proportional_and_capped() {
        assert_eq!(scale((10.0, 20.0), 0, Some(100)), 10.0);
        assert_eq!(scale((10.0, 20.0), 50, Some(100)), 15.0);
        assert_eq!(scale((10.0, 20.0), 100, Some(100)), 20.0);
        assert_eq!(scale((10.0, 20.0), 500, Some(100)), 20.0);
    }

    #[test]
    fn unknown_length_stays_at_start() {
        assert_eq!(scale((10.0, 20.0), 4096, None), 10.0);
        assert_eq!(scale((10.0, 20.0), 4096, Some(0)), 10.0);
    }

    #[test]
    fn inverted_range_collapses() {
        assert_eq!(scale((30.0, 20.0), 50, Some(100)), 30.0);
    }

    #[test]
    fn event_percent_is_clamped() {
        assert_eq!(ProgressEvent::new(140.0, Phase::Completed, "x", 1).percent, 100.0);
        assert_eq!(ProgressEvent::new(-3.0, Phase::Connecting, "x", 1).percent, 0.0);
        assert_eq!(ProgressEvent::new(f64::NAN, Phase::Connecting, "x", 1).percent, 0.0);
    }

    #[test]
    fn status_line_includes_position() {
        let event = ProgressEvent::new(10.0, Phase::Downloading, "Firefox", 3).for_item(0);
        assert_eq!(event.status(), "Downloading (1 of 3)");
        assert_eq!(ProgressEvent::new(100.0, Phase::Completed, "", 0).status(), "Completed");
    }

    #[test]
    fn summary_counts_only_item_terminal_events() {
        let events = vec![
            ProgressEvent::new(0.0, Phase::Connecting, "a", 2).for_item(0),
            ProgressEvent::new(50.0, Phase::Completed, "a", 2).for_item(0),
            ProgressEvent::new(50.0, Phase::Connecting, "b", 2).for_item(1),
            ProgressEvent::new(100.0, Phase::Failed, "b - boom", 2).for_item(1),
            ProgressEvent::new(100.0, Phase::Completed, "All installations completed", 0),
        ];
        let summary = RunSummary::from_events(&events);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 2);
        assert!(!summary.cancelled);
    }
}
