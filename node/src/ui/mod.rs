//! Progress reporting for sync cycles.
//!
//! The reporter observes [`ProgressEvent`]s and renders one bar per phase (blocks, validation,
//! deploys). It never feeds back into the engines. Without a terminal it logs a summary per
//! finished phase instead.

// Stats output goes to stdout.
#![expect(clippy::print_stdout, reason = "UI output")]

mod bars;

pub use bars::{format_eta_seconds, format_progress_message};

use crate::storage::{DeployStat, StoreCounts};
use crate::sync::{ItemOutcome, Phase, ProgressEvent};
use bars::create_phase_bar;
use indicatif::{MultiProgress, ProgressBar};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Span of the speed estimate.
const SPEED_WINDOW: Duration = Duration::from_secs(1);

/// Items per second over a sliding window.
#[derive(Debug, Default)]
pub struct SpeedWindow {
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedWindow {
    pub fn record(&mut self, now: Instant, processed: u64) -> f64 {
        self.samples.push_back((now, processed));
        // The newest sample older than the window stays as the baseline.
        while let Some((t, _)) = self.samples.get(1) {
            if now.duration_since(*t) >= SPEED_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        match (self.samples.front(), self.samples.back()) {
            (Some((t0, v0)), Some((t1, v1))) => {
                let dt = t1.duration_since(*t0).as_secs_f64();
                if dt > 0.0 && v1 >= v0 {
                    (v1 - v0) as f64 / dt
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug)]
struct PhaseProgress {
    total: u64,
    processed: u64,
    failed: u64,
    started: Instant,
    speed: SpeedWindow,
    bar: Option<ProgressBar>,
}

impl PhaseProgress {
    fn new(total: u64, bar: Option<ProgressBar>) -> Self {
        Self {
            total,
            processed: 0,
            failed: 0,
            started: Instant::now(),
            speed: SpeedWindow::default(),
            bar,
        }
    }

    fn advance(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        if outcome == ItemOutcome::Failed {
            self.failed += 1;
        }
        let speed = self.speed.record(Instant::now(), self.processed);
        if let Some(bar) = self.bar.as_ref() {
            let remaining = self.total.saturating_sub(self.processed) as f64;
            let eta = if speed > 0.0 {
                format_eta_seconds(remaining / speed)
            } else {
                "--".to_string()
            };
            bar.set_position(self.processed.min(self.total));
            bar.set_message(format_progress_message(self.failed, speed, &eta));
        }
    }

    fn finish(self, phase: Phase) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
        info!(
            phase = phase.label(),
            processed = self.processed,
            total = self.total,
            failed = self.failed,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "phase finished"
        );
    }
}

/// Consumes progress events until every sender is dropped.
pub fn spawn_progress_reporter(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    draw_bars: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let mut phases: HashMap<Phase, PhaseProgress> = HashMap::new();
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Started { phase, total } => {
                    let bar = draw_bars.then(|| create_phase_bar(&multi, phase, total));
                    if let Some(previous) = phases.insert(phase, PhaseProgress::new(total, bar)) {
                        previous.finish(phase);
                    }
                }
                ProgressEvent::Advanced { phase, outcome } => {
                    if let Some(progress) = phases.get_mut(&phase) {
                        progress.advance(outcome);
                    }
                }
                ProgressEvent::Finished { phase } => {
                    if let Some(progress) = phases.remove(&phase) {
                        progress.finish(phase);
                    }
                }
            }
        }
        for (phase, progress) in phases.drain() {
            progress.finish(phase);
        }
    })
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    counts: &'a StoreCounts,
    last_14_days: &'a [DeployStat],
}

/// Print store counts and the per-type deploy stats as JSON.
pub fn print_stats(counts: &StoreCounts, stats: &[DeployStat]) -> eyre::Result<()> {
    let payload = serde_json::to_string_pretty(&StatsReport {
        counts,
        last_14_days: stats,
    })?;
    println!("{payload}");
    Ok(())
}
