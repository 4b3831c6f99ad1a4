//! Progress bar construction and message formatting.

use crate::sync::Phase;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Create the bar for one sync phase.
pub fn create_phase_bar(multi: &MultiProgress, phase: Phase, total: u64) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(total));
    bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
    let template = match phase {
        Phase::Blocks => {
            "{prefix:>10} {bar:40.cyan/blue} {percent:>3}% {pos}/{len} | {elapsed_precise} | {msg}"
        }
        Phase::Validation => {
            "{prefix:>10} {bar:40.yellow/black} {percent:>3}% {pos}/{len} | {elapsed_precise} | {msg}"
        }
        Phase::Deploys => {
            "{prefix:>10} {bar:40.green/black} {percent:>3}% {pos}/{len} | {elapsed_precise} | {msg}"
        }
    };
    let style = ProgressStyle::with_template(template)
        .expect("progress style")
        .progress_chars("█▉░");
    bar.set_style(style);
    bar.set_prefix(phase.label());
    bar
}

/// Message shown next to a phase bar.
pub fn format_progress_message(failed: u64, speed: f64, eta: &str) -> String {
    format!("failed {failed} | speed {speed:.1}/s | eta {eta}")
}

/// Format seconds as `1h02m03s`, `4m05s` or `6s`.
pub fn format_eta_seconds(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "--".to_string();
    }
    let total = secs.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
