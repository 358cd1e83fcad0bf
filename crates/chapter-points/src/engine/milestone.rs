use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::value::round_half_up;

/// Intermediate threshold that grants a partial reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub level: String,
    pub threshold: f64,
    #[serde(default)]
    pub point_value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
}

/// Anything that carries a milestone ladder or a single completion target.
pub trait MilestoneTrack {
    fn milestones(&self) -> &[Milestone];

    /// Completion target used when no milestones are configured.
    fn target_value(&self) -> f64;

    /// Whether the single target reports proportional progress or a 0/100 flag.
    fn proportional_target(&self) -> bool;
}

fn sorted(milestones: &[Milestone]) -> Vec<Milestone> {
    let mut ladder = milestones.to_vec();
    ladder.sort_by(|a, b| {
        a.threshold
            .partial_cmp(&b.threshold)
            .unwrap_or(Ordering::Equal)
    });
    ladder
}

fn clamp_percent(raw: i64, complete: bool) -> u8 {
    if complete {
        return 100;
    }
    // Only a completed track may report 100.
    raw.clamp(0, 99) as u8
}

/// Percent complete in `[0, 100]`; exactly 100 once the final threshold is reached.
pub fn progress_percent<T: MilestoneTrack + ?Sized>(track: &T, current: f64) -> u8 {
    // An unreadable measurement counts as no progress.
    let current = if current.is_nan() { 0.0 } else { current };
    let ladder = sorted(track.milestones());

    let Some(last) = ladder.last() else {
        let target = track.target_value();
        if target <= 0.0 {
            return 100;
        }
        let complete = current >= target;
        if !track.proportional_target() {
            return if complete { 100 } else { 0 };
        }
        let raw = round_half_up(100.0 * current.max(0.0) / target);
        return clamp_percent(raw, complete);
    };

    if current >= last.threshold {
        return 100;
    }

    let previous = ladder
        .iter()
        .take_while(|milestone| milestone.threshold <= current)
        .last()
        .map(|milestone| milestone.threshold)
        .unwrap_or(0.0);
    let Some(target) = ladder.iter().find(|milestone| milestone.threshold > current) else {
        return 100;
    };

    let span = target.threshold - previous;
    if span <= 0.0 {
        return 0;
    }
    let raw = round_half_up(100.0 * (current - previous).max(0.0) / span);
    clamp_percent(raw, false)
}

/// Every milestone whose threshold is at or below `current`, ascending.
pub fn completed_milestones<T: MilestoneTrack + ?Sized>(track: &T, current: f64) -> Vec<Milestone> {
    sorted(track.milestones())
        .into_iter()
        .filter(|milestone| milestone.threshold <= current)
        .collect()
}

/// Milestones completed at `current` that were not among `previously_completed` labels.
pub fn newly_crossed<T: MilestoneTrack + ?Sized>(
    track: &T,
    current: f64,
    previously_completed: &[String],
) -> Vec<Milestone> {
    let seen: BTreeSet<&str> = previously_completed.iter().map(String::as_str).collect();
    completed_milestones(track, current)
        .into_iter()
        .filter(|milestone| !seen.contains(milestone.level.as_str()))
        .collect()
}

/// Full completion: every milestone reached, or the single target met.
pub fn is_complete<T: MilestoneTrack + ?Sized>(track: &T, current: f64) -> bool {
    let ladder = track.milestones();
    if ladder.is_empty() {
        return current >= track.target_value();
    }
    ladder
        .iter()
        .map(|milestone| milestone.threshold)
        .fold(f64::NEG_INFINITY, f64::max)
        <= current
}

/// Ladder problems that would make progress ambiguous.
pub fn ladder_errors(milestones: &[Milestone]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut labels = BTreeSet::new();

    for milestone in milestones {
        if milestone.level.trim().is_empty() {
            errors.push("Milestone level label is required".to_string());
        } else if !labels.insert(milestone.level.as_str()) {
            errors.push(format!("Milestone level '{}' is duplicated", milestone.level));
        }
        if !(milestone.threshold.is_finite() && milestone.threshold > 0.0) {
            errors.push(format!(
                "Milestone '{}' threshold must be greater than 0",
                milestone.level
            ));
        }
    }

    let ladder = sorted(milestones);
    for pair in ladder.windows(2) {
        if pair[0].threshold >= pair[1].threshold {
            errors.push(format!(
                "Milestones '{}' and '{}' share threshold {}",
                pair[0].level, pair[1].level, pair[1].threshold
            ));
        }
    }

    errors
}
