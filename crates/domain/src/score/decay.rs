use chrono::{DateTime, Utc};

/// Half-life of a reputation score: after this many hours the effective
/// score is half the stored value.
pub const DECAY_HALF_LIFE_HOURS: f64 = 72.0;

/// Floor for the decay multiplier. Old scores never drop below 30% of
/// their stored value, so a known-bad IP keeps a residual reputation.
pub const MIN_DECAY_MULTIPLIER: f64 = 0.3;

/// Exponential decay multiplier for a score last updated at `updated_at`.
///
/// `multiplier = max(0.3, 0.5^(age_hours / 72))`. A future `updated_at`
/// (clock skew, or a record written with "now" on a lagging peer) yields
/// age 0 and therefore no decay.
pub fn decay_multiplier(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_secs = (now - updated_at).num_seconds().max(0) as f64;
    let age_hours = age_secs / 3600.0;
    let decay = 0.5_f64.powf(age_hours / DECAY_HALF_LIFE_HOURS);
    decay.max(MIN_DECAY_MULTIPLIER)
}

/// Apply time decay to a stored score.
///
/// A zero score stays zero regardless of age. The result is rounded to
/// the nearest integer and saturates at `i32` bounds.
pub fn apply_decay(score: i32, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    if score == 0 {
        return 0;
    }
    let decayed = f64::from(score) * decay_multiplier(updated_at, now);
    let rounded = decayed.round();
    if rounded >= f64::from(i32::MAX) {
        i32::MAX
    } else if rounded <= f64::from(i32::MIN) {
        i32::MIN
    } else {
        rounded as i32
    }
}
