//! Threshold breach detection

/// Whether `most_recent` is strictly above `threshold`
pub fn is_over_threshold(most_recent: f64, threshold: f64) -> bool {
    most_recent > threshold
}
