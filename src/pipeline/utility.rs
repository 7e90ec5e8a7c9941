/// Mean of integer ordinals, computed from an exact sum. Returns `None` for empty input.
pub fn mean_ordinal(values: &[u32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    Some(sum as f64 / values.len() as f64)
}

/// Sum of the values in ascending order, so the result does not depend on the
/// order they arrived in. Returns `None` for empty input.
pub fn ordered_sum(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values.iter().sum())
}
