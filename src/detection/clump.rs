//! Estimating how many pills a blob holds.
//!
//! Touching pills merge into one contour. The median contour area is taken
//! as the size of a single pill and every contour counts as
//! `max(1, round(area / median))` pills. This is approximate: three touching
//! pills whose merged outline is smaller than three medians may count as two.

use crate::models::Region;

/// Median of a set of areas; the mean of the two middle values for even counts
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Estimated pill count for each area, using the median area as the unit
pub fn clump_counts(areas: &[f64]) -> Vec<u32> {
    let Some(unit) = median(areas) else {
        return Vec::new();
    };
    if unit <= 0.0 {
        return vec![1; areas.len()];
    }
    areas
        .iter()
        .map(|area| ((area / unit).round_ties_even() as u32).max(1))
        .collect()
}

/// Drop noise regions, assign each survivor its sub-count and return the total
pub fn estimate(regions: &mut Vec<Region>, min_area: f64) -> u32 {
    regions.retain(|r| r.area > min_area);
    let areas: Vec<f64> = regions.iter().map(|r| r.area).collect();
    let counts = clump_counts(&areas);
    for (region, count) in regions.iter_mut().zip(&counts) {
        region.estimated_count = *count;
    }
    counts.iter().sum()
}
