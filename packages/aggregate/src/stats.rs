//! Quantiles and descriptive summaries over numeric columns.

use sidewalk_crowd_aggregate_models::ColumnSummary;

/// Quantiles reported by [`summarize`].
pub const DESCRIBE_QUANTILES: [f64; 11] = [
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.975, 0.99,
];

/// Finite values of `values`, sorted ascending.
#[must_use]
pub fn sorted_finite(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Quantile `q` of an ascending slice, linearly interpolating between the
/// two nearest ranks.
///
/// Returns `None` for an empty slice or `q` outside `[0, 1]`.
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let rank = q * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = rank - rank.floor();

    Some((sorted[upper] - sorted[lower]).mul_add(fraction, sorted[lower]))
}

/// Whether an ascending slice holds at least two distinct values.
#[must_use]
pub fn has_spread(sorted: &[f64]) -> bool {
    match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => first < last,
        _ => false,
    }
}

/// Count, mean, extremes and the [`DESCRIBE_QUANTILES`] of a column.
///
/// Returns `None` when the column has no finite values.
#[must_use]
pub fn summarize(values: impl IntoIterator<Item = f64>) -> Option<ColumnSummary> {
    let sorted = sorted_finite(values);
    let (&min, &max) = (sorted.first()?, sorted.last()?);

    #[allow(clippy::cast_precision_loss)]
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;

    let percentiles = DESCRIBE_QUANTILES
        .iter()
        .filter_map(|&q| quantile(&sorted, q).map(|v| (q, v)))
        .collect();

    Some(ColumnSummary {
        count: sorted.len(),
        mean,
        min,
        max,
        percentiles,
    })
}
