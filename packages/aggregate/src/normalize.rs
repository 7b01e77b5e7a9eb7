//! Width normalization and outlier clipping of crowdedness columns.
//!
//! Crowdedness is the primary mean count divided by segment width. Each
//! column is then clipped to quantile bounds taken from its own
//! distribution. Degenerate segments (no width) stay at zero and are left
//! out of every distribution.

use std::collections::BTreeMap;

use sidewalk_crowd_aggregate_models::{AggregateTable, CrowdednessColumn, HOURS_PER_DAY};

use crate::stats::{has_spread, quantile, sorted_finite};

/// Clip quantiles and the hourly sparsity guard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    /// Lower and upper quantile for the overall column.
    pub overall_quantiles: (f64, f64),
    /// Lower and upper quantile for each hourly column.
    pub hourly_quantiles: (f64, f64),
    /// An hourly column is clipped only when strictly more than this
    /// fraction of segments is positive.
    pub hourly_min_positive_fraction: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            overall_quantiles: (0.01, 0.99),
            hourly_quantiles: (0.001, 0.999),
            hourly_min_positive_fraction: 0.01,
        }
    }
}

/// Closed clip range for one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ClipBounds {
    /// Clamps `value` into the range. Never panics, even on a reversed
    /// range, where the upper bound wins.
    #[must_use]
    pub fn clip(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

/// Bounds applied per column; `None` where clipping was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizationReport {
    pub bounds: BTreeMap<CrowdednessColumn, Option<ClipBounds>>,
}

impl NormalizationReport {
    /// Columns that were left unclipped.
    pub fn skipped(&self) -> impl Iterator<Item = CrowdednessColumn> + '_ {
        self.bounds
            .iter()
            .filter(|(_, b)| b.is_none())
            .map(|(column, _)| *column)
    }
}

/// Divides overall and hourly primary means by segment width.
///
/// Degenerate rows get zero crowdedness.
#[must_use]
pub fn width_normalize(mut table: AggregateTable) -> AggregateTable {
    for row in &mut table.rows {
        let Some(width) = row.width else {
            row.crowdedness = 0.0;
            row.hourly_crowdedness = [0.0; HOURS_PER_DAY];
            continue;
        };
        row.crowdedness = row.mean_counts[0] / width;
        for (crowdedness, mean) in row.hourly_crowdedness.iter_mut().zip(row.hourly_mean_counts) {
            *crowdedness = mean / width;
        }
    }
    table
}

/// Computes clip bounds for every crowdedness column of a width-normalized
/// table.
#[must_use]
pub fn clip_bounds(table: &AggregateTable, options: &NormalizeOptions) -> NormalizationReport {
    let mut report = NormalizationReport::default();

    report.bounds.insert(
        CrowdednessColumn::Overall,
        column_bounds(table, CrowdednessColumn::Overall, options.overall_quantiles, None),
    );

    for hour in 0..HOURS_PER_DAY {
        #[allow(clippy::cast_possible_truncation)]
        let column = CrowdednessColumn::Hour(hour as u8);
        report.bounds.insert(
            column,
            column_bounds(
                table,
                column,
                options.hourly_quantiles,
                Some(options.hourly_min_positive_fraction),
            ),
        );
    }

    report
}

fn column_bounds(
    table: &AggregateTable,
    column: CrowdednessColumn,
    (lower_q, upper_q): (f64, f64),
    min_positive_fraction: Option<f64>,
) -> Option<ClipBounds> {
    let values = sorted_finite(
        table
            .rows
            .iter()
            .zip(table.column(column))
            .filter(|(row, _)| row.width.is_some())
            .map(|(_, value)| value),
    );

    let positive = values.iter().filter(|v| **v > 0.0).count();
    if positive == 0 || !has_spread(&values) {
        log::debug!("Not clipping {column}: no spread in {} values", values.len());
        return None;
    }

    if let Some(threshold) = min_positive_fraction {
        #[allow(clippy::cast_precision_loss)]
        let fraction = positive as f64 / values.len() as f64;
        if fraction <= threshold {
            log::debug!(
                "Not clipping {column}: only {:.3}% of segments are positive",
                fraction * 100.0
            );
            return None;
        }
    }

    let bounds = ClipBounds {
        lower: quantile(&values, lower_q)?,
        upper: quantile(&values, upper_q)?,
    };
    if bounds.lower > bounds.upper {
        log::warn!("Not clipping {column}: quantiles ({lower_q}, {upper_q}) are reversed");
        return None;
    }
    Some(bounds)
}

/// Clips every column to the bounds in `report`. Degenerate rows are left
/// untouched.
#[must_use]
pub fn apply_bounds(mut table: AggregateTable, report: &NormalizationReport) -> AggregateTable {
    for (column, bounds) in &report.bounds {
        let Some(bounds) = bounds else {
            continue;
        };
        for row in table.rows.iter_mut().filter(|r| r.width.is_some()) {
            let value = match column {
                CrowdednessColumn::Overall => &mut row.crowdedness,
                CrowdednessColumn::Hour(h) => &mut row.hourly_crowdedness[usize::from(*h)],
            };
            *value = bounds.clip(*value);
        }
    }
    table
}

/// Width-normalizes the table and clips each column to its own bounds.
#[must_use]
pub fn normalize(
    table: AggregateTable,
    options: &NormalizeOptions,
) -> (AggregateTable, NormalizationReport) {
    let table = width_normalize(table);
    let report = clip_bounds(&table, options);

    let skipped = report.skipped().count();
    log::info!(
        "Clipping {} of {} crowdedness columns",
        report.bounds.len() - skipped,
        report.bounds.len()
    );

    (apply_bounds(table, &report), report)
}

#[cfg(test)]
mod tests {
    use sidewalk_crowd_aggregate_models::AggregateRow;

    use super::*;

    fn row(id: u32, width: Option<f64>, mean: f64) -> AggregateRow {
        let mut row = AggregateRow::zeroed(id.to_string().as_str().into(), String::new(), width);
        row.mean_counts[0] = mean;
        row
    }

    /// 1000 rows with widths of 1 and primary means 0..1000.
    fn spread_table() -> AggregateTable {
        AggregateTable::new((0..1000).map(|i| row(i, Some(1.0), f64::from(i))).collect())
    }

    #[test]
    fn divides_by_width() {
        let table = width_normalize(AggregateTable::new(vec![row(0, Some(2.0), 10.0)]));
        assert!((table.rows[0].crowdedness - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn degenerate_rows_stay_zero() {
        let table = AggregateTable::new(vec![row(0, None, 10.0), row(1, Some(1.0), 3.0)]);
        let (table, _) = normalize(table, &NormalizeOptions::default());
        assert!(table.rows[0].crowdedness.abs() < f64::EPSILON);
    }

    #[test]
    fn clips_overall_to_its_percentiles() {
        let (table, report) = normalize(spread_table(), &NormalizeOptions::default());
        let bounds = report.bounds[&CrowdednessColumn::Overall].unwrap();

        assert!((bounds.lower - 9.99).abs() < 1e-9);
        assert!((bounds.upper - 989.01).abs() < 1e-9);
        assert!((table.rows[0].crowdedness - 9.99).abs() < 1e-9);
        assert!((table.rows[999].crowdedness - 989.01).abs() < 1e-9);
        assert!((table.rows[500].crowdedness - 500.0).abs() < 1e-9);
    }

    #[test]
    fn clipping_is_idempotent() {
        let options = NormalizeOptions::default();
        let normalized = width_normalize(spread_table());
        let report = clip_bounds(&normalized, &options);

        let once = apply_bounds(normalized, &report);
        let twice = apply_bounds(once.clone(), &report);
        assert_eq!(once, twice);
    }

    #[test]
    fn sparse_hours_are_not_clipped() {
        let mut table = spread_table();
        // Hour 3: 5 of 1000 positive (0.5%). Hour 4: 50 of 1000 positive.
        for (i, row) in (0_u32..).zip(table.rows.iter_mut()) {
            if i < 5 {
                row.hourly_mean_counts[3] = 100.0;
            }
            if i < 50 {
                row.hourly_mean_counts[4] = 1.0 + f64::from(i);
            }
        }

        let (table, report) = normalize(table, &NormalizeOptions::default());

        assert_eq!(report.bounds[&CrowdednessColumn::Hour(3)], None);
        assert!((table.rows[0].hourly_crowdedness[3] - 100.0).abs() < f64::EPSILON);

        let hour4 = report.bounds[&CrowdednessColumn::Hour(4)].unwrap();
        assert!(hour4.lower.abs() < f64::EPSILON);
        assert!(hour4.upper < 50.0);
        assert!((table.rows[49].hourly_crowdedness[4] - hour4.upper).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_hours_stay_zero_and_unclipped() {
        let (table, report) = normalize(spread_table(), &NormalizeOptions::default());

        for hour in 0..24_u8 {
            assert_eq!(report.bounds[&CrowdednessColumn::Hour(hour)], None);
        }
        assert!(
            table
                .rows
                .iter()
                .all(|r| r.hourly_crowdedness.iter().all(|v| *v == 0.0))
        );
        assert_eq!(report.skipped().count(), 24);
    }

    #[test]
    fn columns_do_not_share_bounds() {
        let mut table = spread_table();
        for (i, row) in (0_u32..).zip(table.rows.iter_mut()) {
            row.hourly_mean_counts[8] = f64::from(i) * 10.0;
        }

        let (_, report) = normalize(table, &NormalizeOptions::default());
        let overall = report.bounds[&CrowdednessColumn::Overall].unwrap();
        let hour8 = report.bounds[&CrowdednessColumn::Hour(8)].unwrap();
        assert!(hour8.upper > overall.upper * 5.0);
    }

    #[test]
    fn reversed_quantiles_leave_columns_unclipped() {
        let options = NormalizeOptions {
            overall_quantiles: (0.99, 0.01),
            ..NormalizeOptions::default()
        };
        let (table, report) = normalize(spread_table(), &options);

        assert_eq!(report.bounds[&CrowdednessColumn::Overall], None);
        assert!((table.rows[999].crowdedness - 999.0).abs() < f64::EPSILON);

        let reversed = ClipBounds {
            lower: 5.0,
            upper: 1.0,
        };
        assert!((reversed.clip(3.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn constant_overall_column_is_not_clipped() {
        let table = AggregateTable::new((0..10).map(|i| row(i, Some(1.0), 3.0)).collect());
        let (_, report) = normalize(table, &NormalizeOptions::default());
        assert_eq!(report.bounds[&CrowdednessColumn::Overall], None);
    }
}
