//! Result table and JSON rows.

use rtstat_pipeline::{Analysis, RegionAnalysis};
use serde::Serialize;

/// One printed line of the result table.
///
/// Numeric fields are `None` for a region that selected no voxels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: String,
    pub name: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
    pub volume: usize,
}

impl Row {
    fn of(region: &RegionAnalysis) -> Self {
        let s = region.statistics().summary();
        Self {
            id: region.region().id().to_string(),
            name: region.region().name().to_string(),
            min: s.map(|s| s.min),
            max: s.map(|s| s.max),
            mean: s.map(|s| s.mean),
            std: s.map(|s| s.std),
            median: s.map(|s| s.median),
            volume: region.statistics().volume(),
        }
    }

    const fn has_data(&self) -> bool {
        self.min.is_some()
    }
}

/// One row per region, in analysis order.
#[must_use]
pub fn rows(analysis: &Analysis) -> Vec<Row> {
    analysis.regions.iter().map(Row::of).collect()
}

fn cell(value: Option<f64>, f: impl Fn(f64) -> String) -> String {
    value.map_or_else(|| "-".to_string(), f)
}

/// Min and max print as whole numbers, dropping the fraction.
fn whole(v: f64) -> String {
    // `trunc` leaves -0.0 for values in (-1, 0).
    format!("{:.0}", v.trunc() + 0.0)
}

/// Render `rows` as an aligned text table.
#[must_use]
pub fn table(rows: &[Row]) -> String {
    const HEADER: [&str; 8] = ["ID", "Name", "Min", "Max", "Mean", "Std", "Median", "Volume"];

    let mut cells: Vec<[String; 8]> = vec![HEADER.map(str::to_string)];
    for row in rows {
        cells.push([
            row.id.clone(),
            row.name.clone(),
            cell(row.min, whole),
            cell(row.max, whole),
            cell(row.mean, |v| format!("{v:.2}")),
            cell(row.std, |v| format!("{v:.2}")),
            cell(row.median, |v| format!("{v}")),
            if row.has_data() {
                row.volume.to_string()
            } else {
                "-".to_string()
            },
        ]);
    }

    let mut widths = [0_usize; 8];
    for line in &cells {
        for (w, c) in widths.iter_mut().zip(line) {
            *w = (*w).max(c.chars().count());
        }
    }

    cells
        .iter()
        .map(|line| {
            line.iter()
                .zip(widths)
                .enumerate()
                .map(|(i, (c, w))| {
                    // Id and name read left to right; numbers line up on the right.
                    if i < 2 {
                        format!("{c:<w$}")
                    } else {
                        format!("{c:>w$}")
                    }
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
