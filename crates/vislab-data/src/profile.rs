//! Profiling of a generic EHR table: sparse-column removal, numeric feature
//! extraction and the k-means elbow curve.

use serde::Serialize;
use tracing::{debug, info};

use crate::reader::RawTable;

// ── Column filtering ──────────────────────────────────────────────────────────

/// Shape of a table before and after [`drop_sparse_columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnProfile {
    pub rows: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    pub dropped: Vec<String>,
}

/// Keep only columns with at least `ceil(rows * min_fraction)` non-missing
/// values. Returns the reduced copy and a profile of what was removed.
pub fn drop_sparse_columns(table: &RawTable, min_fraction: f64) -> (RawTable, ColumnProfile) {
    let threshold = (table.len() as f64 * min_fraction).ceil() as usize;
    let keep: Vec<usize> = (0..table.headers.len())
        .filter(|&c| table.non_missing(c) >= threshold)
        .collect();
    let dropped = (0..table.headers.len())
        .filter(|c| !keep.contains(c))
        .map(|c| table.headers[c].clone())
        .collect();

    let headers = keep.iter().map(|&c| table.headers[c].clone()).collect();
    let rows = table
        .rows
        .iter()
        .map(|row| keep.iter().map(|&c| row[c].clone()).collect())
        .collect();

    let profile = ColumnProfile {
        rows: table.len(),
        columns_before: table.headers.len(),
        columns_after: keep.len(),
        dropped,
    };
    info!(
        "Kept {} of {} columns (threshold {} non-missing values)",
        profile.columns_after, profile.columns_before, threshold
    );
    (RawTable::new(headers, rows), profile)
}

// ── Numeric features ──────────────────────────────────────────────────────────

/// Row-major numeric matrix with column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Numeric columns of `table` (every present cell parses as a number and at
/// least one is present); missing cells are replaced by the column mean.
pub fn numerical_features(table: &RawTable) -> FeatureMatrix {
    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for (c, name) in table.headers.iter().enumerate() {
        let parsed = table.numeric_column(c);
        let present = table.non_missing(c);
        let numeric = parsed.iter().filter(|v| v.is_some()).count();
        if present == 0 || numeric != present {
            continue;
        }
        let mean = parsed.iter().flatten().sum::<f64>() / numeric as f64;
        columns.push(parsed.into_iter().map(|v| v.unwrap_or(mean)).collect());
        names.push(name.clone());
    }

    let rows = (0..table.len())
        .map(|r| columns.iter().map(|col| col[r]).collect())
        .collect();
    debug!("Extracted {} numeric features", names.len());
    FeatureMatrix { names, rows }
}

// ── K-means elbow ─────────────────────────────────────────────────────────────

const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-8;

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Deterministic farthest-point initialisation: the first centroid is the
/// first row, each next one the row farthest from its nearest centroid.
fn initialize_centroids(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[0].clone()];
    while centroids.len() < k {
        let (idx, _) = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let nearest = centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min);
                (i, nearest)
            })
            .fold((0, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        centroids.push(points[idx].clone());
    }
    centroids
}

/// Lloyd's k-means; returns the inertia (sum of squared distances of each
/// point to its centroid).
pub fn kmeans_inertia(points: &[Vec<f64>], k: usize) -> f64 {
    if points.is_empty() || k == 0 {
        return 0.0;
    }
    let k = k.min(points.len());
    let dims = points[0].len();
    let mut centroids = initialize_centroids(points, k);
    let mut labels = vec![0usize; points.len()];
    let mut prev_inertia = f64::INFINITY;

    for _ in 0..MAX_ITER {
        let mut inertia = 0.0;
        for (i, p) in points.iter().enumerate() {
            let (nearest, dist) = centroids
                .iter()
                .enumerate()
                .map(|(j, c)| (j, squared_distance(p, c)))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best });
            labels[i] = nearest;
            inertia += dist;
        }

        if (prev_inertia - inertia).abs() <= TOLERANCE * inertia.max(1.0) {
            return inertia;
        }
        prev_inertia = inertia;

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in points.iter().zip(&labels) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }
        for (j, centroid) in centroids.iter_mut().enumerate() {
            // An empty cluster keeps its previous centroid.
            if counts[j] > 0 {
                for (c, s) in centroid.iter_mut().zip(&sums[j]) {
                    *c = s / counts[j] as f64;
                }
            }
        }
    }
    prev_inertia
}

/// Inertia for k = 1..=`k_max`.
pub fn elbow_method(features: &FeatureMatrix, k_max: usize) -> Vec<f64> {
    (1..=k_max)
        .map(|k| {
            let inertia = kmeans_inertia(&features.rows, k);
            debug!("k={} inertia={:.3}", k, inertia);
            inertia
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
