// evaluation.rs — accuracy, precision and jitter of recorded position runs
//
// Pure computation layer over session logs. A run is a sequence of positions
// taken while the device rests at a surveyed reference point:
//   accuracy  = distances to the reference point
//   precision = distances to the run's own centroid
//   jitter    = mean absolute change of the distance-to-reference series
// Raw fixes and filtered estimates of the same run are scored side by side.

use serde::{Deserialize, Serialize};

use crate::error::{PResult, PositioningError};
use crate::session_log::SessionRecord;
use crate::types::LocationData;

pub fn distance_2d(a: &LocationData, b: &LocationData) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

pub fn distance_3d(a: &LocationData, b: &LocationData) -> f64 {
    (a.as_vector() - b.as_vector()).norm()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

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

/// Population standard deviation (divides by n).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub fn rmse(errors: &[f64]) -> Option<f64> {
    let squares: Vec<f64> = errors.iter().map(|e| e * e).collect();
    mean(&squares).map(f64::sqrt)
}

pub fn centroid(points: &[LocationData]) -> Option<LocationData> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sum = points
        .iter()
        .fold(LocationData::new(0.0, 0.0, 0.0), |acc, p| {
            LocationData::new(acc.x + p.x, acc.y + p.y, acc.z + p.z)
        });
    Some(LocationData::new(sum.x / n, sum.y / n, sum.z / n))
}

/// Mean absolute difference between consecutive values. Zero for fewer than
/// two values.
pub fn mean_abs_step(series: &[f64]) -> f64 {
    let steps: Vec<f64> = series.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    mean(&steps).unwrap_or(0.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: mean(values)?,
            median: median(values)?,
            std: std_dev(values)?,
        })
    }
}

/// Signed per-axis offsets (`measurement - reference`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisStats {
    pub x: SeriesStats,
    pub y: SeriesStats,
    pub z: SeriesStats,
}

impl AxisStats {
    pub fn from_offsets(offsets: &[Vec<f64>; 3]) -> Option<Self> {
        Some(Self {
            x: SeriesStats::from_values(&offsets[0])?,
            y: SeriesStats::from_values(&offsets[1])?,
            z: SeriesStats::from_values(&offsets[2])?,
        })
    }
}

/// Per-axis `point - origin`, one vector per axis.
fn axis_offsets(points: &[LocationData], origin: &LocationData) -> [Vec<f64>; 3] {
    [
        points.iter().map(|p| p.x - origin.x).collect(),
        points.iter().map(|p| p.y - origin.y).collect(),
        points.iter().map(|p| p.z - origin.z).collect(),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionEvaluation {
    pub count: usize,
    pub centroid: LocationData,

    pub accuracy_2d: SeriesStats,
    pub accuracy_3d: SeriesStats,
    pub axis_accuracy: AxisStats,

    pub precision_2d: SeriesStats,
    pub precision_3d: SeriesStats,
    pub axis_precision: AxisStats,

    pub centroid_to_reference_2d: f64,
    pub centroid_to_reference_3d: f64,

    pub jitter_2d: f64,
    pub jitter_3d: f64,

    pub rmse_2d: f64,
    pub rmse_3d: f64,
}

pub fn evaluate_positions(points: &[LocationData], reference: &LocationData) -> PResult<PositionEvaluation> {
    let empty = || PositioningError::InvalidParameters("no positions to evaluate".to_string());
    if points.iter().any(|p| !p.is_finite()) || !reference.is_finite() {
        return Err(PositioningError::InvalidParameters(
            "positions must be finite".to_string(),
        ));
    }

    let center = centroid(points).ok_or_else(empty)?;
    let to_ref_2d: Vec<f64> = points.iter().map(|p| distance_2d(p, reference)).collect();
    let to_ref_3d: Vec<f64> = points.iter().map(|p| distance_3d(p, reference)).collect();
    let to_center_2d: Vec<f64> = points.iter().map(|p| distance_2d(p, &center)).collect();
    let to_center_3d: Vec<f64> = points.iter().map(|p| distance_3d(p, &center)).collect();

    Ok(PositionEvaluation {
        count: points.len(),
        centroid: center,
        accuracy_2d: SeriesStats::from_values(&to_ref_2d).ok_or_else(empty)?,
        accuracy_3d: SeriesStats::from_values(&to_ref_3d).ok_or_else(empty)?,
        axis_accuracy: AxisStats::from_offsets(&axis_offsets(points, reference)).ok_or_else(empty)?,
        precision_2d: SeriesStats::from_values(&to_center_2d).ok_or_else(empty)?,
        precision_3d: SeriesStats::from_values(&to_center_3d).ok_or_else(empty)?,
        axis_precision: AxisStats::from_offsets(&axis_offsets(points, &center)).ok_or_else(empty)?,
        centroid_to_reference_2d: distance_2d(&center, reference),
        centroid_to_reference_3d: distance_3d(&center, reference),
        jitter_2d: mean_abs_step(&to_ref_2d),
        jitter_3d: mean_abs_step(&to_ref_3d),
        rmse_2d: rmse(&to_ref_2d).ok_or_else(empty)?,
        rmse_3d: rmse(&to_ref_3d).ok_or_else(empty)?,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvaluation {
    pub reference: LocationData,
    pub raw: PositionEvaluation,
    pub filtered: PositionEvaluation,
}

impl SessionEvaluation {
    /// Positive when filtering moved the estimates closer to the reference.
    pub fn accuracy_gain_3d(&self) -> f64 {
        self.raw.accuracy_3d.mean - self.filtered.accuracy_3d.mean
    }

    /// Positive when filtering reduced the step-to-step jitter.
    pub fn jitter_reduction_3d(&self) -> f64 {
        self.raw.jitter_3d - self.filtered.jitter_3d
    }
}

fn split(records: &[SessionRecord]) -> (Vec<LocationData>, Vec<LocationData>) {
    records.iter().map(|r| (r.raw, r.filtered)).unzip()
}

pub fn evaluate_session(records: &[SessionRecord], reference: &LocationData) -> PResult<SessionEvaluation> {
    let (raw, filtered) = split(records);
    Ok(SessionEvaluation {
        reference: *reference,
        raw: evaluate_positions(&raw, reference)?,
        filtered: evaluate_positions(&filtered, reference)?,
    })
}

/// Distance statistics across runs. `mean` and `median` are taken over the
/// per-run mean distances; `std` is the mean of the per-run standard
/// deviations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

impl RunStats {
    fn from_runs(runs: &[SeriesStats]) -> Option<Self> {
        let means: Vec<f64> = runs.iter().map(|r| r.mean).collect();
        let stds: Vec<f64> = runs.iter().map(|r| r.std).collect();
        Some(Self {
            mean: mean(&means)?,
            median: median(&means)?,
            std: mean(&stds)?,
        })
    }
}

/// Run centroids grouped by the reference point they were recorded at.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCentroid {
    pub reference: LocationData,
    pub runs: usize,
    /// Mean of the run centroids.
    pub centroid: LocationData,
}

/// Cross-run report for one position source (raw fixes or filtered output).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceAggregate {
    pub accuracy_2d: RunStats,
    pub accuracy_3d: RunStats,
    /// Offsets of every point to its reference, pooled across runs.
    pub axis_accuracy: AxisStats,

    pub precision_2d: RunStats,
    pub precision_3d: RunStats,
    /// Offsets of every point to its run's centroid, pooled across runs.
    pub axis_precision: AxisStats,

    /// Statistics of the per-run jitter values.
    pub jitter_2d: SeriesStats,
    pub jitter_3d: SeriesStats,

    pub reference_centroids: Vec<ReferenceCentroid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateEvaluation {
    pub sessions: usize,
    pub raw: SourceAggregate,
    pub filtered: SourceAggregate,
}

#[derive(Default)]
struct SourceAccumulator {
    runs: Vec<PositionEvaluation>,
    reference_offsets: [Vec<f64>; 3],
    centroid_offsets: [Vec<f64>; 3],
    centroids: Vec<(LocationData, Vec<LocationData>)>,
}

impl SourceAccumulator {
    fn add(&mut self, points: &[LocationData], reference: &LocationData, evaluation: PositionEvaluation) {
        let to_reference = axis_offsets(points, reference);
        let to_centroid = axis_offsets(points, &evaluation.centroid);
        for axis in 0..3 {
            self.reference_offsets[axis].extend_from_slice(&to_reference[axis]);
            self.centroid_offsets[axis].extend_from_slice(&to_centroid[axis]);
        }

        match self.centroids.iter_mut().find(|entry| entry.0 == *reference) {
            Some(entry) => entry.1.push(evaluation.centroid),
            None => self.centroids.push((*reference, vec![evaluation.centroid])),
        }
        self.runs.push(evaluation);
    }

    fn finish(&self) -> Option<SourceAggregate> {
        let runs = |f: fn(&PositionEvaluation) -> SeriesStats| -> Option<RunStats> {
            let stats: Vec<SeriesStats> = self.runs.iter().map(f).collect();
            RunStats::from_runs(&stats)
        };
        let series = |f: fn(&PositionEvaluation) -> f64| -> Option<SeriesStats> {
            let values: Vec<f64> = self.runs.iter().map(f).collect();
            SeriesStats::from_values(&values)
        };

        let reference_centroids = self
            .centroids
            .iter()
            .map(|(reference, group)| {
                Some(ReferenceCentroid {
                    reference: *reference,
                    runs: group.len(),
                    centroid: centroid(group)?,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(SourceAggregate {
            accuracy_2d: runs(|e| e.accuracy_2d)?,
            accuracy_3d: runs(|e| e.accuracy_3d)?,
            axis_accuracy: AxisStats::from_offsets(&self.reference_offsets)?,
            precision_2d: runs(|e| e.precision_2d)?,
            precision_3d: runs(|e| e.precision_3d)?,
            axis_precision: AxisStats::from_offsets(&self.centroid_offsets)?,
            jitter_2d: series(|e| e.jitter_2d)?,
            jitter_3d: series(|e| e.jitter_3d)?,
            reference_centroids,
        })
    }
}

/// Folds evaluated runs into a cross-run report.
#[derive(Default)]
pub struct EvaluationAccumulator {
    raw: SourceAccumulator,
    filtered: SourceAccumulator,
}

impl EvaluationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one run and keep it for the aggregate. A run that fails to
    /// evaluate is not added.
    pub fn add_session(
        &mut self,
        records: &[SessionRecord],
        reference: &LocationData,
    ) -> PResult<SessionEvaluation> {
        let evaluation = evaluate_session(records, reference)?;
        let (raw, filtered) = split(records);
        self.raw.add(&raw, reference, evaluation.raw);
        self.filtered.add(&filtered, reference, evaluation.filtered);
        Ok(evaluation)
    }

    pub fn sessions(&self) -> usize {
        self.raw.runs.len()
    }

    pub fn finish(&self) -> PResult<AggregateEvaluation> {
        let empty = || PositioningError::InvalidParameters("no sessions to aggregate".to_string());
        Ok(AggregateEvaluation {
            sessions: self.sessions(),
            raw: self.raw.finish().ok_or_else(empty)?,
            filtered: self.filtered.finish().ok_or_else(empty)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(x: f64, y: f64, z: f64) -> LocationData {
        LocationData::new(x, y, z)
    }

    #[test]
    fn test_distances() {
        let a = p(0.0, 0.0, 0.0);
        let b = p(3.0, 4.0, 12.0);
        assert_abs_diff_eq!(distance_2d(&a, &b), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(distance_3d(&a, &b), 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_basic_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(mean(&values).unwrap(), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(std_dev(&values).unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(median(&values).unwrap(), 4.5, epsilon = 1e-12);
        assert_abs_diff_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rmse(&[3.0, -4.0]).unwrap(), (12.5f64).sqrt(), epsilon = 1e-12);

        assert!(mean(&[]).is_none());
        assert!(std_dev(&[]).is_none());
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn test_jitter_is_mean_absolute_step() {
        assert_abs_diff_eq!(mean_abs_step(&[1.0, 3.0, 2.0, 2.0]), 1.0, epsilon = 1e-12);
        assert_eq!(mean_abs_step(&[1.0]), 0.0);
    }

    #[test]
    fn test_symmetric_cloud_around_reference() {
        let reference = p(1.0, 1.0, 1.0);
        let points = [p(2.0, 1.0, 1.0), p(0.0, 1.0, 1.0), p(1.0, 2.0, 1.0), p(1.0, 0.0, 1.0)];
        let eval = evaluate_positions(&points, &reference).unwrap();

        assert_eq!(eval.count, 4);
        assert_abs_diff_eq!(eval.centroid.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.centroid.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.centroid_to_reference_3d, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.accuracy_3d.mean, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.accuracy_3d.std, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.precision_2d.mean, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.rmse_3d, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.jitter_3d, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.axis_accuracy.x.mean, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_biased_run_separates_accuracy_from_precision() {
        // Tight cluster half a metre east of the reference.
        let reference = p(0.0, 0.0, 0.0);
        let points = [p(0.5, 0.0, 0.0), p(0.5, 0.0, 0.0), p(0.5, 0.0, 0.0)];
        let eval = evaluate_positions(&points, &reference).unwrap();

        assert_abs_diff_eq!(eval.accuracy_2d.mean, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.axis_accuracy.x.mean, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.precision_3d.mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.centroid_to_reference_2d, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_session_compares_raw_and_filtered() {
        let reference = p(0.0, 0.0, 0.0);
        let records: Vec<SessionRecord> = [0.4, -0.4, 0.4, -0.4]
            .iter()
            .map(|&dx| SessionRecord { raw: p(dx, 0.0, 0.0), filtered: p(dx / 4.0, 0.0, 0.0) })
            .collect();

        let eval = evaluate_session(&records, &reference).unwrap();
        assert_abs_diff_eq!(eval.raw.accuracy_3d.mean, 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.filtered.accuracy_3d.mean, 0.1, epsilon = 1e-12);
        assert!(eval.accuracy_gain_3d() > 0.0);
        // Distances are constant, only the sign flips.
        assert_abs_diff_eq!(eval.jitter_reduction_3d(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval.raw.precision_3d.mean, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_input_rejected() {
        let reference = p(0.0, 0.0, 0.0);
        assert!(matches!(
            evaluate_session(&[], &reference),
            Err(PositioningError::InvalidParameters(_))
        ));
        assert!(matches!(
            EvaluationAccumulator::new().finish(),
            Err(PositioningError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_non_finite_positions_rejected() {
        let result = evaluate_positions(&[p(f64::NAN, 0.0, 0.0)], &p(0.0, 0.0, 0.0));
        assert!(matches!(result, Err(PositioningError::InvalidParameters(_))));
    }

    fn runs_at(reference: LocationData, points: &[LocationData]) -> Vec<SessionRecord> {
        points.iter().map(|&raw| SessionRecord { raw, filtered: reference }).collect()
    }

    fn three_runs() -> EvaluationAccumulator {
        let origin = p(0.0, 0.0, 0.0);
        let east = p(5.0, 0.0, 0.0);
        let mut acc = EvaluationAccumulator::new();
        acc.add_session(&runs_at(origin, &[p(1.0, 0.0, 0.0), p(3.0, 0.0, 0.0)]), &origin).unwrap();
        acc.add_session(&runs_at(origin, &[p(2.0, 0.0, 0.0), p(2.0, 0.0, 0.0)]), &origin).unwrap();
        acc.add_session(&runs_at(east, &[p(5.0, 1.0, 0.0)]), &east).unwrap();
        acc
    }

    #[test]
    fn test_aggregate_std_is_mean_of_run_stds() {
        let agg = three_runs().finish().unwrap();
        assert_eq!(agg.sessions, 3);

        // Run means [2, 2, 1], run stds [1, 0, 0].
        for stats in [agg.raw.accuracy_3d, agg.raw.accuracy_2d] {
            assert_abs_diff_eq!(stats.mean, 5.0 / 3.0, epsilon = 1e-12);
            assert_abs_diff_eq!(stats.median, 2.0, epsilon = 1e-12);
            assert_abs_diff_eq!(stats.std, 1.0 / 3.0, epsilon = 1e-12);
        }

        // Distances to run centroids: [1, 1], [0, 0], [0].
        assert_abs_diff_eq!(agg.raw.precision_3d.mean, 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.precision_2d.median, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.precision_3d.std, 0.0, epsilon = 1e-12);

        assert_abs_diff_eq!(agg.filtered.accuracy_3d.mean, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_pools_axis_offsets() {
        let agg = three_runs().finish().unwrap();

        // x offsets to reference [1, 3, 2, 2, 0].
        assert_abs_diff_eq!(agg.raw.axis_accuracy.x.mean, 1.6, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.axis_accuracy.x.median, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.axis_accuracy.x.std, 1.04f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.axis_accuracy.y.mean, 0.2, epsilon = 1e-12);

        // x offsets to run centroids [-1, 1, 0, 0, 0].
        assert_abs_diff_eq!(agg.raw.axis_precision.x.mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.axis_precision.x.std, 0.4f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_jitter_over_runs() {
        let agg = three_runs().finish().unwrap();
        // Run jitters [2, 0, 0].
        assert_abs_diff_eq!(agg.raw.jitter_3d.mean, 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.jitter_3d.median, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.jitter_3d.std, (8.0f64 / 9.0).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(agg.raw.jitter_2d.mean, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_groups_centroids_by_reference() {
        let agg = three_runs().finish().unwrap();
        let groups = &agg.raw.reference_centroids;
        assert_eq!(groups.len(), 2);

        assert_eq!(groups[0].reference, p(0.0, 0.0, 0.0));
        assert_eq!(groups[0].runs, 2);
        assert_abs_diff_eq!(groups[0].centroid.x, 2.0, epsilon = 1e-12);

        assert_eq!(groups[1].reference, p(5.0, 0.0, 0.0));
        assert_eq!(groups[1].runs, 1);
        assert_abs_diff_eq!(groups[1].centroid.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_failed_run_not_accumulated() {
        let mut acc = three_runs();
        let origin = p(0.0, 0.0, 0.0);
        assert!(acc.add_session(&[], &origin).is_err());
        assert_eq!(acc.sessions(), 3);
    }
}
