use super::{SeriesPoint, TranslatedSeries, ROLLUP_LABEL};
use crate::planner::QuerySpec;
use crate::source::{Matrix, SamplePair};

/// Turn every row of a range result into a series named after `spec`.
pub fn translate_matrix(spec: &QuerySpec, matrix: Matrix) -> Vec<TranslatedSeries> {
    matrix
        .into_iter()
        .map(|stream| {
            let mut labels = stream.metric;
            labels.remove(ROLLUP_LABEL);

            let mut points: Vec<SeriesPoint> =
                stream.values.iter().map(to_point).collect();
            // Stable, so equal timestamps keep source order.
            points.sort_by_key(|p| p.timestamp);

            TranslatedSeries {
                name: spec.output_name.clone(),
                kind: spec.kind,
                labels,
                points,
            }
        })
        .collect()
}

fn to_point(pair: &SamplePair) -> SeriesPoint {
    SeriesPoint {
        timestamp: pair.timestamp.trunc() as i64,
        value: if pair.value.is_nan() { 0.0 } else { pair.value },
    }
}
