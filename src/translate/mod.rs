pub mod exposition;
pub mod series;

pub use exposition::render;
pub use series::translate_matrix;

use crate::planner::SeriesKind;
use crate::source::Labels;

/// Internal marker label that is never forwarded.
pub const ROLLUP_LABEL: &str = "__rollup__";

/// One point ready for a sink. `value` is never NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// A named, typed, labelled series owned by one harvest cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedSeries {
    pub name: String,
    pub kind: SeriesKind,
    pub labels: Labels,
    /// Time-ascending.
    pub points: Vec<SeriesPoint>,
}
