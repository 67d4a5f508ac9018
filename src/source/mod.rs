pub mod client;

pub use client::{PromClient, PromConfig};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::planner::QueryWindow;

/// Label name → label value. Ordered so rendering is deterministic.
pub type Labels = BTreeMap<String, String>;

/// One `(timestamp, value)` pair as returned by the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePair {
    /// Seconds since the epoch, possibly fractional.
    pub timestamp: f64,
    pub value: f64,
}

/// A single labelled series of a range query result.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStream {
    pub metric: Labels,
    pub values: Vec<SamplePair>,
}

/// A single labelled sample of an instant query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Labels,
    pub value: SamplePair,
}

pub type Matrix = Vec<SampleStream>;
pub type Vector = Vec<Sample>;

/// The typed payload of a query response.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Matrix(Matrix),
    Vector(Vector),
    Scalar(SamplePair),
    String(String),
}

impl QueryValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Matrix(_) => "matrix",
            Self::Vector(_) => "vector",
            Self::Scalar(_) => "scalar",
            Self::String(_) => "string",
        }
    }
}

/// Query payload plus any non-fatal warnings the source attached.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub value: QueryValue,
    pub warnings: Vec<String>,
}

impl QueryResult {
    pub fn new(value: QueryValue) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }
}

/// Read access to a pull-based time-series query API.
#[async_trait]
pub trait Querier: Send + Sync {
    /// Every metric name the source knows about.
    async fn metric_names(&self) -> Result<Vec<String>>;

    /// Evaluate `query` over `window`.
    async fn query_range(
        &self,
        query: &str,
        window: &QueryWindow,
    ) -> Result<QueryResult>;

    /// Evaluate `query` at the instant `at`.
    async fn query_instant(
        &self,
        query: &str,
        at: DateTime<Utc>,
    ) -> Result<QueryResult>;
}
