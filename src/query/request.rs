//! Query request and option types
//!
//! A [`QueryRequest`] says *what* to read (metric, sources) and *how* to
//! combine it (downsampler, source aggregator, derivative).
//! [`QueryOptions`] says *where* (resolution and time window) and at what
//! output granularity.

use crate::query::cursor::Extractor;
use crate::query::downsample::Downsampler;
use crate::query::error::{QueryError, QueryResult};
use crate::query::interpolate::Derivative;
use crate::types::Resolution;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregation function selector
///
/// Used both as the downsample selector (reducing samples within a source)
/// and as the source aggregator (combining sources at one offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Sum
    Sum,
    /// Mean
    #[default]
    Avg,
    /// Maximum
    Max,
    /// Minimum
    Min,
}

impl Aggregator {
    /// Per-sample extractor matching this selector
    pub fn extractor(self) -> Extractor {
        match self {
            Aggregator::Sum => Extractor::Summation,
            Aggregator::Avg => Extractor::Average,
            Aggregator::Max => Extractor::Maximum,
            Aggregator::Min => Extractor::Minimum,
        }
    }

    /// Bucket reducer matching this selector
    pub fn downsampler(self) -> Downsampler {
        match self {
            Aggregator::Sum => Downsampler::Sum,
            Aggregator::Avg => Downsampler::Avg,
            Aggregator::Max => Downsampler::Max,
            Aggregator::Min => Downsampler::Min,
        }
    }
}

impl FromStr for Aggregator {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregator::Sum),
            "avg" => Ok(Aggregator::Avg),
            "max" => Ok(Aggregator::Max),
            "min" => Ok(Aggregator::Min),
            other => Err(QueryError::validation(format!(
                "unknown aggregator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregator::Sum => write!(f, "sum"),
            Aggregator::Avg => write!(f, "avg"),
            Aggregator::Max => write!(f, "max"),
            Aggregator::Min => write!(f, "min"),
        }
    }
}

/// What to query and how to combine it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Metric name
    pub name: String,

    /// Explicit sources; empty means every source of the metric
    #[serde(default)]
    pub sources: Vec<String>,

    /// Reducer applied within each source when downsampling
    #[serde(default)]
    pub downsampler: Aggregator,

    /// Aggregator applied across sources
    #[serde(default = "default_source_aggregator")]
    pub source_aggregator: Aggregator,

    /// Rate conversion
    #[serde(default)]
    pub derivative: Derivative,
}

fn default_source_aggregator() -> Aggregator {
    Aggregator::Sum
}

impl QueryRequest {
    /// Create a request for every source of `name` with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            downsampler: Aggregator::Avg,
            source_aggregator: default_source_aggregator(),
            derivative: Derivative::None,
        }
    }

    /// Restrict the query to the given sources
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the downsample reducer
    pub fn with_downsampler(mut self, downsampler: Aggregator) -> Self {
        self.downsampler = downsampler;
        self
    }

    /// Set the cross-source aggregator
    pub fn with_source_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.source_aggregator = aggregator;
        self
    }

    /// Set the derivative mode
    pub fn with_derivative(mut self, derivative: Derivative) -> Self {
        self.derivative = derivative;
        self
    }
}

/// Resolution, time window and output granularity of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Stored resolution to read
    pub resolution: Resolution,
    /// Output sample duration; a positive multiple of the resolution's
    pub sample_duration_nanos: i64,
    /// Inclusive start of the window
    pub start_nanos: i64,
    /// Inclusive end of the window
    pub end_nanos: i64,
    /// Largest gap that is still interpolated across; zero disables the limit
    pub interpolation_limit_nanos: i64,
}

impl QueryOptions {
    /// Options reading `resolution` at its native sample duration
    pub fn new(resolution: Resolution, start_nanos: i64, end_nanos: i64) -> Self {
        Self {
            resolution,
            sample_duration_nanos: resolution.sample_duration_nanos(),
            start_nanos,
            end_nanos,
            interpolation_limit_nanos: 0,
        }
    }

    /// Downsample output to `sample_duration_nanos`
    pub fn with_sample_duration(mut self, sample_duration_nanos: i64) -> Self {
        self.sample_duration_nanos = sample_duration_nanos;
        self
    }

    /// Limit interpolation to gaps of at most `limit_nanos`
    pub fn with_interpolation_limit(mut self, limit_nanos: i64) -> Self {
        self.interpolation_limit_nanos = limit_nanos;
        self
    }

    /// Check the output sample duration against the resolution
    ///
    /// # Errors
    ///
    /// Returns a validation error if the sample duration is shorter than,
    /// or not a multiple of, the resolution's native sample duration, or if
    /// the interpolation limit is negative, or if the range is too close to
    /// the ends of the `i64` timestamp domain to be aligned and measured.
    pub fn validate(&self) -> QueryResult<()> {
        let native = self.resolution.sample_duration_nanos();
        if self.sample_duration_nanos < native {
            return Err(QueryError::validation(format!(
                "sample duration {} is shorter than resolution {} sample duration {}",
                self.sample_duration_nanos, self.resolution, native
            )));
        }
        if self.sample_duration_nanos % native != 0 {
            return Err(QueryError::validation(format!(
                "sample duration {} is not a multiple of resolution {} sample duration {}",
                self.sample_duration_nanos, self.resolution, native
            )));
        }
        if self.interpolation_limit_nanos < 0 {
            return Err(QueryError::validation(format!(
                "interpolation limit {} is negative",
                self.interpolation_limit_nanos
            )));
        }
        let aligned_start = self
            .start_nanos
            .checked_sub(self.start_nanos.rem_euclid(self.sample_duration_nanos));
        if aligned_start.is_none() || self.end_nanos.checked_sub(self.start_nanos).is_none() {
            return Err(QueryError::validation(format!(
                "time range [{}, {}] is out of range",
                self.start_nanos, self.end_nanos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::error::QueryErrorKind;

    #[test]
    fn test_aggregator_parse() {
        assert_eq!("SUM".parse::<Aggregator>().unwrap(), Aggregator::Sum);
        assert_eq!("min".parse::<Aggregator>().unwrap(), Aggregator::Min);
        let err = "median".parse::<Aggregator>().unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);
    }

    #[test]
    fn test_aggregator_selects_matching_functions() {
        assert_eq!(Aggregator::Max.extractor(), Extractor::Maximum);
        assert_eq!(Aggregator::Max.downsampler(), Downsampler::Max);
        assert_eq!(Aggregator::Avg.extractor(), Extractor::Average);
    }

    #[test]
    fn test_validate_sample_duration() {
        let r = Resolution::TenSeconds;
        let native = r.sample_duration_nanos();

        assert!(QueryOptions::new(r, 0, 1).validate().is_ok());
        assert!(QueryOptions::new(r, 0, 1)
            .with_sample_duration(native * 6)
            .validate()
            .is_ok());

        let err = QueryOptions::new(r, 0, 1)
            .with_sample_duration(native / 2)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);

        let err = QueryOptions::new(r, 0, 1)
            .with_sample_duration(native * 3 / 2)
            .validate()
            .unwrap_err();
        assert!(err.message.contains("multiple"));
    }

    #[test]
    fn test_validate_extreme_range() {
        let r = Resolution::TenSeconds;

        let err = QueryOptions::new(r, i64::MIN + 1, 100).validate().unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);
        assert!(err.message.contains("out of range"));

        let err = QueryOptions::new(r, -10, i64::MAX).validate().unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ValidationError);

        // The whole non-negative domain is still queryable
        assert!(QueryOptions::new(r, 0, i64::MAX).validate().is_ok());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: QueryRequest = toml::from_str(
            r#"
            name = "cpu.user"
            source_aggregator = "max"
            derivative = "non_negative_derivative"
            "#,
        )
        .unwrap();
        assert_eq!(req.name, "cpu.user");
        assert!(req.sources.is_empty());
        assert_eq!(req.downsampler, Aggregator::Avg);
        assert_eq!(req.source_aggregator, Aggregator::Max);
        assert_eq!(req.derivative, Derivative::NonNegativeDerivative);
    }
}
