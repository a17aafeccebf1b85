//! # Series Specifications
//!
//! Aggregation functions evaluated inside a pivot. The id of a series is
//! derived once, when it is built, as `<type>(<field>)` unless the caller
//! supplied one; after that it never changes.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};

/// The aggregation a series computes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeriesFunction {
    /// Document count, or count of documents carrying `field`.
    Count {
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    Latest { field: String },
    Avg { field: String },
    Sum { field: String },
    Min { field: String },
    Max { field: String },
    Card { field: String },
    #[serde(rename = "stddev")]
    StdDev { field: String },
    Variance { field: String },
    Percentile { field: String, percentile: f64 },
}

impl SeriesFunction {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Latest { .. } => "latest",
            Self::Avg { .. } => "avg",
            Self::Sum { .. } => "sum",
            Self::Min { .. } => "min",
            Self::Max { .. } => "max",
            Self::Card { .. } => "card",
            Self::StdDev { .. } => "stddev",
            Self::Variance { .. } => "variance",
            Self::Percentile { .. } => "percentile",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Count { field } => field.as_deref(),
            Self::Latest { field }
            | Self::Avg { field }
            | Self::Sum { field }
            | Self::Min { field }
            | Self::Max { field }
            | Self::Card { field }
            | Self::StdDev { field }
            | Self::Variance { field }
            | Self::Percentile { field, .. } => Some(field),
        }
    }

    /// Human-readable form, also the default id.
    pub fn literal(&self) -> String {
        match self {
            Self::Percentile { field, percentile } => format!("percentile({},{})", field, percentile),
            other => format!("{}({})", other.type_name(), other.field().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct SeriesSpec {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(flatten)]
    function: SeriesFunction,
}

impl SeriesSpec {
    pub fn builder(type_name: &str) -> Result<SeriesBuilder> {
        SeriesBuilder::new(type_name)
    }

    pub fn count() -> SeriesBuilder {
        SeriesBuilder::of("count")
    }

    pub fn latest() -> SeriesBuilder {
        SeriesBuilder::of("latest")
    }

    pub fn avg() -> SeriesBuilder {
        SeriesBuilder::of("avg")
    }

    pub fn sum() -> SeriesBuilder {
        SeriesBuilder::of("sum")
    }

    pub fn min() -> SeriesBuilder {
        SeriesBuilder::of("min")
    }

    pub fn max() -> SeriesBuilder {
        SeriesBuilder::of("max")
    }

    pub fn card() -> SeriesBuilder {
        SeriesBuilder::of("card")
    }

    pub fn percentile() -> SeriesBuilder {
        SeriesBuilder::of("percentile")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.function.type_name()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn field(&self) -> Option<&str> {
        self.function.field()
    }

    pub fn function(&self) -> &SeriesFunction {
        &self.function
    }

    pub fn literal(&self) -> String {
        self.function.literal()
    }

    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }
}

const SERIES_TYPES: &[&str] = &[
    "count",
    "latest",
    "avg",
    "sum",
    "min",
    "max",
    "card",
    "stddev",
    "variance",
    "percentile",
];

/// Collects raw fields; [`SeriesBuilder::build`] validates them and derives
/// the id.
#[derive(Debug, Clone, Default)]
pub struct SeriesBuilder {
    type_name: &'static str,
    id: Option<String>,
    field: Option<String>,
    unit: Option<String>,
    percentile: Option<f64>,
}

impl SeriesBuilder {
    pub fn new(type_name: &str) -> Result<Self> {
        SERIES_TYPES
            .iter()
            .copied()
            .find(|known| *known == type_name)
            .map(Self::of)
            .ok_or_else(|| PlanError::unknown("series", type_name))
    }

    fn of(type_name: &'static str) -> Self {
        Self {
            type_name,
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn percentile_value(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    pub fn build(self) -> Result<SeriesSpec> {
        let field = self.field.filter(|f| !f.trim().is_empty());
        let type_name = self.type_name;
        let require_field = || {
            field.clone().ok_or_else(|| {
                PlanError::validation("series", format!("{} requires a field", type_name))
            })
        };

        let function = match type_name {
            "count" => SeriesFunction::Count { field: field.clone() },
            "latest" => SeriesFunction::Latest { field: require_field()? },
            "avg" => SeriesFunction::Avg { field: require_field()? },
            "sum" => SeriesFunction::Sum { field: require_field()? },
            "min" => SeriesFunction::Min { field: require_field()? },
            "max" => SeriesFunction::Max { field: require_field()? },
            "card" => SeriesFunction::Card { field: require_field()? },
            "stddev" => SeriesFunction::StdDev { field: require_field()? },
            "variance" => SeriesFunction::Variance { field: require_field()? },
            "percentile" => {
                let percentile = self.percentile.ok_or_else(|| {
                    PlanError::validation("series", "percentile requires a percentile value")
                })?;
                if !(percentile > 0.0 && percentile <= 100.0) {
                    return Err(PlanError::validation(
                        "series",
                        format!("percentile must be in (0, 100], got {}", percentile),
                    ));
                }
                SeriesFunction::Percentile {
                    field: require_field()?,
                    percentile,
                }
            }
            other => return Err(PlanError::unknown("series", other)),
        };

        let id = match self.id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => function.literal(),
        };

        Ok(SeriesSpec {
            id,
            unit: self.unit,
            function,
        })
    }
}

#[derive(Deserialize)]
struct RawSeries {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    percentile: Option<f64>,
}

impl TryFrom<RawSeries> for SeriesSpec {
    type Error = PlanError;

    fn try_from(raw: RawSeries) -> Result<Self> {
        let mut builder = SeriesBuilder::new(&raw.kind)?;
        builder.id = raw.id;
        builder.field = raw.field;
        builder.unit = raw.unit;
        builder.percentile = raw.percentile;
        builder.build()
    }
}
