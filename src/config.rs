//! The product configuration: dimensions, variables, and global
//! attribute strategies.
//!
//! The external surface is JSON with three ordered arrays:
//!
//! ```json
//! {
//!   "dimensions": [
//!     {"name": "record_number", "size": null,
//!      "index_by": "time", "expected_cadence": {"record_number": 1.0}}
//!   ],
//!   "variables": [
//!     {"name": "time", "dimensions": ["record_number"],
//!      "datatype": "float64", "attributes": {}, "chunksizes": [1024]}
//!   ],
//!   "global attributes": [
//!     {"name": "date_created", "strategy": "date_created"}
//!   ]
//! }
//! ```
//!
//! Array order is semantically significant (it fixes variable iteration
//! and attribute output order) and unknown fields are rejected.
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::attributes::StrategyKind;
use crate::dataset::SourceSchema;
use crate::error::{AggError, AggResult};
use crate::types::{AttrValue, DataType};

static DATE_EXPR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn default_date_format() -> String {
    "%Y%m%dT%H%M%SZ".to_string()
}

/// Top-level product configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub dimensions: Vec<DimensionConfig>,
    pub variables: Vec<VariableConfig>,
    #[serde(rename = "global attributes")]
    pub global_attributes: Vec<GlobalAttrConfig>,

    /// strftime-style format used by the `date_created` and
    /// `time_coverage_*` strategies.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

/// One output dimension, optionally with the sort/fill/bound rules for
/// an unlimited dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionConfig {
    pub name: String,

    /// Fixed size, or `null`/absent for unlimited.
    #[serde(default)]
    pub size: Option<usize>,

    /// Name of the variable whose values index this dimension. Required
    /// for sorting, fills, and bounds; without it an unlimited dimension
    /// is concatenated in filename order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_by: Option<String>,

    /// For a multidimensional index variable, the fixed index to take
    /// along each non-record dimension when projecting to 1-D.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub other_dim_indices: IndexMap<String, usize>,

    /// Expected sample rate in Hz, keyed by dimension of the index
    /// variable. The entry for this dimension itself drives gap and
    /// overlap detection; entries for inner dimensions drive fill-value
    /// synthesis for multidimensional indexes.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub expected_cadence: IndexMap<String, f64>,

    /// Lower aggregation bound: a number in index units or a date
    /// expression `TYYYY[MM[DD[HH[MM]]]]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<BoundSpec>,

    /// Upper aggregation bound (half-open), same forms as `min`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<BoundSpec>,

    /// Append records left-justified along this dimension, ignoring
    /// their original outer index.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub flatten: bool,
}

impl DimensionConfig {
    pub fn fixed(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            size: Some(size),
            ..Self::unlimited(name)
        }
    }

    pub fn unlimited(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: None,
            index_by: None,
            other_dim_indices: IndexMap::new(),
            expected_cadence: IndexMap::new(),
            min: None,
            max: None,
            flatten: false,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.size.is_none()
    }

    /// Whether this dimension carries an unlimited dimension
    /// configuration (an `index_by` variable).
    pub fn has_udc(&self) -> bool {
        self.index_by.is_some()
    }

    /// The expected rate of this dimension itself, if configured.
    pub fn outer_cadence(&self) -> Option<f64> {
        self.expected_cadence.get(&self.name).copied()
    }

    /// Resolve the configured bounds to numeric index values, applying
    /// the date-expression grammar. A single date expression implies the
    /// other edge by incrementing its least-significant component.
    pub fn resolve_bounds(&self) -> AggResult<(Option<f64>, Option<f64>)> {
        let bounds = match (&self.min, &self.max) {
            (None, None) => (None, None),
            (Some(BoundSpec::Number(v)), None) => (Some(*v), None),
            (None, Some(BoundSpec::Number(v))) => (None, Some(*v)),
            (Some(min), Some(max)) => {
                let min = bound_start(&self.name, min)?;
                let max = bound_start(&self.name, max)?;
                (Some(min), Some(max))
            }
            (Some(BoundSpec::Expr(e)), None) | (None, Some(BoundSpec::Expr(e))) => {
                let expr = DateExpr::parse(&self.name, e)?;
                (Some(expr.start_epoch()), Some(expr.successor().start_epoch()))
            }
        };

        if let (Some(min), Some(max)) = bounds {
            if min >= max {
                return Err(AggError::config_invalid(format!(
                    "dimension '{}' has min bound {min} >= max bound {max}",
                    self.name
                )));
            }
        }
        Ok(bounds)
    }
}

/// One output variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub name: String,
    pub dimensions: Vec<String>,
    pub datatype: DataType,

    /// Attribute map; `_FillValue` here is what gap and flatten padding
    /// is synthesized from.
    #[serde(default)]
    pub attributes: IndexMap<String, AttrValue>,

    /// Per-dimension chunk sizes; must match the dimension list length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunksizes: Option<Vec<usize>>,
}

impl VariableConfig {
    pub fn fill_value(&self) -> Option<&AttrValue> {
        self.attributes.get("_FillValue")
    }
}

/// One output global attribute: its name, how to reduce the stream of
/// input values, and the fixed value for the `static` strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalAttrConfig {
    pub name: String,
    pub strategy: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AttrValue>,
}

impl Config {
    pub fn from_json_str(json: &str) -> AggResult<Self> {
        serde_json::from_str(json).map_err(|e| AggError::config_invalid(e.to_string()))
    }

    pub fn from_file(path: &Path) -> AggResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AggError::io_from(path, e))?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_pretty(&self) -> AggResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AggError::internal(format!("config serialization failed: {e}")))
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionConfig> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableConfig> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn is_unlimited(&self, name: &str) -> bool {
        self.dimension(name).map(|d| d.is_unlimited()).unwrap_or(false)
    }

    pub fn unlimited_dims(&self) -> impl Iterator<Item = &DimensionConfig> {
        self.dimensions.iter().filter(|d| d.is_unlimited())
    }

    /// The dimension a variable is aggregated along: its first unlimited,
    /// non-flatten dimension. Flatten dimensions are realized by padding
    /// instead and never drive aggregation.
    pub fn primary_udim_of(&self, var: &VariableConfig) -> Option<&DimensionConfig> {
        var.dimensions
            .iter()
            .filter_map(|d| self.dimension(d))
            .find(|d| d.is_unlimited() && !d.flatten)
    }

    /// The unlimited dimension whose index variable orders the product:
    /// the first dimension with an UDC, else the first unlimited
    /// dimension. Attribute strategies and `time_coverage_*` report
    /// against this dimension.
    pub fn primary_udim(&self) -> Option<&DimensionConfig> {
        self.unlimited_dims()
            .find(|d| d.has_udc() && !d.flatten)
            .or_else(|| self.unlimited_dims().find(|d| !d.flatten))
    }

    /// Derive a default configuration from a sample granule's schema:
    /// every dimension and variable carried over, global attributes
    /// reduced with `first` unless the name has a well-known strategy.
    pub fn from_sample(schema: &SourceSchema) -> Self {
        let dimensions = schema
            .dimensions
            .iter()
            .map(|d| DimensionConfig {
                name: d.name.clone(),
                size: if d.unlimited { None } else { Some(d.len) },
                ..DimensionConfig::unlimited(&d.name)
            })
            .collect();

        let variables = schema
            .variables
            .iter()
            .map(|v| {
                let chunksizes = v
                    .dimensions
                    .iter()
                    .map(|d| match schema.dimension(d) {
                        Some(d) if d.unlimited => 1024,
                        Some(d) => d.len.max(1),
                        None => 1,
                    })
                    .collect();
                VariableConfig {
                    name: v.name.clone(),
                    dimensions: v.dimensions.clone(),
                    datatype: v.datatype,
                    attributes: v.attributes.clone(),
                    chunksizes: Some(chunksizes),
                }
            })
            .collect();

        let global_attributes = schema
            .global_attributes
            .keys()
            .map(|name| GlobalAttrConfig {
                name: name.clone(),
                strategy: default_strategy_for(name),
                value: None,
            })
            .collect();

        Config {
            dimensions,
            variables,
            global_attributes,
            date_format: default_date_format(),
        }
    }

    /// Check internal consistency. Everything here is fatal and surfaces
    /// before any data I/O.
    pub fn validate(&self) -> AggResult<()> {
        let mut seen_dims = Vec::new();
        for dim in &self.dimensions {
            if seen_dims.contains(&&dim.name) {
                return Err(AggError::config_invalid(format!(
                    "dimension '{}' is defined more than once",
                    dim.name
                )));
            }
            seen_dims.push(&dim.name);

            if dim.size == Some(0) {
                return Err(AggError::config_invalid(format!(
                    "dimension '{}' has size 0; fixed dimensions must be positive",
                    dim.name
                )));
            }
            if (dim.has_udc() || dim.flatten) && !dim.is_unlimited() {
                return Err(AggError::config_invalid(format!(
                    "dimension '{}' is fixed-size but carries unlimited dimension configuration",
                    dim.name
                )));
            }

            self.validate_udc(dim)?;
        }

        let mut seen_vars = Vec::new();
        for var in &self.variables {
            if seen_vars.contains(&&var.name) {
                return Err(AggError::config_invalid(format!(
                    "variable '{}' is defined more than once",
                    var.name
                )));
            }
            seen_vars.push(&var.name);

            for dname in &var.dimensions {
                if self.dimension(dname).is_none() {
                    return Err(AggError::config_invalid(format!(
                        "variable '{}' references undefined dimension '{dname}'",
                        var.name
                    )));
                }
            }
            if let Some(chunks) = &var.chunksizes {
                if chunks.len() != var.dimensions.len() {
                    return Err(AggError::config_invalid(format!(
                        "variable '{}' has {} chunk sizes for {} dimensions",
                        var.name,
                        chunks.len(),
                        var.dimensions.len()
                    )));
                }
            }
        }

        for attr in &self.global_attributes {
            if attr.strategy == StrategyKind::Static && attr.value.is_none() {
                return Err(AggError::config_invalid(format!(
                    "global attribute '{}' uses the 'static' strategy but has no value",
                    attr.name
                )));
            }
        }

        Ok(())
    }

    fn validate_udc(&self, dim: &DimensionConfig) -> AggResult<()> {
        let index_name = match &dim.index_by {
            Some(name) => name,
            None => return Ok(()),
        };

        let index_var = self.variable(index_name).ok_or_else(|| {
            AggError::config_invalid(format!(
                "dimension '{}' is indexed by undefined variable '{index_name}'",
                dim.name
            ))
        })?;

        if index_var.dimensions.first() != Some(&dim.name) {
            return Err(AggError::config_invalid(format!(
                "index variable '{index_name}' must have '{}' as its outer dimension",
                dim.name
            )));
        }
        if !index_var.datatype.is_numeric() {
            return Err(AggError::config_invalid(format!(
                "index variable '{index_name}' has non-numeric datatype {}",
                index_var.datatype
            )));
        }

        for (other, &idx) in &dim.other_dim_indices {
            if !index_var.dimensions.iter().any(|d| d == other) {
                return Err(AggError::config_invalid(format!(
                    "other_dim_indices for '{}' names '{other}', which is not a dimension of '{index_name}'",
                    dim.name
                )));
            }
            if let Some(d) = self.dimension(other) {
                if let Some(size) = d.size {
                    if idx >= size {
                        return Err(AggError::config_invalid(format!(
                            "other_dim_indices for '{}' pins '{other}' at {idx}, beyond its size {size}",
                            dim.name
                        )));
                    }
                }
            }
        }

        for (cdim, &hz) in &dim.expected_cadence {
            if !index_var.dimensions.iter().any(|d| d == cdim) {
                return Err(AggError::config_invalid(format!(
                    "expected_cadence for '{}' names '{cdim}', which is not a dimension of '{index_name}'",
                    dim.name
                )));
            }
            if !(hz > 0.0) {
                return Err(AggError::config_invalid(format!(
                    "expected_cadence for '{cdim}' must be a positive rate, got {hz}"
                )));
            }
        }

        dim.resolve_bounds()?;
        Ok(())
    }
}

fn default_strategy_for(attr_name: &str) -> StrategyKind {
    match attr_name {
        "date_created" => StrategyKind::DateCreated,
        "time_coverage_start" => StrategyKind::TimeCoverageStart,
        "time_coverage_end" => StrategyKind::TimeCoverageEnd,
        _ => StrategyKind::First,
    }
}

/// An aggregation bound: either numeric in index units, or a date
/// expression of the form `TYYYY[MM[DD[HH[MM]]]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundSpec {
    Number(f64),
    Expr(String),
}

fn bound_start(dim_name: &str, bound: &BoundSpec) -> AggResult<f64> {
    match bound {
        BoundSpec::Number(v) => Ok(*v),
        BoundSpec::Expr(e) => Ok(DateExpr::parse(dim_name, e)?.start_epoch()),
    }
}

/// A parsed date expression, tracking which components were given so
/// that the least-significant one can be incremented to infer a missing
/// bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DateExpr {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
}

impl DateExpr {
    pub(crate) fn parse(dim_name: &str, expr: &str) -> AggResult<Self> {
        let re = DATE_EXPR_REGEX.get_or_init(|| {
            regex::Regex::new(r"^T(\d{4})(\d{2})?(\d{2})?(\d{2})?(\d{2})?$")
                .expect("the date expression regex should be valid")
        });
        let caps = re.captures(expr).ok_or_else(|| {
            AggError::config_invalid(format!(
                "bound '{expr}' on dimension '{dim_name}' is not numeric or TYYYY[MM[DD[HH[MM]]]]"
            ))
        })?;

        let get = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u32>().unwrap());
        let parsed = Self {
            year: caps[1].parse().unwrap(),
            month: get(2),
            day: get(3),
            hour: get(4),
            minute: get(5),
        };

        // Range-check by resolving once.
        parsed.start_datetime().map(|_| parsed).ok_or_else(|| {
            AggError::config_invalid(format!(
                "bound '{expr}' on dimension '{dim_name}' is not a valid date"
            ))
        })
    }

    fn start_datetime(&self) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))?;
        let time = date.and_hms_opt(self.hour.unwrap_or(0), self.minute.unwrap_or(0), 0)?;
        Some(time.and_utc())
    }

    /// The bound as seconds since the Unix epoch.
    pub(crate) fn start_epoch(&self) -> f64 {
        self.start_datetime()
            .map(|t| t.timestamp() as f64)
            .unwrap_or(f64::NAN)
    }

    /// This expression with its least-significant given component
    /// incremented by one, e.g. `T201808` -> `T201809`.
    pub(crate) fn successor(&self) -> Self {
        let mut next = *self;
        if self.minute.is_some() || self.hour.is_some() {
            let bumped = self
                .start_datetime()
                .expect("a parsed date expression should resolve")
                + if self.minute.is_some() { Duration::minutes(1) } else { Duration::hours(1) };
            next.year = bumped.format("%Y").to_string().parse().unwrap();
            next.month = self.month.map(|_| bumped.format("%m").to_string().parse().unwrap());
            next.day = self.day.map(|_| bumped.format("%d").to_string().parse().unwrap());
            next.hour = self.hour.map(|_| bumped.format("%H").to_string().parse().unwrap());
            next.minute = self.minute.map(|_| bumped.format("%M").to_string().parse().unwrap());
        } else if let Some(day) = self.day {
            let bumped = NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), day)
                .expect("a parsed date expression should resolve")
                + Duration::days(1);
            next.year = bumped.format("%Y").to_string().parse().unwrap();
            next.month = Some(bumped.format("%m").to_string().parse().unwrap());
            next.day = Some(bumped.format("%d").to_string().parse().unwrap());
        } else if let Some(month) = self.month {
            if month == 12 {
                next.year += 1;
                next.month = Some(1);
            } else {
                next.month = Some(month + 1);
            }
        } else {
            next.year += 1;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config_json() -> &'static str {
        r#"{
            "dimensions": [
                {"name": "record_number", "size": null,
                 "index_by": "time",
                 "expected_cadence": {"record_number": 1.0}},
                {"name": "level", "size": 4}
            ],
            "variables": [
                {"name": "time", "dimensions": ["record_number"],
                 "datatype": "float64", "attributes": {}, "chunksizes": [1024]},
                {"name": "temperature",
                 "dimensions": ["record_number", "level"],
                 "datatype": "float32",
                 "attributes": {"_FillValue": -999.0, "units": "K"},
                 "chunksizes": [1024, 4]}
            ],
            "global attributes": [
                {"name": "title", "strategy": "first"},
                {"name": "date_created", "strategy": "date_created"}
            ]
        }"#
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::from_json_str(minimal_config_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.dimensions.len(), 2);
        assert!(config.dimension("record_number").unwrap().is_unlimited());
        assert_eq!(config.dimension("level").unwrap().size, Some(4));
        assert_eq!(
            config.variable("temperature").unwrap().fill_value(),
            Some(&AttrValue::Float(-999.0))
        );

        let json = config.to_json_pretty().unwrap();
        let reparsed = Config::from_json_str(&json).unwrap();
        assert_eq!(reparsed.variables[1].name, "temperature");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{
            "dimensions": [{"name": "t", "size": null, "wibble": 1}],
            "variables": [],
            "global attributes": []
        }"#;
        assert!(matches!(
            Config::from_json_str(json),
            Err(AggError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let json = r#"{
            "dimensions": [],
            "variables": [],
            "global attributes": [{"name": "a", "strategy": "mode"}]
        }"#;
        assert!(matches!(
            Config::from_json_str(json),
            Err(AggError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_validate_catches_bad_references() {
        let mut config = Config::from_json_str(minimal_config_json()).unwrap();
        config.variables[1].dimensions[1] = "missing_dim".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::from_json_str(minimal_config_json()).unwrap();
        config.variables[0].chunksizes = Some(vec![1, 2]);
        assert!(config.validate().is_err());

        let mut config = Config::from_json_str(minimal_config_json()).unwrap();
        config.dimensions[0].index_by = Some("temperature_error".to_string());
        assert!(config.validate().is_err());

        // index variable whose outer dim is not the unlimited dim
        let mut config = Config::from_json_str(minimal_config_json()).unwrap();
        config.variables[0].dimensions = vec!["level".to_string()];
        config.variables[0].chunksizes = Some(vec![4]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_static_needs_value() {
        let mut config = Config::from_json_str(minimal_config_json()).unwrap();
        config.global_attributes.push(GlobalAttrConfig {
            name: "processing_level".to_string(),
            strategy: StrategyKind::Static,
            value: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_date_expr_parse_and_epoch() {
        let e = DateExpr::parse("t", "T2018").unwrap();
        assert_eq!(e.start_epoch(), 1514764800.0); // 2018-01-01T00:00:00Z

        let e = DateExpr::parse("t", "T20180801").unwrap();
        assert_eq!(e.start_epoch(), 1533081600.0); // 2018-08-01T00:00:00Z

        assert!(DateExpr::parse("t", "T201813").is_err());
        assert!(DateExpr::parse("t", "2018").is_err());
        assert!(DateExpr::parse("t", "T18").is_err());
    }

    #[rstest::rstest]
    #[case("T2018", "T2019")]
    #[case("T201812", "T201901")]
    #[case("T20180831", "T20180901")]
    #[case("T20181231", "T20190101")]
    #[case("T2018080123", "T2018080200")]
    #[case("T201808012359", "T201808020000")]
    fn test_date_expr_successor(#[case] expr: &str, #[case] expected: &str) {
        let next = DateExpr::parse("t", expr).unwrap().successor();
        let expected = DateExpr::parse("t", expected).unwrap();
        assert_eq!(next.start_epoch(), expected.start_epoch());
    }

    #[test]
    fn test_single_date_bound_implies_other() {
        let mut dim = DimensionConfig::unlimited("record_number");
        dim.min = Some(BoundSpec::Expr("T201808".to_string()));
        let (min, max) = dim.resolve_bounds().unwrap();
        assert_eq!(min, Some(1533081600.0)); // 2018-08-01
        assert_eq!(max, Some(1535760000.0)); // 2018-09-01
    }

    #[test]
    fn test_single_numeric_bound_leaves_other_open() {
        let mut dim = DimensionConfig::unlimited("record_number");
        dim.min = Some(BoundSpec::Number(10.0));
        assert_eq!(dim.resolve_bounds().unwrap(), (Some(10.0), None));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut dim = DimensionConfig::unlimited("record_number");
        dim.min = Some(BoundSpec::Number(20.0));
        dim.max = Some(BoundSpec::Number(10.0));
        assert!(dim.resolve_bounds().is_err());
    }

    #[test]
    fn test_from_sample_defaults() {
        use crate::dataset::{DimSchema, VarSchema};
        let schema = SourceSchema {
            dimensions: vec![
                DimSchema { name: "time".to_string(), len: 5, unlimited: true },
                DimSchema { name: "level".to_string(), len: 3, unlimited: false },
            ],
            variables: vec![VarSchema {
                name: "pressure".to_string(),
                dimensions: vec!["time".to_string(), "level".to_string()],
                datatype: DataType::Float32,
                attributes: IndexMap::new(),
            }],
            global_attributes: [
                ("title".to_string(), AttrValue::from("test")),
                ("date_created".to_string(), AttrValue::from("yesterday")),
                ("time_coverage_start".to_string(), AttrValue::from("then")),
            ]
            .into_iter()
            .collect(),
        };

        let config = Config::from_sample(&schema);
        config.validate().unwrap();
        assert!(config.dimension("time").unwrap().is_unlimited());
        assert_eq!(config.dimension("level").unwrap().size, Some(3));
        assert_eq!(config.variables[0].chunksizes, Some(vec![1024, 3]));
        assert_eq!(config.global_attributes[0].strategy, StrategyKind::First);
        assert_eq!(config.global_attributes[1].strategy, StrategyKind::DateCreated);
        assert_eq!(
            config.global_attributes[2].strategy,
            StrategyKind::TimeCoverageStart
        );
    }
}
