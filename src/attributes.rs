//! Global attribute reduction strategies.
//!
//! Each output attribute is compiled from the stream of input attribute
//! values by a small stateful reducer: `observe` once per retained
//! granule, then `finalize` with the aggregation context. The strategy
//! names are part of the external configuration grammar.
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AggError, AggResult};
use crate::types::AttrValue;

/// The closed set of attribute strategies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Ignore observations; output the configured value.
    Static,
    /// Output the first observed value.
    First,
    /// Output the last observed value.
    Last,
    /// Join observed distinct values in first-seen order.
    UniqueList,
    /// Sum observations as integers.
    IntSum,
    /// Sum observations as floats.
    FloatSum,
    /// Like `first`, but it is an error for a later observation to differ.
    Constant,
    /// Emit the current UTC timestamp at finalize.
    DateCreated,
    /// Emit the lower aggregation bound (or the first retained index value).
    TimeCoverageStart,
    /// Emit the upper aggregation bound (or the last retained index value).
    TimeCoverageEnd,
    /// Emit the output filename.
    Filename,
    /// Emit the input filename contributing the first retained record.
    FirstInputFilename,
    /// Emit the input filename contributing the last retained record.
    LastInputFilename,
    /// Emit the number of retained granules.
    InputCount,
    /// Emit the engine version string.
    NcaggVersion,
    /// Do not emit the attribute at all.
    Remove,
}

/// Everything finalize-time strategies may need. The engine version is
/// injected here rather than read from ambient state.
#[derive(Debug, Clone, Default)]
pub struct AttrContext {
    pub output_filename: String,
    pub bound_min: Option<f64>,
    pub bound_max: Option<f64>,
    pub first_index_value: Option<f64>,
    pub last_index_value: Option<f64>,
    pub first_input_filename: Option<String>,
    pub last_input_filename: Option<String>,
    pub input_count: usize,
    pub version: String,
    pub date_format: String,
}

/// The running state of one output attribute.
#[derive(Debug)]
pub struct StrategyReducer {
    name: String,
    kind: StrategyKind,
    configured: Option<AttrValue>,
    state: State,
}

#[derive(Debug)]
enum State {
    Empty,
    Value(AttrValue),
    UniqueList(Vec<String>),
    IntSum(i64),
    FloatSum(f64),
}

impl StrategyReducer {
    pub fn new(name: &str, kind: StrategyKind, configured: Option<AttrValue>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            configured,
            state: State::Empty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feed one granule's value for this attribute. `None` means the
    /// granule does not carry the attribute; observation-driven
    /// strategies skip it.
    pub fn observe(&mut self, value: Option<&AttrValue>, granule: &Path) -> AggResult<()> {
        let value = match value {
            Some(v) => v,
            None => return Ok(()),
        };

        match self.kind {
            StrategyKind::First => {
                if matches!(self.state, State::Empty) {
                    self.state = State::Value(value.clone());
                }
            }
            StrategyKind::Last => {
                self.state = State::Value(value.clone());
            }
            StrategyKind::Constant => match &self.state {
                State::Empty => self.state = State::Value(value.clone()),
                State::Value(first) => {
                    if !first.approx_eq(value) {
                        return Err(AggError::attr_not_constant(&self.name, granule));
                    }
                }
                _ => {}
            },
            StrategyKind::UniqueList => {
                let rendered = value.to_display_string();
                match &mut self.state {
                    State::UniqueList(seen) => {
                        if !seen.contains(&rendered) {
                            seen.push(rendered);
                        }
                    }
                    _ => self.state = State::UniqueList(vec![rendered]),
                }
            }
            StrategyKind::IntSum => {
                let v = value.as_i64().ok_or_else(|| {
                    AggError::schema_mismatch(
                        granule,
                        format!("attribute '{}' is not an integer, cannot int_sum it", self.name),
                    )
                })?;
                match &mut self.state {
                    State::IntSum(total) => *total += v,
                    _ => self.state = State::IntSum(v),
                }
            }
            StrategyKind::FloatSum => {
                let v = value.as_f64().ok_or_else(|| {
                    AggError::schema_mismatch(
                        granule,
                        format!("attribute '{}' is not numeric, cannot float_sum it", self.name),
                    )
                })?;
                match &mut self.state {
                    State::FloatSum(total) => *total += v,
                    _ => self.state = State::FloatSum(v),
                }
            }
            // Finalize-only strategies ignore the observation stream.
            StrategyKind::Static
            | StrategyKind::DateCreated
            | StrategyKind::TimeCoverageStart
            | StrategyKind::TimeCoverageEnd
            | StrategyKind::Filename
            | StrategyKind::FirstInputFilename
            | StrategyKind::LastInputFilename
            | StrategyKind::InputCount
            | StrategyKind::NcaggVersion
            | StrategyKind::Remove => {}
        }
        Ok(())
    }

    /// Produce the output value, or `None` to omit the attribute.
    pub fn finalize(self, ctx: &AttrContext) -> AggResult<Option<AttrValue>> {
        let out = match self.kind {
            StrategyKind::Static => self.configured,
            StrategyKind::First | StrategyKind::Last | StrategyKind::Constant => {
                match self.state {
                    State::Value(v) => Some(v),
                    _ => None,
                }
            }
            StrategyKind::UniqueList => match self.state {
                State::UniqueList(seen) => Some(AttrValue::Str(seen.join(", "))),
                _ => None,
            },
            StrategyKind::IntSum => match self.state {
                State::IntSum(total) => Some(AttrValue::Int(total)),
                _ => None,
            },
            StrategyKind::FloatSum => match self.state {
                State::FloatSum(total) => Some(AttrValue::Float(total)),
                _ => None,
            },
            StrategyKind::DateCreated => {
                Some(AttrValue::Str(Utc::now().format(&ctx.date_format).to_string()))
            }
            StrategyKind::TimeCoverageStart => ctx
                .bound_min
                .or(ctx.first_index_value)
                .and_then(|t| format_epoch(t, &ctx.date_format))
                .map(AttrValue::Str),
            StrategyKind::TimeCoverageEnd => ctx
                .bound_max
                .or(ctx.last_index_value)
                .and_then(|t| format_epoch(t, &ctx.date_format))
                .map(AttrValue::Str),
            StrategyKind::Filename => Some(AttrValue::Str(ctx.output_filename.clone())),
            StrategyKind::FirstInputFilename => {
                ctx.first_input_filename.clone().map(AttrValue::Str)
            }
            StrategyKind::LastInputFilename => ctx.last_input_filename.clone().map(AttrValue::Str),
            StrategyKind::InputCount => Some(AttrValue::Int(ctx.input_count as i64)),
            StrategyKind::NcaggVersion => Some(AttrValue::Str(ctx.version.clone())),
            StrategyKind::Remove => None,
        };
        Ok(out)
    }
}

/// Render seconds-since-epoch with the product date format.
fn format_epoch(epoch: f64, format: &str) -> Option<String> {
    let secs = epoch.div_euclid(1.0) as i64;
    let nanos = (epoch.rem_euclid(1.0) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).map(|t| t.format(format).to_string())
}
