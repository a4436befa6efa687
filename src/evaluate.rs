//! Plan execution: stream data from inputs into the output.
//!
//! The evaluator is single-pass in both variables (configuration order)
//! and nodes (plan order). It maintains no state beyond the precomputed
//! write windows, never re-reads index arrays, and holds each granule
//! handle only while assembling one node's data for one variable.
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};

use crate::attributes::{AttrContext, StrategyReducer};
use crate::config::{Config, DimensionConfig, VariableConfig};
use crate::dataset::{DataStore, GranuleReader, GranuleWriter};
use crate::error::{AggError, AggResult};
use crate::granule::GranuleDescriptor;
use crate::plan::{FillSegment, InputSlice, Plan, PlanNode, SlicePiece};
use crate::types::NcArray;

/// Cooperative cancellation flag, checked between nodes and between
/// variables. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> AggResult<()> {
        if self.is_cancelled() {
            Err(AggError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Walk the plan and copy every configured variable into the output,
/// then compile and write the global attributes in configuration order.
pub fn evaluate<S: DataStore>(
    store: &S,
    config: &Config,
    granules: &[GranuleDescriptor],
    plan: &Plan,
    writer: &mut S::Writer,
    ctx: &AttrContext,
    cancel: &CancelToken,
) -> AggResult<()> {
    for var in &config.variables {
        cancel.check()?;
        match config.primary_udim_of(var) {
            Some(dim) => {
                write_aggregated(store, config, granules, plan, writer, var, dim, cancel)?
            }
            None => write_one_shot(store, config, granules, plan, writer, var)?,
        }
    }

    cancel.check()?;
    write_attributes(config, granules, plan, writer, ctx)
}

/// Copy one unlimited-backed variable node by node, advancing the write
/// cursor along its primary dimension.
fn write_aggregated<S: DataStore>(
    store: &S,
    config: &Config,
    granules: &[GranuleDescriptor],
    plan: &Plan,
    writer: &mut S::Writer,
    var: &VariableConfig,
    dim: &DimensionConfig,
    cancel: &CancelToken,
) -> AggResult<()> {
    let dim_plan = plan.dim(&dim.name).ok_or_else(|| {
        AggError::internal(format!("no plan was built for unlimited dimension '{}'", dim.name))
    })?;
    let axis = var
        .dimensions
        .iter()
        .position(|d| d == &dim.name)
        .ok_or_else(|| AggError::internal(format!("variable '{}' lost its primary dimension", var.name)))?;

    for (node, &offset) in dim_plan.nodes.iter().zip(&dim_plan.offsets) {
        cancel.check()?;
        if node.size() == 0 {
            continue;
        }
        let data = node_data(store, config, granules, plan, var, dim, axis, node)?;
        let ranges = write_ranges(config, plan, var, axis, offset..offset + node.size())?;
        writer.write(&var.name, &ranges, &data)?;
    }
    Ok(())
}

/// One node's data: an array shaped like the variable with the primary
/// dimension replaced by the node's write window.
#[allow(clippy::too_many_arguments)]
fn node_data<S: DataStore>(
    store: &S,
    config: &Config,
    granules: &[GranuleDescriptor],
    plan: &Plan,
    var: &VariableConfig,
    dim: &DimensionConfig,
    axis: usize,
    node: &PlanNode,
) -> AggResult<NcArray> {
    match node {
        PlanNode::Fill(fill) => {
            let shape = fill_shape(config, plan, var, axis, fill.count)?;
            fill_data(var, dim, axis, fill, &shape)
        }
        PlanNode::Input(slice) => input_slice_data(store, config, granules, plan, var, dim, axis, slice),
    }
}

/// Realize one granule's mini-plan: read its raw runs, synthesize its
/// inner fills, and concatenate them in sorted order. The granule file
/// is opened for exactly this call.
#[allow(clippy::too_many_arguments)]
fn input_slice_data<S: DataStore>(
    store: &S,
    config: &Config,
    granules: &[GranuleDescriptor],
    plan: &Plan,
    var: &VariableConfig,
    dim: &DimensionConfig,
    axis: usize,
    slice: &InputSlice,
) -> AggResult<NcArray> {
    let granule = &granules[slice.granule];

    if !granule.has_var(&var.name) {
        let shape = fill_shape(config, plan, var, axis, slice.size())?;
        return Ok(NcArray::full(var.datatype, &shape, var.fill_value()));
    }

    let reader = store.open(&granule.path)?;
    let mut parts = Vec::with_capacity(slice.pieces.len());
    for piece in &slice.pieces {
        match piece {
            SlicePiece::Rows { start, count } => {
                let ranges = granule_ranges(granule, var, axis, *start..*start + *count);
                parts.push(reader.read_slice(&var.name, &ranges)?);
            }
            SlicePiece::Fill(fill) => {
                let shape = granule_fill_shape(granule, var, axis, fill.count);
                parts.push(fill_data(var, dim, axis, fill, &shape)?);
            }
        }
    }
    drop(reader);

    let data = if parts.len() == 1 {
        parts.pop().expect("one part was just checked to exist")
    } else {
        NcArray::concat(axis, &parts)?
    };
    let data = data.nan_to_fill(var.fill_value());
    pad_unlimited_dims(config, plan, var, axis, data)
}

/// Synthesize a fill segment's data: the index variable gets its
/// monotone lattice, every other variable gets `_FillValue`.
fn fill_data(
    var: &VariableConfig,
    dim: &DimensionConfig,
    axis: usize,
    fill: &FillSegment,
    shape: &[usize],
) -> AggResult<NcArray> {
    let is_index_var = dim.index_by.as_deref() == Some(var.name.as_str());
    let start = match (is_index_var, fill.start) {
        (true, Some(start)) => start,
        _ => return Ok(NcArray::full(var.datatype, shape, var.fill_value())),
    };

    // Per-axis step: the primary dimension advances by the outer
    // cadence, inner dimensions by their own configured cadence.
    let steps: Vec<f64> = var
        .dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i == axis {
                fill.step
            } else {
                fill.inner_steps.get(d).copied().unwrap_or(0.0)
            }
        })
        .collect();
    let lattice = ArrayD::from_shape_fn(IxDyn(shape), |idx| {
        let mut value = start;
        for (i, step) in steps.iter().enumerate() {
            value += idx[i] as f64 * step;
        }
        value
    });
    NcArray::from_f64(var.datatype, lattice)
}

/// Read ranges inside one granule: the primary dimension takes the
/// piece's rows, everything else spans the granule's own extent.
fn granule_ranges(
    granule: &GranuleDescriptor,
    var: &VariableConfig,
    axis: usize,
    rows: Range<usize>,
) -> Vec<Range<usize>> {
    var.dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i == axis {
                rows.clone()
            } else {
                0..granule.dim_len(d)
            }
        })
        .collect()
}

fn granule_fill_shape(
    granule: &GranuleDescriptor,
    var: &VariableConfig,
    axis: usize,
    count: usize,
) -> Vec<usize> {
    var.dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| if i == axis { count } else { granule.dim_len(d) })
        .collect()
}

/// Output-facing shape of a node window: fixed dimensions at their
/// configured size, other unlimited dimensions at their planned size.
fn fill_shape(
    config: &Config,
    plan: &Plan,
    var: &VariableConfig,
    axis: usize,
    count: usize,
) -> AggResult<Vec<usize>> {
    var.dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i == axis {
                return Ok(count);
            }
            dim_output_len(config, plan, d)
        })
        .collect()
}

fn dim_output_len(config: &Config, plan: &Plan, dim_name: &str) -> AggResult<usize> {
    let dim = config
        .dimension(dim_name)
        .ok_or_else(|| AggError::internal(format!("undefined dimension '{dim_name}' survived validation")))?;
    match dim.size {
        Some(size) => Ok(size),
        None => plan
            .dim(dim_name)
            .map(|p| p.size)
            .ok_or_else(|| AggError::internal(format!("no plan for unlimited dimension '{dim_name}'"))),
    }
}

/// Right-pad data along any non-primary unlimited dimension (flatten
/// layout) out to the planned output size.
fn pad_unlimited_dims(
    config: &Config,
    plan: &Plan,
    var: &VariableConfig,
    axis: usize,
    mut data: NcArray,
) -> AggResult<NcArray> {
    for (i, dname) in var.dimensions.iter().enumerate() {
        if i == axis || !config.is_unlimited(dname) {
            continue;
        }
        let planned = dim_output_len(config, plan, dname)?;
        data = data.pad_to(i, planned, var.fill_value())?;
    }
    Ok(data)
}

fn write_ranges(
    config: &Config,
    plan: &Plan,
    var: &VariableConfig,
    axis: usize,
    window: Range<usize>,
) -> AggResult<Vec<Range<usize>>> {
    var.dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i == axis {
                return Ok(window.clone());
            }
            dim_output_len(config, plan, d).map(|len| 0..len)
        })
        .collect()
}

/// Copy a variable with no aggregation dimension once, from the first
/// granule carrying it. Reader failures here are logged and the output
/// keeps the writer's fill defaults; writer failures stay fatal.
fn write_one_shot<S: DataStore>(
    store: &S,
    config: &Config,
    granules: &[GranuleDescriptor],
    plan: &Plan,
    writer: &mut S::Writer,
    var: &VariableConfig,
) -> AggResult<()> {
    let granule = match granules.iter().find(|g| g.has_var(&var.name)) {
        Some(g) => g,
        None => {
            log::warn!(
                "variable '{}' is not present in any input, leaving it at its fill value",
                var.name
            );
            return Ok(());
        }
    };

    let data = match read_one_shot(store, config, plan, var, granule) {
        Ok(data) => data,
        Err(e) => {
            log::warn!(
                "could not copy variable '{}' from {}, leaving it at its fill value: {e}",
                var.name,
                granule.filename
            );
            return Ok(());
        }
    };

    let ranges: Vec<Range<usize>> = data.shape().iter().map(|&len| 0..len).collect();
    writer.write(&var.name, &ranges, &data)
}

fn read_one_shot<S: DataStore>(
    store: &S,
    config: &Config,
    plan: &Plan,
    var: &VariableConfig,
    granule: &GranuleDescriptor,
) -> AggResult<NcArray> {
    let reader = store.open(&granule.path)?;
    let ranges: Vec<Range<usize>> = var.dimensions.iter().map(|d| 0..granule.dim_len(d)).collect();
    let data = reader.read_slice(&var.name, &ranges)?;
    let data = data.nan_to_fill(var.fill_value());

    // pad flatten dimensions out to the planned output size
    let mut data = data;
    for (i, dname) in var.dimensions.iter().enumerate() {
        if config.is_unlimited(dname) {
            let planned = dim_output_len(config, plan, dname)?;
            data = data.pad_to(i, planned, var.fill_value())?;
        }
    }
    Ok(data)
}

/// Compile the global attributes: observe every retained granule in
/// plan order, then finalize and write in configuration order.
fn write_attributes<W: GranuleWriter>(
    config: &Config,
    granules: &[GranuleDescriptor],
    plan: &Plan,
    writer: &mut W,
    ctx: &AttrContext,
) -> AggResult<()> {
    let mut reducers: Vec<StrategyReducer> = config
        .global_attributes
        .iter()
        .map(|spec| StrategyReducer::new(&spec.name, spec.strategy, spec.value.clone()))
        .collect();

    for gi in observation_order(config, plan, granules.len()) {
        let granule = &granules[gi];
        for reducer in reducers.iter_mut() {
            let value = granule.attrs.get(reducer.name()).and_then(|v| v.as_ref());
            reducer.observe(value, &granule.path)?;
        }
    }

    for reducer in reducers {
        let name = reducer.name().to_string();
        if let Some(value) = reducer.finalize(ctx)? {
            writer.set_global_attr(&name, &value)?;
        }
    }
    Ok(())
}

/// Granules feed the attribute reducers in the order they contribute to
/// the primary unlimited dimension; with no unlimited dimension, input
/// order.
fn observation_order(config: &Config, plan: &Plan, n_granules: usize) -> Vec<usize> {
    config
        .primary_udim()
        .and_then(|dim| plan.dim(&dim.name))
        .map(|p| p.retained.clone())
        .unwrap_or_else(|| (0..n_granules).collect())
}

/// The retained-granule count the `input_count` strategy reports.
pub(crate) fn retained_input_count(config: &Config, plan: &Plan, n_granules: usize) -> usize {
    observation_order(config, plan, n_granules).len()
}
