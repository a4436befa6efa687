//! The aggregation plan: per-unlimited-dimension node lists.
//!
//! Planning is pure CPU over descriptor metadata. For an indexed
//! unlimited dimension the planner sorts granules by their first
//! projected index value, sorts and deduplicates each granule
//! internally through its mini-plan, chops to the configured bounds,
//! trims overlap between neighbors, and interleaves fill segments for
//! gaps. The raw granule files are never modified or re-read here.
use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::cadence;
use crate::config::{Config, DimensionConfig};
use crate::error::AggResult;
use crate::granule::GranuleDescriptor;

/// A run of synthesized fill records along one unlimited dimension.
///
/// When the dimension's index variable has inner dimensions with a
/// configured cadence, `start`, `step`, and `inner_steps` describe the
/// monotone lattice of index values to synthesize for the fill rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FillSegment {
    pub count: usize,
    pub start: Option<f64>,
    pub step: f64,
    pub inner_steps: IndexMap<String, f64>,
}

/// A contiguous run of raw records, or an inner fill, inside one
/// granule's mini-plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SlicePiece {
    /// `count` consecutive raw records starting at raw row `start`,
    /// emitted in this position of the sorted view.
    Rows { start: usize, count: usize },
    Fill(FillSegment),
}

impl SlicePiece {
    pub fn size(&self) -> usize {
        match self {
            SlicePiece::Rows { count, .. } => *count,
            SlicePiece::Fill(f) => f.count,
        }
    }
}

/// One granule's contribution along one unlimited dimension: an ordered
/// mini-plan realizing its sorted, deduplicated, gap-filled view.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlice {
    /// Index into the descriptor list handed to [`build_plan`].
    pub granule: usize,
    pub pieces: Vec<SlicePiece>,
    size: usize,
}

impl InputSlice {
    pub fn size(&self) -> usize {
        self.size
    }
}

/// One element of a dimension's plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Input(InputSlice),
    Fill(FillSegment),
}

impl PlanNode {
    /// Records this node contributes along its dimension. Fixed once
    /// the plan is built.
    pub fn size(&self) -> usize {
        match self {
            PlanNode::Input(slice) => slice.size(),
            PlanNode::Fill(fill) => fill.count,
        }
    }
}

/// The finalized plan for one unlimited dimension.
#[derive(Debug, Clone)]
pub struct DimPlan {
    pub nodes: Vec<PlanNode>,
    /// Write offset of each node, precomputed so the evaluator never
    /// re-derives windows.
    pub offsets: Vec<usize>,
    pub size: usize,
    pub flatten: bool,
    /// Granule indices contributing at least one record, in emit order.
    pub retained: Vec<usize>,
    pub first_index_value: Option<f64>,
    pub last_index_value: Option<f64>,
}

impl DimPlan {
    fn empty(flatten: bool) -> Self {
        Self {
            nodes: Vec::new(),
            offsets: Vec::new(),
            size: 0,
            flatten,
            retained: Vec::new(),
            first_index_value: None,
            last_index_value: None,
        }
    }

    fn seal(mut self) -> Self {
        let mut offset = 0;
        self.offsets = self
            .nodes
            .iter()
            .map(|n| {
                let o = offset;
                offset += n.size();
                o
            })
            .collect();
        self.size = offset;
        self
    }

    pub fn first_granule(&self) -> Option<usize> {
        self.retained.first().copied()
    }

    pub fn last_granule(&self) -> Option<usize> {
        self.retained.last().copied()
    }
}

/// The engine's stage-one output: an ordered node list per unlimited
/// dimension plus the planned output sizes.
#[derive(Debug, Clone)]
pub struct Plan {
    pub dims: IndexMap<String, DimPlan>,
}

impl Plan {
    pub fn dim(&self, name: &str) -> Option<&DimPlan> {
        self.dims.get(name)
    }

    /// Planned output size of every unlimited dimension.
    pub fn udim_sizes(&self) -> IndexMap<String, usize> {
        self.dims.iter().map(|(name, plan)| (name.clone(), plan.size)).collect()
    }
}

/// Build the plan for every unlimited dimension in the configuration.
/// Granules are taken in the given order, which the caller has already
/// sorted by filename.
pub fn build_plan(config: &Config, granules: &[GranuleDescriptor]) -> AggResult<Plan> {
    let mut dims = IndexMap::new();
    for dim in config.unlimited_dims() {
        let plan = if dim.flatten {
            plan_flatten(dim, granules)
        } else if dim.has_udc() {
            plan_indexed(dim, granules)?
        } else {
            plan_concat(dim, granules)
        };
        log::debug!(
            "planned {} records across {} nodes along '{}'",
            plan.size,
            plan.nodes.len(),
            dim.name
        );
        dims.insert(dim.name.clone(), plan);
    }
    Ok(Plan { dims })
}

/// Plain concatenation in input (filename) order.
fn plan_concat(dim: &DimensionConfig, granules: &[GranuleDescriptor]) -> DimPlan {
    let mut plan = DimPlan::empty(false);
    for (gi, granule) in granules.iter().enumerate() {
        let len = granule.dim_len(&dim.name);
        if len == 0 {
            continue;
        }
        plan.nodes.push(PlanNode::Input(InputSlice {
            granule: gi,
            pieces: vec![SlicePiece::Rows { start: 0, count: len }],
            size: len,
        }));
        plan.retained.push(gi);
    }
    plan.seal()
}

/// Flatten dimensions do not concatenate: the output size is the widest
/// granule and rows are left-justified at write time.
fn plan_flatten(dim: &DimensionConfig, granules: &[GranuleDescriptor]) -> DimPlan {
    let mut plan = DimPlan::empty(true);
    plan.size = granules.iter().map(|g| g.dim_len(&dim.name)).max().unwrap_or(0);
    plan.retained = granules
        .iter()
        .enumerate()
        .filter(|(_, g)| g.dim_len(&dim.name) > 0)
        .map(|(gi, _)| gi)
        .collect();
    plan
}

/// One granule's sorted, deduplicated, bound-chopped record list:
/// (raw row, projected index value) pairs in output order.
struct GranuleView {
    granule: usize,
    /// The descriptor's first projected value, before any chopping;
    /// granules are ordered by this.
    projected_first: f64,
    entries: Vec<(usize, f64)>,
}

impl GranuleView {
    fn first_value(&self) -> f64 {
        self.entries[0].1
    }

    fn last_value(&self) -> f64 {
        self.entries[self.entries.len() - 1].1
    }
}

fn plan_indexed(dim: &DimensionConfig, granules: &[GranuleDescriptor]) -> AggResult<DimPlan> {
    let hz = dim.outer_cadence();
    let (bound_min, bound_max) = dim.resolve_bounds()?;

    // Per-granule sorted + deduplicated + chopped views.
    let mut views: Vec<GranuleView> = Vec::new();
    for (gi, granule) in granules.iter().enumerate() {
        let projection = match granule.index.get(&dim.name) {
            Some(p) => p,
            None => continue,
        };

        // The descriptor's projected range rejects a granule lying
        // entirely outside the bounds without walking its records.
        if !cadence::in_bounds(projection.last, bound_min, None, hz)
            || !cadence::in_bounds(projection.first, None, bound_max, hz)
        {
            log::info!(
                "granule {} spans [{}, {}] along '{}', outside the aggregation bounds",
                granule.filename,
                projection.first,
                projection.last,
                dim.name
            );
            continue;
        }

        let mut entries: Vec<(usize, f64)> = projection
            .values
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .collect();
        // Stable sort: equal values keep raw order, so the earlier
        // record wins the in-granule dedup below.
        entries.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        // In-granule dedup drops only records that do not advance the
        // index (sort ties). Sub-cadence spacing inside one granule is
        // real data; the 0.5-period tolerance applies at granule seams.
        if hz.is_some() {
            let mut kept: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
            for entry in entries {
                match kept.last() {
                    Some(&(_, prev)) if entry.1 <= prev => {
                        log::trace!(
                            "dropping duplicate record at {} in {}",
                            entry.1,
                            granule.filename
                        );
                    }
                    _ => kept.push(entry),
                }
            }
            entries = kept;
        }

        entries.retain(|&(_, v)| cadence::in_bounds(v, bound_min, bound_max, hz));
        if entries.is_empty() {
            log::info!(
                "granule {} contributes no records along '{}' after bound chop",
                granule.filename,
                dim.name
            );
            continue;
        }
        views.push(GranuleView {
            granule: gi,
            projected_first: projection.first,
            entries,
        });
    }

    // Outer sort by each granule's first projected value. Stable, so
    // ties fall back to filename order.
    views.sort_by(|a, b| {
        a.projected_first.partial_cmp(&b.projected_first).unwrap_or(Ordering::Equal)
    });

    // Trim each granule's overlap with its predecessor; the earlier
    // granule's records win.
    let mut retained: Vec<GranuleView> = Vec::new();
    for mut view in views {
        if let (Some(hz), Some(prev)) = (hz, retained.last()) {
            let prev_last = prev.last_value();
            match view.entries.iter().position(|&(_, v)| !cadence::is_duplicate(prev_last, v, hz))
            {
                Some(0) => {}
                Some(n) => {
                    log::debug!(
                        "trimming {n} overlapping records from {}",
                        granules[view.granule].filename
                    );
                    view.entries.drain(..n);
                }
                None => {
                    log::info!(
                        "granule {} is fully overlapped by its predecessor, dropping it",
                        granules[view.granule].filename
                    );
                    continue;
                }
            }
        }
        retained.push(view);
    }

    // Assemble nodes with gap fills between and inside files.
    let mut plan = DimPlan::empty(false);
    if retained.is_empty() {
        return Ok(plan.seal());
    }

    if let (Some(hz), Some(min)) = (hz, bound_min) {
        let first = retained[0].first_value();
        if first - min > 0.5 * cadence::period(hz) {
            let count = ((first - min) * hz).round() as usize;
            let start = first - count as f64 * cadence::period(hz);
            plan.nodes.push(PlanNode::Fill(fill_segment(count, start, hz, dim)));
        }
    }

    for vi in 0..retained.len() {
        if vi > 0 {
            if let Some(hz) = hz {
                let prev_last = retained[vi - 1].last_value();
                let first = retained[vi].first_value();
                if cadence::is_gap(prev_last, first, hz) {
                    let count = cadence::records_between(prev_last, first, hz);
                    if count > 0 {
                        let start = prev_last + cadence::period(hz);
                        plan.nodes.push(PlanNode::Fill(fill_segment(count, start, hz, dim)));
                    }
                }
            }
        }
        plan.nodes.push(PlanNode::Input(input_slice(&retained[vi], hz, dim)));
    }

    if let (Some(hz), Some(max)) = (hz, bound_max) {
        let last = retained[retained.len() - 1].last_value();
        let count = cadence::records_between(last, max, hz);
        if count > 0 {
            let start = last + cadence::period(hz);
            plan.nodes.push(PlanNode::Fill(fill_segment(count, start, hz, dim)));
        }
    }

    plan.first_index_value = Some(retained[0].first_value());
    plan.last_index_value = Some(retained[retained.len() - 1].last_value());
    plan.retained = retained.iter().map(|v| v.granule).collect();
    Ok(plan.seal())
}

/// Build one granule's mini-plan: maximal runs of raw rows that are
/// consecutive both on disk and in the sorted view, with inner fills
/// where the granule itself has gaps.
fn input_slice(view: &GranuleView, hz: Option<f64>, dim: &DimensionConfig) -> InputSlice {
    let mut pieces: Vec<SlicePiece> = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    let mut prev: Option<(usize, f64)> = None;
    let mut size = 0;

    for &(raw, value) in &view.entries {
        if let (Some(hz), Some((_, prev_value))) = (hz, prev) {
            if cadence::is_gap(prev_value, value, hz) {
                let count = cadence::records_between(prev_value, value, hz);
                if count > 0 {
                    if let Some((start, len)) = run.take() {
                        pieces.push(SlicePiece::Rows { start, count: len });
                    }
                    let start = prev_value + cadence::period(hz);
                    pieces.push(SlicePiece::Fill(fill_segment(count, start, hz, dim)));
                    size += count;
                }
            }
        }

        run = match run {
            Some((start, len)) if prev.map(|(r, _)| r + 1) == Some(raw) => Some((start, len + 1)),
            Some((start, len)) => {
                pieces.push(SlicePiece::Rows { start, count: len });
                Some((raw, 1))
            }
            None => Some((raw, 1)),
        };
        prev = Some((raw, value));
        size += 1;
    }
    if let Some((start, len)) = run {
        pieces.push(SlicePiece::Rows { start, count: len });
    }

    InputSlice {
        granule: view.granule,
        pieces,
        size,
    }
}

fn fill_segment(count: usize, start: f64, hz: f64, dim: &DimensionConfig) -> FillSegment {
    let inner_steps = dim
        .expected_cadence
        .iter()
        .filter(|(name, _)| **name != dim.name)
        .map(|(name, &inner_hz)| (name.clone(), cadence::period(inner_hz)))
        .collect();
    FillSegment {
        count,
        start: Some(start),
        step: cadence::period(hz),
        inner_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granule::IndexProjection;
    use indexmap::IndexMap;
    use std::path::PathBuf;

    const DIM: &str = "record_number";

    fn descriptor(name: &str, times: &[f64]) -> GranuleDescriptor {
        let mut dim_lens = IndexMap::new();
        dim_lens.insert(DIM.to_string(), times.len());
        let mut index = IndexMap::new();
        if !times.is_empty() {
            index.insert(
                DIM.to_string(),
                IndexProjection {
                    values: times.to_vec(),
                    first: times.iter().copied().fold(f64::INFINITY, f64::min),
                    last: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                },
            );
        }
        GranuleDescriptor {
            path: PathBuf::from(name),
            filename: name.to_string(),
            dim_lens,
            missing_vars: Vec::new(),
            attrs: IndexMap::new(),
            index,
        }
    }

    fn indexed_dim(hz: Option<f64>) -> DimensionConfig {
        let mut dim = DimensionConfig::unlimited(DIM);
        dim.index_by = Some("time".to_string());
        if let Some(hz) = hz {
            dim.expected_cadence.insert(DIM.to_string(), hz);
        }
        dim
    }

    /// The projected index values a plan would emit, fills included.
    fn emitted_values(plan: &DimPlan, granules: &[GranuleDescriptor]) -> Vec<f64> {
        let mut out = Vec::new();
        for node in &plan.nodes {
            match node {
                PlanNode::Fill(fill) => emit_fill(fill, &mut out),
                PlanNode::Input(slice) => {
                    let values = &granules[slice.granule].index[DIM].values;
                    for piece in &slice.pieces {
                        match piece {
                            SlicePiece::Rows { start, count } => {
                                out.extend_from_slice(&values[*start..*start + *count]);
                            }
                            SlicePiece::Fill(fill) => emit_fill(fill, &mut out),
                        }
                    }
                }
            }
        }
        out
    }

    fn emit_fill(fill: &FillSegment, out: &mut Vec<f64>) {
        let start = fill.start.expect("test fills should carry a start value");
        for i in 0..fill.count {
            out.push(start + i as f64 * fill.step);
        }
    }

    #[test]
    fn test_concat_in_input_order() {
        let dim = DimensionConfig::unlimited(DIM);
        let granules = [descriptor("a.nc", &[0.0; 0]), descriptor("b.nc", &[0.0; 0])];
        let mut granules = granules.to_vec();
        granules[0].dim_lens.insert(DIM.to_string(), 3);
        granules[1].dim_lens.insert(DIM.to_string(), 3);

        let plan = plan_concat(&dim, &granules);
        assert_eq!(plan.size, 6);
        assert_eq!(plan.offsets, vec![0, 3]);
        assert_eq!(plan.retained, vec![0, 1]);
        match &plan.nodes[1] {
            PlanNode::Input(slice) => {
                assert_eq!(slice.granule, 1);
                assert_eq!(slice.pieces, vec![SlicePiece::Rows { start: 0, count: 3 }]);
            }
            _ => panic!("expected an input node"),
        }
    }

    #[test]
    fn test_sorts_within_and_between_granules() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![
            descriptor("a.nc", &[10.0, 12.0, 11.0]),
            descriptor("b.nc", &[14.0, 13.0, 15.0]),
        ];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(plan.size, 6);
        assert_eq!(
            emitted_values(&plan, &granules),
            vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]
        );
        assert!(plan.nodes.iter().all(|n| matches!(n, PlanNode::Input(_))));
    }

    #[test]
    fn test_unsorted_granule_mini_plan_runs() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![descriptor("a.nc", &[10.0, 12.0, 11.0])];
        let plan = plan_indexed(&dim, &granules).unwrap();
        match &plan.nodes[0] {
            PlanNode::Input(slice) => {
                assert_eq!(
                    slice.pieces,
                    vec![
                        SlicePiece::Rows { start: 0, count: 1 },
                        SlicePiece::Rows { start: 2, count: 1 },
                        SlicePiece::Rows { start: 1, count: 1 },
                    ]
                );
            }
            _ => panic!("expected an input node"),
        }
    }

    #[test]
    fn test_gap_fill_between_granules() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![
            descriptor("a.nc", &[10.0, 11.0]),
            descriptor("b.nc", &[14.0, 15.0]),
        ];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(plan.size, 6);
        assert_eq!(plan.nodes.len(), 3);
        match &plan.nodes[1] {
            PlanNode::Fill(fill) => {
                assert_eq!(fill.count, 2);
                assert_eq!(fill.start, Some(12.0));
                assert_eq!(fill.step, 1.0);
            }
            _ => panic!("expected a fill node"),
        }
        assert_eq!(
            emitted_values(&plan, &granules),
            vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]
        );
    }

    #[test]
    fn test_inner_gap_fill_within_granule() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![descriptor("a.nc", &[10.0, 11.0, 14.0])];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(plan.size, 5);
        match &plan.nodes[0] {
            PlanNode::Input(slice) => {
                assert_eq!(slice.pieces.len(), 3);
                assert_eq!(slice.pieces[0], SlicePiece::Rows { start: 0, count: 2 });
                match &slice.pieces[1] {
                    SlicePiece::Fill(fill) => {
                        assert_eq!(fill.count, 2);
                        assert_eq!(fill.start, Some(12.0));
                    }
                    _ => panic!("expected an inner fill"),
                }
                assert_eq!(slice.pieces[2], SlicePiece::Rows { start: 2, count: 1 });
            }
            _ => panic!("expected an input node"),
        }
    }

    #[test]
    fn test_dedup_overlap_keeps_earlier_granule() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![
            descriptor("a.nc", &[10.0, 11.0, 12.0]),
            descriptor("b.nc", &[12.0, 13.0]),
        ];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(plan.size, 4);
        assert_eq!(emitted_values(&plan, &granules), vec![10.0, 11.0, 12.0, 13.0]);
        // the kept 12.0 comes from a.nc; b.nc contributes only 13.0
        match &plan.nodes[1] {
            PlanNode::Input(slice) => {
                assert_eq!(slice.granule, 1);
                assert_eq!(slice.pieces, vec![SlicePiece::Rows { start: 1, count: 1 }]);
            }
            _ => panic!("expected an input node"),
        }
    }

    #[test]
    fn test_fully_overlapped_granule_dropped() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![
            descriptor("a.nc", &[10.0, 11.0, 12.0]),
            descriptor("b.nc", &[11.2, 12.3]),
        ];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(plan.retained, vec![0]);
        assert_eq!(plan.size, 3);
    }

    #[test]
    fn test_bound_chop_half_open() {
        let mut dim = indexed_dim(Some(1.0));
        dim.min = Some(crate::config::BoundSpec::Number(10.0));
        dim.max = Some(crate::config::BoundSpec::Number(11.5));
        let granules = vec![descriptor("a.nc", &[9.6, 10.0, 10.4, 11.0, 11.6])];
        let plan = plan_indexed(&dim, &granules).unwrap();
        // 9.6 chopped at min, 11.6 chopped at max; 10.4 is real
        // sub-cadence data within one granule and survives.
        assert_eq!(emitted_values(&plan, &granules), vec![10.0, 10.4, 11.0]);
        assert_eq!(plan.first_index_value, Some(10.0));
        assert_eq!(plan.last_index_value, Some(11.0));
    }

    #[test]
    fn test_sort_ties_within_granule_dropped() {
        let dim = indexed_dim(Some(1.0));
        let granules = vec![descriptor("a.nc", &[11.0, 10.0, 10.0, 12.0])];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(emitted_values(&plan, &granules), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_leading_and_trailing_bound_fills() {
        let mut dim = indexed_dim(Some(1.0));
        dim.min = Some(crate::config::BoundSpec::Number(8.0));
        dim.max = Some(crate::config::BoundSpec::Number(14.0));
        let granules = vec![descriptor("a.nc", &[10.0, 11.0])];
        let plan = plan_indexed(&dim, &granules).unwrap();
        // fills at 8, 9 before and 12, 13 after; 14 itself excluded
        assert_eq!(
            emitted_values(&plan, &granules),
            vec![8.0, 9.0, 10.0, 11.0, 12.0, 13.0]
        );
        // fill accounting: (max - min) * cadence
        assert_eq!(plan.size, 6);
    }

    #[test]
    fn test_zero_retained_records_plans_empty() {
        let mut dim = indexed_dim(Some(1.0));
        dim.min = Some(crate::config::BoundSpec::Number(100.0));
        dim.max = Some(crate::config::BoundSpec::Number(200.0));
        let granules = vec![descriptor("a.nc", &[10.0, 11.0])];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(plan.size, 0);
        assert!(plan.nodes.is_empty());
    }

    #[test]
    fn test_descriptor_range_prunes_out_of_bounds_granules() {
        let mut dim = indexed_dim(Some(1.0));
        dim.min = Some(crate::config::BoundSpec::Number(10.0));
        dim.max = Some(crate::config::BoundSpec::Number(20.0));
        let granules = vec![
            descriptor("a.nc", &[1.0, 2.0]),
            descriptor("b.nc", &[12.0, 13.0]),
            descriptor("c.nc", &[25.0, 26.0]),
        ];
        let plan = plan_indexed(&dim, &granules).unwrap();
        // a.nc ends before min and c.nc starts after max; both are
        // rejected from their descriptor range alone
        assert_eq!(plan.retained, vec![1]);
        // leading fill 10-11, data 12-13, trailing fill 14-19
        assert_eq!(plan.size, 10);
        assert_eq!(
            emitted_values(&plan, &granules),
            vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0]
        );
    }

    #[test]
    fn test_no_cadence_sorts_without_fills() {
        let dim = indexed_dim(None);
        let granules = vec![
            descriptor("b.nc", &[20.0, 21.0]),
            descriptor("a.nc", &[1.0, 5.0, 3.0]),
        ];
        let plan = plan_indexed(&dim, &granules).unwrap();
        assert_eq!(emitted_values(&plan, &granules), vec![1.0, 3.0, 5.0, 20.0, 21.0]);
        assert_eq!(plan.retained, vec![1, 0]);
    }

    #[test]
    fn test_multidim_fill_carries_inner_steps() {
        let mut dim = DimensionConfig::unlimited("report_number");
        dim.index_by = Some("OB_time".to_string());
        dim.expected_cadence.insert("report_number".to_string(), 1.0);
        dim.expected_cadence.insert("samples_per_record".to_string(), 10.0);
        dim.other_dim_indices.insert("samples_per_record".to_string(), 0);

        let mut g1 = descriptor("a.nc", &[]);
        let mut g2 = descriptor("b.nc", &[]);
        for (g, times) in [(&mut g1, vec![0.0, 1.0]), (&mut g2, vec![3.0])] {
            g.dim_lens.insert("report_number".to_string(), times.len());
            g.index.insert(
                "report_number".to_string(),
                IndexProjection {
                    first: times[0],
                    last: times[times.len() - 1],
                    values: times,
                },
            );
        }

        let plan = plan_indexed(&dim, &[g1, g2]).unwrap();
        assert_eq!(plan.size, 4);
        match &plan.nodes[1] {
            PlanNode::Fill(fill) => {
                assert_eq!(fill.count, 1);
                assert_eq!(fill.start, Some(2.0));
                assert_eq!(fill.inner_steps.get("samples_per_record"), Some(&0.1));
            }
            _ => panic!("expected a fill between the granules"),
        }
    }

    #[test]
    fn test_flatten_plan_is_widest_granule() {
        let dim = DimensionConfig {
            flatten: true,
            ..DimensionConfig::unlimited("feature_number")
        };
        let mut g1 = descriptor("a.nc", &[]);
        let mut g2 = descriptor("b.nc", &[]);
        g1.dim_lens.insert("feature_number".to_string(), 1);
        g2.dim_lens.insert("feature_number".to_string(), 2);
        let plan = plan_flatten(&dim, &[g1, g2]);
        assert_eq!(plan.size, 2);
        assert!(plan.nodes.is_empty());
        assert!(plan.flatten);
    }
}
