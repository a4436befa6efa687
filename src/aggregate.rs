//! The top-level aggregation call.
//!
//! `aggregate` composes the whole pipeline as one blocking call:
//! inspect the inputs, build the plan, evaluate it into a temporary
//! output, and atomically rename on success. On any failure nothing is
//! left at the output path.
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::attributes::AttrContext;
use crate::config::Config;
use crate::dataset::{DataStore, GranuleReader, GranuleWriter};
use crate::error::{AggError, AggResult};
use crate::evaluate::{evaluate, retained_input_count, CancelToken};
use crate::granule::GranuleDescriptor;
use crate::plan::{build_plan, Plan};

/// Knobs for a single aggregation run. The version string ends up in
/// the `ncagg_version` attribute strategy; it is injected here rather
/// than read from ambient state so library consumers can report their
/// own.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub version: String,
    pub cancel: CancelToken,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            cancel: CancelToken::new(),
        }
    }
}

/// Aggregate `inputs` into a single granule at `output`.
///
/// With no configuration, a default is derived from the first input's
/// schema. On success the output exists at `output`; on failure the
/// error is returned and no file is left there.
pub fn aggregate<S: DataStore>(
    store: &S,
    inputs: &[PathBuf],
    output: &Path,
    config: Option<&Config>,
) -> AggResult<()> {
    aggregate_with(store, inputs, output, config, AggregateOptions::default())
}

pub fn aggregate_with<S: DataStore>(
    store: &S,
    inputs: &[PathBuf],
    output: &Path,
    config: Option<&Config>,
    options: AggregateOptions,
) -> AggResult<()> {
    if inputs.is_empty() {
        return Err(AggError::NoInputs);
    }
    // Granules concatenate in filename order wherever no index variable
    // says otherwise.
    let inputs: Vec<&PathBuf> = inputs
        .iter()
        .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
        .collect();

    let derived;
    let config = match config {
        Some(c) => c,
        None => {
            let reader = store.open(inputs[0])?;
            derived = Config::from_sample(&reader.schema()?);
            &derived
        }
    };
    config.validate()?;

    let mut descriptors = Vec::with_capacity(inputs.len());
    for path in &inputs {
        options.cancel.check()?;
        let reader = store.open(path)?;
        descriptors.push(GranuleDescriptor::inspect(path, &reader, config)?);
    }
    log::info!("inspected {} input granules", descriptors.len());

    let plan = build_plan(config, &descriptors)?;
    let ctx = attr_context(config, &plan, &descriptors, output, &options)?;

    let temp = temp_path(output);
    let mut writer = store.create(&temp, config, &plan.udim_sizes())?;
    match evaluate(store, config, &descriptors, &plan, &mut writer, &ctx, &options.cancel) {
        Ok(()) => {
            writer.finalize_and_rename(output)?;
            log::info!("wrote {}", output.display());
            Ok(())
        }
        Err(e) => {
            log::error!("aggregation failed, discarding partial output: {e}");
            writer.discard();
            Err(e)
        }
    }
}

fn attr_context(
    config: &Config,
    plan: &Plan,
    descriptors: &[GranuleDescriptor],
    output: &Path,
    options: &AggregateOptions,
) -> AggResult<AttrContext> {
    let mut ctx = AttrContext {
        output_filename: output
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| output.display().to_string()),
        input_count: retained_input_count(config, plan, descriptors.len()),
        version: options.version.clone(),
        date_format: config.date_format.clone(),
        ..AttrContext::default()
    };

    if let Some(dim) = config.primary_udim() {
        let (min, max) = dim.resolve_bounds()?;
        ctx.bound_min = min;
        ctx.bound_max = max;
        if let Some(dim_plan) = plan.dim(&dim.name) {
            ctx.first_index_value = dim_plan.first_index_value;
            ctx.last_index_value = dim_plan.last_index_value;
            ctx.first_input_filename =
                dim_plan.first_granule().map(|gi| descriptors[gi].filename.clone());
            ctx.last_input_filename =
                dim_plan.last_granule().map(|gi| descriptors[gi].filename.clone());
        }
    }
    Ok(ctx)
}

/// The output is created next to its final location and renamed into
/// place on success.
fn temp_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ncagg-output".to_string());
    output.with_file_name(format!("{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemGranule, MemStore};
    use crate::types::{AttrValue, NcArray};
    use indexmap::IndexMap;
    use ndarray::{arr1, Array2};

    const FILL_F32: f32 = -1.0;

    fn fill_attrs(fill: AttrValue) -> IndexMap<String, AttrValue> {
        let mut attrs = IndexMap::new();
        attrs.insert("_FillValue".to_string(), fill);
        attrs
    }

    /// A granule with `time(record_number)` and `data(record_number)`,
    /// where data mirrors time as f32 so row provenance is checkable.
    fn simple_granule(times: &[f64], data: &[f32]) -> MemGranule {
        let mut granule = MemGranule::new();
        granule.add_unlimited_dim("record_number", times.len());
        granule.add_var_with_attrs(
            "time",
            &["record_number"],
            NcArray::F64(arr1(times).into_dyn()),
            fill_attrs(AttrValue::Float(-9999.0)),
        );
        granule.add_var_with_attrs(
            "data",
            &["record_number"],
            NcArray::F32(arr1(data).into_dyn()),
            fill_attrs(AttrValue::Float(FILL_F32 as f64)),
        );
        granule
    }

    fn simple_config(udc: &str) -> Config {
        let json = format!(
            r#"{{
                "dimensions": [
                    {{"name": "record_number", "size": null{udc}}}
                ],
                "variables": [
                    {{"name": "time", "dimensions": ["record_number"],
                      "datatype": "float64",
                      "attributes": {{"_FillValue": -9999.0}},
                      "chunksizes": [1024]}},
                    {{"name": "data", "dimensions": ["record_number"],
                      "datatype": "float32",
                      "attributes": {{"_FillValue": -1.0}},
                      "chunksizes": [1024]}}
                ],
                "global attributes": []
            }}"#
        );
        Config::from_json_str(&json).unwrap()
    }

    fn indexed_config() -> Config {
        simple_config(
            r#",
            "index_by": "time",
            "expected_cadence": {"record_number": 1.0}"#,
        )
    }

    fn out_times(store: &MemStore, path: &str) -> Vec<f64> {
        store
            .granule(Path::new(path))
            .unwrap()
            .var("time")
            .unwrap()
            .data
            .as_f64_values()
            .unwrap()
    }

    fn out_data(store: &MemStore, path: &str) -> Vec<f64> {
        store
            .granule(Path::new(path))
            .unwrap()
            .var("data")
            .unwrap()
            .data
            .as_f64_values()
            .unwrap()
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(*n)).collect()
    }

    #[test]
    fn test_s1_simple_concat_filename_order() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]));
        store.insert("b.nc", simple_granule(&[0.0, 0.0, 0.0], &[4.0, 5.0, 6.0]));
        let config = simple_config("");

        // inputs deliberately out of order; filename order must win
        aggregate(&store, &paths(&["b.nc", "a.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        let out = store.granule(Path::new("out.nc")).unwrap();
        assert_eq!(out.dims.iter().find(|d| d.name == "record_number").unwrap().len, 6);
        assert_eq!(out_data(&store, "out.nc"), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_s2_sort_by_time() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0, 12.0, 11.0], &[10.0, 12.0, 11.0]));
        store.insert("b.nc", simple_granule(&[14.0, 13.0, 15.0], &[14.0, 13.0, 15.0]));
        let config = indexed_config();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        assert_eq!(out_times(&store, "out.nc"), vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        // rows moved with their index values
        assert_eq!(out_data(&store, "out.nc"), vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn test_s3_gap_fill() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0, 11.0], &[1.0, 2.0]));
        store.insert("b.nc", simple_granule(&[14.0, 15.0], &[3.0, 4.0]));
        let config = indexed_config();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        assert_eq!(out_times(&store, "out.nc"), vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        let data = out_data(&store, "out.nc");
        assert_eq!(data[..2], [1.0, 2.0]);
        assert_eq!(data[2], FILL_F32 as f64);
        assert_eq!(data[3], FILL_F32 as f64);
        assert_eq!(data[4..], [3.0, 4.0]);
    }

    #[test]
    fn test_s4_dedup_overlap_takes_earlier_granule() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0, 11.0, 12.0], &[1.0, 2.0, 3.0]));
        store.insert("b.nc", simple_granule(&[12.0, 13.0], &[30.0, 31.0]));
        let config = indexed_config();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        assert_eq!(out_times(&store, "out.nc"), vec![10.0, 11.0, 12.0, 13.0]);
        // the 12.0 row comes from a.nc, not b.nc
        assert_eq!(out_data(&store, "out.nc"), vec![1.0, 2.0, 3.0, 31.0]);
    }

    #[test]
    fn test_s5_bound_chop_half_open() {
        let store = MemStore::new();
        store.insert(
            "a.nc",
            simple_granule(&[9.6, 10.0, 10.4, 11.0, 11.6], &[1.0, 2.0, 3.0, 4.0, 5.0]),
        );
        let mut config = indexed_config();
        config.dimensions[0].min = Some(crate::config::BoundSpec::Number(10.0));
        config.dimensions[0].max = Some(crate::config::BoundSpec::Number(11.5));

        aggregate(&store, &paths(&["a.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        assert_eq!(out_times(&store, "out.nc"), vec![10.0, 10.4, 11.0]);
        assert_eq!(out_data(&store, "out.nc"), vec![2.0, 3.0, 4.0]);
    }

    fn report_granule(times: &[f64]) -> MemGranule {
        let n = times.len();
        let ob_time = Array2::from_shape_fn((n, 10), |(r, j)| times[r] + j as f64 * 0.1);
        let sensor = Array2::from_shape_fn((n, 10), |(r, j)| (times[r] * 10.0 + j as f64) as f32);
        let mut granule = MemGranule::new();
        granule.add_unlimited_dim("report_number", n);
        granule.add_dim("samples_per_record", 10);
        granule.add_var_with_attrs(
            "OB_time",
            &["report_number", "samples_per_record"],
            NcArray::F64(ob_time.into_dyn()),
            fill_attrs(AttrValue::Float(-9999.0)),
        );
        granule.add_var_with_attrs(
            "sensor",
            &["report_number", "samples_per_record"],
            NcArray::F32(sensor.into_dyn()),
            fill_attrs(AttrValue::Float(FILL_F32 as f64)),
        );
        granule
    }

    #[test]
    fn test_s6_multidim_index_fill_lattice() {
        let store = MemStore::new();
        store.insert("a.nc", report_granule(&[0.0, 1.0]));
        store.insert("b.nc", report_granule(&[3.0]));

        let config = Config::from_json_str(
            r#"{
                "dimensions": [
                    {"name": "report_number", "size": null,
                     "index_by": "OB_time",
                     "other_dim_indices": {"samples_per_record": 0},
                     "expected_cadence": {"report_number": 1.0,
                                          "samples_per_record": 10.0}},
                    {"name": "samples_per_record", "size": 10}
                ],
                "variables": [
                    {"name": "OB_time",
                     "dimensions": ["report_number", "samples_per_record"],
                     "datatype": "float64",
                     "attributes": {"_FillValue": -9999.0}},
                    {"name": "sensor",
                     "dimensions": ["report_number", "samples_per_record"],
                     "datatype": "float32",
                     "attributes": {"_FillValue": -1.0}}
                ],
                "global attributes": []
            }"#,
        )
        .unwrap();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        let out = store.granule(Path::new("out.nc")).unwrap();
        assert_eq!(out.dims.iter().find(|d| d.name == "report_number").unwrap().len, 4);

        let ob_time = out.var("OB_time").unwrap().data.as_f64_values().unwrap();
        // row 2 (the missing report) carries a full synthesized inner cadence
        for j in 0..10 {
            let expected = 2.0 + j as f64 * 0.1;
            assert!(
                (ob_time[2 * 10 + j] - expected).abs() < 1e-9,
                "synthesized OB_time[2][{j}] = {}, expected {expected}",
                ob_time[2 * 10 + j]
            );
        }
        // non-index variables are filled across the missing report
        let sensor = out.var("sensor").unwrap().data.as_f64_values().unwrap();
        assert!(sensor[2 * 10..3 * 10].iter().all(|&v| v == FILL_F32 as f64));
        assert_eq!(sensor[3 * 10], 30.0);
    }

    #[test]
    fn test_s7_flatten() {
        let mut a = MemGranule::new();
        a.add_unlimited_dim("time", 1);
        a.add_unlimited_dim("feature_number", 1);
        a.add_var("time", &["time"], NcArray::F64(arr1(&[100.0]).into_dyn()));
        a.add_var_with_attrs(
            "flux",
            &["time", "feature_number"],
            NcArray::F64(Array2::from_shape_vec((1, 1), vec![3.2e-6]).unwrap().into_dyn()),
            fill_attrs(AttrValue::Float(-999.0)),
        );

        let mut b = MemGranule::new();
        b.add_unlimited_dim("time", 1);
        b.add_unlimited_dim("feature_number", 2);
        b.add_var("time", &["time"], NcArray::F64(arr1(&[200.0]).into_dyn()));
        b.add_var_with_attrs(
            "flux",
            &["time", "feature_number"],
            NcArray::F64(Array2::from_shape_vec((1, 2), vec![3.3e-6, 5.4e-7]).unwrap().into_dyn()),
            fill_attrs(AttrValue::Float(-999.0)),
        );

        let store = MemStore::new();
        store.insert("a.nc", a);
        store.insert("b.nc", b);

        let config = Config::from_json_str(
            r#"{
                "dimensions": [
                    {"name": "time", "size": null},
                    {"name": "feature_number", "size": null, "flatten": true}
                ],
                "variables": [
                    {"name": "time", "dimensions": ["time"], "datatype": "float64"},
                    {"name": "flux", "dimensions": ["time", "feature_number"],
                     "datatype": "float64",
                     "attributes": {"_FillValue": -999.0}}
                ],
                "global attributes": []
            }"#,
        )
        .unwrap();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        let out = store.granule(Path::new("out.nc")).unwrap();
        assert_eq!(out.dims.iter().find(|d| d.name == "feature_number").unwrap().len, 2);
        let flux = out.var("flux").unwrap().data.as_f64_values().unwrap();
        assert_eq!(flux, vec![3.2e-6, -999.0, 3.3e-6, 5.4e-7]);
    }

    #[test]
    fn test_s8_constant_strategy_violation_leaves_no_output() {
        let store = MemStore::new();
        let mut a = simple_granule(&[10.0], &[1.0]);
        a.set_attr("platform", AttrValue::from("GOES-16"));
        let mut b = simple_granule(&[11.0], &[2.0]);
        b.set_attr("platform", AttrValue::from("GOES-17"));
        store.insert("a.nc", a);
        store.insert("b.nc", b);

        let mut config = indexed_config();
        config.global_attributes.push(crate::config::GlobalAttrConfig {
            name: "platform".to_string(),
            strategy: crate::attributes::StrategyKind::Constant,
            value: None,
        });

        let err = aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config))
            .unwrap_err();
        assert!(matches!(err, AggError::AttrNotConstant { .. }));
        assert!(!store.contains(Path::new("out.nc")));
    }

    #[test]
    fn test_no_inputs() {
        let store = MemStore::new();
        assert!(matches!(
            aggregate(&store, &[], Path::new("out.nc"), None),
            Err(AggError::NoInputs)
        ));
    }

    #[test]
    fn test_single_granule_round_trip_with_default_config() {
        let store = MemStore::new();
        let granule = simple_granule(&[10.0, 11.0, 12.0], &[1.0, 2.0, 3.0]);
        store.insert("a.nc", granule.clone());

        aggregate(&store, &paths(&["a.nc"]), Path::new("out.nc"), None).unwrap();

        let out = store.granule(Path::new("out.nc")).unwrap();
        assert_eq!(out.var("time").unwrap().data, granule.var("time").unwrap().data);
        assert_eq!(out.var("data").unwrap().data, granule.var("data").unwrap().data);
    }

    #[test]
    fn test_aggregation_is_idempotent_on_records() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0, 11.0], &[1.0, 2.0]));
        store.insert("b.nc", simple_granule(&[13.0, 14.0], &[3.0, 4.0]));
        let config = indexed_config();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out1.nc"), Some(&config)).unwrap();
        aggregate(&store, &paths(&["out1.nc"]), Path::new("out2.nc"), Some(&config)).unwrap();

        assert_eq!(out_times(&store, "out1.nc"), out_times(&store, "out2.nc"));
        assert_eq!(out_data(&store, "out1.nc"), out_data(&store, "out2.nc"));
    }

    #[test]
    fn test_missing_variable_substitutes_fill() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0, 11.0], &[1.0, 2.0]));
        let mut b = MemGranule::new();
        b.add_unlimited_dim("record_number", 2);
        b.add_var_with_attrs(
            "time",
            &["record_number"],
            NcArray::F64(arr1(&[12.0, 13.0]).into_dyn()),
            fill_attrs(AttrValue::Float(-9999.0)),
        );
        store.insert("b.nc", b);
        let config = indexed_config();

        aggregate(&store, &paths(&["a.nc", "b.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        assert_eq!(out_times(&store, "out.nc"), vec![10.0, 11.0, 12.0, 13.0]);
        assert_eq!(
            out_data(&store, "out.nc"),
            vec![1.0, 2.0, FILL_F32 as f64, FILL_F32 as f64]
        );
    }

    #[test]
    fn test_nan_replaced_by_fill() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0, 11.0], &[1.0, f32::NAN]));
        let config = indexed_config();

        aggregate(&store, &paths(&["a.nc"]), Path::new("out.nc"), Some(&config)).unwrap();
        assert_eq!(out_data(&store, "out.nc"), vec![1.0, FILL_F32 as f64]);
    }

    #[test]
    fn test_attribute_order_and_remove() {
        let store = MemStore::new();
        let mut a = simple_granule(&[10.0], &[1.0]);
        a.set_attr("title", AttrValue::from("granule title"));
        a.set_attr("history", AttrValue::from("noise"));
        store.insert("a.nc", a);

        let mut config = indexed_config();
        for (name, strategy, value) in [
            ("title", crate::attributes::StrategyKind::First, None),
            ("history", crate::attributes::StrategyKind::Remove, None),
            (
                "processing_level",
                crate::attributes::StrategyKind::Static,
                Some(AttrValue::from("L1b")),
            ),
            ("input_count", crate::attributes::StrategyKind::InputCount, None),
        ] {
            config.global_attributes.push(crate::config::GlobalAttrConfig {
                name: name.to_string(),
                strategy,
                value,
            });
        }

        aggregate(&store, &paths(&["a.nc"]), Path::new("out.nc"), Some(&config)).unwrap();

        let out = store.granule(Path::new("out.nc")).unwrap();
        let keys: Vec<&str> = out.attrs.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["title", "processing_level", "input_count"]);
        assert_eq!(out.attrs["processing_level"], AttrValue::from("L1b"));
        assert_eq!(out.attrs["input_count"], AttrValue::Int(1));
    }

    #[test]
    fn test_cancellation_discards_output() {
        let store = MemStore::new();
        store.insert("a.nc", simple_granule(&[10.0], &[1.0]));
        let config = indexed_config();

        let options = AggregateOptions::default();
        options.cancel.cancel();
        let err = aggregate_with(
            &store,
            &paths(&["a.nc"]),
            Path::new("out.nc"),
            Some(&config),
            options,
        )
        .unwrap_err();
        assert!(matches!(err, AggError::Cancelled));
        assert!(!store.contains(Path::new("out.nc")));
    }

    #[test]
    fn test_schema_mismatch_fixed_dim() {
        let store = MemStore::new();
        store.insert("a.nc", report_granule(&[0.0]));

        let config = Config::from_json_str(
            r#"{
                "dimensions": [
                    {"name": "report_number", "size": null},
                    {"name": "samples_per_record", "size": 12}
                ],
                "variables": [
                    {"name": "OB_time",
                     "dimensions": ["report_number", "samples_per_record"],
                     "datatype": "float64"}
                ],
                "global attributes": []
            }"#,
        )
        .unwrap();

        let err =
            aggregate(&store, &paths(&["a.nc"]), Path::new("out.nc"), Some(&config)).unwrap_err();
        assert!(matches!(err, AggError::SchemaMismatch { .. }));
        assert!(!store.contains(Path::new("out.nc")));
    }
}
