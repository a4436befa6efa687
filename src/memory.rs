//! An in-memory implementation of the granule contracts.
//!
//! This backs the engine's test suite and is handy for prototyping a
//! product configuration without touching disk. It mirrors the shape of
//! the netCDF adapter: a store of named granules, read-only handles, and
//! a writer that only publishes its granule on finalize.
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::config::Config;
use crate::dataset::{DataStore, DimSchema, GranuleReader, GranuleWriter, SourceSchema, VarSchema};
use crate::error::{AggError, AggResult};
use crate::types::{AttrValue, NcArray};

/// One in-memory granule: dimensions, variables with data, and global
/// attributes.
#[derive(Debug, Clone, Default)]
pub struct MemGranule {
    pub dims: Vec<DimSchema>,
    pub vars: IndexMap<String, MemVar>,
    pub attrs: IndexMap<String, AttrValue>,
}

#[derive(Debug, Clone)]
pub struct MemVar {
    pub dimensions: Vec<String>,
    pub attributes: IndexMap<String, AttrValue>,
    pub data: NcArray,
}

impl MemGranule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dim(&mut self, name: &str, len: usize) -> &mut Self {
        self.dims.push(DimSchema { name: name.to_string(), len, unlimited: false });
        self
    }

    pub fn add_unlimited_dim(&mut self, name: &str, len: usize) -> &mut Self {
        self.dims.push(DimSchema { name: name.to_string(), len, unlimited: true });
        self
    }

    pub fn add_var(&mut self, name: &str, dimensions: &[&str], data: NcArray) -> &mut Self {
        self.add_var_with_attrs(name, dimensions, data, IndexMap::new())
    }

    pub fn add_var_with_attrs(
        &mut self,
        name: &str,
        dimensions: &[&str],
        data: NcArray,
        attributes: IndexMap<String, AttrValue>,
    ) -> &mut Self {
        self.vars.insert(
            name.to_string(),
            MemVar {
                dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
                attributes,
                data,
            },
        );
        self
    }

    pub fn set_attr(&mut self, name: &str, value: AttrValue) -> &mut Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    pub fn var(&self, name: &str) -> Option<&MemVar> {
        self.vars.get(name)
    }

    fn source_schema(&self) -> SourceSchema {
        SourceSchema {
            dimensions: self.dims.clone(),
            variables: self
                .vars
                .iter()
                .map(|(name, v)| VarSchema {
                    name: name.clone(),
                    dimensions: v.dimensions.clone(),
                    datatype: v.data.dtype(),
                    attributes: v.attributes.clone(),
                })
                .collect(),
            global_attributes: self.attrs.clone(),
        }
    }
}

/// A shared map of path -> granule playing the role of a filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    files: Rc<RefCell<HashMap<PathBuf, Rc<MemGranule>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, granule: MemGranule) {
        self.files.borrow_mut().insert(path.into(), Rc::new(granule));
    }

    /// Fetch a granule, e.g. an aggregation output, for inspection.
    pub fn granule(&self, path: &Path) -> Option<Rc<MemGranule>> {
        self.files.borrow().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }
}

pub struct MemReader {
    path: PathBuf,
    granule: Rc<MemGranule>,
}

impl GranuleReader for MemReader {
    fn schema(&self) -> AggResult<SourceSchema> {
        Ok(self.granule.source_schema())
    }

    fn read_index(
        &self,
        variable: &str,
        other_dim_indices: &IndexMap<String, usize>,
    ) -> AggResult<Vec<f64>> {
        let var = self
            .granule
            .vars
            .get(variable)
            .ok_or_else(|| AggError::io(&self.path, format!("no such variable '{variable}'")))?;
        let outer_len = var.data.len_of(0);
        let ranges: Vec<Range<usize>> = var
            .dimensions
            .iter()
            .enumerate()
            .map(|(i, d)| {
                if i == 0 {
                    0..outer_len
                } else {
                    let idx = other_dim_indices.get(d).copied().unwrap_or(0);
                    idx..idx + 1
                }
            })
            .collect();
        check_ranges(&self.path, variable, &ranges, var.data.shape())?;
        var.data
            .slice(&ranges)
            .as_f64_values()
            .ok_or_else(|| AggError::index_var_non_numeric(&self.path, variable))
    }

    fn read_slice(&self, variable: &str, ranges: &[Range<usize>]) -> AggResult<NcArray> {
        let var = self
            .granule
            .vars
            .get(variable)
            .ok_or_else(|| AggError::io(&self.path, format!("no such variable '{variable}'")))?;
        check_ranges(&self.path, variable, ranges, var.data.shape())?;
        Ok(var.data.slice(ranges))
    }
}

fn check_ranges(
    path: &Path,
    variable: &str,
    ranges: &[Range<usize>],
    shape: &[usize],
) -> AggResult<()> {
    let in_bounds = ranges.len() == shape.len()
        && ranges.iter().zip(shape).all(|(r, &len)| r.start <= r.end && r.end <= len);
    if in_bounds {
        Ok(())
    } else {
        Err(AggError::io(
            path,
            format!("slice {ranges:?} is outside the shape {shape:?} of '{variable}'"),
        ))
    }
}

pub struct MemWriter {
    files: Rc<RefCell<HashMap<PathBuf, Rc<MemGranule>>>>,
    temp_path: PathBuf,
    granule: MemGranule,
}

impl GranuleWriter for MemWriter {
    fn write(&mut self, variable: &str, ranges: &[Range<usize>], data: &NcArray) -> AggResult<()> {
        let var = self
            .granule
            .vars
            .get_mut(variable)
            .ok_or_else(|| AggError::io(&self.temp_path, format!("no such variable '{variable}'")))?;
        var.data.write_slice(ranges, data)
    }

    fn set_global_attr(&mut self, name: &str, value: &AttrValue) -> AggResult<()> {
        self.granule.attrs.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn finalize_and_rename(self, final_path: &Path) -> AggResult<()> {
        self.files.borrow_mut().insert(final_path.to_path_buf(), Rc::new(self.granule));
        Ok(())
    }

    fn discard(self) {}
}

impl DataStore for MemStore {
    type Reader = MemReader;
    type Writer = MemWriter;

    fn open(&self, path: &Path) -> AggResult<Self::Reader> {
        let granule = self
            .granule(path)
            .ok_or_else(|| AggError::io(path, "no such granule"))?;
        Ok(MemReader { path: path.to_path_buf(), granule })
    }

    fn create(
        &self,
        path: &Path,
        config: &Config,
        udim_sizes: &IndexMap<String, usize>,
    ) -> AggResult<Self::Writer> {
        let mut granule = MemGranule::new();
        for dim in &config.dimensions {
            match dim.size {
                Some(size) => granule.add_dim(&dim.name, size),
                None => granule
                    .add_unlimited_dim(&dim.name, udim_sizes.get(&dim.name).copied().unwrap_or(0)),
            };
        }

        for var in &config.variables {
            let shape: Vec<usize> = var
                .dimensions
                .iter()
                .map(|d| granule.dims.iter().find(|g| &g.name == d).map(|g| g.len).unwrap_or(0))
                .collect();
            // unwritten cells keep the fill default
            let data = NcArray::full(var.datatype, &shape, var.fill_value());
            granule.vars.insert(
                var.name.clone(),
                MemVar {
                    dimensions: var.dimensions.clone(),
                    attributes: var.attributes.clone(),
                    data,
                },
            );
        }

        Ok(MemWriter {
            files: Rc::clone(&self.files),
            temp_path: path.to_path_buf(),
            granule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_read_index_projects_other_dims() {
        let mut granule = MemGranule::new();
        granule.add_unlimited_dim("report_number", 2);
        granule.add_dim("samples_per_record", 3);
        granule.add_var(
            "OB_time",
            &["report_number", "samples_per_record"],
            NcArray::F64(arr2(&[[10.0, 10.1, 10.2], [11.0, 11.1, 11.2]]).into_dyn()),
        );

        let store = MemStore::new();
        store.insert("g.nc", granule);
        let reader = store.open(Path::new("g.nc")).unwrap();

        let projected = reader.read_index("OB_time", &IndexMap::new()).unwrap();
        assert_eq!(projected, vec![10.0, 11.0]);

        let mut pins = IndexMap::new();
        pins.insert("samples_per_record".to_string(), 2);
        let projected = reader.read_index("OB_time", &pins).unwrap();
        assert_eq!(projected, vec![10.2, 11.2]);
    }

    #[test]
    fn test_read_slice_bounds_checked() {
        let mut granule = MemGranule::new();
        granule.add_unlimited_dim("t", 2);
        granule.add_var("x", &["t"], NcArray::F64(ndarray::arr1(&[1.0, 2.0]).into_dyn()));
        let store = MemStore::new();
        store.insert("g.nc", granule);
        let reader = store.open(Path::new("g.nc")).unwrap();

        assert!(reader.read_slice("x", &[0..2]).is_ok());
        assert!(matches!(reader.read_slice("x", &[0..3]), Err(AggError::Io { .. })));
        assert!(matches!(reader.read_slice("y", &[0..1]), Err(AggError::Io { .. })));
    }

    #[test]
    fn test_writer_publishes_only_on_finalize() {
        let store = MemStore::new();
        let config = Config::from_json_str(
            r#"{
                "dimensions": [{"name": "t", "size": null}],
                "variables": [{"name": "x", "dimensions": ["t"], "datatype": "float64"}],
                "global attributes": []
            }"#,
        )
        .unwrap();
        let mut sizes = IndexMap::new();
        sizes.insert("t".to_string(), 2);

        let mut writer = store.create(Path::new("out.nc.tmp"), &config, &sizes).unwrap();
        writer
            .write("x", &[0..2], &NcArray::F64(ndarray::arr1(&[5.0, 6.0]).into_dyn()))
            .unwrap();
        assert!(!store.contains(Path::new("out.nc")));
        writer.finalize_and_rename(Path::new("out.nc")).unwrap();

        let out = store.granule(Path::new("out.nc")).unwrap();
        assert_eq!(
            out.var("x").unwrap().data,
            NcArray::F64(ndarray::arr1(&[5.0, 6.0]).into_dyn())
        );
    }
}
