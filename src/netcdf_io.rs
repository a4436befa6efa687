//! The `netcdf`-crate-backed implementation of the granule contracts.
//!
//! Only compiled with the `netcdf` feature. Handles are scoped exactly
//! to the trait calls: a reader owns its `netcdf::File` and is dropped
//! by the evaluator after each node visit, so no handle outlives its
//! use even on error paths.
use std::ops::Range;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::{AttributeValue, Extent, Extents};

use crate::config::Config;
use crate::dataset::{DataStore, DimSchema, GranuleReader, GranuleWriter, SourceSchema, VarSchema};
use crate::error::{AggError, AggResult};
use crate::types::{AttrValue, DataType, NcArray};

/// Granule access through netCDF files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfStore;

impl NetcdfStore {
    pub fn new() -> Self {
        Self
    }
}

impl DataStore for NetcdfStore {
    type Reader = NcReader;
    type Writer = NcWriter;

    fn open(&self, path: &Path) -> AggResult<Self::Reader> {
        let file = netcdf::open(path).map_err(|e| AggError::io(path, e.to_string()))?;
        Ok(NcReader { path: path.to_path_buf(), file })
    }

    fn create(
        &self,
        path: &Path,
        config: &Config,
        _udim_sizes: &IndexMap<String, usize>,
    ) -> AggResult<Self::Writer> {
        let mut file = netcdf::create(path).map_err(|e| AggError::io(path, e.to_string()))?;
        let io_err = |e: netcdf::Error| AggError::io(path, e.to_string());

        for dim in &config.dimensions {
            match dim.size {
                Some(size) => file.add_dimension(&dim.name, size).map(|_| ()).map_err(io_err)?,
                // unlimited dimensions grow as the evaluator writes
                None => file.add_unlimited_dimension(&dim.name).map(|_| ()).map_err(io_err)?,
            }
        }

        for var in &config.variables {
            let dims: Vec<&str> = var.dimensions.iter().map(|d| d.as_str()).collect();
            let mut nc_var = match var.datatype {
                DataType::Int8 => file.add_variable::<i8>(&var.name, &dims),
                DataType::Int16 => file.add_variable::<i16>(&var.name, &dims),
                DataType::Int32 => file.add_variable::<i32>(&var.name, &dims),
                DataType::Int64 => file.add_variable::<i64>(&var.name, &dims),
                DataType::UInt8 => file.add_variable::<u8>(&var.name, &dims),
                DataType::UInt16 => file.add_variable::<u16>(&var.name, &dims),
                DataType::UInt32 => file.add_variable::<u32>(&var.name, &dims),
                DataType::UInt64 => file.add_variable::<u64>(&var.name, &dims),
                DataType::Float32 => file.add_variable::<f32>(&var.name, &dims),
                DataType::Float64 => file.add_variable::<f64>(&var.name, &dims),
                DataType::Str => file.add_string_variable(&var.name, &dims),
            }
            .map_err(io_err)?;

            if let Some(chunks) = &var.chunksizes {
                nc_var.set_chunking(chunks).map_err(io_err)?;
            }

            for (attr_name, value) in &var.attributes {
                if attr_name == "_FillValue" {
                    set_fill(&mut nc_var, var.datatype, value).map_err(io_err)?;
                } else {
                    nc_var.put_attribute(attr_name, to_nc_attr(value)).map_err(io_err)?;
                }
            }
        }

        Ok(NcWriter { temp_path: path.to_path_buf(), file })
    }
}

pub struct NcReader {
    path: PathBuf,
    file: netcdf::File,
}

impl GranuleReader for NcReader {
    fn schema(&self) -> AggResult<SourceSchema> {
        let dimensions = self
            .file
            .dimensions()
            .map(|d| DimSchema {
                name: d.name(),
                len: d.len(),
                unlimited: d.is_unlimited(),
            })
            .collect();

        let mut variables = Vec::new();
        for var in self.file.variables() {
            let datatype = match to_datatype(&var.vartype()) {
                Some(dt) => dt,
                None => {
                    log::warn!(
                        "skipping variable '{}' in {}: unsupported datatype",
                        var.name(),
                        self.path.display()
                    );
                    continue;
                }
            };
            variables.push(VarSchema {
                name: var.name(),
                dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
                datatype,
                attributes: read_attrs(var.attributes(), &self.path),
            });
        }

        Ok(SourceSchema {
            dimensions,
            variables,
            global_attributes: read_attrs(self.file.attributes(), &self.path),
        })
    }

    fn read_index(
        &self,
        variable: &str,
        other_dim_indices: &IndexMap<String, usize>,
    ) -> AggResult<Vec<f64>> {
        let var = self
            .file
            .variable(variable)
            .ok_or_else(|| AggError::io(&self.path, format!("no such variable '{variable}'")))?;

        let extents: Vec<Extent> = var
            .dimensions()
            .iter()
            .enumerate()
            .map(|(i, d)| {
                if i == 0 {
                    Extent::SliceCount { start: 0, count: d.len(), stride: 1 }
                } else {
                    let idx = other_dim_indices.get(&d.name()).copied().unwrap_or(0);
                    Extent::SliceCount { start: idx, count: 1, stride: 1 }
                }
            })
            .collect();

        read_array(&var, Extents::from(extents), &self.path)?
            .as_f64_values()
            .ok_or_else(|| AggError::index_var_non_numeric(&self.path, variable))
    }

    fn read_slice(&self, variable: &str, ranges: &[Range<usize>]) -> AggResult<NcArray> {
        let var = self
            .file
            .variable(variable)
            .ok_or_else(|| AggError::io(&self.path, format!("no such variable '{variable}'")))?;
        read_array(&var, to_extents(ranges), &self.path)
    }
}

pub struct NcWriter {
    temp_path: PathBuf,
    file: netcdf::FileMut,
}

impl GranuleWriter for NcWriter {
    fn write(&mut self, variable: &str, ranges: &[Range<usize>], data: &NcArray) -> AggResult<()> {
        let path = self.temp_path.clone();
        let mut var = self
            .file
            .variable_mut(variable)
            .ok_or_else(|| AggError::io(&path, format!("no such variable '{variable}'")))?;
        let extents = to_extents(ranges);
        let io_err = |e: netcdf::Error| AggError::io(&path, e.to_string());

        match data {
            NcArray::I8(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::I16(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::I32(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::I64(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::U8(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::U16(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::U32(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::U64(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::F32(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::F64(a) => var.put(a.view(), extents).map_err(io_err),
            NcArray::Str(_) => Err(AggError::io(
                &path,
                "writing netCDF string variables is not supported",
            )),
        }
    }

    fn set_global_attr(&mut self, name: &str, value: &AttrValue) -> AggResult<()> {
        self.file
            .add_attribute(name, to_nc_attr(value))
            .map(|_| ())
            .map_err(|e| AggError::io(&self.temp_path, e.to_string()))
    }

    fn finalize_and_rename(self, final_path: &Path) -> AggResult<()> {
        let temp = self.temp_path;
        drop(self.file);
        std::fs::rename(&temp, final_path).map_err(|e| AggError::io_from(final_path, e))
    }

    fn discard(self) {
        let temp = self.temp_path;
        drop(self.file);
        if let Err(e) = std::fs::remove_file(&temp) {
            log::warn!("could not remove partial output {}: {e}", temp.display());
        }
    }
}

fn to_extents(ranges: &[Range<usize>]) -> Extents {
    let extents: Vec<Extent> = ranges
        .iter()
        .map(|r| Extent::SliceCount {
            start: r.start,
            count: r.end.saturating_sub(r.start),
            stride: 1,
        })
        .collect();
    Extents::from(extents)
}

fn to_datatype(vartype: &NcVariableType) -> Option<DataType> {
    match vartype {
        NcVariableType::Int(IntType::I8) => Some(DataType::Int8),
        NcVariableType::Int(IntType::I16) => Some(DataType::Int16),
        NcVariableType::Int(IntType::I32) => Some(DataType::Int32),
        NcVariableType::Int(IntType::I64) => Some(DataType::Int64),
        NcVariableType::Int(IntType::U8) => Some(DataType::UInt8),
        NcVariableType::Int(IntType::U16) => Some(DataType::UInt16),
        NcVariableType::Int(IntType::U32) => Some(DataType::UInt32),
        NcVariableType::Int(IntType::U64) => Some(DataType::UInt64),
        NcVariableType::Float(FloatType::F32) => Some(DataType::Float32),
        NcVariableType::Float(FloatType::F64) => Some(DataType::Float64),
        // classic char data round-trips as unsigned bytes
        NcVariableType::Char => Some(DataType::UInt8),
        NcVariableType::String => Some(DataType::Str),
        _ => None,
    }
}

fn read_array(var: &netcdf::Variable, extents: Extents, path: &Path) -> AggResult<NcArray> {
    let io_err = |e: netcdf::Error| AggError::io(path, e.to_string());
    match var.vartype() {
        NcVariableType::Int(IntType::I8) => {
            Ok(NcArray::I8(var.get::<i8, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::I16) => {
            Ok(NcArray::I16(var.get::<i16, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::I32) => {
            Ok(NcArray::I32(var.get::<i32, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::I64) => {
            Ok(NcArray::I64(var.get::<i64, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::U8) => {
            Ok(NcArray::U8(var.get::<u8, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::U16) => {
            Ok(NcArray::U16(var.get::<u16, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::U32) => {
            Ok(NcArray::U32(var.get::<u32, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Int(IntType::U64) => {
            Ok(NcArray::U64(var.get::<u64, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Float(FloatType::F32) => {
            Ok(NcArray::F32(var.get::<f32, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Float(FloatType::F64) => {
            Ok(NcArray::F64(var.get::<f64, _>(extents).map_err(io_err)?))
        }
        NcVariableType::Char => Ok(NcArray::U8(var.get::<u8, _>(extents).map_err(io_err)?)),
        other => Err(AggError::io(
            path,
            format!("variable '{}' has unsupported datatype {other:?}", var.name()),
        )),
    }
}

fn read_attrs<'a>(
    attrs: impl Iterator<Item = netcdf::Attribute<'a>>,
    path: &Path,
) -> IndexMap<String, AttrValue> {
    let mut out = IndexMap::new();
    for attr in attrs {
        let name = attr.name().to_string();
        match attr.value() {
            Ok(value) => {
                if let Some(converted) = from_nc_attr(value) {
                    out.insert(name, converted);
                }
            }
            Err(e) => {
                log::warn!("could not read attribute '{name}' in {}: {e}", path.display());
            }
        }
    }
    out
}

fn from_nc_attr(value: AttributeValue) -> Option<AttrValue> {
    let converted = match value {
        AttributeValue::Schar(v) => AttrValue::Int(v as i64),
        AttributeValue::Uchar(v) => AttrValue::Int(v as i64),
        AttributeValue::Short(v) => AttrValue::Int(v as i64),
        AttributeValue::Ushort(v) => AttrValue::Int(v as i64),
        AttributeValue::Int(v) => AttrValue::Int(v as i64),
        AttributeValue::Uint(v) => AttrValue::Int(v as i64),
        AttributeValue::Longlong(v) => AttrValue::Int(v),
        AttributeValue::Ulonglong(v) => AttrValue::Int(v as i64),
        AttributeValue::Float(v) => AttrValue::Float(v as f64),
        AttributeValue::Double(v) => AttrValue::Float(v),
        AttributeValue::Str(s) => AttrValue::Str(s),
        AttributeValue::Schars(vs) => AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect()),
        AttributeValue::Uchars(vs) => AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect()),
        AttributeValue::Shorts(vs) => AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect()),
        AttributeValue::Ushorts(vs) => {
            AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect())
        }
        AttributeValue::Ints(vs) => AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect()),
        AttributeValue::Uints(vs) => AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect()),
        AttributeValue::Longlongs(vs) => AttrValue::IntList(vs),
        AttributeValue::Ulonglongs(vs) => {
            AttrValue::IntList(vs.into_iter().map(|v| v as i64).collect())
        }
        AttributeValue::Floats(vs) => {
            AttrValue::FloatList(vs.into_iter().map(|v| v as f64).collect())
        }
        AttributeValue::Doubles(vs) => AttrValue::FloatList(vs),
        AttributeValue::Strs(vs) => AttrValue::StrList(vs),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(converted)
}

fn to_nc_attr(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Int(v) => AttributeValue::Longlong(*v),
        AttrValue::Float(v) => AttributeValue::Double(*v),
        AttrValue::Str(s) => AttributeValue::Str(s.clone()),
        AttrValue::IntList(vs) => AttributeValue::Longlongs(vs.clone()),
        AttrValue::FloatList(vs) => AttributeValue::Doubles(vs.clone()),
        AttrValue::StrList(vs) => AttributeValue::Strs(vs.clone()),
    }
}

fn set_fill(
    var: &mut netcdf::VariableMut,
    datatype: DataType,
    fill: &AttrValue,
) -> netcdf::Result<()> {
    match datatype {
        DataType::Int8 => var.set_fill_value(fill.as_i64().unwrap_or_default() as i8),
        DataType::Int16 => var.set_fill_value(fill.as_i64().unwrap_or_default() as i16),
        DataType::Int32 => var.set_fill_value(fill.as_i64().unwrap_or_default() as i32),
        DataType::Int64 => var.set_fill_value(fill.as_i64().unwrap_or_default()),
        DataType::UInt8 => var.set_fill_value(fill.as_i64().unwrap_or_default() as u8),
        DataType::UInt16 => var.set_fill_value(fill.as_i64().unwrap_or_default() as u16),
        DataType::UInt32 => var.set_fill_value(fill.as_i64().unwrap_or_default() as u32),
        DataType::UInt64 => var.set_fill_value(fill.as_i64().unwrap_or_default() as u64),
        DataType::Float32 => var.set_fill_value(fill.as_f64().unwrap_or_default() as f32),
        DataType::Float64 => var.set_fill_value(fill.as_f64().unwrap_or_default()),
        // string variables have no scalar fill
        DataType::Str => Ok(()),
    }
}
