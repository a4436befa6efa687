//! Datatypes, attribute values, and dtype-dispatched arrays.
//!
//! Everything the engine moves around is one of a small set of netCDF
//! datatypes. [`NcArray`] wraps an [`ndarray::ArrayD`] of each supported
//! type so that the planner and evaluator can shuttle data without being
//! generic over the element type everywhere.
use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, SliceInfoElem};
use serde::{Deserialize, Serialize};

use crate::error::{AggError, AggResult};

/// Default fill values used when a variable does not define `_FillValue`.
/// These match the netCDF `NC_FILL_*` constants.
pub mod default_fill {
    pub const I8: i8 = -127;
    pub const I16: i16 = -32767;
    pub const I32: i32 = -2147483647;
    pub const I64: i64 = -9223372036854775806;
    pub const U8: u8 = 255;
    pub const U16: u16 = 65535;
    pub const U32: u32 = 4294967295;
    pub const U64: u64 = 18446744073709551614;
    pub const F32: f32 = 9.969_21e36;
    pub const F64: f64 = 9.969209968386869e36;
}

/// The datatypes a variable may declare in the product configuration.
///
/// The serialized names ("int8", "float64", ...) are part of the external
/// configuration grammar. Variable-length and enum types are not
/// supported.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum DataType {
    #[serde(rename = "int8")]
    #[strum(serialize = "int8")]
    Int8,
    #[serde(rename = "int16")]
    #[strum(serialize = "int16")]
    Int16,
    #[serde(rename = "int32")]
    #[strum(serialize = "int32")]
    Int32,
    #[serde(rename = "int64")]
    #[strum(serialize = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    #[strum(serialize = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    #[strum(serialize = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    #[strum(serialize = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    #[strum(serialize = "uint64")]
    UInt64,
    #[serde(rename = "float32")]
    #[strum(serialize = "float32")]
    Float32,
    #[serde(rename = "float64")]
    #[strum(serialize = "float64")]
    Float64,
    #[serde(rename = "string")]
    #[strum(serialize = "string")]
    Str,
}

impl DataType {
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, DataType::Str)
    }
}

/// A global or variable attribute value.
///
/// The untagged representation lets configuration JSON write attribute
/// values as plain strings, numbers, or homogeneous lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

impl AttrValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            // JSON has no integer literal distinct from -999.0
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value the way it should appear when joined into a
    /// comma-separated list (the `unique_list` strategy).
    pub fn to_display_string(&self) -> String {
        match self {
            AttrValue::Int(v) => v.to_string(),
            AttrValue::Float(v) => v.to_string(),
            AttrValue::Str(s) => s.clone(),
            AttrValue::IntList(vs) => vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" "),
            AttrValue::FloatList(vs) => {
                vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
            }
            AttrValue::StrList(vs) => vs.join(" "),
        }
    }

    /// Equality with floating-point tolerance, used by the `constant`
    /// strategy so that re-serialized floats do not trip it.
    pub fn approx_eq(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Float(a), AttrValue::Float(b)) => approx::ulps_eq!(*a, *b),
            (AttrValue::Float(a), AttrValue::Int(b)) | (AttrValue::Int(b), AttrValue::Float(a)) => {
                approx::ulps_eq!(*a, *b as f64)
            }
            (a, b) => a == b,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

/// A type that can hold a variety of arrays that might be stored in a
/// netCDF file, tagged by datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum NcArray {
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    Str(ArrayD<String>),
}

impl NcArray {
    pub fn dtype(&self) -> DataType {
        match self {
            NcArray::I8(_) => DataType::Int8,
            NcArray::I16(_) => DataType::Int16,
            NcArray::I32(_) => DataType::Int32,
            NcArray::I64(_) => DataType::Int64,
            NcArray::U8(_) => DataType::UInt8,
            NcArray::U16(_) => DataType::UInt16,
            NcArray::U32(_) => DataType::UInt32,
            NcArray::U64(_) => DataType::UInt64,
            NcArray::F32(_) => DataType::Float32,
            NcArray::F64(_) => DataType::Float64,
            NcArray::Str(_) => DataType::Str,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            NcArray::I8(a) => a.shape(),
            NcArray::I16(a) => a.shape(),
            NcArray::I32(a) => a.shape(),
            NcArray::I64(a) => a.shape(),
            NcArray::U8(a) => a.shape(),
            NcArray::U16(a) => a.shape(),
            NcArray::U32(a) => a.shape(),
            NcArray::U64(a) => a.shape(),
            NcArray::F32(a) => a.shape(),
            NcArray::F64(a) => a.shape(),
            NcArray::Str(a) => a.shape(),
        }
    }

    pub fn len_of(&self, axis: usize) -> usize {
        self.shape().get(axis).copied().unwrap_or(0)
    }

    /// An array of the given shape filled with the variable's fill value.
    /// When no `_FillValue` attribute is available, the netCDF default
    /// fill for the datatype is used.
    pub fn full(dtype: DataType, shape: &[usize], fill: Option<&AttrValue>) -> NcArray {
        let dyn_shape = IxDyn(shape);
        match dtype {
            DataType::Int8 => {
                let v = fill.and_then(|f| f.as_i64()).map(|v| v as i8).unwrap_or(default_fill::I8);
                NcArray::I8(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::Int16 => {
                let v =
                    fill.and_then(|f| f.as_i64()).map(|v| v as i16).unwrap_or(default_fill::I16);
                NcArray::I16(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::Int32 => {
                let v =
                    fill.and_then(|f| f.as_i64()).map(|v| v as i32).unwrap_or(default_fill::I32);
                NcArray::I32(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::Int64 => {
                let v = fill.and_then(|f| f.as_i64()).unwrap_or(default_fill::I64);
                NcArray::I64(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::UInt8 => {
                let v = fill.and_then(|f| f.as_i64()).map(|v| v as u8).unwrap_or(default_fill::U8);
                NcArray::U8(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::UInt16 => {
                let v =
                    fill.and_then(|f| f.as_i64()).map(|v| v as u16).unwrap_or(default_fill::U16);
                NcArray::U16(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::UInt32 => {
                let v =
                    fill.and_then(|f| f.as_i64()).map(|v| v as u32).unwrap_or(default_fill::U32);
                NcArray::U32(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::UInt64 => {
                let v =
                    fill.and_then(|f| f.as_i64()).map(|v| v as u64).unwrap_or(default_fill::U64);
                NcArray::U64(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::Float32 => {
                let v =
                    fill.and_then(|f| f.as_f64()).map(|v| v as f32).unwrap_or(default_fill::F32);
                NcArray::F32(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::Float64 => {
                let v = fill.and_then(|f| f.as_f64()).unwrap_or(default_fill::F64);
                NcArray::F64(ArrayD::from_elem(dyn_shape, v))
            }
            DataType::Str => {
                let v = fill.and_then(|f| f.as_str()).unwrap_or("").to_string();
                NcArray::Str(ArrayD::from_elem(dyn_shape, v))
            }
        }
    }

    /// Convert an array of f64 values (e.g. a synthesized index lattice)
    /// into the declared datatype of a variable.
    pub fn from_f64(dtype: DataType, values: ArrayD<f64>) -> AggResult<NcArray> {
        let arr = match dtype {
            DataType::Int8 => NcArray::I8(values.mapv(|v| v as i8)),
            DataType::Int16 => NcArray::I16(values.mapv(|v| v as i16)),
            DataType::Int32 => NcArray::I32(values.mapv(|v| v as i32)),
            DataType::Int64 => NcArray::I64(values.mapv(|v| v as i64)),
            DataType::UInt8 => NcArray::U8(values.mapv(|v| v as u8)),
            DataType::UInt16 => NcArray::U16(values.mapv(|v| v as u16)),
            DataType::UInt32 => NcArray::U32(values.mapv(|v| v as u32)),
            DataType::UInt64 => NcArray::U64(values.mapv(|v| v as u64)),
            DataType::Float32 => NcArray::F32(values.mapv(|v| v as f32)),
            DataType::Float64 => NcArray::F64(values),
            DataType::Str => {
                return Err(AggError::internal(
                    "cannot synthesize string values from a numeric lattice",
                ))
            }
        };
        Ok(arr)
    }

    /// Project the array to 1-D f64 values for index sorting. Returns
    /// `None` for string arrays, which cannot be sorted numerically.
    pub fn as_f64_values(&self) -> Option<Vec<f64>> {
        match self {
            NcArray::I8(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::I16(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::I32(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::I64(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::U8(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::U16(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::U32(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::U64(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::F32(a) => Some(a.iter().map(|&v| v as f64).collect()),
            NcArray::F64(a) => Some(a.iter().copied().collect()),
            NcArray::Str(_) => None,
        }
    }

    /// Concatenate arrays of the same datatype along `axis`.
    pub fn concat(axis: usize, parts: &[NcArray]) -> AggResult<NcArray> {
        let first = parts
            .first()
            .ok_or_else(|| AggError::internal("concatenation of zero array parts"))?;
        match first {
            NcArray::I8(_) => Ok(NcArray::I8(concat_t(axis, views_i8(parts)?)?)),
            NcArray::I16(_) => Ok(NcArray::I16(concat_t(axis, views_i16(parts)?)?)),
            NcArray::I32(_) => Ok(NcArray::I32(concat_t(axis, views_i32(parts)?)?)),
            NcArray::I64(_) => Ok(NcArray::I64(concat_t(axis, views_i64(parts)?)?)),
            NcArray::U8(_) => Ok(NcArray::U8(concat_t(axis, views_u8(parts)?)?)),
            NcArray::U16(_) => Ok(NcArray::U16(concat_t(axis, views_u16(parts)?)?)),
            NcArray::U32(_) => Ok(NcArray::U32(concat_t(axis, views_u32(parts)?)?)),
            NcArray::U64(_) => Ok(NcArray::U64(concat_t(axis, views_u64(parts)?)?)),
            NcArray::F32(_) => Ok(NcArray::F32(concat_t(axis, views_f32(parts)?)?)),
            NcArray::F64(_) => Ok(NcArray::F64(concat_t(axis, views_f64(parts)?)?)),
            NcArray::Str(_) => Ok(NcArray::Str(concat_t(axis, views_str(parts)?)?)),
        }
    }

    /// Take a contiguous sub-array given one index range per dimension.
    pub fn slice(&self, ranges: &[Range<usize>]) -> NcArray {
        let info: Vec<SliceInfoElem> = ranges
            .iter()
            .map(|r| SliceInfoElem::Slice {
                start: r.start as isize,
                end: Some(r.end as isize),
                step: 1,
            })
            .collect();
        match self {
            NcArray::I8(a) => NcArray::I8(a.slice(info.as_slice()).to_owned()),
            NcArray::I16(a) => NcArray::I16(a.slice(info.as_slice()).to_owned()),
            NcArray::I32(a) => NcArray::I32(a.slice(info.as_slice()).to_owned()),
            NcArray::I64(a) => NcArray::I64(a.slice(info.as_slice()).to_owned()),
            NcArray::U8(a) => NcArray::U8(a.slice(info.as_slice()).to_owned()),
            NcArray::U16(a) => NcArray::U16(a.slice(info.as_slice()).to_owned()),
            NcArray::U32(a) => NcArray::U32(a.slice(info.as_slice()).to_owned()),
            NcArray::U64(a) => NcArray::U64(a.slice(info.as_slice()).to_owned()),
            NcArray::F32(a) => NcArray::F32(a.slice(info.as_slice()).to_owned()),
            NcArray::F64(a) => NcArray::F64(a.slice(info.as_slice()).to_owned()),
            NcArray::Str(a) => NcArray::Str(a.slice(info.as_slice()).to_owned()),
        }
    }

    /// Assign `src` into the sub-array selected by `ranges`. The shapes
    /// must agree; a mismatch is an engine bug.
    pub fn write_slice(&mut self, ranges: &[Range<usize>], src: &NcArray) -> AggResult<()> {
        let expected: Vec<usize> = ranges.iter().map(|r| r.end.saturating_sub(r.start)).collect();
        if expected != src.shape() {
            return Err(AggError::internal(format!(
                "writing {:?} data into a {:?} window",
                src.shape(),
                expected
            )));
        }
        let info: Vec<SliceInfoElem> = ranges
            .iter()
            .map(|r| SliceInfoElem::Slice {
                start: r.start as isize,
                end: Some(r.end as isize),
                step: 1,
            })
            .collect();
        match (self, src) {
            (NcArray::I8(dst), NcArray::I8(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::I16(dst), NcArray::I16(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::I32(dst), NcArray::I32(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::I64(dst), NcArray::I64(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::U8(dst), NcArray::U8(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::U16(dst), NcArray::U16(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::U32(dst), NcArray::U32(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::U64(dst), NcArray::U64(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::F32(dst), NcArray::F32(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::F64(dst), NcArray::F64(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (NcArray::Str(dst), NcArray::Str(s)) => dst.slice_mut(info.as_slice()).assign(s),
            (dst, src) => {
                return Err(AggError::internal(format!(
                    "datatype mismatch writing {} data into a {} array",
                    src.dtype(),
                    dst.dtype()
                )))
            }
        }
        Ok(())
    }

    /// Replace NaN values in float arrays with the variable's fill value.
    /// Non-float arrays are returned unchanged.
    pub fn nan_to_fill(self, fill: Option<&AttrValue>) -> NcArray {
        match self {
            NcArray::F32(a) => {
                let f = fill.and_then(|f| f.as_f64()).map(|v| v as f32).unwrap_or(default_fill::F32);
                NcArray::F32(a.mapv(|v| if v.is_nan() { f } else { v }))
            }
            NcArray::F64(a) => {
                let f = fill.and_then(|f| f.as_f64()).unwrap_or(default_fill::F64);
                NcArray::F64(a.mapv(|v| if v.is_nan() { f } else { v }))
            }
            other => other,
        }
    }

    /// Right-pad the array with fill along `axis` until it has length
    /// `len` there (the flatten layout). Arrays already long enough are
    /// returned unchanged.
    pub fn pad_to(self, axis: usize, len: usize, fill: Option<&AttrValue>) -> AggResult<NcArray> {
        let have = self.len_of(axis);
        if have >= len {
            return Ok(self);
        }
        let mut pad_shape: Vec<usize> = self.shape().to_vec();
        pad_shape[axis] = len - have;
        let pad = NcArray::full(self.dtype(), &pad_shape, fill);
        NcArray::concat(axis, &[self, pad])
    }
}

fn concat_t<T: Clone>(axis: usize, parts: Vec<ArrayViewD<T>>) -> AggResult<ArrayD<T>> {
    ndarray::concatenate(Axis(axis), &parts)
        .map_err(|e| AggError::internal(format!("array concatenation failed: {e}")))
}

macro_rules! views_fn {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(parts: &[NcArray]) -> AggResult<Vec<ArrayViewD<$ty>>> {
            parts
                .iter()
                .map(|p| match p {
                    NcArray::$variant(a) => Ok(a.view()),
                    other => Err(AggError::internal(format!(
                        "cannot concatenate {} data with {} data",
                        other.dtype(),
                        stringify!($ty)
                    ))),
                })
                .collect()
        }
    };
}

views_fn!(views_i8, I8, i8);
views_fn!(views_i16, I16, i16);
views_fn!(views_i32, I32, i32);
views_fn!(views_i64, I64, i64);
views_fn!(views_u8, U8, u8);
views_fn!(views_u16, U16, u16);
views_fn!(views_u32, U32, u32);
views_fn!(views_u64, U64, u64);
views_fn!(views_f32, F32, f32);
views_fn!(views_f64, F64, f64);
views_fn!(views_str, Str, String);
