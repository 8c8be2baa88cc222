//! In-memory dataset model and NetCDF I/O
//!
//! This module provides the `Dataset` type the transform chain operates on:
//! dimensions in file order, global and per-variable attributes, and
//! variable data loaded as `ArrayD<f64>`. Loading strips whitespace from
//! all string attributes *before* any CF semantics are interpreted
//! (malformed padded attributes are a known upstream data defect), applies
//! `scale_factor`/`add_offset` packing, and decodes time-axis encodings.
//!
//! Output is always written as classic 64-bit-offset NetCDF with no
//! unlimited dimension: the file represents one fixed analysis window, not
//! an append-friendly stream.

use crate::dates::TimeEncoding;
use crate::errors::{PrepError, Result};
use ndarray::{ArrayD, Axis, Slice};
use netcdf::AttributeValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Attribute value subset writable to classic-format NetCDF.
///
/// A crate-local mirror of `netcdf::AttributeValue` so attributes can be
/// compared for equality during multi-file merge checks.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Strs(Vec<String>),
    Float(f32),
    Floats(Vec<f32>),
    Double(f64),
    Doubles(Vec<f64>),
    Int(i32),
    Ints(Vec<i32>),
    Short(i16),
    Shorts(Vec<i16>),
}

impl AttrValue {
    fn from_netcdf(value: AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Str(v) => Some(AttrValue::Str(v)),
            AttributeValue::Strs(v) => Some(AttrValue::Strs(v)),
            AttributeValue::Float(v) => Some(AttrValue::Float(v)),
            AttributeValue::Floats(v) => Some(AttrValue::Floats(v)),
            AttributeValue::Double(v) => Some(AttrValue::Double(v)),
            AttributeValue::Doubles(v) => Some(AttrValue::Doubles(v)),
            AttributeValue::Int(v) => Some(AttrValue::Int(v)),
            AttributeValue::Ints(v) => Some(AttrValue::Ints(v)),
            AttributeValue::Short(v) => Some(AttrValue::Short(v)),
            AttributeValue::Shorts(v) => Some(AttrValue::Shorts(v)),
            _ => None,
        }
    }

    /// Strips leading/trailing whitespace from string-valued attributes.
    fn sanitized(self) -> Self {
        match self {
            AttrValue::Str(v) => AttrValue::Str(v.trim().to_string()),
            AttrValue::Strs(v) => {
                AttrValue::Strs(v.into_iter().map(|s| s.trim().to_string()).collect())
            }
            other => other,
        }
    }

    /// Returns the string content, if this is a scalar string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v as f64),
            AttrValue::Double(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Short(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Ordered attribute map; order-insensitive equality is what merge checks
/// rely on.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A named dimension with its current length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
}

/// One variable: dimension names, data and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVar {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f64>,
    pub attrs: AttrMap,
    /// Decoded CF time encoding, present when the units attribute reads
    /// like "days since 1999-01-01"
    pub time_encoding: Option<TimeEncoding>,
}

impl DataVar {
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }
}

/// An opened dataset: dimensions in file order, global attributes and
/// variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub dims: Vec<Dimension>,
    pub attrs: AttrMap,
    pub vars: Vec<DataVar>,
}

impl Dataset {
    /// Opens a NetCDF file and loads it fully into memory.
    ///
    /// Attribute sanitation runs before anything CF-shaped is interpreted;
    /// packed variables are unpacked; non-numeric (char/string) variables
    /// are skipped with a warning.
    pub fn open(path: &Path) -> Result<Self> {
        let file = netcdf::open(path)?;

        let dims: Vec<Dimension> = file
            .dimensions()
            .map(|d| Dimension {
                name: d.name().to_string(),
                len: d.len(),
            })
            .collect();

        let attrs = read_attrs(file.attributes())?;

        let mut vars = Vec::new();
        for var in file.variables() {
            let type_name = format!("{:?}", var.vartype()).to_lowercase();
            if type_name.contains("char") || type_name.contains("string") {
                println!("⚠ Skipped non-numeric variable '{}'", var.name());
                continue;
            }

            let var_dims: Vec<String> = var
                .dimensions()
                .iter()
                .map(|d| d.name().to_string())
                .collect();
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

            let mut var_attrs = read_attrs(var.attributes())?;
            let data_vec = var.get_values::<f64, _>(..)?;
            let mut data = ArrayD::from_shape_vec(shape, data_vec)?;

            // unpack scale_factor/add_offset, consuming the attributes
            let scale = var_attrs.remove("scale_factor").and_then(|a| a.as_f64());
            let offset = var_attrs.remove("add_offset").and_then(|a| a.as_f64());
            if scale.is_some() || offset.is_some() {
                let scale = scale.unwrap_or(1.0);
                let offset = offset.unwrap_or(0.0);
                data.mapv_inplace(|v| v * scale + offset);
            }

            let time_encoding = var_attrs.get("units").and_then(|u| u.as_str()).and_then(|u| {
                let calendar = var_attrs
                    .get("calendar")
                    .and_then(|c| c.as_str())
                    .map(|c| c.to_string());
                TimeEncoding::parse(u, calendar)
            });

            vars.push(DataVar {
                name: var.name().to_string(),
                dims: var_dims,
                data,
                attrs: var_attrs,
                time_encoding,
            });
        }

        Ok(Self { dims, attrs, vars })
    }

    pub fn var(&self, name: &str) -> Option<&DataVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn var_mut(&mut self, name: &str) -> Option<&mut DataVar> {
        self.vars.iter_mut().find(|v| v.name == name)
    }

    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.dims.iter().find(|d| d.name == name).map(|d| d.len)
    }

    pub fn has_dim(&self, name: &str) -> bool {
        self.dims.iter().any(|d| d.name == name)
    }

    /// A variable is a coordinate when it shares its name with a dimension.
    pub fn is_coord(&self, name: &str) -> bool {
        self.has_dim(name)
    }

    /// Names of the non-coordinate variables, in file order.
    pub fn data_var_names(&self) -> Vec<&str> {
        self.vars
            .iter()
            .filter(|v| !self.is_coord(&v.name))
            .map(|v| v.name.as_str())
            .collect()
    }

    /// Renames a variable in place.
    pub fn rename_var(&mut self, old: &str, new: &str) -> Result<()> {
        match self.var_mut(old) {
            Some(var) => {
                var.name = new.to_string();
                Ok(())
            }
            None => Err(PrepError::Generic(format!(
                "cannot rename '{}': no such variable",
                old
            ))),
        }
    }

    /// Restricts every variable along `dim` to the inclusive index range
    /// `[start, end]`.
    pub fn crop_dim(&mut self, dim: &str, start: usize, end: usize) {
        for var in &mut self.vars {
            if let Some(pos) = var.dims.iter().position(|d| d == dim) {
                var.data = var
                    .data
                    .slice_axis(Axis(pos), Slice::from(start..end + 1))
                    .to_owned();
            }
        }
        if let Some(d) = self.dims.iter_mut().find(|d| d.name == dim) {
            d.len = end - start + 1;
        }
    }

    /// Selects index `index` along `dim` and removes the dimension
    /// entirely. Variables indexed this way lose the axis; a coordinate
    /// variable for `dim` collapses to a scalar.
    pub fn extract_index(&mut self, dim: &str, index: usize) {
        for var in &mut self.vars {
            if let Some(pos) = var.dims.iter().position(|d| d == dim) {
                var.data = var.data.index_axis(Axis(pos), index).to_owned();
                var.dims.remove(pos);
            }
        }
        self.dims.retain(|d| d.name != dim);
    }

    /// Writes the dataset to `path` as classic 64-bit-offset NetCDF.
    ///
    /// No dimension is marked unlimited. A half-written file is removed
    /// before the error is surfaced, so failures leave no partial output.
    pub fn write(&self, path: &Path) -> Result<()> {
        let result = self.write_impl(path);
        if result.is_err() && path.exists() {
            let _ = fs::remove_file(path);
        }
        result
    }

    fn write_impl(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }

        let mut file = netcdf::create_with(path, netcdf::Options::_64BIT_OFFSET)?;

        for dim in &self.dims {
            file.add_dimension(&dim.name, dim.len)?;
        }

        for (name, value) in &self.attrs {
            put_global_attr(&mut file, name, value)?;
        }

        for var in &self.vars {
            let dim_refs: Vec<&str> = var.dims.iter().map(|s| s.as_str()).collect();
            let mut new_var = file.add_variable::<f64>(&var.name, &dim_refs)?;
            for (name, value) in &var.attrs {
                put_var_attr(&mut new_var, name, value)?;
            }
            new_var.put(var.data.view(), ..)?;
        }

        Ok(())
    }
}

fn read_attrs<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Result<AttrMap> {
    let mut map = AttrMap::new();
    for attr in attrs {
        let name = attr.name().trim().to_string();
        match AttrValue::from_netcdf(attr.value()?) {
            Some(value) => {
                map.insert(name, value.sanitized());
            }
            None => {
                println!("⚠ Skipped unsupported attribute type for '{}'", name);
            }
        }
    }
    Ok(map)
}

fn put_var_attr(var: &mut netcdf::VariableMut, name: &str, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Str(v) => var.put_attribute(name, v.as_str())?,
        AttrValue::Strs(v) => var.put_attribute(name, v.clone())?,
        AttrValue::Float(v) => var.put_attribute(name, *v)?,
        AttrValue::Floats(v) => var.put_attribute(name, v.clone())?,
        AttrValue::Double(v) => var.put_attribute(name, *v)?,
        AttrValue::Doubles(v) => var.put_attribute(name, v.clone())?,
        AttrValue::Int(v) => var.put_attribute(name, *v)?,
        AttrValue::Ints(v) => var.put_attribute(name, v.clone())?,
        AttrValue::Short(v) => var.put_attribute(name, *v)?,
        AttrValue::Shorts(v) => var.put_attribute(name, v.clone())?,
    };
    Ok(())
}

fn put_global_attr(file: &mut netcdf::FileMut, name: &str, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Str(v) => file.add_attribute(name, v.as_str())?,
        AttrValue::Strs(v) => file.add_attribute(name, v.clone())?,
        AttrValue::Float(v) => file.add_attribute(name, *v)?,
        AttrValue::Floats(v) => file.add_attribute(name, v.clone())?,
        AttrValue::Double(v) => file.add_attribute(name, *v)?,
        AttrValue::Doubles(v) => file.add_attribute(name, v.clone())?,
        AttrValue::Int(v) => file.add_attribute(name, *v)?,
        AttrValue::Ints(v) => file.add_attribute(name, v.clone())?,
        AttrValue::Short(v) => file.add_attribute(name, *v)?,
        AttrValue::Shorts(v) => file.add_attribute(name, v.clone())?,
    };
    Ok(())
}
