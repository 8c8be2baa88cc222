//! Axis-role resolution for CF datasets
//!
//! Climate files rarely agree on what their dimensions are called, so the
//! pipeline maps each dimension of the primary data variable onto a
//! semantic role (X, Y, Z, T) by inspecting CF metadata: the `axis`
//! attribute, `standard_name`, units heuristics and the `positive`
//! attribute. Dimensions nothing claims are labeled W0, W1, … in the
//! dataset's own dimension-listing order, so identical input always yields
//! identical tags.
//!
//! The resolver also pins down the primary variable's identity (falling
//! back to the highest-rank data variable when the expected name is
//! absent) and the calendar of the time axis.

use crate::dataset::Dataset;
use crate::dates::Calendar;
use crate::errors::{PrepError, Result};
use std::fmt;

/// Semantic role of one dataset dimension, plus the `Var` tag for the
/// primary data variable itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRole {
    X,
    Y,
    Z,
    T,
    Var,
    /// Unclassified extra axis (wavelength, ensemble member, ...)
    Extra(usize),
}

impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisRole::X => write!(f, "X"),
            AxisRole::Y => write!(f, "Y"),
            AxisRole::Z => write!(f, "Z"),
            AxisRole::T => write!(f, "T"),
            AxisRole::Var => write!(f, "var"),
            AxisRole::Extra(i) => write!(f, "W{}", i),
        }
    }
}

/// Result of a reverse (name → role) lookup.
///
/// The ambiguous case is an explicit variant rather than an implicit
/// type-shifting return value: a name can legitimately carry several W
/// tags' worth of meaning, and callers must decide what to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameLookup {
    Unique(AxisRole),
    Ambiguous(Vec<AxisRole>),
    Missing,
}

/// Bidirectional role ↔ dimension-name mapping for one variable.
///
/// At most one entry per role tag, except the W-series; the `Var` entry is
/// always present once resolution has run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisMap {
    entries: Vec<(AxisRole, String)>,
}

impl AxisMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a role → name assignment. Re-assigning a non-W role
    /// replaces the previous entry.
    pub fn insert(&mut self, role: AxisRole, name: impl Into<String>) {
        if !matches!(role, AxisRole::Extra(_)) {
            self.entries.retain(|(r, _)| *r != role);
        }
        self.entries.push((role, name.into()));
    }

    pub fn get(&self, role: AxisRole) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, n)| n.as_str())
    }

    /// Name of the primary data variable, once resolved.
    pub fn var_name(&self) -> Option<&str> {
        self.get(AxisRole::Var)
    }

    pub fn contains(&self, role: AxisRole) -> bool {
        self.get(role).is_some()
    }

    /// Reverse lookup: which role(s) does this name carry?
    pub fn role_of(&self, name: &str) -> NameLookup {
        let roles: Vec<AxisRole> = self
            .entries
            .iter()
            .filter(|(_, n)| n == name)
            .map(|(r, _)| *r)
            .collect();
        match roles.len() {
            0 => NameLookup::Missing,
            1 => NameLookup::Unique(roles[0]),
            _ => NameLookup::Ambiguous(roles),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AxisRole, &str)> {
        self.entries.iter().map(|(r, n)| (*r, n.as_str()))
    }
}

/// Resolves axis roles and the calendar from the first file of a dataset.
pub struct AxisResolver {
    /// Calendar declared by the requested naming convention, used as the
    /// last fallback when the file itself carries no calendar info
    convention_calendar: Option<Calendar>,
}

impl AxisResolver {
    pub fn new(convention_calendar: Option<Calendar>) -> Self {
        Self {
            convention_calendar,
        }
    }

    /// Produces the axis-role mapping for `expected_name` and, when a time
    /// axis exists, the dataset's calendar.
    pub fn resolve(
        &self,
        ds: &Dataset,
        expected_name: &str,
    ) -> Result<(AxisMap, Option<Calendar>)> {
        let var_name = self.resolve_var_name(ds, expected_name)?;
        let mut axes = AxisMap::new();
        axes.insert(AxisRole::Var, var_name.clone());

        let var = ds
            .var(&var_name)
            .ok_or_else(|| PrepError::Resolution {
                var: expected_name.to_string(),
                msg: format!("variable '{}' disappeared during resolution", var_name),
            })?;

        // classify each dimension of the resolved variable via its
        // coordinate variable's CF metadata
        for dim in &var.dims {
            if let Some(role) = ds.var(dim).and_then(classify_coord) {
                if axes.contains(role) {
                    println!(
                        "⚠ Dimension '{}' also looks like the {} axis of '{}'; keeping '{}'",
                        dim,
                        role,
                        var_name,
                        axes.get(role).unwrap_or_default()
                    );
                } else {
                    axes.insert(role, dim.clone());
                }
            }
        }

        // everything not claimed by X/Y/Z/T gets a W tag, in the stable
        // order of the variable's dimension listing
        let mut extra_index = 0;
        for dim in &var.dims {
            if !matches!(axes.role_of(dim), NameLookup::Missing) {
                continue;
            }
            axes.insert(AxisRole::Extra(extra_index), dim.clone());
            extra_index += 1;
        }

        for role in [AxisRole::X, AxisRole::Y, AxisRole::Z, AxisRole::T] {
            if !axes.contains(role) {
                println!("⚠ No {} axis found for '{}'", role, var_name);
            }
        }

        let calendar = if axes.contains(AxisRole::T) {
            Some(self.resolve_calendar(ds, &axes, &var_name)?)
        } else {
            None
        };

        Ok((axes, calendar))
    }

    /// Uses the expected model-native name when present; otherwise falls
    /// back to the data variable with the greatest number of dimensions.
    /// A tie for maximum rank is an unresolvable ambiguity.
    fn resolve_var_name(&self, ds: &Dataset, expected_name: &str) -> Result<String> {
        if ds.var(expected_name).is_some() && !ds.is_coord(expected_name) {
            return Ok(expected_name.to_string());
        }

        let data_vars = ds.data_var_names();
        let max_rank = data_vars
            .iter()
            .filter_map(|name| ds.var(name).map(|v| v.ndim()))
            .max()
            .ok_or_else(|| PrepError::Resolution {
                var: expected_name.to_string(),
                msg: "file contains no data variables".to_string(),
            })?;
        let candidates: Vec<&str> = data_vars
            .into_iter()
            .filter(|name| ds.var(name).map(|v| v.ndim()) == Some(max_rank))
            .collect();

        match candidates.as_slice() {
            [single] => {
                println!(
                    "⚠ Expected '{}' not found in file, using '{}'",
                    expected_name, single
                );
                Ok(single.to_string())
            }
            _ => Err(PrepError::Resolution {
                var: expected_name.to_string(),
                msg: format!(
                    "couldn't determine variable: {} candidates of rank {} ({})",
                    candidates.len(),
                    max_rank,
                    candidates.join(", ")
                ),
            }),
        }
    }

    /// Fixed fallback chain: the time coordinate's decoded encoding, the
    /// time variable's attributes, the global attributes, then the naming
    /// convention's declared default.
    fn resolve_calendar(&self, ds: &Dataset, axes: &AxisMap, var_name: &str) -> Result<Calendar> {
        let time_name = axes.get(AxisRole::T).unwrap_or_default();

        let encoded = ds
            .var(time_name)
            .and_then(|t| t.time_encoding.as_ref())
            .and_then(|enc| enc.calendar.as_deref())
            .and_then(Calendar::parse);
        if let Some(cal) = encoded {
            return Ok(cal);
        }
        println!("⚠ Calendar info missing from time encoding of '{}'", time_name);

        let from_time_attrs = ds
            .var(time_name)
            .and_then(|t| t.attrs.get("calendar"))
            .and_then(|a| a.as_str())
            .and_then(Calendar::parse);
        if let Some(cal) = from_time_attrs {
            return Ok(cal);
        }

        let from_global = ds
            .attrs
            .get("calendar")
            .and_then(|a| a.as_str())
            .and_then(Calendar::parse);
        if let Some(cal) = from_global {
            println!("⚠ Using calendar from global attributes for '{}'", var_name);
            return Ok(cal);
        }

        if let Some(cal) = self.convention_calendar {
            println!(
                "⚠ Using naming convention's default calendar '{}' for '{}'",
                cal.as_str(),
                var_name
            );
            return Ok(cal);
        }

        Err(PrepError::CalendarResolution {
            var: var_name.to_string(),
        })
    }
}

/// CF metadata heuristics for one coordinate variable.
fn classify_coord(coord: &crate::dataset::DataVar) -> Option<AxisRole> {
    let attr = |name: &str| coord.attrs.get(name).and_then(|a| a.as_str());

    if let Some(axis) = attr("axis") {
        match axis.to_uppercase().as_str() {
            "X" => return Some(AxisRole::X),
            "Y" => return Some(AxisRole::Y),
            "Z" => return Some(AxisRole::Z),
            "T" => return Some(AxisRole::T),
            _ => {}
        }
    }

    if let Some(std_name) = attr("standard_name") {
        match std_name.to_lowercase().as_str() {
            "longitude" => return Some(AxisRole::X),
            "latitude" => return Some(AxisRole::Y),
            "time" => return Some(AxisRole::T),
            "air_pressure" | "height" | "altitude" | "depth" | "model_level_number" => {
                return Some(AxisRole::Z)
            }
            _ => {}
        }
    }

    if coord.time_encoding.is_some() {
        return Some(AxisRole::T);
    }

    if let Some(units) = attr("units") {
        match units.to_lowercase().as_str() {
            "degrees_east" | "degree_east" | "degrees_e" | "degree_e" => return Some(AxisRole::X),
            "degrees_north" | "degree_north" | "degrees_n" | "degree_n" => {
                return Some(AxisRole::Y)
            }
            "pa" | "hpa" | "mb" | "mbar" | "millibar" | "millibars" | "level" => {
                return Some(AxisRole::Z)
            }
            _ => {}
        }
    }

    if attr("positive").is_some() {
        return Some(AxisRole::Z);
    }

    None
}
