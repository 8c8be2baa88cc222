//! Naming-convention translation between canonical (CF) and model-native
//! variable names
//!
//! Each modeling center labels the same physical field differently; a
//! `ConventionTable` records the two-way mapping for one center plus the
//! calendar its output defaults to when files omit one. The
//! `VariableTranslator` is an explicit registry constructed once at
//! startup and passed by reference into the pipeline; there is no ambient
//! global state.

use crate::dates::Calendar;
use crate::errors::{PrepError, Result};
use std::collections::HashMap;

/// Name mapping and defaults for one naming convention.
#[derive(Debug, Clone)]
pub struct ConventionTable {
    pub name: String,
    to_native: HashMap<String, String>,
    to_canonical: HashMap<String, String>,
    pub default_calendar: Option<Calendar>,
}

impl ConventionTable {
    pub fn new(name: impl Into<String>, default_calendar: Option<Calendar>) -> Self {
        Self {
            name: name.into(),
            to_native: HashMap::new(),
            to_canonical: HashMap::new(),
            default_calendar,
        }
    }

    /// Registers one canonical ↔ native name pair.
    pub fn add_pair(mut self, canonical: &str, native: &str) -> Self {
        self.to_native
            .insert(canonical.to_string(), native.to_string());
        self.to_canonical
            .insert(native.to_string(), canonical.to_string());
        self
    }
}

/// Registry of convention tables, keyed by convention name
/// (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct VariableTranslator {
    tables: HashMap<String, ConventionTable>,
}

impl VariableTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A translator preloaded with the built-in tables: `CMIP` (identity,
    /// CF names are the native names), `NCAR` and `GFDL`.
    pub fn with_builtin_tables() -> Self {
        let mut translator = Self::new();
        translator.register(ConventionTable::new("CMIP", None));
        translator.register(
            ConventionTable::new("NCAR", Some(Calendar::NoLeap))
                .add_pair("tas", "TREFHT")
                .add_pair("pr", "PRECT")
                .add_pair("psl", "PSL")
                .add_pair("ta", "T")
                .add_pair("ua", "U")
                .add_pair("va", "V")
                .add_pair("zg", "Z3"),
        );
        translator.register(
            ConventionTable::new("GFDL", Some(Calendar::NoLeap))
                .add_pair("tas", "t_ref")
                .add_pair("pr", "precip")
                .add_pair("psl", "slp")
                .add_pair("ta", "temp")
                .add_pair("ua", "ucomp")
                .add_pair("va", "vcomp")
                .add_pair("zg", "hght"),
        );
        translator
    }

    pub fn register(&mut self, table: ConventionTable) {
        self.tables.insert(table.name.to_uppercase(), table);
    }

    fn table(&self, convention: &str) -> Result<&ConventionTable> {
        self.tables
            .get(&convention.to_uppercase())
            .ok_or_else(|| PrepError::UnknownConvention(convention.to_string()))
    }

    /// Canonical (CF) name for a model-native one. Names without a table
    /// entry pass through unchanged.
    pub fn to_canonical(&self, convention: &str, name: &str) -> Result<String> {
        let table = self.table(convention)?;
        Ok(table
            .to_canonical
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    /// Model-native name for a canonical one. Names without a table entry
    /// pass through unchanged.
    pub fn from_canonical(&self, convention: &str, name: &str) -> Result<String> {
        let table = self.table(convention)?;
        Ok(table
            .to_native
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    /// Calendar the convention declares for files that omit one.
    pub fn default_calendar(&self, convention: &str) -> Result<Option<Calendar>> {
        Ok(self.table(convention)?.default_calendar)
    }
}
