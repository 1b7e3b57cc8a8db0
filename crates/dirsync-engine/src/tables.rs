//! Exception and country-control tables.
//!
//! Both are loaded once per run from small YAML files and are immutable
//! afterwards. A missing path yields an empty table.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Exception target meaning "never synchronise this account".
pub const EXCLUDED_SENTINEL: &str = "NONE";

/// Where an exception entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionTarget {
    /// Use this secondary login instead of the primary one.
    Mapped(String),
    /// Deliberately unsynchronised.
    Excluded,
}

impl ExceptionTarget {
    fn parse(target: &str) -> Self {
        if target == EXCLUDED_SENTINEL {
            ExceptionTarget::Excluded
        } else {
            ExceptionTarget::Mapped(target.to_lowercase())
        }
    }
}

/// Primary login to secondary login overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionTable {
    entries: BTreeMap<String, ExceptionTarget>,
}

impl ExceptionTable {
    /// Build from raw `login -> target` pairs. Keys are lower-cased.
    pub fn from_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), ExceptionTarget::parse(v.as_ref())))
                .collect(),
        }
    }

    /// Load from a YAML `map<string,string>`; `None` gives an empty table.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let raw: BTreeMap<String, String> = load_yaml_table(path)?;
        let table = Self::from_map(raw);
        debug!(entries = table.len(), "Exception table loaded");
        Ok(table)
    }

    /// Target for a primary login, if any.
    pub fn get(&self, login: &str) -> Option<&ExceptionTarget> {
        self.entries.get(&login.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Group name to the country codes allowed in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryControlTable {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl CountryControlTable {
    /// Build from raw `group -> [codes]` pairs. Group names are lower-cased.
    pub fn from_map<I, K, C>(groups: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            groups: groups
                .into_iter()
                .map(|(group, codes)| {
                    (
                        group.as_ref().to_lowercase(),
                        codes
                            .into_iter()
                            .map(|c| c.as_ref().to_uppercase())
                            .collect(),
                    )
                })
                .collect(),
        }
    }

    /// Load from a YAML `map<string,list<string>>`; `None` gives an empty table.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let raw: BTreeMap<String, Vec<String>> = load_yaml_table(path)?;
        let table = Self::from_map(raw);
        debug!(groups = table.len(), "Country control table loaded");
        Ok(table)
    }

    /// Whether a user with `country` may be a member of `group`.
    ///
    /// Unlisted groups are unrestricted. Users without a country code are
    /// always allowed.
    #[must_use]
    pub fn allows(&self, group: &str, country: Option<&str>) -> bool {
        let Some(allowed) = self.groups.get(&group.to_lowercase()) else {
            return true;
        };
        match country.map(str::trim) {
            None | Some("") => true,
            Some(code) => allowed.contains(&code.to_uppercase()),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn load_yaml_table<T>(path: Option<&Path>) -> EngineResult<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    // An empty document is an empty table.
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    let parsed: Option<T> =
        serde_yaml::from_str(&text).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parsed.unwrap_or_default())
}
