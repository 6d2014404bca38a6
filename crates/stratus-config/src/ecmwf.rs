//! ECMWF variables config (`ecmwf-variables.yaml`)
//!
//! Describes which ECMWF Open Data variables the pipeline requests: surface
//! and pressure-level variable groups, the pressure levels in hPa and the
//! lead-time rules. The file carries named versions with a default.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::cache::{Payload, PayloadCache};
use crate::check_schema_version;
use crate::error::{Error, Result};
use crate::paths::resolve_config_path;

pub const DEFAULT_ECMWF_CONFIG_NAME: &str = "ecmwf-variables.yaml";
pub const ECMWF_CONFIG_ENV: &str = "DIGITAL_EARTH_ECMWF_CONFIG_PATH";

/// One contiguous run of lead times in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeadTimeRule {
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl LeadTimeRule {
    fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(Error::config("lead time rule step must be > 0"));
        }
        if self.end < self.start {
            return Err(Error::config("lead time rule end must be >= start"));
        }
        Ok(())
    }

    /// The hours this rule covers, inclusive of `end` when aligned.
    pub fn hours(&self) -> Vec<u32> {
        (self.start..=self.end).step_by(self.step as usize).collect()
    }
}

/// Surface and pressure-level variable groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableGroups {
    pub sfc: Vec<String>,
    pub pl: Vec<String>,
}

fn dedupe_preserve_order(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for value in values {
        let normalized = value.trim();
        if normalized.is_empty() || !seen.insert(normalized.to_string()) {
            continue;
        }
        out.push(normalized.to_string());
    }
    out
}

/// One named version of the ECMWF request set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcmwfVariablesConfig {
    #[serde(default)]
    pub version: Option<String>,
    pub variables: VariableGroups,
    pub pressure_levels_hpa: Vec<u32>,
    pub lead_time_hours: Vec<LeadTimeRule>,
}

impl EcmwfVariablesConfig {
    fn validate(mut self) -> Result<Self> {
        self.variables.sfc = dedupe_preserve_order(&self.variables.sfc);
        self.variables.pl = dedupe_preserve_order(&self.variables.pl);
        if self.pressure_levels_hpa.iter().any(|&level| level == 0) {
            return Err(Error::config("pressure levels must be positive hPa values"));
        }
        // Levels are requested top-of-list-first: highest pressure first.
        self.pressure_levels_hpa.sort_unstable_by(|a, b| b.cmp(a));
        self.pressure_levels_hpa.dedup();
        for rule in &self.lead_time_hours {
            rule.validate()?;
        }
        Ok(self)
    }

    /// All lead times across the rules, sorted and deduplicated.
    pub fn lead_times_hours(&self) -> Vec<u32> {
        let mut hours: Vec<u32> = self
            .lead_time_hours
            .iter()
            .flat_map(|rule| rule.hours())
            .collect();
        hours.sort_unstable();
        hours.dedup();
        hours
    }
}

/// The on-disk file: named versions plus a default selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcmwfVariablesConfigFile {
    pub schema_version: u32,
    pub default_version: String,
    pub versions: BTreeMap<String, EcmwfVariablesConfig>,
}

impl EcmwfVariablesConfigFile {
    fn validate(mut self) -> Result<Self> {
        check_schema_version("ecmwf", self.schema_version)?;
        if !self.versions.contains_key(&self.default_version) {
            return Err(Error::config(format!(
                "default_version {:?} not found in versions",
                self.default_version
            )));
        }
        let mut validated = BTreeMap::new();
        for (name, config) in std::mem::take(&mut self.versions) {
            let mut config = config.validate()?;
            config.version.get_or_insert_with(|| name.clone());
            validated.insert(name, config);
        }
        self.versions = validated;
        Ok(self)
    }

    /// Resolve a version by name, defaulting to `default_version`.
    pub fn version(&self, name: Option<&str>) -> Result<&EcmwfVariablesConfig> {
        let name = name.unwrap_or(&self.default_version);
        self.versions
            .get(name)
            .ok_or_else(|| Error::config(format!("ecmwf version not found: {name:?}")))
    }
}

/// Parse and validate the ECMWF variables YAML.
pub fn parse_ecmwf_config(raw: &[u8]) -> Result<EcmwfVariablesConfigFile> {
    let file: EcmwfVariablesConfigFile = serde_yaml::from_slice(raw)
        .map_err(|e| Error::config(format!("invalid ecmwf config: {e}")))?;
    file.validate()
}

fn cache() -> &'static PayloadCache<EcmwfVariablesConfigFile> {
    static CACHE: OnceLock<PayloadCache<EcmwfVariablesConfigFile>> = OnceLock::new();
    CACHE.get_or_init(|| PayloadCache::new(8))
}

/// Load the ECMWF variables config, cached by file identity.
pub fn get_ecmwf_config(path: Option<&Path>) -> Result<Payload<EcmwfVariablesConfigFile>> {
    let resolved = resolve_config_path(path, ECMWF_CONFIG_ENV, DEFAULT_ECMWF_CONFIG_NAME);
    cache().get_or_load(&resolved, parse_ecmwf_config)
}

/// Drop cached ECMWF payloads.
pub fn clear_ecmwf_config_cache() {
    cache().clear()
}
