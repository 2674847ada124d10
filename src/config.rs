//! Immutable import configuration.
//!
//! Holds the property→sheet directory (and its inverse), the parameter
//! exclusion dictionary and the schema-version window. Built once, then
//! passed by reference into the builder, resolver and importer.

use std::collections::BTreeMap;

use semver::Version;
use serde::Deserialize;

use crate::error::IceError;

pub const DEFAULT_DEPTH_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_METADATA_SHEET: &str = "metadata-core";
pub const DEFAULT_CURRENT_VERSION: Version = Version::new(1, 4, 0);
pub const DEFAULT_MINIMUM_VERSION: Version = Version::new(1, 0, 0);

/// On-disk form of [`ImportConfig`]. Every field falls back to the default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawConfig {
    property_sheets: BTreeMap<String, String>,
    parameters: BTreeMap<String, Vec<String>>,
    depth_tolerance: f64,
    metadata_sheet: String,
    current_version: Version,
    minimum_version: Version,
}

impl Default for RawConfig {
    fn default() -> Self {
        let property_sheets = [
            ("salinity", "salinity"),
            ("conductivity", "salinity"),
            ("d18o", "salinity"),
            ("temperature", "temperature"),
            ("density", "density"),
            ("sediment", "sediment"),
            ("chlorophyll a", "ecology"),
        ]
        .into_iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect();

        let parameters = [
            ("conductivity", vec!["conductivity measurement temperature"]),
            (
                "density",
                vec!["sample mass", "sample volume", "sample temperature"],
            ),
            ("chlorophyll a", vec!["filtered volume"]),
        ]
        .into_iter()
        .map(|(p, params)| {
            (
                p.to_string(),
                params.into_iter().map(str::to_string).collect(),
            )
        })
        .collect();

        Self {
            property_sheets,
            parameters,
            depth_tolerance: DEFAULT_DEPTH_TOLERANCE,
            metadata_sheet: DEFAULT_METADATA_SHEET.to_string(),
            current_version: DEFAULT_CURRENT_VERSION,
            minimum_version: DEFAULT_MINIMUM_VERSION,
        }
    }
}

/// Read-only configuration shared by every stage of an import.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    property_sheets: BTreeMap<String, String>,
    /// Inverse of `property_sheets`, property names sorted per sheet.
    sheet_properties: BTreeMap<String, Vec<String>>,
    /// parameter name → owning property
    parameter_owner: BTreeMap<String, String>,
    depth_tolerance: f64,
    metadata_sheet: String,
    current_version: Version,
    minimum_version: Version,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

impl ImportConfig {
    /// Build a configuration from explicit tables, keeping the default
    /// tolerance, metadata sheet and version window.
    pub fn new(
        property_sheets: BTreeMap<String, String>,
        parameters: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let raw = RawConfig {
            property_sheets,
            parameters,
            ..RawConfig::default()
        };
        Self::from_raw(raw)
    }

    /// Parse a TOML document. Missing keys take their default value.
    ///
    /// ```toml
    /// depth_tolerance = 1e-9
    /// minimum_version = "1.2.0"
    ///
    /// [property_sheets]
    /// salinity = "salo18"
    ///
    /// [parameters]
    /// conductivity = ["conductivity measurement temperature"]
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, IceError> {
        let raw: RawConfig = toml::from_str(source)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let property_sheets: BTreeMap<String, String> = raw
            .property_sheets
            .into_iter()
            .map(|(p, s)| (normalize(&p), s.trim().to_string()))
            .collect();

        let mut sheet_properties: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (property, sheet) in &property_sheets {
            sheet_properties
                .entry(sheet.clone())
                .or_default()
                .push(property.clone());
        }
        for properties in sheet_properties.values_mut() {
            properties.sort();
        }

        let parameter_owner = raw
            .parameters
            .iter()
            .flat_map(|(owner, params)| {
                let owner = normalize(owner);
                params.iter().map(move |p| (normalize(p), owner.clone()))
            })
            .collect();

        Self {
            property_sheets,
            sheet_properties,
            parameter_owner,
            depth_tolerance: raw.depth_tolerance,
            metadata_sheet: raw.metadata_sheet,
            current_version: raw.current_version,
            minimum_version: raw.minimum_version,
        }
    }

    // ── Directory lookups ───────────────────────────────────────────────────

    /// Worksheet holding `property`.
    pub fn sheet_for(&self, property: &str) -> Option<&str> {
        self.property_sheets
            .get(&normalize(property))
            .map(String::as_str)
    }

    /// Properties stored in `sheet`, sorted.
    pub fn properties_in(&self, sheet: &str) -> &[String] {
        self.sheet_properties
            .get(sheet)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct property worksheets, sorted.
    pub fn property_sheets(&self) -> impl Iterator<Item = &str> {
        self.sheet_properties.keys().map(String::as_str)
    }

    /// Property that bare `ID`/`value`/`quality` headers in `sheet` refer to.
    ///
    /// A property named like the sheet wins; otherwise the first property
    /// mapped to the sheet; otherwise the sheet name itself.
    pub fn primary_property(&self, sheet: &str) -> String {
        let sheet_key = normalize(sheet);
        match self.sheet_properties.get(sheet) {
            Some(props) if props.contains(&sheet_key) => sheet_key,
            Some(props) if !props.is_empty() => props[0].clone(),
            _ => sheet_key,
        }
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    /// Whether `name` is registered as a parameter of some property.
    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameter_owner.contains_key(&normalize(name))
    }

    /// Property that owns parameter `name`.
    pub fn parameter_owner(&self, name: &str) -> Option<&str> {
        self.parameter_owner
            .get(&normalize(name))
            .map(String::as_str)
    }

    // ── Scalars ─────────────────────────────────────────────────────────────

    pub fn depth_tolerance(&self) -> f64 {
        self.depth_tolerance
    }

    pub fn metadata_sheet(&self) -> &str {
        &self.metadata_sheet
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    pub fn minimum_version(&self) -> &Version {
        &self.minimum_version
    }
}

/// Lower-case, trimmed, inner whitespace collapsed.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
