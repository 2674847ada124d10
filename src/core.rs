//! Core aggregate: one physical sampling event and its merged profile.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use semver::Version;
use tracing::{debug, error, info, warn};

use crate::error::IceError;
use crate::merge::join_segments;
use crate::profile::{Profile, VerticalReference};

/// Field metadata recorded once per core.
#[derive(Debug, Clone, Default)]
pub struct CoreInfo {
    pub date: Option<NaiveDateTime>,
    pub origin: Option<String>,
    pub campaign: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Measured core length (m).
    pub length: Option<f64>,
    pub ice_thickness: Option<f64>,
    pub freeboard: Option<f64>,
    /// One entry per field measurement.
    pub snow_depth: Vec<f64>,
    pub v_ref: VerticalReference,
}

/// Auxiliary scalars that travel with a core.
#[derive(Debug, Clone, Default)]
pub struct AuxMetadata {
    pub t_air: Option<f64>,
    pub t_snow_surface: Option<f64>,
    pub t_ice_surface: Option<f64>,
    pub t_water: Option<f64>,
    pub s_water: Option<f64>,
    pub protocol: Option<String>,
    /// instrument role → instrument
    pub instruments: BTreeMap<String, String>,
    /// quantity → unit
    pub units: BTreeMap<String, String>,
    pub source: Option<PathBuf>,
    pub version: Option<Version>,
}

/// Aggregate root for one ice core.
#[derive(Debug, Clone)]
pub struct Core {
    name: String,
    pub info: CoreInfo,
    pub aux: AuxMetadata,
    collection: Vec<String>,
    comment: Option<String>,
    profile: Profile,
}

impl Core {
    pub fn new(name: impl Into<String>, info: CoreInfo) -> Self {
        let name = name.into();
        let mut profile = Profile::new(name.clone());
        profile.set_v_ref(info.v_ref.clone());
        Self {
            collection: vec![name.clone()],
            name,
            info,
            aux: AuxMetadata::default(),
            comment: None,
            profile,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Related core names, sorted, deduplicated, own name included.
    pub fn collection(&self) -> &[String] {
        &self.collection
    }

    /// `"; "`-joined comment segments.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn into_profile(self) -> Profile {
        self.profile
    }

    // ── Accretive operations ────────────────────────────────────────────────

    /// Fold a property profile into the core's profile.
    ///
    /// Returns false (and logs) when the profile is empty or belongs to
    /// another core.
    pub fn add_profile(&mut self, profile: Profile) -> bool {
        if profile.name() != Some(self.name.as_str()) {
            error!(
                core = %self.name,
                incoming = profile.name().unwrap_or("<unnamed>"),
                "core identity mismatch; profile not added"
            );
            return false;
        }
        if profile.is_empty() {
            debug!(core = %self.name, "empty profile ignored");
            return false;
        }
        if self.profile.is_empty() {
            self.profile = profile;
            return true;
        }
        self.profile.add(profile).is_ok()
    }

    /// Add one or more core names to the collection.
    ///
    /// Blank names are ignored; the collection stays sorted and unique.
    pub fn add_to_collection<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.collection.len();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                debug!(core = %self.name, "blank collection entry ignored");
                continue;
            }
            if !self.collection.iter().any(|c| c == name) {
                self.collection.push(name.to_string());
            }
        }
        self.collection.sort();
        if self.collection.len() > before {
            debug!(core = %self.name, collection = ?self.collection, "collection extended");
        }
    }

    /// Remove a core name from the collection. The core's own name stays.
    pub fn remove_from_collection(&mut self, name: &str) -> bool {
        if name == self.name {
            warn!(core = %self.name, "a core cannot leave its own collection");
            return false;
        }
        let before = self.collection.len();
        self.collection.retain(|c| c != name);
        self.collection.len() < before
    }

    /// Append a comment unless it is already one of the `;` segments.
    pub fn add_comment(&mut self, text: Option<&str>) {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            debug!(core = %self.name, "blank comment ignored");
            return;
        };
        self.comment = join_segments(self.comment.as_deref(), Some(text));
    }

    pub fn delete_property(&mut self, property: &str) -> bool {
        self.profile.delete_property(property)
    }

    // ── Output ──────────────────────────────────────────────────────────────

    /// The merged profile as a polars table.
    pub fn profile_frame(&self) -> Result<DataFrame, IceError> {
        self.profile.to_dataframe()
    }

    pub fn write_profile_csv(&self, path: impl AsRef<Path>) -> Result<(), IceError> {
        self.profile.write_csv(path.as_ref())?;
        info!(core = %self.name, path = %path.as_ref().display(), "profile exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::DepthModel;
    use crate::profile::PropertyColumnSet;

    fn core() -> Core {
        Core::new("X1", CoreInfo::default())
    }

    fn single(name: &str, property: &str, low: f64, sup: f64, value: f64) -> Profile {
        let mut properties = BTreeMap::new();
        properties.insert(
            property.to_string(),
            PropertyColumnSet {
                value: Some(vec![value]),
                ..Default::default()
            },
        );
        Profile::from_parts(
            Some(name.into()),
            VerticalReference::default(),
            DepthModel {
                y_low: vec![low],
                y_mid: vec![(low + sup) / 2.0],
                y_sup: vec![sup],
            },
            vec![],
            properties,
            BTreeMap::new(),
        )
    }

    #[test]
    fn collection_always_holds_own_name_once() {
        let mut core = core();
        core.add_to_collection(["X3", "X1", "X2"]);
        core.add_to_collection(Some("X2"));
        core.add_to_collection(["", "  "]);
        assert_eq!(core.collection(), &["X1", "X2", "X3"]);
        assert!(!core.remove_from_collection("X1"));
        assert!(core.remove_from_collection("X3"));
        assert_eq!(core.collection(), &["X1", "X2"]);
    }

    #[test]
    fn comments_are_not_repeated() {
        let mut core = core();
        core.add_comment(Some("X"));
        core.add_comment(Some("X"));
        core.add_comment(None);
        core.add_comment(Some("rafted ice"));
        core.add_comment(Some(" X "));
        assert_eq!(core.comment(), Some("X; rafted ice"));
    }

    #[test]
    fn first_profile_replaces_the_empty_one() {
        let mut core = core();
        assert!(core.add_profile(single("X1", "salinity", 0.0, 0.1, 6.0)));
        assert_eq!(core.profile().len(), 1);
        assert!(core.add_profile(single("X1", "temperature", 0.0, 0.1, -5.0)));
        assert_eq!(core.profile().property_label(0), "salinity, temperature");
    }

    #[test]
    fn foreign_profile_leaves_core_untouched() {
        let mut core = core();
        core.add_profile(single("X1", "salinity", 0.0, 0.1, 6.0));
        assert!(!core.add_profile(single("X9", "temperature", 0.0, 0.1, -5.0)));
        assert_eq!(core.profile().property_labels(), vec!["salinity"]);
        assert!(!core.profile().has_property("temperature"));
    }

    #[test]
    fn empty_profile_is_ignored() {
        let mut core = core();
        assert!(!core.add_profile(Profile::new("X1")));
        assert!(core.profile().is_empty());
    }
}
