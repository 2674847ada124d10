//! The profile table: one core, one or more properties, over an ordered
//! sequence of depth sections.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::depth::{DepthInterval, DepthModel};
use crate::error::MergeError;
use crate::merge;
use crate::schema::separator;

// ── Vertical reference ──────────────────────────────────────────────────────

/// Direction in which depth increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalDirection {
    #[default]
    Down,
    Up,
}

impl VerticalDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "down" | "positive downward" | "downward" => Some(Self::Down),
            "up" | "positive upward" | "upward" => Some(Self::Up),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Up => "up",
        }
    }
}

impl fmt::Display for VerticalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of the zero datum, direction of increasing depth, and offset.
#[derive(Debug, Clone, PartialEq)]
pub struct VerticalReference {
    pub loc: String,
    pub dir: VerticalDirection,
    pub h: f64,
}

impl Default for VerticalReference {
    fn default() -> Self {
        Self {
            loc: "ice surface".to_string(),
            dir: VerticalDirection::Down,
            h: 0.0,
        }
    }
}

// ── Property columns ────────────────────────────────────────────────────────

/// Which sub-columns a property carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyLayout {
    pub id: bool,
    pub value: bool,
    pub quality: bool,
}

impl PropertyLayout {
    pub fn union(self, other: Self) -> Self {
        Self {
            id: self.id || other.id,
            value: self.value || other.value,
            quality: self.quality || other.quality,
        }
    }
}

/// The `<property>_ID`, `<property>_value` and `<property>_quality` columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyColumnSet {
    pub id: Option<Vec<Option<String>>>,
    pub value: Option<Vec<f64>>,
    pub quality: Option<Vec<f64>>,
}

impl PropertyColumnSet {
    pub fn layout(&self) -> PropertyLayout {
        PropertyLayout {
            id: self.id.is_some(),
            value: self.value.is_some(),
            quality: self.quality.is_some(),
        }
    }

    /// Whether `row` carries data for this property.
    ///
    /// `ID` or `value` decide; `quality` only counts when neither exists.
    pub fn is_present(&self, row: usize) -> bool {
        let id = self
            .id
            .as_ref()
            .map(|c| c[row].is_some());
        let value = self.value.as_ref().map(|c| !c[row].is_nan());
        match (id, value) {
            (None, None) => self.quality.as_ref().is_some_and(|c| !c[row].is_nan()),
            (id, value) => id.unwrap_or(false) || value.unwrap_or(false),
        }
    }

    pub fn cell(&self, row: usize) -> PropertyCell {
        PropertyCell {
            id: self.id.as_ref().and_then(|c| c[row].clone()),
            value: self.value.as_ref().and_then(|c| non_nan(c[row])),
            quality: self.quality.as_ref().and_then(|c| non_nan(c[row])),
        }
    }

    /// Pad or cut every column to `rows`. Returns whether any column had
    /// another length.
    fn fit(&mut self, rows: usize) -> bool {
        let mut resized = false;
        if let Some(c) = self.id.as_mut() {
            resized |= c.len() != rows;
            c.resize(rows, None);
        }
        for c in [self.value.as_mut(), self.quality.as_mut()].into_iter().flatten() {
            resized |= c.len() != rows;
            c.resize(rows, f64::NAN);
        }
        resized
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        if let Some(c) = self.id.as_mut() {
            retain_by(c, keep);
        }
        if let Some(c) = self.value.as_mut() {
            retain_by(c, keep);
        }
        if let Some(c) = self.quality.as_mut() {
            retain_by(c, keep);
        }
    }
}

/// One row of one property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyCell {
    pub id: Option<String>,
    pub value: Option<f64>,
    pub quality: Option<f64>,
}

impl PropertyCell {
    pub fn is_null(&self) -> bool {
        self.id.is_none() && self.value.is_none() && self.quality.is_none()
    }
}

// ── Rows ────────────────────────────────────────────────────────────────────

/// Row view of a profile, used by the merge engine.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub interval: DepthInterval,
    pub comment: Option<String>,
    pub property: BTreeSet<String>,
    pub values: BTreeMap<String, PropertyCell>,
    pub parameters: BTreeMap<String, Option<f64>>,
}

impl ProfileRow {
    pub fn empty(interval: DepthInterval) -> Self {
        Self {
            interval,
            comment: None,
            property: BTreeSet::new(),
            values: BTreeMap::new(),
            parameters: BTreeMap::new(),
        }
    }
}

// ── Profile ─────────────────────────────────────────────────────────────────

/// Depth-indexed measurements of one core.
///
/// Columns are the depth triple, a typed set of sub-columns per property,
/// numeric parameter columns, `comment` and the `property` provenance.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    name: Option<String>,
    v_ref: VerticalReference,
    depth: DepthModel,
    comment: Vec<Option<String>>,
    provenance: Vec<BTreeSet<String>>,
    properties: BTreeMap<String, PropertyColumnSet>,
    parameters: BTreeMap<String, Vec<f64>>,
}

impl Profile {
    /// Empty profile for core `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Assemble a profile from resolved columns.
    ///
    /// Rows whose depth triple is entirely unknown are dropped, provenance
    /// is derived from the property columns, duplicate depth keys are
    /// collapsed and rows are sorted by depth.
    pub fn from_parts(
        name: Option<String>,
        v_ref: VerticalReference,
        depth: DepthModel,
        comment: Vec<Option<String>>,
        properties: BTreeMap<String, PropertyColumnSet>,
        parameters: BTreeMap<String, Vec<f64>>,
    ) -> Self {
        let rows = depth.len();
        let mut profile = Self {
            name,
            v_ref,
            depth,
            comment,
            provenance: Vec::new(),
            properties,
            parameters,
        };
        profile.comment.resize(rows, None);
        let core = profile.name_or_default().to_string();
        for (property, set) in profile.properties.iter_mut() {
            if set.fit(rows) {
                warn!(core = %core, %property, rows, "property column length differs from depth; fitted");
            }
        }
        for (parameter, values) in profile.parameters.iter_mut() {
            if values.len() != rows {
                warn!(core = %core, %parameter, rows, "parameter column length differs from depth; fitted");
                values.resize(rows, f64::NAN);
            }
        }
        profile.refresh_provenance();

        let keep: Vec<bool> = profile
            .depth
            .intervals()
            .map(|interval| !interval.is_null())
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            warn!(core = profile.name_or_default(), dropped, "dropping rows without any depth");
            profile.retain_rows(&keep);
        }

        let layout = profile.layout();
        let parameter_names = profile.parameters.keys().cloned().collect();
        let name = profile.name.clone();
        let v_ref = profile.v_ref.clone();
        let rows = merge::collapse(profile.rows().collect(), name.as_deref());
        Self::from_rows(name, v_ref, &layout, &parameter_names, rows)
    }

    /// Rebuild a profile from row views. Rows are sorted by depth.
    pub fn from_rows(
        name: Option<String>,
        v_ref: VerticalReference,
        layout: &BTreeMap<String, PropertyLayout>,
        parameter_names: &BTreeSet<String>,
        mut rows: Vec<ProfileRow>,
    ) -> Self {
        rows.sort_by(|a, b| depth_order(&a.interval, &b.interval));

        let mut depth = DepthModel::default();
        let mut comment = Vec::with_capacity(rows.len());
        let mut provenance = Vec::with_capacity(rows.len());
        for row in &rows {
            depth.y_low.push(row.interval.y_low);
            depth.y_mid.push(row.interval.y_mid);
            depth.y_sup.push(row.interval.y_sup);
            comment.push(row.comment.clone());
            provenance.push(row.property.clone());
        }

        let properties = layout
            .iter()
            .map(|(name, layout)| {
                let cell = |row: &ProfileRow| row.values.get(name).cloned().unwrap_or_default();
                let set = PropertyColumnSet {
                    id: layout
                        .id
                        .then(|| rows.iter().map(|r| cell(r).id).collect()),
                    value: layout.value.then(|| {
                        rows.iter()
                            .map(|r| cell(r).value.unwrap_or(f64::NAN))
                            .collect()
                    }),
                    quality: layout.quality.then(|| {
                        rows.iter()
                            .map(|r| cell(r).quality.unwrap_or(f64::NAN))
                            .collect()
                    }),
                };
                (name.clone(), set)
            })
            .collect();

        let parameters = parameter_names
            .iter()
            .map(|name| {
                let column = rows
                    .iter()
                    .map(|r| r.parameters.get(name).copied().flatten().unwrap_or(f64::NAN))
                    .collect();
                (name.clone(), column)
            })
            .collect();

        Self {
            name,
            v_ref,
            depth,
            comment,
            provenance,
            properties,
            parameters,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn name_or_default(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn v_ref(&self) -> &VerticalReference {
        &self.v_ref
    }

    pub fn set_v_ref(&mut self, v_ref: VerticalReference) {
        self.v_ref = v_ref;
    }

    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    pub fn depth(&self) -> &DepthModel {
        &self.depth
    }

    pub fn y_low(&self) -> &[f64] {
        &self.depth.y_low
    }

    pub fn y_mid(&self) -> &[f64] {
        &self.depth.y_mid
    }

    pub fn y_sup(&self) -> &[f64] {
        &self.depth.y_sup
    }

    pub fn comments(&self) -> &[Option<String>] {
        &self.comment
    }

    /// Declared property names, sorted.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyColumnSet> {
        self.properties.get(name)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn parameter(&self, name: &str) -> Option<&[f64]> {
        self.parameters.get(name).map(Vec::as_slice)
    }

    /// `<property>_value` at `row`, if any.
    pub fn value(&self, property: &str, row: usize) -> Option<f64> {
        self.properties
            .get(property)
            .and_then(|set| set.value.as_ref())
            .and_then(|c| c.get(row).copied())
            .and_then(non_nan)
    }

    /// Stored provenance of `row`.
    pub fn provenance(&self, row: usize) -> &BTreeSet<String> {
        &self.provenance[row]
    }

    /// The `property` column value of `row`, e.g. `"salinity, temperature"`.
    pub fn property_label(&self, row: usize) -> String {
        join_names(&self.provenance[row])
    }

    pub fn property_labels(&self) -> Vec<String> {
        (0..self.len()).map(|i| self.property_label(i)).collect()
    }

    /// Properties with data at `row`, computed from the columns.
    pub fn present_properties(&self, row: usize) -> BTreeSet<String> {
        self.properties
            .iter()
            .filter(|(_, set)| set.is_present(row))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn layout(&self) -> BTreeMap<String, PropertyLayout> {
        self.properties
            .iter()
            .map(|(name, set)| (name.clone(), set.layout()))
            .collect()
    }

    pub fn row(&self, i: usize) -> ProfileRow {
        ProfileRow {
            interval: self.depth.interval(i),
            comment: self.comment[i].clone(),
            property: self.provenance[i].clone(),
            values: self
                .properties
                .iter()
                .map(|(name, set)| (name.clone(), set.cell(i)))
                .collect(),
            parameters: self
                .parameters
                .iter()
                .map(|(name, col)| (name.clone(), non_nan(col[i])))
                .collect(),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = ProfileRow> + '_ {
        (0..self.len()).map(|i| self.row(i))
    }

    // ── Mutation ────────────────────────────────────────────────────────────

    /// Merge `incoming` into this profile.
    ///
    /// On identity mismatch the error is logged, returned, and `self` is
    /// left untouched.
    pub fn add(&mut self, incoming: Profile) -> Result<(), MergeError> {
        match merge::merge(self, &incoming) {
            Ok(merged) => {
                *self = merged;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "profile merge skipped");
                Err(err)
            }
        }
    }

    /// Remove a property. Rows that carried only this property go with it.
    pub fn delete_property(&mut self, name: &str) -> bool {
        if self.properties.remove(name).is_none() {
            debug!(core = self.name_or_default(), property = name, "no such property");
            return false;
        }
        let keep: Vec<bool> = self
            .provenance
            .iter_mut()
            .map(|names| {
                let had = names.remove(name);
                !(had && names.is_empty())
            })
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        self.retain_rows(&keep);
        info!(core = self.name_or_default(), property = name, dropped, "property deleted");
        true
    }

    /// Sub-profile with the rows and columns of one property.
    pub fn select_property(&self, name: &str) -> Option<Profile> {
        let set = self.properties.get(name)?;
        let mut layout = BTreeMap::new();
        layout.insert(name.to_string(), set.layout());
        let rows = self
            .rows()
            .filter(|row| row.property.contains(name))
            .map(|mut row| {
                row.values.retain(|k, _| k == name);
                row.property.retain(|k| k == name);
                row.parameters.clear();
                row
            })
            .collect();
        Some(Self::from_rows(
            self.name.clone(),
            self.v_ref.clone(),
            &layout,
            &BTreeSet::new(),
            rows,
        ))
    }

    /// Insert empty rows for gaps between consecutive sections.
    /// Returns the number of rows inserted.
    pub fn fill_missing_sections(&mut self, tolerance: f64) -> usize {
        let gaps = self.depth.missing_sections(tolerance);
        if gaps.is_empty() {
            return 0;
        }
        let inserted = gaps.len();
        let layout = self.layout();
        let parameter_names = self.parameters.keys().cloned().collect();
        let mut rows: Vec<ProfileRow> = self.rows().collect();
        rows.extend(gaps.into_iter().map(ProfileRow::empty));
        *self = Self::from_rows(
            self.name.clone(),
            self.v_ref.clone(),
            &layout,
            &parameter_names,
            rows,
        );
        debug!(core = self.name_or_default(), inserted, "filled missing sections");
        inserted
    }

    /// Recompute the `property` column from the property columns.
    pub fn refresh_provenance(&mut self) {
        self.provenance = (0..self.len()).map(|i| self.present_properties(i)).collect();
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        retain_by(&mut self.depth.y_low, keep);
        retain_by(&mut self.depth.y_mid, keep);
        retain_by(&mut self.depth.y_sup, keep);
        retain_by(&mut self.comment, keep);
        retain_by(&mut self.provenance, keep);
        for set in self.properties.values_mut() {
            set.retain_rows(keep);
        }
        for col in self.parameters.values_mut() {
            retain_by(col, keep);
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Depth ordering: mid-point, then bounds; NaN sorts last.
pub fn depth_order(a: &DepthInterval, b: &DepthInterval) -> Ordering {
    nan_last(a.y_mid, b.y_mid)
        .then_with(|| nan_last(a.y_low, b.y_low))
        .then_with(|| nan_last(a.y_sup, b.y_sup))
}

fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// `", "`-joined, sorted property names.
pub fn join_names(names: &BTreeSet<String>) -> String {
    names
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator::PROPERTY)
}

pub(crate) fn non_nan(v: f64) -> Option<f64> {
    (!v.is_nan()).then_some(v)
}

fn retain_by<T>(column: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    column.retain(|_| *flags.next().unwrap_or(&true));
}
