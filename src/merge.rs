//! Profile merge engine.
//!
//! Two profiles of the same core are outer-joined on the exact depth key.
//! Rows meeting on one key are combined: provenance is unioned, comments
//! are concatenated and deduplicated, and for a value carried by both sides
//! the base side wins.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::depth::DepthInterval;
use crate::error::MergeError;
use crate::profile::{Profile, ProfileRow, PropertyCell};

/// Exact identity of a depth section.
///
/// Sections with both bounds are keyed by the bounds; otherwise every
/// coordinate takes part (a mid-point-only section is keyed by its
/// mid-point). Floats are compared by bit pattern with `-0.0 == 0.0` and
/// all NaNs equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DepthKey {
    Bounds(u64, u64),
    Partial(u64, u64, u64),
}

impl DepthKey {
    pub fn of(interval: &DepthInterval) -> Self {
        if interval.y_low.is_finite() && interval.y_sup.is_finite() {
            Self::Bounds(bits(interval.y_low), bits(interval.y_sup))
        } else {
            Self::Partial(
                bits(interval.y_low),
                bits(interval.y_mid),
                bits(interval.y_sup),
            )
        }
    }
}

fn bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Merge `incoming` into a copy of `base`.
///
/// Fails with [`MergeError::CoreIdentityMismatch`] when the profiles belong
/// to different cores. The caller decides whether to log and carry on.
pub fn merge(base: &Profile, incoming: &Profile) -> Result<Profile, MergeError> {
    if base.name() != incoming.name() {
        return Err(MergeError::CoreIdentityMismatch {
            base: base.name_or_default().to_string(),
            incoming: incoming.name_or_default().to_string(),
        });
    }

    if base.v_ref() != incoming.v_ref() {
        warn!(
            core = base.name_or_default(),
            base = ?base.v_ref(),
            incoming = ?incoming.v_ref(),
            "vertical references differ; keeping the base reference"
        );
    }

    let mut layout = base.layout();
    for (name, l) in incoming.layout() {
        let entry = layout.entry(name).or_default();
        *entry = entry.union(l);
    }
    let parameter_names: BTreeSet<String> = base
        .parameter_names()
        .chain(incoming.parameter_names())
        .map(str::to_string)
        .collect();

    let rows = collapse(base.rows().chain(incoming.rows()).collect(), base.name());
    debug!(
        core = base.name_or_default(),
        base_rows = base.len(),
        incoming_rows = incoming.len(),
        merged_rows = rows.len(),
        "profiles merged"
    );

    Ok(Profile::from_rows(
        base.name().map(str::to_string),
        base.v_ref().clone(),
        &layout,
        &parameter_names,
        rows,
    ))
}

/// Combine rows sharing a depth key, first occurrence as the base.
pub fn collapse(rows: Vec<ProfileRow>, core: Option<&str>) -> Vec<ProfileRow> {
    let core = core.unwrap_or("<unnamed>");
    let mut by_key: BTreeMap<DepthKey, ProfileRow> = BTreeMap::new();
    for row in rows {
        match by_key.entry(DepthKey::of(&row.interval)) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => combine_rows(slot.get_mut(), row, core),
        }
    }
    by_key.into_values().collect()
}

/// Fold `incoming` into `base`, both on the same depth key.
pub fn combine_rows(base: &mut ProfileRow, incoming: ProfileRow, core: &str) {
    base.comment = join_segments(base.comment.as_deref(), incoming.comment.as_deref());
    base.property.extend(incoming.property);
    let depth = base.interval.y_mid;

    for (name, cell) in incoming.values {
        match base.values.get_mut(&name) {
            Some(existing) => combine_cells(existing, cell, core, &name, depth),
            None => {
                base.values.insert(name, cell);
            }
        }
    }

    for (name, value) in incoming.parameters {
        let slot = base.parameters.entry(name.clone()).or_insert(None);
        *slot = pick(*slot, value, core, &name, depth);
    }
}

fn combine_cells(base: &mut PropertyCell, incoming: PropertyCell, core: &str, property: &str, depth: f64) {
    if base.id.is_none() {
        base.id = incoming.id;
    } else if incoming.id.is_some() && incoming.id != base.id {
        warn!(core, property, depth, kept = ?base.id, dropped = ?incoming.id, "conflicting sample IDs at one depth");
    }
    base.value = pick(base.value, incoming.value, core, property, depth);
    base.quality = pick(base.quality, incoming.quality, core, property, depth);
}

fn pick(base: Option<f64>, incoming: Option<f64>, core: &str, column: &str, depth: f64) -> Option<f64> {
    match (base, incoming) {
        (Some(kept), Some(dropped)) if kept != dropped => {
            warn!(core, column, depth, kept, dropped, "conflicting values at one depth; keeping the first");
            Some(kept)
        }
        (Some(kept), _) => Some(kept),
        (None, other) => other,
    }
}

/// Concatenate two `;`-separated texts, dropping repeated segments.
pub fn join_segments(a: Option<&str>, b: Option<&str>) -> Option<String> {
    let mut seen: Vec<&str> = Vec::new();
    for segment in a.into_iter().chain(b).flat_map(|s| s.split(';')) {
        let segment = segment.trim();
        if !segment.is_empty() && !seen.contains(&segment) {
            seen.push(segment);
        }
    }
    (!seen.is_empty()).then(|| seen.join(crate::schema::separator::COMMENT))
}
