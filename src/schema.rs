/// Column-name and header-token constants for the profile table.
/// Single source of truth - also exported to Python via PyO3.

// ── Depth columns ───────────────────────────────────────────────────────────
pub mod depth {
    pub const Y_LOW: &str = "y_low";
    pub const Y_MID: &str = "y_mid";
    pub const Y_SUP: &str = "y_sup";

    pub const ALL: [&str; 3] = [Y_LOW, Y_MID, Y_SUP];
}

// ── Text columns ────────────────────────────────────────────────────────────
pub mod text {
    pub const COMMENT: &str = "comment";
    pub const PROPERTY: &str = "property";
    pub const NAME: &str = "name";
    pub const V_REF_LOC: &str = "v_ref_loc";
    pub const V_REF_DIR: &str = "v_ref_dir";
    pub const V_REF_H: &str = "v_ref_h";
}

// ── Property sub-columns ────────────────────────────────────────────────────
pub mod subcolumn {
    pub const ID: &str = "ID";
    pub const VALUE: &str = "value";
    pub const QUALITY: &str = "quality";
}

// ── Worksheet header tokens ─────────────────────────────────────────────────
pub mod header {
    pub const DEPTH_LOW: &str = "depth 1";
    pub const DEPTH_SUP: &str = "depth 2";
    pub const DEPTH_CENTER: &str = "depth center";
    pub const COMMENT: &str = "comment";
}

// ── Separators ──────────────────────────────────────────────────────────────
pub mod separator {
    /// Between property names in the provenance column.
    pub const PROPERTY: &str = ", ";
    /// Between segments of a comment.
    pub const COMMENT: &str = "; ";
}

/// Column name for a property sub-column, e.g. `salinity_value`.
pub fn property_column(property: &str, sub: &str) -> String {
    format!("{property}_{sub}")
}
