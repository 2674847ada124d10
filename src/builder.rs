//! Profile table builder.
//!
//! Reads one property worksheet (header block + data block) into a
//! [`Profile`]. Two header layouts are understood:
//!
//! - single row: each column header names a depth token, `comment`, a
//!   property, a parameter, or a bare `ID`/`value`/`quality` belonging to
//!   the sheet's primary property;
//! - header + sub-header: a top header spans several sub-columns
//!   (`ID`, `value`, `quality`, ...). Blank top cells continue the header to
//!   their left, as merged cells do.
//!
//! The layout is detected by probing what sits below the header: text rows
//! before the first numeric row (beyond a declared unit row) are a
//! sub-header tier.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use tracing::{debug, info, warn};

use crate::config::{normalize, ImportConfig};
use crate::depth::{DepthColumns, DepthResolver};
use crate::error::ImportError;
use crate::grid::{Cell, Grid};
use crate::profile::{Profile, PropertyColumnSet, VerticalReference};
use crate::schema::{header, subcolumn};

/// Where the header block sits. Fixed by the post-migration sheet layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SheetLayout {
    pub header_row: usize,
    pub first_column: usize,
    /// A row of units follows the header tier(s).
    pub has_unit_row: bool,
}

/// Per-sheet facts the builder cannot read from the grid itself.
#[derive(Debug, Clone)]
pub struct SheetContext<'a> {
    pub sheet: &'a str,
    pub core_name: &'a str,
    pub v_ref: VerticalReference,
    pub core_length: Option<f64>,
}

impl<'a> SheetContext<'a> {
    pub fn new(sheet: &'a str, core_name: &'a str) -> Self {
        Self {
            sheet,
            core_name,
            v_ref: VerticalReference::default(),
            core_length: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DepthSlot {
    Low,
    Mid,
    Sup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Sub {
    Id,
    Value,
    Quality,
}

impl Sub {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(subcolumn::ID) {
            Some(Self::Id)
        } else if s.eq_ignore_ascii_case(subcolumn::VALUE) {
            Some(Self::Value)
        } else if s.eq_ignore_ascii_case(subcolumn::QUALITY) {
            Some(Self::Quality)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Depth(DepthSlot),
    Comment,
    Property(String, Sub),
    Parameter(String),
}

#[derive(Debug, Clone)]
struct ColumnSpec {
    index: usize,
    label: String,
    role: Role,
    unit: Option<String>,
}

/// A header cell holding neither text nor a number.
#[derive(Debug)]
struct MalformedHeader {
    row: usize,
    column: usize,
    found: Cell,
}

/// Turns worksheet grids into profiles.
pub struct ProfileBuilder<'c> {
    config: &'c ImportConfig,
}

impl<'c> ProfileBuilder<'c> {
    pub fn new(config: &'c ImportConfig) -> Self {
        Self { config }
    }

    /// Build the profile of one worksheet.
    ///
    /// A malformed header block yields an empty profile (logged); depth
    /// columns of unequal length are an error.
    pub fn build(
        &self,
        grid: &dyn Grid,
        layout: &SheetLayout,
        ctx: &SheetContext<'_>,
    ) -> Result<Profile, ImportError> {
        let empty = || {
            let mut profile = Profile::new(ctx.core_name);
            profile.set_v_ref(ctx.v_ref.clone());
            profile
        };

        let (columns, data_start) = match self.parse_header(grid, layout, ctx.sheet) {
            Ok(parsed) => parsed,
            Err(bad) => {
                warn!(
                    core = ctx.core_name,
                    sheet = ctx.sheet,
                    row = bad.row,
                    column = bad.column,
                    found = ?bad.found,
                    "malformed header; sheet skipped"
                );
                return Ok(empty());
            }
        };

        if !columns.iter().any(|c| matches!(c.role, Role::Depth(_))) {
            warn!(core = ctx.core_name, sheet = ctx.sheet, "no depth column; sheet skipped");
            return Ok(empty());
        }

        let in_cm = columns.iter().any(|c| {
            matches!(c.role, Role::Depth(_))
                && c.unit.as_deref().is_some_and(|u| u.eq_ignore_ascii_case("cm"))
        });

        let depth_cells = |slot: DepthSlot| {
            columns
                .iter()
                .find(|c| c.role == Role::Depth(slot))
                .map(|c| grid.column_from(c.index, data_start))
        };
        let low = depth_cells(DepthSlot::Low);
        let mid = depth_cells(DepthSlot::Mid);
        let sup = depth_cells(DepthSlot::Sup);
        let mut raw = DepthColumns::from_cells(low.as_deref(), mid.as_deref(), sup.as_deref());
        if in_cm {
            info!(core = ctx.core_name, sheet = ctx.sheet, "depth given in cm; converted to m");
            raw.scale(0.01);
        }
        let depth = DepthResolver::new(self.config.depth_tolerance())
            .with_core_length(ctx.core_length)
            .resolve(raw)?;

        let rows = depth.len();
        let cells = |index: usize| {
            (0..rows)
                .map(|i| grid.cell(data_start + i, index))
                .collect::<Vec<_>>()
        };

        let mut comment: Vec<Option<String>> = vec![None; rows];
        let mut properties: BTreeMap<String, PropertyColumnSet> = BTreeMap::new();
        let mut parameters: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for spec in &columns {
            if let Role::Property(name, _) = &spec.role {
                if let Some(home) = self.config.sheet_for(name).filter(|home| *home != ctx.sheet) {
                    debug!(
                        core = ctx.core_name,
                        sheet = ctx.sheet,
                        property = %name,
                        home,
                        "property read outside its configured sheet"
                    );
                }
            }
            match &spec.role {
                Role::Depth(_) => {}
                Role::Comment => {
                    comment = cells(spec.index).into_iter().map(Cell::to_text).collect();
                }
                Role::Property(name, Sub::Id) => {
                    let ids = cells(spec.index).into_iter().map(Cell::to_text).collect();
                    properties.entry(name.clone()).or_default().id = Some(ids);
                }
                Role::Property(name, sub) => {
                    let values = numeric_column(&cells(spec.index), ctx, &spec.label);
                    let set = properties.entry(name.clone()).or_default();
                    match sub {
                        Sub::Value => set.value = Some(values),
                        _ => set.quality = Some(values),
                    }
                }
                Role::Parameter(name) => {
                    debug!(
                        sheet = ctx.sheet,
                        parameter = %name,
                        owner = self.config.parameter_owner(name),
                        "parameter column"
                    );
                    let values = numeric_column(&cells(spec.index), ctx, &spec.label);
                    parameters.insert(name.clone(), values);
                }
            }
        }

        let profile = Profile::from_parts(
            Some(ctx.core_name.to_string()),
            ctx.v_ref.clone(),
            depth,
            comment,
            properties,
            parameters,
        );
        debug!(
            core = ctx.core_name,
            sheet = ctx.sheet,
            rows = profile.len(),
            properties = ?profile.property_names().collect::<Vec<_>>(),
            "sheet built"
        );
        Ok(profile)
    }

    // ── Header parsing ──────────────────────────────────────────────────────

    fn parse_header(
        &self,
        grid: &dyn Grid,
        layout: &SheetLayout,
        sheet: &str,
    ) -> Result<(Vec<ColumnSpec>, usize), MalformedHeader> {
        let h = layout.header_row;
        let span = layout.first_column..grid.max_column();

        let mut tops: Vec<Option<String>> = Vec::with_capacity(span.len());
        for column in span.clone() {
            let cell = grid.cell(h, column);
            let top = match cell {
                Cell::Empty => None,
                Cell::Text(_) | Cell::Number(_) => cell.to_text(),
                Cell::Date(_) => {
                    return Err(MalformedHeader {
                        row: h,
                        column,
                        found: cell.clone(),
                    })
                }
            };
            tops.push(top);
        }

        let two_tier = Self::has_sub_header(grid, layout, span.clone());
        let tiers = if two_tier { 2 } else { 1 };
        let unit_row = layout.has_unit_row.then_some(h + tiers);
        let data_start = h + tiers + usize::from(layout.has_unit_row);

        let primary = self.config.primary_property(sheet);
        let mut seen: BTreeSet<Role> = BTreeSet::new();
        let mut columns = Vec::new();
        let mut current_top: Option<String> = None;

        for (offset, column) in span.enumerate() {
            let top = match &tops[offset] {
                Some(t) => {
                    current_top = Some(t.clone());
                    Some(t.clone())
                }
                None if two_tier => current_top.clone(),
                None => None,
            };
            let sub = if two_tier {
                grid.cell(h + 1, column).to_text()
            } else {
                None
            };
            let Some(top) = top else {
                continue;
            };

            let Some(role) = self.classify(&top, sub.as_deref(), &primary) else {
                debug!(sheet, column, header = %top, "unrecognized column ignored");
                continue;
            };
            let label = match &sub {
                Some(s) => format!("{top}_{s}"),
                None => top.clone(),
            };
            if !seen.insert(role.clone()) {
                warn!(sheet, column, header = %label, "duplicate column dropped");
                continue;
            }
            let unit = unit_row.and_then(|r| grid.cell(r, column).to_text());
            columns.push(ColumnSpec {
                index: column,
                label,
                role,
                unit,
            });
        }

        Ok((columns, data_start))
    }

    /// Data starts at the first row below the header holding a number.
    /// More text rows above it than the unit row accounts for means a
    /// sub-header tier. Without data, a text cell directly under a text
    /// header decides.
    fn has_sub_header(grid: &dyn Grid, layout: &SheetLayout, span: Range<usize>) -> bool {
        let h = layout.header_row;
        let first_data = (h + 1..grid.max_row()).find(|&row| {
            span.clone()
                .any(|column| matches!(grid.cell(row, column), Cell::Number(_)))
        });
        match first_data {
            Some(row) => row - h - 1 > usize::from(layout.has_unit_row),
            None => span.into_iter().any(|column| {
                grid.cell(h, column).as_text().is_some()
                    && grid.cell(h + 1, column).as_text().is_some()
            }),
        }
    }

    fn classify(&self, top: &str, sub: Option<&str>, primary: &str) -> Option<Role> {
        let top = normalize(top);
        if let Some(role) = reserved(&top) {
            return Some(role);
        }
        let sub = sub.map(normalize).filter(|s| !s.is_empty());

        match sub {
            Some(s) => {
                if let Some(role) = reserved(&s) {
                    return Some(role);
                }
                match Sub::parse(&s) {
                    Some(kind) if self.config.is_parameter(&top) => Some(Role::Parameter(
                        if kind == Sub::Value {
                            top
                        } else {
                            format!("{top}_{s}")
                        },
                    )),
                    Some(kind) => Some(Role::Property(top, kind)),
                    None => Some(Role::Parameter(format!("{top}_{s}"))),
                }
            }
            None => match Sub::parse(&top) {
                Some(kind) => Some(Role::Property(primary.to_string(), kind)),
                None if top.is_empty() => None,
                None if self.config.is_parameter(&top) => Some(Role::Parameter(top)),
                None => Some(Role::Property(top, Sub::Value)),
            },
        }
    }
}

fn reserved(token: &str) -> Option<Role> {
    match token {
        header::DEPTH_LOW => Some(Role::Depth(DepthSlot::Low)),
        header::DEPTH_SUP => Some(Role::Depth(DepthSlot::Sup)),
        header::DEPTH_CENTER => Some(Role::Depth(DepthSlot::Mid)),
        header::COMMENT => Some(Role::Comment),
        _ => None,
    }
}

/// Numeric coercion; non-numeric, non-blank cells become NaN with a warning.
fn numeric_column(cells: &[&Cell], ctx: &SheetContext<'_>, label: &str) -> Vec<f64> {
    let mut rejected = 0usize;
    let values = cells
        .iter()
        .map(|cell| {
            let v = cell.to_f64();
            if v.is_nan() && !cell.is_empty() {
                rejected += 1;
            }
            v
        })
        .collect();
    if rejected > 0 {
        warn!(
            core = ctx.core_name,
            sheet = ctx.sheet,
            column = label,
            rejected,
            "non-numeric values coerced to NaN"
        );
    }
    values
}
