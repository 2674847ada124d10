//! Workbook import: calamine reader, core metadata, schema version gate and
//! the batch importer.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use semver::Version;
use tracing::{debug, error, info, warn};

use crate::builder::{ProfileBuilder, SheetContext, SheetLayout};
use crate::config::{normalize, ImportConfig};
use crate::core::{Core, CoreInfo};
use crate::error::ImportError;
use crate::grid::{Cell, Grid, SheetGrid};
use crate::profile::{VerticalDirection, VerticalReference};

// ── Workbook ────────────────────────────────────────────────────────────────

/// All worksheets of one file, read into memory.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    path: Option<PathBuf>,
    sheets: Vec<SheetGrid>,
}

impl Workbook {
    pub fn from_sheets(sheets: Vec<SheetGrid>) -> Self {
        Self { path: None, sheets }
    }

    /// Read every worksheet of an `.xlsx`/`.xls`/`.ods` file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::MissingFile(path.to_path_buf()));
        }
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names().to_owned();

        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook.worksheet_range(&name)?;
            let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
            let mut grid = SheetGrid::new(name.clone(), Vec::new());
            for (row, col, data) in range.cells() {
                let cell = to_cell(data);
                if cell.is_empty() {
                    continue;
                }
                grid.set(row_offset as usize + row, col_offset as usize + col, cell);
            }
            debug!(
                path = %path.display(),
                sheet = %name,
                rows = grid.max_row(),
                columns = grid.max_column(),
                "worksheet read"
            );
            sheets.push(grid);
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            sheets,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(SheetGrid::name)
    }

    /// Worksheet by name, ignoring case and extra whitespace.
    pub fn sheet(&self, name: &str) -> Option<&SheetGrid> {
        let wanted = normalize(name);
        self.sheets.iter().find(|s| normalize(s.name()) == wanted)
    }

    /// Replace or add a worksheet.
    pub fn put_sheet(&mut self, sheet: SheetGrid) {
        let wanted = normalize(sheet.name());
        match self.sheets.iter_mut().find(|s| normalize(s.name()) == wanted) {
            Some(slot) => *slot = sheet,
            None => self.sheets.push(sheet),
        }
    }
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or(Cell::Number(dt.as_f64()), Cell::Date),
        Data::DateTimeIso(s) => parse_datetime(s).map_or_else(|| Cell::Text(s.clone()), Cell::Date),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

// ── Metadata ────────────────────────────────────────────────────────────────

mod key {
    pub const NAME: &str = "name";
    pub const DATE: &str = "date";
    pub const ORIGIN: &str = "origin";
    pub const CAMPAIGN: &str = "campaign";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const LENGTH: &str = "length";
    pub const ICE_THICKNESS: &str = "ice thickness";
    pub const FREEBOARD: &str = "freeboard";
    pub const SNOW_DEPTH: &str = "snow depth";
    pub const COMMENT: &str = "comment";
    pub const COLLECTION: &str = "collection";
    pub const VERSION: &str = "version";
    pub const V_REF_LOC: &str = "v_ref loc";
    pub const V_REF_DIR: &str = "v_ref dir";
    pub const V_REF_H: &str = "v_ref h";
    pub const AIR_TEMPERATURE: &str = "air temperature";
    pub const SNOW_SURFACE_TEMPERATURE: &str = "snow surface temperature";
    pub const ICE_SURFACE_TEMPERATURE: &str = "ice surface temperature";
    pub const WATER_TEMPERATURE: &str = "water temperature";
    pub const WATER_SALINITY: &str = "water salinity";
    pub const PROTOCOL: &str = "protocol";
    pub const INSTRUMENT_PREFIX: &str = "instrument ";
    pub const UNIT_PREFIX: &str = "unit ";
}

static BLANK: Cell = Cell::Empty;

/// Key/value view of the metadata sheet: keys in the first column, values
/// in the columns to their right.
struct Metadata<'g> {
    grid: &'g SheetGrid,
}

impl<'g> Metadata<'g> {
    fn row_of(&self, key: &str) -> Option<usize> {
        (0..self.grid.max_row()).find(|&row| {
            self.grid
                .cell(row, 0)
                .as_text()
                .is_some_and(|k| normalize(k) == key)
        })
    }

    fn value(&self, key: &str) -> &'g Cell {
        let grid: &'g SheetGrid = self.grid;
        self.row_of(key).map_or(&BLANK, |row| grid.cell(row, 1))
    }

    fn values(&self, key: &str) -> Vec<&'g Cell> {
        let grid: &'g SheetGrid = self.grid;
        self.row_of(key)
            .map(|row| (1..grid.max_column()).map(|col| grid.cell(row, col)).collect())
            .unwrap_or_default()
    }

    fn text(&self, key: &str) -> Option<String> {
        self.value(key).to_text()
    }

    fn number(&self, key: &str) -> Option<f64> {
        let cell = self.value(key);
        let v = cell.to_f64();
        if v.is_nan() {
            if !cell.is_empty() {
                warn!(key, found = ?cell, "metadata value is not a number");
            }
            None
        } else {
            Some(v)
        }
    }

    /// Sampling date. Unreadable values are logged and read as absent.
    fn date(&self) -> Option<NaiveDateTime> {
        let cell = self.value(key::DATE);
        let date = match cell {
            cell if cell.is_empty() => return None,
            Cell::Empty => return None,
            Cell::Date(d) => Some(*d),
            Cell::Number(serial) => excel_serial(*serial),
            Cell::Text(s) => parse_datetime(s),
        };
        if date.is_none() {
            warn!(key = key::DATE, found = ?cell, "unreadable date; left empty");
        }
        date
    }

    /// Rows whose key starts with `prefix`, as (suffix, value) pairs.
    fn prefixed(&self, prefix: &str) -> Vec<(String, String)> {
        (0..self.grid.max_row())
            .filter_map(|row| {
                let k = normalize(self.grid.cell(row, 0).as_text()?);
                let suffix = k.strip_prefix(prefix)?.trim().to_string();
                let v = self.grid.cell(row, 1).to_text()?;
                Some((suffix, v))
            })
            .collect()
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Largest serial a spreadsheet date can hold (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Spreadsheet day count since 1899-12-30. `None` outside the range a
/// spreadsheet date can take.
fn excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

/// Lenient semver: `"1.4"` reads as `1.4.0`.
pub fn parse_version(text: &str) -> Result<Version, ImportError> {
    let text = text.trim().trim_start_matches(['v', 'V']);
    let parts = text.split('.').count();
    let padded = match parts {
        1 => format!("{text}.0.0"),
        2 => format!("{text}.0"),
        _ => text.to_string(),
    };
    Ok(Version::parse(&padded)?)
}

// ── Version migration ───────────────────────────────────────────────────────

/// Brings a workbook from an older schema version to the current one.
pub trait Migrator {
    fn migrate(&self, workbook: Workbook, from: &Version, to: &Version) -> Result<Workbook, ImportError>;
}

/// Accepts no out-of-date workbook.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefuseMigration;

impl Migrator for RefuseMigration {
    fn migrate(&self, _workbook: Workbook, from: &Version, to: &Version) -> Result<Workbook, ImportError> {
        Err(ImportError::Migration {
            from: from.clone(),
            reason: format!("no migration to {to} available"),
        })
    }
}

// ── Importer ────────────────────────────────────────────────────────────────

/// Turns one workbook into one [`Core`].
pub struct Importer<'c> {
    config: &'c ImportConfig,
    layout: SheetLayout,
    migrator: Box<dyn Migrator + 'c>,
}

impl<'c> Importer<'c> {
    pub fn new(config: &'c ImportConfig) -> Self {
        Self {
            config,
            layout: SheetLayout::default(),
            migrator: Box::new(RefuseMigration),
        }
    }

    pub fn with_layout(mut self, layout: SheetLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_migrator(mut self, migrator: impl Migrator + 'c) -> Self {
        self.migrator = Box::new(migrator);
        self
    }

    pub fn import_file(&self, path: impl AsRef<Path>) -> Result<Core, ImportError> {
        let workbook = Workbook::open(path)?;
        self.import(workbook)
    }

    pub fn import(&self, workbook: Workbook) -> Result<Core, ImportError> {
        let workbook = self.check_version(workbook)?;
        let sheet_name = self.config.metadata_sheet();
        let meta_grid = workbook
            .sheet(sheet_name)
            .ok_or_else(|| ImportError::MissingSheet(sheet_name.to_string()))?;
        let mut core = read_metadata(&Metadata { grid: meta_grid })?;
        core.aux.source = workbook.path().map(Path::to_path_buf);

        let builder = ProfileBuilder::new(self.config);
        for sheet in self.config.property_sheets() {
            let Some(grid) = workbook.sheet(sheet) else {
                debug!(core = core.name(), sheet, "sheet not in workbook");
                continue;
            };
            let ctx = SheetContext {
                sheet,
                core_name: core.name(),
                v_ref: core.info.v_ref.clone(),
                core_length: core.info.length,
            };
            match builder.build(grid, &self.layout, &ctx) {
                Ok(profile) => {
                    let absent: Vec<&str> = self
                        .config
                        .properties_in(sheet)
                        .iter()
                        .map(String::as_str)
                        .filter(|p| !profile.has_property(p))
                        .collect();
                    if !absent.is_empty() && !profile.is_empty() {
                        debug!(core = core.name(), sheet, ?absent, "sheet lacks configured properties");
                    }
                    core.add_profile(profile);
                }
                Err(err) => {
                    warn!(core = core.name(), sheet, error = %err, "sheet skipped");
                }
            }
        }

        info!(
            core = core.name(),
            rows = core.profile().len(),
            properties = ?core.profile().property_names().collect::<Vec<_>>(),
            "core imported"
        );
        Ok(core)
    }

    fn check_version(&self, workbook: Workbook) -> Result<Workbook, ImportError> {
        let sheet_name = self.config.metadata_sheet();
        let meta_grid = workbook
            .sheet(sheet_name)
            .ok_or_else(|| ImportError::MissingSheet(sheet_name.to_string()))?;
        let text = Metadata { grid: meta_grid }
            .text(key::VERSION)
            .ok_or_else(|| ImportError::MissingMetadata(key::VERSION.to_string()))?;
        let found = parse_version(&text)?;

        let minimum = self.config.minimum_version();
        let current = self.config.current_version();
        if &found < minimum {
            return Err(ImportError::VersionTooOld {
                found,
                minimum: minimum.clone(),
            });
        }
        if &found < current {
            info!(from = %found, to = %current, "migrating workbook");
            return self.migrator.migrate(workbook, &found, current);
        }
        Ok(workbook)
    }
}

fn read_metadata(meta: &Metadata<'_>) -> Result<Core, ImportError> {
    let name = meta
        .text(key::NAME)
        .ok_or_else(|| ImportError::MissingMetadata(key::NAME.to_string()))?;

    let mut v_ref = VerticalReference::default();
    if let Some(loc) = meta.text(key::V_REF_LOC) {
        v_ref.loc = loc;
    }
    if let Some(dir) = meta.text(key::V_REF_DIR) {
        match VerticalDirection::parse(&dir) {
            Some(parsed) => v_ref.dir = parsed,
            None => warn!(
                key = key::V_REF_DIR,
                found = %dir,
                default = v_ref.dir.as_str(),
                "unknown vertical direction; default kept"
            ),
        }
    }
    if let Some(h) = meta.number(key::V_REF_H) {
        v_ref.h = h;
    }

    let info = CoreInfo {
        date: meta.date(),
        origin: meta.text(key::ORIGIN),
        campaign: meta.text(key::CAMPAIGN),
        lat: meta.number(key::LATITUDE),
        lon: meta.number(key::LONGITUDE),
        length: meta.number(key::LENGTH),
        ice_thickness: meta.number(key::ICE_THICKNESS),
        freeboard: meta.number(key::FREEBOARD),
        snow_depth: meta
            .values(key::SNOW_DEPTH)
            .into_iter()
            .map(Cell::to_f64)
            .filter(|v| !v.is_nan())
            .collect(),
        v_ref,
    };
    if info.date.is_none() {
        warn!(core = %name, "core has no sampling date");
    }

    let mut core = Core::new(name, info);
    core.aux.t_air = meta.number(key::AIR_TEMPERATURE);
    core.aux.t_snow_surface = meta.number(key::SNOW_SURFACE_TEMPERATURE);
    core.aux.t_ice_surface = meta.number(key::ICE_SURFACE_TEMPERATURE);
    core.aux.t_water = meta.number(key::WATER_TEMPERATURE);
    core.aux.s_water = meta.number(key::WATER_SALINITY);
    core.aux.protocol = meta.text(key::PROTOCOL);
    core.aux.instruments = meta.prefixed(key::INSTRUMENT_PREFIX).into_iter().collect();
    core.aux.units = meta.prefixed(key::UNIT_PREFIX).into_iter().collect();
    core.aux.version = meta.text(key::VERSION).map(|v| parse_version(&v)).transpose()?;

    core.add_comment(meta.text(key::COMMENT).as_deref());
    if let Some(members) = meta.text(key::COLLECTION) {
        core.add_to_collection(members.split([',', ';']));
    }
    Ok(core)
}

// ── Batch ───────────────────────────────────────────────────────────────────

/// A workbook that did not yield a core.
#[derive(Debug)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub error: ImportError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub cores: Vec<Core>,
    pub failed: Vec<ImportFailure>,
}

impl BatchReport {
    pub fn core(&self, name: &str) -> Option<&Core> {
        self.cores.iter().find(|c| c.name() == name)
    }
}

/// Imports many workbooks, one core each. A failing workbook is recorded
/// and the run carries on.
pub struct BatchImporter<'c> {
    importer: Importer<'c>,
}

impl<'c> BatchImporter<'c> {
    pub fn new(importer: Importer<'c>) -> Self {
        Self { importer }
    }

    pub fn run<I, P>(&self, paths: I) -> BatchReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = BatchReport::default();
        for path in paths {
            let path = path.as_ref();
            match self.importer.import_file(path) {
                Ok(core) => {
                    if report.core(core.name()).is_some() {
                        warn!(core = core.name(), path = %path.display(), "core imported twice; keeping the first");
                        continue;
                    }
                    report.cores.push(core);
                }
                Err(err) => {
                    error!(path = %path.display(), error = %err, "workbook skipped");
                    report.failed.push(ImportFailure {
                        path: path.to_path_buf(),
                        error: err,
                    });
                }
            }
        }
        prune_collections(&mut report.cores);
        info!(
            imported = report.cores.len(),
            failed = report.failed.len(),
            "batch import finished"
        );
        report
    }
}

/// Drop collection members that are not among the imported cores.
pub fn prune_collections(cores: &mut [Core]) {
    let imported: BTreeSet<String> = cores.iter().map(|c| c.name().to_string()).collect();
    for core in cores.iter_mut() {
        let missing: Vec<String> = core
            .collection()
            .iter()
            .filter(|m| !imported.contains(*m))
            .cloned()
            .collect();
        for member in missing {
            debug!(core = core.name(), member = %member, "collection member was not imported");
            core.remove_from_collection(&member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(rows: &[(&str, Cell)]) -> SheetGrid {
        SheetGrid::new(
            "metadata-core",
            rows.iter()
                .map(|(k, v)| vec![Cell::from(*k), v.clone()])
                .collect(),
        )
    }

    fn t(s: &str) -> Cell {
        Cell::from(s)
    }

    fn workbook(version: &str) -> Workbook {
        let meta = metadata(&[
            ("name", t("X1")),
            ("date", t("2024-03-01")),
            ("version", t(version)),
            ("latitude", Cell::Number(71.3)),
            ("length", Cell::Number(0.2)),
            ("collection", t("X2, X3")),
            ("comment", t("rafted")),
            ("instrument temperature", t("Testo 720")),
        ]);
        let temperature = SheetGrid::new(
            "temperature",
            vec![
                vec![t("depth center"), t("value")],
                vec![Cell::Number(0.05), Cell::Number(-5.0)],
            ],
        );
        Workbook::from_sheets(vec![meta, temperature])
    }

    #[test]
    fn versions_are_padded() {
        assert_eq!(parse_version("1.4").unwrap(), Version::new(1, 4, 0));
        assert_eq!(parse_version("v2").unwrap(), Version::new(2, 0, 0));
        assert!(matches!(parse_version("one"), Err(ImportError::Version(_))));
    }

    #[test]
    fn metadata_fills_the_core() {
        let config = ImportConfig::default();
        let core = Importer::new(&config).import(workbook("1.4.0")).unwrap();
        assert_eq!(core.name(), "X1");
        assert_eq!(core.collection(), &["X1", "X2", "X3"]);
        assert_eq!(core.comment(), Some("rafted"));
        assert_eq!(core.info.lat, Some(71.3));
        assert_eq!(
            core.info.date,
            NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(core.aux.instruments.get("temperature").map(String::as_str), Some("Testo 720"));
        assert_eq!(core.profile().value("temperature", 0), Some(-5.0));
    }

    #[test]
    fn old_versions_are_rejected() {
        let config = ImportConfig::default();
        let err = Importer::new(&config).import(workbook("0.9.0")).unwrap_err();
        assert!(matches!(err, ImportError::VersionTooOld { .. }));
    }

    #[test]
    fn outdated_versions_go_through_the_migrator() {
        let config = ImportConfig::default();
        let err = Importer::new(&config).import(workbook("1.2.0")).unwrap_err();
        assert!(matches!(err, ImportError::Migration { .. }));

        struct Stamp;
        impl Migrator for Stamp {
            fn migrate(&self, mut wb: Workbook, _: &Version, to: &Version) -> Result<Workbook, ImportError> {
                let mut meta = wb.sheet("metadata-core").cloned().unwrap_or_default();
                meta.set(2, 1, to.to_string());
                wb.put_sheet(meta);
                Ok(wb)
            }
        }
        let core = Importer::new(&config)
            .with_migrator(Stamp)
            .import(workbook("1.2.0"))
            .unwrap();
        assert_eq!(core.aux.version, Some(Version::new(1, 4, 0)));
    }

    #[test]
    fn missing_name_fails_the_core() {
        let config = ImportConfig::default();
        let wb = Workbook::from_sheets(vec![metadata(&[("version", t("1.4.0"))])]);
        let err = Importer::new(&config).import(wb).unwrap_err();
        assert!(matches!(err, ImportError::MissingMetadata(k) if k == "name"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Workbook::open("/nonexistent/x1.xlsx").unwrap_err();
        assert!(matches!(err, ImportError::MissingFile(_)));
    }

    /// `workbook("1.4.0")` with one extra metadata row.
    fn with_metadata(key: &str, value: Cell) -> Workbook {
        let mut wb = workbook("1.4.0");
        let mut meta = wb.sheet("metadata-core").cloned().unwrap_or_default();
        meta.set(8, 0, key);
        meta.set(8, 1, value);
        wb.put_sheet(meta);
        wb
    }

    #[test]
    fn excel_serial_dates_convert() {
        let d = excel_serial(45352.5).unwrap();
        assert_eq!(d.to_string(), "2024-03-01 12:00:00");
        assert_eq!(excel_serial(-1e20), None);
        assert_eq!(excel_serial(1e20), None);
        assert_eq!(excel_serial(f64::NAN), None);
        assert_eq!(excel_serial(f64::INFINITY), None);
    }

    #[test]
    fn unreadable_date_text_leaves_the_date_empty() {
        let config = ImportConfig::default();
        let mut wb = workbook("1.4.0");
        let mut meta = wb.sheet("metadata-core").cloned().unwrap_or_default();
        meta.set(1, 1, "01/03/2024");
        wb.put_sheet(meta);

        let core = Importer::new(&config).import(wb).unwrap();
        assert_eq!(core.name(), "X1");
        assert_eq!(core.info.date, None);
        assert_eq!(core.profile().value("temperature", 0), Some(-5.0));
    }

    #[test]
    fn out_of_range_date_serial_leaves_the_date_empty() {
        let config = ImportConfig::default();
        let mut wb = workbook("1.4.0");
        let mut meta = wb.sheet("metadata-core").cloned().unwrap_or_default();
        meta.set(1, 1, Cell::Number(-1e20));
        wb.put_sheet(meta);

        let core = Importer::new(&config).import(wb).unwrap();
        assert_eq!(core.info.date, None);
        assert_eq!(core.info.lat, Some(71.3));
    }

    #[test]
    fn unknown_direction_keeps_the_default() {
        let config = ImportConfig::default();
        let core = Importer::new(&config)
            .import(with_metadata("v_ref dir", t("positive down")))
            .unwrap();
        assert_eq!(core.info.v_ref.dir, VerticalDirection::Down);
        assert_eq!(core.profile().len(), 1);

        let core = Importer::new(&config)
            .import(with_metadata("v_ref dir", t("up")))
            .unwrap();
        assert_eq!(core.info.v_ref.dir, VerticalDirection::Up);
    }
}
