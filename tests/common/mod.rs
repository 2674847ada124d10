#![allow(dead_code)]

use icecore::{Cell, SheetGrid};
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. `RUST_LOG` filters it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn t(s: &str) -> Cell {
    Cell::from(s)
}

pub fn n(v: f64) -> Cell {
    Cell::Number(v)
}

pub fn metadata(name: &str, version: &str) -> SheetGrid {
    SheetGrid::new(
        "metadata-core",
        vec![
            vec![t("name"), t(name)],
            vec![t("date"), t("2024-03-01 10:30")],
            vec![t("version"), t(version)],
            vec![t("latitude"), n(71.37)],
            vec![t("longitude"), n(-156.5)],
            vec![t("length"), n(0.2)],
            vec![t("ice thickness"), n(0.21)],
            vec![t("snow depth"), n(0.05), n(0.07), n(0.06)],
        ],
    )
}

/// Temperature by section: -5.0 and -4.0.
pub fn temperature_sheet() -> SheetGrid {
    SheetGrid::new(
        "temperature",
        vec![
            vec![t("depth 1"), t("depth 2"), t("value")],
            vec![n(0.0), n(0.1), n(-5.0)],
            vec![n(0.1), n(0.2), n(-4.0)],
        ],
    )
}

/// Salinity in the upper section only.
pub fn salinity_sheet() -> SheetGrid {
    SheetGrid::new(
        "salinity",
        vec![
            vec![t("depth 1"), t("depth 2"), t("salinity"), Cell::Empty, t("comment")],
            vec![Cell::Empty, Cell::Empty, t("ID"), t("value"), Cell::Empty],
            vec![n(0.0), n(0.1), t("X1-S-1"), n(6.0), t("brine channels")],
            vec![n(0.1), n(0.2), Cell::Empty, Cell::Empty, Cell::Empty],
        ],
    )
}
