//! Sea-ice core profiles: depth reconstruction, per-sheet profile building,
//! depth-aligned merging of property profiles and workbook import.

pub mod builder;
pub mod config;
pub mod core;
pub mod depth;
pub mod error;
pub mod frame;
pub mod grid;
pub mod merge;
pub mod profile;
pub mod schema;
pub mod workbook;

#[cfg(feature = "python")]
mod python;

pub use builder::{ProfileBuilder, SheetContext, SheetLayout};
pub use config::ImportConfig;
pub use crate::core::{AuxMetadata, Core, CoreInfo};
pub use depth::{DepthColumns, DepthInterval, DepthModel, DepthResolver};
pub use error::{DepthError, IceError, ImportError, MergeError};
pub use grid::{Cell, Grid, SheetGrid};
pub use merge::merge;
pub use profile::{Profile, PropertyColumnSet, VerticalDirection, VerticalReference};
pub use workbook::{BatchImporter, BatchReport, Importer, Migrator, RefuseMigration, Workbook};
