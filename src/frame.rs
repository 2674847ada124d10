//! Polars export of a profile, for downstream statistics and plotting.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use crate::error::IceError;
use crate::profile::{non_nan, Profile};
use crate::schema::{depth, property_column, subcolumn, text};

fn nullable(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(non_nan).collect()
}

impl Profile {
    /// The profile as a plain table.
    ///
    /// Columns: `y_low`, `y_mid`, `y_sup`, then per property
    /// `<property>_ID` / `_value` / `_quality` (whichever exist), parameter
    /// columns, `comment`, `property`, `name`, `v_ref_loc`, `v_ref_dir`,
    /// `v_ref_h`. Missing numbers are nulls.
    pub fn to_dataframe(&self) -> Result<DataFrame, IceError> {
        let n = self.len();
        let mut columns: Vec<Column> = vec![
            Column::new(depth::Y_LOW.into(), nullable(self.y_low())),
            Column::new(depth::Y_MID.into(), nullable(self.y_mid())),
            Column::new(depth::Y_SUP.into(), nullable(self.y_sup())),
        ];

        for name in self.property_names() {
            let Some(set) = self.property(name) else {
                continue;
            };
            if let Some(ids) = &set.id {
                columns.push(Column::new(property_column(name, subcolumn::ID).into(), ids));
            }
            if let Some(values) = &set.value {
                columns.push(Column::new(
                    property_column(name, subcolumn::VALUE).into(),
                    nullable(values),
                ));
            }
            if let Some(quality) = &set.quality {
                columns.push(Column::new(
                    property_column(name, subcolumn::QUALITY).into(),
                    nullable(quality),
                ));
            }
        }

        for name in self.parameter_names() {
            if let Some(values) = self.parameter(name) {
                columns.push(Column::new(name.into(), nullable(values)));
            }
        }

        let v_ref = self.v_ref();
        columns.extend([
            Column::new(text::COMMENT.into(), self.comments()),
            Column::new(text::PROPERTY.into(), self.property_labels()),
            Column::new(
                text::NAME.into(),
                vec![self.name().map(str::to_string); n],
            ),
            Column::new(text::V_REF_LOC.into(), vec![v_ref.loc.clone(); n]),
            Column::new(text::V_REF_DIR.into(), vec![v_ref.dir.as_str(); n]),
            Column::new(text::V_REF_H.into(), vec![v_ref.h; n]),
        ]);

        Ok(DataFrame::new(columns)?)
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), IceError> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        debug!(path = %path.as_ref().display(), rows = df.height(), "profile written as csv");
        Ok(())
    }

    /// Write the table as Parquet.
    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<(), IceError> {
        let mut df = self.to_dataframe()?;
        let file = File::create(path.as_ref())?;
        ParquetWriter::new(file).finish(&mut df)?;
        debug!(path = %path.as_ref().display(), rows = df.height(), "profile written as parquet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::depth::DepthModel;
    use crate::profile::{PropertyColumnSet, VerticalReference};

    fn salinity_profile() -> Profile {
        let mut properties = BTreeMap::new();
        properties.insert(
            "salinity".to_string(),
            PropertyColumnSet {
                id: Some(vec![Some("S1".into()), None]),
                value: Some(vec![6.0, f64::NAN]),
                quality: None,
            },
        );
        Profile::from_parts(
            Some("X1".into()),
            VerticalReference::default(),
            DepthModel {
                y_low: vec![0.0, 0.1],
                y_mid: vec![0.05, 0.15],
                y_sup: vec![0.1, 0.2],
            },
            vec![None, Some("melt pond".into())],
            properties,
            BTreeMap::new(),
        )
    }

    #[test]
    fn dataframe_has_expected_columns() {
        let df = salinity_profile().to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names_str(),
            vec![
                "y_low",
                "y_mid",
                "y_sup",
                "salinity_ID",
                "salinity_value",
                "comment",
                "property",
                "name",
                "v_ref_loc",
                "v_ref_dir",
                "v_ref_h",
            ]
        );
        let values = df.column("salinity_value").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(6.0));
        assert_eq!(values.get(1), None);
        let labels = df.column("property").unwrap().str().unwrap();
        assert_eq!(labels.get(0), Some("salinity"));
        assert_eq!(labels.get(1), Some(""));
    }

    #[test]
    fn csv_is_written_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x1.csv");
        salinity_profile().write_csv(&path).unwrap();

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path))
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(df.height(), 2);
        let comments = df.column("comment").unwrap().str().unwrap();
        assert_eq!(comments.get(1), Some("melt pond"));
        let names = df.column("name").unwrap().str().unwrap();
        assert_eq!(names.get(0), Some("X1"));
    }

    #[test]
    fn parquet_keeps_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x1.parquet");
        salinity_profile().write_parquet(&path).unwrap();

        let df = ParquetReader::new(File::open(&path).unwrap()).finish().unwrap();
        assert_eq!(df.height(), 2);
        let values = df.column("salinity_value").unwrap().f64().unwrap();
        assert_eq!(values.get(0), Some(6.0));
        assert_eq!(values.get(1), None);
    }
}
