use chrono::NaiveDateTime;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::ImportConfig;
use crate::core::{Core, CoreInfo};
use crate::error::IceError;
use crate::schema;
use crate::workbook::{BatchImporter, Importer};

fn load_config(config: Option<&str>) -> Result<ImportConfig, IceError> {
    match config {
        Some(source) => ImportConfig::from_toml_str(source),
        None => Ok(ImportConfig::default()),
    }
}

#[pyclass(name = "Core")]
pub struct PyCore {
    inner: Core,
}

#[pymethods]
impl PyCore {
    #[new]
    fn new(name: String) -> Self {
        Self {
            inner: Core::new(name, CoreInfo::default()),
        }
    }

    /// Import one workbook. `config` is an optional TOML document.
    #[staticmethod]
    #[pyo3(signature = (path, config=None))]
    fn import_workbook(path: &str, config: Option<&str>) -> PyResult<Self> {
        let config = load_config(config)?;
        let inner = Importer::new(&config)
            .import_file(path)
            .map_err(IceError::from)?;
        Ok(Self { inner })
    }

    #[getter]
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[getter]
    fn date(&self) -> Option<NaiveDateTime> {
        self.inner.info.date
    }

    #[getter]
    fn collection(&self) -> Vec<String> {
        self.inner.collection().to_vec()
    }

    #[getter]
    fn comment(&self) -> Option<String> {
        self.inner.comment().map(str::to_string)
    }

    /// The merged profile as a polars DataFrame.
    #[getter]
    fn profile(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.inner.profile_frame()?))
    }

    #[pyo3(signature = (text=None))]
    fn add_comment(&mut self, text: Option<&str>) {
        self.inner.add_comment(text);
    }

    /// Accepts one name or a list of names.
    fn add_to_collection(&mut self, names: &Bound<'_, PyAny>) -> PyResult<()> {
        match names.extract::<String>() {
            Ok(name) => self.inner.add_to_collection([name]),
            Err(_) => self.inner.add_to_collection(names.extract::<Vec<String>>()?),
        }
        Ok(())
    }

    fn remove_from_collection(&mut self, name: &str) -> bool {
        self.inner.remove_from_collection(name)
    }

    /// Fold another core's profile into this one. Returns false when the
    /// names differ.
    fn add_profile_of(&mut self, other: PyRef<'_, PyCore>) -> bool {
        self.inner.add_profile(other.inner.profile().clone())
    }

    fn delete_property(&mut self, property: &str) -> bool {
        self.inner.delete_property(property)
    }

    fn write_profile_csv(&self, path: &str) -> PyResult<()> {
        Ok(self.inner.write_profile_csv(path)?)
    }

    fn __repr__(&self) -> String {
        format!(
            "Core(name='{}', rows={}, collection={:?})",
            self.inner.name(),
            self.inner.profile().len(),
            self.inner.collection()
        )
    }
}

/// Import many workbooks. Returns the cores and `(path, error)` pairs for
/// the workbooks that failed.
#[pyfunction]
#[pyo3(signature = (paths, config=None))]
fn import_batch(paths: Vec<String>, config: Option<&str>) -> PyResult<(Vec<PyCore>, Vec<(String, String)>)> {
    let config = load_config(config)?;
    let report = BatchImporter::new(Importer::new(&config)).run(&paths);
    let failed = report
        .failed
        .iter()
        .map(|f| (f.path.display().to_string(), f.error.to_string()))
        .collect();
    let cores = report.cores.into_iter().map(|inner| PyCore { inner }).collect();
    Ok((cores, failed))
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Depth
    let depth = PyModule::new(m.py(), "depth")?;
    depth.add("Y_LOW", schema::depth::Y_LOW)?;
    depth.add("Y_MID", schema::depth::Y_MID)?;
    depth.add("Y_SUP", schema::depth::Y_SUP)?;
    m.add_submodule(&depth)?;

    // Text
    let text = PyModule::new(m.py(), "text")?;
    text.add("COMMENT", schema::text::COMMENT)?;
    text.add("PROPERTY", schema::text::PROPERTY)?;
    text.add("NAME", schema::text::NAME)?;
    text.add("V_REF_LOC", schema::text::V_REF_LOC)?;
    text.add("V_REF_DIR", schema::text::V_REF_DIR)?;
    text.add("V_REF_H", schema::text::V_REF_H)?;
    m.add_submodule(&text)?;

    // Subcolumn
    let subcolumn = PyModule::new(m.py(), "subcolumn")?;
    subcolumn.add("ID", schema::subcolumn::ID)?;
    subcolumn.add("VALUE", schema::subcolumn::VALUE)?;
    subcolumn.add("QUALITY", schema::subcolumn::QUALITY)?;
    m.add_submodule(&subcolumn)?;

    // Separator
    let separator = PyModule::new(m.py(), "separator")?;
    separator.add("PROPERTY", schema::separator::PROPERTY)?;
    separator.add("COMMENT", schema::separator::COMMENT)?;
    m.add_submodule(&separator)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCore>()?;
    m.add_function(wrap_pyfunction!(import_batch, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
