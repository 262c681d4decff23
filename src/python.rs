//! Python bindings for driving loops written in Python

use crate::config::MatchupConfig;
use crate::core::{
    calibrate::{calibrate, CalibrationSpec},
    extract::MatchupExtractor,
    flags::{decode, FlagSet},
    locate::GridLocator,
    profile::ProductProfile,
    resample::resample,
    validate::{MatchupValidator, ValidationParams},
};
use crate::io::MatchupCollection;
use crate::types::{AttributeMap, Grid, MatchupRequest, OcError};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

fn to_py_err(err: OcError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Names of the flags set in `bitmask`
#[pyfunction]
fn decode_flags(bitmask: u64, names: Vec<String>) -> Vec<String> {
    decode(bitmask, &names).into_iter().map(str::to_string).collect()
}

/// DN to physical value conversion
#[pyfunction]
#[pyo3(signature = (raw, slope, offset, error_dn=None, min_valid_dn=None, max_valid_dn=None))]
fn calibrate_dn(
    py: Python,
    raw: PyReadonlyArray2<f64>,
    slope: f64,
    offset: f64,
    error_dn: Option<i64>,
    min_valid_dn: Option<i64>,
    max_valid_dn: Option<i64>,
) -> PyResult<PyObject> {
    let spec = CalibrationSpec {
        error_dn,
        ..CalibrationSpec::linear(slope, offset).with_valid_range(min_valid_dn, max_valid_dn)
    };
    let calibrated = calibrate(&raw.as_array(), &spec).map_err(to_py_err)?;
    Ok(calibrated.to_pyarray(py).into())
}

/// Bilinear upsampling of a tie-point grid
#[pyfunction]
#[pyo3(signature = (coarse, interval, is_longitude=false))]
fn resample_geometry(
    py: Python,
    coarse: PyReadonlyArray2<f64>,
    interval: usize,
    is_longitude: bool,
) -> PyResult<PyObject> {
    let fine = resample(&coarse.as_array(), interval, is_longitude).map_err(to_py_err)?;
    Ok(fine.to_pyarray(py).into())
}

/// Nearest pixel as (row, col, distance_squared)
#[pyfunction]
fn locate(
    latitude: PyReadonlyArray2<f64>,
    longitude: PyReadonlyArray2<f64>,
    target_lat: f64,
    target_lon: f64,
) -> PyResult<(usize, usize, f64)> {
    let lat = latitude.as_array().to_owned();
    let lon = longitude.as_array().to_owned();
    let location = GridLocator::locate(&lat, &lon, target_lat, target_lon).map_err(to_py_err)?;
    let (row, col) = location.first();
    Ok((row, col, location.distance_squared))
}

/// 3x3 neighborhood validation of a matchup
#[pyfunction]
#[pyo3(signature = (row, col, flags, reference, flag_names, invalid_names, min_valid_neighbors=5, cv_threshold=0.15))]
#[allow(clippy::too_many_arguments)]
fn validate_matchup(
    row: usize,
    col: usize,
    flags: PyReadonlyArray2<u32>,
    reference: PyReadonlyArray2<f64>,
    flag_names: Vec<String>,
    invalid_names: Vec<String>,
    min_valid_neighbors: usize,
    cv_threshold: f64,
) -> PyResult<bool> {
    let flag_set = FlagSet::new(flag_names, invalid_names).map_err(to_py_err)?;
    let validator = MatchupValidator::new(ValidationParams {
        min_valid_neighbors,
        cv_threshold,
    })
    .map_err(to_py_err)?;

    let flags = flags.as_array().to_owned();
    let reference = reference.as_array().to_owned();
    Ok(validator.validate(row, col, &flags, &reference, &flag_set))
}

fn build_grid(
    latitude: PyReadonlyArray2<f64>,
    longitude: PyReadonlyArray2<f64>,
    bands: HashMap<String, PyReadonlyArray2<f64>>,
    flags: HashMap<String, PyReadonlyArray2<u32>>,
    mut attributes: HashMap<String, AttributeMap>,
) -> Result<Grid, OcError> {
    let mut grid = Grid::new(latitude.as_array().to_owned(), longitude.as_array().to_owned())?;
    for (name, data) in bands {
        let attrs = attributes.remove(&name).unwrap_or_default();
        grid = grid.with_band(name, data.as_array().to_owned(), attrs)?;
    }
    for (name, data) in flags {
        grid = grid.with_flags(name, data.as_array().to_owned())?;
    }
    Ok(grid)
}

/// Python wrapper for MatchupExtractor
#[pyclass(name = "MatchupExtractor")]
struct PyMatchupExtractor {
    inner: MatchupExtractor,
}

#[pymethods]
impl PyMatchupExtractor {
    /// `profile` is a preset name or a JSON profile; `config` is JSON
    #[new]
    #[pyo3(signature = (profile, config=None))]
    fn new(profile: &str, config: Option<&str>) -> PyResult<Self> {
        let profile = match profile {
            "sgli_l2" => ProductProfile::sgli_l2(),
            "sgli_l2_product" => ProductProfile::sgli_l2_product(),
            "seadas_l2" => ProductProfile::seadas_l2(),
            "ocsmart" => ProductProfile::ocsmart(),
            json => ProductProfile::from_json_str(json).map_err(to_py_err)?,
        };
        let config = match config {
            Some(json) => MatchupConfig::from_json_str(json).map_err(to_py_err)?,
            None => MatchupConfig::default(),
        };
        let inner = MatchupExtractor::new(profile, &config).map_err(to_py_err)?;
        Ok(PyMatchupExtractor { inner })
    }

    fn band_names(&self) -> Vec<String> {
        self.inner.profile().bands.iter().map(|b| b.name.clone()).collect()
    }

    /// Match `(id, lat, lon)` requests against one grid, returning JSON lines
    #[pyo3(signature = (latitude, longitude, bands, flags, requests, attributes=None))]
    fn extract(
        &self,
        latitude: PyReadonlyArray2<f64>,
        longitude: PyReadonlyArray2<f64>,
        bands: HashMap<String, PyReadonlyArray2<f64>>,
        flags: HashMap<String, PyReadonlyArray2<u32>>,
        requests: Vec<(String, f64, f64)>,
        attributes: Option<HashMap<String, AttributeMap>>,
    ) -> PyResult<String> {
        let requests: Vec<MatchupRequest> = requests
            .into_iter()
            .map(|(id, lat, lon)| MatchupRequest::new(id, lat, lon))
            .collect();
        let grid = build_grid(latitude, longitude, bands, flags, attributes.unwrap_or_default());

        let results = match grid {
            Ok(grid) => {
                let prepared = self.inner.prepare(&grid);
                self.inner.process_batch(&prepared, &requests, None)
            }
            Err(e) => self.inner.fail_all(&requests, &e),
        };

        let mut collection = MatchupCollection::new();
        collection.extend(results);
        let mut out = Vec::new();
        collection
            .flush_to(&mut out)
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("{}", e)))?;
        String::from_utf8(out).map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("{}", e)))
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyMatchupExtractor>()?;
    m.add_function(wrap_pyfunction!(decode_flags, m)?)?;
    m.add_function(wrap_pyfunction!(calibrate_dn, m)?)?;
    m.add_function(wrap_pyfunction!(resample_geometry, m)?)?;
    m.add_function(wrap_pyfunction!(locate, m)?)?;
    m.add_function(wrap_pyfunction!(validate_matchup, m)?)?;
    Ok(())
}
