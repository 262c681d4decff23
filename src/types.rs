use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Geolocation sample (degrees)
pub type GeoReal = f64;

/// 2D latitude or longitude grid (lines x pixels)
pub type GeoImage = Array2<GeoReal>;

/// 2D band data, raw digital numbers or calibrated values (NaN = invalid)
pub type BandImage = Array2<f64>;

/// 2D quality flag bitmask grid
pub type FlagImage = Array2<u32>;

/// Dataset attribute metadata as handed over by the file reader.
///
/// HDF5/NetCDF attributes are arrays; calibration uses the first element.
pub type AttributeMap = HashMap<String, Vec<f64>>;

/// A named band held by a [`Grid`] together with its attribute metadata
#[derive(Debug, Clone)]
pub struct Band {
    pub data: BandImage,
    pub attributes: AttributeMap,
}

/// In-memory satellite product grid for one source file.
///
/// Every array in a grid has the same (lines, pixels) shape. The grid is
/// read-only once built; derived arrays live in [`crate::core::PreparedGrid`].
#[derive(Debug, Clone)]
pub struct Grid {
    latitude: GeoImage,
    longitude: GeoImage,
    bands: HashMap<String, Band>,
    flags: HashMap<String, FlagImage>,
}

impl Grid {
    /// Create a grid from its geolocation arrays
    pub fn new(latitude: GeoImage, longitude: GeoImage) -> OcResult<Self> {
        let dim = latitude.dim();
        if dim.0 == 0 || dim.1 == 0 {
            return Err(OcError::EmptyGrid);
        }
        if longitude.dim() != dim {
            return Err(OcError::GridShapeMismatch {
                name: "longitude".to_string(),
                expected: dim,
                actual: longitude.dim(),
            });
        }

        log::debug!("Created grid of {} x {}", dim.0, dim.1);
        Ok(Self {
            latitude,
            longitude,
            bands: HashMap::new(),
            flags: HashMap::new(),
        })
    }

    /// Attach a band with its attribute metadata
    pub fn with_band(
        mut self,
        name: impl Into<String>,
        data: BandImage,
        attributes: AttributeMap,
    ) -> OcResult<Self> {
        let name = name.into();
        self.check_shape(&name, data.dim())?;
        self.bands.insert(name, Band { data, attributes });
        Ok(self)
    }

    /// Attach a quality flag array
    pub fn with_flags(mut self, name: impl Into<String>, flags: FlagImage) -> OcResult<Self> {
        let name = name.into();
        self.check_shape(&name, flags.dim())?;
        self.flags.insert(name, flags);
        Ok(self)
    }

    fn check_shape(&self, name: &str, actual: (usize, usize)) -> OcResult<()> {
        let expected = self.dim();
        if actual != expected {
            return Err(OcError::GridShapeMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Grid shape as (lines, pixels)
    pub fn dim(&self) -> (usize, usize) {
        self.latitude.dim()
    }

    pub fn latitude(&self) -> &GeoImage {
        &self.latitude
    }

    pub fn longitude(&self) -> &GeoImage {
        &self.longitude
    }

    pub fn band(&self, name: &str) -> OcResult<&Band> {
        self.bands
            .get(name)
            .ok_or_else(|| OcError::MissingDataset(name.to_string()))
    }

    pub fn flags(&self, name: &str) -> OcResult<&FlagImage> {
        self.flags
            .get(name)
            .ok_or_else(|| OcError::MissingDataset(name.to_string()))
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn flag_names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }
}

/// A ground-truth observation to be matched against a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupRequest {
    /// Caller identifier, passed through unchanged
    pub id: String,
    pub latitude: GeoReal,
    pub longitude: GeoReal,
}

impl MatchupRequest {
    pub fn new(id: impl Into<String>, latitude: GeoReal, longitude: GeoReal) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }
}

/// Error types for matchup processing
#[derive(Debug, thiserror::Error)]
pub enum OcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Grid shape mismatch: '{name}' is {actual:?}, expected {expected:?}")]
    GridShapeMismatch {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Grid contains no pixels")]
    EmptyGrid,

    #[error("Grid contains no finite geolocation")]
    NoFiniteGeolocation,

    #[error("3x3 neighborhood at ({row}, {col}) exceeds grid of size ({rows}, {cols})")]
    OutOfBoundsNeighborhood {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Degenerate statistic: {0}")]
    DegenerateStatistic(String),

    #[error("Missing calibration attribute: {0}")]
    MissingCalibrationAttribute(String),

    #[error("Dataset not found: {0}")]
    MissingDataset(String),

    #[error("Band '{name}' unavailable: {source}")]
    DerivedBand {
        name: String,
        source: std::sync::Arc<OcError>,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for matchup operations
pub type OcResult<T> = Result<T, OcError>;
