use crate::types::{AttributeMap, OcError, OcResult};
use ndarray::{Array, ArrayBase, Data, Dimension};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

/// Linear DN-to-physical calibration for one band
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSpec {
    pub slope: Option<f64>,
    pub offset: Option<f64>,
    /// DN marking a sample the producer could not retrieve
    #[serde(default)]
    pub error_dn: Option<i64>,
    #[serde(default)]
    pub min_valid_dn: Option<i64>,
    #[serde(default)]
    pub max_valid_dn: Option<i64>,
}

impl CalibrationSpec {
    pub fn linear(slope: f64, offset: f64) -> Self {
        Self {
            slope: Some(slope),
            offset: Some(offset),
            ..Default::default()
        }
    }

    pub fn with_error_dn(mut self, error_dn: i64) -> Self {
        self.error_dn = Some(error_dn);
        self
    }

    pub fn with_valid_range(mut self, min_valid_dn: Option<i64>, max_valid_dn: Option<i64>) -> Self {
        self.min_valid_dn = min_valid_dn;
        self.max_valid_dn = max_valid_dn;
        self
    }

    /// Read calibration attributes attached to a dataset.
    ///
    /// Missing slope/offset attributes are left unset so the failure
    /// surfaces when the band is calibrated, not when the grid is loaded.
    pub fn from_attributes(attributes: &AttributeMap, keys: &AttributeKeys) -> Self {
        let first = |key: &str| attributes.get(key).and_then(|values| values.first().copied());
        let first_dn = |key: &str| first(key).map(|v| v.round() as i64);

        Self {
            slope: first(&keys.slope),
            offset: first(&keys.offset),
            error_dn: first_dn(&keys.error_dn),
            min_valid_dn: first_dn(&keys.min_valid_dn),
            max_valid_dn: first_dn(&keys.max_valid_dn),
        }
    }

    /// Slope and offset, or the name of the first missing one
    fn coefficients(&self) -> OcResult<(f64, f64)> {
        let slope = self
            .slope
            .ok_or_else(|| OcError::MissingCalibrationAttribute("slope".to_string()))?;
        let offset = self
            .offset
            .ok_or_else(|| OcError::MissingCalibrationAttribute("offset".to_string()))?;
        Ok((slope, offset))
    }

    /// Replace error and out-of-range DNs with NaN
    #[inline]
    fn mask(&self, dn: f64) -> f64 {
        if let Some(error_dn) = self.error_dn {
            if dn == error_dn as f64 {
                return f64::NAN;
            }
        }
        // NaN compares false, so masked samples stay masked
        if let Some(max) = self.max_valid_dn {
            if dn > max as f64 {
                return f64::NAN;
            }
        }
        if let Some(min) = self.min_valid_dn {
            if dn < min as f64 {
                return f64::NAN;
            }
        }
        dn
    }
}

/// Attribute names carrying the calibration of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeKeys {
    pub slope: String,
    pub offset: String,
    pub error_dn: String,
    pub min_valid_dn: String,
    pub max_valid_dn: String,
}

impl Default for AttributeKeys {
    fn default() -> Self {
        Self {
            slope: "Slope".to_string(),
            offset: "Offset".to_string(),
            error_dn: "Error_DN".to_string(),
            min_valid_dn: "Minimum_valid_DN".to_string(),
            max_valid_dn: "Maximum_valid_DN".to_string(),
        }
    }
}

impl AttributeKeys {
    /// Keys of SGLI normalized water-leaving radiance datasets, which store
    /// the remote-sensing-reflectance conversion separately
    pub fn reflectance() -> Self {
        Self {
            slope: "Rrs_slope".to_string(),
            offset: "Rrs_offset".to_string(),
            ..Default::default()
        }
    }
}

/// How a band's stored values become output values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandCalibration {
    /// Integral/categorical field (flags, time): values returned as stored
    Raw,
    /// Calibration supplied by configuration
    Explicit(CalibrationSpec),
    /// Calibration read from the dataset attributes
    Attributes(AttributeKeys),
}

impl Default for BandCalibration {
    fn default() -> Self {
        BandCalibration::Attributes(AttributeKeys::default())
    }
}

impl BandCalibration {
    /// Calibration spec for a dataset, `None` for raw pass-through
    pub fn resolve(&self, attributes: &AttributeMap) -> Option<CalibrationSpec> {
        match self {
            BandCalibration::Raw => None,
            BandCalibration::Explicit(spec) => Some(*spec),
            BandCalibration::Attributes(keys) => Some(CalibrationSpec::from_attributes(attributes, keys)),
        }
    }
}

/// Radiometric calibration processor
pub struct RadiometricCalibrator {
    spec: CalibrationSpec,
}

impl RadiometricCalibrator {
    pub fn new(spec: CalibrationSpec) -> Self {
        Self { spec }
    }

    /// Convert raw digital numbers to physical values.
    ///
    /// Error and out-of-range DNs become NaN before `value = dn * slope + offset`.
    pub fn calibrate<S, D, T>(&self, raw: &ArrayBase<S, D>) -> OcResult<Array<f64, D>>
    where
        S: Data<Elem = T>,
        D: Dimension,
        T: AsPrimitive<f64>,
    {
        let (slope, offset) = self.spec.coefficients()?;
        log::debug!(
            "Calibrating {:?} samples: slope = {}, offset = {}",
            raw.shape(),
            slope,
            offset
        );

        let spec = self.spec;
        Ok(raw.mapv(|dn| spec.mask(dn.as_()) * slope + offset))
    }
}

/// Calibrate `raw` with `spec`
pub fn calibrate<S, D, T>(raw: &ArrayBase<S, D>, spec: &CalibrationSpec) -> OcResult<Array<f64, D>>
where
    S: Data<Elem = T>,
    D: Dimension,
    T: AsPrimitive<f64>,
{
    RadiometricCalibrator::new(*spec).calibrate(raw)
}

/// Apply a band calibration, passing raw values through unchanged when the
/// band is configured as [`BandCalibration::Raw`]
pub fn calibrate_band<S, D, T>(
    raw: &ArrayBase<S, D>,
    calibration: &BandCalibration,
    attributes: &AttributeMap,
) -> OcResult<Array<f64, D>>
where
    S: Data<Elem = T>,
    D: Dimension,
    T: AsPrimitive<f64>,
{
    match calibration.resolve(attributes) {
        Some(spec) => calibrate(raw, &spec),
        None => Ok(raw.mapv(|v| v.as_())),
    }
}
