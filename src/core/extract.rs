use crate::config::MatchupConfig;
use crate::core::calibrate::calibrate_band;
use crate::core::flags::FlagSet;
use crate::core::locate::GridLocator;
use crate::core::obs_time::hours_to_time;
use crate::core::profile::{BandSpec, ProductProfile};
use crate::core::validate::{MatchupValidator, Rejection};
use crate::types::{BandImage, GeoReal, Grid, MatchupRequest, OcError, OcResult};
use chrono::NaiveTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

/// Value recorded for a band that could not be extracted
pub const MISSING: f64 = f64::NAN;

/// Outcome of matching one request against a grid
#[derive(Debug, Clone, Serialize)]
pub struct MatchupResult {
    pub id: String,
    pub in_situ_lat: GeoReal,
    pub in_situ_lon: GeoReal,
    /// Matched pixel, `None` when nothing could be located
    pub row: Option<usize>,
    pub col: Option<usize>,
    pub pixel_lat: GeoReal,
    pub pixel_lon: GeoReal,
    pub distance_squared: GeoReal,
    /// Pixels sharing the minimum distance
    pub tied_pixels: usize,
    pub is_valid: bool,
    pub rejection: Option<Rejection>,
    pub band_values: BTreeMap<String, f64>,
    /// All flags set on the matched pixel
    pub flags_decoded: Vec<String>,
    /// Reason for every band recorded as [`MISSING`]
    pub band_failures: BTreeMap<String, String>,
    pub observation_time: Option<NaiveTime>,
}

impl MatchupResult {
    /// Record for a request that never reached a pixel
    fn unmatched(request: &MatchupRequest, bands: &[BandSpec], reason: &OcError) -> Self {
        let detail = reason.to_string();
        Self {
            id: request.id.clone(),
            in_situ_lat: request.latitude,
            in_situ_lon: request.longitude,
            row: None,
            col: None,
            pixel_lat: MISSING,
            pixel_lon: MISSING,
            distance_squared: MISSING,
            tied_pixels: 0,
            is_valid: false,
            rejection: Some(Rejection::Unavailable {
                detail: detail.clone(),
            }),
            band_values: bands.iter().map(|b| (b.name.clone(), MISSING)).collect(),
            flags_decoded: Vec::new(),
            band_failures: bands.iter().map(|b| (b.name.clone(), detail.clone())).collect(),
            observation_time: None,
        }
    }

    /// No band value is missing
    pub fn is_complete(&self) -> bool {
        self.band_values.values().all(|v| v.is_finite())
    }

    /// No value is missing among `columns`; absent columns count as missing
    pub fn is_complete_on<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        columns
            .iter()
            .all(|c| self.band_values.get(c.as_ref()).map_or(false, |v| v.is_finite()))
    }

    /// Add the band values of a record extracted from a companion file of
    /// the same scene. Validity, location and flags stay those of `self`;
    /// columns already present are kept.
    pub fn merge_bands(&mut self, other: &MatchupResult) {
        for (name, &value) in &other.band_values {
            if self.band_values.contains_key(name) {
                log::debug!("Record {}: keeping existing column '{}'", self.id, name);
                continue;
            }
            self.band_values.insert(name.clone(), value);
            if let Some(reason) = other.band_failures.get(name) {
                self.band_failures.insert(name.clone(), reason.clone());
            }
        }
    }
}

/// Outcome of deriving one band, shared by every request of a batch
type Derived = Result<Arc<BandImage>, Arc<OcError>>;

/// A grid with its derived arrays, computed once per batch and shared
/// across requests. Failures are kept as well, so a band that cannot be
/// derived is attempted only once.
pub struct PreparedGrid<'g> {
    grid: &'g Grid,
    bands: Vec<BandSpec>,
    derived: RwLock<HashMap<String, Arc<OnceLock<Derived>>>>,
}

impl<'g> PreparedGrid<'g> {
    fn new(grid: &'g Grid, bands: Vec<BandSpec>) -> Self {
        Self {
            grid,
            bands,
            derived: RwLock::new(HashMap::new()),
        }
    }

    pub fn grid(&self) -> &Grid {
        self.grid
    }

    /// Calibrated (or passed-through) array of a configured band
    pub fn band(&self, name: &str) -> OcResult<Arc<BandImage>> {
        let spec = self
            .bands
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| OcError::MissingDataset(name.to_string()))?;

        // Bands compute concurrently; only workers asking for the same band wait
        let cell = self.cell(name);
        let derived = cell.get_or_init(|| self.compute(spec).map(Arc::new).map_err(Arc::new));
        match derived {
            Ok(data) => Ok(Arc::clone(data)),
            Err(e) => Err(OcError::DerivedBand {
                name: name.to_string(),
                source: Arc::clone(e),
            }),
        }
    }

    fn cell(&self, name: &str) -> Arc<OnceLock<Derived>> {
        {
            let cache = self.derived.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cell) = cache.get(name) {
                return Arc::clone(cell);
            }
        }

        let mut cache = self.derived.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(cache.entry(name.to_string()).or_default())
    }

    fn compute(&self, spec: &BandSpec) -> OcResult<BandImage> {
        log::debug!("Deriving band '{}' from dataset '{}'", spec.name, spec.dataset);
        match self.grid.band(&spec.dataset) {
            Ok(band) => calibrate_band(&band.data, &spec.calibration, &band.attributes),
            Err(missing) => {
                // Flag fields are read from the flag arrays
                let flags = self.grid.flags(&spec.dataset).map_err(|_| missing)?;
                calibrate_band(flags, &spec.calibration, &HashMap::new())
            }
        }
    }
}

/// Locate, validate and extract matchups for one product family
pub struct MatchupExtractor {
    profile: ProductProfile,
    flag_set: FlagSet,
    validator: MatchupValidator,
}

impl MatchupExtractor {
    pub fn new(profile: ProductProfile, config: &MatchupConfig) -> OcResult<Self> {
        config.validate()?;
        profile.validate()?;

        let flag_set = match &config.invalid_flag_names {
            Some(names) => profile.flag_set.clone().with_invalid(names.iter().cloned())?,
            None => profile.flag_set.clone(),
        };
        let validator = MatchupValidator::new(config.validation_params())?;

        log::info!(
            "Matchup extractor for '{}': {} bands, invalid flags {:?}",
            profile.name,
            profile.bands.len(),
            flag_set.invalid()
        );

        Ok(Self {
            profile,
            flag_set,
            validator,
        })
    }

    pub fn profile(&self) -> &ProductProfile {
        &self.profile
    }

    pub fn flag_set(&self) -> &FlagSet {
        &self.flag_set
    }

    /// Start a request batch against `grid`
    pub fn prepare<'g>(&self, grid: &'g Grid) -> PreparedGrid<'g> {
        let mut bands = self.profile.bands.clone();
        bands.extend(self.profile.observation_time.iter().cloned());
        PreparedGrid::new(grid, bands)
    }

    /// Match one request. Failures are recorded on the result, never raised.
    pub fn process(&self, prepared: &PreparedGrid, request: &MatchupRequest) -> MatchupResult {
        let grid = prepared.grid();
        let location = match GridLocator::locate(
            grid.latitude(),
            grid.longitude(),
            request.latitude,
            request.longitude,
        ) {
            Ok(location) => location,
            Err(e) => {
                log::warn!("Request {}: no pixel located: {}", request.id, e);
                return MatchupResult::unmatched(request, &self.profile.bands, &e);
            }
        };

        let (row, col) = location.first();
        if location.is_tied() {
            log::debug!(
                "Request {}: {} pixels tied, using ({}, {})",
                request.id,
                location.matches.len(),
                row,
                col
            );
        }

        let flags = grid.flags(&self.profile.validation_flags);
        let verdict = match &flags {
            Ok(flags) => match prepared.band(&self.profile.reference_band) {
                Ok(reference) => self
                    .validator
                    .assess(row, col, flags, &reference, &self.flag_set),
                Err(e) => Err(Rejection::from(e)),
            },
            Err(e) => Err(Rejection::Unavailable {
                detail: e.to_string(),
            }),
        };
        if let Err(rejection) = &verdict {
            log::debug!("Request {}: invalid matchup: {}", request.id, rejection);
        }

        let flags_decoded = match &flags {
            Ok(flags) => self
                .flag_set
                .decode(flags[[row, col]] as u64)
                .into_iter()
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut band_values = BTreeMap::new();
        let mut band_failures = BTreeMap::new();
        for spec in &self.profile.bands {
            match prepared.band(&spec.name) {
                Ok(data) => {
                    band_values.insert(spec.name.clone(), data[[row, col]]);
                }
                Err(e) => {
                    log::warn!("Request {}: band '{}' missing: {}", request.id, spec.name, e);
                    band_values.insert(spec.name.clone(), MISSING);
                    band_failures.insert(spec.name.clone(), e.to_string());
                }
            }
        }

        let observation_time = self.profile.observation_time.as_ref().and_then(|spec| {
            match prepared.band(&spec.name) {
                Ok(hours) => hours_to_time(hours[[row, col]]),
                Err(e) => {
                    log::warn!("Request {}: no observation time: {}", request.id, e);
                    None
                }
            }
        });

        MatchupResult {
            id: request.id.clone(),
            in_situ_lat: request.latitude,
            in_situ_lon: request.longitude,
            row: Some(row),
            col: Some(col),
            pixel_lat: grid.latitude()[[row, col]],
            pixel_lon: grid.longitude()[[row, col]],
            distance_squared: location.distance_squared,
            tied_pixels: location.matches.len(),
            is_valid: verdict.is_ok(),
            rejection: verdict.err(),
            band_values,
            flags_decoded,
            band_failures,
            observation_time,
        }
    }

    /// Match every request against one grid.
    ///
    /// Requests are independent and run in parallel. Once `cancel` is
    /// raised, requests that have not started are skipped.
    pub fn process_batch(
        &self,
        prepared: &PreparedGrid,
        requests: &[MatchupRequest],
        cancel: Option<&AtomicBool>,
    ) -> Vec<MatchupResult> {
        log::info!(
            "Processing {} requests against {} x {} grid",
            requests.len(),
            prepared.grid().dim().0,
            prepared.grid().dim().1
        );

        let run = |request: &MatchupRequest| {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                return None;
            }
            Some(self.process(prepared, request))
        };

        #[cfg(feature = "parallel")]
        let results: Vec<MatchupResult> = {
            use rayon::prelude::*;
            requests.par_iter().filter_map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<MatchupResult> = requests.iter().filter_map(run).collect();

        let valid = results.iter().filter(|r| r.is_valid).count();
        if results.len() < requests.len() {
            log::warn!(
                "Batch cancelled: {} of {} requests skipped",
                requests.len() - results.len(),
                requests.len()
            );
        }
        log::info!("VALID {} INVALID {}", valid, results.len() - valid);
        results
    }

    /// One invalid record per request for a grid that could not be built
    pub fn fail_all(&self, requests: &[MatchupRequest], reason: &OcError) -> Vec<MatchupResult> {
        log::warn!("Grid rejected, marking {} requests invalid: {}", requests.len(), reason);
        requests
            .iter()
            .map(|request| MatchupResult::unmatched(request, &self.profile.bands, reason))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibrate::{BandCalibration, CalibrationSpec};
    use crate::types::{AttributeMap, FlagImage, GeoImage};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn test_profile() -> ProductProfile {
        ProductProfile {
            name: "test".to_string(),
            flag_set: FlagSet::sgli_l2(),
            validation_flags: "QA_flag".to_string(),
            reference_band: "Rrs_443".to_string(),
            bands: vec![
                BandSpec::new(
                    "Rrs_443",
                    "NWLR_443",
                    BandCalibration::Explicit(CalibrationSpec::linear(2e-5, -0.01)),
                ),
                BandSpec::new("CHLA", "CHLA", BandCalibration::default()),
                BandSpec::raw("Rrs_flags", "QA_flag"),
            ],
            observation_time: None,
        }
    }

    fn test_grid(rows: usize, cols: usize) -> Grid {
        let lat = Array2::from_shape_fn((rows, cols), |(i, _)| 10.0 - i as f64 * 0.01);
        let lon = Array2::from_shape_fn((rows, cols), |(_, j)| 120.0 + j as f64 * 0.01);
        Grid::new(lat, lon)
            .unwrap()
            .with_band("NWLR_443", Array2::from_elem((rows, cols), 25500.0), AttributeMap::new())
            .unwrap()
            .with_band("CHLA", Array2::from_elem((rows, cols), 3.0), AttributeMap::new())
            .unwrap()
            .with_flags("QA_flag", FlagImage::zeros((rows, cols)))
            .unwrap()
    }

    #[test]
    fn test_band_failure_does_not_invalidate() {
        let extractor = MatchupExtractor::new(test_profile(), &MatchupConfig::default()).unwrap();
        let grid = test_grid(5, 5);
        let prepared = extractor.prepare(&grid);
        let result = extractor.process(&prepared, &MatchupRequest::new("a", 9.98, 120.02));

        assert_eq!((result.row, result.col), (Some(2), Some(2)));
        assert!(result.is_valid);
        assert_relative_eq!(result.band_values["Rrs_443"], 25500.0 * 2e-5 - 0.01, epsilon = 1e-12);
        // CHLA has no Slope/Offset attributes
        assert!(result.band_values["CHLA"].is_nan());
        assert!(result.band_failures["CHLA"].contains("slope"));
        assert_eq!(result.band_values["Rrs_flags"], 0.0);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_edge_match_is_invalid() {
        let extractor = MatchupExtractor::new(test_profile(), &MatchupConfig::default()).unwrap();
        let grid = test_grid(5, 5);
        let prepared = extractor.prepare(&grid);
        let result = extractor.process(&prepared, &MatchupRequest::new("edge", 10.0, 120.0));

        assert_eq!((result.row, result.col), (Some(0), Some(0)));
        assert!(!result.is_valid);
        assert_eq!(result.rejection, Some(Rejection::OutOfBounds));
        assert_relative_eq!(result.band_values["Rrs_443"], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_derived_arrays_are_shared() {
        let extractor = MatchupExtractor::new(test_profile(), &MatchupConfig::default()).unwrap();
        let grid = test_grid(4, 4);
        let prepared = extractor.prepare(&grid);

        let first = prepared.band("Rrs_443").unwrap();
        let second = prepared.band("Rrs_443").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(prepared.band("nope"), Err(OcError::MissingDataset(_))));
    }

    #[test]
    fn test_failed_band_is_derived_once() {
        let extractor = MatchupExtractor::new(test_profile(), &MatchupConfig::default()).unwrap();
        let grid = test_grid(4, 4);
        let prepared = extractor.prepare(&grid);

        let source = |result: OcResult<Arc<BandImage>>| match result {
            Err(OcError::DerivedBand { name, source }) => {
                assert_eq!(name, "CHLA");
                source
            }
            other => panic!("expected a derived band failure, got {:?}", other.map(|_| ())),
        };
        let first = source(prepared.band("CHLA"));
        let second = source(prepared.band("CHLA"));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(*first, OcError::MissingCalibrationAttribute(_)));
    }

    #[test]
    fn test_observation_time_is_calibrated() {
        let mut profile = test_profile();
        profile.observation_time = Some(BandSpec::new("Obs_time", "Obs_time", BandCalibration::default()));
        let extractor = MatchupExtractor::new(profile, &MatchupConfig::default()).unwrap();

        let mut attributes = AttributeMap::new();
        attributes.insert("Slope".to_string(), vec![0.001]);
        attributes.insert("Offset".to_string(), vec![0.0]);
        let grid = test_grid(5, 5)
            .with_band("Obs_time", Array2::from_elem((5, 5), 2266.0), attributes)
            .unwrap();
        let prepared = extractor.prepare(&grid);
        let result = extractor.process(&prepared, &MatchupRequest::new("t", 9.98, 120.02));

        assert_eq!(result.observation_time, NaiveTime::from_hms_opt(2, 15, 57));
        // Not an output column
        assert!(!result.band_values.contains_key("Obs_time"));
    }

    #[test]
    fn test_config_overrides_invalid_flags() {
        let config = MatchupConfig {
            invalid_flag_names: Some(["TURBIDW".to_string()].into_iter().collect()),
            ..Default::default()
        };
        let extractor = MatchupExtractor::new(test_profile(), &config).unwrap();
        assert!(!extractor.flag_set().is_pure(1 << 11));
        assert!(extractor.flag_set().is_pure(1 << 1));

        let config = MatchupConfig {
            invalid_flag_names: Some(["GLITTER".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert!(MatchupExtractor::new(test_profile(), &config).is_err());
    }

    #[test]
    fn test_fail_all() {
        let extractor = MatchupExtractor::new(test_profile(), &MatchupConfig::default()).unwrap();
        let requests = vec![MatchupRequest::new("a", 0.0, 0.0), MatchupRequest::new("b", 1.0, 1.0)];
        let err = Grid::new(GeoImage::zeros((2, 2)), GeoImage::zeros((3, 2))).unwrap_err();
        let results = extractor.fail_all(&requests, &err);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_valid && r.row.is_none()));
        assert_eq!(results[1].id, "b");
        assert!(results[0].band_values.values().all(|v| v.is_nan()));
    }

    #[test]
    fn test_cancelled_batch_skips_requests() {
        let extractor = MatchupExtractor::new(test_profile(), &MatchupConfig::default()).unwrap();
        let grid = test_grid(5, 5);
        let prepared = extractor.prepare(&grid);
        let requests: Vec<_> = (0..8)
            .map(|i| MatchupRequest::new(i.to_string(), 9.98, 120.02))
            .collect();

        let cancel = AtomicBool::new(true);
        assert!(extractor.process_batch(&prepared, &requests, Some(&cancel)).is_empty());

        let cancel = AtomicBool::new(false);
        let results = extractor.process_batch(&prepared, &requests, Some(&cancel));
        assert_eq!(results.len(), 8);
        assert_eq!(results[5].id, "5");
    }
}
