use crate::core::calibrate::{AttributeKeys, BandCalibration, CalibrationSpec};
use crate::core::flags::FlagSet;
use crate::types::{OcError, OcResult};
use serde::{Deserialize, Serialize};

/// One output value of a matchup record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    /// Output column name
    pub name: String,
    /// Band or flag dataset in the grid
    pub dataset: String,
    #[serde(default)]
    pub calibration: BandCalibration,
}

impl BandSpec {
    pub fn new(name: impl Into<String>, dataset: impl Into<String>, calibration: BandCalibration) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            calibration,
        }
    }

    /// Integral or categorical field copied as stored
    pub fn raw(name: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self::new(name, dataset, BandCalibration::Raw)
    }
}

/// Per-product extraction table: flag vocabulary, bands and calibration
/// sources. One profile describes one product family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProfile {
    pub name: String,
    pub flag_set: FlagSet,
    /// Flag dataset used for neighborhood validation
    pub validation_flags: String,
    /// Output band whose calibrated values feed the homogeneity test
    pub reference_band: String,
    pub bands: Vec<BandSpec>,
    /// Band holding the observation time; its calibrated values are
    /// fractional hours of day. Resolved like any band, but not an output.
    #[serde(default)]
    pub observation_time: Option<BandSpec>,
}

impl ProductProfile {
    pub fn from_json_str(json: &str) -> OcResult<Self> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> OcResult<()> {
        if self.band(&self.reference_band).is_none() {
            return Err(OcError::Config(format!(
                "reference band '{}' is not among the bands of profile '{}'",
                self.reference_band, self.name
            )));
        }
        for (i, band) in self.bands.iter().enumerate() {
            if self.bands[..i].iter().any(|other| other.name == band.name) {
                return Err(OcError::Config(format!(
                    "band '{}' listed twice in profile '{}'",
                    band.name, self.name
                )));
            }
        }
        if let Some(time) = &self.observation_time {
            if self.band(&time.name).is_some() {
                return Err(OcError::Config(format!(
                    "observation time band '{}' clashes with an output band of profile '{}'",
                    time.name, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn band(&self, name: &str) -> Option<&BandSpec> {
        self.bands.iter().find(|band| band.name == name)
    }

    /// SGLI Level-2 normalized water-leaving radiance product, reported as
    /// remote-sensing reflectance
    pub fn sgli_l2() -> Self {
        let mut bands: Vec<BandSpec> = [380, 412, 443, 490, 530, 565, 670]
            .iter()
            .map(|wl| {
                BandSpec::new(
                    format!("Rrs_{}", wl),
                    format!("NWLR_{}", wl),
                    BandCalibration::Attributes(AttributeKeys::reflectance()),
                )
            })
            .collect();
        // No 765 nm radiance is distributed; the column is always missing
        bands.push(BandSpec::new(
            "Rrs_765",
            "NWLR_765",
            BandCalibration::Attributes(AttributeKeys::reflectance()),
        ));
        bands.push(BandSpec::raw("Rrs_flags", "QA_flag"));

        Self {
            name: "sgli_l2".to_string(),
            flag_set: FlagSet::sgli_l2(),
            validation_flags: "QA_flag".to_string(),
            reference_band: "Rrs_443".to_string(),
            bands,
            observation_time: Some(BandSpec::new("Obs_time", "Obs_time", BandCalibration::default())),
        }
    }

    /// SGLI Level-2 in-water product file (chlorophyll-a, suspended matter,
    /// CDOM), extracted at the same location as [`Self::sgli_l2`] and merged
    /// into its records with [`MatchupResult::merge_bands`].
    ///
    /// [`MatchupResult::merge_bands`]: crate::core::extract::MatchupResult::merge_bands
    pub fn sgli_l2_product() -> Self {
        let bands = vec![
            BandSpec::new("Chla", "CHLA", BandCalibration::default()),
            BandSpec::new("TSM", "TSM", BandCalibration::default()),
            BandSpec::new("ag_443", "CDOM", BandCalibration::default()),
            BandSpec::raw("prod_flags", "QA_flag"),
        ];

        Self {
            name: "sgli_l2_product".to_string(),
            flag_set: FlagSet::sgli_l2(),
            validation_flags: "QA_flag".to_string(),
            reference_band: "Chla".to_string(),
            bands,
            observation_time: None,
        }
    }

    /// SeaDAS l2gen output; geophysical values are stored already scaled
    pub fn seadas_l2() -> Self {
        let identity = || BandCalibration::Explicit(CalibrationSpec::linear(1.0, 0.0));
        let mut bands: Vec<BandSpec> = [380, 412, 443, 490, 529, 566, 672]
            .iter()
            .map(|wl| BandSpec::new(format!("Rrs_{}", wl), format!("Rrs_{}", wl), identity()))
            .collect();
        for product in ["Kd_490", "angstrom", "aot_867", "chlor_a"] {
            bands.push(BandSpec::new(product, product, identity()));
        }
        for iop in ["a", "adg", "aph"] {
            for wl in [380, 412, 443, 490, 529, 566, 672] {
                let name = format!("{}_{}_qaa", iop, wl);
                bands.push(BandSpec::new(name.clone(), name, identity()));
            }
        }
        bands.push(BandSpec::raw("l2_flags", "l2_flags"));

        Self {
            name: "seadas_l2".to_string(),
            flag_set: FlagSet::seadas_l2(),
            validation_flags: "l2_flags".to_string(),
            reference_band: "Rrs_443".to_string(),
            bands,
            observation_time: None,
        }
    }

    /// OC-SMART output, where any nonzero flag disqualifies a pixel
    pub fn ocsmart() -> Self {
        let identity = || BandCalibration::Explicit(CalibrationSpec::linear(1.0, 0.0));
        let mut bands = Vec::new();
        for group in ["Rrs", "AOD", "adg", "ap", "aph", "bbp", "bp"] {
            for wl in [380, 412, 443, 490, 530, 565, 672] {
                bands.push(BandSpec::new(
                    format!("{}_{}", group, wl),
                    format!("{}/{}_{}nm", group, group, wl),
                    identity(),
                ));
            }
        }
        bands.push(BandSpec::new("Chla_oci", "chlor_a(oci)", identity()));
        bands.push(BandSpec::new("Chla_yoc", "chlor_a(yoc)", identity()));
        bands.push(BandSpec::new("TSM_yoc", "tsm(yoc)", identity()));
        bands.push(BandSpec::raw("l2_flags", "L2_flags"));

        Self {
            name: "ocsmart".to_string(),
            flag_set: FlagSet::ocsmart(),
            validation_flags: "L2_flags".to_string(),
            reference_band: "Rrs_443".to_string(),
            bands,
            observation_time: None,
        }
    }
}
