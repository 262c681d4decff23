//! Core matchup processing modules

pub mod flags;
pub mod calibrate;
pub mod resample;
pub mod locate;
pub mod validate;
pub mod obs_time;
pub mod profile;
pub mod extract;

// Re-export main types
pub use flags::{decode, is_pure, FlagSet};
pub use calibrate::{calibrate, calibrate_band, AttributeKeys, BandCalibration, CalibrationSpec, RadiometricCalibrator};
pub use resample::{crop, resample, GeometryResampler};
pub use locate::{GridLocator, Location, SubsetWindow};
pub use validate::{coefficient_of_variation, MatchupValidator, Rejection, ValidationParams};
pub use obs_time::{hours_to_hms, hours_to_time};
pub use profile::{BandSpec, ProductProfile};
pub use extract::{MatchupExtractor, MatchupResult, PreparedGrid, MISSING};
