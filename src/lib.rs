//! ocmatch: satellite ocean-color matchup extraction
//!
//! Pairs in-situ observations with the nearest pixel of a Level-2 ocean-color
//! grid, screens the match with its 3x3 neighborhood (quality flags and
//! radiometric homogeneity) and reports calibrated band values for it.
//! Geometry grids stored at tie-point resolution are upsampled bilinearly,
//! with antimeridian-aware handling of longitude.

pub mod types;
pub mod config;
pub mod core;
pub mod io;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    AttributeMap, Band, BandImage, FlagImage, GeoImage, GeoReal, Grid, MatchupRequest, OcError,
    OcResult,
};

pub use config::MatchupConfig;

pub use crate::core::{
    CalibrationSpec, FlagSet, GeometryResampler, GridLocator, MatchupExtractor, MatchupResult,
    MatchupValidator, PreparedGrid, ProductProfile, Rejection, ValidationParams,
};

pub use io::MatchupCollection;
