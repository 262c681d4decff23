use crate::types::{GeoImage, GeoReal, OcError, OcResult};
use serde::{Deserialize, Serialize};

/// Pixels nearest to a target coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Every pixel attaining the minimum distance, in row-major order
    pub matches: Vec<(usize, usize)>,
    /// Planar squared distance in degrees²
    pub distance_squared: GeoReal,
}

impl Location {
    /// The pixel used for the matchup when several tie
    pub fn first(&self) -> (usize, usize) {
        self.matches[0]
    }

    pub fn is_tied(&self) -> bool {
        self.matches.len() > 1
    }
}

/// Brute-force nearest-pixel search over a lat/lon grid
pub struct GridLocator;

impl GridLocator {
    /// Find the pixels minimizing `(lat - target_lat)² + (lon - target_lon)²`.
    ///
    /// Pixels with non-finite geolocation are skipped.
    pub fn locate(
        latitude: &GeoImage,
        longitude: &GeoImage,
        target_lat: GeoReal,
        target_lon: GeoReal,
    ) -> OcResult<Location> {
        let (rows, cols) = latitude.dim();
        if rows == 0 || cols == 0 {
            return Err(OcError::EmptyGrid);
        }
        if longitude.dim() != latitude.dim() {
            return Err(OcError::GridShapeMismatch {
                name: "longitude".to_string(),
                expected: latitude.dim(),
                actual: longitude.dim(),
            });
        }

        let mut best = GeoReal::INFINITY;
        let mut matches = Vec::new();
        for ((idx, &lat), &lon) in latitude.indexed_iter().zip(longitude.iter()) {
            let d_lat = lat - target_lat;
            let d_lon = lon - target_lon;
            let dist = d_lat * d_lat + d_lon * d_lon;
            if !dist.is_finite() {
                continue;
            }
            if dist < best {
                best = dist;
                matches.clear();
                matches.push(idx);
            } else if dist == best {
                matches.push(idx);
            }
        }

        if matches.is_empty() {
            return Err(OcError::NoFiniteGeolocation);
        }

        log::debug!(
            "Nearest pixel to ({:.5}, {:.5}) at {:?} with distance^2 = {:e} ({} tied)",
            target_lat,
            target_lon,
            matches[0],
            best,
            matches.len()
        );

        Ok(Location {
            matches,
            distance_squared: best,
        })
    }
}

/// Line/pixel window around a matched pixel, used to subset external
/// processing runs to the neighborhood of a matchup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetWindow {
    pub start_line: usize,
    pub end_line: usize,
    pub start_pixel: usize,
    pub end_pixel: usize,
}

impl SubsetWindow {
    /// Window of `half_width` samples on each side of `(row, col)`.
    ///
    /// `(row, col)` index a grid `scale` times coarser than the image of
    /// size `image_dim`; the window is clamped to the image.
    pub fn around(
        row: usize,
        col: usize,
        scale: usize,
        half_width: usize,
        image_dim: (usize, usize),
    ) -> OcResult<Self> {
        let (lines, pixels) = image_dim;
        if scale == 0 {
            return Err(OcError::InvalidParameter {
                name: "scale",
                value: scale.to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        if lines == 0 || pixels == 0 {
            return Err(OcError::EmptyGrid);
        }

        let line = row * scale;
        let pixel = col * scale;
        if line >= lines || pixel >= pixels {
            return Err(OcError::InvalidParameter {
                name: "center",
                value: format!("({}, {})", line, pixel),
                reason: format!("outside image of size ({}, {})", lines, pixels),
            });
        }

        Ok(Self {
            start_line: line.saturating_sub(half_width),
            end_line: (line + half_width).min(lines - 1),
            start_pixel: pixel.saturating_sub(half_width),
            end_pixel: (pixel + half_width).min(pixels - 1),
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        (
            self.end_line - self.start_line + 1,
            self.end_pixel - self.start_pixel + 1,
        )
    }
}
