use crate::core::calibrate::{calibrate, CalibrationSpec};
use crate::types::{OcError, OcResult};
use ndarray::{s, Array2, ArrayBase, ArrayView2, Data, Ix2, Zip};
use num_traits::{AsPrimitive, Float, NumCast};

/// Upsamples tie-point geometry grids to full sensor resolution
#[derive(Debug, Clone, Copy)]
pub struct GeometryResampler {
    /// Tie-point spacing in full-resolution samples (both axes)
    pub interval: usize,
    /// Declared image lines
    pub lines: usize,
    /// Declared image pixels
    pub pixels: usize,
}

impl GeometryResampler {
    pub fn new(interval: usize, lines: usize, pixels: usize) -> OcResult<Self> {
        if interval == 0 {
            return Err(OcError::InvalidParameter {
                name: "resample_interval",
                value: interval.to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(Self {
            interval,
            lines,
            pixels,
        })
    }

    /// Bring a geometry field to image resolution.
    ///
    /// Latitude and longitude are interpolated as stored; any other field
    /// (angles, times) is calibrated first when a spec is given. The result
    /// is cropped to the declared image size.
    pub fn prepare_field<S, T>(
        &self,
        raw: &ArrayBase<S, Ix2>,
        calibration: Option<&CalibrationSpec>,
        is_longitude: bool,
    ) -> OcResult<Array2<f64>>
    where
        S: Data<Elem = T>,
        T: AsPrimitive<f64>,
    {
        let data = match calibration {
            Some(spec) => calibrate(raw, spec)?,
            None => raw.mapv(|v| v.as_()),
        };

        let data = if self.interval > 1 {
            resample(&data.view(), self.interval, is_longitude)?
        } else {
            data
        };

        Ok(crop(data, self.lines, self.pixels))
    }

    pub fn resample<T: Float + Send + Sync>(
        &self,
        coarse: &ArrayView2<T>,
        is_longitude: bool,
    ) -> OcResult<Array2<T>> {
        let fine = resample(coarse, self.interval, is_longitude)?;
        Ok(crop(fine, self.lines, self.pixels))
    }
}

/// Bilinear upsampling of `coarse` by `interval` along both axes.
///
/// The grid is padded by repeating its last row and column, so the output
/// has `interval * rows` lines and `interval * cols` pixels. In longitude mode
/// grids crossing the antimeridian are unwrapped to [0, 360) before
/// interpolation and wrapped back to (-180, 180] afterwards.
///
/// Output samples that fall on a tie point copy it exactly and never pick up
/// NaN from neighboring tie points.
pub fn resample<T: Float + Send + Sync>(
    coarse: &ArrayView2<T>,
    interval: usize,
    is_longitude: bool,
) -> OcResult<Array2<T>> {
    let (rows, cols) = coarse.dim();
    if rows == 0 || cols == 0 {
        return Err(OcError::EmptyGrid);
    }
    if interval == 0 {
        return Err(OcError::InvalidParameter {
            name: "interval",
            value: interval.to_string(),
            reason: "must be a positive integer".to_string(),
        });
    }
    if interval == 1 {
        return Ok(coarse.to_owned());
    }

    let half_turn = cast::<T, _>(180.0)?;
    let full_turn = cast::<T, _>(360.0)?;

    let mut data = coarse.to_owned();
    if is_longitude && crosses_antimeridian(&data.view(), half_turn) {
        log::debug!("Longitude grid crosses the antimeridian, unwrapping");
        data.mapv_inplace(|lon| if lon < T::zero() { lon + full_turn } else { lon });
    }

    // Weights k / interval in the data's own precision
    let n = cast::<T, _>(interval)?;
    let weights = (0..interval)
        .map(|k| cast::<T, _>(k).map(|k| k / n))
        .collect::<OcResult<Vec<T>>>()?;

    log::debug!(
        "Resampling {} x {} grid by {} to {} x {}",
        rows,
        cols,
        interval,
        rows * interval,
        cols * interval
    );

    let mut fine = Array2::<T>::zeros((rows * interval, cols * interval));
    let fill = |(i, j): (usize, usize), out: &mut T| {
        let (r0, wv) = (i / interval, weights[i % interval]);
        let (c0, wh) = (j / interval, weights[j % interval]);
        // Padding: the last row/column repeats
        let r1 = (r0 + 1).min(rows - 1);
        let c1 = (c0 + 1).min(cols - 1);

        let top = lerp(data[[r0, c0]], data[[r0, c1]], wh);
        let bottom = lerp(data[[r1, c0]], data[[r1, c1]], wh);
        *out = lerp(top, bottom, wv);
    };

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut fine).par_for_each(fill);
    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut fine).for_each(fill);

    if is_longitude {
        fine.mapv_inplace(|lon| if lon > half_turn { lon - full_turn } else { lon });
    }

    Ok(fine)
}

/// Trim a full-resolution grid to the declared image size; never pads
pub fn crop<T: Clone>(data: Array2<T>, lines: usize, pixels: usize) -> Array2<T> {
    let (rows, cols) = data.dim();
    let (lines, pixels) = (lines.min(rows), pixels.min(cols));
    if (lines, pixels) == (rows, cols) {
        return data;
    }
    log::debug!("Cropping {} x {} to {} x {}", rows, cols, lines, pixels);
    data.slice(s![..lines, ..pixels]).to_owned()
}

/// Largest jump between horizontally adjacent samples exceeds half a turn
fn crosses_antimeridian<T: Float>(lon: &ArrayView2<T>, half_turn: T) -> bool {
    let left = lon.slice(s![.., ..-1]);
    let right = lon.slice(s![.., 1..]);
    let mut max_diff = T::neg_infinity();
    Zip::from(&left).and(&right).for_each(|&a, &b| {
        let diff = (a - b).abs();
        // NaN samples are skipped
        if diff > max_diff {
            max_diff = diff;
        }
    });
    max_diff > half_turn
}

#[inline]
fn lerp<T: Float>(a: T, b: T, w: T) -> T {
    if w == T::zero() {
        // Keeps tie points exact and NaN neighbors out of them
        a
    } else {
        (T::one() - w) * a + w * b
    }
}

fn cast<T: NumCast, V: NumCast + Copy + std::fmt::Debug>(value: V) -> OcResult<T> {
    <T as NumCast>::from(value).ok_or_else(|| OcError::InvalidParameter {
        name: "value",
        value: format!("{:?}", value),
        reason: "not representable in the grid's float type".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_interval_one_is_identity() {
        let coarse = array![[1.0f32, 2.0, f32::NAN], [4.0, 5.0, 6.0]];
        let fine = resample(&coarse.view(), 1, false).unwrap();
        assert_eq!(fine.dim(), coarse.dim());
        for (a, b) in coarse.iter().zip(fine.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn test_bilinear_values() {
        let coarse = array![[0.0f64, 10.0], [20.0, 30.0]];
        let fine = resample(&coarse.view(), 2, false).unwrap();
        assert_eq!(fine.dim(), (4, 4));

        let expected = array![
            [0.0, 5.0, 10.0, 10.0],
            [10.0, 15.0, 20.0, 20.0],
            [20.0, 25.0, 30.0, 30.0],
            [20.0, 25.0, 30.0, 30.0]
        ];
        for (a, b) in fine.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tie_points_are_preserved() {
        let coarse = Array2::from_shape_fn((5, 7), |(i, j)| (i * 7 + j) as f32 * 0.37);
        let fine = resample(&coarse.view(), 10, false).unwrap();
        for ((i, j), &v) in coarse.indexed_iter() {
            assert_eq!(fine[[i * 10, j * 10]], v);
        }
    }

    #[test]
    fn test_nan_neighbor_does_not_reach_tie_point() {
        let coarse = array![[1.0f64, f64::NAN], [3.0, 4.0]];
        let fine = resample(&coarse.view(), 2, false).unwrap();
        assert_eq!(fine[[0, 0]], 1.0);
        assert_eq!(fine[[2, 0]], 3.0);
        assert!(fine[[0, 1]].is_nan());
        assert!(fine[[0, 2]].is_nan());
    }

    #[test]
    fn test_antimeridian_wrap() {
        let coarse = array![[179.0f32, -179.0]];
        let fine = resample(&coarse.view(), 2, true).unwrap();
        assert_eq!(fine.dim(), (2, 4));

        // No sample may fall through 0 degrees
        for &lon in fine.iter() {
            assert!(lon.abs() >= 179.0 - 1e-4, "lon {} left the dateline", lon);
        }
        assert_abs_diff_eq!(fine[[0, 0]], 179.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fine[[0, 1]].abs(), 180.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fine[[0, 2]], -179.0, epsilon = 1e-4);
    }

    #[test]
    fn test_longitude_without_crossing_is_untouched() {
        let coarse = array![[-10.0f64, -8.0], [-10.0, -8.0]];
        let fine = resample(&coarse.view(), 2, true).unwrap();
        assert_abs_diff_eq!(fine[[0, 1]], -9.0, epsilon = 1e-12);
        assert!(fine.iter().all(|&v| v < 0.0));
    }

    #[test]
    fn test_crop_never_pads() {
        let data = Array2::<f32>::zeros((20, 30));
        assert_eq!(crop(data.clone(), 15, 25).dim(), (15, 25));
        assert_eq!(crop(data.clone(), 40, 25).dim(), (20, 25));
        assert_eq!(crop(data, 40, 50).dim(), (20, 30));
    }

    #[test]
    fn test_prepare_field_calibrates_then_crops() {
        let resampler = GeometryResampler::new(2, 3, 3).unwrap();
        let raw = array![[100u16, 200], [300, 400]];
        let spec = CalibrationSpec::linear(0.01, 0.0).with_error_dn(65535);
        let field = resampler.prepare_field(&raw, Some(&spec), false).unwrap();

        assert_eq!(field.dim(), (3, 3));
        assert_abs_diff_eq!(field[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(field[[0, 1]], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(field[[1, 1]], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(field[[2, 2]], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(GeometryResampler::new(0, 10, 10).is_err());
        let coarse = array![[1.0f32]];
        assert!(resample(&coarse.view(), 0, false).is_err());
    }
}
