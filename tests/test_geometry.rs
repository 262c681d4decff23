use approx::assert_relative_eq;
use ndarray::{array, Array2};
use ocmatch::core::calibrate::CalibrationSpec;
use ocmatch::core::locate::SubsetWindow;
use ocmatch::core::resample::{crop, resample};
use ocmatch::{GeometryResampler, GridLocator, OcError};

#[test]
fn test_antimeridian_longitudes_stay_in_range() {
    let _ = env_logger::builder().is_test(true).try_init();

    let coarse = array![[178.0, -178.0, -174.0], [178.0, -178.0, -174.0]];
    let fine = resample(&coarse.view(), 4, true).unwrap();
    assert_eq!(fine.dim(), (8, 12));

    for &lon in fine.iter() {
        assert!(lon > -180.0 && lon <= 180.0, "longitude {} out of range", lon);
    }
    assert_relative_eq!(fine[[0, 1]], 179.0, epsilon = 1e-12);
    assert_relative_eq!(fine[[0, 2]], 180.0, epsilon = 1e-12);
    assert_relative_eq!(fine[[0, 3]], -179.0, epsilon = 1e-12);
    assert_relative_eq!(fine[[5, 6]], -176.0, epsilon = 1e-12);
}

#[test]
fn test_tie_point_latitude_is_bilinear() {
    let coarse = array![[40.0f32, 40.0], [30.0, 30.0]];
    let fine = resample(&coarse.view(), 5, false).unwrap();
    assert_eq!(fine.dim(), (10, 10));

    // Rows interpolate, the padded last row repeats
    assert_relative_eq!(fine[[0, 3]], 40.0, epsilon = 1e-5);
    assert_relative_eq!(fine[[2, 3]], 36.0, epsilon = 1e-5);
    assert_relative_eq!(fine[[7, 9]], 30.0, epsilon = 1e-5);
}

#[test]
fn test_calibrated_angle_field() {
    // Zenith angles stored as scaled integers
    let raw = Array2::from_shape_fn((3, 4), |(i, j)| (1000 + 100 * i + 10 * j) as u16);
    let spec = CalibrationSpec::linear(0.01, 0.0).with_error_dn(65535);
    let resampler = GeometryResampler::new(10, 25, 33).unwrap();

    let angle = resampler.prepare_field(&raw, Some(&spec), false).unwrap();
    assert_eq!(angle.dim(), (25, 33));
    assert_relative_eq!(angle[[0, 0]], 10.0, epsilon = 1e-9);
    assert_relative_eq!(angle[[5, 0]], 10.5, epsilon = 1e-9);
    assert_relative_eq!(angle[[20, 15]], 12.15, epsilon = 1e-9);
}

#[test]
fn test_crop_never_pads() {
    let data = Array2::<f64>::zeros((6, 6));
    assert_eq!(crop(data.clone(), 4, 10).dim(), (4, 6));
    assert_eq!(crop(data, 10, 10).dim(), (6, 6));
}

#[test]
fn test_locate_across_resampled_grid() {
    let coarse_lat = array![[50.0, 50.0], [49.0, 49.0]];
    let coarse_lon = array![[179.5, -179.5], [179.5, -179.5]];
    let resampler = GeometryResampler::new(2, 3, 3).unwrap();
    let lat = resampler.resample(&coarse_lat.view(), false).unwrap();
    let lon = resampler.resample(&coarse_lon.view(), true).unwrap();
    assert_relative_eq!(lon[[0, 1]], 180.0, epsilon = 1e-12);

    let location = GridLocator::locate(&lat, &lon, 49.6, 179.9).unwrap();
    assert_eq!(location.first(), (1, 1));
    assert!(!location.is_tied());
}

#[test]
fn test_locate_reports_ties_in_row_major_order() {
    let lat = array![[1.0, 1.0], [-1.0, -1.0]];
    let lon = array![[-1.0, 1.0], [-1.0, 1.0]];
    let location = GridLocator::locate(&lat, &lon, 0.0, 0.0).unwrap();
    assert_eq!(location.matches, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    assert_relative_eq!(location.distance_squared, 2.0);

    let nan = Array2::from_elem((2, 2), f64::NAN);
    assert!(matches!(
        GridLocator::locate(&nan, &nan, 0.0, 0.0),
        Err(OcError::NoFiniteGeolocation)
    ));
}

#[test]
fn test_subset_window_on_full_resolution_image() {
    let window = SubsetWindow::around(100, 2, 10, 30, (7820, 5000)).unwrap();
    assert_eq!(window.start_line, 970);
    assert_eq!(window.end_line, 1030);
    assert_eq!(window.start_pixel, 0);
    assert_eq!(window.end_pixel, 50);
    assert_eq!(window.dim(), (61, 51));
}
