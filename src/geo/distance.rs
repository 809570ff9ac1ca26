//! Haversine distance on a spherical Earth.

use crate::models::GeoPoint;

/// Mean Earth radius used for every threshold in the pipeline
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Length of one degree of latitude (and of longitude at the equator)
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Great-circle distance in kilometers.
///
/// Deltas are taken as absolute values so the result is bit-for-bit
/// symmetric in its arguments.
#[inline]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).abs().to_radians();
    let d_lambda = (b.lon - a.lon).abs().to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Display rounding (one decimal). Never use for threshold comparisons.
pub fn round_km(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    #[test]
    fn test_zero_for_identical_points() {
        for p in [pt(0.0, 0.0), pt(45.07, 7.69), pt(-33.86, 151.2), pt(89.9, -179.9)] {
            assert_eq!(haversine_km(p, p), 0.0);
        }
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            (pt(45.07, 7.69), pt(41.9, 12.5)),
            (pt(-33.86, 151.2), pt(51.5, -0.12)),
            (pt(10.0, 179.5), pt(10.0, -179.5)),
        ];
        for (a, b) in pairs {
            assert_eq!(haversine_km(a, b), haversine_km(b, a));
        }
    }

    #[test]
    fn test_one_degree_at_equator() {
        let d = haversine_km(pt(0.0, 0.0), pt(0.0, 1.0));
        assert!((d - 111.2).abs() <= 0.1, "got {}", d);
        assert!((d - KM_PER_DEGREE).abs() < 1e-9);
    }

    #[test]
    fn test_antimeridian_is_short() {
        let d = haversine_km(pt(0.0, 179.5), pt(0.0, -179.5));
        assert!((d - KM_PER_DEGREE).abs() < 1e-6);
    }

    #[test]
    fn test_round_km() {
        assert_eq!(round_km(111.19492), 111.2);
        assert_eq!(round_km(0.04), 0.0);
    }
}
