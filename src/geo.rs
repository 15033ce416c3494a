//! Great-circle distance and radius filtering over WGS84 coordinates.

use tracing::debug;

/// Mean Earth radius (IUGG) in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Slack added to bounding boxes so float rounding never drops a boundary point.
const BOX_EPSILON_DEG: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a point only when both coordinates are finite and within range.
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude)
        {
            Some(Self::new(latitude, longitude))
        } else {
            None
        }
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_KM * c
    }
}

/// Coarse rectangle enclosing every point of a radius query.
///
/// `longitude` is `None` when the circle touches a pole or wraps the
/// antimeridian, in which case only the latitude band is usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub longitude: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl RadiusFilter {
    /// Parse the raw `lat`/`lng`/`radius` query values.
    ///
    /// Returns `None` unless all three are present and valid. Malformed
    /// values are dropped rather than reported.
    pub fn from_params(lat: Option<&str>, lng: Option<&str>, radius: Option<&str>) -> Option<Self> {
        let (lat, lng, radius) = match (lat, lng, radius) {
            (Some(lat), Some(lng), Some(radius))
                if !lat.trim().is_empty() && !lng.trim().is_empty() && !radius.trim().is_empty() =>
            {
                (lat.trim(), lng.trim(), radius.trim())
            }
            _ => return None,
        };

        let parsed = (
            lat.parse::<f64>(),
            lng.parse::<f64>(),
            radius.parse::<f64>(),
        );
        let (Ok(lat_v), Ok(lng_v), Ok(radius_v)) = parsed else {
            debug!(lat, lng, radius, "ignoring non-numeric radius filter");
            return None;
        };

        let Some(center) = GeoPoint::checked(lat_v, lng_v) else {
            debug!(lat, lng, "ignoring radius filter with out-of-range center");
            return None;
        };
        if !radius_v.is_finite() || radius_v < 0.0 {
            debug!(radius, "ignoring radius filter with invalid distance");
            return None;
        }

        Some(Self {
            center,
            radius_km: radius_v,
        })
    }

    /// Inclusive point-in-radius test.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_km(point) <= self.radius_km
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let angular = self.radius_km / EARTH_RADIUS_KM;
        let lat_delta = angular.to_degrees();
        let min_latitude = self.center.latitude - lat_delta - BOX_EPSILON_DEG;
        let max_latitude = self.center.latitude + lat_delta + BOX_EPSILON_DEG;

        if min_latitude <= -90.0 || max_latitude >= 90.0 || angular >= std::f64::consts::PI {
            return BoundingBox {
                min_latitude: min_latitude.max(-90.0),
                max_latitude: max_latitude.min(90.0),
                longitude: None,
            };
        }

        let cos_lat = self.center.latitude.to_radians().cos();
        let ratio = angular.sin() / cos_lat;
        let longitude = if ratio >= 1.0 {
            None
        } else {
            let lng_delta = ratio.asin().to_degrees() + BOX_EPSILON_DEG;
            let min_lng = self.center.longitude - lng_delta;
            let max_lng = self.center.longitude + lng_delta;
            if min_lng < -180.0 || max_lng > 180.0 {
                None
            } else {
                Some((min_lng, max_lng))
            }
        };

        BoundingBox {
            min_latitude,
            max_latitude,
            longitude,
        }
    }
}
