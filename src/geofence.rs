use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AttendanceError;
use crate::model::location::Location;

/// Earth radius used by the haversine formula, in meters.
///
/// WGS-84 equatorial radius: 0.008983° of longitude on the equator is ~1000 m and
/// 0.01° is ~1113 m with this value.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// A WGS-84 point in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Rejects non-finite or out-of-range input before any distance is computed.
    pub fn validate(&self) -> Result<(), AttendanceError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AttendanceError::Validation(
                "Latitude must be between -90 and 90.".to_string(),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AttendanceError::Validation(
                "Longitude must be between -180 and 180.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Great-circle distance between two points, in meters.
pub fn distance(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Inclusive: a point exactly on the boundary is inside.
pub fn within_radius(point: Coordinates, location: &Location) -> bool {
    evaluate(point, location).inside
}

/// Outcome of a geofence test, kept so callers can report how far off a user was.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub distance: f64,
    pub allowed_radius: f64,
    pub inside: bool,
}

pub fn evaluate(point: Coordinates, location: &Location) -> GeofenceCheck {
    let distance = distance(point, location.center());
    GeofenceCheck {
        distance,
        allowed_radius: location.radius,
        inside: distance <= location.radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn site(radius: f64) -> Location {
        Location {
            id: 1,
            name: "HQ".to_string(),
            description: None,
            latitude: 0.0,
            longitude: 0.0,
            radius,
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn one_kilometre_on_the_equator() {
        let origin = Coordinates::new(0.0, 0.0);
        let east = Coordinates::new(0.0, 0.008983);

        let d = distance(origin, east);
        assert!((d - 1000.0).abs() <= 1.0, "got {d}");

        assert!(within_radius(east, &site(1000.0)));
        assert!(!within_radius(east, &site(999.0)));
    }

    #[test]
    fn hundredth_of_a_degree_is_about_1113_metres() {
        let d = distance(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 0.01));
        assert!((d - 1113.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn boundary_is_inclusive() {
        let point = Coordinates::new(0.0005, 0.0004);
        let exact = distance(Coordinates::new(0.0, 0.0), point);

        let check = evaluate(point, &site(exact));
        assert!(check.inside);
        assert_eq!(check.allowed_radius, exact);

        assert!(!within_radius(point, &site(exact - 0.01)));
    }

    #[test]
    fn antipodal_points_are_half_the_circumference_apart() {
        let d = distance(Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 180.0));
        assert!((d - EARTH_RADIUS_METERS * std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(Coordinates::new(90.0, 180.0).validate().is_ok());
        assert!(Coordinates::new(-90.0, -180.0).validate().is_ok());
        assert!(matches!(
            Coordinates::new(90.5, 0.0).validate(),
            Err(AttendanceError::Validation(_))
        ));
        assert!(matches!(
            Coordinates::new(0.0, -180.01).validate(),
            Err(AttendanceError::Validation(_))
        ));
        assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
    }

    proptest! {
        #[test]
        fn distance_to_self_is_zero(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            let p = Coordinates::new(lat, lon);
            prop_assert_eq!(distance(p, p), 0.0);
        }

        #[test]
        fn distance_is_symmetric(
            lat_a in -90.0f64..=90.0, lon_a in -180.0f64..=180.0,
            lat_b in -90.0f64..=90.0, lon_b in -180.0f64..=180.0,
        ) {
            let a = Coordinates::new(lat_a, lon_a);
            let b = Coordinates::new(lat_b, lon_b);
            prop_assert!((distance(a, b) - distance(b, a)).abs() < 1e-6);
        }
    }
}
