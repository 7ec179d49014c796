//! Great-circle geofence test.

use serde::{Deserialize, Serialize};

use crate::location::LocationData;

/// Mean Earth radius used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the WGS84 ellipsoid, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&LocationData> for Coordinate {
    fn from(fix: &LocationData) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
        }
    }
}

/// Circular home area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomeGeofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl HomeGeofence {
    pub fn center(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn contains(&self, fix: &LocationData) -> bool {
        is_within(Coordinate::from(fix), self.center(), self.radius_meters)
    }

    pub fn distance_m(&self, fix: &LocationData) -> f64 {
        distance_m(Coordinate::from(fix), self.center())
    }
}

pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine_distance_m(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Inclusive: a point exactly `radius_m` away is within.
pub fn is_within(point: Coordinate, center: Coordinate, radius_m: f64) -> bool {
    distance_m(point, center) <= radius_m
}
