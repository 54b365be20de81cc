//! Fixed-point coordinates and great-circle geometry.

/// Scale for fixed-point coordinates: 1e-6 degrees per unit.
pub const COORDINATE_PRECISION: f64 = 1_000_000.0;

const EARTH_RADIUS_M: f64 = 6_372_797.560856;

/// A (lon, lat) pair in 1e-6 degrees, signed 32-bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coordinate {
    pub lon: i32,
    pub lat: i32,
}

impl Coordinate {
    pub fn new(lon: i32, lat: i32) -> Self {
        Self { lon, lat }
    }

    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            lon: (lon * COORDINATE_PRECISION).round() as i32,
            lat: (lat * COORDINATE_PRECISION).round() as i32,
        }
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }

    /// Degenerate coordinates (outside the valid lon/lat range) come from
    /// broken dumps and poison distance computations downstream.
    pub fn is_valid(&self) -> bool {
        let lon = self.lon_degrees();
        let lat = self.lat_degrees();
        (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
    }
}

/// Great-circle distance in meters between two fixed-point coordinates.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat_degrees().to_radians();
    let lat2 = b.lat_degrees().to_radians();
    let delta_lat = (b.lat_degrees() - a.lat_degrees()).to_radians();
    let delta_lon = (b.lon_degrees() - a.lon_degrees()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat_degrees().to_radians();
    let lat2 = b.lat_degrees().to_radians();
    let delta_lon = (b.lon_degrees() - a.lon_degrees()).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    let deg = y.atan2(x).to_degrees();
    (deg + 360.0) % 360.0
}

/// Angle of the turn from an edge arriving at a junction with bearing
/// `entry` onto an edge leaving with bearing `exit`. 180 means straight
/// through, 0/360 a full U-turn, values above 180 turn right.
pub fn turn_angle(entry: f64, exit: f64) -> f64 {
    let angle = exit - entry + 180.0;
    let angle = angle % 360.0;
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_round_trip() {
        let c = Coordinate::from_degrees(4.3517, 50.8503);
        assert_eq!(c.lon, 4_351_700);
        assert_eq!(c.lat, 50_850_300);
        assert!((c.lon_degrees() - 4.3517).abs() < 1e-9);
    }

    #[test]
    fn haversine_one_millidegree_of_latitude() {
        let a = Coordinate::from_degrees(0.0, 0.0);
        let b = Coordinate::from_degrees(0.0, 0.001);
        let d = haversine_distance(a, b);
        // one millidegree of latitude is roughly 111 m
        assert!((d - 111.2).abs() < 1.0, "got {d}");
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = Coordinate::from_degrees(0.0, 0.0);
        let north = Coordinate::from_degrees(0.0, 0.001);
        let east = Coordinate::from_degrees(0.001, 0.0);
        assert!(bearing(origin, north).abs() < 0.5);
        assert!((bearing(origin, east) - 90.0).abs() < 0.5);
    }

    #[test]
    fn turn_angle_straight_and_uturn() {
        // continuing in the same direction is a straight turn
        assert!((turn_angle(90.0, 90.0) - 180.0).abs() < 1e-9);
        // coming back the way we came is a U-turn
        assert!(turn_angle(90.0, 270.0).abs() < 1e-9);
        // right turn from north to east
        assert!((turn_angle(0.0, 90.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_coordinate_detection() {
        assert!(Coordinate::from_degrees(4.35, 50.85).is_valid());
        assert!(!Coordinate::new(i32::MAX, 0).is_valid());
    }
}
