//! Sensor-frame to world-frame conversions.
//!
//! The ranging sensor sits at a fixed offset in front of the vehicle origin
//! and reports polar readings (bearing, range) in its own frame.  These
//! helpers chain vehicle pose → sensor mount → reading to produce world
//! coordinates.
//!
//! # Example
//!
//! ```rust
//! use navpat_perception::transform::polar_to_world;
//! use navpat_types::{Point, Pose};
//!
//! let vehicle = Pose::new(0.0, 0.0, 0.0);
//! let p = polar_to_world(&vehicle, Point::new(1.0, 0.0), 0.0, 2.0);
//! assert!((p.x - 3.0).abs() < 1e-9);
//! ```

use navpat_types::{Landmark, Point, Pose};

/// World-frame pose of a sensor mounted at `mount` on a vehicle at `vehicle`.
pub fn sensor_pose(vehicle: &Pose, mount: Point) -> Pose {
    vehicle.combine(Pose::new(mount.x, mount.y, 0.0))
}

/// World position of a reading at `bearing`/`range` in the sensor frame.
pub fn polar_to_world(vehicle: &Pose, mount: Point, bearing: f64, range: f64) -> Point {
    let (sin, cos) = bearing.sin_cos();
    sensor_pose(vehicle, mount).transform_point(Point::new(cos * range, sin * range))
}

/// World position of a detected landmark.
pub fn landmark_to_world(vehicle: &Pose, mount: Point, landmark: &Landmark) -> Point {
    polar_to_world(vehicle, mount, landmark.bearing, landmark.range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn sensor_pose_follows_vehicle_heading() {
        let vehicle = Pose::new(1.0, 1.0, FRAC_PI_2);
        let sensor = sensor_pose(&vehicle, Point::new(2.0, 0.0));
        assert!((sensor.x - 1.0).abs() < 1e-9);
        assert!((sensor.y - 3.0).abs() < 1e-9);
        assert!((sensor.heading - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn reading_to_the_left_lands_left_of_sensor() {
        let vehicle = Pose::new(0.0, 0.0, 0.0);
        let p = polar_to_world(&vehicle, Point::new(1.78, 0.0), FRAC_PI_2, 1.0);
        assert!((p.x - 1.78).abs() < 1e-9);
        assert!((p.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn landmark_conversion_uses_bearing_and_range() {
        let vehicle = Pose::new(0.0, 2.5, 0.0);
        let lm = Landmark {
            bearing: 0.0,
            range: 3.22,
            angular_width: 0.05,
        };
        let p = landmark_to_world(&vehicle, Point::new(1.78, 0.0), &lm);
        assert!((p.x - 5.0).abs() < 1e-9);
        assert!((p.y - 2.5).abs() < 1e-9);
    }
}
