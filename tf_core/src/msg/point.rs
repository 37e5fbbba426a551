use nalgebra as na;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<na::Vector3<f64>> for Point {
    fn from(value: na::Vector3<f64>) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl From<Point> for na::Vector3<f64> {
    fn from(value: Point) -> Self {
        na::Vector3::new(value.x, value.y, value.z)
    }
}
