use nalgebra as na;

/// Translation plus rotation as carried on the wire. The rotation is not
/// guaranteed to be normalized until the buffer has accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub translation: na::Vector3<f64>,
    pub rotation: na::Quaternion<f64>,
}

impl Transform {
    pub fn new(translation: na::Vector3<f64>, rotation: na::Quaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(na::Vector3::zeros(), na::Quaternion::identity())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
