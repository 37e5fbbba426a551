use nalgebra as na;

use crate::{Header, Point};

#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub position: Point,
    pub orientation: na::Quaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Point::default(),
            orientation: na::Quaternion::identity(),
        }
    }
}

/// A pose expressed in `header.frame_id` at `header.stamp`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}
