use nalgebra as na;

use crate::{Header, Time, Transform};

/// Pose of `child_frame_id` relative to `header.frame_id` at `header.stamp`.
///
/// Lookup results use the same type: the transform maps coordinates expressed
/// in `child_frame_id` into `header.frame_id`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: Transform,
}

impl TransformStamped {
    pub fn new(
        parent: impl Into<String>,
        child: impl Into<String>,
        stamp: Time,
        translation: na::Vector3<f64>,
        rotation: na::Quaternion<f64>,
    ) -> Self {
        Self {
            header: Header::new(parent, stamp),
            child_frame_id: child.into(),
            transform: Transform::new(translation, rotation),
        }
    }

    pub fn parent_frame_id(&self) -> &str {
        &self.header.frame_id
    }

    pub fn stamp(&self) -> Time {
        self.header.stamp
    }
}
