use na::geometry::{Isometry3, Translation3, UnitQuaternion};
use nalgebra as na;

use crate::{Header, Pose, PoseStamped, Time, Transform, TransformStamped};

/// Below this angle between two rotations slerp is numerically meaningless.
const SLERP_EPSILON: f64 = 1e-9;

pub fn isometry_from_transform(tf: &Transform) -> Isometry3<f64> {
    let trans = Translation3::from(tf.translation);
    let rot = UnitQuaternion::new_normalize(tf.rotation);
    Isometry3::from_parts(trans, rot)
}

pub fn isometry_to_transform(iso: &Isometry3<f64>) -> Transform {
    Transform {
        translation: iso.translation.vector,
        rotation: *iso.rotation.quaternion(),
    }
}

pub fn isometry_from_pose(pose: &Pose) -> Isometry3<f64> {
    let trans = Translation3::new(pose.position.x, pose.position.y, pose.position.z);
    let rot = UnitQuaternion::new_normalize(pose.orientation);
    Isometry3::from_parts(trans, rot)
}

pub fn isometry_to_pose(iso: &Isometry3<f64>) -> Pose {
    Pose {
        position: iso.translation.vector.into(),
        orientation: *iso.rotation.quaternion(),
    }
}

/// Pulls the rotation back onto the unit sphere after a product.
pub fn renormalized(iso: Isometry3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(
        iso.translation,
        UnitQuaternion::new_normalize(*iso.rotation.quaternion()),
    )
}

pub fn inverse(iso: &Isometry3<f64>) -> Isometry3<f64> {
    renormalized(iso.inverse())
}

///Chain multiple transforms together. The slice should be in order of desired transformations,
/// outermost frame first: `[a_from_b, b_from_c]` gives `a_from_c`.
pub fn chain_transforms(transforms: &[Isometry3<f64>]) -> Isometry3<f64> {
    transforms
        .iter()
        .fold(Isometry3::identity(), |acc, tf| renormalized(acc * tf))
}

/// Interpolates between `t1` (ratio 0) and `t2` (ratio 1).
///
/// Translation is linear, rotation follows the shortest arc.
pub fn interpolate(t1: &Isometry3<f64>, t2: &Isometry3<f64>, ratio: f64) -> Isometry3<f64> {
    let translation = t1.translation.vector.lerp(&t2.translation.vector, ratio);

    let r1 = t1.rotation;
    // q and -q are the same rotation; pick the one on r1's hemisphere
    let r2 = if r1.coords.dot(&t2.rotation.coords) < 0.0 {
        UnitQuaternion::new_unchecked(-t2.rotation.into_inner())
    } else {
        t2.rotation
    };
    let rotation = r1
        .try_slerp(&r2, ratio, SLERP_EPSILON)
        .unwrap_or_else(|| r1.nlerp(&r2, ratio));

    Isometry3::from_parts(Translation3::from(translation), rotation)
}

pub(crate) fn to_transform_stamped(
    tf: &Isometry3<f64>,
    from: &str,
    to: &str,
    stamp: Time,
) -> TransformStamped {
    TransformStamped {
        header: Header {
            frame_id: from.to_string(),
            stamp,
        },
        child_frame_id: to.to_string(),
        transform: isometry_to_transform(tf),
    }
}

/// Re-expresses `pose` using `tf`, which must map the pose's frame into `target_frame`.
pub fn do_transform_pose(pose: &PoseStamped, tf: &TransformStamped) -> PoseStamped {
    let iso = isometry_from_transform(&tf.transform) * isometry_from_pose(&pose.pose);
    PoseStamped {
        header: Header {
            frame_id: tf.header.frame_id.clone(),
            stamp: pose.header.stamp,
        },
        pose: isometry_to_pose(&renormalized(iso)),
    }
}
