use std::path::Path;

use anyhow::{Context, Result};
use nalgebra as na;
use serde::Deserialize;
use tf_core::{Header, Point, Pose, PoseStamped, TfBufferConfig, Time, TransformStamped};

/// A robot description and the objects a camera reports, loaded from toml.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scene {
    #[serde(default)]
    pub(crate) buffer: TfBufferConfig,
    #[serde(default)]
    pub(crate) transforms: Vec<SceneTransform>,
    #[serde(default)]
    pub(crate) poses: Vec<ScenePose>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SceneTransform {
    pub(crate) parent: String,
    pub(crate) child: String,
    #[serde(default)]
    pub(crate) translation: [f64; 3],
    /// x, y, z, w
    #[serde(default = "identity_rotation")]
    pub(crate) rotation: [f64; 4],
    #[serde(default, rename = "static")]
    pub(crate) static_tf: bool,
    /// Linear velocity in the parent frame, m/s.
    #[serde(default)]
    pub(crate) velocity: [f64; 3],
    /// Rotation rate about the child's z axis, rad/s.
    #[serde(default)]
    pub(crate) yaw_rate: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScenePose {
    pub(crate) name: String,
    pub(crate) frame: String,
    pub(crate) position: [f64; 3],
}

fn identity_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Scene {
    pub(crate) fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("could not read scene file {}", path.display()))?;
        let scene: Scene = toml::from_str(&contents)
            .with_context(|| format!("could not parse scene file {}", path.display()))?;
        Ok(scene)
    }

    pub(crate) fn static_transforms(&self) -> Vec<TransformStamped> {
        let stamp = Time::now();
        self.transforms
            .iter()
            .filter(|tf| tf.static_tf)
            .map(|tf| tf.at(stamp, 0.0))
            .collect()
    }

    /// Dynamic transforms `elapsed` seconds after the scene started.
    pub(crate) fn dynamic_transforms(&self, stamp: Time, elapsed: f64) -> Vec<TransformStamped> {
        self.transforms
            .iter()
            .filter(|tf| !tf.static_tf)
            .map(|tf| tf.at(stamp, elapsed))
            .collect()
    }
}

impl SceneTransform {
    fn at(&self, stamp: Time, elapsed: f64) -> TransformStamped {
        let [x, y, z, w] = self.rotation;
        let base = na::UnitQuaternion::new_normalize(na::Quaternion::new(w, x, y, z));
        let yaw = na::UnitQuaternion::from_euler_angles(0.0, 0.0, self.yaw_rate * elapsed);
        let translation =
            na::Vector3::from(self.translation) + na::Vector3::from(self.velocity) * elapsed;
        TransformStamped::new(
            self.parent.as_str(),
            self.child.as_str(),
            stamp,
            translation,
            *(base * yaw).quaternion(),
        )
    }
}

impl ScenePose {
    pub(crate) fn detected_at(&self, stamp: Time) -> PoseStamped {
        let [x, y, z] = self.position;
        PoseStamped {
            header: Header::new(self.frame.as_str(), stamp),
            pose: Pose {
                position: Point::new(x, y, z),
                orientation: na::Quaternion::identity(),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    const SCENE: &str = r#"
[buffer]
default_timeout = 0.5

[[transforms]]
parent = "base_link"
child = "arm_end_link"
translation = [0.0, 0.0, 0.8]
yaw_rate = 1.0

[[transforms]]
parent = "base_link"
child = "camera"
translation = [0.3, 0.0, 0.5]
static = true

[[poses]]
name = "cup"
frame = "camera"
position = [1.0, 0.0, 0.0]
"#;

    #[test]
    fn test_parse_scene() {
        let scene: Scene = toml::from_str(SCENE).unwrap();
        assert_eq!(scene.buffer.default_timeout, std::time::Duration::from_millis(500));
        assert_eq!(scene.static_transforms().len(), 1);

        let moving = scene.dynamic_transforms(Time::new(3, 0), std::f64::consts::FRAC_PI_2);
        assert_eq!(moving.len(), 1);
        assert_eq!(moving[0].child_frame_id, "arm_end_link");
        let yaw = na::UnitQuaternion::from_quaternion(moving[0].transform.rotation);
        assert_relative_eq!(yaw.angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-9);

        let cup = scene.poses[0].detected_at(Time::new(3, 0));
        assert_eq!(cup.header.frame_id, "camera");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<Scene>("[[transforms]]\nparent = \"a\"\nchild = \"b\"\nspeed = 1.0\n").is_err());
    }
}
