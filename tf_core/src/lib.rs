//! A time aware coordinate frame buffer in the spirit of the [ROS tf library](http://wiki.ros.org/tf).
//! It is intended for being used in robots to help keep track of multiple coordinate frames
//! that move relative to each other over time.
//!
//! Producers insert stamped parent -> child transforms; consumers ask for the transform between
//! any two frames at a given time. Samples are interpolated, never extrapolated, and a lookup can
//! wait (bounded by a timeout) for data that has not arrived yet.
//!
//! Example usage:
//!
//! ```
//! use std::time::Duration;
//!
//! use nalgebra::{Quaternion, Vector3};
//! use tf_core::{Time, TfBuffer, TransformStamped};
//!
//! let buffer = TfBuffer::new();
//! buffer
//!     .insert_static(TransformStamped::new(
//!         "base_link",
//!         "arm_end_link",
//!         Time::new(0, 0),
//!         Vector3::new(0.0, 0.0, 0.8),
//!         Quaternion::identity(),
//!     ))
//!     .unwrap();
//! buffer
//!     .insert_static(TransformStamped::new(
//!         "base_link",
//!         "camera",
//!         Time::new(0, 0),
//!         Vector3::new(0.3, 0.0, 0.5),
//!         Quaternion::identity(),
//!     ))
//!     .unwrap();
//!
//! let tf = buffer
//!     .lookup_transform("arm_end_link", "camera", Time::new(12, 0), Some(Duration::from_secs(1)))
//!     .unwrap();
//! assert!((tf.transform.translation.z + 0.3).abs() < 1e-9);
//! ```

mod msg;
mod tf_broadcaster;
mod tf_buffer;
mod tf_config;
mod tf_error;
mod tf_frame_lineage;
mod tf_individual_transform_chain;
mod tf_listener;
mod tf_lookup;
mod tf_signal;
pub mod transforms;

pub use msg::*;
pub use tf_broadcaster::TfBroadcaster;
pub use tf_buffer::TfBuffer;
pub use tf_config::TfBufferConfig;
pub use tf_error::{BroadcastError, ConfigError, InsertError, LookupError};
pub use tf_listener::TfListener;
