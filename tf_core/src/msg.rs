//! Plain value types exchanged with the buffer.
//!
//! The layout follows the ROS 2 `builtin_interfaces`, `std_msgs`, `geometry_msgs` and
//! `tf2_msgs` messages so a middleware binding only has to copy fields across.

mod header;
mod point;
mod pose;
mod tf_message;
mod time;
mod transform;
mod transform_stamped;

pub use header::*;
pub use point::*;
pub use pose::*;
pub use tf_message::*;
pub use time::*;
pub use transform::*;
pub use transform_stamped::*;
