use crate::TransformStamped;

/// A batch of transforms, the unit a producer usually observes at once.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TFMessage {
    pub transforms: Vec<TransformStamped>,
}

impl From<Vec<TransformStamped>> for TFMessage {
    fn from(transforms: Vec<TransformStamped>) -> Self {
        Self { transforms }
    }
}
