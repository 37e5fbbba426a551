use crate::Time;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

impl Header {
    pub fn new(frame_id: impl Into<String>, stamp: Time) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}
