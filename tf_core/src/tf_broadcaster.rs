use tokio::sync::mpsc;

use crate::{tf_error::BroadcastError, TFMessage, TransformStamped};

/// Hands transforms to a [`TfListener`](crate::TfListener) running in the same process.
///
/// Obtained from [`TfListener::broadcaster`](crate::TfListener::broadcaster) or
/// [`TfListener::static_broadcaster`](crate::TfListener::static_broadcaster); cheap to clone,
/// one per producer.
#[derive(Clone, Debug)]
pub struct TfBroadcaster {
    sender: mpsc::Sender<TFMessage>,
}

impl TfBroadcaster {
    pub(crate) fn new(sender: mpsc::Sender<TFMessage>) -> Self {
        Self { sender }
    }

    /// Broadcast transform
    pub async fn send_transform(&self, tf: TransformStamped) -> Result<(), BroadcastError> {
        self.send_transforms(vec![tf]).await
    }

    pub async fn send_transforms(&self, transforms: Vec<TransformStamped>) -> Result<(), BroadcastError> {
        self.sender
            .send(TFMessage { transforms })
            .await
            .map_err(|_| BroadcastError::ListenerGone)
    }

    /// Non blocking variant for producers outside an async context.
    pub fn try_send_transform(&self, tf: TransformStamped) -> Result<(), BroadcastError> {
        self.sender
            .try_send(TFMessage {
                transforms: vec![tf],
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => BroadcastError::Full,
                mpsc::error::TrySendError::Closed(_) => BroadcastError::ListenerGone,
            })
    }
}
