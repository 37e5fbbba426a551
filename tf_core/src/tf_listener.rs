use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    tf_broadcaster::TfBroadcaster, tf_error::LookupError, PoseStamped, TFMessage, TfBuffer, Time,
    TransformStamped,
};

const DEFAULT_QUEUE_SIZE: usize = 100;

/// Feeds a shared [`TfBuffer`] from in-process producers and answers lookups from it.
///
/// Like its ROS counterpart it listens on two streams, one for dynamic and one for static
/// transforms; producers get a [`TfBroadcaster`] for either. Each stream is drained by its
/// own tokio task, so `new` must be called from within a runtime. The tasks stop when the
/// listener is dropped.
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use tf_core::{TfListener, Time, TransformStamped};
///
/// let listener = TfListener::new();
/// let broadcaster = listener.broadcaster();
/// broadcaster
///     .send_transform(TransformStamped::new(
///         "base_link",
///         "camera",
///         Time::now(),
///         nalgebra::Vector3::new(0.5, 0.0, 0.2),
///         nalgebra::Quaternion::identity(),
///     ))
///     .await?;
///
/// let tf = listener
///     .lookup_transform("base_link", "camera", Time::ZERO, None)
///     .await?;
/// println!("{tf:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TfListener {
    buffer: Arc<TfBuffer>,
    dynamic_sender: mpsc::Sender<TFMessage>,
    static_sender: mpsc::Sender<TFMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl TfListener {
    /// Create a new TfListener
    #[track_caller]
    pub fn new() -> Self {
        Self::new_with_buffer(Arc::new(TfBuffer::new()), DEFAULT_QUEUE_SIZE)
    }

    #[track_caller]
    pub fn new_with_buffer(buffer: Arc<TfBuffer>, queue_size: usize) -> Self {
        let (dynamic_sender, dynamic_receiver) = mpsc::channel(queue_size);
        let (static_sender, static_receiver) = mpsc::channel(queue_size);
        let tasks = vec![
            tokio::spawn(drain(buffer.clone(), dynamic_receiver, false)),
            tokio::spawn(drain(buffer.clone(), static_receiver, true)),
        ];
        TfListener {
            buffer,
            dynamic_sender,
            static_sender,
            tasks,
        }
    }

    pub fn buffer(&self) -> &Arc<TfBuffer> {
        &self.buffer
    }

    pub fn broadcaster(&self) -> TfBroadcaster {
        TfBroadcaster::new(self.dynamic_sender.clone())
    }

    pub fn static_broadcaster(&self) -> TfBroadcaster {
        TfBroadcaster::new(self.static_sender.clone())
    }

    /// Looks up a transform within the tree at a given time, waiting up to `timeout`.
    pub async fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
        timeout: Option<Duration>,
    ) -> Result<TransformStamped, LookupError> {
        self.buffer
            .lookup_transform_async(target_frame, source_frame, time, timeout)
            .await
    }

    pub async fn transform_pose(
        &self,
        pose: &PoseStamped,
        target_frame: &str,
        timeout: Option<Duration>,
    ) -> Result<PoseStamped, LookupError> {
        self.buffer
            .transform_pose_async(pose, target_frame, timeout)
            .await
    }

    pub fn can_transform(&self, target_frame: &str, source_frame: &str, time: Time) -> bool {
        self.buffer.can_transform(target_frame, source_frame, time)
    }
}

impl Default for TfListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TfListener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn drain(buffer: Arc<TfBuffer>, mut receiver: mpsc::Receiver<TFMessage>, static_tf: bool) {
    while let Some(tfm) = receiver.recv().await {
        let refused = buffer.handle_incoming_transforms(tfm, static_tf);
        if !refused.is_empty() {
            log::debug!("{} transforms refused (static: {static_tf})", refused.len());
        }
    }
}
