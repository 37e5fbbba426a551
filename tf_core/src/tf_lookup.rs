//! Lookups that wait for late data.
//!
//! A lookup is pending until it composes, fails for a reason waiting cannot fix, or runs out
//! of time. Only [`LookupError::is_retryable`] failures keep it pending; the store is re-read
//! after every accepted insert and no lock is held while waiting.

use std::time::{Duration, Instant};

use crate::{
    tf_error::LookupError, tf_signal::WaitOutcome, transforms::do_transform_pose, PoseStamped,
    TfBuffer, Time, TransformStamped,
};

impl TfBuffer {
    /// Transform mapping `source_frame` coordinates into `target_frame` at `time`.
    ///
    /// Blocks the calling thread for at most `timeout` (the configured default when `None`)
    /// while the data needed is still in the future.
    pub fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
        timeout: Option<Duration>,
    ) -> Result<TransformStamped, LookupError> {
        let timeout = timeout.unwrap_or(self.config().default_timeout);
        let start = Instant::now();
        // a timeout too large to represent waits without a deadline
        let deadline = start.checked_add(timeout);
        loop {
            let seen = self.signal.version();
            let err = match self.compose_chain(source_frame, target_frame, time) {
                Ok(tf) => return Ok(tf),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };
            match self.signal.wait_for_change(seen, deadline) {
                WaitOutcome::Changed => {
                    log::trace!("retrying {source_frame} -> {target_frame} after insert");
                }
                WaitOutcome::TimedOut => {
                    return Err(timed_out(start, err, target_frame, source_frame));
                }
                WaitOutcome::Shutdown => return Err(LookupError::Shutdown),
            }
        }
    }

    /// Same as [`TfBuffer::lookup_transform`] but suspends the task instead of the thread.
    pub async fn lookup_transform_async(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: Time,
        timeout: Option<Duration>,
    ) -> Result<TransformStamped, LookupError> {
        let timeout = timeout.unwrap_or(self.config().default_timeout);
        let start = Instant::now();
        let deadline = start
            .checked_add(timeout)
            .map(tokio::time::Instant::from_std);
        let mut version = self.signal.subscribe();
        loop {
            version.borrow_and_update();
            let err = match self.compose_chain(source_frame, target_frame, time) {
                Ok(tf) => return Ok(tf),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };
            if self.signal.is_shut_down() {
                return Err(LookupError::Shutdown);
            }
            let changed = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, version.changed()).await,
                None => Ok(version.changed().await),
            };
            match changed {
                Ok(Ok(())) => {
                    log::trace!("retrying {source_frame} -> {target_frame} after insert");
                }
                // the sender lives as long as the buffer, which we borrow
                Ok(Err(_)) => return Err(LookupError::Shutdown),
                Err(_) => return Err(timed_out(start, err, target_frame, source_frame)),
            }
        }
    }

    /// Re-expresses `pose` in `target_frame` at the pose's own stamp.
    pub fn transform_pose(
        &self,
        pose: &PoseStamped,
        target_frame: &str,
        timeout: Option<Duration>,
    ) -> Result<PoseStamped, LookupError> {
        let tf = self.lookup_transform(
            target_frame,
            &pose.header.frame_id,
            pose.header.stamp,
            timeout,
        )?;
        Ok(do_transform_pose(pose, &tf))
    }

    pub async fn transform_pose_async(
        &self,
        pose: &PoseStamped,
        target_frame: &str,
        timeout: Option<Duration>,
    ) -> Result<PoseStamped, LookupError> {
        let tf = self
            .lookup_transform_async(
                target_frame,
                &pose.header.frame_id,
                pose.header.stamp,
                timeout,
            )
            .await?;
        Ok(do_transform_pose(pose, &tf))
    }

    /// Wakes every waiting lookup with [`LookupError::Shutdown`]. Later lookups still
    /// compose but no longer wait.
    pub fn shutdown(&self) {
        log::debug!("tf buffer shutting down");
        self.signal.shutdown();
    }
}

fn timed_out(start: Instant, last: LookupError, target: &str, source: &str) -> LookupError {
    let waited = start.elapsed();
    log::debug!("lookup {source} -> {target} timed out after {waited:?}");
    LookupError::Timeout {
        waited,
        last: Box::new(last),
    }
}
