use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write as _,
    sync::{Arc, RwLock},
    time::Duration,
};

use na::Isometry3;
use nalgebra as na;

use crate::{
    tf_config::TfBufferConfig,
    tf_error::{InsertError, LookupError},
    tf_frame_lineage::{LineageStep, TfFrameLineage},
    tf_signal::TfSignal,
    transforms::{chain_transforms, inverse, isometry_from_transform, renormalized, to_transform_stamped},
    TFMessage, Time, TransformStamped,
};

/// Walks deeper than this are treated as a loop.
const MAX_GRAPH_DEPTH: usize = 1000;

/// Rotations further than this from unit length are rejected rather than renormalized.
const QUATERNION_NORM_TOLERANCE: f64 = 0.01;

type SharedLineage = Arc<RwLock<TfFrameLineage>>;

/// Time aware store of coordinate frames.
///
/// Producers [`insert`](TfBuffer::insert) stamped transforms, consumers ask for the
/// transform between any two frames at a given time. The buffer is `Send + Sync`, share it
/// behind an `Arc`. Every frame has its own lock, so an insert only contends with lookups
/// walking through that frame.
#[derive(Debug)]
pub struct TfBuffer {
    frames: RwLock<HashMap<String, SharedLineage>>,
    config: TfBufferConfig,
    pub(crate) signal: TfSignal,
}

/// Ancestors of a frame at one time: `frames[0]` is the start, the last entry its root,
/// `steps[i]` leads from `frames[i]` to `frames[i + 1]`.
#[derive(Debug)]
struct AncestorWalk {
    frames: Vec<String>,
    steps: Vec<LineageStep>,
}

impl AncestorWalk {
    fn root(&self) -> &str {
        self.frames.last().map(String::as_str).unwrap_or_default()
    }

    /// Pose of the start frame in `frames[depth]`.
    fn pose_in_ancestor(&self, depth: usize) -> Result<Isometry3<f64>, LookupError> {
        let mut hops = Vec::with_capacity(depth);
        for step in &self.steps[..depth] {
            hops.push(step.transform.clone()?);
        }
        hops.reverse();
        Ok(chain_transforms(&hops))
    }

    fn newest_stamps(&self, depth: usize) -> impl Iterator<Item = Time> + '_ {
        self.steps[..depth].iter().filter_map(|step| step.newest)
    }
}

pub(crate) fn normalize_frame_id(frame_id: &str) -> &str {
    frame_id.strip_prefix('/').unwrap_or(frame_id)
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::new_with_config(TfBufferConfig::default())
    }

    pub fn new_with_duration(cache_duration: Duration) -> Self {
        Self::new_with_config(TfBufferConfig::default().with_edge_retention_duration(cache_duration))
    }

    pub fn new_with_config(config: TfBufferConfig) -> Self {
        TfBuffer {
            frames: RwLock::new(HashMap::new()),
            config,
            signal: TfSignal::new(),
        }
    }

    pub fn config(&self) -> &TfBufferConfig {
        &self.config
    }

    /// Adds a dynamic transform, the pose of `child_frame_id` in `header.frame_id`.
    pub fn insert(&self, transform: TransformStamped) -> Result<(), InsertError> {
        self.add_transform(&transform, false)
    }

    /// Adds a transform that holds at every time, replacing what was known about the child.
    pub fn insert_static(&self, transform: TransformStamped) -> Result<(), InsertError> {
        self.add_transform(&transform, true)
    }

    /// Inserts every transform of the batch it can, returning the ones refused.
    pub fn handle_incoming_transforms(
        &self,
        transforms: TFMessage,
        static_tf: bool,
    ) -> Vec<InsertError> {
        transforms
            .transforms
            .iter()
            .filter_map(|transform| self.add_transform(transform, static_tf).err())
            .collect()
    }

    fn add_transform(&self, transform: &TransformStamped, static_tf: bool) -> Result<(), InsertError> {
        let result = self.try_add_transform(transform, static_tf);
        match &result {
            Ok(()) => self.signal.notify(),
            Err(err) => log::warn!("ignoring transform: {err}"),
        }
        result
    }

    fn try_add_transform(&self, transform: &TransformStamped, static_tf: bool) -> Result<(), InsertError> {
        let child = normalize_frame_id(&transform.child_frame_id);
        let parent = normalize_frame_id(transform.parent_frame_id());
        let iso = validate(child, parent, transform)?;
        let stamp = transform.stamp();

        let lineage = self.frame_entry(child)?;
        {
            let mut lineage = lineage.write().map_err(|_| InsertError::CouldNotAcquireLock)?;
            if static_tf {
                lineage.set_static(parent, stamp, iso);
            } else {
                lineage.insert(
                    parent,
                    stamp,
                    iso,
                    self.config.reorder_tolerance,
                    self.config.edge_retention_duration,
                )?;
            }
        }
        self.frame_entry(parent)?;
        Ok(())
    }

    /// The lineage of `frame_id`, created on first sight.
    fn frame_entry(&self, frame_id: &str) -> Result<SharedLineage, InsertError> {
        if let Some(lineage) = self.lineage(frame_id).map_err(|_| InsertError::CouldNotAcquireLock)? {
            return Ok(lineage);
        }
        let mut frames = self.frames.write().map_err(|_| InsertError::CouldNotAcquireLock)?;
        Ok(frames
            .entry(frame_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(TfFrameLineage::new(frame_id))))
            .clone())
    }

    fn lineage(&self, frame_id: &str) -> Result<Option<SharedLineage>, LookupError> {
        let frames = self.frames.read().map_err(|_| LookupError::CouldNotAcquireLock)?;
        Ok(frames.get(frame_id).cloned())
    }

    pub fn has_frame(&self, frame_id: &str) -> bool {
        self.frames
            .read()
            .map(|frames| frames.contains_key(normalize_frame_id(frame_id)))
            .unwrap_or(false)
    }

    /// Every frame seen so far, sorted.
    pub fn frames(&self) -> Vec<String> {
        let mut frames: Vec<String> = self
            .frames
            .read()
            .map(|frames| frames.keys().cloned().collect())
            .unwrap_or_default();
        frames.sort();
        frames
    }

    /// Parent of `frame_id` at `time` (`Time::ZERO` for the newest), `None` for roots.
    pub fn parent_of(&self, frame_id: &str, time: Time) -> Result<Option<String>, LookupError> {
        let frame_id = normalize_frame_id(frame_id);
        let lineage = self
            .lineage(frame_id)?
            .ok_or_else(|| LookupError::UnknownFrame(frame_id.to_string()))?;
        let lineage = lineage.read().map_err(|_| LookupError::CouldNotAcquireLock)?;
        let time = (!time.is_zero()).then_some(time);
        Ok(lineage.step(time).map(|step| step.parent))
    }

    /// Forgets every frame.
    pub fn clear(&self) {
        if let Ok(mut frames) = self.frames.write() {
            frames.clear();
        }
    }

    /// One line per parent span, sorted by parent then child.
    pub fn all_frames_as_string(&self) -> String {
        let lineages: Vec<SharedLineage> = self
            .frames
            .read()
            .map(|frames| frames.values().cloned().collect())
            .unwrap_or_default();

        let mut lines = BTreeMap::new();
        for lineage in lineages {
            let Ok(lineage) = lineage.read() else {
                continue;
            };
            for span in lineage.spans() {
                let Some(chain) = lineage.edge(&span.parent) else {
                    continue;
                };
                let frame_id = lineage.frame_id();
                let line = if chain.is_static() {
                    format!("Frame {frame_id} exists with parent {} (static).", span.parent)
                } else {
                    format!(
                        "Frame {frame_id} exists with parent {} from {} to {} ({} samples).",
                        span.parent,
                        span.start,
                        span.end,
                        chain.len()
                    )
                };
                lines.insert((span.parent.clone(), frame_id.to_string(), span.start), line);
            }
        }

        let mut out = String::new();
        for line in lines.values() {
            let _ = writeln!(out, "{line}");
        }
        out
    }

    fn walk_to_root(&self, frame_id: &str, time: Option<Time>) -> Result<AncestorWalk, LookupError> {
        let mut walk = AncestorWalk {
            frames: vec![frame_id.to_string()],
            steps: Vec::new(),
        };
        loop {
            let current = walk.frames.last().map(String::as_str).unwrap_or(frame_id);
            let Some(lineage) = self.lineage(current)? else {
                break;
            };
            let step = {
                let lineage = lineage.read().map_err(|_| LookupError::CouldNotAcquireLock)?;
                lineage.step(time)
            };
            let Some(step) = step else {
                break;
            };
            if walk.frames.contains(&step.parent) || walk.steps.len() >= MAX_GRAPH_DEPTH {
                walk.frames.push(step.parent);
                return Err(LookupError::LoopDetected(frame_id.to_string(), walk.frames));
            }
            walk.frames.push(step.parent.clone());
            walk.steps.push(step);
        }
        Ok(walk)
    }

    /// Walks both frames to their roots and finds the first shared ancestor.
    ///
    /// Returns the two walks and the depth of the shared frame in each of them.
    fn common_ancestor(
        &self,
        from: &str,
        to: &str,
        time: Option<Time>,
    ) -> Result<(AncestorWalk, usize, AncestorWalk, usize), LookupError> {
        let from_walk = self.walk_to_root(from, time)?;
        let to_walk = self.walk_to_root(to, time)?;

        let from_depths: HashMap<&str, usize> = from_walk
            .frames
            .iter()
            .enumerate()
            .map(|(depth, frame)| (frame.as_str(), depth))
            .collect();
        let common = to_walk
            .frames
            .iter()
            .enumerate()
            .find_map(|(to_depth, frame)| from_depths.get(frame.as_str()).map(|d| (*d, to_depth)));

        match common {
            Some((from_depth, to_depth)) => Ok((from_walk, from_depth, to_walk, to_depth)),
            None => Err(LookupError::UnconnectedFrames {
                from: from.to_string(),
                to: to.to_string(),
                from_root: from_walk.root().to_string(),
                to_root: to_walk.root().to_string(),
            }),
        }
    }

    fn known_frame<'a>(&self, frame_id: &'a str) -> Result<&'a str, LookupError> {
        let frame_id = normalize_frame_id(frame_id);
        if self.has_frame(frame_id) {
            Ok(frame_id)
        } else {
            Err(LookupError::UnknownFrame(frame_id.to_string()))
        }
    }

    /// Latest time at which every edge between the two frames has data.
    ///
    /// `Time::ZERO` when the path is made of static edges only.
    pub fn latest_common_time(&self, from: &str, to: &str) -> Result<Time, LookupError> {
        let from = self.known_frame(from)?;
        let to = self.known_frame(to)?;
        if from == to {
            return Ok(Time::ZERO);
        }
        let (from_walk, from_depth, to_walk, to_depth) = self.common_ancestor(from, to, None)?;
        Ok(from_walk
            .newest_stamps(from_depth)
            .chain(to_walk.newest_stamps(to_depth))
            .min()
            .unwrap_or(Time::ZERO))
    }

    /// Transform mapping coordinates in `from` into `to` at `time`, which is also the pose
    /// of `from` expressed in `to`. `Time::ZERO` asks for the latest common time.
    ///
    /// Never waits; see [`TfBuffer::lookup_transform`] for the blocking variant.
    pub fn compose_chain(&self, from: &str, to: &str, time: Time) -> Result<TransformStamped, LookupError> {
        let from = self.known_frame(from)?;
        let to = self.known_frame(to)?;
        if from == to {
            return Ok(to_transform_stamped(&Isometry3::identity(), to, from, time));
        }

        let time = if time.is_zero() {
            self.latest_common_time(from, to)?
        } else {
            time
        };

        let (from_walk, from_depth, to_walk, to_depth) =
            self.common_ancestor(from, to, Some(time))?;
        let common_from = from_walk.pose_in_ancestor(from_depth)?;
        let common_to = to_walk.pose_in_ancestor(to_depth)?;
        let to_from = renormalized(inverse(&common_to) * common_from);
        Ok(to_transform_stamped(&to_from, to, from, time))
    }

    /// Non blocking probe: would a lookup succeed right now.
    pub fn can_transform(&self, target_frame: &str, source_frame: &str, time: Time) -> bool {
        self.compose_chain(source_frame, target_frame, time).is_ok()
    }

    /// Transform from `source_frame` at `source_time` into `target_frame` at `target_time`,
    /// going through `fixed_frame`, which is assumed not to move between the two times.
    pub fn lookup_transform_with_time_travel(
        &self,
        target_frame: &str,
        target_time: Time,
        source_frame: &str,
        source_time: Time,
        fixed_frame: &str,
    ) -> Result<TransformStamped, LookupError> {
        let fixed_source = self.compose_chain(source_frame, fixed_frame, source_time)?;
        let target_fixed = self.compose_chain(fixed_frame, target_frame, target_time)?;
        let result = chain_transforms(&[
            isometry_from_transform(&target_fixed.transform),
            isometry_from_transform(&fixed_source.transform),
        ]);
        Ok(to_transform_stamped(
            &result,
            normalize_frame_id(target_frame),
            normalize_frame_id(source_frame),
            target_fixed.header.stamp,
        ))
    }
}

/// Checks a transform before it touches the store, returning its normalized isometry.
fn validate(child: &str, parent: &str, transform: &TransformStamped) -> Result<Isometry3<f64>, InsertError> {
    if child.is_empty() || parent.is_empty() {
        return Err(InsertError::EmptyFrameId {
            child: child.to_string(),
            parent: parent.to_string(),
        });
    }
    if child == parent {
        return Err(InsertError::SelfTransform(child.to_string()));
    }
    let tf = &transform.transform;
    let finite = tf.translation.iter().all(|v| v.is_finite())
        && tf.rotation.coords.iter().all(|v| v.is_finite());
    if !finite {
        return Err(InsertError::NonFinite {
            child: child.to_string(),
            parent: parent.to_string(),
        });
    }
    let norm_squared = tf.rotation.norm_squared();
    if (norm_squared - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
        return Err(InsertError::InvalidRotation {
            child: child.to_string(),
            parent: parent.to_string(),
            norm_squared,
        });
    }
    Ok(isometry_from_transform(tf))
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use nalgebra::{Quaternion, UnitQuaternion, Vector3};

    use super::*;

    const PARENT: &str = "parent";
    const CHILD0: &str = "child0";
    const CHILD1: &str = "child1";

    fn tf(parent: &str, child: &str, stamp: Time, translation: Vector3<f64>) -> TransformStamped {
        TransformStamped::new(parent, child, stamp, translation, Quaternion::identity())
    }

    fn secs(secs: f64) -> Time {
        Time::from_sec_f64(secs)
    }

    fn translation_of(res: Result<TransformStamped, LookupError>) -> Vector3<f64> {
        res.unwrap().transform.translation
    }

    /// This function builds a tree consisting of the following items:
    /// * a world coordinate frame
    /// * an item in the world frame at (1,0,0)
    /// * base_link of a robot starting at (0,0,0) and progressing at (0,t,0) where t is time in seconds
    /// * a camera which is (0.5, 0, 0) from the base_link
    fn build_test_tree(buffer: &TfBuffer, time: f64) {
        let stamp = secs(time);
        buffer
            .insert_static(tf("world", "item", stamp, Vector3::new(1.0, 0.0, 0.0)))
            .unwrap();
        buffer
            .insert(tf("world", "base_link", stamp, Vector3::new(0.0, time, 0.0)))
            .unwrap();
        buffer
            .insert_static(tf("base_link", "camera", stamp, Vector3::new(0.5, 0.0, 0.0)))
            .unwrap();
    }

    /// Tests a basic lookup
    #[test]
    fn test_basic_tf_lookup() {
        let tf_buffer = TfBuffer::new();
        build_test_tree(&tf_buffer, 0f64);
        let res = tf_buffer.compose_chain("item", "camera", Time::ZERO).unwrap();
        assert_eq!(res.header.frame_id, "camera");
        assert_eq!(res.child_frame_id, "item");
        assert_eq!(res.header.stamp, Time::ZERO);
        assert_relative_eq!(res.transform.translation, Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(res.transform.rotation, Quaternion::identity(), epsilon = 1e-9);
    }

    /// Tests an interpolated lookup.
    #[test]
    fn test_basic_tf_interpolation() {
        let tf_buffer = TfBuffer::new();
        build_test_tree(&tf_buffer, 0f64);
        build_test_tree(&tf_buffer, 1f64);
        let res = tf_buffer.lookup_transform("camera", "item", secs(0.7), None).unwrap();
        assert_eq!(res.header.stamp, secs(0.7));
        assert_relative_eq!(res.transform.translation, Vector3::new(0.5, -0.7, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_basic_tf_time_travel() {
        let tf_buffer = TfBuffer::new();
        build_test_tree(&tf_buffer, 0f64);
        build_test_tree(&tf_buffer, 1f64);
        let res = tf_buffer
            .lookup_transform_with_time_travel("camera", secs(0.4), "camera", secs(0.7), "item")
            .unwrap();
        assert_eq!(res.header.frame_id, "camera");
        assert_eq!(res.header.stamp, secs(0.4));
        assert_relative_eq!(res.transform.translation, Vector3::new(0.0, 0.3, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_add_transform() {
        let tf_buffer = TfBuffer::new();
        tf_buffer
            .insert(tf(PARENT, CHILD0, Time::new(0, 0), Vector3::zeros()))
            .unwrap();
        assert_eq!(tf_buffer.frames(), vec![CHILD0.to_string(), PARENT.to_string()]);
        assert!(tf_buffer.has_frame(PARENT));
        assert!(tf_buffer.has_frame("/child0"));
        assert!(!tf_buffer.has_frame(CHILD1));

        tf_buffer
            .insert(tf(PARENT, CHILD0, Time::new(1, 0), Vector3::zeros()))
            .unwrap();
        tf_buffer
            .insert(tf(PARENT, CHILD1, Time::new(1, 0), Vector3::zeros()))
            .unwrap();
        assert_eq!(tf_buffer.frames().len(), 3);

        let child0 = tf_buffer.lineage(CHILD0).unwrap().unwrap();
        assert_eq!(child0.read().unwrap().edge(PARENT).unwrap().len(), 2);
        let child1 = tf_buffer.lineage(CHILD1).unwrap().unwrap();
        assert_eq!(child1.read().unwrap().edge(PARENT).unwrap().len(), 1);
        assert!(tf_buffer.lineage(PARENT).unwrap().unwrap().read().unwrap().is_root());

        assert_eq!(tf_buffer.parent_of(CHILD0, Time::ZERO), Ok(Some(PARENT.to_string())));
        assert_eq!(tf_buffer.parent_of(PARENT, Time::ZERO), Ok(None));
        assert!(matches!(
            tf_buffer.parent_of("ghost", Time::ZERO),
            Err(LookupError::UnknownFrame(_))
        ));
    }

    #[test]
    fn test_cache_duration() {
        let tf_buffer = TfBuffer::new_with_duration(Duration::from_secs(1));
        for sec in 0..3 {
            tf_buffer
                .insert(tf(PARENT, CHILD0, Time::new(sec, 0), Vector3::new(sec.into(), 0.0, 0.0)))
                .unwrap();
        }
        let lineage = tf_buffer.lineage(CHILD0).unwrap().unwrap();
        {
            let lineage = lineage.read().unwrap();
            let chain = lineage.edge(PARENT).unwrap();
            assert_eq!(chain.len(), 2);
            assert_eq!(chain.transform_chain[0].stamp, Time::new(1, 0));
            assert_eq!(chain.newest_stamp(), Some(Time::new(2, 0)));
        }
        assert!(matches!(
            tf_buffer.compose_chain(CHILD0, PARENT, secs(0.5)),
            Err(LookupError::ExtrapolationIntoPast { .. })
        ));
        assert_relative_eq!(
            translation_of(tf_buffer.compose_chain(CHILD0, PARENT, secs(1.5))).x,
            1.5,
            epsilon = 1e-9
        );
    }

    /// Tests a case in which the tree structure changes dynamically
    /// time 1-2(sec): [base] -> [camera1] -> [marker] -> [target]
    /// time 3-4(sec): [base] -> [camera2] -> [marker] -> [target]
    /// time 5-6(sec): [base] -> [camera1] -> [marker] -> [target]
    #[test]
    fn test_dynamic_tree() {
        let tf_buffer = TfBuffer::new();
        let lookup = |sec: f64| tf_buffer.lookup_transform("base", "target", secs(sec), Some(Duration::ZERO));

        tf_buffer
            .insert_static(tf("base", "camera1", Time::new(1, 0), Vector3::new(1.0, 0.0, 0.0)))
            .unwrap();
        tf_buffer
            .insert_static(TransformStamped::new(
                "base",
                "camera2",
                Time::new(1, 0),
                Vector3::new(-1.0, 0.0, 0.0),
                Quaternion::new(0.0, 0.0, 0.0, 1.0),
            ))
            .unwrap();
        tf_buffer
            .insert_static(tf("marker", "target", Time::new(1, 0), Vector3::new(-0.5, 0.0, 0.0)))
            .unwrap();

        tf_buffer
            .insert(tf("camera1", "marker", Time::new(1, 0), Vector3::new(1.0, 1.0, 0.0)))
            .unwrap();
        tf_buffer
            .insert(tf("camera1", "marker", Time::new(2, 0), Vector3::new(1.0, -1.0, 0.0)))
            .unwrap();
        tf_buffer
            .insert(tf("camera2", "marker", Time::new(3, 0), Vector3::new(1.0, 1.0, 0.0)))
            .unwrap();
        tf_buffer
            .insert(tf("camera2", "marker", Time::new(4, 0), Vector3::new(1.0, -1.0, 0.0)))
            .unwrap();

        assert_relative_eq!(translation_of(lookup(1.0)), Vector3::new(1.5, 1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(translation_of(lookup(1.5)), Vector3::new(1.5, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(translation_of(lookup(2.0)), Vector3::new(1.5, -1.0, 0.0), epsilon = 1e-9);
        assert!(lookup(2.5).is_err());
        assert_relative_eq!(translation_of(lookup(3.0)), Vector3::new(-1.5, -1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(translation_of(lookup(3.5)), Vector3::new(-1.5, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(translation_of(lookup(4.0)), Vector3::new(-1.5, 1.0, 0.0), epsilon = 1e-9);
        assert!(lookup(4.5).is_err());

        tf_buffer
            .insert(tf("camera1", "marker", Time::new(5, 0), Vector3::new(0.5, 1.0, 0.0)))
            .unwrap();
        tf_buffer
            .insert(tf("camera1", "marker", Time::new(6, 0), Vector3::new(0.5, -1.0, 0.0)))
            .unwrap();

        assert_relative_eq!(translation_of(lookup(5.0)), Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(translation_of(lookup(5.5)), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(translation_of(lookup(6.0)), Vector3::new(1.0, -1.0, 0.0), epsilon = 1e-9);
        // the camera2 window is still there for historical lookups
        assert_relative_eq!(translation_of(lookup(3.5)), Vector3::new(-1.5, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_reparenting_keeps_both_windows() {
        let tf_buffer = TfBuffer::new();
        tf_buffer.insert_static(tf("map", "table", Time::ZERO, Vector3::new(5.0, 0.0, 0.0))).unwrap();
        tf_buffer.insert_static(tf("map", "gripper", Time::ZERO, Vector3::new(0.0, 5.0, 0.0))).unwrap();
        tf_buffer.insert(tf("table", "cup", Time::new(1, 0), Vector3::new(1.0, 0.0, 0.0))).unwrap();
        tf_buffer.insert(tf("gripper", "cup", Time::new(2, 0), Vector3::new(0.0, 0.0, 1.0))).unwrap();

        assert_eq!(tf_buffer.parent_of("cup", Time::new(1, 0)), Ok(Some("table".to_string())));
        assert_eq!(tf_buffer.parent_of("cup", Time::new(2, 0)), Ok(Some("gripper".to_string())));
        assert_relative_eq!(
            translation_of(tf_buffer.compose_chain("cup", "map", Time::new(1, 0))),
            Vector3::new(6.0, 0.0, 0.0),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            translation_of(tf_buffer.compose_chain("cup", "map", Time::new(2, 0))),
            Vector3::new(0.0, 5.0, 1.0),
            epsilon = 1e-9
        );

        // the table cannot claim the cup back while the gripper holds it
        tf_buffer.insert(tf("gripper", "cup", Time::new(4, 0), Vector3::new(0.0, 0.0, 1.0))).unwrap();
        assert!(matches!(
            tf_buffer.insert(tf("table", "cup", Time::new(3, 0), Vector3::zeros())),
            Err(InsertError::ParentConflict { .. })
        ));
    }

    #[test]
    fn test_interpolation_midpoint() {
        let tf_buffer = TfBuffer::new();
        tf_buffer.insert(tf("a", "b", Time::new(0, 0), Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("a", "b", Time::new(2, 0), Vector3::new(2.0, 0.0, 0.0))).unwrap();
        assert_relative_eq!(
            translation_of(tf_buffer.compose_chain("b", "a", Time::new(1, 0))),
            Vector3::new(1.0, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rotation_interpolation_through_chain() {
        let tf_buffer = TfBuffer::new();
        let quarter = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        tf_buffer.insert(tf("a", "b", Time::new(0, 0), Vector3::zeros())).unwrap();
        tf_buffer
            .insert(TransformStamped::new("a", "b", Time::new(1, 0), Vector3::zeros(), *quarter.quaternion()))
            .unwrap();
        let res = tf_buffer.compose_chain("b", "a", secs(0.5)).unwrap();
        let rotation = isometry_from_transform(&res.transform).rotation;
        assert_relative_eq!(rotation.angle(), std::f64::consts::FRAC_PI_4, epsilon = 1e-9);
    }

    #[test]
    fn test_extrapolation_is_refused() {
        let tf_buffer = TfBuffer::new();
        tf_buffer.insert(tf("a", "b", Time::new(1, 0), Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("a", "b", Time::new(2, 0), Vector3::zeros())).unwrap();
        assert!(matches!(
            tf_buffer.compose_chain("b", "a", secs(0.5)),
            Err(LookupError::ExtrapolationIntoPast { requested, oldest, .. })
                if requested == secs(0.5) && oldest == Time::new(1, 0)
        ));
        assert!(matches!(
            tf_buffer.compose_chain("b", "a", Time::new(3, 0)),
            Err(LookupError::ExtrapolationIntoFuture { newest, .. }) if newest == Time::new(2, 0)
        ));
        assert!(!tf_buffer.can_transform("a", "b", Time::new(3, 0)));
        assert!(tf_buffer.can_transform("a", "b", secs(1.5)));
    }

    #[test]
    fn test_unknown_and_unconnected() {
        let tf_buffer = TfBuffer::new();
        tf_buffer.insert(tf("world", "robot", Time::new(1, 0), Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("odom", "wheel", Time::new(1, 0), Vector3::zeros())).unwrap();

        assert_eq!(
            tf_buffer.compose_chain("robot", "ghost", Time::new(1, 0)),
            Err(LookupError::UnknownFrame("ghost".to_string()))
        );
        assert_eq!(
            tf_buffer.compose_chain("robot", "wheel", Time::new(1, 0)),
            Err(LookupError::UnconnectedFrames {
                from: "robot".to_string(),
                to: "wheel".to_string(),
                from_root: "world".to_string(),
                to_root: "odom".to_string(),
            })
        );
    }

    #[test]
    fn test_same_frame_is_identity() {
        let tf_buffer = TfBuffer::new();
        tf_buffer.insert(tf("a", "b", Time::new(1, 0), Vector3::new(3.0, 0.0, 0.0))).unwrap();
        for frame in ["a", "b"] {
            let res = tf_buffer.compose_chain(frame, frame, Time::new(1, 0)).unwrap();
            assert_relative_eq!(res.transform.translation, Vector3::zeros());
            assert_relative_eq!(res.transform.rotation, Quaternion::identity());
        }
    }

    #[test]
    fn test_inverse_consistency() {
        let tf_buffer = TfBuffer::new();
        let twist = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        for sec in [1, 2] {
            tf_buffer
                .insert(TransformStamped::new(
                    "world",
                    "base",
                    Time::new(sec, 0),
                    Vector3::new(f64::from(sec), 2.0, 0.0),
                    *twist.quaternion(),
                ))
                .unwrap();
        }
        tf_buffer
            .insert_static(TransformStamped::new(
                "base",
                "arm",
                Time::ZERO,
                Vector3::new(0.0, 0.2, 0.9),
                *UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0).quaternion(),
            ))
            .unwrap();
        tf_buffer
            .insert_static(tf("world", "shelf", Time::ZERO, Vector3::new(-3.0, 1.0, 0.0)))
            .unwrap();

        let t = secs(1.25);
        let there = tf_buffer.compose_chain("arm", "shelf", t).unwrap();
        let back = tf_buffer.compose_chain("shelf", "arm", t).unwrap();
        let round_trip = isometry_from_transform(&there.transform) * isometry_from_transform(&back.transform);
        assert_relative_eq!(round_trip, Isometry3::identity(), epsilon = 1e-9);
        assert_relative_eq!(there.transform.rotation.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_composition_matches_precomposed_edge() {
        let a_b = TransformStamped::new(
            "a",
            "b",
            Time::new(1, 0),
            Vector3::new(1.0, 2.0, 3.0),
            *UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3).quaternion(),
        );
        let b_c = TransformStamped::new(
            "b",
            "c",
            Time::new(1, 0),
            Vector3::new(-0.5, 0.0, 0.25),
            *UnitQuaternion::from_euler_angles(-0.4, 0.0, 0.9).quaternion(),
        );
        let chained = TfBuffer::new();
        chained.insert(a_b.clone()).unwrap();
        chained.insert(b_c.clone()).unwrap();

        let a_c = chain_transforms(&[
            isometry_from_transform(&a_b.transform),
            isometry_from_transform(&b_c.transform),
        ]);
        let direct = TfBuffer::new();
        direct
            .insert(to_transform_stamped(&a_c, "a", "c", Time::new(1, 0)))
            .unwrap();

        let via_b = chained.compose_chain("c", "a", Time::new(1, 0)).unwrap();
        let straight = direct.compose_chain("c", "a", Time::new(1, 0)).unwrap();
        assert_relative_eq!(
            isometry_from_transform(&via_b.transform),
            isometry_from_transform(&straight.transform),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_latest_common_time() {
        let tf_buffer = TfBuffer::new();
        for sec in 1..=5 {
            tf_buffer.insert(tf("world", "base", Time::new(sec, 0), Vector3::new(sec.into(), 0.0, 0.0))).unwrap();
        }
        for sec in 1..=3 {
            tf_buffer.insert(tf("base", "arm", Time::new(sec, 0), Vector3::new(0.0, sec.into(), 0.0))).unwrap();
        }
        tf_buffer.insert_static(tf("arm", "tool", Time::ZERO, Vector3::new(0.0, 0.0, 1.0))).unwrap();

        assert_eq!(tf_buffer.latest_common_time("tool", "world"), Ok(Time::new(3, 0)));
        assert_eq!(tf_buffer.latest_common_time("tool", "arm"), Ok(Time::ZERO));
        let res = tf_buffer.compose_chain("tool", "world", Time::ZERO).unwrap();
        assert_eq!(res.header.stamp, Time::new(3, 0));
        assert_relative_eq!(res.transform.translation, Vector3::new(3.0, 3.0, 1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_reorder_tolerance() {
        let config = TfBufferConfig::default().with_reorder_tolerance(Duration::from_millis(500));
        let tf_buffer = TfBuffer::new_with_config(config);
        tf_buffer.insert(tf("a", "b", Time::new(2, 0), Vector3::new(2.0, 0.0, 0.0))).unwrap();
        tf_buffer.insert(tf("a", "b", secs(1.6), Vector3::new(1.6, 0.0, 0.0))).unwrap();
        assert!(matches!(
            tf_buffer.insert(tf("a", "b", Time::new(1, 0), Vector3::zeros())),
            Err(InsertError::OutOfOrderBeyondTolerance { stamp, newest, .. })
                if stamp == Time::new(1, 0) && newest == Time::new(2, 0)
        ));
        assert_relative_eq!(
            translation_of(tf_buffer.compose_chain("b", "a", secs(1.8))).x,
            1.8,
            epsilon = 1e-9
        );

        let strict = TfBuffer::new();
        strict.insert(tf("a", "b", Time::new(2, 0), Vector3::zeros())).unwrap();
        assert!(strict.insert(tf("a", "b", secs(1.9), Vector3::zeros())).is_err());
    }

    #[test]
    fn test_invalid_transforms_are_rejected() {
        let tf_buffer = TfBuffer::new();
        let stamp = Time::new(1, 0);
        assert!(matches!(
            tf_buffer.insert(tf("", "b", stamp, Vector3::zeros())),
            Err(InsertError::EmptyFrameId { .. })
        ));
        assert_eq!(
            tf_buffer.insert(tf("/a", "a", stamp, Vector3::zeros())),
            Err(InsertError::SelfTransform("a".to_string()))
        );
        assert!(matches!(
            tf_buffer.insert(tf("a", "b", stamp, Vector3::new(f64::NAN, 0.0, 0.0))),
            Err(InsertError::NonFinite { .. })
        ));
        assert!(matches!(
            tf_buffer.insert(TransformStamped::new("a", "b", stamp, Vector3::zeros(), Quaternion::new(2.0, 0.0, 0.0, 0.0))),
            Err(InsertError::InvalidRotation { .. })
        ));
        assert!(tf_buffer.frames().is_empty());

        // slightly off unit length is renormalized
        tf_buffer
            .insert(TransformStamped::new("/a", "b", stamp, Vector3::zeros(), Quaternion::new(1.004, 0.0, 0.0, 0.0)))
            .unwrap();
        let res = tf_buffer.compose_chain("b", "/a", stamp).unwrap();
        assert_relative_eq!(res.transform.rotation.norm(), 1.0, epsilon = 1e-12);
        assert_eq!(res.header.frame_id, "a");
    }

    #[test]
    fn test_loop_detected() {
        let tf_buffer = TfBuffer::new();
        let stamp = Time::new(1, 0);
        tf_buffer.insert(tf("a", "b", stamp, Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("b", "a", stamp, Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("a", "c", stamp, Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("x", "y", stamp, Vector3::zeros())).unwrap();
        assert!(matches!(
            tf_buffer.compose_chain("c", "y", stamp),
            Err(LookupError::LoopDetected(frame, _)) if frame == "c"
        ));
    }

    #[test]
    fn test_handle_incoming_transforms() {
        let tf_buffer = TfBuffer::new();
        let refused = tf_buffer.handle_incoming_transforms(
            TFMessage::from(vec![
                tf("world", "a", Time::new(1, 0), Vector3::zeros()),
                tf("world", "world", Time::new(1, 0), Vector3::zeros()),
                tf("a", "b", Time::new(1, 0), Vector3::zeros()),
            ]),
            false,
        );
        assert_eq!(refused, vec![InsertError::SelfTransform("world".to_string())]);
        assert!(tf_buffer.can_transform("world", "b", Time::new(1, 0)));
    }

    #[test]
    fn test_all_frames_as_string_and_clear() {
        let tf_buffer = TfBuffer::new();
        tf_buffer.insert(tf("world", "base", Time::new(1, 0), Vector3::zeros())).unwrap();
        tf_buffer.insert(tf("world", "base", Time::new(2, 0), Vector3::zeros())).unwrap();
        tf_buffer.insert_static(tf("base", "camera", Time::ZERO, Vector3::zeros())).unwrap();

        let frames = tf_buffer.all_frames_as_string();
        assert_eq!(
            frames,
            "Frame camera exists with parent base (static).\n\
             Frame base exists with parent world from 1.000000000 to 2.000000000 (2 samples).\n"
        );

        tf_buffer.clear();
        assert!(tf_buffer.frames().is_empty());
        assert!(!tf_buffer.has_frame("base"));
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        use std::thread;

        let tf_buffer = Arc::new(TfBuffer::new_with_duration(Duration::from_secs(1000)));
        tf_buffer.insert_static(tf("world", "arm_base", Time::ZERO, Vector3::zeros())).unwrap();
        for i in 0..4 {
            tf_buffer
                .insert(tf("arm_base", &format!("sensor{i}"), Time::new(0, 0), Vector3::zeros()))
                .unwrap();
        }

        let producers: Vec<_> = (0..4)
            .map(|i| {
                let tf_buffer = tf_buffer.clone();
                thread::spawn(move || {
                    let frame = format!("sensor{i}");
                    for sec in 1..200 {
                        tf_buffer
                            .insert(tf("arm_base", &frame, Time::new(sec, 0), Vector3::new(f64::from(sec), 0.0, 0.0)))
                            .unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..4)
            .map(|i| {
                let tf_buffer = tf_buffer.clone();
                thread::spawn(move || {
                    let frame = format!("sensor{i}");
                    let res = tf_buffer
                        .lookup_transform("world", &frame, secs(150.5), Some(Duration::from_secs(10)))
                        .unwrap();
                    assert_relative_eq!(res.transform.translation.x, 150.5, epsilon = 1e-9);
                })
            })
            .collect();

        for handle in producers.into_iter().chain(consumers) {
            handle.join().unwrap();
        }
    }
}
