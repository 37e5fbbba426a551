use std::collections::HashMap;

use na::Isometry3;
use nalgebra as na;

use crate::{
    tf_error::{InsertError, LookupError},
    tf_individual_transform_chain::TfIndividualTransformChain,
    Time,
};

/// A stretch of time during which the frame was expressed relative to `parent`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ParentSpan {
    pub(crate) parent: String,
    pub(crate) start: Time,
    pub(crate) end: Time,
}

/// One hop of an ancestor walk.
#[derive(Clone, Debug)]
pub(crate) struct LineageStep {
    pub(crate) parent: String,
    /// Newest sample of the edge, `None` for static edges.
    pub(crate) newest: Option<Time>,
    pub(crate) transform: Result<Isometry3<f64>, LookupError>,
}

/// Everything known about where a single frame sits relative to its parents.
///
/// Spans are ordered and never overlap, which is what keeps the graph a forest:
/// at any instant at most one parent is live. A frame with no spans is a root.
#[derive(Clone, Debug)]
pub(crate) struct TfFrameLineage {
    frame_id: String,
    spans: Vec<ParentSpan>,
    edges: HashMap<String, TfIndividualTransformChain>,
}

impl TfFrameLineage {
    pub(crate) fn new(frame_id: &str) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            spans: Vec::new(),
            edges: HashMap::new(),
        }
    }

    pub(crate) fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub(crate) fn is_root(&self) -> bool {
        self.spans.is_empty()
    }

    pub(crate) fn is_static(&self) -> bool {
        self.spans
            .last()
            .and_then(|span| self.edges.get(&span.parent))
            .is_some_and(TfIndividualTransformChain::is_static)
    }

    pub(crate) fn spans(&self) -> &[ParentSpan] {
        &self.spans
    }

    pub(crate) fn edge(&self, parent: &str) -> Option<&TfIndividualTransformChain> {
        self.edges.get(parent)
    }

    /// Replaces whatever was known about this frame with a single edge valid at all times.
    pub(crate) fn set_static(&mut self, parent: &str, stamp: Time, transform: Isometry3<f64>) {
        if !self.is_root() && !self.is_static() {
            log::debug!(
                "frame '{}' switches from dynamic to static parent '{parent}'",
                self.frame_id
            );
        }
        let mut chain = TfIndividualTransformChain::new(true);
        chain.add_to_buffer(stamp, transform);
        self.edges.clear();
        self.edges.insert(parent.to_string(), chain);
        self.spans = vec![ParentSpan {
            parent: parent.to_string(),
            start: Time::MIN,
            end: Time::MAX,
        }];
    }

    pub(crate) fn insert(
        &mut self,
        parent: &str,
        stamp: Time,
        transform: Isometry3<f64>,
        reorder_tolerance: std::time::Duration,
        retention: std::time::Duration,
    ) -> Result<(), InsertError> {
        if self.is_static() {
            // a dynamic update of a static frame overwrites its value, the parent is latched
            let existing = &self.spans[0].parent;
            if existing != parent {
                return Err(self.conflict(parent, existing, stamp));
            }
            if let Some(chain) = self.edges.get_mut(parent) {
                chain.add_to_buffer(stamp, transform);
            }
            return Ok(());
        }

        if let Some(newest) = self.edges.get(parent).and_then(|c| c.newest_stamp()) {
            if stamp < newest.saturating_sub(reorder_tolerance) {
                return Err(InsertError::OutOfOrderBeyondTolerance {
                    child: self.frame_id.clone(),
                    parent: parent.to_string(),
                    stamp,
                    newest,
                    tolerance: reorder_tolerance,
                });
            }
        }

        self.claim_span(parent, stamp)?;
        self.edges
            .entry(parent.to_string())
            .or_insert_with(|| TfIndividualTransformChain::new(false))
            .add_to_buffer(stamp, transform);
        self.evict(retention);
        Ok(())
    }

    /// Records that `parent` is live at `stamp`, opening a new span on reparenting.
    fn claim_span(&mut self, parent: &str, stamp: Time) -> Result<(), InsertError> {
        // first span that has not ended before stamp
        let index = self.spans.partition_point(|span| span.end < stamp);

        if index == self.spans.len() {
            if let Some(last) = self.spans.last_mut() {
                if last.parent == parent {
                    last.end = stamp;
                    return Ok(());
                }
                log::debug!(
                    "frame '{}' reparented from '{}' to '{parent}' at {stamp}",
                    self.frame_id,
                    last.parent
                );
            }
            self.spans.push(ParentSpan {
                parent: parent.to_string(),
                start: stamp,
                end: stamp,
            });
            return Ok(());
        }

        let span = &self.spans[index];
        if span.start <= stamp {
            if span.parent != parent {
                return Err(self.conflict(parent, &span.parent, stamp));
            }
            return Ok(());
        }

        // stamp falls in the gap right before spans[index]
        if span.parent == parent {
            self.spans[index].start = stamp;
        } else if index > 0 && self.spans[index - 1].parent == parent {
            self.spans[index - 1].end = stamp;
        } else {
            self.spans.insert(
                index,
                ParentSpan {
                    parent: parent.to_string(),
                    start: stamp,
                    end: stamp,
                },
            );
        }
        Ok(())
    }

    fn conflict(&self, parent: &str, existing: &str, stamp: Time) -> InsertError {
        InsertError::ParentConflict {
            child: self.frame_id.clone(),
            parent: parent.to_string(),
            existing: existing.to_string(),
            stamp,
        }
    }

    /// Forgets everything older than the retention horizon of this frame.
    fn evict(&mut self, retention: std::time::Duration) {
        let Some(newest) = self.spans.last().map(|span| span.end) else {
            return;
        };
        let horizon = newest.saturating_sub(retention);

        let mut evicted = 0;
        for chain in self.edges.values_mut() {
            evicted += chain.evict_before(horizon);
        }
        self.edges.retain(|_, chain| !chain.is_empty());

        self.spans.retain(|span| span.end >= horizon);
        for span in &mut self.spans {
            if span.start < horizon {
                span.start = horizon;
            }
        }
        if evicted > 0 {
            log::trace!(
                "evicted {evicted} samples of '{}' older than {horizon}",
                self.frame_id
            );
        }
    }

    /// The span live at `time`, or the one nearest to it when `time` falls outside all of them.
    fn resolve(&self, time: Time) -> Option<&ParentSpan> {
        let index = self.spans.partition_point(|span| span.end < time);
        let after = self.spans.get(index);
        if let Some(span) = after {
            if span.start <= time {
                return Some(span);
            }
        }
        let before = index.checked_sub(1).and_then(|i| self.spans.get(i));
        match (before, after) {
            (Some(before), Some(after)) => {
                if time.since(before.end) <= after.start.since(time) {
                    Some(before)
                } else {
                    Some(after)
                }
            }
            (before, after) => before.or(after),
        }
    }

    /// Resolves the parent at `time` (`None` meaning the newest parent) and samples the edge.
    ///
    /// Returns `None` for a root frame.
    pub(crate) fn step(&self, time: Option<Time>) -> Option<LineageStep> {
        let span = match time {
            Some(time) => self.resolve(time)?,
            None => self.spans.last()?,
        };
        let Some(chain) = self.edges.get(&span.parent) else {
            return Some(LineageStep {
                parent: span.parent.clone(),
                newest: None,
                transform: Err(LookupError::ExtrapolationIntoPast {
                    child: self.frame_id.clone(),
                    parent: span.parent.clone(),
                    requested: time.unwrap_or(span.end),
                    oldest: span.start,
                }),
            });
        };

        let newest = (!chain.is_static()).then_some(span.end);
        let transform = match time {
            _ if chain.is_static() => chain.sample(Time::ZERO, &self.frame_id, &span.parent),
            None => chain.sample(span.end, &self.frame_id, &span.parent),
            Some(time) if time < span.start => Err(LookupError::ExtrapolationIntoPast {
                child: self.frame_id.clone(),
                parent: span.parent.clone(),
                requested: time,
                oldest: span.start,
            }),
            Some(time) if time > span.end => Err(LookupError::ExtrapolationIntoFuture {
                child: self.frame_id.clone(),
                parent: span.parent.clone(),
                requested: time,
                newest: span.end,
            }),
            Some(time) => chain.sample(time, &self.frame_id, &span.parent),
        };

        Some(LineageStep {
            parent: span.parent.clone(),
            newest,
            transform,
        })
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use approx::assert_relative_eq;

    use super::*;

    const TOLERANCE: Duration = Duration::ZERO;
    const RETENTION: Duration = Duration::from_secs(10);

    fn at(x: f64) -> Isometry3<f64> {
        Isometry3::translation(x, 0.0, 0.0)
    }

    fn insert(lineage: &mut TfFrameLineage, parent: &str, sec: i32) -> Result<(), InsertError> {
        lineage.insert(parent, Time::new(sec, 0), at(sec.into()), TOLERANCE, RETENTION)
    }

    #[test]
    fn test_reparenting_opens_new_span() {
        let mut lineage = TfFrameLineage::new("marker");
        insert(&mut lineage, "camera1", 1).unwrap();
        insert(&mut lineage, "camera1", 2).unwrap();
        insert(&mut lineage, "camera2", 3).unwrap();
        insert(&mut lineage, "camera2", 4).unwrap();
        insert(&mut lineage, "camera1", 5).unwrap();

        let parents: Vec<_> = lineage.spans().iter().map(|s| s.parent.as_str()).collect();
        assert_eq!(parents, vec!["camera1", "camera2", "camera1"]);

        let step = lineage.step(Some(Time::new(1, 500_000_000))).unwrap();
        assert_eq!(step.parent, "camera1");
        assert_relative_eq!(step.transform.unwrap().translation.x, 1.5, epsilon = 1e-12);

        let step = lineage.step(Some(Time::new(3, 500_000_000))).unwrap();
        assert_eq!(step.parent, "camera2");

        let step = lineage.step(None).unwrap();
        assert_eq!(step.parent, "camera1");
        assert_eq!(step.newest, Some(Time::new(5, 0)));
    }

    #[test]
    fn test_gap_between_parents_is_not_interpolated() {
        let mut lineage = TfFrameLineage::new("marker");
        insert(&mut lineage, "camera1", 1).unwrap();
        insert(&mut lineage, "camera2", 5).unwrap();
        insert(&mut lineage, "camera1", 9).unwrap();

        // nearer to the end of the camera1 span than the start of camera2
        let step = lineage.step(Some(Time::new(2, 0))).unwrap();
        assert_eq!(step.parent, "camera1");
        assert!(matches!(
            step.transform,
            Err(LookupError::ExtrapolationIntoFuture { .. })
        ));
        let step = lineage.step(Some(Time::new(4, 0))).unwrap();
        assert_eq!(step.parent, "camera2");
        assert!(matches!(
            step.transform,
            Err(LookupError::ExtrapolationIntoPast { .. })
        ));
    }

    #[test]
    fn test_second_parent_in_live_span_conflicts() {
        let mut lineage = TfFrameLineage::new("marker");
        insert(&mut lineage, "camera1", 1).unwrap();
        insert(&mut lineage, "camera1", 3).unwrap();
        let err = lineage
            .insert("camera2", Time::new(2, 0), at(0.0), Duration::from_secs(5), RETENTION)
            .unwrap_err();
        assert!(matches!(err, InsertError::ParentConflict { existing, .. } if existing == "camera1"));
    }

    #[test]
    fn test_reorder_tolerance() {
        let mut lineage = TfFrameLineage::new("base");
        insert(&mut lineage, "odom", 5).unwrap();
        assert!(matches!(
            insert(&mut lineage, "odom", 4),
            Err(InsertError::OutOfOrderBeyondTolerance { .. })
        ));
        lineage
            .insert("odom", Time::new(4, 0), at(4.0), Duration::from_secs(1), RETENTION)
            .unwrap();
        assert_eq!(lineage.spans()[0].start, Time::new(4, 0));
        assert_eq!(lineage.edge("odom").unwrap().len(), 2);
    }

    #[test]
    fn test_retention_drops_old_spans() {
        let mut lineage = TfFrameLineage::new("marker");
        insert(&mut lineage, "camera1", 0).unwrap();
        insert(&mut lineage, "camera2", 5).unwrap();
        insert(&mut lineage, "camera2", 20).unwrap();
        assert_eq!(lineage.spans().len(), 1);
        assert_eq!(lineage.spans()[0].start, Time::new(10, 0));
        assert!(lineage.edge("camera1").is_none());
        assert_eq!(lineage.edge("camera2").unwrap().len(), 1);
    }

    #[test]
    fn test_static_latches_parent() {
        let mut lineage = TfFrameLineage::new("camera");
        insert(&mut lineage, "base", 1).unwrap();
        lineage.set_static("base", Time::new(1, 0), at(0.5));
        assert!(lineage.is_static());
        let step = lineage.step(Some(Time::new(1000, 0))).unwrap();
        assert_eq!(step.newest, None);
        assert_relative_eq!(step.transform.unwrap().translation.x, 0.5);

        assert!(matches!(
            insert(&mut lineage, "other", 2),
            Err(InsertError::ParentConflict { .. })
        ));
        insert(&mut lineage, "base", 2).unwrap();
        let step = lineage.step(Some(Time::MIN)).unwrap();
        assert_relative_eq!(step.transform.unwrap().translation.x, 2.0);
    }
}
