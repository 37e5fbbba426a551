use na::Isometry3;
use nalgebra as na;

use crate::{tf_error::LookupError, transforms::interpolate, Time};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TimedSample {
    pub(crate) stamp: Time,
    pub(crate) transform: Isometry3<f64>,
}

fn binary_search_time(chain: &[TimedSample], time: Time) -> Result<usize, usize> {
    chain.binary_search_by(|element| element.stamp.cmp(&time))
}

/// Time ordered samples of one child -> parent edge.
#[derive(Clone, Debug)]
pub(crate) struct TfIndividualTransformChain {
    static_tf: bool,
    // TODO: Implement a circular buffer. Inserting at the back still shifts on eviction.
    pub(crate) transform_chain: Vec<TimedSample>,
}

impl TfIndividualTransformChain {
    pub(crate) fn new(static_tf: bool) -> Self {
        Self {
            static_tf,
            transform_chain: Vec::new(),
        }
    }

    pub(crate) fn is_static(&self) -> bool {
        self.static_tf
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.transform_chain.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.transform_chain.len()
    }

    pub(crate) fn newest_stamp(&self) -> Option<Time> {
        self.transform_chain.last().map(|x| x.stamp)
    }

    /// A sample with an already stored stamp replaces the old one.
    pub(crate) fn add_to_buffer(&mut self, stamp: Time, transform: Isometry3<f64>) {
        let sample = TimedSample { stamp, transform };
        if self.static_tf {
            self.transform_chain.clear();
            self.transform_chain.push(sample);
            return;
        }
        match binary_search_time(&self.transform_chain, stamp) {
            Ok(index) => self.transform_chain[index] = sample,
            Err(index) => self.transform_chain.insert(index, sample),
        }
    }

    /// Drops every sample older than `horizon`, returns how many went.
    pub(crate) fn evict_before(&mut self, horizon: Time) -> usize {
        if self.static_tf {
            return 0;
        }
        let index = binary_search_time(&self.transform_chain, horizon).unwrap_or_else(|x| x);
        self.transform_chain.drain(..index).count()
    }

    /// Interpolates the edge at `time`; static edges answer at any time.
    pub(crate) fn sample(
        &self,
        time: Time,
        child: &str,
        parent: &str,
    ) -> Result<Isometry3<f64>, LookupError> {
        let (Some(first), Some(last)) = (self.transform_chain.first(), self.transform_chain.last())
        else {
            // nothing retained, everything that was here is in the past
            return Err(LookupError::ExtrapolationIntoPast {
                child: child.to_string(),
                parent: parent.to_string(),
                requested: time,
                oldest: Time::MAX,
            });
        };

        if self.static_tf {
            return Ok(last.transform);
        }

        match binary_search_time(&self.transform_chain, time) {
            Ok(x) => Ok(self.transform_chain[x].transform),
            Err(0) => Err(LookupError::ExtrapolationIntoPast {
                child: child.to_string(),
                parent: parent.to_string(),
                requested: time,
                oldest: first.stamp,
            }),
            Err(x) if x >= self.transform_chain.len() => {
                Err(LookupError::ExtrapolationIntoFuture {
                    child: child.to_string(),
                    parent: parent.to_string(),
                    requested: time,
                    newest: last.stamp,
                })
            }
            Err(x) => {
                // interpolate between the samples that bracket the desired time
                let before = &self.transform_chain[x - 1];
                let after = &self.transform_chain[x];
                let total = after.stamp.since(before.stamp);
                let elapsed = time.since(before.stamp);
                let ratio = elapsed.num_nanoseconds().unwrap_or(0) as f64
                    / total.num_nanoseconds().unwrap_or(1) as f64;
                Ok(interpolate(&before.transform, &after.transform, ratio))
            }
        }
    }
}
