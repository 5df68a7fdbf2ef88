pub mod bearing;
pub mod length;
pub mod overlap;
pub mod proximity;

use log::trace;
use std::fmt;

use crate::geometry::{CandidateSet, Route};

pub use bearing::{BearingConfig, BearingMatcher};
pub use length::{LengthConfig, LengthMatcher};
pub use overlap::{OverlapConfig, OverlapMatcher};
pub use proximity::{ProximityConfig, ProximityMatcher};

/// A pure filtering stage over a candidate set and the traveled route.
///
/// The returned candidates are always a subset of the given ones. The route
/// is either handed back as is or replaced by a refined version.
pub trait Matcher: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route);
}

/// The identity stage every hypermodel pipeline starts with
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Matcher for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        (candidates, route)
    }
}

/// Runs its stages in order, each one seeing only what the previous ones
/// kept.
#[derive(Debug, Default)]
pub struct Sequential {
    stages: Vec<Box<dyn Matcher>>,
}

impl Sequential {
    pub fn new(stages: Vec<Box<dyn Matcher>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

impl Matcher for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        self.stages
            .iter()
            .fold((candidates, route), |(candidates, route), stage| {
                let before = candidates.len();
                let (candidates, route) = stage.matches(candidates, route);
                trace!(
                    "{} kept {} of {} candidates",
                    stage.name(),
                    candidates.len(),
                    before
                );
                (candidates, route)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Segment, SegmentId};
    use geo::{coord, line_string};

    #[derive(Debug)]
    struct DropId(u64);

    impl Matcher for DropId {
        fn name(&self) -> &'static str {
            "drop"
        }

        fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
            (candidates.filter(|sg| sg.id.0 != self.0), route)
        }
    }

    /// Keeps only the first `n` candidates, so its outcome depends on what
    /// earlier stages left over
    #[derive(Debug)]
    struct KeepFirst(usize);

    impl Matcher for KeepFirst {
        fn name(&self) -> &'static str {
            "keep_first"
        }

        fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
            let mut kept = 0;
            let candidates = candidates.filter(|_| {
                kept += 1;
                kept <= self.0
            });
            (candidates, route)
        }
    }

    fn inputs() -> (CandidateSet, Route) {
        let candidates = CandidateSet::new((1..=3).map(|id| {
            Segment::new(id, vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 0.001, y: 0.0 }])
        }));
        let route = Route::new(line_string![(x: 0.0, y: 0.0), (x: 0.002, y: 0.0)]);
        (candidates, route)
    }

    #[test]
    fn passthrough_returns_inputs_unchanged() {
        let (candidates, route) = inputs();
        let (out, out_route) = Passthrough.matches(candidates.clone(), route.clone());
        assert_eq!(out, candidates);
        assert_eq!(out_route, route);
    }

    #[test]
    fn sequential_threads_stages_in_order() {
        let pipeline = Sequential::new(vec![
            Box::new(Passthrough),
            Box::new(DropId(2)),
            Box::new(DropId(3)),
        ]);
        let (candidates, route) = inputs();
        let (out, out_route) = pipeline.matches(candidates, route.clone());
        assert_eq!(out.ids().iter().map(|id| id.0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(out_route, route);
        assert_eq!(pipeline.stage_names(), vec!["passthrough", "drop", "drop"]);
    }

    #[test]
    fn stage_order_changes_the_outcome() {
        let drop_then_cap = Sequential::new(vec![Box::new(DropId(1)), Box::new(KeepFirst(1))]);
        let cap_then_drop = Sequential::new(vec![Box::new(KeepFirst(1)), Box::new(DropId(1))]);
        let (candidates, route) = inputs();

        let (a, _) = drop_then_cap.matches(candidates.clone(), route.clone());
        let (b, _) = cap_then_drop.matches(candidates, route);
        assert_eq!(a.ids(), vec![SegmentId(2)]);
        assert!(b.is_empty());
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let (candidates, route) = inputs();
        let (out, _) = Sequential::default().matches(candidates.clone(), route);
        assert_eq!(out, candidates);
    }
}
