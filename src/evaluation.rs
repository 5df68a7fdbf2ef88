use anyhow::Result;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::ops::{Add, AddAssign};

use crate::geometry::{CandidateSet, Route, SegmentId};
use crate::hypermodel::Hypermodel;
use crate::store::{ConfigStore, DEFAULT_METRIC, HypermodelRecord};

/// A route with its candidate segments and the segments a reviewer
/// confirmed it actually traverses
#[derive(Clone, Debug)]
pub struct MatchCase {
    /// Name given in the dataset, if any
    pub name: Option<String>,
    pub route: Route,
    pub candidates: CandidateSet,
    pub bound: HashSet<SegmentId>,
}

impl MatchCase {
    /// Name of the case for logs, falling back to its position in the dataset
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("case #{}", index))
    }
}

/// Matched segments compared against the confirmed bindings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Confusion {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl Confusion {
    pub fn compare(matched: &CandidateSet, bound: &HashSet<SegmentId>) -> Self {
        let true_positives = matched.iter().filter(|sg| bound.contains(&sg.id)).count();
        Self {
            true_positives,
            false_positives: matched.len() - true_positives,
            false_negatives: bound.len() - true_positives,
        }
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall, zero when both are zero
    pub fn f1(&self) -> f64 {
        let (precision, recall) = (self.precision(), self.recall());
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl Add for Confusion {
    type Output = Confusion;

    fn add(self, other: Confusion) -> Confusion {
        Confusion {
            true_positives: self.true_positives + other.true_positives,
            false_positives: self.false_positives + other.false_positives,
            false_negatives: self.false_negatives + other.false_negatives,
        }
    }
}

impl AddAssign for Confusion {
    fn add_assign(&mut self, other: Confusion) {
        *self = *self + other;
    }
}

/// Micro-averaged quality of a hypermodel over a set of cases
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EvaluationReport {
    pub cases: usize,
    pub confusion: Confusion,
}

impl EvaluationReport {
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            (DEFAULT_METRIC.to_string(), self.confusion.f1()),
            ("precision".to_string(), self.confusion.precision()),
            ("recall".to_string(), self.confusion.recall()),
        ])
    }

    pub fn into_record(self, params: crate::params::Params) -> HypermodelRecord {
        HypermodelRecord::new(params, self.metrics())
    }
}

/// Runs the hypermodel on every case in parallel and sums up the outcome
pub fn evaluate(hypermodel: &Hypermodel, cases: &[MatchCase]) -> EvaluationReport {
    let confusion = cases
        .par_iter()
        .map(|case| {
            let (matched, _) = hypermodel.matches(case.candidates.clone(), case.route.clone());
            Confusion::compare(&matched, &case.bound)
        })
        .reduce(Confusion::default, |a, b| a + b);

    let report = EvaluationReport {
        cases: cases.len(),
        confusion,
    };
    debug!(
        "{} over {} cases: precision {:.3}, recall {:.3}, f1 {:.3}",
        hypermodel.kind(),
        report.cases,
        confusion.precision(),
        confusion.recall(),
        confusion.f1()
    );
    report
}

/// Persists the hypermodel's params and metrics if they beat the stored
/// record on `metric`. Returns whether the record was replaced.
pub fn promote_if_better(
    hypermodel: &Hypermodel,
    store: &dyn ConfigStore,
    report: &EvaluationReport,
    metric: &str,
) -> Result<bool> {
    let current = Hypermodel::load_config(hypermodel.kind(), store)?;
    let candidate = report.into_record(hypermodel.params().clone());
    if candidate.metric(metric) <= current.metric(metric) {
        debug!(
            "Keeping stored {} config ({} {:.4} >= {:.4})",
            hypermodel.kind(),
            metric,
            current.metric(metric),
            candidate.metric(metric)
        );
        return Ok(false);
    }
    Hypermodel::store_config(hypermodel.kind(), store, serde_json::to_value(&candidate)?)?;
    info!(
        "Promoted {} config: {} {:.4} -> {:.4}",
        hypermodel.kind(),
        metric,
        current.metric(metric),
        candidate.metric(metric)
    );
    Ok(true)
}
