#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::GradingOptions,
    error::{GradingError, GradingResult},
    hints::{CombineDefinition, GradingHints, GradingRef, TaskDescription},
    nullify::{NullifyExpr, OperandSource},
    response::{
        FeedbackList, GraderEngine, MergedTestFeedback, ResponseDocument, ResponseFeedback,
        SeparateTestFeedback,
    },
    scheme::GradingScheme,
    tree::{FeedbackNode, NodeKind},
};

/// Detailed and summarised feedback for one graded submission.
///
/// Built once per grader response by [`SeparateFeedback::process_result`] and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeparateFeedback {
    /// Tree shaped like the grading hints, with achieved scores.
    detailed:            FeedbackNode,
    /// The grader's own submission-level feedback.
    summarised:          FeedbackList,
    /// Factor applied to every test-ref weight during this pass.
    compensation_factor: f64,
    /// The grader that produced the response.
    grader_engine:       Option<GraderEngine>,
}

impl SeparateFeedback {
    /// Merges a separate-feedback response with the task's grading hints.
    ///
    /// Any missing result, impossible response shape or malformed hint aborts
    /// the pass; no partial tree is returned.
    pub fn process_result(
        task: &TaskDescription,
        response: &ResponseDocument,
        options: &GradingOptions,
    ) -> GradingResult<Self> {
        let results = response.separate().ok_or_else(|| {
            GradingError::SpecificationViolation(
                "expected separate test feedback, got merged feedback".into(),
            )
        })?;

        let scheme = GradingScheme::build(task, options)?;
        let compensation_factor = scheme.compensation_factor();
        let hints = task.effective_hints();

        let mut scores = RawScores::new(&hints, results, options.max_depth());
        let mut detailed = scheme.into_root();
        score_node(&mut detailed, &mut scores, compensation_factor)?;
        explain_nullified(&mut detailed);
        warn_unreferenced(&detailed, results);

        debug!(
            score = detailed.score.unwrap_or_default(),
            max_score = detailed.max_score,
            "processed grader response"
        );

        Ok(Self {
            detailed,
            summarised: results.submission_feedback().clone(),
            compensation_factor,
            grader_engine: response.grader_engine().cloned(),
        })
    }

    /// Tree shaped like the grading hints, with achieved scores.
    pub fn detailed_feedback(&self) -> &FeedbackNode {
        &self.detailed
    }

    /// The grader's own submission-level feedback.
    pub fn summarised_feedback(&self) -> &FeedbackList {
        &self.summarised
    }

    /// Achieved score, scaled to the maximum mark.
    pub fn score(&self) -> f64 {
        self.detailed.score.unwrap_or_default()
    }

    /// Maximum achievable score.
    pub fn max_score(&self) -> f64 {
        self.detailed.max_score
    }

    /// Factor applied to every test-ref weight.
    pub fn compensation_factor(&self) -> f64 {
        self.compensation_factor
    }

    /// Some test hit an internal grader error.
    pub fn has_internal_error(&self) -> bool {
        self.detailed.has_internal_error
    }

    /// The grader that produced the response.
    pub fn grader_engine(&self) -> Option<&GraderEngine> {
        self.grader_engine.as_ref()
    }
}

/// Result of a merged-feedback response, scaled to the maximum mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedFeedback {
    /// Achieved score.
    pub score:              f64,
    /// Maximum achievable score.
    pub max_score:          f64,
    /// The grader failed internally.
    pub has_internal_error: bool,
    /// HTML feedback for the learner.
    pub student_feedback:   Option<String>,
    /// HTML feedback for teachers.
    pub teacher_feedback:   Option<String>,
}

impl MergedFeedback {
    /// Scales a merged result to the configured maximum mark.
    pub fn process_result(merged: &MergedTestFeedback, options: &GradingOptions) -> Self {
        Self {
            score:              merged.score * options.max_mark(),
            max_score:          options.max_mark(),
            has_internal_error: merged.is_internal_error,
            student_feedback:   merged.student_feedback.clone(),
            teacher_feedback:   merged.teacher_feedback.clone(),
        }
    }
}

/// Outcome of grading one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingOutcome {
    /// Per-test feedback merged with the grading hints.
    Separate(SeparateFeedback),
    /// A single overall result.
    Merged(MergedFeedback),
}

impl GradingOutcome {
    /// Achieved score, scaled to the maximum mark.
    pub fn score(&self) -> f64 {
        match self {
            GradingOutcome::Separate(separate) => separate.score(),
            GradingOutcome::Merged(merged) => merged.score,
        }
    }

    /// Maximum achievable score.
    pub fn max_score(&self) -> f64 {
        match self {
            GradingOutcome::Separate(separate) => separate.max_score(),
            GradingOutcome::Merged(merged) => merged.max_score,
        }
    }

    /// The grader hit an internal error somewhere.
    pub fn has_internal_error(&self) -> bool {
        match self {
            GradingOutcome::Separate(separate) => separate.has_internal_error(),
            GradingOutcome::Merged(merged) => merged.has_internal_error,
        }
    }
}

/// Grades a response of either shape.
pub fn process_result(
    task: &TaskDescription,
    response: &ResponseDocument,
    options: &GradingOptions,
) -> GradingResult<GradingOutcome> {
    match response.feedback() {
        ResponseFeedback::Separate(_) => {
            SeparateFeedback::process_result(task, response, options).map(GradingOutcome::Separate)
        }
        ResponseFeedback::Merged(merged) => Ok(GradingOutcome::Merged(
            MergedFeedback::process_result(merged, options),
        )),
    }
}

/// Scores a subtree bottom-up, then applies the node's own nullify condition.
fn score_node(
    node: &mut FeedbackNode,
    scores: &mut RawScores<'_>,
    compensation_factor: f64,
) -> GradingResult<()> {
    match node.kind {
        NodeKind::Test => {
            let refid = node.refid.as_deref().unwrap_or_default();
            let result = scores.results.result(refid, node.subref.as_deref())?;
            node.student_feedback = result.feedback.student.clone();
            node.teacher_feedback = result.feedback.teacher.clone();
            node.validity = result.validity;
            node.has_internal_error = result.is_internal_error;
            node.score = Some(result.score * node.weight * compensation_factor);
        }
        NodeKind::Root | NodeKind::Combine => {
            for child in &mut node.children {
                score_node(child, scores, compensation_factor)?;
            }
            let merged = node
                .function
                .accumulate(node.children.iter().map(|c| c.score.unwrap_or_default()));
            let weight = if node.kind == NodeKind::Root { 1.0 } else { node.weight };
            node.score = Some(weight * merged);
            node.has_internal_error = node.children.iter().any(|c| c.has_internal_error);
        }
    }

    let nullify = match &node.nullify_condition {
        Some(condition) => condition.should_nullify(scores)?,
        None => false,
    };
    if nullify {
        info!(node = %node.id, heading = %node.heading, "score nullified");
        node.score = Some(0.0);
        node.nullified = true;
    }
    Ok(())
}

/// Fills in a readable reason on every nullified node, naming operands after
/// the nodes they reference.
fn explain_nullified(root: &mut FeedbackNode) {
    let reasons: HashMap<String, String> = root
        .iter()
        .filter(|node| node.nullified)
        .filter_map(|node| {
            let condition = node.nullify_condition.as_ref()?;
            let reason = condition.describe(&|operand: &NullifyExpr| {
                let found = match operand {
                    NullifyExpr::TestRef { refid, subref } => {
                        root.get_child_by_id(NodeKind::Test, refid, subref.as_deref())
                    }
                    NullifyExpr::CombineRef { refid } => {
                        root.get_child_by_id(NodeKind::Combine, refid, None)
                    }
                    _ => None,
                };
                found.map(|node| node.heading.clone())
            });
            Some((node.id.clone(), reason))
        })
        .collect();

    if reasons.is_empty() {
        return;
    }
    root.for_each_mut(|node| {
        if let Some(reason) = reasons.get(&node.id) {
            node.nullify_reason = Some(reason.clone());
        }
    });
}

/// Logs test responses that no leaf of the tree consumed.
fn warn_unreferenced(root: &FeedbackNode, results: &SeparateTestFeedback) {
    for (id, _) in results.tests() {
        if !root.leaves().any(|leaf| leaf.refid.as_deref() == Some(id)) {
            warn!(test = id, "grader returned a result no grading hint refers to");
        }
    }
}

/// Operand values for nullify conditions: raw test scores and raw combine
/// scores, memoized for the duration of one pass.
struct RawScores<'a> {
    /// Hints that define the combines.
    hints:       &'a GradingHints,
    /// The grader's results.
    results:     &'a SeparateTestFeedback,
    /// Combine scores computed so far.
    cache:       HashMap<String, f64>,
    /// Combines currently being computed, innermost last.
    in_progress: Vec<String>,
    /// Depth limit.
    max_depth:   usize,
}

impl<'a> RawScores<'a> {
    /// Creates an empty memo for one pass.
    fn new(hints: &'a GradingHints, results: &'a SeparateTestFeedback, max_depth: usize) -> Self {
        Self {
            hints,
            results,
            cache: HashMap::new(),
            in_progress: Vec::new(),
            max_depth,
        }
    }

    /// Accumulates a combine with declared weights, honouring the nullify
    /// conditions of its references.
    fn accumulate(&mut self, combine: &'a CombineDefinition) -> GradingResult<f64> {
        let mut values = Vec::with_capacity(combine.refs.len());
        for grading_ref in &combine.refs {
            let value = match grading_ref {
                GradingRef::Test(test_ref) => {
                    test_ref.weight * self.test_score(&test_ref.refid, test_ref.subref.as_deref())?
                }
                GradingRef::Combine(combine_ref) => {
                    combine_ref.weight * self.combine_score(&combine_ref.refid)?
                }
            };
            let nullify = match grading_ref.nullify() {
                Some(condition) => condition.should_nullify(self)?,
                None => false,
            };
            values.push(if nullify { 0.0 } else { value });
        }
        Ok(combine.function.accumulate(values))
    }
}

impl OperandSource for RawScores<'_> {
    fn test_score(&mut self, refid: &str, subref: Option<&str>) -> GradingResult<f64> {
        Ok(self.results.result(refid, subref)?.score)
    }

    fn combine_score(&mut self, refid: &str) -> GradingResult<f64> {
        if let Some(score) = self.cache.get(refid) {
            return Ok(*score);
        }
        if self.in_progress.iter().any(|id| id == refid) {
            return Err(GradingError::MalformedTaskStructure(format!(
                "the score of combine `{refid}` depends on itself"
            )));
        }
        if self.in_progress.len() >= self.max_depth {
            return Err(GradingError::MalformedTaskStructure(format!(
                "grading hints nest deeper than {} levels",
                self.max_depth
            )));
        }

        let hints = self.hints;
        let combine = hints.combine(refid).ok_or_else(|| {
            GradingError::MalformedTaskStructure(format!("reference to undefined combine `{refid}`"))
        })?;

        self.in_progress.push(refid.to_string());
        let score = self.accumulate(combine);
        self.in_progress.pop();
        let score = score?;

        self.cache.insert(refid.to_string(), score);
        Ok(score)
    }

    fn combine_weight(&self, refid: &str) -> f64 {
        self.hints.combine_ref_weight(refid)
    }
}
