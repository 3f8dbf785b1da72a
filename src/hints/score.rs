#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use tracing::{debug, trace};

use super::model::{CombineDefinition, GradingHints, GradingRef};
use crate::{
    constants::{DEFAULT_MAX_DEPTH, SCORE_EPSILON, TEST_MAX_SCORE},
    error::{GradingError, GradingResult},
};

impl GradingHints {
    /// Maximum score reachable under these hints, with weights as declared.
    pub fn calculate_max_score(&self) -> GradingResult<f64> {
        self.calculate_max_score_within(DEFAULT_MAX_DEPTH)
    }

    /// Like [`GradingHints::calculate_max_score`], failing once combines nest
    /// deeper than `max_depth`.
    pub fn calculate_max_score_within(&self, max_depth: usize) -> GradingResult<f64> {
        let Some(root) = self.root() else {
            return Ok(0.0);
        };
        let mut path = Vec::new();
        self.grouping_max_score(root, &mut path, max_depth)
    }

    /// Recursively merges the weighted max scores of a grouping's children.
    fn grouping_max_score<'h>(
        &'h self,
        grouping: &'h CombineDefinition,
        path: &mut Vec<&'h str>,
        max_depth: usize,
    ) -> GradingResult<f64> {
        ensure_depth(path.len() + 1, max_depth)?;

        let mut values = Vec::with_capacity(grouping.refs.len());
        for grading_ref in &grouping.refs {
            match grading_ref {
                GradingRef::Test(test_ref) => values.push(test_ref.weight * TEST_MAX_SCORE),
                GradingRef::Combine(combine_ref) => {
                    let combine = self.resolve_combine(&combine_ref.refid, path)?;
                    path.push(combine.id.as_str());
                    let max = self.grouping_max_score(combine, path, max_depth);
                    path.pop();
                    values.push(combine_ref.weight * max?);
                }
            }
        }

        let max = grouping.function.accumulate(values);
        trace!(grouping = %grouping.id, function = %grouping.function, max, "max score");
        Ok(max)
    }

    /// Looks up a referenced combine, rejecting unknown ids and references
    /// back into the current path.
    pub(crate) fn resolve_combine(
        &self,
        refid: &str,
        path: &[&str],
    ) -> GradingResult<&CombineDefinition> {
        if path.contains(&refid) {
            return Err(GradingError::MalformedTaskStructure(format!(
                "combine `{refid}` contains itself"
            )));
        }
        self.combine(refid).ok_or_else(|| {
            GradingError::MalformedTaskStructure(format!("reference to undefined combine `{refid}`"))
        })
    }

    /// Multiplies every test-ref weight, in the root and in every combine, by
    /// `factor`.
    pub fn adjust_weights(&mut self, factor: f64) {
        let groupings = self.root.iter_mut().chain(self.combines.iter_mut());
        for grouping in groupings {
            for grading_ref in &mut grouping.refs {
                if let GradingRef::Test(test_ref) = grading_ref {
                    test_ref.weight *= factor;
                }
            }
        }
    }

    /// Factor that rescales these hints to `max_mark`.
    pub fn compensation_factor(&self, max_mark: f64) -> GradingResult<f64> {
        self.compensation_factor_within(max_mark, DEFAULT_MAX_DEPTH)
    }

    /// Like [`GradingHints::compensation_factor`] with an explicit depth limit.
    pub fn compensation_factor_within(&self, max_mark: f64, max_depth: usize) -> GradingResult<f64> {
        let max_score = self.calculate_max_score_within(max_depth)?;
        Ok(compensation_factor(max_score, max_mark))
    }
}

/// `max_mark / max_score`, or 1 when the two already agree within
/// [`SCORE_EPSILON`] or when there is nothing to scale.
pub fn compensation_factor(max_score: f64, max_mark: f64) -> f64 {
    if max_score <= 0.0 || (max_mark - max_score).abs() <= SCORE_EPSILON {
        debug!(max_score, max_mark, "no score compensation");
        return 1.0;
    }
    let factor = max_mark / max_score;
    debug!(max_score, max_mark, factor, "score compensation");
    factor
}

/// Fails once `depth` exceeds `max_depth`.
pub(crate) fn ensure_depth(depth: usize, max_depth: usize) -> GradingResult<()> {
    if depth > max_depth {
        return Err(GradingError::MalformedTaskStructure(format!(
            "grading hints nest deeper than {max_depth} levels"
        )));
    }
    Ok(())
}
