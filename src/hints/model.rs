#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{error::GradingError, nullify::NullifyExpr};

/// How a grouping node merges the scores of its children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorFunction {
    /// Lowest child score wins.
    #[default]
    Min,
    /// Highest child score wins.
    Max,
    /// Child scores add up.
    Sum,
}

impl AccumulatorFunction {
    /// Neutral starting value of the fold.
    pub fn seed(self) -> f64 {
        match self {
            AccumulatorFunction::Min => f64::INFINITY,
            AccumulatorFunction::Max | AccumulatorFunction::Sum => 0.0,
        }
    }

    /// Merges an accumulated value with the next child's value.
    pub fn merge(self, acc: f64, value: f64) -> f64 {
        match self {
            AccumulatorFunction::Min => acc.min(value),
            AccumulatorFunction::Max => acc.max(value),
            AccumulatorFunction::Sum => acc + value,
        }
    }

    /// Folds a sequence of child values. A grouping without children is worth
    /// nothing rather than infinitely much.
    pub fn accumulate<I>(self, values: I) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        let folded = values
            .into_iter()
            .fold(self.seed(), |acc, value| self.merge(acc, value));
        if folded.is_finite() { folded } else { 0.0 }
    }

    /// Name used in ProFormA documents.
    pub fn as_str(self) -> &'static str {
        match self {
            AccumulatorFunction::Min => "min",
            AccumulatorFunction::Max => "max",
            AccumulatorFunction::Sum => "sum",
        }
    }
}

impl FromStr for AccumulatorFunction {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "min" => Ok(AccumulatorFunction::Min),
            "max" => Ok(AccumulatorFunction::Max),
            "sum" => Ok(AccumulatorFunction::Sum),
            other => Err(GradingError::MalformedTaskStructure(format!(
                "unknown accumulator function `{other}`"
            ))),
        }
    }
}

impl Display for AccumulatorFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing texts that may accompany a test, test-ref or combine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintText {
    /// Short title.
    pub title:                Option<String>,
    /// Description shown to students.
    pub description:          Option<String>,
    /// Description meant for teachers only.
    pub internal_description: Option<String>,
}

impl HintText {
    /// Returns `self` with blank fields filled from `fallback`.
    pub fn or(&self, fallback: &HintText) -> HintText {
        HintText {
            title:                self.title.clone().or_else(|| fallback.title.clone()),
            description:          self
                .description
                .clone()
                .or_else(|| fallback.description.clone()),
            internal_description: self
                .internal_description
                .clone()
                .or_else(|| fallback.internal_description.clone()),
        }
    }
}

/// A test declared in the task's tests section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Test identifier.
    pub id:        String,
    /// Title and descriptions.
    pub text:      HintText,
    /// Grader-specific test type, e.g. `unittest`.
    pub test_type: Option<String>,
}

/// A weighted reference to a test result.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRef {
    /// Referenced test id.
    pub refid:   String,
    /// Named sub-result of the test, if any.
    pub subref:  Option<String>,
    /// Weight of the test's score.
    pub weight:  f64,
    /// Texts overriding the test definition's.
    pub text:    HintText,
    /// Condition under which this test's score is voided.
    pub nullify: Option<NullifyExpr>,
}

/// A weighted reference to another combine.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineRef {
    /// Referenced combine id.
    pub refid:   String,
    /// Weight of the combine's score.
    pub weight:  f64,
    /// Condition under which this combine's score is voided.
    pub nullify: Option<NullifyExpr>,
}

/// One entry of a grouping node.
#[derive(Debug, Clone, PartialEq)]
pub enum GradingRef {
    /// A leaf.
    Test(TestRef),
    /// A nested grouping.
    Combine(CombineRef),
}

impl GradingRef {
    /// Referenced id.
    pub fn refid(&self) -> &str {
        match self {
            GradingRef::Test(test) => &test.refid,
            GradingRef::Combine(combine) => &combine.refid,
        }
    }

    /// Weight applied to the referenced score.
    pub fn weight(&self) -> f64 {
        match self {
            GradingRef::Test(test) => test.weight,
            GradingRef::Combine(combine) => combine.weight,
        }
    }

    /// Nullify condition attached to the reference.
    pub fn nullify(&self) -> Option<&NullifyExpr> {
        match self {
            GradingRef::Test(test) => test.nullify.as_ref(),
            GradingRef::Combine(combine) => combine.nullify.as_ref(),
        }
    }
}

/// The root grouping or a named combine of the grading hints.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineDefinition {
    /// Combine identifier; empty for a root without one.
    pub id:       String,
    /// Aggregation of the child scores.
    pub function: AccumulatorFunction,
    /// Title and descriptions.
    pub text:     HintText,
    /// Children in document order.
    pub refs:     Vec<GradingRef>,
}

impl CombineDefinition {
    /// Creates an empty grouping.
    pub fn new(id: impl Into<String>, function: AccumulatorFunction) -> Self {
        Self {
            id: id.into(),
            function,
            text: HintText::default(),
            refs: Vec::new(),
        }
    }
}

/// The grading-hints section of a task.
///
/// Combines are kept in document order and looked up lazily by id, so trees
/// are only expanded when something asks for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradingHints {
    /// The top-level grouping, if the task declares one.
    pub(crate) root:     Option<CombineDefinition>,
    /// Named combines in document order.
    pub(crate) combines: Vec<CombineDefinition>,
    /// Position of each combine in `combines`.
    pub(crate) index:    HashMap<String, usize>,
}

impl GradingHints {
    /// Assembles grading hints from an optional root and a list of combines.
    pub fn new(root: Option<CombineDefinition>, combines: Vec<CombineDefinition>) -> Self {
        let index = combines
            .iter()
            .enumerate()
            .map(|(pos, combine)| (combine.id.clone(), pos))
            .collect();
        Self {
            root,
            combines,
            index,
        }
    }

    /// Synthesizes hints for a task without any: a `min` root with one
    /// unit-weight test-ref per declared test.
    pub fn flat(tests: &[TestDefinition]) -> Self {
        let mut root = CombineDefinition::new(String::new(), AccumulatorFunction::Min);
        root.refs = tests
            .iter()
            .map(|test| {
                GradingRef::Test(TestRef {
                    refid:   test.id.clone(),
                    subref:  None,
                    weight:  crate::constants::DEFAULT_WEIGHT,
                    text:    HintText::default(),
                    nullify: None,
                })
            })
            .collect();
        Self::new(Some(root), Vec::new())
    }

    /// The top-level grouping.
    pub fn root(&self) -> Option<&CombineDefinition> {
        self.root.as_ref()
    }

    /// Named combines in document order.
    pub fn combines(&self) -> &[CombineDefinition] {
        &self.combines
    }

    /// Looks up a combine by id.
    pub fn combine(&self, id: &str) -> Option<&CombineDefinition> {
        self.index.get(id).and_then(|pos| self.combines.get(*pos))
    }

    /// True when there is no root, or the root references nothing.
    pub fn is_empty(&self) -> bool {
        self.root.as_ref().is_none_or(|root| root.refs.is_empty())
    }

    /// Weight of the first combine-ref pointing at `combine_id`, searching
    /// depth-first from the root in document order. Defaults to 1.
    pub fn combine_ref_weight(&self, combine_id: &str) -> f64 {
        let Some(root) = self.root.as_ref() else {
            return crate::constants::DEFAULT_WEIGHT;
        };

        let mut pending: Vec<&GradingRef> = root.refs.iter().rev().collect();
        let mut expanded: HashSet<&str> = HashSet::new();
        while let Some(grading_ref) = pending.pop() {
            let GradingRef::Combine(combine_ref) = grading_ref else {
                continue;
            };
            if combine_ref.refid == combine_id {
                return combine_ref.weight;
            }
            if expanded.insert(combine_ref.refid.as_str())
                && let Some(child) = self.combine(&combine_ref.refid)
            {
                pending.extend(child.refs.iter().rev());
            }
        }

        crate::constants::DEFAULT_WEIGHT
    }
}
