#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use tracing::trace;

use crate::{
    config::GradingOptions,
    constants::TEST_MAX_SCORE,
    error::{GradingError, GradingResult},
    hints::{
        CombineDefinition, CombineRef, GradingHints, GradingRef, TaskDescription, TestRef,
        score::ensure_depth,
    },
    tree::FeedbackNode,
};

/// The tree of a task's gradable parts, annotated with maximum scores only.
///
/// Built before any submission exists, e.g. to show learners what will be
/// graded. Scores on every node stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingScheme {
    /// Root of the built tree.
    root:                FeedbackNode,
    /// Factor applied to every test-ref weight.
    compensation_factor: f64,
    /// Built from synthesized hints because the task declares none.
    flat:                bool,
}

impl GradingScheme {
    /// Builds the scheme of `task` scaled to `options.max_mark()`.
    pub fn build(task: &TaskDescription, options: &GradingOptions) -> GradingResult<Self> {
        let hints = task.effective_hints();
        let compensation_factor =
            hints.compensation_factor_within(options.max_mark(), options.max_depth())?;

        let builder = SchemeBuilder {
            task,
            hints: &*hints,
            compensation_factor,
            max_depth: options.max_depth(),
        };
        let root = builder.build_root()?;

        Ok(Self {
            root,
            compensation_factor,
            flat: task.is_flat(),
        })
    }

    /// Root of the built tree.
    pub fn root(&self) -> &FeedbackNode {
        &self.root
    }

    /// Consumes the scheme, returning its tree.
    pub fn into_root(self) -> FeedbackNode {
        self.root
    }

    /// Factor applied to every test-ref weight.
    pub fn compensation_factor(&self) -> f64 {
        self.compensation_factor
    }

    /// Maximum score of the whole tree; the maximum mark unless the task has
    /// nothing to grade.
    pub fn max_score(&self) -> f64 {
        self.root.max_score()
    }

    /// True when the task declares no grading hints.
    pub fn is_flat(&self) -> bool {
        self.flat
    }
}

/// Walks grading hints and materializes them as [`FeedbackNode`]s.
struct SchemeBuilder<'a> {
    /// Task providing test titles and descriptions.
    task:                &'a TaskDescription,
    /// Hints to expand.
    hints:               &'a GradingHints,
    /// Factor applied to every test-ref weight.
    compensation_factor: f64,
    /// Depth limit.
    max_depth:           usize,
}

impl<'a> SchemeBuilder<'a> {
    /// Builds the tree under the root grouping.
    fn build_root(&self) -> GradingResult<FeedbackNode> {
        let Some(grouping) = self.hints.root() else {
            return Ok(FeedbackNode::root(&CombineDefinition::new(
                String::new(),
                Default::default(),
            )));
        };

        let mut node = FeedbackNode::root(grouping);
        let mut path = Vec::new();
        self.fill_children(&mut node, grouping, &mut path)?;
        node.max_score = grouping
            .function
            .accumulate(node.children.iter().map(FeedbackNode::max_score));
        Ok(node)
    }

    /// Builds one child per reference of `grouping`, in document order.
    fn fill_children(
        &self,
        parent: &mut FeedbackNode,
        grouping: &'a CombineDefinition,
        path: &mut Vec<&'a str>,
    ) -> GradingResult<()> {
        ensure_depth(path.len() + 1, self.max_depth)?;

        for (index, grading_ref) in grouping.refs.iter().enumerate() {
            let id = parent.child_id(index);
            let child = match grading_ref {
                GradingRef::Test(test_ref) => self.test_node(id, test_ref)?,
                GradingRef::Combine(combine_ref) => self.combine_node(id, combine_ref, path)?,
            };
            parent.children.push(child);
        }
        Ok(())
    }

    /// Builds a leaf for a test-ref.
    fn test_node(&self, id: String, test_ref: &TestRef) -> GradingResult<FeedbackNode> {
        let definition = self.task.test(&test_ref.refid).ok_or_else(|| {
            GradingError::MalformedTaskStructure(format!(
                "reference to undefined test `{}`",
                test_ref.refid
            ))
        })?;

        let mut node = FeedbackNode::test(id, test_ref, definition);
        node.max_score = TEST_MAX_SCORE * test_ref.weight * self.compensation_factor;
        trace!(node = %node.id, max_score = node.max_score, "test node");
        Ok(node)
    }

    /// Builds a grouping node for a combine-ref, recursing into the combine.
    fn combine_node(
        &self,
        id: String,
        combine_ref: &CombineRef,
        path: &mut Vec<&'a str>,
    ) -> GradingResult<FeedbackNode> {
        let combine = self.hints.resolve_combine(&combine_ref.refid, path)?;
        let mut node = FeedbackNode::combine(id, combine_ref, combine);

        path.push(combine.id.as_str());
        let filled = self.fill_children(&mut node, combine, path);
        path.pop();
        filled?;

        node.max_score = combine_ref.weight
            * combine
                .function
                .accumulate(node.children.iter().map(FeedbackNode::max_score));
        trace!(node = %node.id, max_score = node.max_score, "combine node");
        Ok(node)
    }
}
