#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::Serialize;

use crate::{
    constants::ROOT_NODE_ID,
    hints::{AccumulatorFunction, CombineDefinition, CombineRef, HintText, TestDefinition, TestRef},
    nullify::NullifyExpr,
    response::FeedbackEntry,
};

/// What a node of a built grading tree stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The synthetic top-level grouping.
    Root,
    /// A combine reached through a combine-ref.
    Combine,
    /// A test result reached through a test-ref.
    Test,
}

/// A node of a built grading tree.
///
/// The same shape serves the grading scheme, where only maximum scores are
/// known, and detailed feedback, where scores, nullification and feedback
/// entries are filled in as well.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackNode {
    /// Unique id within the tree, `parent_id + "_" + index`.
    pub(crate) id:                 String,
    /// Referenced test or combine id; `None` for the root.
    pub(crate) refid:              Option<String>,
    /// Selected sub-result of a test.
    pub(crate) subref:             Option<String>,
    /// Node kind.
    pub(crate) kind:               NodeKind,
    /// Aggregation of child scores; meaningless for tests.
    pub(crate) function:           AccumulatorFunction,
    /// Weight as declared by the referencing element.
    pub(crate) weight:             f64,
    /// Display label.
    pub(crate) heading:            String,
    /// Title and descriptions.
    #[serde(flatten)]
    pub(crate) text:               HintText,
    /// Weighted, compensated maximum score of this node.
    pub(crate) max_score:          f64,
    /// Achieved score; `None` in a grading scheme.
    pub(crate) score:              Option<f64>,
    /// Validity reported by the grader for a test.
    pub(crate) validity:           Option<f64>,
    /// The score was forced to zero by a nullify condition.
    pub(crate) nullified:          bool,
    /// Condition that voids this node's score.
    pub(crate) nullify_condition:  Option<NullifyExpr>,
    /// Human-readable condition that fired, for nullified nodes.
    pub(crate) nullify_reason:     Option<String>,
    /// This node or a descendant hit an internal grader error.
    pub(crate) has_internal_error: bool,
    /// Feedback entries for the learner.
    pub(crate) student_feedback:   Vec<FeedbackEntry>,
    /// Feedback entries for teachers.
    pub(crate) teacher_feedback:   Vec<FeedbackEntry>,
    /// Children in grading-hints document order.
    pub(crate) children:           Vec<FeedbackNode>,
}

impl FeedbackNode {
    /// Base node with every optional part empty.
    fn blank(id: String, kind: NodeKind, heading: String) -> Self {
        Self {
            id,
            refid: None,
            subref: None,
            kind,
            function: AccumulatorFunction::default(),
            weight: crate::constants::DEFAULT_WEIGHT,
            heading,
            text: HintText::default(),
            max_score: 0.0,
            score: None,
            validity: None,
            nullified: false,
            nullify_condition: None,
            nullify_reason: None,
            has_internal_error: false,
            student_feedback: Vec::new(),
            teacher_feedback: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Root node for the top-level grouping.
    pub(crate) fn root(grouping: &CombineDefinition) -> Self {
        let heading = grouping
            .text
            .title
            .clone()
            .unwrap_or_else(|| "Grading".to_string());
        let mut node = Self::blank(ROOT_NODE_ID.to_string(), NodeKind::Root, heading);
        node.function = grouping.function;
        node.text = grouping.text.clone();
        node
    }

    /// Leaf node for a test-ref.
    pub(crate) fn test(id: String, test_ref: &TestRef, definition: &TestDefinition) -> Self {
        let text = test_ref.text.or(&definition.text);
        let heading = text.title.clone().unwrap_or_else(|| match &test_ref.subref {
            Some(subref) => format!("{} / {subref}", test_ref.refid),
            None => test_ref.refid.clone(),
        });
        let mut node = Self::blank(id, NodeKind::Test, heading);
        node.refid = Some(test_ref.refid.clone());
        node.subref = test_ref.subref.clone();
        node.weight = test_ref.weight;
        node.text = text;
        node.nullify_condition = test_ref.nullify.clone();
        node
    }

    /// Grouping node for a combine-ref.
    pub(crate) fn combine(id: String, combine_ref: &CombineRef, combine: &CombineDefinition) -> Self {
        let heading = combine
            .text
            .title
            .clone()
            .unwrap_or_else(|| combine_ref.refid.clone());
        let mut node = Self::blank(id, NodeKind::Combine, heading);
        node.refid = Some(combine_ref.refid.clone());
        node.function = combine.function;
        node.weight = combine_ref.weight;
        node.text = combine.text.clone();
        node.nullify_condition = combine_ref.nullify.clone();
        node
    }

    /// Id for the child at `index`.
    pub(crate) fn child_id(&self, index: usize) -> String {
        format!("{}_{index}", self.id)
    }

    /// Unique id within the tree.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Referenced test or combine id.
    pub fn refid(&self) -> Option<&str> {
        self.refid.as_deref()
    }

    /// Selected sub-result of a test.
    pub fn subref(&self) -> Option<&str> {
        self.subref.as_deref()
    }

    /// Node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Aggregation of child scores.
    pub fn function(&self) -> AccumulatorFunction {
        self.function
    }

    /// Weight as declared by the referencing element.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Display label.
    pub fn heading(&self) -> &str {
        &self.heading
    }

    /// Title, if any.
    pub fn title(&self) -> Option<&str> {
        self.text.title.as_deref()
    }

    /// Description, if any.
    pub fn description(&self) -> Option<&str> {
        self.text.description.as_deref()
    }

    /// Teacher-only description, if any.
    pub fn internal_description(&self) -> Option<&str> {
        self.text.internal_description.as_deref()
    }

    /// Weighted, compensated maximum score.
    pub fn max_score(&self) -> f64 {
        self.max_score
    }

    /// Achieved score, once graded.
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Validity reported by the grader.
    pub fn validity(&self) -> Option<f64> {
        self.validity
    }

    /// The score was forced to zero.
    pub fn is_nullified(&self) -> bool {
        self.nullified
    }

    /// Condition that voids this node's score.
    pub fn nullify_condition(&self) -> Option<&NullifyExpr> {
        self.nullify_condition.as_ref()
    }

    /// Why the score was voided.
    pub fn nullify_reason(&self) -> Option<&str> {
        self.nullify_reason.as_deref()
    }

    /// This node or a descendant hit an internal grader error.
    pub fn has_internal_error(&self) -> bool {
        self.has_internal_error
    }

    /// Feedback entries for the learner.
    pub fn student_feedback(&self) -> &[FeedbackEntry] {
        &self.student_feedback
    }

    /// Feedback entries for teachers.
    pub fn teacher_feedback(&self) -> &[FeedbackEntry] {
        &self.teacher_feedback
    }

    /// Children in document order.
    pub fn children(&self) -> &[FeedbackNode] {
        &self.children
    }

    /// True for nodes without children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first search, including `self`, for the first node of `kind`
    /// referencing `(refid, subref)`. Test and combine ids live in separate
    /// namespaces, so the kind is part of the match.
    pub fn get_child_by_id(
        &self,
        kind: NodeKind,
        refid: &str,
        subref: Option<&str>,
    ) -> Option<&FeedbackNode> {
        self.iter().find(|node| {
            node.kind == kind
                && node.refid.as_deref() == Some(refid)
                && node.subref.as_deref() == subref
        })
    }

    /// Looks up a node by its tree id.
    pub fn find(&self, id: &str) -> Option<&FeedbackNode> {
        self.iter().find(|node| node.id == id)
    }

    /// Preorder traversal that does not recurse.
    pub fn iter(&self) -> Preorder<'_> {
        Preorder { pending: vec![self] }
    }

    /// Leaves in document order.
    pub fn leaves(&self) -> impl Iterator<Item = &FeedbackNode> {
        self.iter().filter(|node| node.is_leaf())
    }

    /// Number of levels below and including this node.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((node, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            pending.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Visits every node mutably in preorder.
    pub(crate) fn for_each_mut<F>(&mut self, mut visit: F)
    where
        F: FnMut(&mut FeedbackNode),
    {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            visit(node);
            pending.extend(node.children.iter_mut().rev());
        }
    }
}

/// Preorder iterator over a [`FeedbackNode`] tree.
pub struct Preorder<'a> {
    /// Nodes still to visit, next on top.
    pending: Vec<&'a FeedbackNode>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a FeedbackNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.pending.pop()?;
        self.pending.extend(node.children.iter().rev());
        Some(node)
    }
}
