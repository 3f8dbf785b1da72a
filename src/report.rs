#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use typed_builder::TypedBuilder;

use crate::{
    feedback::{MergedFeedback, SeparateFeedback},
    response::{FeedbackEntry, FeedbackList},
    scheme::GradingScheme,
    tree::FeedbackNode,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
/// A score next to the most it could have been
pub struct Grade {
    /// The score received
    pub grade:  f64,
    /// The maximum score possible
    pub out_of: f64,
}

impl Grade {
    /// Creates a new grade -
    /// * `grade` - The score received
    /// * `out_of` - The maximum score possible
    pub fn new(grade: f64, out_of: f64) -> Self {
        Self { grade, out_of }
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}/{:.2}", self.grade, self.out_of)
    }
}

#[derive(Tabled, Clone, Debug, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
/// One line of a grading overview
pub struct ScoreRow {
    #[tabled(rename = "Requirement")]
    /// * `requirement`: heading of the node, indented by depth
    #[builder(setter(into))]
    pub(crate) requirement: String,
    #[tabled(rename = "Grade")]
    /// * `grade`: score received for the above requirement
    pub(crate) grade:       Grade,
    #[tabled(rename = "Reason")]
    /// * `reason`: why the score was voided, if it was
    #[builder(default, setter(into))]
    pub(crate) reason:      String,
}

impl ScoreRow {
    /// Requirement column.
    pub fn requirement(&self) -> &str {
        &self.requirement
    }

    /// Grade column.
    pub fn grade(&self) -> Grade {
        self.grade
    }

    /// Reason column.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[derive(Tabled, Clone, Debug, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
/// One grader feedback entry
pub struct FeedbackRow {
    #[tabled(rename = "Level")]
    /// * `level`: severity reported by the grader
    #[builder(setter(into))]
    pub(crate) level:   String,
    #[tabled(rename = "Title")]
    /// * `title`: short label, if any
    #[builder(default, setter(into))]
    pub(crate) title:   String,
    #[tabled(rename = "Content")]
    /// * `content`: the message itself
    #[builder(default, setter(into))]
    pub(crate) content: String,
}

/// Flattens a tree into overview rows, in preorder.
pub fn score_rows(root: &FeedbackNode) -> Vec<ScoreRow> {
    let mut rows = Vec::new();
    let mut pending = vec![(root, 0usize)];
    while let Some((node, depth)) = pending.pop() {
        let grade = Grade::new(node.score().unwrap_or_default(), node.max_score());
        let mut reason = node.nullify_reason().unwrap_or_default().to_string();
        if node.is_leaf() && node.has_internal_error() {
            reason = if reason.is_empty() {
                "internal grader error".to_string()
            } else {
                format!("{reason}; internal grader error")
            };
        }
        rows.push(
            ScoreRow::builder()
                .requirement(format!("{}{}", "  ".repeat(depth), node.heading()))
                .grade(grade)
                .reason(reason)
                .build(),
        );
        pending.extend(node.children().iter().rev().map(|child| (child, depth + 1)));
    }
    rows
}

/// Rows for a list of feedback entries.
pub fn feedback_rows(entries: &[FeedbackEntry]) -> Vec<FeedbackRow> {
    entries
        .iter()
        .map(|entry| {
            FeedbackRow::builder()
                .level(entry.level.to_string())
                .title(entry.title.clone().unwrap_or_default())
                .content(entry.content.clone().unwrap_or_default())
                .build()
        })
        .collect()
}

/// Renders overview rows the way every table in this crate looks.
fn render(rows: &[ScoreRow], header: &str, footer: String) -> String {
    Table::new(rows)
        .with(Panel::header(header))
        .with(Panel::footer(footer))
        .with(Modify::new(Rows::new(1..)).with(Width::wrap(24).keep_words(true)))
        .with(
            Modify::new(Rows::first())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(
            Modify::new(Rows::last())
                .with(Alignment::center())
                .with(Alignment::center_vertical()),
        )
        .with(Style::modern())
        .to_string()
}

/// Table of maximum scores for a scheme.
pub fn scheme_table(scheme: &GradingScheme) -> String {
    let rows = score_rows(scheme.root());
    render(
        &rows,
        "Grading Scheme",
        format!("Maximum: {:.2}", scheme.max_score()),
    )
}

/// Table of achieved scores for a graded submission.
pub fn score_table(feedback: &SeparateFeedback) -> String {
    let rows = score_rows(feedback.detailed_feedback());
    let total = Grade::new(feedback.score(), feedback.max_score());
    render(&rows, "Grading Overview", format!("Total: {total}"))
}

/// Table of a merged result, which has no per-test breakdown.
pub fn merged_table(merged: &MergedFeedback) -> String {
    let total = Grade::new(merged.score, merged.max_score);
    let rows = vec![
        ScoreRow::builder()
            .requirement("Overall result")
            .grade(total)
            .reason(if merged.has_internal_error {
                "internal grader error"
            } else {
                ""
            })
            .build(),
    ];
    render(&rows, "Grading Overview", format!("Total: {total}"))
}

/// Table of the grader's submission-level feedback, or `None` when there is
/// nothing to show.
pub fn feedback_table(feedback: &FeedbackList, for_teacher: bool) -> Option<String> {
    let entries = if for_teacher {
        &feedback.teacher
    } else {
        &feedback.student
    };
    if entries.is_empty() {
        return None;
    }

    let header = if for_teacher {
        "Teacher Feedback"
    } else {
        "Student Feedback"
    };
    Some(
        Table::new(feedback_rows(entries))
            .with(Panel::header(header))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(48).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
            .to_string(),
    )
}
