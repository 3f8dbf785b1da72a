#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use thiserror::Error;

/// Conditions that abort a grading pass.
///
/// None of these can be recovered from inside a single pass: whatever has been
/// computed so far is dropped and the caller decides what the learner sees
/// (usually "needs manual grading").
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradingError {
    /// The grader's response has no result for a test the grading hints need.
    #[error(
        "The grader returned no result for test `{refid}`{}.",
        subref_suffix(.subref)
    )]
    MissingTestResult {
        /// Test identifier as referenced by the grading hints.
        refid:  String,
        /// Sub-test identifier, if the reference selects one.
        subref: Option<String>,
    },
    /// The grader's response is structurally impossible for this task.
    #[error("The grader response violates the ProFormA format: {0}")]
    SpecificationViolation(String),
    /// The task's grading hints are cyclic, too deep, or reference unknown ids.
    #[error("The task's grading hints are malformed: {0}")]
    MalformedTaskStructure(String),
    /// The document could not be read as XML at all.
    #[error("Could not parse the document: {0}")]
    MalformedDocument(String),
}

impl From<quick_xml::Error> for GradingError {
    fn from(err: quick_xml::Error) -> Self {
        GradingError::MalformedDocument(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for GradingError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        GradingError::MalformedDocument(err.to_string())
    }
}

/// Formats the optional sub-test part of a missing-result message.
fn subref_suffix(subref: &Option<String>) -> String {
    subref
        .as_ref()
        .map(|s| format!(" (sub-test `{s}`)"))
        .unwrap_or_default()
}

/// Shorthand used throughout the grading core.
pub type GradingResult<T> = std::result::Result<T, GradingError>;
