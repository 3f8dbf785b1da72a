//! # proforma-grading
//!
//! Scores ProFormA grader responses against the grading hints of a task and
//! turns them into a feedback tree an LMS can show to learners and teachers.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Environment-backed settings and per-pass grading options
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Errors that abort a grading pass
pub mod error;
/// Merging grader responses with grading hints
pub mod feedback;
/// Grading hints: model, parsing, writing and maximum scores
pub mod hints;
/// Nullify conditions and their evaluation
pub mod nullify;
/// Tables for showing schemes and results on a terminal
pub mod report;
/// Grader response documents
pub mod response;
/// Grading schemes built before any submission exists
pub mod scheme;
/// The tree shared by schemes and detailed feedback
pub mod tree;
/// Minimal owned XML element tree
pub mod xml;

pub use config::GradingOptions;
pub use error::{GradingError, GradingResult};
pub use feedback::{GradingOutcome, MergedFeedback, SeparateFeedback, process_result};
pub use hints::{GradingHints, TaskDescription};
pub use nullify::NullifyExpr;
pub use response::ResponseDocument;
pub use scheme::GradingScheme;
pub use tree::FeedbackNode;
