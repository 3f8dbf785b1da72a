#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Typed grading-hints structures.
pub mod model;
/// Conversion of task documents into grading hints.
pub mod parser;
/// Maximum scores and score compensation.
pub mod score;
/// Serialization of grading hints back to XML.
pub mod writer;

pub use model::{
    AccumulatorFunction, CombineDefinition, CombineRef, GradingHints, GradingRef, HintText,
    TestDefinition, TestRef,
};
pub use parser::TaskDescription;
pub use score::compensation_factor;
pub use writer::PROFORMA_NAMESPACE;
