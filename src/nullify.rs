#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Display, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{GradingError, GradingResult};

/// Comparison operator of a `nullify-condition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
}

impl CompareOp {
    /// Applies the operator.
    #[allow(clippy::float_cmp)]
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
        }
    }

    /// Name used in ProFormA documents.
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        }
    }

    /// Mathematical symbol, for descriptions.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "≠",
            CompareOp::Gt => ">",
            CompareOp::Ge => "≥",
            CompareOp::Lt => "<",
            CompareOp::Le => "≤",
        }
    }
}

impl FromStr for CompareOp {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "eq" => Ok(CompareOp::Eq),
            "ne" => Ok(CompareOp::Ne),
            "gt" => Ok(CompareOp::Gt),
            "ge" => Ok(CompareOp::Ge),
            "lt" => Ok(CompareOp::Lt),
            "le" => Ok(CompareOp::Le),
            other => Err(GradingError::MalformedTaskStructure(format!(
                "unknown compare-op `{other}`"
            ))),
        }
    }
}

/// Boolean operator of a `nullify-conditions` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeOp {
    /// All operands must hold.
    And,
    /// At least one operand must hold.
    Or,
}

impl ComposeOp {
    /// Neutral starting value of the fold.
    pub fn seed(self) -> bool {
        matches!(self, ComposeOp::And)
    }

    /// Folds the next operand into the accumulated value.
    pub fn merge(self, acc: bool, value: bool) -> bool {
        match self {
            ComposeOp::And => acc && value,
            ComposeOp::Or => acc || value,
        }
    }

    /// Name used in ProFormA documents.
    pub fn as_str(self) -> &'static str {
        match self {
            ComposeOp::And => "and",
            ComposeOp::Or => "or",
        }
    }
}

impl FromStr for ComposeOp {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "and" => Ok(ComposeOp::And),
            "or" => Ok(ComposeOp::Or),
            other => Err(GradingError::MalformedTaskStructure(format!(
                "unknown compose-op `{other}`"
            ))),
        }
    }
}

impl Display for ComposeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A nullify expression.
///
/// Only `Comparison` and `Composite` are predicates; the remaining variants
/// are numeric operands of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NullifyExpr {
    /// A constant.
    Literal(f64),
    /// The raw score of a test result.
    TestRef {
        /// Referenced test id.
        refid:  String,
        /// Named sub-result, if any.
        subref: Option<String>,
    },
    /// The raw score of a combine.
    CombineRef {
        /// Referenced combine id.
        refid: String,
    },
    /// Binary comparison of two operands.
    Comparison {
        /// Left operand.
        left:  Box<NullifyExpr>,
        /// Operator.
        op:    CompareOp,
        /// Right operand.
        right: Box<NullifyExpr>,
    },
    /// Boolean fold over nested predicates.
    Composite {
        /// Operator.
        op:       ComposeOp,
        /// Nested comparisons and composites.
        operands: Vec<NullifyExpr>,
    },
}

/// Supplies operand values while a nullify expression is evaluated.
pub trait OperandSource {
    /// Raw, unweighted score of a test result.
    fn test_score(&mut self, refid: &str, subref: Option<&str>) -> GradingResult<f64>;

    /// Raw score of a combine, accumulated with task weights but without score
    /// compensation.
    fn combine_score(&mut self, refid: &str) -> GradingResult<f64>;

    /// Weight that scales literals compared against this combine.
    fn combine_weight(&self, refid: &str) -> f64;
}

impl NullifyExpr {
    /// Builds a comparison.
    pub fn comparison(left: NullifyExpr, op: CompareOp, right: NullifyExpr) -> Self {
        NullifyExpr::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Builds a composite.
    pub fn composite(op: ComposeOp, operands: Vec<NullifyExpr>) -> Self {
        NullifyExpr::Composite { op, operands }
    }

    /// Builds a test-ref operand.
    pub fn test_ref(refid: impl Into<String>, subref: Option<String>) -> Self {
        NullifyExpr::TestRef {
            refid: refid.into(),
            subref,
        }
    }

    /// Builds a combine-ref operand.
    pub fn combine_ref(refid: impl Into<String>) -> Self {
        NullifyExpr::CombineRef {
            refid: refid.into(),
        }
    }

    /// True for comparisons and composites.
    pub fn is_predicate(&self) -> bool {
        matches!(self, NullifyExpr::Comparison { .. } | NullifyExpr::Composite { .. })
    }

    /// Decides whether the score guarded by this expression must be voided.
    pub fn should_nullify<S>(&self, source: &mut S) -> GradingResult<bool>
    where
        S: OperandSource + ?Sized,
    {
        match self {
            NullifyExpr::Comparison { left, op, right } => {
                let (left, right) = Self::operands(left, right, source)?;
                Ok(op.apply(left, right))
            }
            NullifyExpr::Composite { op, operands } => {
                let mut acc = op.seed();
                for operand in operands.iter().filter(|o| o.is_predicate()) {
                    let value = operand.should_nullify(source)?;
                    acc = op.merge(acc, value);
                }
                Ok(acc)
            }
            _ => Err(GradingError::MalformedTaskStructure(
                "a nullify condition must be a comparison or a composition".into(),
            )),
        }
    }

    /// Resolves both sides of a comparison. A literal compared against a
    /// combine is scaled by that combine's weight.
    fn operands<S>(
        left: &NullifyExpr,
        right: &NullifyExpr,
        source: &mut S,
    ) -> GradingResult<(f64, f64)>
    where
        S: OperandSource + ?Sized,
    {
        match (left, right) {
            (NullifyExpr::Literal(value), NullifyExpr::CombineRef { refid }) => {
                let scaled = value * source.combine_weight(refid);
                Ok((scaled, source.combine_score(refid)?))
            }
            (NullifyExpr::CombineRef { refid }, NullifyExpr::Literal(value)) => {
                let scaled = value * source.combine_weight(refid);
                Ok((source.combine_score(refid)?, scaled))
            }
            _ => Ok((left.value(source)?, right.value(source)?)),
        }
    }

    /// Numeric value of an operand.
    fn value<S>(&self, source: &mut S) -> GradingResult<f64>
    where
        S: OperandSource + ?Sized,
    {
        match self {
            NullifyExpr::Literal(value) => Ok(*value),
            NullifyExpr::TestRef { refid, subref } => source.test_score(refid, subref.as_deref()),
            NullifyExpr::CombineRef { refid } => source.combine_score(refid),
            NullifyExpr::Comparison { .. } | NullifyExpr::Composite { .. } => {
                Err(GradingError::MalformedTaskStructure(
                    "a comparison operand must be a literal, test-ref or combine-ref".into(),
                ))
            }
        }
    }

    /// Renders the expression for humans. `name` maps a test-ref or
    /// combine-ref operand to a display name; unresolved references fall back
    /// to their ids.
    pub fn describe<F>(&self, name: &F) -> String
    where
        F: Fn(&NullifyExpr) -> Option<String>,
    {
        match self {
            NullifyExpr::Literal(value) => format!("{value}"),
            NullifyExpr::TestRef { refid, subref } => {
                let label = name(self).unwrap_or_else(|| match subref {
                    Some(subref) => format!("{refid}/{subref}"),
                    None => refid.clone(),
                });
                format!("score of '{label}'")
            }
            NullifyExpr::CombineRef { refid } => {
                let label = name(self).unwrap_or_else(|| refid.clone());
                format!("score of '{label}'")
            }
            NullifyExpr::Comparison { left, op, right } => {
                format!("{} {} {}", left.describe(name), op.symbol(), right.describe(name))
            }
            NullifyExpr::Composite { op, operands } => {
                let inner = operands
                    .iter()
                    .map(|operand| operand.describe(name))
                    .join(&format!(" {op} "));
                format!("({inner})")
            }
        }
    }
}
