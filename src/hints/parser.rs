#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{borrow::Cow, collections::HashSet, path::Path};

use anyhow::Context;
use tracing::debug;

use super::model::{
    AccumulatorFunction, CombineDefinition, CombineRef, GradingHints, GradingRef, HintText,
    TestDefinition, TestRef,
};
use crate::{
    constants::{DEFAULT_MAX_DEPTH, DEFAULT_WEIGHT},
    error::{GradingError, GradingResult},
    nullify::{CompareOp, ComposeOp, NullifyExpr},
    xml::Element,
};

/// The parts of a ProFormA task the grading core needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDescription {
    /// Task title.
    title:         Option<String>,
    /// Declared tests in document order.
    tests:         Vec<TestDefinition>,
    /// The grading-hints section, possibly empty.
    grading_hints: GradingHints,
}

impl TaskDescription {
    /// Assembles a task from already parsed parts.
    pub fn new(
        title: Option<String>,
        tests: Vec<TestDefinition>,
        grading_hints: GradingHints,
    ) -> Self {
        Self {
            title,
            tests,
            grading_hints,
        }
    }

    /// Parses a `<task>` document.
    pub fn from_xml(xml: &str) -> GradingResult<Self> {
        let root = Element::parse(xml)?;
        Self::from_element(&root)
    }

    /// Reads and parses a task file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read task file {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("Could not parse task file {}", path.display()))
    }

    /// Converts a parsed `<task>` element.
    pub fn from_element(task: &Element) -> GradingResult<Self> {
        if task.name != "task" {
            return Err(GradingError::MalformedDocument(format!(
                "expected a `task` document, found `{}`",
                task.name
            )));
        }

        let mut tests = Vec::new();
        if let Some(section) = task.child("tests") {
            let mut seen = HashSet::new();
            for test in section.children_named("test") {
                let test = parse_test(test)?;
                if !seen.insert(test.id.clone()) {
                    return Err(GradingError::MalformedTaskStructure(format!(
                        "test `{}` is declared twice",
                        test.id
                    )));
                }
                tests.push(test);
            }
        }

        let grading_hints = match task.child("grading-hints") {
            Some(section) => GradingHints::from_element(section)?,
            None => GradingHints::default(),
        };

        Ok(Self {
            title: task.child_text("title"),
            tests,
            grading_hints,
        })
    }

    /// Task title.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Declared tests in document order.
    pub fn tests(&self) -> &[TestDefinition] {
        &self.tests
    }

    /// Looks up a declared test.
    pub fn test(&self, id: &str) -> Option<&TestDefinition> {
        self.tests.iter().find(|test| test.id == id)
    }

    /// The grading hints exactly as declared.
    pub fn grading_hints(&self) -> &GradingHints {
        &self.grading_hints
    }

    /// Mutable access to the declared grading hints.
    pub fn grading_hints_mut(&mut self) -> &mut GradingHints {
        &mut self.grading_hints
    }

    /// True when the task declares no usable grading hints and every test is
    /// weighted equally under a `min` root.
    pub fn is_flat(&self) -> bool {
        self.grading_hints.is_empty()
    }

    /// The grading hints to grade with: the declared ones, or flat hints with
    /// one leaf per declared test.
    pub fn effective_hints(&self) -> Cow<'_, GradingHints> {
        if self.is_flat() {
            debug!(tests = self.tests.len(), "no grading hints declared, grading flat");
            Cow::Owned(GradingHints::flat(&self.tests))
        } else {
            Cow::Borrowed(&self.grading_hints)
        }
    }
}

impl GradingHints {
    /// Parses a standalone `<grading-hints>` element.
    pub fn from_xml(xml: &str) -> GradingResult<Self> {
        let root = Element::parse(xml)?;
        Self::from_element(&root)
    }

    /// Converts a parsed `<grading-hints>` element.
    pub fn from_element(section: &Element) -> GradingResult<Self> {
        if section.name != "grading-hints" {
            return Err(GradingError::MalformedDocument(format!(
                "expected a `grading-hints` element, found `{}`",
                section.name
            )));
        }

        let root = section.child("root").map(parse_grouping).transpose()?;

        let mut combines: Vec<CombineDefinition> = Vec::new();
        for element in section.children_named("combine") {
            let combine = parse_grouping(element)?;
            if combine.id.is_empty() {
                return Err(GradingError::MalformedTaskStructure(
                    "combine without an `id`".into(),
                ));
            }
            if combines.iter().any(|c| c.id == combine.id) {
                return Err(GradingError::MalformedTaskStructure(format!(
                    "combine `{}` is declared twice",
                    combine.id
                )));
            }
            combines.push(combine);
        }

        Ok(GradingHints::new(root, combines))
    }
}

/// Reads the title and description children shared by several elements.
fn parse_text(element: &Element) -> HintText {
    HintText {
        title:                element.child_text("title"),
        description:          element.child_text("description"),
        internal_description: element.child_text("internal-description"),
    }
}

/// Reads a required attribute.
fn required<'a>(element: &'a Element, attribute: &str) -> GradingResult<&'a str> {
    element
        .attribute(attribute)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            GradingError::MalformedTaskStructure(format!(
                "`{}` element without `{attribute}`",
                element.name
            ))
        })
}

/// Parses a numeric attribute value.
fn parse_number(raw: &str, what: &str) -> GradingResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| GradingError::MalformedTaskStructure(format!("invalid {what} `{raw}`")))
}

/// Reads the optional `weight` attribute.
fn parse_weight(element: &Element) -> GradingResult<f64> {
    match element.attribute("weight") {
        Some(raw) => {
            let weight = parse_number(raw, "weight")?;
            if weight < 0.0 {
                return Err(GradingError::MalformedTaskStructure(format!(
                    "negative weight `{raw}`"
                )));
            }
            Ok(weight)
        }
        None => Ok(DEFAULT_WEIGHT),
    }
}

/// Parses a `<test>` of the tests section.
fn parse_test(element: &Element) -> GradingResult<TestDefinition> {
    Ok(TestDefinition {
        id:        required(element, "id")?.to_string(),
        text:      parse_text(element),
        test_type: element.child_text("test-type"),
    })
}

/// Parses a `<root>` or `<combine>` element.
fn parse_grouping(element: &Element) -> GradingResult<CombineDefinition> {
    let function = match element.attribute("function") {
        Some(raw) => raw.parse::<AccumulatorFunction>()?,
        None => AccumulatorFunction::default(),
    };

    let mut refs = Vec::new();
    for child in &element.children {
        match child.name.as_str() {
            "test-ref" => refs.push(GradingRef::Test(parse_test_ref(child)?)),
            "combine-ref" => refs.push(GradingRef::Combine(parse_combine_ref(child)?)),
            _ => {}
        }
    }

    Ok(CombineDefinition {
        id: element.attribute("id").unwrap_or_default().trim().to_string(),
        function,
        text: parse_text(element),
        refs,
    })
}

/// Parses a `<test-ref>`.
fn parse_test_ref(element: &Element) -> GradingResult<TestRef> {
    Ok(TestRef {
        refid:   required(element, "ref")?.to_string(),
        subref:  element
            .attribute("sub-ref")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        weight:  parse_weight(element)?,
        text:    parse_text(element),
        nullify: parse_nullify_child(element)?,
    })
}

/// Parses a `<combine-ref>`.
fn parse_combine_ref(element: &Element) -> GradingResult<CombineRef> {
    Ok(CombineRef {
        refid:   required(element, "ref")?.to_string(),
        weight:  parse_weight(element)?,
        nullify: parse_nullify_child(element)?,
    })
}

/// True for the two elements that can carry a nullify predicate.
fn is_condition(element: &Element) -> bool {
    matches!(element.name.as_str(), "nullify-condition" | "nullify-conditions")
}

/// Parses the single nullify predicate of a test-ref or combine-ref, if any.
fn parse_nullify_child(element: &Element) -> GradingResult<Option<NullifyExpr>> {
    let mut conditions = element.children.iter().filter(|c| is_condition(c));
    let Some(first) = conditions.next() else {
        return Ok(None);
    };
    if conditions.next().is_some() {
        return Err(GradingError::MalformedTaskStructure(format!(
            "`{}` to `{}` has more than one nullify condition",
            element.name,
            element.attribute("ref").unwrap_or_default()
        )));
    }
    parse_condition(first, 1).map(Some)
}

/// Parses a `<nullify-condition>` or `<nullify-conditions>` found `depth`
/// levels below its reference.
fn parse_condition(element: &Element, depth: usize) -> GradingResult<NullifyExpr> {
    if depth > DEFAULT_MAX_DEPTH {
        return Err(GradingError::MalformedTaskStructure(format!(
            "nullify conditions nest deeper than {DEFAULT_MAX_DEPTH} levels"
        )));
    }
    match element.name.as_str() {
        "nullify-condition" => {
            let op = required(element, "compare-op")?.parse::<CompareOp>()?;
            let mut operands = element
                .children
                .iter()
                .map(parse_operand)
                .collect::<GradingResult<Vec<_>>>()?;
            if operands.len() != 2 {
                return Err(GradingError::MalformedTaskStructure(format!(
                    "nullify-condition needs exactly two operands, found {}",
                    operands.len()
                )));
            }
            let right = operands.pop().unwrap_or(NullifyExpr::Literal(0.0));
            let left = operands.pop().unwrap_or(NullifyExpr::Literal(0.0));
            Ok(NullifyExpr::comparison(left, op, right))
        }
        "nullify-conditions" => {
            let op = required(element, "compose-op")?.parse::<ComposeOp>()?;
            let operands = element
                .children
                .iter()
                .filter(|c| is_condition(c))
                .map(|c| parse_condition(c, depth + 1))
                .collect::<GradingResult<Vec<_>>>()?;
            if operands.len() < 2 {
                return Err(GradingError::MalformedTaskStructure(format!(
                    "nullify-conditions needs at least two operands, found {}",
                    operands.len()
                )));
            }
            Ok(NullifyExpr::composite(op, operands))
        }
        other => Err(GradingError::MalformedTaskStructure(format!(
            "`{other}` is not a nullify condition"
        ))),
    }
}

/// Parses one operand of a `<nullify-condition>`.
fn parse_operand(element: &Element) -> GradingResult<NullifyExpr> {
    match element.name.as_str() {
        "nullify-literal" => Ok(NullifyExpr::Literal(parse_number(
            required(element, "value")?,
            "nullify literal",
        )?)),
        "nullify-test-ref" => Ok(NullifyExpr::test_ref(
            required(element, "ref")?,
            element
                .attribute("sub-ref")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )),
        "nullify-combine-ref" => Ok(NullifyExpr::combine_ref(required(element, "ref")?)),
        other => Err(GradingError::MalformedTaskStructure(format!(
            "`{other}` is not a nullify operand"
        ))),
    }
}
