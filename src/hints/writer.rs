#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use anyhow::{Context, Result};
use quick_xml::{
    Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};

use super::model::{CombineDefinition, CombineRef, GradingHints, GradingRef, HintText, TestRef};
use crate::nullify::NullifyExpr;

/// Namespace written on serialized grading hints.
pub const PROFORMA_NAMESPACE: &str = "urn:proforma:v2.1";

/// Writer over an in-memory buffer.
type XmlWriter = Writer<Vec<u8>>;

impl GradingHints {
    /// Serializes the hints as a ProFormA `<grading-hints>` element.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        let mut start = BytesStart::new("grading-hints");
        start.push_attribute(("xmlns", PROFORMA_NAMESPACE));
        writer.write_event(Event::Start(start))?;

        if let Some(root) = self.root() {
            write_grouping(&mut writer, "root", root)?;
        }
        for combine in self.combines() {
            write_grouping(&mut writer, "combine", combine)?;
        }

        writer.write_event(Event::End(BytesEnd::new("grading-hints")))?;

        String::from_utf8(writer.into_inner()).context("Serialized grading hints are not UTF-8")
    }
}

/// Writes a `<root>` or `<combine>`.
fn write_grouping(writer: &mut XmlWriter, tag: &str, grouping: &CombineDefinition) -> Result<()> {
    let mut start = BytesStart::new(tag);
    if !grouping.id.is_empty() {
        start.push_attribute(("id", grouping.id.as_str()));
    }
    start.push_attribute(("function", grouping.function.as_str()));
    writer.write_event(Event::Start(start))?;

    write_text(writer, &grouping.text)?;
    for grading_ref in &grouping.refs {
        match grading_ref {
            GradingRef::Test(test_ref) => write_test_ref(writer, test_ref)?,
            GradingRef::Combine(combine_ref) => write_combine_ref(writer, combine_ref)?,
        }
    }

    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Writes title and description children that are present.
fn write_text(writer: &mut XmlWriter, text: &HintText) -> Result<()> {
    for (tag, value) in [
        ("title", &text.title),
        ("description", &text.description),
        ("internal-description", &text.internal_description),
    ] {
        if let Some(value) = value {
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
    }
    Ok(())
}

/// Writes a `<test-ref>`.
fn write_test_ref(writer: &mut XmlWriter, test_ref: &TestRef) -> Result<()> {
    let weight = test_ref.weight.to_string();
    let mut start = BytesStart::new("test-ref");
    start.push_attribute(("ref", test_ref.refid.as_str()));
    if let Some(subref) = &test_ref.subref {
        start.push_attribute(("sub-ref", subref.as_str()));
    }
    start.push_attribute(("weight", weight.as_str()));

    let has_text = test_ref.text != HintText::default();
    if !has_text && test_ref.nullify.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    write_text(writer, &test_ref.text)?;
    if let Some(condition) = &test_ref.nullify {
        write_condition(writer, condition)?;
    }
    writer.write_event(Event::End(BytesEnd::new("test-ref")))?;
    Ok(())
}

/// Writes a `<combine-ref>`.
fn write_combine_ref(writer: &mut XmlWriter, combine_ref: &CombineRef) -> Result<()> {
    let weight = combine_ref.weight.to_string();
    let mut start = BytesStart::new("combine-ref");
    start.push_attribute(("ref", combine_ref.refid.as_str()));
    start.push_attribute(("weight", weight.as_str()));

    match &combine_ref.nullify {
        None => writer.write_event(Event::Empty(start))?,
        Some(condition) => {
            writer.write_event(Event::Start(start))?;
            write_condition(writer, condition)?;
            writer.write_event(Event::End(BytesEnd::new("combine-ref")))?;
        }
    }
    Ok(())
}

/// Writes a nullify predicate or operand.
fn write_condition(writer: &mut XmlWriter, expr: &NullifyExpr) -> Result<()> {
    match expr {
        NullifyExpr::Comparison { left, op, right } => {
            let mut start = BytesStart::new("nullify-condition");
            start.push_attribute(("compare-op", op.as_str()));
            writer.write_event(Event::Start(start))?;
            write_condition(writer, left)?;
            write_condition(writer, right)?;
            writer.write_event(Event::End(BytesEnd::new("nullify-condition")))?;
        }
        NullifyExpr::Composite { op, operands } => {
            let mut start = BytesStart::new("nullify-conditions");
            start.push_attribute(("compose-op", op.as_str()));
            writer.write_event(Event::Start(start))?;
            for operand in operands {
                write_condition(writer, operand)?;
            }
            writer.write_event(Event::End(BytesEnd::new("nullify-conditions")))?;
        }
        NullifyExpr::Literal(value) => {
            let value = value.to_string();
            let mut start = BytesStart::new("nullify-literal");
            start.push_attribute(("value", value.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
        NullifyExpr::TestRef { refid, subref } => {
            let mut start = BytesStart::new("nullify-test-ref");
            start.push_attribute(("ref", refid.as_str()));
            if let Some(subref) = subref {
                start.push_attribute(("sub-ref", subref.as_str()));
            }
            writer.write_event(Event::Empty(start))?;
        }
        NullifyExpr::CombineRef { refid } => {
            let mut start = BytesStart::new("nullify-combine-ref");
            start.push_attribute(("ref", refid.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
    }
    Ok(())
}
