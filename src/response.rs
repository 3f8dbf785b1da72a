#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    str::FromStr,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{GradingError, GradingResult},
    xml::Element,
};

/// Severity attached to a feedback entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    /// Diagnostic output.
    Debug,
    /// Regular information.
    #[default]
    Info,
    /// Something the learner should look at.
    Warn,
    /// A failure.
    Error,
}

impl FromStr for FeedbackLevel {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "debug" => Ok(FeedbackLevel::Debug),
            "info" => Ok(FeedbackLevel::Info),
            "warn" => Ok(FeedbackLevel::Warn),
            "error" => Ok(FeedbackLevel::Error),
            other => Err(GradingError::SpecificationViolation(format!(
                "unknown feedback level `{other}`"
            ))),
        }
    }
}

impl std::fmt::Display for FeedbackLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            FeedbackLevel::Debug => "debug",
            FeedbackLevel::Info => "info",
            FeedbackLevel::Warn => "warn",
            FeedbackLevel::Error => "error",
        };
        f.write_str(level)
    }
}

/// Markup of a feedback entry's content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// HTML fragment.
    Html,
    /// Plain text.
    #[default]
    Plaintext,
}

/// A file whose content travels inside the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    /// File id within the response.
    pub id:       String,
    /// Display file name.
    pub filename: Option<String>,
    /// MIME type declared by the grader.
    pub mimetype: Option<String>,
    /// True for base64 encoded binary content.
    pub binary:   bool,
    /// Content as found in the document.
    pub content:  String,
}

/// A file shipped next to the response document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedFile {
    /// File id within the response.
    pub id:       String,
    /// Path of the file relative to the response.
    pub path:     String,
    /// MIME type declared by the grader.
    pub mimetype: Option<String>,
    /// True for binary files.
    pub binary:   bool,
}

/// Any file of the response's files section.
#[derive(Debug, Clone, PartialEq)]
enum ResponseFile {
    /// Inline content.
    Embedded(EmbeddedFile),
    /// Reference to a separate file.
    Attached(AttachedFile),
}

/// One student or teacher feedback entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// Severity.
    pub level:          FeedbackLevel,
    /// Optional heading.
    pub title:          Option<String>,
    /// Optional body.
    pub content:        Option<String>,
    /// Markup of `content`.
    pub format:         ContentFormat,
    /// Referenced files with inline content.
    pub embedded_files: Vec<EmbeddedFile>,
    /// Referenced files shipped separately.
    pub attached_files: Vec<AttachedFile>,
}

/// Student and teacher feedback entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackList {
    /// Entries meant for the learner.
    pub student: Vec<FeedbackEntry>,
    /// Entries meant for teachers only.
    pub teacher: Vec<FeedbackEntry>,
}

impl FeedbackList {
    /// True when neither list has entries.
    pub fn is_empty(&self) -> bool {
        self.student.is_empty() && self.teacher.is_empty()
    }
}

/// The outcome of one test or sub-test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraderResult {
    /// Raw score between 0 and 1.
    pub score:             f64,
    /// How reliable the score is, if the grader says.
    pub validity:          Option<f64>,
    /// The grader failed internally while running this test.
    pub is_internal_error: bool,
    /// Feedback attached to this result.
    pub feedback:          FeedbackList,
}

/// A named sub-result of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtestResult {
    /// Sub-test id.
    pub id:     String,
    /// The sub-test's outcome.
    pub result: GraderResult,
}

/// What the grader returned for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResponse {
    /// One result for the whole test.
    Result(GraderResult),
    /// Named sub-results.
    Subtests(Vec<SubtestResult>),
}

/// A `separate-test-feedback` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeparateTestFeedback {
    /// Feedback about the submission as a whole.
    submission_feedback: FeedbackList,
    /// Test responses in document order.
    tests:               Vec<(String, TestResponse)>,
}

impl SeparateTestFeedback {
    /// Assembles a response from parsed parts.
    pub fn new(submission_feedback: FeedbackList, tests: Vec<(String, TestResponse)>) -> Self {
        Self {
            submission_feedback,
            tests,
        }
    }

    /// Feedback about the submission as a whole.
    pub fn submission_feedback(&self) -> &FeedbackList {
        &self.submission_feedback
    }

    /// Test responses in document order.
    pub fn tests(&self) -> impl Iterator<Item = (&str, &TestResponse)> {
        self.tests.iter().map(|(id, response)| (id.as_str(), response))
    }

    /// The grader's response for a test.
    pub fn test_response(&self, refid: &str) -> Option<&TestResponse> {
        self.tests
            .iter()
            .find(|(id, _)| id == refid)
            .map(|(_, response)| response)
    }

    /// Resolves the result a test-ref points at.
    pub fn result(&self, refid: &str, subref: Option<&str>) -> GradingResult<&GraderResult> {
        let missing = || GradingError::MissingTestResult {
            refid:  refid.to_string(),
            subref: subref.map(str::to_string),
        };

        match (self.test_response(refid).ok_or_else(missing)?, subref) {
            (TestResponse::Result(result), None) => Ok(result),
            (TestResponse::Result(_), Some(_)) => Err(missing()),
            (TestResponse::Subtests(subtests), Some(subref)) => subtests
                .iter()
                .find(|subtest| subtest.id == subref)
                .map(|subtest| &subtest.result)
                .ok_or_else(missing),
            (TestResponse::Subtests(_), None) => Err(GradingError::SpecificationViolation(
                format!("sub-results returned for test `{refid}`, which is graded as a whole"),
            )),
        }
    }
}

/// A `merged-test-feedback` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedTestFeedback {
    /// Overall raw score between 0 and 1.
    pub score:             f64,
    /// How reliable the score is, if the grader says.
    pub validity:          Option<f64>,
    /// The grader failed internally.
    pub is_internal_error: bool,
    /// HTML feedback for the learner.
    pub student_feedback:  Option<String>,
    /// HTML feedback for teachers.
    pub teacher_feedback:  Option<String>,
}

/// The feedback part of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFeedback {
    /// Per-test results.
    Separate(SeparateTestFeedback),
    /// One overall result.
    Merged(MergedTestFeedback),
}

/// Name and version of the grader that produced a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraderEngine {
    /// Engine name.
    pub name:    Option<String>,
    /// Engine version.
    pub version: Option<String>,
}

/// A parsed ProFormA `<response>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDocument {
    /// Separate or merged feedback.
    feedback:      ResponseFeedback,
    /// The grader that produced the response.
    grader_engine: Option<GraderEngine>,
}

impl ResponseDocument {
    /// Assembles a response from parsed parts.
    pub fn new(feedback: ResponseFeedback, grader_engine: Option<GraderEngine>) -> Self {
        Self {
            feedback,
            grader_engine,
        }
    }

    /// Parses a `<response>` document.
    pub fn from_xml(xml: &str) -> GradingResult<Self> {
        let root = Element::parse(xml)?;
        Self::from_element(&root)
    }

    /// Reads and parses a response file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read response file {}", path.display()))?;
        Self::from_xml(&xml)
            .with_context(|| format!("Could not parse response file {}", path.display()))
    }

    /// Converts a parsed `<response>` element.
    pub fn from_element(response: &Element) -> GradingResult<Self> {
        if response.name != "response" {
            return Err(GradingError::MalformedDocument(format!(
                "expected a `response` document, found `{}`",
                response.name
            )));
        }

        let files = match response.child("files") {
            Some(section) => parse_files(section)?,
            None => HashMap::new(),
        };

        let feedback = match (
            response.child("separate-test-feedback"),
            response.child("merged-test-feedback"),
        ) {
            (Some(separate), None) => ResponseFeedback::Separate(parse_separate(separate, &files)?),
            (None, Some(merged)) => ResponseFeedback::Merged(parse_merged(merged)?),
            (Some(_), Some(_)) => {
                return Err(GradingError::SpecificationViolation(
                    "response carries both separate and merged feedback".into(),
                ));
            }
            (None, None) => {
                return Err(GradingError::SpecificationViolation(
                    "response carries no test feedback".into(),
                ));
            }
        };

        let grader_engine = response
            .child("response-meta-data")
            .and_then(|meta| meta.child("grader-engine"))
            .map(|engine| GraderEngine {
                name:    engine.attribute("name").map(str::to_string),
                version: engine.attribute("version").map(str::to_string),
            });

        Ok(Self {
            feedback,
            grader_engine,
        })
    }

    /// Separate or merged feedback.
    pub fn feedback(&self) -> &ResponseFeedback {
        &self.feedback
    }

    /// The per-test feedback, if this is a separate-feedback response.
    pub fn separate(&self) -> Option<&SeparateTestFeedback> {
        match &self.feedback {
            ResponseFeedback::Separate(separate) => Some(separate),
            ResponseFeedback::Merged(_) => None,
        }
    }

    /// The overall feedback, if this is a merged-feedback response.
    pub fn merged(&self) -> Option<&MergedTestFeedback> {
        match &self.feedback {
            ResponseFeedback::Merged(merged) => Some(merged),
            ResponseFeedback::Separate(_) => None,
        }
    }

    /// The grader that produced the response.
    pub fn grader_engine(&self) -> Option<&GraderEngine> {
        self.grader_engine.as_ref()
    }
}

/// Reads the `<files>` section into a map keyed by file id.
fn parse_files(section: &Element) -> GradingResult<HashMap<String, ResponseFile>> {
    let mut files = HashMap::new();
    for file in section.children_named("file") {
        let id = file
            .attribute("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GradingError::SpecificationViolation("file without `id`".into()))?
            .to_string();
        let mimetype = file.attribute("mimetype").map(str::to_string);

        let body = file.children.first().ok_or_else(|| {
            GradingError::SpecificationViolation(format!("file `{id}` has no content element"))
        })?;
        let parsed = match body.name.as_str() {
            "embedded-txt-file" | "embedded-bin-file" => ResponseFile::Embedded(EmbeddedFile {
                id: id.clone(),
                filename: body.attribute("filename").map(str::to_string),
                mimetype,
                binary: body.name == "embedded-bin-file",
                content: body.text.clone(),
            }),
            "attached-txt-file" | "attached-bin-file" => ResponseFile::Attached(AttachedFile {
                id: id.clone(),
                path: body.text().to_string(),
                mimetype,
                binary: body.name == "attached-bin-file",
            }),
            other => {
                return Err(GradingError::SpecificationViolation(format!(
                    "file `{id}` has unknown content element `{other}`"
                )));
            }
        };

        if files.insert(id.clone(), parsed).is_some() {
            return Err(GradingError::SpecificationViolation(format!(
                "file `{id}` is declared twice"
            )));
        }
    }
    Ok(files)
}

/// Parses a `<separate-test-feedback>`.
fn parse_separate(
    section: &Element,
    files: &HashMap<String, ResponseFile>,
) -> GradingResult<SeparateTestFeedback> {
    let submission_feedback = match section.child("submission-feedback-list") {
        Some(list) => parse_feedback_list(list, files)?,
        None => FeedbackList::default(),
    };

    let mut tests = Vec::new();
    let mut seen = HashSet::new();
    if let Some(responses) = section.child("tests-response") {
        for response in responses.children_named("test-response") {
            let id = response_id(response)?;
            if !seen.insert(id.clone()) {
                return Err(GradingError::SpecificationViolation(format!(
                    "test `{id}` has more than one response"
                )));
            }

            let parsed = if let Some(subtests) = response.child("subtests-response") {
                let mut results = Vec::new();
                for subtest in subtests.children_named("subtest-response") {
                    let subtest_id = response_id(subtest)?;
                    if results.iter().any(|r: &SubtestResult| r.id == subtest_id) {
                        return Err(GradingError::SpecificationViolation(format!(
                            "sub-test `{subtest_id}` of test `{id}` has more than one response"
                        )));
                    }
                    results.push(SubtestResult {
                        result: parse_test_result(subtest, files)?,
                        id:     subtest_id,
                    });
                }
                TestResponse::Subtests(results)
            } else {
                TestResponse::Result(parse_test_result(response, files)?)
            };
            tests.push((id, parsed));
        }
    }

    Ok(SeparateTestFeedback {
        submission_feedback,
        tests,
    })
}

/// Reads the `id` of a test or sub-test response.
fn response_id(element: &Element) -> GradingResult<String> {
    element
        .attribute("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GradingError::SpecificationViolation(format!("`{}` without `id`", element.name)))
}

/// Parses the `<test-result>` child of a test or sub-test response.
fn parse_test_result(
    response: &Element,
    files: &HashMap<String, ResponseFile>,
) -> GradingResult<GraderResult> {
    let id = response.attribute("id").unwrap_or_default();
    let test_result = response.child("test-result").ok_or_else(|| {
        GradingError::SpecificationViolation(format!("response for `{id}` has no test-result"))
    })?;
    let result = test_result.child("result").ok_or_else(|| {
        GradingError::SpecificationViolation(format!("test-result for `{id}` has no result"))
    })?;

    let score = parse_score(result, id)?;
    let feedback = match test_result.child("feedback-list") {
        Some(list) => parse_feedback_list(list, files)?,
        None => FeedbackList::default(),
    };

    Ok(GraderResult {
        score,
        validity: parse_validity(result, id)?,
        is_internal_error: parse_flag(result.attribute("is-internal-error")),
        feedback,
    })
}

/// Reads a `<score>` child.
fn parse_score(result: &Element, id: &str) -> GradingResult<f64> {
    let raw = result.child("score").map(Element::text).ok_or_else(|| {
        GradingError::SpecificationViolation(format!("result for `{id}` has no score"))
    })?;
    let score = raw
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
        .ok_or_else(|| {
            GradingError::SpecificationViolation(format!("result for `{id}` has score `{raw}`"))
        })?;
    if !(0.0..=1.0).contains(&score) {
        warn!(test = id, score, "grader returned a score outside [0, 1]");
    }
    Ok(score)
}

/// Reads an optional `<validity>` child.
fn parse_validity(result: &Element, id: &str) -> GradingResult<Option<f64>> {
    result
        .child_text("validity")
        .map(|raw| {
            raw.parse::<f64>().map_err(|_| {
                GradingError::SpecificationViolation(format!(
                    "result for `{id}` has validity `{raw}`"
                ))
            })
        })
        .transpose()
}

/// Reads an `xs:boolean` attribute, absent meaning false.
fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("true" | "1"))
}

/// Parses a `<feedback-list>` or `<submission-feedback-list>`.
fn parse_feedback_list(
    list: &Element,
    files: &HashMap<String, ResponseFile>,
) -> GradingResult<FeedbackList> {
    let mut feedback = FeedbackList::default();
    for entry in &list.children {
        match entry.name.as_str() {
            "student-feedback" => feedback.student.push(parse_feedback(entry, files)?),
            "teacher-feedback" => feedback.teacher.push(parse_feedback(entry, files)?),
            _ => {}
        }
    }
    Ok(feedback)
}

/// Parses one feedback entry and resolves its file references.
fn parse_feedback(
    entry: &Element,
    files: &HashMap<String, ResponseFile>,
) -> GradingResult<FeedbackEntry> {
    let level = match entry.attribute("level") {
        Some(raw) => raw.parse::<FeedbackLevel>()?,
        None => FeedbackLevel::default(),
    };
    let content = entry.child("content");
    let format = match content.and_then(|c| c.attribute("format")).map(str::trim) {
        Some("html") => ContentFormat::Html,
        Some("plaintext") | None => ContentFormat::Plaintext,
        Some(other) => {
            return Err(GradingError::SpecificationViolation(format!(
                "unknown content format `{other}`"
            )));
        }
    };

    let mut parsed = FeedbackEntry {
        level,
        title: entry.child_text("title"),
        content: entry.child_text("content"),
        format,
        ..Default::default()
    };

    if let Some(filerefs) = entry.child("filerefs") {
        for fileref in filerefs.children_named("fileref") {
            let refid = fileref.attribute("refid").unwrap_or_default().trim();
            match files.get(refid) {
                Some(ResponseFile::Embedded(file)) => parsed.embedded_files.push(file.clone()),
                Some(ResponseFile::Attached(file)) => parsed.attached_files.push(file.clone()),
                None => {
                    return Err(GradingError::SpecificationViolation(format!(
                        "feedback references undefined file `{refid}`"
                    )));
                }
            }
        }
    }

    Ok(parsed)
}

/// Parses a `<merged-test-feedback>`.
fn parse_merged(section: &Element) -> GradingResult<MergedTestFeedback> {
    let result = section
        .child("overall-result")
        .or_else(|| section.child("result"))
        .ok_or_else(|| {
            GradingError::SpecificationViolation("merged feedback without an overall result".into())
        })?;

    Ok(MergedTestFeedback {
        score:             parse_score(result, "overall")?,
        validity:          parse_validity(result, "overall")?,
        is_internal_error: parse_flag(result.attribute("is-internal-error")),
        student_feedback:  section.child_text("student-feedback"),
        teacher_feedback:  section.child_text("teacher-feedback"),
    })
}
