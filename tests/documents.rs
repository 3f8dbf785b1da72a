use std::{fs, path::PathBuf};

use proforma_grading::{
    GradingError, GradingHints, NullifyExpr, ResponseDocument, TaskDescription,
    hints::{GradingRef, PROFORMA_NAMESPACE},
    nullify::{CompareOp, ComposeOp},
    response::{ResponseFeedback, TestResponse},
    xml::Element,
};
use uuid::Uuid;

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/proforma")
}

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("proforma-documents-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

#[test]
fn task_parsing_keeps_document_order() {
    let task = TaskDescription::from_path(fixture_root().join("calculator-task.xml"))
        .expect("load calculator task");

    assert_eq!(task.title(), Some("Calculator"));
    let ids: Vec<&str> = task.tests().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["compile", "junit", "style"]);
    assert_eq!(
        task.test("style").and_then(|t| t.test_type.as_deref()),
        Some("java-checkstyle")
    );
    assert!(!task.is_flat());

    let hints = task.grading_hints();
    let root = hints.root().expect("root grouping");
    let refids: Vec<&str> = root.refs.iter().map(GradingRef::refid).collect();
    assert_eq!(refids, ["compile", "functional", "style"]);
    assert_eq!(root.refs[0].weight(), 0.0);

    let condition = root.refs[1].nullify().expect("nullify condition");
    assert_eq!(
        condition,
        &NullifyExpr::comparison(
            NullifyExpr::test_ref("compile", None),
            CompareOp::Lt,
            NullifyExpr::Literal(1.0),
        )
    );

    let functional = hints.combine("functional").expect("functional combine");
    assert_eq!(functional.refs.len(), 2);
    assert_eq!(hints.combine_ref_weight("functional"), 3.0);
    assert_eq!(hints.combine_ref_weight("unreferenced"), 1.0);
}

#[test]
fn combine_ref_weight_takes_the_first_reference_depth_first() {
    let hints = GradingHints::from_xml(
        r#"<grading-hints>
             <root function="sum">
               <combine-ref ref="outer" weight="2"/>
               <combine-ref ref="inner" weight="7"/>
             </root>
             <combine id="outer" function="sum"><combine-ref ref="inner" weight="5"/></combine>
             <combine id="inner" function="sum"><test-ref ref="t"/></combine>
           </grading-hints>"#,
    )
    .expect("parse hints");

    assert_eq!(hints.combine_ref_weight("inner"), 5.0);
    assert_eq!(hints.combine_ref_weight("outer"), 2.0);
}

#[test]
fn grading_hints_survive_a_round_trip() {
    let task = TaskDescription::from_path(fixture_root().join("calculator-task.xml"))
        .expect("load calculator task");
    let mut hints = task.grading_hints().clone();
    hints.adjust_weights(0.25);

    let xml = hints.to_xml().expect("serialize hints");
    assert!(xml.contains(PROFORMA_NAMESPACE));
    assert!(xml.contains(r#"<test-ref ref="style" weight="0.25"/>"#));

    let reparsed = GradingHints::from_xml(&xml).expect("reparse hints");
    assert_eq!(reparsed, hints);
}

#[test]
fn composite_conditions_round_trip() {
    let xml = r#"<grading-hints>
      <root function="max">
        <test-ref ref="t" sub-ref="s" weight="2">
          <title>Guarded</title>
          <nullify-conditions compose-op="or">
            <nullify-condition compare-op="le">
              <nullify-test-ref ref="u" sub-ref="v"/><nullify-literal value="0.25"/>
            </nullify-condition>
            <nullify-condition compare-op="ne">
              <nullify-combine-ref ref="c"/><nullify-literal value="1"/>
            </nullify-condition>
          </nullify-conditions>
        </test-ref>
      </root>
      <combine id="c" function="sum"><test-ref ref="u"/></combine>
    </grading-hints>"#;

    let hints = GradingHints::from_xml(xml).expect("parse hints");
    let root = hints.root().expect("root");
    let Some(NullifyExpr::Composite { op, operands }) = root.refs[0].nullify() else {
        panic!("expected a composite condition");
    };
    assert_eq!(*op, ComposeOp::Or);
    assert_eq!(operands.len(), 2);

    let reparsed = GradingHints::from_xml(&hints.to_xml().expect("serialize"))
        .expect("reparse hints");
    assert_eq!(reparsed, hints);
}

#[test]
fn malformed_hints_are_rejected() {
    let cases = [
        // negative weight
        r#"<grading-hints><root><test-ref ref="a" weight="-1"/></root></grading-hints>"#,
        // unknown function
        r#"<grading-hints><root function="avg"><test-ref ref="a"/></root></grading-hints>"#,
        // comparison with one operand
        r#"<grading-hints><root><test-ref ref="a">
             <nullify-condition compare-op="lt"><nullify-literal value="1"/></nullify-condition>
           </test-ref></root></grading-hints>"#,
        // composite with one operand
        r#"<grading-hints><root><test-ref ref="a">
             <nullify-conditions compose-op="and">
               <nullify-condition compare-op="lt">
                 <nullify-literal value="1"/><nullify-literal value="2"/>
               </nullify-condition>
             </nullify-conditions>
           </test-ref></root></grading-hints>"#,
        // two conditions on one reference
        r#"<grading-hints><root><test-ref ref="a">
             <nullify-condition compare-op="lt"><nullify-literal value="1"/><nullify-literal value="2"/></nullify-condition>
             <nullify-condition compare-op="gt"><nullify-literal value="1"/><nullify-literal value="2"/></nullify-condition>
           </test-ref></root></grading-hints>"#,
        // combine declared twice
        r#"<grading-hints><root><combine-ref ref="c"/></root>
             <combine id="c"><test-ref ref="a"/></combine>
             <combine id="c"><test-ref ref="b"/></combine></grading-hints>"#,
        // test-ref without ref
        r#"<grading-hints><root><test-ref weight="1"/></root></grading-hints>"#,
    ];

    for xml in cases {
        assert!(
            matches!(
                GradingHints::from_xml(xml),
                Err(GradingError::MalformedTaskStructure(_))
            ),
            "accepted {xml}"
        );
    }
}

#[test]
fn broken_xml_is_a_document_error() {
    assert!(matches!(
        TaskDescription::from_xml("<task><tests></task>"),
        Err(GradingError::MalformedDocument(_))
    ));
    assert!(matches!(
        TaskDescription::from_xml("<response/>"),
        Err(GradingError::MalformedDocument(_))
    ));
    assert!(matches!(
        Element::parse(""),
        Err(GradingError::MalformedDocument(_))
    ));
}

/// A task whose only test-ref carries `levels` nested `nullify-conditions`.
fn nested_conditions_task(levels: usize) -> String {
    let leaf = r#"<nullify-condition compare-op="lt"><nullify-test-ref ref="t"/><nullify-literal value="1"/></nullify-condition>"#;
    let open = r#"<nullify-conditions compose-op="and">"#;
    let condition = format!(
        "{}{open}{leaf}{leaf}{}",
        format!("{open}{leaf}").repeat(levels - 1),
        "</nullify-conditions>".repeat(levels)
    );
    format!(
        r#"<task><tests><test id="t"/></tests>
           <grading-hints><root function="sum"><test-ref ref="t">{condition}</test-ref></root></grading-hints>
           </task>"#
    )
}

#[test]
fn deeply_nested_conditions_are_malformed() {
    let shallow = TaskDescription::from_xml(&nested_conditions_task(8)).expect("parse 8 levels");
    let root = shallow.grading_hints().root().expect("root grouping");
    assert!(root.refs[0].nullify().is_some());

    for levels in [40, 600] {
        assert!(
            matches!(
                TaskDescription::from_xml(&nested_conditions_task(levels)),
                Err(GradingError::MalformedTaskStructure(_))
            ),
            "accepted {levels} nested conditions"
        );
    }

    assert!(matches!(
        TaskDescription::from_xml(&nested_conditions_task(2500)),
        Err(GradingError::MalformedDocument(_))
    ));
    let too_deep = format!("{}{}", "<a>".repeat(5000), "</a>".repeat(5000));
    assert!(matches!(
        Element::parse(&too_deep),
        Err(GradingError::MalformedDocument(_))
    ));
}

#[test]
fn namespace_prefixes_are_ignored() {
    let element = Element::parse(
        r#"<p:task xmlns:p="urn:proforma:v2.1"><p:title>Prefixed</p:title></p:task>"#,
    )
    .expect("parse prefixed task");

    assert_eq!(element.name, "task");
    assert_eq!(element.child_text("title").as_deref(), Some("Prefixed"));
    assert!(element.attributes.is_empty());
}

#[test]
fn responses_expose_subtests_and_metadata() {
    let response = ResponseDocument::from_path(fixture_root().join("calculator-pass.xml"))
        .expect("load response");

    let separate = response.separate().expect("separate feedback");
    assert!(response.merged().is_none());

    let ids: Vec<&str> = separate.tests().map(|(id, _)| id).collect();
    assert_eq!(ids, ["compile", "junit", "style"]);
    assert!(matches!(
        separate.test_response("junit"),
        Some(TestResponse::Subtests(subtests)) if subtests.len() == 2
    ));
    assert_eq!(separate.result("junit", Some("sub")).expect("sub result").score, 0.5);
    assert_eq!(separate.result("style", None).expect("style result").score, 0.8);
    assert!(matches!(
        separate.result("style", Some("x")),
        Err(GradingError::MissingTestResult { .. })
    ));
    assert!(matches!(
        separate.result("junit", None),
        Err(GradingError::SpecificationViolation(_))
    ));
}

#[test]
fn merged_responses_parse() {
    let response = ResponseDocument::from_path(fixture_root().join("merged-response.xml"))
        .expect("load merged response");

    let ResponseFeedback::Merged(merged) = response.feedback() else {
        panic!("expected merged feedback");
    };
    assert_eq!(merged.score, 0.75);
    assert_eq!(merged.validity, Some(0.9));
    assert_eq!(merged.teacher_feedback.as_deref(), Some("<p>Timeout in testLarge.</p>"));
    assert_eq!(
        response.grader_engine().and_then(|e| e.name.as_deref()),
        Some("Praktomat")
    );
}

#[test]
fn impossible_responses_violate_the_format() {
    let cases = [
        // neither kind of feedback
        r#"<response/>"#,
        // unknown feedback level
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="a"><test-result><result><score>1</score></result>
               <feedback-list><student-feedback level="fatal"/></feedback-list>
             </test-result></test-response>
           </tests-response></separate-test-feedback></response>"#,
        // duplicate test response
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="a"><test-result><result><score>1</score></result></test-result></test-response>
             <test-response id="a"><test-result><result><score>0</score></result></test-result></test-response>
           </tests-response></separate-test-feedback></response>"#,
        // score that is not a number
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="a"><test-result><result><score>high</score></result></test-result></test-response>
           </tests-response></separate-test-feedback></response>"#,
        // reference to an undeclared file
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="a"><test-result><result><score>1</score></result>
               <feedback-list><student-feedback><filerefs><fileref refid="nope"/></filerefs></student-feedback></feedback-list>
             </test-result></test-response>
           </tests-response></separate-test-feedback></response>"#,
    ];

    for xml in cases {
        assert!(
            matches!(
                ResponseDocument::from_xml(xml),
                Err(GradingError::SpecificationViolation(_))
            ),
            "accepted {xml}"
        );
    }
}

#[test]
fn documents_load_from_disk() {
    let root = temp_root();
    let task_path = root.join("task.xml");
    fs::copy(fixture_root().join("flat-task.xml"), &task_path).expect("copy task");

    let task = TaskDescription::from_path(&task_path).expect("load copied task");
    assert_eq!(task.title(), Some("Hello World"));
    assert!(task.is_flat());

    let missing = TaskDescription::from_path(root.join("absent.xml"))
        .expect_err("absent file should fail");
    assert!(format!("{missing:#}").contains("Could not read task file"));

    let _ = fs::remove_dir_all(root);
}
