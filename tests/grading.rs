use std::path::PathBuf;

use proforma_grading::{
    GradingError, GradingOptions, GradingOutcome, ResponseDocument, SeparateFeedback,
    TaskDescription,
    hints::AccumulatorFunction,
    process_result,
    response::{ContentFormat, FeedbackLevel},
};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/proforma")
}

fn task(name: &str) -> TaskDescription {
    TaskDescription::from_path(fixture_root().join(name)).expect("load task fixture")
}

fn response(name: &str) -> ResponseDocument {
    ResponseDocument::from_path(fixture_root().join(name)).expect("load response fixture")
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

/// A separate-feedback response with one plain result per `(test id, score)`.
fn scores(results: &[(&str, f64)]) -> ResponseDocument {
    let tests: String = results
        .iter()
        .map(|(id, score)| {
            format!(
                r#"<test-response id="{id}"><test-result><result><score>{score}</score></result></test-result></test-response>"#
            )
        })
        .collect();
    ResponseDocument::from_xml(&format!(
        r#"<response><separate-test-feedback><tests-response>{tests}</tests-response></separate-test-feedback></response>"#
    ))
    .expect("parse generated response")
}

#[test]
fn passing_submission_is_scored_per_node() {
    let feedback = SeparateFeedback::process_result(
        &task("calculator-task.xml"),
        &response("calculator-pass.xml"),
        &GradingOptions::new(7.0),
    )
    .expect("grade passing submission");
    let root = feedback.detailed_feedback();

    assert!(close(feedback.score(), 5.3), "score was {}", feedback.score());
    assert!(close(feedback.max_score(), 7.0));
    assert!(!feedback.has_internal_error());

    let score = |id: &str| root.find(id).and_then(|node| node.score()).expect("scored node");
    assert!(close(score("root_0"), 0.0));
    assert!(close(score("root_1"), 4.5));
    assert!(close(score("root_1_0"), 1.0));
    assert!(close(score("root_1_1"), 0.5));
    assert!(close(score("root_2"), 0.8));
    assert!(root.iter().all(|node| !node.is_nullified()));

    let add = root.find("root_1_0").expect("addition node");
    assert_eq!(add.validity(), Some(1.0));

    let sub = root.find("root_1_1").expect("subtraction node");
    let entry = &sub.student_feedback()[0];
    assert_eq!(entry.level, FeedbackLevel::Error);
    assert_eq!(entry.format, ContentFormat::Html);
    assert_eq!(
        entry.content.as_deref(),
        Some("<p>expected <code>-3</code> but was <code>3</code></p>")
    );

    let style = root.find("root_2").expect("style node");
    let log = &style.student_feedback()[0].embedded_files[0];
    assert_eq!(log.filename.as_deref(), Some("checkstyle.log"));
    assert_eq!(log.content, "Calculator.java:12: Missing a Javadoc comment.");

    let summary = feedback.summarised_feedback();
    assert_eq!(summary.student.len(), 1);
    assert_eq!(summary.student[0].title.as_deref(), Some("Summary"));
    assert_eq!(summary.teacher[0].level, FeedbackLevel::Debug);

    let engine = feedback.grader_engine().expect("grader engine");
    assert_eq!(engine.name.as_deref(), Some("Graja"));
    assert_eq!(engine.version.as_deref(), Some("2.2"));
}

#[test]
fn scores_are_compensated_to_the_maximum_mark() {
    let feedback = SeparateFeedback::process_result(
        &task("calculator-task.xml"),
        &response("calculator-pass.xml"),
        &GradingOptions::new(1.0),
    )
    .expect("grade passing submission");

    assert!(close(feedback.compensation_factor(), 1.0 / 7.0));
    assert!(close(feedback.max_score(), 1.0));
    assert!(close(feedback.score(), 5.3 / 7.0), "score was {}", feedback.score());

    let sub = feedback.detailed_feedback().find("root_1_1").expect("subtraction");
    assert!(close(sub.score().unwrap_or_default(), 0.5 / 7.0));
}

#[test]
fn failed_compilation_nullifies_functionality() {
    let feedback = SeparateFeedback::process_result(
        &task("calculator-task.xml"),
        &response("calculator-compile-error.xml"),
        &GradingOptions::new(7.0),
    )
    .expect("grade submission that does not compile");
    let root = feedback.detailed_feedback();

    let functional = root.find("root_1").expect("functional node");
    assert!(functional.is_nullified());
    assert_eq!(functional.score(), Some(0.0));
    assert_eq!(functional.nullify_reason(), Some("score of 'Compilation' < 1"));

    // The subtree keeps its own scores for display.
    let add = root.find("root_1_0").expect("addition node");
    assert!(!add.is_nullified());
    assert!(close(add.score().unwrap_or_default(), 1.0));

    assert!(close(feedback.score(), 0.5), "score was {}", feedback.score());
}

#[test]
fn internal_errors_propagate_to_the_root() {
    let feedback = SeparateFeedback::process_result(
        &task("calculator-task.xml"),
        &response("calculator-compile-error.xml"),
        &GradingOptions::new(7.0),
    )
    .expect("grade");
    let root = feedback.detailed_feedback();

    assert!(feedback.has_internal_error());
    assert!(root.find("root_2").expect("style").has_internal_error());
    assert!(!root.find("root_1").expect("functional").has_internal_error());
}

#[test]
fn missing_results_abort_the_pass() {
    let error = SeparateFeedback::process_result(
        &task("calculator-task.xml"),
        &response("calculator-missing-style.xml"),
        &GradingOptions::new(7.0),
    )
    .expect_err("style result is missing");

    assert_eq!(
        error,
        GradingError::MissingTestResult {
            refid:  "style".to_string(),
            subref: None,
        }
    );
    assert_eq!(
        error.to_string(),
        "The grader returned no result for test `style`."
    );
}

#[test]
fn missing_subtest_names_the_subref() {
    let response = ResponseDocument::from_xml(
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="compile"><test-result><result><score>1</score></result></test-result></test-response>
             <test-response id="style"><test-result><result><score>1</score></result></test-result></test-response>
             <test-response id="junit"><subtests-response>
               <subtest-response id="add"><test-result><result><score>1</score></result></test-result></subtest-response>
             </subtests-response></test-response>
           </tests-response></separate-test-feedback></response>"#,
    )
    .expect("parse response");

    let error = SeparateFeedback::process_result(
        &task("calculator-task.xml"),
        &response,
        &GradingOptions::new(7.0),
    )
    .expect_err("sub-test is missing");

    assert_eq!(
        error,
        GradingError::MissingTestResult {
            refid:  "junit".to_string(),
            subref: Some("sub".to_string()),
        }
    );
    assert!(error.to_string().contains("(sub-test `sub`)"));
}

#[test]
fn subresults_for_a_whole_test_violate_the_format() {
    let task = TaskDescription::from_xml(
        r#"<task>
             <tests><test id="junit"/></tests>
             <grading-hints><root><test-ref ref="junit"/></root></grading-hints>
           </task>"#,
    )
    .expect("parse task");
    let response = ResponseDocument::from_xml(
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="junit"><subtests-response>
               <subtest-response id="a"><test-result><result><score>1</score></result></test-result></subtest-response>
             </subtests-response></test-response>
           </tests-response></separate-test-feedback></response>"#,
    )
    .expect("parse response");

    assert!(matches!(
        SeparateFeedback::process_result(&task, &response, &GradingOptions::default()),
        Err(GradingError::SpecificationViolation(_))
    ));
}

#[test]
fn flat_tasks_take_the_weakest_test() {
    let feedback = SeparateFeedback::process_result(
        &task("flat-task.xml"),
        &response("flat-response.xml"),
        &GradingOptions::new(10.0),
    )
    .expect("grade flat task");

    assert!(close(feedback.max_score(), 10.0));
    assert!(close(feedback.score(), 4.0), "score was {}", feedback.score());
}

#[test]
fn weighted_sum_is_compensated_per_leaf() {
    let task = TaskDescription::from_xml(
        r#"<task>
             <tests><test id="t1"/><test id="t2"/></tests>
             <grading-hints>
               <root function="sum">
                 <test-ref ref="t1" weight="1"/>
                 <test-ref ref="t2" weight="2"/>
               </root>
             </grading-hints>
           </task>"#,
    )
    .expect("parse weighted task");

    let feedback = SeparateFeedback::process_result(
        &task,
        &scores(&[("t1", 1.0), ("t2", 1.0)]),
        &GradingOptions::new(10.0),
    )
    .expect("grade weighted task");

    assert!(close(feedback.compensation_factor(), 10.0 / 3.0));
    let root = feedback.detailed_feedback();
    let leaves: Vec<f64> = root
        .children()
        .iter()
        .map(|leaf| leaf.score().unwrap_or_default())
        .collect();
    assert!((leaves[0] - 3.333).abs() < 1e-3, "t1 scored {}", leaves[0]);
    assert!((leaves[1] - 6.667).abs() < 1e-3, "t2 scored {}", leaves[1]);
    assert!(close(feedback.score(), 10.0), "score was {}", feedback.score());
}

#[test]
fn nullified_leaves_keep_their_feedback() {
    let task = TaskDescription::from_xml(
        r#"<task>
             <tests><test id="t1"/><test id="t2"/></tests>
             <grading-hints>
               <root function="sum">
                 <test-ref ref="t1">
                   <nullify-condition compare-op="lt">
                     <nullify-test-ref ref="t1"/><nullify-literal value="5"/>
                   </nullify-condition>
                 </test-ref>
                 <test-ref ref="t2"/>
               </root>
             </grading-hints>
           </task>"#,
    )
    .expect("parse task");
    let response = ResponseDocument::from_xml(
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="t1"><test-result>
               <result><score>3</score></result>
               <feedback-list>
                 <student-feedback level="warn"><content format="plaintext">Too few cases pass.</content></student-feedback>
               </feedback-list>
             </test-result></test-response>
             <test-response id="t2"><test-result><result><score>1</score></result></test-result></test-response>
           </tests-response></separate-test-feedback></response>"#,
    )
    .expect("parse response");

    let feedback =
        SeparateFeedback::process_result(&task, &response, &GradingOptions::new(2.0))
            .expect("grade");
    let leaf = feedback.detailed_feedback().find("root_0").expect("t1 node");

    assert_eq!(leaf.score(), Some(0.0));
    assert!(leaf.is_nullified());
    assert_eq!(leaf.student_feedback().len(), 1);
    assert_eq!(
        leaf.student_feedback()[0].content.as_deref(),
        Some("Too few cases pass.")
    );
    assert!(close(feedback.score(), 1.0), "score was {}", feedback.score());
}

#[test]
fn flat_tasks_grade_every_declared_test() {
    let task = TaskDescription::from_xml(
        r#"<task><tests><test id="a"/><test id="b"/><test id="c"/></tests></task>"#,
    )
    .expect("parse flat task");
    assert!(task.is_flat());

    let feedback = SeparateFeedback::process_result(
        &task,
        &scores(&[("a", 0.9), ("b", 0.6), ("c", 0.8)]),
        &GradingOptions::new(1.0),
    )
    .expect("grade flat task");

    let root = feedback.detailed_feedback();
    assert_eq!(root.function(), AccumulatorFunction::Min);
    assert_eq!(root.children().len(), 3);
    assert!(root.children().iter().all(|leaf| leaf.is_leaf()));
    let refids: Vec<_> = root.children().iter().filter_map(|leaf| leaf.refid()).collect();
    assert_eq!(refids, ["a", "b", "c"]);
    assert!(close(feedback.score(), 0.6), "score was {}", feedback.score());
}

#[test]
fn flat_tasks_reject_unexpected_subresults() {
    let response = ResponseDocument::from_xml(
        r#"<response><separate-test-feedback><tests-response>
             <test-response id="t1"><subtests-response>
               <subtest-response id="a"><test-result><result><score>1</score></result></test-result></subtest-response>
             </subtests-response></test-response>
             <test-response id="t2"><test-result><result><score>1</score></result></test-result></test-response>
           </tests-response></separate-test-feedback></response>"#,
    )
    .expect("parse response");

    let flat = task("flat-task.xml");
    assert!(flat.is_flat());
    assert!(matches!(
        SeparateFeedback::process_result(&flat, &response, &GradingOptions::default()),
        Err(GradingError::SpecificationViolation(_))
    ));
}

/// `bonus` only counts while `basics` scores at least `0.5` per unit of its
/// weight.
const BONUS_TASK: &str = r#"<task>
  <tests><test id="a"/><test id="b"/><test id="bonus"/></tests>
  <grading-hints>
    <root function="sum">
      <combine-ref ref="basics" weight="3"/>
      <test-ref ref="bonus">
        <nullify-condition compare-op="lt">
          <nullify-combine-ref ref="basics"/>
          <nullify-literal value="0.5"/>
        </nullify-condition>
      </test-ref>
    </root>
    <combine id="basics" function="sum">
      <test-ref ref="a"/>
      <test-ref ref="b"/>
    </combine>
  </grading-hints>
</task>"#;

#[test]
fn literals_compared_with_combines_scale_by_the_combine_weight() {
    let task = TaskDescription::from_xml(BONUS_TASK).expect("parse bonus task");
    let options = GradingOptions::new(7.0);

    let kept = SeparateFeedback::process_result(
        &task,
        &scores(&[("a", 1.0), ("b", 1.0), ("bonus", 1.0)]),
        &options,
    )
    .expect("grade full marks");
    assert!(close(kept.score(), 7.0), "score was {}", kept.score());

    // raw basics 1.0 is above the bare literal 0.5 but below 0.5 * 3
    let voided = SeparateFeedback::process_result(
        &task,
        &scores(&[("a", 1.0), ("b", 0.0), ("bonus", 1.0)]),
        &options,
    )
    .expect("grade half basics");
    let bonus = voided.detailed_feedback().find("root_1").expect("bonus node");
    assert!(bonus.is_nullified());
    assert_eq!(bonus.nullify_reason(), Some("score of 'basics' < 0.5"));
    assert!(close(voided.score(), 3.0), "score was {}", voided.score());
}

#[test]
fn combine_operands_are_named_after_the_combine() {
    let task = TaskDescription::from_xml(
        r#"<task>
             <tests>
               <test id="quality"><title>Quality test</title></test>
               <test id="lint"/>
               <test id="bonus"/>
             </tests>
             <grading-hints>
               <root function="sum">
                 <test-ref ref="quality"/>
                 <combine-ref ref="quality"/>
                 <test-ref ref="bonus">
                   <nullify-condition compare-op="lt">
                     <nullify-combine-ref ref="quality"/>
                     <nullify-literal value="0.5"/>
                   </nullify-condition>
                 </test-ref>
               </root>
               <combine id="quality" function="sum">
                 <title>Quality checks</title>
                 <test-ref ref="lint"/>
               </combine>
             </grading-hints>
           </task>"#,
    )
    .expect("parse task with shared ids");

    let feedback = SeparateFeedback::process_result(
        &task,
        &scores(&[("quality", 1.0), ("lint", 0.0), ("bonus", 1.0)]),
        &GradingOptions::new(3.0),
    )
    .expect("grade");

    let bonus = feedback.detailed_feedback().find("root_2").expect("bonus node");
    assert!(bonus.is_nullified());
    assert_eq!(bonus.nullify_reason(), Some("score of 'Quality checks' < 0.5"));
}

#[test]
fn composite_conditions_combine_comparisons() {
    let task = TaskDescription::from_xml(
        r#"<task>
             <tests><test id="t1"/><test id="t2"/><test id="t3"/></tests>
             <grading-hints>
               <root function="sum">
                 <test-ref ref="t1"/>
                 <test-ref ref="t2"/>
                 <test-ref ref="t3">
                   <nullify-conditions compose-op="and">
                     <nullify-condition compare-op="lt">
                       <nullify-test-ref ref="t1"/><nullify-literal value="0.5"/>
                     </nullify-condition>
                     <nullify-condition compare-op="lt">
                       <nullify-test-ref ref="t2"/><nullify-literal value="0.5"/>
                     </nullify-condition>
                   </nullify-conditions>
                 </test-ref>
               </root>
             </grading-hints>
           </task>"#,
    )
    .expect("parse task");
    let options = GradingOptions::new(3.0);

    let one_low = SeparateFeedback::process_result(
        &task,
        &scores(&[("t1", 0.2), ("t2", 0.8), ("t3", 1.0)]),
        &options,
    )
    .expect("grade");
    assert!(!one_low.detailed_feedback().find("root_2").expect("t3").is_nullified());
    assert!(close(one_low.score(), 2.0));

    let both_low = SeparateFeedback::process_result(
        &task,
        &scores(&[("t1", 0.2), ("t2", 0.3), ("t3", 1.0)]),
        &options,
    )
    .expect("grade");
    let t3 = both_low.detailed_feedback().find("root_2").expect("t3");
    assert!(t3.is_nullified());
    assert_eq!(t3.nullify_reason(), Some("(score of 't1' < 0.5 and score of 't2' < 0.5)"));
    assert!(close(both_low.score(), 0.5));
}

#[test]
fn conditions_on_their_own_combine_are_malformed() {
    let task = TaskDescription::from_xml(
        r#"<task>
             <tests><test id="t"/></tests>
             <grading-hints>
               <root function="sum"><combine-ref ref="loop"/></root>
               <combine id="loop" function="sum">
                 <test-ref ref="t">
                   <nullify-condition compare-op="lt">
                     <nullify-combine-ref ref="loop"/><nullify-literal value="1"/>
                   </nullify-condition>
                 </test-ref>
               </combine>
             </grading-hints>
           </task>"#,
    )
    .expect("parse task");

    assert!(matches!(
        SeparateFeedback::process_result(&task, &scores(&[("t", 1.0)]), &GradingOptions::default()),
        Err(GradingError::MalformedTaskStructure(_))
    ));
}

#[test]
fn merged_responses_are_scaled_not_merged() {
    let outcome = process_result(
        &task("calculator-task.xml"),
        &response("merged-response.xml"),
        &GradingOptions::new(10.0),
    )
    .expect("grade merged response");

    let GradingOutcome::Merged(merged) = &outcome else {
        panic!("expected a merged outcome");
    };
    assert!(close(merged.score, 7.5));
    assert_eq!(merged.max_score, 10.0);
    assert_eq!(merged.student_feedback.as_deref(), Some("<p>Most tests passed.</p>"));
    assert!(!outcome.has_internal_error());

    assert!(matches!(
        SeparateFeedback::process_result(
            &task("calculator-task.xml"),
            &response("merged-response.xml"),
            &GradingOptions::new(10.0),
        ),
        Err(GradingError::SpecificationViolation(_))
    ));
}

#[test]
fn outcomes_serialize_to_json() {
    let outcome = process_result(
        &task("calculator-task.xml"),
        &response("calculator-compile-error.xml"),
        &GradingOptions::new(7.0),
    )
    .expect("grade");
    assert!(close(outcome.score(), 0.5));
    assert!(close(outcome.max_score(), 7.0));

    let json = serde_json::to_value(&outcome).expect("serialize outcome");
    let detailed = &json["separate"]["detailed"];
    assert_eq!(detailed["id"], "root");
    assert_eq!(detailed["children"][1]["nullified"], true);
    assert_eq!(detailed["children"][2]["title"], "Coding style");
}
