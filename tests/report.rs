use std::path::PathBuf;

use proforma_grading::{
    GradingOptions, GradingScheme, ResponseDocument, SeparateFeedback, TaskDescription,
    report::{self, Grade},
};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/proforma")
}

#[test]
fn grades_display_with_two_decimals() {
    assert_eq!(Grade::new(5.3, 7.0).to_string(), "5.30/7.00");
    assert_eq!(Grade::default().to_string(), "0.00/0.00");
}

#[test]
fn tables_show_totals_and_reasons() {
    let task = TaskDescription::from_path(fixture_root().join("calculator-task.xml"))
        .expect("load calculator task");
    let options = GradingOptions::new(7.0);

    let scheme = GradingScheme::build(&task, &options).expect("scheme");
    let scheme_table = report::scheme_table(&scheme);
    assert!(scheme_table.contains("Grading Scheme"));
    assert!(scheme_table.contains("Maximum: 7.00"));

    let response = ResponseDocument::from_path(fixture_root().join("calculator-compile-error.xml"))
        .expect("load response");
    let feedback =
        SeparateFeedback::process_result(&task, &response, &options).expect("grade submission");

    let rows = report::score_rows(feedback.detailed_feedback());
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[1].requirement(), "  Compilation");
    assert_eq!(rows[2].reason(), "score of 'Compilation' < 1");
    assert_eq!(rows[5].reason(), "internal grader error");
    assert_eq!(rows[0].grade(), Grade::new(0.5, 7.0));

    let table = report::score_table(&feedback);
    assert!(table.contains("Total: 0.50/7.00"));
    assert!(report::feedback_table(feedback.summarised_feedback(), false).is_none());
}
