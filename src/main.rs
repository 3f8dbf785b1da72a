#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # proforma-grading
//! ## Introduction
//!
//! Computes maximum scores, grading schemes and graded feedback for ProFormA
//! tasks from the command line.
//!
//! ## Configuration
//!
//! `PROFORMA_MAX_MARK` and `PROFORMA_MAX_DEPTH` may be set in the environment
//! or in a `.env` file. `--max-mark` overrides the former per invocation.

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use proforma_grading::{
    GradingOptions, GradingOutcome, GradingScheme, ResponseDocument, TaskDescription, config,
    hints::compensation_factor, process_result, report,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Print the maximum score of a task's grading hints
    MaxScore(String, Option<f64>),
    /// Print the grading scheme of a task
    Scheme(String, Option<f64>, bool),
    /// Grade a grader response against a task
    Grade(String, String, Option<f64>, bool),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the task file
    fn task() -> impl Parser<String> {
        positional("TASK").help("Path to a ProFormA task.xml")
    }

    /// parses the response file
    fn response() -> impl Parser<String> {
        positional("RESPONSE").help("Path to a ProFormA response.xml")
    }

    /// parses the maximum mark override
    fn max_mark() -> impl Parser<Option<f64>> {
        long("max-mark")
            .help("Maximum mark of the question, overrides PROFORMA_MAX_MARK")
            .argument::<f64>("MARK")
            .guard(
                |mark| config::is_valid_max_mark(*mark),
                "the maximum mark must be a finite number above zero",
            )
            .optional()
    }

    /// parses the JSON switch
    fn json() -> impl Parser<bool> {
        long("json").help("Print JSON instead of a table").switch()
    }

    let max_score = construct!(Cmd::MaxScore(task(), max_mark()))
        .to_options()
        .command("max-score")
        .help("Print the maximum score of a task's grading hints");

    let scheme = construct!(Cmd::Scheme(task(), max_mark(), json()))
        .to_options()
        .command("scheme")
        .help("Print the grading scheme of a task");

    let grade = construct!(Cmd::Grade(task(), response(), max_mark(), json()))
        .to_options()
        .command("grade")
        .help("Grade a grader response against a task");

    let cmd = construct!([max_score, scheme, grade]);

    cmd.to_options()
        .descr("Grading-hints scoring for ProFormA tasks")
        .run()
}

/// Options from the environment, with the maximum mark optionally overridden.
fn grading_options(max_mark: Option<f64>) -> GradingOptions {
    let options = GradingOptions::from_config();
    match max_mark {
        Some(mark) => options.with_max_mark(mark),
        None => options,
    }
}

fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    config::ensure_initialized();
    let cmd = options();

    match cmd {
        Cmd::MaxScore(t, m) => {
            let task = TaskDescription::from_path(&t)?;
            let options = grading_options(m);
            let hints = task.effective_hints();
            let max = hints
                .calculate_max_score_within(options.max_depth())
                .with_context(|| format!("Failed to compute the maximum score of `{t}`"))?;
            let factor = compensation_factor(max, options.max_mark());
            println!("max score: {max}");
            println!("compensation factor for {}: {factor}", options.max_mark());
        }
        Cmd::Scheme(t, m, json) => {
            let task = TaskDescription::from_path(&t)?;
            let scheme = GradingScheme::build(&task, &grading_options(m))
                .with_context(|| format!("Failed to build the grading scheme of `{t}`"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(scheme.root())?);
            } else {
                eprintln!("{}", report::scheme_table(&scheme));
            }
        }
        Cmd::Grade(t, r, m, json) => {
            let task = TaskDescription::from_path(&t)?;
            let response = ResponseDocument::from_path(&r)?;
            let outcome = process_result(&task, &response, &grading_options(m))
                .with_context(|| format!("Failed to grade `{r}` against `{t}`"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            match &outcome {
                GradingOutcome::Separate(separate) => {
                    eprintln!("{}", report::score_table(separate));
                    for teacher in [false, true] {
                        if let Some(table) =
                            report::feedback_table(separate.summarised_feedback(), teacher)
                        {
                            eprintln!("{table}");
                        }
                    }
                }
                GradingOutcome::Merged(merged) => eprintln!("{}", report::merged_table(merged)),
            }
        }
    };

    Ok(())
}
