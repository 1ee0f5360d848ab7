use colored::Colorize;

pub mod archive;
pub mod compiler;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod runner_file_utils;
pub mod script;
pub mod test_parser;

pub use error::{ExecutionFailure, PipelineError};

pub fn run(cli: config::Cli) -> anyhow::Result<()> {
    match cli.color.as_deref() {
        Some("on") => colored::control::set_override(true),
        Some("off") => colored::control::set_override(false),
        _ => {}
    }

    let report = pipeline::generate(&cli.input, &cli.solution, &cli.pipeline_options())?;

    for skipped in &report.build.skipped {
        println!(
            "{}",
            format!("Test case {} has no expected output: {}", skipped.index, skipped.reason)
                .yellow()
        );
    }
    if let Some(dir) = &report.build_dir {
        println!("Build directory kept at {}", dir.display());
    }
    println!(
        "{}",
        format!("Success! Upload {} to Gradescope.", report.archive.display()).green()
    );
    println!(
        "{} test cases generated in {:.2} seconds.",
        report.build.listed_cases, report.elapsed_secs
    );

    if cli.json {
        println!("{}", serde_json::to_string(&report)?);
    }

    Ok(())
}
