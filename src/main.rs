use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use miette::Result;

use mica::error::{self, Category};
use mica::{first_pass, preproc, second_pass};

/// Mica is a two-pass assembler for the course's 15-bit instruction set,
/// with macro expansion and entry/external symbol listings.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Source paths without the `.as` extension
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.files.is_empty() {
        error::log_error(Category::FileInput, "No input files provided", "assembler", None);
        error::print_summary();
        std::process::exit(1);
    }

    let mut valid_files = 0;
    for base in &args.files {
        let display = base.display().to_string();
        let src = base.with_extension("as");
        if !src.is_file() {
            error::log_error(
                Category::FileInput,
                "Cannot open file (make sure it ends with .as)",
                src.display().to_string(),
                None,
            );
            continue;
        }
        valid_files += 1;

        println!("{:>12} target {}", "Expanding".green().bold(), display);
        let expansion = match preproc::run(base) {
            Ok(expansion) => expansion,
            Err(report) => {
                error::log_error(Category::FileInput, report.to_string(), &display, None);
                continue;
            }
        };
        if !expansion.clean {
            error::log_error(Category::FileInput, "Pre-assembler failed", &display, None);
            continue;
        }

        println!("{:>12} target {}", "Assembling".green().bold(), display);
        let first = match first_pass::run(&expansion.path, &expansion.macros) {
            Ok(first) => first,
            Err(report) => {
                error::log_error(Category::FileInput, report.to_string(), &display, None);
                continue;
            }
        };
        // The macro table only feeds first-pass collision checks.
        drop(expansion.macros);
        if !first.clean {
            error::log_error(Category::Semantic, "First pass failed", &display, None);
            continue;
        }

        let mut first = first;
        match second_pass::run(&expansion.path, &mut first.symbols, first.ic, first.dc) {
            Ok(true) => {
                println!("{:>12} target {}", "Completed".green().bold(), display);
            }
            // Diagnostics are already in the sink.
            Ok(false) => {}
            Err(report) => {
                error::log_error(Category::FileInput, report.to_string(), &display, None);
            }
        }
    }

    if valid_files == 0 {
        error::log_error(Category::FileInput, "No valid input files to process", "assembler", None);
        error::print_summary();
        std::process::exit(1);
    }

    error::print_summary();
    Ok(())
}
