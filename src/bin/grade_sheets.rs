// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};

use bubble_sheet::config::FormConfig;
use bubble_sheet::pipeline::{grade_file, write_artifacts};

/// Grades scanned answer sheet image(s) against a form description, printing
/// one line per sheet: file name followed by the chosen column of each
/// question (-1 if no confident choice).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Path of the file or directory to process.
    #[arg(short, long)]
    input: PathBuf,

    /// JSON form description.
    #[arg(short, long)]
    form: PathBuf,

    /// Directory where review images are written. Defaults to an OMR
    /// directory next to each input file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip writing review images.
    #[arg(long, default_value_t = false)]
    no_artifacts: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match FormConfig::from_json_file(&args.form) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        },
    };
    let input_metadata = match fs::metadata(&args.input) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Input file/dir {:?} does not exist? {}", args.input, e);
            return ExitCode::FAILURE;
        },
    };

    let mut files = Vec::<PathBuf>::new();
    if input_metadata.is_dir() {
        let entries = match fs::read_dir(&args.input) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("Could not list {:?}: {}", args.input, e);
                return ExitCode::FAILURE;
            },
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
    } else {
        files.push(args.input.clone());
    }

    let mut failures = 0;
    for file in &files {
        if !process_file(file, &config, &args) {
            failures += 1;
        }
    }
    info!("Graded {} of {} sheets", files.len() - failures, files.len());
    if failures == files.len() && !files.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn process_file(file: &Path, config: &FormConfig, args: &Args) -> bool {
    info!("Processing {:?}", file);
    let sheet = match grade_file(file, config) {
        Ok(sheet) => sheet,
        Err(e) => {
            warn!("Skipping {:?} at {} stage: {}", file, e.stage(), e);
            return false;
        },
    };
    let name = file.file_name().map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let answers: Vec<String> = sheet.answers.iter().map(|a| a.to_string()).collect();
    println!("{},{}", name, answers.join(","));

    if !args.no_artifacts {
        let output_dir = match &args.output {
            Some(dir) => dir.clone(),
            None => file.parent().unwrap_or(Path::new(".")).join("OMR"),
        };
        write_artifacts(&sheet, file, &output_dir);
    }
    true
}
