//! Homework Grader
//!
//! Grades a photographed homework sheet: the sheet is normalized and cropped,
//! overlaid with a coordinate grid and sent to a vision model, and the model's
//! verdicts are drawn back onto the sheet as checkmarks and crosses.

mod ai;
mod config;
mod error;
mod export;
mod grading;
mod grid;
mod imaging;
mod paths;
mod pipeline;
mod quota;
mod render;
mod session;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::ai::GeminiClient;
use crate::config::{get_config, init_config};
use crate::error::GradeError;
use crate::grading::{grade_image, parse_answer_sheet};
use crate::imaging::CropRect;
use crate::quota::{FileQuota, QuotaGate, Unlimited};
use crate::render::TextRenderer;
use crate::session::{GradingSession, SessionState};

const LOG_FILE: &str = "homework_grader.log";

/// Logs a message to both console and log file with timestamp.
///
/// Console output goes to stderr so stdout only carries results.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    eprint!("{}", line);
    let log_path = paths::get_logs_dir().join(LOG_FILE);
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

#[derive(Parser)]
#[command(name = "homework-grader", version, about = "Grade photographed homework sheets")]
struct Cli {
    /// Configuration file (default: config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Grade a homework image end to end
    Grade {
        image: PathBuf,
        /// Region to grade as x,y,width,height in pixels of the resized upload
        #[arg(long)]
        crop: Option<CropRect>,
        /// Directory for the graded image and data (default: graded/)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Do not check or count the request budget
        #[arg(long)]
        no_quota: bool,
        /// Also write a zip with the graded image and data
        #[arg(long)]
        bundle: bool,
    },
    /// Draw the coordinate grid over an image
    Grid {
        image: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Draw marks from an existing grading data file
    Annotate {
        image: PathBuf,
        data: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the remaining request budget
    Quota,
}

/// `<dir of path>/<prefix><file name of path>`
fn sibling_with_prefix(path: &Path, prefix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?;
    Ok(path.with_file_name(format!("{}{}", prefix, name.to_string_lossy())))
}

fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| anyhow!("Not a file path: {}", file.display()))?;
    let dest = dir.join(name);
    std::fs::copy(file, &dest).context(format!("Failed to copy to {}", dest.display()))?;
    Ok(dest)
}

fn run_grade(
    image: &Path,
    crop: Option<CropRect>,
    output: Option<PathBuf>,
    no_quota: bool,
    bundle: bool,
) -> Result<()> {
    let config = get_config();
    let output_dir = output.unwrap_or_else(paths::get_graded_dir);
    std::fs::create_dir_all(&output_dir)
        .context(format!("Failed to create {}", output_dir.display()))?;

    let quota: Box<dyn QuotaGate> = if no_quota {
        log("Request budget disabled");
        Box::new(Unlimited)
    } else {
        Box::new(FileQuota::from_config(&config.quota))
    };
    let source = GeminiClient::from_config(&config.model)?;

    let mut session = GradingSession::new()?;
    session.upload(image, config)?;
    session.crop(crop.as_ref())?;
    session.grade(config, quota.as_ref(), &source)?;

    let SessionState::Done { run, .. } = session.state() else {
        return Err(anyhow!("Grading did not complete: {}", session.status_text()));
    };

    let graded = copy_into(&run.graded_image, &output_dir)?;
    let data = copy_into(&run.data_file, &output_dir)?;
    if bundle {
        let stem = graded
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graded".to_string());
        export::write_bundle(&output_dir.join(format!("{}.zip", stem)), &graded, &data)?;
    }

    let mut outcome = run.outcome.clone();
    outcome.output_file = graded;
    log(&session.status_text());
    session.reset();

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_grid(image: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = get_config();
    let output = match output {
        Some(path) => path,
        None => sibling_with_prefix(image, "grid_")?,
    };
    let text = TextRenderer::detect(config.font_path.as_deref());
    grid::overlay_grid_file(image, &output, &config.grid, text)?;
    println!("{}", output.display());
    Ok(())
}

fn run_annotate(image: &Path, data: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = get_config();
    let output = match output {
        Some(path) => path,
        None => sibling_with_prefix(image, "graded_")?,
    };
    let contents = std::fs::read_to_string(data)
        .context(format!("Failed to read grading data: {}", data.display()))?;
    let sheet = parse_answer_sheet(&contents)?;

    let text = TextRenderer::detect(config.font_path.as_deref());
    let outcome = grade_image(image, &sheet, &output, &config.marks, text)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_quota() -> Result<()> {
    let quota = FileQuota::from_config(&get_config().quota);
    let status = quota.check_quota()?;
    println!("{}", status);
    if let Some(reason) = status.reason {
        println!("{}", reason);
    }
    log(&format!("Usage counter: {}", quota.path().display()));
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Grade {
            image,
            crop,
            output,
            no_quota,
            bundle,
        } => run_grade(&image, crop, output, no_quota, bundle),
        Command::Grid { image, output } => run_grid(&image, output),
        Command::Annotate {
            image,
            data,
            output,
        } => run_annotate(&image, &data, output),
        Command::Quota => run_quota(),
    }
}

fn main() -> ExitCode {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join(LOG_FILE);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));

    let cli = Cli::parse();

    if let Err(e) = paths::ensure_directories() {
        eprintln!("Warning: could not create output directories: {}", e);
    }
    init_config(cli.config.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log(&format!("Error: {:#}", e));
            if e.downcast_ref::<GradeError>().is_some_and(|ge| !ge.is_retryable()) {
                log("Retrying will not help until the request budget resets");
            }
            ExitCode::FAILURE
        }
    }
}
