//! Grading session state machine.
//!
//! A session walks one sheet through: upload → crop → grade → done.
//! A failed grade can be retried from the cropped image; reset returns to the
//! start and deletes every file the session wrote.

use std::fmt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::ai::AnswerSource;
use crate::config::GraderConfig;
use crate::error::GradeError;
use crate::imaging::{crop_region, load_normalized, CropRect};
use crate::pipeline::{process_image, GradeRun};
use crate::quota::QuotaGate;

/// Session states.
#[derive(Clone, Debug)]
pub enum SessionState {
    /// Waiting for a sheet image (initial state)
    AwaitingUpload,
    /// Normalized upload stored, waiting for the crop
    AwaitingCrop { original: PathBuf },
    /// Cropped sheet ready to be sent for grading
    Grading { cropped: PathBuf },
    /// Graded image and data available
    Done { cropped: PathBuf, run: Box<GradeRun> },
    /// Grading failed; can be retried
    Failed { cropped: PathBuf, reason: String },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::AwaitingUpload => write!(f, "Awaiting upload"),
            SessionState::AwaitingCrop { .. } => write!(f, "Awaiting crop"),
            SessionState::Grading { .. } => write!(f, "Grading"),
            SessionState::Done { .. } => write!(f, "Done"),
            SessionState::Failed { reason, .. } => write!(f, "Failed: {}", reason),
        }
    }
}

/// One sheet's trip through the grader.
pub struct GradingSession {
    state: SessionState,
    workspace: TempDir,
    temp_files: Vec<PathBuf>,
}

impl GradingSession {
    /// Creates a session with its own temporary workspace.
    pub fn new() -> Result<Self, GradeError> {
        let workspace = tempfile::Builder::new()
            .prefix("homework-grader-")
            .tempdir()?;
        crate::log(&format!(
            "Session workspace: {}",
            workspace.path().display()
        ));

        Ok(Self {
            state: SessionState::AwaitingUpload,
            workspace,
            temp_files: Vec::new(),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Files written by this session that still exist.
    pub fn temp_files(&self) -> &[PathBuf] {
        &self.temp_files
    }

    fn invalid(&self, action: &'static str) -> GradeError {
        GradeError::InvalidTransition {
            state: self.state.to_string(),
            action,
        }
    }

    fn track(&mut self, path: &Path) {
        if !self.temp_files.iter().any(|p| p == path) {
            self.temp_files.push(path.to_path_buf());
        }
    }

    /// Normalizes the image at `path` into the workspace.
    pub fn upload(&mut self, path: &Path, config: &GraderConfig) -> Result<&SessionState, GradeError> {
        if !matches!(self.state, SessionState::AwaitingUpload) {
            return Err(self.invalid("upload"));
        }

        let name = path
            .file_name()
            .ok_or_else(|| GradeError::source_unavailable(path, "not a file path"))?
            .to_string_lossy()
            .into_owned();
        let img = load_normalized(path, config.normalize.target_width)?;

        let original = self.workspace.path().join(format!("upload_{}", name));
        img.to_rgb8().save(&original).map_err(GradeError::render)?;
        self.track(&original);

        crate::log(&format!(
            "Uploaded {} ({}x{})",
            path.display(),
            img.width(),
            img.height()
        ));
        self.state = SessionState::AwaitingCrop { original };
        Ok(&self.state)
    }

    /// Crops the uploaded sheet, or keeps all of it when `region` is `None`.
    pub fn crop(&mut self, region: Option<&CropRect>) -> Result<&SessionState, GradeError> {
        let SessionState::AwaitingCrop { original } = &self.state else {
            return Err(self.invalid("crop"));
        };
        let original = original.clone();

        let img = image::open(&original).map_err(|e| GradeError::source_unavailable(&original, e))?;
        let cropped_img = match region {
            Some(rect) => crop_region(&img, rect)?,
            None => img,
        };

        let name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sheet.png".to_string());
        let cropped = self
            .workspace
            .path()
            .join(format!("cropped_{}", name.trim_start_matches("upload_")));
        cropped_img.to_rgb8().save(&cropped).map_err(GradeError::render)?;
        self.track(&cropped);

        match region {
            Some(rect) => crate::log(&format!("Cropped to {}", rect)),
            None => crate::log("Crop skipped, grading the whole sheet"),
        }
        self.state = SessionState::Grading { cropped };
        Ok(&self.state)
    }

    /// Runs the grading pipeline on the cropped sheet.
    ///
    /// On failure the session moves to `Failed` and the error is returned.
    pub fn grade(
        &mut self,
        config: &GraderConfig,
        quota: &dyn QuotaGate,
        source: &dyn AnswerSource,
    ) -> Result<&SessionState, GradeError> {
        let SessionState::Grading { cropped } = &self.state else {
            return Err(self.invalid("grade"));
        };
        let cropped = cropped.clone();
        let workspace = self.workspace.path().to_path_buf();

        match process_image(&cropped, &workspace, config, quota, source) {
            Ok(run) => {
                for path in [&run.grid_image, &run.data_file, &run.graded_image] {
                    self.track(path);
                }
                self.state = SessionState::Done {
                    cropped,
                    run: Box::new(run),
                };
                Ok(&self.state)
            }
            Err(e) => {
                // The grid image may exist even when a later step failed
                let grid = workspace.join(format!(
                    "grid_{}",
                    cropped.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
                ));
                if grid.exists() {
                    self.track(&grid);
                }
                crate::log(&format!("Grading failed: {}", e));
                self.state = SessionState::Failed {
                    cropped,
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Returns a failed session to `Grading` with the same cropped sheet.
    pub fn retry(&mut self) -> Result<&SessionState, GradeError> {
        let SessionState::Failed { cropped, .. } = &self.state else {
            return Err(self.invalid("retry"));
        };
        self.state = SessionState::Grading {
            cropped: cropped.clone(),
        };
        Ok(&self.state)
    }

    /// Deletes every tracked file and returns to `AwaitingUpload`.
    pub fn reset(&mut self) -> &SessionState {
        for path in self.temp_files.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                crate::log(&format!("Could not remove {}: {}", path.display(), e));
            }
        }
        self.state = SessionState::AwaitingUpload;
        &self.state
    }

    /// One-line status for display.
    pub fn status_text(&self) -> String {
        match &self.state {
            SessionState::AwaitingUpload => "Upload a picture of homework to grade".to_string(),
            SessionState::AwaitingCrop { .. } => "Select the area to grade".to_string(),
            SessionState::Grading { .. } => "Ready to grade".to_string(),
            SessionState::Done { run, .. } => format!(
                "Grading complete! Score: {}/{}",
                run.outcome.correct_answers, run.outcome.total_questions
            ),
            SessionState::Failed { reason, .. } => format!("Error: {}", reason),
        }
    }
}
