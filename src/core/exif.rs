use crate::core::fields::{Metadata, Recipe};
use crate::core::normalize::normalize_white_balance_fine_tune;
use std::collections::BTreeSet;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("ExifTool not found on PATH or in {}", .searched.display())]
    NotFound { searched: PathBuf },

    #[error("Failed to run exiftool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("exiftool failed on {path} ({status}): {stderr}")]
    Failed {
        path: String,
        status: String,
        stderr: String,
    },
}

/// How much metadata a display dump includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// Camera, exposure and film simulation tags, with readable labels.
    Short,
    /// Every tag exiftool knows, keyed by tag name.
    Full,
}

const SHORT_TAGS: &[&str] = &[
    "-Model",
    "-PictureControlName",
    "-Description",
    "-FilmMode",
    "-GrainEffectRoughness",
    "-GrainEffectSize",
    "-ColorChromeEffect",
    "-ColorChromeFXBlue",
    "-WhiteBalance",
    "-WhiteBalanceFineTune",
    "-ColorTemperature",
    "-DevelopmentDynamicRange",
    "-HighlightTone",
    "-ShadowTone",
    "-Saturation",
    "-Sharpness",
    "-NoiseReduction",
    "-Clarity",
    "-FNumber",
    "-ISO",
    "-ExposureTime",
    "-LensID",
];

/// Readable exiftool labels and the recipe fields they fill.
const LABEL_TO_FIELD: &[(&str, &str)] = &[
    ("Film Mode", "FilmMode"),
    ("Grain Effect Roughness", "GrainEffectRoughness"),
    ("Grain Effect Size", "GrainEffectSize"),
    ("Color Chrome Effect", "ColorChromeEffect"),
    ("Color Chrome FX Blue", "ColorChromeFXBlue"),
    ("White Balance", "WhiteBalance"),
    ("White Balance Fine Tune", "WhiteBalanceFineTune"),
    ("Color Temperature", "ColorTemperature"),
    ("Development Dynamic Range", "DevelopmentDynamicRange"),
    ("Highlight Tone", "HighlightTone"),
    ("Shadow Tone", "ShadowTone"),
    ("Saturation", "Saturation"),
    ("Sharpness", "Sharpness"),
    ("Noise Reduction", "NoiseReduction"),
    ("Clarity", "Clarity"),
];

/// Sensor assumed for recipes captured from a picture.
const PICTURE_SENSOR: &str = "X-Trans V";

fn program_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["exiftool.exe", "exiftool"]
    } else {
        &["exiftool"]
    }
}

/// Wrapper around the `exiftool` command-line program.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    /// Use the program at `program` without checking that it exists.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find exiftool on `PATH`, then next to the running executable (also
    /// in its `tools/` and `bin/` subdirectories).
    pub fn locate() -> Result<Self, ExifError> {
        if let Some(path) = env::var_os("PATH") {
            for dir in env::split_paths(&path) {
                if let Some(program) = find_program_in(&dir) {
                    return Ok(Self::at(program));
                }
            }
        }

        let base = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        for dir in [base.clone(), base.join("tools"), base.join("bin")] {
            if let Some(program) = find_program_in(&dir) {
                return Ok(Self::at(program));
            }
        }

        Err(ExifError::NotFound { searched: base })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Tags of `photo` whose names are in `keys`, keyed by tag name.
    pub fn extract_relevant(
        &self,
        photo: &Path,
        keys: &BTreeSet<String>,
    ) -> Result<Metadata, ExifError> {
        let mut metadata = self.run(photo, &[OsStr::new("-s")])?;
        metadata.retain(|key, _| keys.contains(key));
        Ok(metadata)
    }

    /// Metadata of `photo` for display.
    pub fn extract_dump(&self, photo: &Path, mode: DumpMode) -> Result<Metadata, ExifError> {
        match mode {
            DumpMode::Full => self.run(photo, &[OsStr::new("-s")]),
            DumpMode::Short => {
                let args: Vec<&OsStr> = SHORT_TAGS.iter().map(OsStr::new).collect();
                self.run(photo, &args)
            }
        }
    }

    /// A recipe pre-filled from the film simulation settings of `photo`.
    pub fn recipe_from_picture(&self, photo: &Path) -> Result<Recipe, ExifError> {
        let dump = self.extract_dump(photo, DumpMode::Short)?;
        Ok(recipe_from_labels(&dump))
    }

    fn run(&self, photo: &Path, args: &[&OsStr]) -> Result<Metadata, ExifError> {
        let output = Command::new(&self.program)
            .args(args)
            .arg(photo)
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() && stdout.trim().is_empty() {
            return Err(ExifError::Failed {
                path: photo.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        log::debug!(
            "exiftool returned {} bytes for {}",
            output.stdout.len(),
            photo.display()
        );
        Ok(parse_output(&stdout))
    }
}

fn find_program_in(dir: &Path) -> Option<PathBuf> {
    program_names()
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Parse `Key : value` lines. Lines without a colon are skipped; a key seen
/// twice keeps its last value.
pub fn parse_output(stdout: &str) -> Metadata {
    let mut metadata = Metadata::new();
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once(':') {
            metadata.insert(key.trim(), value.trim());
        }
    }
    metadata
}

/// Map a short dump's readable labels onto recipe fields. The white balance
/// fine tune is converted to catalog units.
pub fn recipe_from_labels(dump: &Metadata) -> Recipe {
    let mut recipe = Recipe::new();
    for (label, field) in LABEL_TO_FIELD {
        if let Some(value) = dump.get(label) {
            let value = if *field == "WhiteBalanceFineTune" {
                normalize_white_balance_fine_tune(value)
            } else {
                value.to_string()
            };
            recipe.insert(*field, value);
        }
    }
    recipe.insert("Sensor", PICTURE_SENSOR);
    recipe
}
