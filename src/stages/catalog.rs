use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;

/// A named unit of the simulation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Render ground-truth cells from a cell-parameter file
    GenerateCells,
    /// Synthesize point-spread functions
    GeneratePsfs,
    Convolve,
    Resize,
    AddNoise,
    Deconvolve,
    /// Score results against the reference folder
    Accuracy,
}

/// Folder roles a stage expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderRoles {
    /// Reads the carried-over input folder
    pub input: bool,
    /// Configuration key naming the output folder
    pub output_key: &'static str,
    /// Compares against a reference folder
    pub reference: bool,
    /// Whether the output becomes the next stage's input
    pub chains: bool,
}

impl Stage {
    /// Catalog of valid stages, in canonical pipeline order
    pub const ALL: [Stage; 7] = [
        Stage::GenerateCells,
        Stage::GeneratePsfs,
        Stage::Convolve,
        Stage::Resize,
        Stage::AddNoise,
        Stage::Deconvolve,
        Stage::Accuracy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GenerateCells => "generate_cells",
            Stage::GeneratePsfs => "generate_psfs",
            Stage::Convolve => "convolve",
            Stage::Resize => "resize",
            Stage::AddNoise => "add_noise",
            Stage::Deconvolve => "deconvolve",
            Stage::Accuracy => "accuracy",
        }
    }

    /// Names of all valid stages
    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(Stage::as_str).collect()
    }

    /// Conventional name of the stage's batch collaborator
    pub fn batch_name(&self) -> String {
        format!("{}_batch", self.as_str())
    }

    pub fn roles(&self) -> FolderRoles {
        match self {
            Stage::GenerateCells => FolderRoles {
                input: false,
                output_key: "inputfolder",
                reference: false,
                chains: true,
            },
            Stage::GeneratePsfs => FolderRoles {
                input: false,
                output_key: "psffolder",
                reference: false,
                chains: false,
            },
            Stage::Convolve => FolderRoles {
                input: true,
                output_key: "convolve_results_folder",
                reference: false,
                chains: true,
            },
            Stage::Resize => FolderRoles {
                input: true,
                output_key: "resize_results_folder",
                reference: false,
                chains: true,
            },
            Stage::AddNoise => FolderRoles {
                input: true,
                output_key: "add_noise_results_folder",
                reference: false,
                chains: true,
            },
            Stage::Deconvolve => FolderRoles {
                input: true,
                output_key: "deconvolve_results_folder",
                reference: false,
                chains: true,
            },
            Stage::Accuracy => FolderRoles {
                input: true,
                output_key: "accuracy_results_folder",
                reference: true,
                chains: false,
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| ConfigError::UnknownStage {
                name: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

/// Parse an ordered list of step names, failing on the first unknown one
pub fn parse_steps<S: AsRef<str>>(names: &[S]) -> Result<Vec<Stage>, ConfigError> {
    names.iter().map(|name| name.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_stage_reports_valid_set() {
        let err = parse_steps(&["convolve", "frobnicate"]).unwrap_err();
        match err {
            ConfigError::UnknownStage { name, valid } => {
                assert_eq!(name, "frobnicate");
                assert_eq!(valid.len(), 7);
                assert!(valid.contains(&"accuracy"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_only_accuracy_uses_reference_and_skips_chaining() {
        for stage in Stage::ALL {
            let roles = stage.roles();
            assert_eq!(roles.reference, stage == Stage::Accuracy);
        }
        assert!(!Stage::Accuracy.roles().chains);
        assert!(!Stage::GeneratePsfs.roles().input);
        assert_eq!(Stage::AddNoise.batch_name(), "add_noise_batch");
    }
}
