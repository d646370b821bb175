//! Dataset selection: patient sex and feature families

use crate::error::{Result, VoxkanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Patient sex as coded in the `sex` CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Sex {
    Men,
    Women,
}

impl Sex {
    pub fn code(self) -> i64 {
        match self {
            Sex::Men => 0,
            Sex::Women => 1,
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Sex::Men => "men",
            Sex::Women => "women",
        }
    }

    /// Parse a CLI selector; `both` selects every patient
    pub fn parse_selector(s: &str) -> Result<Option<Sex>> {
        match s {
            "both" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl TryFrom<i64> for Sex {
    type Error = VoxkanError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Sex::Men),
            1 => Ok(Sex::Women),
            other => Err(VoxkanError::ConfigError(format!(
                "unknown sex code {} (expected 0 or 1)",
                other
            ))),
        }
    }
}

impl From<Sex> for i64 {
    fn from(sex: Sex) -> i64 {
        sex.code()
    }
}

impl FromStr for Sex {
    type Err = VoxkanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "men" | "0" => Ok(Sex::Men),
            "women" | "1" => Ok(Sex::Women),
            other => Err(VoxkanError::ConfigError(format!(
                "unknown sex selector '{}' (expected men, women or both)",
                other
            ))),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Which patients and feature families make up one dataset.
///
/// Stored as `config.json` next to the composed matrix. A family set to
/// `false` drops the CSV column of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub sex: Option<Sex>,
    pub diff_pitch: bool,
    pub stdev_f0: bool,
    pub spectral_centroid: bool,
    pub spectral_contrast: bool,
    pub spectral_flatness: bool,
    pub spectral_rolloff: bool,
    pub zero_crossing_rate: bool,
    pub skewness: bool,
    pub shannon_entropy: bool,
    pub nan: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sex: None,
            diff_pitch: true,
            stdev_f0: true,
            spectral_centroid: true,
            spectral_contrast: true,
            spectral_flatness: true,
            spectral_rolloff: true,
            zero_crossing_rate: true,
            skewness: true,
            shannon_entropy: true,
            nan: true,
        }
    }
}

impl DatasetConfig {
    pub fn for_sex(sex: Option<Sex>) -> Self {
        Self {
            sex,
            ..Default::default()
        }
    }

    /// The standard pair: men and women, every family enabled
    pub fn defaults() -> Vec<Self> {
        vec![Self::for_sex(Some(Sex::Men)), Self::for_sex(Some(Sex::Women))]
    }

    /// Output subdirectory: `men`, `women` or `both`
    pub fn dir_name(&self) -> &'static str {
        self.sex.map_or("both", Sex::dir_name)
    }

    fn families(&self) -> [(&'static str, bool); 10] {
        [
            ("diff_pitch", self.diff_pitch),
            ("stdev_f0", self.stdev_f0),
            ("spectral_centroid", self.spectral_centroid),
            ("spectral_contrast", self.spectral_contrast),
            ("spectral_flatness", self.spectral_flatness),
            ("spectral_rolloff", self.spectral_rolloff),
            ("zero_crossing_rate", self.zero_crossing_rate),
            ("skewness", self.skewness),
            ("shannon_entropy", self.shannon_entropy),
            ("nan", self.nan),
        ]
    }

    /// Whether the CSV column `name` contributes features
    pub fn keeps_column(&self, name: &str) -> bool {
        self.families()
            .iter()
            .find(|(family, _)| *family == name)
            .map_or(true, |(_, enabled)| *enabled)
    }

    /// Whether a row with CSV sex code `code` belongs to this dataset
    pub fn selects(&self, code: i64) -> bool {
        self.sex.map_or(true, |sex| sex.code() == code)
    }
}
