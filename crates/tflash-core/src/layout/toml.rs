//! TOML target description parsing
//!
//! Parses target descriptions in TOML format:
//!
//! ```toml
//! [target]
//! name = "stm32f103"
//!
//! [[region]]
//! name = "main"
//! start = 0x08000000
//! length = "64 KiB"
//! blocksize = "1 KiB"
//! writesize = 2
//! writebufsize = 256
//!
//! [[region]]
//! name = "option-bytes"
//! start = 0x1FFFF800
//! length = 16
//! blocksize = 16
//! writesize = 2
//! writebufsize = 16
//! erased = 0xFF
//! ```
//!
//! `writebufsize` defaults to `blocksize` and `erased` to 0xFF.

use std::format;
use std::fs;
use std::path::Path;
use std::string::String;
use std::vec::Vec;

use super::{LayoutError, RegionLayout, TargetLayout};
use crate::flash::{RegionGeometry, DEFAULT_ERASED_VALUE};

/// TOML target description file structure
#[derive(Debug, serde::Deserialize)]
struct TomlTargetFile {
    target: Option<TomlTargetMeta>,
    #[serde(default)]
    region: Vec<TomlRegion>,
}

/// Target metadata
#[derive(Debug, serde::Deserialize)]
struct TomlTargetMeta {
    name: Option<String>,
}

/// Region definition in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlRegion {
    name: String,
    #[serde(deserialize_with = "deserialize_size")]
    start: u32,
    #[serde(deserialize_with = "deserialize_size")]
    length: u32,
    #[serde(deserialize_with = "deserialize_size")]
    blocksize: u32,
    #[serde(deserialize_with = "deserialize_size")]
    writesize: u32,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    writebufsize: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    erased: Option<u32>,
}

/// Output form of a target description
#[derive(serde::Serialize)]
struct TomlTargetOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<TomlTargetMetaOut<'a>>,
    region: Vec<TomlRegionOut<'a>>,
}

#[derive(serde::Serialize)]
struct TomlTargetMetaOut<'a> {
    name: &'a str,
}

/// Output form of a region; addresses and sizes are written as strings so
/// they can be hex or human-readable
#[derive(serde::Serialize)]
struct TomlRegionOut<'a> {
    name: &'a str,
    start: String,
    length: String,
    blocksize: String,
    writesize: u32,
    writebufsize: u32,
    erased: String,
}

/// Number as written in the file: either a TOML integer or a string
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SizeOrInt {
    Int(i64),
    Str(String),
}

impl SizeOrInt {
    fn to_u32(&self) -> Result<u32, String> {
        match self {
            Self::Int(n) => u32::try_from(*n).map_err(|_| format!("{} does not fit in 32 bits", n)),
            Self::Str(s) => parse_size(s),
        }
    }
}

/// Deserialize a u32 that can be decimal, hex (0x...) or a size string
fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    SizeOrInt::deserialize(deserializer)?
        .to_u32()
        .map_err(serde::de::Error::custom)
}

fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_size(deserializer).map(Some)
}

/// Parse a number or size string like "0x400", "1024" or "16 KiB"
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex.trim(), 16).map_err(|e| format!("invalid hex: {}", e));
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("b") {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

impl TargetLayout {
    /// Load a target description from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let content = fs::read_to_string(path).map_err(|_| LayoutError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse a target description from a TOML string
    ///
    /// The result is sorted by address and validated.
    pub fn from_toml_str(content: &str) -> Result<Self, LayoutError> {
        let file: TomlTargetFile =
            toml::from_str(content).map_err(|e| LayoutError::ParseError(e.message().into()))?;

        let mut layout = TargetLayout::new();
        layout.name = file.target.and_then(|meta| meta.name);

        for region in file.region {
            let erased = match region.erased {
                None => DEFAULT_ERASED_VALUE,
                Some(value) => u8::try_from(value).map_err(|_| {
                    LayoutError::ParseError(format!(
                        "region '{}': erased value {:#x} is not a byte",
                        region.name, value
                    ))
                })?,
            };
            let geometry = RegionGeometry::new(
                region.start,
                region.length,
                region.blocksize,
                region.writesize,
                region.writebufsize.unwrap_or(region.blocksize),
            )
            .with_erased(erased);
            layout.add_region(RegionLayout::new(region.name, geometry));
        }

        layout.sort_by_address();
        layout.validate()?;
        Ok(layout)
    }

    /// Convert the description to a TOML string
    pub fn to_toml_string(&self) -> Result<String, LayoutError> {
        let out = TomlTargetOut {
            target: self
                .name
                .as_deref()
                .map(|name| TomlTargetMetaOut { name }),
            region: self
                .regions
                .iter()
                .map(|region| {
                    let g = &region.geometry;
                    TomlRegionOut {
                        name: &region.name,
                        start: format!("0x{:08X}", g.start),
                        length: format_size(g.length),
                        blocksize: format_size(g.blocksize),
                        writesize: g.writesize,
                        writebufsize: g.writebufsize,
                        erased: format!("0x{:02X}", g.erased),
                    }
                })
                .collect(),
        };

        toml::to_string(&out).map_err(|e| LayoutError::SerializeError(format!("{}", e)))
    }
}

/// Format a size as human-readable string
fn format_size(size: u32) -> String {
    if size >= 1024 * 1024 && size % (1024 * 1024) == 0 {
        format!("{} MiB", size / (1024 * 1024))
    } else if size >= 1024 && size % 1024 == 0 {
        format!("{} KiB", size / 1024)
    } else {
        format!("{}", size)
    }
}
