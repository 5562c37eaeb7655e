//! Target description types

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::{Error, GeometryError};
use crate::flash::{RegionDriver, RegionGeometry, Target, TargetControl};

/// A named flash region in a target description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLayout {
    /// Name of the region
    pub name: String,
    /// Address range and granularity
    pub geometry: RegionGeometry,
}

impl RegionLayout {
    /// Create a new region description
    pub fn new(name: impl Into<String>, geometry: RegionGeometry) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }
}

/// Description of a target's flash regions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetLayout {
    /// Optional name for the target
    pub name: Option<String>,
    /// Regions of the target
    pub regions: Vec<RegionLayout>,
}

impl TargetLayout {
    /// Create a new empty description
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region to the description
    pub fn add_region(&mut self, region: RegionLayout) {
        self.regions.push(region);
    }

    /// Find a region by name (case-insensitive)
    pub fn find_region(&self, name: &str) -> Option<&RegionLayout> {
        self.regions
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Sort regions by start address
    pub fn sort_by_address(&mut self) {
        self.regions.sort_by_key(|r| r.geometry.start);
    }

    /// Get the number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if the description has no regions
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Address span covered by all regions, as `(start, end)` with `end` exclusive
    pub fn span(&self) -> Option<(u32, u32)> {
        let start = self.regions.iter().map(|r| r.geometry.start).min()?;
        let end = self.regions.iter().map(|r| r.geometry.end()).max()?;
        Some((start, end))
    }

    /// Validate geometry, overlaps and names
    pub fn validate(&self) -> Result<(), LayoutError> {
        for region in &self.regions {
            region
                .geometry
                .validate()
                .map_err(|source| LayoutError::InvalidGeometry {
                    region: region.name.clone(),
                    source,
                })?;
        }

        for (i, r1) in self.regions.iter().enumerate() {
            for r2 in self.regions.iter().skip(i + 1) {
                if r1.geometry.overlaps(&r2.geometry) {
                    return Err(LayoutError::OverlappingRegions(
                        r1.name.clone(),
                        r2.name.clone(),
                    ));
                }
                if r1.name.eq_ignore_ascii_case(&r2.name) {
                    return Err(LayoutError::DuplicateRegionName(r1.name.clone()));
                }
            }
        }

        Ok(())
    }

    /// Build a target, pairing every region with the driver `driver_for` returns
    pub fn build_target<F>(
        &self,
        control: Box<dyn TargetControl>,
        mut driver_for: F,
    ) -> Result<Target, Error>
    where
        F: FnMut(&RegionLayout) -> Box<dyn RegionDriver>,
    {
        let name = self.name.clone().unwrap_or_else(|| String::from("target"));
        let mut target = Target::with_boxed_control(name, control);
        for region in &self.regions {
            target.add_boxed_region(region.geometry, driver_for(region))?;
        }
        Ok(target)
    }
}

/// Errors that can occur when working with target descriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A region's geometry is unusable
    InvalidGeometry {
        /// Region name
        region: String,
        /// What is wrong with it
        source: GeometryError,
    },
    /// Two regions overlap
    OverlappingRegions(String, String),
    /// Two regions have the same name
    DuplicateRegionName(String),
    /// Failed to parse a description file
    ParseError(String),
    /// Failed to write a description out
    SerializeError(String),
    /// I/O error
    IoError,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGeometry { region, source } => {
                write!(f, "region '{}': {}", region, source)
            }
            Self::OverlappingRegions(a, b) => {
                write!(f, "regions '{}' and '{}' overlap", a, b)
            }
            Self::DuplicateRegionName(name) => write!(f, "duplicate region name '{}'", name),
            Self::ParseError(msg) => write!(f, "failed to parse target description: {}", msg),
            Self::SerializeError(msg) => {
                write!(f, "failed to serialize target description: {}", msg)
            }
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LayoutError {}
