use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::error::CountsError;

/// Probes with |eta| below this value are in the barrel
pub const BARREL_ETA_MAX: f64 = 0.9;

/// One muon identification stage of the tag-and-probe chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Leg {
    Standalone,
    Global,
    Selection,
    Trigger,
}

impl Leg {
    pub const ALL: [Leg; 4] = [Leg::Standalone, Leg::Global, Leg::Selection, Leg::Trigger];

    /// Short name used in file names and output columns
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Standalone => "Sta",
            Self::Global => "Glo",
            Self::Selection => "Sel",
            Self::Trigger => "HLT",
        }
    }
}

impl FromStr for Leg {
    type Err = CountsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Sta" => Ok(Self::Standalone),
            "Glo" => Ok(Self::Global),
            "Sel" => Ok(Self::Selection),
            "HLT" => Ok(Self::Trigger),
            other => Err(CountsError::BadCategory(other.to_string())),
        }
    }
}

impl Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    Barrel,
    Endcap,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::Barrel, Region::Endcap];

    pub fn from_eta(eta: f64) -> Self {
        if eta.abs() < BARREL_ETA_MAX {
            Self::Barrel
        } else {
            Self::Endcap
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Barrel => "B",
            Self::Endcap => "E",
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Geometric category of a Z candidate, given by the regions of both muons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegionPair {
    BB,
    BE,
    EE,
}

impl RegionPair {
    pub const ALL: [RegionPair; 3] = [RegionPair::BB, RegionPair::BE, RegionPair::EE];

    pub fn from_regions(first: Region, second: Region) -> Self {
        match (first, second) {
            (Region::Barrel, Region::Barrel) => Self::BB,
            (Region::Endcap, Region::Endcap) => Self::EE,
            _ => Self::BE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BB => "BB",
            Self::BE => "BE",
            Self::EE => "EE",
        }
    }

    /// Relative rate of Z bosons in this category, taken from simulation
    pub fn rate(&self) -> f64 {
        match self {
            Self::BB => 0.077904,
            Self::BE => 0.117200,
            Self::EE => 0.105541,
        }
    }
}

impl Display for RegionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single fit category: one leg in one region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FitCategory {
    pub leg: Leg,
    pub region: Region,
}

impl FitCategory {
    pub fn new(leg: Leg, region: Region) -> Self {
        Self { leg, region }
    }

    /// All leg/region combinations, in the order they are fitted
    pub fn all() -> impl Iterator<Item = FitCategory> {
        Leg::ALL
            .into_iter()
            .flat_map(|leg| Region::ALL.into_iter().map(move |region| Self::new(leg, region)))
    }

    pub fn index(&self) -> usize {
        (self.leg as usize) * Region::ALL.len() + self.region as usize
    }
}

impl Display for FitCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.leg, self.region)
    }
}
