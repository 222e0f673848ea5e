//! Turns combined efficiencies into delivered Z counts and a Z-based luminosity.
//!
//! Everything here is plain arithmetic over the inputs. The calibrations are loaded once
//! and injected as a [`Calibrations`] bundle.
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{CalibrationError, PropagationError};
use super::extractor::{AsymmetricValue, CombinedEfficiency};
use super::histogram::Hist1D;
use super::leg::RegionPair;

/// Fraction of reconstructed Z candidates assumed to be fakes
pub const FAKE_RATE: f64 = 0.01;
/// Pileup values the correlation is folded over, `0..N_PILEUP_FOLD`
const N_PILEUP_FOLD: usize = 100;

/// Pileup-dependent linear correction `a * pileup + b` of one region pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearCorrection {
    pub a: f64,
    pub b: f64,
}

impl LinearCorrection {
    pub fn at(&self, pileup: f64) -> f64 {
        self.a * pileup + self.b
    }
}

/// Simulation-derived corrections of the combined efficiencies
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct McCorrections {
    pub bb: LinearCorrection,
    pub be: LinearCorrection,
    pub ee: LinearCorrection,
}

impl McCorrections {
    /// Load the corrections from a JSON file.
    ///
    /// Accepts both `{"BB": {"a": .., "b": ..}, ...}` and the flat `{"BB_a": .., "BB_b": .., ...}`.
    pub fn read_file(path: &Path) -> Result<Self, CalibrationError> {
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path.to_path_buf()));
        }
        let json_str = std::fs::read_to_string(path)?;
        Self::from_json(&json_str)
    }

    pub fn from_json(json_str: &str) -> Result<Self, CalibrationError> {
        let value: serde_json::Value = serde_json::from_str(json_str)?;
        let region = |pair: RegionPair| -> Result<LinearCorrection, CalibrationError> {
            let name = pair.name();
            if let Some(nested) = value.get(name) {
                return Ok(serde_json::from_value::<LinearCorrection>(nested.clone())?);
            }
            let flat = |param: &str| value.get(format!("{name}_{param}")).and_then(|v| v.as_f64());
            match (flat("a"), flat("b")) {
                (Some(a), Some(b)) => Ok(LinearCorrection { a, b }),
                _ => Err(CalibrationError::MissingRegion(name.to_string())),
            }
        };
        Ok(Self {
            bb: region(RegionPair::BB)?,
            be: region(RegionPair::BE)?,
            ee: region(RegionPair::EE)?,
        })
    }

    pub fn get(&self, pair: RegionPair) -> &LinearCorrection {
        match pair {
            RegionPair::BB => &self.bb,
            RegionPair::BE => &self.be,
            RegionPair::EE => &self.ee,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CorrelationRow {
    pileup_low: f64,
    pileup_high: f64,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CorrelationBin {
    low: f64,
    high: f64,
    value: f64,
}

/// Inner/outer track correlation factor as a function of pileup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationCalibration {
    bins: Vec<CorrelationBin>,
}

impl CorrelationCalibration {
    /// Load the calibration from a CSV file with columns `pileup_low,pileup_high,value`.
    ///
    /// Values which are not numbers (e.g. `nan`, empty) are kept as NaN, which the fold
    /// treats as a factor of 1.
    pub fn read_file(path: &Path) -> Result<Self, CalibrationError> {
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut bins = Vec::new();
        for row in reader.deserialize::<CorrelationRow>() {
            let row = row?;
            let value = match row.value.parse::<f64>() {
                Ok(value) => value,
                Err(_) => {
                    log::warn!(
                        "Correlation calibration value {:?} for pileup [{}, {}) is not a number; using 1",
                        row.value,
                        row.pileup_low,
                        row.pileup_high
                    );
                    f64::NAN
                }
            };
            bins.push((row.pileup_low, row.pileup_high, value));
        }
        Self::from_bins(bins)
    }

    /// Build a calibration from (low, high, value) bins
    pub fn from_bins(bins: Vec<(f64, f64, f64)>) -> Result<Self, CalibrationError> {
        let mut calibration = Self::default();
        for (low, high, value) in bins {
            if !(low < high) {
                return Err(CalibrationError::BadBin(low, high));
            }
            calibration.bins.push(CorrelationBin { low, high, value });
        }
        calibration
            .bins
            .sort_by(|a, b| a.low.total_cmp(&b.low));
        Ok(calibration)
    }

    /// A calibration where the factor is 1 everywhere
    pub fn uniform() -> Self {
        Self {
            bins: vec![CorrelationBin {
                low: f64::NEG_INFINITY,
                high: f64::INFINITY,
                value: 1.0,
            }],
        }
    }

    /// Correlation factor at the given pileup. NaN if no bin covers it.
    pub fn value_at(&self, pileup: f64) -> f64 {
        self.bins
            .iter()
            .find(|bin| pileup >= bin.low && pileup < bin.high)
            .map(|bin| bin.value)
            .unwrap_or(f64::NAN)
    }
}

/// Fold the correlation calibration with the measured pileup distribution of a window.
///
/// Pileup values where the calibration is not a number count with a factor of 1. An empty
/// pileup distribution gives a factor of 1.
pub fn fold_correlation(calibration: &CorrelationCalibration, pileup: &Hist1D) -> f64 {
    let Some(normalized) = pileup.normalized() else {
        log::warn!("Pileup distribution is empty; using an inner/outer correlation of 1");
        return 1.0;
    };
    let mut c_io = 0.0;
    for ipv in 0..N_PILEUP_FOLD {
        let x = ipv as f64;
        let mut c = calibration.value_at(x);
        if c.is_nan() {
            c = 1.0;
        }
        c_io += c * normalized.bin_content(normalized.find_bin(x));
    }
    log::debug!(
        "Inner/outer correlation {} at average pileup {}",
        c_io,
        normalized.mean()
    );
    c_io
}

/// The calibration inputs of the propagation, loaded once per process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibrations {
    pub mc: McCorrections,
    pub correlation: CorrelationCalibration,
    /// Relative uncertainty of the reference luminosity
    pub lumi_uncertainty: f64,
}

/// What the propagation needs to know about a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldInputs {
    pub efficiency: CombinedEfficiency,
    /// Reconstructed Z candidates per region pair, BB, BE, EE
    pub z_reco: [u64; 3],
    pub avg_pileup: f64,
    pub c_io: f64,
    /// Reference (recorded) luminosity, pb-1
    pub luminosity: f64,
}

/// The final numbers of a window. Uncertainty components are kept apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedZYield {
    pub efficiency: CombinedEfficiency,
    pub efficiency_mc: CombinedEfficiency,
    pub c_io: f64,
    pub z_reco: f64,
    pub z_reco_error: f64,
    /// Delivered count using the uncorrected efficiency
    pub z_delivered: f64,
    pub z_delivered_mc: AsymmetricValue,
    pub z_delivered_bb: f64,
    pub z_delivered_be: f64,
    pub z_delivered_ee: f64,
    pub fiducial: f64,
    pub fiducial_mc: f64,
    /// Statistical component on `fiducial_mc`
    pub fiducial_stat: AsymmetricValue,
    /// Luminosity-scale component on `fiducial_mc`
    pub fiducial_lumi: f64,
}

impl CombinedZYield {
    /// Low and high total uncertainty of the fiducial luminosity
    pub fn total(&self) -> (f64, f64) {
        (
            self.fiducial_stat.error_low.hypot(self.fiducial_lumi),
            self.fiducial_stat.error_high.hypot(self.fiducial_lumi),
        )
    }
}

fn corrected(value: &AsymmetricValue, correction: f64) -> AsymmetricValue {
    AsymmetricValue::new(value.value - correction, value.error_low, value.error_high)
}

/// Compute delivered Z counts and the fiducial luminosity of a window
pub fn propagate(
    inputs: &YieldInputs,
    calibrations: &Calibrations,
) -> Result<CombinedZYield, PropagationError> {
    if !(inputs.luminosity > 0.0) {
        return Err(PropagationError::NonPositiveLuminosity(inputs.luminosity));
    }
    let raw = &inputs.efficiency;
    let pu = inputs.avg_pileup;
    let bb = corrected(&raw.bb, calibrations.mc.bb.at(pu));
    let be = corrected(&raw.be, calibrations.mc.be.at(pu));
    let ee = corrected(&raw.ee, calibrations.mc.ee.at(pu));
    // The corrections only shift the values; the total keeps the errors of the raw total
    let weighted = super::extractor::rate_weighted([bb, be, ee]);
    let total = AsymmetricValue::new(weighted.value, raw.total.error_low, raw.total.error_high);
    let efficiency_mc = CombinedEfficiency { bb, be, ee, total };
    if !(total.value > 0.0) {
        return Err(PropagationError::NonPositiveEfficiency(total.value));
    }

    let c_io2 = inputs.c_io * inputs.c_io;
    let n_reco: u64 = inputs.z_reco.iter().sum();
    let z_reco = n_reco as f64 * (1.0 - FAKE_RATE);
    let z_reco_error = (n_reco as f64).sqrt() * (1.0 - FAKE_RATE);

    let z_delivered = if raw.total.value > 0.0 {
        z_reco / raw.total.value * c_io2
    } else {
        0.0
    };
    let z_delivered_mc = z_reco / total.value * c_io2;

    // relative count error is 1/sqrt(N)
    let count_term = if n_reco > 0 { 1.0 / n_reco as f64 } else { 0.0 };
    let stat = |error: f64| z_delivered_mc * (count_term + (error / total.value).powi(2)).sqrt();
    let z_delivered_mc = AsymmetricValue::new(
        z_delivered_mc,
        stat(total.error_low),
        stat(total.error_high),
    );

    let pair_delivered = |pair: RegionPair| {
        let efficiency = efficiency_mc.get(pair).value;
        if efficiency > 0.0 {
            inputs.z_reco[pair as usize] as f64 * (1.0 - FAKE_RATE) / efficiency * c_io2
        } else {
            0.0
        }
    };

    let fiducial_mc = z_delivered_mc.value / inputs.luminosity;
    Ok(CombinedZYield {
        efficiency: *raw,
        efficiency_mc,
        c_io: inputs.c_io,
        z_reco,
        z_reco_error,
        z_delivered,
        z_delivered_mc,
        z_delivered_bb: pair_delivered(RegionPair::BB),
        z_delivered_be: pair_delivered(RegionPair::BE),
        z_delivered_ee: pair_delivered(RegionPair::EE),
        fiducial: z_delivered / inputs.luminosity,
        fiducial_mc,
        fiducial_stat: AsymmetricValue::new(
            fiducial_mc,
            z_delivered_mc.error_low / inputs.luminosity,
            z_delivered_mc.error_high / inputs.luminosity,
        ),
        fiducial_lumi: fiducial_mc * calibrations.lumi_uncertainty,
    })
}
