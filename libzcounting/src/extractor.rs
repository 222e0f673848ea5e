use serde::{Deserialize, Serialize};

use super::accumulator::FinalizedWindow;
use super::config::Config;
use super::error::FitError;
use super::fit::{FitEngine, FitRequest, FitStore};
use super::leg::{FitCategory, Leg, Region, RegionPair};
use super::models::{BackgroundModel, SignalModel};

/// A value with an asymmetric (low, high) statistical error
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AsymmetricValue {
    pub value: f64,
    pub error_low: f64,
    pub error_high: f64,
}

impl AsymmetricValue {
    pub fn new(value: f64, error_low: f64, error_high: f64) -> Self {
        Self {
            value,
            error_low,
            error_high,
        }
    }
}

/// Efficiency of one leg in one region
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EfficiencyResult {
    pub efficiency: AsymmetricValue,
    pub chi2: f64,
    pub signal_yield: f64,
}

/// The eight leg/region efficiencies of a window
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencySet {
    results: [EfficiencyResult; 8],
}

impl EfficiencySet {
    /// Collect the efficiencies from the fit results of a window.
    ///
    /// Every leg/region category must be present.
    pub fn from_store(store: &FitStore) -> Result<Self, FitError> {
        let mut results = [EfficiencyResult::default(); 8];
        for category in FitCategory::all() {
            let output = store.get(category).ok_or_else(|| {
                FitError::NoResult(
                    category.to_string(),
                    format!("missing from fit results of measurement {}", store.measurement),
                )
            })?;
            results[category.index()] = EfficiencyResult {
                efficiency: AsymmetricValue::new(
                    output.efficiency,
                    output.efficiency_error_low,
                    output.efficiency_error_high,
                ),
                chi2: output.chi2(),
                signal_yield: output.signal_yield,
            };
        }
        Ok(Self { results })
    }

    /// Build a set where every category has the same result
    pub fn uniform(result: EfficiencyResult) -> Self {
        Self {
            results: [result; 8],
        }
    }

    pub fn set(&mut self, category: FitCategory, result: EfficiencyResult) {
        self.results[category.index()] = result;
    }

    pub fn get(&self, leg: Leg, region: Region) -> &EfficiencyResult {
        &self.results[FitCategory::new(leg, region).index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FitCategory, &EfficiencyResult)> {
        FitCategory::all().map(move |c| (c, &self.results[c.index()]))
    }
}

/// Combined Z detection efficiencies of a window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombinedEfficiency {
    pub bb: AsymmetricValue,
    pub be: AsymmetricValue,
    pub ee: AsymmetricValue,
    /// Average of the three categories weighted by their expected rates
    pub total: AsymmetricValue,
}

impl CombinedEfficiency {
    pub fn get(&self, pair: RegionPair) -> &AsymmetricValue {
        match pair {
            RegionPair::BB => &self.bb,
            RegionPair::BE => &self.be,
            RegionPair::EE => &self.ee,
        }
    }
}

fn regions_of(pair: RegionPair) -> (Region, Region) {
    match pair {
        RegionPair::BB => (Region::Barrel, Region::Barrel),
        RegionPair::BE => (Region::Barrel, Region::Endcap),
        RegionPair::EE => (Region::Endcap, Region::Endcap),
    }
}

/// Efficiency to reconstruct, select and trigger a Z with muons in the given regions:
///
/// `eGlo_1 eGlo_2 eSel_1 eSel_2 (1 - (1 - eHLT_1)(1 - eHLT_2))`
///
/// The error on each side is first order propagation of the per-leg errors. When both
/// muons are in the same region the efficiency enters squared, so the derivatives of both
/// muons add up before going into the quadrature sum.
pub fn pair_efficiency(set: &EfficiencySet, pair: RegionPair) -> AsymmetricValue {
    let (first, second) = regions_of(pair);
    let value = |leg: Leg, region: Region| set.get(leg, region).efficiency.value;

    let g1 = value(Leg::Global, first);
    let g2 = value(Leg::Global, second);
    let s1 = value(Leg::Selection, first);
    let s2 = value(Leg::Selection, second);
    let h1 = value(Leg::Trigger, first);
    let h2 = value(Leg::Trigger, second);
    let trigger = 1.0 - (1.0 - h1) * (1.0 - h2);
    let efficiency = g1 * g2 * s1 * s2 * trigger;

    let partials = [
        (FitCategory::new(Leg::Global, first), g2 * s1 * s2 * trigger),
        (FitCategory::new(Leg::Global, second), g1 * s1 * s2 * trigger),
        (FitCategory::new(Leg::Selection, first), g1 * g2 * s2 * trigger),
        (FitCategory::new(Leg::Selection, second), g1 * g2 * s1 * trigger),
        (FitCategory::new(Leg::Trigger, first), g1 * g2 * s1 * s2 * (1.0 - h2)),
        (FitCategory::new(Leg::Trigger, second), g1 * g2 * s1 * s2 * (1.0 - h1)),
    ];
    let mut derivatives = [0.0; 8];
    for (category, partial) in partials {
        derivatives[category.index()] += partial;
    }

    let propagate = |error_of: &dyn Fn(&AsymmetricValue) -> f64| -> f64 {
        set.iter()
            .map(|(category, result)| {
                (derivatives[category.index()] * error_of(&result.efficiency)).powi(2)
            })
            .sum::<f64>()
            .sqrt()
    };

    AsymmetricValue::new(
        efficiency,
        propagate(&|v: &AsymmetricValue| v.error_low),
        propagate(&|v: &AsymmetricValue| v.error_high),
    )
}

/// Combine the per-leg efficiencies into the three region pair efficiencies and their
/// rate-weighted average
pub fn combine(set: &EfficiencySet) -> CombinedEfficiency {
    let bb = pair_efficiency(set, RegionPair::BB);
    let be = pair_efficiency(set, RegionPair::BE);
    let ee = pair_efficiency(set, RegionPair::EE);
    CombinedEfficiency {
        bb,
        be,
        ee,
        total: rate_weighted([bb, be, ee]),
    }
}

/// Rate-weighted average of BB, BE, EE values; errors are added in quadrature
pub fn rate_weighted(values: [AsymmetricValue; 3]) -> AsymmetricValue {
    let rates = RegionPair::ALL.map(|pair| pair.rate());
    let norm: f64 = rates.iter().sum();
    let weighted = |pick: &dyn Fn(&AsymmetricValue) -> f64| -> f64 {
        rates
            .iter()
            .zip(values.iter())
            .map(|(rate, v)| (rate * pick(v)).powi(2))
            .sum::<f64>()
            .sqrt()
            / norm
    };
    let value = rates
        .iter()
        .zip(values.iter())
        .map(|(rate, v)| rate * v.value)
        .sum::<f64>()
        / norm;
    AsymmetricValue::new(
        value,
        weighted(&|v: &AsymmetricValue| v.error_low),
        weighted(&|v: &AsymmetricValue| v.error_high),
    )
}

/// Runs the fits of a window through a fit engine
pub struct Extractor<'a> {
    engine: &'a dyn FitEngine,
    signal_model: SignalModel,
    background_model: BackgroundModel,
}

impl<'a> Extractor<'a> {
    pub fn new(engine: &'a dyn FitEngine, config: &Config) -> Self {
        Self {
            engine,
            signal_model: config.signal_model,
            background_model: config.background_model,
        }
    }

    /// Fit every leg/region category of a finalized window.
    ///
    /// A category with an empty pass or fail histogram, or the first failing fit, aborts
    /// the window; the caller drops it.
    pub fn fit_window(&self, window: &FinalizedWindow) -> Result<FitStore, FitError> {
        let mut store = FitStore::new(window.meta.measurement, self.engine.name());
        for category in FitCategory::all() {
            if window.pass(category).is_empty() || window.fail(category).is_empty() {
                return Err(FitError::EmptyHistogram(category.to_string()));
            }
            let request = FitRequest {
                category,
                pass: window.pass(category),
                fail: window.fail(category),
                pileup: window.pileup(),
                signal_model: self.signal_model,
                background_model: self.background_model,
                measurement: window.meta.measurement,
                luminosity: window.meta.lumi_recorded,
            };
            let output = self.engine.fit(&request)?;
            log::debug!(
                "{} efficiency for measurement {}: {:.4} -{:.4} +{:.4}",
                category,
                window.meta.measurement,
                output.efficiency,
                output.efficiency_error_low,
                output.efficiency_error_high
            );
            store.insert(category, output);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{Acceptance, WindowAccumulator};
    use crate::counts::{ProbeRecord, RunCounts};
    use crate::fit::CountingEngine;
    use crate::lumisection::{CategoryCounts, LumiSection};
    use approx::assert_relative_eq;

    fn result(value: f64, error: f64) -> EfficiencyResult {
        EfficiencyResult {
            efficiency: AsymmetricValue::new(value, error, error),
            chi2: 1.0,
            signal_yield: 100.0,
        }
    }

    #[test]
    fn test_unit_efficiencies_combine_to_one() {
        let set = EfficiencySet::uniform(result(1.0, 0.0));
        let combined = combine(&set);
        assert_relative_eq!(combined.bb.value, 1.0);
        assert_relative_eq!(combined.be.value, 1.0);
        assert_relative_eq!(combined.ee.value, 1.0);
        assert_relative_eq!(combined.total.value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_efficiency_combines_to_zero() {
        for leg in [Leg::Global, Leg::Selection] {
            let mut set = EfficiencySet::uniform(result(0.95, 0.01));
            set.set(FitCategory::new(leg, Region::Barrel), result(0.0, 0.01));
            let combined = combine(&set);
            assert_eq!(combined.bb.value, 0.0);
            assert_eq!(combined.be.value, 0.0);
            assert!(combined.ee.value > 0.0);
            assert!(combined.bb.error_low.is_finite());
        }
        let set = EfficiencySet::uniform(result(0.0, 0.0));
        let combined = combine(&set);
        assert_eq!(combined.total.value, 0.0);
        assert_eq!(combined.total.error_high, 0.0);
    }

    #[test]
    fn test_zero_input_errors_give_zero_error() {
        let mut set = EfficiencySet::uniform(result(0.93, 0.0));
        set.set(
            FitCategory::new(Leg::Trigger, Region::Endcap),
            result(0.81, 0.0),
        );
        let combined = combine(&set);
        for value in [combined.bb, combined.be, combined.ee, combined.total] {
            assert_eq!(value.error_low, 0.0);
            assert_eq!(value.error_high, 0.0);
        }
    }

    #[test]
    fn test_formulas() {
        let mut set = EfficiencySet::uniform(result(1.0, 0.0));
        set.set(FitCategory::new(Leg::Global, Region::Barrel), result(0.98, 0.0));
        set.set(FitCategory::new(Leg::Global, Region::Endcap), result(0.96, 0.0));
        set.set(FitCategory::new(Leg::Selection, Region::Barrel), result(0.95, 0.0));
        set.set(FitCategory::new(Leg::Selection, Region::Endcap), result(0.93, 0.0));
        set.set(FitCategory::new(Leg::Trigger, Region::Barrel), result(0.90, 0.0));
        set.set(FitCategory::new(Leg::Trigger, Region::Endcap), result(0.80, 0.0));
        let combined = combine(&set);
        let bb = 0.98f64.powi(2) * 0.95f64.powi(2) * (1.0 - 0.1f64.powi(2));
        let be = 0.98 * 0.96 * 0.95 * 0.93 * (1.0 - 0.1 * 0.2);
        let ee = 0.96f64.powi(2) * 0.93f64.powi(2) * (1.0 - 0.2f64.powi(2));
        assert_relative_eq!(combined.bb.value, bb, epsilon = 1e-12);
        assert_relative_eq!(combined.be.value, be, epsilon = 1e-12);
        assert_relative_eq!(combined.ee.value, ee, epsilon = 1e-12);
        let total = (0.077904 * bb + 0.1172 * be + 0.105541 * ee) / (0.077904 + 0.1172 + 0.105541);
        assert_relative_eq!(combined.total.value, total, epsilon = 1e-12);
    }

    #[test]
    fn test_squared_efficiency_error_is_doubled() {
        // Only the barrel selection efficiency has an error
        let mut set = EfficiencySet::uniform(result(0.9, 0.0));
        set.set(
            FitCategory::new(Leg::Selection, Region::Barrel),
            result(0.9, 0.01),
        );
        let combined = combine(&set);
        // relative error on BB is 2 * 0.01 / 0.9, on BE 0.01 / 0.9
        assert_relative_eq!(
            combined.bb.error_low / combined.bb.value,
            2.0 * 0.01 / 0.9,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            combined.be.error_high / combined.be.value,
            0.01 / 0.9,
            epsilon = 1e-12
        );
        assert_eq!(combined.ee.error_low, 0.0);
    }

    #[test]
    fn test_trigger_error_propagation() {
        let mut set = EfficiencySet::uniform(result(1.0, 0.0));
        set.set(
            FitCategory::new(Leg::Trigger, Region::Barrel),
            EfficiencyResult {
                efficiency: AsymmetricValue::new(0.8, 0.02, 0.03),
                chi2: 1.0,
                signal_yield: 10.0,
            },
        );
        let combined = combine(&set);
        // d/dh (1 - (1-h)^2) = 2 (1 - h)
        assert_relative_eq!(combined.bb.error_low, 2.0 * 0.2 * 0.02, epsilon = 1e-12);
        assert_relative_eq!(combined.bb.error_high, 2.0 * 0.2 * 0.03, epsilon = 1e-12);
        // endcap trigger efficiency is 1: the barrel muon does not matter for BE
        assert_eq!(combined.be.error_low, 0.0);
    }

    /// One lumisection where every leg has the given pass/fail probes in barrel and endcap
    fn window(barrel: (u32, u32), endcap: (u32, u32)) -> FinalizedWindow {
        let mut records = Vec::new();
        for leg in Leg::ALL {
            for (eta, (n_pass, n_fail)) in [(0.3, barrel), (1.5, endcap)] {
                for i in 0..(n_pass + n_fail) {
                    records.push((
                        1,
                        ProbeRecord {
                            leg,
                            pass: i < n_pass,
                            mass: 91.0,
                            pt_tag: 40.0,
                            pt_probe: 40.0,
                            eta_tag: 0.0,
                            eta_probe: eta,
                            npv: 20.0,
                        },
                    ));
                }
            }
        }
        let counts = RunCounts::from_records(1, records);
        let config = Config::default();
        let mut acc = WindowAccumulator::new(Acceptance::from_config(&config));
        acc.add_lumisection(
            &LumiSection {
                run: 1,
                fill: 1,
                ls: 1,
                timestamp: 0,
                delivered: 1.0,
                recorded: 1.0,
                avg_pileup: 20.0,
                counts: CategoryCounts::default(),
            },
            &counts,
        );
        acc.finalize(0).unwrap()
    }

    #[test]
    fn test_fit_window_with_counting_engine() {
        let engine = CountingEngine;
        let extractor = Extractor::new(&engine, &Config::default());
        let store = extractor.fit_window(&window((9, 1), (8, 2))).unwrap();
        let set = EfficiencySet::from_store(&store).unwrap();
        assert_relative_eq!(set.get(Leg::Global, Region::Barrel).efficiency.value, 0.9);
        assert_relative_eq!(set.get(Leg::Trigger, Region::Endcap).efficiency.value, 0.8);
    }

    #[test]
    fn test_empty_fail_histogram_fails_the_window() {
        let engine = CountingEngine;
        let extractor = Extractor::new(&engine, &Config::default());
        assert!(matches!(
            extractor.fit_window(&window((9, 0), (8, 2))),
            Err(FitError::EmptyHistogram(_))
        ));
        assert!(matches!(
            extractor.fit_window(&window((9, 1), (0, 2))),
            Err(FitError::EmptyHistogram(_))
        ));
    }

    #[test]
    fn test_missing_category_in_store() {
        let store = FitStore::new(2, "counting");
        assert!(matches!(
            EfficiencySet::from_store(&store),
            Err(FitError::NoResult(_, _))
        ));
    }
}
