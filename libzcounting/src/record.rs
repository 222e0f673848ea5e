use serde::{Deserialize, Serialize};

use super::accumulator::WindowMeta;
use super::extractor::{AsymmetricValue, EfficiencySet};
use super::leg::{Leg, Region};
use super::propagation::CombinedZYield;

/// One row of output: a finalized, successfully fitted measurement window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    /// `first-last` for merged windows, else the run number
    pub run: String,
    pub first_run: u32,
    pub last_run: u32,
    pub fill: u32,
    pub measurement: usize,
    pub tdate_begin: i64,
    pub tdate_end: i64,
    pub timewindow: f64,
    pub lumi_del: f64,
    pub lumi_rec: f64,
    pub pileup: f64,

    pub eff_sta_b: f64,
    pub eff_sta_b_err_lo: f64,
    pub eff_sta_b_err_hi: f64,
    pub chi2_sta_b: f64,
    pub eff_sta_e: f64,
    pub eff_sta_e_err_lo: f64,
    pub eff_sta_e_err_hi: f64,
    pub chi2_sta_e: f64,
    pub eff_glo_b: f64,
    pub eff_glo_b_err_lo: f64,
    pub eff_glo_b_err_hi: f64,
    pub chi2_glo_b: f64,
    pub eff_glo_e: f64,
    pub eff_glo_e_err_lo: f64,
    pub eff_glo_e_err_hi: f64,
    pub chi2_glo_e: f64,
    pub eff_sel_b: f64,
    pub eff_sel_b_err_lo: f64,
    pub eff_sel_b_err_hi: f64,
    pub chi2_sel_b: f64,
    pub eff_sel_e: f64,
    pub eff_sel_e_err_lo: f64,
    pub eff_sel_e_err_hi: f64,
    pub chi2_sel_e: f64,
    pub eff_hlt_b: f64,
    pub eff_hlt_b_err_lo: f64,
    pub eff_hlt_b_err_hi: f64,
    pub chi2_hlt_b: f64,
    pub eff_hlt_e: f64,
    pub eff_hlt_e_err_lo: f64,
    pub eff_hlt_e_err_hi: f64,
    pub chi2_hlt_e: f64,

    pub z_eff_bb: f64,
    pub z_eff_bb_err_lo: f64,
    pub z_eff_bb_err_hi: f64,
    pub z_eff_be: f64,
    pub z_eff_be_err_lo: f64,
    pub z_eff_be_err_hi: f64,
    pub z_eff_ee: f64,
    pub z_eff_ee_err_lo: f64,
    pub z_eff_ee_err_hi: f64,
    pub z_eff: f64,
    pub z_eff_err_lo: f64,
    pub z_eff_err_hi: f64,
    pub z_eff_mc_bb: f64,
    pub z_eff_mc_bb_err_lo: f64,
    pub z_eff_mc_bb_err_hi: f64,
    pub z_eff_mc_be: f64,
    pub z_eff_mc_be_err_lo: f64,
    pub z_eff_mc_be_err_hi: f64,
    pub z_eff_mc_ee: f64,
    pub z_eff_mc_ee_err_lo: f64,
    pub z_eff_mc_ee_err_hi: f64,
    pub z_eff_mc: f64,
    pub z_eff_mc_err_lo: f64,
    pub z_eff_mc_err_hi: f64,

    pub c_io: f64,
    pub z_reco: f64,
    pub z_reco_err: f64,
    pub z_del: f64,
    pub z_del_mc: f64,
    pub z_del_mc_err_lo: f64,
    pub z_del_mc_err_hi: f64,
    pub z_del_bb: f64,
    pub z_del_be: f64,
    pub z_del_ee: f64,

    pub z_fid: f64,
    pub z_fid_mc: f64,
    pub z_fid_mc_stat_lo: f64,
    pub z_fid_mc_stat_hi: f64,
    pub z_fid_mc_lumi: f64,
}

/// (efficiency, error low, error high, chi2) of a leg
fn leg_columns(set: &EfficiencySet, leg: Leg, region: Region) -> (f64, f64, f64, f64) {
    let result = set.get(leg, region);
    (
        result.efficiency.value,
        result.efficiency.error_low,
        result.efficiency.error_high,
        result.chi2,
    )
}

fn value_columns(value: &AsymmetricValue) -> (f64, f64, f64) {
    (value.value, value.error_low, value.error_high)
}

impl AggregatedRecord {
    pub fn new(meta: &WindowMeta, efficiencies: &EfficiencySet, result: &CombinedZYield) -> Self {
        let (eff_sta_b, eff_sta_b_err_lo, eff_sta_b_err_hi, chi2_sta_b) =
            leg_columns(efficiencies, Leg::Standalone, Region::Barrel);
        let (eff_sta_e, eff_sta_e_err_lo, eff_sta_e_err_hi, chi2_sta_e) =
            leg_columns(efficiencies, Leg::Standalone, Region::Endcap);
        let (eff_glo_b, eff_glo_b_err_lo, eff_glo_b_err_hi, chi2_glo_b) =
            leg_columns(efficiencies, Leg::Global, Region::Barrel);
        let (eff_glo_e, eff_glo_e_err_lo, eff_glo_e_err_hi, chi2_glo_e) =
            leg_columns(efficiencies, Leg::Global, Region::Endcap);
        let (eff_sel_b, eff_sel_b_err_lo, eff_sel_b_err_hi, chi2_sel_b) =
            leg_columns(efficiencies, Leg::Selection, Region::Barrel);
        let (eff_sel_e, eff_sel_e_err_lo, eff_sel_e_err_hi, chi2_sel_e) =
            leg_columns(efficiencies, Leg::Selection, Region::Endcap);
        let (eff_hlt_b, eff_hlt_b_err_lo, eff_hlt_b_err_hi, chi2_hlt_b) =
            leg_columns(efficiencies, Leg::Trigger, Region::Barrel);
        let (eff_hlt_e, eff_hlt_e_err_lo, eff_hlt_e_err_hi, chi2_hlt_e) =
            leg_columns(efficiencies, Leg::Trigger, Region::Endcap);

        let raw = &result.efficiency;
        let mc = &result.efficiency_mc;
        let (z_eff_bb, z_eff_bb_err_lo, z_eff_bb_err_hi) = value_columns(&raw.bb);
        let (z_eff_be, z_eff_be_err_lo, z_eff_be_err_hi) = value_columns(&raw.be);
        let (z_eff_ee, z_eff_ee_err_lo, z_eff_ee_err_hi) = value_columns(&raw.ee);
        let (z_eff, z_eff_err_lo, z_eff_err_hi) = value_columns(&raw.total);
        let (z_eff_mc_bb, z_eff_mc_bb_err_lo, z_eff_mc_bb_err_hi) = value_columns(&mc.bb);
        let (z_eff_mc_be, z_eff_mc_be_err_lo, z_eff_mc_be_err_hi) = value_columns(&mc.be);
        let (z_eff_mc_ee, z_eff_mc_ee_err_lo, z_eff_mc_ee_err_hi) = value_columns(&mc.ee);
        let (z_eff_mc, z_eff_mc_err_lo, z_eff_mc_err_hi) = value_columns(&mc.total);
        let (z_del_mc, z_del_mc_err_lo, z_del_mc_err_hi) = value_columns(&result.z_delivered_mc);

        Self {
            run: meta.run_span(),
            first_run: meta.first_run,
            last_run: meta.last_run,
            fill: meta.fill,
            measurement: meta.measurement,
            tdate_begin: meta.time_begin,
            tdate_end: meta.time_end,
            timewindow: meta.time_window,
            lumi_del: meta.lumi_delivered,
            lumi_rec: meta.lumi_recorded,
            pileup: meta.pileup,
            eff_sta_b,
            eff_sta_b_err_lo,
            eff_sta_b_err_hi,
            chi2_sta_b,
            eff_sta_e,
            eff_sta_e_err_lo,
            eff_sta_e_err_hi,
            chi2_sta_e,
            eff_glo_b,
            eff_glo_b_err_lo,
            eff_glo_b_err_hi,
            chi2_glo_b,
            eff_glo_e,
            eff_glo_e_err_lo,
            eff_glo_e_err_hi,
            chi2_glo_e,
            eff_sel_b,
            eff_sel_b_err_lo,
            eff_sel_b_err_hi,
            chi2_sel_b,
            eff_sel_e,
            eff_sel_e_err_lo,
            eff_sel_e_err_hi,
            chi2_sel_e,
            eff_hlt_b,
            eff_hlt_b_err_lo,
            eff_hlt_b_err_hi,
            chi2_hlt_b,
            eff_hlt_e,
            eff_hlt_e_err_lo,
            eff_hlt_e_err_hi,
            chi2_hlt_e,
            z_eff_bb,
            z_eff_bb_err_lo,
            z_eff_bb_err_hi,
            z_eff_be,
            z_eff_be_err_lo,
            z_eff_be_err_hi,
            z_eff_ee,
            z_eff_ee_err_lo,
            z_eff_ee_err_hi,
            z_eff,
            z_eff_err_lo,
            z_eff_err_hi,
            z_eff_mc_bb,
            z_eff_mc_bb_err_lo,
            z_eff_mc_bb_err_hi,
            z_eff_mc_be,
            z_eff_mc_be_err_lo,
            z_eff_mc_be_err_hi,
            z_eff_mc_ee,
            z_eff_mc_ee_err_lo,
            z_eff_mc_ee_err_hi,
            z_eff_mc,
            z_eff_mc_err_lo,
            z_eff_mc_err_hi,
            c_io: result.c_io,
            z_reco: result.z_reco,
            z_reco_err: result.z_reco_error,
            z_del: result.z_delivered,
            z_del_mc,
            z_del_mc_err_lo,
            z_del_mc_err_hi,
            z_del_bb: result.z_delivered_bb,
            z_del_be: result.z_delivered_be,
            z_del_ee: result.z_delivered_ee,
            z_fid: result.fiducial,
            z_fid_mc: result.fiducial_mc,
            z_fid_mc_stat_lo: result.fiducial_stat.error_low,
            z_fid_mc_stat_hi: result.fiducial_stat.error_high,
            z_fid_mc_lumi: result.fiducial_lumi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{combine, EfficiencyResult};
    use crate::leg::FitCategory;
    use crate::propagation::{
        propagate, Calibrations, CorrelationCalibration, LinearCorrection, YieldInputs,
    };

    fn meta() -> WindowMeta {
        WindowMeta {
            first_run: 356000,
            last_run: 356001,
            fill: 8100,
            measurement: 2,
            n_lumisections: 10,
            time_begin: 1_660_000_000,
            time_end: 1_660_000_233,
            time_window: 233.0,
            lumi_recorded: 20.0,
            lumi_delivered: 21.0,
            pileup: 30.0,
        }
    }

    #[test]
    fn test_record_columns() {
        let mut efficiencies = EfficiencySet::uniform(EfficiencyResult {
            efficiency: AsymmetricValue::new(0.95, 0.01, 0.02),
            chi2: 1.3,
            signal_yield: 500.0,
        });
        efficiencies.set(
            FitCategory::new(Leg::Trigger, Region::Endcap),
            EfficiencyResult {
                efficiency: AsymmetricValue::new(0.85, 0.03, 0.01),
                chi2: 0.7,
                signal_yield: 300.0,
            },
        );
        let mut calibrations = Calibrations {
            correlation: CorrelationCalibration::uniform(),
            lumi_uncertainty: 0.015,
            ..Default::default()
        };
        calibrations.mc.ee = LinearCorrection { a: 0.0, b: 0.01 };
        let inputs = YieldInputs {
            efficiency: combine(&efficiencies),
            z_reco: [300, 400, 300],
            avg_pileup: 30.0,
            c_io: 1.0,
            luminosity: 20.0,
        };
        let result = propagate(&inputs, &calibrations).unwrap();
        let record = AggregatedRecord::new(&meta(), &efficiencies, &result);

        assert_eq!(record.run, "356000-356001");
        assert_eq!(record.measurement, 2);
        assert_eq!(record.eff_hlt_e, 0.85);
        assert_eq!(record.eff_hlt_e_err_lo, 0.03);
        assert_eq!(record.chi2_hlt_e, 0.7);
        assert_eq!(record.z_eff_ee, result.efficiency.ee.value);
        assert_eq!(record.z_eff_mc_ee, result.efficiency.ee.value - 0.01);
        // the simulation correction shifts the value and keeps the errors
        assert!(record.z_eff_mc_ee_err_lo > 0.0);
        assert_eq!(record.z_eff_mc_ee_err_lo, record.z_eff_ee_err_lo);
        assert_eq!(record.z_eff_mc_ee_err_hi, record.z_eff_ee_err_hi);
        assert_eq!(record.z_eff_mc_bb_err_hi, record.z_eff_bb_err_hi);
        assert_eq!(record.z_eff_mc_be_err_lo, record.z_eff_be_err_lo);
        assert_eq!(record.z_fid_mc_lumi, result.fiducial_lumi);
    }
}
