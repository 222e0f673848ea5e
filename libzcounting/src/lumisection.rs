use std::collections::BTreeMap;
use std::path::Path;

use time::macros::format_description;
use time::PrimitiveDateTime;

use super::error::LoaderError;

/// Duration of a single lumisection in seconds
pub const SECONDS_PER_LS: f64 = 23.3;

/// Raw Z candidate counts per tag-and-probe category within one lumisection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub hlt: u64,
    pub sel: u64,
    pub glo: u64,
    pub sta: u64,
}

impl CategoryCounts {
    /// Number of reconstructed Z candidates, which excludes the global-muon category
    /// (its probes are already counted as standalone or selected muons)
    pub fn z_candidates(&self) -> u64 {
        self.hlt + self.sel + self.sta
    }
}

/// The atomic luminosity accounting unit.
///
/// Ordered by (run, ls). Luminosities are in pb-1.
#[derive(Debug, Clone, PartialEq)]
pub struct LumiSection {
    pub run: u32,
    pub fill: u32,
    pub ls: u32,
    pub timestamp: i64,
    pub delivered: f64,
    pub recorded: f64,
    pub avg_pileup: f64,
    pub counts: CategoryCounts,
}

impl LumiSection {
    /// Attach the detector counts, consuming the original record
    pub fn with_counts(self, counts: CategoryCounts) -> Self {
        Self { counts, ..self }
    }
}

/// Parse a brilcalc `run:fill` or `ls:ls` pair, keeping both numbers
fn parse_pair(field: &str) -> Option<(u32, u32)> {
    let mut parts = field.trim().split(':');
    let first = parts.next()?.trim().parse().ok()?;
    let second = match parts.next() {
        Some(p) => p.trim().parse().ok()?,
        None => first,
    };
    Some((first, second))
}

/// Parse a lumisection timestamp into unix seconds.
///
/// Accepts plain unix seconds or the brilcalc `mm/dd/yy hh:mm:ss` (UTC) format.
pub fn parse_timestamp(field: &str) -> Option<i64> {
    let field = field.trim();
    if let Ok(seconds) = field.parse::<i64>() {
        return Some(seconds);
    }
    let (date, clock) = field.split_once(' ')?;
    let mut date_parts: Vec<String> = date.split('/').map(String::from).collect();
    if date_parts.len() != 3 {
        return None;
    }
    if date_parts[2].len() == 2 {
        date_parts[2] = format!("20{}", date_parts[2]);
    }
    let full = format!("{} {}", date_parts.join("/"), clock.trim());
    let format = format_description!("[month]/[day]/[year] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(&full, &format)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}

/// Load the per-lumisection luminosity records (brilcalc by-LS CSV).
///
/// Only runs in the half-open range `[begin_run, end_run)` are kept. The result is sorted by
/// (run, ls) with duplicated lumisections removed.
pub fn load_byls(
    path: &Path,
    begin_run: u32,
    end_run: u32,
) -> Result<Vec<LumiSection>, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::BadFilePath(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)?;

    let mut sections = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < 8 {
            return Err(LoaderError::BadRow(
                line,
                format!("expected at least 8 columns, found {}", record.len()),
            ));
        }

        let (run, fill) = parse_pair(&record[0])
            .ok_or_else(|| LoaderError::BadRow(line, format!("bad run:fill {}", &record[0])))?;
        if run < begin_run || run >= end_run {
            continue;
        }
        let (ls, _) = parse_pair(&record[1])
            .ok_or_else(|| LoaderError::BadRow(line, format!("bad ls {}", &record[1])))?;
        let timestamp = parse_timestamp(&record[2])
            .ok_or_else(|| LoaderError::BadRow(line, format!("bad time {}", &record[2])))?;
        let delivered = record[5].trim().parse::<f64>().unwrap_or(f64::NAN);
        let recorded = record[6].trim().parse::<f64>().unwrap_or(f64::NAN);
        let avg_pileup = record[7].trim().parse::<f64>().unwrap_or(0.0);

        if !delivered.is_finite() || !recorded.is_finite() || recorded < 0.0 || delivered < 0.0 {
            log::warn!(
                "Run {run} LS {ls} has unusable luminosity (delivered {}, recorded {}); dropping it",
                &record[5],
                &record[6]
            );
            continue;
        }

        sections.push(LumiSection {
            run,
            fill,
            ls,
            timestamp,
            delivered,
            recorded,
            avg_pileup,
            counts: CategoryCounts::default(),
        });
    }

    sections.sort_by_key(|s| (s.run, s.ls));
    let n_loaded = sections.len();
    sections.dedup_by_key(|s| (s.run, s.ls));
    if sections.len() != n_loaded {
        log::warn!(
            "Dropped {} duplicated lumisections from {}",
            n_loaded - sections.len(),
            path.to_string_lossy()
        );
    }
    Ok(sections)
}

/// Group an ordered lumisection stream by run
pub fn group_by_run(sections: Vec<LumiSection>) -> BTreeMap<u32, Vec<LumiSection>> {
    let mut runs: BTreeMap<u32, Vec<LumiSection>> = BTreeMap::new();
    for section in sections {
        runs.entry(section.run).or_default().push(section);
    }
    runs
}

/// Total recorded luminosity of a set of lumisections
pub fn recorded_lumi(sections: &[LumiSection]) -> f64 {
    sections.iter().map(|s| s.recorded).sum()
}

/// Lumisections without any Z candidate. They still count towards the luminosity of a
/// window.
pub fn zero_yield(sections: &[LumiSection]) -> Vec<u32> {
    sections
        .iter()
        .filter(|s| s.counts.z_candidates() == 0)
        .map(|s| s.ls)
        .collect()
}
