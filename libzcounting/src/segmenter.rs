use super::error::SegmenterError;
use super::lumisection::LumiSection;

/// Whether a window reached the luminosity threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Accumulated luminosity reached the threshold
    Closed,
    /// The remainder at the end of the run, which did not reach the threshold. The caller
    /// decides whether to merge it into the next run or finalize it as is.
    Tail,
}

/// A contiguous slice of lumisections of a single run
#[derive(Debug, Clone, PartialEq)]
pub struct Window<'a> {
    pub index: usize,
    pub kind: WindowKind,
    pub sections: &'a [LumiSection],
    pub recorded: f64,
}

impl Window<'_> {
    pub fn ls_ids(&self) -> Vec<u32> {
        self.sections.iter().map(|s| s.ls).collect()
    }

    pub fn is_tail(&self) -> bool {
        self.kind == WindowKind::Tail
    }
}

/// Splits the lumisections of a run into windows of (at least) a fixed recorded luminosity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segmenter {
    threshold: f64,
}

impl Segmenter {
    /// Create a Segmenter closing windows once `threshold` (pb-1) is recorded
    pub fn new(threshold: f64) -> Result<Self, SegmenterError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(SegmenterError::BadThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    /// A Segmenter which never closes a window: every run becomes a single tail
    pub fn inclusive() -> Self {
        Self {
            threshold: f64::INFINITY,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Lazily segment an ordered run. Calling this again on the same input gives the same
    /// windows.
    pub fn segment<'a>(&self, sections: &'a [LumiSection]) -> Segments<'a> {
        Segments {
            sections,
            position: 0,
            index: 0,
            threshold: self.threshold,
        }
    }
}

/// Iterator over the windows of a run, see `Segmenter::segment`
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    sections: &'a [LumiSection],
    position: usize,
    index: usize,
    threshold: f64,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.sections.len() {
            return None;
        }
        let start = self.position;
        let mut recorded = 0.0;
        let mut kind = WindowKind::Tail;
        while self.position < self.sections.len() {
            recorded += self.sections[self.position].recorded;
            self.position += 1;
            if recorded >= self.threshold {
                kind = WindowKind::Closed;
                break;
            }
        }
        let window = Window {
            index: self.index,
            kind,
            sections: &self.sections[start..self.position],
            recorded,
        };
        self.index += 1;
        Some(window)
    }
}
