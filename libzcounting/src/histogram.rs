use ndarray::Array1;

/// Number of bins of the pileup (number of primary vertices) histogram
pub const PILEUP_BINS: usize = 100;
pub const PILEUP_LOW: f64 = 0.5;
pub const PILEUP_HIGH: f64 = 100.5;

/// A one dimensional histogram with fixed, uniform binning.
///
/// Bin 0 is the underflow, bin `n_bins + 1` the overflow, so that `find_bin` follows the
/// usual convention of the fit engine (first real bin is 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Hist1D {
    low: f64,
    high: f64,
    n_bins: usize,
    contents: Array1<f64>,
    entries: u64,
    sum_x: f64,
    sum_w: f64,
}

impl Hist1D {
    pub fn new(n_bins: usize, low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            n_bins,
            contents: Array1::zeros(n_bins + 2),
            entries: 0,
            sum_x: 0.0,
            sum_w: 0.0,
        }
    }

    /// The histogram of the number of primary vertices
    pub fn pileup() -> Self {
        Self::new(PILEUP_BINS, PILEUP_LOW, PILEUP_HIGH)
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.n_bins as f64
    }

    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.low {
            0
        } else if x >= self.high {
            self.n_bins + 1
        } else {
            let bin = ((x - self.low) / self.bin_width()) as usize + 1;
            bin.min(self.n_bins)
        }
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        if !x.is_finite() {
            return;
        }
        let bin = self.find_bin(x);
        self.contents[bin] += weight;
        self.entries += 1;
        if bin >= 1 && bin <= self.n_bins {
            self.sum_x += weight * x;
            self.sum_w += weight;
        }
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    /// Sum of the in-range bins (no under/overflow)
    pub fn integral(&self) -> f64 {
        self.contents
            .slice(ndarray::s![1..self.n_bins + 1])
            .sum()
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Weighted mean of the in-range fills; 0 for an empty histogram
    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 {
            0.0
        } else {
            self.sum_x / self.sum_w
        }
    }

    /// A copy scaled so that the in-range bins sum to one.
    ///
    /// Returns None if the histogram has no in-range content.
    pub fn normalized(&self) -> Option<Self> {
        let integral = self.integral();
        if integral <= 0.0 {
            return None;
        }
        let mut hist = self.clone();
        hist.contents /= integral;
        hist.sum_w /= integral;
        hist.sum_x /= integral;
        Some(hist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_find_bin() {
        let hist = Hist1D::new(120, 60.0, 120.0);
        assert_eq!(hist.find_bin(59.9), 0);
        assert_eq!(hist.find_bin(60.0), 1);
        assert_eq!(hist.find_bin(60.4), 1);
        assert_eq!(hist.find_bin(60.5), 2);
        assert_eq!(hist.find_bin(61.0), 3);
        assert_eq!(hist.find_bin(119.99), 120);
        assert_eq!(hist.find_bin(120.0), 121);
    }

    #[test]
    fn test_pileup_bins_are_centered_on_integers() {
        let hist = Hist1D::pileup();
        assert_eq!(hist.find_bin(0.0), 0);
        assert_eq!(hist.find_bin(1.0), 1);
        assert_eq!(hist.find_bin(42.0), 42);
        assert_eq!(hist.find_bin(100.0), 100);
    }

    #[test]
    fn test_fill_integral_mean() {
        let mut hist = Hist1D::pileup();
        hist.fill(20.0);
        hist.fill(30.0);
        hist.fill(30.0);
        hist.fill(250.0); // overflow
        assert_eq!(hist.entries(), 4);
        assert_relative_eq!(hist.integral(), 3.0);
        assert_relative_eq!(hist.mean(), 80.0 / 3.0);
        assert_relative_eq!(hist.bin_content(30), 2.0);
        assert_relative_eq!(hist.bin_content(101), 1.0);
    }

    #[test]
    fn test_normalized() {
        let mut hist = Hist1D::pileup();
        assert!(hist.normalized().is_none());
        for pv in [10.0, 10.0, 11.0, 15.0] {
            hist.fill(pv);
        }
        let norm = hist.normalized().unwrap();
        assert_relative_eq!(norm.integral(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(norm.bin_content(10), 0.5, epsilon = 1e-12);
        assert_relative_eq!(norm.mean(), hist.mean(), epsilon = 1e-12);
    }
}
