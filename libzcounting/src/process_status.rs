/// Progress message sent from the processing thread to whoever is watching
#[derive(Debug, Clone, Default)]
pub struct ProcessStatus {
    /// Fraction of runs done, 0 to 1
    pub progress: f32,
    pub run_number: u32,
}

impl ProcessStatus {
    pub fn new(progress: f32, run_number: u32) -> Self {
        Self {
            progress,
            run_number,
        }
    }
}
