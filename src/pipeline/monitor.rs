/// Load-shedding rule for the analyser side channel.
///
/// The chunk stage measures frame channel utilization and skips quality
/// analysis while the pipeline is under pressure; chunking itself is never
/// shed.
#[derive(Debug, Clone, Copy)]
pub struct DegradationPolicy {
    threshold: f64,
}

impl DegradationPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn utilization(queued: usize, capacity: usize) -> f64 {
        if capacity == 0 {
            return 0.0;
        }
        queued as f64 / capacity as f64
    }

    pub fn should_skip_analysis(&self, queued: usize, capacity: usize) -> bool {
        Self::utilization(queued, capacity) >= self.threshold
    }
}

impl Default for DegradationPolicy {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}
