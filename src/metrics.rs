/// Counters collected by one search context
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InferenceStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub depth_limit_hits: usize,
    pub cycle_cuts: usize,
    pub generic_instantiations: usize,
}

impl InferenceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }

    pub fn record_depth_limit(&mut self) {
        self.depth_limit_hits += 1;
    }

    pub fn record_cycle_cut(&mut self) {
        self.cycle_cuts += 1;
    }

    pub fn record_generic_instantiation(&mut self) {
        self.generic_instantiations += 1;
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 1.0;
        }
        self.cache_hits as f64 / total as f64
    }

    pub fn format(&self) -> String {
        format!(
            r#"=== Inference Metrics ===
Cache Lookups: {} (hit rate: {:.1}%)
Depth Limit Hits: {}
Cycle Cuts: {}
Generic Instantiations: {}"#,
            self.cache_hits + self.cache_misses,
            self.hit_rate() * 100.0,
            self.depth_limit_hits,
            self.cycle_cuts,
            self.generic_instantiations
        )
    }
}

/// Outcome of one resolve analyzer run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveReport {
    /// Items handed to the analyzer
    pub items: usize,
    /// Fixed-point passes, counting the initial attempt
    pub passes: usize,
    /// Items finished with a real (non-forced) result
    pub resolved: usize,
    /// Items finished by forced resolution
    pub forced: usize,
    /// Forced rounds taken before the pending set drained
    pub forced_rounds: usize,
    /// The forced-round cap was reached and the remainder forced at once
    pub hit_round_cap: bool,
}

impl ResolveReport {
    pub fn merge(&mut self, other: &ResolveReport) {
        self.items += other.items;
        self.passes += other.passes;
        self.resolved += other.resolved;
        self.forced += other.forced;
        self.forced_rounds += other.forced_rounds;
        self.hit_round_cap |= other.hit_round_cap;
    }

    pub fn format(&self) -> String {
        format!(
            r#"=== Resolve Report ===
Items: {}
Passes: {}
Resolved: {}
Forced: {} ({} rounds{})"#,
            self.items,
            self.passes,
            self.resolved,
            self.forced,
            self.forced_rounds,
            if self.hit_round_cap { ", cap reached" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut stats = InferenceStats::new();
        assert_eq!(stats.hit_rate(), 1.0);
        stats.record_lookup(true);
        stats.record_lookup(false);
        assert_eq!(stats.hit_rate(), 0.5);
        stats.reset();
        assert_eq!(stats.cache_misses, 0);
    }

    #[test]
    fn test_report_merge_and_format() {
        let mut report = ResolveReport {
            items: 2,
            passes: 3,
            resolved: 1,
            forced: 1,
            forced_rounds: 1,
            hit_round_cap: false,
        };
        report.merge(&ResolveReport {
            items: 1,
            resolved: 1,
            passes: 1,
            ..Default::default()
        });
        assert_eq!(report.items, 3);
        assert_eq!(report.resolved, 2);
        assert!(report.format().contains("Forced: 1 (1 rounds)"));
    }
}
