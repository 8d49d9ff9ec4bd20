//! Configuration (spec §6 "Configuration", SPEC_FULL.md §10.3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoAliasMode {
    Off,
    Conservative,
    Balanced,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoAliasPackingStrategy {
    GreedySweepLine,
    BranchAndBound,
}

/// Host-injected knobs the scheduler core consults every frame. Mirrors the
/// settings service the spec describes as a "host runtime service".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_alias_mode: AutoAliasMode,
    pub auto_alias_packing_strategy: AutoAliasPackingStrategy,
    pub auto_alias_pool_retire_idle_frames: u32,
    pub auto_alias_pool_growth_headroom: f32,
    pub auto_alias_log_exclusion_reasons: bool,
    pub use_async_compute: bool,
    /// Beam search width (SPEC_FULL.md §12).
    pub beam_width: usize,
    /// Alternative start offsets explored per beam state (SPEC_FULL.md §12).
    pub starts_per_state: usize,
    /// Validate no conflicting transitions per (batch, phase) after
    /// compiling each frame (spec §4.8 step 15). Costs an extra pass over
    /// every batch's transitions; off by default for release builds.
    pub debug_validate_batches: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_alias_mode: AutoAliasMode::Balanced,
            auto_alias_packing_strategy: AutoAliasPackingStrategy::GreedySweepLine,
            auto_alias_pool_retire_idle_frames: 120,
            auto_alias_pool_growth_headroom: 1.5,
            auto_alias_log_exclusion_reasons: false,
            use_async_compute: true,
            beam_width: 24,
            starts_per_state: 8,
            debug_validate_batches: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.auto_alias_pool_retire_idle_frames, 120);
        assert_eq!(s.auto_alias_pool_growth_headroom, 1.5);
        assert_eq!(s.beam_width, 24);
        assert_eq!(s.starts_per_state, 8);
    }

    #[test]
    fn round_trips_through_json() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.auto_alias_mode, s.auto_alias_mode);
    }
}
