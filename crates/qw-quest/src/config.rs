/// Configuration for progression tracking.
#[derive(Debug, Clone)]
pub struct ProgressionConfig {
    /// Longest plan the planner looks for.
    pub max_plan_length: usize,
    /// Maximum number of states the planner expands before giving up.
    pub max_expanded_states: usize,
    /// Whether quests are tracked at all. Untracked games only maintain the
    /// state and the valid actions.
    pub track_quests: bool,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            max_plan_length: 20,
            max_expanded_states: 10_000,
            track_quests: true,
        }
    }
}

impl ProgressionConfig {
    /// Set the longest plan the planner looks for.
    pub fn with_max_plan_length(mut self, length: usize) -> Self {
        self.max_plan_length = length;
        self
    }

    /// Set how many states the planner may expand.
    pub fn with_max_expanded_states(mut self, states: usize) -> Self {
        self.max_expanded_states = states;
        self
    }

    /// Enable or disable quest tracking.
    pub fn with_track_quests(mut self, track: bool) -> Self {
        self.track_quests = track;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = ProgressionConfig::default();
        assert_eq!(config.max_plan_length, 20);
        assert_eq!(config.max_expanded_states, 10_000);
        assert!(config.track_quests);
    }

    #[test]
    fn config_builder_chain() {
        let config = ProgressionConfig::default()
            .with_max_plan_length(5)
            .with_max_expanded_states(100)
            .with_track_quests(false);
        assert_eq!(config.max_plan_length, 5);
        assert_eq!(config.max_expanded_states, 100);
        assert!(!config.track_quests);
    }
}
