//! Experiment configuration: stimulus catalog, block sequence and key mapping.
//!
//! Loaded once before a session is built. [`ExperimentConfig::validate`]
//! checks referential integrity up front; the per-block trial count is checked
//! later by the generator.

use iat_core::{BlockDefinition, Side, StimulusCatalog, StimulusLabel, StimulusRef};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no blocks configured")]
    NoBlocks,

    #[error("block {round} ('{label}') declares n = 0")]
    ZeroTrials { round: u32, label: String },

    #[error("block {round} ('{label}') references unknown category/level {stimulus}")]
    UnknownCategoryOrLevel {
        round: u32,
        label: String,
        stimulus: StimulusRef,
    },

    #[error("left and right capture keys overlap ('{0}')")]
    KeyCollision(String),
}

/// A physical key code and the character it produces, e.g. `KeyE` / `E`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub code: String,
    pub key: String,
}

impl KeyBinding {
    pub fn new(code: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            key: key.into(),
        }
    }

    /// Matches the exact key code or the character, ignoring case.
    pub fn matches(&self, pressed: &str) -> bool {
        pressed == self.code || pressed.eq_ignore_ascii_case(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureKeys {
    pub left: KeyBinding,
    pub right: KeyBinding,
}

impl Default for CaptureKeys {
    fn default() -> Self {
        Self {
            left: KeyBinding::new("KeyE", "E"),
            right: KeyBinding::new("KeyI", "I"),
        }
    }
}

impl CaptureKeys {
    pub fn binding(&self, side: Side) -> &KeyBinding {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn side_for(&self, pressed: &str) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|&side| self.binding(side).matches(pressed))
    }
}

fn default_next_trial_delay_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub stimuli: StimulusCatalog,
    /// Side headings; pairs without an entry are labelled with their level.
    #[serde(default)]
    pub labels: Vec<StimulusLabel>,
    /// One block per round, in play order.
    pub blocks: Vec<BlockDefinition>,
    #[serde(default)]
    pub capture_keys: CaptureKeys,
    #[serde(default = "default_next_trial_delay_ms")]
    pub next_trial_delay_ms: u64,
}

impl ExperimentConfig {
    /// Loads and validates a config. Files ending in `.yml`/`.yaml` are read
    /// as YAML, anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading experiment configuration");
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"));
        let config = if is_yaml {
            Self::from_yaml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        debug!(
            rounds = config.num_rounds(),
            delay_ms = config.next_trial_delay_ms,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks.is_empty() {
            return Err(ConfigError::NoBlocks);
        }

        for (round, block) in self.rounds() {
            if block.n == 0 {
                return Err(ConfigError::ZeroTrials {
                    round,
                    label: block.label.clone(),
                });
            }
            if let Some((_, stimulus)) = block
                .assignments()
                .find(|(_, stim)| !self.stimuli.contains(stim))
            {
                return Err(ConfigError::UnknownCategoryOrLevel {
                    round,
                    label: block.label.clone(),
                    stimulus: stimulus.clone(),
                });
            }
        }

        let keys = &self.capture_keys;
        if keys.left.matches(&keys.right.code) || keys.right.matches(&keys.left.code) {
            return Err(ConfigError::KeyCollision(keys.left.code.clone()));
        }
        if keys.left.key.eq_ignore_ascii_case(&keys.right.key) {
            return Err(ConfigError::KeyCollision(keys.left.key.clone()));
        }

        for stim in self.stimuli.refs() {
            if self.stimuli.words(&stim).is_some_and(<[String]>::is_empty) {
                warn!(stimulus = %stim, "Catalog level has no words");
            }
        }
        Ok(())
    }

    pub fn num_rounds(&self) -> usize {
        self.blocks.len()
    }

    /// Block for a 1-based round number.
    pub fn block(&self, round: u32) -> Option<&BlockDefinition> {
        let idx = usize::try_from(round).ok()?.checked_sub(1)?;
        self.blocks.get(idx)
    }

    /// Blocks paired with their round numbers.
    pub fn rounds(&self) -> impl Iterator<Item = (u32, &BlockDefinition)> {
        (1u32..).zip(self.blocks.iter())
    }

    pub fn label<'a>(&'a self, stim: &'a StimulusRef) -> &'a str {
        self.labels
            .iter()
            .find(|l| l.category == stim.category() && l.level == stim.level())
            .map(|l| l.label.as_str())
            .unwrap_or(stim.level())
    }

    /// Heading shown above one response side, e.g. `"Female or Liberal Arts"`.
    pub fn side_heading(&self, block: &BlockDefinition, side: Side) -> String {
        block
            .side(side)
            .iter()
            .map(|stim| self.label(stim))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

impl Default for ExperimentConfig {
    /// Gender / science IAT with seven words per level and seven blocks.
    fn default() -> Self {
        let stimuli = StimulusCatalog::new()
            .with_level(
                "attributes",
                "Male",
                ["Man", "Son", "Father", "Boy", "Uncle", "Grandpa", "Husband"],
            )
            .with_level(
                "attributes",
                "Female",
                ["Mother", "Wife", "Aunt", "Woman", "Girl", "Grandma", "Daughter"],
            )
            .with_level(
                "concepts",
                "Science",
                ["Astronomy", "Math", "Chemistry", "Physics", "Biology", "Geology", "Engineering"],
            )
            .with_level(
                "concepts",
                "Liberal Arts",
                ["History", "Arts", "Humanities", "English", "Philosophy", "Music", "Literature"],
            );

        let labels = [
            ("attributes", "Male"),
            ("attributes", "Female"),
            ("concepts", "Science"),
            ("concepts", "Liberal Arts"),
        ]
        .into_iter()
        .map(|(category, level)| StimulusLabel {
            category: category.into(),
            level: level.into(),
            label: level.into(),
        })
        .collect();

        let female_arts = |label: &str| {
            BlockDefinition::new(label, 28)
                .with_left("attributes", "Female")
                .with_left("concepts", "Liberal Arts")
                .with_right("attributes", "Male")
                .with_right("concepts", "Science")
        };
        let female_science = |label: &str| {
            BlockDefinition::new(label, 28)
                .with_left("attributes", "Female")
                .with_left("concepts", "Science")
                .with_right("attributes", "Male")
                .with_right("concepts", "Liberal Arts")
        };

        let blocks = vec![
            BlockDefinition::new("Practice 1", 14)
                .with_left("concepts", "Liberal Arts")
                .with_right("concepts", "Science")
                .practice(),
            BlockDefinition::new("Practice 2", 14)
                .with_left("attributes", "Female")
                .with_right("attributes", "Male")
                .practice(),
            female_arts("Test 1"),
            female_arts("Test 2"),
            BlockDefinition::new("Practice 3 (reversed)", 14)
                .with_left("concepts", "Science")
                .with_right("concepts", "Liberal Arts")
                .practice()
                .with_notice("WATCH OUT, the categories switch sides!"),
            female_science("Test 3"),
            female_science("Test 4"),
        ];

        Self {
            stimuli,
            labels,
            blocks,
            capture_keys: CaptureKeys::default(),
            next_trial_delay_ms: default_next_trial_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.num_rounds(), 7);
        assert_eq!(config.next_trial_delay_ms, 250);
        assert!(config.block(1).unwrap().is_practice);
        assert_eq!(config.block(7).unwrap().label, "Test 4");
        assert!(config.block(0).is_none());
        assert!(config.block(8).is_none());
        assert!(config.block(5).unwrap().notice.is_some());
    }

    #[test]
    fn parse_json_with_defaults() {
        let json = r#"{
            "stimuli": {"concepts": {"Science": ["Astronomy", "Math"],
                                     "Liberal Arts": ["History", "Arts"]}},
            "blocks": [{"label": "Practice", "n": 4,
                        "left": [["concepts", "Liberal Arts"]],
                        "right": [["concepts", "Science"]],
                        "is_practice": true}]
        }"#;
        let config = ExperimentConfig::from_json_str(json).unwrap();
        assert_eq!(config.capture_keys, CaptureKeys::default());
        assert_eq!(config.next_trial_delay_ms, 250);
        assert_eq!(config.label(&StimulusRef::new("concepts", "Science")), "Science");
    }

    #[test]
    fn unknown_reference_fails_at_load_time() {
        let yaml = r#"
stimuli:
  concepts:
    Science: [Astronomy, Math]
blocks:
  - label: Broken
    n: 4
    left: [[concepts, Science]]
    right: [[concepts, Music]]
"#;
        let err = ExperimentConfig::from_yaml_str(yaml).unwrap_err();
        match err {
            ConfigError::UnknownCategoryOrLevel { round, stimulus, .. } => {
                assert_eq!(round, 1);
                assert_eq!(stimulus, StimulusRef::new("concepts", "Music"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_and_zero_blocks_are_rejected() {
        let mut config = ExperimentConfig::default();
        config.blocks[2].n = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTrials { round: 3, .. })
        ));

        config.blocks.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoBlocks)));
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let mut config = ExperimentConfig::default();
        config.capture_keys.right = KeyBinding::new("KeyE", "e");
        assert!(matches!(config.validate(), Err(ConfigError::KeyCollision(_))));
    }

    #[test]
    fn capture_keys_accept_code_or_character() {
        let keys = CaptureKeys::default();
        assert_eq!(keys.side_for("KeyE"), Some(Side::Left));
        assert_eq!(keys.side_for("e"), Some(Side::Left));
        assert_eq!(keys.side_for("I"), Some(Side::Right));
        assert_eq!(keys.side_for("Space"), None);
    }

    #[test]
    fn side_heading_joins_labels() {
        let mut config = ExperimentConfig::default();
        config.labels[3].label = "Humanities".into();
        let block = config.block(3).unwrap().clone();
        assert_eq!(config.side_heading(&block, Side::Left), "Female or Humanities");
        assert_eq!(config.side_heading(&block, Side::Right), "Male or Science");
    }

    #[test]
    fn from_file_picks_format_by_extension() {
        let json = serde_json::to_string(&ExperimentConfig::default()).unwrap();
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let config = ExperimentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.num_rounds(), 7);

        let yaml = serde_yaml::to_string(&ExperimentConfig::default()).unwrap();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let config = ExperimentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.blocks[4].label, "Practice 3 (reversed)");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ExperimentConfig::from_file("/nonexistent/iat.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
