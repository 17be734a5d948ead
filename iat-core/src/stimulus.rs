use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Response side a stimulus is assigned to within a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Expansion order used by the trial generator.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (category, level) pair, e.g. `("attributes", "Male")`.
///
/// Serialized as a two element array so block configs read like
/// `"left": [["concepts", "Science"]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StimulusRef(pub String, pub String);

impl StimulusRef {
    pub fn new(category: impl Into<String>, level: impl Into<String>) -> Self {
        Self(category.into(), level.into())
    }

    pub fn category(&self) -> &str {
        &self.0
    }

    pub fn level(&self) -> &str {
        &self.1
    }
}

impl fmt::Display for StimulusRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

/// Stimulus words keyed by category, then level.
///
/// Word order inside a level is preserved; it is the order the generator
/// expands words in before shuffling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StimulusCatalog {
    categories: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl StimulusCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style insert, replacing any existing words for the pair.
    pub fn with_level<I, W>(mut self, category: &str, level: &str, words: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        self.insert(category, level, words);
        self
    }

    pub fn insert<I, W>(&mut self, category: &str, level: &str, words: I)
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(level.to_string(), words.into_iter().map(Into::into).collect());
    }

    pub fn words(&self, stim: &StimulusRef) -> Option<&[String]> {
        self.categories
            .get(stim.category())
            .and_then(|levels| levels.get(stim.level()))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, stim: &StimulusRef) -> bool {
        self.words(stim).is_some()
    }

    /// All (category, level) pairs in the catalog.
    pub fn refs(&self) -> impl Iterator<Item = StimulusRef> + '_ {
        self.categories.iter().flat_map(|(category, levels)| {
            levels
                .keys()
                .map(move |level| StimulusRef::new(category.as_str(), level.as_str()))
        })
    }
}

/// Display label for a (category, level) pair shown above a response side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusLabel {
    pub category: String,
    pub level: String,
    pub label: String,
}
