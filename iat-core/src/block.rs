use crate::stimulus::{Side, StimulusRef};
use serde::{Deserialize, Serialize};

/// Practice blocks familiarize the participant; test blocks are measured.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum BlockKind {
    Practice,
    #[default]
    Test,
}

impl BlockKind {
    pub fn is_practice(&self) -> bool {
        matches!(self, BlockKind::Practice)
    }
}

/// One round of the experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub label: String,
    /// Expected trial count; must equal the number of words on both sides.
    pub n: usize,
    pub left: Vec<StimulusRef>,
    pub right: Vec<StimulusRef>,
    #[serde(default)]
    pub is_practice: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl BlockDefinition {
    pub fn new(label: impl Into<String>, n: usize) -> Self {
        Self {
            label: label.into(),
            n,
            left: Vec::new(),
            right: Vec::new(),
            is_practice: false,
            notice: None,
        }
    }

    pub fn with_left(mut self, category: &str, level: &str) -> Self {
        self.left.push(StimulusRef::new(category, level));
        self
    }

    pub fn with_right(mut self, category: &str, level: &str) -> Self {
        self.right.push(StimulusRef::new(category, level));
        self
    }

    pub fn practice(mut self) -> Self {
        self.is_practice = true;
        self
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn kind(&self) -> BlockKind {
        if self.is_practice {
            BlockKind::Practice
        } else {
            BlockKind::Test
        }
    }

    pub fn side(&self, side: Side) -> &[StimulusRef] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Every assignment in expansion order: all left pairs, then all right pairs.
    pub fn assignments(&self) -> impl Iterator<Item = (Side, &StimulusRef)> {
        Side::BOTH
            .into_iter()
            .flat_map(move |side| self.side(side).iter().map(move |stim| (side, stim)))
    }
}
