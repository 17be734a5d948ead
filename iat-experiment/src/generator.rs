use iat_core::{BlockDefinition, Side, StimulusCatalog, StimulusRef};
use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error(
        "the number of stimuli ({generated}) and the number of repetitions in block '{block}' (n={declared}) do not match"
    )]
    ConfigurationMismatch {
        block: String,
        generated: usize,
        declared: usize,
    },

    #[error("block '{block}' references unknown category/level {stimulus}")]
    UnknownCategoryOrLevel { block: String, stimulus: StimulusRef },
}

/// One stimulus presentation before it is bound to a participant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratedTrial {
    /// 1-based position after shuffling.
    pub trial: u32,
    pub side: Side,
    pub stimulus_class: String,
    pub stimulus_level: String,
    pub stimulus: String,
}

/// Expands a block into its trials and shuffles them.
///
/// Every word of every (category, level) pair on the left, then the right,
/// becomes one trial tagged with its side. The total must equal `block.n`;
/// otherwise nothing is returned. The order is a uniform permutation drawn
/// from `rng`, and `trial` numbers follow that order.
pub fn generate<R: Rng + ?Sized>(
    block: &BlockDefinition,
    catalog: &StimulusCatalog,
    rng: &mut R,
) -> Result<Vec<GeneratedTrial>, GenerateError> {
    let mut stimuli: Vec<(Side, &StimulusRef, &str)> = Vec::with_capacity(block.n);
    for (side, stim) in block.assignments() {
        let words = catalog
            .words(stim)
            .ok_or_else(|| GenerateError::UnknownCategoryOrLevel {
                block: block.label.clone(),
                stimulus: stim.clone(),
            })?;
        stimuli.extend(words.iter().map(|w| (side, stim, w.as_str())));
    }

    if stimuli.len() != block.n {
        return Err(GenerateError::ConfigurationMismatch {
            block: block.label.clone(),
            generated: stimuli.len(),
            declared: block.n,
        });
    }

    stimuli.shuffle(rng);

    Ok((1u32..)
        .zip(stimuli)
        .map(|(trial, (side, stim, word))| GeneratedTrial {
            trial,
            side,
            stimulus_class: stim.category().to_string(),
            stimulus_level: stim.level().to_string(),
            stimulus: word.to_string(),
        })
        .collect())
}
