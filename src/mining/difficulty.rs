use crate::consensus::ConsensusParams;
use crate::core::Block;

#[derive(Debug, Clone, Default)]
pub struct DifficultyCalculator {
    params: ConsensusParams,
}

impl DifficultyCalculator {
    pub fn new(params: ConsensusParams) -> Self {
        Self { params }
    }

    pub fn should_adjust_difficulty(&self, tip_index: u64) -> bool {
        let interval = self.params.difficulty_adjustment_interval;
        interval > 0 && tip_index > 0 && tip_index % interval == 0
    }

    /// Difficulty required of the block that extends `chain`.
    ///
    /// On a retarget boundary the block `interval` steps back is the
    /// reference: a window mined in under half the expected time raises its
    /// difficulty by one, over twice the expected time lowers it by one.
    /// Otherwise the tip's difficulty carries over. The result never drops
    /// below `minimum_difficulty`.
    pub fn next_difficulty(&self, chain: &[Block]) -> u32 {
        self.scheduled_difficulty(chain).max(self.params.minimum_difficulty)
    }

    fn scheduled_difficulty(&self, chain: &[Block]) -> u32 {
        let Some(tip) = chain.last() else {
            return 0;
        };

        if !self.should_adjust_difficulty(tip.index()) {
            return tip.header.difficulty;
        }

        let interval = self.params.difficulty_adjustment_interval as usize;
        let Some(reference) = chain.len().checked_sub(interval).and_then(|i| chain.get(i)) else {
            return tip.header.difficulty;
        };

        self.adjusted_difficulty(reference, tip)
    }

    pub fn adjusted_difficulty(&self, reference: &Block, tip: &Block) -> u32 {
        let expected_time = self.params.expected_window_time();
        let actual_time = tip.header.timestamp.saturating_sub(reference.header.timestamp);
        let current = reference.header.difficulty;

        let next = if actual_time < expected_time / 2 {
            current.saturating_add(1)
        } else if actual_time > expected_time.saturating_mul(2) {
            current.saturating_sub(1)
        } else {
            current
        };

        log::debug!(
            "Difficulty adjustment at block {}: {} -> {} (actual time: {}s, expected: {}s)",
            tip.index(),
            current,
            next,
            actual_time,
            expected_time
        );

        next
    }

}
