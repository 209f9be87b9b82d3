use crate::picture::PictureControlSet;
use std::sync::Arc;

/// Work item posted by mode decision: a batch of completed LCU rows for
/// one tile of one picture.
#[derive(Default)]
pub struct EncDecResult {
    /// Picture the rows belong to. Always present on posted items; `None`
    /// only in pool-fresh payloads.
    pub picture: Option<Arc<PictureControlSet>>,
    /// Tile the rows belong to.
    pub tile_index: u32,
    /// First completed LCU row, tile-relative.
    pub completed_row_start: u32,
    /// Number of completed LCU rows.
    pub completed_row_count: u32,
}

/// Task kinds understood by the rate-control stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum RateControlTaskKind {
    /// Per-row bit feedback from the entropy stage.
    #[default]
    EntropyRowFeedback,
}

/// Feedback item posted to rate control after each coded LCU row.
pub struct RateControlTask {
    /// What this task carries.
    pub kind: RateControlTaskKind,
    /// Picture order count the row belongs to.
    pub picture_number: u64,
    /// Tile the row belongs to.
    pub tile_index: u32,
    /// Coded LCU row, tile-relative.
    pub row_number: u32,
    /// Bits the row contributed to the tile bitstream.
    pub bit_count: u32,
    /// Not used by row feedback; present for task kinds that carry one.
    pub picture: Option<Arc<PictureControlSet>>,
    /// Not used by row feedback; all-ones marks it unset.
    pub segment_index: u32,
}

impl Default for RateControlTask {
    fn default() -> Self {
        Self {
            kind: RateControlTaskKind::default(),
            picture_number: 0,
            tile_index: 0,
            row_number: 0,
            bit_count: 0,
            picture: None,
            segment_index: u32::MAX,
        }
    }
}

/// Hand-off item posted to the packetizer once every tile of a picture has
/// finished.
#[derive(Default)]
pub struct EntropyCodingResult {
    /// The completed picture.
    pub picture: Option<Arc<PictureControlSet>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_control_task_defaults() {
        let task = RateControlTask::default();
        assert_eq!(task.kind, RateControlTaskKind::EntropyRowFeedback);
        assert_eq!(task.segment_index, u32::MAX);
        assert!(task.picture.is_none());
    }

    #[test]
    fn test_pool_fresh_items_are_empty() {
        assert!(EncDecResult::default().picture.is_none());
        assert!(EntropyCodingResult::default().picture.is_none());
    }
}
