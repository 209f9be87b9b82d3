use thiserror::Error;

/// Error types for stage configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// LCU size is not one of the legal coding-tree sizes.
    #[error("lcu size {0} is not 16, 32 or 64")]
    InvalidLcuSize(u32),
    /// Encoder bit depth is not supported.
    #[error("encoder bit depth {0} is not 8, 10 or 12")]
    UnsupportedBitDepth(u8),
    /// A tile partition array is empty.
    #[error("tile partition arrays must not be empty")]
    EmptyTilePartition,
    /// Tile partition does not cover the picture exactly.
    #[error("tile partition covers {covered} LCUs where the picture has {expected}")]
    TileGeometryMismatch {
        /// LCUs covered by the partition along the mismatching axis.
        covered: u32,
        /// LCUs the picture actually has along that axis.
        expected: u32,
    },
}

/// Sequence-level configuration of the entropy stage: static coding
/// parameters plus the tile partition, with the derived LCU geometry.
#[derive(Debug, Clone)]
pub struct SequenceControlSet {
    /// Whether SAO parameters are coded at LCU granularity.
    pub enable_sao: bool,
    /// Encoder bit depth (8, 10 or 12).
    pub encoder_bit_depth: u8,
    /// When set, every tile is terminated as its own slice.
    pub tile_slice_mode: bool,
    /// Width in LCUs of each tile column, left to right.
    pub tile_column_array: Vec<u32>,
    /// Height in LCUs of each tile row, top to bottom.
    pub tile_row_array: Vec<u32>,
    /// LCU edge length in pixels.
    pub lcu_size: u32,
    /// Luma picture width in pixels.
    pub luma_width: u32,
    /// Luma picture height in pixels.
    pub luma_height: u32,
}

impl SequenceControlSet {
    /// Validates the static parameters and tile partition.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enable_sao: bool,
        encoder_bit_depth: u8,
        tile_slice_mode: bool,
        tile_column_array: Vec<u32>,
        tile_row_array: Vec<u32>,
        lcu_size: u32,
        luma_width: u32,
        luma_height: u32,
    ) -> Result<Self, ConfigError> {
        if !matches!(lcu_size, 16 | 32 | 64) {
            return Err(ConfigError::InvalidLcuSize(lcu_size));
        }
        if !matches!(encoder_bit_depth, 8 | 10 | 12) {
            return Err(ConfigError::UnsupportedBitDepth(encoder_bit_depth));
        }
        if tile_column_array.is_empty() || tile_row_array.is_empty() {
            return Err(ConfigError::EmptyTilePartition);
        }

        let scs = Self {
            enable_sao,
            encoder_bit_depth,
            tile_slice_mode,
            tile_column_array,
            tile_row_array,
            lcu_size,
            luma_width,
            luma_height,
        };

        let covered_width: u32 = scs.tile_column_array.iter().sum();
        if covered_width != scs.picture_width_in_lcu() {
            return Err(ConfigError::TileGeometryMismatch {
                covered: covered_width,
                expected: scs.picture_width_in_lcu(),
            });
        }
        let covered_height: u32 = scs.tile_row_array.iter().sum();
        if covered_height != scs.picture_height_in_lcu() {
            return Err(ConfigError::TileGeometryMismatch {
                covered: covered_height,
                expected: scs.picture_height_in_lcu(),
            });
        }

        Ok(scs)
    }

    /// log2 of the LCU size.
    #[inline]
    pub fn lcu_size_log2(&self) -> u32 {
        self.lcu_size.trailing_zeros()
    }

    /// Picture width in LCUs, rounding partial LCUs up.
    #[inline]
    pub fn picture_width_in_lcu(&self) -> u32 {
        (self.luma_width + self.lcu_size - 1) >> self.lcu_size_log2()
    }

    /// Picture height in LCUs, rounding partial LCUs up.
    #[inline]
    pub fn picture_height_in_lcu(&self) -> u32 {
        (self.luma_height + self.lcu_size - 1) >> self.lcu_size_log2()
    }

    /// Total LCU count of one picture.
    #[inline]
    pub fn lcu_total_count(&self) -> u32 {
        self.picture_width_in_lcu() * self.picture_height_in_lcu()
    }

    /// Number of tile columns.
    #[inline]
    pub fn tile_column_count(&self) -> u32 {
        self.tile_column_array.len() as u32
    }

    /// Number of tile rows.
    #[inline]
    pub fn tile_row_count(&self) -> u32 {
        self.tile_row_array.len() as u32
    }

    /// Total tile count of one picture.
    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.tile_column_count() * self.tile_row_count()
    }

    /// Top-left LCU coordinate of a tile, from the cumulative widths of the
    /// columns left of it and the rows above it.
    pub fn tile_origin_in_lcu(&self, tile_index: u32) -> (u32, u32) {
        let column = (tile_index % self.tile_column_count()) as usize;
        let row = (tile_index / self.tile_column_count()) as usize;
        let x: u32 = self.tile_column_array[..column].iter().sum();
        let y: u32 = self.tile_row_array[..row].iter().sum();
        (x, y)
    }

    /// Width and height of a tile in LCUs.
    pub fn tile_dims_in_lcu(&self, tile_index: u32) -> (u32, u32) {
        let column = (tile_index % self.tile_column_count()) as usize;
        let row = (tile_index / self.tile_column_count()) as usize;
        (self.tile_column_array[column], self.tile_row_array[row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_tile() -> SequenceControlSet {
        SequenceControlSet::new(true, 8, false, vec![4], vec![4], 64, 256, 256).unwrap()
    }

    #[test]
    fn test_geometry_single_tile() {
        let scs = single_tile();
        assert_eq!(scs.picture_width_in_lcu(), 4);
        assert_eq!(scs.picture_height_in_lcu(), 4);
        assert_eq!(scs.lcu_total_count(), 16);
        assert_eq!(scs.tile_count(), 1);
        assert_eq!(scs.tile_origin_in_lcu(0), (0, 0));
        assert_eq!(scs.tile_dims_in_lcu(0), (4, 4));
    }

    #[test]
    fn test_partial_lcu_rounds_up() {
        let scs =
            SequenceControlSet::new(true, 8, false, vec![3], vec![2], 64, 130, 100).unwrap();
        assert_eq!(scs.picture_width_in_lcu(), 3);
        assert_eq!(scs.picture_height_in_lcu(), 2);
    }

    #[test]
    fn test_tile_origins_2x2() {
        let scs =
            SequenceControlSet::new(true, 8, false, vec![2, 2], vec![2, 2], 64, 256, 256).unwrap();
        assert_eq!(scs.tile_count(), 4);
        assert_eq!(scs.tile_origin_in_lcu(0), (0, 0));
        assert_eq!(scs.tile_origin_in_lcu(1), (2, 0));
        assert_eq!(scs.tile_origin_in_lcu(2), (0, 2));
        assert_eq!(scs.tile_origin_in_lcu(3), (2, 2));
        assert_eq!(scs.tile_dims_in_lcu(3), (2, 2));
    }

    #[test]
    fn test_uneven_columns() {
        let scs =
            SequenceControlSet::new(true, 10, false, vec![1, 3], vec![4], 64, 256, 256).unwrap();
        assert_eq!(scs.tile_origin_in_lcu(1), (1, 0));
        assert_eq!(scs.tile_dims_in_lcu(1), (3, 4));
    }

    #[test]
    fn test_bad_partition_rejected() {
        assert!(matches!(
            SequenceControlSet::new(true, 8, false, vec![3], vec![4], 64, 256, 256),
            Err(ConfigError::TileGeometryMismatch { covered: 3, expected: 4 })
        ));
    }

    #[test]
    fn test_bad_lcu_size_rejected() {
        assert_eq!(
            SequenceControlSet::new(true, 8, false, vec![4], vec![4], 48, 256, 256).unwrap_err(),
            ConfigError::InvalidLcuSize(48)
        );
    }
}
