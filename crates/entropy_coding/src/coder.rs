use crate::picture::{Lcu, NeighborArrays, SliceType};

/// The bit-level syntax writer driven by the entropy kernel.
///
/// One implementation instance exists per tile and owns that tile's CABAC
/// state and output bitstream. The kernel never inspects coded bytes; it
/// only sequences calls and measures emitted-bit deltas, so the actual
/// arithmetic coder lives behind this trait.
pub trait SyntaxCoder: Send {
    /// Bits already flushed to the output bitstream.
    fn written_bits_count(&self) -> u64;

    /// Bits still pending in the arithmetic coder's low interval.
    fn low_bits_remaining(&self) -> u32;

    /// Bytes buffered in the coder but not yet counted as written.
    fn buffered_bytes(&self) -> u32;

    /// Rewinds the tile's output bitstream to empty.
    fn reset_bitstream(&mut self);

    /// Re-initializes the CABAC contexts for a new slice.
    fn reset_contexts(&mut self, entropy_coding_qp: u8, slice_type: SliceType);

    /// Writes the SAO parameters of one LCU.
    fn code_sao_parameters(&mut self, lcu: &Lcu, sao_luma: bool, sao_chroma: bool, bit_depth: u8);

    /// Writes the full syntax and quantized coefficients of one LCU.
    fn code_lcu(
        &mut self,
        lcu: &Lcu,
        lcu_origin_x: u32,
        lcu_origin_y: u32,
        lcu_size: u32,
        neighbors: &mut NeighborArrays,
    );

    /// Writes the end-of-LCU terminate bit.
    fn code_terminate_lcu(&mut self, last_in_slice: bool);

    /// Flushes and byte-aligns at a tile boundary.
    fn code_tile_finish(&mut self);

    /// Terminates the slice.
    fn code_slice_finish(&mut self);

    /// Total bits emitted so far, counting the unflushed arithmetic-coder
    /// state: written bits, plus the 32-bit low interval minus what is
    /// still free in it, plus buffered bytes.
    ///
    /// Rate control consumes deltas of this value around each LCU, so the
    /// formula must not be approximated.
    fn emitted_bits(&self) -> u64 {
        self.written_bits_count() + 32 - u64::from(self.low_bits_remaining())
            + (u64::from(self.buffered_bytes()) << 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubCoder {
        written: u64,
        low_remaining: u32,
        buffered: u32,
    }

    impl SyntaxCoder for StubCoder {
        fn written_bits_count(&self) -> u64 {
            self.written
        }
        fn low_bits_remaining(&self) -> u32 {
            self.low_remaining
        }
        fn buffered_bytes(&self) -> u32 {
            self.buffered
        }
        fn reset_bitstream(&mut self) {}
        fn reset_contexts(&mut self, _qp: u8, _slice_type: SliceType) {}
        fn code_sao_parameters(&mut self, _: &Lcu, _: bool, _: bool, _: u8) {}
        fn code_lcu(&mut self, _: &Lcu, _: u32, _: u32, _: u32, _: &mut NeighborArrays) {}
        fn code_terminate_lcu(&mut self, _: bool) {}
        fn code_tile_finish(&mut self) {}
        fn code_slice_finish(&mut self) {}
    }

    #[test]
    fn test_emitted_bits_formula() {
        let coder = StubCoder {
            written: 1000,
            low_remaining: 12,
            buffered: 3,
        };
        // written + 32 - low_remaining + buffered * 8
        assert_eq!(coder.emitted_bits(), 1000 + 32 - 12 + 24);
    }

    #[test]
    fn test_emitted_bits_fresh_coder() {
        let coder = StubCoder {
            written: 0,
            low_remaining: 32,
            buffered: 0,
        };
        assert_eq!(coder.emitted_bits(), 0);
    }
}
