use crate::coder::SyntaxCoder;
use crate::sequence::SequenceControlSet;
use muxpool::ObjectRef;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Smallest prediction-unit edge tracked by the neighbor arrays, in pixels.
const NEIGHBOR_UNIT: u32 = 4;

/// Slice type of a coded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// Intra-only slice.
    I,
    /// Uni-predicted slice.
    P,
    /// Bi-predicted slice.
    B,
}

/// Per-LCU state carried from mode decision into entropy coding.
#[derive(Debug, Default)]
pub struct Lcu {
    /// Quantization parameter assigned for coding this LCU.
    pub qp: u8,
    /// Chroma quantization parameter mapped from `qp` and the offsets.
    pub chroma_qp: u8,
    /// Bits this LCU contributed to the tile bitstream, terminate bit
    /// excluded. Written by the entropy kernel, consumed by rate control.
    pub total_bits: u32,
    /// Bits spent on quantized coefficients, reported by mode decision.
    pub quantized_coeff_bits: u32,
    /// Quantized transform coefficients awaiting serialization.
    pub quantized_coeffs: Vec<i16>,
}

/// Payload of the reference-picture pool. The entropy stage only manages
/// lifecycle; pixel planes belong to earlier stages.
#[derive(Debug, Default)]
pub struct ReferencePicture {
    /// Picture order count of the reference.
    pub poc: u64,
}

/// One directional row of neighbor context, at prediction-unit granularity.
#[derive(Debug)]
pub struct NeighborArray {
    data: Box<[u8]>,
}

impl NeighborArray {
    fn new(units: usize) -> Self {
        Self {
            data: vec![0; units].into_boxed_slice(),
        }
    }

    /// Clears every unit back to its unset state.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Number of prediction units tracked.
    pub fn units(&self) -> usize {
        self.data.len()
    }

    /// Read access for the syntax writer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Write access for the syntax writer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The neighbor context consulted while coding one tile's LCUs.
#[derive(Debug)]
pub struct NeighborArrays {
    /// Prediction mode (intra/inter) of the neighboring units.
    pub mode_type: NeighborArray,
    /// Coding-tree leaf depth of the neighboring units.
    pub leaf_depth: NeighborArray,
    /// Intra luma prediction mode of the neighboring units.
    pub intra_luma_mode: NeighborArray,
    /// Skip flag of the neighboring units.
    pub skip_flag: NeighborArray,
}

impl NeighborArrays {
    fn new(units: usize) -> Self {
        Self {
            mode_type: NeighborArray::new(units),
            leaf_depth: NeighborArray::new(units),
            intra_luma_mode: NeighborArray::new(units),
            skip_flag: NeighborArray::new(units),
        }
    }

    /// Clears all four arrays, as done once per picture per tile.
    pub fn reset_all(&mut self) {
        self.mode_type.reset();
        self.leaf_depth.reset();
        self.intra_luma_mode.reset();
        self.skip_flag.reset();
    }
}

#[derive(Debug)]
pub(crate) struct TileRowState {
    pub(crate) row_available: Box<[bool]>,
    pub(crate) current_available_row: u32,
    pub(crate) current_row: u32,
    pub(crate) in_progress: bool,
}

impl TileRowState {
    pub(crate) fn row_count(&self) -> u32 {
        self.row_available.len() as u32
    }
}

/// Per-tile entropy coordination: which LCU rows have inputs, which row
/// runs next, and the tile's coder and neighbor context.
///
/// Row execution is serialized per tile by the `in_progress` token plus the
/// monotone `current_row` cursor; rows of distinct tiles run concurrently.
pub struct EntropyTileInfo {
    state: Mutex<TileRowState>,
    /// Completion latch, written under the tile mutex when the last row
    /// drains and aggregated across tiles under the picture mutex.
    pic_done: AtomicBool,
    coder: Mutex<Box<dyn SyntaxCoder>>,
    neighbors: Mutex<NeighborArrays>,
}

impl EntropyTileInfo {
    fn new(row_count: u32, coder: Box<dyn SyntaxCoder>, neighbors: NeighborArrays) -> Self {
        Self {
            state: Mutex::new(TileRowState {
                row_available: vec![false; row_count as usize].into_boxed_slice(),
                current_available_row: 0,
                current_row: 0,
                in_progress: false,
            }),
            pic_done: AtomicBool::new(false),
            coder: Mutex::new(coder),
            neighbors: Mutex::new(neighbors),
        }
    }

    /// Number of LCU rows in this tile.
    pub fn row_count(&self) -> u32 {
        self.state.lock().expect("tile mutex poisoned").row_count()
    }

    /// Row synchronization for this tile.
    ///
    /// On the initial call of a work item, marks
    /// `[*row_index, *row_index + completed_row_count)` available and
    /// advances the contiguous-availability cursor. On continued calls,
    /// releases the `in_progress` token the caller held for the row it just
    /// finished. Either way, if the next row is available, not past the
    /// contiguous prefix, and nobody else is executing in this tile, the
    /// caller is handed that row: `*row_index` is updated and the call
    /// returns true.
    ///
    /// The critical section stays short on purpose: the row body itself
    /// runs outside the lock so other workers can keep updating
    /// availability.
    pub fn update_rows(
        &self,
        row_index: &mut u32,
        completed_row_count: u32,
        initial_call: &mut bool,
    ) -> bool {
        if completed_row_count == 0 {
            return false;
        }

        let mut state = self.state.lock().expect("tile mutex poisoned");
        let mut process_next_row = false;

        // Update the availability mask.
        if *initial_call {
            for row in *row_index..*row_index + completed_row_count {
                state.row_available[row as usize] = true;
            }
            while (state.current_available_row as usize) < state.row_available.len()
                && state.row_available[state.current_available_row as usize]
            {
                state.current_available_row += 1;
            }
        }

        // Release the in-progress token.
        if !*initial_call && state.in_progress {
            state.in_progress = false;
        }

        // Hand out the next row if its inputs are ready and the tile is
        // not being worked by anyone else.
        if state.current_row < state.row_count()
            && state.row_available[state.current_row as usize]
            && !state.in_progress
            && state.current_row <= state.current_available_row
        {
            state.in_progress = true;
            *row_index = state.current_row;
            state.current_row += 1;
            process_next_row = true;
        }

        *initial_call = false;
        process_next_row
    }

    /// Whether this tile has finished its picture.
    pub fn pic_done(&self) -> bool {
        self.pic_done.load(Ordering::Acquire)
    }

    pub(crate) fn set_pic_done(&self) {
        self.pic_done.store(true, Ordering::Release);
    }

    pub(crate) fn clear_pic_done(&self) {
        self.pic_done.store(false, Ordering::Release);
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, TileRowState> {
        self.state.lock().expect("tile mutex poisoned")
    }

    /// Runs `f` with exclusive access to this tile's syntax coder.
    pub fn with_coder<R>(&self, f: impl FnOnce(&mut dyn SyntaxCoder) -> R) -> R {
        let mut coder = self.coder.lock().expect("tile coder mutex poisoned");
        f(coder.as_mut())
    }

    /// Runs `f` with exclusive access to this tile's neighbor context.
    pub fn with_neighbors<R>(&self, f: impl FnOnce(&mut NeighborArrays) -> R) -> R {
        let mut neighbors = self.neighbors.lock().expect("tile neighbor mutex poisoned");
        f(&mut neighbors)
    }

    /// Runs `f` with the coder and the neighbor context together, as the
    /// LCU coding path needs.
    pub fn with_coder_and_neighbors<R>(
        &self,
        f: impl FnOnce(&mut dyn SyntaxCoder, &mut NeighborArrays) -> R,
    ) -> R {
        let mut coder = self.coder.lock().expect("tile coder mutex poisoned");
        let mut neighbors = self.neighbors.lock().expect("tile neighbor mutex poisoned");
        f(coder.as_mut(), &mut neighbors)
    }
}

/// Picture-level synchronization state guarded by the picture mutex.
#[derive(Debug)]
pub(crate) struct PicState {
    /// Armed at picture creation; the first tile to enter row 0 clears it
    /// and performs the picture reset.
    pub(crate) reset_flag: bool,
    pub(crate) prev_coded_qp: u8,
    pub(crate) prev_quant_group_coded_qp: u8,
}

/// Construction parameters for one picture.
#[derive(Debug, Clone)]
pub struct PictureParams {
    /// Picture order count.
    pub picture_number: u64,
    /// Picture-level quantization parameter.
    pub picture_qp: u8,
    /// Slice type used when resetting the CABAC contexts.
    pub slice_type: SliceType,
    /// Cb offset from the picture parameter set.
    pub cb_qp_offset: i8,
    /// Cb offset from the slice header.
    pub slice_cb_qp_offset: i8,
    /// Delta-QP signalling (reserved; does not alter the entropy QP yet).
    pub use_delta_qp: bool,
    /// Reference counts for list 0 and list 1.
    pub ref_list_count: [u8; 2],
}

impl Default for PictureParams {
    fn default() -> Self {
        Self {
            picture_number: 0,
            picture_qp: 32,
            slice_type: SliceType::I,
            cb_qp_offset: 0,
            slice_cb_qp_offset: 0,
            use_delta_qp: false,
            ref_list_count: [0, 0],
        }
    }
}

/// Everything the entropy stage knows about one picture in flight: coding
/// parameters, the LCU array, per-tile coordination state and the shared
/// picture-level synchronization.
pub struct PictureControlSet {
    sequence: Arc<SequenceControlSet>,
    /// Picture order count.
    pub picture_number: u64,
    /// Picture-level quantization parameter.
    pub picture_qp: u8,
    /// Slice type of this picture.
    pub slice_type: SliceType,
    /// Cb offset from the picture parameter set.
    pub cb_qp_offset: i8,
    /// Cb offset from the slice header.
    pub slice_cb_qp_offset: i8,
    /// Delta-QP signalling (reserved; does not alter the entropy QP yet).
    pub use_delta_qp: bool,
    /// Reference counts for list 0 and list 1.
    pub ref_list_count: [u8; 2],
    /// Total LCU count, cached off the sequence.
    pub lcu_total_count: u32,
    lcus: Box<[Mutex<Lcu>]>,
    tiles: Box<[EntropyTileInfo]>,
    pic_state: Mutex<PicState>,
    /// SAO enable latches, armed during picture reset and read lock-free
    /// per LCU.
    sao_luma: AtomicBool,
    sao_chroma: AtomicBool,
    reference_list: [Mutex<Option<ObjectRef<ReferencePicture>>>; 2],
    quantized_coeff_bits: AtomicU64,
}

impl PictureControlSet {
    /// Builds the per-picture state for the given sequence, constructing
    /// one syntax coder per tile with `coder_factory`.
    pub fn new(
        sequence: Arc<SequenceControlSet>,
        params: PictureParams,
        mut coder_factory: impl FnMut(u32) -> Box<dyn SyntaxCoder>,
    ) -> Self {
        let tiles = (0..sequence.tile_count())
            .map(|tile_index| {
                let (tile_width, tile_height) = sequence.tile_dims_in_lcu(tile_index);
                let units = (tile_width * (sequence.lcu_size / NEIGHBOR_UNIT)) as usize;
                EntropyTileInfo::new(tile_height, coder_factory(tile_index), NeighborArrays::new(units))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let lcu_total_count = sequence.lcu_total_count();
        let lcus = (0..lcu_total_count)
            .map(|_| Mutex::new(Lcu::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            sequence,
            picture_number: params.picture_number,
            picture_qp: params.picture_qp,
            slice_type: params.slice_type,
            cb_qp_offset: params.cb_qp_offset,
            slice_cb_qp_offset: params.slice_cb_qp_offset,
            use_delta_qp: params.use_delta_qp,
            ref_list_count: params.ref_list_count,
            lcu_total_count,
            lcus,
            tiles,
            pic_state: Mutex::new(PicState {
                reset_flag: true,
                prev_coded_qp: params.picture_qp,
                prev_quant_group_coded_qp: params.picture_qp,
            }),
            sao_luma: AtomicBool::new(false),
            sao_chroma: AtomicBool::new(false),
            reference_list: [Mutex::new(None), Mutex::new(None)],
            quantized_coeff_bits: AtomicU64::new(0),
        }
    }

    /// The sequence this picture belongs to.
    pub fn sequence(&self) -> &SequenceControlSet {
        &self.sequence
    }

    /// Number of tiles in this picture.
    pub fn tile_count(&self) -> u32 {
        self.tiles.len() as u32
    }

    /// Coordination state of one tile.
    pub fn tile(&self, tile_index: u32) -> &EntropyTileInfo {
        &self.tiles[tile_index as usize]
    }

    /// Locks one LCU for coding.
    pub fn lock_lcu(&self, lcu_index: u32) -> MutexGuard<'_, Lcu> {
        self.lcus[lcu_index as usize].lock().expect("lcu mutex poisoned")
    }

    pub(crate) fn pic_state(&self) -> MutexGuard<'_, PicState> {
        self.pic_state.lock().expect("picture mutex poisoned")
    }

    /// Re-arms the picture reset, as the picture manager does when this
    /// control set is recycled for a new picture.
    pub fn arm_reset(&self) {
        self.pic_state().reset_flag = true;
    }

    /// Whether the picture reset is still pending.
    pub fn reset_armed(&self) -> bool {
        self.pic_state().reset_flag
    }

    /// QP bookkeeping re-armed by the picture reset, as
    /// (`prev_coded_qp`, `prev_quant_group_coded_qp`). Consumed by the
    /// delta-QP path of the LCU syntax writer.
    pub fn prev_coded_qps(&self) -> (u8, u8) {
        let state = self.pic_state();
        (state.prev_coded_qp, state.prev_quant_group_coded_qp)
    }

    /// Current SAO latches as (luma, chroma).
    pub fn sao_flags(&self) -> (bool, bool) {
        (
            self.sao_luma.load(Ordering::Relaxed),
            self.sao_chroma.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn set_sao_flags(&self, luma: bool, chroma: bool) {
        self.sao_luma.store(luma, Ordering::Relaxed);
        self.sao_chroma.store(chroma, Ordering::Relaxed);
    }

    /// Hands this picture a reference for the given list; released exactly
    /// once when every tile has completed.
    pub fn attach_reference(&self, list: usize, reference: ObjectRef<ReferencePicture>) {
        *self.reference_list[list]
            .lock()
            .expect("reference list mutex poisoned") = Some(reference);
    }

    pub(crate) fn take_reference(&self, list: usize) -> Option<ObjectRef<ReferencePicture>> {
        self.reference_list[list]
            .lock()
            .expect("reference list mutex poisoned")
            .take()
    }

    /// Picture-wide quantized-coefficient bit total.
    pub fn quantized_coeff_bits(&self) -> u64 {
        self.quantized_coeff_bits.load(Ordering::Relaxed)
    }

    pub(crate) fn add_quantized_coeff_bits(&self, bits: u64) {
        self.quantized_coeff_bits.fetch_add(bits, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullCoder;

    impl SyntaxCoder for NullCoder {
        fn written_bits_count(&self) -> u64 {
            0
        }
        fn low_bits_remaining(&self) -> u32 {
            32
        }
        fn buffered_bytes(&self) -> u32 {
            0
        }
        fn reset_bitstream(&mut self) {}
        fn reset_contexts(&mut self, _: u8, _: SliceType) {}
        fn code_sao_parameters(&mut self, _: &Lcu, _: bool, _: bool, _: u8) {}
        fn code_lcu(&mut self, _: &Lcu, _: u32, _: u32, _: u32, _: &mut NeighborArrays) {}
        fn code_terminate_lcu(&mut self, _: bool) {}
        fn code_tile_finish(&mut self) {}
        fn code_slice_finish(&mut self) {}
    }

    fn tile_with_rows(rows: u32) -> EntropyTileInfo {
        EntropyTileInfo::new(rows, Box::new(NullCoder), NeighborArrays::new(16))
    }

    #[test]
    fn test_update_rows_zero_count_is_noop() {
        let tile = tile_with_rows(4);
        let mut row = 0;
        let mut initial = true;

        assert!(!tile.update_rows(&mut row, 0, &mut initial));
        // A genuine no-op: the initial flag is untouched and no state moved.
        assert!(initial);
        let state = tile.state();
        assert!(!state.row_available.iter().any(|&r| r));
        assert_eq!(state.current_row, 0);
    }

    #[test]
    fn test_update_rows_single_row_tile() {
        let tile = tile_with_rows(1);
        let mut row = 0;
        let mut initial = true;

        assert!(tile.update_rows(&mut row, 1, &mut initial));
        assert_eq!(row, 0);
        assert!(!initial);

        // Row finished; nothing left.
        assert!(!tile.update_rows(&mut row, 1, &mut initial));
        assert_eq!(tile.state().current_row, 1);
        assert!(!tile.state().in_progress);
    }

    #[test]
    fn test_update_rows_walks_contiguous_prefix() {
        let tile = tile_with_rows(4);

        // Rows 2..4 arrive first: nothing to run yet.
        let mut row = 2;
        let mut initial = true;
        assert!(!tile.update_rows(&mut row, 2, &mut initial));

        // Rows 0..2 arrive: the whole tile drains in order.
        let mut row = 0;
        let mut initial = true;
        for expected in 0..4 {
            assert!(tile.update_rows(&mut row, 2, &mut initial));
            assert_eq!(row, expected);
        }
        assert!(!tile.update_rows(&mut row, 2, &mut initial));
    }

    #[test]
    fn test_update_rows_excludes_second_worker_while_in_progress() {
        let tile = tile_with_rows(2);

        let mut row_a = 0;
        let mut initial_a = true;
        assert!(tile.update_rows(&mut row_a, 2, &mut initial_a));

        // A second work item for the same tile arrives while row 0 runs.
        let mut row_b = 0;
        let mut initial_b = true;
        assert!(!tile.update_rows(&mut row_b, 2, &mut initial_b));

        // First worker finishes row 0 and picks up row 1.
        assert!(tile.update_rows(&mut row_a, 2, &mut initial_a));
        assert_eq!(row_a, 1);
    }

    #[test]
    fn test_pic_done_latch() {
        let tile = tile_with_rows(1);
        assert!(!tile.pic_done());
        tile.set_pic_done();
        assert!(tile.pic_done());
        tile.clear_pic_done();
        assert!(!tile.pic_done());
    }

    #[test]
    fn test_picture_reset_armed_at_creation() {
        let sequence = Arc::new(
            SequenceControlSet::new(true, 8, false, vec![2], vec![2], 64, 128, 128).unwrap(),
        );
        let pcs = PictureControlSet::new(sequence, PictureParams::default(), |_| Box::new(NullCoder));

        assert!(pcs.reset_armed());
        assert_eq!(pcs.tile_count(), 1);
        assert_eq!(pcs.lcu_total_count, 4);
        assert_eq!(pcs.sao_flags(), (false, false));
    }
}
