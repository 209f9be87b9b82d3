use crate::messages::{EncDecResult, EntropyCodingResult, RateControlTask, RateControlTaskKind};
use crate::picture::{EntropyTileInfo, Lcu, NeighborArrays, PicState, PictureControlSet};
use crate::qp;
use crate::sequence::SequenceControlSet;
use log::{debug, trace};
use muxpool::{ConsumerPort, ProducerPort, ResourceError};
use std::sync::Arc;

/// The entropy-coding worker: consumes mode-decision row batches, codes
/// LCU rows as they become executable, feeds per-row bit counts to rate
/// control and hands completed pictures to the packetizer.
///
/// One context per worker thread; several workers may serve the same input
/// queue, with tile coordination keeping any one tile on a single worker
/// at a time.
pub struct EntropyCodingContext {
    enc_dec_input: ConsumerPort<EncDecResult>,
    packetizer_output: ProducerPort<EntropyCodingResult>,
    rate_control_output: ProducerPort<RateControlTask>,
    is_16bit: bool,
    qp: u8,
    chroma_qp: u8,
}

impl EntropyCodingContext {
    /// Wires the worker to its input and output queues.
    pub fn new(
        enc_dec_input: ConsumerPort<EncDecResult>,
        packetizer_output: ProducerPort<EntropyCodingResult>,
        rate_control_output: ProducerPort<RateControlTask>,
        is_16bit: bool,
    ) -> Self {
        Self {
            enc_dec_input,
            packetizer_output,
            rate_control_output,
            is_16bit,
            qp: 0,
            chroma_qp: 0,
        }
    }

    /// Whether the stage is configured for a bit depth above 8.
    pub fn is_16bit(&self) -> bool {
        self.is_16bit
    }

    /// The QP pair the context last coded with, as (luma, chroma).
    pub fn current_qp(&self) -> (u8, u8) {
        (self.qp, self.chroma_qp)
    }

    /// The blocking worker loop. Returns once the input resource (or a
    /// downstream resource) is shut down.
    pub fn run(&mut self) {
        loop {
            let Ok(token) = self.enc_dec_input.get_full() else {
                break;
            };
            let outcome = self.process_result(token.payload());
            token.release();
            if outcome.is_err() {
                break;
            }
        }
    }

    fn process_result(&mut self, enc_dec: &EncDecResult) -> Result<(), ResourceError> {
        let pcs = enc_dec
            .picture
            .as_ref()
            .expect("posted enc-dec result without a picture");
        let sequence = pcs.sequence();
        let tile_index = enc_dec.tile_index;

        trace!(
            "poc {} entropy in: tile {} rows {}..{}",
            pcs.picture_number,
            tile_index,
            enc_dec.completed_row_start,
            enc_dec.completed_row_start + enc_dec.completed_row_count
        );

        // Tile geometry.
        let lcu_size_log2 = sequence.lcu_size_log2();
        let picture_width_in_lcu = sequence.picture_width_in_lcu();
        let (x_lcu_start, y_lcu_start) = sequence.tile_origin_in_lcu(tile_index);
        let (tile_width_in_lcu, tile_height_in_lcu) = sequence.tile_dims_in_lcu(tile_index);
        let tile = pcs.tile(tile_index);

        let mut y_lcu_index = enc_dec.completed_row_start;
        let mut initial_call = true;

        while tile.update_rows(&mut y_lcu_index, enc_dec.completed_row_count, &mut initial_call) {
            let mut row_total_bits: u32 = 0;
            let mut last_in_slice = false;
            let mut last_in_tile = false;

            if y_lcu_index == 0 {
                {
                    let mut pic = pcs.pic_state();
                    if pic.reset_flag {
                        pic.reset_flag = false;
                        self.reset_picture(pcs, sequence, &mut pic);
                    }
                }
                tile.clear_pic_done();
            }

            for x_lcu_index in 0..tile_width_in_lcu {
                let lcu_index =
                    (x_lcu_index + x_lcu_start) + (y_lcu_index + y_lcu_start) * picture_width_in_lcu;
                let lcu_origin_x = (x_lcu_index + x_lcu_start) << lcu_size_log2;
                let lcu_origin_y = (y_lcu_index + y_lcu_start) << lcu_size_log2;

                last_in_slice = lcu_index == pcs.lcu_total_count - 1;
                last_in_tile =
                    x_lcu_index == tile_width_in_lcu - 1 && y_lcu_index == tile_height_in_lcu - 1;
                // A slice holds a whole number of tiles; in tile-slice mode
                // the tile boundary is the slice boundary.
                if sequence.tile_slice_mode {
                    last_in_slice = last_in_tile;
                }

                let mut lcu = pcs.lock_lcu(lcu_index);
                self.configure_lcu(pcs, &mut lcu);
                self.code_lcu(
                    sequence,
                    pcs,
                    tile,
                    &mut lcu,
                    lcu_origin_x,
                    lcu_origin_y,
                    last_in_slice,
                );
                pcs.add_quantized_coeff_bits(u64::from(lcu.quantized_coeff_bits));
                row_total_bits += lcu.total_bits;
            }

            // Per-row bit feedback; per tile, rate control may use or
            // ignore it.
            self.post_row_feedback(pcs, tile_index, y_lcu_index, row_total_bits)?;

            let state = tile.state();
            if !tile.pic_done() && state.current_row == state.row_count() {
                debug_assert!(last_in_tile);

                // Tile end may not be the slice end.
                if last_in_slice {
                    tile.with_coder(|coder| coder.code_slice_finish());
                } else {
                    tile.with_coder(|coder| coder.code_tile_finish());
                }
                debug!("poc {} tile {} finished", pcs.picture_number, tile_index);

                let pic_ready = {
                    let _pic = pcs.pic_state();
                    tile.set_pic_done();
                    (0..pcs.tile_count()).all(|t| pcs.tile(t).pic_done())
                };

                if pic_ready {
                    for list in 0..2 {
                        if pcs.ref_list_count[list] > 0 {
                            if let Some(reference) = pcs.take_reference(list) {
                                reference.release();
                            }
                        }
                    }

                    let mut output = self.packetizer_output.get_empty()?;
                    output.payload_mut().picture = Some(Arc::clone(pcs));
                    debug!(
                        "poc {} entropy coding complete, posting to packetizer",
                        pcs.picture_number
                    );
                    output.post_full()?;
                }
            }
            drop(state);
        }

        trace!("poc {} entropy out: tile {}", pcs.picture_number, tile_index);
        Ok(())
    }

    /// Once per picture, performed by whichever tile reaches row 0 first:
    /// rewind every tile bitstream, re-arm SAO, re-initialize the CABAC
    /// contexts and clear the neighbor context. Runs under the picture
    /// mutex so no tile codes before the reset completes.
    fn reset_picture(
        &mut self,
        pcs: &PictureControlSet,
        sequence: &SequenceControlSet,
        pic: &mut PicState,
    ) {
        for tile_index in 0..pcs.tile_count() {
            pcs.tile(tile_index).with_coder(|coder| coder.reset_bitstream());
        }

        self.is_16bit = sequence.encoder_bit_depth > 8;

        pcs.set_sao_flags(true, true);

        self.qp = pcs.picture_qp;
        let qp_scaled = qp::clip3(
            i32::from(qp::MIN_QP),
            i32::from(qp::MAX_CHROMA_MAP_QP),
            i32::from(self.qp) + i32::from(pcs.cb_qp_offset) + i32::from(pcs.slice_cb_qp_offset),
        );
        self.chroma_qp = qp::map_chroma_qp(qp_scaled as u8);

        // Both arms deliberately agree until delta-QP signalling reaches
        // the entropy stage.
        #[allow(clippy::if_same_then_else, clippy::branches_sharing_code)]
        let entropy_coding_qp = if pcs.use_delta_qp {
            pcs.picture_qp
        } else {
            pcs.picture_qp
        };

        pic.prev_coded_qp = pcs.picture_qp;
        pic.prev_quant_group_coded_qp = pcs.picture_qp;

        for tile_index in 0..pcs.tile_count() {
            let tile = pcs.tile(tile_index);
            tile.with_coder(|coder| coder.reset_contexts(entropy_coding_qp, pcs.slice_type));
            tile.with_neighbors(NeighborArrays::reset_all);
        }
    }

    /// Assigns the picture QP and the mapped chroma QP to one LCU.
    fn configure_lcu(&mut self, pcs: &PictureControlSet, lcu: &mut Lcu) {
        self.qp = pcs.picture_qp;
        // Cb and Cr share one offset in both the slice header and the PPS.
        let qp_scaled = qp::clip3(
            i32::from(qp::MIN_QP),
            i32::from(qp::MAX_CHROMA_MAP_QP),
            i32::from(self.qp) + i32::from(pcs.cb_qp_offset) + i32::from(pcs.slice_cb_qp_offset),
        );
        self.chroma_qp = qp::map_chroma_qp(qp_scaled as u8);
        lcu.qp = self.qp;
        lcu.chroma_qp = self.chroma_qp;
    }

    /// Serializes one LCU and records its bit cost.
    #[allow(clippy::too_many_arguments)]
    fn code_lcu(
        &self,
        sequence: &SequenceControlSet,
        pcs: &PictureControlSet,
        tile: &EntropyTileInfo,
        lcu: &mut Lcu,
        lcu_origin_x: u32,
        lcu_origin_y: u32,
        last_in_slice: bool,
    ) {
        tile.with_coder_and_neighbors(|coder, neighbors| {
            // Emitted bits before the LCU, unflushed coder state included;
            // rate control charges the LCU for the delta around it.
            let bits_before = coder.emitted_bits();

            let (sao_luma, sao_chroma) = pcs.sao_flags();
            if sequence.enable_sao && (sao_luma || sao_chroma) {
                coder.code_sao_parameters(lcu, sao_luma, sao_chroma, sequence.encoder_bit_depth);
            }

            coder.code_lcu(lcu, lcu_origin_x, lcu_origin_y, sequence.lcu_size, neighbors);

            let bits_after = coder.emitted_bits();
            lcu.total_bits = (bits_after - bits_before) as u32;

            // The terminate bit is not charged to the LCU.
            coder.code_terminate_lcu(last_in_slice);
        });
    }

    fn post_row_feedback(
        &self,
        pcs: &PictureControlSet,
        tile_index: u32,
        row_number: u32,
        bit_count: u32,
    ) -> Result<(), ResourceError> {
        let mut token = self.rate_control_output.get_empty()?;
        {
            let task = token.payload_mut();
            task.kind = RateControlTaskKind::EntropyRowFeedback;
            task.picture_number = pcs.picture_number;
            task.tile_index = tile_index;
            task.row_number = row_number;
            task.bit_count = bit_count;
            task.picture = None;
            task.segment_index = u32::MAX;
        }
        token.post_full()
    }
}
