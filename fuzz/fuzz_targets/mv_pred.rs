#![no_main]

use libfuzzer_sys::fuzz_target;
use vp9_recon::mv_pred::append_sub8x8_mvs_for_idx;
use vp9_recon::mv_pred::find_best_ref_mvs;
use vp9_recon::mv_pred::BlockEdges;
use vp9_recon::mv_pred::CandidateList;
use vp9_recon::mv_pred::MvRefScanner;
use vp9_recon::mv_pred::RefDirection;
use vp9_recon::mv_pred::SubBlockIndex;
use vp9_recon::mv_pred::SubBlockMvs;
use vp9_recon::MotionVector;

struct Candidates(CandidateList);

impl MvRefScanner for Candidates {
    fn find_mv_refs(&mut self, _: RefDirection, _: Option<SubBlockIndex>) -> CandidateList {
        self.0
    }
}

fn mv(bytes: &[u8]) -> MotionVector {
    MotionVector::new(
        i16::from_le_bytes([bytes[0], bytes[1]]),
        i16::from_le_bytes([bytes[2], bytes[3]]),
    )
}

fuzz_target!(|data: &[u8]| {
    for chunk in data.chunks_exact(12) {
        let candidates = [mv(&chunk[0..4]), mv(&chunk[4..8])];
        let [mi_row, mi_col, mi_rows, mi_cols] = [chunk[8], chunk[9], chunk[10], chunk[11]]
            .map(|b| i32::from(b & 0x7f));
        let mi_rows = mi_rows.max(mi_row + 1);
        let mi_cols = mi_cols.max(mi_col + 1);
        let edges = BlockEdges::new(mi_row, mi_col, 1, 1, mi_rows, mi_cols);

        let allow_hp = chunk[8] & 0x80 != 0;
        let pair = find_best_ref_mvs(&edges, allow_hp, &candidates);
        if !allow_hp {
            assert_eq!(pair.nearest.row % 2, 0);
            assert_eq!(pair.nearest.col % 2, 0);
        }

        let dir = if chunk[9] & 0x80 != 0 {
            RefDirection::Second
        } else {
            RefDirection::First
        };
        let mut scanner = Candidates(candidates);
        let mut decoded = SubBlockMvs::default();
        for i in 0..4 {
            let block = SubBlockIndex::from_raw(i);
            let pair = append_sub8x8_mvs_for_idx(&mut scanner, block, dir, &decoded);
            if block != SubBlockIndex::TopLeft {
                assert!(pair.near.is_zero() || pair.near != pair.nearest);
            }
            decoded.set(block, dir, pair.nearest);
        }
    }
});
