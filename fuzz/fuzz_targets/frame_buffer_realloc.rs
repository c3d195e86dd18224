#![no_main]

use libfuzzer_sys::fuzz_target;
use vp9_recon::frame_buffer::DimAlign;
use vp9_recon::frame_buffer::ExternalAllocator;
use vp9_recon::frame_buffer::ExternalMemory;
use vp9_recon::frame_buffer::FrameAllocator;
use vp9_recon::frame_buffer::SystemAllocator;
use vp9_recon::FrameBuffer;
use vp9_recon::FrameParams;
use vp9_recon::Plane;
use vp9_recon::Resolution;

/// Turns 8 bytes of input into frame parameters small enough to be allocated quickly.
fn params(chunk: &[u8]) -> FrameParams {
    let word = |i: usize| u16::from_le_bytes([chunk[i], chunk[i + 1]]);

    FrameParams {
        resolution: Resolution::new(u32::from(word(0) % 1024), u32::from(word(2) % 1024)),
        ss_x: u32::from(chunk[4] & 1),
        ss_y: u32::from((chunk[4] >> 1) & 1),
        // Mostly valid borders, with the odd unaligned one.
        border: u32::from(chunk[5] % 6) * 32 + u32::from(chunk[6] & 0x21 == 0x21),
        alpha: chunk[7] & 1 != 0,
        dim_align: if chunk[7] & 2 != 0 {
            DimAlign::Sixteen
        } else {
            DimAlign::Eight
        },
    }
}

fn exercise<A: FrameAllocator + ?Sized>(alloc: &mut A, data: &[u8]) {
    let mut fb = FrameBuffer::default();

    for chunk in data.chunks_exact(8) {
        let params = params(chunk);

        if fb.realloc(alloc, &params, None).is_err() {
            continue;
        }

        for plane in [Plane::Y, Plane::U, Plane::V, Plane::Alpha] {
            if let Some(mut view) = fb.plane_mut(alloc, plane) {
                let height = view.layout().height;
                if height > 0 {
                    view.row_mut(height - 1).fill(chunk[0]);
                }
            }
        }
    }

    let _ = fb.free(alloc);
}

fuzz_target!(|data: &[u8]| {
    exercise(&mut SystemAllocator, data);

    let mut external = ExternalAllocator::new(|size| {
        Ok(Box::new(vec![0u8; size]) as Box<dyn ExternalMemory>)
    });
    exercise(&mut external, data);
});
