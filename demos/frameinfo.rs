// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! frameinfo, a small program printing the memory layout of a frame buffer and the MD5 checksum
//! of its planes after filling them with a test pattern.

use std::str::FromStr;

use argh::FromArgs;

use vp9_recon::frame_buffer::AcceleratorAllocator;
use vp9_recon::frame_buffer::AcceleratorPool;
use vp9_recon::frame_buffer::DimAlign;
use vp9_recon::frame_buffer::ExternalAllocator;
use vp9_recon::frame_buffer::ExternalMemory;
use vp9_recon::frame_buffer::FrameAllocator;
use vp9_recon::frame_buffer::FrameGeometry;
use vp9_recon::frame_buffer::PoolConfig;
use vp9_recon::frame_buffer::SystemAllocator;
use vp9_recon::FrameBuffer;
use vp9_recon::FrameParams;
use vp9_recon::Plane;
use vp9_recon::Resolution;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Strategy {
    System,
    External,
    Accel,
}

impl FromStr for Strategy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Strategy::System),
            "external" => Ok(Strategy::External),
            "accel" => Ok(Strategy::Accel),
            _ => Err("unrecognized allocation strategy. Valid values: system, external, accel"),
        }
    }
}

/// Prints the layout of a frame buffer
#[derive(Debug, FromArgs)]
struct Args {
    /// width of the frame
    #[argh(option, default = "352")]
    width: u32,

    /// height of the frame
    #[argh(option, default = "288")]
    height: u32,

    /// chroma subsampling shift (0 or 1), applied to both axes. Default: 1 (4:2:0)
    #[argh(option, default = "1")]
    ss: u32,

    /// border around the planes, in pixels. Must be a multiple of 32. Default: 160
    #[argh(option, default = "160")]
    border: u32,

    /// whether to add an alpha plane
    #[argh(switch)]
    alpha: bool,

    /// whether to align dimensions to 16 pixels instead of 8
    #[argh(switch)]
    legacy: bool,

    /// where the frame storage comes from (system, external or accel). Default: system
    #[argh(option, default = "Strategy::System")]
    strategy: Strategy,

    /// number of frames to allocate and fill
    #[argh(option, default = "2")]
    frames: usize,
}

fn fill_pattern<A: FrameAllocator + ?Sized>(fb: &mut FrameBuffer, alloc: &mut A, seed: u8) {
    for plane in (0..).map_while(Plane::n) {
        let Some(mut view) = fb.plane_mut(alloc, plane) else {
            continue;
        };

        let layout = *view.layout();
        for y in 0..layout.height {
            for (x, sample) in view.row_mut(y).iter_mut().enumerate() {
                *sample = (x as u8)
                    .wrapping_mul(3)
                    .wrapping_add(y as u8)
                    .wrapping_add(seed)
                    .wrapping_add(plane as u8 * 64);
            }
        }
    }
}

fn print_frame<A: FrameAllocator + ?Sized>(index: usize, fb: &FrameBuffer, alloc: &A) {
    let geometry = fb.geometry();
    println!(
        "frame {}: {}x{} coded as {}x{}, {} bytes in {} bytes of storage",
        index,
        geometry.crop_width,
        geometry.crop_height,
        geometry.aligned_width,
        geometry.aligned_height,
        geometry.frame_size,
        fb.backing().capacity(),
    );

    for plane in (0..).map_while(Plane::n) {
        let Some(view) = fb.plane(alloc, plane) else {
            continue;
        };

        let mut context = md5::Context::new();
        for row in view.visible_rows() {
            context.consume(row);
        }

        let layout = view.layout();
        println!(
            "  {:?}: offset {:#x} stride {} size {}x{} border {}x{} md5 {:x}",
            plane,
            layout.offset,
            layout.stride,
            layout.crop_width,
            layout.crop_height,
            layout.border_w,
            layout.border_h,
            context.compute(),
        );
    }
}

fn run<A: FrameAllocator + ?Sized>(
    args: &Args,
    params: &FrameParams,
    alloc: &mut A,
    pooled: bool,
) -> anyhow::Result<()> {
    let mut frames: Vec<FrameBuffer> = (0..args.frames).map(|_| Default::default()).collect();

    for (i, fb) in frames.iter_mut().enumerate() {
        let slot = pooled.then_some(i);
        fb.alloc(alloc, params, slot)?;
        fill_pattern(fb, alloc, i as u8);
        print_frame(i, fb, &*alloc);
    }

    for fb in frames.iter_mut() {
        fb.free(alloc)?;
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();

    let params = FrameParams {
        resolution: Resolution::new(args.width, args.height),
        ss_x: args.ss,
        ss_y: args.ss,
        border: args.border,
        alpha: args.alpha,
        dim_align: if args.legacy {
            DimAlign::Sixteen
        } else {
            DimAlign::Eight
        },
    };

    match args.strategy {
        Strategy::System => run(&args, &params, &mut SystemAllocator, false),
        Strategy::External => {
            let mut alloc = ExternalAllocator::new(|size| {
                log::debug!("client providing {} bytes", size);
                Ok(Box::new(vec![0u8; size]) as Box<dyn ExternalMemory>)
            });
            run(&args, &params, &mut alloc, false)
        }
        Strategy::Accel => {
            let geometry = FrameGeometry::compute(&params)?;
            let mut pool = AcceleratorPool::new(PoolConfig {
                slot_size: geometry.frame_size,
                num_slots: args.frames,
            })?;
            println!(
                "accelerator pool: {} slots of {} bytes",
                pool.num_slots(),
                pool.slot_size()
            );
            let mut alloc = AcceleratorAllocator::new(&mut pool);
            run(&args, &params, &mut alloc, true)
        }
    }
}
