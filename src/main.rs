// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use anyhow::Context;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use indicatif::ProgressBar;
use nalgebra::Vector3;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dlotrack::camera::Camera;
use dlotrack::cloud::{self, OrganisedCloud};
use dlotrack::mask::Mask;
use dlotrack::segment;
use dlotrack::tracker::Tracker;
use dlotrack::viz;

// Default values for some of the program arguments.
const DEFAULT_OUT_DIR: &str = "out";
const DEFAULT_VOXEL_SIZE: f64 = 0.005;

/// Entry point of the program.
fn main() {
    parse_args()
        .and_then(run)
        .unwrap_or_else(|err| eprintln!("Error: {:?}", err));
}

fn display_help() {
    eprintln!(
        r#"
dlotrack

Track a deformable linear object (rope, cable) through a recorded
RGB-D frame sequence. Frames are png pairs named NAME_rgb.png and
NAME_depth.png (16-bit depth in millimetres), with an optional
NAME_occl.png occlusion mask. The per-frame tracking error is written
to stdout, overlay images to the output directory.

USAGE:
    dlotrack [FLAGS] GLOB
    For example:
        dlotrack "recording/*_rgb.png"
        dlotrack --no-imgs "recording/*_rgb.png" > errors.txt

FLAGS:
    --help                 # Print this message and exit
    --version              # Print version and exit
    --out-dir dir/         # Output directory for overlay images (default: {})
    --voxel float          # Voxel down-sampling leaf size in metres (default: {})
    --no-imgs              # Do not save overlay images
"#,
        DEFAULT_OUT_DIR, DEFAULT_VOXEL_SIZE,
    )
}

#[derive(Debug)]
/// Type holding command line arguments.
struct Args {
    help: bool,
    version: bool,
    out_dir: String,
    voxel_size: f64,
    save_imgs: bool,
    frames: Vec<PathBuf>,
}

/// Parse command line arguments.
fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        help: false,
        version: false,
        out_dir: DEFAULT_OUT_DIR.to_string(),
        voxel_size: DEFAULT_VOXEL_SIZE,
        save_imgs: true,
        frames: Vec::new(),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" => args.help = true,
            "--version" => args.version = true,
            "--no-imgs" => args.save_imgs = false,
            "--out-dir" => {
                args.out_dir = iter.next().context("--out-dir needs a value")?;
            }
            "--voxel" => {
                let value = iter.next().context("--voxel needs a value")?;
                args.voxel_size = f64::from_str(&value).context("--voxel needs a float")?;
            }
            pattern => {
                for entry in glob::glob(pattern).context("invalid glob pattern")? {
                    args.frames.push(entry?);
                }
            }
        }
    }
    args.frames.sort();
    Ok(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    env_logger::init();
    if args.help {
        display_help();
        return Ok(());
    }
    if args.version {
        eprintln!("{}", std::env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    anyhow::ensure!(
        !args.frames.is_empty(),
        "no frames matched, expected NAME_rgb.png files"
    );

    let camera = Camera::default_rig();
    let mut tracker = Tracker::new(camera.clone());
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("could not create output dir {}", args.out_dir))?;

    let progress = ProgressBar::new(args.frames.len() as u64);
    for rgb_path in &args.frames {
        if let Err(err) = process_frame(&args, &camera, &mut tracker, rgb_path) {
            log::warn!("frame {:?} skipped: {:#}", rgb_path, err);
        }
        progress.inc(1);
    }
    progress.finish();
    Ok(())
}

/// Load one frame triple, push it through the tracker and report.
fn process_frame(
    args: &Args,
    camera: &Camera,
    tracker: &mut Tracker,
    rgb_path: &Path,
) -> anyhow::Result<()> {
    let rgb: RgbImage = image::open(rgb_path)
        .with_context(|| format!("loading {:?}", rgb_path))?
        .to_rgb8();
    let depth_path = sibling_path(rgb_path, "_rgb.png", "_depth.png")?;
    let depth: ImageBuffer<Luma<u16>, Vec<u16>> = image::open(&depth_path)
        .with_context(|| format!("loading {:?}", depth_path))?
        .to_luma16();

    // The occlusion mask is optional: a missing file means fully open.
    let occlusion = match sibling_path(rgb_path, "_rgb.png", "_occl.png") {
        Ok(path) if path.exists() => {
            let img: GrayImage = image::open(&path)?.to_luma8();
            Some(Mask::from_image(&img))
        }
        _ => None,
    };

    // Foreground extraction and marker detection.
    let foreground = segment::foreground_mask(&rgb, occlusion.as_ref());
    let marker_mask = segment::marker_mask(&rgb);
    let organised = OrganisedCloud::from_depth(&depth, camera);

    let markers: Vec<Vector3<f64>> = segment::blob_centroids(&marker_mask)
        .iter()
        .filter_map(|&(u, v)| organised.point_at(v as usize, u as usize))
        .collect();

    let gathered = organised.masked_points(&foreground);
    let cloud = cloud::voxel_downsample(&gathered, args.voxel_size);

    let result = tracker.process_frame(&cloud, &foreground, &markers)?;
    if let Some(error) = result.frame_error {
        println!("{}", error);
    }

    if args.save_imgs {
        let mut overlay = rgb;
        if let Some(occl) = &occlusion {
            viz::darken_occluder(&mut overlay, occl);
        }
        let centres = segment::blob_centroids(&marker_mask);
        viz::draw_overlay(&mut overlay, &result.nodes, &foreground, camera, &centres);
        let name = rgb_path
            .file_name()
            .context("frame path has no file name")?
            .to_string_lossy()
            .replace("_rgb.png", "_overlay.png");
        overlay.save(Path::new(&args.out_dir).join(&name))?;
        // The segmentation mask goes next to the overlay.
        let mask_name = name.replace("_overlay.png", "_mask.png");
        foreground
            .to_image()
            .save(Path::new(&args.out_dir).join(mask_name))?;
    }
    Ok(())
}

/// Replace the suffix of a frame path to find its sibling file.
fn sibling_path(path: &Path, from: &str, to: &str) -> anyhow::Result<PathBuf> {
    let name = path
        .file_name()
        .context("frame path has no file name")?
        .to_string_lossy();
    anyhow::ensure!(
        name.ends_with(from),
        "frame file {:?} does not end with {}",
        path,
        from
    );
    Ok(path.with_file_name(name.replace(from, to)))
}
