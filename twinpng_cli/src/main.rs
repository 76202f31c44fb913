use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;
use image::RgbImage;
use log::debug;

use twinpng_core::filter::strip_filter;
use twinpng_core::{decode_file, Codec, FlateCodec, PackOptions, PixelSource, Writer};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "twinpng",
    about = "Build PNG files that show one image to standard decoders and another to iDOT-aware ones",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack two equally sized images into one PNG
    Pack {
        /// Image shown by decoders that honour the iDOT restart chunk
        image_a: PathBuf,
        /// Image shown by every other decoder
        image_b: PathBuf,
        /// Destination PNG
        output: PathBuf,
        /// Deflate level for the compressed parts of each segment (0–9)
        #[arg(short, long, default_value_t = 9)]
        level: u32,
        /// Search piece heights on one thread
        #[arg(long)]
        serial: bool,
    },
    /// Decode both readings of a packed file and report on them
    Inspect {
        /// Packed PNG
        file: PathBuf,
    },
    /// Decode both readings of a packed file and save them as plain PNGs
    Extract {
        /// Packed PNG
        file: PathBuf,
        /// Where to write what a standard decoder shows
        #[arg(long)]
        standard: Option<PathBuf>,
        /// Where to write what an iDOT-aware decoder shows
        #[arg(long)]
        restart: Option<PathBuf>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn load_rgb(path: &Path) -> anyhow::Result<PixelSource> {
    let img = image::open(path)
        .with_context(|| format!("opening input image {:?}", path))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    debug!("loaded {:?} as {}x{} RGB", path, width, height);
    Ok(PixelSource::new(width, height, img.into_raw())?)
}

fn save_rgb(path: &Path, width: u32, filtered: &[u8]) -> anyhow::Result<()> {
    let rgb = strip_filter(filtered, width)?;
    let height = rgb
        .len()
        .checked_div(width as usize * 3)
        .with_context(|| format!("cannot save a zero-width image to {:?}", path))?
        as u32;
    let img = RgbImage::from_raw(width, height, rgb)
        .with_context(|| format!("{} rows of width {} do not form an image", height, width))?;
    img.save(path)
        .with_context(|| format!("writing {:?}", path))?;
    eprintln!("  written to {:?} ({}x{})", path, width, height);
    Ok(())
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_pack(
    image_a: PathBuf,
    image_b: PathBuf,
    output: PathBuf,
    level: u32,
    serial: bool,
) -> anyhow::Result<()> {
    let a = load_rgb(&image_a)?;
    let b = load_rgb(&image_b)?;
    let codec = FlateCodec::new(level);

    let t0 = Instant::now();
    let built = Writer::new(&codec)
        .with_options(PackOptions { parallel: !serial })
        .write(&output, &a, &b)
        .with_context(|| format!("building {:?}", output))?;
    let elapsed = t0.elapsed();

    eprintln!("  codec          : {} (level {})", codec.name(), codec.level);
    eprintln!("  source size    : {}x{}", a.width(), a.height());
    eprintln!("  pieces         : {}", built.pieces.len());
    eprintln!(
        "  standard rows  : {} (shows {:?})",
        built.standard_height(),
        image_b
    );
    eprintln!(
        "  restart rows   : {} + {} (shows {:?})",
        built.descriptor.first_height,
        built.restart_height(),
        image_a
    );
    eprintln!("  restart offset : {}", built.descriptor.restart_offset);
    eprintln!("  file size      : {}", human_bytes(built.bytes.len() as u64));
    eprintln!("  elapsed        : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf) -> anyhow::Result<()> {
    let codec = FlateCodec::default();
    let decoded =
        decode_file(&codec, &file).with_context(|| format!("decoding {:?}", file))?;
    let file_size = std::fs::metadata(&file)?.len();
    let descriptor = decoded.descriptor;
    let readings = &decoded.interpretations;

    println!("=== twinpng file: {:?} ===", file);
    println!();
    println!("  dimensions      : {}x{}", decoded.header.width, decoded.header.height);
    println!("  file on disk    : {}", human_bytes(file_size));
    println!("  iDOT divisor    : {}", descriptor.divisor);
    println!("  divided height  : {}", descriptor.divided_height);
    println!("  first height    : {}", descriptor.first_height);
    println!("  second height   : {}", descriptor.second_height);
    println!("  restart offset  : {}", descriptor.restart_offset);
    println!("  restart split   : {} bytes into the zlib stream", readings.restart_split);
    println!();
    println!("  standard reading : {} bytes, filter bytes ok, adler32 ok", readings.standard.len());
    println!(
        "  restart reading  : {} + {} bytes, filter bytes ok",
        readings.restart_first.len(),
        readings.restart_second.len()
    );
    Ok(())
}

fn run_extract(
    file: PathBuf,
    standard: Option<PathBuf>,
    restart: Option<PathBuf>,
) -> anyhow::Result<()> {
    if standard.is_none() && restart.is_none() {
        anyhow::bail!("nothing to do: pass --standard and/or --restart");
    }
    let codec = FlateCodec::default();
    let decoded =
        decode_file(&codec, &file).with_context(|| format!("decoding {:?}", file))?;
    let width = decoded.header.width;
    let readings = decoded.interpretations;

    if let Some(path) = standard {
        save_rgb(&path, width, &readings.standard)?;
    }
    if let Some(path) = restart {
        let mut rows = readings.restart_first;
        rows.extend_from_slice(&readings.restart_second);
        save_rgb(&path, width, &rows)?;
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            image_a,
            image_b,
            output,
            level,
            serial,
        } => run_pack(image_a, image_b, output, level, serial),
        Commands::Inspect { file } => run_inspect(file),
        Commands::Extract {
            file,
            standard,
            restart,
        } => run_extract(file, standard, restart),
    }
}
