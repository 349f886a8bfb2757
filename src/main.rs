use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use image::GrayImage;

use tumor_mpr::colormap::Colormap;
use tumor_mpr::config::ViewerConfig;
use tumor_mpr::export;
use tumor_mpr::gpu_sampler::{GpuContext, GpuSliceSampler};
use tumor_mpr::overlay::DimensionMatch;
use tumor_mpr::scheduler::{LoadSupervisor, RenderWorker};
use tumor_mpr::tumor::BestSlices;
use tumor_mpr::{OverlayCompositor, OverlayVolume, Plane, Processor, SliceExtractor, TumorSliceSelector, Volume};

/// Write the slices that show the most tumor, one PNG per plane.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// NIfTI-1 volume (.nii or .nii.gz)
    volume: PathBuf,

    /// Tumor mask with the same dimensions as the volume
    #[arg(long)]
    tumor: Option<PathBuf>,

    /// Additional overlay drawn below the tumor mask
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Mask values above this count as tumor
    #[arg(long)]
    threshold: Option<f32>,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Processor::CPU)]
    processor: Processor,

    /// JSON viewer config
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    colormap: Option<Colormap>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path).context("reading viewer config")?,
        None => ViewerConfig::default(),
    };
    if let Some(colormap) = args.colormap {
        config.colormap = colormap;
    }
    if let Some(threshold) = args.threshold {
        config.tumor_overlay.threshold = threshold;
    }
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let mut loads = LoadSupervisor::new();
    let volume = Arc::new(
        loads
            .load_file(args.volume.clone())
            .wait()
            .await
            .with_context(|| format!("loading {}", args.volume.display()))?,
    );
    let extent = volume.extent();
    log::info!("loaded {} ({}x{}x{})", args.volume.display(), extent.x, extent.y, extent.z);

    let mut layers = Vec::new();
    let mut tumor = None;
    for (path, overlay_config, is_tumor) in [
        (&args.overlay, &config.overlay, false),
        (&args.tumor, &config.tumor_overlay, true),
    ] {
        let Some(path) = path else { continue };
        let mask = loads
            .load_file(path.clone())
            .wait()
            .await
            .with_context(|| format!("loading {}", path.display()))?;
        let overlay = OverlayVolume::with_threshold(Arc::new(mask), overlay_config.threshold);
        if overlay.dimension_match(&extent) == DimensionMatch::Mismatch {
            log::warn!("{} does not match the volume, skipped", path.display());
            continue;
        }
        let overlay = Arc::new(overlay);
        if is_tumor {
            tumor = Some(Arc::clone(&overlay));
        }
        layers.push((overlay, overlay_config.style()));
    }

    let best = match &tumor {
        Some(tumor) => TumorSliceSelector::new().find_best_slices(tumor),
        None => BestSlices {
            axial: volume.central_slice(Plane::Axial),
            coronal: volume.central_slice(Plane::Coronal),
            sagittal: volume.central_slice(Plane::Sagittal),
        },
    };

    let sampler = match args.processor {
        Processor::GPU => Some(GpuSliceSampler::new(GpuContext::request().await?, &volume)),
        Processor::CPU => None,
    };
    let worker = RenderWorker::new();
    let lut = config.color_lut();
    std::fs::create_dir_all(&args.out_dir)?;

    for plane in Plane::ALL {
        let index = best.get(plane);
        let gray = match &sampler {
            Some(sampler) => volume.get_image_from_axis_gpu(index, plane, sampler).await?,
            None => extract_off_thread(&worker, Arc::clone(&volume), plane, index).await?,
        };
        let mut image = lut.colorize(&gray);
        for (overlay, style) in &layers {
            image = OverlayCompositor::composite_rgb(&image, &extent, overlay, plane, index, *style).image;
        }
        let path = args.out_dir.join(format!("{plane}_{index:03}.png"));
        export::save_png(&image::DynamicImage::ImageRgb8(image).to_rgba8(), &path)?;
        log::info!("wrote {}", path.display());
        println!("{plane}: slice {index} -> {}", path.display());
    }
    Ok(())
}

async fn extract_off_thread(
    worker: &RenderWorker,
    volume: Arc<Volume>,
    plane: Plane,
    index: usize,
) -> anyhow::Result<GrayImage> {
    worker
        .submit(move || SliceExtractor::extract_slice(&volume, plane, index))
        .wait()
        .await
        .context("slice extraction was superseded")?
        .map_err(Into::into)
}
