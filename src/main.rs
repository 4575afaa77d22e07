use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;

use nucdetect::extension::Extension;
use nucdetect::{
    BoundingBox, DetectionPlugin, ImageData, IntensityDetector, ModelCatalog, PixelCalibration,
    RawParams, Region, Settings, SlideImage,
};

#[derive(Parser)]
#[command(name = "nucdetect")]
#[command(about = "Detect cell nuclei in annotated regions of slide images")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: $NUCDETECT_SETTINGS or ~/.config/nucdetect/settings.json)
    #[arg(long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remember the directory holding the *.pb model files
    Configure {
        /// Model directory
        #[arg(long, value_name = "DIR")]
        models: PathBuf,
    },
    /// List the models in the model directory
    Models {
        /// Model directory (overrides the saved setting)
        #[arg(long, value_name = "DIR")]
        models: Option<PathBuf>,
    },
    /// Print the default detection parameters for an image as JSON
    Params(ImageArgs),
    /// Run nucleus detection
    Detect(DetectArgs),
    /// Show the extension and its commands
    Info,
}

#[derive(Args)]
struct ImageArgs {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Physical pixel size in microns; detection refuses uncalibrated images
    #[arg(long, value_name = "MICRONS")]
    pixel_size_microns: Option<f64>,

    /// Model directory (overrides the saved setting)
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,
}

#[derive(Args)]
struct DetectArgs {
    #[command(flatten)]
    image: ImageArgs,

    /// Region to detect in, as x,y,width,height (repeatable)
    #[arg(long = "region", value_name = "X,Y,W,H", value_parser = parse_bounds)]
    regions: Vec<BoundingBox>,

    /// JSON file with an array of regions ({"name", "x", "y", "width", "height"})
    #[arg(long, value_name = "FILE")]
    regions_file: Option<PathBuf>,

    /// Detect in the whole image
    #[arg(long)]
    whole_image: bool,

    /// JSON file with detection parameters; flags below override it
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Model file name in the model directory
    #[arg(long)]
    model: Option<String>,

    /// Probability (detection) threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Percentile normalization (lower bound)
    #[arg(long)]
    normalize_low: Option<f64>,

    /// Percentile normalization (upper bound)
    #[arg(long)]
    normalize_high: Option<f64>,

    /// Resolution for detection in microns per pixel (default: image pixel size)
    #[arg(long)]
    pixel_size: Option<f64>,

    /// Detection channel (e.g. blue, "Channel 3")
    #[arg(long)]
    channel: Option<String>,

    /// Approximate cells by expanding nuclei this many microns
    #[arg(long)]
    cell_expansion: Option<f64>,

    /// Constrain cell expansion using nucleus size (e.g. 1.5)
    #[arg(long)]
    cell_constrain_scale: Option<f64>,

    /// Add shape measurements
    #[arg(long)]
    measure_shape: bool,

    /// Add intensity measurements
    #[arg(long)]
    measure_intensity: bool,

    /// Add probability as a measurement
    #[arg(long)]
    include_probability: bool,

    /// Threads running detection; hierarchy updates stay on one thread
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Write detections as JSON to this file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn parse_bounds(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region '{}': {}", s, e))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(BoundingBox::new(*x, *y, *w, *h)),
        _ => Err(format!("region '{}' must be x,y,width,height", s)),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let _logger = nucdetect::logging::setup_logging(if args.verbose { "debug" } else { "info" })?;

    let settings_path = match &args.settings {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };

    match args.command {
        Command::Configure { models } => configure(&settings_path, models),
        Command::Models { models } => list_models(&catalog_for(&settings_path, models)?),
        Command::Params(image_args) => print_params(&settings_path, &image_args),
        Command::Detect(detect_args) => detect(&settings_path, detect_args),
        Command::Info => {
            let extension = Extension;
            println!("{}\n{}\n", extension.name(), extension.description());
            extension.install(|command| {
                println!("  {} > {}: {}", command.menu, command.name, command.description);
            });
            Ok(())
        }
    }
}

fn configure(settings_path: &Path, models: PathBuf) -> anyhow::Result<()> {
    let models = models
        .canonicalize()
        .with_context(|| format!("Model directory {:?} is not accessible", models))?;
    let settings = Settings::load(settings_path)?.with_model_location(&models);
    settings.save(settings_path)?;
    println!("Model location set to {}", models.display());
    Ok(())
}

fn catalog_for(settings_path: &Path, models: Option<PathBuf>) -> anyhow::Result<ModelCatalog> {
    let settings = Settings::load(settings_path)?;
    let settings = match models {
        Some(dir) => settings.with_model_location(dir),
        None => settings,
    };
    Ok(settings.catalog()?)
}

fn list_models(catalog: &ModelCatalog) -> anyhow::Result<()> {
    let models = catalog.scan()?;
    println!("Models in {}:", catalog.directory().display());
    for model in models {
        println!("  {}", model.name);
    }
    Ok(())
}

fn open_image(args: &ImageArgs) -> anyhow::Result<ImageData> {
    let calibration = match args.pixel_size_microns {
        Some(size) => PixelCalibration::microns(size),
        None => PixelCalibration::unknown(),
    };
    info!("Loading image: {:?}", args.image_path);
    let image = ImageData::open(&args.image_path, calibration)?;
    info!("Image loaded: {}x{}", image.width(), image.height());
    Ok(image)
}

fn print_params(settings_path: &Path, args: &ImageArgs) -> anyhow::Result<()> {
    let catalog = catalog_for(settings_path, args.models.clone())?;
    let image = open_image(args)?;
    let params = nucdetect::default_parameters(&image, &catalog)?;
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn detect(settings_path: &Path, args: DetectArgs) -> anyhow::Result<()> {
    let catalog = catalog_for(settings_path, args.image.models.clone())?;
    let image = open_image(&args.image)?;

    let mut plugin = DetectionPlugin::new(catalog, Arc::new(IntensityDetector::new()))
        .with_workers(args.workers);

    // Fails here for uncalibrated images or an empty model directory
    let defaults = plugin.default_parameters(&image)?;
    let params = apply_overrides(defaults, &args)?;

    let mut slide = SlideImage::new(image);
    for region in load_regions(&args, &slide.data)? {
        let id = slide.hierarchy.add_annotation(region);
        slide.hierarchy.select(id);
    }

    let report = plugin.run(&mut slide, &params)?;

    println!("\n=== Nucleus Detection Results ===");
    for result in &report.results {
        println!(
            "  Region {} ({}): {} detection(s)",
            result.index, result.region_name, result.detections
        );
    }
    if let Some(summary) = plugin.last_results_description() {
        println!("\n{}", summary);
    }

    if let Some(output) = &args.output {
        write_detections(output, &slide, &report)?;
        println!("Detections written to {}", output.display());
    }

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} region(s) failed", report.failures.len())
    }
}

fn apply_overrides(defaults: RawParams, args: &DetectArgs) -> anyhow::Result<RawParams> {
    let mut params = match &args.params {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read parameters {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse parameters {:?}", path))?
        }
        None => defaults,
    };

    if let Some(model) = &args.model {
        params.path_model = model.clone();
    }
    if let Some(v) = args.threshold {
        params.threshold = v;
    }
    if let Some(v) = args.normalize_low {
        params.normalize_percentiles_low = v;
    }
    if let Some(v) = args.normalize_high {
        params.normalize_percentiles_high = v;
    }
    if let Some(v) = args.pixel_size {
        params.pixel_size = v;
    }
    if let Some(channel) = &args.channel {
        params.channel = channel.clone();
    }
    if let Some(v) = args.cell_expansion {
        params.cell_expansion = v;
    }
    if let Some(v) = args.cell_constrain_scale {
        params.cell_constrain_scale = v;
    }
    params.measure_shape |= args.measure_shape;
    params.measure_intensity |= args.measure_intensity;
    params.include_probability |= args.include_probability;
    Ok(params)
}

fn load_regions(args: &DetectArgs, image: &ImageData) -> anyhow::Result<Vec<Region>> {
    let mut regions = Vec::new();
    if let Some(path) = &args.regions_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read regions {:?}", path))?;
        let from_file: Vec<Region> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse regions {:?}", path))?;
        regions.extend(from_file);
    }
    for (i, bounds) in args.regions.iter().enumerate() {
        regions.push(Region::new(format!("Region {}", i + 1), *bounds));
    }
    if args.whole_image {
        regions.push(Region::new(
            "Whole image",
            BoundingBox::new(0, 0, image.width(), image.height()),
        ));
    }
    Ok(regions)
}

fn write_detections(path: &Path, slide: &SlideImage, report: &nucdetect::BatchReport) -> anyhow::Result<()> {
    let regions: Vec<_> = slide
        .hierarchy
        .annotations()
        .iter()
        .map(|region| {
            serde_json::json!({
                "region": region,
                "detections": slide.hierarchy.children(region.id),
            })
        })
        .collect();
    let document = serde_json::json!({
        "image": slide.data.name,
        "report": report,
        "regions": regions,
    });
    std::fs::write(path, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("Failed to write detections {:?}", path))?;
    Ok(())
}
