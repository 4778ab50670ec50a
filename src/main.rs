use camera_ocr::camera::{Camera, StillCamera};
use camera_ocr::engine::{self, Engines, Recognizer};
use camera_ocr::imaging::{ImageContainer, Pipeline, RasterFormat, Task};
use camera_ocr::parameters::Parameters;
use camera_ocr::{config, output};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "camera-ocr")]
#[command(about = "Recognize digits and text in camera images")]
#[command(long_about = "\
Recognize digits and text in camera images

An image is run through an ordered list of processing tasks and then
handed to a recognition engine: tesseract for general text, ssocr for
seven-segment displays.

Tasks are JSON, one [name] or [name, value] pair per step:

  [[\"crop\", [120, 80, 300, 90]], [\"greyscale\"], [\"threshold\", 214]]

A value may be a number (first parameter), a list (by position) or an
object (by name). Operations: crop, zoom, rotate, threshold, dilate,
erode, opening, closing, gaussian_blur, greyscale, invert,
adaptive_threshold.

Any JSON argument may be given as @FILE to read it from a file.

Run 'camera-ocr gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where an ROI's parameters come from.
#[derive(clap::Args)]
struct RoiArgs {
    /// Parameters file written by an earlier session
    #[arg(long, requires = "roi", conflicts_with_all = ["tasks", "algorithm", "options"])]
    params: Option<PathBuf>,

    /// ROI name inside the parameters file
    #[arg(long, requires = "params")]
    roi: Option<String>,

    /// Processing tasks as JSON
    #[arg(long)]
    tasks: Option<String>,

    /// Recognition engine: tesseract or ssocr
    #[arg(long, default_value = "tesseract")]
    algorithm: String,

    /// Engine options as a JSON object, e.g. '{"num_digits": 6}'
    #[arg(long)]
    options: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run processing tasks on an image and save the result
    Process {
        /// Image path or base64 text
        #[arg(long)]
        image: String,
        /// Processing tasks as JSON
        #[arg(long)]
        tasks: String,
        /// Only run crop and rotate, skip pixel operations
        #[arg(long)]
        restrict_to_transforms: bool,
        /// Output file; the extension picks the format
        #[arg(long)]
        output: PathBuf,
    },
    /// Process an image and recognize it
    Apply {
        /// Image path or base64 text
        #[arg(long)]
        image: String,
        #[command(flatten)]
        roi: RoiArgs,
        /// Also save the processed image
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recognize every ROI of a parameters file
    Run {
        /// Image file, re-read like a camera frame
        #[arg(long)]
        image: PathBuf,
        /// Parameters file
        #[arg(long)]
        params: PathBuf,
    },
    /// Show engine versions and installed languages
    Versions,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::GenConfig => print!("{}", config::stock_config_toml()),
        command => execute(command, &config::load_config(cli.config.as_deref())?)?,
    }
    Ok(())
}

fn execute(command: Command, config: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let engines = Engines::from_config(&config.engines);
    let quality = config.images.quality();

    match command {
        Command::Process {
            image,
            tasks,
            restrict_to_transforms,
            output,
        } => {
            let image = ImageContainer::decode(image)?;
            let tasks: Vec<Task> = serde_json::from_str(&read_json_arg(&tasks)?)?;
            let processed = Pipeline::compile(&tasks)?.run(&image, restrict_to_transforms);
            save(&processed, &output, quality)?;
            println!(
                "{}x{} → {}",
                processed.width(),
                processed.height(),
                output.display()
            );
        }
        Command::Apply { image, roi, output } => {
            let (text, processed) = match (&roi.params, &roi.roi) {
                (Some(params), Some(name)) => {
                    let params = Parameters::load(params)?;
                    let roi_params = params
                        .rois
                        .get(name)
                        .ok_or_else(|| format!("no ROI named {name:?}"))?;
                    let image = ImageContainer::decode(image)?;
                    roi_params.apply(&image, &engines)?
                }
                _ => {
                    let tasks: Vec<Task> = match &roi.tasks {
                        Some(tasks) => serde_json::from_str(&read_json_arg(tasks)?)?,
                        None => Vec::new(),
                    };
                    let options = match &roi.options {
                        Some(options) => serde_json::from_str(&read_json_arg(options)?)?,
                        None => serde_json::Map::new(),
                    };
                    let recognizer = Recognizer::from_parts(&roi.algorithm, options)?;
                    let image = ImageContainer::decode(image)?;
                    engine::apply(&image, &tasks, &recognizer, &engines)?
                }
            };
            if let Some(output) = output {
                save(&processed, &output, quality)?;
            }
            println!("{text}");
        }
        Command::Run { image, params } => {
            init_thread_pool(&config.processing);
            let params = Parameters::load(&params)?;
            let camera = StillCamera::new(&image, Arc::new(engines))
                .with_settings(params.camera.clone())?;
            let frame = camera.capture()?;
            let outcomes = params.recognize_all(&frame, camera.engine());
            output::print_run_results(&outcomes);
            let failed = outcomes.iter().filter(|o| o.text.is_err()).count();
            if failed > 0 {
                return Err(format!("{failed} of {} ROI(s) failed", outcomes.len()).into());
            }
        }
        Command::Versions => {
            output::print_versions(&engines.report());
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

/// Inline JSON, or `@path` to read it from a file.
fn read_json_arg(arg: &str) -> std::io::Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path),
        None => Ok(arg.to_string()),
    }
}

/// Save in the format named by the extension, else the image's own format.
fn save(
    image: &ImageContainer,
    path: &Path,
    quality: camera_ocr::imaging::Quality,
) -> Result<(), camera_ocr::imaging::ImageError> {
    let image = match RasterFormat::from_path(path) {
        Some(format) => image.with_format(format),
        None => image.clone(),
    };
    image.save(path, quality)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
