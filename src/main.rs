//! Render one plane of a CT series, optionally with its segmentation,
//! into a PNG file.
use std::path::PathBuf;

use clap::Parser;
use dicom_mpr::{
    decoder::DicomDecoder,
    enums::{BlendPolicy, LabelClass, Orientation},
    overlay::{ClassVisibility, ColorAssignment, composite_overlay, gray_to_rgba},
    volume_loader::{CancellationToken, VolumeLoader},
    window::{WindowSetting, window_plane},
};
use tracing::{Level, error, info};

/// Render a re-sliced CT plane with its segmentation overlay
#[derive(Debug, Parser)]
struct App {
    /// Directory holding the series' .dcm files
    series: PathBuf,

    /// Directory holding the segmentation's .dcm files
    #[arg(short = 'l', long = "labels")]
    labels: Option<PathBuf>,

    /// Plane to render (axial, coronal, sagittal)
    #[arg(long = "orientation", default_value = "sagittal")]
    orientation: Orientation,

    /// Index along the fixed axis (default is the centre)
    #[arg(short = 'i', long = "index")]
    index: Option<usize>,

    /// Window center, overriding the series' own window
    #[arg(long = "center", requires = "width", allow_hyphen_values = true)]
    center: Option<f32>,

    /// Window width, overriding the series' own window
    #[arg(long = "width", requires = "center")]
    width: Option<f32>,

    /// Blend weight of label colors
    #[arg(long = "alpha", default_value = "0.5")]
    alpha: f32,

    /// Label classes to hide (liver, tumor, other)
    #[arg(long = "hide")]
    hide: Vec<LabelClass>,

    /// Path to the output image
    #[arg(short = 'o', long = "out", default_value = "result.png")]
    output: PathBuf,

    /// Print more information about the volume and the output file
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let app = App::parse();

    if let Err(e) = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if app.verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    ) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    }

    if let Err(e) = run(app).await {
        error!("{e}");
        std::process::exit(-1);
    }
}

async fn run(app: App) -> Result<(), Box<dyn std::error::Error>> {
    let decoder = DicomDecoder;
    let loader = VolumeLoader::new(&decoder, CancellationToken::new());

    let series = loader
        .load_from_directory(&app.series, |p| tracing::debug!("Loading series {:.0}%", p * 100.0))
        .await?;
    let volume = &series.volume;

    let window = match (app.center, app.width) {
        (Some(center), Some(width)) => WindowSetting::or_default(center, width),
        _ => series.window,
    };
    let index = app
        .index
        .unwrap_or(volume.max_index(app.orientation) / 2)
        .min(volume.max_index(app.orientation));

    let plane = volume.extract_plane(app.orientation, index)?;
    let gray = window_plane(&plane, &window);

    let image = match &app.labels {
        Some(path) => {
            let labels = loader
                .load_labels_from_directory(path, volume.dims(), |p| {
                    tracing::debug!("Loading labels {:.0}%", p * 100.0)
                })
                .await?;
            let label_plane = labels.plane_under(volume.dims(), app.orientation, index)?;

            let mut visibility = ClassVisibility::default();
            for class in &app.hide {
                visibility.set_visible(*class, false);
            }
            composite_overlay(
                &gray,
                &label_plane,
                &mut ColorAssignment::new(),
                &visibility,
                BlendPolicy::Flat(app.alpha),
            )
        }
        None => gray_to_rgba(&gray),
    };

    image.save(&app.output)?;
    info!(
        "Saved {} plane {} ({}x{}) to {}",
        app.orientation,
        index,
        image.width(),
        image.height(),
        app.output.display()
    );
    Ok(())
}
