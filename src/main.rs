use clap::{Args, Parser, Subcommand};
use gpa_strain::config::{Colormap, GpaSettings, ReferenceRegion, RotationUnit};
use gpa_strain::data_container::MapKind;
use gpa_strain::filters::preprocess::preprocess;
use gpa_strain::filters::spectrum::{forward_transform, log_magnitude};
use gpa_strain::io::{export_all, load_image, load_map, save_heatmap_png, save_results_npz};
use gpa_strain::math_tools::FiniteStats;
use gpa_strain::pipeline::apply;
use gpa_strain::profile::{line_profile, sample_count};
use preferences::{AppInfo, Preferences};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const APP_INFO: AppInfo = AppInfo {
    name: "GPA Strain",
    author: "Linus Leo Stöckli",
};

const PREFS_KEY: &str = "config/analysis";

#[derive(Parser)]
#[command(name = "gpa-strain")]
#[command(about = "Strain and rotation maps from lattice images by geometric phase analysis")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Store the effective settings as defaults for the next runs.
    #[arg(long, global = true)]
    save_defaults: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides of the stored analysis settings.
#[derive(Args, Default)]
struct SettingsArgs {
    /// Center of the first Bragg spot in the centered spectrum, as `row,col`.
    #[arg(long, value_parser = parse_point)]
    spot1: Option<(f64, f64)>,

    /// Center of the second Bragg spot, as `row,col`.
    #[arg(long, value_parser = parse_point)]
    spot2: Option<(f64, f64)>,

    /// Radius inside which a spot mask is 1 (both spots).
    #[arg(long)]
    inner_radius: Option<f64>,

    /// Radius beyond which a spot mask is 0 (both spots).
    #[arg(long)]
    outer_radius: Option<f64>,

    /// Strain-free reference rectangle as `row_start,row_end,col_start,col_end`.
    #[arg(long, value_parser = parse_region)]
    reference: Option<ReferenceRegion>,

    /// Gaussian sigma applied to the strain and rotation maps.
    #[arg(long)]
    smooth_sigma: Option<f64>,

    /// Percentile of the smoothed image below which pixels are excluded as non-material.
    #[arg(long)]
    threshold: Option<f64>,

    /// Gaussian sigma applied to the image before thresholding.
    #[arg(long)]
    preprocess_sigma: Option<f64>,

    /// Report the rotation in radians instead of degrees.
    #[arg(long)]
    radians: bool,

    /// Colormap of the exported images (`jet` or `gray`).
    #[arg(long)]
    colormap: Option<Colormap>,

    /// Color range of the strain images in percent, as `min,max`.
    #[arg(long, value_parser = parse_point)]
    strain_range: Option<(f64, f64)>,

    /// Color range of the rotation image, as `min,max`.
    #[arg(long, value_parser = parse_point)]
    rotation_range: Option<(f64, f64)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis and write `results.npz` into the output directory.
    Analyze {
        /// Input image (.npy, .npz or any common image format).
        #[arg(long)]
        image: PathBuf,

        /// Output directory.
        #[arg(long)]
        out: PathBuf,

        /// Also write the colored PNG images of all maps.
        #[arg(long)]
        png: bool,

        #[command(flatten)]
        settings: SettingsArgs,
    },
    /// Write the log-magnitude spectrum of an image, to pick spot centers from.
    Spectrum {
        /// Input image.
        #[arg(long)]
        image: PathBuf,

        /// Output PNG file.
        #[arg(long)]
        out: PathBuf,

        /// Gaussian sigma applied to the image before transforming.
        #[arg(long)]
        preprocess_sigma: Option<f64>,
    },
    /// Print a line profile of one map of a `results.npz`.
    Profile {
        /// Archive written by `analyze`.
        #[arg(long)]
        results: PathBuf,

        /// Map to sample, e.g. `strain_xx`, `rotation_xy` or `u1`.
        #[arg(long, default_value = "strain_xx")]
        map: MapKind,

        /// Start point as `row,col`.
        #[arg(long, value_parser = parse_point)]
        from: (f64, f64),

        /// End point as `row,col`.
        #[arg(long, value_parser = parse_point)]
        to: (f64, f64),

        /// Number of parallel lines averaged across the profile.
        #[arg(long, default_value_t = 1)]
        thickness: usize,
    },
}

fn parse_numbers(s: &str, expected: usize) -> Result<Vec<f64>, String> {
    let numbers = s
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("`{part}`: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    if numbers.len() != expected {
        return Err(format!(
            "expected {expected} comma separated numbers, found {}",
            numbers.len()
        ));
    }
    Ok(numbers)
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let n = parse_numbers(s, 2)?;
    Ok((n[0], n[1]))
}

fn parse_region(s: &str) -> Result<ReferenceRegion, String> {
    let n = parse_numbers(s, 4)?;
    if n.iter().any(|v| *v < 0.0 || v.fract() != 0.0) {
        return Err("region bounds must be non-negative integers".to_string());
    }
    let [r0, r1, c0, c1] = [n[0], n[1], n[2], n[3]].map(|v| v as usize);
    Ok(ReferenceRegion::from_corners((r0, c0), (r1, c1)))
}

impl SettingsArgs {
    fn apply_to(&self, settings: &mut GpaSettings) {
        let analysis = &mut settings.analysis;
        if let Some(center) = self.spot1 {
            analysis.spot1.center = center;
        }
        if let Some(center) = self.spot2 {
            analysis.spot2.center = center;
        }
        for spot in [&mut analysis.spot1, &mut analysis.spot2] {
            if let Some(inner) = self.inner_radius {
                spot.inner_radius = inner;
            }
            if let Some(outer) = self.outer_radius {
                spot.outer_radius = outer;
            }
        }
        if let Some(reference) = self.reference {
            analysis.reference = reference;
        }
        if let Some(sigma) = self.smooth_sigma {
            analysis.smooth_sigma = sigma;
        }
        if self.radians {
            analysis.rotation_unit = RotationUnit::Radians;
        }
        if let Some(threshold) = self.threshold {
            settings.threshold_percent = threshold;
        }
        if let Some(sigma) = self.preprocess_sigma {
            settings.preprocess_sigma = sigma;
        }
        if let Some(colormap) = self.colormap {
            settings.colormap = colormap;
        }
        if let Some((min, max)) = self.strain_range {
            settings.strain_range = [min, max];
        }
        if let Some((min, max)) = self.rotation_range {
            settings.rotation_range = [min, max];
        }
    }
}

fn load_settings() -> GpaSettings {
    match GpaSettings::load(&APP_INFO, PREFS_KEY) {
        Ok(settings) => settings,
        Err(_) => {
            let settings = GpaSettings::new();
            // save default settings
            if let Err(err) = settings.save(&APP_INFO, PREFS_KEY) {
                log::error!("error in saving settings: {err:?}");
            }
            settings
        }
    }
}

fn run_analyze(
    image_path: &Path,
    out: &Path,
    png: bool,
    settings: &GpaSettings,
) -> Result<(), Box<dyn Error>> {
    let image = load_image(image_path)?;
    let (pre, result) = apply(image.view(), settings)?;

    let basis = &result.basis;
    println!(
        "g1 = ({:.5}, {:.5}), g2 = ({:.5}, {:.5}) cycles/px, condition number {:.3}",
        basis.g1.gx,
        basis.g1.gy,
        basis.g2.gx,
        basis.g2.gy,
        basis.condition_number()
    );
    println!(
        "material: {} of {} pixels above {:.4}",
        pre.material_mask.iter().filter(|&&m| m).count(),
        pre.material_mask.len(),
        pre.threshold
    );
    for kind in MapKind::TENSOR {
        let unit = if kind.is_strain() {
            "%".to_string()
        } else {
            result.strain.rotation_unit.to_string()
        };
        match FiniteStats::of(result.map(kind)) {
            Some(s) => println!(
                "{:<12} mean {:>9.4} std {:>9.4} min {:>9.4} max {:>9.4} [{}]",
                kind.name(),
                s.mean,
                s.std,
                s.min,
                s.max,
                unit
            ),
            None => println!("{:<12} no material pixels", kind.name()),
        }
    }

    std::fs::create_dir_all(out)?;
    save_results_npz(&result, &out.join("results.npz"))?;
    if png {
        export_all(pre.smoothed.view(), &result, settings, out)?;
    }
    Ok(())
}

fn run_spectrum(image_path: &Path, out: &Path, sigma: f64) -> Result<(), Box<dyn Error>> {
    let image = load_image(image_path)?;
    let pre = preprocess(image.view(), 0.0, sigma)?;
    let spectrum = log_magnitude(forward_transform(pre.smoothed.view()).view());
    save_heatmap_png(spectrum.view(), Colormap::Gray, None, out)?;
    let (rows, cols) = spectrum.dim();
    println!(
        "spectrum written to {}, zero frequency at row {}, col {}",
        out.display(),
        rows / 2,
        cols / 2
    );
    Ok(())
}

fn run_profile(
    results: &Path,
    kind: MapKind,
    from: (f64, f64),
    to: (f64, f64),
    thickness: usize,
) -> Result<(), Box<dyn Error>> {
    let field = load_map(results, kind)?;
    let profile = line_profile(field.view(), from, to, thickness)?;
    let n = sample_count(from, to);
    let length = (to.0 - from.0).hypot(to.1 - from.1);
    let step = if n > 1 { length / (n - 1) as f64 } else { 0.0 };
    println!("# distance_px {}", kind.name());
    for (i, value) in profile.iter().enumerate() {
        println!("{:.3} {:.6}", i as f64 * step, value);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
    tracing::debug!(
        "gpa-strain {} ({} on {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("GIT_BRANCH")
    );

    let mut settings = load_settings();
    if let Commands::Analyze {
        settings: overrides,
        ..
    } = &cli.command
    {
        overrides.apply_to(&mut settings);
    }
    if let Commands::Spectrum {
        preprocess_sigma: Some(sigma),
        ..
    } = &cli.command
    {
        settings.preprocess_sigma = *sigma;
    }
    if cli.save_defaults {
        settings.save(&APP_INFO, PREFS_KEY)?;
        tracing::info!("saved settings as defaults");
    }

    match &cli.command {
        Commands::Analyze {
            image, out, png, ..
        } => run_analyze(image, out, *png, &settings),
        Commands::Spectrum { image, out, .. } => {
            run_spectrum(image, out, settings.preprocess_sigma)
        }
        Commands::Profile {
            results,
            map,
            from,
            to,
            thickness,
        } => run_profile(results, *map, *from, *to, *thickness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpa_strain::config::SpotSpec;

    #[test]
    fn test_parse_point_and_region() {
        assert_eq!(parse_point("12, 40.5"), Ok((12.0, 40.5)));
        assert!(parse_point("1,2,3").is_err());
        assert!(parse_point("a,2").is_err());
        assert_eq!(
            parse_region("60,10,0,50"),
            Ok(ReferenceRegion::new(10, 60, 0, 50))
        );
        assert!(parse_region("0,10,-1,5").is_err());
    }

    #[test]
    fn test_overrides_touch_only_given_fields() {
        let mut settings = GpaSettings::new();
        let args = SettingsArgs {
            spot1: Some((10.0, 20.0)),
            outer_radius: Some(25.0),
            radians: true,
            ..SettingsArgs::default()
        };
        args.apply_to(&mut settings);
        assert_eq!(settings.analysis.spot1.center, (10.0, 20.0));
        assert_eq!(settings.analysis.spot2.center, SpotSpec::default().center);
        assert_eq!(settings.analysis.spot1.outer_radius, 25.0);
        assert_eq!(settings.analysis.spot2.outer_radius, 25.0);
        assert_eq!(settings.analysis.spot1.inner_radius, 10.0);
        assert_eq!(settings.analysis.rotation_unit, RotationUnit::Radians);
        assert_eq!(settings.threshold_percent, 0.0);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
