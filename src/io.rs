use crate::config::{Colormap, GpaSettings};
use crate::data_container::{GpaResult, MapKind};
use crate::math_tools::{gray_colormap, jet_colormap, FiniteStats};
use image::RgbaImage;
use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpyExt};
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Reduces a loaded array to a single 2D image: ranks above 3 are averaged over their last axis, a 3D
/// stack is then summed over its first axis.
fn reduce_to_2d(mut data: ArrayD<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
    if data.ndim() < 2 {
        return Err(format!("expected an image with at least 2 dimensions, found {}", data.ndim()).into());
    }
    while data.ndim() > 3 {
        let last = Axis(data.ndim() - 1);
        data = data.mean_axis(last).ok_or("cannot average over an empty axis")?;
    }
    if data.ndim() == 3 {
        data = data.sum_axis(Axis(0));
    }
    Ok(data.into_dimensionality::<Ix2>()?)
}

fn read_npy_any(path: &Path) -> Result<ArrayD<f64>, Box<dyn Error>> {
    match ArrayD::<f64>::read_npy(File::open(path)?) {
        Ok(data) => Ok(data),
        Err(_) => {
            let data = ArrayD::<f32>::read_npy(File::open(path)?)?;
            Ok(data.mapv(f64::from))
        }
    }
}

/// Name of the entry called `wanted` (with or without `.npy` suffix) in an npz archive.
fn find_entry(npz: &mut NpzReader<File>, wanted: &str) -> Result<Option<String>, Box<dyn Error>> {
    Ok(npz
        .names()?
        .into_iter()
        .find(|name| name.trim_end_matches(".npy") == wanted))
}

fn read_npz_image(path: &Path) -> Result<ArrayD<f64>, Box<dyn Error>> {
    let mut npz = NpzReader::new(File::open(path)?)?;
    let name = match find_entry(&mut npz, "image")? {
        Some(name) => name,
        None => npz
            .names()?
            .into_iter()
            .next()
            .ok_or_else(|| format!("{} contains no arrays", path.display()))?,
    };
    log::debug!("reading array `{}` from {}", name, path.display());
    match npz.by_name::<OwnedRepr<f64>, IxDyn>(&name) {
        Ok(data) => Ok(data),
        Err(_) => Ok(npz.by_name::<OwnedRepr<f32>, IxDyn>(&name)?.mapv(f64::from)),
    }
}

/// Loads an image as a 2D array of intensities.
///
/// `.npy` and `.npz` files may hold `f64` or `f32` data of any rank >= 2; every other extension is
/// decoded with the `image` crate and converted to luminance in `[0, 1]`.
pub fn load_image(path: &Path) -> Result<Array2<f64>, Box<dyn Error>> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let image = match extension.as_str() {
        "npy" => reduce_to_2d(read_npy_any(path)?)?,
        "npz" => reduce_to_2d(read_npz_image(path)?)?,
        _ => {
            let luma = image::open(path)?.to_luma32f();
            let (width, height) = luma.dimensions();
            let data: Vec<f64> = luma.into_raw().into_iter().map(f64::from).collect();
            Array2::from_shape_vec((height as usize, width as usize), data)?
        }
    };
    log::info!(
        "opened {:?} ({}x{})",
        path,
        image.nrows(),
        image.ncols()
    );
    Ok(image)
}

/// Writes every real map of `result`, the magnitudes of both complex images and the reciprocal vectors
/// (`[g1x, g1y, g2x, g2y]` under `g_vectors`) into one `.npz` archive.
pub fn save_results_npz(result: &GpaResult, path: &Path) -> Result<(), Box<dyn Error>> {
    let mut npz = NpzWriter::new(File::create(path)?);
    for kind in MapKind::ALL {
        npz.add_array(kind.name(), &result.map(kind))?;
    }
    npz.add_array(
        "complex_image1_magnitude",
        &result.spot1.complex_image.mapv(|c| c.norm()),
    )?;
    npz.add_array(
        "complex_image2_magnitude",
        &result.spot2.complex_image.mapv(|c| c.norm()),
    )?;
    let g = &result.basis;
    npz.add_array(
        "g_vectors",
        &ndarray::arr1(&[g.g1.gx, g.g1.gy, g.g2.gx, g.g2.gy]),
    )?;
    npz.finish()?;
    log::info!("saved results to {:?}", path);
    Ok(())
}

/// Reads one map back from an archive written by [`save_results_npz`].
pub fn load_map(path: &Path, kind: MapKind) -> Result<Array2<f64>, Box<dyn Error>> {
    let mut npz = NpzReader::new(File::open(path)?)?;
    let name = find_entry(&mut npz, kind.name())?
        .ok_or_else(|| format!("{} has no map named `{}`", path.display(), kind))?;
    Ok(npz.by_name::<OwnedRepr<f64>, Ix2>(&name)?)
}

/// Renders `field` with `colormap` into an RGBA PNG.
///
/// Values are scaled linearly from `range` (or the finite min/max when `None`) and clamped; NaN pixels
/// are fully transparent.
pub fn save_heatmap_png(
    field: ArrayView2<f64>,
    colormap: Colormap,
    range: Option<[f64; 2]>,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let (height, width) = field.dim();
    let [low, high] = match range {
        Some(range) => range,
        None => FiniteStats::of(field)
            .map(|stats| [stats.min, stats.max])
            .unwrap_or([0.0, 1.0]),
    };
    let span = if high > low { high - low } else { 1.0 };
    let color = match colormap {
        Colormap::Jet => jet_colormap,
        Colormap::Gray => gray_colormap,
    };

    let mut raw = Vec::with_capacity(width * height * 4);
    for v in field.iter() {
        if v.is_nan() {
            raw.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            let [r, g, b] = color((v - low) / span);
            raw.extend_from_slice(&[r, g, b, 255]);
        }
    }
    let img = RgbaImage::from_raw(width as u32, height as u32, raw)
        .ok_or("pixel buffer does not match the image dimensions")?;
    img.save(path)?;
    Ok(())
}

/// Writes the standard image set of one analysis into `dir` and returns the written paths.
pub fn export_all(
    image: ArrayView2<f64>,
    result: &GpaResult,
    settings: &GpaSettings,
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let magnitude1 = result.spot1.complex_image.mapv(|c| c.norm());
    let magnitude2 = result.spot2.complex_image.mapv(|c| c.norm());
    let strain = Some(settings.strain_range);
    let rotation = Some(settings.rotation_range);
    let cmap = settings.colormap;

    let maps: [(&str, ArrayView2<f64>, Colormap, Option<[f64; 2]>); 12] = [
        ("01_original.png", image.view(), Colormap::Gray, None),
        (
            "02_fft_log_magnitude.png",
            result.map(MapKind::FftLogMagnitude),
            Colormap::Gray,
            None,
        ),
        ("03_raw_phase_1.png", result.map(MapKind::RawPhase1), Colormap::Gray, None),
        ("04_raw_phase_2.png", result.map(MapKind::RawPhase2), Colormap::Gray, None),
        ("05_phase_1.png", result.map(MapKind::Phase1), cmap, None),
        ("06_phase_2.png", result.map(MapKind::Phase2), cmap, None),
        ("07_strain_xx_percent.png", result.map(MapKind::StrainXX), cmap, strain),
        ("08_strain_yy_percent.png", result.map(MapKind::StrainYY), cmap, strain),
        ("09_strain_xy_percent.png", result.map(MapKind::StrainXY), cmap, strain),
        ("10_rotation_xy.png", result.map(MapKind::Rotation), cmap, rotation),
        ("11_complex_image_1_magnitude.png", magnitude1.view(), Colormap::Gray, None),
        ("12_complex_image_2_magnitude.png", magnitude2.view(), Colormap::Gray, None),
    ];

    let mut written = Vec::with_capacity(maps.len());
    for (name, field, colormap, range) in maps {
        let path = dir.join(name);
        save_heatmap_png(field, colormap, range, &path)?;
        written.push(path);
    }
    log::info!("saved {} images in {:?}", written.len(), dir);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisParams, ReferenceRegion, SpotSpec};
    use crate::pipeline::analyze;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};
    use ndarray_npy::WriteNpyExt;

    fn small_result() -> (Array2<f64>, GpaResult) {
        let image = Array2::from_shape_fn((16, 16), |(y, x)| {
            (std::f64::consts::PI * x as f64 / 2.0).cos()
                + (std::f64::consts::PI * y as f64 / 4.0).cos()
        });
        let params = AnalysisParams {
            spot1: SpotSpec::new((8.0, 12.0), 1.0, 3.0),
            spot2: SpotSpec::new((10.0, 8.0), 1.0, 2.0),
            reference: ReferenceRegion::inset((16, 16), 2),
            ..AnalysisParams::default()
        };
        let mask = Array2::from_shape_fn((16, 16), |(y, _)| y > 2);
        let result = analyze(image.view(), mask.view(), &params).unwrap();
        (image, result)
    }

    #[test]
    fn test_reduce_to_2d() {
        let stack = Array3::from_shape_fn((3, 2, 2), |(k, r, c)| (k + r + c) as f64).into_dyn();
        let image = reduce_to_2d(stack).unwrap();
        assert_eq!(image, array![[3.0, 6.0], [6.0, 9.0]]);

        // averaged over the last axis, then summed over the first
        let four = ArrayD::from_elem(IxDyn(&[2, 3, 4, 5]), 2.0);
        assert_eq!(reduce_to_2d(four).unwrap(), Array2::from_elem((3, 4), 4.0));

        assert!(reduce_to_2d(ArrayD::zeros(IxDyn(&[4]))).is_err());
    }

    #[test]
    fn test_load_npy_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.npy");
        let data = array![[1.0_f32, 2.0], [3.0, 4.5]];
        data.write_npy(File::create(&path).unwrap()).unwrap();
        let image = load_image(&path).unwrap();
        assert_eq!(image, array![[1.0, 2.0], [3.0, 4.5]]);
    }

    #[test]
    fn test_load_png_as_luminance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        let field = array![[0.0, 1.0, 0.5], [1.0, 0.0, 0.25]];
        save_heatmap_png(field.view(), Colormap::Gray, Some([0.0, 1.0]), &path).unwrap();
        let image = load_image(&path).unwrap();
        assert_eq!(image.dim(), (2, 3));
        assert_abs_diff_eq!(image[[0, 0]], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(image[[0, 1]], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_results_npz_round_trip() {
        let (_, result) = small_result();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.npz");
        save_results_npz(&result, &path).unwrap();

        let exx = load_map(&path, MapKind::StrainXX).unwrap();
        assert_eq!(exx.dim(), (16, 16));
        for (a, b) in exx.iter().zip(result.strain.exx.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
        let ux = load_map(&path, MapKind::Ux).unwrap();
        assert_eq!(ux, result.displacement.ux);

        // an npz can also be opened as input image
        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.dim(), (16, 16));
    }

    #[test]
    fn test_heatmap_marks_nan_transparent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        let field = array![[f64::NAN, -5.0], [0.0, 5.0]];
        save_heatmap_png(field.view(), Colormap::Jet, Some([-5.0, 5.0]), &path).unwrap();
        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_export_all_writes_every_image() {
        let (image, result) = small_result();
        let dir = tempfile::tempdir().unwrap();
        let written = export_all(image.view(), &result, &GpaSettings::default(), dir.path()).unwrap();
        assert_eq!(written.len(), 12);
        assert!(written.iter().all(|p| p.exists()));
    }
}
