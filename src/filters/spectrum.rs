//! Two-dimensional Fourier transforms of images and the centering shifts.
//!
//! The forward transform is unnormalized, the inverse is scaled by `1 / (rows * cols)`. Both run the
//! row pass and the column pass in parallel over lanes.

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

fn process_lane(fft: &Arc<dyn Fft<f64>>, mut lane: ArrayViewMut1<Complex64>) {
    match lane.as_slice_mut() {
        Some(slice) => fft.process(slice),
        None => {
            let mut buffer = lane.to_vec();
            fft.process(&mut buffer);
            lane.assign(&ArrayView1::from(&buffer));
        }
    }
}

fn transform(mut data: Array2<Complex64>, inverse: bool) -> Array2<Complex64> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return data;
    }
    let mut planner = FftPlanner::<f64>::new();
    let (fft_rows, fft_cols) = if inverse {
        (planner.plan_fft_inverse(cols), planner.plan_fft_inverse(rows))
    } else {
        (planner.plan_fft_forward(cols), planner.plan_fft_forward(rows))
    };

    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|row| process_lane(&fft_rows, row));

    // columns are transformed as contiguous rows of the transposed copy
    let mut transposed = data.t().as_standard_layout().to_owned();
    transposed
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|col| process_lane(&fft_cols, col));

    transposed.reversed_axes().as_standard_layout().to_owned()
}

/// Unshifted, unnormalized forward DFT of a real image.
pub fn fft2(image: ArrayView2<f64>) -> Array2<Complex64> {
    transform(image.mapv(|v| Complex64::new(v, 0.0)), false)
}

/// Inverse DFT, normalized so that `ifft2(fft2(x)) == x`.
pub fn ifft2(spectrum: Array2<Complex64>) -> Array2<Complex64> {
    let (rows, cols) = spectrum.dim();
    let scale = 1.0 / (rows * cols).max(1) as f64;
    let mut out = transform(spectrum, true);
    out.mapv_inplace(|c| c * scale);
    out
}

fn roll<T: Clone>(data: ArrayView2<T>, shift_rows: usize, shift_cols: usize) -> Array2<T> {
    let (rows, cols) = data.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        data[[(r + rows - shift_rows) % rows, (c + cols - shift_cols) % cols]].clone()
    })
}

/// Moves the zero-frequency sample to `(rows / 2, cols / 2)`.
pub fn fftshift<T: Clone>(data: ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    roll(data, rows / 2, cols / 2)
}

/// Inverse of [`fftshift`], also for odd sizes.
pub fn ifftshift<T: Clone>(data: ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    roll(data, rows - rows / 2, cols - cols / 2)
}

/// Forward transform with the zero frequency moved to the array center.
pub fn forward_transform(image: ArrayView2<f64>) -> Array2<Complex64> {
    fftshift(fft2(image).view())
}

/// Un-centers a (masked) spectrum and transforms it back to the image domain.
pub fn inverse_transform(centered: ArrayView2<Complex64>) -> Array2<Complex64> {
    ifft2(ifftshift(centered))
}

pub fn magnitude(spectrum: ArrayView2<Complex64>) -> Array2<f64> {
    spectrum.mapv(|c| c.norm())
}

/// `ln(|F| + 1)`, the usual display scaling of a diffractogram.
pub fn log_magnitude(spectrum: ArrayView2<Complex64>) -> Array2<f64> {
    spectrum.mapv(|c| c.norm().ln_1p())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::PI;

    #[test]
    fn test_fftshift_moves_origin_to_center() {
        let data = Array2::from_shape_fn((5, 4), |(r, c)| (r * 4 + c) as f64);
        let shifted = fftshift(data.view());
        assert_eq!(shifted[[2, 2]], data[[0, 0]]);
        assert_eq!(ifftshift(shifted.view()), data);

        let even = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f64);
        assert_eq!(fftshift(even.view())[[2, 3]], 0.0);
        assert_eq!(ifftshift(fftshift(even.view()).view()), even);
    }

    #[test]
    fn test_constant_image_has_single_centered_peak() {
        let image = Array2::from_elem((6, 8), 1.0);
        let spectrum = forward_transform(image.view());
        assert_abs_diff_eq!(spectrum[[3, 4]].re, 48.0, epsilon = 1e-9);
        let off_peak: f64 = magnitude(spectrum.view()).sum() - 48.0;
        assert_abs_diff_eq!(off_peak, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cosine_peaks_at_its_frequency() {
        let (rows, cols) = (16, 32);
        let image = Array2::from_shape_fn((rows, cols), |(_, c)| {
            (2.0 * PI * 4.0 * c as f64 / cols as f64).cos()
        });
        let spectrum = magnitude(forward_transform(image.view()).view());
        let center = (rows / 2, cols / 2);
        assert_abs_diff_eq!(spectrum[[center.0, center.1 + 4]], 256.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spectrum[[center.0, center.1 - 4]], 256.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spectrum[[center.0, center.1]], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_restores_image() {
        let image = array![
            [1.0, 2.0, 0.5],
            [-3.0, 4.0, 2.5],
            [0.0, 1.5, -1.0],
            [2.0, 0.25, 3.0],
            [1.0, -2.0, 0.75]
        ];
        let restored = inverse_transform(forward_transform(image.view()).view());
        for (a, b) in restored.iter().zip(image.iter()) {
            assert_abs_diff_eq!(a.re, *b, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_magnitude() {
        let spectrum = array![[Complex64::new(3.0, 4.0), Complex64::new(0.0, 0.0)]];
        let log = log_magnitude(spectrum.view());
        assert_abs_diff_eq!(log[[0, 0]], 6.0_f64.ln(), epsilon = 1e-12);
        assert_eq!(log[[0, 1]], 0.0);
    }
}
