//! Data structures passed between the analysis stages and the result bundle returned by
//! [`crate::pipeline::analyze`].
//!
//! Every field of the bundle is a named member with a static type; there is no string-keyed map.
//! [`MapKind`] only provides the stable names used for export and line scans.

use crate::config::RotationUnit;
use crate::math_tools::pseudo_inverse_2x2;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Condition number above which the reciprocal basis is reported as ill-conditioned.
pub const ILL_CONDITIONED_LIMIT: f64 = 1.0e6;

/// Output of the preprocessing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    pub smoothed: Array2<f64>,
    /// `true` where the smoothed intensity exceeds `threshold`.
    pub material_mask: Array2<bool>,
    pub threshold: f64,
}

/// Reciprocal lattice vector of one spot, in cycles per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReciprocalVector {
    pub gx: f64,
    pub gy: f64,
}

impl ReciprocalVector {
    /// Offset of a spectrum pixel `(row, col)` from the zero-frequency position, normalized by the image
    /// width (x) and height (y).
    pub fn from_spot(center: (f64, f64), shape: (usize, usize)) -> Self {
        let (rows, cols) = shape;
        let cy = (rows / 2) as f64;
        let cx = (cols / 2) as f64;
        ReciprocalVector {
            gx: (center.1 - cx) / cols as f64,
            gy: (center.0 - cy) / rows as f64,
        }
    }

    pub fn norm(&self) -> f64 {
        self.gx.hypot(self.gy)
    }
}

/// The matrix `G = [[g1x, g1y], [g2x, g2y]]` and its pseudo-inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReciprocalBasis {
    pub g1: ReciprocalVector,
    pub g2: ReciprocalVector,
    pub inverse: [[f64; 2]; 2],
    pub singular_values: [f64; 2],
}

impl ReciprocalBasis {
    pub fn new(g1: ReciprocalVector, g2: ReciprocalVector) -> Self {
        let (inverse, singular_values) = pseudo_inverse_2x2([[g1.gx, g1.gy], [g2.gx, g2.gy]]);
        ReciprocalBasis {
            g1,
            g2,
            inverse,
            singular_values,
        }
    }

    /// Ratio of the singular values of `G`; infinite for collinear vectors.
    pub fn condition_number(&self) -> f64 {
        let [s_max, s_min] = self.singular_values;
        if s_min == 0.0 {
            f64::INFINITY
        } else {
            s_max / s_min
        }
    }

    /// Near-collinear spots still produce displacements, but their magnitude is unreliable.
    pub fn is_ill_conditioned(&self) -> bool {
        self.condition_number() > ILL_CONDITIONED_LIMIT
    }
}

/// Everything derived from one Bragg spot.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotPhase {
    pub g: ReciprocalVector,
    /// Inverse transform of the masked spectrum.
    pub complex_image: Array2<Complex64>,
    /// Argument of `complex_image`, in `(-pi, pi]`.
    pub raw_phase: Array2<f64>,
    /// Raw phase with the carrier ramp removed, unwrapped.
    pub phase: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    pub ux: Array2<f64>,
    pub uy: Array2<f64>,
}

/// Strain in percent, rotation in `rotation_unit`; NaN outside the material mask.
#[derive(Debug, Clone, PartialEq)]
pub struct StrainMaps {
    pub exx: Array2<f64>,
    pub eyy: Array2<f64>,
    pub exy: Array2<f64>,
    pub rotation: Array2<f64>,
    pub rotation_unit: RotationUnit,
}

/// Result bundle of one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct GpaResult {
    pub spot1: SpotPhase,
    pub spot2: SpotPhase,
    pub basis: ReciprocalBasis,
    pub displacement: DisplacementField,
    pub strain: StrainMaps,
    /// `ln(|F| + 1)` of the centered spectrum, for display and spot picking.
    pub fft_log_magnitude: Array2<f64>,
}

impl GpaResult {
    pub fn shape(&self) -> (usize, usize) {
        self.displacement.ux.dim()
    }

    pub fn map(&self, kind: MapKind) -> ArrayView2<'_, f64> {
        match kind {
            MapKind::RawPhase1 => self.spot1.raw_phase.view(),
            MapKind::RawPhase2 => self.spot2.raw_phase.view(),
            MapKind::Phase1 => self.spot1.phase.view(),
            MapKind::Phase2 => self.spot2.phase.view(),
            MapKind::Ux => self.displacement.ux.view(),
            MapKind::Uy => self.displacement.uy.view(),
            MapKind::StrainXX => self.strain.exx.view(),
            MapKind::StrainYY => self.strain.eyy.view(),
            MapKind::StrainXY => self.strain.exy.view(),
            MapKind::Rotation => self.strain.rotation.view(),
            MapKind::FftLogMagnitude => self.fft_log_magnitude.view(),
        }
    }
}

/// Names of the real-valued maps of a [`GpaResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    RawPhase1,
    RawPhase2,
    Phase1,
    Phase2,
    Ux,
    Uy,
    StrainXX,
    StrainYY,
    StrainXY,
    Rotation,
    FftLogMagnitude,
}

impl MapKind {
    pub const ALL: [MapKind; 11] = [
        MapKind::RawPhase1,
        MapKind::RawPhase2,
        MapKind::Phase1,
        MapKind::Phase2,
        MapKind::Ux,
        MapKind::Uy,
        MapKind::StrainXX,
        MapKind::StrainYY,
        MapKind::StrainXY,
        MapKind::Rotation,
        MapKind::FftLogMagnitude,
    ];

    /// The four maps offered for line scans.
    pub const TENSOR: [MapKind; 4] = [
        MapKind::StrainXX,
        MapKind::StrainYY,
        MapKind::StrainXY,
        MapKind::Rotation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MapKind::RawPhase1 => "raw_phase_image1",
            MapKind::RawPhase2 => "raw_phase_image2",
            MapKind::Phase1 => "phase_image1",
            MapKind::Phase2 => "phase_image2",
            MapKind::Ux => "u1",
            MapKind::Uy => "u2",
            MapKind::StrainXX => "strain_xx",
            MapKind::StrainYY => "strain_yy",
            MapKind::StrainXY => "strain_xy",
            MapKind::Rotation => "rotation_xy",
            MapKind::FftLogMagnitude => "fft_log_magnitude",
        }
    }

    pub fn is_strain(&self) -> bool {
        matches!(
            self,
            MapKind::StrainXX | MapKind::StrainYY | MapKind::StrainXY
        )
    }
}

impl Display for MapKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for MapKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MapKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = MapKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown map `{s}`, expected one of: {}", names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_reciprocal_vector_from_spot() {
        let g = ReciprocalVector::from_spot((32.0, 40.0), (64, 64));
        assert_abs_diff_eq!(g.gx, 8.0 / 64.0);
        assert_abs_diff_eq!(g.gy, 0.0);

        // odd sizes: zero frequency sits at n / 2 (integer division)
        let g = ReciprocalVector::from_spot((2.0, 3.0), (5, 7));
        assert_abs_diff_eq!(g.gx, 0.0);
        assert_abs_diff_eq!(g.gy, 0.0);
    }

    #[test]
    fn test_basis_conditioning() {
        let g1 = ReciprocalVector { gx: 0.125, gy: 0.0 };
        let g2 = ReciprocalVector { gx: 0.0, gy: 0.125 };
        let basis = ReciprocalBasis::new(g1, g2);
        assert_abs_diff_eq!(basis.condition_number(), 1.0, epsilon = 1e-12);
        assert!(!basis.is_ill_conditioned());
        assert_abs_diff_eq!(basis.inverse[0][0], 8.0, epsilon = 1e-12);

        let parallel = ReciprocalBasis::new(g1, ReciprocalVector { gx: 0.25, gy: 0.0 });
        assert!(parallel.condition_number().is_infinite());
        assert!(parallel.is_ill_conditioned());
    }

    #[test]
    fn test_map_names_round_trip() {
        for kind in MapKind::ALL {
            assert_eq!(kind.name().parse::<MapKind>(), Ok(kind));
        }
        assert!("strain_zz".parse::<MapKind>().is_err());
        assert!(MapKind::StrainXY.is_strain());
        assert!(!MapKind::Rotation.is_strain());
    }
}
