//! Analysis parameters and the persisted settings container.
//!
//! Colormap, smoothing and rotation units are explicit fields here and are handed to the pipeline on
//! every call.

use crate::error::GpaError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One selected Bragg spot together with its soft mask radii.
///
/// `center` is given as `(row, col)` in spectrum pixel coordinates (zero frequency at `(H / 2, W / 2)`).
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
pub struct SpotSpec {
    pub center: (f64, f64),
    pub inner_radius: f64,
    pub outer_radius: f64,
}

impl SpotSpec {
    pub fn new(center: (f64, f64), inner_radius: f64, outer_radius: f64) -> Self {
        SpotSpec {
            center,
            inner_radius,
            outer_radius,
        }
    }

    /// Validates the radii and checks that the center lies on the spectrum of the given `(rows, cols)` shape.
    pub fn validate(&self, shape: (usize, usize)) -> Result<(), GpaError> {
        validate_radii(self.inner_radius, self.outer_radius)?;
        let (row, col) = self.center;
        if !row.is_finite() || row < 0.0 || row > shape.0.saturating_sub(1) as f64 {
            return Err(GpaError::parameter(
                "spot center row",
                row,
                "must lie inside the spectrum",
            ));
        }
        if !col.is_finite() || col < 0.0 || col > shape.1.saturating_sub(1) as f64 {
            return Err(GpaError::parameter(
                "spot center col",
                col,
                "must lie inside the spectrum",
            ));
        }
        Ok(())
    }
}

impl Default for SpotSpec {
    fn default() -> Self {
        SpotSpec::new((0.0, 0.0), 10.0, 20.0)
    }
}

pub(crate) fn validate_radii(inner_radius: f64, outer_radius: f64) -> Result<(), GpaError> {
    if !inner_radius.is_finite() || inner_radius <= 0.0 {
        return Err(GpaError::parameter(
            "inner_radius",
            inner_radius,
            "must be finite and > 0",
        ));
    }
    if !outer_radius.is_finite() || outer_radius <= inner_radius {
        return Err(GpaError::parameter(
            "outer_radius",
            outer_radius,
            "must be finite and > inner_radius",
        ));
    }
    Ok(())
}

/// Half-open pixel rectangle `[row_start, row_end) x [col_start, col_end)` assumed free of strain.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub struct ReferenceRegion {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl ReferenceRegion {
    pub fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        ReferenceRegion {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// Builds a region from two opposite corners given in any order, each as `(row, col)`.
    pub fn from_corners(a: (usize, usize), b: (usize, usize)) -> Self {
        ReferenceRegion::new(a.0.min(b.0), a.0.max(b.0), a.1.min(b.1), a.1.max(b.1))
    }

    /// Region covering the whole `(rows, cols)` image minus `border` pixels on every side.
    pub fn inset(shape: (usize, usize), border: usize) -> Self {
        ReferenceRegion::new(
            border,
            shape.0.saturating_sub(border),
            border,
            shape.1.saturating_sub(border),
        )
    }

    /// Intersection of the region with an image of shape `(rows, cols)`.
    ///
    /// Fails when the rectangle itself is empty or when nothing of it overlaps the image.
    pub fn clip_to(&self, shape: (usize, usize)) -> Result<ReferenceRegion, GpaError> {
        if self.row_end <= self.row_start || self.col_end <= self.col_start {
            return Err(GpaError::InvalidRegion {
                region: *self,
                reason: "end must be greater than start on both axes",
            });
        }
        let clipped = ReferenceRegion::new(
            self.row_start,
            self.row_end.min(shape.0),
            self.col_start,
            self.col_end.min(shape.1),
        );
        if clipped.row_end <= clipped.row_start || clipped.col_end <= clipped.col_start {
            return Err(GpaError::InvalidRegion {
                region: *self,
                reason: "does not overlap the image",
            });
        }
        Ok(clipped)
    }

    pub fn area(&self) -> usize {
        self.row_end.saturating_sub(self.row_start) * self.col_end.saturating_sub(self.col_start)
    }
}

impl Default for ReferenceRegion {
    fn default() -> Self {
        ReferenceRegion::new(0, 50, 0, 50)
    }
}

impl Display for ReferenceRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows {}..{}, cols {}..{}",
            self.row_start, self.row_end, self.col_start, self.col_end
        )
    }
}

/// Unit of the rotation map. Strain maps are always reported in percent.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum RotationUnit {
    #[default]
    Degrees,
    Radians,
}

impl Display for RotationUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationUnit::Degrees => write!(f, "deg"),
            RotationUnit::Radians => write!(f, "rad"),
        }
    }
}

/// Colormap used when rendering maps to images.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum Colormap {
    #[default]
    Jet,
    Gray,
}

impl Display for Colormap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Colormap::Jet => write!(f, "Jet"),
            Colormap::Gray => write!(f, "Gray"),
        }
    }
}

impl FromStr for Colormap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jet" => Ok(Colormap::Jet),
            "gray" | "grey" => Ok(Colormap::Gray),
            _ => Err(format!("unknown colormap `{s}`, expected `jet` or `gray`")),
        }
    }
}

/// Everything [`crate::pipeline::analyze`] needs besides the image and the material mask.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct AnalysisParams {
    pub spot1: SpotSpec,
    pub spot2: SpotSpec,
    pub reference: ReferenceRegion,
    /// Gaussian sigma applied to each strain/rotation map.
    pub smooth_sigma: f64,
    pub rotation_unit: RotationUnit,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        AnalysisParams {
            spot1: SpotSpec::default(),
            spot2: SpotSpec::default(),
            reference: ReferenceRegion::default(),
            smooth_sigma: 0.0,
            rotation_unit: RotationUnit::Degrees,
        }
    }
}

/// The full, persisted settings of one analysis session.
///
/// Stored with the `preferences` crate between runs of the command line tool.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct GpaSettings {
    pub analysis: AnalysisParams,
    /// Percentile (0..=100) of the smoothed image used as material threshold.
    pub threshold_percent: f64,
    /// Gaussian sigma applied to the raw image before thresholding and transforming.
    pub preprocess_sigma: f64,
    pub colormap: Colormap,
    pub strain_range: [f64; 2],
    pub rotation_range: [f64; 2],
}

impl GpaSettings {
    pub fn new() -> GpaSettings {
        GpaSettings {
            analysis: AnalysisParams::default(),
            threshold_percent: 0.0,
            preprocess_sigma: 0.0,
            colormap: Colormap::Jet,
            strain_range: [-5.0, 5.0],
            rotation_range: [-5.0, 5.0],
        }
    }
}

impl Default for GpaSettings {
    fn default() -> Self {
        GpaSettings::new()
    }
}
