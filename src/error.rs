//! Error type shared by every analysis stage.
//!
//! Validation happens before any transform is computed, so a failed call never leaves partial results
//! behind. Near-collinear reciprocal vectors are not an error: the displacement solve uses a
//! pseudo-inverse and reports the conditioning through [`crate::data_container::ReciprocalBasis`].

use crate::config::ReferenceRegion;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpaError {
    /// A scalar parameter is outside its valid domain (mask radii, sigma, percentile, spot center, ...).
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// The reference rectangle is empty, inverted or does not overlap the image.
    #[error("invalid reference region {region}: {reason}")]
    InvalidRegion {
        region: ReferenceRegion,
        reason: &'static str,
    },

    /// Two arrays that must share a shape do not.
    #[error("shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl GpaError {
    pub(crate) fn parameter(
        name: &'static str,
        value: impl std::fmt::Display,
        reason: &'static str,
    ) -> Self {
        GpaError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Checks that a smoothing sigma is usable by [`crate::math_tools::gaussian_filter`].
pub(crate) fn check_sigma(name: &'static str, sigma: f64) -> Result<(), GpaError> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(GpaError::parameter(name, sigma, "must be finite and >= 0"));
    }
    Ok(())
}

/// Checks that `found` has the same dimensions as `expected`.
pub(crate) fn check_shape(
    what: &'static str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<(), GpaError> {
    if expected != found {
        return Err(GpaError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}
