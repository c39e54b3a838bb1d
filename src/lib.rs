//! Geometric phase analysis (GPA) of lattice images.
//!
//! Two Bragg spots are isolated in the Fourier spectrum of an image, their geometric phases are unwrapped
//! and combined into a displacement field, and the displacement gradient is split into strain (percent)
//! and rotation maps.
//!
//! ```no_run
//! use gpa_strain::config::{GpaSettings, SpotSpec};
//! use gpa_strain::pipeline::apply;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = gpa_strain::io::load_image("haadf.npy".as_ref())?;
//! let mut settings = GpaSettings::default();
//! settings.analysis.spot1 = SpotSpec::new((256.0, 300.0), 10.0, 20.0);
//! settings.analysis.spot2 = SpotSpec::new((300.0, 256.0), 10.0, 20.0);
//! let (_, result) = apply(image.view(), &settings)?;
//! println!("condition number {}", result.basis.condition_number());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data_container;
pub mod displacement;
pub mod error;
pub mod filters;
pub mod io;
pub mod math_tools;
pub mod pipeline;
pub mod profile;
pub mod strain;

pub use config::{AnalysisParams, GpaSettings, ReferenceRegion, RotationUnit, SpotSpec};
pub use data_container::{GpaResult, MapKind};
pub use error::GpaError;
pub use pipeline::{analyze, apply};
