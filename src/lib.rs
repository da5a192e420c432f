//! Export an OpenMVG structure from motion reconstruction to the kapture text format.
//!
//! Example usage:
//! ```no_run
//! use sfm2kapture::*;
//! use std::path::Path;
//!
//! let scene = Scene::from_file(Path::new("sfm_data.json")).expect("Could not load scene");
//! let colorizer = UniformColorizer::default();
//! let summary = export_to_kapture(
//!     &scene,
//!     Path::new("kapture"),
//!     &colorizer,
//!     &ExportOptions::default(),
//! )
//! .expect("Export failed");
//! println!("{}", summary);
//! ```
//!
//! The exported directory looks like:
//! ```txt
//! <outdir>/sensors/sensors.txt
//! <outdir>/sensors/records_camera.txt
//! <outdir>/sensors/trajectories.txt
//! <outdir>/reconstruction/points3d.txt
//! ```

extern crate cgmath;
extern crate image;
extern crate indicatif;
extern crate itertools;
extern crate log;
extern crate nom;
extern crate ply_rs;
extern crate serde;
extern crate serde_json;
extern crate thiserror;

pub mod camera;
pub mod colorize;
pub mod export;
pub mod format;
pub mod kapture;
pub mod pose;
pub mod preview;
pub mod scene;
pub mod sfm_data;

pub use camera::*;
pub use colorize::*;
pub use export::*;
pub use format::*;
pub use pose::*;
pub use scene::*;

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop an export.
#[derive(Debug, Error)]
pub enum Error {
    /// A camera uses an intrinsic model with no kapture equivalent.
    #[error("sensors: camera {camera_id} uses unsupported camera model `{model}`")]
    UnsupportedCameraModel { camera_id: u32, model: String },

    /// A view refers to an intrinsic that is not part of the scene.
    #[error("validation: view {view_id} references missing intrinsic {intrinsic_id}")]
    DanglingIntrinsicReference { view_id: u32, intrinsic_id: u32 },

    #[error("cannot write file {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot access output directory {}: {source}", path.display())]
    DirectoryAccess {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("points: colorization failed: {0}")]
    Colorization(String),

    #[error("cannot read {}: {source}", path.display())]
    Load {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
