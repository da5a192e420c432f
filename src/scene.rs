//! In-memory structure from motion scene: camera intrinsics, views, poses and landmarks.

use cgmath::prelude::*;
use cgmath::{Matrix3, Point2, Point3, Vector3};

use std::collections::BTreeMap;
use std::path::Path;

use crate::{Error, Result};

/// Camera model of an intrinsic along with its model specific coefficients.
#[derive(Debug, Clone, PartialEq)]
pub enum IntrinsicModel {
    /// No distortion.
    Pinhole,
    /// One radial distortion coefficient.
    PinholeRadial1 { k1: f64 },
    /// Three radial distortion coefficients.
    PinholeRadial3 { k1: f64, k2: f64, k3: f64 },
    /// Equidistant fisheye with four coefficients.
    PinholeFisheye { k1: f64, k2: f64, k3: f64, k4: f64 },
    /// Any model we only know by name (brown, spherical, ...).
    Other(String),
}

impl IntrinsicModel {
    /// Name of the model as it appears in an sfm_data file.
    pub fn name(&self) -> &str {
        match self {
            IntrinsicModel::Pinhole => "pinhole",
            IntrinsicModel::PinholeRadial1 { .. } => "pinhole_radial_k1",
            IntrinsicModel::PinholeRadial3 { .. } => "pinhole_radial_k3",
            IntrinsicModel::PinholeFisheye { .. } => "fisheye",
            IntrinsicModel::Other(name) => name,
        }
    }
}

/// Internal calibration of a camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Intrinsic {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub focal: f64,
    pub principal_point: Point2<f64>,
    pub model: IntrinsicModel,
}

/// World to camera transform `x_cam = R * x_world + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    /// Build a pose from a rotation and the camera center in world coordinates.
    pub fn from_center(rotation: Matrix3<f64>, center: Point3<f64>) -> Self {
        Pose {
            rotation,
            translation: -(rotation * center.to_vec()),
        }
    }

    /// Center of the camera in world coordinates, `-R^T t`.
    pub fn center(&self) -> Point3<f64> {
        Point3::from_vec(-(self.rotation.transpose() * self.translation))
    }
}

/// One captured image.
///
/// The view id doubles as the capture timestamp in the exported records.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub id: u32,
    pub intrinsic_id: u32,
    pub pose_id: Option<u32>,
    /// Image path relative to the scene root path.
    pub image_path: String,
}

/// Sighting of a landmark in a view, in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub view_id: u32,
    pub pixel: Point2<f64>,
}

/// A triangulated 3D point and the views that observe it.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub position: Point3<f64>,
    pub observations: Vec<Observation>,
}

/// A complete reconstruction. All collections are ordered by id so iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Prefix prepended verbatim to every image path.
    pub root_path: String,
    pub intrinsics: BTreeMap<u32, Intrinsic>,
    pub views: BTreeMap<u32, View>,
    pub poses: BTreeMap<u32, Pose>,
    pub landmarks: BTreeMap<u32, Landmark>,
}

impl Scene {
    /// Load a scene from an OpenMVG `sfm_data.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        crate::sfm_data::from_file(path)
    }

    pub fn num_intrinsics(&self) -> usize {
        self.intrinsics.len()
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    /// Number of views with a pose that exists in the scene.
    pub fn num_posed_views(&self) -> usize {
        self.views.values().filter(|v| self.pose_of(v).is_some()).count()
    }

    /// Intrinsic a view was captured with.
    pub fn intrinsic_of(&self, view: &View) -> Result<&Intrinsic> {
        self.intrinsics
            .get(&view.intrinsic_id)
            .ok_or(Error::DanglingIntrinsicReference {
                view_id: view.id,
                intrinsic_id: view.intrinsic_id,
            })
    }

    /// Pose of a view. `None` when the view was not localized or its pose id is unknown.
    pub fn pose_of(&self, view: &View) -> Option<&Pose> {
        view.pose_id.and_then(|id| self.poses.get(&id))
    }

    /// Full path of a view's image: the root path and the image path concatenated as is.
    pub fn image_path(&self, view: &View) -> String {
        format!("{}{}", self.root_path, view.image_path)
    }

    /// Check that every view references an existing intrinsic.
    pub fn validate(&self) -> Result<()> {
        for view in self.views.values() {
            self.intrinsic_of(view)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scene with {} intrinsics, {} views ({} posed), and {} landmarks",
            self.num_intrinsics(),
            self.num_views(),
            self.num_posed_views(),
            self.num_landmarks()
        )
    }
}

#[cfg(test)]
pub(crate) fn test_scene() -> Scene {
    let mut scene = Scene {
        root_path: "/data/".to_string(),
        ..Scene::default()
    };
    scene.intrinsics.insert(
        0,
        Intrinsic {
            id: 0,
            width: 1920,
            height: 1080,
            focal: 1000.0,
            principal_point: Point2::new(960.0, 540.0),
            model: IntrinsicModel::Pinhole,
        },
    );
    scene.poses.insert(
        0,
        Pose {
            rotation: Matrix3::identity(),
            translation: Vector3::new(1.0, 2.0, 3.0),
        },
    );
    for (id, pose_id) in [(3, Some(0)), (7, None), (9, Some(42))].iter() {
        scene.views.insert(
            *id,
            View {
                id: *id,
                intrinsic_id: 0,
                pose_id: *pose_id,
                image_path: format!("images/{}.jpg", id),
            },
        );
    }
    scene
}

#[test]
fn test_pose_of_requires_existing_pose() {
    let scene = test_scene();
    assert!(scene.pose_of(&scene.views[&3]).is_some());
    assert!(scene.pose_of(&scene.views[&7]).is_none());
    assert!(scene.pose_of(&scene.views[&9]).is_none());
    assert_eq!(scene.num_posed_views(), 1);
}

#[test]
fn test_image_path_is_concatenated() {
    let scene = test_scene();
    assert_eq!(scene.image_path(&scene.views[&7]), "/data/images/7.jpg");
}

#[test]
fn test_validate_dangling_intrinsic() {
    let mut scene = test_scene();
    assert!(scene.validate().is_ok());
    scene.views.get_mut(&7).unwrap().intrinsic_id = 5;
    match scene.validate() {
        Err(Error::DanglingIntrinsicReference {
            view_id,
            intrinsic_id,
        }) => {
            assert_eq!(view_id, 7);
            assert_eq!(intrinsic_id, 5);
        }
        x => panic!("unexpected result {:?}", x),
    }
    assert_eq!(
        scene.validate().unwrap_err().to_string(),
        "validation: view 7 references missing intrinsic 5"
    );
}

#[test]
fn test_pose_center_round_trip() {
    use cgmath::AbsDiffEq;
    let rotation = Matrix3::from_angle_y(cgmath::Deg(30.0));
    let center = Point3::new(1.0, -2.0, 0.5);
    let pose = Pose::from_center(rotation, center);
    assert!(pose.center().abs_diff_eq(&center, 1e-12));
}
