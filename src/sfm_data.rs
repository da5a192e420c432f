//! Loader for OpenMVG `sfm_data.json` reconstructions.
//!
//! The file is a cereal JSON archive. Views and intrinsics are stored behind polymorphic shared
//! pointers:
//! ```txt
//! {
//!   "root_path": "/data/images/",
//!   "views": [{"key": 0, "value": {"polymorphic_id": 1073741824, "ptr_wrapper": {
//!       "id": 2147483649, "data": {"local_path": "", "filename": "0.jpg",
//!       "id_view": 0, "id_intrinsic": 0, "id_pose": 0}}}}],
//!   "intrinsics": [{"key": 0, "value": {"polymorphic_id": 2147483649,
//!       "polymorphic_name": "pinhole_radial_k3", "ptr_wrapper": {"id": 2147483650, "data": {
//!       "width": 1920, "height": 1080, "focal_length": 1000.0,
//!       "principal_point": [960.0, 540.0], "disto_k3": [0.0, 0.0, 0.0]}}}}],
//!   "extrinsics": [{"key": 0, "value": {"rotation": [[1,0,0],[0,1,0],[0,0,1]],
//!       "center": [0,0,0]}}],
//!   "structure": [{"key": 0, "value": {"X": [0,0,5], "observations": [
//!       {"key": 0, "value": {"id_feat": 3, "x": [960.0, 540.0]}}]}}]
//! }
//! ```
//! The first intrinsic of each type carries `polymorphic_name` and an id with the high bit set,
//! later intrinsics of the same type only repeat the bare id.

use cgmath::prelude::*;
use cgmath::{Matrix3, Point2, Point3, Vector3};
use serde::Deserialize;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::scene::*;
use crate::{Error, Result};

/// OpenMVG's marker for a missing index.
const UNDEFINED_INDEX: u32 = std::u32::MAX;
const POLYMORPHIC_NEW_TYPE: u32 = 0x8000_0000;

#[derive(Debug, Deserialize)]
struct KeyValue<T> {
    key: u32,
    value: T,
}

#[derive(Debug, Deserialize)]
struct Polymorphic<T> {
    #[serde(default)]
    polymorphic_id: u32,
    #[serde(default)]
    polymorphic_name: Option<String>,
    ptr_wrapper: PtrWrapper<T>,
}

#[derive(Debug, Deserialize)]
struct PtrWrapper<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    #[serde(default)]
    local_path: String,
    filename: String,
    id_view: u32,
    id_intrinsic: u32,
    id_pose: u32,
}

#[derive(Debug, Deserialize)]
struct IntrinsicData {
    width: u32,
    height: u32,
    focal_length: f64,
    principal_point: [f64; 2],
    #[serde(default)]
    disto_k1: Option<Vec<f64>>,
    #[serde(default)]
    disto_k3: Option<Vec<f64>>,
    #[serde(default)]
    fisheye: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct ExtrinsicData {
    rotation: [[f64; 3]; 3],
    center: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct ObservationData {
    x: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct LandmarkData {
    #[serde(rename = "X")]
    position: [f64; 3],
    #[serde(default)]
    observations: Vec<KeyValue<ObservationData>>,
}

#[derive(Debug, Deserialize)]
struct SfmData {
    #[serde(default)]
    root_path: String,
    #[serde(default)]
    views: Vec<KeyValue<Polymorphic<ViewData>>>,
    #[serde(default)]
    intrinsics: Vec<KeyValue<Polymorphic<IntrinsicData>>>,
    #[serde(default)]
    extrinsics: Vec<KeyValue<ExtrinsicData>>,
    #[serde(default)]
    structure: Vec<KeyValue<LandmarkData>>,
}

/// `folder/filename`, or just the filename when there is no folder.
fn join_local_path(local_path: &str, filename: &str) -> String {
    if local_path.is_empty() || local_path.ends_with('/') {
        format!("{}{}", local_path, filename)
    } else {
        format!("{}/{}", local_path, filename)
    }
}

fn coefficients<'a>(
    id: u32,
    name: &str,
    field: &'a Option<Vec<f64>>,
    len: usize,
) -> Result<&'a [f64]> {
    match field {
        Some(v) if v.len() == len => Ok(v.as_slice()),
        _ => Err(Error::Parse(format!(
            "intrinsic {} of type {} needs {} distortion coefficients",
            id, name, len
        ))),
    }
}

fn intrinsic_model(id: u32, name: &str, data: &IntrinsicData) -> Result<IntrinsicModel> {
    Ok(match name {
        "pinhole" => IntrinsicModel::Pinhole,
        "pinhole_radial_k1" => {
            let k = coefficients(id, name, &data.disto_k1, 1)?;
            IntrinsicModel::PinholeRadial1 { k1: k[0] }
        }
        "pinhole_radial_k3" => {
            let k = coefficients(id, name, &data.disto_k3, 3)?;
            IntrinsicModel::PinholeRadial3 {
                k1: k[0],
                k2: k[1],
                k3: k[2],
            }
        }
        "fisheye" => {
            let k = coefficients(id, name, &data.fisheye, 4)?;
            IntrinsicModel::PinholeFisheye {
                k1: k[0],
                k2: k[1],
                k3: k[2],
                k4: k[3],
            }
        }
        other => IntrinsicModel::Other(other.to_string()),
    })
}

fn convert(sfm: SfmData) -> Result<Scene> {
    let mut scene = Scene {
        root_path: sfm.root_path,
        ..Scene::default()
    };

    for KeyValue { key, value } in sfm.views {
        let data = value
            .ptr_wrapper
            .data
            .ok_or_else(|| Error::Parse(format!("view {} has no data", key)))?;
        let view = View {
            id: data.id_view,
            intrinsic_id: data.id_intrinsic,
            pose_id: if data.id_pose == UNDEFINED_INDEX {
                None
            } else {
                Some(data.id_pose)
            },
            image_path: join_local_path(&data.local_path, &data.filename),
        };
        scene.views.insert(key, view);
    }

    let mut type_names = HashMap::new();
    for KeyValue { key, value } in sfm.intrinsics {
        let type_id = value.polymorphic_id & !POLYMORPHIC_NEW_TYPE;
        if let Some(name) = value.polymorphic_name {
            type_names.insert(type_id, name);
        }
        let name = type_names.get(&type_id).ok_or_else(|| {
            Error::Parse(format!(
                "intrinsic {} refers to unknown polymorphic type {}",
                key, type_id
            ))
        })?;
        let data = value
            .ptr_wrapper
            .data
            .ok_or_else(|| Error::Parse(format!("intrinsic {} has no data", key)))?;
        let intrinsic = Intrinsic {
            id: key,
            width: data.width,
            height: data.height,
            focal: data.focal_length,
            principal_point: Point2::new(data.principal_point[0], data.principal_point[1]),
            model: intrinsic_model(key, name, &data)?,
        };
        scene.intrinsics.insert(key, intrinsic);
    }

    for KeyValue { key, value } in sfm.extrinsics {
        let r = value.rotation;
        // rows are stored first
        let rotation = Matrix3::from_cols(
            Vector3::from(r[0]),
            Vector3::from(r[1]),
            Vector3::from(r[2]),
        )
        .transpose();
        scene
            .poses
            .insert(key, Pose::from_center(rotation, Point3::from(value.center)));
    }

    for KeyValue { key, value } in sfm.structure {
        let landmark = Landmark {
            position: Point3::from(value.position),
            observations: value
                .observations
                .into_iter()
                .map(|o| Observation {
                    view_id: o.key,
                    pixel: Point2::new(o.value.x[0], o.value.x[1]),
                })
                .collect(),
        };
        scene.landmarks.insert(key, landmark);
    }

    Ok(scene)
}

/// Parse a scene from the contents of an `sfm_data.json` file.
pub fn from_str(contents: &str) -> Result<Scene> {
    let sfm: SfmData = serde_json::from_str(contents).map_err(|e| Error::Parse(e.to_string()))?;
    convert(sfm)
}

/// Load a scene from an `sfm_data.json` file.
pub fn from_file(path: &Path) -> Result<Scene> {
    let file = File::open(path).map_err(|source| Error::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let sfm: SfmData = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
    let scene = convert(sfm)?;
    log::info!("Loaded {} from {}", scene, path.display());
    Ok(scene)
}

#[cfg(test)]
const TEST_SCENE: &str = r#"{
    "sfm_data_version": "0.3",
    "root_path": "/data/",
    "views": [
        {"key": 0, "value": {"polymorphic_id": 1073741824, "ptr_wrapper": {"id": 2147483649,
            "data": {"local_path": "", "filename": "a.jpg", "width": 1920, "height": 1080,
                     "id_view": 0, "id_intrinsic": 0, "id_pose": 0}}}},
        {"key": 1, "value": {"polymorphic_id": 1073741824, "ptr_wrapper": {"id": 2147483650,
            "data": {"local_path": "sub", "filename": "b.jpg", "width": 1920, "height": 1080,
                     "id_view": 1, "id_intrinsic": 1, "id_pose": 4294967295}}}}
    ],
    "intrinsics": [
        {"key": 0, "value": {"polymorphic_id": 2147483649, "polymorphic_name": "pinhole_radial_k3",
            "ptr_wrapper": {"id": 2147483651, "data": {"width": 1920, "height": 1080,
            "focal_length": 1000.0, "principal_point": [960.0, 540.0],
            "disto_k3": [0.01, -0.002, 0.0001]}}}},
        {"key": 1, "value": {"polymorphic_id": 1,
            "ptr_wrapper": {"id": 2147483652, "data": {"width": 640, "height": 480,
            "focal_length": 500.0, "principal_point": [320.0, 240.0],
            "disto_k3": [0.0, 0.0, 0.0]}}}},
        {"key": 2, "value": {"polymorphic_id": 2147483650, "polymorphic_name": "pinhole_brown_t2",
            "ptr_wrapper": {"id": 2147483653, "data": {"width": 640, "height": 480,
            "focal_length": 500.0, "principal_point": [320.0, 240.0],
            "disto_t2": [0.0, 0.0, 0.0, 0.0, 0.0]}}}}
    ],
    "extrinsics": [
        {"key": 0, "value": {"rotation": [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
                             "center": [1.0, 2.0, 3.0]}}
    ],
    "structure": [
        {"key": 5, "value": {"X": [0.5, 0.25, 4.0], "observations": [
            {"key": 0, "value": {"id_feat": 10, "x": [100.5, 200.0]}},
            {"key": 1, "value": {"id_feat": 11, "x": [50.0, 60.0]}}]}}
    ],
    "control_points": []
}"#;

#[test]
fn test_load_views() {
    let scene = from_str(TEST_SCENE).unwrap();
    assert_eq!(scene.root_path, "/data/");
    assert_eq!(scene.num_views(), 2);
    assert_eq!(scene.views[&0].image_path, "a.jpg");
    assert_eq!(scene.views[&1].image_path, "sub/b.jpg");
    assert_eq!(scene.views[&0].pose_id, Some(0));
    assert_eq!(scene.views[&1].pose_id, None);
    assert_eq!(scene.num_posed_views(), 1);
}

#[test]
fn test_load_intrinsics_resolves_polymorphic_names() {
    let scene = from_str(TEST_SCENE).unwrap();
    assert_eq!(
        scene.intrinsics[&0].model,
        IntrinsicModel::PinholeRadial3 {
            k1: 0.01,
            k2: -0.002,
            k3: 0.0001
        }
    );
    assert_eq!(scene.intrinsics[&1].model.name(), "pinhole_radial_k3");
    assert_eq!(scene.intrinsics[&1].width, 640);
    assert_eq!(
        scene.intrinsics[&2].model,
        IntrinsicModel::Other("pinhole_brown_t2".to_string())
    );
}

#[test]
fn test_load_extrinsics_and_structure() {
    use cgmath::AbsDiffEq;
    let scene = from_str(TEST_SCENE).unwrap();
    let pose = &scene.poses[&0];
    // row 0 of the file is the first row of R
    assert_eq!(pose.rotation[1][0], -1.0);
    assert_eq!(pose.rotation[0][1], 1.0);
    assert!(pose
        .center()
        .abs_diff_eq(&Point3::new(1.0, 2.0, 3.0), 1e-12));

    let landmark = &scene.landmarks[&5];
    assert_eq!(landmark.position, Point3::new(0.5, 0.25, 4.0));
    assert_eq!(landmark.observations.len(), 2);
    assert_eq!(landmark.observations[0].view_id, 0);
    assert_eq!(landmark.observations[0].pixel, Point2::new(100.5, 200.0));
}

#[test]
fn test_missing_coefficients() {
    let json = r#"{"intrinsics": [{"key": 0, "value": {"polymorphic_id": 2147483649,
        "polymorphic_name": "fisheye", "ptr_wrapper": {"id": 2147483649, "data": {
        "width": 10, "height": 10, "focal_length": 1.0, "principal_point": [5.0, 5.0],
        "fisheye": [0.1, 0.2]}}}}]}"#;
    match from_str(json) {
        Err(Error::Parse(msg)) => assert!(msg.contains("fisheye")),
        x => panic!("expected parse error, got {:?}", x),
    }
}

#[test]
fn test_view_without_data() {
    let json = r#"{"views": [{"key": 4, "value": {"polymorphic_id": 1073741824,
        "ptr_wrapper": {"id": 2147483649}}}]}"#;
    match from_str(json) {
        Err(Error::Parse(msg)) => assert_eq!(msg, "view 4 has no data"),
        x => panic!("expected parse error, got {:?}", x),
    }
}

#[test]
fn test_malformed_json() {
    assert!(match from_str("{\"views\": 3}") {
        Err(Error::Parse(_)) => true,
        _ => false,
    });
}
