//! Translation of scene intrinsics into kapture camera models.
//!
//! kapture identifies a camera model by the number and layout of its parameters, so every
//! supported intrinsic maps onto a fixed, positional parameter list. Coefficients the source
//! model does not have are written as zero.

use crate::scene::{Intrinsic, IntrinsicModel};
use crate::{Error, Result};

/// kapture camera models we can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraModel {
    /// `w, h, f, cx, cy`
    SimplePinhole,
    /// `w, h, f, cx, cy, k`
    SimpleRadial,
    /// `w, h, fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6`
    FullOpenCV,
    /// `w, h, fx, fy, cx, cy, k1, k2, k3, k4`
    OpenCVFisheye,
}

impl CameraModel {
    /// Name of the model in kapture's `sensors.txt`.
    pub fn name(self) -> &'static str {
        match self {
            CameraModel::SimplePinhole => "SIMPLE_PINHOLE",
            CameraModel::SimpleRadial => "SIMPLE_RADIAL",
            CameraModel::FullOpenCV => "FULL_OPENCV",
            CameraModel::OpenCVFisheye => "OPENCV_FISHEYE",
        }
    }

    /// Number of parameters following the model name, image size included.
    pub fn num_params(self) -> usize {
        match self {
            CameraModel::SimplePinhole => 5,
            CameraModel::SimpleRadial => 6,
            CameraModel::FullOpenCV => 14,
            CameraModel::OpenCVFisheye => 10,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SIMPLE_PINHOLE" => Some(CameraModel::SimplePinhole),
            "SIMPLE_RADIAL" => Some(CameraModel::SimpleRadial),
            "FULL_OPENCV" => Some(CameraModel::FullOpenCV),
            "OPENCV_FISHEYE" => Some(CameraModel::OpenCVFisheye),
            _ => None,
        }
    }
}

impl std::fmt::Display for CameraModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A camera expressed in kapture terms.
///
/// `params[0]` and `params[1]` are the image width and height, the rest follow the layout of
/// `model`.
#[derive(Debug, Clone, PartialEq)]
pub struct KaptureCamera {
    pub model: CameraModel,
    pub params: Vec<f64>,
}

impl KaptureCamera {
    pub fn width(&self) -> u32 {
        self.params[0] as u32
    }

    pub fn height(&self) -> u32 {
        self.params[1] as u32
    }
}

/// Map an intrinsic onto the kapture camera model with the same distortion layout.
pub fn translate_intrinsic(intrinsic: &Intrinsic) -> Result<KaptureCamera> {
    let w = intrinsic.width as f64;
    let h = intrinsic.height as f64;
    let f = intrinsic.focal;
    let cx = intrinsic.principal_point.x;
    let cy = intrinsic.principal_point.y;

    let (model, params) = match intrinsic.model {
        IntrinsicModel::Pinhole => (CameraModel::SimplePinhole, vec![w, h, f, cx, cy]),
        IntrinsicModel::PinholeRadial1 { k1 } => {
            (CameraModel::SimpleRadial, vec![w, h, f, cx, cy, k1])
        }
        IntrinsicModel::PinholeRadial3 { k1, k2, k3 } => (
            CameraModel::FullOpenCV,
            // p1, p2, k4, k5, k6 do not exist in the source model
            vec![w, h, f, f, cx, cy, k1, k2, 0.0, 0.0, k3, 0.0, 0.0, 0.0],
        ),
        IntrinsicModel::PinholeFisheye { k1, k2, k3, k4 } => (
            CameraModel::OpenCVFisheye,
            vec![w, h, f, f, cx, cy, k1, k2, k3, k4],
        ),
        IntrinsicModel::Other(ref name) => {
            return Err(Error::UnsupportedCameraModel {
                camera_id: intrinsic.id,
                model: name.clone(),
            })
        }
    };
    debug_assert_eq!(params.len(), model.num_params());

    Ok(KaptureCamera { model, params })
}

#[cfg(test)]
fn intrinsic(model: IntrinsicModel) -> Intrinsic {
    Intrinsic {
        id: 0,
        width: 1920,
        height: 1080,
        focal: 1000.0,
        principal_point: cgmath::Point2::new(960.0, 540.0),
        model,
    }
}

#[test]
fn test_translate_pinhole() {
    let cam = translate_intrinsic(&intrinsic(IntrinsicModel::Pinhole)).unwrap();
    assert_eq!(cam.model, CameraModel::SimplePinhole);
    assert_eq!(cam.params, vec![1920., 1080., 1000., 960., 540.]);
}

#[test]
fn test_translate_radial1() {
    let cam = translate_intrinsic(&intrinsic(IntrinsicModel::PinholeRadial1 { k1: -0.1 })).unwrap();
    assert_eq!(cam.model, CameraModel::SimpleRadial);
    assert_eq!(cam.params, vec![1920., 1080., 1000., 960., 540., -0.1]);
}

#[test]
fn test_translate_radial3_pads_missing_coefficients() {
    let cam = translate_intrinsic(&intrinsic(IntrinsicModel::PinholeRadial3 {
        k1: 0.01,
        k2: -0.002,
        k3: 0.0001,
    }))
    .unwrap();
    assert_eq!(cam.model, CameraModel::FullOpenCV);
    assert_eq!(
        cam.params,
        vec![
            1920., 1080., 1000., 1000., 960., 540., 0.01, -0.002, 0., 0., 0.0001, 0., 0., 0.
        ]
    );
}

#[test]
fn test_translate_fisheye() {
    let cam = translate_intrinsic(&intrinsic(IntrinsicModel::PinholeFisheye {
        k1: 0.1,
        k2: 0.2,
        k3: 0.3,
        k4: 0.4,
    }))
    .unwrap();
    assert_eq!(cam.model, CameraModel::OpenCVFisheye);
    assert_eq!(
        cam.params,
        vec![1920., 1080., 1000., 1000., 960., 540., 0.1, 0.2, 0.3, 0.4]
    );
    assert_eq!(cam.width(), 1920);
    assert_eq!(cam.height(), 1080);
}

#[test]
fn test_translate_unsupported() {
    let mut intrin = intrinsic(IntrinsicModel::Other("pinhole_brown_t2".to_string()));
    intrin.id = 4;
    match translate_intrinsic(&intrin) {
        Err(Error::UnsupportedCameraModel { camera_id, model }) => {
            assert_eq!(camera_id, 4);
            assert_eq!(model, "pinhole_brown_t2");
        }
        x => panic!("expected unsupported camera model, got {:?}", x),
    }
}

#[test]
fn test_model_names_round_trip() {
    for model in [
        CameraModel::SimplePinhole,
        CameraModel::SimpleRadial,
        CameraModel::FullOpenCV,
        CameraModel::OpenCVFisheye,
    ]
    .iter()
    {
        assert_eq!(CameraModel::from_name(model.name()), Some(*model));
    }
    assert_eq!(CameraModel::from_name("PINHOLE"), None);
}
