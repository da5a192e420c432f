//! PLY rendering of an export for visual inspection.

use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;

use cgmath::Point3;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::colorize::ColorizedPoints;
use crate::scene::Scene;
use crate::{Error, Result};

fn vertex(p: Point3<f64>, color: [u8; 3]) -> DefaultElement {
    let mut v = DefaultElement::new();
    v.insert("x".to_string(), Property::Float(p.x as f32));
    v.insert("y".to_string(), Property::Float(p.y as f32));
    v.insert("z".to_string(), Property::Float(p.z as f32));
    v.insert("red".to_string(), Property::UChar(color[0]));
    v.insert("green".to_string(), Property::UChar(color[1]));
    v.insert("blue".to_string(), Property::UChar(color[2]));
    v
}

/// Write landmarks with their colors and camera centers in red to a .ply file. Returns the
/// number of vertices written.
pub fn write_ply(path: &Path, scene: &Scene, points: &ColorizedPoints) -> Result<usize> {
    let mut ply = Ply::<DefaultElement>::new();
    let mut point_element = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"].iter() {
        let p = PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::Float));
        point_element.properties.add(p);
    }
    for name in ["red", "green", "blue"].iter() {
        let p = PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::UChar));
        point_element.properties.add(p);
    }
    ply.header.elements.add(point_element);

    let mut vertices: Vec<_> = points
        .positions
        .iter()
        .zip(points.colors.iter())
        .map(|(p, c)| vertex(*p, *c))
        .collect();
    let cameras = scene
        .views
        .values()
        .filter_map(|view| scene.pose_of(view))
        .map(|pose| vertex(pose.center(), [255, 0, 0]));
    vertices.extend(cameras);
    let n = vertices.len();
    ply.payload.insert("vertex".to_string(), vertices);

    let file_error = |source| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut file = BufWriter::new(File::create(path).map_err(file_error)?);
    let writer = Writer::new();
    writer.write_ply(&mut file, &mut ply).map_err(file_error)?;
    file.flush().map_err(file_error)?;
    Ok(n)
}

#[test]
fn test_write_ply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preview.ply");
    let scene = crate::scene::test_scene();
    let points = ColorizedPoints {
        positions: vec![Point3::new(0., 0., 1.), Point3::new(1., 0., 1.)],
        colors: vec![[0, 255, 0], [0, 0, 255]],
    };
    // two landmarks and one posed camera
    assert_eq!(write_ply(&path, &scene, &points).unwrap(), 3);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("ply\n"));
    assert!(text.contains("element vertex 3"));
}

#[test]
fn test_write_ply_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let scene = crate::scene::test_scene();
    match write_ply(dir.path(), &scene, &ColorizedPoints::default()) {
        Err(Error::FileWrite { path, .. }) => assert_eq!(path, dir.path()),
        x => panic!("expected file write error, got {:?}", x),
    }
}
