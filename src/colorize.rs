//! Colors for landmarks.
//!
//! Colorization produces two parallel sequences, positions and colors, ordered by landmark id.

use cgmath::{Point2, Point3};
use image::RgbImage;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::scene::Scene;
use crate::{Error, Result};

/// Landmark positions with one RGB color per position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorizedPoints {
    pub positions: Vec<Point3<f64>>,
    pub colors: Vec<[u8; 3]>,
}

impl ColorizedPoints {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Something that can assign a color to every landmark of a scene.
pub trait Colorize {
    fn colorize(&self, scene: &Scene) -> Result<ColorizedPoints>;
}

/// Gives every landmark the same color.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformColorizer {
    pub color: [u8; 3],
}

impl Default for UniformColorizer {
    fn default() -> Self {
        UniformColorizer {
            color: [255, 255, 255],
        }
    }
}

impl Colorize for UniformColorizer {
    fn colorize(&self, scene: &Scene) -> Result<ColorizedPoints> {
        Ok(ColorizedPoints {
            positions: scene.landmarks.values().map(|l| l.position).collect(),
            colors: vec![self.color; scene.num_landmarks()],
        })
    }
}

/// Samples landmark colors from the images that observe them.
///
/// Images are visited greedily: the view seeing the most landmarks that still have no color is
/// opened next, and every uncolored landmark it sees takes the color of the pixel at its
/// observation. This keeps the number of decoded images small. Landmarks that no readable
/// view observes get `fallback`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageColorizer {
    pub fallback: [u8; 3],
}

impl Default for ImageColorizer {
    fn default() -> Self {
        ImageColorizer {
            fallback: [255, 255, 255],
        }
    }
}

/// Color of the pixel closest to `pixel`, clamped to the image.
fn sample(image: &RgbImage, pixel: Point2<f64>) -> [u8; 3] {
    let clamp = |v: f64, size: u32| (v.round().max(0.0) as u32).min(size - 1);
    let x = clamp(pixel.x, image.width());
    let y = clamp(pixel.y, image.height());
    image.get_pixel(x, y).0
}

fn load_image(path: &Path, view_id: u32) -> Result<RgbImage> {
    let image = image::open(path)
        .map_err(|e| {
            Error::Colorization(format!(
                "cannot read image {} of view {}: {}",
                path.display(),
                view_id,
                e
            ))
        })?
        .to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::Colorization(format!(
            "image {} of view {} is empty",
            path.display(),
            view_id
        )));
    }
    Ok(image)
}

impl Colorize for ImageColorizer {
    fn colorize(&self, scene: &Scene) -> Result<ColorizedPoints> {
        // landmarks seen by each view
        let mut seen_by: BTreeMap<u32, Vec<(u32, Point2<f64>)>> = BTreeMap::new();
        for (id, landmark) in scene.landmarks.iter() {
            for obs in landmark.observations.iter() {
                if scene.views.contains_key(&obs.view_id) {
                    seen_by.entry(obs.view_id).or_default().push((*id, obs.pixel));
                }
            }
        }

        let mut uncolored: BTreeSet<u32> = scene.landmarks.keys().cloned().collect();
        let mut colors = BTreeMap::new();
        while !uncolored.is_empty() {
            let mut best: Option<(u32, usize)> = None;
            for (view_id, obs) in seen_by.iter() {
                let n = obs.iter().filter(|(l, _)| uncolored.contains(l)).count();
                if n > 0 && best.map_or(true, |(_, m)| n > m) {
                    best = Some((*view_id, n));
                }
            }
            let view_id = match best {
                Some((view_id, _)) => view_id,
                None => break,
            };
            let obs = seen_by.remove(&view_id).unwrap_or_default();

            let view = &scene.views[&view_id];
            let path = PathBuf::from(&scene.root_path).join(&view.image_path);
            log::debug!("Sampling colors from {}", path.display());
            let image = load_image(&path, view_id)?;
            for (landmark_id, pixel) in obs {
                if uncolored.remove(&landmark_id) {
                    colors.insert(landmark_id, sample(&image, pixel));
                }
            }
        }

        if !uncolored.is_empty() {
            log::warn!(
                "{} landmarks are not observed by any view, using fallback color",
                uncolored.len()
            );
        }

        Ok(ColorizedPoints {
            positions: scene.landmarks.values().map(|l| l.position).collect(),
            colors: scene
                .landmarks
                .keys()
                .map(|id| *colors.get(id).unwrap_or(&self.fallback))
                .collect(),
        })
    }
}

#[cfg(test)]
fn write_test_image(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(4, 3, image::Rgb(color))
        .save(path)
        .unwrap();
}

#[test]
fn test_uniform_colorizer() {
    let mut scene = crate::scene::test_scene();
    assert!(UniformColorizer::default().colorize(&scene).unwrap().is_empty());

    scene.landmarks.insert(
        2,
        crate::scene::Landmark {
            position: Point3::new(1., 2., 3.),
            observations: vec![],
        },
    );
    let points = UniformColorizer { color: [1, 2, 3] }.colorize(&scene).unwrap();
    assert_eq!(points.positions, vec![Point3::new(1., 2., 3.)]);
    assert_eq!(points.colors, vec![[1, 2, 3]]);
}

#[test]
fn test_image_colorizer_prefers_view_seeing_most() {
    use crate::scene::{Landmark, Observation};

    let dir = tempfile::tempdir().unwrap();
    let mut scene = crate::scene::test_scene();
    scene.root_path = dir.path().to_str().unwrap().to_string();
    std::fs::create_dir(dir.path().join("images")).unwrap();
    write_test_image(&dir.path().join("images/3.jpg.png"), [255, 0, 0]);
    write_test_image(&dir.path().join("images/7.jpg.png"), [0, 0, 255]);
    for view in scene.views.values_mut() {
        view.image_path = format!("{}.png", view.image_path);
    }

    let obs = |view_id, x, y| Observation {
        view_id,
        pixel: Point2::new(x, y),
    };
    // view 7 sees both landmarks, view 3 only the first
    scene.landmarks.insert(
        0,
        Landmark {
            position: Point3::new(0., 0., 1.),
            observations: vec![obs(3, 1., 1.), obs(7, 100., -5.)],
        },
    );
    scene.landmarks.insert(
        1,
        Landmark {
            position: Point3::new(0., 1., 1.),
            observations: vec![obs(7, 2., 2.)],
        },
    );
    // observed by a view that does not exist
    scene.landmarks.insert(
        2,
        Landmark {
            position: Point3::new(1., 1., 1.),
            observations: vec![obs(99, 0., 0.)],
        },
    );

    let points = ImageColorizer::default().colorize(&scene).unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points.colors, vec![[0, 0, 255], [0, 0, 255], [255, 255, 255]]);
}

#[test]
fn test_image_colorizer_missing_image() {
    let mut scene = crate::scene::test_scene();
    scene.root_path = "/nonexistent/".to_string();
    scene.landmarks.insert(
        0,
        crate::scene::Landmark {
            position: Point3::new(0., 0., 1.),
            observations: vec![crate::scene::Observation {
                view_id: 3,
                pixel: Point2::new(0., 0.),
            }],
        },
    );
    match ImageColorizer::default().colorize(&scene) {
        Err(Error::Colorization(msg)) => assert!(msg.contains("view 3")),
        x => panic!("expected colorization error, got {:?}", x),
    }
}
