//! Writers for the kapture text files and the export of a whole scene.
//!
//! Example usage:
//! ```no_run
//! use sfm2kapture::*;
//! use std::path::Path;
//!
//! let scene = Scene::from_file(Path::new("sfm_data.json")).unwrap();
//! let options = ExportOptions::default();
//! // a single file can be written on its own
//! let layout = KaptureLayout::new(Path::new("kapture"));
//! write_records_file(&scene, &options, &layout.records).unwrap();
//! // or everything at once
//! export_to_kapture(&scene, Path::new("kapture"), &ImageColorizer::default(), &options).unwrap();
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::camera::{translate_intrinsic, KaptureCamera};
use crate::colorize::{ColorizedPoints, Colorize};
use crate::format::FormatOptions;
use crate::pose::rotation_to_quaternion;
use crate::scene::Scene;
use crate::{Error, Result};

pub const SENSORS_DIR: &str = "sensors";
pub const RECONSTRUCTION_DIR: &str = "reconstruction";

pub const SENSORS_COLUMNS: &str = "sensor_id, name, sensor_type, [sensor_params]+";
pub const RECORDS_COLUMNS: &str = "timestamp, device_id, image_path";
pub const TRAJECTORIES_COLUMNS: &str = "timestamp, device_id, qw, qx, qy, qz, tx, ty, tz";
pub const POINTS_COLUMNS: &str = "X, Y, Z, [R, G, B]";

/// Location of every file of a kapture directory.
#[derive(Debug, Clone, PartialEq)]
pub struct KaptureLayout {
    pub root: PathBuf,
    pub sensors_dir: PathBuf,
    pub reconstruction_dir: PathBuf,
    pub sensors: PathBuf,
    pub records: PathBuf,
    pub trajectories: PathBuf,
    pub points: PathBuf,
}

impl KaptureLayout {
    pub fn new(root: &Path) -> Self {
        let sensors_dir = root.join(SENSORS_DIR);
        let reconstruction_dir = root.join(RECONSTRUCTION_DIR);
        KaptureLayout {
            root: root.to_path_buf(),
            sensors: sensors_dir.join("sensors.txt"),
            records: sensors_dir.join("records_camera.txt"),
            trajectories: sensors_dir.join("trajectories.txt"),
            points: reconstruction_dir.join("points3d.txt"),
            sensors_dir,
            reconstruction_dir,
        }
    }
}

/// Settings shared by all writers.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: FormatOptions,
    /// Show progress bars.
    pub verbose: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            format: FormatOptions::default(),
            verbose: false,
        }
    }
}

/// Number of records written to each file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub cameras: usize,
    pub records: usize,
    pub trajectories: usize,
    pub points: usize,
}

impl std::fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Exported {} cameras, {} images, {} poses, and {} points",
            self.cameras, self.records, self.trajectories, self.points
        )
    }
}

pub(crate) fn progress_bar(length: u64, message: &str, verbose: bool) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(length);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {percent}% ({eta})")
            .progress_chars("#-"),
    );
    pb.set_message(message);
    pb
}

/// Create `path` and hand a buffered writer to `write`. I/O failures are reported against
/// `path`.
fn write_file<F>(path: &Path, write: F) -> Result<usize>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<usize>,
{
    let file_error = |source| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(file_error)?);
    let n = write(&mut out).map_err(|e| match e {
        Error::IOError(source) => file_error(source),
        e => e,
    })?;
    out.flush().map_err(file_error)?;
    debug!("Wrote {} records to {}", n, path.display());
    Ok(n)
}

/// Translate every intrinsic of the scene, failing on the first unsupported one.
pub fn translate_cameras(scene: &Scene) -> Result<Vec<(u32, KaptureCamera)>> {
    scene
        .intrinsics
        .iter()
        .map(|(id, intrinsic)| Ok((*id, translate_intrinsic(intrinsic)?)))
        .collect()
}

/// Write `sensors.txt`: `sensor_id, name, sensor_type, [sensor_params]+`.
pub fn write_sensors<W: Write>(
    cameras: &[(u32, KaptureCamera)],
    options: &ExportOptions,
    out: &mut W,
) -> Result<usize> {
    let fmt = &options.format;
    out.write_all(fmt.header(SENSORS_COLUMNS).as_bytes())?;
    let pb = progress_bar(cameras.len() as u64, "Sensors", options.verbose);
    for (id, camera) in cameras {
        let fields = vec![
            id.to_string(),
            format!("cam_{}", id),
            camera.model.name().to_string(),
            camera.width().to_string(),
            camera.height().to_string(),
        ]
        .into_iter()
        .chain(camera.params[2..].iter().map(|x| fmt.float(*x)));
        writeln!(out, "{}", fmt.record(fields))?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(cameras.len())
}

/// Write `sensors.txt` for every intrinsic of the scene. Nothing is created if any camera
/// cannot be translated.
pub fn write_sensors_file(scene: &Scene, options: &ExportOptions, path: &Path) -> Result<usize> {
    let cameras = translate_cameras(scene)?;
    write_file(path, |out| write_sensors(&cameras, options, out))
}

/// Write `records_camera.txt`: `timestamp, device_id, image_path`, one line per view.
pub fn write_records<W: Write>(scene: &Scene, options: &ExportOptions, out: &mut W) -> Result<usize> {
    let fmt = &options.format;
    out.write_all(fmt.header(RECORDS_COLUMNS).as_bytes())?;
    let pb = progress_bar(scene.num_views() as u64, "Records", options.verbose);
    for view in scene.views.values() {
        let intrinsic = scene.intrinsic_of(view)?;
        writeln!(
            out,
            "{}",
            fmt.record(vec![
                view.id.to_string(),
                intrinsic.id.to_string(),
                scene.image_path(view),
            ])
        )?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(scene.num_views())
}

pub fn write_records_file(scene: &Scene, options: &ExportOptions, path: &Path) -> Result<usize> {
    write_file(path, |out| write_records(scene, options, out))
}

/// Write `trajectories.txt`: `timestamp, device_id, qw, qx, qy, qz, tx, ty, tz`.
///
/// Views without a pose are skipped.
pub fn write_trajectories<W: Write>(
    scene: &Scene,
    options: &ExportOptions,
    out: &mut W,
) -> Result<usize> {
    let fmt = &options.format;
    out.write_all(fmt.header(TRAJECTORIES_COLUMNS).as_bytes())?;
    let pb = progress_bar(scene.num_views() as u64, "Trajectories", options.verbose);
    let mut count = 0;
    for view in scene.views.values() {
        pb.inc(1);
        let intrinsic = scene.intrinsic_of(view)?;
        let pose = match scene.pose_of(view) {
            Some(pose) => pose,
            None => continue,
        };
        let q = rotation_to_quaternion(&pose.rotation);
        let t = pose.translation;
        let values = [q.s, q.v.x, q.v.y, q.v.z, t.x, t.y, t.z];
        let fields = vec![view.id.to_string(), intrinsic.id.to_string()]
            .into_iter()
            .chain(values.iter().map(|x| fmt.float(*x)));
        writeln!(out, "{}", fmt.record(fields))?;
        count += 1;
    }
    pb.finish_and_clear();
    Ok(count)
}

pub fn write_trajectories_file(
    scene: &Scene,
    options: &ExportOptions,
    path: &Path,
) -> Result<usize> {
    write_file(path, |out| write_trajectories(scene, options, out))
}

/// Write `points3d.txt`: `X, Y, Z, R, G, B`, one line per landmark.
pub fn write_points<W: Write>(
    points: &ColorizedPoints,
    options: &ExportOptions,
    out: &mut W,
) -> Result<usize> {
    let fmt = &options.format;
    out.write_all(fmt.header(POINTS_COLUMNS).as_bytes())?;
    let pb = progress_bar(points.len() as u64, "Points", options.verbose);
    for (p, c) in points.positions.iter().zip(points.colors.iter()) {
        let coords = [p.x, p.y, p.z];
        let fields = coords
            .iter()
            .map(|x| fmt.float(*x))
            .chain(c.iter().map(|x| x.to_string()));
        writeln!(out, "{}", fmt.record(fields))?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(points.len())
}

/// Colorize the landmarks of the scene and write them to `path`. A scene without landmarks
/// produces no file.
pub fn write_points_file(
    scene: &Scene,
    colorizer: &dyn Colorize,
    options: &ExportOptions,
    path: &Path,
) -> Result<usize> {
    if scene.landmarks.is_empty() {
        info!("No landmarks, skipping {}", path.display());
        return Ok(0);
    }

    let points = colorizer.colorize(scene)?;
    if points.positions.len() != points.colors.len() {
        return Err(Error::Colorization(format!(
            "{} positions but {} colors",
            points.positions.len(),
            points.colors.len()
        )));
    }
    write_file(path, |out| write_points(&points, options, out))
}

/// Make sure `path` is a directory, creating it if needed.
fn ensure_dir(path: &Path) -> Result<()> {
    let dir_error = |source| Error::DirectoryAccess {
        path: path.to_path_buf(),
        source,
    };
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(dir_error(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "not a directory",
        )));
    }
    info!("Creating kapture directory {}", path.display());
    std::fs::create_dir_all(path).map_err(dir_error)?;
    if !path.is_dir() {
        return Err(dir_error(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "directory missing after creation",
        )));
    }
    Ok(())
}

/// Export a scene as a kapture directory rooted at `out_dir`.
///
/// Files are written in order sensors, records, trajectories, points and the export stops at
/// the first failure. Files written before the failure are left in place.
pub fn export_to_kapture(
    scene: &Scene,
    out_dir: &Path,
    colorizer: &dyn Colorize,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    let layout = KaptureLayout::new(out_dir);
    for dir in [&layout.root, &layout.sensors_dir, &layout.reconstruction_dir].iter() {
        ensure_dir(dir)?;
    }
    scene.validate()?;

    let cameras = write_sensors_file(scene, options, &layout.sensors)?;
    info!("Wrote {} cameras", cameras);
    let records = write_records_file(scene, options, &layout.records)?;
    info!("Wrote {} image records", records);
    let trajectories = write_trajectories_file(scene, options, &layout.trajectories)?;
    info!("Wrote {} poses", trajectories);
    let points = write_points_file(scene, colorizer, options, &layout.points)?;
    info!("Wrote {} points", points);

    Ok(ExportSummary {
        cameras,
        records,
        trajectories,
        points,
    })
}

#[cfg(test)]
fn to_string<F>(write: F) -> String
where
    F: FnOnce(&mut Vec<u8>) -> Result<usize>,
{
    let mut buf = Vec::new();
    write(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn test_sensors_pinhole() {
    let scene = crate::scene::test_scene();
    let cameras = translate_cameras(&scene).unwrap();
    let text = to_string(|out| write_sensors(&cameras, &ExportOptions::default(), out));
    assert_eq!(
        text,
        "# kapture format: 1.0\n\
         # sensor_id, name, sensor_type, [sensor_params]+\n\
         0, cam_0, SIMPLE_PINHOLE, 1920, 1080, 1000, 960, 540\n"
    );
}

#[test]
fn test_sensors_radial3() {
    let mut scene = crate::scene::test_scene();
    scene.intrinsics.get_mut(&0).unwrap().model = crate::scene::IntrinsicModel::PinholeRadial3 {
        k1: 0.01,
        k2: -0.002,
        k3: 0.0001,
    };
    let cameras = translate_cameras(&scene).unwrap();
    let text = to_string(|out| write_sensors(&cameras, &ExportOptions::default(), out));
    assert_eq!(
        text.lines().nth(2).unwrap(),
        "0, cam_0, FULL_OPENCV, 1920, 1080, 1000, 1000, 960, 540, 0.01, -0.002, 0, 0, 0.0001, 0, 0, 0"
    );
}

#[test]
fn test_sensors_unsupported_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = crate::scene::test_scene();
    scene.intrinsics.get_mut(&0).unwrap().model =
        crate::scene::IntrinsicModel::Other("spherical".to_string());
    let path = dir.path().join("sensors.txt");
    match write_sensors_file(&scene, &ExportOptions::default(), &path) {
        Err(Error::UnsupportedCameraModel { camera_id: 0, .. }) => (),
        x => panic!("expected unsupported camera model, got {:?}", x),
    }
    assert!(!path.exists());
}

#[test]
fn test_records_one_line_per_view() {
    let scene = crate::scene::test_scene();
    let text = to_string(|out| write_records(&scene, &ExportOptions::default(), out));
    let lines: Vec<_> = text.lines().skip(2).collect();
    assert_eq!(
        lines,
        vec![
            "3, 0, /data/images/3.jpg",
            "7, 0, /data/images/7.jpg",
            "9, 0, /data/images/9.jpg",
        ]
    );
}

#[test]
fn test_records_dangling_intrinsic() {
    let mut scene = crate::scene::test_scene();
    scene.views.get_mut(&9).unwrap().intrinsic_id = 1;
    let mut buf = Vec::new();
    match write_records(&scene, &ExportOptions::default(), &mut buf) {
        Err(Error::DanglingIntrinsicReference {
            view_id: 9,
            intrinsic_id: 1,
        }) => (),
        x => panic!("expected dangling intrinsic, got {:?}", x),
    }
}

#[test]
fn test_trajectories_skip_unposed_views() {
    let scene = crate::scene::test_scene();
    let mut buf = Vec::new();
    let n = write_trajectories(&scene, &ExportOptions::default(), &mut buf).unwrap();
    assert_eq!(n, 1);
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert_eq!(text.lines().nth(2).unwrap(), "3, 0, 1, 0, 0, 0, 1, 2, 3");
}

#[test]
fn test_trajectories_precision() {
    use cgmath::SquareMatrix;
    let mut scene = crate::scene::test_scene();
    scene.poses.get_mut(&0).unwrap().rotation =
        cgmath::Matrix3::from_diagonal(cgmath::Vector3::new(1., -1., -1.));
    let options = ExportOptions {
        format: FormatOptions {
            separator: " ".to_string(),
            precision: Some(2),
        },
        verbose: false,
    };
    let text = to_string(|out| write_trajectories(&scene, &options, out));
    assert_eq!(
        text.lines().nth(2).unwrap(),
        "3 0 0.00 1.00 0.00 0.00 1.00 2.00 3.00"
    );
}

#[test]
fn test_points_lines() {
    let points = ColorizedPoints {
        positions: vec![
            cgmath::Point3::new(0.5, -1.0, 2.0),
            cgmath::Point3::new(1.0, 1.0, 1.0),
        ],
        colors: vec![[255, 0, 10], [1, 2, 3]],
    };
    let text = to_string(|out| write_points(&points, &ExportOptions::default(), out));
    assert_eq!(
        text,
        "# kapture format: 1.0\n# X, Y, Z, [R, G, B]\n0.5, -1, 2, 255, 0, 10\n1, 1, 1, 1, 2, 3\n"
    );
}

#[test]
fn test_points_empty_scene_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("points3d.txt");
    let scene = crate::scene::test_scene();
    let n = write_points_file(
        &scene,
        &crate::colorize::UniformColorizer::default(),
        &ExportOptions::default(),
        &path,
    )
    .unwrap();
    assert_eq!(n, 0);
    assert!(!path.exists());
}

#[test]
fn test_points_mismatched_colorization() {
    struct Broken;
    impl Colorize for Broken {
        fn colorize(&self, _scene: &Scene) -> Result<ColorizedPoints> {
            Ok(ColorizedPoints {
                positions: vec![cgmath::Point3::new(0., 0., 0.)],
                colors: vec![],
            })
        }
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("points3d.txt");
    let mut scene = crate::scene::test_scene();
    scene.landmarks.insert(
        0,
        crate::scene::Landmark {
            position: cgmath::Point3::new(0., 0., 0.),
            observations: vec![],
        },
    );
    match write_points_file(&scene, &Broken, &ExportOptions::default(), &path) {
        Err(Error::Colorization(_)) => (),
        x => panic!("expected colorization error, got {:?}", x),
    }
    assert!(!path.exists());
}

#[test]
fn test_export_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("kapture");
    let scene = crate::scene::test_scene();
    let summary = export_to_kapture(
        &scene,
        &out,
        &crate::colorize::UniformColorizer::default(),
        &ExportOptions::default(),
    )
    .unwrap();
    assert_eq!(
        summary,
        ExportSummary {
            cameras: 1,
            records: 3,
            trajectories: 1,
            points: 0,
        }
    );
    let layout = KaptureLayout::new(&out);
    assert!(layout.sensors.is_file());
    assert!(layout.records.is_file());
    assert!(layout.trajectories.is_file());
    assert!(layout.reconstruction_dir.is_dir());
    assert!(!layout.points.exists());
}

#[test]
fn test_export_out_dir_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("kapture");
    std::fs::write(&out, "not a directory").unwrap();
    let scene = crate::scene::test_scene();
    match export_to_kapture(
        &scene,
        &out,
        &crate::colorize::UniformColorizer::default(),
        &ExportOptions::default(),
    ) {
        Err(Error::DirectoryAccess { path, .. }) => assert_eq!(path, out),
        x => panic!("expected directory error, got {:?}", x),
    }
}

#[test]
fn test_export_dangling_intrinsic_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = crate::scene::test_scene();
    scene.views.get_mut(&3).unwrap().intrinsic_id = 8;
    assert!(export_to_kapture(
        &scene,
        dir.path(),
        &crate::colorize::UniformColorizer::default(),
        &ExportOptions::default(),
    )
    .is_err());
    assert!(!KaptureLayout::new(dir.path()).sensors.exists());
}

#[test]
fn test_export_unwritable_file() {
    let dir = tempfile::tempdir().unwrap();
    let layout = KaptureLayout::new(dir.path());
    std::fs::create_dir_all(&layout.sensors).unwrap();
    let scene = crate::scene::test_scene();
    match export_to_kapture(
        &scene,
        dir.path(),
        &crate::colorize::UniformColorizer::default(),
        &ExportOptions::default(),
    ) {
        Err(Error::FileWrite { path, .. }) => assert_eq!(path, layout.sensors),
        x => panic!("expected file write error, got {:?}", x),
    }
    assert!(!layout.records.exists());
}
