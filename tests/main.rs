use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::*;
use std::process::Command;
use tempfile::tempdir;

const NEW_TYPE: u64 = 0x8000_0000;
const UNDEFINED: u64 = 4294967295;

fn view(id: u64, intrinsic: u64, pose: u64, filename: &str) -> Value {
    json!({"key": id, "value": {"polymorphic_id": 1073741824, "ptr_wrapper": {
        "id": NEW_TYPE + 100 + id,
        "data": {"local_path": "", "filename": filename, "width": 4, "height": 3,
                 "id_view": id, "id_intrinsic": intrinsic, "id_pose": pose}}}})
}

fn intrinsic(id: u64, type_id: u64, name: Option<&str>, extra: Value) -> Value {
    let mut data = json!({"width": 1920, "height": 1080, "focal_length": 1000.0,
                          "principal_point": [960.0, 540.0]});
    if let (Some(d), Value::Object(e)) = (data.as_object_mut(), extra) {
        d.extend(e);
    }
    let mut value = json!({"polymorphic_id": type_id,
                           "ptr_wrapper": {"id": NEW_TYPE + 200 + id, "data": data}});
    if let Some(name) = name {
        value["polymorphic_id"] = json!(NEW_TYPE + type_id);
        value["polymorphic_name"] = json!(name);
    }
    json!({"key": id, "value": value})
}

fn identity_pose(id: u64) -> Value {
    json!({"key": id, "value": {
        "rotation": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        "center": [0.0, 0.0, -1.0]}})
}

fn landmark(id: u64, x: f64, views: &[u64]) -> Value {
    let obs: Vec<Value> = views
        .iter()
        .map(|v| json!({"key": v, "value": {"id_feat": 0, "x": [1.0, 1.0]}}))
        .collect();
    json!({"key": id, "value": {"X": [x, 0.5, 2.0], "observations": obs}})
}

fn scene(
    root: &str,
    intrinsics: Vec<Value>,
    views: Vec<Value>,
    extrinsics: Vec<Value>,
    structure: Vec<Value>,
) -> Value {
    json!({"sfm_data_version": "0.3", "root_path": root, "views": views,
           "intrinsics": intrinsics, "extrinsics": extrinsics, "structure": structure,
           "control_points": []})
}

fn write_scene(dir: &Path, scene: &Value) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = dir.join("sfm_data.json");
    std::fs::write(&path, serde_json::to_string_pretty(scene)?)?;
    Ok(path)
}

fn export(input: &Path, out: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("sfm2kapture")?;
    cmd.env("RUST_LOG", "info")
        .arg("-i")
        .arg(input)
        .arg("-o")
        .arg(out)
        .arg("-q");
    Ok(cmd)
}

fn data_lines(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect())
}

#[test]
fn pinhole_sensor() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_scene(
        dir.path(),
        &scene(
            "/data/",
            vec![intrinsic(0, 1, Some("pinhole"), json!({}))],
            vec![view(0, 0, 0, "a.jpg")],
            vec![identity_pose(0)],
            vec![],
        ),
    )?;
    let out = dir.path().join("kapture");

    export(&input, &out)?
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 cameras"));

    let sensors = std::fs::read_to_string(out.join("sensors/sensors.txt"))?;
    assert!(sensors.starts_with("# kapture format: 1.0\n"));
    assert_eq!(
        data_lines(&out.join("sensors/sensors.txt"))?,
        vec!["0, cam_0, SIMPLE_PINHOLE, 1920, 1080, 1000, 960, 540"]
    );

    Ok(())
}

#[test]
fn radial3_sensor() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_scene(
        dir.path(),
        &scene(
            "/data/",
            vec![intrinsic(
                0,
                1,
                Some("pinhole_radial_k3"),
                json!({"disto_k3": [0.01, -0.002, 0.0001]}),
            )],
            vec![],
            vec![],
            vec![],
        ),
    )?;
    let out = dir.path().join("kapture");

    export(&input, &out)?.assert().success();

    assert_eq!(
        data_lines(&out.join("sensors/sensors.txt"))?,
        vec!["0, cam_0, FULL_OPENCV, 1920, 1080, 1000, 1000, 960, 540, 0.01, -0.002, 0, 0, 0.0001, 0, 0, 0"]
    );

    Ok(())
}

#[test]
fn records_and_trajectories() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_scene(
        dir.path(),
        &scene(
            "/data/",
            vec![
                intrinsic(0, 1, Some("pinhole"), json!({})),
                intrinsic(1, 1, None, json!({})),
            ],
            vec![
                view(7, 0, 0, "images/foo.jpg"),
                view(8, 1, UNDEFINED, "images/bar.jpg"),
                view(9, 1, 3, "images/baz.jpg"),
            ],
            vec![identity_pose(0), identity_pose(3)],
            vec![],
        ),
    )?;
    let out = dir.path().join("kapture");

    export(&input, &out)?.assert().success();

    assert_eq!(
        data_lines(&out.join("sensors/records_camera.txt"))?,
        vec![
            "7, 0, /data/images/foo.jpg",
            "8, 1, /data/images/bar.jpg",
            "9, 1, /data/images/baz.jpg",
        ]
    );
    // center (0, 0, -1) with identity rotation is t = (0, 0, 1)
    assert_eq!(
        data_lines(&out.join("sensors/trajectories.txt"))?,
        vec!["7, 0, 1, 0, 0, 0, 0, 0, 1", "9, 1, 1, 0, 0, 0, 0, 0, 1"]
    );

    Ok(())
}

#[test]
fn no_landmarks_no_points_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_scene(
        dir.path(),
        &scene(
            "/data/",
            vec![intrinsic(0, 1, Some("fisheye"), json!({"fisheye": [0.1, 0.2, 0.3, 0.4]}))],
            vec![view(0, 0, 0, "a.jpg")],
            vec![identity_pose(0)],
            vec![],
        ),
    )?;
    let out = dir.path().join("kapture");

    export(&input, &out)?.assert().success();

    assert!(out.join("reconstruction").is_dir());
    assert!(!out.join("reconstruction/points3d.txt").exists());

    Ok(())
}

#[test]
fn unsupported_camera_model() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_scene(
        dir.path(),
        &scene(
            "/data/",
            vec![
                intrinsic(0, 1, Some("pinhole"), json!({})),
                intrinsic(
                    1,
                    2,
                    Some("pinhole_brown_t2"),
                    json!({"disto_t2": [0.0, 0.0, 0.0, 0.0, 0.0]}),
                ),
            ],
            vec![view(0, 1, 0, "a.jpg")],
            vec![identity_pose(0)],
            vec![],
        ),
    )?;
    let out = dir.path().join("kapture");

    export(&input, &out)?
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported camera model"))
        .stderr(predicate::str::contains("pinhole_brown_t2"));

    assert!(!out.join("sensors/sensors.txt").exists());
    assert!(!out.join("sensors/records_camera.txt").exists());

    Ok(())
}

#[test]
fn missing_input() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    export(&dir.path().join("missing.json"), &dir.path().join("kapture"))?
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));

    Ok(())
}

#[test]
fn colors_from_images() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let images = dir.path().join("images");
    std::fs::create_dir(&images)?;
    image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])).save(images.join("a.png"))?;
    image::RgbImage::from_pixel(4, 3, image::Rgb([40, 50, 60])).save(images.join("b.png"))?;

    let root = format!("{}/", dir.path().display());
    let input = write_scene(
        dir.path(),
        &scene(
            &root,
            vec![intrinsic(0, 1, Some("pinhole"), json!({}))],
            vec![
                view(0, 0, 0, "images/a.png"),
                view(1, 0, 1, "images/b.png"),
            ],
            vec![identity_pose(0), identity_pose(1)],
            vec![
                landmark(0, 0.0, &[0, 1]),
                landmark(1, 1.0, &[1]),
                landmark(2, 2.0, &[0]),
            ],
        ),
    )?;
    let out = dir.path().join("kapture");
    let ply = dir.path().join("preview.ply");

    export(&input, &out)?
        .arg("--ply")
        .arg(&ply)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 points"));

    // both views see two landmarks, the lower view id is sampled first
    assert_eq!(
        data_lines(&out.join("reconstruction/points3d.txt"))?,
        vec![
            "0, 0.5, 2, 10, 20, 30",
            "1, 0.5, 2, 40, 50, 60",
            "2, 0.5, 2, 10, 20, 30",
        ]
    );
    assert!(std::fs::read_to_string(&ply)?.contains("element vertex 5"));

    let mut check = Command::cargo_bin("kapture_check")?;
    check
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("kapture with 1 sensors, 2 records, 2 trajectories, and 3 points"));

    Ok(())
}

#[test]
fn uniform_color_and_precision() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = write_scene(
        dir.path(),
        &scene(
            "/nowhere/",
            vec![intrinsic(0, 1, Some("pinhole_radial_k1"), json!({"disto_k1": [-0.25]}))],
            vec![view(0, 0, 0, "a.jpg")],
            vec![identity_pose(0)],
            vec![json!({"key": 0, "value": {"X": [0.5, 1.0, 2.0], "observations": [
                {"key": 0, "value": {"id_feat": 0, "x": [1.0, 1.0]}}]}})],
        ),
    )?;
    let out = dir.path().join("kapture");

    export(&input, &out)?
        .arg("--uniform-color")
        .arg("1,2,3")
        .arg("--precision")
        .arg("2")
        .assert()
        .success();

    assert_eq!(
        data_lines(&out.join("sensors/sensors.txt"))?,
        vec!["0, cam_0, SIMPLE_RADIAL, 1920, 1080, 1000.00, 960.00, 540.00, -0.25"]
    );
    assert_eq!(
        data_lines(&out.join("reconstruction/points3d.txt"))?,
        vec!["0.50, 1.00, 2.00, 1, 2, 3"]
    );

    Ok(())
}

#[test]
fn check_rejects_unknown_sensor() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let sensors = dir.path().join("sensors");
    std::fs::create_dir(&sensors)?;
    std::fs::write(
        sensors.join("sensors.txt"),
        "# kapture format: 1.0\n0, cam_0, SIMPLE_PINHOLE, 1, 1, 1, 0, 0\n",
    )?;
    std::fs::write(sensors.join("records_camera.txt"), "1, 4, a.jpg\n")?;
    std::fs::write(sensors.join("trajectories.txt"), "")?;

    let mut check = Command::cargo_bin("kapture_check")?;
    check
        .env("RUST_LOG", "info")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown sensor 4"));

    Ok(())
}
