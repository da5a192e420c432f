//! Reading kapture text files back.
//!
//! Comment lines start with `#`. Fields are separated by commas with optional spaces around
//! them.

use cgmath::prelude::*;
use cgmath::{Point3, Quaternion, Vector3};
use nom::bytes::complete::take_till1;
use nom::character::complete::{char, digit1, space0};
use nom::combinator::{all_consuming, map, map_res, opt, rest};
use nom::multi::{count, many0};
use nom::number::complete::double;
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use crate::export::KaptureLayout;
use crate::{Error, Result};

/// A line of `sensors.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: String,
    pub name: String,
    pub model: String,
    pub params: Vec<f64>,
}

/// A line of `records_camera.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: u64,
    pub device_id: String,
    pub image_path: String,
}

/// A line of `trajectories.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub timestamp: u64,
    pub device_id: String,
    pub rotation: Quaternion<f64>,
    pub translation: Vector3<f64>,
}

/// A line of `points3d.txt`. The color columns are optional in kapture.
#[derive(Debug, Clone, PartialEq)]
pub struct Point3d {
    pub position: Point3<f64>,
    pub color: Option<[u8; 3]>,
}

fn sep(input: &str) -> IResult<&str, char> {
    preceded(space0, terminated(char(','), space0))(input)
}

fn unsigned(input: &str) -> IResult<&str, u64> {
    map_res(digit1, u64::from_str)(input)
}

fn channel(input: &str) -> IResult<&str, u8> {
    map_res(digit1, u8::from_str)(input)
}

fn field(input: &str) -> IResult<&str, &str> {
    map(take_till1(|c: char| c == ','), str::trim)(input)
}

fn sensor(input: &str) -> IResult<&str, Sensor> {
    let (input, id) = field(input)?;
    let (input, name) = preceded(sep, field)(input)?;
    let (input, model) = preceded(sep, field)(input)?;
    let (input, params) = many0(preceded(sep, double))(input)?;
    Ok((
        input,
        Sensor {
            id: id.to_string(),
            name: name.to_string(),
            model: model.to_string(),
            params,
        },
    ))
}

fn record(input: &str) -> IResult<&str, Record> {
    let (input, timestamp) = unsigned(input)?;
    let (input, device_id) = preceded(sep, field)(input)?;
    let (input, image_path) = preceded(sep, map(rest, str::trim))(input)?;
    Ok((
        input,
        Record {
            timestamp,
            device_id: device_id.to_string(),
            image_path: image_path.to_string(),
        },
    ))
}

fn trajectory(input: &str) -> IResult<&str, Trajectory> {
    let (input, timestamp) = unsigned(input)?;
    let (input, device_id) = preceded(sep, field)(input)?;
    let (input, v) = count(preceded(sep, double), 7)(input)?;
    Ok((
        input,
        Trajectory {
            timestamp,
            device_id: device_id.to_string(),
            rotation: Quaternion::new(v[0], v[1], v[2], v[3]),
            translation: Vector3::new(v[4], v[5], v[6]),
        },
    ))
}

fn point3d(input: &str) -> IResult<&str, Point3d> {
    let (input, x) = double(input)?;
    let (input, y) = preceded(sep, double)(input)?;
    let (input, z) = preceded(sep, double)(input)?;
    let (input, color) = opt(tuple((
        preceded(sep, channel),
        preceded(sep, channel),
        preceded(sep, channel),
    )))(input)?;
    Ok((
        input,
        Point3d {
            position: Point3::new(x, y, z),
            color: color.map(|(r, g, b)| [r, g, b]),
        },
    ))
}

/// Parse every non comment line of `contents` with `parser`. `name` is used in error messages.
fn parse_lines<T, P>(name: &str, contents: &str, parser: P) -> Result<Vec<T>>
where
    P: Fn(&str) -> IResult<&str, T>,
{
    let mut out = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (_, item) = all_consuming(&parser)(line).map_err(|_| {
            Error::Parse(format!("{}:{}: cannot parse `{}`", name, i + 1, line))
        })?;
        out.push(item);
    }
    Ok(out)
}

pub fn parse_sensors(contents: &str) -> Result<Vec<Sensor>> {
    parse_lines("sensors.txt", contents, sensor)
}

pub fn parse_records(contents: &str) -> Result<Vec<Record>> {
    parse_lines("records_camera.txt", contents, record)
}

pub fn parse_trajectories(contents: &str) -> Result<Vec<Trajectory>> {
    parse_lines("trajectories.txt", contents, trajectory)
}

pub fn parse_points(contents: &str) -> Result<Vec<Point3d>> {
    parse_lines("points3d.txt", contents, point3d)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Load {
        path: path.to_path_buf(),
        source,
    })
}

/// Contents of a kapture directory.
#[derive(Debug, Clone, PartialEq)]
pub struct KaptureData {
    pub sensors: Vec<Sensor>,
    pub records: Vec<Record>,
    pub trajectories: Vec<Trajectory>,
    /// `None` when there is no `points3d.txt`.
    pub points: Option<Vec<Point3d>>,
}

impl KaptureData {
    /// Consistency problems: unknown device ids and rotations that are not unit quaternions.
    pub fn check(&self) -> Vec<String> {
        let devices: HashSet<&str> = self.sensors.iter().map(|s| s.id.as_str()).collect();
        let mut problems = Vec::new();
        for r in self.records.iter() {
            if !devices.contains(r.device_id.as_str()) {
                problems.push(format!(
                    "record {} refers to unknown sensor {}",
                    r.timestamp, r.device_id
                ));
            }
        }
        for t in self.trajectories.iter() {
            if !devices.contains(t.device_id.as_str()) {
                problems.push(format!(
                    "trajectory {} refers to unknown sensor {}",
                    t.timestamp, t.device_id
                ));
            }
            let norm = t.rotation.magnitude();
            if (norm - 1.0).abs() > 1e-6 {
                problems.push(format!(
                    "trajectory {} has a rotation of norm {}",
                    t.timestamp, norm
                ));
            }
        }
        problems
    }
}

impl std::fmt::Display for KaptureData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "kapture with {} sensors, {} records, {} trajectories, and ",
            self.sensors.len(),
            self.records.len(),
            self.trajectories.len()
        )?;
        match &self.points {
            Some(p) => write!(f, "{} points", p.len()),
            None => write!(f, "no points"),
        }
    }
}

/// Read the sensors, records, trajectories and points of a kapture directory.
pub fn read_dir(root: &Path) -> Result<KaptureData> {
    let layout = KaptureLayout::new(root);
    let points = if layout.points.exists() {
        Some(parse_points(&read(&layout.points)?)?)
    } else {
        None
    };
    Ok(KaptureData {
        sensors: parse_sensors(&read(&layout.sensors)?)?,
        records: parse_records(&read(&layout.records)?)?,
        trajectories: parse_trajectories(&read(&layout.trajectories)?)?,
        points,
    })
}

#[test]
fn test_parse_sensors() {
    let sensors = parse_sensors(
        "# kapture format: 1.0\n\
         # sensor_id, name, sensor_type, [sensor_params]+\n\
         0, cam_0, SIMPLE_PINHOLE, 1920, 1080, 1000, 960, 540\n\
         1,cam_1,SIMPLE_RADIAL,640,480,500,320,240,-0.05\n",
    )
    .unwrap();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].id, "0");
    assert_eq!(sensors[0].name, "cam_0");
    assert_eq!(sensors[0].model, "SIMPLE_PINHOLE");
    assert_eq!(sensors[0].params, vec![1920., 1080., 1000., 960., 540.]);
    assert_eq!(sensors[1].params[5], -0.05);
}

#[test]
fn test_parse_records_keeps_path() {
    let records = parse_records("7, 0, /data/images/foo bar.jpg\n").unwrap();
    assert_eq!(
        records,
        vec![Record {
            timestamp: 7,
            device_id: "0".to_string(),
            image_path: "/data/images/foo bar.jpg".to_string(),
        }]
    );
}

#[test]
fn test_parse_trajectories() {
    let t = parse_trajectories("3, 0, 0, 1, 0, 0, 1.5, -2, 3\n").unwrap();
    assert_eq!(t[0].rotation, Quaternion::new(0., 1., 0., 0.));
    assert_eq!(t[0].translation, Vector3::new(1.5, -2., 3.));
}

#[test]
fn test_parse_points_optional_color() {
    let p = parse_points("0.5, -1, 2, 255, 0, 10\n1, 1, 1\n").unwrap();
    assert_eq!(p[0].color, Some([255, 0, 10]));
    assert_eq!(p[1].position, Point3::new(1., 1., 1.));
    assert_eq!(p[1].color, None);
}

#[test]
fn test_parse_error_reports_line() {
    match parse_trajectories("# header\n3, 0, 1, 0, 0\n") {
        Err(Error::Parse(msg)) => assert!(msg.starts_with("trajectories.txt:2:")),
        x => panic!("expected parse error, got {:?}", x),
    }
}

#[test]
fn test_check_finds_problems() {
    let data = KaptureData {
        sensors: parse_sensors("0, cam_0, SIMPLE_PINHOLE, 1, 1, 1, 0, 0").unwrap(),
        records: parse_records("1, 0, a.jpg\n2, 5, b.jpg").unwrap(),
        trajectories: parse_trajectories("1, 0, 2, 0, 0, 0, 0, 0, 0").unwrap(),
        points: None,
    };
    let problems = data.check();
    assert_eq!(problems.len(), 2);
    assert!(problems[0].contains("unknown sensor 5"));
    assert!(problems[1].contains("norm 2"));
}
