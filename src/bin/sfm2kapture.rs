extern crate env_logger;
extern crate log;
extern crate sfm2kapture;
extern crate structopt;

use sfm2kapture::preview::write_ply;
use sfm2kapture::*;
use std::str::FromStr;
use structopt::StructOpt;

// helper to parse an RGB triple with structopt
fn parse_color(s: &str) -> std::result::Result<[u8; 3], String> {
    let channels = s
        .split(',')
        .map(|x| u8::from_str(x.trim()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid color {}: {}", s, e))?;
    match channels.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(format!("color {} must have three channels", s)),
    }
}

#[derive(StructOpt, Debug)]
#[structopt(
    name = "sfm2kapture",
    about = "Export an OpenMVG sfm_data.json reconstruction to a kapture directory."
)]
struct Opt {
    /// The sfm_data.json file to convert.
    #[structopt(short = "i", long = "sfmdata", parse(from_os_str))]
    input: std::path::PathBuf,

    /// Directory where kapture files will be saved. Created if it does not exist.
    #[structopt(short = "o", long = "outdir", parse(from_os_str))]
    outdir: std::path::PathBuf,

    /// Write floating point values with this many fractional digits instead of the shortest
    /// exact representation.
    #[structopt(long = "precision")]
    precision: Option<usize>,

    /// Color every point with R,G,B instead of sampling colors from the images.
    #[structopt(long = "uniform-color", parse(try_from_str = parse_color))]
    uniform_color: Option<[u8; 3]>,

    /// Also write points and camera centers to this .ply file.
    #[structopt(long = "ply", parse(from_os_str))]
    ply: Option<std::path::PathBuf>,

    /// Do not display progress bars.
    #[structopt(short = "q", long = "quiet")]
    quiet: bool,
}

fn run(opt: Opt) -> Result<ExportSummary> {
    let scene = Scene::from_file(&opt.input)?;
    println!("{}", scene);

    let colorizer: Box<dyn Colorize> = match opt.uniform_color {
        Some(color) => Box::new(UniformColorizer { color }),
        None => Box::new(ImageColorizer::default()),
    };
    let options = ExportOptions {
        format: FormatOptions {
            precision: opt.precision,
            ..FormatOptions::default()
        },
        verbose: !opt.quiet,
    };

    let summary = export_to_kapture(&scene, &opt.outdir, colorizer.as_ref(), &options)?;

    if let Some(path) = opt.ply {
        let points = colorizer.colorize(&scene)?;
        let n = write_ply(&path, &scene, &points)?;
        log::info!("Wrote {} vertices to {}", n, path.display());
    }

    Ok(summary)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    match run(opt) {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            log::error!("There was an error during export: {}", e);
            std::process::exit(1);
        }
    }
}
