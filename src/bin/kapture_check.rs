extern crate env_logger;
extern crate log;
extern crate sfm2kapture;
extern crate structopt;

use sfm2kapture::kapture::read_dir;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "kapture_check",
    about = "Summarize a kapture directory and check that it is consistent."
)]
struct Opt {
    /// Root of the kapture directory.
    #[structopt(name = "DIR", parse(from_os_str))]
    input: std::path::PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let data = match read_dir(&opt.input) {
        Ok(data) => data,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    println!("{}", data);

    let problems = data.check();
    for problem in problems.iter() {
        log::error!("{}", problem);
    }
    if !problems.is_empty() {
        std::process::exit(1);
    }
}
