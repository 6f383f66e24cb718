mod capture;

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "screenshot-capture",
    about = "Save a screenshot of the primary monitor at a fixed interval"
)]
struct Args {
    /// Seconds between screenshots (a positive integer)
    #[structopt(parse(try_from_str = capture::parse_interval))]
    interval_seconds: Duration,

    /// Directory the screenshots are written to
    #[structopt(parse(from_os_str))]
    output_directory: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::from_args();

    capture::run(
        &mut capture::PrimaryMonitor,
        args.interval_seconds,
        &args.output_directory,
        tokio::signal::ctrl_c(),
    )
    .await
    .context("Screenshot capture failed")
}
