mod chat;
mod data_uri;
mod frames;
mod slam;
mod transcript;

use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Deserialize, Debug)]
struct Environment {
    openrouter_api_key: String,
    #[serde(default = "default_endpoint")]
    openrouter_endpoint: String,
}

fn default_endpoint() -> String {
    chat::OPENROUTER_ENDPOINT.to_owned()
}

#[derive(StructOpt, Debug)]
#[structopt(
    name = "vlm-slam",
    about = "Stream images to a vision language model for a SLAM test"
)]
struct Args {
    /// Directory of images, ordered by name
    #[structopt(long, parse(from_os_str))]
    dir: PathBuf,

    /// OpenRouter model id
    #[structopt(long, default_value = "google/gemini-2.5-flash-preview-05-20")]
    model: String,

    /// Write the JSON transcript here
    #[structopt(long, parse(from_os_str))]
    out: Option<PathBuf>,

    /// Attempts per request before giving up
    #[structopt(long, default_value = "5")]
    attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    dotenv::dotenv().ok();
    let args = Args::from_args();

    let environment = envy::from_env::<Environment>()
        .context("Set OPENROUTER_API_KEY in the environment or a .env file")?;
    if environment.openrouter_api_key.trim().is_empty() {
        bail!("Set OPENROUTER_API_KEY in the environment or a .env file");
    }
    if args.attempts == 0 {
        bail!("--attempts must be at least 1");
    }

    let frames = frames::enumerate(&args.dir)?;
    log::info!("Found {} frames in {}", frames.len(), args.dir.display());

    let client = chat::ChatClient::new(&environment.openrouter_api_key, &args.model)?
        .with_endpoint(&environment.openrouter_endpoint)
        .with_retry(chat::RetryPolicy {
            attempts: args.attempts,
            ..Default::default()
        });

    let mut conversation = transcript::Conversation::new(slam::SYSTEM_PROMPT);
    let outcome = slam::map_frames(&client, &frames, &mut conversation).await?;
    match outcome {
        slam::Outcome::Completed { frames, summary } => log::info!(
            "Mapped {frames} frames ({})",
            if summary.is_some() { "with summary" } else { "no summary" }
        ),
        slam::Outcome::Halted { frame } => log::warn!("Halted at frame {frame}"),
    }

    if let Some(out) = &args.out {
        conversation.save(out).await?;
        println!("Full transcript written to {}", out.display());
    }

    Ok(())
}
