// SPDX-License-Identifier: Apache-2.0, MIT

//! Thin CLI driver: streams every frame set in a trajectory file and
//! prints the total frame count, tolerating (and reporting) per-block
//! failures along the way rather than aborting the whole walk.

use anyhow::{Context, Result};
use clap::Parser;
use tng::Session;

#[derive(Parser)]
#[command(about = "Count frames in a trajectory file by streaming its frame sets")]
struct Args {
    /// Path to the trajectory file.
    path: std::path::PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut session = Session::init();
    session
        .set_input_file(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    session
        .read_file_headers()?
        .success()
        .context("failed to read file headers (see logs for the reported failure)")?;

    let mut n_frame_sets = 0u64;
    let mut n_frames = 0u64;
    loop {
        match session.read_next_frame_set()? {
            tng::Outcome::Success(true) => {
                let fs = session.current_frame_set().expect("just read a frame set");
                n_frame_sets += 1;
                n_frames += fs.n_frames;
            }
            tng::Outcome::Success(false) => break,
            tng::Outcome::Failure(reason) => {
                eprintln!("warning: {reason}, stopping walk");
                break;
            }
        }
    }

    println!("frame sets: {n_frame_sets}");
    println!("frames:     {n_frames}");

    session.destroy();
    Ok(())
}
