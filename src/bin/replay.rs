//! Offline replay: run a recorded landmark stream through a session.
//!
//! Input: one JSON landmark message per line (blank or invalid lines count as
//! "no landmarks"). Output: one JSON object per line on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use drape_tracker::catalog::{GarmentCalibration, GarmentCatalog};
use drape_tracker::config::Config;
use drape_tracker::feed::decode_landmark_message;
use drape_tracker::tracker::AlignmentSession;
use drape_tracker::transform::RigidTransform;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorded landmark messages (JSON lines)
    input: String,

    /// Config file (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Garment id to look up in the catalog
    #[arg(short, long)]
    garment: Option<String>,

    /// Garment catalog (overrides [app].catalog_path)
    #[arg(long)]
    catalog: Option<String>,
}

#[derive(Serialize)]
struct ReplayLine<'a> {
    frame: usize,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    transform: &'a RigidTransform,
    quaternion: [f32; 4],
}

fn main() -> Result<()> {
    pretty_env_logger::init_timed();
    let args = Args::parse();

    let config = Config::load_or_default(&args.config);
    let catalog_path = args.catalog.unwrap_or_else(|| config.app.catalog_path.clone());
    let garment = args.garment.unwrap_or_else(|| config.app.garment.clone());
    let calibration = match GarmentCatalog::load(&catalog_path) {
        Ok(catalog) => catalog.calibration_or_identity(&garment),
        Err(e) => {
            log::warn!("catalog: {:#}, using identity calibration", e);
            GarmentCalibration::identity()
        }
    };

    let file = File::open(&args.input).with_context(|| format!("failed to open {}", args.input))?;
    let reader = BufReader::new(file);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut session = AlignmentSession::from_config(&config);
    for (frame, line) in reader.lines().enumerate() {
        let line = line?;
        let landmarks = if line.trim().is_empty() {
            None
        } else {
            decode_landmark_message(line.as_bytes())
        };
        let transform = session.process_frame(landmarks, &calibration);
        let record = ReplayLine {
            frame,
            state: format!("{:?}", session.state()),
            error: session.last_error().map(|e| e.to_string()),
            transform: &transform,
            quaternion: transform.quaternion(),
        };
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
    }
    out.flush()?;

    let stats = session.stats();
    log::info!(
        "replayed {} frames: tracked={} frozen={}",
        stats.frames, stats.tracked, stats.frozen
    );
    Ok(())
}
