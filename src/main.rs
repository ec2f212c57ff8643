use anyhow::Result;
use clap::Parser;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use drape_tracker::catalog::{GarmentCalibration, GarmentCatalog};
use drape_tracker::config::Config;
use drape_tracker::feed;
use drape_tracker::output::TransformSender;
use drape_tracker::tracker::AlignmentSession;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Garment id to start with (overrides [app].garment)
    #[arg(short, long)]
    garment: Option<String>,

    /// Garment catalog (overrides [app].catalog_path)
    #[arg(long)]
    catalog: Option<String>,

    /// Pose service address (overrides [feed].addr)
    #[arg(long)]
    feed: Option<String>,

    /// OSC target address (overrides [output].addr)
    #[arg(long)]
    output: Option<String>,
}

enum Command {
    Switch(String),
    List,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "" => None,
        "q" => Some(Command::Quit),
        "l" => Some(Command::List),
        id => Some(Command::Switch(id.to_string())),
    }
}

fn load_catalog(path: &str) -> GarmentCatalog {
    match GarmentCatalog::load(path) {
        Ok(catalog) => {
            log::info!("catalog: {} garments from {}", catalog.garments.len(), path);
            catalog
        }
        Err(e) => {
            log::warn!("catalog: {:#}, every garment uses identity calibration", e);
            GarmentCatalog::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init_timed();
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config);
    if let Some(catalog) = args.catalog {
        config.app.catalog_path = catalog;
    }
    if let Some(addr) = args.feed {
        config.feed.addr = addr;
    }
    if let Some(addr) = args.output {
        config.output.addr = addr;
    }
    config.validate()?;

    log::info!("drape-tracker {}", env!("CARGO_PKG_VERSION"));
    log::info!("feed: {}, output: {}", config.feed.addr, config.output.addr);
    log::info!("target fps: {}", config.app.target_fps);
    log::info!(
        "smoothing: input={} position={} scale={} rotation={}",
        config.smoothing.input_smoothing_factor,
        config.smoothing.output_position_smoothing_factor,
        config.smoothing.output_scale_smoothing_factor,
        config.smoothing.output_rotation_smoothing_factor,
    );

    let catalog = load_catalog(&config.app.catalog_path);
    let mut garment_id = args.garment.unwrap_or_else(|| config.app.garment.clone());
    let mut calibration: GarmentCalibration = catalog.calibration_or_identity(&garment_id);
    log::info!("garment: {}", garment_id);

    let sender = TransformSender::new(&config.output.addr)?;

    // Feed task → latest-value slot
    let (tx, mut latest) = feed::latest_channel();
    let feed_task = tokio::spawn(feed::run_feed(config.feed.clone(), tx));

    // Console input thread: garment id + Enter → switch, 'l' → list, 'q' → quit
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if let Some(cmd) = parse_command(&line) {
                        if cmd_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    eprintln!("commands: <garment id> switch, l list, q quit");

    let mut session = AlignmentSession::from_config(&config);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(
        1.0 / config.app.target_fps as f64,
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut status_time = Instant::now();
    let mut frames_since_status = 0u32;
    let mut send_errors = 0u32;

    'frame: loop {
        interval.tick().await;

        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Quit => break 'frame,
                Command::List => {
                    for id in catalog.ids() {
                        eprintln!("  {}{}", id, if id == garment_id { " *" } else { "" });
                    }
                }
                Command::Switch(id) => match catalog.switch_target(&id) {
                    Some(target) => {
                        // ガーメントごとにセッションを作り直す
                        session.close();
                        session = AlignmentSession::from_config(&config);
                        calibration = target;
                        log::info!("garment: {} -> {}", garment_id, id);
                        garment_id = id;
                    }
                    None => log::warn!("unknown garment '{}', keeping {} ('l' lists ids)", id, garment_id),
                },
            }
        }

        let landmarks = latest.take_new();
        let transform = session.process_frame(landmarks, &calibration);
        if let Err(e) = sender.send(config.output.garment_index, session.is_tracking(), &transform) {
            send_errors += 1;
            log::debug!("send failed: {}", e);
        }
        frames_since_status += 1;

        let elapsed = status_time.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let stats = session.stats();
            let fps = frames_since_status as f32 / elapsed.as_secs_f32();
            match session.last_error() {
                Some(e) => log::info!(
                    "[status] {:?} fps={:.1} tracked={} frozen={} send_err={} last_error: {}",
                    session.state(), fps, stats.tracked, stats.frozen, send_errors, e
                ),
                None => log::info!(
                    "[status] {:?} fps={:.1} tracked={} frozen={} send_err={}",
                    session.state(), fps, stats.tracked, stats.frozen, send_errors
                ),
            }
            frames_since_status = 0;
            status_time = Instant::now();
        }
    }

    // 終了時はレンダラーに非追従を通知
    let last = session.last_accepted().copied().unwrap_or_default();
    session.close();
    if let Err(e) = sender.send(config.output.garment_index, false, &last) {
        log::warn!("final send failed: {}", e);
    }
    feed_task.abort();
    log::info!("stopped");
    Ok(())
}
