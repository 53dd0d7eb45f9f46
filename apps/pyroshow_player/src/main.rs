//! Plays a saved show: one mpv window per item, all slaved to one clock.

use anyhow::Context;
use clap::Parser;
use pyroshow_core::clock::{ClockEvent, FrameRequest};
use pyroshow_core::config::EngineConfig;
use pyroshow_core::engine::{MetadataLoaded, ShowEngine};
use pyroshow_core::types::{Show, TimeUs};
use pyroshow_preview::mpv::{Geometry, MpvHandle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Preview a fireworks show with synchronized playback
#[derive(Parser, Debug)]
#[command(name = "pyroshow-player")]
#[command(version)]
struct Args {
    /// Show file to play
    show: PathBuf,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame rate of the clock loop
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Open the windows without starting playback
    #[arg(long)]
    paused: bool,

    /// Keep running after the show ends
    #[arg(long)]
    stay_open: bool,

    /// Preview windows per row
    #[arg(long, default_value = "2")]
    columns: usize,

    /// Preview window size, WIDTHxHEIGHT
    #[arg(long, default_value = "640x360")]
    window: String,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

type Engine = ShowEngine<FrameRequest, MpvHandle>;

/// Commands read from stdin while the show runs.
#[derive(Debug, Clone, PartialEq)]
enum Control {
    Play,
    Pause,
    Toggle,
    Seek(f64),
    Offset(usize, String),
    Duration(String),
    Zoom(f64),
    Save(Option<PathBuf>),
    Status,
    Quit,
}

fn parse_control(line: &str) -> Option<Control> {
    let mut words = line.split_whitespace();
    let verb = words.next()?;
    let control = match verb {
        "play" => Control::Play,
        "pause" => Control::Pause,
        "t" | "toggle" => Control::Toggle,
        "seek" => Control::Seek(words.next()?.parse().ok()?),
        "offset" => {
            let index: usize = words.next()?.parse().ok()?;
            Control::Offset(index.checked_sub(1)?, words.next().unwrap_or("").to_string())
        }
        "duration" => Control::Duration(words.next().unwrap_or("").to_string()),
        "zoom" => Control::Zoom(words.next()?.parse().ok()?),
        "save" => Control::Save(words.next().map(PathBuf::from)),
        "status" => Control::Status,
        "q" | "quit" => Control::Quit,
        _ => return None,
    };
    Some(control)
}

fn parse_window(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn print_status(engine: &Engine) {
    let show = engine.show();
    println!(
        "{} {} / {} zoom {:.2}",
        if engine.is_playing() { "playing" } else { "paused" },
        engine.master_time(),
        show.total_duration_us,
        show.zoom
    );
    for (i, item) in show.items.iter().enumerate() {
        println!(
            "  {}. {} @ {} for {}",
            i + 1,
            item.name,
            item.offset_us,
            item.duration_us
        );
    }
}

/// Returns `false` when the player should exit.
fn handle_control(engine: &mut Engine, control: Control, show_path: &Path) -> anyhow::Result<bool> {
    match control {
        Control::Play => engine.play(Instant::now()),
        Control::Pause => engine.pause(),
        Control::Toggle => engine.toggle(Instant::now()),
        Control::Seek(secs) => {
            engine.seek(TimeUs::from_seconds(secs));
        }
        Control::Offset(index, input) => {
            let Some(item_id) = engine.show().items.get(index).map(|i| i.id) else {
                warn!(index = index + 1, "no such item");
                return Ok(true);
            };
            let offset = engine.set_offset_input(item_id, &input)?;
            info!(item = %item_id, %offset, "offset set");
        }
        Control::Duration(input) => {
            let total = engine.set_duration_input(&input);
            info!(%total, "duration set");
        }
        Control::Zoom(zoom) => {
            engine.set_zoom(zoom);
        }
        Control::Save(path) => {
            let path = path.unwrap_or_else(|| show_path.to_path_buf());
            engine.save(&path).with_context(|| format!("saving {}", path.display()))?;
        }
        Control::Status => print_status(engine),
        Control::Quit => return Ok(false),
    }
    Ok(true)
}

fn open_previews(engine: &mut Engine, args: &Args) -> anyhow::Result<()> {
    let (width, height) = parse_window(&args.window)
        .with_context(|| format!("bad window size {:?}", args.window))?;
    let items = engine.show().items.clone();
    let tx = engine.metadata_sender();

    for (index, item) in items.iter().enumerate() {
        let geometry = Geometry::tile(index, args.columns, width, height);
        let handle = match MpvHandle::spawn(&item.id.to_string(), &item.locator, geometry) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(item = %item.name, error = %e, "no preview; item will be skipped");
                continue;
            }
        };

        let probe = handle.probe();
        let tx = tx.clone();
        let item_id = item.id;
        tokio::task::spawn_blocking(move || match probe.wait(PROBE_TIMEOUT) {
            Ok(duration_secs) => {
                let _ = tx.send(MetadataLoaded {
                    item_id,
                    duration_secs,
                });
            }
            Err(e) => warn!(item = %item_id, error = %e, "duration unavailable"),
        });

        engine.attach_handle(item.id, handle)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let show = Show::load_from_file(&args.show)
        .with_context(|| format!("loading show {}", args.show.display()))?;
    info!(show = %show.name, items = show.items.len(), total = %show.total_duration_us, "show loaded");

    let mut engine: Engine = ShowEngine::new(show, config, FrameRequest::new(), 1000.0)?;
    open_previews(&mut engine, &args)?;

    if !args.paused {
        engine.play(Instant::now());
    }

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / args.fps.max(1) as f64));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = stdin.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                match parse_control(&line) {
                    Some(control) => match handle_control(&mut engine, control, &args.show) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => warn!(error = %e, "command failed"),
                    },
                    None => warn!(%line, "unknown command"),
                }
            }
            _ = interval.tick() => {
                if engine.clock_mut().scheduler_mut().take() {
                    let report = engine.frame(Instant::now());
                    if report.event == ClockEvent::Ended {
                        info!("show finished");
                        if !args.stay_open {
                            break;
                        }
                    }
                } else {
                    engine.apply_metadata();
                }
            }
        }
    }

    engine.pause();
    Ok(())
}
