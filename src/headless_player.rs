use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::io::Write;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use sacred_player::audio::{list_output_devices, RodioFactory};
use sacred_player::config::{PlayerArgs, PlayerConfig};
use sacred_player::player::{LogNowPlaying, PlaybackEngine, PlaybackEvent, StateCell, TransportCommand};
use sacred_player::visual::{BandLevels, RenderLoop, SpectrumSource};

const TICK: Duration = Duration::from_millis(50);
const METER_FPS: u32 = 10;
const METER_WIDTH: usize = 20;

const HELP: &str = "commands: play | pause | toggle | next | prev | skip <n> | seek <secs> | vol <0-1> | refresh | list | quit";

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Transport(TransportCommand),
    List,
    Help,
    Quit,
}

fn parse_line(line: &str) -> Result<Line, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let argument = words.next();

    let number = |name: &str| -> Result<f64, String> {
        argument
            .ok_or_else(|| format!("{name} needs a value"))?
            .parse::<f64>()
            .map_err(|e| format!("bad {name} value: {e}"))
    };

    let line = match verb.to_ascii_lowercase().as_str() {
        "play" => Line::Transport(TransportCommand::Play),
        "pause" => Line::Transport(TransportCommand::Pause),
        "toggle" | "t" => Line::Transport(TransportCommand::TogglePlay),
        "next" | "n" => Line::Transport(TransportCommand::Next),
        "prev" | "previous" | "p" => Line::Transport(TransportCommand::Previous),
        "skip" => {
            let index = argument
                .ok_or("skip needs a track number")?
                .parse::<usize>()
                .map_err(|e| format!("bad track number: {e}"))?;
            // Track numbers are shown 1-based by `list`.
            let index = index.checked_sub(1).ok_or("track numbers start at 1")?;
            Line::Transport(TransportCommand::SkipTo(index))
        }
        "seek" => Line::Transport(TransportCommand::Seek(number("seek")?)),
        "vol" | "volume" => Line::Transport(TransportCommand::SetVolume(number("volume")? as f32)),
        "refresh" => Line::Transport(TransportCommand::Refresh),
        "list" | "ls" => Line::List,
        "help" | "?" => Line::Help,
        "quit" | "exit" | "q" => Line::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(line)
}

fn meter_bar(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
    format!("{}{}", "#".repeat(filled), ".".repeat(METER_WIDTH - filled))
}

fn meter_line(levels: &BandLevels, ambient: bool) -> String {
    format!(
        "bass [{}] mid [{}] high [{}]{}",
        meter_bar(levels.bass),
        meter_bar(levels.mid),
        meter_bar(levels.high),
        if ambient { " (ambient)" } else { "" }
    )
}

fn start_meter(cell: StateCell) -> RenderLoop {
    let mut spectrum = SpectrumSource::default();
    RenderLoop::start(&tokio::runtime::Handle::current(), "band-meter", METER_FPS, move |frame| {
        let state = cell.snapshot();
        let analyzer = cell.analyzer();
        let time = frame as f32 / METER_FPS as f32;
        let levels = BandLevels::from_bins(spectrum.sample(analyzer.as_ref(), state.is_playing, time));

        if state.is_playing {
            print!("\r{}", meter_line(&levels, spectrum.is_ambient()));
            let _ = std::io::stdout().flush();
        }
        ControlFlow::Continue(())
    })
}

fn print_tracks(engine: &PlaybackEngine) {
    let tracks = engine.tracks();
    if tracks.is_empty() {
        println!("no playable tracks");
        return;
    }
    for (index, track) in tracks.iter().enumerate() {
        let marker = if index == engine.current_index() { ">" } else { " " };
        println!(
            "{marker} {:>2}. {}  {}",
            index + 1,
            track.display_title(),
            track.frequency.as_deref().unwrap_or("")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = PlayerArgs::parse();

    if args.list_devices {
        for name in list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = PlayerConfig::from_args(&args)?;
    info!("Starting headless Sacred Player");

    let factory = RodioFactory::new(config.output_device.clone(), config.media_resolver());
    let mut engine = PlaybackEngine::new(config.catalog_gateway(), Box::new(factory))
        .with_volume(config.volume())
        .with_artwork(config.artwork_url.clone());
    engine.add_now_playing_sink(Box::new(LogNowPlaying::default()));
    let events = engine.subscribe();
    let handle = engine.handle();

    match engine.load_catalog().await {
        Ok(count) => info!("Catalog loaded with {} playable tracks", count),
        Err(e) => warn!("Catalog unavailable: {}", e),
    }
    print_tracks(&engine);
    println!("{HELP}");

    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let _meter = start_meter(engine.state_cell());
    let mut ticker = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.process_commands().await;
                engine.pump();
                for event in events.try_iter() {
                    if let PlaybackEvent::Notice(message) = event {
                        println!("\n! {message}");
                    }
                }
            }
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(Line::Transport(command)) => {
                        handle.send(command);
                    }
                    Ok(Line::List) => print_tracks(&engine),
                    Ok(Line::Help) => println!("{HELP}"),
                    Ok(Line::Quit) => break,
                    Err(message) => println!("{message}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    println!();
    engine.shutdown();
    Ok(())
}
