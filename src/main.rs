use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowBuilder},
};

use sacred_player::audio::{list_output_devices, RodioFactory};
use sacred_player::config::{PlayerArgs, PlayerConfig};
use sacred_player::graphics::GraphicsContext;
use sacred_player::player::{LogNowPlaying, MediaKey, NowPlaying, NowPlayingSink, PlaybackEngine, PlayerHandle};
use sacred_player::ui::UserInterface;

const SEEK_STEP_SECS: f64 = 5.0;

/// Window title derived from now-playing updates. Only a change in the
/// track title or play state yields a new title.
struct TitleTracker {
    base_title: String,
    last: Option<(String, bool)>,
    shown: bool,
}

impl TitleTracker {
    fn new(base_title: String) -> Self {
        Self {
            base_title,
            last: None,
            shown: false,
        }
    }

    fn next_title(&mut self, now_playing: Option<&NowPlaying>) -> Option<String> {
        let key = now_playing.map(|now| (now.title.clone(), now.is_playing));
        if self.shown && key == self.last {
            return None;
        }
        self.shown = true;

        let title = match &key {
            Some((title, true)) => format!("{} - {}", title, self.base_title),
            Some((title, false)) => format!("{} (paused) - {}", title, self.base_title),
            None => self.base_title.clone(),
        };
        self.last = key;
        Some(title)
    }
}

/// Mirrors the current track into the window title.
struct WindowTitleSink {
    window: Arc<Window>,
    titles: TitleTracker,
}

impl NowPlayingSink for WindowTitleSink {
    fn publish(&mut self, now_playing: Option<&NowPlaying>) {
        if let Some(title) = self.titles.next_title(now_playing) {
            self.window.set_title(&title);
        }
    }
}

fn media_key(code: KeyCode, elapsed: f64) -> Option<MediaKey> {
    match code {
        KeyCode::MediaPlayPause | KeyCode::Space => Some(MediaKey::PlayPause),
        KeyCode::MediaTrackNext | KeyCode::KeyN => Some(MediaKey::Next),
        KeyCode::MediaTrackPrevious | KeyCode::KeyP => Some(MediaKey::Previous),
        KeyCode::ArrowRight => Some(MediaKey::SeekTo(elapsed + SEEK_STEP_SECS)),
        KeyCode::ArrowLeft => Some(MediaKey::SeekTo((elapsed - SEEK_STEP_SECS).max(0.0))),
        _ => None,
    }
}

fn dispatch_key(handle: &PlayerHandle, code: KeyCode, elapsed: f64) {
    if let Some(key) = media_key(code, elapsed) {
        handle.send(key.command());
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = PlayerArgs::parse();

    if args.list_devices {
        for name in list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = PlayerConfig::from_args(&args)?;
    info!("Starting Sacred Player");

    let runtime = tokio::runtime::Runtime::new()?;

    let factory = RodioFactory::new(config.output_device.clone(), config.media_resolver());
    let mut engine = PlaybackEngine::new(config.catalog_gateway(), Box::new(factory))
        .with_volume(config.volume())
        .with_artwork(config.artwork_url.clone());
    engine.add_now_playing_sink(Box::new(LogNowPlaying::default()));
    let events = engine.subscribe();

    match runtime.block_on(engine.load_catalog()) {
        Ok(count) => info!("Catalog loaded with {} playable tracks", count),
        Err(e) => warn!("Catalog unavailable: {}", e),
    }

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window.title.as_str())
            .with_inner_size(winit::dpi::LogicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)?,
    );
    engine.add_now_playing_sink(Box::new(WindowTitleSink {
        window: Arc::clone(&window),
        titles: TitleTracker::new(config.window.title.clone()),
    }));

    let mut graphics = pollster::block_on(GraphicsContext::new(Arc::clone(&window)))?;
    let handle = engine.handle();
    let mut ui = UserInterface::new(
        &window,
        &graphics,
        handle.clone(),
        engine.state_cell(),
        &config,
    );

    info!("Player initialized");

    let window_clone = Arc::clone(&window);
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                engine.shutdown();
                elwt.exit();
            }
            WindowEvent::Resized(physical_size) => {
                graphics.resize(physical_size);
                ui.handle_event(&WindowEvent::Resized(physical_size), &window_clone);
            }
            WindowEvent::RedrawRequested => {
                runtime.block_on(engine.process_commands());
                engine.pump();
                for event in events.try_iter() {
                    ui.observe(&event);
                }

                match graphics.begin_frame() {
                    Ok(Some(mut frame)) => {
                        if let Err(e) = ui.render(&mut frame.encoder, &frame.view, &graphics, &window_clone) {
                            log::error!("UI render error: {}", e);
                        }
                        graphics.present(frame);
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("Render error: {}", e),
                }

                let wants = ui.wants_fullscreen();
                if wants != window_clone.fullscreen().is_some() {
                    window_clone.set_fullscreen(wants.then_some(Fullscreen::Borderless(None)));
                }
            }
            other => {
                if ui.handle_event(&other, &window_clone) {
                    return;
                }
                if let WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(code),
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                    ..
                } = other
                {
                    if code == KeyCode::Escape {
                        info!("Escape pressed");
                        engine.shutdown();
                        elwt.exit();
                    } else {
                        dispatch_key(&handle, code, engine.snapshot().elapsed_secs());
                    }
                }
            }
        },
        Event::AboutToWait => {
            window_clone.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}
