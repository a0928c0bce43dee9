//! Desktop observer surfaces: mini player, expanded track list, side widget
//! and the visualizer view.
//!
//! None of them keep playback state of their own. Each frame reads the
//! engine's [`StateCell`] and every button goes through [`PlayerHandle`].

pub mod geometry_view;

pub use geometry_view::GeometryView;

use anyhow::Result;
use egui::{Color32, RichText, Sense};
use egui_wgpu::Renderer;
use egui_winit::State;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use wgpu::{CommandEncoder, TextureView};
use winit::{event::WindowEvent, window::Window};

use crate::audio::BIN_COUNT;
use crate::config::PlayerConfig;
use crate::graphics::GraphicsContext;
use crate::player::{PlaybackEvent, PlaybackState, PlayerHandle, StateCell};
use crate::visual::{BandLevels, Motif, ShapeCanvas, WaveformProgress};

const NOTICE_LIFETIME: Duration = Duration::from_secs(4);
const WAVEFORM_HEIGHT: f32 = 40.0;

/// `m:ss`, or `--:--` when unknown.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub struct UserInterface {
    context: egui::Context,
    state: State,
    renderer: Renderer,
    trail_painter: Renderer,
    handle: PlayerHandle,
    cell: StateCell,
    frame_rate: u32,
    trail_fade: f32,
    waveform_slots: usize,
    visualizer: Option<GeometryView>,
    waveform: Option<WaveformProgress>,
    show_visualizer: bool,
    show_track_list: bool,
    show_side_widget: bool,
    fullscreen: bool,
    notices: VecDeque<(String, Instant)>,
    meter_bins: [u8; BIN_COUNT],
}

impl UserInterface {
    pub fn new(
        window: &Window,
        graphics: &GraphicsContext,
        handle: PlayerHandle,
        cell: StateCell,
        config: &PlayerConfig,
    ) -> Self {
        let context = egui::Context::default();
        context.set_visuals(egui::Visuals::dark());

        let egui_state = State::new(context.clone(), egui::ViewportId::ROOT, window, None, None);
        let renderer = Renderer::new(&graphics.device, graphics.format(), None, 1);
        let trail_painter = geometry_view::trail_painter(&graphics.device);

        Self {
            context,
            state: egui_state,
            renderer,
            trail_painter,
            handle,
            cell,
            frame_rate: config.frame_rate,
            trail_fade: config.trail_fade(),
            waveform_slots: config.waveform_slots,
            visualizer: None,
            waveform: None,
            show_visualizer: true,
            show_track_list: false,
            show_side_widget: true,
            fullscreen: false,
            notices: VecDeque::new(),
            meter_bins: [0; BIN_COUNT],
        }
    }

    /// Returns `true` when egui consumed the event.
    pub fn handle_event(&mut self, event: &WindowEvent, window: &Window) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    pub fn observe(&mut self, event: &PlaybackEvent) {
        if let PlaybackEvent::Notice(message) = event {
            self.notices.push_back((message.clone(), Instant::now()));
            while self.notices.len() > 3 {
                self.notices.pop_front();
            }
        }
    }

    pub fn wants_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn render(
        &mut self,
        encoder: &mut CommandEncoder,
        target: &TextureView,
        graphics: &GraphicsContext,
        window: &Window,
    ) -> Result<()> {
        let raw_input = self.state.take_egui_input(window);

        let context = self.context.clone();
        let full_output = context.run(raw_input, |ctx| self.ui_content(ctx));

        self.state.handle_platform_output(window, full_output.platform_output);

        let tris = context.tessellate(full_output.shapes, full_output.pixels_per_point);

        // The trail painter needs the font atlas too: solid shapes sample
        // its white texel.
        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer.update_texture(&graphics.device, &graphics.queue, *id, image_delta);
            self.trail_painter.update_texture(&graphics.device, &graphics.queue, *id, image_delta);
        }

        if let Some(view) = self.visualizer.as_mut() {
            view.encode(
                &graphics.device,
                &graphics.queue,
                encoder,
                &mut self.trail_painter,
                &mut self.renderer,
                &context,
            );
        }

        let size = graphics.size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        self.renderer
            .update_buffers(&graphics.device, &graphics.queue, encoder, &tris, &screen_descriptor);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.renderer.render(&mut render_pass, &tris, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
            self.trail_painter.free_texture(id);
        }

        Ok(())
    }

    fn ui_content(&mut self, ctx: &egui::Context) {
        let state = self.cell.snapshot();

        ctx.input(|input| {
            if input.key_pressed(egui::Key::F) {
                self.fullscreen = !self.fullscreen;
            }
            if input.key_pressed(egui::Key::V) {
                self.show_visualizer = !self.show_visualizer;
            }
            if input.key_pressed(egui::Key::L) {
                self.show_track_list = !self.show_track_list;
            }
            if input.key_pressed(egui::Key::W) {
                self.show_side_widget = !self.show_side_widget;
            }
        });

        if self.fullscreen {
            self.waveform = None;
        } else {
            egui::TopBottomPanel::bottom("mini_player").show(ctx, |ui| self.mini_player(ui, &state));

            if self.show_side_widget {
                egui::SidePanel::right("side_widget")
                    .default_width(220.0)
                    .show(ctx, |ui| self.side_widget(ui, &state));
            }

            if self.show_track_list {
                let mut open = true;
                egui::Window::new("Tracks")
                    .open(&mut open)
                    .default_pos([16.0, 16.0])
                    .default_width(320.0)
                    .show(ctx, |ui| self.expanded_player(ui, &state));
                self.show_track_list = open;
            }
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| self.visualizer_view(ui, &state));

        self.show_notices(ctx);
        ctx.request_repaint();
    }

    fn visualizer_view(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        if !(self.show_visualizer || self.fullscreen) {
            if let Some(mut view) = self.visualizer.take() {
                view.release(&mut self.renderer);
            }
            ui.centered_and_justified(|ui| {
                ui.label(RichText::new("Visualizer hidden (V to show)").weak());
            });
            return;
        }

        let (frame_rate, trail_fade) = (self.frame_rate, self.trail_fade);
        let analyzer = self.cell.analyzer();
        let view = self
            .visualizer
            .get_or_insert_with(|| GeometryView::new(trail_fade, frame_rate));

        let response = view.show(ui, state, analyzer.as_ref(), Sense::click());
        if response.double_clicked() {
            self.fullscreen = !self.fullscreen;
        }
    }

    fn mini_player(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui.button("Prev").clicked() {
                self.handle.previous();
            }
            let label = if state.is_playing { "Pause" } else { "Play" };
            if ui.button(label).clicked() {
                self.handle.toggle_play();
            }
            if ui.button("Next").clicked() {
                self.handle.next();
            }

            ui.separator();
            match state.current_track() {
                Some(track) => {
                    ui.label(RichText::new(track.display_title()).strong());
                    if let Some(frequency) = &track.frequency {
                        ui.label(RichText::new(frequency).weak());
                    }
                }
                None => {
                    ui.label(RichText::new("No tracks available").weak());
                }
            }

            ui.separator();
            ui.label(format!(
                "{} / {}",
                format_time(state.elapsed_secs()),
                format_time(state.duration_secs())
            ));

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let mut volume = state.volume;
                if ui
                    .add(egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false))
                    .changed()
                {
                    self.handle.set_volume(volume);
                }
                ui.label("Volume");
                if ui.button("Tracks").clicked() {
                    self.show_track_list = !self.show_track_list;
                }
            });
        });

        let slots = self.waveform_slots;
        let analyzer = self.cell.analyzer();
        let waveform = self.waveform.get_or_insert_with(|| WaveformProgress::new(slots));

        let size = egui::vec2(ui.available_width(), WAVEFORM_HEIGHT);
        let (response, painter) = ui.allocate_painter(size, Sense::click());
        let mut canvas = ShapeCanvas::new(response.rect);
        waveform.draw(&mut canvas, state, analyzer.as_ref());
        painter.extend(canvas.take_shapes());
        if response.clicked() {
            if let Some(pointer) = response.interact_pointer_pos() {
                let target = WaveformProgress::seek_target(
                    pointer.x - response.rect.left(),
                    response.rect.width(),
                    state.duration_secs(),
                );
                self.handle.seek(target);
            }
        }
        ui.add_space(4.0);
    }

    fn expanded_player(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        ui.horizontal(|ui| {
            ui.heading("Tracks");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Refresh").clicked() {
                    self.handle.refresh();
                }
            });
        });
        ui.separator();

        if state.tracks.is_empty() {
            ui.label(RichText::new("The catalog has no playable tracks yet.").weak());
            return;
        }

        egui::ScrollArea::vertical().max_height(360.0).show(ui, |ui| {
            for (index, track) in state.tracks.iter().enumerate() {
                let selected = index == state.current_index;
                let text = match &track.frequency {
                    Some(frequency) => format!("{}  ·  {}", track.display_title(), frequency),
                    None => track.display_title().to_string(),
                };
                if ui.selectable_label(selected, text).clicked() && !selected {
                    self.handle.skip_to(index);
                }
            }
        });

        ui.separator();
        ui.label(format!("Motif: {}", Motif::for_track(state.current_index).name()));
    }

    fn side_widget(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        ui.heading("Now playing");
        ui.separator();

        let Some(track) = state.current_track() else {
            ui.label(RichText::new("Nothing selected").weak());
            return;
        };

        ui.label(RichText::new(track.display_title()).strong());
        if let Some(frequency) = &track.frequency {
            ui.label(frequency);
        }
        ui.label(RichText::new(Motif::for_track(state.current_index).name()).weak());

        ui.horizontal(|ui| {
            let label = if state.is_playing { "Pause" } else { "Play" };
            if ui.button(label).clicked() {
                self.handle.toggle_play();
            }
            if ui.button("Next").clicked() {
                self.handle.next();
            }
        });

        ui.add(egui::ProgressBar::new(state.progress() as f32).text(format_time(state.elapsed_secs())));

        match (state.is_playing, self.cell.analyzer()) {
            (true, Some(analyzer)) => analyzer.fill(&mut self.meter_bins),
            _ => self.meter_bins.fill(0),
        }
        let levels = BandLevels::from_bins(&self.meter_bins);
        ui.separator();
        for (name, level) in [("Bass", levels.bass), ("Mid", levels.mid), ("High", levels.high)] {
            ui.add(egui::ProgressBar::new(level).text(name));
        }
    }

    fn show_notices(&mut self, ctx: &egui::Context) {
        self.notices
            .retain(|(_, raised)| raised.elapsed() < NOTICE_LIFETIME);
        if self.notices.is_empty() {
            return;
        }

        egui::Area::new(egui::Id::new("notices"))
            .anchor(egui::Align2::RIGHT_TOP, [-16.0, 16.0])
            .show(ctx, |ui| {
                for (message, _) in &self.notices {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.label(RichText::new(message).color(Color32::LIGHT_RED));
                    });
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_format_as_minutes_and_seconds() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(59.9), "0:59");
        assert_eq!(format_time(61.0), "1:01");
        assert_eq!(format_time(3_600.0), "60:00");
        assert_eq!(format_time(f64::NAN), "--:--");
        assert_eq!(format_time(-1.0), "--:--");
    }
}
