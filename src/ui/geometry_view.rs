use egui::epaint::ClippedShape;
use egui::{Color32, Pos2, Rect, Response, Sense, TextureId, Ui, Vec2};
use egui_wgpu::{Renderer, ScreenDescriptor};
use log::debug;
use std::time::{Duration, Instant};

use crate::audio::AnalyzerHandle;
use crate::player::PlaybackState;
use crate::visual::{SacredGeometryRenderer, ShapeCanvas};

/// Format of the trail texture. sRGB so egui samples it like its own
/// textures.
pub const TRAIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Painter that tessellates visualizer shapes into the trail texture.
pub fn trail_painter(device: &wgpu::Device) -> Renderer {
    Renderer::new(device, TRAIL_FORMAT, None, 1)
}

/// Offscreen texture that keeps the previous frames. Each frame is drawn
/// over it, so the renderer's translucent fill fades older strokes.
struct TrailTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
    cleared: bool,
}

impl TrailTarget {
    fn new(device: &wgpu::Device, size: [u32; 2]) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sacred geometry trails"),
            size: wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TRAIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            _texture: texture,
            view,
            size,
            cleared: false,
        }
    }
}

/// The sacred-geometry visualizer as an egui widget.
///
/// `show` records the frame's shapes while the UI is built; `encode` then
/// paints them into the trail texture before the UI pass samples it.
pub struct GeometryView {
    renderer: SacredGeometryRenderer,
    canvas: ShapeCanvas,
    target: Option<TrailTarget>,
    texture_id: Option<TextureId>,
    frame_period: Duration,
    last_frame: Option<Instant>,
    pixels_per_point: f32,
    wanted: [u32; 2],
    pending: bool,
}

impl GeometryView {
    pub fn new(trail_fade: f32, frame_rate: u32) -> Self {
        Self {
            renderer: SacredGeometryRenderer::new(trail_fade),
            canvas: ShapeCanvas::default(),
            target: None,
            texture_id: None,
            frame_period: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            last_frame: None,
            pixels_per_point: 1.0,
            wanted: [1, 1],
            pending: false,
        }
    }

    pub fn renderer(&self) -> &SacredGeometryRenderer {
        &self.renderer
    }

    /// Fills the available space with the latest trail texture.
    pub fn show(&mut self, ui: &mut Ui, state: &PlaybackState, analyzer: Option<&AnalyzerHandle>, sense: Sense) -> Response {
        let size = ui.available_size();
        let (rect, response) = ui.allocate_exact_size(size, sense);
        self.draw_frame(size, ui.ctx().pixels_per_point(), state, analyzer, Instant::now());

        if let Some(id) = self.texture_id {
            let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
            ui.painter().image(id, rect, uv, Color32::WHITE);
        }
        response
    }

    /// Records one frame of shapes when the frame rate allows it.
    fn draw_frame(
        &mut self,
        size: Vec2,
        pixels_per_point: f32,
        state: &PlaybackState,
        analyzer: Option<&AnalyzerHandle>,
        now: Instant,
    ) -> bool {
        if let Some(last) = self.last_frame {
            if now.duration_since(last) < self.frame_period {
                return false;
            }
        }
        self.last_frame = Some(now);

        let size = size.max(Vec2::splat(1.0 / pixels_per_point));
        self.pixels_per_point = pixels_per_point;
        self.wanted = [
            (size.x * pixels_per_point).round().max(1.0) as u32,
            (size.y * pixels_per_point).round().max(1.0) as u32,
        ];

        self.canvas.set_rect(Rect::from_min_size(Pos2::ZERO, size));
        self.canvas.clear();
        self.renderer.draw(&mut self.canvas, state, analyzer);
        self.pending = true;
        true
    }

    /// Paints the recorded frame into the trail texture. A size change
    /// starts a fresh texture under the same egui id.
    pub fn encode(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        painter: &mut Renderer,
        ui_renderer: &mut Renderer,
        ctx: &egui::Context,
    ) {
        if !self.pending {
            return;
        }
        self.pending = false;

        if self.target.as_ref().map_or(true, |target| target.size != self.wanted) {
            let fresh = TrailTarget::new(device, self.wanted);
            match self.texture_id {
                Some(id) => ui_renderer.update_egui_texture_from_wgpu_texture(device, &fresh.view, wgpu::FilterMode::Linear, id),
                None => {
                    self.texture_id = Some(ui_renderer.register_native_texture(device, &fresh.view, wgpu::FilterMode::Linear));
                }
            }
            debug!("Trail texture sized to {}x{}", fresh.size[0], fresh.size[1]);
            self.target = Some(fresh);
        }
        let Some(target) = self.target.as_mut() else {
            return;
        };

        let clip_rect = self.canvas.rect();
        let shapes = self
            .canvas
            .take_shapes()
            .into_iter()
            .map(|shape| ClippedShape { clip_rect, shape })
            .collect();
        let primitives = ctx.tessellate(shapes, self.pixels_per_point);
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: target.size,
            pixels_per_point: self.pixels_per_point,
        };
        painter.update_buffers(device, queue, encoder, &primitives, &screen_descriptor);

        let load = if target.cleared {
            wgpu::LoadOp::Load
        } else {
            target.cleared = true;
            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("trail render pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        painter.render(&mut render_pass, &primitives, &screen_descriptor);
    }

    /// Frees the egui texture id; the view is unusable afterwards.
    pub fn release(&mut self, ui_renderer: &mut Renderer) {
        if let Some(id) = self.texture_id.take() {
            ui_renderer.free_texture(&id);
        }
        self.target = None;
        self.pending = false;
    }
}
