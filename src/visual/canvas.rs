use egui::{Color32, Pos2, Rect, Shape, Stroke};
use glam::Vec2;

/// 8-bit straight-alpha color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Same color with its alpha scaled by `opacity` (0.0..=1.0).
    pub fn with_opacity(self, opacity: f32) -> Self {
        let opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            a: (self.a as f32 * opacity).round() as u8,
            ..self
        }
    }

    /// Linear mix toward `other`; `t = 0` is `self`.
    pub fn lerp(self, other: Rgba, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

impl From<Rgba> for Color32 {
    fn from(c: Rgba) -> Self {
        Color32::from_rgba_unmultiplied(c.r, c.g, c.b, c.a)
    }
}

/// The 2D drawing surface renderers paint on.
///
/// Coordinates are in points with the origin at the top-left of the
/// surface. Every call alpha-blends over what is already there.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Blends `color` over the whole surface.
    fn fill(&mut self, color: Rgba);
    fn fill_rect(&mut self, origin: Vec2, size: Vec2, color: Rgba);
    fn line(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba);
    fn circle(&mut self, center: Vec2, radius: f32, width: f32, color: Rgba);
    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba);
    /// Closed outline through `points`.
    fn polygon(&mut self, points: &[Vec2], width: f32, color: Rgba);

    fn center(&self) -> Vec2 {
        Vec2::new(self.width() as f32 * 0.5, self.height() as f32 * 0.5)
    }

    fn min_side(&self) -> f32 {
        self.width().min(self.height()) as f32
    }
}

/// Records draw calls as epaint shapes, offset into `rect`.
///
/// The egui painter or the trail pass turns them into GPU geometry; nothing
/// is rasterized on the CPU. Fully transparent draws are dropped.
#[derive(Debug, Clone)]
pub struct ShapeCanvas {
    rect: Rect,
    shapes: Vec<Shape>,
}

impl Default for ShapeCanvas {
    fn default() -> Self {
        Self::new(Rect::ZERO)
    }
}

impl ShapeCanvas {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            shapes: Vec::new(),
        }
    }

    /// Surface of `width` x `height` points anchored at the origin.
    pub fn sized(width: f32, height: f32) -> Self {
        Self::new(Rect::from_min_size(Pos2::ZERO, egui::vec2(width.max(0.0), height.max(0.0))))
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect;
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn take_shapes(&mut self) -> Vec<Shape> {
        std::mem::take(&mut self.shapes)
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    fn pos(&self, p: Vec2) -> Pos2 {
        self.rect.min + egui::vec2(p.x, p.y)
    }

    fn push(&mut self, color: Rgba, shape: impl FnOnce(&Self, Color32) -> Shape) {
        if color.a > 0 {
            let shape = shape(self, color.into());
            self.shapes.push(shape);
        }
    }
}

impl Canvas for ShapeCanvas {
    fn width(&self) -> u32 {
        self.rect.width().max(0.0) as u32
    }

    fn height(&self) -> u32 {
        self.rect.height().max(0.0) as u32
    }

    fn fill(&mut self, color: Rgba) {
        self.push(color, |canvas, color| Shape::rect_filled(canvas.rect, 0.0, color));
    }

    fn fill_rect(&mut self, origin: Vec2, size: Vec2, color: Rgba) {
        if size.x <= 0.0 || size.y <= 0.0 {
            return;
        }
        self.push(color, |canvas, color| {
            let rect = Rect::from_min_size(canvas.pos(origin), egui::vec2(size.x, size.y));
            Shape::rect_filled(rect, 0.0, color)
        });
    }

    fn line(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba) {
        self.push(color, |canvas, color| {
            Shape::line_segment([canvas.pos(from), canvas.pos(to)], Stroke::new(width, color))
        });
    }

    fn circle(&mut self, center: Vec2, radius: f32, width: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        self.push(color, |canvas, color| {
            Shape::circle_stroke(canvas.pos(center), radius, Stroke::new(width, color))
        });
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        self.push(color, |canvas, color| Shape::circle_filled(canvas.pos(center), radius, color));
    }

    fn polygon(&mut self, points: &[Vec2], width: f32, color: Rgba) {
        if points.len() < 2 {
            return;
        }
        self.push(color, |canvas, color| {
            let points = points.iter().map(|p| canvas.pos(*p)).collect();
            Shape::closed_line(points, Stroke::new(width, color))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_are_offset_into_the_target_rect() {
        let rect = Rect::from_min_size(Pos2::new(100.0, 50.0), egui::vec2(40.0, 20.0));
        let mut canvas = ShapeCanvas::new(rect);
        assert_eq!((canvas.width(), canvas.height()), (40, 20));
        assert_eq!(canvas.center(), Vec2::new(20.0, 10.0));

        canvas.fill_circle(Vec2::new(10.0, 10.0), 5.0, Rgba::WHITE);
        let bounds = canvas.shapes()[0].visual_bounding_rect();
        assert_eq!(bounds.center(), Pos2::new(110.0, 60.0));
        assert_eq!(bounds.width(), 10.0);
    }

    #[test]
    fn fill_covers_the_whole_surface() {
        let mut canvas = ShapeCanvas::sized(64.0, 32.0);
        canvas.fill(Rgba::BLACK.with_opacity(0.5));

        match &canvas.shapes()[0] {
            Shape::Rect(rect) => {
                assert_eq!(rect.rect, canvas.rect());
                assert_eq!(rect.fill, Color32::from_rgba_unmultiplied(0, 0, 0, 128));
            }
            other => panic!("expected a rect, got {other:?}"),
        }
    }

    #[test]
    fn invisible_draws_are_skipped() {
        let mut canvas = ShapeCanvas::sized(10.0, 10.0);
        canvas.fill(Rgba::BLACK.with_opacity(0.0));
        canvas.circle(Vec2::ZERO, 0.0, 1.0, Rgba::WHITE);
        canvas.fill_rect(Vec2::ZERO, Vec2::new(0.0, 4.0), Rgba::WHITE);
        canvas.polygon(&[Vec2::ZERO], 1.0, Rgba::WHITE);
        assert!(canvas.shapes().is_empty());

        canvas.line(Vec2::ZERO, Vec2::new(10.0, 10.0), 1.0, Rgba::WHITE);
        canvas.polygon(&[Vec2::ZERO, Vec2::X, Vec2::Y], 1.0, Rgba::WHITE);
        assert_eq!(canvas.shapes().len(), 2);
        assert_eq!(canvas.take_shapes().len(), 2);
        assert!(canvas.shapes().is_empty());
    }

    #[test]
    fn zero_sized_surface_reports_zero_extent() {
        let canvas = ShapeCanvas::sized(-5.0, 0.0);
        assert_eq!((canvas.width(), canvas.height()), (0, 0));
        assert_eq!(canvas.min_side(), 0.0);
    }

    #[test]
    fn opacity_and_lerp() {
        assert_eq!(Rgba::WHITE.with_opacity(0.0).a, 0);
        assert_eq!(Rgba::WHITE.with_opacity(f32::NAN).a, 0);
        assert_eq!(Rgba::BLACK.lerp(Rgba::WHITE, 1.0), Rgba::WHITE);
        assert_eq!(Rgba::BLACK.lerp(Rgba::WHITE, 0.5).r, 128);
        assert_eq!(Color32::from(Rgba::rgb(10, 20, 30)), Color32::from_rgb(10, 20, 30));
    }
}
