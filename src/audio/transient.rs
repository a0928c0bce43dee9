/// Flash intensity below which the overlay is not drawn at all.
pub const FLASH_EPSILON: f32 = 0.01;

/// Detects percussive hits from the frame-to-frame rise of one band level
/// and turns them into a decaying flash intensity.
///
/// Levels are normalized band averages in 0.0..=1.0, fed once per frame.
#[derive(Debug, Clone)]
pub struct TransientDetector {
    previous_level: Option<f32>,
    rise_threshold: f32,
    level_floor: f32,
    decay: f32,
    min_frames_between: u32,
    frames_since_trigger: u32,
    flash: f32,
}

impl TransientDetector {
    pub fn new() -> Self {
        Self::with_thresholds(0.07, 0.3)
    }

    pub fn with_thresholds(rise_threshold: f32, level_floor: f32) -> Self {
        Self {
            previous_level: None,
            rise_threshold,
            level_floor,
            decay: 0.85,
            min_frames_between: 4,
            frames_since_trigger: u32::MAX,
            flash: 0.0,
        }
    }

    /// Feeds this frame's level. Returns `true` when a transient fired.
    pub fn update(&mut self, level: f32) -> bool {
        self.flash *= self.decay;
        if self.flash < FLASH_EPSILON {
            self.flash = 0.0;
        }
        self.frames_since_trigger = self.frames_since_trigger.saturating_add(1);

        let rise = self
            .previous_level
            .map(|previous| level - previous)
            .unwrap_or(0.0);
        self.previous_level = Some(level);

        let can_trigger = self.frames_since_trigger > self.min_frames_between;
        let triggered = can_trigger && rise > self.rise_threshold && level > self.level_floor;

        if triggered {
            self.flash = 1.0;
            self.frames_since_trigger = 0;
        }

        triggered
    }

    pub fn flash(&self) -> f32 {
        self.flash
    }

    pub fn is_flashing(&self) -> bool {
        self.flash >= FLASH_EPSILON
    }

    pub fn reset(&mut self) {
        self.previous_level = None;
        self.frames_since_trigger = u32::MAX;
        self.flash = 0.0;
    }
}

impl Default for TransientDetector {
    fn default() -> Self {
        Self::new()
    }
}
