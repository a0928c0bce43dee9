use crossbeam_channel::{Receiver, Sender};

/// Everything an observer may ask of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    TogglePlay,
    Next,
    Previous,
    SkipTo(usize),
    /// Target position in seconds; clamped by the engine.
    Seek(f64),
    SetVolume(f32),
    /// Re-read the catalog.
    Refresh,
}

/// Cloneable command sender for surfaces that do not own the engine.
///
/// Commands are queued and applied one at a time, in the order sent, when the
/// host calls [`super::PlaybackEngine::process_commands`].
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    sender: Sender<TransportCommand>,
}

impl PlayerHandle {
    pub(crate) fn channel() -> (Self, Receiver<TransportCommand>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    /// Returns `false` once the engine is gone.
    pub fn send(&self, command: TransportCommand) -> bool {
        self.sender.send(command).is_ok()
    }

    pub fn play(&self) -> bool {
        self.send(TransportCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.send(TransportCommand::Pause)
    }

    pub fn toggle_play(&self) -> bool {
        self.send(TransportCommand::TogglePlay)
    }

    pub fn next(&self) -> bool {
        self.send(TransportCommand::Next)
    }

    pub fn previous(&self) -> bool {
        self.send(TransportCommand::Previous)
    }

    pub fn skip_to(&self, index: usize) -> bool {
        self.send(TransportCommand::SkipTo(index))
    }

    pub fn seek(&self, seconds: f64) -> bool {
        self.send(TransportCommand::Seek(seconds))
    }

    pub fn set_volume(&self, volume: f32) -> bool {
        self.send(TransportCommand::SetVolume(volume))
    }

    pub fn refresh(&self) -> bool {
        self.send(TransportCommand::Refresh)
    }
}
