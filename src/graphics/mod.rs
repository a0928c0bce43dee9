pub mod context;

pub use context::{Frame, GraphicsContext};
