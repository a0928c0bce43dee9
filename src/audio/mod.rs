pub mod analyzer;
pub mod duration;
pub mod media;
pub mod progress;
pub mod rodio_output;
pub mod tap;
pub mod transient;

pub use analyzer::{AnalyzerHandle, FrequencyAnalyzer};
pub use duration::read_duration;
pub use media::{MediaEvent, MediaFactory, MediaFetch, MediaLocation, MediaOutput, MediaResolver, Resolution};
pub use progress::ProgressTracker;
pub use rodio_output::{list_output_devices, RodioFactory, RodioOutput};
pub use tap::{SampleTap, TapSource};
pub use transient::{TransientDetector, FLASH_EPSILON};

/// Transform size of the analysis graph.
pub const FFT_SIZE: usize = 512;

/// Usable frequency bins delivered to renderers.
pub const BIN_COUNT: usize = FFT_SIZE / 2;
