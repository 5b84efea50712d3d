pub mod challenge;
pub mod classifier;
pub mod config;
pub mod console_display;
pub mod error;
pub mod gate;
pub mod lesson;
pub mod pipeline;
pub mod pitch_source;
pub mod progress;
pub mod recorder;
pub mod session;
pub mod stabilizer;
pub mod timer;
pub mod types;
