mod app;
mod async_task;
mod config;
mod error;
pub mod generation;
pub mod geometry;
pub mod image_utils;
pub mod overlay;
pub mod pipeline;
pub mod raster;
pub mod selection;
pub mod session;
pub mod storage;

pub use app::run_native;
pub use async_task::UiTask;
pub use config::{Config, ConfigError};
pub use error::EditorError;
pub use futures::future::BoxFuture;
pub use pipeline::{CompositePipeline, CropInfo, GenerationOutcome, PreparedGeneration};
pub use session::{EditingSession, GenerationOptions, GenerationTicket, TargetId};
