use std::{path::PathBuf, sync::Arc};

use eframe::egui;
use log::info;

use crate::{
    config::Config,
    generation::{CommandProvider, ThreadDelay},
    pipeline::CompositePipeline,
    storage::{file::FileHistory, in_memory::InMemoryHistory, HistoryStore},
};

use super::EditorApp;

/// `caricature-canvas-app <image> [reference...]`
pub fn run_native() -> eframe::Result {
    env_logger::init();

    let config = Config::load("config.json").map_err(|e| eframe::Error::AppCreation(Box::new(e)))?;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size(config.viewport),
        ..Default::default()
    };
    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    info!("Run with config: {config:?}");
    let pipeline = CompositePipeline::new(Arc::new(CommandProvider::new(config.provider.clone())))
        .with_retry(config.retry, Arc::new(ThreadDelay));
    let history: Box<dyn HistoryStore> = match &config.history_dir {
        Some(dir) => Box::new(FileHistory::new(dir, config.history_limit)),
        None => Box::new(InMemoryHistory::new(config.history_limit)),
    };

    eframe::run_native(
        "Caricature canvas",
        options,
        Box::new(move |cc| Ok(Box::new(EditorApp::new(cc, &config, pipeline, history, paths)))),
    )
}
