use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use eframe::egui::{self, Color32, ColorImage, Pos2, Rect, Sense, TextureHandle, TextureId, TextureOptions, Vec2};
use futures::{future::BoxFuture, FutureExt};
use image::RgbaImage;
use log::{info, warn};

use crate::{
    async_task::UiTask,
    config::Config,
    geometry::{map_pointer, CanvasGeometry, PixelBox, PointerInput},
    image_utils::{mime_for_path, Adjustments},
    overlay::OverlayLayer,
    pipeline::{CompositePipeline, GenerationOutcome},
    raster,
    session::{EditingSession, GenerationOptions},
    storage::{HistoryEntry, HistoryRecord, HistoryStore},
};

mod menu;
mod native;

pub use native::run_native;

pub(crate) struct EditorApp {
    session: EditingSession,
    pipeline: CompositePipeline,
    history: Box<dyn HistoryStore>,
    history_items: UiTask<io::Result<Vec<HistoryEntry>>>,
    history_save: Option<UiTask<io::Result<HistoryEntry>>>,
    generation: Option<UiTask<GenerationOutcome>>,
    loading: Option<UiTask<io::Result<Vec<LoadedFile>>>>,
    /// Whether the pending load replaces the primary photo.
    loading_primary: bool,
    options: GenerationOptions,
    adjustments: Adjustments,
    overlay: OverlayLayer,
    textures: Textures,
    status: Option<String>,
    open_path: String,
    export_dir: PathBuf,
}

struct LoadedFile {
    path: PathBuf,
    bytes: Vec<u8>,
    mime: String,
}

#[derive(Default)]
struct Textures {
    working: Option<(u64, TextureHandle)>,
    overlay: Option<TextureHandle>,
    result: Option<(u64, TextureHandle)>,
}

impl EditorApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: &Config,
        pipeline: CompositePipeline,
        history: Box<dyn HistoryStore>,
        paths: Vec<PathBuf>,
    ) -> Self {
        let export_dir = paths
            .first()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ".".into());
        let history_items = UiTask::new(history.list_all());
        let mut app = Self {
            session: EditingSession::new(config.brush, config.stamp),
            pipeline,
            history,
            history_items,
            history_save: None,
            generation: None,
            loading: None,
            loading_primary: true,
            options: GenerationOptions {
                style: config.style,
                quality: config.quality,
                instructions: String::new(),
            },
            adjustments: Adjustments::default(),
            overlay: OverlayLayer::new(0, 0),
            textures: Textures::default(),
            status: None,
            open_path: String::new(),
            export_dir,
        };
        if !paths.is_empty() {
            app.load(paths, true);
        }
        app
    }

    fn load(&mut self, paths: Vec<PathBuf>, primary: bool) {
        self.loading_primary = primary;
        self.loading = Some(UiTask::new(read_files(paths)));
    }

    fn start_generation(&mut self) {
        match self.session.begin_generation(&self.options) {
            Ok(prepared) => {
                info!("Dispatch to {}", self.pipeline.provider().name());
                self.status = None;
                self.generation = Some(UiTask::new(self.pipeline.run(prepared)));
            }
            Err(e) => self.status = Some(e.user_message()),
        }
    }

    fn store(&mut self, record: HistoryRecord) {
        self.history_save = Some(UiTask::new(self.history.append(record)));
    }

    fn poll_tasks(&mut self, ctx: &egui::Context) {
        if let Some(files) = self.loading.as_mut().and_then(UiTask::take) {
            self.loading = None;
            match files {
                Ok(files) => self.apply_loaded(files),
                Err(e) => self.status = Some(format!("Could not open file: {e}")),
            }
        }

        if let Some(outcome) = self.generation.as_mut().and_then(UiTask::take) {
            self.generation = None;
            match self.session.finish_generation(outcome) {
                Ok(Some(record)) => {
                    self.adjustments = Adjustments::default();
                    self.store(record);
                }
                Ok(None) => {}
                Err(e) => self.status = Some(e.user_message()),
            }
        }

        if let Some(saved) = self.history_save.as_mut().and_then(UiTask::take) {
            self.history_save = None;
            match saved {
                Ok(entry) => {
                    info!("Saved history entry {}", entry.id);
                    self.history_items = UiTask::new(self.history.list_all());
                }
                Err(e) => warn!("Could not save history: {e}"),
            }
        }

        let pending = self.loading.is_some()
            || self.generation.is_some()
            || self.history_save.is_some()
            || self.history_items.is_pending();
        if pending {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn apply_loaded(&mut self, files: Vec<LoadedFile>) {
        let mut files = files.into_iter();
        if self.loading_primary {
            let Some(first) = files.next() else {
                return;
            };
            if let Err(e) = self.session.load_primary(first.bytes, &first.mime) {
                self.status = Some(format!("{}: {}", first.path.display(), e.user_message()));
                return;
            }
            if let Some(parent) = first.path.parent() {
                self.export_dir = parent.to_path_buf();
            }
        }
        for file in files {
            if let Err(e) = self.session.add_reference(file.bytes, &file.mime) {
                self.status = Some(format!("{}: {}", file.path.display(), e.user_message()));
            }
        }
    }

    fn canvas_ui(&mut self, ui: &mut egui::Ui) {
        let Some(natural) = self
            .session
            .working()
            .map(|w| Vec2::new(w.width() as f32, w.height() as f32))
        else {
            ui.centered_and_justified(|ui| ui.label("Open a photo to start"));
            return;
        };

        let geometry = CanvasGeometry::fit(ui.available_rect_before_wrap(), natural);
        let response = ui.allocate_rect(geometry.displayed, Sense::click_and_drag());
        self.handle_pointer(ui, &response, &geometry);

        let ctx = ui.ctx().clone();
        let session = &self.session;
        let working = sync_texture(
            &ctx,
            &mut self.textures.working,
            "working",
            session.pixels_revision(),
            || session.working().map(to_color_image),
        );
        let overlay = match session.overlay_scene() {
            Some(scene) => {
                let dirty = self.overlay.update(&scene);
                Some(sync_overlay(&ctx, &mut self.textures.overlay, &self.overlay, dirty))
            }
            None => {
                self.textures.overlay = None;
                None
            }
        };

        let painter = ui.painter_at(geometry.displayed);
        let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        for id in [working, overlay].into_iter().flatten() {
            painter.image(id, geometry.displayed, uv, Color32::WHITE);
        }
    }

    fn handle_pointer(&mut self, ui: &egui::Ui, response: &egui::Response, geometry: &CanvasGeometry) {
        let (pressed, released, moved, mouse, touches) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.delta() != Vec2::ZERO,
                i.pointer.latest_pos(),
                i.events
                    .iter()
                    .filter_map(|e| match e {
                        egui::Event::Touch { pos, .. } => Some(*pos),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
        });
        let input = match (touches.is_empty(), mouse) {
            (false, _) => Some(PointerInput::Touch(&touches)),
            (true, Some(pos)) => Some(PointerInput::Mouse(pos)),
            (true, None) => None,
        };
        let point = input.and_then(|input| map_pointer(Some(geometry), input));

        if pressed && response.hovered() {
            if let Some(p) = point {
                self.session.pointer_down(p);
            }
        } else if moved && self.session.drawing().is_drawing {
            if let Some(p) = point {
                self.session.pointer_move(p);
            }
        }
        if released {
            if let Err(e) = self.session.pointer_up() {
                self.status = Some(e.user_message());
            }
        }
        if !self.session.drawing().is_drawing {
            self.session
                .pointer_hover(point.filter(|_| response.hovered()));
        }
    }
}

impl eframe::App for EditorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_tasks(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar_ui(ui));
        egui::TopBottomPanel::bottom("targets").show(ctx, |ui| self.targets_ui(ui));
        egui::SidePanel::right("generation")
            .min_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.generation_ui(ui);
                    ui.separator();
                    self.history_ui(ui);
                })
            });
        egui::CentralPanel::default().show(ctx, |ui| self.canvas_ui(ui));
    }
}

fn to_color_image(image: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied(
        [image.width() as usize, image.height() as usize],
        image.as_raw(),
    )
}

/// Re-uploads a texture when `revision` moved on; `None` once there is nothing to show.
fn sync_texture(
    ctx: &egui::Context,
    slot: &mut Option<(u64, TextureHandle)>,
    name: &str,
    revision: u64,
    render: impl FnOnce() -> Option<ColorImage>,
) -> Option<TextureId> {
    if slot.as_ref().is_none_or(|(current, _)| *current != revision) {
        match (render(), slot.as_mut()) {
            (Some(image), Some((current, handle))) => {
                handle.set(image, TextureOptions::LINEAR);
                *current = revision;
            }
            (Some(image), None) => {
                *slot = Some((revision, ctx.load_texture(name, image, TextureOptions::LINEAR)));
            }
            (None, _) => *slot = None,
        }
    }
    slot.as_ref().map(|(_, handle)| handle.id())
}

/// Uploads only the repainted part of the overlay once a texture of the right size exists.
fn sync_overlay(
    ctx: &egui::Context,
    slot: &mut Option<TextureHandle>,
    layer: &OverlayLayer,
    dirty: Option<PixelBox>,
) -> TextureId {
    let image = layer.image();
    let size = [image.width() as usize, image.height() as usize];
    match slot {
        Some(handle) if handle.size() == size => {
            if let Some(dirty) = dirty {
                let patch = to_color_image(&raster::crop(image, dirty));
                handle.set_partial([dirty.x as usize, dirty.y as usize], patch, TextureOptions::LINEAR);
            }
            handle.id()
        }
        _ => slot
            .insert(ctx.load_texture("overlay", to_color_image(image), TextureOptions::LINEAR))
            .id(),
    }
}

fn read_files(paths: Vec<PathBuf>) -> BoxFuture<'static, io::Result<Vec<LoadedFile>>> {
    let (tx, rx) = futures::channel::oneshot::channel();
    std::thread::spawn(move || {
        let result = paths
            .into_iter()
            .map(|path| -> io::Result<LoadedFile> {
                let bytes = std::fs::read(&path)?;
                let mime = mime_for_path(&path)
                    .unwrap_or("application/octet-stream")
                    .to_string();
                Ok(LoadedFile { path, bytes, mime })
            })
            .collect::<io::Result<Vec<_>>>();
        let _ = tx.send(result);
    });
    async move { rx.await.map_err(io::Error::other).and_then(|r| r) }.boxed()
}
