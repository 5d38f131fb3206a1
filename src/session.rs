use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use image::RgbaImage;
use log::{debug, info, warn};

use crate::{
    generation::{ArtStyle, EncodedImage, Quality},
    geometry::Point,
    image_utils::{decode, encode_for_mime, encode_png, export, validate_mime, Adjustments, ExportFormat, WHITE},
    overlay::OverlayScene,
    pipeline::{self, GenerationOutcome, PreparedGeneration},
    raster::{self, BrushSettings, StampSettings, StampSource},
    selection::{DrawingSession, Selection, SelectionModel, Tool},
    storage::HistoryRecord,
    EditorError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    Primary,
    Reference(u64),
}

/// Stored bytes of a photo. Replaced on every commit.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetImage {
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

impl TargetImage {
    pub fn encoded(&self) -> EncodedImage {
        EncodedImage {
            bytes: self.bytes.clone(),
            mime: self.mime.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub id: u64,
    pub image: TargetImage,
    /// Set by [`EditingSession::apply_crop_to_reference`].
    pub cropped: Option<EncodedImage>,
}

impl ReferenceImage {
    pub fn for_generation(&self) -> EncodedImage {
        self.cropped.clone().unwrap_or_else(|| self.image.encoded())
    }
}

/// Identifies one dispatched generation so late results can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationTicket {
    pub id: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub style: ArtStyle,
    pub quality: Quality,
    pub instructions: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedResult {
    /// As returned by the pipeline, before adjustments.
    pub base: Arc<RgbaImage>,
    /// What is shown and exported.
    pub image: Arc<RgbaImage>,
    pub style: ArtStyle,
    pub adjustments: Adjustments,
}

impl GeneratedResult {
    fn new(image: RgbaImage, style: ArtStyle) -> Self {
        let image = Arc::new(image);
        Self {
            base: image.clone(),
            image,
            style,
            adjustments: Adjustments::default(),
        }
    }
}

/// The whole editing state of one window: photos, working raster, tools,
/// selection and the generation in flight.
#[derive(Default)]
pub struct EditingSession {
    primary: Option<TargetImage>,
    references: Vec<ReferenceImage>,
    next_reference_id: u64,
    active: Option<TargetId>,
    working: Option<RgbaImage>,
    selection: SelectionModel,
    stamp: Option<StampSource>,
    brush: BrushSettings,
    stamp_settings: StampSettings,
    cursor: Option<Point>,
    in_flight: Option<GenerationTicket>,
    next_ticket: u64,
    generated: Option<GeneratedResult>,
    pixels_revision: u64,
    result_revision: u64,
}

impl EditingSession {
    pub fn new(brush: BrushSettings, stamp_settings: StampSettings) -> Self {
        Self {
            brush,
            stamp_settings,
            ..Default::default()
        }
    }

    pub fn primary(&self) -> Option<&TargetImage> {
        self.primary.as_ref()
    }

    pub fn references(&self) -> &[ReferenceImage] {
        &self.references
    }

    pub fn active_target(&self) -> TargetId {
        self.active.unwrap_or(TargetId::Primary)
    }

    pub fn working(&self) -> Option<&RgbaImage> {
        self.working.as_ref()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.selection()
    }

    pub fn drawing(&self) -> &DrawingSession {
        self.selection.drawing()
    }

    pub fn tool(&self) -> Tool {
        self.selection.tool()
    }

    pub fn stamp(&self) -> Option<&StampSource> {
        self.stamp.as_ref()
    }

    pub fn brush(&self) -> BrushSettings {
        self.brush
    }

    pub fn stamp_settings(&self) -> StampSettings {
        self.stamp_settings
    }

    pub fn generated(&self) -> Option<&GeneratedResult> {
        self.generated.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Changes whenever the working raster does.
    pub fn pixels_revision(&self) -> u64 {
        self.pixels_revision
    }

    pub fn result_revision(&self) -> u64 {
        self.result_revision
    }

    fn ensure_idle(&self) -> Result<(), EditorError> {
        match self.in_flight {
            Some(_) => Err(EditorError::Busy),
            None => Ok(()),
        }
    }

    fn pixels_changed(&mut self) {
        self.pixels_revision += 1;
    }

    /// Starts over with a new primary photo.
    pub fn load_primary(&mut self, bytes: Vec<u8>, mime: &str) -> Result<(), EditorError> {
        self.ensure_idle()?;
        validate_mime(mime)?;
        let working = decode(&bytes)?;
        info!(
            "Loaded primary {}x{} ({mime})",
            working.width(),
            working.height()
        );
        *self = Self {
            primary: Some(TargetImage {
                bytes: bytes.into(),
                mime: mime.to_string(),
            }),
            active: Some(TargetId::Primary),
            working: Some(working),
            brush: self.brush,
            stamp_settings: self.stamp_settings,
            next_ticket: self.next_ticket,
            pixels_revision: self.pixels_revision + 1,
            result_revision: self.result_revision + 1,
            ..Default::default()
        };
        Ok(())
    }

    pub fn add_reference(&mut self, bytes: Vec<u8>, mime: &str) -> Result<u64, EditorError> {
        self.ensure_idle()?;
        validate_mime(mime)?;
        decode(&bytes)?;
        self.next_reference_id += 1;
        let id = self.next_reference_id;
        self.references.push(ReferenceImage {
            id,
            image: TargetImage {
                bytes: bytes.into(),
                mime: mime.to_string(),
            },
            cropped: None,
        });
        info!("Added reference {id}");
        Ok(id)
    }

    pub fn remove_reference(&mut self, id: u64) -> Result<(), EditorError> {
        self.ensure_idle()?;
        if self.active_target() == TargetId::Reference(id) {
            self.switch_target(TargetId::Primary)?;
        }
        self.references.retain(|r| r.id != id);
        Ok(())
    }

    fn target_image(&self, target: TargetId) -> Option<&TargetImage> {
        match target {
            TargetId::Primary => self.primary.as_ref(),
            TargetId::Reference(id) => self
                .references
                .iter()
                .find(|r| r.id == id)
                .map(|r| &r.image),
        }
    }

    fn target_image_mut(&mut self, target: TargetId) -> Option<&mut TargetImage> {
        match target {
            TargetId::Primary => self.primary.as_mut(),
            TargetId::Reference(id) => self
                .references
                .iter_mut()
                .find(|r| r.id == id)
                .map(|r| &mut r.image),
        }
    }

    /// Makes another photo the one being edited. The selection belongs to
    /// the previous photo and is dropped.
    pub fn switch_target(&mut self, target: TargetId) -> Result<(), EditorError> {
        self.ensure_idle()?;
        let image = self
            .target_image(target)
            .ok_or_else(|| EditorError::Validation(format!("{target:?} does not exist")))?;
        let working = decode(&image.bytes)?;
        info!("Editing {target:?}");
        self.working = Some(working);
        self.active = Some(target);
        self.selection.clear();
        self.pixels_changed();
        Ok(())
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.selection.set_tool(tool);
    }

    pub fn set_brush(&mut self, brush: BrushSettings) {
        self.brush = brush;
    }

    pub fn set_stamp_settings(&mut self, settings: StampSettings) {
        self.stamp_settings = settings;
    }

    /// Pointer events are in image space. They are ignored while a
    /// generation runs or when nothing is loaded.
    pub fn pointer_down(&mut self, p: Point) {
        self.cursor = Some(p);
        if self.in_flight.is_some() {
            debug!("Ignore pointer while generating");
            return;
        }
        let tool = self.selection.tool();
        let Some(working) = self.working.as_mut() else {
            return;
        };
        match tool {
            Tool::None => {}
            Tool::Freehand => self.selection.begin_freehand(p),
            Tool::Rectangle => self.selection.begin_rectangle(p),
            Tool::Eraser => {
                self.selection.begin_stroke(p);
                raster::erase(working, None, p, &self.brush);
                self.pixels_changed();
            }
            Tool::Stamp => {
                self.selection.begin_stroke(p);
                if let Some(stamp) = &self.stamp {
                    raster::apply_stamp(working, stamp, p, &self.stamp_settings);
                    self.pixels_changed();
                }
            }
        }
    }

    pub fn pointer_move(&mut self, p: Point) {
        self.cursor = Some(p);
        if !self.selection.is_drawing() {
            return;
        }
        match self.selection.tool() {
            Tool::Freehand => self.selection.append_freehand_point(p),
            Tool::Rectangle => self.selection.update_rectangle(p),
            Tool::Eraser => {
                let previous = self.selection.advance_stroke(p);
                if let Some(working) = self.working.as_mut() {
                    raster::erase(working, previous, p, &self.brush);
                    self.pixels_changed();
                }
            }
            Tool::Stamp | Tool::None => {
                self.selection.advance_stroke(p);
            }
        }
    }

    /// Ends the gesture. Pixel edits are committed to the active target.
    pub fn pointer_up(&mut self) -> Result<(), EditorError> {
        if !self.selection.is_drawing() {
            return Ok(());
        }
        let tool = self.selection.tool();
        match tool {
            Tool::Freehand => {
                self.selection.finalize_freehand();
                Ok(())
            }
            Tool::Rectangle => {
                self.selection.finalize_rectangle();
                Ok(())
            }
            Tool::Eraser | Tool::Stamp | Tool::None => {
                self.selection.end_stroke();
                self.commit(tool)
            }
        }
    }

    pub fn pointer_hover(&mut self, p: Option<Point>) {
        self.cursor = p;
    }

    /// Writes the working raster back into the active target's stored bytes.
    fn commit(&mut self, gesture: Tool) -> Result<(), EditorError> {
        let target = self.active_target();
        let (Some(working), Some(image)) = (self.working.as_ref(), self.target_image(target)) else {
            return Ok(());
        };
        let (bytes, mime) = encode_for_mime(working, raster::commit_mime(gesture, &image.mime))?;
        debug!("Commit {} bytes as {mime} to {target:?}", bytes.len());
        if let Some(image) = self.target_image_mut(target) {
            image.bytes = bytes.into();
            image.mime = mime.to_string();
        }
        Ok(())
    }

    /// Turns the selected pixels into the stamp and switches to the stamp tool.
    /// Returns `false` when the selection covers no pixels.
    pub fn capture_stamp(&mut self) -> Result<bool, EditorError> {
        self.ensure_idle()?;
        let (Some(selection), Some(working)) = (self.selection.selection(), self.working.as_ref()) else {
            return Ok(false);
        };
        let Some(captured) = raster::capture(working, selection) else {
            return Ok(false);
        };
        info!("New stamp {}x{}", captured.width(), captured.height());
        self.stamp = Some(Arc::new(captured));
        self.selection.take_selection();
        self.selection.set_tool(Tool::Stamp);
        Ok(true)
    }

    /// Stores the selected part of the active reference as the variant sent
    /// to the generator.
    pub fn apply_crop_to_reference(&mut self) -> Result<bool, EditorError> {
        self.ensure_idle()?;
        let TargetId::Reference(id) = self.active_target() else {
            return Ok(false);
        };
        let (Some(selection), Some(working)) = (self.selection.selection(), self.working.as_ref()) else {
            return Ok(false);
        };
        let Some(captured) = raster::capture(working, selection) else {
            return Ok(false);
        };
        let Some(reference) = self.references.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        let (bytes, mime) = encode_for_mime(&captured, &reference.image.mime)?;
        info!("Reference {id} cropped to {}x{}", captured.width(), captured.height());
        reference.cropped = Some(EncodedImage::new(bytes, mime));
        self.selection.clear();
        Ok(true)
    }

    pub fn clear_selection(&mut self) -> Result<(), EditorError> {
        self.ensure_idle()?;
        self.selection.clear();
        Ok(())
    }

    /// What the overlay shows right now, `None` when nothing is loaded.
    pub fn overlay_scene(&self) -> Option<OverlayScene<'_>> {
        let working = self.working.as_ref()?;
        Some(OverlayScene {
            width: working.width(),
            height: working.height(),
            tool: self.selection.tool(),
            selection: self.selection.selection(),
            drawing: self.selection.drawing(),
            cursor: self.cursor,
            brush: self.brush,
            stamp: self.stamp.as_ref(),
            stamp_settings: self.stamp_settings,
        })
    }

    /// Snapshots the request and marks the session busy.
    pub fn begin_generation(&mut self, options: &GenerationOptions) -> Result<PreparedGeneration, EditorError> {
        self.ensure_idle()?;
        self.next_ticket += 1;
        let ticket = GenerationTicket { id: self.next_ticket };
        let prepared = pipeline::prepare(self, ticket, options)?;
        info!("Generation {} started with {:?}", ticket.id, options.style);
        self.in_flight = Some(ticket);
        Ok(prepared)
    }

    /// Accepts the outcome of the current generation. Results of older
    /// tickets are dropped. On success the record to keep in history is returned.
    pub fn finish_generation(&mut self, outcome: GenerationOutcome) -> Result<Option<HistoryRecord>, EditorError> {
        if self.in_flight != Some(outcome.ticket) {
            warn!("Discard result of stale generation {}", outcome.ticket.id);
            return Ok(None);
        }
        self.in_flight = None;
        let image = outcome.result?;
        let png = encode_png(&image)?;
        info!(
            "Generation {} finished with {}x{}",
            outcome.ticket.id,
            image.width(),
            image.height()
        );
        self.generated = Some(GeneratedResult::new(image, outcome.style));
        self.result_revision += 1;
        Ok(Some(HistoryRecord {
            image: png.into(),
            style: outcome.style,
            timestamp_ms: now_ms(),
        }))
    }

    /// Re-applies tonal adjustments to the generated result. Returns the
    /// adjusted image as a new history record.
    pub fn adjust_result(&mut self, adjustments: Adjustments) -> Result<Option<HistoryRecord>, EditorError> {
        let Some(generated) = self.generated.as_mut() else {
            return Ok(None);
        };
        let adjusted = adjustments.apply(&generated.base);
        let png = encode_png(&adjusted)?;
        generated.image = Arc::new(adjusted);
        generated.adjustments = adjustments;
        self.result_revision += 1;
        Ok(Some(HistoryRecord {
            image: png.into(),
            style: generated.style,
            timestamp_ms: now_ms(),
        }))
    }

    /// Shows a stored result again.
    pub fn show_history_entry(&mut self, image: &[u8], style: ArtStyle) -> Result<(), EditorError> {
        self.generated = Some(GeneratedResult::new(decode(image)?, style));
        self.result_revision += 1;
        Ok(())
    }

    pub fn export_result(&self, format: ExportFormat) -> Result<Vec<u8>, EditorError> {
        let generated = self.generated.as_ref().ok_or(EditorError::NoImage)?;
        export(&generated.image, format, WHITE)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
