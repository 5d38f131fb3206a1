use std::path::PathBuf;

use eframe::egui::{self, load::SizedTexture, ImageSource, Vec2};
use log::{info, warn};

use crate::{
    generation::{ArtStyle, Quality},
    image_utils::{Adjustments, ExportFormat},
    selection::Tool,
    session::TargetId,
};

use super::{sync_texture, to_color_image, EditorApp};

const ICON_SAVE: &str = "\u{1F4BE}";
const ICON_REMOVE: &str = "\u{1F5D9}";

impl EditorApp {
    pub(super) fn toolbar_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(&mut self.open_path).hint_text("Path to image"));
            if ui.button("Open photo").clicked() {
                self.load(vec![PathBuf::from(self.open_path.trim())], true);
            }
            if ui
                .add_enabled(self.session.primary().is_some(), egui::Button::new("Add reference"))
                .clicked()
            {
                self.load(vec![PathBuf::from(self.open_path.trim())], false);
            }
            ui.separator();

            let mut tool = self.session.tool();
            for t in Tool::ALL {
                ui.selectable_value(&mut tool, t, t.label());
            }
            if tool != self.session.tool() {
                self.session.set_tool(tool);
            }
            ui.separator();

            match tool {
                Tool::Eraser => {
                    let mut brush = self.session.brush();
                    ui.add(egui::Slider::new(&mut brush.size, 1.0..=200.0).text("Size"));
                    ui.add(egui::Slider::new(&mut brush.hardness, 0.0..=100.0).text("Hardness"));
                    if brush != self.session.brush() {
                        self.session.set_brush(brush);
                    }
                }
                Tool::Stamp => {
                    let mut stamp = self.session.stamp_settings();
                    ui.add(egui::Slider::new(&mut stamp.scale, 0.1..=4.0).text("Scale"));
                    ui.add(
                        egui::Slider::new(&mut stamp.rotation_degrees, -180.0..=180.0)
                            .text("Rotation")
                            .suffix("°"),
                    );
                    if stamp != self.session.stamp_settings() {
                        self.session.set_stamp_settings(stamp);
                    }
                    if self.session.stamp().is_none() {
                        ui.label("Capture a selection first");
                    }
                }
                _ => {}
            }

            let has_selection = self.session.selection().is_some();
            ui.add_enabled_ui(has_selection, |ui| {
                if ui.button("Capture stamp").clicked() {
                    match self.session.capture_stamp() {
                        Ok(true) => {}
                        Ok(false) => self.status = Some("Selection is empty".into()),
                        Err(e) => self.status = Some(e.user_message()),
                    }
                }
                if ui.button("Clear selection").clicked() {
                    if let Err(e) = self.session.clear_selection() {
                        self.status = Some(e.user_message());
                    }
                }
                let on_reference = matches!(self.session.active_target(), TargetId::Reference(_));
                if on_reference && ui.button("Apply crop to reference").clicked() {
                    if let Err(e) = self.session.apply_crop_to_reference() {
                        self.status = Some(e.user_message());
                    }
                }
            });
        });
    }

    pub(super) fn targets_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let active = self.session.active_target();
            let mut target = active;
            if self.session.primary().is_some() {
                ui.selectable_value(&mut target, TargetId::Primary, "Photo");
            }
            let mut remove = None;
            for reference in self.session.references() {
                let label = match reference.cropped {
                    Some(_) => format!("Reference {} (cropped)", reference.id),
                    None => format!("Reference {}", reference.id),
                };
                ui.selectable_value(&mut target, TargetId::Reference(reference.id), label);
                if ui.small_button(ICON_REMOVE).on_hover_text("Remove reference").clicked() {
                    remove = Some(reference.id);
                }
            }
            let result = match remove {
                Some(id) => self.session.remove_reference(id),
                None if target != active => self.session.switch_target(target),
                None => Ok(()),
            };
            if let Err(e) = result {
                self.status = Some(e.user_message());
            }

            if let Some(status) = &self.status {
                ui.separator();
                ui.colored_label(ui.visuals().warn_fg_color, status);
            }
        });
    }

    pub(super) fn generation_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Generate");
        egui::ComboBox::from_label("Style")
            .selected_text(self.options.style.label())
            .show_ui(ui, |ui| {
                for style in ArtStyle::ALL {
                    ui.selectable_value(&mut self.options.style, style, style.label());
                }
            });
        ui.horizontal(|ui| {
            for quality in [Quality::Standard, Quality::High] {
                ui.selectable_value(&mut self.options.quality, quality, quality.label());
            }
        });
        ui.add(
            egui::TextEdit::multiline(&mut self.options.instructions)
                .hint_text("Extra instructions")
                .desired_rows(3),
        );
        ui.horizontal(|ui| {
            let can_generate = self.session.primary().is_some() && !self.session.is_busy();
            if ui.add_enabled(can_generate, egui::Button::new("Generate")).clicked() {
                self.start_generation();
            }
            if self.session.is_busy() {
                ui.spinner();
            }
        });

        let ctx = ui.ctx().clone();
        let session = &self.session;
        let texture = sync_texture(
            &ctx,
            &mut self.textures.result,
            "result",
            session.result_revision(),
            || session.generated().map(|g| to_color_image(&g.image)),
        );
        let Some((texture, size)) = texture.zip(session.generated().map(|g| {
            Vec2::new(g.image.width() as f32, g.image.height() as f32)
        })) else {
            return;
        };

        ui.separator();
        let width = ui.available_width();
        ui.add(
            egui::Image::new(ImageSource::Texture(SizedTexture::new(texture, size)))
                .max_width(width)
                .maintain_aspect_ratio(true),
        );

        let adjustments = &mut self.adjustments;
        ui.add(egui::Slider::new(&mut adjustments.brightness, Adjustments::RANGE).text("Brightness"));
        ui.add(egui::Slider::new(&mut adjustments.contrast, Adjustments::RANGE).text("Contrast"));
        ui.add(egui::Slider::new(&mut adjustments.saturation, Adjustments::RANGE).text("Saturation"));

        let applied = self.session.generated().map(|g| g.adjustments);
        ui.horizontal(|ui| {
            if ui
                .add_enabled(applied != Some(self.adjustments), egui::Button::new("Apply"))
                .clicked()
            {
                match self.session.adjust_result(self.adjustments) {
                    Ok(Some(record)) => self.store(record),
                    Ok(None) => {}
                    Err(e) => self.status = Some(e.user_message()),
                }
            }
            let adjusted = !self.adjustments.is_identity();
            if ui.add_enabled(adjusted, egui::Button::new("Reset")).clicked() {
                self.adjustments = Adjustments::default();
            }
        });
        ui.horizontal(|ui| {
            for format in [ExportFormat::Png, ExportFormat::Jpeg] {
                if ui
                    .button(format!("{ICON_SAVE} {}", format.extension().to_uppercase()))
                    .clicked()
                {
                    self.save_result(format);
                }
            }
        });
    }

    fn save_result(&mut self, format: ExportFormat) {
        let bytes = match self.session.export_result(format) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.status = Some(e.user_message());
                return;
            }
        };
        let style = self
            .session
            .generated()
            .map(|g| g.style.label().to_lowercase().replace(' ', "-"))
            .unwrap_or_default();
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self
            .export_dir
            .join(format!("caricature-{style}-{ts}.{}", format.extension()));
        match std::fs::write(&path, bytes) {
            Ok(()) => {
                info!("Exported {}", path.display());
                self.status = Some(format!("Saved {}", path.display()));
            }
            Err(e) => {
                warn!("Export to {} failed: {e}", path.display());
                self.status = Some(format!("Could not save: {e}"));
            }
        }
    }

    pub(super) fn history_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("History");
        let entries = match self.history_items.get() {
            None => {
                ui.spinner();
                return;
            }
            Some(Err(e)) => {
                ui.label(format!("Could not load history: {e}"));
                return;
            }
            Some(Ok(entries)) if entries.is_empty() => {
                ui.label("No results yet");
                return;
            }
            Some(Ok(entries)) => entries.clone(),
        };

        for entry in entries {
            ui.horizontal(|ui| {
                ui.label(format!("#{} {}", entry.id, entry.style.label()));
                if ui.button("Show").clicked() {
                    self.adjustments = Adjustments::default();
                    if let Err(e) = self.session.show_history_entry(&entry.image, entry.style) {
                        self.status = Some(e.user_message());
                    }
                }
            });
        }
    }
}
