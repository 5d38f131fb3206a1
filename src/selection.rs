use log::{debug, info};

use crate::geometry::{ImageRect, Point};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Tool {
    #[default]
    None,
    Freehand,
    Rectangle,
    Eraser,
    Stamp,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::None,
        Tool::Freehand,
        Tool::Rectangle,
        Tool::Eraser,
        Tool::Stamp,
    ];

    pub fn is_selection(self) -> bool {
        matches!(self, Tool::Freehand | Tool::Rectangle)
    }

    /// Tools that change pixels of the working image.
    pub fn is_raster(self) -> bool {
        matches!(self, Tool::Eraser | Tool::Stamp)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::None => "Pointer",
            Tool::Freehand => "Lasso",
            Tool::Rectangle => "Rectangle",
            Tool::Eraser => "Eraser",
            Tool::Stamp => "Stamp",
        }
    }
}

/// A committed region of interest in natural pixel space.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Selection {
    /// Closed polygon, always more than two points.
    Freehand { points: Vec<Point> },
    /// Normalised rectangle with positive width and height.
    Rectangle { rect: ImageRect },
}

impl Selection {
    pub fn bounding_box(&self) -> Option<ImageRect> {
        match self {
            Selection::Freehand { points } => ImageRect::bounding(points),
            Selection::Rectangle { rect } => Some(*rect),
        }
    }

    /// Vertices of the closed path enclosing the selection.
    pub fn outline(&self) -> Vec<Point> {
        match self {
            Selection::Freehand { points } => points.clone(),
            Selection::Rectangle { rect } => rect.corners().to_vec(),
        }
    }
}

/// State of the gesture currently in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawingSession {
    pub is_drawing: bool,
    pub current_points: Vec<Point>,
    pub anchor: Option<Point>,
    pub current_rect: Option<ImageRect>,
    pub last_pointer_position: Option<Point>,
}

#[derive(Debug, Default)]
pub struct SelectionModel {
    tool: Tool,
    selection: Option<Selection>,
    drawing: DrawingSession,
}

impl SelectionModel {
    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools keeps an existing selection.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            debug!("Tool {:?} -> {:?}", self.tool, tool);
            self.tool = tool;
            self.drawing = DrawingSession::default();
        }
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn take_selection(&mut self) -> Option<Selection> {
        self.selection.take()
    }

    pub fn drawing(&self) -> &DrawingSession {
        &self.drawing
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing.is_drawing
    }

    pub fn begin_freehand(&mut self, p: Point) {
        self.selection = None;
        self.drawing = DrawingSession {
            is_drawing: true,
            current_points: vec![p],
            last_pointer_position: Some(p),
            ..Default::default()
        };
    }

    pub fn append_freehand_point(&mut self, p: Point) {
        if self.drawing.is_drawing {
            self.drawing.current_points.push(p);
            self.drawing.last_pointer_position = Some(p);
        }
    }

    /// Commits the traced polygon. Returns whether a selection was created;
    /// traces of two points or less are dropped.
    pub fn finalize_freehand(&mut self) -> bool {
        let points = std::mem::take(&mut self.drawing.current_points);
        self.drawing = DrawingSession::default();
        if points.len() > 2 {
            info!("Freehand selection with {} points", points.len());
            self.selection = Some(Selection::Freehand { points });
            true
        } else {
            debug!("Discard freehand trace with {} points", points.len());
            false
        }
    }

    pub fn begin_rectangle(&mut self, p: Point) {
        self.selection = None;
        self.drawing = DrawingSession {
            is_drawing: true,
            anchor: Some(p),
            current_rect: Some(ImageRect::new(p.x, p.y, 0.0, 0.0)),
            last_pointer_position: Some(p),
            ..Default::default()
        };
    }

    pub fn update_rectangle(&mut self, p: Point) {
        if let (true, Some(anchor)) = (self.drawing.is_drawing, self.drawing.anchor) {
            self.drawing.current_rect = Some(ImageRect::from_corners(anchor, p));
            self.drawing.last_pointer_position = Some(p);
        }
    }

    /// Commits the dragged rectangle if it has an area.
    pub fn finalize_rectangle(&mut self) -> bool {
        let rect = self.drawing.current_rect.take();
        self.drawing = DrawingSession::default();
        match rect {
            Some(rect) if rect.has_area() => {
                info!("Rectangle selection {rect:?}");
                self.selection = Some(Selection::Rectangle { rect });
                true
            }
            _ => {
                debug!("Discard empty rectangle {rect:?}");
                false
            }
        }
    }

    /// Starts an eraser or stamp stroke.
    pub fn begin_stroke(&mut self, p: Point) {
        self.drawing = DrawingSession {
            is_drawing: true,
            last_pointer_position: Some(p),
            ..Default::default()
        };
    }

    /// Records `p` as the newest stroke position and returns the previous one.
    pub fn advance_stroke(&mut self, p: Point) -> Option<Point> {
        self.drawing.last_pointer_position.replace(p)
    }

    pub fn end_stroke(&mut self) {
        self.drawing = DrawingSession::default();
    }

    /// Drops the selection and any gesture in progress, leaving no tool active.
    pub fn clear(&mut self) {
        self.selection = None;
        self.drawing = DrawingSession::default();
        self.tool = Tool::None;
    }
}

#[cfg(test)]
mod tests {
    use emath::pos2;

    use super::*;

    #[test]
    fn freehand_needs_more_than_two_points() {
        let mut model = SelectionModel::default();
        model.set_tool(Tool::Freehand);
        model.begin_freehand(pos2(0.0, 0.0));
        model.append_freehand_point(pos2(5.0, 5.0));
        assert!(!model.finalize_freehand());
        assert_eq!(None, model.selection());
        assert!(!model.is_drawing());

        model.begin_freehand(pos2(0.0, 0.0));
        model.append_freehand_point(pos2(5.0, 0.0));
        model.append_freehand_point(pos2(5.0, 5.0));
        assert!(model.finalize_freehand());
        assert_eq!(
            Some(ImageRect::new(0.0, 0.0, 5.0, 5.0)),
            model.selection().and_then(Selection::bounding_box)
        );
    }

    #[test]
    fn finalize_without_gesture_is_noop() {
        let mut model = SelectionModel::default();
        assert!(!model.finalize_freehand());
        assert!(!model.finalize_rectangle());
        assert_eq!(None, model.selection());
    }

    #[test]
    fn rectangle_with_zero_dimension_is_discarded() {
        let mut model = SelectionModel::default();
        model.begin_rectangle(pos2(10.0, 10.0));
        model.update_rectangle(pos2(10.0, 60.0));
        assert!(!model.finalize_rectangle());
        assert_eq!(None, model.selection());
    }

    #[test]
    fn rectangle_drag_up_left_is_normalised() {
        let mut model = SelectionModel::default();
        model.begin_rectangle(pos2(60.0, 60.0));
        model.update_rectangle(pos2(10.0, 20.0));
        assert!(model.finalize_rectangle());
        assert_eq!(
            Some(&Selection::Rectangle {
                rect: ImageRect::new(10.0, 20.0, 50.0, 40.0)
            }),
            model.selection()
        );
    }

    #[test]
    fn new_gesture_replaces_selection_but_tool_switch_keeps_it() {
        let mut model = SelectionModel::default();
        model.begin_rectangle(pos2(0.0, 0.0));
        model.update_rectangle(pos2(10.0, 10.0));
        model.finalize_rectangle();

        model.set_tool(Tool::Freehand);
        assert!(model.selection().is_some());

        model.begin_freehand(pos2(1.0, 1.0));
        assert_eq!(None, model.selection());
    }

    #[test]
    fn clear_resets_tool() {
        let mut model = SelectionModel::default();
        model.set_tool(Tool::Rectangle);
        model.begin_rectangle(pos2(0.0, 0.0));
        model.update_rectangle(pos2(10.0, 10.0));
        model.finalize_rectangle();
        model.clear();
        assert_eq!(None, model.selection());
        assert_eq!(Tool::None, model.tool());
    }

    #[test]
    fn stroke_tracks_previous_position() {
        let mut model = SelectionModel::default();
        model.begin_stroke(pos2(1.0, 1.0));
        assert_eq!(Some(pos2(1.0, 1.0)), model.advance_stroke(pos2(2.0, 2.0)));
        assert_eq!(Some(pos2(2.0, 2.0)), model.advance_stroke(pos2(3.0, 3.0)));
        model.end_stroke();
        assert!(!model.is_drawing());
    }
}
