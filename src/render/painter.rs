//! Content stream interpreter for vector graphics.
//!
//! Runs the path construction, path painting, graphics state and device
//! color operators of a page content stream against a tiny-skia pixmap.
//! Text, images and shadings are skipped.

use crate::core::{PDFObject, Parser};
use smallvec::SmallVec;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Graphics state saved and restored by `q` / `Q`.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsState {
    /// User space to device space
    pub ctm: Transform,
    pub fill_rgb: [u8; 3],
    pub stroke_rgb: [u8; 3],
    pub line_width: f32,
}

impl GraphicsState {
    fn new(base: Transform) -> Self {
        GraphicsState {
            ctm: base,
            fill_rgb: [0, 0, 0],
            stroke_rgb: [0, 0, 0],
            line_width: 1.0,
        }
    }
}

enum PaintMode {
    Fill(FillRule),
    Stroke,
    FillStroke(FillRule),
    Discard,
}

fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn gray(g: f64) -> [u8; 3] {
    let c = channel(g);
    [c, c, c]
}

fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> [u8; 3] {
    let k = k.clamp(0.0, 1.0);
    [
        channel((1.0 - c.clamp(0.0, 1.0)) * (1.0 - k)),
        channel((1.0 - m.clamp(0.0, 1.0)) * (1.0 - k)),
        channel((1.0 - y.clamp(0.0, 1.0)) * (1.0 - k)),
    ]
}

fn paint_for(rgb: [u8; 3]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgb[0], rgb[1], rgb[2], 255);
    paint.anti_alias = true;
    paint
}

pub struct Painter<'p> {
    pixmap: &'p mut Pixmap,
    state_stack: Vec<GraphicsState>,
    state: GraphicsState,
    path: PathBuilder,
    current_point: Option<(f32, f32)>,
    painted: usize,
}

impl<'p> Painter<'p> {
    /// `base` maps PDF user space onto the pixmap (the viewport transform).
    pub fn new(pixmap: &'p mut Pixmap, base: Transform) -> Self {
        Painter {
            pixmap,
            state_stack: Vec::new(),
            state: GraphicsState::new(base),
            path: PathBuilder::new(),
            current_point: None,
            painted: 0,
        }
    }

    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    /// Interprets `content` and returns the number of paths painted.
    ///
    /// Stops quietly at the first syntax error; whatever was drawn up to
    /// that point stays on the pixmap.
    pub fn run(&mut self, content: &[u8]) -> usize {
        let mut parser = Parser::new(content, 0);
        let mut operands: SmallVec<[PDFObject; 6]> = SmallVec::new();

        loop {
            match parser.get_object() {
                Ok(PDFObject::EOF) => break,
                Ok(PDFObject::Command(op)) => {
                    self.execute(&op, &operands);
                    operands.clear();
                }
                Ok(operand) => operands.push(operand),
                Err(e) => {
                    tracing::debug!(error = %e, "content stream parse stopped");
                    break;
                }
            }
        }

        self.painted
    }

    fn numbers<const N: usize>(operands: &[PDFObject]) -> Option<[f32; N]> {
        if operands.len() < N {
            return None;
        }
        let mut out = [0.0f32; N];
        let start = operands.len() - N;
        for (slot, operand) in out.iter_mut().zip(&operands[start..]) {
            *slot = operand.as_number()? as f32;
        }
        Some(out)
    }

    fn colors<const N: usize>(operands: &[PDFObject]) -> Option<[f64; N]> {
        Self::numbers::<N>(operands).map(|v| v.map(|c| c as f64))
    }

    fn execute(&mut self, op: &str, operands: &[PDFObject]) {
        match op {
            // Graphics state
            "q" => self.state_stack.push(self.state),
            "Q" => {
                if let Some(saved) = self.state_stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some([a, b, c, d, e, f]) = Self::numbers::<6>(operands) {
                    let matrix = Transform::from_row(a, b, c, d, e, f);
                    self.state.ctm = self.state.ctm.pre_concat(matrix);
                }
            }
            "w" => {
                if let Some([width]) = Self::numbers::<1>(operands) {
                    self.state.line_width = width.max(0.0);
                }
            }

            // Device colors
            "g" => {
                if let Some([g]) = Self::colors::<1>(operands) {
                    self.state.fill_rgb = gray(g);
                }
            }
            "G" => {
                if let Some([g]) = Self::colors::<1>(operands) {
                    self.state.stroke_rgb = gray(g);
                }
            }
            "rg" => {
                if let Some([r, g, b]) = Self::colors::<3>(operands) {
                    self.state.fill_rgb = [channel(r), channel(g), channel(b)];
                }
            }
            "RG" => {
                if let Some([r, g, b]) = Self::colors::<3>(operands) {
                    self.state.stroke_rgb = [channel(r), channel(g), channel(b)];
                }
            }
            "k" => {
                if let Some([c, m, y, k]) = Self::colors::<4>(operands) {
                    self.state.fill_rgb = cmyk_to_rgb(c, m, y, k);
                }
            }
            "K" => {
                if let Some([c, m, y, k]) = Self::colors::<4>(operands) {
                    self.state.stroke_rgb = cmyk_to_rgb(c, m, y, k);
                }
            }

            // Path construction
            "m" => {
                if let Some([x, y]) = Self::numbers::<2>(operands) {
                    self.path.move_to(x, y);
                    self.current_point = Some((x, y));
                }
            }
            "l" => {
                if let Some([x, y]) = Self::numbers::<2>(operands) {
                    self.ensure_started();
                    self.path.line_to(x, y);
                    self.current_point = Some((x, y));
                }
            }
            "c" => {
                if let Some([x1, y1, x2, y2, x3, y3]) = Self::numbers::<6>(operands) {
                    self.ensure_started();
                    self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                    self.current_point = Some((x3, y3));
                }
            }
            "v" => {
                if let Some([x2, y2, x3, y3]) = Self::numbers::<4>(operands) {
                    let (x1, y1) = self.current_point.unwrap_or((x2, y2));
                    self.ensure_started();
                    self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                    self.current_point = Some((x3, y3));
                }
            }
            "y" => {
                if let Some([x1, y1, x3, y3]) = Self::numbers::<4>(operands) {
                    self.ensure_started();
                    self.path.cubic_to(x1, y1, x3, y3, x3, y3);
                    self.current_point = Some((x3, y3));
                }
            }
            "h" => self.path.close(),
            "re" => {
                if let Some([x, y, w, h]) = Self::numbers::<4>(operands) {
                    // Built by hand so negative widths and heights keep working
                    self.path.move_to(x, y);
                    self.path.line_to(x + w, y);
                    self.path.line_to(x + w, y + h);
                    self.path.line_to(x, y + h);
                    self.path.close();
                    self.current_point = Some((x, y));
                }
            }

            // Path painting
            "f" | "F" => self.paint_path(PaintMode::Fill(FillRule::Winding), false),
            "f*" => self.paint_path(PaintMode::Fill(FillRule::EvenOdd), false),
            "S" => self.paint_path(PaintMode::Stroke, false),
            "s" => self.paint_path(PaintMode::Stroke, true),
            "B" => self.paint_path(PaintMode::FillStroke(FillRule::Winding), false),
            "B*" => self.paint_path(PaintMode::FillStroke(FillRule::EvenOdd), false),
            "b" => self.paint_path(PaintMode::FillStroke(FillRule::Winding), true),
            "b*" => self.paint_path(PaintMode::FillStroke(FillRule::EvenOdd), true),
            "n" => self.paint_path(PaintMode::Discard, false),

            _ => {}
        }
    }

    /// `l` and curves without a preceding `m` start from the origin.
    fn ensure_started(&mut self) {
        if self.current_point.is_none() {
            self.path.move_to(0.0, 0.0);
            self.current_point = Some((0.0, 0.0));
        }
    }

    fn paint_path(&mut self, mode: PaintMode, close: bool) {
        if close {
            self.path.close();
        }
        let builder = std::mem::replace(&mut self.path, PathBuilder::new());
        self.current_point = None;

        let Some(path) = builder.finish() else {
            return;
        };
        let transform = self.state.ctm;

        match mode {
            PaintMode::Fill(rule) => {
                self.pixmap
                    .fill_path(&path, &paint_for(self.state.fill_rgb), rule, transform, None);
            }
            PaintMode::Stroke => {
                let stroke = Stroke {
                    width: self.state.line_width,
                    ..Stroke::default()
                };
                self.pixmap
                    .stroke_path(&path, &paint_for(self.state.stroke_rgb), &stroke, transform, None);
            }
            PaintMode::FillStroke(rule) => {
                self.pixmap
                    .fill_path(&path, &paint_for(self.state.fill_rgb), rule, transform, None);
                let stroke = Stroke {
                    width: self.state.line_width,
                    ..Stroke::default()
                };
                self.pixmap
                    .stroke_path(&path, &paint_for(self.state.stroke_rgb), &stroke, transform, None);
            }
            PaintMode::Discard => return,
        }

        self.painted += 1;
    }
}
