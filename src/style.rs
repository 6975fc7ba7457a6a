//! Style and label value objects attached to overlays.

use serde::Serialize;

/// Line style. Colors are `0xRRGGBB`, alpha is `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stroke {
    pub thickness: f32,
    pub color: u32,
    pub alpha: f32,
}

impl Stroke {
    pub const fn new(thickness: f32, color: u32, alpha: f32) -> Self {
        Self {
            thickness,
            color,
            alpha,
        }
    }
}

impl Default for Stroke {
    fn default() -> Self {
        Self::new(1.0, 0x000000, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fill {
    pub color: u32,
    pub alpha: f32,
}

impl Fill {
    pub const fn new(color: u32, alpha: f32) -> Self {
        Self { color, alpha }
    }
}

impl Default for Fill {
    fn default() -> Self {
        Self::new(0x000000, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    pub family: String,
    pub size: u16,
    pub color: u32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: "Verdana".to_string(),
            size: 11,
            color: 0x000000,
            bold: false,
            italic: false,
            underline: false,
        }
    }
}

/// Text shown next to an overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub text: String,
    pub offset: (i32, i32),
    /// `None` renders with the engine's default font.
    pub font: Option<Font>,
    pub href: Option<String>,
    pub background: Option<Fill>,
    pub border: Option<Stroke>,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset: (0, 0),
            font: None,
            href: None,
            background: None,
            border: None,
        }
    }

    pub fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.offset = (x, y);
        self
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn with_background(mut self, fill: Fill) -> Self {
        self.background = Some(fill);
        self
    }

    pub fn with_border(mut self, stroke: Stroke) -> Self {
        self.border = Some(stroke);
        self
    }
}

/// Values creation commands fall back to when an argument is omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDefaults {
    pub stroke: Stroke,
    pub fill: Fill,
    pub font: Font,
    pub point_image: String,
}

impl Default for StyleDefaults {
    fn default() -> Self {
        Self {
            stroke: Stroke::default(),
            fill: Fill::default(),
            font: Font::default(),
            point_image: "img/point.png".to_string(),
        }
    }
}
