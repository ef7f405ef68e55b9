use palette::{Darken, Hsl, IntoColor, Lighten, Srgb};

// ---------------------------------------------------------------------------
// Fixed palette cycle
// ---------------------------------------------------------------------------

/// Colours handed out to bins by declaration position, wrapping around.
pub const BIN_PALETTE: [Srgb<u8>; 10] = [
    Srgb::new(255, 0, 0),     // red
    Srgb::new(255, 153, 0),   // orange
    Srgb::new(204, 204, 0),   // dark yellow
    Srgb::new(0, 153, 0),     // green
    Srgb::new(0, 0, 255),     // blue
    Srgb::new(0, 0, 153),     // navy
    Srgb::new(204, 0, 255),   // violet
    Srgb::new(153, 0, 153),   // magenta
    Srgb::new(0, 0, 0),       // black
    Srgb::new(128, 128, 128), // grey
];

/// Marker shape drawn at each bin centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    FilledCircle,
    OpenCircle,
}

/// How one series is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayAttrs {
    pub color: Srgb<u8>,
    pub marker: MarkerStyle,
    pub line_width: u32,
}

impl DisplayAttrs {
    /// Attributes for the bin declared at `position`.
    pub fn for_position(position: usize) -> Self {
        DisplayAttrs {
            color: BIN_PALETTE[position % BIN_PALETTE.len()],
            marker: MarkerStyle::FilledCircle,
            line_width: 2,
        }
    }

    /// Attributes for the running sum.
    pub fn sum() -> Self {
        DisplayAttrs {
            color: Srgb::new(0, 0, 0),
            marker: MarkerStyle::OpenCircle,
            line_width: 3,
        }
    }

    /// A softer variant of the series colour, used for error bars.
    pub fn error_bar_color(&self) -> Srgb<u8> {
        let hsl: Hsl = self.color.into_format::<f32>().into_color();
        let shaded = if hsl.lightness < 0.2 {
            hsl.lighten(0.35)
        } else {
            hsl.darken(0.1)
        };
        let rgb: Srgb = shaded.into_color();
        rgb.into_format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_wraps_by_position() {
        assert_eq!(DisplayAttrs::for_position(0).color, BIN_PALETTE[0]);
        assert_eq!(DisplayAttrs::for_position(3).color, BIN_PALETTE[3]);
        assert_eq!(DisplayAttrs::for_position(10), DisplayAttrs::for_position(0));
        assert_eq!(DisplayAttrs::for_position(13), DisplayAttrs::for_position(3));
    }

    #[test]
    fn black_error_bars_are_visible() {
        let black = DisplayAttrs::sum();
        assert_ne!(black.error_bar_color(), black.color);
    }
}
