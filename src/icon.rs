use crate::config::IconConfig;
use crate::types::{AreaRecord, NutritionCounts};
use anyhow::{anyhow, Result};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;
use tracing::warn;

/// White ring around the pie, in pixels.
const BORDER_PX: f64 = 2.0;
/// Drop shadow offset (down-right) and alpha.
const SHADOW_OFFSET: f64 = 1.5;
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 60]);
const BORDER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Config colors are user-edited; anything but two hex digits per channel
/// degrades to 0 rather than panicking.
pub fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0..2), channel(2..4), channel(4..6), 255])
}

/// Slice colors in the fixed category order severe/moderate/normal/unknown,
/// plus the neutral disc for empty areas. Parsed once from config.
#[derive(Debug, Clone)]
pub struct Palette {
    pub severe: Rgba<u8>,
    pub moderate: Rgba<u8>,
    pub normal: Rgba<u8>,
    pub unknown: Rgba<u8>,
    pub empty: Rgba<u8>,
}

impl Palette {
    pub fn from_config(config: &IconConfig) -> Self {
        Self {
            severe: hex_to_rgba(&config.severe_color),
            moderate: hex_to_rgba(&config.moderate_color),
            normal: hex_to_rgba(&config.normal_color),
            unknown: hex_to_rgba(&config.unknown_color),
            empty: hex_to_rgba(&config.empty_color),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IconKey {
    counts: NutritionCounts,
    size: u32,
}

/// Renders marker glyphs and memoizes them by count tuple and size. Chart
/// rasterization dominates populate cost on large datasets, so identical
/// count tuples share one image. The cache lives for a single data load;
/// `MapController::populate` drops it on reload.
pub struct IconFactory {
    palette: Palette,
    cache: HashMap<IconKey, Arc<RgbaImage>>,
}

impl IconFactory {
    pub fn new(palette: Palette) -> Self {
        Self { palette, cache: HashMap::new() }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// One glyph per area: a proportional 4-slice pie when the area has
    /// patients, a flat neutral disc when it has none. A pie that fails to
    /// render falls back to the flat disc instead of dropping the marker.
    pub fn make_icon(&mut self, area: &AreaRecord, size: u32) -> Arc<RgbaImage> {
        let key = IconKey { counts: area.counts, size };
        if let Some(icon) = self.cache.get(&key) {
            return Arc::clone(icon);
        }
        let img = if area.counts.total() == 0 {
            flat_disc(&self.palette, size)
        } else {
            match pie_glyph(&self.palette, &area.counts, size) {
                Ok(img) => img,
                Err(e) => {
                    warn!("pie glyph for '{}' failed ({e:#}); using flat disc", area.name);
                    flat_disc(&self.palette, size)
                }
            }
        };
        let icon = Arc::new(img);
        self.cache.insert(key, Arc::clone(&icon));
        icon
    }
}

/// Neutral circular glyph for areas with zero patients.
fn flat_disc(palette: &Palette, size: u32) -> RgbaImage {
    let mut img = RgbaImage::new(size.max(1), size.max(1));
    let c = (size.max(1) as f64 - 1.0) / 2.0;
    let r = size.max(1) as f64 / 2.0 - 1.0;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f64 - c;
        let dy = y as f64 - c;
        if (dx * dx + dy * dy).sqrt() <= r {
            *pixel = palette.empty;
        }
    }
    img
}

/// Proportional pie with a white border and a drop shadow. Slices run
/// clockwise from twelve o'clock in the fixed category order.
fn pie_glyph(palette: &Palette, counts: &NutritionCounts, size: u32) -> Result<RgbaImage> {
    if size < 8 {
        return Err(anyhow!("glyph size {size} too small for a pie chart"));
    }
    let total = counts.total() as f64;
    if total <= 0.0 {
        return Err(anyhow!("pie chart requested for an empty area"));
    }

    let slices = [
        (counts.severe, palette.severe),
        (counts.moderate, palette.moderate),
        (counts.normal, palette.normal),
        (counts.unknown, palette.unknown),
    ];
    // cumulative slice boundaries as fractions of a full turn
    let mut boundaries = [0.0_f64; 5];
    let mut acc = 0.0;
    for (i, (count, _)) in slices.iter().enumerate() {
        acc += *count as f64 / total;
        boundaries[i + 1] = acc;
    }
    boundaries[4] = 1.0;

    let mut img = RgbaImage::new(size, size);
    let c = (size as f64 - 1.0) / 2.0;
    let r = size as f64 / 2.0 - 1.0;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f64 - c;
        let dy = y as f64 - c;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist <= r {
            if dist >= r - BORDER_PX {
                *pixel = BORDER;
                continue;
            }
            // angle in turns, zero at twelve o'clock, clockwise
            let turns = (dx.atan2(-dy) / TAU).rem_euclid(1.0);
            let idx = boundaries[1..]
                .iter()
                .position(|b| turns < *b)
                .unwrap_or(slices.len() - 1);
            *pixel = slices[idx].1;
        } else {
            // drop shadow just outside the disc, offset down-right
            let sx = dx - SHADOW_OFFSET;
            let sy = dy - SHADOW_OFFSET;
            if (sx * sx + sy * sy).sqrt() <= r {
                *pixel = SHADOW;
            }
        }
    }
    Ok(img)
}
