use geo::{Coord, Point, Rect};
use std::collections::BTreeSet;
use std::f64::consts::PI;

pub const TILE_SIZE: u32 = 256;
/// Deepest zoom `fit_bounds` will pick for degenerate (single-point) bounds.
pub const MAX_FIT_ZOOM: u8 = 18;

/// Global Web Mercator pixel coordinate of a lat/lng at a zoom level.
pub fn project(lat: f64, lng: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32) * TILE_SIZE as f64;
    let x = (lng + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Axis-aligned bounds of a set of positions; `None` when empty.
pub fn bounds_of(points: &[Point<f64>]) -> Option<Rect<f64>> {
    let first = points.first()?;
    let (mut min_x, mut min_y) = (first.x(), first.y());
    let (mut max_x, mut max_y) = (min_x, min_y);
    for p in &points[1..] {
        min_x = min_x.min(p.x());
        min_y = min_y.min(p.y());
        max_x = max_x.max(p.x());
        max_y = max_y.max(p.y());
    }
    Some(Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    ))
}

/// How the view last moved. Lets callers (and tests) tell the animated pan
/// of single-match search apart from an instant jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    None,
    Jump,
    Fly,
}

/// Headless map surface: a center, a zoom, and the fitting math the marker
/// workflows need. No tiles are fetched; the base layer is presentation.
#[derive(Debug)]
pub struct MapView {
    center: Point<f64>,
    zoom: u8,
    viewport: (u32, u32),
    last_motion: Motion,
}

impl MapView {
    pub fn new(center: Point<f64>, zoom: u8, viewport: (u32, u32)) -> Self {
        Self { center, zoom, viewport, last_motion: Motion::None }
    }

    pub fn center(&self) -> Point<f64> {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn last_motion(&self) -> Motion {
        self.last_motion
    }

    pub fn set_view(&mut self, center: Point<f64>, zoom: u8) {
        self.center = center;
        self.zoom = zoom;
        self.last_motion = Motion::Jump;
    }

    /// Zoom override without recentering (the post-fit snap on populate).
    pub fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    /// Smooth animated pan, the close-up used by single-match search.
    pub fn fly_to(&mut self, center: Point<f64>, zoom: u8) {
        self.center = center;
        self.zoom = zoom;
        self.last_motion = Motion::Fly;
    }

    /// Centers on `bounds` at the deepest zoom that still fits the viewport.
    pub fn fit_bounds(&mut self, bounds: Rect<f64>) {
        let center = Point::new(
            (bounds.min().x + bounds.max().x) / 2.0,
            (bounds.min().y + bounds.max().y) / 2.0,
        );
        let mut fit = 0;
        for zoom in (0..=MAX_FIT_ZOOM).rev() {
            let (x0, y0) = project(bounds.max().y, bounds.min().x, zoom);
            let (x1, y1) = project(bounds.min().y, bounds.max().x, zoom);
            let width = (x1 - x0).abs();
            let height = (y1 - y0).abs();
            if width <= self.viewport.0 as f64 && height <= self.viewport.1 as f64 {
                fit = zoom;
                break;
            }
        }
        self.set_view(center, fit);
    }
}

/// Opaque handle to one marker, an index into the controller's marker list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub usize);

/// Marker handle: position plus the mutable presentation state the
/// filter/search/highlight workflows drive. Owned exclusively by its
/// MarkerRecord.
#[derive(Debug)]
pub struct Marker {
    pub position: Point<f64>,
    pub opacity: f32,
    pub z_offset: i32,
    pub glow: bool,
    pub popup_open: bool,
}

impl Marker {
    pub fn new(position: Point<f64>) -> Self {
        Self { position, opacity: 1.0, z_offset: 0, glow: false, popup_open: false }
    }
}

/// Named collection of markers shown/hidden/cleared as a unit.
#[derive(Debug, Default)]
pub struct LayerGroup {
    members: BTreeSet<MarkerId>,
}

impl LayerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: MarkerId) -> bool {
        self.members.insert(id)
    }

    pub fn remove(&mut self, id: MarkerId) -> bool {
        self.members.remove(&id)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.members.contains(&id)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.members.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_origin_projects_to_tile_center() {
        let (x, y) = project(0.0, 0.0, 0);
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn projection_doubles_per_zoom_level() {
        let (x0, _) = project(14.6, 121.0, 10);
        let (x1, _) = project(14.6, 121.0, 11);
        assert!((x1 - 2.0 * x0).abs() < 1e-6);
    }

    #[test]
    fn bounds_of_empty_is_none() {
        assert!(bounds_of(&[]).is_none());
    }

    #[test]
    fn fit_bounds_centers_and_picks_deepest_fitting_zoom() {
        let mut view = MapView::new(Point::new(0.0, 0.0), 1, (768, 480));
        let bounds = bounds_of(&[Point::new(120.9, 14.5), Point::new(121.1, 14.7)]).unwrap();
        view.fit_bounds(bounds);
        assert!((view.center().x() - 121.0).abs() < 1e-9);
        assert!((view.center().y() - 14.6).abs() < 1e-9);
        let zoom = view.zoom();
        assert!(zoom > 0 && zoom < MAX_FIT_ZOOM, "unexpected zoom {zoom}");
        assert_eq!(view.last_motion(), Motion::Jump);

        // one level deeper must overflow the viewport
        let (x0, _) = project(14.7, 120.9, zoom + 1);
        let (x1, y1) = project(14.5, 121.1, zoom + 1);
        let (_, y0) = project(14.7, 120.9, zoom + 1);
        assert!((x1 - x0).abs() > 768.0 || (y1 - y0).abs() > 480.0);
    }

    #[test]
    fn single_point_bounds_fit_at_max_zoom() {
        let mut view = MapView::new(Point::new(0.0, 0.0), 1, (768, 480));
        let bounds = bounds_of(&[Point::new(121.0437, 14.676)]).unwrap();
        view.fit_bounds(bounds);
        assert_eq!(view.zoom(), MAX_FIT_ZOOM);
    }

    #[test]
    fn fly_to_records_animated_motion() {
        let mut view = MapView::new(Point::new(0.0, 0.0), 1, (768, 480));
        view.fly_to(Point::new(121.0, 14.6), 16);
        assert_eq!(view.zoom(), 16);
        assert_eq!(view.last_motion(), Motion::Fly);
    }

    #[test]
    fn layer_group_add_remove() {
        let mut layer = LayerGroup::new();
        assert!(layer.add(MarkerId(3)));
        assert!(!layer.add(MarkerId(3)));
        assert!(layer.contains(MarkerId(3)));
        assert!(layer.remove(MarkerId(3)));
        assert!(layer.is_empty());
    }
}
