use crate::clock::{Clock, TimerQueue};
use crate::config::AppConfig;
use crate::events::{EventBus, PanelEvent, Subscription};
use crate::icon::{IconFactory, Palette};
use crate::map::{bounds_of, LayerGroup, MapView, Marker, MarkerId};
use crate::types::{AreaRecord, Filter, Status};
use geo::Point;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stacking-order boost for the highlighted marker.
const HIGHLIGHT_Z: i32 = 1000;
/// Smaller boost applied on hover.
const HOVER_Z: i32 = 250;

/// Map lifecycle. Interactive operations are rejected until the first data
/// load moves the controller to Populated; this is the explicit readiness
/// barrier the filter/search handlers check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    Populated,
}

/// Marker presence in the areas layer, including the timed fade stages.
/// Removal from the layer happens only when a fade-out completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    FadingIn,
    FadingOut,
    Hidden,
}

impl Visibility {
    /// Whether this state counts as shown when deciding filter flips.
    fn shown(self) -> bool {
        matches!(self, Visibility::Visible | Visibility::FadingIn)
    }
}

/// One marker per area with a coordinate. Valid for a single data load; the
/// cached status/color are snapshots taken at creation and never re-synced.
pub struct MarkerRecord {
    pub marker: Marker,
    pub area: Arc<AreaRecord>,
    pub status: Status,
    pub color: &'static str,
    pub icon: Arc<RgbaImage>,
    pub visibility: Visibility,
    /// Bumped on every visibility flip so a stale fade timer from an
    /// earlier flip cannot act on the marker.
    fade_epoch: u64,
}

#[derive(Debug, Default)]
struct HighlightState {
    /// The single tracked highlight. Timed multi-match highlights bypass
    /// this slot on purpose.
    active: Option<MarkerId>,
}

#[derive(Debug)]
enum TimerAction {
    FadeInDone { id: MarkerId, epoch: u64 },
    FadeOutDone { id: MarkerId, epoch: u64 },
    HighlightReset { id: MarkerId },
}

/// Owns the map surface, the marker list, the highlight slot, and the active
/// filter. All interaction funnels through here on one thread; the only
/// deferred work is the timer queue drained by `tick`.
pub struct MapController {
    phase: Phase,
    view: MapView,
    patients_layer: LayerGroup,
    assessments_layer: LayerGroup,
    areas_layer: LayerGroup,
    markers: Vec<MarkerRecord>,
    highlight: HighlightState,
    filter: Filter,
    icons: IconFactory,
    icon_size: u32,
    fade: Duration,
    highlight_reset: Duration,
    default_zoom: u8,
    focus_zoom: u8,
    timers: TimerQueue<TimerAction>,
    clock: Arc<dyn Clock>,
    subscription: Option<Subscription>,
}

impl MapController {
    /// Builds the Initialized state: view at the default center and zoom,
    /// empty overlay layer groups, panel subscription registered.
    pub fn new(config: &AppConfig, bus: &EventBus, clock: Arc<dyn Clock>) -> Self {
        let view = MapView::new(
            Point::new(config.map.center_lng, config.map.center_lat),
            config.map.default_zoom,
            (config.map.viewport_width, config.map.viewport_height),
        );
        Self {
            phase: Phase::Initialized,
            view,
            patients_layer: LayerGroup::new(),
            assessments_layer: LayerGroup::new(),
            areas_layer: LayerGroup::new(),
            markers: Vec::new(),
            highlight: HighlightState::default(),
            filter: Filter::All,
            icons: IconFactory::new(Palette::from_config(&config.icons)),
            icon_size: config.icons.size,
            fade: Duration::from_millis(config.timing.fade_ms),
            highlight_reset: Duration::from_millis(config.timing.highlight_reset_ms),
            default_zoom: config.map.default_zoom,
            focus_zoom: config.map.focus_zoom,
            timers: TimerQueue::new(),
            clock,
            subscription: Some(bus.subscribe()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Populated
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    /// Patient overlay, attached at init and populated by flows outside the
    /// area visualization.
    pub fn patients_layer(&self) -> &LayerGroup {
        &self.patients_layer
    }

    /// Assessment overlay, attached at init and populated by flows outside
    /// the area visualization.
    pub fn assessments_layer(&self) -> &LayerGroup {
        &self.assessments_layer
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn markers(&self) -> &[MarkerRecord] {
        &self.markers
    }

    pub fn highlighted(&self) -> Option<MarkerId> {
        self.highlight.active
    }

    /// Markers currently attached to the areas layer group.
    pub fn visible_marker_count(&self) -> usize {
        self.areas_layer.len()
    }

    pub fn marker_by_name(&self, name: &str) -> Option<MarkerId> {
        self.markers
            .iter()
            .position(|rec| rec.area.name == name)
            .map(MarkerId)
    }

    /// (Re)builds the marker set from a fresh index. The previous markers,
    /// layer membership, timers and icon cache are always cleared first, so
    /// loading twice never duplicates glyphs.
    pub fn populate(&mut self, areas: &[Arc<AreaRecord>]) {
        self.areas_layer.clear();
        self.markers.clear();
        self.highlight.active = None;
        self.timers.clear();
        self.icons.clear();

        for area in areas {
            let Some(position) = area.position else {
                debug!("area '{}' has no coordinate; no marker placed", area.name);
                continue;
            };
            // per-record isolation: a glyph that cannot be pie-rendered
            // falls back inside the factory, never aborting the pass
            let icon = self.icons.make_icon(area, self.icon_size);
            let id = MarkerId(self.markers.len());
            self.markers.push(MarkerRecord {
                marker: Marker::new(position),
                area: Arc::clone(area),
                status: area.status,
                color: area.status.color(),
                icon,
                visibility: Visibility::Visible,
                fade_epoch: 0,
            });
            self.areas_layer.add(id);
        }

        // Two-step viewport: fit everything, then snap back to the standard
        // zoom so dense clusters stay readable.
        if let Some(bounds) = bounds_of(&self.marker_positions()) {
            self.view.fit_bounds(bounds);
            self.view.set_zoom(self.default_zoom);
        }

        self.filter = Filter::All;
        self.phase = Phase::Populated;
        info!(
            "map populated: {} markers from {} areas",
            self.markers.len(),
            areas.len()
        );
    }

    /// Applies a filter selection to every marker. Flips to shown attach the
    /// marker and fade it in; flips to hidden fade it out and detach it only
    /// when the fade completes. Unchanged markers are untouched.
    pub fn apply_filter(&mut self, filter: Filter) {
        if !self.is_ready() {
            warn!("filter ignored: map not populated yet");
            return;
        }
        self.filter = filter;
        let now = self.clock.now();
        for idx in 0..self.markers.len() {
            let id = MarkerId(idx);
            let rec = &mut self.markers[idx];
            let should_show = filter.shows(&rec.area.counts);
            if should_show == rec.visibility.shown() {
                continue;
            }
            rec.fade_epoch += 1;
            let epoch = rec.fade_epoch;
            if should_show {
                rec.visibility = Visibility::FadingIn;
                rec.marker.opacity = 0.0;
                self.areas_layer.add(id);
                self.timers
                    .schedule(now + self.fade, TimerAction::FadeInDone { id, epoch });
            } else {
                rec.visibility = Visibility::FadingOut;
                self.timers
                    .schedule(now + self.fade, TimerAction::FadeOutDone { id, epoch });
            }
        }
    }

    /// Text search over area names.
    ///
    /// Empty query: clear the tracked highlight and fit the viewport to the
    /// full marker set (the active filter is ignored here on purpose). One
    /// match: persistent highlight, animated pan to the focus zoom, popup.
    /// Several matches: fit their bounds and give each a timed highlight.
    pub fn search(&mut self, query: &str) {
        if !self.is_ready() {
            warn!("search ignored: map not populated yet");
            return;
        }
        let query = query.trim();
        if query.is_empty() {
            if let Some(id) = self.highlight.active.take() {
                self.unstyle(id);
            }
            if let Some(bounds) = bounds_of(&self.marker_positions()) {
                self.view.fit_bounds(bounds);
            }
            return;
        }

        let needle = query.to_lowercase();
        let matches: Vec<MarkerId> = self
            .markers
            .iter()
            .enumerate()
            .filter(|(_, rec)| rec.area.name.to_lowercase().contains(&needle))
            .map(|(i, _)| MarkerId(i))
            .collect();

        match matches.as_slice() {
            [] => debug!("search '{query}' matched no areas"),
            [only] => {
                let id = *only;
                self.highlight(id, None);
                let position = self.markers[id.0].marker.position;
                self.view.fly_to(position, self.focus_zoom);
                self.markers[id.0].marker.popup_open = true;
            }
            many => {
                let points: Vec<Point<f64>> = many
                    .iter()
                    .map(|id| self.markers[id.0].marker.position)
                    .collect();
                if let Some(bounds) = bounds_of(&points) {
                    self.view.fit_bounds(bounds);
                }
                let reset = self.highlight_reset;
                for &id in many {
                    self.highlight(id, Some(reset));
                }
            }
        }
    }

    /// Style-only emphasis: raised stacking order plus a glow; never moves
    /// the map. A persistent highlight (no auto-reset) replaces the tracked
    /// one. Timed highlights run on their own timers and stay out of the
    /// tracked slot, so several can coexist after a multi-match search.
    pub fn highlight(&mut self, id: MarkerId, auto_reset: Option<Duration>) {
        if !self.is_ready() {
            warn!("highlight ignored: map not populated yet");
            return;
        }
        let Some(rec) = self.markers.get_mut(id.0) else {
            return;
        };
        rec.marker.glow = true;
        rec.marker.z_offset = HIGHLIGHT_Z;
        match auto_reset {
            None => {
                if let Some(prev) = self.highlight.active.replace(id) {
                    if prev != id {
                        self.unstyle(prev);
                    }
                }
            }
            Some(delay) => {
                let at = self.clock.now() + delay;
                self.timers.schedule(at, TimerAction::HighlightReset { id });
            }
        }
    }

    /// Restores default styling; clears the tracked slot when it held `id`.
    pub fn reset_highlight(&mut self, id: MarkerId) {
        self.unstyle(id);
        if self.highlight.active == Some(id) {
            self.highlight.active = None;
        }
    }

    fn unstyle(&mut self, id: MarkerId) {
        if let Some(rec) = self.markers.get_mut(id.0) {
            rec.marker.glow = false;
            rec.marker.z_offset = 0;
        }
    }

    /// Hover opens the popup in place, no pan or zoom. The hover style bump
    /// is suppressed on the marker currently held by the highlight slot.
    pub fn on_marker_hover(&mut self, id: MarkerId) {
        if !self.is_ready() {
            return;
        }
        let is_highlighted = self.highlight.active == Some(id);
        if let Some(rec) = self.markers.get_mut(id.0) {
            rec.marker.popup_open = true;
            if !is_highlighted {
                rec.marker.z_offset = HOVER_Z;
            }
        }
    }

    /// Click sets the persistent highlight and opens the popup, no pan or
    /// zoom.
    pub fn on_marker_click(&mut self, id: MarkerId) {
        if !self.is_ready() {
            return;
        }
        self.highlight(id, None);
        if let Some(rec) = self.markers.get_mut(id.0) {
            rec.marker.popup_open = true;
        }
    }

    pub fn on_popup_dismiss(&mut self, id: MarkerId) {
        let is_highlighted = self.highlight.active == Some(id);
        if let Some(rec) = self.markers.get_mut(id.0) {
            rec.marker.popup_open = false;
            if !is_highlighted {
                rec.marker.z_offset = 0;
            }
        }
    }

    /// Drains every timer whose deadline has passed. The event loop calls
    /// this after advancing time; tests drive it through a ManualClock.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for action in self.timers.due(now) {
            match action {
                TimerAction::FadeInDone { id, epoch } => {
                    let Some(rec) = self.markers.get_mut(id.0) else {
                        continue;
                    };
                    if rec.fade_epoch != epoch {
                        continue; // superseded by a newer flip
                    }
                    if rec.visibility == Visibility::FadingIn {
                        rec.visibility = Visibility::Visible;
                        rec.marker.opacity = 1.0;
                    }
                }
                TimerAction::FadeOutDone { id, epoch } => {
                    let Some(rec) = self.markers.get_mut(id.0) else {
                        continue;
                    };
                    if rec.fade_epoch != epoch {
                        continue;
                    }
                    if rec.visibility == Visibility::FadingOut {
                        rec.visibility = Visibility::Hidden;
                        rec.marker.opacity = 0.0;
                        self.areas_layer.remove(id);
                    }
                }
                TimerAction::HighlightReset { id } => {
                    // the slot now owns this marker via a newer persistent
                    // highlight; the stale timer must not clobber it
                    if self.highlight.active == Some(id) {
                        continue;
                    }
                    self.unstyle(id);
                }
            }
        }
    }

    /// Earliest pending timer deadline, for an async driver.
    pub fn next_deadline(&self) -> Option<std::time::Instant> {
        self.timers.next_deadline()
    }

    /// Forwards everything the panel published since the last pump. Filter
    /// payloads that name no known selector are dropped with a warning.
    pub fn pump_events(&mut self) {
        let events = match self.subscription.as_mut() {
            Some(sub) => sub.drain(),
            None => return,
        };
        for event in events {
            match event {
                PanelEvent::FilterChanged(raw) => match Filter::parse(&raw) {
                    Some(filter) => self.apply_filter(filter),
                    None => warn!("unknown filter selector '{raw}'"),
                },
                PanelEvent::SearchChanged(query) => self.search(&query),
            }
        }
    }

    /// Drops the panel subscription; the widget stops reacting to bus
    /// events.
    pub fn teardown(&mut self) {
        self.subscription = None;
    }

    fn marker_positions(&self) -> Vec<Point<f64>> {
        self.markers.iter().map(|rec| rec.marker.position).collect()
    }
}
