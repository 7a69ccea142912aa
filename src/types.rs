use geo::Point;
use serde::Serialize;

/// Dominant nutrition category assigned to an area for glyph coloring.
/// Serialized over the wire as its lowercase `label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Severe,
    Moderate,
    Normal,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Severe => "severe",
            Status::Moderate => "moderate",
            Status::Normal => "normal",
        }
    }

    /// Badge color matching the dashboard legend.
    pub fn color(&self) -> &'static str {
        match self {
            Status::Severe => "#ef4444",
            Status::Moderate => "#f59e0b",
            Status::Normal => "#3b82f6",
        }
    }
}

/// Aggregated patient counts for one area. Never negative, never mutated
/// after the index is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct NutritionCounts {
    pub severe: u32,
    pub moderate: u32,
    pub normal: u32,
    pub unknown: u32,
}

impl NutritionCounts {
    pub fn total(&self) -> u32 {
        self.severe + self.moderate + self.normal + self.unknown
    }

    /// Dominant-status rule: a category wins only with a strict majority over
    /// both other known categories. Ties and the all-zero case fall through
    /// to Normal.
    pub fn dominant(&self) -> Status {
        if self.severe > self.moderate && self.severe > self.normal {
            Status::Severe
        } else if self.moderate > self.severe && self.moderate > self.normal {
            Status::Moderate
        } else {
            Status::Normal
        }
    }
}

/// Filter selector driven by the dashboard's filter buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    All,
    Severe,
    Moderate,
    Normal,
    Unknown,
}

impl Filter {
    /// Parses the string payload the filter panel publishes. The panel uses
    /// SAM/MAM terminology; both spellings are accepted.
    pub fn parse(raw: &str) -> Option<Filter> {
        match raw.trim().to_lowercase().as_str() {
            "all" => Some(Filter::All),
            "sam" | "severe" => Some(Filter::Severe),
            "mam" | "moderate" => Some(Filter::Moderate),
            "normal" => Some(Filter::Normal),
            "unknown" => Some(Filter::Unknown),
            _ => None,
        }
    }

    /// Marker visibility rule. Not the same as `NutritionCounts::dominant`:
    /// the Severe filter keeps ties, Moderate must strictly beat severe, and
    /// Normal must strictly beat both. Kept exactly as the dashboard behaves.
    pub fn shows(&self, c: &NutritionCounts) -> bool {
        match self {
            Filter::All => true,
            Filter::Severe => c.severe > 0 && c.severe >= c.moderate && c.severe >= c.normal,
            Filter::Moderate => c.moderate > 0 && c.moderate > c.severe && c.moderate >= c.normal,
            Filter::Normal => c.normal > 0 && c.normal > c.severe && c.normal > c.moderate,
            Filter::Unknown => c.unknown > 0,
        }
    }
}

/// One geographic area (barangay) with aggregated counts and derived status.
/// Built once per data load and read-only afterwards.
#[derive(Debug, Clone)]
pub struct AreaRecord {
    pub name: String,
    /// `None` when the source record carried no coordinate; such areas get
    /// no marker but stay in the index.
    pub position: Option<Point<f64>>,
    pub counts: NutritionCounts,
    pub status: Status,
}

impl AreaRecord {
    /// Popup body shown when a marker is hovered or clicked.
    pub fn popup_text(&self) -> String {
        format!(
            "{} — {} severe, {} moderate, {} normal, {} unknown",
            self.name,
            self.counts.severe,
            self.counts.moderate,
            self.counts.normal,
            self.counts.unknown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(severe: u32, moderate: u32, normal: u32, unknown: u32) -> NutritionCounts {
        NutritionCounts { severe, moderate, normal, unknown }
    }

    #[test]
    fn strict_majority_wins() {
        assert_eq!(counts(5, 2, 1, 0).dominant(), Status::Severe);
        assert_eq!(counts(2, 5, 1, 0).dominant(), Status::Moderate);
        assert_eq!(counts(1, 2, 5, 0).dominant(), Status::Normal);
    }

    #[test]
    fn swapping_counts_tracks_the_rule() {
        let c = counts(5, 2, 1, 0);
        assert_eq!(c.dominant(), Status::Severe);
        let swapped = counts(2, 5, 1, 0);
        assert_eq!(swapped.dominant(), Status::Moderate);
    }

    #[test]
    fn ties_and_zero_fall_through_to_normal() {
        assert_eq!(counts(0, 0, 0, 0).dominant(), Status::Normal);
        assert_eq!(counts(3, 3, 1, 0).dominant(), Status::Normal);
        assert_eq!(counts(4, 2, 4, 0).dominant(), Status::Normal);
        // unknown never participates in the rule
        assert_eq!(counts(0, 0, 0, 99).dominant(), Status::Normal);
    }

    #[test]
    fn filter_rule_differs_from_dominant_rule() {
        // severe == moderate > normal > 0: no strict majority, so the
        // dominant status is Normal, yet the Severe filter still shows it.
        let c = counts(3, 3, 1, 0);
        assert_eq!(c.dominant(), Status::Normal);
        assert!(Filter::Severe.shows(&c));
        assert!(!Filter::Moderate.shows(&c));
        assert!(!Filter::Normal.shows(&c));
    }

    #[test]
    fn moderate_and_normal_filters_need_strict_wins() {
        let tied = counts(2, 2, 2, 0);
        assert!(Filter::Severe.shows(&tied));
        assert!(!Filter::Moderate.shows(&tied));
        assert!(!Filter::Normal.shows(&tied));

        let moderate_heavy = counts(1, 4, 4, 0);
        assert!(Filter::Moderate.shows(&moderate_heavy));
        assert!(!Filter::Normal.shows(&moderate_heavy));
    }

    #[test]
    fn unknown_filter_requires_unknown_patients() {
        assert!(!Filter::Unknown.shows(&counts(0, 0, 0, 0)));
        assert!(Filter::Unknown.shows(&counts(0, 0, 0, 1)));
        assert!(!Filter::Unknown.shows(&counts(9, 9, 9, 0)));
    }

    #[test]
    fn all_filter_always_shows() {
        assert!(Filter::All.shows(&counts(0, 0, 0, 0)));
        assert!(Filter::All.shows(&counts(1, 2, 3, 4)));
    }

    #[test]
    fn filter_parsing_accepts_panel_spellings() {
        assert_eq!(Filter::parse("SAM"), Some(Filter::Severe));
        assert_eq!(Filter::parse("severe"), Some(Filter::Severe));
        assert_eq!(Filter::parse("mam"), Some(Filter::Moderate));
        assert_eq!(Filter::parse(" All "), Some(Filter::All));
        assert_eq!(Filter::parse("bogus"), None);
    }

    #[test]
    fn popup_text_lists_all_categories() {
        let area = AreaRecord {
            name: "Barangay Uno".to_string(),
            position: Some(Point::new(121.0, 14.6)),
            counts: counts(1, 2, 3, 4),
            status: counts(1, 2, 3, 4).dominant(),
        };
        let text = area.popup_text();
        assert!(text.starts_with("Barangay Uno"));
        assert!(text.contains("1 severe"));
        assert!(text.contains("4 unknown"));
    }
}
