use crate::config::AppConfig;
use crate::types::{AreaRecord, NutritionCounts};
use anyhow::{Context, Result};
use geo::Point;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One raw area record as the backend emits it. Missing counts zero-fill;
/// the backend's SAM/MAM field names are accepted alongside the canonical
/// severe/moderate ones.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArea {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, alias = "sam_count")]
    pub severe_count: u32,
    #[serde(default, alias = "mam_count")]
    pub moderate_count: u32,
    #[serde(default)]
    pub normal_count: u32,
    #[serde(default)]
    pub unknown_count: u32,
}

/// Records stay untyped at the payload level so one malformed entry cannot
/// reject the whole response; typing happens per record in `parse_records`.
#[derive(Debug, Default, Deserialize)]
pub struct MapDataPayload {
    #[serde(default)]
    pub areas: Vec<Value>,
}

/// Loads area data from the configured source and builds the index. Network
/// or file failures are logged and yield an empty index; the map renders an
/// empty areas layer rather than failing the page.
pub async fn load_areas(config: &AppConfig) -> Vec<Arc<AreaRecord>> {
    let payload = match fetch_payload(config).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!("failed to load area data: {e:#}");
            MapDataPayload::default()
        }
    };
    info!("Loaded {} area records", payload.areas.len());
    build_index(parse_records(payload.areas))
}

async fn fetch_payload(config: &AppConfig) -> Result<MapDataPayload> {
    if let Some(path) = &config.data.inline_file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read area data file: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| "Failed to parse area data JSON")
    } else if let Some(url) = &config.data.url {
        info!("Fetching area data from {url}");
        let response = reqwest::get(url)
            .await
            .with_context(|| format!("Area data request to {url} failed"))?;
        response
            .error_for_status()
            .with_context(|| "Area data endpoint returned an error status")?
            .json()
            .await
            .with_context(|| "Failed to decode area data response")
    } else {
        warn!("no area data source configured");
        Ok(MapDataPayload::default())
    }
}

/// Types each record on its own. A record that fails the typed parse is
/// salvaged field by field with bad fields zero-filled, so one wrong-typed
/// value never blocks the rest of the payload.
pub fn parse_records(values: Vec<Value>) -> Vec<RawArea> {
    values
        .into_iter()
        .map(|value| match serde_json::from_value::<RawArea>(value.clone()) {
            Ok(record) => record,
            Err(e) => {
                let record = lenient_record(&value);
                warn!("malformed area record '{}' ({e}); zero-filling bad fields", record.name);
                record
            }
        })
        .collect()
}

fn lenient_record(value: &Value) -> RawArea {
    let count = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| value.get(*k).and_then(Value::as_u64))
            .unwrap_or(0) as u32
    };
    RawArea {
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        lat: value.get("lat").and_then(Value::as_f64),
        lng: value.get("lng").and_then(Value::as_f64),
        severe_count: count(&["severe_count", "sam_count"]),
        moderate_count: count(&["moderate_count", "mam_count"]),
        normal_count: count(&["normal_count"]),
        unknown_count: count(&["unknown_count"]),
    }
}

/// Normalizes raw records into the read-only aggregation index. Derived
/// status is computed here, once; records without a coordinate stay in the
/// index but will never receive a marker.
pub fn build_index(raw: Vec<RawArea>) -> Vec<Arc<AreaRecord>> {
    raw.into_iter()
        .map(|r| {
            let counts = NutritionCounts {
                severe: r.severe_count,
                moderate: r.moderate_count,
                normal: r.normal_count,
                unknown: r.unknown_count,
            };
            let position = match (r.lat, r.lng) {
                (Some(lat), Some(lng)) => Some(Point::new(lng, lat)),
                _ => {
                    debug!("area '{}' has no coordinate; marker will be skipped", r.name);
                    None
                }
            };
            Arc::new(AreaRecord {
                status: counts.dominant(),
                name: r.name,
                position,
                counts,
            })
        })
        .collect()
}
