use crate::config::AppConfig;
use crate::types::{AreaRecord, NutritionCounts};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub struct AppState {
    pub areas: Vec<Arc<AreaRecord>>,
}

/// Wire form of one area, matching the dashboard's map-data contract.
#[derive(Serialize)]
struct AreaDto<'a> {
    name: &'a str,
    lat: Option<f64>,
    lng: Option<f64>,
    severe_count: u32,
    moderate_count: u32,
    normal_count: u32,
    unknown_count: u32,
    status: &'a str,
}

impl<'a> From<&'a AreaRecord> for AreaDto<'a> {
    fn from(area: &'a AreaRecord) -> Self {
        Self {
            name: &area.name,
            lat: area.position.map(|p| p.y()),
            lng: area.position.map(|p| p.x()),
            severe_count: area.counts.severe,
            moderate_count: area.counts.moderate,
            normal_count: area.counts.normal,
            unknown_count: area.counts.unknown,
            status: area.status.label(),
        }
    }
}

/// Serves the already-aggregated payload back to the dashboard panels. No
/// counts are computed here beyond summing what was loaded.
pub async fn start_server(config: AppConfig, areas: Vec<Arc<AreaRecord>>) -> Result<()> {
    let state = Arc::new(AppState { areas });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let glyph_service = ServeDir::new(&config.icons.output_dir);

    let app = Router::new()
        .route("/api/map-data", get(map_data_handler))
        .route("/api/chart-data/:kind", get(chart_data_handler))
        .nest_service("/markers", glyph_service)
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn map_data_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let areas: Vec<AreaDto> = state.areas.iter().map(|a| AreaDto::from(a.as_ref())).collect();
    Json(json!({ "success": true, "data": { "areas": areas } }))
}

/// Parameterized chart endpoint for the adjacent trends panel. Unknown kinds
/// get the `{success: false, message}` envelope rather than an HTTP error.
async fn chart_data_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Json<Value> {
    match kind.as_str() {
        "status-distribution" => {
            let totals = status_totals(&state.areas);
            Json(json!({ "success": true, "data": totals }))
        }
        "barangay-breakdown" => {
            Json(json!({ "success": true, "data": barangay_breakdown(&state.areas) }))
        }
        other => Json(json!({
            "success": false,
            "message": format!("unknown chart type '{other}'"),
        })),
    }
}

/// Category totals across every loaded area.
pub fn status_totals(areas: &[Arc<AreaRecord>]) -> NutritionCounts {
    areas.iter().fold(NutritionCounts::default(), |acc, area| NutritionCounts {
        severe: acc.severe + area.counts.severe,
        moderate: acc.moderate + area.counts.moderate,
        normal: acc.normal + area.counts.normal,
        unknown: acc.unknown + area.counts.unknown,
    })
}

/// Per-area patient totals with the derived status, for the breakdown panel.
pub fn barangay_breakdown(areas: &[Arc<AreaRecord>]) -> Vec<Value> {
    areas
        .iter()
        .map(|area| {
            json!({
                "name": area.name,
                "total": area.counts.total(),
                "status": area.status.label(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use geo::Point;

    fn area(name: &str, counts: NutritionCounts) -> Arc<AreaRecord> {
        Arc::new(AreaRecord {
            name: name.to_string(),
            position: Some(Point::new(121.0, 14.6)),
            status: counts.dominant(),
            counts,
        })
    }

    #[test]
    fn status_totals_sum_every_category() {
        let areas = vec![
            area("Uno", NutritionCounts { severe: 2, moderate: 1, normal: 3, unknown: 0 }),
            area("Dos", NutritionCounts { severe: 1, moderate: 0, normal: 2, unknown: 4 }),
        ];
        let totals = status_totals(&areas);
        assert_eq!(totals.severe, 3);
        assert_eq!(totals.moderate, 1);
        assert_eq!(totals.normal, 5);
        assert_eq!(totals.unknown, 4);
        // the totals struct serializes straight into the response envelope
        let value = serde_json::to_value(totals).unwrap();
        assert_eq!(value["severe"], 3);
        assert_eq!(value["unknown"], 4);
    }

    #[test]
    fn breakdown_reports_totals_and_status() {
        let areas = vec![area(
            "Uno",
            NutritionCounts { severe: 4, moderate: 1, normal: 0, unknown: 1 },
        )];
        let rows = barangay_breakdown(&areas);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Uno");
        assert_eq!(rows[0]["total"], 6);
        assert_eq!(rows[0]["status"], Status::Severe.label());
    }

    #[test]
    fn area_dto_uses_contract_field_names() {
        let record = area("Uno", NutritionCounts { severe: 1, ..Default::default() });
        let dto = AreaDto::from(record.as_ref());
        let value = serde_json::to_value(&dto).unwrap();
        assert_eq!(value["severe_count"], 1);
        assert_eq!(value["lat"], 14.6);
        assert_eq!(value["lng"], 121.0);
        assert_eq!(value["status"], "severe");
    }
}
