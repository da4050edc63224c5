//! Route handlers

use std::fmt;

use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Multipart, Query, State},
    Json,
};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::error::ApiError;
use super::AppState;
use crate::model::ModelSummary;
use crate::service::{CsvScores, TopKResult};

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub records: Vec<Map<String, serde_json::Value>>,
    #[serde(default, deserialize_with = "deserialize_top_k")]
    pub top_k: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CsvScoreParams {
    #[serde(default, deserialize_with = "deserialize_top_k")]
    pub top_k: Option<i64>,
}

/// Accepts `top_k` as an integer, an integral float like `2.0`, or a
/// string holding either
fn deserialize_top_k<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_option(TopKVisitor)
}

struct TopKVisitor;

impl TopKVisitor {
    fn integral<E: de::Error>(&self, v: f64) -> Result<Option<i64>, E> {
        if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            Ok(Some(v as i64))
        } else {
            Err(E::invalid_value(Unexpected::Float(v), self))
        }
    }
}

impl<'de> Visitor<'de> for TopKVisitor {
    type Value = Option<i64>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer top_k")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(i64::try_from(v).unwrap_or(i64::MAX)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        self.integral(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        if let Ok(k) = trimmed.parse::<i64>() {
            return Ok(Some(k));
        }
        match trimmed.parse::<f64>() {
            Ok(f) => self.integral(f),
            Err(_) => Err(E::invalid_value(Unexpected::Str(v), &self)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: ModelSummary,
}

/// Liveness check; state only exists once the model has loaded
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_loaded: true,
    })
}

/// Readiness check with a description of the loaded model
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
        model: state.service.model_summary(),
    })
}

pub async fn score(
    State(state): State<AppState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<TopKResult>, ApiError> {
    let Json(req) = payload?;

    let service = state.service.clone();
    let result =
        tokio::task::spawn_blocking(move || service.score_records(&req.records, req.top_k))
            .await??;

    Ok(Json(result))
}

pub async fn score_csv(
    State(state): State<AppState>,
    params: Result<Query<CsvScoreParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CsvScores>, ApiError> {
    let Query(params) = params?;
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let data = upload.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    let service = state.service.clone();
    let result =
        tokio::task::spawn_blocking(move || service.score_csv(&data, params.top_k)).await??;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> Result<ScoreRequest, serde_json::Error> {
        serde_json::from_value(body)
    }

    #[test]
    fn test_top_k_forms() {
        let records = json!([{"a": 1}]);
        for (top_k, expected) in [
            (json!(3), Some(3)),
            (json!(-1), Some(-1)),
            (json!(2.0), Some(2)),
            (json!("4"), Some(4)),
            (json!(null), None),
        ] {
            let req = parse(json!({"records": records, "top_k": top_k})).unwrap();
            assert_eq!(req.top_k, expected);
        }

        let req = parse(json!({"records": records})).unwrap();
        assert_eq!(req.top_k, None);
    }

    #[test]
    fn test_fractional_top_k_rejected() {
        assert!(parse(json!({"records": [], "top_k": 2.5})).is_err());
        assert!(parse(json!({"records": [], "top_k": "many"})).is_err());
    }
}
