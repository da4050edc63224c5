use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Map;

use crate::frame::{Frame, Value};
use crate::model::{ModelBundle, ModelSummary};
use crate::ranking::{clamp_top_k, rank_descending, ScoreSummary};
use crate::utils::AnalysisError;

/// Name of the score column in CSV results
pub const SCORE_COLUMN: &str = "anomaly_scored";

/// Request-independent scoring options
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSettings {
    /// Column identifying each CSV row in the response
    pub id_column: String,
    /// Columns coerced to numbers before scoring CSV uploads
    pub amount_columns: Vec<String>,
    /// `top_k` used when a JSON request does not give one
    pub default_top_k: usize,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            id_column: "BELNR".to_string(),
            amount_columns: vec!["DMBTR".to_string(), "WRBTR".to_string()],
            default_top_k: 10,
        }
    }
}

/// Top-K result of scoring JSON records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopKResult {
    pub n: usize,
    pub top_k: usize,
    pub top_index: Vec<usize>,
    pub top_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub id: Value,
    pub score: f64,
}

/// CSV rows ordered by descending score
///
/// Serializes as `[{<id_column>: id, "anomaly_scored": score}, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvScores {
    pub id_column: String,
    pub rows: Vec<ScoredRow>,
}

impl CsvScores {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct RowEntry<'a> {
    id_column: &'a str,
    row: &'a ScoredRow,
}

impl Serialize for RowEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.id_column, &self.row.id)?;
        map.serialize_entry(SCORE_COLUMN, &self.row.score)?;
        map.end()
    }
}

impl Serialize for CsvScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowEntry {
                id_column: &self.id_column,
                row,
            })?;
        }
        seq.end()
    }
}

/// Holds the loaded model and answers scoring requests
#[derive(Debug)]
pub struct ScoringService {
    bundle: ModelBundle,
    settings: ScoringSettings,
}

impl ScoringService {
    pub fn new(bundle: ModelBundle, settings: ScoringSettings) -> Self {
        Self { bundle, settings }
    }

    pub fn settings(&self) -> &ScoringSettings {
        &self.settings
    }

    pub fn model_summary(&self) -> ModelSummary {
        self.bundle.summary()
    }

    /// Score JSON records and keep the `top_k` most anomalous rows
    pub fn score_records(
        &self,
        records: &[Map<String, serde_json::Value>],
        top_k: Option<i64>,
    ) -> Result<TopKResult, AnalysisError> {
        if records.is_empty() {
            return Err(AnalysisError::ValidationError("records is empty".to_string()));
        }

        let frame = Frame::from_records(records);
        let scores = self.score_frame(&frame)?;

        let k = clamp_top_k(top_k, self.settings.default_top_k, scores.len());
        let top_index: Vec<usize> = rank_descending(&scores).into_iter().take(k).collect();
        let top_scores = top_index.iter().map(|&i| scores[i]).collect();

        tracing::info!(rows = scores.len(), returned = k, "scored JSON records");

        Ok(TopKResult {
            n: scores.len(),
            top_k: k,
            top_index,
            top_scores,
        })
    }

    /// Score an uploaded CSV file
    ///
    /// Every row is returned unless `top_k` is given explicitly.
    pub fn score_csv(&self, data: &[u8], top_k: Option<i64>) -> Result<CsvScores, AnalysisError> {
        let mut frame = Frame::from_csv(data)?;

        for column in &self.settings.amount_columns {
            if let Some(coerced) = frame.coerce_numeric(column) {
                if coerced > 0 {
                    tracing::debug!(column = %column, coerced, "non-numeric amounts set to missing");
                }
            }
        }

        let ids = frame
            .column(&self.settings.id_column)
            .map(|c| c.values.clone())
            .ok_or_else(|| {
                AnalysisError::ValidationError(format!(
                    "identifier column '{}' not found",
                    self.settings.id_column
                ))
            })?;

        if frame.is_empty() {
            return Err(AnalysisError::ValidationError(
                "CSV contains no data rows".to_string(),
            ));
        }

        let scores = self.score_frame(&frame)?;
        let limit = match top_k {
            Some(_) => clamp_top_k(top_k, self.settings.default_top_k, scores.len()),
            None => scores.len(),
        };

        let rows: Vec<ScoredRow> = rank_descending(&scores)
            .into_iter()
            .take(limit)
            .map(|i| ScoredRow {
                id: ids[i].clone(),
                score: scores[i],
            })
            .collect();

        tracing::info!(rows = scores.len(), returned = rows.len(), "scored CSV upload");

        Ok(CsvScores {
            id_column: self.settings.id_column.clone(),
            rows,
        })
    }

    fn score_frame(&self, frame: &Frame) -> Result<Vec<f64>, AnalysisError> {
        let scores = self.bundle.anomaly_scores(frame)?;
        if scores.len() != frame.n_rows() {
            return Err(AnalysisError::ModelError(format!(
                "scorer returned {} scores for {} rows",
                scores.len(),
                frame.n_rows()
            )));
        }
        if let Some(summary) = ScoreSummary::compute(&scores) {
            tracing::debug!(
                count = summary.count,
                missing = summary.missing,
                min = summary.min,
                max = summary.max,
                mean = summary.mean,
                "score distribution"
            );
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepRegistry;
    use serde_json::json;

    fn service() -> ScoringService {
        let artifact = json!({
            "feature_pipe": {"steps": [
                {"type": "DropColumns", "params": {"columns": ["BELNR"]}},
                {"type": "ColumnEncoder", "params": {"numeric": [{"column": "DMBTR", "fill": 0.0}]}}
            ]},
            "lof": {"type": "LocalOutlierFactor", "params": {
                "n_neighbors": 2,
                "training": [[0.0], [1.0], [2.0], [3.0]]
            }}
        });
        let bundle = ModelBundle::from_value(artifact, &StepRegistry::with_defaults()).unwrap();
        ScoringService::new(bundle, ScoringSettings::default())
    }

    fn records(value: serde_json::Value) -> Vec<Map<String, serde_json::Value>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_score_records_top_k() {
        let result = service()
            .score_records(
                &records(json!([{"DMBTR": 1}, {"DMBTR": 100}, {"DMBTR": 2}])),
                Some(2),
            )
            .unwrap();

        assert_eq!(result.n, 3);
        assert_eq!(result.top_k, 2);
        assert_eq!(result.top_index[0], 1);
        assert_eq!(result.top_index.len(), result.top_scores.len());
        assert!(result.top_scores[0] >= result.top_scores[1]);
    }

    #[test]
    fn test_score_records_empty() {
        let err = service().score_records(&[], Some(5)).unwrap_err();
        assert_eq!(err, AnalysisError::ValidationError("records is empty".to_string()));
    }

    #[test]
    fn test_score_records_schema_mismatch() {
        let err = service()
            .score_records(&records(json!([{"WRBTR": 1}])), None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::SchemaError(_)));
    }

    #[test]
    fn test_score_csv_returns_all_rows() {
        let csv = "BELNR,DMBTR\n1,1\n2,500\n3,abc\n4,2";
        let result = service().score_csv(csv.as_bytes(), None).unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(result.rows[0].id, Value::Int(2));
        let scores: Vec<f64> = result.rows.iter().map(|r| r.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_score_csv_explicit_top_k() {
        let csv = "BELNR,DMBTR\n1,1\n2,500\n3,2";
        let result = service().score_csv(csv.as_bytes(), Some(1)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].id, Value::Int(2));
    }

    #[test]
    fn test_score_csv_missing_identifier() {
        let err = service().score_csv(b"DMBTR\n1\n2", None).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::ValidationError("identifier column 'BELNR' not found".to_string())
        );
    }

    #[test]
    fn test_csv_scores_serialization() {
        let scores = CsvScores {
            id_column: "BELNR".to_string(),
            rows: vec![
                ScoredRow {
                    id: Value::Int(7),
                    score: 2.5,
                },
                ScoredRow {
                    id: Value::Text("X1".to_string()),
                    score: f64::NAN,
                },
            ],
        };
        assert_eq!(
            serde_json::to_value(&scores).unwrap(),
            json!([
                {"BELNR": 7, "anomaly_scored": 2.5},
                {"BELNR": "X1", "anomaly_scored": null}
            ])
        );
    }
}
