//! Fitted prediction pipeline: column preprocessing followed by the forest.
//!
//! Numeric columns pass through unchanged; categorical columns are one-hot
//! encoded against the categories seen at fit time. A category never seen
//! during fitting encodes to all zeros.

use crate::aqi::{aqi_category, pm25_to_aqi};
use crate::errors::{ForecastError, Result};
use crate::forest::Forest;
use crate::types::{
    FeatureRow, FeatureValue, Prediction, PredictionStatus, CATEGORICAL_FEATURES,
    NUMERIC_FEATURES, TARGET_COLUMN,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Confidence reported for predictions scored by a trained bundle.
pub const MODEL_CONFIDENCE: f64 = 0.82;

/// How one input column maps onto the encoded feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnSpec {
    /// One output slot holding the raw number
    Passthrough { name: String },
    /// One output slot per known category, in sorted order
    OneHot { name: String, categories: Vec<String> },
}

impl ColumnSpec {
    pub fn name(&self) -> &str {
        match self {
            ColumnSpec::Passthrough { name } | ColumnSpec::OneHot { name, .. } => name,
        }
    }

    fn width(&self) -> usize {
        match self {
            ColumnSpec::Passthrough { .. } => 1,
            ColumnSpec::OneHot { categories, .. } => categories.len(),
        }
    }
}

/// Column-wise preprocessor fitted on training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransformer {
    columns: Vec<ColumnSpec>,
}

impl ColumnTransformer {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    /// Fit over training rows using the standard numeric and categorical columns.
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        Self::fit_columns(rows, &NUMERIC_FEATURES, &CATEGORICAL_FEATURES)
    }

    pub fn fit_columns(rows: &[FeatureRow], numeric: &[&str], categorical: &[&str]) -> Result<Self> {
        if rows.is_empty() {
            return Err(ForecastError::DataUnavailable(
                "cannot fit a preprocessor on zero rows".to_string(),
            ));
        }

        let mut columns: Vec<ColumnSpec> = numeric
            .iter()
            .map(|name| ColumnSpec::Passthrough {
                name: name.to_string(),
            })
            .collect();

        for name in categorical {
            let mut seen = BTreeSet::new();
            for row in rows {
                match row.get(name) {
                    Some(FeatureValue::Text(value)) => {
                        seen.insert(value.clone());
                    }
                    Some(FeatureValue::Number(_)) => {
                        return Err(ForecastError::SchemaMismatch(format!(
                            "categorical column '{name}' holds a number"
                        )))
                    }
                    None => {
                        return Err(ForecastError::SchemaMismatch(format!(
                            "categorical column '{name}' missing from training row"
                        )))
                    }
                }
            }
            columns.push(ColumnSpec::OneHot {
                name: name.to_string(),
                categories: seen.into_iter().collect(),
            });
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Input column names, in order.
    pub fn input_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// Width of the encoded feature vector.
    pub fn output_width(&self) -> usize {
        self.columns.iter().map(ColumnSpec::width).sum()
    }

    /// Encoded slot names, e.g. `lat` or `city=Delhi`.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.output_width());
        for column in &self.columns {
            match column {
                ColumnSpec::Passthrough { name } => names.push(name.clone()),
                ColumnSpec::OneHot { name, categories } => {
                    names.extend(categories.iter().map(|c| format!("{name}={c}")))
                }
            }
        }
        names
    }

    /// Encode one row.
    pub fn transform(&self, row: &FeatureRow) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.output_width());
        for column in &self.columns {
            let name = column.name();
            let value = row
                .get(name)
                .ok_or_else(|| ForecastError::feature_mismatch(name, "column is absent"))?;

            match (column, value) {
                (ColumnSpec::Passthrough { .. }, FeatureValue::Number(x)) => {
                    if !x.is_finite() {
                        return Err(ForecastError::feature_mismatch(
                            name,
                            format!("non-finite value {x}"),
                        ));
                    }
                    out.push(*x);
                }
                (ColumnSpec::OneHot { categories, .. }, FeatureValue::Text(category)) => {
                    let hot = categories.binary_search(category).ok();
                    out.extend((0..categories.len()).map(|i| {
                        if Some(i) == hot {
                            1.0
                        } else {
                            0.0
                        }
                    }));
                }
                (ColumnSpec::Passthrough { .. }, FeatureValue::Text(_)) => {
                    return Err(ForecastError::feature_mismatch(name, "expected a number"))
                }
                (ColumnSpec::OneHot { .. }, FeatureValue::Number(_)) => {
                    return Err(ForecastError::feature_mismatch(name, "expected text"))
                }
            }
        }
        Ok(out)
    }
}

/// Preprocessor plus fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub preprocessor: ColumnTransformer,
    pub forest: Forest,
}

impl Pipeline {
    pub fn new(preprocessor: ColumnTransformer, forest: Forest) -> Self {
        Self {
            preprocessor,
            forest,
        }
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<f64> {
        let encoded = self.preprocessor.transform(row)?;
        self.forest
            .predict(&encoded)
            .map_err(|e| ForecastError::PredictionFailure(e.to_string()))
    }
}

/// The persisted model: fitted pipeline and the feature columns it was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub pipeline: Pipeline,
    pub feature_columns: Vec<String>,
    pub target: String,
}

impl ModelBundle {
    pub fn new(pipeline: Pipeline) -> Self {
        let feature_columns = pipeline.preprocessor.input_columns();
        Self {
            pipeline,
            feature_columns,
            target: TARGET_COLUMN.to_string(),
        }
    }

    /// Structural checks run after loading a bundle from disk.
    pub fn validate(&self) -> Result<()> {
        if self.feature_columns != self.pipeline.preprocessor.input_columns() {
            return Err(ForecastError::ModelNotTrained(
                "bundle feature columns disagree with its preprocessor".to_string(),
            ));
        }
        let width = self.pipeline.preprocessor.output_width();
        if width != self.pipeline.forest.n_features {
            return Err(ForecastError::ModelNotTrained(format!(
                "preprocessor emits {width} features, forest expects {}",
                self.pipeline.forest.n_features
            )));
        }
        self.pipeline
            .forest
            .validate()
            .map_err(|e| ForecastError::ModelNotTrained(e.to_string()))
    }

    /// Raw PM2.5 estimate for a row. Every bundle column must be present;
    /// extra columns are ignored and the encoder fixes the slot order.
    pub fn score(&self, row: &FeatureRow) -> Result<f64> {
        if let Some(column) = self.feature_columns.iter().find(|c| row.get(c).is_none()) {
            return Err(ForecastError::feature_mismatch(
                column,
                "required by the bundle but absent from the request",
            ));
        }

        let pm25 = self.pipeline.predict(row)?;
        if !pm25.is_finite() {
            return Err(ForecastError::PredictionFailure(format!(
                "model produced a non-finite score ({pm25})"
            )));
        }
        Ok(pm25)
    }

    /// Strict prediction; `model_version` is the id the bundle was published under.
    pub fn predict(&self, row: &FeatureRow, model_version: &str) -> Result<Prediction> {
        let pm25 = self.score(row)?;
        let aqi = pm25_to_aqi(pm25);
        Ok(Prediction {
            pm25,
            aqi,
            category: aqi_category(aqi),
            confidence: MODEL_CONFIDENCE,
            model_version: model_version.to_string(),
            status: PredictionStatus::Model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::AqiCategory;
    use crate::forest::{Node, Tree};

    fn row(temp: f64, city: &str) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.set_number("temp", temp);
        row.set_text("city", city);
        row
    }

    fn transformer() -> ColumnTransformer {
        let rows = vec![row(20.0, "Delhi"), row(25.0, "Agra"), row(30.0, "Delhi")];
        ColumnTransformer::fit_columns(&rows, &["temp"], &["city"]).unwrap()
    }

    /// temp <= 22.5 -> 40, else city=Delhi slot decides 100 vs 20.
    fn bundle() -> ModelBundle {
        let tree = Tree::new(vec![
            Node::internal(0, 0, 22.5, 1, 2),
            Node::leaf(1, 40.0),
            Node::internal(2, 2, 0.5, 3, 4),
            Node::leaf(3, 20.0),
            Node::leaf(4, 100.0),
        ]);
        ModelBundle::new(Pipeline::new(transformer(), Forest::new(3, vec![tree])))
    }

    #[test]
    fn categories_are_sorted_and_unique() {
        let t = transformer();
        assert_eq!(t.output_width(), 3);
        assert_eq!(t.output_names(), vec!["temp", "city=Agra", "city=Delhi"]);
    }

    #[test]
    fn one_hot_encoding() {
        let t = transformer();
        assert_eq!(t.transform(&row(21.0, "Delhi")).unwrap(), vec![21.0, 0.0, 1.0]);
        assert_eq!(t.transform(&row(21.0, "Agra")).unwrap(), vec![21.0, 1.0, 0.0]);
    }

    #[test]
    fn unseen_category_encodes_to_zeros() {
        let t = transformer();
        assert_eq!(t.transform(&row(21.0, "Pune")).unwrap(), vec![21.0, 0.0, 0.0]);
    }

    #[test]
    fn type_mismatch_is_feature_mismatch() {
        let t = transformer();
        let mut bad = FeatureRow::new();
        bad.set_text("temp", "warm");
        bad.set_text("city", "Delhi");
        let err = t.transform(&bad).unwrap_err();
        assert!(matches!(err, ForecastError::FeatureMismatch { ref column, .. } if column == "temp"));
    }

    #[test]
    fn bundle_predicts_through_pipeline() {
        let bundle = bundle();
        assert!(bundle.validate().is_ok());
        assert_eq!(bundle.feature_columns, vec!["temp", "city"]);

        let prediction = bundle.predict(&row(30.0, "Delhi"), "rf_pm25_abc").unwrap();
        assert_eq!(prediction.pm25, 100.0);
        assert_eq!(prediction.aqi, 234);
        assert_eq!(prediction.category, AqiCategory::Poor);
        assert_eq!(prediction.confidence, MODEL_CONFIDENCE);
        assert_eq!(prediction.model_version, "rf_pm25_abc");
        assert!(!prediction.is_degraded());

        assert_eq!(bundle.score(&row(10.0, "Delhi")).unwrap(), 40.0);
        assert_eq!(bundle.score(&row(30.0, "Pune")).unwrap(), 20.0);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let mut request = row(30.0, "Delhi");
        request.set_number("pm10", 140.0);
        assert_eq!(bundle().score(&request).unwrap(), 100.0);
    }

    #[test]
    fn absent_column_is_feature_mismatch() {
        let mut request = row(30.0, "Delhi");
        request.remove("city");
        let err = bundle().predict(&request, "v").unwrap_err();
        assert!(matches!(err, ForecastError::FeatureMismatch { ref column, .. } if column == "city"));
    }

    #[test]
    fn score_does_not_depend_on_insertion_order() {
        let mut request = FeatureRow::new();
        request.set_text("city", "Delhi");
        request.set_number("humidity", 55.0);
        request.set_number("temp", 30.0);
        assert_eq!(bundle().score(&request).unwrap(), 100.0);
        assert_eq!(
            bundle().score(&request).unwrap(),
            bundle().score(&row(30.0, "Delhi")).unwrap()
        );
    }

    #[test]
    fn first_absent_bundle_column_is_reported() {
        let mut request = FeatureRow::new();
        request.set_number("pm10", 140.0);
        let err = bundle().score(&request).unwrap_err();
        assert!(matches!(err, ForecastError::FeatureMismatch { ref column, ref reason }
            if column == "temp" && reason.contains("absent from the request")));
    }

    #[test]
    fn inconsistent_bundle_fails_validation() {
        let mut bundle = bundle();
        bundle.feature_columns.reverse();
        assert!(matches!(
            bundle.validate(),
            Err(ForecastError::ModelNotTrained(_))
        ));
    }
}
