//! Vision classification collaborator.
//!
//! The real model lives outside this crate. The service receives a handle to
//! it at startup and calls it only when a request carries no predictions of
//! its own.

use anyhow::Result;

use crate::prediction::Prediction;

/// What the classifier gets to look at for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanInput {
    pub filename: Option<String>,
    pub image: Option<Vec<u8>>,
}

#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, input: &ScanInput) -> Result<Vec<Prediction>>;
    fn name(&self) -> &'static str;
    fn is_ready(&self) -> bool {
        true
    }
}

/// Stand-in classifier that reads the uploaded file name instead of the
/// pixels. Useful for demos and tests; never loaded as a real model.
#[derive(Debug, Clone, Default)]
pub struct FilenameClassifier;

/// `(keyword, label, confidence)`; first hit wins.
const FILENAME_HINTS: &[(&[&str], &str, f64)] = &[
    (&["bike", "bicicleta", "bicycle"], "bicycle", 0.90),
    (&["bus", "onibus", "ônibus"], "bus", 0.85),
    (&["car", "carro", "uber", "taxi"], "car", 0.80),
    (&["copo", "caneca", "cup", "mug"], "cup", 0.75),
    (&["trem", "train"], "train", 0.88),
    (&["metro", "subway"], "subway", 0.87),
    (&["navio", "ship", "boat", "cruise"], "ship", 0.70),
    (&["helicoptero", "helicopter", "heli"], "helicopter", 0.65),
    (&["aviao", "airplane", "plane", "flight"], "airplane", 0.60),
    (&["moto", "motocicleta", "motorcycle"], "motorcycle", 0.78),
];

const UNKNOWN_CONFIDENCE: f64 = 0.5;

impl FilenameClassifier {
    pub fn predict_name(&self, filename: &str) -> Prediction {
        let name = filename.to_lowercase();
        FILENAME_HINTS
            .iter()
            .find(|(keys, _, _)| keys.iter().any(|k| name.contains(k)))
            .map(|(_, label, conf)| Prediction::new(*label, *conf))
            .unwrap_or_else(|| Prediction::new(name, UNKNOWN_CONFIDENCE))
    }
}

#[async_trait::async_trait]
impl Classifier for FilenameClassifier {
    async fn classify(&self, input: &ScanInput) -> Result<Vec<Prediction>> {
        Ok(input
            .filename
            .as_deref()
            .map(|f| vec![self.predict_name(f)])
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "filename-heuristic"
    }
}

/// Returns the same predictions for every input.
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    pub predictions: Vec<Prediction>,
}

#[async_trait::async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, _input: &ScanInput) -> Result<Vec<Prediction>> {
        Ok(self.predictions.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::NumericField;

    #[test]
    fn filename_hints_follow_table_order() {
        let c = FilenameClassifier;
        let p = c.predict_name("IMG_bike_to_work.JPG");
        assert_eq!(p.label, "bicycle");
        assert_eq!(p.confidence, NumericField::Scalar(0.90));

        // "bus" is checked before "car"
        assert_eq!(c.predict_name("bus_and_car.png").label, "bus");
        assert_eq!(c.predict_name("caneca.png").label, "cup");
    }

    #[test]
    fn unknown_names_pass_through_with_neutral_confidence() {
        let p = FilenameClassifier.predict_name("Sunset.png");
        assert_eq!(p.label, "sunset.png");
        assert_eq!(p.confidence, NumericField::Scalar(0.5));
    }

    #[tokio::test]
    async fn missing_filename_yields_no_predictions() {
        let out = FilenameClassifier.classify(&ScanInput::default()).await.unwrap();
        assert!(out.is_empty());
    }
}
