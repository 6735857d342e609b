use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeOut {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl OptimizeOut {
    pub fn result_url(&self) -> Option<String> {
        self.output_url
            .clone()
            .or_else(|| self.url.clone())
            .or_else(|| {
                let data = self.data.as_ref()?;
                ["output_url", "url"]
                    .iter()
                    .find_map(|k| data.get(*k).and_then(Value::as_str))
                    .map(str::to_string)
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionIn {
    pub version: String,
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub image: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    pub fn status_url(&self) -> Option<&str> {
        self.urls.as_ref()?.get.as_deref().filter(|s| !s.is_empty())
    }

    pub fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => items
                .iter()
                .find_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }

    pub fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "No error details provided.".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_url_prefers_top_level() {
        let out: OptimizeOut = serde_json::from_value(json!({
            "status": "success",
            "url": "https://cdn/a.webp",
            "data": {"output_url": "https://cdn/b.webp"}
        }))
        .unwrap();
        assert_eq!(out.result_url().as_deref(), Some("https://cdn/a.webp"));
    }

    #[test]
    fn result_url_falls_back_to_data() {
        let out: OptimizeOut = serde_json::from_value(json!({
            "status": "success",
            "data": {"url": "https://cdn/b.webp"}
        }))
        .unwrap();
        assert_eq!(out.result_url().as_deref(), Some("https://cdn/b.webp"));
    }

    #[test]
    fn prediction_output_list_takes_first() {
        let p: Prediction = serde_json::from_value(json!({
            "status": "succeeded",
            "output": ["https://r/1.png", "https://r/2.png"]
        }))
        .unwrap();
        assert_eq!(p.output_url().as_deref(), Some("https://r/1.png"));
    }
}
