// classify.rs

use crate::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub name: String,
    pub probability: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response contained no disease suggestions")]
    NoSuggestions,

    #[error("probability {0} is outside 0..=1")]
    InvalidProbability(f64),
}

#[allow(async_fn_in_trait)]
pub trait Classifier {
    async fn assess(&self, image: &EncodedImage) -> Result<DiagnosisResult, ClassifyError>;
}

#[derive(Serialize)]
struct HealthRequest<'a> {
    images: [&'a str; 1],
}

#[derive(Deserialize)]
struct HealthResponse {
    result: HealthResult,
}

#[derive(Deserialize)]
struct HealthResult {
    disease: DiseaseSection,
}

#[derive(Deserialize)]
struct DiseaseSection {
    suggestions: Vec<DiagnosisResult>,
}

/// Pull the top-ranked disease suggestion out of a health assessment response.
pub fn parse_diagnosis(body: &[u8]) -> Result<DiagnosisResult, ClassifyError> {
    let resp: HealthResponse = serde_json::from_slice(body)?;
    let top = resp
        .result
        .disease
        .suggestions
        .into_iter()
        .next()
        .ok_or(ClassifyError::NoSuggestions)?;

    if !(0.0..=1.0).contains(&top.probability) {
        return Err(ClassifyError::InvalidProbability(top.probability));
    }
    Ok(top)
}

/// Client for the plant.id health assessment endpoint.
pub struct PlantIdClient {
    http: reqwest::Client,
    url: String,
    api_key: ApiKey,
}

impl PlantIdClient {
    pub fn new(url: &str, api_key: ApiKey, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("plantmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("cannot build HTTP client")?;
        Ok(PlantIdClient {
            http,
            url: url.to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &MyConfig) -> anyhow::Result<Self> {
        Self::new(&config.api_url, config.api_key.clone(), config.api_timeout())
    }
}

impl Classifier for PlantIdClient {
    async fn assess(&self, image: &EncodedImage) -> Result<DiagnosisResult, ClassifyError> {
        info!("Requesting health assessment from {}", self.url);
        let resp = self
            .http
            .post(&self.url)
            .header("Api-Key", self.api_key.expose())
            .json(&HealthRequest {
                images: [image.as_str()],
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        parse_diagnosis(&body)
    }
}


// EOF
