use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime accepted by Google's token endpoint.
const ASSERTION_TTL_SECS: i64 = 3600;
/// Refresh the access token this long before it actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("invalid service account credentials: {0}")]
    Credentials(String),

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("sheets request failed: {0}")]
    Transport(String),

    #[error("sheets returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected sheets payload: {0}")]
    Payload(String),
}

impl SheetsError {
    /// Transport problems, throttling and server errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SheetsError::Transport(_) => true,
            SheetsError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SheetsError {
    fn from(e: reqwest::Error) -> Self {
        SheetsError::Transport(e.to_string())
    }
}

/// The parts of a service-account key file we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, SheetsError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SheetsError::Credentials(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text).map_err(|e| SheetsError::Credentials(format!("{}: {}", path.display(), e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// The values operations the watchlist store needs.
#[async_trait]
pub trait SheetValues: Send + Sync {
    /// Every row of `range` as trimmed strings. Missing cells are absent, not empty.
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    async fn clear(&self, range: &str) -> Result<(), SheetsError>;

    /// Overwrite starting at `range` with raw (unparsed) strings.
    async fn update(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), SheetsError>;
}

/// Minimal Google Sheets values client authenticated as a service account.
pub struct GoogleSheetsClient {
    client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    spreadsheet_id: String,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsClient {
    pub fn new(client: reqwest::Client, key: ServiceAccountKey, spreadsheet_id: String) -> Result<Self, SheetsError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SheetsError::Credentials(e.to_string()))?;

        Ok(Self {
            client,
            key,
            encoding_key,
            spreadsheet_id,
            token: Mutex::new(None),
        })
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn signed_assertion(&self) -> Result<String, SheetsError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| SheetsError::Credentials(e.to_string()))
    }

    async fn access_token(&self) -> Result<String, SheetsError> {
        let cached = self.token.lock().clone();
        if let Some(cached) = cached {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value);
            }
        }

        let assertion = self.signed_assertion()?;
        let resp = self
            .client
            .post(self.token_uri())
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| SheetsError::Auth(e.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Obtained Google access token for {}", self.key.client_email);

        *self.token.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SheetsError> {
        let target = format!("{}{}", range, suffix);
        let mut url = Url::parse(SHEETS_URL).map_err(|e| SheetsError::Payload(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Payload("sheets base URL cannot take a path".to_string()))?
            .extend([self.spreadsheet_id.as_str(), "values", target.as_str()]);
        Ok(url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(SheetsError::Status { status, body })
    }

}

#[async_trait]
impl SheetValues for GoogleSheetsClient {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(self.values_url(range, "")?)
            .bearer_auth(token)
            .send()
            .await?;

        let body: ValueRange = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| SheetsError::Payload(e.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn clear(&self, range: &str) -> Result<(), SheetsError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(self.values_url(range, ":clear")?)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn update(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), SheetsError> {
        let token = self.access_token().await?;
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let row_count = rows.len();
        let resp = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": rows,
            }))
            .send()
            .await?;
        Self::check(resp).await?;

        info!("Wrote {} rows to sheet range {}", row_count, range);
        Ok(())
    }
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
