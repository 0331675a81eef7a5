//! Google OAuth for installed applications.
//!
//! Credentials come from the standard `credentials.json` downloaded from the
//! Google Cloud console; the obtained token is persisted to `token.json` so
//! authorization is interactive only on the first run. Expired access tokens
//! are refreshed transparently via the token endpoint whenever
//! [`Authenticator::access_token`] is called, so a long OCR run survives
//! token expiry mid-flight.

use crate::error::DriveOcrError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Full Drive scope: the scratch folder and its objects must be created,
/// exported, and deleted.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

fn default_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_redirect_uris() -> Vec<String> {
    vec!["urn:ietf:wg:oauth:2.0:oob".to_string()]
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: InstalledCredentials,
}

/// The `installed` section of a Google Cloud `credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstalledCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_endpoint")]
    pub token_uri: String,
    #[serde(default = "default_redirect_uris")]
    pub redirect_uris: Vec<String>,
}

/// The persisted token file, field-compatible with the googleapis layout
/// (`expiry_date` is Unix epoch milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<u64>,
}

impl StoredToken {
    /// True when the access token is past (or within a minute of) expiry.
    pub fn is_expired(&self) -> bool {
        match self.expiry_date {
            Some(expiry_ms) => now_ms() + 60_000 >= expiry_ms,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Obtains and refreshes Drive access tokens for an installed application.
pub struct Authenticator {
    creds: InstalledCredentials,
    token_path: PathBuf,
    http: reqwest::Client,
    cached: Mutex<Option<StoredToken>>,
}

impl Authenticator {
    /// Load client credentials; the token file may not exist yet.
    pub fn load(credentials_path: &Path, token_path: &Path) -> Result<Self, DriveOcrError> {
        let raw = std::fs::read_to_string(credentials_path).map_err(|e| {
            DriveOcrError::AuthFailed {
                detail: format!("reading {}: {}", credentials_path.display(), e),
            }
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&raw).map_err(|e| DriveOcrError::AuthFailed {
                detail: format!("parsing {}: {}", credentials_path.display(), e),
            })?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DriveOcrError::AuthFailed {
                detail: format!("building HTTP client: {}", e),
            })?;
        Ok(Self {
            creds: file.installed,
            token_path: token_path.to_path_buf(),
            http,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, refreshing or authorizing as needed.
    pub async fn access_token(&self) -> Result<String, DriveOcrError> {
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            if let Ok(raw) = std::fs::read_to_string(&self.token_path) {
                match serde_json::from_str::<StoredToken>(&raw) {
                    Ok(token) => {
                        debug!("loaded stored token from {}", self.token_path.display());
                        *cached = Some(token);
                    }
                    Err(e) => debug!("ignoring unparsable token file: {}", e),
                }
            }
        }

        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let refreshed = match cached.as_ref().and_then(|t| t.refresh_token.clone()) {
            Some(refresh_token) => {
                debug!("access token expired; refreshing");
                let mut token = self.refresh(&refresh_token).await?;
                // Google omits the refresh token on refresh; keep the old one.
                if token.refresh_token.is_none() {
                    token.refresh_token = Some(refresh_token);
                }
                token
            }
            None => self.authorize_interactively().await?,
        };

        self.save(&refreshed)?;
        let access = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access)
    }

    /// The consent URL the user must visit on first run.
    pub fn authorization_url(&self) -> String {
        let redirect = self
            .creds
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| default_redirect_uris().remove(0));
        reqwest::Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", self.creds.client_id.as_str()),
                ("redirect_uri", redirect.as_str()),
                ("response_type", "code"),
                ("scope", DRIVE_SCOPE),
                ("access_type", "offline"),
            ],
        )
        .map(|u| u.to_string())
        .unwrap_or_else(|_| AUTH_ENDPOINT.to_string())
    }

    async fn authorize_interactively(&self) -> Result<StoredToken, DriveOcrError> {
        info!("no stored token; starting interactive authorization");
        eprintln!("Authorize this app by visiting:\n\n  {}\n", self.authorization_url());

        let code = tokio::task::spawn_blocking(|| {
            eprint!("Enter the code from that page: ");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| DriveOcrError::Internal(format!("prompt task panicked: {}", e)))?
        .map_err(|e| DriveOcrError::AuthFailed {
            detail: format!("reading authorization code: {}", e),
        })?;

        self.exchange_code(code.trim()).await
    }

    async fn exchange_code(&self, code: &str) -> Result<StoredToken, DriveOcrError> {
        let redirect = self
            .creds
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| default_redirect_uris().remove(0));
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &redirect),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, DriveOcrError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<StoredToken, DriveOcrError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", &self.creds.client_id),
            ("client_secret", &self.creds.client_secret),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(&self.creds.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| DriveOcrError::AuthFailed {
                detail: format!("token endpoint unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveOcrError::AuthFailed {
                detail: format!("token endpoint returned HTTP {}: {}", status, body),
            });
        }

        let token: TokenResponse =
            response.json().await.map_err(|e| DriveOcrError::AuthFailed {
                detail: format!("parsing token response: {}", e),
            })?;

        Ok(StoredToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expiry_date: token.expires_in.map(|secs| now_ms() + secs * 1000),
        })
    }

    fn save(&self, token: &StoredToken) -> Result<(), DriveOcrError> {
        let json =
            serde_json::to_string_pretty(token).map_err(|e| DriveOcrError::AuthFailed {
                detail: format!("serialising token: {}", e),
            })?;
        std::fs::write(&self.token_path, json).map_err(|e| DriveOcrError::AuthFailed {
            detail: format!("writing {}: {}", self.token_path.display(), e),
        })?;
        info!("token stored to {}", self.token_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_credentials(dir: &Path, token_uri: &str) -> PathBuf {
        let path = dir.join("credentials.json");
        let json = serde_json::json!({
            "installed": {
                "client_id": "cid-123",
                "client_secret": "secret-456",
                "token_uri": token_uri,
                "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob"]
            }
        });
        std::fs::write(&path, json.to_string()).unwrap();
        path
    }

    #[test]
    fn token_expiry_window() {
        let fresh = StoredToken {
            access_token: "a".into(),
            refresh_token: None,
            expiry_date: Some(now_ms() + 3_600_000),
        };
        assert!(!fresh.is_expired());

        let stale = StoredToken {
            access_token: "a".into(),
            refresh_token: None,
            expiry_date: Some(now_ms().saturating_sub(1)),
        };
        assert!(stale.is_expired());

        let undated = StoredToken {
            access_token: "a".into(),
            refresh_token: None,
            expiry_date: None,
        };
        assert!(!undated.is_expired());
    }

    #[test]
    fn authorization_url_carries_client_and_scope() {
        let dir = tempfile::tempdir().unwrap();
        let creds = write_credentials(dir.path(), "https://example.invalid/token");
        let auth = Authenticator::load(&creds, &dir.path().join("token.json")).unwrap();
        let url = auth.authorization_url();
        assert!(url.contains("client_id=cid-123"), "got: {url}");
        assert!(url.contains("access_type=offline"), "got: {url}");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let creds = write_credentials(dir.path(), &format!("{}/token", server.uri()));
        let token_path = dir.path().join("token.json");
        std::fs::write(
            &token_path,
            serde_json::json!({
                "access_token": "stale-token",
                "refresh_token": "refresh-789",
                "expiry_date": 1u64
            })
            .to_string(),
        )
        .unwrap();

        let auth = Authenticator::load(&creds, &token_path).unwrap();
        assert_eq!(auth.access_token().await.unwrap(), "fresh-token");

        // The refresh token must survive the rewrite.
        let saved: StoredToken =
            serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-789"));
        assert_eq!(saved.access_token, "fresh-token");

        // Second call uses the cache; the mock's expect(1) enforces it.
        assert_eq!(auth.access_token().await.unwrap(), "fresh-token");
    }
}
