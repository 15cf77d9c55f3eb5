// QuickBooks OAuth credentials and token refresh

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tallysync_recon::SinkError;

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// On-disk credentials file. Same shape the OAuth helper scripts write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QboCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub realm_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<String>,
}

impl QboCredentials {
    /// True when the access token is known to be expired (or about to be).
    /// Unknown or unparseable expiry counts as valid; a 401 still triggers
    /// a refresh later.
    pub fn access_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token_expires_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc) <= now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS))
            .unwrap_or(false)
    }
}

/// Body of a successful token exchange.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    x_refresh_token_expires_in: Option<i64>,
}

/// Body of a rejected token exchange.
#[derive(Debug, Default, Deserialize)]
struct TokenFault {
    error: Option<String>,
    error_description: Option<String>,
}

/// Credentials plus the file they came from. Refreshed tokens are written
/// back so the next run starts with them.
#[derive(Debug, Clone)]
pub struct Auth {
    pub creds: QboCredentials,
    pub path: Option<PathBuf>,
}

impl Auth {
    pub fn load(path: &Path) -> Result<Self, SinkError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SinkError::NotAuthenticated(format!(
                "cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        warn_if_shared(path);

        let creds = serde_json::from_str(content.trim_start_matches('\u{feff}')).map_err(|e| {
            SinkError::NotAuthenticated(format!(
                "invalid credentials JSON in {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            creds,
            path: Some(path.to_path_buf()),
        })
    }

    /// Trade the refresh token for a new access token and write the result
    /// back. A failed write is logged; the new token still serves this run.
    pub fn refresh(
        &mut self,
        http: &reqwest::blocking::Client,
        token_url: &str,
    ) -> Result<(), SinkError> {
        log::info!("refreshing QBO access token");
        let grant = self.request_grant(http, token_url)?;
        self.accept(grant, Utc::now());

        if let Err(e) = self.persist() {
            log::warn!("{e}");
        }
        Ok(())
    }

    fn request_grant(
        &self,
        http: &reqwest::blocking::Client,
        token_url: &str,
    ) -> Result<TokenGrant, SinkError> {
        use base64::Engine;

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.creds.client_id, self.creds.client_secret));

        let resp = http
            .post(token_url)
            .header("Authorization", format!("Basic {basic}"))
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.creds.refresh_token.as_str()),
            ])
            .send()
            .map_err(|e| SinkError::Auth(format!("QBO token refresh request failed: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let fault: TokenFault = resp.json().unwrap_or_default();
            let msg = fault
                .error_description
                .or(fault.error)
                .unwrap_or_else(|| "unknown error".into());
            return Err(SinkError::Auth(format!(
                "QBO token refresh failed ({status}): {msg}; reconnect QuickBooks to regenerate credentials"
            )));
        }

        resp.json()
            .map_err(|e| SinkError::Auth(format!("QBO token refresh response invalid: {e}")))
    }

    /// Fold a grant into the held credentials. The refresh token and its
    /// expiry are kept when the grant omits them.
    fn accept(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        let creds = &mut self.creds;
        creds.access_token = grant.access_token;
        if let Some(refresh) = grant.refresh_token {
            creds.refresh_token = refresh;
        }
        creds.access_token_expires_at = grant
            .expires_in
            .map(|secs| (now + chrono::Duration::seconds(secs)).to_rfc3339());

        if let Some(secs) = grant.x_refresh_token_expires_in {
            let expires = now + chrono::Duration::seconds(secs);
            if (expires - now).num_days() <= 30 {
                log::warn!(
                    "QBO refresh token expires {}, re-authorize soon",
                    expires.format("%Y-%m-%d")
                );
            }
            creds.refresh_token_expires_at = Some(expires.to_rfc3339());
        }
    }

    fn persist(&self) -> Result<(), SinkError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.creds)
            .map_err(|e| SinkError::Protocol(format!("failed to serialize credentials: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            SinkError::Upstream(format!(
                "failed to write credentials to {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(unix)]
fn warn_if_shared(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            log::warn!(
                "credentials file {} is accessible by others (mode {:o}), consider chmod 600",
                path.display(),
                mode & 0o777,
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_shared(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;

    fn creds() -> QboCredentials {
        QboCredentials {
            client_id: "cid".into(),
            client_secret: "csec".into(),
            access_token: "old_token".into(),
            refresh_token: "old_refresh".into(),
            realm_id: "realm_123".into(),
            access_token_expires_at: None,
            refresh_token_expires_at: None,
        }
    }

    fn write(dir: &Path, creds: &QboCredentials) -> PathBuf {
        let path = dir.join("qbo.json");
        std::fs::write(&path, serde_json::to_string(creds).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_credential_loading_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qbo.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "client_id": "cid",
                "client_secret": "csec",
                "access_token": "at",
                "refresh_token": "rt",
                "realm_id": "rid"
            })
            .to_string(),
        )
        .unwrap();
        let auth = Auth::load(&path).unwrap();
        assert_eq!(auth.creds.client_id, "cid");
        assert_eq!(auth.creds.realm_id, "rid");
        assert!(auth.creds.access_token_expires_at.is_none());
        assert_eq!(auth.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_credential_loading_missing_file() {
        let err = Auth::load(Path::new("/nonexistent/qbo-creds.json")).unwrap_err();
        assert!(matches!(err, SinkError::NotAuthenticated(ref m) if m.contains("cannot read credentials file")));
    }

    #[test]
    fn test_credential_loading_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let err = Auth::load(&path).unwrap_err();
        assert!(matches!(err, SinkError::NotAuthenticated(ref m) if m.contains("invalid credentials JSON")));
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut c = creds();
        assert!(!c.access_token_expired(now));

        c.access_token_expires_at = Some("2026-03-01T12:00:30+00:00".into());
        assert!(c.access_token_expired(now), "inside the margin");

        c.access_token_expires_at = Some("2026-03-01T13:00:00+00:00".into());
        assert!(!c.access_token_expired(now));

        c.access_token_expires_at = Some("soon".into());
        assert!(!c.access_token_expired(now));
    }

    #[test]
    fn test_grant_without_refresh_token_keeps_the_old_one() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut c = creds();
        c.refresh_token_expires_at = Some("2026-06-01T00:00:00+00:00".into());
        let mut auth = Auth { creds: c, path: None };

        auth.accept(
            TokenGrant {
                access_token: "fresh".into(),
                refresh_token: None,
                expires_in: Some(3600),
                x_refresh_token_expires_in: None,
            },
            now,
        );

        assert_eq!(auth.creds.access_token, "fresh");
        assert_eq!(auth.creds.refresh_token, "old_refresh");
        assert_eq!(
            auth.creds.refresh_token_expires_at.as_deref(),
            Some("2026-06-01T00:00:00+00:00")
        );
        assert!(!auth.creds.access_token_expired(now));
    }

    #[test]
    fn test_refresh_persists_new_tokens() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oauth2/v1/tokens/bearer")
                .header("Authorization", "Basic Y2lkOmNzZWM=")
                .body("grant_type=refresh_token&refresh_token=old_refresh");
            then.status(200).json_body(serde_json::json!({
                "access_token": "new_token",
                "refresh_token": "new_refresh",
                "expires_in": 3600
            }));
        });

        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), &creds());

        let mut auth = Auth::load(&path).unwrap();
        let http = reqwest::blocking::Client::new();
        auth.refresh(&http, &server.url("/oauth2/v1/tokens/bearer"))
            .unwrap();
        mock.assert();

        assert_eq!(auth.creds.access_token, "new_token");
        assert!(auth.creds.access_token_expires_at.is_some());
        let saved = Auth::load(&path).unwrap().creds;
        assert_eq!(saved.access_token, "new_token");
        assert_eq!(saved.refresh_token, "new_refresh");
        assert_eq!(saved.realm_id, "realm_123");
    }

    #[test]
    fn test_refresh_survives_unwritable_credentials_file() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/v1/tokens/bearer");
            then.status(200).json_body(serde_json::json!({ "access_token": "new_token" }));
        });

        let dir = tempfile::tempdir().unwrap();
        let mut auth = Auth {
            creds: creds(),
            path: Some(dir.path().join("gone").join("qbo.json")),
        };
        let http = reqwest::blocking::Client::new();
        auth.refresh(&http, &server.url("/oauth2/v1/tokens/bearer"))
            .unwrap();
        assert_eq!(auth.creds.access_token, "new_token");
        assert_eq!(auth.creds.refresh_token, "old_refresh");
    }

    #[test]
    fn test_refresh_failure_mentions_reconnect() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth2/v1/tokens/bearer");
            then.status(400).json_body(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token invalid"
            }));
        });

        let mut auth = Auth { creds: creds(), path: None };
        let http = reqwest::blocking::Client::new();
        let err = auth
            .refresh(&http, &server.url("/oauth2/v1/tokens/bearer"))
            .unwrap_err();
        match err {
            SinkError::Auth(msg) => {
                assert!(msg.contains("Token invalid"), "{msg}");
                assert!(msg.contains("reconnect QuickBooks"), "{msg}");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
        assert_eq!(auth.creds.access_token, "old_token");
    }
}
