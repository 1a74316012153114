//! Marketplace session cookies: acquisition, on-disk cache, regeneration.
//!
//! The cached bundle is trusted until the marketplace rejects it. Nothing
//! here checks cookie expiry; a 401/403 from the search endpoint is the only
//! expiry signal, and the caller responds by calling [`SessionManager::regenerate_session`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, SET_COOKIE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{Config, USER_AGENT as BROWSER_USER_AGENT};
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Cookie set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// The cookie bundle sent with every marketplace search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieSet {
    cookies: Vec<Cookie>,
}

impl CookieSet {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        let mut set = Self::default();
        for c in cookies {
            set.upsert(c);
        }
        set
    }

    /// Parses raw `Set-Cookie` header values. Attributes other than `Domain`
    /// and `Path` are dropped; later values for the same name win.
    pub fn from_set_cookie_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::default();
        for raw in headers {
            if let Some(cookie) = parse_set_cookie(raw) {
                set.upsert(cookie);
            }
        }
        set
    }

    /// Parses a browser `Cookie` request header (`a=1; b=2`), as pasted by an operator.
    pub fn from_cookie_header(raw: &str) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some(Cookie {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                    domain: None,
                    path: None,
                })
            })
            .collect();
        Self::new(cookies)
    }

    /// Value for the `Cookie` request header.
    pub fn to_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn upsert(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }
}

fn parse_set_cookie(raw: &str) -> Option<Cookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        domain: None,
        path: None,
    };
    for attr in parts {
        let Some((key, val)) = attr.trim().split_once('=') else { continue };
        if key.eq_ignore_ascii_case("domain") {
            cookie.domain = Some(val.trim().to_string());
        } else if key.eq_ignore_ascii_case("path") {
            cookie.path = Some(val.trim().to_string());
        }
    }
    Some(cookie)
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

/// Source of session cookies for the scrape orchestrator.
pub trait SessionSource: Send + Sync {
    /// Returns the current bundle, creating one on first use.
    fn acquire(&self) -> impl Future<Output = Result<CookieSet>> + Send;

    /// Discards `stale` and returns a freshly bootstrapped bundle. The new
    /// bundle is persisted before this returns.
    fn regenerate(&self, stale: &CookieSet) -> impl Future<Output = Result<CookieSet>> + Send;
}

/// Sole owner of the cookie cache. Fetchers only ever read clones of the set.
pub struct SessionManager {
    client: reqwest::Client,
    landing_url: String,
    accept_language: String,
    cache_path: PathBuf,
    current: RwLock<Option<CookieSet>>,
    /// Serializes load/bootstrap/regenerate so concurrent callers never race a write.
    write_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self::with_client(
            client,
            format!("{}/", cfg.marketplace_url),
            cfg.accept_language(),
            PathBuf::from(&cfg.cookie_cache_path),
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        landing_url: String,
        accept_language: String,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            client,
            landing_url,
            accept_language,
            cache_path,
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// True if a bundle is loaded in memory.
    pub async fn has_session(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Cached bundle if present (memory first, then disk), otherwise an
    /// anonymous bootstrap against the landing page.
    pub async fn acquire_session(&self) -> Result<CookieSet> {
        if let Some(set) = self.current.read().await.clone() {
            return Ok(set);
        }

        let _guard = self.write_lock.lock().await;
        // Another caller may have filled it while we waited.
        if let Some(set) = self.current.read().await.clone() {
            return Ok(set);
        }

        let set = match load_cache(&self.cache_path).await {
            Some(set) => {
                info!("[SESSION] loaded {} cookies from {}", set.len(), self.cache_path.display());
                set
            }
            None => {
                let set = self.bootstrap_anonymous().await?;
                persist_cache(&self.cache_path, &set).await?;
                set
            }
        };
        *self.current.write().await = Some(set.clone());
        Ok(set)
    }

    /// Regenerates unless another caller already replaced `stale`, in which
    /// case the newer bundle is returned as is.
    pub async fn regenerate_session(&self, stale: &CookieSet) -> Result<CookieSet> {
        let _guard = self.write_lock.lock().await;
        if let Some(current) = self.current.read().await.as_ref() {
            if current != stale {
                debug!("[SESSION] already regenerated by another scrape");
                return Ok(current.clone());
            }
        }

        self.invalidate_locked().await?;
        let set = self.bootstrap_anonymous().await?;
        persist_cache(&self.cache_path, &set).await?;
        *self.current.write().await = Some(set.clone());
        info!("[SESSION] regenerated session ({} cookies)", set.len());
        Ok(set)
    }

    /// Installs an operator-supplied bundle, replacing whatever was cached.
    pub async fn import(&self, set: CookieSet) -> Result<()> {
        if set.is_empty() {
            return Err(AppError::Session("no cookies in the supplied header".to_string()));
        }
        let _guard = self.write_lock.lock().await;
        persist_cache(&self.cache_path, &set).await?;
        info!("[SESSION] imported {} cookies into {}", set.len(), self.cache_path.display());
        *self.current.write().await = Some(set);
        Ok(())
    }

    async fn invalidate_locked(&self) -> Result<()> {
        *self.current.write().await = None;
        match tokio::fs::remove_file(&self.cache_path).await {
            Ok(()) => {
                info!("[SESSION] discarded cookie cache {}", self.cache_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Anonymous GET of the landing page, keeping every `Set-Cookie` it returns.
    async fn bootstrap_anonymous(&self) -> Result<CookieSet> {
        info!("[SESSION] bootstrapping anonymous session from {}", self.landing_url);
        let resp = self
            .client
            .get(&self.landing_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .map_err(|e| AppError::Session(format!("landing page request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Session(format!("landing page returned HTTP {}", status.as_u16())));
        }

        let set = CookieSet::from_set_cookie_headers(
            resp.headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        if set.is_empty() {
            return Err(AppError::Session("landing page set no cookies".to_string()));
        }
        Ok(set)
    }
}

impl SessionSource for SessionManager {
    async fn acquire(&self) -> Result<CookieSet> {
        self.acquire_session().await
    }

    async fn regenerate(&self, stale: &CookieSet) -> Result<CookieSet> {
        self.regenerate_session(stale).await
    }
}

/// Reads the cache file. Missing, unreadable or empty caches count as absent.
async fn load_cache(path: &Path) -> Option<CookieSet> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("[SESSION] cannot read {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str::<CookieSet>(&raw) {
        Ok(set) if !set.is_empty() => Some(set),
        Ok(_) => None,
        Err(e) => {
            warn!("[SESSION] ignoring malformed cookie cache {}: {e}", path.display());
            None
        }
    }
}

/// Writes through a sibling temp file so readers never see a partial cache.
async fn persist_cache(path: &Path, set: &CookieSet) -> Result<()> {
    let body = serde_json::to_string_pretty(set)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
impl CookieSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }
}

#[cfg(test)]
impl SessionManager {
    /// Drops the in-memory bundle and deletes the cache file.
    pub async fn invalidate(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.invalidate_locked().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};
    use axum::routing::get;
    use axum::Router;

    fn temp_cache(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "brick-scanner-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cookies.json");
        let _ = std::fs::remove_file(&path);
        path
    }

    fn manager(cache: PathBuf) -> SessionManager {
        // Port 9 (discard) is never served, so any bootstrap attempt fails fast.
        SessionManager::with_client(
            reqwest::Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .unwrap(),
            "http://127.0.0.1:9/".to_string(),
            "fr-FR".to_string(),
            cache,
        )
    }

    #[test]
    fn parses_set_cookie_attributes() {
        let set = CookieSet::from_set_cookie_headers([
            "_vinted_fr_session=abc123; path=/; domain=.vinted.fr; secure; HttpOnly",
            "__cf_bm=xyz; Path=/; Expires=Thu, 01 Jan 2026 00:00:00 GMT",
            "garbage-without-equals",
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("_vinted_fr_session"), Some("abc123"));
        assert_eq!(set.cookies[0].domain.as_deref(), Some(".vinted.fr"));
        assert_eq!(set.cookies[1].path.as_deref(), Some("/"));
        assert_eq!(set.to_header(), "_vinted_fr_session=abc123; __cf_bm=xyz");
    }

    #[test]
    fn later_set_cookie_wins() {
        let set = CookieSet::from_set_cookie_headers(["a=1", "b=2", "a=3"]);
        assert_eq!(set.to_header(), "a=3; b=2");
    }

    #[test]
    fn parses_operator_cookie_header() {
        let set = CookieSet::from_cookie_header(" v_sid=abc ; access_token_web=eyJ.x=y;; =bad");
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("access_token_web"), Some("eyJ.x=y"));
    }

    #[tokio::test]
    async fn cached_file_is_returned_without_network() {
        let path = temp_cache("cached");
        let set = CookieSet::from_cookie_header("session=cached");
        persist_cache(&path, &set).await.unwrap();

        let mgr = manager(path.clone());
        assert_eq!(mgr.acquire_session().await.unwrap(), set);
        assert!(mgr.has_session().await);
    }

    #[tokio::test]
    async fn bootstrap_failure_is_session_error() {
        let mgr = manager(temp_cache("unreachable"));
        let err = mgr.acquire_session().await.unwrap_err();
        assert!(matches!(err, AppError::Session(_)), "got {err:?}");
        assert!(!mgr.has_session().await);
    }

    #[tokio::test]
    async fn malformed_cache_is_ignored() {
        let path = temp_cache("malformed");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_cache(&path).await.is_none());
    }

    #[tokio::test]
    async fn import_overwrites_cache_and_invalidate_removes_it() {
        let path = temp_cache("import");
        let mgr = manager(path.clone());
        mgr.import(CookieSet::from_cookie_header("a=1")).await.unwrap();
        mgr.import(CookieSet::from_cookie_header("b=2")).await.unwrap();

        let reloaded = load_cache(&path).await.unwrap();
        assert_eq!(reloaded.to_header(), "b=2");

        mgr.invalidate().await.unwrap();
        assert!(!path.exists());
        assert!(!mgr.has_session().await);
    }

    #[tokio::test]
    async fn regenerate_returns_newer_bundle_without_refetching() {
        let path = temp_cache("regen");
        let mgr = manager(path);
        mgr.import(CookieSet::from_cookie_header("fresh=1")).await.unwrap();

        let stale = CookieSet::from_cookie_header("old=1");
        let got = mgr.regenerate_session(&stale).await.unwrap();
        assert_eq!(got.to_header(), "fresh=1");
    }

    /// Serves a landing page that sets two cookies, like the marketplace does
    /// for an anonymous visitor. Returns its root URL.
    async fn landing_server() -> String {
        async fn landing() -> (HeaderMap, &'static str) {
            let mut headers = HeaderMap::new();
            headers.append(
                header::SET_COOKIE,
                HeaderValue::from_static("v_sid=fresh; Path=/; HttpOnly"),
            );
            headers.append(
                header::SET_COOKIE,
                HeaderValue::from_static("__cf_bm=x; Path=/; Domain=127.0.0.1"),
            );
            (headers, "<html></html>")
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", get(landing)))
                .await
                .unwrap();
        });
        format!("http://{addr}/")
    }

    fn manager_for(landing_url: String, cache: PathBuf) -> SessionManager {
        SessionManager::with_client(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            landing_url,
            "fr-FR".to_string(),
            cache,
        )
    }

    #[tokio::test]
    async fn first_acquire_bootstraps_and_persists() {
        let path = temp_cache("bootstrap");
        let mgr = manager_for(landing_server().await, path.clone());

        let set = mgr.acquire_session().await.unwrap();
        assert_eq!(set.to_header(), "v_sid=fresh; __cf_bm=x");
        assert_eq!(load_cache(&path).await, Some(set));
        assert!(mgr.has_session().await);
    }

    #[tokio::test]
    async fn regenerate_replaces_stale_cache_before_returning() {
        let path = temp_cache("regen-live");
        let stale = CookieSet::from_cookie_header("v_sid=stale");
        persist_cache(&path, &stale).await.unwrap();

        let mgr = manager_for(landing_server().await, path.clone());
        assert_eq!(mgr.acquire_session().await.unwrap(), stale);

        let fresh = mgr.regenerate_session(&stale).await.unwrap();
        assert_eq!(fresh.to_header(), "v_sid=fresh; __cf_bm=x");
        assert_eq!(fresh.get("v_sid"), Some("fresh"));
        assert_eq!(load_cache(&path).await, Some(fresh.clone()));
        assert_eq!(mgr.acquire_session().await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn empty_import_rejected() {
        let mgr = manager(temp_cache("empty"));
        assert!(mgr.import(CookieSet::default()).await.is_err());
    }
}
