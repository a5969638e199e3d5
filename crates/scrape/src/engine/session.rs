// ABOUTME: Session manager owning one reusable transport session with a browser profile.
// ABOUTME: Rotates the session after a maximum age or on explicit invalidation.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tokio::time::Instant;

use crate::error::ScrapeError;

/// A named browser preset: the User-Agent and client-hint brand a session presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub name: &'static str,
    pub user_agent: &'static str,
    /// `sec-ch-ua` value for Chromium-based profiles.
    pub client_hint: Option<&'static str>,
}

macro_rules! chrome {
    ($name:literal, $major:literal) => {
        Profile {
            name: $name,
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/",
                $major,
                ".0.0.0 Safari/537.36"
            ),
            client_hint: Some(concat!(
                "\"Chromium\";v=\"",
                $major,
                "\", \"Google Chrome\";v=\"",
                $major,
                "\", \"Not-A.Brand\";v=\"99\""
            )),
        }
    };
}

macro_rules! edge {
    ($name:literal, $major:literal) => {
        Profile {
            name: $name,
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/",
                $major,
                ".0.0.0 Safari/537.36 Edg/",
                $major,
                ".0.0.0"
            ),
            client_hint: Some(concat!(
                "\" Not A;Brand\";v=\"99\", \"Chromium\";v=\"",
                $major,
                "\", \"Microsoft Edge\";v=\"",
                $major,
                "\""
            )),
        }
    };
}

macro_rules! safari {
    ($name:literal, $version:literal) => {
        Profile {
            name: $name,
            user_agent: concat!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/",
                $version,
                " Safari/605.1.15"
            ),
            client_hint: None,
        }
    };
}

/// The fixed pool sessions draw their profile from.
pub const IMPERSONATE_PROFILES: &[Profile] = &[
    chrome!("chrome", "124"),
    chrome!("chrome110", "110"),
    chrome!("chrome116", "116"),
    chrome!("chrome119", "119"),
    chrome!("chrome120", "120"),
    chrome!("chrome123", "123"),
    chrome!("chrome124", "124"),
    edge!("edge99", "99"),
    edge!("edge101", "101"),
    safari!("safari15_3", "15.3"),
    safari!("safari15_5", "15.5"),
    safari!("safari17_0", "17.0"),
    safari!("safari17_2_1", "17.2.1"),
];

/// Look up a profile by name.
pub fn profile(name: &str) -> Option<&'static Profile> {
    IMPERSONATE_PROFILES.iter().find(|p| p.name == name)
}

/// One reusable transport handle.
///
/// Cloning is cheap; clones share the underlying connection pool and cookie jar.
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    profile: &'static Profile,
    client: reqwest::Client,
    created_at: Instant,
}

impl Session {
    /// Sequence number, unique per manager.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn profile(&self) -> &'static Profile {
        self.profile
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

fn build_client(profile: &Profile, proxy: Option<&str>) -> Result<reqwest::Client, ScrapeError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    if let Some(hint) = profile.client_hint {
        headers.insert("sec-ch-ua", HeaderValue::from_static(hint));
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"Windows\""));
    }

    let mut builder = reqwest::Client::builder()
        .user_agent(profile.user_agent)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            ScrapeError::config(proxy_url, "Session", Some(anyhow::anyhow!("invalid proxy: {}", e)))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ScrapeError::config("", "Session", Some(e.into())))
}

#[derive(Debug, Default)]
struct SessionState {
    current: Option<Session>,
    created: u64,
    invalidations: u64,
}

/// Owns the current session and rotates it.
#[derive(Debug)]
pub struct SessionManager {
    max_age: Duration,
    proxy: Option<String>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(max_age: Duration, proxy: Option<String>) -> Self {
        Self {
            max_age,
            proxy,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self, state: &SessionState, now: Instant) -> Option<Session> {
        state
            .current
            .as_ref()
            .filter(|session| now.duration_since(session.created_at) < self.max_age)
            .cloned()
    }

    /// Return the current session, building a new one with a random profile if
    /// there is none or it has reached `max_age`.
    ///
    /// The transport is built without holding the lock. If another caller
    /// installed a fresh session meanwhile, that one is returned instead.
    pub fn get(&self) -> Result<Session, ScrapeError> {
        if let Some(session) = self.current(&self.lock(), Instant::now()) {
            return Ok(session);
        }

        let profile = IMPERSONATE_PROFILES
            .choose(&mut rand::thread_rng())
            .unwrap_or(&IMPERSONATE_PROFILES[0]);
        let client = build_client(profile, self.proxy.as_deref())?;

        let mut state = self.lock();
        let now = Instant::now();
        if let Some(session) = self.current(&state, now) {
            return Ok(session);
        }

        state.created += 1;
        let session = Session {
            id: state.created,
            profile,
            client,
            created_at: now,
        };
        tracing::info!(session = session.id, profile = profile.name, "new session");
        state.current = Some(session.clone());
        Ok(session)
    }

    /// Drop the current session so the next `get` builds a fresh one.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.current = None;
        state.invalidations += 1;
    }

    /// Number of sessions built so far.
    pub fn sessions_created(&self) -> u64 {
        self.lock().created
    }

    /// Number of `invalidate` calls so far.
    pub fn invalidations(&self) -> u64 {
        self.lock().invalidations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS_CHROME: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";
    const MAC_SAFARI: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko)";

    #[test]
    fn pool_has_thirteen_distinct_profiles() {
        assert_eq!(IMPERSONATE_PROFILES.len(), 13);
        let mut names: Vec<_> = IMPERSONATE_PROFILES.iter().map(|p| p.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 13);
    }

    #[test]
    fn profile_user_agents_match_their_family() {
        let chrome = profile("chrome120").unwrap();
        assert!(chrome.user_agent.starts_with(WINDOWS_CHROME));
        assert!(chrome.user_agent.contains("Chrome/120.0.0.0"));

        let edge = profile("edge101").unwrap();
        assert!(edge.user_agent.contains("Edg/101.0.0.0"));

        let safari = profile("safari17_2_1").unwrap();
        assert!(safari.user_agent.starts_with(MAC_SAFARI));
        assert!(safari.user_agent.contains("Version/17.2.1"));
        assert!(safari.client_hint.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn get_reuses_session_until_max_age() {
        let manager = SessionManager::new(Duration::from_secs(300), None);
        let first = manager.get().unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(manager.get().unwrap().id(), first.id());

        tokio::time::advance(Duration::from_secs(1)).await;
        let rotated = manager.get().unwrap();
        assert_ne!(rotated.id(), first.id());
        assert_eq!(manager.sessions_created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_rebuild_regardless_of_age() {
        let manager = SessionManager::new(Duration::from_secs(300), None);
        let first = manager.get().unwrap();

        manager.invalidate();
        let second = manager.get().unwrap();

        assert_ne!(second.id(), first.id());
        assert_eq!(manager.invalidations(), 1);
        assert!(IMPERSONATE_PROFILES.contains(second.profile()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_gets_share_one_session() {
        let manager = std::sync::Arc::new(SessionManager::new(Duration::from_secs(300), None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = std::sync::Arc::clone(&manager);
                tokio::spawn(async move { manager.get().unwrap().id() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(manager.sessions_created(), 1);
    }

    #[test]
    fn invalid_proxy_is_a_config_error() {
        let manager = SessionManager::new(Duration::from_secs(300), Some("::not a proxy::".into()));
        let err = manager.get().expect_err("proxy should be rejected");
        assert_eq!(err.code, crate::error::ErrorCode::Config);
    }

    #[test]
    fn socks_proxy_is_accepted() {
        let manager = SessionManager::new(
            Duration::from_secs(300),
            Some("socks5h://127.0.0.1:9050".into()),
        );
        assert!(manager.get().is_ok());
    }
}
