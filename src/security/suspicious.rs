//! Suspicious request heuristic.
//!
//! A request is suspicious when its User-Agent matches the bot/script-client
//! pattern list, or when its Referer host is on the denylist. Suspicious
//! requests are rejected before the rate limiter and token check run.

use axum::http::{
    header::{REFERER, USER_AGENT},
    HeaderMap,
};
use regex::Regex;

use crate::config::SecurityConfig;

/// Why a request was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspicion {
    UserAgent(String),
    Referer(String),
}

impl Suspicion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suspicion::UserAgent(_) => "user_agent",
            Suspicion::Referer(_) => "referer",
        }
    }
}

impl std::fmt::Display for Suspicion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Suspicion::UserAgent(ua) => write!(f, "suspicious user agent '{ua}'"),
            Suspicion::Referer(host) => write!(f, "blocked referer host '{host}'"),
        }
    }
}

/// Compiled detector.
#[derive(Debug, Clone)]
pub struct SuspicionDetector {
    user_agents: Option<Regex>,
    blocked_hosts: Vec<String>,
}

impl SuspicionDetector {
    /// Compile the configured patterns into one case-insensitive alternation.
    pub fn from_config(config: &SecurityConfig) -> Result<Self, regex::Error> {
        let user_agents = if config.suspicious_user_agents.is_empty() {
            None
        } else {
            let alternation = config
                .suspicious_user_agents
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!("(?i){alternation}"))?)
        };

        Ok(Self {
            user_agents,
            blocked_hosts: config
                .blocked_referer_hosts
                .iter()
                .map(|h| h.trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        })
    }

    /// Inspect request headers. A missing User-Agent is not suspicious.
    pub fn inspect(&self, headers: &HeaderMap) -> Option<Suspicion> {
        if let Some(ua) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
            if self.user_agents.as_ref().is_some_and(|re| re.is_match(ua)) {
                return Some(Suspicion::UserAgent(ua.to_string()));
            }
        }

        if self.blocked_hosts.is_empty() {
            return None;
        }
        let referer = headers.get(REFERER).and_then(|v| v.to_str().ok())?;
        let host = url::Url::parse(referer).ok()?.host_str()?.to_ascii_lowercase();
        self.blocked_hosts
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
            .then_some(Suspicion::Referer(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(blocked: &[&str]) -> SuspicionDetector {
        let config = SecurityConfig {
            blocked_referer_hosts: blocked.iter().map(|s| s.to_string()).collect(),
            ..SecurityConfig::default()
        };
        SuspicionDetector::from_config(&config).unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_script_clients_flagged() {
        let d = detector(&[]);
        for ua in [
            "curl/7.64.1",
            "Wget/1.21",
            "python-requests/2.31",
            "Mozilla/5.0 (compatible; Googlebot/2.1)",
            "SomeCrawler",
            "Scrapy/2.11",
        ] {
            assert!(
                matches!(d.inspect(&headers(&[("user-agent", ua)])), Some(Suspicion::UserAgent(_))),
                "{ua} not flagged"
            );
        }
    }

    #[test]
    fn test_browsers_pass() {
        let d = detector(&[]);
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15";
        assert_eq!(d.inspect(&headers(&[("user-agent", ua)])), None);
        assert_eq!(d.inspect(&HeaderMap::new()), None);
    }

    #[test]
    fn test_referer_denylist() {
        let d = detector(&["spam.example", "Evil.Test."]);
        assert_eq!(
            d.inspect(&headers(&[("referer", "https://spam.example/landing")])),
            Some(Suspicion::Referer("spam.example".into()))
        );
        assert_eq!(
            d.inspect(&headers(&[("referer", "https://cdn.EVIL.test/x")])),
            Some(Suspicion::Referer("cdn.evil.test".into()))
        );
        assert_eq!(d.inspect(&headers(&[("referer", "https://notspam.example/")])), None);
        assert_eq!(d.inspect(&headers(&[("referer", "not a url")])), None);
    }

    #[test]
    fn test_empty_pattern_list() {
        let config = SecurityConfig {
            suspicious_user_agents: Vec::new(),
            ..SecurityConfig::default()
        };
        let d = SuspicionDetector::from_config(&config).unwrap();
        assert_eq!(d.inspect(&headers(&[("user-agent", "curl/8.0")])), None);
    }
}
