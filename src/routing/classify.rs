//! Route classification.
//!
//! # Responsibilities
//! - Map a request path to a coarse route class
//! - Decide how much admission a path receives (none, rate limit only, full)
//!
//! # Design Decisions
//! - Pure function of the path: same input, same answer
//! - Public prefixes match on segment boundaries (`/blog` covers `/blog/x`,
//!   not `/blogger`)
//! - Paths with `.`/`..` segments or encoded dots never bypass admission
//! - API paths are never treated as static files

use crate::config::RoutesConfig;

/// Coarse category used to select rate-limit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Static assets, marketing pages, health/docs, auth entry pages.
    Public,
    /// Authenticated page routes (dashboard and friends).
    Page,
    /// `/api/auth/*`.
    Auth,
    /// `/api/ai/*`.
    Ai,
    /// Any other `/api/*`.
    Api,
    /// `/api/upload*`.
    Upload,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Public => "public",
            RouteClass::Page => "page",
            RouteClass::Auth => "auth",
            RouteClass::Ai => "ai",
            RouteClass::Api => "api",
            RouteClass::Upload => "upload",
        }
    }

    /// Whether requests of this class are `/api/*` calls.
    pub fn is_api(&self) -> bool {
        matches!(
            self,
            RouteClass::Auth | RouteClass::Ai | RouteClass::Api | RouteClass::Upload
        )
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the admission pipeline a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    /// Forward with no checks.
    Bypass,
    /// Rate limit, then forward (auth entry API).
    RateLimitOnly,
    /// Security check, rate limit (API only), token check.
    Full,
}

/// Result of classifying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: RouteClass,
    pub mode: AdmissionMode,
}

impl Classification {
    fn new(class: RouteClass, mode: AdmissionMode) -> Self {
        Self { class, mode }
    }

    pub fn is_bypass(&self) -> bool {
        self.mode == AdmissionMode::Bypass
    }
}

/// Compiled exclusion lists.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    public_paths: Vec<String>,
    public_prefixes: Vec<String>,
    auth_pages: Vec<String>,
}

impl RouteClassifier {
    pub fn from_config(config: &RoutesConfig) -> Self {
        Self {
            public_paths: config.public_paths.iter().map(|p| trim_trailing(p).to_string()).collect(),
            public_prefixes: config.public_prefixes.clone(),
            auth_pages: config.auth_pages.iter().map(|p| trim_trailing(p).to_string()).collect(),
        }
    }

    /// Classify a request path.
    pub fn classify(&self, path: &str) -> Classification {
        let path = trim_trailing(path);
        let excludable = !has_dot_segments(path);

        if is_under(path, "/api") {
            if excludable && self.is_public_api(path) {
                return Classification::new(RouteClass::Public, AdmissionMode::Bypass);
            }
            return classify_api(path);
        }

        if excludable && self.is_public_page(path) {
            return Classification::new(RouteClass::Public, AdmissionMode::Bypass);
        }

        Classification::new(RouteClass::Page, AdmissionMode::Full)
    }

    fn is_public_api(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
            || self.public_prefixes.iter().any(|p| matches_prefix(path, p))
    }

    fn is_public_page(&self, path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        if last_segment.contains('.') {
            return true;
        }
        self.public_paths.iter().any(|p| p == path)
            || self.auth_pages.iter().any(|p| is_under(path, p))
            || self.public_prefixes.iter().any(|p| matches_prefix(path, p))
    }
}

fn classify_api(path: &str) -> Classification {
    if is_under(path, "/api/auth") {
        Classification::new(RouteClass::Auth, AdmissionMode::RateLimitOnly)
    } else if is_under(path, "/api/ai") {
        Classification::new(RouteClass::Ai, AdmissionMode::Full)
    } else if is_under(path, "/api/upload") || is_under(path, "/api/uploads") {
        Classification::new(RouteClass::Upload, AdmissionMode::Full)
    } else {
        Classification::new(RouteClass::Api, AdmissionMode::Full)
    }
}

fn trim_trailing(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// `path` equals `base` or lies below it.
fn is_under(path: &str, base: &str) -> bool {
    let base = trim_trailing(base);
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || base == "/",
        None => false,
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        path.starts_with(prefix) || path == trim_trailing(prefix)
    } else {
        is_under(path, prefix)
    }
}

fn has_dot_segments(path: &str) -> bool {
    path.to_ascii_lowercase().contains("%2e")
        || path.split('/').any(|segment| segment == "." || segment == "..")
}
