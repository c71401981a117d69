//! Compiled admission policy and its hot-swappable holder.

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::auth::TokenCodec;
use crate::config::GateConfig;
use crate::routing::RouteClassifier;
use crate::security::{
    headers::InvalidHeader, RateLimitStore, RateLimiter, SecurityHeaders, SuspicionDetector,
};

/// A configuration could not be compiled into a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid suspicious user agent pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Header(#[from] InvalidHeader),
}

/// Everything the pipeline needs, compiled from one configuration.
#[derive(Debug)]
pub struct AdmissionPolicy {
    pub classifier: RouteClassifier,
    pub detector: SuspicionDetector,
    pub headers: SecurityHeaders,
    pub limiter: RateLimiter,
    pub codec: TokenCodec,
    pub cookie_name: String,
    pub sign_in_path: String,
    pub redirect_api_requests: bool,
    pub trust_proxy_headers: bool,
}

impl AdmissionPolicy {
    /// Compile `config`, counting against the given limiter store.
    pub fn build(config: &GateConfig, store: Arc<dyn RateLimitStore>) -> Result<Self, PolicyError> {
        Ok(Self {
            classifier: RouteClassifier::from_config(&config.routes),
            detector: SuspicionDetector::from_config(&config.security)?,
            headers: SecurityHeaders::from_config(&config.security)?,
            limiter: RateLimiter::new(store, &config.rate_limit),
            codec: TokenCodec::new(&config.auth.jwt_secret, config.auth.token_ttl_secs),
            cookie_name: config.auth.cookie_name.clone(),
            sign_in_path: config.auth.sign_in_path.clone(),
            redirect_api_requests: config.auth.redirect_api_requests,
            trust_proxy_headers: config.rate_limit.trust_proxy_headers,
        })
    }
}

/// Shared state of the admission layer.
///
/// The limiter store outlives policy reloads so windows keep counting.
#[derive(Clone)]
pub struct AdmissionState {
    policy: Arc<ArcSwap<AdmissionPolicy>>,
    store: Arc<dyn RateLimitStore>,
}

impl AdmissionState {
    pub fn new(config: &GateConfig, store: Arc<dyn RateLimitStore>) -> Result<Self, PolicyError> {
        let policy = AdmissionPolicy::build(config, store.clone())?;
        Ok(Self {
            policy: Arc::new(ArcSwap::from_pointee(policy)),
            store,
        })
    }

    /// Current policy snapshot.
    pub fn policy(&self) -> Arc<AdmissionPolicy> {
        self.policy.load_full()
    }

    /// Compile `config` and swap it in. The old policy stays on failure.
    pub fn reload(&self, config: &GateConfig) -> Result<(), PolicyError> {
        let policy = AdmissionPolicy::build(config, self.store.clone())?;
        self.policy.store(Arc::new(policy));
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::MemoryStore;
    use crate::routing::RouteClass;

    fn config() -> GateConfig {
        let mut config = GateConfig::default();
        config.auth.jwt_secret = "k".into();
        config
    }

    #[test]
    fn test_reload_swaps_policy_and_keeps_windows() {
        let state = AdmissionState::new(&config(), Arc::new(MemoryStore::default())).unwrap();
        state.policy().limiter.check(RouteClass::Api, "1.1.1.1").unwrap();
        assert_eq!(state.store().window_count(), 1);

        let mut next = config();
        next.auth.cookie_name = "session".into();
        state.reload(&next).unwrap();

        assert_eq!(state.policy().cookie_name, "session");
        assert_eq!(state.store().window_count(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_old_policy() {
        let state = AdmissionState::new(&config(), Arc::new(MemoryStore::default())).unwrap();
        let mut broken = config();
        broken.security.suspicious_user_agents = vec!["(".into()];
        broken.auth.cookie_name = "never".into();

        assert!(matches!(state.reload(&broken), Err(PolicyError::Pattern(_))));
        assert_eq!(state.policy().cookie_name, "authToken");
    }
}
