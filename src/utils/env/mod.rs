use crate::core::config::BridgeConfig;
use std::collections::BTreeMap;

/// Proxy variables blanked in the child when proxy bypass is on.
pub const PROXY_VARS: &[&str] = &[
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

pub struct EnvIsolator;

impl EnvIsolator {
    /// Snapshot of the bridge's own environment, skipping non-UTF-8 entries.
    pub fn snapshot() -> BTreeMap<String, String> {
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    /// Compute the complete child environment from a base snapshot.
    ///
    /// Injected variables land first and proxy blanking last, so an injected
    /// entry can never turn a proxy back on while bypass is enabled.
    pub fn build_env(
        base: &BTreeMap<String, String>,
        config: &BridgeConfig,
    ) -> BTreeMap<String, String> {
        let mut env = base.clone();

        for (key, value) in &config.env {
            env.insert(key.clone(), value.clone());
        }

        if config.proxy_bypass {
            for key in PROXY_VARS {
                env.insert((*key).to_string(), String::new());
            }
        }

        env
    }

    pub fn is_proxy_var(key: &str) -> bool {
        PROXY_VARS.contains(&key)
    }
}
