use crate::errors::AppError;
use crate::jwt::JwtConfig;

const BUILTIN_DEV_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub tenancy: TenancyConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            jwt: JwtConfig::from_env()?,
            tenancy: TenancyConfig::from_env()?,
        })
    }
}

/// Platform-wide host routing settings.
///
/// `apex_domain` is the single value every subdomain and custom-domain rule is
/// measured against; it is always lowercase and has no trailing dot.
#[derive(Debug, Clone)]
pub struct TenancyConfig {
    pub apex_domain: String,
    pub dev_hosts: Vec<String>,
}

impl TenancyConfig {
    pub fn new(apex_domain: impl AsRef<str>) -> Result<Self, AppError> {
        let apex = apex_domain
            .as_ref()
            .trim()
            .trim_end_matches('.')
            .to_ascii_lowercase();

        if apex.is_empty() {
            return Err(AppError::configuration("APP_DOMAIN must not be empty"));
        }

        Ok(Self {
            apex_domain: apex,
            dev_hosts: BUILTIN_DEV_HOSTS.iter().map(|h| h.to_string()).collect(),
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        let apex = std::env::var("APP_DOMAIN").map_err(|_| AppError::configuration("APP_DOMAIN not set"))?;
        let mut config = Self::new(apex)?;

        if let Ok(extra) = std::env::var("DEV_HOSTS") {
            config = config.with_dev_hosts(extra.split(','));
        }

        Ok(config)
    }

    pub fn with_dev_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            let host = host.as_ref().trim().to_ascii_lowercase();
            if !host.is_empty() && !self.dev_hosts.contains(&host) {
                self.dev_hosts.push(host);
            }
        }
        self
    }

    pub fn is_dev_host(&self, host: &str) -> bool {
        host.ends_with(".localhost") || self.dev_hosts.iter().any(|h| h == host)
    }

    /// True for the apex itself and for `www.` + apex.
    pub fn is_platform_host(&self, host: &str) -> bool {
        host == self.apex_domain
            || host
                .strip_prefix("www.")
                .map(|rest| rest == self.apex_domain)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apex_is_normalized() {
        let config = TenancyConfig::new(" Example.COM. ").unwrap();
        assert_eq!(config.apex_domain, "example.com");
        assert!(config.is_platform_host("example.com"));
        assert!(config.is_platform_host("www.example.com"));
        assert!(!config.is_platform_host("acme.example.com"));
    }

    #[test]
    fn empty_apex_is_rejected() {
        assert!(matches!(TenancyConfig::new("  "), Err(AppError::Configuration(_))));
    }

    #[test]
    fn dev_hosts_include_builtins_and_extras() {
        let config = TenancyConfig::new("example.com")
            .unwrap()
            .with_dev_hosts(["preview.internal", " ", "LOCALHOST"]);

        assert!(config.is_dev_host("localhost"));
        assert!(config.is_dev_host("127.0.0.1"));
        assert!(config.is_dev_host("app.localhost"));
        assert!(config.is_dev_host("preview.internal"));
        assert_eq!(config.dev_hosts.iter().filter(|h| *h == "localhost").count(), 1);
        assert!(!config.is_dev_host("example.com"));
    }
}
