use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::optimizer::MonteCarloConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CONTAINER_SIZER_API_HOST";
    const PORT_VAR: &'static str = "CONTAINER_SIZER_API_PORT";

    fn from_env() -> Self {
        Self::from_values(env_string(Self::HOST_VAR), env_string(Self::PORT_VAR))
    }

    fn from_values(host: Option<String>, port: Option<String>) -> Self {
        let (bind_ip, display_host) = match host {
            Some(raw) => match raw.parse::<IpAddr>() {
                Ok(ip) => (ip, raw),
                Err(err) => {
                    log::warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::HOST_VAR,
                        raw,
                        err,
                        Self::DEFAULT_HOST
                    );
                    (Self::DEFAULT_HOST, Self::DEFAULT_HOST.to_string())
                }
            },
            None => (Self::DEFAULT_HOST, Self::DEFAULT_HOST.to_string()),
        };

        let port = parse_with_warning(
            Self::PORT_VAR,
            port,
            Self::DEFAULT_PORT,
            |value| *value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Default search settings applied when a request does not override them.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    monte_carlo: MonteCarloConfig,
    allow_rotation: bool,
}

impl OptimizerConfig {
    const SEARCH_ATTEMPTS_VAR: &'static str = "CONTAINER_SIZER_SEARCH_ATTEMPTS";
    const FINAL_ATTEMPTS_VAR: &'static str = "CONTAINER_SIZER_FINAL_ATTEMPTS";
    const USE_NOISE_VAR: &'static str = "CONTAINER_SIZER_USE_NOISE";
    const ALLOW_ROTATION_VAR: &'static str = "CONTAINER_SIZER_ALLOW_ROTATION";
    pub const DEFAULT_ALLOW_ROTATION: bool = true;

    fn from_env() -> Self {
        let search_attempts = parse_with_warning(
            Self::SEARCH_ATTEMPTS_VAR,
            env_string(Self::SEARCH_ATTEMPTS_VAR),
            MonteCarloConfig::DEFAULT_SEARCH_ATTEMPTS,
            |value| *value > 0,
            "must be at least 1",
        );
        let final_attempts = parse_with_warning(
            Self::FINAL_ATTEMPTS_VAR,
            env_string(Self::FINAL_ATTEMPTS_VAR),
            MonteCarloConfig::DEFAULT_FINAL_ATTEMPTS,
            |value| *value > 0,
            "must be at least 1",
        );
        let use_noise = env_string(Self::USE_NOISE_VAR)
            .and_then(|raw| parse_bool(&raw, Self::USE_NOISE_VAR))
            .unwrap_or(MonteCarloConfig::DEFAULT_USE_NOISE);
        let allow_rotation = env_string(Self::ALLOW_ROTATION_VAR)
            .and_then(|raw| parse_bool(&raw, Self::ALLOW_ROTATION_VAR))
            .unwrap_or(Self::DEFAULT_ALLOW_ROTATION);

        let monte_carlo = MonteCarloConfig {
            search_attempts,
            final_attempts,
            use_noise,
        };
        if monte_carlo != MonteCarloConfig::default() {
            log::warn!(
                "⚠️ Adjusted attempt budget (search: {}, final: {}, noise: {}) changes result quality and run time",
                search_attempts,
                final_attempts,
                use_noise
            );
        }

        Self {
            monte_carlo,
            allow_rotation,
        }
    }

    /// Configured Monte-Carlo budget.
    pub fn monte_carlo(&self) -> MonteCarloConfig {
        self.monte_carlo
    }

    /// Rotation setting used when a request leaves it open.
    pub fn allow_rotation(&self) -> bool {
        self.allow_rotation
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            monte_carlo: MonteCarloConfig::default(),
            allow_rotation: Self::DEFAULT_ALLOW_ROTATION,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            log::warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name,
                err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            log::warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

fn parse_with_warning<T>(
    var_name: &str,
    raw: Option<String>,
    default: T,
    validator: impl Fn(&T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.parse::<T>() {
        Ok(value) if validator(&value) => value,
        Ok(_) => {
            log::warn!(
                "⚠️ {} contains invalid value '{}': {}. Using {}.",
                var_name,
                raw,
                invalid_hint,
                default
            );
            default
        }
        Err(err) => {
            log::warn!(
                "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                var_name,
                raw,
                err,
                default
            );
            default
        }
    }
}
