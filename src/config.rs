use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_level: String,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let workspace = env_nonempty("CAMPUSD_WORKSPACE").map(PathBuf::from);

        let log_level = env_or("CAMPUSD_LOG_LEVEL", "info");
        if !matches!(
            log_level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) && !log_level.contains('=')
        {
            return Err(format!("Invalid CAMPUSD_LOG_LEVEL: {log_level}"));
        }

        let bootstrap_admin = match (
            env_nonempty("CAMPUSD_BOOTSTRAP_ADMIN_EMAIL"),
            env_nonempty("CAMPUSD_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => {
                if !email.contains('@') {
                    return Err(format!("Invalid CAMPUSD_BOOTSTRAP_ADMIN_EMAIL: {email}"));
                }
                Some(BootstrapAdmin { email, password })
            }
            (None, None) => None,
            _ => {
                return Err(
                    "CAMPUSD_BOOTSTRAP_ADMIN_EMAIL and CAMPUSD_BOOTSTRAP_ADMIN_PASSWORD must be set together"
                        .to_string(),
                )
            }
        };

        Ok(Config {
            workspace,
            log_level,
            bootstrap_admin,
        })
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_nonempty(key).unwrap_or_else(|| default.to_string())
}
