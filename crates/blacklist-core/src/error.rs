use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("TTL must be >=1 and <=365 days, got {0}")]
    InvalidTtl(i32),

    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),

    #[error("private IPs are disallowed: {0}")]
    PrivateAddress(String),

    #[error("IP address already exists: {0}")]
    DuplicateAddress(String),

    #[error("IP address not found: {0}")]
    NotFound(String),

    #[error("unknown address status '{0}'")]
    UnknownStatus(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("expiry out of range: {ttl_days} + {cooling_period_days} days from {from}")]
    ExpiryOutOfRange {
        from: chrono::DateTime<chrono::Utc>,
        ttl_days: i32,
        cooling_period_days: i32,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl BlacklistError {
    /// Stable machine-readable code surfaced to request-path callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTtl(_) => "INVALID_TTL",
            Self::InvalidAddress(_) => "INVALID_IP",
            Self::PrivateAddress(_) => "PRIVATE_IP",
            Self::DuplicateAddress(_) => "DUPLICATE_IP",
            Self::NotFound(_) => "IP_NOT_FOUND",
            Self::UnknownStatus(_)
            | Self::InvalidConfig(_)
            | Self::ExpiryOutOfRange { .. }
            | Self::Database(_)
            | Self::Migrate(_)
            | Self::Io(_)
            | Self::Yaml(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BlacklistError>;
