use thiserror::Error;

/// Rejected configuration values, reported once at initialization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A parameter that must be strictly positive was zero, negative or NaN.
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    /// A parameter that must be non-negative was negative or NaN.
    #[error("{name} must be non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    /// A parameter fell outside its admissible interval.
    #[error("{name} must lie in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },

    /// A value that must be finite was infinite or NaN.
    #[error("{name} must be finite")]
    NotFinite { name: &'static str },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub(crate) fn require_positive(name: &'static str, value: f64) -> ConfigResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

pub(crate) fn require_non_negative(name: &'static str, value: f64) -> ConfigResult<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

pub(crate) fn require_finite(name: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { name })
    }
}
