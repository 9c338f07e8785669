//! Error types.

use thiserror::Error;

/// An error raised while setting up or running an experiment.
#[derive(Debug, Error)]
pub enum Error {
    /// The simulator held no vehicles after the bootstrap step.
    #[error("no vehicles found in simulation after the first step")]
    NoVehicles,

    /// The simulator was asked about a vehicle it does not hold.
    #[error("unknown vehicle '{0}'")]
    UnknownVehicle(String),

    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A CSV file could not be read or written.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A TOML configuration could not be parsed.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Telemetry could not be serialised to JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A configuration value that would make the experiment ill-defined.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A value that must be strictly positive was not.
    #[error("`{field}` must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    /// A value that must not be negative was.
    #[error("`{field}` must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// The Follower-Stopper spacing bands would not be strictly increasing.
    #[error("spacing bands are not strictly increasing: {0}")]
    DegenerateBands(String),

    /// A vehicle plan references a vehicle type that is not defined.
    #[error("vehicle type '{0}' is not defined")]
    UnknownVehicleType(String),
}

impl ConfigError {
    /// Checks that `value` is strictly positive.
    pub(crate) fn positive(field: &'static str, value: f64) -> std::result::Result<(), Self> {
        if value > 0.0 {
            Ok(())
        } else {
            Err(Self::NotPositive { field, value })
        }
    }

    /// Checks that `value` is zero or greater.
    pub(crate) fn non_negative(field: &'static str, value: f64) -> std::result::Result<(), Self> {
        if value >= 0.0 {
            Ok(())
        } else {
            Err(Self::Negative { field, value })
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, Error>;
