use std::fmt;

use crate::model::AssetClass;

/// Errors raised while validating configuration values
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An allocation weight is negative or not a finite number
    InvalidWeight { asset: AssetClass, weight: f64 },
    /// Every allocation weight is zero, nothing to normalize
    EmptyAllocation,
    /// A numeric parameter is outside its accepted range
    OutOfRange {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    /// A sweep axis has no values to enumerate
    EmptyAxis(&'static str),
    /// A sweep axis lists the same value twice
    DuplicateValue { axis: &'static str, value: String },
    /// Unrecognized tag for a closed set of variants
    UnknownVariant { kind: &'static str, tag: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidWeight { asset, weight } => {
                write!(f, "invalid allocation weight {weight} for {asset}")
            }
            ConfigError::EmptyAllocation => write!(f, "allocation weights sum to zero"),
            ConfigError::OutOfRange {
                field,
                value,
                reason,
            } => write!(f, "{field}={value} is out of range: {reason}"),
            ConfigError::EmptyAxis(axis) => write!(f, "sweep axis '{axis}' has no values"),
            ConfigError::DuplicateValue { axis, value } => {
                write!(f, "sweep axis '{axis}' lists {value} more than once")
            }
            ConfigError::UnknownVariant { kind, tag } => write!(f, "unknown {kind} '{tag}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from the option-pricing model
#[derive(Debug, Clone, PartialEq)]
pub enum PricingError {
    /// Pricing inputs that make Black-Scholes undefined
    InvalidInput {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
    /// The at-the-money call is worthless, so participation is undefined
    ZeroCallPrice { call_price: f64 },
}

impl fmt::Display for PricingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingError::InvalidInput {
                field,
                value,
                reason,
            } => write!(f, "invalid pricing input {field}={value}: {reason}"),
            PricingError::ZeroCallPrice { call_price } => {
                write!(
                    f,
                    "call price {call_price} leaves participation rate undefined"
                )
            }
        }
    }
}

impl std::error::Error for PricingError {}

/// Errors that abort a single simulation path
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A required return series has no value for the year
    DataGap { year: i16, series: &'static str },
    /// No year in the requested range has data for every required series
    NoOverlappingData { start_year: i16, end_year: i16 },
    /// A withdrawal strategy was asked to move backwards in time
    NonMonotonicYear { previous: i16, requested: i16 },
    Config(ConfigError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::DataGap { year, series } => {
                write!(f, "no {series} data for year {year}")
            }
            SimulationError::NoOverlappingData {
                start_year,
                end_year,
            } => write!(
                f,
                "no overlapping data available for years {start_year} to {end_year}"
            ),
            SimulationError::NonMonotonicYear {
                previous,
                requested,
            } => write!(
                f,
                "withdrawal requested for {requested} after {previous} was already processed"
            ),
            SimulationError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(err: ConfigError) -> Self {
        SimulationError::Config(err)
    }
}

/// Errors that abort a whole parameter sweep
#[derive(Debug)]
pub enum SweepError {
    Config(ConfigError),
    /// The worker pool could not be created
    WorkerPool(String),
    /// The result sink rejected a batch; partial writes cannot be trusted
    Persistence(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Config(e) => write!(f, "{e}"),
            SweepError::WorkerPool(msg) => write!(f, "failed to start worker pool: {msg}"),
            SweepError::Persistence(e) => write!(f, "failed to persist results: {e}"),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Config(e) => Some(e),
            SweepError::Persistence(e) => Some(e.as_ref()),
            SweepError::WorkerPool(_) => None,
        }
    }
}

impl From<ConfigError> for SweepError {
    fn from(err: ConfigError) -> Self {
        SweepError::Config(err)
    }
}
