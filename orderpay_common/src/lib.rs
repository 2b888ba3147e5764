mod helpers;
mod minor_units;

pub mod op;
mod secret;

pub use helpers::{env_duration_secs, env_or_default, parse_boolean_flag};
pub use minor_units::{MinorUnits, MinorUnitsConversionError};
pub use secret::Secret;
