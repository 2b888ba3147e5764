use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads and parses the environment variable `name`. Missing or unparseable values fall back to `default`, with a
/// log entry explaining why.
pub fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

/// Reads a duration, given in whole seconds, from the environment variable `name`.
pub fn env_duration_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or_default(name, default.as_secs()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn env_fallbacks() {
        env::set_var("ORDERPAY_COMMON_TEST_PORT", "not-a-number");
        assert_eq!(env_or_default("ORDERPAY_COMMON_TEST_PORT", 8360u16), 8360);
        env::set_var("ORDERPAY_COMMON_TEST_PORT", "9000");
        assert_eq!(env_or_default("ORDERPAY_COMMON_TEST_PORT", 8360u16), 9000);
        assert_eq!(env_duration_secs("ORDERPAY_COMMON_TEST_UNSET", Duration::from_secs(5)), Duration::from_secs(5));
    }
}
