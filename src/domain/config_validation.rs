//! Configuration validation.
//!
//! Checks the `[analysis]` section before any log is read and turns it into
//! an [`AnalysisConfig`]. Keys that are absent fall back to their defaults;
//! keys that are present must parse and be in range.

use crate::domain::correlation::{
    DEFAULT_SIGNAL_LOOKBACK_SECS, MAX_SIGNAL_LOOKBACK_SECS, PairingMode,
};
use crate::domain::error::TradelogError;
use crate::domain::pipeline::{AnalysisConfig, DEFAULT_RISK_WARN_PCT};
use crate::ports::config_port::ConfigPort;

const SECTION: &str = "analysis";

pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    validate_starting_balance(config)?;
    validate_signal_lookback(config)?;
    validate_pairing(config)?;
    validate_risk_warn_pct(config)?;
    Ok(())
}

/// Validates, then reads the `[analysis]` section.
pub fn analysis_config_from(config: &dyn ConfigPort) -> Result<AnalysisConfig, TradelogError> {
    validate_analysis_config(config)?;
    Ok(AnalysisConfig {
        starting_balance: parse_number::<f64>(config, "starting_balance")?,
        signal_lookback_secs: parse_number::<i64>(config, "signal_lookback_secs")?
            .unwrap_or(DEFAULT_SIGNAL_LOOKBACK_SECS),
        pairing: parse_pairing(config)?.unwrap_or_default(),
        risk_warn_pct: parse_number::<f64>(config, "risk_warn_pct")?
            .unwrap_or(DEFAULT_RISK_WARN_PCT),
    })
}

fn validate_starting_balance(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    if let Some(value) = parse_number::<f64>(config, "starting_balance")? {
        if !value.is_finite() || value < 0.0 {
            return Err(TradelogError::invalid(
                SECTION,
                "starting_balance",
                "starting_balance must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_signal_lookback(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    if let Some(value) = parse_number::<i64>(config, "signal_lookback_secs")? {
        if value < 0 {
            return Err(TradelogError::invalid(
                SECTION,
                "signal_lookback_secs",
                "signal_lookback_secs must be non-negative",
            ));
        }
        if value > MAX_SIGNAL_LOOKBACK_SECS {
            return Err(TradelogError::invalid(
                SECTION,
                "signal_lookback_secs",
                format!("signal_lookback_secs must be at most {MAX_SIGNAL_LOOKBACK_SECS}"),
            ));
        }
    }
    Ok(())
}

fn validate_pairing(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    parse_pairing(config).map(|_| ())
}

fn validate_risk_warn_pct(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    if let Some(value) = parse_number::<f64>(config, "risk_warn_pct")? {
        if !value.is_finite() || value <= 0.0 {
            return Err(TradelogError::invalid(
                SECTION,
                "risk_warn_pct",
                "risk_warn_pct must be positive",
            ));
        }
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<T>, TradelogError> {
    match config.get_string(SECTION, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TradelogError::invalid(SECTION, key, format!("'{raw}' is not a number"))),
    }
}

fn parse_pairing(config: &dyn ConfigPort) -> Result<Option<PairingMode>, TradelogError> {
    match config.get_string(SECTION, "pairing") {
        None => Ok(None),
        Some(raw) => raw
            .parse::<PairingMode>()
            .map(Some)
            .map_err(|reason| TradelogError::invalid(SECTION, "pairing", reason)),
    }
}
