//! Reshaping of raw Dune rows into endpoint answers

use serde_json::Value;
use thiserror::Error;

use super::Network;

/// Row field holding the network identifier
const NETWORK_NAME_FIELD: &str = "network_name";

/// Row field holding the TVL in USD
const TVL_USD_FIELD: &str = "tvl_usd";

/// Errors that can occur when extracting values from Dune rows
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No row matches the requested network
    #[error("Network \"{0}\" not found in Dune response")]
    NotFound(Network),

    /// Input is not a row array, or a row value has the wrong type
    #[error("Unknown data format: {0}")]
    Format(String),
}

/// Picks the TVL of one network out of the all-networks result set
///
/// `data` is either an array of rows or a string holding the JSON encoding of
/// one. `tvl_usd` may be a number or a string starting with one, so
/// `"123.4 USD"` reads as 123.4.
pub fn extract_network_tvl(data: &Value, network: Network) -> Result<f64, ExtractError> {
    let parsed;
    let data = match data {
        Value::String(encoded) => {
            parsed = serde_json::from_str::<Value>(encoded)
                .map_err(|_| ExtractError::Format(data.to_string()))?;
            &parsed
        }
        other => other,
    };

    let rows = data
        .as_array()
        .ok_or_else(|| ExtractError::Format(data.to_string()))?;

    let row = rows
        .iter()
        .find(|row| row.get(NETWORK_NAME_FIELD).and_then(Value::as_str) == Some(network.as_str()))
        .ok_or(ExtractError::NotFound(network))?;

    parse_number(row.get(TVL_USD_FIELD))
        .ok_or_else(|| ExtractError::Format(format!("invalid {} in {}", TVL_USD_FIELD, row)))
}

fn parse_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_number(s),
        _ => None,
    }
}

/// Reads the decimal number at the start of `s`, ignoring trailing text such as a unit
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .map_or(s.len(), |(i, _)| i);

    (1..=end).rev().find_map(|len| s[..len].parse::<f64>().ok())
}
