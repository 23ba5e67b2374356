//! Dispatcher configuration.
use crate::Error;
use serde::Deserialize;

/// What to do when the last handle to a dispatcher is dropped while listeners are still registered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakCheck {
    /// Don't check.
    Off,
    /// Log the leaked listeners.
    #[default]
    Warn,
    /// Log the leaked listeners, and panic in debug builds.
    Assert,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub leak_check: LeakCheck,
    /// Emit a trace event for every listener invocation, with the location where the listener
    /// was registered.
    pub trace_targets: bool,
}

impl DispatcherConfig {
    /// Parses a configuration from JSON. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<DispatcherConfig, Error> {
        Ok(serde_json::from_str(json)?)
    }
}
