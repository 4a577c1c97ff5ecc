//! # Options Cascade
//!
//! Three layers, later ones winning key by key:
//!
//! 1. [`FALLBACK_OPTIONS`] - library-wide, immutable
//! 2. instance defaults - per agent, changed through [`OptionsStore::configure`]
//! 3. per-call overrides
//!
//! Resolution always yields a complete [`Options`] record.

use crate::envelope::Payload;
use crate::error::IpcResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How request data is presented to a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArgumentMode {
    /// The payload is passed through unchanged.
    #[default]
    Single,
    /// Value payloads are always presented as an array.
    Array,
}

impl ArgumentMode {
    /// Shape `data` for a listener.
    ///
    /// In `Array` mode a non-array value becomes a one-element array and an
    /// absent payload becomes `[]`. Error payloads are never reshaped.
    #[must_use]
    pub fn present(self, data: Payload) -> Payload {
        match (self, data) {
            (Self::Single, data) => data,
            (Self::Array, Payload::Absent) => Payload::Value(Value::Array(Vec::new())),
            (Self::Array, Payload::Value(Value::Array(items))) => {
                Payload::Value(Value::Array(items))
            }
            (Self::Array, Payload::Value(value)) => Payload::Value(Value::Array(vec![value])),
            (Self::Array, err @ Payload::Error(_)) => err,
        }
    }
}

/// Fully resolved behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// How listeners receive request data.
    pub arguments: ArgumentMode,
    /// If true, response callbacks receive error payloads as `Err`.
    pub node_callbacks: bool,
}

/// Library-wide defaults shared by every agent.
pub static FALLBACK_OPTIONS: Options = Options {
    arguments: ArgumentMode::Single,
    node_callbacks: false,
};

impl Default for Options {
    fn default() -> Self {
        FALLBACK_OPTIONS
    }
}

/// A sparse set of options; unset keys fall through to the layer below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialOptions {
    pub arguments: Option<ArgumentMode>,
    pub node_callbacks: Option<bool>,
}

impl PartialOptions {
    /// An empty layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the argument mode.
    #[must_use]
    pub fn arguments(mut self, mode: ArgumentMode) -> Self {
        self.arguments = Some(mode);
        self
    }

    /// Set the callback convention.
    #[must_use]
    pub fn node_callbacks(mut self, enabled: bool) -> Self {
        self.node_callbacks = Some(enabled);
        self
    }

    /// Shallow merge; keys set in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            arguments: other.arguments.or(self.arguments),
            node_callbacks: other.node_callbacks.or(self.node_callbacks),
        }
    }

    /// Lay this layer over a complete set of options.
    #[must_use]
    pub fn apply_to(self, base: Options) -> Options {
        Options {
            arguments: self.arguments.unwrap_or(base.arguments),
            node_callbacks: self.node_callbacks.unwrap_or(base.node_callbacks),
        }
    }

    /// Parse a layer from JSON, e.g. `{"arguments":"array"}`.
    ///
    /// # Errors
    ///
    /// `IpcError::Serialization` if the text is not a valid options object.
    pub fn from_json(text: &str) -> IpcResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Holds the instance layer of the cascade.
///
/// The instance layer is swapped under a write lock, so a concurrent
/// `resolve` observes either the previous or the new layer, never a mix.
#[derive(Debug)]
pub struct OptionsStore {
    fallback: &'static Options,
    defaults: RwLock<PartialOptions>,
}

impl OptionsStore {
    /// Create a store over `fallback` with initial instance defaults.
    #[must_use]
    pub fn new(fallback: &'static Options, defaults: PartialOptions) -> Self {
        Self {
            fallback,
            defaults: RwLock::new(defaults),
        }
    }

    /// Change the instance layer.
    ///
    /// With `replace`, keys not present in `options` revert to the fallback;
    /// otherwise they keep their current instance value.
    pub fn configure(&self, options: PartialOptions, replace: bool) {
        let mut defaults = self.defaults.write();
        *defaults = if replace {
            options
        } else {
            defaults.merge(options)
        };
    }

    /// Resolve fallback, instance defaults and `overrides` into one record.
    #[must_use]
    pub fn resolve(&self, overrides: Option<&PartialOptions>) -> Options {
        let instance = self.defaults.read().apply_to(*self.fallback);
        overrides.map_or(instance, |call| call.apply_to(instance))
    }

    /// Current instance layer.
    #[must_use]
    pub fn defaults(&self) -> PartialOptions {
        *self.defaults.read()
    }
}

impl Default for OptionsStore {
    fn default() -> Self {
        Self::new(&FALLBACK_OPTIONS, PartialOptions::default())
    }
}
