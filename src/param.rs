//! Parameter metadata as described by the plugin. Parameters are addressed by their plain 0-based
//! index, and their values are always plain (unnormalized) `f32` values within
//! [`ParameterRanges`].

use bitflags::bitflags;

bitflags! {
    /// Flags describing how a parameter should be exposed and handled.
    #[derive(Default)]
    pub struct ParameterHints: u32 {
        /// The host is allowed to automate this parameter.
        const AUTOMATABLE = 1 << 0;
        /// The parameter only has two values, `min` and `max`. Anything above the midpoint snaps to
        /// `max`.
        const BOOLEAN = 1 << 1;
        /// The parameter only accepts integer values.
        const INTEGER = 1 << 2;
        /// Hint for UIs that the parameter is logarithmic. This does not change any conversions.
        const LOGARITHMIC = 1 << 3;
        /// The parameter is written by the plugin during processing and is read-only for the host.
        const OUTPUT = 1 << 4;
        /// A boolean-like parameter that resets itself to its default value after being
        /// processed.
        const TRIGGER = 1 << 5 | Self::BOOLEAN.bits;
    }
}

/// The range of a parameter, along with its default value. All values are plain values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    pub def: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            def: 0.0,
            min: 0.0,
            max: 1.0,
        }
    }
}

impl ParameterRanges {
    pub fn new(def: f32, min: f32, max: f32) -> Self {
        Self { def, min, max }
    }

    /// Normalize a plain value to the `[0, 1]` range. The result is clamped.
    pub fn normalized_value(&self, plain: f64) -> f64 {
        let min = self.min as f64;
        let max = self.max as f64;
        if max <= min {
            return 0.0;
        }

        ((plain - min) / (max - min)).clamp(0.0, 1.0)
    }

    /// Unnormalize a `[0, 1]` value to the plain range. The input is clamped first.
    pub fn unnormalized_value(&self, normalized: f64) -> f64 {
        let min = self.min as f64;
        let max = self.max as f64;

        min + normalized.clamp(0.0, 1.0) * (max - min)
    }

    pub fn clamp(&self, plain: f32) -> f32 {
        plain.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

/// A single labelled value of an enumerated parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEnumerationValue {
    pub value: f32,
    pub label: String,
}

impl ParameterEnumerationValue {
    pub fn new(value: f32, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

/// Labelled values for a parameter. When `restricted` is set, the parameter can only ever take one
/// of these values and it will be shown as a list to the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterEnumerationValues {
    pub restricted: bool,
    pub values: Vec<ParameterEnumerationValue>,
}

impl ParameterEnumerationValues {
    /// Find the label for a plain value, if one of the enumeration values matches it exactly.
    pub fn label_for(&self, plain: f32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.value == plain)
            .map(|v| v.label.as_str())
    }

    /// The inverse of [`label_for()`][Self::label_for()].
    pub fn value_for(&self, label: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|v| v.label == label)
            .map(|v| v.value)
    }
}

/// A special meaning for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDesignation {
    #[default]
    None,
    /// The parameter bypasses the plugin. Exposed to the host as the bypass parameter.
    Bypass,
}

/// Everything the adapter needs to know about a single plugin parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    pub short_name: String,
    /// A stable identifier. This is used in the state blob instead of the parameter's index so
    /// reordering parameters does not break old state.
    pub symbol: String,
    pub unit: String,
    pub hints: ParameterHints,
    pub ranges: ParameterRanges,
    pub enum_values: ParameterEnumerationValues,
    pub designation: ParameterDesignation,
}

impl ParameterInfo {
    /// Create an automatable parameter with the given name, symbol, and ranges.
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, ranges: ParameterRanges) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            hints: ParameterHints::AUTOMATABLE,
            ranges,
            ..Default::default()
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_hints(mut self, hints: ParameterHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_enum_values(mut self, enum_values: ParameterEnumerationValues) -> Self {
        self.enum_values = enum_values;
        self
    }

    pub fn with_designation(mut self, designation: ParameterDesignation) -> Self {
        self.designation = designation;
        self
    }

    pub fn is_output(&self) -> bool {
        self.hints.contains(ParameterHints::OUTPUT)
    }

    pub fn is_trigger(&self) -> bool {
        self.hints.contains(ParameterHints::TRIGGER)
    }

    pub fn is_boolean(&self) -> bool {
        self.hints.contains(ParameterHints::BOOLEAN)
    }

    pub fn is_integer(&self) -> bool {
        self.hints.contains(ParameterHints::INTEGER)
    }

    /// Whether this parameter's value is stored in the state blob.
    pub fn is_persisted(&self) -> bool {
        !self.is_output() && !self.is_trigger()
    }

    /// Snap a plain value to what the parameter can actually represent. Boolean parameters snap to
    /// their minimum or maximum, and integer parameters get rounded.
    pub fn snap_value(&self, plain: f64) -> f64 {
        let min = self.ranges.min as f64;
        let max = self.ranges.max as f64;

        if self.is_boolean() {
            let middle = min + (max - min) / 2.0;
            if plain > middle {
                max
            } else {
                min
            }
        } else if self.is_integer() {
            plain.round()
        } else {
            plain
        }
    }

    /// The normalized value for a plain value, snapping it first.
    pub fn normalize(&self, plain: f64) -> f64 {
        self.ranges.normalized_value(self.snap_value(plain))
    }

    /// The plain value for a normalized value, snapped to what the parameter can represent.
    pub fn unnormalize(&self, normalized: f64) -> f64 {
        self.snap_value(self.ranges.unnormalized_value(normalized))
    }
}
