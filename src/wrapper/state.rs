//! Utilities for saving and restoring a plugin's state.
//!
//! The state is a flat sequence of null-terminated strings, read as key/value pairs, followed by a
//! single terminator byte. Sections are delimited by sentinel keys that do not have a value:
//!
//! ```text
//! __dpf_program__ \0 <index> \0
//! __dpf_state_begin__ \0 <key> \0 <value> \0 ... __dpf_state_end__ \0
//! __dpf_parameters_begin__ \0 <symbol> \0 <value> \0 ... __dpf_parameters_end__ \0
//! \xfe
//! ```
//!
//! There are no lengths or version fields. Parameters are stored by their symbol, and unknown
//! symbols are skipped when loading so older and newer state can still be read.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use super::vst3::protocol::{Vst3Error, Vst3Result};

pub const PROGRAM_KEY: &str = "__dpf_program__";
pub const STATE_BEGIN_KEY: &str = "__dpf_state_begin__";
pub const STATE_END_KEY: &str = "__dpf_state_end__";
pub const PARAMETERS_BEGIN_KEY: &str = "__dpf_parameters_begin__";
pub const PARAMETERS_END_KEY: &str = "__dpf_parameters_end__";

/// Ends the state blob. Anything after this byte is ignored.
pub const TERMINATOR: u8 = 0xfe;

/// A plain, unnormalized value for a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    F32(f32),
    I32(i32),
}

impl ParamValue {
    pub fn as_f32(&self) -> f32 {
        match *self {
            ParamValue::F32(value) => value,
            ParamValue::I32(value) => value as f32,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::F32(value) => write!(f, "{value}"),
            ParamValue::I32(value) => write!(f, "{value}"),
        }
    }
}

/// A plugin's state so it can be restored at a later point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginState {
    /// The current program, if the plugin has programs.
    pub program: Option<u32>,
    /// The key/value state. Keys are stored in sorted order.
    pub states: BTreeMap<String, String>,
    /// Values for every persisted parameter, keyed by the parameter's symbol.
    pub parameters: Vec<(String, ParamValue)>,
}

/// Which section of the blob is currently being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Nothing has been read yet. This is the only mode where a program may appear.
    Initial,
    /// In between sections.
    None,
    States,
    Parameters,
    /// The parameter section has ended. Anything but the terminator gets ignored.
    Done,
}

/// Serialize a plugin's state to `writer`. A state without a program, states, or parameters is
/// written as a single null byte.
pub fn serialize(state: &PluginState, writer: &mut impl Write) -> std::io::Result<()> {
    if state.program.is_none() && state.states.is_empty() && state.parameters.is_empty() {
        return writer.write_all(b"\0");
    }

    let mut write_field = |field: &str| -> std::io::Result<()> {
        writer.write_all(field.as_bytes())?;
        writer.write_all(b"\0")
    };

    if let Some(program) = state.program {
        write_field(PROGRAM_KEY)?;
        write_field(&program.to_string())?;
    }

    if !state.states.is_empty() {
        write_field(STATE_BEGIN_KEY)?;
        for (key, value) in &state.states {
            write_field(key)?;
            write_field(value)?;
        }
        write_field(STATE_END_KEY)?;
    }

    if !state.parameters.is_empty() {
        write_field(PARAMETERS_BEGIN_KEY)?;
        for (symbol, value) in &state.parameters {
            write_field(symbol)?;
            write_field(&value.to_string())?;
        }
        write_field(PARAMETERS_END_KEY)?;
    }

    writer.write_all(&[TERMINATOR])
}

/// [`serialize()`], but to a byte vector.
pub fn serialize_to_vec(state: &PluginState) -> Vec<u8> {
    let mut buffer = Vec::new();
    // Writing to a `Vec` cannot fail
    let _ = serialize(state, &mut buffer);

    buffer
}

/// Deserialize a state blob from `reader`. `parameter_kind` is called with every parameter symbol
/// found in the blob. It should return `None` if the plugin does not have a persisted parameter
/// with that symbol, in which case the entry is skipped, and `Some(is_integer)` otherwise.
///
/// An empty stream results in [`Vst3Error::InvalidArgument`]. Mismatched section markers result in
/// [`Vst3Error::InternalError`].
pub fn deserialize(
    reader: &mut impl Read,
    parameter_kind: impl Fn(&str) -> Option<bool>,
) -> Vst3Result<PluginState> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).map_err(|err| {
        adapter_debug_assert_failure!("Could not read the state stream: {}", err);
        Vst3Error::InternalError
    })?;
    if buffer.is_empty() {
        return Err(Vst3Error::InvalidArgument);
    }

    let data = match buffer.iter().position(|&b| b == TERMINATOR) {
        Some(terminator_pos) => &buffer[..terminator_pos],
        None => &buffer[..],
    };

    let mut state = PluginState::default();
    let mut mode = Mode::Initial;
    let mut pending_key: Option<String> = None;
    for field in data.split(|&b| b == 0) {
        let field = String::from_utf8_lossy(field);

        let key = match pending_key.take() {
            Some(key) => key,
            None => {
                match field.as_ref() {
                    STATE_BEGIN_KEY => {
                        expect_mode(mode, &[Mode::Initial, Mode::None], STATE_BEGIN_KEY)?;
                        mode = Mode::States;
                    }
                    STATE_END_KEY => {
                        expect_mode(mode, &[Mode::States], STATE_END_KEY)?;
                        mode = Mode::None;
                    }
                    PARAMETERS_BEGIN_KEY => {
                        expect_mode(mode, &[Mode::Initial, Mode::None], PARAMETERS_BEGIN_KEY)?;
                        mode = Mode::Parameters;
                    }
                    PARAMETERS_END_KEY => {
                        expect_mode(mode, &[Mode::Parameters], PARAMETERS_END_KEY)?;
                        mode = Mode::Done;
                    }
                    _ => pending_key = Some(field.to_string()),
                }

                continue;
            }
        };

        // `field` is the value belonging to `key`
        if key == PROGRAM_KEY {
            expect_mode(mode, &[Mode::Initial], PROGRAM_KEY)?;
            mode = Mode::None;

            match field.trim().parse::<i64>() {
                Ok(program) if (0..=u32::MAX as i64).contains(&program) => {
                    state.program = Some(program as u32)
                }
                _ => adapter_warn!("Invalid program '{}' in state, skipping", field),
            }
            continue;
        }

        match mode {
            Mode::States => {
                state.states.insert(key, field.into_owned());
            }
            Mode::Parameters => match parameter_kind(&key) {
                Some(is_integer) => match parse_param_value(&field, is_integer) {
                    Some(value) => state.parameters.push((key, value)),
                    None => adapter_warn!(
                        "Could not parse '{}' as the value for '{}', skipping",
                        field,
                        key
                    ),
                },
                None => adapter_trace!("Skipping unknown parameter '{}' in state", key),
            },
            Mode::Initial | Mode::None | Mode::Done => {
                adapter_trace!("Ignoring stray state field '{}'", key)
            }
        }
    }

    Ok(state)
}

fn expect_mode(mode: Mode, allowed: &[Mode], marker: &str) -> Vst3Result<()> {
    if allowed.contains(&mode) {
        Ok(())
    } else {
        adapter_warn!("Unexpected '{}' in state while in {:?}", marker, mode);
        Err(Vst3Error::InternalError)
    }
}

/// Integer parameters accept fractional values for compatibility and truncate them.
fn parse_param_value(value: &str, is_integer: bool) -> Option<ParamValue> {
    let value = value.trim();
    if is_integer {
        value
            .parse::<i32>()
            .ok()
            .or_else(|| value.parse::<f32>().ok().map(|v| v.trunc() as i32))
            .map(ParamValue::I32)
    } else {
        value.parse::<f32>().ok().map(ParamValue::F32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state() -> PluginState {
        PluginState {
            program: None,
            states: BTreeMap::from([
                ("file".to_owned(), "/tmp/sample.wav".to_owned()),
                ("mode".to_owned(), "fancy".to_owned()),
            ]),
            parameters: vec![
                ("gain".to_owned(), ParamValue::F32(-6.5)),
                ("voices".to_owned(), ParamValue::I32(4)),
            ],
        }
    }

    fn lookup(symbol: &str) -> Option<bool> {
        match symbol {
            "gain" => Some(false),
            "voices" => Some(true),
            _ => None,
        }
    }

    #[test]
    fn layout() {
        let state = PluginState {
            program: Some(2),
            states: BTreeMap::from([("k".to_owned(), "v".to_owned())]),
            parameters: vec![("voices".to_owned(), ParamValue::I32(3))],
        };

        assert_eq!(
            serialize_to_vec(&state),
            b"__dpf_program__\x002\x00__dpf_state_begin__\x00k\x00v\x00__dpf_state_end__\x00\
              __dpf_parameters_begin__\x00voices\x003\x00__dpf_parameters_end__\x00\xfe"
                .to_vec()
        );
    }

    #[test]
    fn empty_state_is_a_single_null() {
        let serialized = serialize_to_vec(&PluginState::default());
        assert_eq!(serialized, b"\0");

        let deserialized = deserialize(&mut serialized.as_slice(), lookup).unwrap();
        assert_eq!(deserialized, PluginState::default());
        assert_eq!(serialize_to_vec(&deserialized), serialized);
    }

    #[test]
    fn round_trip() {
        let state = make_state();
        let serialized = serialize_to_vec(&state);
        let deserialized = deserialize(&mut serialized.as_slice(), lookup).unwrap();

        assert_eq!(deserialized, state);
        assert_eq!(serialize_to_vec(&deserialized), serialized);
    }

    #[test]
    fn round_trip_with_program() {
        let mut state = make_state();
        state.program = Some(7);
        let serialized = serialize_to_vec(&state);
        let deserialized = deserialize(&mut serialized.as_slice(), lookup).unwrap();

        assert_eq!(deserialized.program, Some(7));
        assert_eq!(serialize_to_vec(&deserialized), serialized);
    }

    #[test]
    fn unknown_parameters_are_skipped() {
        let mut state = make_state();
        state
            .parameters
            .insert(1, ("removed_in_v2".to_owned(), ParamValue::F32(1.0)));
        let serialized = serialize_to_vec(&state);
        let deserialized = deserialize(&mut serialized.as_slice(), lookup).unwrap();

        assert_eq!(deserialized, make_state());
    }

    #[test]
    fn integer_parameters_truncate_fractions() {
        let blob = b"__dpf_parameters_begin__\0voices\x003.7\0gain\x000.25\0\
                     __dpf_parameters_end__\0\xfe";
        let deserialized = deserialize(&mut blob.as_slice(), lookup).unwrap();

        assert_eq!(
            deserialized.parameters,
            vec![
                ("voices".to_owned(), ParamValue::I32(3)),
                ("gain".to_owned(), ParamValue::F32(0.25))
            ]
        );
    }

    #[test]
    fn empty_stream_is_invalid() {
        assert_eq!(
            deserialize(&mut &b""[..], lookup),
            Err(Vst3Error::InvalidArgument)
        );
    }

    #[test]
    fn unmatched_end_marker_is_internal_error() {
        let blob = b"__dpf_state_end__\0\xfe";

        assert_eq!(
            deserialize(&mut blob.as_slice(), lookup),
            Err(Vst3Error::InternalError)
        );
    }

    #[test]
    fn program_after_sections_is_internal_error() {
        let blob = b"__dpf_state_begin__\0__dpf_state_end__\0__dpf_program__\x001\0\xfe";

        assert_eq!(
            deserialize(&mut blob.as_slice(), lookup),
            Err(Vst3Error::InternalError)
        );
    }

    #[test]
    fn negative_program_is_skipped() {
        let blob = b"__dpf_program__\0-1\0\xfe";
        let deserialized = deserialize(&mut blob.as_slice(), lookup).unwrap();

        assert_eq!(deserialized.program, None);
    }

    #[test]
    fn data_after_terminator_is_ignored() {
        let blob = b"__dpf_state_begin__\0a\0b\0__dpf_state_end__\0\xfe__dpf_state_end__\0";
        let deserialized = deserialize(&mut blob.as_slice(), lookup).unwrap();

        assert_eq!(deserialized.states.get("a").map(String::as_str), Some("b"));
    }
}
