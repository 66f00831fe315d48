//! Messages sent between the processing object, the controller, and the view. A message is a short
//! ID string together with an ordered attribute list. Every message carries a routing tag naming
//! its final recipient so intermediate hops know whether to handle or forward it.

use widestring::{U16Str, U16String};

use super::protocol::{Vst3Error, Vst3Result};

/// The attribute holding the routing tag.
pub const TARGET_ATTRIBUTE: &str = "__dpf_msg_target__";

const PARAMETER_ID_ATTRIBUTE: &str = "rindex";
const STARTED_ATTRIBUTE: &str = "started";
const VALUE_ATTRIBUTE: &str = "value";
const KEY_ATTRIBUTE: &str = "key";
const KEY_LENGTH_ATTRIBUTE: &str = "key:length";
const VALUE_LENGTH_ATTRIBUTE: &str = "value:length";
const DATA_ATTRIBUTE: &str = "data";

/// The message IDs the adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    /// Sent by the view once connected. The controller answers with the full state followed by
    /// `ready`.
    Init,
    /// Sent by the view once it has processed the last batch of changes. The controller answers
    /// with whatever changed since followed by `ready`.
    Idle,
    /// The start or end of a parameter gesture in the view.
    ParameterEdit,
    /// A parameter's plain value, in either direction.
    ParameterSet,
    /// A single state key/value pair, in either direction.
    StateSet,
    /// A single three byte MIDI message sent from the view to the processing object.
    Midi,
    /// The controller is done sending changes.
    Ready,
    /// The view is going away.
    Close,
}

impl MessageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageId::Init => "init",
            MessageId::Idle => "idle",
            MessageId::ParameterEdit => "parameter-edit",
            MessageId::ParameterSet => "parameter-set",
            MessageId::StateSet => "state-set",
            MessageId::Midi => "midi",
            MessageId::Ready => "ready",
            MessageId::Close => "close",
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        Some(match id {
            "init" => MessageId::Init,
            "idle" => MessageId::Idle,
            "parameter-edit" => MessageId::ParameterEdit,
            "parameter-set" => MessageId::ParameterSet,
            "state-set" => MessageId::StateSet,
            "midi" => MessageId::Midi,
            "ready" => MessageId::Ready,
            "close" => MessageId::Close,
            _ => return None,
        })
    }
}

/// The final recipient of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Controller = 1,
    View = 2,
    Processor = 3,
}

impl RouteTarget {
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(RouteTarget::Controller),
            2 => Some(RouteTarget::View),
            3 => Some(RouteTarget::Processor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    String(U16String),
    Binary(Vec<u8>),
}

/// An ordered name to value map. Setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeList {
    entries: Vec<(String, AttributeValue)>,
}

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, name: &str, value: AttributeValue) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name.to_owned(), value)),
        }
    }

    /// The value for `name`, or [`Vst3Error::ResultFalse`] if it is not set.
    pub fn get(&self, name: &str) -> Vst3Result<&AttributeValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .ok_or(Vst3Error::ResultFalse)
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.set(name, AttributeValue::Int(value));
    }

    pub fn set_float(&mut self, name: &str, value: f64) {
        self.set(name, AttributeValue::Float(value));
    }

    pub fn set_string(&mut self, name: &str, value: &str) {
        self.set(name, AttributeValue::String(U16String::from_str(value)));
    }

    pub fn set_binary(&mut self, name: &str, value: &[u8]) {
        self.set(name, AttributeValue::Binary(value.to_vec()));
    }

    pub fn get_int(&self, name: &str) -> Vst3Result<i64> {
        match self.get(name)? {
            AttributeValue::Int(value) => Ok(*value),
            _ => Err(Vst3Error::ResultFalse),
        }
    }

    pub fn get_float(&self, name: &str) -> Vst3Result<f64> {
        match self.get(name)? {
            AttributeValue::Float(value) => Ok(*value),
            _ => Err(Vst3Error::ResultFalse),
        }
    }

    /// Read up to `max_len` UTF-16 code units of a string attribute.
    pub fn get_string(&self, name: &str, max_len: usize) -> Vst3Result<String> {
        match self.get(name)? {
            AttributeValue::String(value) => {
                let units = value.as_slice();
                let len = units.len().min(max_len);

                Ok(U16Str::from_slice(&units[..len]).to_string_lossy())
            }
            _ => Err(Vst3Error::ResultFalse),
        }
    }

    pub fn get_binary(&self, name: &str) -> Vst3Result<&[u8]> {
        match self.get(name)? {
            AttributeValue::Binary(value) => Ok(value),
            _ => Err(Vst3Error::ResultFalse),
        }
    }
}

/// A message sent through a connection point.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: String,
    attributes: AttributeList,
}

impl Message {
    /// Create a message with an arbitrary ID and no attributes.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            attributes: AttributeList::new(),
        }
    }

    fn routed(id: MessageId, target: RouteTarget) -> Self {
        let mut message = Self::new(id.as_str());
        message
            .attributes
            .set_int(TARGET_ATTRIBUTE, target as i64);

        message
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parsed message ID, if the adapter knows it.
    pub fn message_id(&self) -> Option<MessageId> {
        MessageId::parse(&self.id)
    }

    pub fn attributes(&self) -> &AttributeList {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeList {
        &mut self.attributes
    }

    /// The routing tag. Missing tags are reported as they are by the attribute list, and unknown
    /// tags are an internal error.
    pub fn target(&self) -> Vst3Result<RouteTarget> {
        let raw = self.attributes.get_int(TARGET_ATTRIBUTE)?;
        RouteTarget::from_raw(raw).ok_or(Vst3Error::InternalError)
    }

    pub fn init() -> Self {
        Self::routed(MessageId::Init, RouteTarget::Controller)
    }

    pub fn idle() -> Self {
        Self::routed(MessageId::Idle, RouteTarget::Controller)
    }

    pub fn close() -> Self {
        Self::routed(MessageId::Close, RouteTarget::Controller)
    }

    pub fn ready() -> Self {
        Self::routed(MessageId::Ready, RouteTarget::View)
    }

    /// The start (`started == true`) or end of a gesture for a parameter, by protocol ID.
    pub fn parameter_edit(id: u32, started: bool) -> Self {
        let mut message = Self::routed(MessageId::ParameterEdit, RouteTarget::Controller);
        message
            .attributes
            .set_int(PARAMETER_ID_ATTRIBUTE, id as i64);
        message
            .attributes
            .set_int(STARTED_ATTRIBUTE, started as i64);

        message
    }

    /// A plain parameter value, by protocol ID.
    pub fn parameter_set(target: RouteTarget, id: u32, plain: f64) -> Self {
        let mut message = Self::routed(MessageId::ParameterSet, target);
        message
            .attributes
            .set_int(PARAMETER_ID_ATTRIBUTE, id as i64);
        message.attributes.set_float(VALUE_ATTRIBUTE, plain);

        message
    }

    /// A state key/value pair. The lengths are sent along explicitly.
    pub fn state_set(target: RouteTarget, key: &str, value: &str) -> Self {
        let mut message = Self::routed(MessageId::StateSet, target);
        let attributes = &mut message.attributes;
        attributes.set_int(KEY_LENGTH_ATTRIBUTE, key.encode_utf16().count() as i64);
        attributes.set_int(VALUE_LENGTH_ATTRIBUTE, value.encode_utf16().count() as i64);
        attributes.set_string(KEY_ATTRIBUTE, key);
        attributes.set_string(VALUE_ATTRIBUTE, value);

        message
    }

    pub fn midi(data: [u8; 3]) -> Self {
        let mut message = Self::routed(MessageId::Midi, RouteTarget::Processor);
        message.attributes.set_binary(DATA_ATTRIBUTE, &data);

        message
    }

    /// The protocol ID and whether the gesture started, for `parameter-edit`.
    pub fn parameter_edit_args(&self) -> Vst3Result<(u32, bool)> {
        let id = self.parameter_id()?;
        match self.attributes.get_int(STARTED_ATTRIBUTE)? {
            0 => Ok((id, false)),
            1 => Ok((id, true)),
            _ => Err(Vst3Error::InternalError),
        }
    }

    /// The protocol ID and plain value, for `parameter-set`.
    pub fn parameter_set_args(&self) -> Vst3Result<(u32, f64)> {
        Ok((
            self.parameter_id()?,
            self.attributes.get_float(VALUE_ATTRIBUTE)?,
        ))
    }

    /// The key and value, for `state-set`.
    pub fn state_set_args(&self) -> Vst3Result<(String, String)> {
        let key_length = self.attributes.get_int(KEY_LENGTH_ATTRIBUTE)?;
        let value_length = self.attributes.get_int(VALUE_LENGTH_ATTRIBUTE)?;
        if key_length < 0 || value_length < 0 {
            return Err(Vst3Error::InternalError);
        }

        let key = self
            .attributes
            .get_string(KEY_ATTRIBUTE, key_length as usize)?;
        let value = if value_length == 0 {
            String::new()
        } else {
            self.attributes
                .get_string(VALUE_ATTRIBUTE, value_length as usize)?
        };

        Ok((key, value))
    }

    /// The raw MIDI bytes, for `midi`.
    pub fn midi_data(&self) -> Vst3Result<&[u8]> {
        self.attributes.get_binary(DATA_ATTRIBUTE)
    }

    fn parameter_id(&self) -> Vst3Result<u32> {
        let id = self.attributes.get_int(PARAMETER_ID_ATTRIBUTE)?;
        u32::try_from(id).map_err(|_| Vst3Error::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids() {
        for id in [
            MessageId::Init,
            MessageId::Idle,
            MessageId::ParameterEdit,
            MessageId::ParameterSet,
            MessageId::StateSet,
            MessageId::Midi,
            MessageId::Ready,
            MessageId::Close,
        ] {
            assert_eq!(MessageId::parse(id.as_str()), Some(id));
        }

        assert_eq!(MessageId::parse("reload"), None);
    }

    #[test]
    fn missing_attribute_is_false() {
        let attributes = AttributeList::new();

        assert_eq!(attributes.get_int("rindex"), Err(Vst3Error::ResultFalse));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut attributes = AttributeList::new();
        attributes.set_int("a", 1);
        attributes.set_float("b", 2.0);
        attributes.set_int("a", 3);

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes.get_int("a"), Ok(3));
        assert_eq!(attributes.get_int("b"), Err(Vst3Error::ResultFalse));
    }

    #[test]
    fn parameter_set_args() {
        let message = Message::parameter_set(RouteTarget::View, 12, 0.75);

        assert_eq!(message.message_id(), Some(MessageId::ParameterSet));
        assert_eq!(message.target(), Ok(RouteTarget::View));
        assert_eq!(message.parameter_set_args(), Ok((12, 0.75)));
    }

    #[test]
    fn parameter_edit_args() {
        assert_eq!(
            Message::parameter_edit(4, true).parameter_edit_args(),
            Ok((4, true))
        );

        let mut message = Message::parameter_edit(4, false);
        message.attributes_mut().set_int("started", 2);
        assert_eq!(message.parameter_edit_args(), Err(Vst3Error::InternalError));
    }

    #[test]
    fn state_set_with_empty_value() {
        let message = Message::state_set(RouteTarget::Processor, "file", "");

        assert_eq!(
            message.state_set_args(),
            Ok((String::from("file"), String::new()))
        );
    }

    #[test]
    fn state_set_uses_lengths() {
        let mut message = Message::state_set(RouteTarget::View, "name", "värde");
        message.attributes_mut().set_int("value:length", 3);

        assert_eq!(
            message.state_set_args(),
            Ok((String::from("name"), String::from("vär")))
        );
    }

    #[test]
    fn unknown_target() {
        let mut message = Message::idle();
        message.attributes_mut().set_int(TARGET_ATTRIBUTE, 9);

        assert_eq!(message.target(), Err(Vst3Error::InternalError));
        assert_eq!(Message::new("idle").target(), Err(Vst3Error::ResultFalse));
    }
}
