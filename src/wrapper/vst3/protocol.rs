//! Typed representations of the protocol's values: result codes, bus and parameter metadata,
//! speaker arrangements, and the host-side interfaces the adapter calls back into.

use bitflags::bitflags;
use std::fmt;

/// The result code for success.
pub const RESULT_OK: i32 = 0;

/// Protocol result codes other than success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vst3Error {
    /// The object does not support the queried capability.
    NoInterface,
    /// The call was valid, but the request was not honored.
    ResultFalse,
    /// The caller passed malformed or out-of-range input.
    InvalidArgument,
    /// A feature the adapter does not support.
    NotImplemented,
    /// Internally inconsistent data or a protocol state violation.
    InternalError,
    /// The call arrived before `initialize()` or after `terminate()`.
    NotInitialized,
    /// A fixed capacity buffer is full.
    OutOfMemory,
}

impl Vst3Error {
    /// The numeric `tresult` value.
    pub fn code(&self) -> i32 {
        match self {
            Vst3Error::NoInterface => -1,
            Vst3Error::ResultFalse => 1,
            Vst3Error::InvalidArgument => 2,
            Vst3Error::NotImplemented => 3,
            Vst3Error::InternalError => 4,
            Vst3Error::NotInitialized => 5,
            Vst3Error::OutOfMemory => 6,
        }
    }
}

impl fmt::Display for Vst3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Vst3Error::NoInterface => "interface not supported",
            Vst3Error::ResultFalse => "request not honored",
            Vst3Error::InvalidArgument => "invalid argument",
            Vst3Error::NotImplemented => "not implemented",
            Vst3Error::InternalError => "internal error",
            Vst3Error::NotInitialized => "not initialized",
            Vst3Error::OutOfMemory => "out of memory",
        };

        write!(f, "{description} ({})", self.code())
    }
}

impl std::error::Error for Vst3Error {}

pub type Vst3Result<T> = Result<T, Vst3Error>;

/// Fold a result into the `tresult` the host sees.
pub fn to_tresult(result: Vst3Result<()>) -> i32 {
    match result {
        Ok(()) => RESULT_OK,
        Err(err) => err.code(),
    }
}

/// A fixed size UTF-16 string buffer as used in the protocol's info structs.
pub type String128 = [u16; 128];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Main,
    Aux,
}

bitflags! {
    #[derive(Default)]
    pub struct BusFlags: u32 {
        const DEFAULT_ACTIVE = 1 << 0;
        const IS_CONTROL_VOLTAGE = 1 << 1;
    }
}

/// Information about a single bus, as returned from `getBusInfo()`.
#[derive(Debug, Clone, PartialEq)]
pub struct BusInfo {
    pub media_type: MediaType,
    pub direction: BusDirection,
    pub channel_count: i32,
    pub name: String128,
    pub bus_type: BusType,
    pub flags: BusFlags,
}

/// Used by the unsupported routing info query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingInfo {
    pub media_type: MediaType,
    pub bus_index: i32,
    pub channel: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Simple,
    Advanced,
    OfflineProcessing,
}

/// A bit set of speakers.
pub type SpeakerArrangement = u64;

/// Speaker bits.
pub mod speakers {
    use super::SpeakerArrangement;

    pub const L: SpeakerArrangement = 1 << 0;
    pub const R: SpeakerArrangement = 1 << 1;
    pub const C: SpeakerArrangement = 1 << 2;
    pub const LFE: SpeakerArrangement = 1 << 3;
    pub const LS: SpeakerArrangement = 1 << 4;
    pub const RS: SpeakerArrangement = 1 << 5;
    pub const LC: SpeakerArrangement = 1 << 6;
    pub const RC: SpeakerArrangement = 1 << 7;
    pub const CS: SpeakerArrangement = 1 << 8;
    pub const SL: SpeakerArrangement = 1 << 9;
    pub const SR: SpeakerArrangement = 1 << 10;
    pub const M: SpeakerArrangement = 1 << 19;

    pub const EMPTY: SpeakerArrangement = 0;
    pub const MONO: SpeakerArrangement = M;
    pub const STEREO: SpeakerArrangement = L | R;
}

bitflags! {
    #[derive(Default)]
    pub struct ParamFlags: i32 {
        const CAN_AUTOMATE = 1 << 0;
        const IS_READ_ONLY = 1 << 1;
        const IS_WRAP_AROUND = 1 << 2;
        const IS_LIST = 1 << 3;
        const IS_HIDDEN = 1 << 4;
        const IS_PROGRAM_CHANGE = 1 << 15;
        const IS_BYPASS = 1 << 16;
    }
}

/// The root unit every parameter belongs to.
pub const ROOT_UNIT_ID: i32 = 0;

/// Information about a single parameter, as returned from `getParameterInfo()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub id: u32,
    pub title: String128,
    pub short_title: String128,
    pub units: String128,
    pub step_count: i32,
    pub default_normalized_value: f64,
    pub unit_id: i32,
    pub flags: ParamFlags,
}

impl Default for ParamInfo {
    fn default() -> Self {
        Self {
            id: 0,
            title: [0; 128],
            short_title: [0; 128],
            units: [0; 128],
            step_count: 0,
            default_normalized_value: 0.0,
            unit_id: ROOT_UNIT_ID,
            flags: ParamFlags::empty(),
        }
    }
}

bitflags! {
    /// Flags for `IComponentHandler::restartComponent()`.
    #[derive(Default)]
    pub struct RestartFlags: i32 {
        const RELOAD_COMPONENT = 1 << 0;
        const IO_CHANGED = 1 << 1;
        const PARAM_VALUES_CHANGED = 1 << 2;
        const LATENCY_CHANGED = 1 << 3;
        const PARAM_TITLES_CHANGED = 1 << 4;
    }
}

bitflags! {
    /// The transport fields the plugin wants the host to provide.
    #[derive(Default)]
    pub struct ProcessContextRequirements: u32 {
        const NEED_SYSTEM_TIME = 1 << 0;
        const NEED_CONTINUOUS_TIME_SAMPLES = 1 << 1;
        const NEED_PROJECT_TIME_MUSIC = 1 << 2;
        const NEED_BAR_POSITION_MUSIC = 1 << 3;
        const NEED_CYCLE_MUSIC = 1 << 4;
        const NEED_SAMPLES_TO_NEXT_CLOCK = 1 << 5;
        const NEED_TEMPO = 1 << 6;
        const NEED_TIME_SIGNATURE = 1 << 7;
        const NEED_CHORD = 1 << 8;
        const NEED_FRAME_RATE = 1 << 9;
        const NEED_TRANSPORT_STATE = 1 << 10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Realtime,
    Prefetch,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicSampleSize {
    Sample32,
    Sample64,
}

/// The argument to `setupProcessing()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSetup {
    pub process_mode: ProcessMode,
    pub symbolic_sample_size: SymbolicSampleSize,
    pub max_samples_per_block: i32,
    pub sample_rate: f64,
}

/// A rectangle in the host's coordinates, used for view sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ViewRect {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// The host's component handler, used to report parameter edits made from the controller side.
pub trait ComponentHandler: Send + Sync {
    fn begin_edit(&self, id: u32) -> Vst3Result<()>;
    fn perform_edit(&self, id: u32, normalized: f64) -> Vst3Result<()>;
    fn end_edit(&self, id: u32) -> Vst3Result<()>;
    fn restart_component(&self, flags: RestartFlags) -> Vst3Result<()>;
}

/// The host's frame around a view, used for plugin-initiated resizes.
pub trait PlugFrame: Send + Sync {
    fn resize_view(&self, new_size: ViewRect) -> Vst3Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes() {
        assert_eq!(to_tresult(Ok(())), 0);
        assert_eq!(to_tresult(Err(Vst3Error::NotImplemented)), 3);
        assert_eq!(Vst3Error::NoInterface.code(), -1);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            Vst3Error::InvalidArgument.to_string(),
            "invalid argument (2)"
        );
    }

    #[test]
    fn view_rect_size() {
        let rect = ViewRect::new(640, 480);

        assert_eq!(rect.width(), 640);
        assert_eq!(rect.height(), 480);
    }
}
