//! General utilities.

/// Temporarily allow allocations within `func` if the adapter was configured with the
/// `assert_process_allocs` feature.
#[cfg(all(debug_assertions, feature = "assert_process_allocs"))]
pub fn permit_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    assert_no_alloc::permit_alloc(func)
}

/// Temporarily allow allocations within `func` if the adapter was configured with the
/// `assert_process_allocs` feature.
#[cfg(not(all(debug_assertions, feature = "assert_process_allocs")))]
pub fn permit_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    func()
}

/// Convert a normalized `[0, 1]` value to a 7-bit MIDI data byte. Values are truncated, not rounded.
#[inline]
pub fn normalized_to_midi_7bit(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 127.0) as u8
}

/// Convert a normalized `[0, 1]` value to a 14-bit MIDI value, returned as an `(lsb, msb)` pair.
#[inline]
pub fn normalized_to_midi_14bit(value: f64) -> (u8, u8) {
    let value = (value.clamp(0.0, 1.0) * 16383.0) as u16;
    ((value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8)
}
