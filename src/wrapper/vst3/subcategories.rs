//! Subcategories for the component class. Hosts may use these to organize plugins.

use std::fmt::Write;

/// The maximum length of the joined subcategory string, not counting the terminator.
pub const MAX_SUBCATEGORIES_LEN: usize = 127;

/// A subcategory for the plugin's component class. Multiple subcategories are concatenated to a
/// string separated by pipe characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vst3SubCategory {
    // Every plugin should have at least one of these
    Fx,
    Instrument,
    Spatial,
    // Optional
    Analyzer,
    Delay,
    Distortion,
    Drum,
    Dynamics,
    Eq,
    External,
    Filter,
    Generator,
    Mastering,
    Modulation,
    Network,
    Piano,
    PitchShift,
    Restoration,
    Reverb,
    Sampler,
    Synth,
    Tools,
    UpDownmix,
    // Channel configuration hints
    Mono,
    Stereo,
    Surround,
    Ambisonics,
    /// A non-predefined subcategory. This may not contain pipe characters.
    Custom(&'static str),
}

impl Vst3SubCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vst3SubCategory::Fx => "Fx",
            Vst3SubCategory::Instrument => "Instrument",
            Vst3SubCategory::Spatial => "Spatial",
            Vst3SubCategory::Analyzer => "Analyzer",
            Vst3SubCategory::Delay => "Delay",
            Vst3SubCategory::Distortion => "Distortion",
            Vst3SubCategory::Drum => "Drum",
            Vst3SubCategory::Dynamics => "Dynamics",
            Vst3SubCategory::Eq => "EQ",
            Vst3SubCategory::External => "External",
            Vst3SubCategory::Filter => "Filter",
            Vst3SubCategory::Generator => "Generator",
            Vst3SubCategory::Mastering => "Mastering",
            Vst3SubCategory::Modulation => "Modulation",
            Vst3SubCategory::Network => "Network",
            Vst3SubCategory::Piano => "Piano",
            Vst3SubCategory::PitchShift => "Pitch Shift",
            Vst3SubCategory::Restoration => "Restoration",
            Vst3SubCategory::Reverb => "Reverb",
            Vst3SubCategory::Sampler => "Sampler",
            Vst3SubCategory::Synth => "Synth",
            Vst3SubCategory::Tools => "Tools",
            Vst3SubCategory::UpDownmix => "Up-Downmix",
            Vst3SubCategory::Mono => "Mono",
            Vst3SubCategory::Stereo => "Stereo",
            Vst3SubCategory::Surround => "Surround",
            Vst3SubCategory::Ambisonics => "Ambisonics",
            Vst3SubCategory::Custom(s) => {
                adapter_debug_assert!(
                    !s.contains('|'),
                    "'{}' contains a pipe character ('|'), which is not allowed",
                    s
                );

                s
            }
        }
    }
}

/// Join subcategories with pipe characters, truncating the result to
/// [`MAX_SUBCATEGORIES_LEN`] bytes on a character boundary.
pub fn join_subcategories(subcategories: &[Vst3SubCategory]) -> String {
    let mut joined = String::new();
    for (i, subcategory) in subcategories.iter().enumerate() {
        if i > 0 {
            joined.push('|');
        }
        let _ = write!(joined, "{}", subcategory.as_str());
    }

    if joined.len() > MAX_SUBCATEGORIES_LEN {
        adapter_warn!("The subcategory string '{joined}' is too long and will be truncated");

        let mut end = MAX_SUBCATEGORIES_LEN;
        while !joined.is_char_boundary(end) {
            end -= 1;
        }
        joined.truncate(end);
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join() {
        assert_eq!(
            join_subcategories(&[
                Vst3SubCategory::Fx,
                Vst3SubCategory::PitchShift,
                Vst3SubCategory::Stereo
            ]),
            "Fx|Pitch Shift|Stereo"
        );
        assert_eq!(join_subcategories(&[]), "");
    }

    #[test]
    fn join_truncates() {
        let long = Vst3SubCategory::Custom(
            "This is a remarkably long custom subcategory that keeps going well past what the host \
             is willing to accept in a single class info",
        );
        let joined = join_subcategories(&[Vst3SubCategory::Instrument, long]);

        assert_eq!(joined.len(), MAX_SUBCATEGORIES_LEN);
        assert!(joined.starts_with("Instrument|This is"));
    }
}
