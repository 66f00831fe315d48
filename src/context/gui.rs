//! A context passed to a plugin's editor.

/// Callbacks the plugin's editor can make when the user interacts with its GUI such as updating
/// parameter values. This is passed to the editor during
/// [`Editor::spawn()`][crate::editor::Editor::spawn()]. All of these functions assume they're being
/// called from the host's GUI thread.
///
/// Parameters are addressed by their plain 0-based index, and values are plain values.
pub trait GuiContext: Send + Sync + 'static {
    /// Inform the host that the user starts changing a parameter. Must be matched with a call to
    /// [`end_edit()`][Self::end_edit()].
    fn begin_edit(&self, index: u32);

    /// Set a parameter's plain value. This is forwarded to both the host and the plugin.
    fn set_parameter_value(&self, index: u32, plain: f32);

    /// Inform the host that the user stopped changing a parameter.
    fn end_edit(&self, index: u32);

    /// Change a state value. The new value is sent to the processing side of the plugin.
    fn set_state(&self, key: &str, value: &str);

    /// Send a note to the plugin. A velocity of zero sends a note off. Notes sent this way reach
    /// the plugin at the start of a future block.
    fn send_note(&self, channel: u8, note: u8, velocity: u8);

    /// Ask the host to resize the editor window. This returns false if the host rejected the
    /// resize, in which case the window should keep its old size.
    fn request_resize(&self, width: u32, height: u32) -> bool;
}
