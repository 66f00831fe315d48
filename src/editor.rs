//! Traits for working with plugin editors.

use raw_window_handle::{HasRawWindowHandle, RawWindowHandle};
use std::any::Any;
use std::ffi::c_void;
use std::sync::Arc;

use crate::context::gui::GuiContext;

/// The platform type strings the host may pass when attaching a view.
pub const PLATFORM_TYPE_X11: &str = "X11EmbedWindowID";
pub const PLATFORM_TYPE_HWND: &str = "HWND";
pub const PLATFORM_TYPE_NSVIEW: &str = "NSView";

/// An editor for a [`Plugin`][crate::plugin::Plugin]. The adapter only drives the editor; creating
/// windows, drawing, and handling input is entirely up to the implementation. All functions are
/// called from the host's GUI thread.
pub trait Editor: Send + Sync {
    /// Create an instance of the plugin's editor and embed it in the parent window. Parameter and
    /// state changes made by the user should be sent through `context`.
    ///
    /// This function should return a handle to the editor, which will be dropped when the editor
    /// gets closed. Implement the [`Drop`] trait on the returned handle if you need to explicitly
    /// handle the editor's closing behavior.
    ///
    /// If [`set_scale_factor()`][Self::set_scale_factor()] has been called, then any created
    /// windows should have their sizes multiplied by that factor.
    ///
    /// The adapter guarantees that a previous handle has been dropped before this function is
    /// called again.
    fn spawn(
        &self,
        parent: ParentWindowHandle,
        context: Arc<dyn GuiContext>,
    ) -> Box<dyn Any + Send>;

    /// Returns the (current) size of the editor in pixels as a `(width, height)` pair.
    fn size(&self) -> (u32, u32);

    /// Set the DPI scaling factor, if supported. Returns whether the editor accepted it.
    fn set_scale_factor(&self, factor: f32) -> bool;

    /// The editor's sizing constraints. Used when the host asks whether a size is acceptable.
    fn geometry_constraints(&self) -> GeometryConstraints {
        GeometryConstraints::default()
    }

    /// Whether the host is allowed to resize the editor.
    fn can_resize(&self) -> bool {
        false
    }

    /// Called when the host resized the editor's window.
    fn set_size(&self, _width: u32, _height: u32) {}

    /// Called periodically from the host's GUI thread.
    fn idle(&self) {}

    /// Called whenever a parameter's plain value has changed while the editor is open.
    fn parameter_changed(&self, index: u32, value: f32);

    /// Called when the host or the plugin loaded a program.
    fn program_loaded(&self, _index: u32) {}

    /// Called when a state value has changed.
    fn state_changed(&self, _key: &str, _value: &str) {}

    /// Called when the sample rate has changed.
    fn sample_rate_changed(&self, _sample_rate: f64) {}
}

/// Constraints on the editor's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryConstraints {
    pub min_width: u32,
    pub min_height: u32,
    /// Keep the aspect ratio of the minimum size when resizing.
    pub keep_aspect_ratio: bool,
}

/// A raw window handle for platform and GUI framework agnostic editors. This implements
/// [`HasRawWindowHandle`] so it can be used directly with GUI libraries that use the same
/// [`raw_window_handle`] version.
#[derive(Debug, Clone, Copy)]
pub enum ParentWindowHandle {
    /// The ID of the host's parent window. Used with X11.
    X11Window(u32),
    /// A handle to the host's parent window. Used only on macOS.
    AppKitNsView(*mut c_void),
    /// A handle to the host's parent window. Used only on Windows.
    Win32Hwnd(*mut c_void),
}

impl ParentWindowHandle {
    /// Interpret the host's parent handle according to the platform type string it passed along.
    /// Returns `None` for unsupported platform types.
    pub fn from_platform_type(platform_type: &str, parent: *mut c_void) -> Option<Self> {
        match platform_type {
            PLATFORM_TYPE_X11 => Some(ParentWindowHandle::X11Window(parent as usize as u32)),
            PLATFORM_TYPE_HWND => Some(ParentWindowHandle::Win32Hwnd(parent)),
            PLATFORM_TYPE_NSVIEW => Some(ParentWindowHandle::AppKitNsView(parent)),
            _ => None,
        }
    }
}

unsafe impl HasRawWindowHandle for ParentWindowHandle {
    fn raw_window_handle(&self) -> RawWindowHandle {
        match *self {
            ParentWindowHandle::X11Window(window) => {
                let mut handle = raw_window_handle::XcbWindowHandle::empty();
                handle.window = window;
                RawWindowHandle::Xcb(handle)
            }
            ParentWindowHandle::AppKitNsView(ns_view) => {
                let mut handle = raw_window_handle::AppKitWindowHandle::empty();
                handle.ns_view = ns_view;
                RawWindowHandle::AppKit(handle)
            }
            ParentWindowHandle::Win32Hwnd(hwnd) => {
                let mut handle = raw_window_handle::Win32WindowHandle::empty();
                handle.hwnd = hwnd;
                RawWindowHandle::Win32(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_types() {
        let parent = 0x1234usize as *mut c_void;

        assert!(matches!(
            ParentWindowHandle::from_platform_type("X11EmbedWindowID", parent),
            Some(ParentWindowHandle::X11Window(0x1234))
        ));
        assert!(matches!(
            ParentWindowHandle::from_platform_type("HWND", parent),
            Some(ParentWindowHandle::Win32Hwnd(_))
        ));
        assert!(ParentWindowHandle::from_platform_type("UIView", parent).is_none());
    }

    #[test]
    fn x11_raw_handle() {
        let handle = ParentWindowHandle::X11Window(42);

        match handle.raw_window_handle() {
            RawWindowHandle::Xcb(handle) => assert_eq!(handle.window, 42),
            _ => panic!("Expected an XCB handle"),
        }
    }
}
