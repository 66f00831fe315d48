use atomic_float::AtomicF32;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::connection::{ConnectionPoint, Link};
use super::context::WrapperGuiContext;
use super::message::{Message, MessageId, RouteTarget};
use super::param_ids::{InternalParameter, ParameterIdSpace, ParameterKind};
use super::protocol::{PlugFrame, ViewRect, Vst3Error, Vst3Result};
use crate::editor::{Editor, GeometryConstraints, ParentWindowHandle};

/// The parts of a view that the editor's [`GuiContext`][crate::context::gui::GuiContext] also
/// needs access to.
pub(crate) struct ViewShared {
    /// The view's end of its connection with the controller.
    pub link: Link,
    pub param_ids: ParameterIdSpace,
    /// The frame passed by the host in [`PluginView::set_frame()`].
    pub frame: RwLock<Option<Arc<dyn PlugFrame>>>,
    /// Set in `on_size()`, cleared on the next timer tick.
    pub resizing_from_host: AtomicBool,
    /// Set while a resize requested by the editor is being handled by the host, cleared on the
    /// next timer tick.
    pub resizing_from_plugin: AtomicBool,
    /// Whether the controller sent `ready` and is waiting for the next `idle`.
    pub ready: AtomicBool,
}

/// The view object created through the controller's `create_view()`. The editor is spawned when
/// the host attaches the view to a window, and everything it does goes over the view's connection
/// to the controller.
pub struct PluginView {
    shared: Arc<ViewShared>,
    editor: Box<dyn Editor>,
    editor_handle: Mutex<Option<Box<dyn Any + Send>>>,

    /// The DPI scaling factor set by the host. Sizes reported to and received from the host are
    /// scaled by this factor, while the editor only deals in logical pixels.
    scale_factor: AtomicF32,
}

impl PluginView {
    pub(crate) fn new(editor: Box<dyn Editor>, param_ids: ParameterIdSpace) -> Self {
        Self {
            shared: Arc::new(ViewShared {
                link: Link::new(),
                param_ids,
                frame: RwLock::new(None),
                resizing_from_host: AtomicBool::new(false),
                resizing_from_plugin: AtomicBool::new(false),
                ready: AtomicBool::new(false),
            }),
            editor,
            editor_handle: Mutex::new(None),
            scale_factor: AtomicF32::new(1.0),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.editor_handle.lock().is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.is_connected()
    }

    /// Disconnect from the controller on both ends. Called when the host releases its last
    /// reference to the view.
    pub(crate) fn detach(self: &Arc<Self>) {
        if let Some(remote) = self.shared.link.remote() {
            let this: Arc<dyn ConnectionPoint> = self.clone();
            if let Err(err) = remote.disconnect(&this) {
                adapter_warn!("Could not disconnect the view from the controller: {}", err);
            }
        }

        self.shared.link.clear();
        self.shared.ready.store(false, Ordering::SeqCst);
        *self.shared.frame.write() = None;
    }

    fn send(&self, message: Message) {
        if let Err(err) = self.shared.link.send(&message) {
            adapter_warn!("Could not send '{}' to the controller: {}", message.id(), err);
        }
    }

    fn scaled(&self, width: u32, height: u32) -> ViewRect {
        let scale_factor = self.scale_factor.load(Ordering::Relaxed);
        ViewRect::new(
            (width as f32 * scale_factor).round() as i32,
            (height as f32 * scale_factor).round() as i32,
        )
    }

    pub fn is_platform_type_supported(&self, platform_type: &str) -> Vst3Result<()> {
        match ParentWindowHandle::from_platform_type(platform_type, std::ptr::null_mut()) {
            Some(_) => Ok(()),
            None => Err(Vst3Error::ResultFalse),
        }
    }

    /// Spawn the editor inside of `parent`. If the view is already connected to the controller,
    /// this also asks the controller for the current state.
    pub fn attached(&self, parent: *mut c_void, platform_type: &str) -> Vst3Result<()> {
        {
            let mut editor_handle = self.editor_handle.lock();
            if editor_handle.is_some() {
                adapter_warn!("The host tried to attach the editor while it was already attached");
                return Err(Vst3Error::ResultFalse);
            }

            let parent = match ParentWindowHandle::from_platform_type(platform_type, parent) {
                Some(parent) => parent,
                None => {
                    adapter_warn!("Unsupported platform type '{}'", platform_type);
                    return Err(Vst3Error::ResultFalse);
                }
            };

            let context = Arc::new(WrapperGuiContext {
                shared: self.shared.clone(),
            });
            *editor_handle = Some(self.editor.spawn(parent, context));
        }

        if self.is_connected() {
            self.send(Message::init());
        }

        Ok(())
    }

    pub fn removed(&self) -> Vst3Result<()> {
        let handle = match self.editor_handle.lock().take() {
            Some(handle) => handle,
            None => {
                adapter_warn!("The host tried to remove the editor without an active editor");
                return Err(Vst3Error::ResultFalse);
            }
        };

        self.shared.ready.store(false, Ordering::SeqCst);
        if self.is_connected() {
            self.send(Message::close());
        }
        drop(handle);

        Ok(())
    }

    pub fn get_size(&self) -> ViewRect {
        let (width, height) = self.editor.size();
        self.scaled(width, height)
    }

    /// The host resized the window. Ignored while the host is still handling a resize requested
    /// by the editor.
    pub fn on_size(&self, new_size: ViewRect) -> Vst3Result<()> {
        if self.shared.resizing_from_plugin.load(Ordering::SeqCst) {
            adapter_trace!(
                "Ignoring a {}x{} resize while a resize from the editor is active",
                new_size.width(),
                new_size.height()
            );
            return Ok(());
        }
        if new_size.width() <= 0 || new_size.height() <= 0 {
            return Err(Vst3Error::InvalidArgument);
        }

        self.shared.resizing_from_host.store(true, Ordering::SeqCst);
        let scale_factor = self.scale_factor.load(Ordering::Relaxed);
        self.editor.set_size(
            (new_size.width() as f32 / scale_factor).round() as u32,
            (new_size.height() as f32 / scale_factor).round() as u32,
        );

        Ok(())
    }

    pub fn set_frame(&self, frame: Option<Arc<dyn PlugFrame>>) {
        *self.shared.frame.write() = frame;
    }

    pub fn can_resize(&self) -> Vst3Result<()> {
        if self.editor.can_resize() {
            Ok(())
        } else {
            Err(Vst3Error::ResultFalse)
        }
    }

    /// Adjust `rect` so it satisfies the editor's minimum size and aspect ratio.
    pub fn check_size_constraint(&self, rect: &mut ViewRect) -> Vst3Result<()> {
        let GeometryConstraints {
            min_width,
            min_height,
            keep_aspect_ratio,
        } = self.editor.geometry_constraints();
        let min_size = self.scaled(min_width, min_height);

        apply_geometry_constraints(
            min_size.width(),
            min_size.height(),
            keep_aspect_ratio,
            rect,
        );

        Ok(())
    }

    pub fn set_content_scale_factor(&self, factor: f32) -> Vst3Result<()> {
        if self.scale_factor.load(Ordering::Relaxed) == factor {
            return Ok(());
        }

        if self.editor.set_scale_factor(factor) {
            self.scale_factor.store(factor, Ordering::Relaxed);
            Ok(())
        } else {
            Err(Vst3Error::ResultFalse)
        }
    }

    /// The host's periodic timer. Asks the controller for new data once it is ready for more.
    pub fn on_timer(&self) {
        self.editor.idle();

        if self.shared.ready.swap(false, Ordering::SeqCst) {
            self.send(Message::idle());
        }

        self.shared.resizing_from_host.store(false, Ordering::SeqCst);
        self.shared.resizing_from_plugin.store(false, Ordering::SeqCst);
    }

    fn handle_parameter_set(&self, message: &Message) -> Vst3Result<()> {
        let (id, plain) = message.parameter_set_args()?;

        match self.shared.param_ids.from_protocol_id(id) {
            ParameterKind::Plugin(index) => self.editor.parameter_changed(index, plain as f32),
            ParameterKind::Internal(InternalParameter::SampleRate) => {
                if plain < 0.0 {
                    return Err(Vst3Error::InvalidArgument);
                }

                self.editor.sample_rate_changed(plain);
            }
            ParameterKind::Internal(InternalParameter::Program) => {
                if plain < 0.0 {
                    return Err(Vst3Error::InvalidArgument);
                }

                self.editor.program_loaded((plain + 0.5) as u32);
            }
            ParameterKind::Internal(_) => (),
            ParameterKind::MidiCc { .. } | ParameterKind::Invalid => {
                return Err(Vst3Error::InvalidArgument)
            }
        }

        Ok(())
    }
}

impl ConnectionPoint for PluginView {
    fn connect(&self, other: Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        self.shared.link.connect(other)?;
        if self.is_attached() {
            self.send(Message::init());
        }

        Ok(())
    }

    fn disconnect(&self, other: &Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        if self.is_connected() && self.is_attached() {
            self.send(Message::close());
        }
        self.shared.ready.store(false, Ordering::SeqCst);

        self.shared.link.disconnect(other)
    }

    fn notify(&self, message: &Message) -> Vst3Result<()> {
        if message.target()? != RouteTarget::View {
            adapter_warn!("Message '{}' arrived at the view", message.id());
            return Err(Vst3Error::InternalError);
        }

        match message.message_id() {
            Some(MessageId::Ready) => {
                if self.shared.ready.swap(true, Ordering::SeqCst) {
                    adapter_warn!("Received 'ready' while already ready");
                    return Err(Vst3Error::InternalError);
                }

                Ok(())
            }
            Some(MessageId::ParameterSet) => self.handle_parameter_set(message),
            Some(MessageId::StateSet) => {
                let (key, value) = message.state_set_args()?;
                self.editor.state_changed(&key, &value);

                Ok(())
            }
            _ => {
                adapter_trace!("Unhandled view message '{}'", message.id());
                Err(Vst3Error::NotImplemented)
            }
        }
    }
}

/// Grow `rect` to the minimum size, after fixing its aspect ratio if needed.
fn apply_geometry_constraints(
    min_width: i32,
    min_height: i32,
    keep_aspect_ratio: bool,
    rect: &mut ViewRect,
) {
    let (mut width, mut height) = (rect.width(), rect.height());

    if keep_aspect_ratio && min_width > 0 && min_height > 0 && height > 0 {
        let ratio = min_width as f64 / min_height as f64;
        let requested_ratio = width as f64 / height as f64;

        if (ratio - requested_ratio).abs() > f64::EPSILON {
            if requested_ratio > ratio {
                width = (height as f64 * ratio + 0.5) as i32;
            } else {
                height = (width as f64 / ratio + 0.5) as i32;
            }
        }
    }

    rect.right = rect.left + width.max(min_width);
    rect.bottom = rect.top + height.max(min_height);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::gui::GuiContext;
    use crate::wrapper::vst3::param_ids::AdapterConfig;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct RecordingEditor {
        spawned: AtomicU32,
        idles: AtomicU32,
        last_parameter: Mutex<Option<(u32, f32)>>,
        last_program: Mutex<Option<u32>>,
    }

    impl Editor for Arc<RecordingEditor> {
        fn spawn(
            &self,
            _parent: ParentWindowHandle,
            _context: Arc<dyn GuiContext>,
        ) -> Box<dyn Any + Send> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            Box::new(())
        }

        fn size(&self) -> (u32, u32) {
            (200, 100)
        }

        fn set_scale_factor(&self, _factor: f32) -> bool {
            true
        }

        fn geometry_constraints(&self) -> GeometryConstraints {
            GeometryConstraints {
                min_width: 200,
                min_height: 100,
                keep_aspect_ratio: true,
            }
        }

        fn idle(&self) {
            self.idles.fetch_add(1, Ordering::SeqCst);
        }

        fn parameter_changed(&self, index: u32, value: f32) {
            *self.last_parameter.lock() = Some((index, value));
        }

        fn program_loaded(&self, index: u32) {
            *self.last_program.lock() = Some(index);
        }
    }

    fn make_view() -> (PluginView, Arc<RecordingEditor>, ParameterIdSpace) {
        let config = AdapterConfig {
            separate_controller: false,
            wants_latency: false,
            wants_midi_input: false,
            wants_midi_output: false,
            wants_transport: false,
            has_ui: true,
            program_count: 3,
            parameter_count: 4,
        };
        let param_ids = ParameterIdSpace::new(&config);
        let editor = Arc::new(RecordingEditor::default());

        (
            PluginView::new(Box::new(editor.clone()), param_ids),
            editor,
            param_ids,
        )
    }

    #[test]
    fn attach_and_remove() {
        let (view, editor, _) = make_view();
        let parent = 1usize as *mut c_void;

        assert_eq!(
            view.attached(parent, "UIView"),
            Err(Vst3Error::ResultFalse)
        );
        assert_eq!(view.attached(parent, "X11EmbedWindowID"), Ok(()));
        assert_eq!(
            view.attached(parent, "X11EmbedWindowID"),
            Err(Vst3Error::ResultFalse)
        );
        assert_eq!(editor.spawned.load(Ordering::SeqCst), 1);

        assert_eq!(view.removed(), Ok(()));
        assert_eq!(view.removed(), Err(Vst3Error::ResultFalse));
    }

    #[test]
    fn parameter_messages_reach_the_editor() {
        let (view, editor, param_ids) = make_view();

        let id = param_ids.to_protocol_id(2).unwrap();
        view.notify(&Message::parameter_set(RouteTarget::View, id, 0.25))
            .unwrap();
        assert_eq!(*editor.last_parameter.lock(), Some((2, 0.25)));

        let program_id = param_ids.internal_id(InternalParameter::Program).unwrap();
        view.notify(&Message::parameter_set(RouteTarget::View, program_id, 1.9))
            .unwrap();
        assert_eq!(*editor.last_program.lock(), Some(2));

        assert_eq!(
            view.notify(&Message::parameter_set(RouteTarget::Controller, id, 0.5)),
            Err(Vst3Error::InternalError)
        );
    }

    #[test]
    fn ready_is_cleared_by_the_timer() {
        let (view, editor, _) = make_view();

        view.notify(&Message::ready()).unwrap();
        assert_eq!(view.notify(&Message::ready()), Err(Vst3Error::InternalError));

        // Not connected, so the idle message is dropped
        view.on_timer();
        assert_eq!(editor.idles.load(Ordering::SeqCst), 1);
        assert_eq!(view.notify(&Message::ready()), Ok(()));
    }

    #[test]
    fn host_resizes_are_ignored_during_plugin_resizes() {
        let (view, _, _) = make_view();

        view.shared.resizing_from_plugin.store(true, Ordering::SeqCst);
        view.on_size(ViewRect::new(400, 200)).unwrap();
        assert!(!view.shared.resizing_from_host.load(Ordering::SeqCst));

        view.on_timer();
        view.on_size(ViewRect::new(400, 200)).unwrap();
        assert!(view.shared.resizing_from_host.load(Ordering::SeqCst));
    }

    #[test]
    fn size_constraints() {
        let (view, _, _) = make_view();

        let mut rect = ViewRect::new(100, 20);
        view.check_size_constraint(&mut rect).unwrap();
        assert_eq!(rect, ViewRect::new(200, 100));

        // Too wide for a 2:1 ratio, so the width follows the height
        let mut rect = ViewRect::new(900, 300);
        view.check_size_constraint(&mut rect).unwrap();
        assert_eq!(rect, ViewRect::new(600, 300));

        view.set_content_scale_factor(2.0).unwrap();
        assert_eq!(view.get_size(), ViewRect::new(400, 200));
        let mut rect = ViewRect::new(300, 150);
        view.check_size_constraint(&mut rect).unwrap();
        assert_eq!(rect, ViewRect::new(400, 200));
    }
}
