//! Connection points. The host connects the processing object's connection point to the
//! controller's when they are separate instances, and the controller connects its view connection
//! point to every view it creates. Messages carry a routing tag, and a point that is not the final
//! recipient forwards the message unchanged.

use parking_lot::Mutex;
use std::sync::Arc;

use super::message::{Message, MessageId, RouteTarget};
use super::protocol::{Vst3Error, Vst3Result};
use super::wrapper::Instance;
use crate::plugin::Plugin;

/// The protocol's `IConnectionPoint`. Only ever called from the message context.
pub trait ConnectionPoint: Send + Sync {
    /// Connect to `other`. Fails if this point is already connected.
    fn connect(&self, other: Arc<dyn ConnectionPoint>) -> Vst3Result<()>;

    /// Disconnect from `other`. Fails if this point is not connected to `other`.
    fn disconnect(&self, other: &Arc<dyn ConnectionPoint>) -> Vst3Result<()>;

    /// Deliver a message to this point.
    fn notify(&self, message: &Message) -> Vst3Result<()>;
}

/// One end of a connection: the remote point this end is connected to, if any.
#[derive(Default)]
pub struct Link {
    remote: Mutex<Option<Arc<dyn ConnectionPoint>>>,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.remote.lock().is_some()
    }

    pub fn connect(&self, other: Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        let mut remote = self.remote.lock();
        if remote.is_some() {
            adapter_warn!("Connection point is already connected");
            return Err(Vst3Error::InvalidArgument);
        }

        *remote = Some(other);
        Ok(())
    }

    pub fn disconnect(&self, other: &Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        let mut remote = self.remote.lock();
        match &*remote {
            Some(current) if same_point(current, other) => {
                *remote = None;
                Ok(())
            }
            Some(_) => {
                adapter_warn!("Tried to disconnect a connection point that is not connected here");
                Err(Vst3Error::InvalidArgument)
            }
            None => Err(Vst3Error::InvalidArgument),
        }
    }

    /// Drop the remote without any checks. Used when the owning object goes away.
    pub fn clear(&self) {
        *self.remote.lock() = None;
    }

    /// The remote point. The lock is released before the caller gets to use it, so sending a
    /// message never holds it.
    pub fn remote(&self) -> Option<Arc<dyn ConnectionPoint>> {
        self.remote.lock().clone()
    }

    /// Send a message to the remote point.
    pub fn send(&self, message: &Message) -> Vst3Result<()> {
        match self.remote() {
            Some(remote) => remote.notify(message),
            None => Err(Vst3Error::NotInitialized),
        }
    }
}

/// Whether two points are the same object. Only the data pointer is compared, since vtable
/// pointers for the same type are not guaranteed to be unique.
pub fn same_point(a: &Arc<dyn ConnectionPoint>, b: &Arc<dyn ConnectionPoint>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// The connection point between the processing object and the controller in separate controller
/// mode. Both sides use this type. Only messages meant for the processing side are accepted.
pub struct ComponentConnection<P: Plugin> {
    instance: Arc<Instance<P>>,
}

impl<P: Plugin> ComponentConnection<P> {
    pub(crate) fn new(instance: Arc<Instance<P>>) -> Self {
        Self { instance }
    }
}

impl<P: Plugin> ConnectionPoint for ComponentConnection<P> {
    fn connect(&self, other: Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        self.instance.comp_link.connect(other)
    }

    fn disconnect(&self, other: &Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        self.instance.comp_link.disconnect(other)
    }

    fn notify(&self, message: &Message) -> Vst3Result<()> {
        let inner = self.instance.inner()?;
        if !self.instance.comp_link.is_connected() {
            return Err(Vst3Error::NotInitialized);
        }

        match message.target()? {
            RouteTarget::Processor => inner.handle_processor_message(message),
            target => {
                adapter_warn!(
                    "Message '{}' for {:?} arrived at the processing side",
                    message.id(),
                    target
                );
                Err(Vst3Error::InternalError)
            }
        }
    }
}

/// The controller's connection point towards its views. Messages from the view meant for the
/// controller are handled here, messages meant for the processing side are handed to it, and
/// messages meant for the view are passed on to the connected view.
pub struct ViewConnection<P: Plugin> {
    instance: Arc<Instance<P>>,
}

impl<P: Plugin> ViewConnection<P> {
    pub(crate) fn new(instance: Arc<Instance<P>>) -> Self {
        Self { instance }
    }
}

impl<P: Plugin> ConnectionPoint for ViewConnection<P> {
    fn connect(&self, other: Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        self.instance.view_link.connect(other)?;
        if let Ok(inner) = self.instance.inner() {
            inner.set_ui_connected(false);
        }

        Ok(())
    }

    fn disconnect(&self, other: &Arc<dyn ConnectionPoint>) -> Vst3Result<()> {
        self.instance.view_link.disconnect(other)?;
        if let Ok(inner) = self.instance.inner() {
            inner.set_ui_connected(false);
        }

        Ok(())
    }

    fn notify(&self, message: &Message) -> Vst3Result<()> {
        let inner = self.instance.inner()?;
        let view = self
            .instance
            .view_link
            .remote()
            .ok_or(Vst3Error::NotInitialized)?;

        let target = message.target()?;
        if target == RouteTarget::Processor && !inner.is_ui_connected() {
            adapter_warn!("Received '{}' before 'init'", message.id());
            return Err(Vst3Error::InternalError);
        }

        match target {
            RouteTarget::Controller => inner.handle_controller_message(message),
            RouteTarget::View => view.notify(message),
            RouteTarget::Processor if inner.config.separate_controller => {
                match message.message_id() {
                    Some(MessageId::Midi | MessageId::StateSet) => {}
                    _ => return Err(Vst3Error::NotImplemented),
                }

                match self.instance.comp_link.remote() {
                    Some(processor) => processor.notify(message),
                    None => {
                        adapter_warn!(
                            "Dropping '{}', the processing side is not connected",
                            message.id()
                        );
                        Err(Vst3Error::InternalError)
                    }
                }
            }
            RouteTarget::Processor => inner.handle_processor_message(message),
        }
    }
}
