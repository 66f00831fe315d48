//! The VST3 object model. A [`Module`] acts as the plugin factory and owns the component,
//! controller, and view objects the host creates through it. The host talks to those objects
//! through the interface traits in [`interfaces`].

pub mod buses;
pub mod connection;
mod context;
mod events;
pub mod factory;
mod inner;
pub mod interfaces;
pub mod message;
pub mod module_info;
pub mod param_ids;
pub mod process_data;
pub mod protocol;
pub mod subcategories;
pub mod view;
pub mod wrapper;

pub use connection::ConnectionPoint;
pub use factory::{ClassInfo, FactoryInfo, Module, ObjectHandle};
pub use interfaces::{
    Capability, IAudioProcessor, IComponent, IEditController, IMidiMapping, IPluginBase,
    IProcessContextRequirements,
};
pub use message::{Message, MessageId, RouteTarget};
pub use module_info::ModuleInfo;
pub use protocol::{Vst3Error, Vst3Result};
pub use view::PluginView;
pub use wrapper::{Wrapper, WrapperRole, EDITOR_VIEW_NAME};
