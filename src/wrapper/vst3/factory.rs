//! The plugin factory, and the arena that owns every object the host creates through it. The host
//! refers to objects through [`ObjectHandle`]s and manages their lifetimes with explicit reference
//! counts.

use bitflags::bitflags;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::connection::ConnectionPoint;
use super::interfaces::{Capability, IEditController};
use super::protocol::{Vst3Error, Vst3Result};
use super::view::PluginView;
use super::wrapper::{Wrapper, WrapperRole};
use crate::plugin::{platform_class_id, Plugin};
use crate::wrapper::util::setup_logger;

/// The VST3 SDK version this is roughly based on.
pub const VST3_SDK_VERSION: &str = "VST 3.6.14";

pub const AUDIO_MODULE_CLASS: &str = "Audio Module Class";
pub const COMPONENT_CONTROLLER_CLASS: &str = "Component Controller Class";

/// `kManyInstances`.
pub const MANY_INSTANCES: i32 = 0x7FFF_FFFF;

bitflags! {
    #[derive(Default)]
    pub struct FactoryFlags: i32 {
        const CLASSES_DISCARDABLE = 1 << 0;
        const LICENSE_CHECK = 1 << 1;
        const COMPONENT_NON_DISCARDABLE = 1 << 3;
        const UNICODE = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryInfo {
    pub vendor: String,
    pub url: String,
    pub email: String,
    pub flags: FactoryFlags,
}

/// The information for one class exported by the factory. This combines the fields from
/// `PClassInfo`, `PClassInfo2` and `PClassInfoW`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// The class ID, in the byte order for the current platform.
    pub class_id: [u8; 16],
    pub cardinality: i32,
    pub category: &'static str,
    pub name: String,
    pub class_flags: u32,
    /// The subcategories, separated by pipes.
    pub subcategories: String,
    pub vendor: String,
    pub version: String,
    pub sdk_version: &'static str,
}

/// A stable reference to an object in a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u32);

/// The objects a [`Module`] can hold.
enum ModuleObject<P: Plugin> {
    Wrapper(Arc<Wrapper<P>>),
    View(Arc<PluginView>),
}

// Deriving this would require `P: Clone`
impl<P: Plugin> Clone for ModuleObject<P> {
    fn clone(&self) -> Self {
        match self {
            ModuleObject::Wrapper(wrapper) => ModuleObject::Wrapper(wrapper.clone()),
            ModuleObject::View(view) => ModuleObject::View(view.clone()),
        }
    }
}

impl<P: Plugin> ModuleObject<P> {
    fn supports(&self, capability: Capability) -> bool {
        match self {
            ModuleObject::Wrapper(wrapper) => wrapper.supports(capability),
            ModuleObject::View(_) => matches!(
                capability,
                Capability::Unknown
                    | Capability::PlugView
                    | Capability::PlugViewContentScale
                    | Capability::ConnectionPoint
            ),
        }
    }

    /// Whether anything outside of the arena still refers to this object.
    fn is_referenced_elsewhere(&self) -> bool {
        match self {
            ModuleObject::Wrapper(wrapper) => {
                Arc::strong_count(wrapper) > 1 || wrapper.is_referenced_elsewhere()
            }
            ModuleObject::View(view) => Arc::strong_count(view) > 1,
        }
    }
}

struct Slot<P: Plugin> {
    object: ModuleObject<P>,
    ref_count: u32,
}

/// The plugin module. It exposes the factory, and owns all objects created through it. When an
/// object's reference count drops to zero while something else still refers to it, it is kept
/// around as garbage until those references are gone or until the module is dropped. Dropping the
/// module disconnects everything it still holds.
pub struct Module<P: Plugin> {
    objects: Mutex<BTreeMap<ObjectHandle, Slot<P>>>,
    garbage: Mutex<Vec<ModuleObject<P>>>,
    next_handle: Mutex<u32>,

    _phantom: PhantomData<P>,
}

impl<P: Plugin> Default for Module<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Plugin> Drop for Module<P> {
    fn drop(&mut self) {
        let live = std::mem::take(self.objects.get_mut())
            .into_values()
            .map(|slot| slot.object);
        let garbage = std::mem::take(self.garbage.get_mut());

        // Views go first so they can still disconnect from their controllers
        let (views, wrappers): (Vec<_>, Vec<_>) = live
            .chain(garbage)
            .partition(|object| matches!(object, ModuleObject::View(_)));
        for object in views.into_iter().chain(wrappers) {
            match object {
                ModuleObject::View(view) => view.detach(),
                ModuleObject::Wrapper(wrapper) => wrapper.clear_links(),
            }
        }
    }
}

impl<P: Plugin> Module<P> {
    pub fn new() -> Self {
        setup_logger();

        Self {
            objects: Mutex::new(BTreeMap::new()),
            garbage: Mutex::new(Vec::new()),
            next_handle: Mutex::new(1),

            _phantom: PhantomData,
        }
    }

    pub fn factory_info(&self) -> FactoryInfo {
        FactoryInfo {
            vendor: P::VENDOR.to_owned(),
            url: P::URL.to_owned(),
            email: P::EMAIL.to_owned(),
            flags: FactoryFlags::UNICODE,
        }
    }

    pub fn class_count(&self) -> i32 {
        if P::SEPARATE_CONTROLLER {
            2
        } else {
            1
        }
    }

    pub fn class_info(&self, index: i32) -> Vst3Result<ClassInfo> {
        let (class_id, category) = match index {
            0 => (P::CLASS_ID, AUDIO_MODULE_CLASS),
            1 if P::SEPARATE_CONTROLLER => (P::CONTROLLER_CLASS_ID, COMPONENT_CONTROLLER_CLASS),
            _ => return Err(Vst3Error::InvalidArgument),
        };

        let subcategories = P::SUBCATEGORIES
            .iter()
            .map(|subcategory| subcategory.as_str())
            .collect::<Vec<_>>()
            .join("|");

        Ok(ClassInfo {
            class_id: platform_class_id(class_id),
            cardinality: MANY_INSTANCES,
            category,
            name: P::NAME.to_owned(),
            class_flags: 0,
            subcategories,
            vendor: P::VENDOR.to_owned(),
            version: P::VERSION.to_owned(),
            sdk_version: VST3_SDK_VERSION,
        })
    }

    pub fn class_infos(&self) -> Vec<ClassInfo> {
        (0..self.class_count())
            .filter_map(|index| self.class_info(index).ok())
            .collect()
    }

    /// Create a new component or controller object, and query it for `capability`. The returned
    /// handle starts with a reference count of one.
    pub fn create_instance(
        &self,
        class_id: &[u8; 16],
        capability: Capability,
    ) -> Vst3Result<ObjectHandle> {
        let role = if *class_id == platform_class_id(P::CLASS_ID) {
            WrapperRole::Component
        } else if P::SEPARATE_CONTROLLER && *class_id == platform_class_id(P::CONTROLLER_CLASS_ID) {
            WrapperRole::Controller
        } else {
            adapter_warn!("The host requested an unknown class ID {:02X?}", class_id);
            return Err(Vst3Error::NoInterface);
        };

        let object = ModuleObject::Wrapper(Arc::new(Wrapper::new(role)));
        if !object.supports(capability) {
            return Err(Vst3Error::NoInterface);
        }

        Ok(self.insert(object))
    }

    /// Ask the controller at `controller` for its editor view. The view is connected to the
    /// controller, and gets its own handle with a reference count of one.
    pub fn create_view(&self, controller: ObjectHandle, name: &str) -> Vst3Result<ObjectHandle> {
        let wrapper = self.wrapper(controller)?;
        if !wrapper.supports(Capability::EditController) {
            return Err(Vst3Error::NoInterface);
        }

        let view = wrapper.create_view(name)?;
        Ok(self.insert(ModuleObject::View(view)))
    }

    fn insert(&self, object: ModuleObject<P>) -> ObjectHandle {
        let handle = {
            let mut next_handle = self.next_handle.lock();
            let handle = ObjectHandle(*next_handle);
            *next_handle += 1;

            handle
        };

        self.objects.lock().insert(
            handle,
            Slot {
                object,
                ref_count: 1,
            },
        );

        handle
    }

    fn object(&self, handle: ObjectHandle) -> Vst3Result<ModuleObject<P>> {
        self.objects
            .lock()
            .get(&handle)
            .map(|slot| slot.object.clone())
            .ok_or(Vst3Error::InvalidArgument)
    }

    /// Query an object for another interface. On success the object's reference count is
    /// increased, and the same handle is returned.
    pub fn query_interface(
        &self,
        handle: ObjectHandle,
        capability: Capability,
    ) -> Vst3Result<ObjectHandle> {
        let mut objects = self.objects.lock();
        let slot = objects.get_mut(&handle).ok_or(Vst3Error::InvalidArgument)?;
        if !slot.object.supports(capability) {
            return Err(Vst3Error::NoInterface);
        }

        slot.ref_count += 1;
        Ok(handle)
    }

    pub fn add_ref(&self, handle: ObjectHandle) -> Vst3Result<u32> {
        let mut objects = self.objects.lock();
        let slot = objects.get_mut(&handle).ok_or(Vst3Error::InvalidArgument)?;
        slot.ref_count += 1;

        Ok(slot.ref_count)
    }

    /// Decrease an object's reference count. When it reaches zero the object is removed from the
    /// arena. Views are disconnected from their controller at that point.
    pub fn release(&self, handle: ObjectHandle) -> Vst3Result<u32> {
        let object = {
            let mut objects = self.objects.lock();
            let slot = objects.get_mut(&handle).ok_or(Vst3Error::InvalidArgument)?;
            slot.ref_count -= 1;
            if slot.ref_count > 0 {
                return Ok(slot.ref_count);
            }

            match objects.remove(&handle) {
                Some(slot) => slot.object,
                None => return Err(Vst3Error::InternalError),
            }
        };

        if let ModuleObject::View(view) = &object {
            view.detach();
        }

        if object.is_referenced_elsewhere() {
            adapter_trace!("Keeping {:?} around until its last reference is gone", handle);
            self.garbage.lock().push(object);
        }

        Ok(0)
    }

    /// The current reference count for an object, if it is still alive.
    pub fn ref_count(&self, handle: ObjectHandle) -> Option<u32> {
        self.objects.lock().get(&handle).map(|slot| slot.ref_count)
    }

    /// The number of released objects that are still referenced elsewhere.
    pub fn garbage_count(&self) -> usize {
        self.garbage.lock().len()
    }

    /// Drop released objects that are no longer referenced, and return how many remain.
    pub fn collect_garbage(&self) -> usize {
        let mut garbage = self.garbage.lock();
        garbage.retain(|object| object.is_referenced_elsewhere());

        garbage.len()
    }

    /// The component or controller object behind a handle.
    pub fn wrapper(&self, handle: ObjectHandle) -> Vst3Result<Arc<Wrapper<P>>> {
        match self.object(handle)? {
            ModuleObject::Wrapper(wrapper) => Ok(wrapper),
            ModuleObject::View(_) => Err(Vst3Error::NoInterface),
        }
    }

    pub fn view(&self, handle: ObjectHandle) -> Vst3Result<Arc<PluginView>> {
        match self.object(handle)? {
            ModuleObject::View(view) => Ok(view),
            ModuleObject::Wrapper(_) => Err(Vst3Error::NoInterface),
        }
    }

    /// The connection point exposed by an object.
    pub fn connection_point(&self, handle: ObjectHandle) -> Vst3Result<Arc<dyn ConnectionPoint>> {
        let object = self.object(handle)?;
        if !object.supports(Capability::ConnectionPoint) {
            return Err(Vst3Error::NoInterface);
        }

        Ok(match object {
            ModuleObject::Wrapper(wrapper) => wrapper.connection_point(),
            ModuleObject::View(view) => view as Arc<dyn ConnectionPoint>,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffers;
    use crate::context::process::ProcessContext;
    use crate::midi::MidiEvent;
    use crate::wrapper::vst3::interfaces::IPluginBase;
    use crate::wrapper::vst3::subcategories::Vst3SubCategory;

    #[derive(Default)]
    struct Split;

    impl Plugin for Split {
        const NAME: &'static str = "Split";
        const VENDOR: &'static str = "Tests";
        const URL: &'static str = "https://example.com";
        const EMAIL: &'static str = "tests@example.com";
        const VERSION: &'static str = "1.2.3";
        const CLASS_ID: [u8; 16] = *b"SplitSplitSplitS";
        const SUBCATEGORIES: &'static [Vst3SubCategory] =
            &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
        const SEPARATE_CONTROLLER: bool = true;

        fn run(&mut self, _: &mut AudioBuffers, _: &[MidiEvent], _: &mut dyn ProcessContext) {}
    }

    #[test]
    fn class_infos() {
        let module = Module::<Split>::new();
        let infos = module.class_infos();

        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].category, AUDIO_MODULE_CLASS);
        assert_eq!(infos[0].subcategories, "Fx|Delay");
        assert_eq!(infos[1].category, COMPONENT_CONTROLLER_CLASS);
        assert_eq!(
            infos[1].class_id,
            platform_class_id(Split::CONTROLLER_CLASS_ID)
        );
        assert_eq!(module.class_info(2), Err(Vst3Error::InvalidArgument));
        assert!(module.factory_info().flags.contains(FactoryFlags::UNICODE));
    }

    #[test]
    fn capabilities_per_object() {
        let module = Module::<Split>::new();
        let component_id = platform_class_id(Split::CLASS_ID);
        let controller_id = platform_class_id(Split::CONTROLLER_CLASS_ID);

        assert_eq!(
            module.create_instance(&component_id, Capability::EditController),
            Err(Vst3Error::NoInterface)
        );
        assert_eq!(
            module.create_instance(&[0; 16], Capability::Component),
            Err(Vst3Error::NoInterface)
        );

        let component = module
            .create_instance(&component_id, Capability::Component)
            .unwrap();
        let controller = module
            .create_instance(&controller_id, Capability::EditController)
            .unwrap();
        assert_eq!(
            module.query_interface(controller, Capability::AudioProcessor),
            Err(Vst3Error::NoInterface)
        );
        assert_eq!(
            module.query_interface(component, Capability::ConnectionPoint),
            Ok(component)
        );
        assert_eq!(module.ref_count(component), Some(2));
    }

    #[test]
    fn released_objects_become_garbage_while_connected() {
        let module = Module::<Split>::new();
        let component = module
            .create_instance(&platform_class_id(Split::CLASS_ID), Capability::Component)
            .unwrap();
        let controller = module
            .create_instance(
                &platform_class_id(Split::CONTROLLER_CLASS_ID),
                Capability::EditController,
            )
            .unwrap();
        module.wrapper(component).unwrap().initialize().unwrap();
        module.wrapper(controller).unwrap().initialize().unwrap();

        let component_point = module.connection_point(component).unwrap();
        let controller_point = module.connection_point(controller).unwrap();
        component_point.connect(controller_point.clone()).unwrap();
        controller_point.connect(component_point.clone()).unwrap();
        drop((component_point, controller_point));

        // The controller still refers to the component's connection point
        assert_eq!(module.release(component), Ok(0));
        assert_eq!(module.ref_count(component), None);
        assert_eq!(module.garbage_count(), 1);
        assert_eq!(module.collect_garbage(), 1);

        module.wrapper(controller).unwrap().terminate().unwrap();
        assert_eq!(module.collect_garbage(), 0);
        assert_eq!(module.release(controller), Ok(0));
        assert_eq!(module.garbage_count(), 0);
    }
}
