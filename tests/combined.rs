use approx::assert_relative_eq;
use std::fs;

use vst3_adapter::midi::MIDI_CONTROLLERS_PER_CHANNEL;
use vst3_adapter::wrapper::vst3::process_data::{AudioBusBuffers, ParameterChanges, ProcessData};
use vst3_adapter::wrapper::vst3::protocol::{BusDirection, MediaType, SymbolicSampleSize};
use vst3_adapter::wrapper::vst3::{
    Capability, IAudioProcessor, IComponent, IEditController, IMidiMapping, IPluginBase, Module,
    ModuleInfo, Vst3Error,
};

mod common;

use common::{create_instances, Effect, Synth};

#[test]
fn calls_before_initialize() {
    let module = Module::<Effect>::new();
    let class_id = module.class_infos()[0].class_id;
    let handle = module
        .create_instance(&class_id, Capability::Component)
        .unwrap();
    let component = module.wrapper(handle).unwrap();

    assert_eq!(component.parameter_count(), 0);
    assert_eq!(component.bus_count(MediaType::Audio, BusDirection::Input), 0);
    assert_eq!(
        component.bus_info(MediaType::Audio, BusDirection::Input, 0),
        Err(Vst3Error::NotInitialized)
    );
    assert_eq!(component.terminate(), Err(Vst3Error::InvalidArgument));

    component.initialize().unwrap();
    assert_eq!(component.initialize(), Err(Vst3Error::InvalidArgument));
    assert_eq!(component.bus_count(MediaType::Audio, BusDirection::Input), 1);
    assert_eq!(component.bus_count(MediaType::Event, BusDirection::Input), 1);
    assert_eq!(component.bus_count(MediaType::Event, BusDirection::Output), 0);

    component.terminate().unwrap();
    assert_eq!(component.parameter_info(0), Err(Vst3Error::NotInitialized));
}

#[test]
fn a_single_object_implements_everything() {
    let module = Module::<Effect>::new();
    let (component, controller) = create_instances(&module);
    assert!(controller.is_none());
    assert_eq!(module.class_count(), 1);

    for capability in [
        Capability::Component,
        Capability::AudioProcessor,
        Capability::EditController,
        Capability::MidiMapping,
    ] {
        assert_eq!(module.query_interface(component, capability), Ok(component));
    }
    assert_eq!(
        module.query_interface(component, Capability::ConnectionPoint),
        Err(Vst3Error::NoInterface)
    );
    assert_eq!(
        module.query_interface(component, Capability::PlugView),
        Err(Vst3Error::NoInterface)
    );

    let wrapper = module.wrapper(component).unwrap();
    assert_eq!(wrapper.controller_class_id(), Err(Vst3Error::NotImplemented));
    assert_eq!(
        wrapper.can_process_sample_size(SymbolicSampleSize::Sample64),
        Err(Vst3Error::ResultFalse)
    );
    assert_eq!(wrapper.create_view("editor").err(), Some(Vst3Error::NoInterface));
}

#[test]
fn midi_controller_automation_becomes_midi() {
    let module = Module::<Effect>::new();
    let (component, _) = create_instances(&module);
    let wrapper = module.wrapper(component).unwrap();

    let cc_id = wrapper.midi_controller_assignment(0, 2, 7).unwrap();
    assert_eq!(
        wrapper.midi_controller_assignment(1, 2, 7),
        Err(Vst3Error::ResultFalse)
    );
    assert_eq!(
        wrapper.midi_controller_assignment(0, 16, 7),
        Err(Vst3Error::ResultFalse)
    );
    assert_eq!(
        wrapper.midi_controller_assignment(0, 0, MIDI_CONTROLLERS_PER_CHANNEL as i16),
        Err(Vst3Error::ResultFalse)
    );

    let gain_id = wrapper.parameter_count() as u32 - 1;
    let mut data = ProcessData::new(64);
    data.inputs = vec![AudioBusBuffers {
        silence_flags: 0,
        channels: vec![vec![0.5; 64], vec![-0.5; 64]],
    }];
    data.outputs = vec![AudioBusBuffers::new(2, 64)];
    let mut changes = ParameterChanges::new();
    changes.add_parameter_data(cc_id).add_point(10, 1.0);
    changes.add_parameter_data(gain_id).add_point(0, 1.0);
    data.input_parameter_changes = Some(changes);

    wrapper.process(&mut data).unwrap();

    // A gain of 2 was applied before the block was processed
    assert_eq!(data.outputs[0].channels[0], vec![1.0; 64]);
    assert_eq!(data.outputs[0].channels[1], vec![-1.0; 64]);
    assert_relative_eq!(wrapper.param_normalized(gain_id), 1.0);
    assert_relative_eq!(wrapper.normalized_param_to_plain(gain_id, 1.0), 2.0);
}

#[test]
fn state_restores_into_a_new_instance() {
    let module = Module::<Effect>::new();
    let (source_handle, _) = create_instances(&module);
    let (target_handle, _) = create_instances(&module);
    let source = module.wrapper(source_handle).unwrap();
    let target = module.wrapper(target_handle).unwrap();

    let gain_id = source.parameter_count() as u32 - 1;
    let mut data = ProcessData::new(8);
    let mut changes = ParameterChanges::new();
    changes.add_parameter_data(gain_id).add_point(0, 0.25);
    data.input_parameter_changes = Some(changes);
    source.process(&mut data).unwrap();

    let mut blob = Vec::new();
    IComponent::get_state(&*source, &mut blob).unwrap();
    IComponent::set_state(&*target, &mut blob.as_slice()).unwrap();
    assert_relative_eq!(target.param_normalized(gain_id), 0.25);

    // Without a separate controller the component state is not applied twice
    assert_eq!(target.set_component_state(&mut [0u8; 0].as_slice()), Ok(()));
    assert_eq!(
        IComponent::set_state(&*target, &mut [0u8; 0].as_slice()),
        Err(Vst3Error::InvalidArgument)
    );
}

#[test]
fn module_info_file() {
    let module = Module::<Synth>::new();
    let path = std::env::temp_dir().join(format!(
        "vst3_adapter_moduleinfo_{}.json",
        std::process::id()
    ));

    ModuleInfo::new(&module).write_to(&path).unwrap();
    let contents = fs::read_to_string(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value["Name"], "Test Synth");
    assert_eq!(value["Factory Info"]["Vendor"], "Adapter Tests");

    let classes = value["Classes"].as_array().unwrap();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0]["Category"], "Audio Module Class");
    assert_eq!(classes[1]["Category"], "Component Controller Class");
    let cid: String = module.class_infos()[0]
        .class_id
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect();
    assert_eq!(classes[0]["CID"], cid.as_str());

    assert!(ModuleInfo::new(&module)
        .write_to(std::env::temp_dir().join("missing_directory/moduleinfo.json"))
        .is_err());
}
