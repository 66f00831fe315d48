//! The `moduleinfo.json` file that goes in a bundle's `Contents/Resources` directory. Hosts can use
//! this to scan a plugin without loading it.

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::factory::{ClassInfo, FactoryFlags, Module};
use crate::plugin::Plugin;

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Factory Info")]
    pub factory_info: ModuleFactoryInfo,
    /// Class IDs of older plugins this one can replace. Always empty.
    #[serde(rename = "Compatibility")]
    pub compatibility: Vec<serde_json::Value>,
    #[serde(rename = "Classes")]
    pub classes: Vec<ModuleClass>,
}

#[derive(Debug, Serialize)]
pub struct ModuleFactoryInfo {
    #[serde(rename = "Vendor")]
    pub vendor: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "E-Mail")]
    pub email: String,
    #[serde(rename = "Flags")]
    pub flags: ModuleFactoryFlags,
}

#[derive(Debug, Serialize)]
pub struct ModuleFactoryFlags {
    #[serde(rename = "Unicode")]
    pub unicode: bool,
    #[serde(rename = "Classes Discardable")]
    pub classes_discardable: bool,
    #[serde(rename = "Component Non Discardable")]
    pub component_non_discardable: bool,
}

#[derive(Debug, Serialize)]
pub struct ModuleClass {
    #[serde(rename = "CID")]
    pub cid: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Vendor")]
    pub vendor: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "SDKVersion")]
    pub sdk_version: String,
    #[serde(rename = "Sub Categories")]
    pub subcategories: Vec<String>,
    #[serde(rename = "Class Flags")]
    pub class_flags: u32,
    #[serde(rename = "Cardinality")]
    pub cardinality: i32,
    #[serde(rename = "Snapshots")]
    pub snapshots: Vec<serde_json::Value>,
}

impl ModuleInfo {
    /// Gather the module information from a module's factory.
    pub fn new<P: Plugin>(module: &Module<P>) -> Self {
        let factory_info = module.factory_info();

        Self {
            name: P::NAME.to_owned(),
            version: P::VERSION.to_owned(),
            factory_info: ModuleFactoryInfo {
                vendor: factory_info.vendor,
                url: factory_info.url,
                email: factory_info.email,
                flags: ModuleFactoryFlags {
                    unicode: factory_info.flags.contains(FactoryFlags::UNICODE),
                    classes_discardable: factory_info
                        .flags
                        .contains(FactoryFlags::CLASSES_DISCARDABLE),
                    component_non_discardable: factory_info
                        .flags
                        .contains(FactoryFlags::COMPONENT_NON_DISCARDABLE),
                },
            },
            compatibility: Vec::new(),
            classes: module.class_infos().iter().map(ModuleClass::from).collect(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Could not serialize the module info")
    }

    /// Write the module info to `path`, replacing the file if it already exists.
    pub fn write_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        fs::write(path, json).with_context(|| format!("Could not write '{}'", path.display()))
    }
}

impl From<&ClassInfo> for ModuleClass {
    fn from(info: &ClassInfo) -> Self {
        Self {
            cid: info.class_id.iter().map(|byte| format!("{byte:02X}")).collect(),
            category: info.category.to_owned(),
            name: info.name.clone(),
            vendor: info.vendor.clone(),
            version: info.version.clone(),
            sdk_version: info.sdk_version.to_owned(),
            subcategories: info
                .subcategories
                .split('|')
                .filter(|subcategory| !subcategory.is_empty())
                .map(String::from)
                .collect(),
            class_flags: info.class_flags,
            cardinality: info.cardinality,
            snapshots: Vec::new(),
        }
    }
}
