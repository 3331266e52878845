//! Zip package deployment: private container plus a block blob whose signed
//! URL the app service runs from

use super::base::Core;
use super::types;
use crate::error::Result;
use crate::model::StackSettings;
use crate::naming::Names;
use weatherdeck_cloud::{Input, OutputRef, ResourceDecl, ResourceGraph, ResourceId};

pub(super) struct Package {
    pub blob: ResourceId,
}

impl Package {
    pub fn signed_url(&self) -> OutputRef {
        OutputRef::new(self.blob.clone(), "signed_url")
    }
}

pub(super) fn declare(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    names: &Names,
    core: &Core,
) -> Result<Package> {
    let container = ResourceDecl::new(types::STORAGE_CONTAINER, names.storage_container())
        .input("name", names.storage_container().to_lowercase())
        .input("account_name", core.storage_account_name())
        .input("resource_group", core.resource_group_name())
        .input("public_access", "off");

    let blob = ResourceDecl::new(types::STORAGE_BLOB, names.storage_blob())
        .input("name", names.storage_blob().to_lowercase())
        .input("container_name", container.output("name"))
        .input("account_name", core.storage_account_name())
        .input("resource_group", core.resource_group_name())
        .input("blob_type", "block")
        .input("source", Input::Archive(settings.archive.clone()));

    graph.add(container)?;
    Ok(Package {
        blob: graph.add(blob)?,
    })
}
