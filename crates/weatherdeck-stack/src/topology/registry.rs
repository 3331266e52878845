//! Container registry and the application image built into it

use super::base::Core;
use super::types;
use crate::error::Result;
use crate::model::StackSettings;
use crate::naming::{IMAGE_REPOSITORY, Names};
use weatherdeck_cloud::{Input, OutputRef, ResourceDecl, ResourceGraph, ResourceId};

pub(super) struct Registry {
    pub registry: ResourceId,
    pub image: ResourceId,
}

impl Registry {
    pub fn name(&self) -> OutputRef {
        OutputRef::new(self.registry.clone(), "name")
    }

    pub fn login_server(&self) -> OutputRef {
        OutputRef::new(self.registry.clone(), "login_server")
    }

    pub fn username(&self) -> OutputRef {
        OutputRef::new(self.registry.clone(), "admin_username")
    }

    pub fn password(&self) -> OutputRef {
        OutputRef::new(self.registry.clone(), "admin_password")
    }

    /// Digest-pinned reference of the built image
    pub fn image_ref(&self) -> OutputRef {
        OutputRef::new(self.image.clone(), "image_ref")
    }
}

pub(super) fn declare(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    names: &Names,
    core: &Core,
) -> Result<Registry> {
    let acr = ResourceDecl::new(types::CONTAINER_REGISTRY, names.logical("acr"))
        .input("name", names.registry()?)
        .input("resource_group", core.resource_group_name())
        .input("location", core.location.as_str())
        .input("sku", "Basic")
        .input("admin_enabled", true);

    let image = ResourceDecl::new(types::CONTAINER_IMAGE, names.logical("image"))
        .input("registry", acr.output("name"))
        .input("login_server", acr.output("login_server"))
        .input("repository", IMAGE_REPOSITORY)
        .input("tag", settings.image_tag())
        .input("context", Input::Archive(settings.context.clone()));

    Ok(Registry {
        registry: graph.add(acr)?,
        image: graph.add(image)?,
    })
}
