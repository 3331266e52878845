//! Resources shared by every variant

use super::types;
use crate::error::Result;
use crate::model::StackSettings;
use crate::naming::{Names, TABLE_NAME};
use weatherdeck_cloud::{OutputRef, ResourceDecl, ResourceGraph, ResourceId};

pub(super) struct Core {
    pub resource_group: ResourceId,
    pub storage_account: ResourceId,
    pub table: ResourceId,
    pub insights: ResourceId,
    pub location: String,
}

impl Core {
    pub fn resource_group_name(&self) -> OutputRef {
        OutputRef::new(self.resource_group.clone(), "name")
    }

    pub fn storage_account_name(&self) -> OutputRef {
        OutputRef::new(self.storage_account.clone(), "name")
    }

    pub fn storage_connection_string(&self) -> OutputRef {
        OutputRef::new(self.storage_account.clone(), "primary_connection_string")
    }

    pub fn table_name(&self) -> OutputRef {
        OutputRef::new(self.table.clone(), "name")
    }

    pub fn instrumentation_key(&self) -> OutputRef {
        OutputRef::new(self.insights.clone(), "instrumentation_key")
    }
}

pub(super) fn declare(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    names: &Names,
) -> Result<Core> {
    let location = settings.location.as_str();

    let rg = ResourceDecl::new(types::RESOURCE_GROUP, names.resource_group())
        .input("name", names.resource_group())
        .input("location", location);

    let sa = ResourceDecl::new(types::STORAGE_ACCOUNT, names.logical("sa"))
        .input("name", names.storage_account()?)
        .input("resource_group", rg.output("name"))
        .input("location", location)
        .input("kind", "StorageV2")
        .input("sku", "Standard_LRS");

    let table = ResourceDecl::new(types::STORAGE_TABLE, names.logical("table"))
        .input("name", TABLE_NAME)
        .input("account_name", sa.output("name"))
        .input("resource_group", rg.output("name"));

    let insights = ResourceDecl::new(types::APP_INSIGHTS, names.app_insights())
        .input("name", names.app_insights())
        .input("resource_group", rg.output("name"))
        .input("location", location)
        .input("kind", "web")
        .input("application_type", "web");

    Ok(Core {
        resource_group: graph.add(rg)?,
        storage_account: graph.add(sa)?,
        table: graph.add(table)?,
        insights: graph.add(insights)?,
        location: location.to_string(),
    })
}
