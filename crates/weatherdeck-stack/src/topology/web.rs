//! App service plan and app service

use super::base::Core;
use super::package::Package;
use super::registry::Registry;
use super::types;
use super::vault::Vault;
use crate::error::Result;
use crate::naming::Names;
use std::collections::BTreeMap;
use weatherdeck_cloud::{Fragment, Input, OutputRef, ResourceDecl, ResourceGraph, ResourceId};

/// Port the service listens on inside its container
const CONTAINER_PORT: &str = "8080";

/// App service configuration collected from the other parts of the stack
pub(super) struct AppSpec {
    app_settings: BTreeMap<String, Input>,
    connection_strings: BTreeMap<String, Input>,
    container: Option<Input>,
    identity: bool,
    linux: bool,
}

impl AppSpec {
    pub fn new(core: &Core) -> Self {
        let mut app_settings = BTreeMap::new();
        app_settings.insert(
            "APPINSIGHTS_INSTRUMENTATIONKEY".to_string(),
            Input::from(core.instrumentation_key()),
        );
        app_settings.insert(
            "APPLICATIONINSIGHTS_CONNECTION_STRING".to_string(),
            Input::interpolate([
                Fragment::from("InstrumentationKey="),
                Fragment::from(core.instrumentation_key()),
            ]),
        );
        app_settings.insert(
            "ApplicationInsightsAgent_EXTENSION_VERSION".to_string(),
            Input::from("~2"),
        );

        Self {
            app_settings,
            connection_strings: BTreeMap::new(),
            container: None,
            identity: false,
            linux: false,
        }
    }

    pub fn setting(&mut self, key: &str, value: impl Into<Input>) {
        self.app_settings.insert(key.to_string(), value.into());
    }

    pub fn connection_string(&mut self, name: &str, kind: &str, value: Input) {
        self.connection_strings.insert(
            name.to_string(),
            Input::map([("value", value), ("type", Input::from(kind))]),
        );
    }

    /// Run from the zip package behind the blob's signed URL
    pub fn run_package(&mut self, package: &Package) {
        self.setting("WEBSITE_RUN_FROM_PACKAGE", package.signed_url());
    }

    /// Run the built image pulled with the registry's admin credentials
    pub fn run_image(&mut self, registry: &Registry) {
        self.linux = true;
        self.container = Some(Input::map([
            ("image", Input::from(registry.image_ref())),
            (
                "registry_url",
                Input::interpolate([
                    Fragment::from("https://"),
                    Fragment::from(registry.login_server()),
                ]),
            ),
            ("username", Input::from(registry.username())),
            ("password", Input::secret(registry.password())),
        ]));
        self.setting("WEBSITES_PORT", CONTAINER_PORT);
        self.setting("WEBSITES_ENABLE_APP_SERVICE_STORAGE", "false");
    }

    /// Assign a managed identity and point the app at the vault
    pub fn use_vault(&mut self, vault: &Vault, core: &Core) {
        self.identity = true;
        self.setting("KeyVaultUri", vault.uri());
        self.setting("TableName", core.table_name());
    }
}

pub(super) struct App {
    pub app: ResourceId,
}

impl App {
    pub fn name(&self) -> OutputRef {
        OutputRef::new(self.app.clone(), "name")
    }

    pub fn hostname(&self) -> OutputRef {
        OutputRef::new(self.app.clone(), "default_site_hostname")
    }

    pub fn principal_id(&self) -> OutputRef {
        OutputRef::new(self.app.clone(), "principal_id")
    }
}

pub(super) fn declare(
    graph: &mut ResourceGraph,
    names: &Names,
    core: &Core,
    spec: AppSpec,
) -> Result<App> {
    let plan = ResourceDecl::new(types::APP_SERVICE_PLAN, names.app_service_plan())
        .input("name", names.app_service_plan())
        .input("resource_group", core.resource_group_name())
        .input("location", core.location.as_str())
        .input("kind", if spec.linux { "Linux" } else { "App" })
        .input("linux", spec.linux)
        .input("sku", "B1");

    let mut app = ResourceDecl::new(types::APP_SERVICE, names.app_service())
        .input("name", names.app_service())
        .input("resource_group", core.resource_group_name())
        .input("plan", plan.output("id"))
        .input("https_only", true)
        .input("identity", spec.identity)
        .input("app_settings", Input::Map(spec.app_settings))
        .input("connection_strings", Input::Map(spec.connection_strings));
    if let Some(container) = spec.container {
        app = app.input("container", container);
    }

    graph.add(plan)?;
    Ok(App {
        app: graph.add(app)?,
    })
}
