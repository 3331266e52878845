//! Azure SQL server and database

use super::base::Core;
use super::types;
use crate::error::{Result, StackError};
use crate::model::StackSettings;
use crate::naming::Names;
use weatherdeck_cloud::{Fragment, Input, ResourceDecl, ResourceGraph};

pub(super) struct Sql {
    /// ADO.NET connection string; contains the admin password
    pub connection_string: Input,
}

pub(super) fn declare(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    names: &Names,
    core: &Core,
) -> Result<Sql> {
    let password = settings
        .sql_password
        .clone()
        .ok_or_else(|| StackError::MissingSetting {
            stack: settings.name.clone(),
            setting: "sql-password",
        })?;

    let server = ResourceDecl::new(types::SQL_SERVER, names.logical("sql"))
        .input("name", names.sql_server()?)
        .input("resource_group", core.resource_group_name())
        .input("location", core.location.as_str())
        .input("admin_login", settings.sql_admin.as_str())
        .input("admin_password", Input::secret(password.as_str()))
        .input("allow_azure_services", true);

    let database = ResourceDecl::new(types::SQL_DATABASE, names.sql_database())
        .input("name", names.sql_database())
        .input("server_name", server.output("name"))
        .input("resource_group", core.resource_group_name())
        .input("service_objective", "Basic");

    let connection_string = Input::interpolate([
        Fragment::from("Server=tcp:"),
        Fragment::from(server.output("fqdn")),
        Fragment::from(",1433;Initial Catalog="),
        Fragment::from(database.output("name")),
        Fragment::Text(format!(
            ";Persist Security Info=False;User ID={};Password={};",
            settings.sql_admin, password
        )),
        Fragment::from("MultipleActiveResultSets=False;Encrypt=True;TrustServerCertificate=False;Connection Timeout=30;"),
    ]);

    graph.add(server)?;
    graph.add(database)?;
    Ok(Sql { connection_string })
}
