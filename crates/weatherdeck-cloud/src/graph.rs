//! Declarative resource graph
//!
//! A stack is declared as a set of [`ResourceDecl`] nodes keyed by logical
//! name. Edges come from two places:
//!
//! - explicit `depends_on` hints, for orderings that cannot be inferred from
//!   values (e.g. secrets that must wait for every access policy);
//! - every [`OutputRef`] found anywhere inside a node's inputs, i.e. a value
//!   that is only known once another node has been created.
//!
//! The engine applies the graph wave by wave: nodes in the same wave have no
//! edge between them and may run concurrently.

use crate::archive;
use crate::error::{CloudError, Result};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Text used in place of values that are only known after apply
pub const UNKNOWN_PLACEHOLDER: &str = "(known after apply)";

/// Text used in place of secret values
pub const SECRET_PLACEHOLDER: &str = "[secret]";

/// Outputs known so far, indexed by resource and attribute name
pub type OutputTable = BTreeMap<ResourceId, BTreeMap<String, Value>>;

/// Logical name of a resource node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Reference to an output attribute of another resource
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRef {
    pub resource: ResourceId,
    pub attribute: String,
    /// Value used while the attribute is not yet known
    pub fallback: Option<Value>,
}

impl OutputRef {
    pub fn new(resource: impl Into<ResourceId>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
            fallback: None,
        }
    }

    /// Resolve to `value` whenever the attribute is unavailable
    pub fn or_fallback(mut self, value: impl Into<Value>) -> Self {
        self.fallback = Some(value.into());
        self
    }

    fn resolve(&self, known: &OutputTable) -> Resolved {
        let value = known
            .get(&self.resource)
            .and_then(|attrs| attrs.get(&self.attribute))
            .filter(|v| !v.is_null());

        match (value, &self.fallback) {
            (Some(v), _) => Resolved::Known(v.clone()),
            (None, Some(fallback)) => Resolved::Known(fallback.clone()),
            (None, None) => Resolved::Unknown,
        }
    }
}

/// Piece of an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Output(OutputRef),
}

impl From<&str> for Fragment {
    fn from(value: &str) -> Self {
        Fragment::Text(value.to_string())
    }
}

impl From<OutputRef> for Fragment {
    fn from(value: OutputRef) -> Self {
        Fragment::Output(value)
    }
}

/// Input value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Literal(Value),
    Output(OutputRef),
    Interpolate(Vec<Fragment>),
    Map(BTreeMap<String, Input>),
    List(Vec<Input>),
    /// Sensitive value: never logged and only stored as a digest
    Secret(Box<Input>),
    /// Local file or directory uploaded by the provider; resolves to its
    /// path and a digest of its content
    Archive(PathBuf),
}

impl Input {
    pub fn literal(value: impl Into<Value>) -> Self {
        Input::Literal(value.into())
    }

    pub fn secret(inner: impl Into<Input>) -> Self {
        Input::Secret(Box::new(inner.into()))
    }

    pub fn interpolate<I, F>(fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Fragment>,
    {
        Input::Interpolate(fragments.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Input>,
    {
        Input::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// All output references contained in this input
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a OutputRef>) {
        match self {
            Input::Literal(_) | Input::Archive(_) => {}
            Input::Output(r) => refs.push(r),
            Input::Interpolate(fragments) => {
                for fragment in fragments {
                    if let Fragment::Output(r) = fragment {
                        refs.push(r);
                    }
                }
            }
            Input::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(refs);
                }
            }
            Input::List(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Input::Secret(inner) => inner.collect_references(refs),
        }
    }

    /// Whether any part of this input is secret
    pub fn is_secret(&self) -> bool {
        match self {
            Input::Secret(_) => true,
            Input::Map(entries) => entries.values().any(Input::is_secret),
            Input::List(items) => items.iter().any(Input::is_secret),
            _ => false,
        }
    }

    /// Resolve against the outputs known so far
    pub fn resolve(&self, known: &OutputTable) -> Resolved {
        match self {
            Input::Literal(v) => Resolved::Known(v.clone()),
            Input::Archive(path) => Resolved::Known(archive_value(path)),
            Input::Output(r) => r.resolve(known),
            Input::Interpolate(fragments) => {
                let mut text = String::new();
                for fragment in fragments {
                    match fragment {
                        Fragment::Text(t) => text.push_str(t),
                        Fragment::Output(r) => match r.resolve(known) {
                            Resolved::Known(Value::String(s)) => text.push_str(&s),
                            Resolved::Known(other) => text.push_str(&other.to_string()),
                            Resolved::Unknown => return Resolved::Unknown,
                        },
                    }
                }
                Resolved::Known(Value::String(text))
            }
            Input::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (key, value) in entries {
                    match value.resolve(known) {
                        Resolved::Known(v) => {
                            object.insert(key.clone(), v);
                        }
                        Resolved::Unknown => return Resolved::Unknown,
                    }
                }
                Resolved::Known(Value::Object(object))
            }
            Input::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item.resolve(known) {
                        Resolved::Known(v) => values.push(v),
                        Resolved::Unknown => return Resolved::Unknown,
                    }
                }
                Resolved::Known(Value::Array(values))
            }
            Input::Secret(inner) => inner.resolve(known),
        }
    }

    /// Render for display: secrets and unknown values are replaced by placeholders
    pub fn display_value(&self, known: &OutputTable) -> Value {
        match self {
            Input::Secret(_) => Value::String(SECRET_PLACEHOLDER.to_string()),
            Input::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.display_value(known)))
                    .collect(),
            ),
            Input::List(items) => {
                Value::Array(items.iter().map(|i| i.display_value(known)).collect())
            }
            other => match other.resolve(known) {
                Resolved::Known(v) => v,
                Resolved::Unknown => Value::String(UNKNOWN_PLACEHOLDER.to_string()),
            },
        }
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Literal(Value::String(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Input::Literal(Value::Bool(value))
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<OutputRef> for Input {
    fn from(value: OutputRef) -> Self {
        Input::Output(value)
    }
}

/// `{"path", "sha256"}` for an archive; an unreadable archive has a null
/// digest and fails later, when the provider packs it
fn archive_value(path: &Path) -> Value {
    let sha256 = match archive::content_digest(path) {
        Ok(digest) => Value::String(digest),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read archive");
            Value::Null
        }
    };
    json!({ "path": path.display().to_string(), "sha256": sha256 })
}

/// Result of resolving an input
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Known(Value),
    Unknown,
}

impl Resolved {
    pub fn is_known(&self) -> bool {
        matches!(self, Resolved::Known(_))
    }

    pub fn known(self) -> Option<Value> {
        match self {
            Resolved::Known(v) => Some(v),
            Resolved::Unknown => None,
        }
    }
}

/// A declared resource
#[derive(Debug, Clone)]
pub struct ResourceDecl {
    pub id: ResourceId,

    /// Resource type understood by the provider (e.g. "key-vault")
    pub resource_type: String,

    pub inputs: BTreeMap<String, Input>,

    /// Explicit ordering hints
    pub depends_on: Vec<ResourceId>,
}

impl ResourceDecl {
    pub fn new(resource_type: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            inputs: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<Input>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<ResourceId>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn depends_on_all<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = ResourceId>,
    {
        self.depends_on.extend(ids);
        self
    }

    /// Reference to one of this resource's outputs
    pub fn output(&self, attribute: impl Into<String>) -> OutputRef {
        OutputRef::new(self.id.clone(), attribute)
    }

    /// Explicit and inferred dependencies of this resource
    pub fn dependencies(&self) -> BTreeSet<ResourceId> {
        let mut deps: BTreeSet<ResourceId> = self.depends_on.iter().cloned().collect();
        for input in self.inputs.values() {
            for r in input.references() {
                deps.insert(r.resource.clone());
            }
        }
        deps.remove(&self.id);
        deps
    }

    /// Whether any input is secret
    pub fn has_secrets(&self) -> bool {
        self.inputs.values().any(Input::is_secret)
    }
}

/// Directed acyclic graph of resource declarations plus stack outputs
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: BTreeMap<ResourceId, ResourceDecl>,
    outputs: BTreeMap<String, Input>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource; logical names must be unique
    pub fn add(&mut self, decl: ResourceDecl) -> Result<ResourceId> {
        if self.resources.contains_key(&decl.id) {
            return Err(CloudError::DuplicateResource(decl.id.to_string()));
        }
        let id = decl.id.clone();
        tracing::trace!(resource = %id, resource_type = %decl.resource_type, "Declared resource");
        self.resources.insert(id.clone(), decl);
        Ok(id)
    }

    /// Declare a stack output
    pub fn export(&mut self, name: impl Into<String>, value: impl Into<Input>) {
        self.outputs.insert(name.into(), value.into());
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceDecl> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDecl> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<&ResourceDecl> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    pub fn outputs(&self) -> &BTreeMap<String, Input> {
        &self.outputs
    }

    /// Explicit and inferred dependencies of `id`
    pub fn dependencies(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
        self.resources
            .get(id)
            .map(ResourceDecl::dependencies)
            .unwrap_or_default()
    }

    /// Resources that depend directly on `id`
    pub fn dependents(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
        self.resources
            .values()
            .filter(|r| r.dependencies().contains(id))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Resources without any dependency
    pub fn roots(&self) -> Vec<ResourceId> {
        self.resources
            .values()
            .filter(|r| r.dependencies().is_empty())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Check that every reference points at a declared resource and that the
    /// graph has no cycle
    pub fn validate(&self) -> Result<()> {
        for decl in self.resources.values() {
            for dep in decl.dependencies() {
                if !self.resources.contains_key(&dep) {
                    return Err(CloudError::UnknownResource {
                        from: decl.id.to_string(),
                        to: dep.to_string(),
                    });
                }
            }
        }

        for (name, output) in &self.outputs {
            for r in output.references() {
                if !self.resources.contains_key(&r.resource) {
                    return Err(CloudError::UnknownResource {
                        from: format!("output:{}", name),
                        to: r.resource.to_string(),
                    });
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Deterministic topological order; ties are broken by logical name
    pub fn topological_order(&self) -> Result<Vec<ResourceId>> {
        let mut remaining: BTreeMap<&ResourceId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&ResourceId, Vec<&ResourceId>> = BTreeMap::new();

        for (id, decl) in &self.resources {
            let deps: Vec<_> = decl
                .dependencies()
                .into_iter()
                .filter(|d| self.resources.contains_key(d))
                .collect();
            remaining.insert(id, deps.len());
            for dep in deps {
                if let Some((key, _)) = self.resources.get_key_value(&dep) {
                    dependents.entry(key).or_default().push(id);
                }
            }
        }

        let mut ready: BTreeSet<&ResourceId> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.resources.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            if let Some(children) = dependents.get(id) {
                for child in children {
                    if let Some(count) = remaining.get_mut(child) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(*child);
                        }
                    }
                }
            }
        }

        if order.len() != self.resources.len() {
            let stuck: Vec<String> = remaining
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(CloudError::CircularDependency(stuck.join(" -> ")));
        }

        Ok(order)
    }

    /// Partition the graph into dependency levels
    ///
    /// Every resource lands in the wave right after its deepest dependency,
    /// so resources within a wave are mutually independent.
    pub fn waves(&self) -> Result<Vec<Vec<ResourceId>>> {
        let order = self.topological_order()?;
        let mut level: BTreeMap<ResourceId, usize> = BTreeMap::new();
        let mut waves: Vec<Vec<ResourceId>> = Vec::new();

        for id in order {
            let depth = self
                .dependencies(&id)
                .iter()
                .filter_map(|d| level.get(d))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(id.clone());
            level.insert(id, depth);
        }

        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        let rg = ResourceDecl::new("resource-group", "rg").input("location", "westeurope");
        let sa = ResourceDecl::new("storage-account", "sa")
            .input("resource_group_name", rg.output("name"))
            .input("tier", "Standard");
        let app = ResourceDecl::new("app-service", "app")
            .input("resource_group_name", rg.output("name"))
            .input(
                "connection",
                Input::secret(sa.output("primary_connection_string")),
            );
        graph.add(rg).unwrap();
        graph.add(sa).unwrap();
        graph.add(app).unwrap();
        graph
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut graph = ResourceGraph::new();
        graph.add(ResourceDecl::new("resource-group", "rg")).unwrap();
        let err = graph
            .add(ResourceDecl::new("resource-group", "rg"))
            .unwrap_err();
        assert!(matches!(err, CloudError::DuplicateResource(id) if id == "rg"));
    }

    #[test]
    fn test_inferred_dependencies() {
        let graph = sample_graph();
        let deps = graph.dependencies(&"app".into());
        assert!(deps.contains(&ResourceId::from("rg")));
        assert!(deps.contains(&ResourceId::from("sa")));
        assert_eq!(graph.roots(), vec![ResourceId::from("rg")]);
        assert_eq!(
            graph.dependents(&"sa".into()),
            [ResourceId::from("app")].into_iter().collect()
        );
    }

    #[test]
    fn test_topological_order_and_waves() {
        let graph = sample_graph();
        let order = graph.topological_order().unwrap();
        assert_eq!(
            order,
            vec![
                ResourceId::from("rg"),
                ResourceId::from("sa"),
                ResourceId::from("app")
            ]
        );

        let waves = graph.waves().unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec![ResourceId::from("rg")]);
    }

    #[test]
    fn test_independent_resources_share_a_wave() {
        let mut graph = ResourceGraph::new();
        let rg = ResourceDecl::new("resource-group", "rg");
        let a = ResourceDecl::new("storage-account", "a").input("rg", rg.output("name"));
        let b = ResourceDecl::new("app-insights", "b").input("rg", rg.output("name"));
        graph.add(rg).unwrap();
        graph.add(a).unwrap();
        graph.add(b).unwrap();

        let waves = graph.waves().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[1], vec![ResourceId::from("a"), ResourceId::from("b")]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = ResourceGraph::new();
        graph
            .add(ResourceDecl::new("x", "a").depends_on("b"))
            .unwrap();
        graph
            .add(ResourceDecl::new("x", "b").depends_on("a"))
            .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(CloudError::CircularDependency(_))
        ));
    }

    #[test]
    fn test_unknown_reference_detected() {
        let mut graph = ResourceGraph::new();
        graph
            .add(ResourceDecl::new("x", "a").input("v", OutputRef::new("ghost", "id")))
            .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, CloudError::UnknownResource { to, .. } if to == "ghost"));
    }

    #[test]
    fn test_resolve_uses_fallback_when_unknown() {
        let known = OutputTable::new();
        let input = Input::from(OutputRef::new("app", "principal_id").or_fallback("placeholder"));
        assert_eq!(input.resolve(&known), Resolved::Known(json!("placeholder")));

        let strict = Input::from(OutputRef::new("app", "principal_id"));
        assert_eq!(strict.resolve(&known), Resolved::Unknown);
    }

    #[test]
    fn test_resolve_interpolation() {
        let mut known = OutputTable::new();
        known.insert(
            "app".into(),
            [("hostname".to_string(), json!("demo.azurewebsites.net"))]
                .into_iter()
                .collect(),
        );
        let input = Input::interpolate([
            Fragment::from("https://"),
            Fragment::from(OutputRef::new("app", "hostname")),
        ]);
        assert_eq!(
            input.resolve(&known),
            Resolved::Known(json!("https://demo.azurewebsites.net"))
        );
    }

    #[test]
    fn test_display_value_hides_secrets() {
        let known = OutputTable::new();
        let input = Input::map([
            ("plain", Input::from("visible")),
            ("hidden", Input::secret("hunter2")),
        ]);
        assert!(input.is_secret());
        assert_eq!(
            input.display_value(&known),
            json!({"plain": "visible", "hidden": SECRET_PLACEHOLDER})
        );
    }

    #[test]
    fn test_archive_resolves_to_path_and_content_digest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.dll"), b"v1").unwrap();
        let input = Input::Archive(dir.path().to_path_buf());
        let known = OutputTable::new();

        let Resolved::Known(first) = input.resolve(&known) else {
            panic!("archive must resolve");
        };
        assert_eq!(first["path"], json!(dir.path().display().to_string()));
        assert_eq!(first["sha256"].as_str().unwrap().len(), 64);

        std::fs::write(dir.path().join("app.dll"), b"v2").unwrap();
        assert_ne!(input.resolve(&known), Resolved::Known(first));

        let missing = Input::Archive(dir.path().join("missing"));
        assert_eq!(missing.resolve(&known).known().unwrap()["sha256"], Value::Null);
    }
}
