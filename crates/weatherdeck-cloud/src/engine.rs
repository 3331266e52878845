//! Plan/apply engine
//!
//! The engine turns a [`ResourceGraph`] into provider calls:
//!
//! - `preview` diffs the graph against the recorded state without touching
//!   the provider;
//! - `up` applies creates/updates wave by wave, feeding each wave the outputs
//!   recorded by the previous ones, then deletes resources that left the graph;
//! - `destroy` tears the whole stack down in reverse dependency order.
//!
//! Nothing is retried: the first failing wave stops the run and later waves
//! are reported as skipped.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::error::{CloudError, Result};
use crate::graph::{Input, OutputTable, ResourceDecl, ResourceGraph, ResourceId, Resolved};
use crate::provider::{AuthStatus, CloudProvider, ResourceConfig};
use crate::state::{ResourceState, ResourceStatus, StackState, StateManager};
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Engine bound to one stack and one provider
pub struct Engine {
    provider: Arc<dyn CloudProvider>,
    state: StateManager,
}

impl Engine {
    pub fn new(provider: Arc<dyn CloudProvider>, state: StateManager) -> Self {
        Self { provider, state }
    }

    pub fn provider(&self) -> &dyn CloudProvider {
        self.provider.as_ref()
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    pub async fn check_auth(&self) -> Result<AuthStatus> {
        self.provider.check_auth().await
    }

    /// Dry-run: compute the changes `up` would make
    pub async fn preview(&self, graph: &ResourceGraph) -> Result<Plan> {
        graph.validate()?;
        let state = self.state.load().await?;
        plan_against(graph, &state)
    }

    /// Apply the graph
    pub async fn up(&self, graph: &ResourceGraph) -> Result<ApplyResult> {
        graph.validate()?;
        let lock = self.state.acquire_lock().await?;
        let outcome = self.apply_graph(graph).await;
        lock.release().await?;
        outcome
    }

    /// Delete every resource of the stack
    pub async fn destroy(&self) -> Result<ApplyResult> {
        let lock = self.state.acquire_lock().await?;
        let outcome = self.destroy_all().await;
        lock.release().await?;
        outcome
    }

    /// Stack outputs recorded by the last successful `up`
    pub async fn outputs(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        Ok(self.state.load().await?.outputs)
    }

    async fn apply_graph(&self, graph: &ResourceGraph) -> Result<ApplyResult> {
        let start = Instant::now();
        let mut state = self.state.load().await?;
        let mut result = ApplyResult::new();
        let mut failed = false;

        for (index, wave) in graph.waves()?.into_iter().enumerate() {
            if failed {
                result
                    .skipped
                    .extend(wave.iter().map(|id| id.to_string()));
                continue;
            }

            tracing::debug!(wave = index, resources = wave.len(), "Applying wave");
            let known = state.output_table();
            let mut tasks = Vec::with_capacity(wave.len());

            for id in &wave {
                let decl = graph
                    .get(id)
                    .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()))?;

                let resolved = match resolve_inputs(decl, &known) {
                    Ok(value) => value,
                    Err(e) => {
                        result.add_failure(format!("create-{}", id), e.to_string());
                        failed = true;
                        continue;
                    }
                };
                let digest = inputs_digest(&resolved)?;
                let existing = state.get_resource(id.as_str()).cloned();

                if let Some(current) = &existing
                    && current.is_current(&decl.resource_type, &digest)
                {
                    tracing::debug!(resource = %id, "Unchanged, skipping");
                    continue;
                }

                let provider = Arc::clone(&self.provider);
                let config = ResourceConfig::new(decl.resource_type.clone(), id.to_string(), resolved);
                let dependencies: Vec<String> =
                    decl.dependencies().iter().map(ToString::to_string).collect();

                tasks.push(tokio::spawn(async move {
                    let outcome = match &existing {
                        None => {
                            tracing::info!(resource = %config.id, "Creating {}", config.resource_type);
                            provider.create(&config).await
                        }
                        Some(current) => {
                            tracing::info!(resource = %config.id, "Updating {}", config.resource_type);
                            provider.update(&config, current).await
                        }
                    };
                    (config, existing, dependencies, digest, outcome)
                }));
            }

            for joined in join_all(tasks).await {
                let (config, existing, dependencies, digest, outcome) = joined
                    .map_err(|e| CloudError::ProviderError(format!("apply task failed: {}", e)))?;
                let verb = if existing.is_some() { "update" } else { "create" };
                let action_id = format!("{}-{}", verb, config.id);

                match outcome {
                    Ok(outputs) => {
                        let provider_id = outputs
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or(&config.id)
                            .to_string();
                        let mut record = ResourceState::new(provider_id, &config.resource_type)
                            .with_status(ResourceStatus::Ready)
                            .with_digest(digest)
                            .with_dependencies(dependencies);
                        record.attributes = outputs;
                        if let Some(previous) = existing {
                            record.created_at = previous.created_at;
                        }
                        state.set_resource(config.id.clone(), record);
                        result.add_success(
                            action_id,
                            format!("{} {} ({})", verb, config.id, config.resource_type),
                        );
                    }
                    Err(e) => {
                        tracing::error!(resource = %config.id, error = %e, "Provider call failed");
                        if let Some(previous) = existing {
                            state.set_resource(
                                config.id.clone(),
                                previous.with_status(ResourceStatus::Error),
                            );
                        }
                        result.add_failure(action_id, e.to_string());
                        failed = true;
                    }
                }
            }

            self.state.save(&state).await?;
        }

        if !failed {
            for name in state.deletion_order() {
                if graph.contains(&ResourceId::new(name.clone())) {
                    continue;
                }
                if !self.delete_recorded(&mut state, &name, &mut result).await? {
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            let known = state.output_table();
            state.outputs = graph
                .outputs()
                .iter()
                .filter_map(|(name, input)| {
                    input
                        .resolve(&known)
                        .known()
                        .map(|value| (name.clone(), value))
                })
                .collect();
            self.state.save(&state).await?;
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn destroy_all(&self) -> Result<ApplyResult> {
        let start = Instant::now();
        let mut state = self.state.load().await?;
        let mut result = ApplyResult::new();

        for name in state.deletion_order() {
            if !self.delete_recorded(&mut state, &name, &mut result).await? {
                break;
            }
        }

        if state.resources.is_empty() {
            state.outputs.clear();
            self.state.save(&state).await?;
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Delete one recorded resource; returns false when the provider failed
    async fn delete_recorded(
        &self,
        state: &mut StackState,
        name: &str,
        result: &mut ApplyResult,
    ) -> Result<bool> {
        let Some(current) = state.get_resource(name).cloned() else {
            return Ok(true);
        };

        tracing::info!(resource = %name, "Deleting {}", current.resource_type);
        let action_id = format!("delete-{}", name);
        match self.provider.delete(name, &current).await {
            Ok(()) => {
                state.remove_resource(name);
                self.state.save(state).await?;
                result.add_success(
                    action_id,
                    format!("delete {} ({})", name, current.resource_type),
                );
                Ok(true)
            }
            Err(e) => {
                tracing::error!(resource = %name, error = %e, "Delete failed");
                result.add_failure(action_id, e.to_string());
                Ok(false)
            }
        }
    }
}

/// Diff `graph` against `state`
///
/// Outputs of resources planned for create/update are treated as unknown for
/// their dependents, which are then planned as updates unless an explicit
/// fallback keeps their inputs stable. An attribute referenced with a
/// fallback is assumed to survive an update, so its recorded value is kept.
pub fn plan_against(graph: &ResourceGraph, state: &StackState) -> Result<Plan> {
    let mut known = state.output_table();
    let mut actions = Vec::with_capacity(graph.len());

    let stable: BTreeSet<(ResourceId, String)> = graph
        .iter()
        .flat_map(|decl| decl.inputs.values())
        .flat_map(Input::references)
        .filter(|r| r.fallback.is_some())
        .map(|r| (r.resource.clone(), r.attribute.clone()))
        .collect();

    for (wave, ids) in graph.waves()?.into_iter().enumerate() {
        for id in ids {
            let decl = graph
                .get(&id)
                .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()))?;

            let digest = match resolve_inputs(decl, &known) {
                Ok(value) => Some(inputs_digest(&value)?),
                Err(_) => None,
            };

            let action_type = match state.get_resource(id.as_str()) {
                None => ActionType::Create,
                Some(current) => match digest {
                    Some(d) if current.is_current(&decl.resource_type, &d) => ActionType::NoOp,
                    _ => ActionType::Update,
                },
            };

            let details = decl
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.display_value(&known)))
                .collect();

            match action_type {
                ActionType::Create => {
                    known.remove(&id);
                }
                ActionType::Update => {
                    if let Some(attributes) = known.get_mut(&id) {
                        attributes.retain(|name, _| stable.contains(&(id.clone(), name.clone())));
                    }
                }
                _ => {}
            }

            actions.push(Action {
                id: format!("{}-{}", action_type, id),
                action_type,
                resource_type: decl.resource_type.clone(),
                resource_id: id.to_string(),
                description: format!("{} {} '{}'", action_type, decl.resource_type, id),
                wave,
                dependencies: decl.dependencies().iter().map(ToString::to_string).collect(),
                details,
            });
        }
    }

    for name in state.deletion_order() {
        if graph.contains(&ResourceId::new(name.clone())) {
            continue;
        }
        if let Some(current) = state.get_resource(&name) {
            actions.push(Action {
                id: format!("delete-{}", name),
                action_type: ActionType::Delete,
                resource_type: current.resource_type.clone(),
                resource_id: name.clone(),
                description: format!("delete {} '{}'", current.resource_type, name),
                wave: 0,
                dependencies: current.dependencies.clone(),
                details: BTreeMap::new(),
            });
        }
    }

    Ok(Plan::new(actions))
}

/// Resolve every input of `decl`; fails on the first unknown output
fn resolve_inputs(decl: &ResourceDecl, known: &OutputTable) -> Result<serde_json::Value> {
    let mut object = serde_json::Map::new();
    for (key, input) in &decl.inputs {
        match input.resolve(known) {
            Resolved::Known(value) => {
                object.insert(key.clone(), value);
            }
            Resolved::Unknown => {
                let missing = input
                    .references()
                    .into_iter()
                    .find(|r| {
                        r.fallback.is_none()
                            && known
                                .get(&r.resource)
                                .and_then(|attrs| attrs.get(&r.attribute))
                                .is_none_or(|v| v.is_null())
                    });
                return Err(match missing {
                    Some(r) => CloudError::UnresolvedOutput {
                        resource: r.resource.to_string(),
                        attribute: r.attribute.clone(),
                    },
                    None => CloudError::UnresolvedOutput {
                        resource: decl.id.to_string(),
                        attribute: key.clone(),
                    },
                });
            }
        }
    }
    Ok(serde_json::Value::Object(object))
}

/// SHA-256 of the canonical JSON encoding of resolved inputs
pub fn inputs_digest(resolved: &serde_json::Value) -> Result<String> {
    let bytes = serde_json::to_vec(resolved)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OutputRef;
    use serde_json::json;

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        let rg = ResourceDecl::new("resource-group", "rg").input("location", "westeurope");
        let kv = ResourceDecl::new("key-vault", "kv").input("resource_group", rg.output("name"));
        let secret = ResourceDecl::new("key-vault-secret", "secret")
            .input("vault_uri", kv.output("vault_uri"))
            .input("value", Input::secret("s3cr3t"));
        graph.add(rg).unwrap();
        graph.add(kv.clone()).unwrap();
        graph.add(secret).unwrap();
        graph.export("vault_uri", kv.output("vault_uri"));
        graph
    }

    #[test]
    fn test_plan_fresh_stack_creates_everything() {
        let plan = plan_against(&graph(), &StackState::new("dev")).unwrap();
        let summary = plan.summary();
        assert_eq!(summary.create, 3);
        assert_eq!(summary.no_change, 0);

        let secret = plan.action_for("secret").unwrap();
        assert_eq!(secret.wave, 2);
        assert_eq!(secret.details["value"], json!(crate::graph::SECRET_PLACEHOLDER));
        assert_eq!(
            secret.details["vault_uri"],
            json!(crate::graph::UNKNOWN_PLACEHOLDER)
        );
    }

    #[test]
    fn test_plan_detects_unchanged_and_removed_resources() {
        let graph = graph();
        let mut state = StackState::new("dev");
        let rg_inputs = json!({"location": "westeurope"});
        state.set_resource(
            "rg",
            ResourceState::new("rg-id", "resource-group")
                .with_digest(inputs_digest(&rg_inputs).unwrap())
                .with_attribute("name", json!("dev-rg")),
        );
        state.set_resource(
            "orphan",
            ResourceState::new("orphan-id", "storage-table")
                .with_dependencies(vec!["rg".to_string()]),
        );

        let plan = plan_against(&graph, &state).unwrap();
        assert_eq!(
            plan.action_for("rg").unwrap().action_type,
            ActionType::NoOp
        );
        assert_eq!(
            plan.action_for("kv").unwrap().action_type,
            ActionType::Create
        );
        assert_eq!(
            plan.action_for("orphan").unwrap().action_type,
            ActionType::Delete
        );
    }

    #[test]
    fn test_updating_a_resource_keeps_fallback_attributes() {
        let mut graph = ResourceGraph::new();
        let app = ResourceDecl::new("app-service", "app").input("sku", "S1");
        let policy = ResourceDecl::new("key-vault-access-policy", "policy").input(
            "object_id",
            app.output("principal_id").or_fallback("00000000-0000-0000-0000-000000000000"),
        );
        let site = ResourceDecl::new("dns-record", "site").input("target", app.output("hostname"));
        graph.add(app).unwrap();
        graph.add(policy).unwrap();
        graph.add(site).unwrap();

        let mut state = StackState::new("dev");
        state.set_resource(
            "app",
            ResourceState::new("app-id", "app-service")
                .with_digest(inputs_digest(&json!({"sku": "B1"})).unwrap())
                .with_attribute("principal_id", json!("real-principal"))
                .with_attribute("hostname", json!("demo.azurewebsites.net")),
        );
        state.set_resource(
            "policy",
            ResourceState::new("policy-id", "key-vault-access-policy")
                .with_digest(inputs_digest(&json!({"object_id": "real-principal"})).unwrap()),
        );
        state.set_resource(
            "site",
            ResourceState::new("site-id", "dns-record")
                .with_digest(inputs_digest(&json!({"target": "demo.azurewebsites.net"})).unwrap()),
        );

        let plan = plan_against(&graph, &state).unwrap();
        assert_eq!(plan.action_for("app").unwrap().action_type, ActionType::Update);
        assert_eq!(plan.action_for("policy").unwrap().action_type, ActionType::NoOp);
        assert_eq!(plan.action_for("site").unwrap().action_type, ActionType::Update);
    }

    #[test]
    fn test_errored_resource_is_planned_again() {
        let mut graph = ResourceGraph::new();
        graph
            .add(ResourceDecl::new("resource-group", "rg").input("location", "westeurope"))
            .unwrap();

        let mut state = StackState::new("dev");
        state.set_resource(
            "rg",
            ResourceState::new("rg-id", "resource-group")
                .with_digest(inputs_digest(&json!({"location": "westeurope"})).unwrap())
                .with_status(ResourceStatus::Error),
        );

        let plan = plan_against(&graph, &state).unwrap();
        assert_eq!(plan.action_for("rg").unwrap().action_type, ActionType::Update);
    }

    #[test]
    fn test_resolve_inputs_reports_missing_output() {
        let decl = ResourceDecl::new("key-vault-secret", "secret")
            .input("vault_uri", OutputRef::new("kv", "vault_uri"));
        let err = resolve_inputs(&decl, &OutputTable::new()).unwrap_err();
        assert!(matches!(
            err,
            CloudError::UnresolvedOutput { resource, attribute }
                if resource == "kv" && attribute == "vault_uri"
        ));
    }

    #[test]
    fn test_digest_is_stable() {
        let a = inputs_digest(&json!({"a": 1, "b": "x"})).unwrap();
        let b = inputs_digest(&json!({"a": 1, "b": "x"})).unwrap();
        let c = inputs_digest(&json!({"a": 2, "b": "x"})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
