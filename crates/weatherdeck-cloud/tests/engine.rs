use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weatherdeck_cloud::{
    ActionType, AuthStatus, CloudError, CloudProvider, Engine, Input, ResourceConfig,
    ResourceDecl, ResourceGraph, ResourceOutputs, ResourceState, ResourceStatus, StateManager,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Started(String),
    Finished(String),
    Deleted(String),
}

/// Provider that fabricates outputs and records call order
#[derive(Default)]
struct RecordingProvider {
    events: Mutex<Vec<Event>>,
    fail_on: Mutex<Option<String>>,
}

impl RecordingProvider {
    fn failing_on(id: &str) -> Self {
        let provider = Self::default();
        provider.fail_next(id);
        provider
    }

    fn fail_next(&self, id: &str) {
        *self.fail_on.lock().unwrap() = Some(id.to_string());
    }

    fn succeed(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &Event) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {:?}", event))
    }
}

#[async_trait]
impl CloudProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn display_name(&self) -> &str {
        "Recording"
    }

    async fn check_auth(&self) -> weatherdeck_cloud::Result<AuthStatus> {
        Ok(AuthStatus::ok("test"))
    }

    async fn create(&self, resource: &ResourceConfig) -> weatherdeck_cloud::Result<ResourceOutputs> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Started(resource.id.clone()));

        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.fail_on.lock().unwrap().as_deref() == Some(resource.id.as_str()) {
            return Err(CloudError::ProviderError(format!(
                "conflict: {} already exists",
                resource.id
            )));
        }

        self.events
            .lock()
            .unwrap()
            .push(Event::Finished(resource.id.clone()));

        let mut outputs = ResourceOutputs::new();
        outputs.insert("id".to_string(), json!(format!("/fake/{}", resource.id)));
        outputs.insert("name".to_string(), json!(format!("{}-name", resource.id)));
        Ok(outputs)
    }

    async fn delete(
        &self,
        logical_name: &str,
        _current: &ResourceState,
    ) -> weatherdeck_cloud::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Deleted(logical_name.to_string()));
        Ok(())
    }
}

fn diamond() -> ResourceGraph {
    let mut graph = ResourceGraph::new();
    let rg = ResourceDecl::new("resource-group", "rg").input("location", "westeurope");
    let left = ResourceDecl::new("storage-account", "left").input("rg", rg.output("name"));
    let right = ResourceDecl::new("app-insights", "right").input("rg", rg.output("name"));
    let top = ResourceDecl::new("app-service", "top")
        .input(
            "settings",
            Input::map([
                ("LEFT", Input::from(left.output("name"))),
                ("RIGHT", Input::from(right.output("name"))),
            ]),
        );
    graph.add(rg).unwrap();
    graph.add(left).unwrap();
    graph.add(right).unwrap();
    graph.add(top).unwrap();
    graph.export("top_name", weatherdeck_cloud::OutputRef::new("top", "name"));
    graph
}

#[tokio::test]
async fn test_up_respects_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let engine = Engine::new(provider.clone(), StateManager::new(dir.path(), "dev"));

    let result = engine.up(&diamond()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.succeeded.len(), 4);

    let rg_done = provider.position(&Event::Finished("rg".into()));
    for child in ["left", "right"] {
        assert!(rg_done < provider.position(&Event::Started(child.into())));
    }
    let top_started = provider.position(&Event::Started("top".into()));
    assert!(provider.position(&Event::Finished("left".into())) < top_started);
    assert!(provider.position(&Event::Finished("right".into())) < top_started);

    let outputs = engine.outputs().await.unwrap();
    assert_eq!(outputs["top_name"], json!("top-name"));
}

#[tokio::test]
async fn test_reapply_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let engine = Engine::new(provider.clone(), StateManager::new(dir.path(), "dev"));
    let graph = diamond();

    engine.up(&graph).await.unwrap();
    let calls = provider.events().len();

    let plan = engine.preview(&graph).await.unwrap();
    assert!(!plan.has_changes);

    let second = engine.up(&graph).await.unwrap();
    assert!(second.succeeded.is_empty());
    assert_eq!(provider.events().len(), calls);
}

#[tokio::test]
async fn test_preview_does_not_touch_provider() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let engine = Engine::new(provider.clone(), StateManager::new(dir.path(), "dev"));

    let plan = engine.preview(&diamond()).await.unwrap();
    assert_eq!(plan.summary().create, 4);
    assert!(provider.events().is_empty());
    assert!(!engine.state_manager().state_path().exists());
}

#[tokio::test]
async fn test_failure_skips_later_waves() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::failing_on("left"));
    let engine = Engine::new(provider.clone(), StateManager::new(dir.path(), "dev"));

    let result = engine.up(&diamond()).await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].error.as_deref().unwrap().contains("conflict"));
    assert_eq!(result.skipped, vec!["top".to_string()]);
    assert!(!provider.events().contains(&Event::Started("top".into())));
}

#[tokio::test]
async fn test_removed_resource_is_deleted_and_destroy_reverses_order() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let engine = Engine::new(provider.clone(), StateManager::new(dir.path(), "dev"));

    engine.up(&diamond()).await.unwrap();

    let mut smaller = ResourceGraph::new();
    smaller
        .add(ResourceDecl::new("resource-group", "rg").input("location", "westeurope"))
        .unwrap();
    let plan = engine.preview(&smaller).await.unwrap();
    assert_eq!(plan.summary().delete, 3);
    assert_eq!(plan.action_for("rg").unwrap().action_type, ActionType::NoOp);

    engine.up(&smaller).await.unwrap();
    let top_deleted = provider.position(&Event::Deleted("top".into()));
    assert!(top_deleted < provider.position(&Event::Deleted("left".into())));

    let result = engine.destroy().await.unwrap();
    assert!(result.is_success());
    assert!(provider.events().contains(&Event::Deleted("rg".into())));
    assert!(engine.outputs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rebuilt_package_is_redeployed() {
    let project = tempfile::tempdir().unwrap();
    let wwwroot = project.path().join("wwwroot");
    std::fs::create_dir(&wwwroot).unwrap();
    std::fs::write(wwwroot.join("app.dll"), b"build 1").unwrap();

    let mut graph = ResourceGraph::new();
    graph
        .add(
            ResourceDecl::new("storage-blob", "package")
                .input("name", "app.zip")
                .input("source", Input::Archive(wwwroot.clone())),
        )
        .unwrap();

    let provider = Arc::new(RecordingProvider::default());
    let engine = Engine::new(provider.clone(), StateManager::new(project.path(), "dev"));
    engine.up(&graph).await.unwrap();
    assert!(!engine.preview(&graph).await.unwrap().has_changes);

    std::fs::write(wwwroot.join("app.dll"), b"build 2").unwrap();

    let plan = engine.preview(&graph).await.unwrap();
    assert_eq!(plan.summary().update, 1);
    let result = engine.up(&graph).await.unwrap();
    assert_eq!(result.succeeded.len(), 1);
    let uploads = provider
        .events()
        .iter()
        .filter(|e| **e == Event::Started("package".into()))
        .count();
    assert_eq!(uploads, 2);
}

#[tokio::test]
async fn test_failed_update_is_retried_on_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let state = StateManager::new(dir.path(), "dev");
    let engine = Engine::new(provider.clone(), state.clone());

    let declare = |location: &str| {
        let mut graph = ResourceGraph::new();
        graph
            .add(ResourceDecl::new("resource-group", "rg").input("location", location))
            .unwrap();
        graph
    };

    engine.up(&declare("westeurope")).await.unwrap();

    provider.fail_next("rg");
    let result = engine.up(&declare("northeurope")).await.unwrap();
    assert!(!result.is_success());
    let recorded = state.load().await.unwrap();
    assert_eq!(recorded.get_resource("rg").unwrap().status, ResourceStatus::Error);

    // reverting the inputs still re-applies the resource left in error
    provider.succeed();
    let plan = engine.preview(&declare("westeurope")).await.unwrap();
    assert_eq!(plan.action_for("rg").unwrap().action_type, ActionType::Update);

    engine.up(&declare("westeurope")).await.unwrap();
    let recorded = state.load().await.unwrap();
    assert_eq!(recorded.get_resource("rg").unwrap().status, ResourceStatus::Ready);
}
