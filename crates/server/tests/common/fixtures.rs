//! Registry event payloads used across tests.

use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique repository names.
static REPO_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique repository name for tests sharing one store.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn unique_repo(prefix: &str) -> String {
    let n = REPO_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}/app-{n}")
}

/// Current registry push event: `event_data.resources[]` plus `event_data.repository`.
#[allow(dead_code)]
pub fn harbor_push(repository: &str, tags: &[&str]) -> Value {
    let (namespace, name) = repository.split_once('/').unwrap_or(("library", repository));
    let resources: Vec<Value> = tags
        .iter()
        .map(|tag| json!({"tag": tag, "digest": format!("sha256:{tag}")}))
        .collect();
    json!({
        "type": "PUSH_ARTIFACT",
        "occur_at": 1_700_000_000,
        "operator": "robot$ci",
        "event_data": {
            "resources": resources,
            "repository": {
                "name": name,
                "namespace": namespace,
                "repo_full_name": repository,
                "repo_type": "private"
            }
        }
    })
}

/// Current registry delete event for the given tags.
#[allow(dead_code)]
pub fn harbor_delete(repository: &str, tags: &[&str]) -> Value {
    let mut payload = harbor_push(repository, tags);
    payload["type"] = json!("DELETE_ARTIFACT");
    payload
}

/// Nested `resource` shape with a `tags` list.
#[allow(dead_code)]
pub fn resource_push(repository: &str, tags: Value) -> Value {
    json!({"resource": {"repository": repository, "tags": tags}})
}

/// Flat `repository.name` + `push_data.tag` shape.
#[allow(dead_code)]
pub fn flat_push(repository: &str, tag: &str) -> Value {
    json!({"repository": {"name": repository}, "push_data": {"tag": tag}})
}

/// Repository-level delete carrying no tag information.
#[allow(dead_code)]
pub fn repository_delete(repository: &str) -> Value {
    json!({"type": "DELETE_REPOSITORY", "repository": {"name": repository}})
}
