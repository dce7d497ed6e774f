//! Payload normalization.
//!
//! Registry webhooks arrive in several historical shapes. Each shape is a pure
//! matcher from the decoded body to a list of canonical targets; matchers are
//! tried in a fixed priority order and the first one that yields at least one
//! target wins. Results from different shapes are never merged.
//!
//! Push shapes, highest priority first:
//! 1. `resource`: `{event_data|artifact|<root>}.resource` with `tag` or `tags`
//! 2. `push_data`: `repository.name` + `push_data.tag` (or `push.tag`)
//! 3. `artifact`: `artifact.tags`, repository from the artifact or `repository.name`
//! 4. `event_data_resources`: `event_data.resources[].tag` + `event_data.repository`
//!
//! Delete events use the same shapes, except that an artifact without tags and
//! a bare `repository.name` address the whole repository.

use crate::image::{DeleteTarget, ImageRef};
use serde_json::Value;

/// A shape matcher: `None` when the payload does not have this shape.
pub type Matcher<T> = fn(&Value) -> Option<Vec<T>>;

/// A named shape matcher.
pub struct Shape<T> {
    pub name: &'static str,
    pub matcher: Matcher<T>,
}

/// The targets found in a payload and the shape that produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalized<T> {
    pub shape: &'static str,
    pub targets: Vec<T>,
}

/// Push shapes in priority order.
pub const PUSH_SHAPES: &[Shape<ImageRef>] = &[
    Shape {
        name: "resource",
        matcher: push_resource,
    },
    Shape {
        name: "push_data",
        matcher: push_push_data,
    },
    Shape {
        name: "artifact",
        matcher: push_artifact,
    },
    Shape {
        name: "event_data_resources",
        matcher: push_event_data_resources,
    },
];

/// Delete shapes in priority order.
pub const DELETE_SHAPES: &[Shape<DeleteTarget>] = &[
    Shape {
        name: "resource",
        matcher: delete_resource,
    },
    Shape {
        name: "push_data",
        matcher: delete_push_data,
    },
    Shape {
        name: "artifact",
        matcher: delete_artifact,
    },
    Shape {
        name: "event_data_resources",
        matcher: delete_event_data_resources,
    },
    Shape {
        name: "repository",
        matcher: delete_repository,
    },
];

/// Run `shapes` in order and return the first non-empty match.
pub fn first_match<T>(payload: &Value, shapes: &[Shape<T>]) -> Option<Normalized<T>> {
    shapes.iter().find_map(|shape| {
        (shape.matcher)(payload)
            .filter(|targets| !targets.is_empty())
            .map(|targets| Normalized {
                shape: shape.name,
                targets,
            })
    })
}

/// Match a push payload, reporting which shape was recognized.
pub fn match_push(payload: &Value) -> Option<Normalized<ImageRef>> {
    first_match(payload, PUSH_SHAPES)
}

/// Match a delete payload, reporting which shape was recognized.
pub fn match_delete(payload: &Value) -> Option<Normalized<DeleteTarget>> {
    first_match(payload, DELETE_SHAPES)
}

/// Extract the `(repository, tag)` pairs announced by a push event.
///
/// Returns an empty list when no supported shape matches.
pub fn normalize_push(payload: &Value) -> Vec<ImageRef> {
    match_push(payload).map(|n| n.targets).unwrap_or_default()
}

/// Extract the removals announced by a delete event.
///
/// Returns an empty list when no supported shape matches.
pub fn normalize_delete(payload: &Value) -> Vec<DeleteTarget> {
    match_delete(payload).map(|n| n.targets).unwrap_or_default()
}

/// Repository name and tags located by one shape.
struct Found<'a> {
    repository: &'a str,
    tags: Vec<&'a str>,
    /// Number of tag entries in the payload, usable or not.
    declared_tags: usize,
}

impl<'a> Found<'a> {
    fn new(repository: &'a str, tags: Vec<&'a str>) -> Self {
        let declared_tags = tags.len();
        Self {
            repository,
            tags,
            declared_tags,
        }
    }
}

fn text(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// A name given either as a bare string or as an object with `name`.
fn name_of(value: Option<&Value>) -> Option<&str> {
    match value {
        Some(Value::Object(obj)) => text(obj.get("name")),
        other => text(other),
    }
}

fn object<'a>(parent: &'a Value, key: &str) -> Option<&'a Value> {
    parent.get(key).filter(|v| v.is_object())
}

fn outer_repository(payload: &Value) -> Option<&str> {
    object(payload, "repository").and_then(|repo| text(repo.get("name")))
}

/// Tag names from a list whose elements are strings or `{name}` objects.
/// Elements of any other form are skipped.
fn tag_list(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|t| name_of(Some(t))).collect())
        .unwrap_or_default()
}

fn resource(payload: &Value) -> Option<Found<'_>> {
    let container = object(payload, "event_data")
        .or_else(|| object(payload, "artifact"))
        .unwrap_or(payload);
    let resource = object(container, "resource")?;

    let repository = name_of(resource.get("repository"))
        .or_else(|| text(resource.get("repo")))
        .or_else(|| outer_repository(payload))?;

    let tags = match text(resource.get("tag")) {
        Some(tag) => vec![tag],
        None => tag_list(resource.get("tags")),
    };

    Some(Found::new(repository, tags))
}

fn push_data(payload: &Value) -> Option<Found<'_>> {
    let repository = outer_repository(payload)?;
    let push = object(payload, "push_data").or_else(|| object(payload, "push"))?;
    let tag = text(push.get("tag"))?;
    Some(Found::new(repository, vec![tag]))
}

fn artifact(payload: &Value) -> Option<Found<'_>> {
    let artifact = object(payload, "artifact")?;
    let repository =
        name_of(artifact.get("repository")).or_else(|| outer_repository(payload))?;
    let declared_tags = artifact
        .get("tags")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    Some(Found {
        repository,
        tags: tag_list(artifact.get("tags")),
        declared_tags,
    })
}

fn event_data_resources(payload: &Value) -> Option<Found<'_>> {
    let event_data = object(payload, "event_data")?;
    let repo = object(event_data, "repository")?;
    let repository = text(repo.get("repo_full_name")).or_else(|| text(repo.get("name")))?;
    let tags = event_data
        .get("resources")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|r| text(r.get("tag")))
        .collect();
    Some(Found::new(repository, tags))
}

fn repository_only(payload: &Value) -> Option<Found<'_>> {
    Some(Found::new(outer_repository(payload)?, Vec::new()))
}

fn images(found: Option<Found<'_>>) -> Option<Vec<ImageRef>> {
    let found = found?;
    Some(
        found
            .tags
            .iter()
            .filter_map(|tag| ImageRef::new(found.repository, *tag).ok())
            .collect(),
    )
}

fn tag_deletes(found: Option<Found<'_>>) -> Option<Vec<DeleteTarget>> {
    let found = found?;
    Some(
        found
            .tags
            .iter()
            .filter_map(|tag| DeleteTarget::tag(found.repository, *tag).ok())
            .collect(),
    )
}

fn tag_or_repository_deletes(found: Option<Found<'_>>) -> Option<Vec<DeleteTarget>> {
    let found = found?;
    if found.declared_tags == 0 {
        return DeleteTarget::repository_wide(found.repository)
            .ok()
            .map(|target| vec![target]);
    }
    tag_deletes(Some(found))
}

fn push_resource(payload: &Value) -> Option<Vec<ImageRef>> {
    images(resource(payload))
}

fn push_push_data(payload: &Value) -> Option<Vec<ImageRef>> {
    images(push_data(payload))
}

fn push_artifact(payload: &Value) -> Option<Vec<ImageRef>> {
    images(artifact(payload))
}

fn push_event_data_resources(payload: &Value) -> Option<Vec<ImageRef>> {
    images(event_data_resources(payload))
}

fn delete_resource(payload: &Value) -> Option<Vec<DeleteTarget>> {
    tag_deletes(resource(payload))
}

fn delete_push_data(payload: &Value) -> Option<Vec<DeleteTarget>> {
    tag_deletes(push_data(payload))
}

fn delete_artifact(payload: &Value) -> Option<Vec<DeleteTarget>> {
    tag_or_repository_deletes(artifact(payload))
}

fn delete_event_data_resources(payload: &Value) -> Option<Vec<DeleteTarget>> {
    tag_deletes(event_data_resources(payload))
}

fn delete_repository(payload: &Value) -> Option<Vec<DeleteTarget>> {
    tag_or_repository_deletes(repository_only(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(images: &[ImageRef]) -> Vec<(&str, &str)> {
        images.iter().map(|i| (i.repository(), i.tag())).collect()
    }

    fn delete_pairs(targets: &[DeleteTarget]) -> Vec<(&str, Option<&str>)> {
        targets
            .iter()
            .map(|t| (t.repository(), t.tag_name()))
            .collect()
    }

    #[test]
    fn test_resource_tags_mixed_elements() {
        let payload = json!({"resource": {"repository": "app", "tags": [{"name": "v1"}, "v2"]}});
        assert_eq!(
            pairs(&normalize_push(&payload)),
            vec![("app", "v1"), ("app", "v2")]
        );
    }

    #[test]
    fn test_push_data_shape() {
        let payload = json!({"repository": {"name": "app"}, "push_data": {"tag": "v3"}});
        assert_eq!(pairs(&normalize_push(&payload)), vec![("app", "v3")]);

        let payload = json!({"repository": {"name": "app"}, "push": {"tag": "v4"}});
        assert_eq!(pairs(&normalize_push(&payload)), vec![("app", "v4")]);
    }

    #[test]
    fn test_unrecognized_shape_is_empty() {
        assert!(normalize_push(&json!({})).is_empty());
        assert!(normalize_delete(&json!({})).is_empty());
        assert!(normalize_push(&json!("text")).is_empty());
        assert!(match_push(&json!({"repository": {"name": "app"}})).is_none());
    }

    #[test]
    fn test_resource_single_tag_under_event_data() {
        let payload = json!({
            "repository": {"name": "outer"},
            "event_data": {"resource": {"tag": "v1"}}
        });
        let matched = match_push(&payload).unwrap();
        assert_eq!(matched.shape, "resource");
        assert_eq!(pairs(&matched.targets), vec![("outer", "v1")]);
    }

    #[test]
    fn test_resource_repo_alias() {
        let payload = json!({"resource": {"repo": "lib/app", "tag": "1.0"}});
        assert_eq!(pairs(&normalize_push(&payload)), vec![("lib/app", "1.0")]);
    }

    #[test]
    fn test_resource_wins_over_push_data() {
        let payload = json!({
            "resource": {"repository": "a", "tag": "r"},
            "repository": {"name": "b"},
            "push_data": {"tag": "p"}
        });
        let matched = match_push(&payload).unwrap();
        assert_eq!(matched.shape, "resource");
        assert_eq!(pairs(&matched.targets), vec![("a", "r")]);
    }

    #[test]
    fn test_resource_without_tags_falls_through() {
        let payload = json!({
            "resource": {"repository": "a"},
            "repository": {"name": "b"},
            "push_data": {"tag": "p"}
        });
        let matched = match_push(&payload).unwrap();
        assert_eq!(matched.shape, "push_data");
        assert_eq!(pairs(&matched.targets), vec![("b", "p")]);
    }

    #[test]
    fn test_artifact_falls_back_to_outer_repository() {
        let payload = json!({
            "repository": {"name": "org/app"},
            "artifact": {"tags": ["v1", {"name": "v2"}, {"other": 1}, 5, ""]}
        });
        let matched = match_push(&payload).unwrap();
        assert_eq!(matched.shape, "artifact");
        assert_eq!(
            pairs(&matched.targets),
            vec![("org/app", "v1"), ("org/app", "v2")]
        );
    }

    #[test]
    fn test_artifact_repository_object() {
        let payload = json!({"artifact": {"repository": {"name": "x/y"}, "tags": ["t"]}});
        assert_eq!(pairs(&normalize_push(&payload)), vec![("x/y", "t")]);
    }

    #[test]
    fn test_artifact_without_repository_is_ignored_on_push() {
        let payload = json!({"artifact": {"tags": ["v1"]}});
        assert!(normalize_push(&payload).is_empty());
    }

    #[test]
    fn test_event_data_resources_shape() {
        let payload = json!({
            "type": "PUSH_ARTIFACT",
            "event_data": {
                "resources": [{"digest": "sha256:aa", "tag": "v1"}, {"digest": "sha256:bb"}],
                "repository": {"name": "app", "namespace": "lib", "repo_full_name": "lib/app"}
            }
        });
        let matched = match_push(&payload).unwrap();
        assert_eq!(matched.shape, "event_data_resources");
        assert_eq!(pairs(&matched.targets), vec![("lib/app", "v1")]);
    }

    #[test]
    fn test_delete_repository_wide() {
        let payload = json!({"type": "DELETE_REPOSITORY", "repository": {"name": "app"}});
        let matched = match_delete(&payload).unwrap();
        assert_eq!(matched.shape, "repository");
        assert_eq!(delete_pairs(&matched.targets), vec![("app", None)]);
    }

    #[test]
    fn test_delete_artifact_tags_and_repository_wide() {
        let payload = json!({"artifact": {"repository": "app", "tags": [{"name": "v1"}]}});
        assert_eq!(
            delete_pairs(&normalize_delete(&payload)),
            vec![("app", Some("v1"))]
        );

        let payload = json!({"repository": {"name": "app"}, "artifact": {"digest": "sha256:aa"}});
        let matched = match_delete(&payload).unwrap();
        assert_eq!(matched.shape, "artifact");
        assert_eq!(delete_pairs(&matched.targets), vec![("app", None)]);
    }

    #[test]
    fn test_delete_artifact_with_unusable_tags_is_not_repository_wide() {
        let payload = json!({"artifact": {"repository": "app", "tags": [{"id": 3}]}});
        assert!(normalize_delete(&payload).is_empty());
    }

    #[test]
    fn test_delete_push_data_tag() {
        let payload = json!({"repository": {"name": "app"}, "push_data": {"tag": "v9"}});
        assert_eq!(
            delete_pairs(&normalize_delete(&payload)),
            vec![("app", Some("v9"))]
        );
    }

    #[test]
    fn test_delete_digest_only_resources_do_not_wipe_repository() {
        let payload = json!({
            "type": "DELETE_ARTIFACT",
            "event_data": {
                "resources": [{"digest": "sha256:aa", "tag": ""}],
                "repository": {"name": "app", "repo_full_name": "lib/app"}
            }
        });
        assert!(normalize_delete(&payload).is_empty());
    }
}
