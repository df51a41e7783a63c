//! Adapter for the JSON-document backend family.
//!
//! Every resource is a JSON document fetched and re-posted whole, with the
//! credential in a custom token header. Library options deserve care: the
//! listing is queried by name, but the update endpoint is addressed by the
//! library's stable id -- posting to a name-addressed URL makes the server
//! create a duplicate library instead of updating the existing one.

use std::time::Duration;

use refrain_core::{ChangeRecord, Family, ResourceDocument, ResourceKind};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::BackendError;
use crate::resource::{Resource, Target, WriteOutcome, WriteReport};
use crate::{agent_with_timeout, urlencoded, MediaBackend};

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Library collection types that get the video analysis/metadata rules.
/// A library without a collection type is treated as mixed.
const VIDEO_COLLECTION_TYPES: [&str; 3] = ["movies", "tvshows", "mixed"];

pub struct EmbyApi {
    base_url: String,
    token: String,
    read_agent: ureq::Agent,
    write_agent: ureq::Agent,
}

impl EmbyApi {
    pub fn new(host: &str, port: u16, token: &str) -> Self {
        EmbyApi {
            base_url: format!("http://{host}:{port}/emby"),
            token: token.to_string(),
            read_agent: agent_with_timeout(READ_TIMEOUT),
            write_agent: agent_with_timeout(WRITE_TIMEOUT),
        }
    }

    fn get_json(&self, url: &str) -> Result<Value, BackendError> {
        let response = self
            .read_agent
            .get(url)
            .header("X-Emby-Token", &self.token)
            .call()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(BackendError::NotFound),
            status => return Err(BackendError::Status { status }),
        }

        response
            .into_body()
            .read_json()
            .map_err(|e| BackendError::Malformed(e.to_string()))
    }

    fn get_array(&self, path: &str) -> Result<Vec<Value>, BackendError> {
        let body = self.get_json(&format!("{}{}", self.base_url, path))?;
        body.as_array()
            .cloned()
            .ok_or_else(|| BackendError::Malformed(format!("expected array from {path}")))
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<WriteOutcome, BackendError> {
        let response = self
            .write_agent
            .post(url)
            .header("X-Emby-Token", &self.token)
            .send_json(body)
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        Ok(match response.status().as_u16() {
            200 | 204 => WriteOutcome::Applied,
            status => WriteOutcome::Rejected { status },
        })
    }

    fn find_task(&self, task_id: &str) -> Result<Value, BackendError> {
        let tasks = self.get_array("/ScheduledTasks")?;
        tasks
            .into_iter()
            .find(|t| scalar_string(t.get("Id")).as_deref() == Some(task_id))
            .ok_or(BackendError::NotFound)
    }
}

impl MediaBackend for EmbyApi {
    fn family(&self) -> Family {
        Family::Emby
    }

    fn probe(&self) -> bool {
        // A server whose library listing comes back empty is treated the
        // same as an auth failure: both trigger the credential fallback.
        matches!(self.get_array("/Library/VirtualFolders"), Ok(libs) if !libs.is_empty())
    }

    fn discover(&self, exempt_tier: bool) -> Result<Vec<Target>, BackendError> {
        // No usable library listing means the server (or credential) is not
        // workable at all; the caller skips the whole server.
        let libraries = self.get_array("/Library/VirtualFolders")?;

        let mut targets = vec![
            Target {
                kind: ResourceKind::ServerSettings,
                resource: Resource::ServerSettings,
                name: "server settings".to_string(),
            },
            Target {
                kind: ResourceKind::EncodingSettings,
                resource: Resource::EncodingSettings,
                name: "encoding settings".to_string(),
            },
        ];

        match self.get_array("/ScheduledTasks") {
            Ok(tasks) => targets.extend(task_targets(&tasks)),
            Err(err) => warn!(error = %err, "scheduled task listing failed, skipping task targets"),
        }

        if exempt_tier {
            match self.get_array("/Users") {
                Ok(users) => targets.extend(user_targets(&users)),
                Err(err) => warn!(error = %err, "user listing failed, skipping user targets"),
            }
        }

        targets.extend(library_targets(&libraries));
        Ok(targets)
    }

    fn read(&self, resource: &Resource) -> Result<ResourceDocument, BackendError> {
        match resource {
            Resource::Library { name, .. } => {
                let url = format!(
                    "{}/Library/VirtualFolders?name={}",
                    self.base_url,
                    urlencoded(name)
                );
                let body = self.get_json(&url)?;
                let list = body
                    .as_array()
                    .ok_or_else(|| BackendError::Malformed("expected array".to_string()))?;
                // the name-filtered listing returns a single-element array
                let config = list.first().cloned().ok_or(BackendError::NotFound)?;

                let doc = ResourceDocument::with_root(config, "LibraryOptions");
                if doc.root_missing() {
                    return Err(BackendError::Malformed(
                        "library config has no LibraryOptions".to_string(),
                    ));
                }
                Ok(doc)
            }
            Resource::ServerSettings => {
                let url = format!("{}/System/Configuration", self.base_url);
                Ok(ResourceDocument::new(self.get_json(&url)?))
            }
            Resource::EncodingSettings => {
                let url = format!("{}/System/Configuration/encoding", self.base_url);
                Ok(ResourceDocument::new(self.get_json(&url)?))
            }
            Resource::TaskSchedule { task_id } => {
                let task = self.find_task(task_id)?;
                let interval = task.get("IntervalTicks").cloned().unwrap_or(json!(0));
                Ok(ResourceDocument::new(json!({ "IntervalTicks": interval })))
            }
            Resource::TaskTriggers { task_id } => {
                let task = self.find_task(task_id)?;
                let triggers = task.get("Triggers").cloned().unwrap_or(json!([]));
                Ok(ResourceDocument::new(json!({ "Triggers": triggers })))
            }
            Resource::UserPolicy { user_id } => {
                let url = format!("{}/Users/{}", self.base_url, urlencoded(user_id));
                let user = self.get_json(&url)?;
                let policy = user
                    .get("Policy")
                    .filter(|p| p.is_object())
                    .cloned()
                    .ok_or_else(|| BackendError::Malformed("user has no Policy".to_string()))?;
                Ok(ResourceDocument::new(policy))
            }
            Resource::UserHomeScreen { user_id } => {
                let url = format!("{}/Users/{}", self.base_url, urlencoded(user_id));
                let user = self.get_json(&url)?;
                let config = user
                    .get("Configuration")
                    .filter(|c| c.is_object())
                    .cloned()
                    .ok_or_else(|| {
                        BackendError::Malformed("user has no Configuration".to_string())
                    })?;
                Ok(ResourceDocument::new(config))
            }
            Resource::Preferences => Err(BackendError::Unsupported),
        }
    }

    fn write(
        &self,
        resource: &Resource,
        document: &ResourceDocument,
        _changes: &[ChangeRecord],
    ) -> Result<WriteReport, BackendError> {
        let outcome = match resource {
            Resource::Library { id, .. } => {
                // full parent document, addressed by stable id -- never by name
                let url = library_options_url(&self.base_url, id);
                self.post_json(&url, document.body())?
            }
            Resource::ServerSettings => {
                let url = format!("{}/System/Configuration", self.base_url);
                self.post_json(&url, document.body())?
            }
            Resource::EncodingSettings => {
                let url = format!("{}/System/Configuration/encoding", self.base_url);
                self.post_json(&url, document.body())?
            }
            Resource::TaskSchedule { task_id } => {
                // a schedule update re-enables the task alongside the interval
                let mut payload = document.body().clone();
                if let Value::Object(map) = &mut payload {
                    map.insert("IsEnabled".to_string(), json!(true));
                }
                let url = format!("{}/ScheduledTasks/{}", self.base_url, urlencoded(task_id));
                self.post_json(&url, &payload)?
            }
            Resource::TaskTriggers { task_id } => {
                let triggers = document.get("Triggers").cloned().unwrap_or(json!([]));
                let url = format!(
                    "{}/ScheduledTasks/{}/Triggers",
                    self.base_url,
                    urlencoded(task_id)
                );
                self.post_json(&url, &triggers)?
            }
            Resource::UserPolicy { user_id } => {
                let url = format!("{}/Users/{}/Policy", self.base_url, urlencoded(user_id));
                self.post_json(&url, document.body())?
            }
            Resource::UserHomeScreen { user_id } => {
                let url = format!(
                    "{}/Users/{}/Configuration",
                    self.base_url,
                    urlencoded(user_id)
                );
                self.post_json(&url, document.body())?
            }
            Resource::Preferences => return Err(BackendError::Unsupported),
        };

        Ok(WriteReport::Document(outcome))
    }

    fn supports_field_writes(&self) -> bool {
        false
    }
}

// ──────────────────────────────────────────────
// Target enumeration helpers
// ──────────────────────────────────────────────

/// Two targets per video library: the analysis options and the metadata
/// options share a selector but are governed by separate rule tables.
fn library_targets(libraries: &[Value]) -> Vec<Target> {
    let mut targets = Vec::new();
    for library in libraries {
        let id = match scalar_string(library.get("ItemId")) {
            Some(id) => id,
            None => continue,
        };
        let name = library
            .get("Name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let is_video = library
            .get("CollectionType")
            .and_then(Value::as_str)
            .map_or(true, |t| VIDEO_COLLECTION_TYPES.contains(&t));
        if !is_video {
            continue;
        }

        let resource = Resource::Library {
            name: name.clone(),
            id,
        };
        targets.push(Target {
            kind: ResourceKind::LibraryVideo,
            resource: resource.clone(),
            name: name.clone(),
        });
        targets.push(Target {
            kind: ResourceKind::LibraryMetadata,
            resource,
            name,
        });
    }
    targets
}

/// Pick the tasks the policy covers out of the full task listing: the
/// preview-generation task (triggers get cleared) and the library scan
/// (interval gets floored).
fn task_targets(tasks: &[Value]) -> Vec<Target> {
    let mut targets = Vec::new();
    for task in tasks {
        let id = match scalar_string(task.get("Id")) {
            Some(id) => id,
            None => continue,
        };
        let name = task
            .get("Name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let lower = name.to_lowercase();
        let key = task.get("Key").and_then(Value::as_str).unwrap_or("");

        if lower.contains("video preview") || key == "RefreshChapterImages" {
            targets.push(Target {
                kind: ResourceKind::TaskTriggers,
                resource: Resource::TaskTriggers { task_id: id },
                name,
            });
        } else if lower.contains("scan media library") || lower.contains("library scan") {
            targets.push(Target {
                kind: ResourceKind::TaskSchedule,
                resource: Resource::TaskSchedule { task_id: id },
                name,
            });
        }
    }
    targets
}

/// Two targets per adjustable user. Admin and passwordless (system)
/// accounts are left untouched.
fn user_targets(users: &[Value]) -> Vec<Target> {
    let mut targets = Vec::new();
    for user in users {
        let id = match scalar_string(user.get("Id")) {
            Some(id) => id,
            None => continue,
        };
        let name = user
            .get("Name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();

        let has_password = user
            .get("HasPassword")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let is_admin = user
            .get("IsAdministrator")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_password || is_admin {
            continue;
        }

        targets.push(Target {
            kind: ResourceKind::UserPolicy,
            resource: Resource::UserPolicy {
                user_id: id.clone(),
            },
            name: name.clone(),
        });
        targets.push(Target {
            kind: ResourceKind::UserHomeScreen,
            resource: Resource::UserHomeScreen { user_id: id },
            name,
        });
    }
    targets
}

/// Update endpoint for a library's options bundle. Writes must address the
/// stable id: posting to the name-addressed listing endpoint makes the
/// server create a duplicate library.
fn library_options_url(base_url: &str, library_id: &str) -> String {
    format!(
        "{base_url}/Library/VirtualFolders/LibraryOptions?id={}",
        urlencoded(library_id)
    )
}

/// Backend ids arrive as either JSON strings or numbers.
fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
