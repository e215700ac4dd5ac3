//! Notes API example
//!
//! This example demonstrates:
//! - Exposing a plain record type backed by the in-memory store
//! - Exposing a typed repository, configured from YAML
//! - A read-only resource
//! - Identifying callers from a request header
//!
//! ```text
//! curl localhost:3000/
//! curl -X POST localhost:3000/note -H 'content-type: application/json' -d '{"title":"hi"}'
//! curl -X POST localhost:3000/tasks -H 'x-user-role: member' -H 'content-type: application/json' -d '{"label":"ship"}'
//! curl -X DELETE localhost:3000/tasks/1 -H 'x-user-role: member'   # 403
//! ```

use exposed::prelude::*;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    #[serde(default)]
    id: i64,
    title: String,
    #[serde(default)]
    content: String,
}

impl Record for Note {
    type Id = i64;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Task {
    #[serde(default)]
    id: i32,
    label: String,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl Record for Task {
    type Id = i32;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Country {
    code: String,
    name: String,
}

impl Record for Country {
    type Id = String;

    fn id_field() -> &'static str {
        "code"
    }
}

#[derive(Default)]
struct TaskRepository {
    tasks: Mutex<BTreeMap<i32, Task>>,
}

#[async_trait]
impl Repository for TaskRepository {
    type Record = Task;

    async fn find_all(&self) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(tasks.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &i32) -> Result<Option<Task>> {
        let tasks = self.tasks.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(tasks.get(id).cloned())
    }

    async fn save(&self, mut task: Task) -> Result<Task> {
        let mut tasks = self.tasks.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        if task.id == 0 {
            task.id = tasks.keys().max().copied().unwrap_or(0) + 1;
        }
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn delete_by_id(&self, id: &i32) -> Result<bool> {
        let mut tasks = self.tasks.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(tasks.remove(id).is_some())
    }
}

/// Trusts an `x-user-role` header; a stand-in for real authentication
struct HeaderRoleProvider;

#[async_trait]
impl AuthProvider for HeaderRoleProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        let Some(role) = headers.get("x-user-role").and_then(|v| v.to_str().ok()) else {
            return Ok(AuthContext::Anonymous);
        };
        Ok(AuthContext::User {
            user_id: Uuid::new_v4(),
            tenant_id: None,
            roles: vec![role.to_string()],
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,exposed=debug,tower_http=debug".into()),
        )
        .init();

    let config = EngineConfig::from_yaml_str(include_str!("engine.yaml"))?;

    let countries = InMemoryStore::new(IdentifierKind::String, "code").conforming_to::<Country>();
    for (code, name) in [("fr", "France"), ("jp", "Japan"), ("br", "Brazil")] {
        countries
            .create(serde_json::json!({ "code": code, "name": name }))
            .await?;
    }

    ServerBuilder::new()
        .with_config(config)
        .with_auth_provider(HeaderRoleProvider)
        .register(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("permit_all")))
        .register(Component::repository(TaskRepository::default()).exposed())
        .register(
            Component::store::<Country, _>(countries)
                .exposed_with(ExposeMarker::new().named("countries").rule("public"))
                .with_modifier(Modifier::ReadOnly),
        )
        .serve("127.0.0.1:3000")
        .await
}
