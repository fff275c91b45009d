use crate::error::{AppError, Result};
use crate::playbooks::ActionContext;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// A side-effecting remediation operation, invoked by name from playbook steps
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult>;
}

/// Result of action execution
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub output: JsonValue,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn success(output: JsonValue) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: JsonValue::Null,
            error: Some(error.into()),
        }
    }
}

/// Registry of named actions
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn StepAction>>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action under `name`, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn StepAction>) {
        self.actions.insert(name.into(), action);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn StepAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Create the registry with all built-in actions
pub fn create_default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    // Workflow control
    registry.register("noop", Arc::new(NoopAction));
    registry.register("wait", Arc::new(WaitAction));
    registry.register("log", Arc::new(LogAction));

    // Remediation
    registry.register("isolate_system", Arc::new(IsolateSystemAction));
    registry.register("create_backup", Arc::new(CreateBackupAction));
    registry.register("scale_resources", Arc::new(ScaleResourcesAction));

    // Notification
    registry.register("send_notification", Arc::new(SendNotificationAction));

    // Generic
    match HttpRequestAction::new() {
        Ok(action) => registry.register("http_request", Arc::new(action)),
        Err(e) => warn!(error = %e, "http_request action unavailable"),
    }

    registry
}

fn required_str<'a>(params: &'a HashMap<String, JsonValue>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Validation(format!("'{}' parameter required", key)))
}

// ==================== Workflow Control Actions ====================

struct NoopAction;

#[async_trait]
impl StepAction for NoopAction {
    async fn execute(
        &self,
        _parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        Ok(ActionResult::success(json!({
            "status": "ok",
            "step_id": context.get_variable("step_id"),
        })))
    }
}

struct WaitAction;

#[async_trait]
impl StepAction for WaitAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        _context: &ActionContext,
    ) -> Result<ActionResult> {
        let duration = match parameters.get("duration_ms").and_then(|v| v.as_u64()) {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(
                parameters
                    .get("duration")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(5),
            ),
        };

        debug!(duration_ms = duration.as_millis() as u64, "Waiting");
        sleep(duration).await;

        Ok(ActionResult::success(json!({
            "waited_ms": duration.as_millis() as u64,
        })))
    }
}

struct LogAction;

#[async_trait]
impl StepAction for LogAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        let message = required_str(parameters, "message")?;
        let level = parameters
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("info");

        let incident_id = context.incident_id();
        match level {
            "error" => error!(incident_id = %incident_id, "{}", message),
            "warn" => warn!(incident_id = %incident_id, "{}", message),
            "debug" => debug!(incident_id = %incident_id, "{}", message),
            _ => info!(incident_id = %incident_id, "{}", message),
        }

        Ok(ActionResult::success(json!({ "logged": message })))
    }
}

// ==================== Remediation Actions ====================

/// Simulated network isolation of a host or service
struct IsolateSystemAction;

#[async_trait]
impl StepAction for IsolateSystemAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        let target = required_str(parameters, "target")?;
        let mode = parameters
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("network");

        info!(incident_id = %context.incident_id(), system = %target, mode, "Isolating system");

        Ok(ActionResult::success(json!({
            "isolated": true,
            "target": target,
            "mode": mode,
        })))
    }
}

/// Simulated snapshot of a data store
struct CreateBackupAction;

#[async_trait]
impl StepAction for CreateBackupAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        let target = required_str(parameters, "target")?;
        let backup_id = format!(
            "backup-{}-{}",
            target,
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        );

        info!(incident_id = %context.incident_id(), system = %target, backup_id = %backup_id, "Creating backup");

        Ok(ActionResult::success(json!({
            "backup_id": backup_id,
            "target": target,
        })))
    }
}

/// Simulated fleet resize
struct ScaleResourcesAction;

#[async_trait]
impl StepAction for ScaleResourcesAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        let service = required_str(parameters, "service")?;
        let replicas = parameters
            .get("replicas")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| AppError::Validation("'replicas' parameter required".to_string()))?;

        if replicas == 0 {
            return Ok(ActionResult::failure(format!(
                "refusing to scale {} to zero replicas",
                service
            )));
        }

        info!(incident_id = %context.incident_id(), service, replicas, "Scaling resources");

        Ok(ActionResult::success(json!({
            "service": service,
            "replicas": replicas,
        })))
    }
}

// ==================== Notification Actions ====================

struct SendNotificationAction;

#[async_trait]
impl StepAction for SendNotificationAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        let channel = required_str(parameters, "channel")?;
        let message = required_str(parameters, "message")?;

        info!(
            incident_id = %context.incident_id(),
            channel,
            message,
            "Sending notification"
        );

        Ok(ActionResult::success(json!({
            "delivered": true,
            "channel": channel,
        })))
    }
}

// ==================== Generic HTTP Request Action ====================

struct HttpRequestAction {
    client: Client,
}

impl HttpRequestAction {
    fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StepAction for HttpRequestAction {
    async fn execute(
        &self,
        parameters: &HashMap<String, JsonValue>,
        _context: &ActionContext,
    ) -> Result<ActionResult> {
        let url = required_str(parameters, "url")?;

        let method = parameters
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            _ => return Err(AppError::Validation(format!("Unsupported HTTP method: {}", method))),
        };

        if let Some(headers) = parameters.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    request = request.header(key, val_str);
                }
            }
        }

        if let Some(body) = parameters.get("body") {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();

                if status.is_success() {
                    Ok(ActionResult::success(json!({
                        "status_code": status.as_u16(),
                        "response_body": body,
                    })))
                } else {
                    Ok(ActionResult::failure(format!(
                        "HTTP request returned status {}: {}",
                        status, body
                    )))
                }
            }
            Err(e) => Ok(ActionResult::failure(format!("HTTP request failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn create_test_context() -> ActionContext {
        ActionContext::new(Uuid::new_v4(), Uuid::new_v4(), "Test", "INC-1").for_step("s1")
    }

    fn params(pairs: &[(&str, JsonValue)]) -> HashMap<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_default_registry_names() {
        let registry = create_default_registry();
        for name in [
            "noop",
            "wait",
            "log",
            "isolate_system",
            "create_backup",
            "scale_resources",
            "send_notification",
            "http_request",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(registry.resolve("reboot_universe").is_none());

        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_wait_action() {
        let result = WaitAction
            .execute(&params(&[("duration_ms", json!(10))]), &create_test_context())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output["waited_ms"], json!(10));
    }

    #[tokio::test]
    async fn test_noop_reports_step() {
        let result = NoopAction
            .execute(&HashMap::new(), &create_test_context())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["step_id"], json!("s1"));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_error() {
        let err = SendNotificationAction
            .execute(&params(&[("channel", json!("#ops"))]), &create_test_context())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'message' parameter required"));
    }

    #[tokio::test]
    async fn test_scale_to_zero_fails() {
        let result = ScaleResourcesAction
            .execute(
                &params(&[("service", json!("api")), ("replicas", json!(0))]),
                &create_test_context(),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("zero replicas"));
    }

    #[tokio::test]
    async fn test_http_request_action() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/hook")
            .with_status(200)
            .with_body("accepted")
            .create_async()
            .await;
        let broken = server
            .mock("GET", "/broken")
            .with_status(503)
            .create_async()
            .await;

        let action = HttpRequestAction::new().unwrap();
        let context = create_test_context();

        let result = action
            .execute(
                &params(&[
                    ("url", json!(format!("{}/hook", server.url()))),
                    ("method", json!("post")),
                    ("body", json!({"incident": "INC-1"})),
                ]),
                &context,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["status_code"], json!(200));
        assert_eq!(result.output["response_body"], json!("accepted"));

        let result = action
            .execute(
                &params(&[("url", json!(format!("{}/broken", server.url())))]),
                &context,
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("503"));

        ok.assert_async().await;
        broken.assert_async().await;
    }
}
