use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// Identity of the step being run, handed to every action
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Variables available to `{{name}}` placeholders in step parameters
    variables: HashMap<String, String>,
}

impl ActionContext {
    /// Create a context for one execution
    pub fn new(execution_id: Uuid, playbook_id: Uuid, playbook_name: &str, incident_id: &str) -> Self {
        let mut variables = HashMap::new();
        variables.insert("execution_id".to_string(), execution_id.to_string());
        variables.insert("playbook_id".to_string(), playbook_id.to_string());
        variables.insert("playbook_name".to_string(), playbook_name.to_string());
        variables.insert("incident_id".to_string(), incident_id.to_string());

        Self { variables }
    }

    /// Copy of this context scoped to one step
    pub fn for_step(&self, step_id: &str) -> Self {
        let mut scoped = self.clone();
        scoped
            .variables
            .insert("step_id".to_string(), step_id.to_string());
        scoped
    }

    /// Get a variable value
    pub fn get_variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    pub fn incident_id(&self) -> &str {
        self.get_variable("incident_id").unwrap_or_default()
    }

    /// Substitute variables in a string
    /// Supports {{variable_name}} syntax
    pub fn substitute_string(&self, template: &str) -> String {
        let mut result = template.to_string();

        for (key, value) in &self.variables {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }

        result
    }

    /// Substitute variables in JSON parameters
    pub fn substitute_parameters(
        &self,
        params: &HashMap<String, JsonValue>,
    ) -> HashMap<String, JsonValue> {
        params
            .iter()
            .map(|(key, value)| (key.clone(), self.substitute_json_value(value)))
            .collect()
    }

    fn substitute_json_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.substitute_string(s)),
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_json_value(v)))
                    .collect(),
            ),
            JsonValue::Array(arr) => {
                JsonValue::Array(arr.iter().map(|v| self.substitute_json_value(v)).collect())
            }
            _ => value.clone(),
        }
    }
}
