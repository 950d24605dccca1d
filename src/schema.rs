//! Declarative action schemas.
//!
//! A schema is pure data: a JSON-schema-shaped description of an action's
//! input fields plus the non-standard `rules` extension that conditions field
//! visibility on another field's runtime value. Visibility rules are a
//! UI-rendering hint only; the dispatcher enforces nothing beyond the
//! `required` arrays and the declared `enum`/type constraints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationError;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::String
    }
}

/// Comparison applied by a visibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleOperation {
    Equal,
    NotEqual,
    Empty,
    NotEmpty,
}

/// Effect of a matched visibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Hide,
    Show,
}

/// Conditions a field's visibility on runtime input. `valueA`/`valueB` may be
/// literals or `{{field}}` templates resolved against the input object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRule {
    pub operation: RuleOperation,
    pub value_a: Value,
    pub value_b: Value,
    pub action: RuleAction,
}

/// One field in an action schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<VisibilityRule>,
}

impl FieldSpec {
    pub fn string() -> Self {
        Self::typed(FieldType::String)
    }

    pub fn number() -> Self {
        Self::typed(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::typed(FieldType::Boolean)
    }

    pub fn object() -> Self {
        Self::typed(FieldType::Object)
    }

    pub fn array() -> Self {
        Self::typed(FieldType::Array)
    }

    fn typed(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Self::default()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict the field to an enumerated set of string values.
    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| Value::String((*v).into())).collect());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn rule(mut self, rule: VisibilityRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Hide this field unless another field currently equals `value`.
    /// Mirrors the catalog's most common rule shape.
    pub fn hide_unless(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.rules.push(VisibilityRule {
            operation: RuleOperation::NotEqual,
            value_a: value.into(),
            value_b: Value::String(format!("{{{{{field}}}}}")),
            action: RuleAction::Hide,
        });
        self
    }

    /// Show this field only when another field currently equals `value`.
    pub fn show_when(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.rules.push(VisibilityRule {
            operation: RuleOperation::Equal,
            value_a: value.into(),
            value_b: Value::String(format!("{{{{{field}}}}}")),
            action: RuleAction::Show,
        });
        self
    }
}

/// JSON-schema-shaped description of an action's input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for ActionSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl ActionSchema {
    pub fn object() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    pub fn require(mut self, names: &[&str]) -> Self {
        self.required.extend(names.iter().map(|n| (*n).to_string()));
        self
    }

    /// Validate `input` against the declared `required` array and the per-field
    /// `enum`/type constraints. This is the single, centralized check run by
    /// the dispatcher before any handler executes.
    pub fn validate(&self, input: &Value) -> Result<(), ValidationError> {
        let obj = input
            .as_object()
            .ok_or_else(|| ValidationError::new("input must be a JSON object"))?;

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| obj.get(name.as_str()).map_or(true, Value::is_null))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::missing_fields(missing));
        }

        for (name, spec) in &self.properties {
            let Some(value) = obj.get(name) else { continue };
            if value.is_null() {
                continue;
            }
            if !type_matches(spec.field_type, value) {
                return Err(ValidationError::new(format!(
                    "expected {}",
                    type_label(spec.field_type)
                ))
                .with_field(name.clone()));
            }
            if let Some(allowed) = &spec.enum_values {
                if !allowed.contains(value) {
                    let rendered: Vec<String> =
                        allowed.iter().map(render_enum_value).collect();
                    return Err(ValidationError::new(format!(
                        "must be one of: {}",
                        rendered.join(", ")
                    ))
                    .with_field(name.clone()));
                }
            }
        }

        Ok(())
    }

    /// Evaluate visibility rules against runtime input and return the set of
    /// currently visible field names. Fields carrying only `show` rules are
    /// hidden by default; everything else starts visible.
    pub fn visible_fields(&self, input: &Value) -> BTreeSet<String> {
        let mut visible = BTreeSet::new();
        for (name, spec) in &self.properties {
            let has_show = spec
                .rules
                .iter()
                .any(|r| r.action == RuleAction::Show);
            let mut shown = !has_show;
            for rule in &spec.rules {
                if !rule_matches(rule, input) {
                    continue;
                }
                match rule.action {
                    RuleAction::Hide => shown = false,
                    RuleAction::Show => shown = true,
                }
            }
            if shown {
                visible.insert(name.clone());
            }
        }
        visible
    }
}

fn rule_matches(rule: &VisibilityRule, input: &Value) -> bool {
    let a = resolve_template(&rule.value_a, input);
    let b = resolve_template(&rule.value_b, input);
    match rule.operation {
        RuleOperation::Equal => a == b,
        RuleOperation::NotEqual => a != b,
        RuleOperation::Empty => is_empty_value(&a),
        RuleOperation::NotEmpty => !is_empty_value(&a),
    }
}

/// Resolve `{{field}}` templates against the input object; literals pass
/// through unchanged.
fn resolve_template(value: &Value, input: &Value) -> Value {
    if let Value::String(s) = value {
        if let Some(name) = s.strip_prefix("{{").and_then(|rest| rest.strip_suffix("}}")) {
            return input.get(name.trim()).cloned().unwrap_or(Value::Null);
        }
    }
    value.clone()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn type_matches(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
    }
}

fn type_label(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "a string",
        FieldType::Number => "a number",
        FieldType::Boolean => "a boolean",
        FieldType::Object => "an object",
        FieldType::Array => "an array",
    }
}

fn render_enum_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn github_like_schema() -> ActionSchema {
        ActionSchema::object()
            .field(
                "action",
                FieldSpec::string().allowed(&["create_issue", "get_issue"]),
            )
            .field("token", FieldSpec::string())
            .field(
                "title",
                FieldSpec::string().hide_unless("action", "create_issue"),
            )
            .field(
                "endpoint",
                FieldSpec::string().show_when("useCustomEndpoint", true),
            )
            .require(&["token"])
    }

    #[test]
    fn validate_enumerates_missing_required_fields() {
        let schema = ActionSchema::object().require(&["token", "owner", "repo"]);
        let err = schema.validate(&json!({ "owner": "o" })).unwrap_err();
        assert_eq!(err.missing, vec!["token", "repo"]);
        assert!(err.to_string().contains("token, repo"));
    }

    #[test]
    fn validate_treats_null_as_missing() {
        let schema = ActionSchema::object().require(&["token"]);
        let err = schema.validate(&json!({ "token": null })).unwrap_err();
        assert_eq!(err.missing, vec!["token"]);
    }

    #[test]
    fn validate_rejects_out_of_enum_values() {
        let schema = github_like_schema();
        let err = schema
            .validate(&json!({ "token": "t", "action": "destroy_repo" }))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("action"));
        assert!(err.to_string().contains("create_issue"));
    }

    #[test]
    fn validate_checks_declared_types() {
        let schema = ActionSchema::object().field("port", FieldSpec::number());
        let err = schema.validate(&json!({ "port": "5432" })).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("port"));
        assert!(schema.validate(&json!({ "port": 5432 })).is_ok());
    }

    #[test]
    fn hide_rule_follows_the_action_field() {
        let schema = github_like_schema();
        let visible = schema.visible_fields(&json!({ "action": "create_issue" }));
        assert!(visible.contains("title"));
        let visible = schema.visible_fields(&json!({ "action": "get_issue" }));
        assert!(!visible.contains("title"));
    }

    #[test]
    fn show_rule_defaults_to_hidden() {
        let schema = github_like_schema();
        let visible = schema.visible_fields(&json!({}));
        assert!(!visible.contains("endpoint"));
        let visible = schema.visible_fields(&json!({ "useCustomEndpoint": true }));
        assert!(visible.contains("endpoint"));
    }

    #[test]
    fn schema_round_trips_through_json() {
        let schema = github_like_schema();
        let raw = serde_json::to_value(&schema).unwrap();
        assert_eq!(raw["type"], "object");
        assert_eq!(raw["properties"]["title"]["rules"][0]["operation"], "notEqual");
        assert_eq!(raw["properties"]["title"]["rules"][0]["valueB"], "{{action}}");
        let parsed: ActionSchema = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed, schema);
    }
}
