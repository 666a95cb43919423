use crate::dom::snapshot::nullable;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed accessibility value (`{"type": "string", "value": ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxValue {
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AxValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self { value_type: "string".to_string(), value: Some(Value::String(value.into())), extra: Map::new() }
    }

    pub fn role(value: impl Into<String>) -> Self {
        Self { value_type: "role".to_string(), ..Self::string(value) }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxProperty {
    pub name: String,
    pub value: AxValue,
}

impl AxProperty {
    pub fn new(name: impl Into<String>, value: AxValue) -> Self {
        Self { name: name.into(), value }
    }
}

/// One node of `Accessibility.getFullAXTree`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AxValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AxValue>,
    #[serde(default, deserialize_with = "nullable")]
    pub properties: Vec<AxProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub child_ids: Vec<String>,
    #[serde(rename = "backendDOMNodeId", default, skip_serializing_if = "Option::is_none")]
    pub backend_dom_node_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AxNode {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ignored: false,
            role: None,
            name: None,
            properties: Vec::new(),
            parent_id: None,
            child_ids: Vec::new(),
            backend_dom_node_id: None,
            frame_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(AxValue::role(role));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(AxValue::string(name));
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: AxValue) -> Self {
        self.properties.push(AxProperty::new(name, value));
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_ids.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn with_backend_node(mut self, backend_node_id: i64) -> Self {
        self.backend_dom_node_id = Some(backend_node_id);
        self
    }

    pub fn with_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_ref().and_then(AxValue::as_str)
    }

    pub fn name_text(&self) -> Option<&str> {
        self.name.as_ref().and_then(AxValue::as_str)
    }

    pub fn property(&self, name: &str) -> Option<&AxValue> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_cdp_node() {
        let node: AxNode = serde_json::from_value(json!({
            "nodeId": "17",
            "ignored": false,
            "role": {"type": "role", "value": "button"},
            "chromeRole": {"type": "internalRole", "value": 9},
            "name": {"type": "computedString", "value": "Go", "sources": []},
            "properties": [
                {"name": "focusable", "value": {"type": "booleanOrUndefined", "value": true}},
                {"name": "roledescription", "value": {"type": "string", "value": "12_"}}
            ],
            "parentId": "3",
            "childIds": ["18"],
            "backendDOMNodeId": 42,
            "frameId": "MAIN"
        }))
        .unwrap();

        assert_eq!(node.role_name(), Some("button"));
        assert_eq!(node.name_text(), Some("Go"));
        assert_eq!(node.backend_dom_node_id, Some(42));
        assert_eq!(node.property("roledescription").and_then(AxValue::as_str), Some("12_"));
        assert!(node.extra.contains_key("chromeRole"));
        assert!(node.name.as_ref().unwrap().extra.contains_key("sources"));
    }

    #[test]
    fn test_ignored_node_without_role() {
        let node: AxNode = serde_json::from_value(json!({
            "nodeId": "5",
            "ignored": true,
            "ignoredReasons": [],
            "childIds": null
        }))
        .unwrap();

        assert!(node.ignored);
        assert!(node.role_name().is_none());
        assert!(node.child_ids.is_empty());
        assert!(node.properties.is_empty());
    }

    #[test]
    fn test_serialize_round_trips_wire_names() {
        let node = AxNode::new("1").with_role("Iframe").with_backend_node(7).with_frame("F");
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["backendDOMNodeId"], json!(7));
        assert_eq!(value["role"], json!({"type": "role", "value": "Iframe"}));
        assert_eq!(value["frameId"], json!("F"));
        assert!(value.get("parentId").is_none());
    }
}
