//! UI-interactive actions attached to layouts, regions and widgets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTrigger {
    Touch,
    Keyboard(String),
    Webhook,
}

impl ActionTrigger {
    pub fn parse(value: &str) -> Self {
        if let Some(key) = value.strip_prefix("keyboard:") {
            Self::Keyboard(key.to_string())
        } else if value == "webhook" {
            Self::Webhook
        } else {
            Self::Touch
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    NavLayout,
    NavWidget,
    Command,
    Next,
    Previous,
}

impl ActionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "navLayout" => Some(Self::NavLayout),
            "navWidget" => Some(Self::NavWidget),
            "command" => Some(Self::Command),
            "next" => Some(Self::Next),
            "previous" => Some(Self::Previous),
            _ => None,
        }
    }
}

/// A single interactive action: "when trigger fires on this owner, do
/// action_type against target".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub trigger: ActionTrigger,
    pub action_type: ActionType,
    /// layoutId, widgetId or command code, depending on `action_type`.
    pub target_id: Option<String>,
}
