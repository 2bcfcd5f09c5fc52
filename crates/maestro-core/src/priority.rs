use serde::{Deserialize, Serialize};

/// Priority of a unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    /// Lenient parse used for planner output; unknown values map to `Normal`.
    pub fn parse_level(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            "critical" | "urgent" => TaskPriority::Critical,
            _ => TaskPriority::Normal,
        }
    }
}

/// Delivery priority of a hub message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl From<TaskPriority> for MessagePriority {
    fn from(priority: TaskPriority) -> Self {
        match priority {
            TaskPriority::Low => MessagePriority::Low,
            TaskPriority::Normal => MessagePriority::Normal,
            TaskPriority::High => MessagePriority::High,
            TaskPriority::Critical => MessagePriority::Urgent,
        }
    }
}
