use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::EngineError;

/// Sentinel pid the platform reports for system sounds.
pub const SYSTEM_PID: i32 = -1;

/// Session names containing any of these route to Chat when no override
/// says otherwise.
const CHAT_APPS: &[&str] = &["discord", "whatsapp", "telegram", "skype", "zoom"];

/// Logical audio purpose; the unit of routing and volume control.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Game,
    Others,
    System,
    Chat,
    Microphone,
}

impl Category {
    /// Output-side categories, in the mixer's display order.
    pub const OUTPUTS: [Category; 4] = [
        Category::Game,
        Category::Others,
        Category::System,
        Category::Chat,
    ];

    pub const ALL: [Category; 5] = [
        Category::Game,
        Category::Others,
        Category::System,
        Category::Chat,
        Category::Microphone,
    ];

    pub fn is_output(self) -> bool {
        self != Category::Microphone
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Game => "game",
            Category::Others => "others",
            Category::System => "system",
            Category::Chat => "chat",
            Category::Microphone => "microphone",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "game" => Ok(Category::Game),
            "others" => Ok(Category::Others),
            "system" => Ok(Category::System),
            "chat" => Ok(Category::Chat),
            "microphone" => Ok(Category::Microphone),
            other => Err(EngineError::UnknownCategory(other.to_string())),
        }
    }
}

/// Fallback categorization for sessions with no explicit override.
/// Rule order is fixed: system sentinel, known chat apps, then Others.
pub fn auto_categorize(name: &str, pid: i32) -> Category {
    let lname = name.to_lowercase();
    if pid == SYSTEM_PID || lname.contains("system") {
        return Category::System;
    }
    if CHAT_APPS.iter().any(|app| lname.contains(app)) {
        return Category::Chat;
    }
    Category::Others
}
