// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Coarse scheduling hint attached to a task.
///
/// - `None`: no preference (default).
/// - `SideEffect`: the task exists for its side effects; nothing is waiting
///   on it interactively.
/// - `Initiated`: a user directly asked for this task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingIntent {
    #[default]
    None,
    SideEffect,
    Initiated,
}

impl SchedulingIntent {
    pub fn priority_class(self) -> PriorityClass {
        match self {
            SchedulingIntent::None => PriorityClass::Default,
            SchedulingIntent::SideEffect => PriorityClass::Utility,
            SchedulingIntent::Initiated => PriorityClass::UserInitiated,
        }
    }
}

impl FromStr for SchedulingIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(SchedulingIntent::None),
            "side_effect" => Ok(SchedulingIntent::SideEffect),
            "initiated" => Ok(SchedulingIntent::Initiated),
            other => Err(format!(
                "invalid scheduling intent: {other} \
                 (expected \"none\", \"side_effect\" or \"initiated\")"
            )),
        }
    }
}

/// Priority class an engine may use when picking between ready tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    Utility,
    Default,
    UserInitiated,
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriorityClass::Utility => "utility",
            PriorityClass::Default => "default",
            PriorityClass::UserInitiated => "user-initiated",
        };
        f.write_str(s)
    }
}
