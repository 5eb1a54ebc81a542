use serde::{Deserialize, Serialize};

/// Which external runner executes a schedule's artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Pentaho PDI — kitchen for jobs, pan for transformations.
    Pdi,
    /// Apache Hop — hop-run with project and run configuration.
    Hop,
    /// A script or binary executed directly.
    Command,
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tool::Pdi => "pdi",
            Tool::Hop => "hop",
            Tool::Command => "command",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pdi" => Ok(Tool::Pdi),
            "hop" => Ok(Tool::Hop),
            "command" => Ok(Tool::Command),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// Whether the run-loop considers a schedule at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ScheduleStatus::Active),
            "inactive" => Ok(ScheduleStatus::Inactive),
            other => Err(format!("unknown schedule status: {other}")),
        }
    }
}

/// A persisted workflow schedule.
///
/// The temporal fields combine with AND semantics, except `fixed_time`
/// which overrides every other constraint when set (see the due-time
/// evaluator in `pipeflow-scheduler`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Row ID — assigned on creation, never changes.
    pub id: i64,
    /// Path to the workflow/job/script artifact.
    pub file_path: String,
    /// Runner selection.
    pub tool: Tool,
    /// Hop project name (Hop only).
    pub project: Option<String>,
    /// Hop run configuration name (Hop only).
    pub run_config: Option<String>,
    /// `HH:MM` — exact-minute trigger, overrides all other fields.
    pub fixed_time: Option<String>,
    /// 0 means "not set".
    pub interval_minutes: u32,
    /// Lowercase accent-free weekday tokens (`seg` … `dom`); empty = no constraint.
    pub weekdays: Vec<String>,
    /// Day-of-month decimal strings; empty = no constraint.
    pub month_days: Vec<String>,
    /// Inclusive daily window start, `HH:MM`.
    pub window_start: Option<String>,
    /// Inclusive daily window end, `HH:MM`.
    pub window_end: Option<String>,
    pub status: ScheduleStatus,
    /// Wall-clock cap for one execution, seconds.
    pub timeout_seconds: u64,
    /// `YYYY-MM-DD HH:MM:SS` of the last execution attempt, if any.
    pub last_run_at: Option<String>,
    /// Duration of the last attempt in minutes (2 dp), if any.
    pub last_run_duration_minutes: Option<f64>,
}

impl Schedule {
    /// Base name of the artifact, used in log lines and notifications.
    pub fn artifact_name(&self) -> &str {
        std::path::Path::new(&self.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file_path)
    }
}

/// Split a comma-separated list column into trimmed lowercase tokens.
/// NULL and blank columns produce an empty list.
pub(crate) fn parse_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Normalise an optional text column: NULL or blank becomes `None`.
pub(crate) fn non_blank(raw: Option<String>) -> Option<String> {
    raw.and_then(|s| {
        let t = s.trim().to_string();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    })
}
