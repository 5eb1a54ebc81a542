use std::path::PathBuf;

/// A fully resolved command line, ready to spawn. The adapter builds
/// one of these from a schedule; nothing downstream looks at the
/// schedule's tool again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory the child starts in. The ETL runners resolve
    /// their own libraries and plugin registries relative to it.
    pub cwd: PathBuf,
    /// Extra environment on top of the inherited one.
    pub env: Vec<(String, String)>,
    /// Substrings whose presence in any output line marks the run as
    /// failed regardless of exit code. Matched case-insensitively.
    pub error_markers: &'static [&'static str],
}

impl Invocation {
    /// Re-route the invocation through the platform shell. Required on
    /// Windows where the ETL entry points are batch files that
    /// CreateProcess will not launch directly.
    pub fn shell_wrapped(self) -> Invocation {
        let mut line = quote(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        let (program, args) = if cfg!(windows) {
            ("cmd".to_string(), vec!["/C".to_string(), line])
        } else {
            ("sh".to_string(), vec!["-c".to_string(), line])
        };
        Invocation {
            program,
            args,
            cwd: self.cwd,
            env: self.env,
            error_markers: self.error_markers,
        }
    }
}

fn quote(s: &str) -> String {
    if s.contains(' ') {
        format!("\"{s}\"")
    } else {
        s.to_string()
    }
}

/// How one execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit code 0 and no error marker in the output.
    Success,
    /// Non-zero exit, or a marker line in the output.
    Failed,
    /// Killed at the schedule's wall-clock cap.
    TimedOut,
    /// The child never started (missing artifact, bad invocation,
    /// spawn failure).
    LaunchFailed,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::TimedOut => "timed out",
            Outcome::LaunchFailed => "launch failed",
        };
        write!(f, "{s}")
    }
}

/// What one execution attempt produced. Always recorded against the
/// schedule, whatever the outcome.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    /// Wall-clock duration in minutes, rounded to 2 decimal places.
    pub duration_minutes: f64,
    /// Output lines that matched an error marker, in order.
    pub error_lines: Vec<String>,
}
