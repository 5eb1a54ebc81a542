//! Schedule to command-line translation for each supported tool.

use std::path::{Path, PathBuf};

use pipeflow_core::ToolPaths;
use pipeflow_store::{Schedule, Tool};

use crate::error::{Result, RunnerError};
use crate::types::Invocation;

const PDI_MARKERS: &[&str] = &["ERROR"];
const HOP_MARKERS: &[&str] = &["ERROR"];
const COMMAND_MARKERS: &[&str] = &["ERROR", "EXCEPTION", "FATAL"];

/// JVM sizing for the Pentaho launchers. Their stock scripts default
/// too low for production transformations.
const PDI_JAVA_OPTIONS: &str = "-Xms1024m -Xmx2048m";

/// Resolve the command line for one schedule. Does not touch the
/// filesystem; existence of the artifact is the runner's concern.
pub fn build_invocation(schedule: &Schedule, tools: &ToolPaths) -> Result<Invocation> {
    let invocation = match schedule.tool {
        Tool::Pdi => pdi_invocation(schedule, tools),
        Tool::Hop => hop_invocation(schedule, tools)?,
        Tool::Command => command_invocation(schedule),
    };

    if tools.needs_shell {
        Ok(invocation.shell_wrapped())
    } else {
        Ok(invocation)
    }
}

fn pdi_invocation(schedule: &Schedule, tools: &ToolPaths) -> Invocation {
    // Transformations (.ktr) go through pan, everything else (jobs,
    // .kjb) through kitchen.
    let is_transformation = Path::new(&schedule.file_path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ktr"));

    let program = if is_transformation {
        tools.pan.clone()
    } else {
        tools.kitchen.clone()
    };
    let install_dir = parent_dir(&program);

    Invocation {
        args: vec![format!("/file:{}", schedule.file_path)],
        env: vec![
            (
                "PENTAHO_DI_JAVA_OPTIONS".to_string(),
                PDI_JAVA_OPTIONS.to_string(),
            ),
            (
                "KETTLE_HOME".to_string(),
                install_dir.display().to_string(),
            ),
            (
                "KETTLE_JNDI_ROOT".to_string(),
                install_dir.join("simple-jndi").display().to_string(),
            ),
        ],
        cwd: install_dir,
        program,
        error_markers: PDI_MARKERS,
    }
}

fn hop_invocation(schedule: &Schedule, tools: &ToolPaths) -> Result<Invocation> {
    let project = schedule.project.as_deref().ok_or_else(|| {
        RunnerError::Invocation(format!(
            "schedule {} uses hop but has no project",
            schedule.id
        ))
    })?;
    let run_config = schedule.run_config.as_deref().ok_or_else(|| {
        RunnerError::Invocation(format!(
            "schedule {} uses hop but has no run configuration",
            schedule.id
        ))
    })?;

    Ok(Invocation {
        program: tools.hop_run.clone(),
        args: vec![
            "--file".to_string(),
            schedule.file_path.clone(),
            "--project".to_string(),
            project.to_string(),
            "--runconfig".to_string(),
            run_config.to_string(),
            "--level".to_string(),
            "Basic".to_string(),
        ],
        cwd: parent_dir(&tools.hop_run),
        env: vec![],
        error_markers: HOP_MARKERS,
    })
}

fn command_invocation(schedule: &Schedule) -> Invocation {
    Invocation {
        program: schedule.file_path.clone(),
        args: vec![],
        cwd: parent_dir(&schedule.file_path),
        env: vec![],
        error_markers: COMMAND_MARKERS,
    }
}

fn parent_dir(path: &str) -> PathBuf {
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
