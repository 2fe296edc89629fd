use std::path::{Path, PathBuf};

use tokio::process::Command;

const DEFAULT_INTERPRETER: &str = "python3";

/// Interpreter command for a runtime identifier.
///
/// `PYTHON_3_12` and `python3.12` both resolve to `python3.12`. Windows has no
/// versioned launchers, so it always uses `python`.
pub fn interpreter_command(runtime: Option<&str>) -> String {
    if cfg!(windows) {
        return "python".to_owned();
    }

    match declared_version(runtime) {
        Some((major, minor)) => format!("python{major}.{minor}"),
        None => DEFAULT_INTERPRETER.to_owned(),
    }
}

/// `(major, minor)` declared by a runtime identifier.
pub fn declared_version(runtime: Option<&str>) -> Option<(u32, u32)> {
    let runtime = runtime?.trim().to_ascii_lowercase();
    let version = runtime
        .strip_prefix("python_")
        .map(|rest| rest.replace('_', "."))
        .or_else(|| runtime.strip_prefix("python").map(ToOwned::to_owned))?;
    parse_major_minor(&version)
}

/// Parse `Python 3.12.4` as printed by `--version`.
pub fn parse_version_output(output: &str) -> Option<(u32, u32)> {
    let version = output.trim().strip_prefix("Python")?.trim();
    parse_major_minor(version)
}

fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = parts.next()?.trim().parse().ok()?;
    Some((major, minor))
}

/// Warning text when the installed interpreter differs from the declared runtime.
pub async fn version_mismatch(command: &str, runtime: Option<&str>) -> Option<String> {
    let declared = declared_version(runtime)?;
    let output = Command::new(command).arg("--version").output().await.ok()?;
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    let installed = parse_version_output(&text)?;
    (installed != declared).then(|| {
        format!(
            "Runtime declares Python {}.{} but {command} is Python {}.{}",
            declared.0, declared.1, installed.0, installed.1
        )
    })
}

/// Binary directory of an active virtual environment, if it exists on disk.
pub fn virtualenv_bin(virtual_env: Option<&str>) -> Option<PathBuf> {
    let root = virtual_env.map(str::trim).filter(|value| !value.is_empty())?;
    let bin = Path::new(root).join(if cfg!(windows) { "Scripts" } else { "bin" });
    bin.is_dir().then_some(bin)
}

/// `PATH` with `bin` in front.
pub fn prepend_to_path(path: Option<&str>, bin: &Path) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    match path.filter(|value| !value.is_empty()) {
        Some(existing) => format!("{}{separator}{existing}", bin.display()),
        None => bin.display().to_string(),
    }
}

pub fn missing_interpreter_guidance(command: &str) -> String {
    format!(
        "Install {command} or activate a virtual environment that provides it, \
         or set `runtime` in the agent config to an installed Python version."
    )
}
