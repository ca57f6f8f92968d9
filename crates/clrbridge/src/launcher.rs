//! Starting the companion bridge server on demand.

use std::ffi::OsString;
use std::process::{Child, Command, Stdio};

use crate::config::ServerSpec;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to launch bridge server: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("bridge server launch failed: {0}")]
    Other(String),
}

/// Extension point for different server start strategies.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self, spec: &ServerSpec, service_url: &str) -> Result<Child, LaunchError>;
}

/// Runs the server as a child process, through its runtime host if one is set.
///
/// The child is not killed when the session ends; the server outlives the
/// client so later sessions can reuse it.
pub struct ProcessLauncher;

impl ServerLauncher for ProcessLauncher {
    fn launch(&self, spec: &ServerSpec, service_url: &str) -> Result<Child, LaunchError> {
        let (program, args) = command_line(spec, service_url);
        tracing::info!(
            program = %program.to_string_lossy(),
            server = %spec.server.display(),
            url = service_url,
            "Launching bridge server"
        );
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        tracing::debug!(pid = child.id(), "Bridge server started");
        Ok(child)
    }
}

/// Program and arguments used to start the server described by `spec`.
pub fn command_line(spec: &ServerSpec, service_url: &str) -> (OsString, Vec<OsString>) {
    let mut args: Vec<OsString> = Vec::new();
    let program = match &spec.runtime {
        Some(runtime) => {
            if let Some(flag) = runtime_flag(runtime) {
                args.push(flag.into());
            }
            args.push(spec.server.clone().into_os_string());
            OsString::from(runtime)
        }
        None => spec.server.clone().into_os_string(),
    };

    args.push("-url".into());
    args.push(service_url.into());
    if let Some(dll) = &spec.dll {
        args.push("-dll".into());
        args.push(dll.clone().into_os_string());
    }
    args.extend(spec.args.iter().map(OsString::from));
    (program, args)
}

fn runtime_flag(runtime: &str) -> Option<&'static str> {
    (runtime.rsplit('/').next() == Some("mono")).then_some("--llvm")
}
