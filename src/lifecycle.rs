//! create → populate → attach → stream-I/O → wait-with-deadline →
//! classify → destroy.

use std::time::Duration;

use bollard::container::Config;
use bollard::models::{HostConfig, HostConfigLogConfig, Mount, MountTypeEnum};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::{classify, InspectedState, SandboxRunResult};
use crate::communicator::communicate;
use crate::engine::{EngineClient, StatusForcelist};
use crate::error::{SandboxError, SandboxResult};
use crate::limits::{LimitSpec, LimitsOverride};
use crate::profile::{self, Profile};
use crate::tarwriter::{build_tar, SandboxFile};
use crate::workdir::WorkingDirectory;

const SANDBOX_PATH: &str = "/sandbox";

/// A container created but not yet (or not necessarily) started.
/// Must be destroyed exactly once; `run` and the scoped helpers in
/// this module enforce that by consuming the value.
pub struct Sandbox {
    pub id: Uuid,
    pub container_handle: String,
    realtime_limit_s: Option<i64>,
}

/// Everything a caller may override for one run, on top of the
/// profile's defaults.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions<'a> {
    pub command: Option<String>,
    pub files: Vec<SandboxFile>,
    pub limits: LimitsOverride,
    pub workdir: Option<&'a WorkingDirectory>,
}

/// Create/start/attach/inspect all share this policy and read-retry
/// budget (spec.md §4.1's "read=5, overridable per call site").
fn container_engine_client() -> SandboxResult<std::sync::Arc<EngineClient>> {
    EngineClient::get(profile::engine_url().as_deref(), 5, StatusForcelist::ContainerRetry)
}

/// Uploads get their own cached client: same forcelist, but the policy
/// is tracked separately so a change to one call site's retry budget
/// doesn't silently also change the other's.
fn upload_engine_client() -> SandboxResult<std::sync::Arc<EngineClient>> {
    EngineClient::get(profile::engine_url().as_deref(), 5, StatusForcelist::UploadRetry)
}

/// `create(profile_name, ...)`. Looks up the profile, merges limits,
/// assembles host-config, creates the container (idempotent on 409),
/// stages files if given, and returns a `Sandbox` ready for `start`.
pub async fn create(profile_name: &str, options: CreateOptions<'_>) -> SandboxResult<Sandbox> {
    let profile = profile::lookup(profile_name)?;
    let limits = LimitSpec::merge(&options.limits);
    let engine = container_engine_client()?;

    let effective_command = options
        .command
        .or_else(|| profile.default_command.clone())
        .unwrap_or_else(|| "true".to_string());

    let config = build_config(&profile, &effective_command, &limits, options.workdir);

    let id = Uuid::new_v4();
    let name = format!("{}{}", profile::container_prefix(), id);
    let container_handle = engine.create_container(&name, config).await?;

    if let Some(workdir) = options.workdir {
        if workdir.node().is_none() {
            if let Ok(inspect) = engine.inspect_container(&container_handle).await {
                if let Some(node) = InspectedState::node_name(&inspect) {
                    workdir.set_node_if_unset(node);
                }
            }
        }
    }

    if !options.files.is_empty() {
        let tar_bytes = build_tar(&options.files).map_err(SandboxError::Io)?;
        let uploader = upload_engine_client()?;
        uploader.put_archive(&container_handle, SANDBOX_PATH, &tar_bytes).await?;
    }

    Ok(Sandbox {
        id,
        container_handle,
        realtime_limit_s: limits.realtime_s,
    })
}

fn build_config(
    profile: &Profile,
    effective_command: &str,
    limits: &LimitSpec,
    workdir: Option<&WorkingDirectory>,
) -> Config<String> {
    let mut mounts = Vec::new();
    if let Some(workdir) = workdir {
        mounts.push(Mount {
            target: Some(SANDBOX_PATH.to_string()),
            source: Some(workdir.volume_name().to_string()),
            typ: Some(MountTypeEnum::VOLUME),
            read_only: Some(false),
            ..Default::default()
        });
    }

    let ulimits = limits
        .ulimits()
        .into_iter()
        .map(|u| bollard::models::ResourcesUlimits {
            name: Some(u.name.to_string()),
            soft: Some(u.soft),
            hard: Some(u.hard),
        })
        .collect();

    let environment = workdir.and_then(|w| w.node()).map(|node| {
        vec![format!("constraint:node=={}", node)]
    });

    let memory_bytes = limits.memory_bytes();

    let host_config = HostConfig {
        mounts: Some(mounts),
        memory: memory_bytes,
        memory_swap: memory_bytes,
        pids_limit: limits.pids_limit(),
        ulimits: Some(ulimits),
        // Disable the logging driver entirely to avoid unbounded host
        // disk use from an ephemeral, already-captured-via-attach container.
        log_config: Some(HostConfigLogConfig {
            typ: Some("none".to_string()),
            config: None,
        }),
        readonly_rootfs: Some(profile.read_only),
        ..Default::default()
    };

    Config {
        image: Some(profile.image.clone()),
        user: Some(profile.user.clone()),
        cmd: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            effective_command.to_string(),
        ]),
        env: environment,
        open_stdin: Some(true),
        stdin_once: Some(false),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        network_disabled: Some(profile.network_disabled),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// `start(sandbox, stdin?)`. Attaches, starts, pumps I/O under the
/// sandbox's realtime deadline, inspects on normal termination, and
/// classifies the result.
pub async fn start(sandbox: &Sandbox, stdin: Option<Vec<u8>>) -> SandboxResult<SandboxRunResult> {
    let engine = container_engine_client()?;
    let attached = engine.attach_container(&sandbox.container_handle).await?;
    engine.start_container(&sandbox.container_handle).await?;

    let deadline = Duration::from_secs(sandbox.realtime_limit_s.unwrap_or(5).max(0) as u64);
    let outcome = communicate(attached, stdin, deadline).await?;

    let inspected = match &outcome {
        crate::communicator::CommunicatorOutcome::TimedOut => None,
        crate::communicator::CommunicatorOutcome::Completed { .. } => {
            let inspect = engine.inspect_container(&sandbox.container_handle).await?;
            Some(InspectedState::from_inspect(&inspect))
        }
    };

    let result = classify(outcome, inspected);
    info!(
        container = %sandbox.container_handle,
        exit_code = ?result.exit_code,
        timeout = result.timeout,
        oom_killed = result.oom_killed,
        stdout = %crate::classify::truncated_for_log(&result.stdout),
        stderr = %crate::classify::truncated_for_log(&result.stderr),
        "sandbox run result"
    );
    Ok(result)
}

/// `destroy(sandbox)`. Forced removal, best-effort: engine failures are
/// logged and swallowed, never raised.
pub async fn destroy(sandbox: Sandbox) {
    match container_engine_client() {
        Ok(engine) => engine.remove_container(&sandbox.container_handle).await,
        Err(err) => warn!(%err, "could not obtain engine client to destroy sandbox"),
    }
}

/// `run(...)` convenience: create, start, always destroy.
pub async fn run(
    profile_name: &str,
    options: CreateOptions<'_>,
    stdin: Option<Vec<u8>>,
) -> SandboxResult<SandboxRunResult> {
    let sandbox = create(profile_name, options).await?;
    let result = start(&sandbox, stdin).await;
    destroy(sandbox).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_command_falls_back_to_true_literal() {
        let profile = Profile::new("empty", "alpine");
        let limits = LimitSpec::defaults();
        let config = build_config(&profile, "true", &limits, None);
        assert_eq!(
            config.cmd,
            Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "true".to_string()
            ])
        );
    }

    #[test]
    fn network_disabled_profile_sets_config_flag() {
        let profile = Profile::new("locked", "alpine").with_network_disabled(true);
        let limits = LimitSpec::defaults();
        let config = build_config(&profile, "true", &limits, None);
        assert_eq!(config.network_disabled, Some(true));
    }

    #[test]
    fn network_enabled_profile_leaves_flag_false() {
        let profile = Profile::new("open", "alpine");
        let limits = LimitSpec::defaults();
        let config = build_config(&profile, "true", &limits, None);
        assert_eq!(config.network_disabled, Some(false));
    }

    #[test]
    fn memory_limit_sets_equal_mem_and_swap() {
        let profile = Profile::new("p", "alpine");
        let limits = LimitSpec::merge(&LimitsOverride {
            memory: Some(128),
            ..Default::default()
        });
        let config = build_config(&profile, "true", &limits, None);
        let host_config = config.host_config.unwrap();
        let expected = 128 * 1024 * 1024;
        assert_eq!(host_config.memory, Some(expected));
        assert_eq!(host_config.memory_swap, Some(expected));
    }

    #[test]
    fn log_driver_is_disabled() {
        let profile = Profile::new("p", "alpine");
        let limits = LimitSpec::defaults();
        let config = build_config(&profile, "true", &limits, None);
        let log_config = config.host_config.unwrap().log_config.unwrap();
        assert_eq!(log_config.typ.as_deref(), Some("none"));
    }
}
