//! Thin, retrying adapter over the container-engine HTTP API.
//!
//! Engine clients are cached in a process-wide map keyed by the
//! `(read_retry_count, status_forcelist)` pair, mirroring the retry
//! loop shape of the historical `api::client::HttpClient::request`
//! (the `backoff` crate listed in the original dependency table is
//! never actually used there, so the retry here is hand-rolled the
//! same way).

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    RemoveContainerOptions,
};
use bollard::models::{ContainerCreateResponse, ContainerInspectResponse};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{SandboxError, SandboxResult};

const MAX_RETRIES: u32 = 9;
const BASE_RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Which status codes a given call-site treats as retryable, beyond
/// the connection-level failures bollard itself reports. Each variant
/// backs its own cached client (see [`EngineClient::get`]), so
/// lifecycle.rs picks the variant per call site rather than sharing
/// one client across every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusForcelist {
    /// Uploads: retry on 404 (container not yet visible) and 500.
    UploadRetry,
    /// Create/start/attach/inspect: retry on 404 and 500.
    ContainerRetry,
}

impl StatusForcelist {
    fn matches(&self, status: u16) -> bool {
        match self {
            StatusForcelist::UploadRetry | StatusForcelist::ContainerRetry => {
                status == 404 || status == 500
            }
        }
    }
}

type CacheKey = (u32, StatusForcelist);

struct ClientCache {
    docker: Docker,
    clients: DashMap<CacheKey, Arc<EngineClient>>,
}

fn cache() -> &'static OnceLock<ClientCache> {
    static CACHE: OnceLock<ClientCache> = OnceLock::new();
    &CACHE
}

/// A cached family of engine clients, one per `(read_retry, status_forcelist)`.
/// The connection itself is shared; what differs between cached entries
/// is the retry policy applied on top of it. Cheap to clone — cloning
/// shares the underlying connection and policy, it does not create a
/// new cache entry.
#[derive(Clone)]
pub struct EngineClient {
    docker: Docker,
    read_retry: u32,
    status_forcelist: StatusForcelist,
}

impl EngineClient {
    /// Fetch (creating on first use) the client for this policy. `url`
    /// is only consulted the very first time any client is requested —
    /// later calls reuse the established connection, matching the "single
    /// pool per tuple, one underlying connection" description.
    pub fn get(
        url: Option<&str>,
        read_retry: u32,
        status_forcelist: StatusForcelist,
    ) -> SandboxResult<Arc<Self>> {
        let cache = cache().get_or_init(|| {
            let docker = match url {
                Some(url) => Docker::connect_with_http(url, 30, bollard::API_DEFAULT_VERSION)
                    .expect("invalid engine url"),
                None => Docker::connect_with_local_defaults().expect("no local engine socket"),
            };
            ClientCache {
                docker,
                clients: DashMap::new(),
            }
        });

        let key = (read_retry, status_forcelist);
        if let Some(existing) = cache.clients.get(&key) {
            return Ok(existing.value().clone());
        }
        let client = Arc::new(EngineClient {
            docker: cache.docker.clone(),
            read_retry,
            status_forcelist,
        });
        cache.clients.insert(key, client.clone());
        Ok(client)
    }

    fn backoff(attempt: u32) -> Duration {
        let delay = BASE_RETRY_DELAY * 2u32.pow(attempt.saturating_sub(1));
        std::cmp::min(delay, MAX_RETRY_DELAY)
    }

    /// Run `op` with retry on the configured status forcelist plus
    /// bollard connection-level failures, up to this client's
    /// `read_retry` budget (capped at `MAX_RETRIES`).
    async fn with_retry<T, F, Fut>(&self, label: &str, mut op: F) -> SandboxResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, bollard::errors::Error>>,
    {
        let retries = self.read_retry.min(MAX_RETRIES);
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                let delay = Self::backoff(attempt);
                debug!(label, attempt, ?delay, "retrying engine call");
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = status_code(&err)
                        .map(|status| self.status_forcelist.matches(status))
                        .unwrap_or(true);
                    if retryable && attempt < retries {
                        warn!(label, attempt, %err, "engine call failed, retrying");
                        last_error = Some(err);
                        continue;
                    }
                    return Err(SandboxError::Docker(err));
                }
            }
        }

        Err(last_error
            .map(SandboxError::Docker)
            .unwrap_or(SandboxError::Other("retry loop exited without result".to_string())))
    }

    /// Create a container. A 409 name conflict is treated as success —
    /// the name is looked up instead of propagating the error.
    pub async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> SandboxResult<String> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let result = self
            .with_retry("create_container", || {
                self.docker.create_container(Some(options.clone()), config.clone())
            })
            .await;

        match result {
            Ok(ContainerCreateResponse { id, .. }) => Ok(id),
            Err(SandboxError::Docker(err)) if status_code(&err) == Some(409) => {
                debug!(name, "container name already exists, treating as idempotent success");
                Ok(name.to_string())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn attach_container(
        &self,
        name: &str,
    ) -> SandboxResult<AttachContainerResults> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(false),
            ..Default::default()
        };
        self.with_retry("attach_container", || {
            self.docker.attach_container(name, Some(options.clone()))
        })
        .await
    }

    pub async fn start_container(&self, name: &str) -> SandboxResult<()> {
        use bollard::container::StartContainerOptions;
        self.with_retry("start_container", || {
            self.docker
                .start_container(name, None::<StartContainerOptions<String>>)
        })
        .await
    }

    pub async fn inspect_container(&self, name: &str) -> SandboxResult<ContainerInspectResponse> {
        self.with_retry("inspect_container", || self.docker.inspect_container(name, None))
            .await
    }

    /// Extract `tar_bytes` into `path` inside the container. Retried on
    /// 404 (container not yet visible right after create) and 500
    /// ("cannot allocate memory during untar" is a known transient).
    pub async fn put_archive(&self, name: &str, path: &str, tar_bytes: &[u8]) -> SandboxResult<()> {
        use bollard::container::UploadToContainerOptions;
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        let body = tar_bytes.to_vec();
        self.with_retry("put_archive", || {
            self.docker
                .upload_to_container(name, Some(options.clone()), body.clone().into())
        })
        .await
    }

    /// Forced removal, swallowing "no such container" — best-effort cleanup.
    pub async fn remove_container(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        if let Err(err) = self.docker.remove_container(name, Some(options)).await {
            if status_code(&err) != Some(404) {
                warn!(name, %err, "failed to remove container");
            }
        }
    }

    pub async fn create_volume(&self, name: &str) -> SandboxResult<()> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            ..Default::default()
        };
        self.with_retry("create_volume", || self.docker.create_volume(options.clone()))
            .await
            .map(|_| ())
    }

    /// Remove a volume. "Not found" is downgraded to a warning; any
    /// other failure is logged but not re-raised — release is
    /// best-effort.
    pub async fn remove_volume(&self, name: &str) {
        match self.docker.remove_volume(name, None::<RemoveVolumeOptions>).await {
            Ok(()) => {}
            Err(err) if status_code(&err) == Some(404) => {
                warn!(name, "volume already gone on release");
            }
            Err(err) => {
                warn!(name, %err, "failed to remove volume");
            }
        }
    }
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code as u16)
        }
        _ => None,
    }
}
