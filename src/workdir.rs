//! Scoped acquisition/release of a named engine volume.
//!
//! `WorkingDirectory::new` is module-private, so the only way a caller
//! can obtain one is through [`with_working_directory`] — the
//! "reject a workdir not obtained from the scoped acquirer" check
//! spec.md calls for is enforced at compile time instead of by a
//! runtime type/identity check: there is no other constructor to
//! misuse.

use std::future::Future;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::engine::EngineClient;
use crate::error::SandboxResult;

/// A named persistent volume whose lifetime spans multiple sandbox
/// invocations, optionally pinned to a specific cluster node.
pub struct WorkingDirectory {
    volume_name: String,
    node: RwLock<Option<String>>,
}

impl WorkingDirectory {
    fn new(volume_name: String) -> Self {
        WorkingDirectory {
            volume_name,
            node: RwLock::new(None),
        }
    }

    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    pub fn node(&self) -> Option<String> {
        self.node.read().clone()
    }

    /// Record the cluster node this workdir's container ran on, so
    /// subsequent runs in the same scope can pin to it. Only the first
    /// call has any effect, matching "assigned lazily on first use".
    pub fn set_node_if_unset(&self, node: String) {
        let mut guard = self.node.write();
        if guard.is_none() {
            *guard = Some(node);
        }
    }
}

/// Drops to a background volume removal unless `disarm`ed. Backstops
/// `with_working_directory` against a panic unwinding through `f`'s
/// `.await` before the normal, synchronous release runs.
struct VolumeReleaseGuard {
    engine: EngineClient,
    volume_name: String,
    armed: bool,
}

impl VolumeReleaseGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for VolumeReleaseGuard {
    fn drop(&mut self) {
        if self.armed {
            let engine = self.engine.clone();
            let volume_name = std::mem::take(&mut self.volume_name);
            tokio::spawn(async move {
                engine.remove_volume(&volume_name).await;
            });
        }
    }
}

/// Create a volume through `engine`, run `f` with a handle to it, and
/// guarantee the volume is released on every exit path — including a
/// panic inside `f` — before returning. A "not found" on release is
/// downgraded to a warning; any other engine failure during release is
/// logged but never propagated, matching `4.4`'s best-effort cleanup.
///
/// A panic unwinding out of `f`'s future is not caught here: `Drop`
/// runs on the armed guard as the stack unwinds, which schedules the
/// release on a detached task since nothing can `.await` during an
/// unwind, and the panic continues propagating to the caller.
pub async fn with_working_directory<F, Fut, T>(
    engine: &EngineClient,
    f: F,
) -> SandboxResult<T>
where
    F: FnOnce(&WorkingDirectory) -> Fut,
    Fut: Future<Output = SandboxResult<T>>,
{
    let volume_name = format!("epicbox-{}", Uuid::new_v4());
    engine.create_volume(&volume_name).await?;
    let workdir = WorkingDirectory::new(volume_name.clone());

    let mut guard = VolumeReleaseGuard {
        engine: engine.clone(),
        volume_name,
        armed: true,
    };

    let result = f(&workdir).await;

    guard.disarm();
    engine.remove_volume(workdir.volume_name()).await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_name_is_prefixed_and_unique() {
        let a = WorkingDirectory::new(format!("epicbox-{}", Uuid::new_v4()));
        let b = WorkingDirectory::new(format!("epicbox-{}", Uuid::new_v4()));
        assert!(a.volume_name().starts_with("epicbox-"));
        assert_ne!(a.volume_name(), b.volume_name());
    }

    #[test]
    fn node_pinning_is_set_once() {
        let workdir = WorkingDirectory::new("epicbox-test".to_string());
        assert_eq!(workdir.node(), None);
        workdir.set_node_if_unset("node-a".to_string());
        workdir.set_node_if_unset("node-b".to_string());
        assert_eq!(workdir.node(), Some("node-a".to_string()));
    }
}
