// src/enumerate.rs
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::remote::{ListEntry, RemoteClient, Scope};
use crate::retry::{retry_call, RetryPolicy};
use crate::shutdown::StopSignal;

/// Single-shot listing of one scope: no result cap, no pagination loop.
pub struct Enumerator {
    client: Arc<dyn RemoteClient>,
    scope: Scope,
    retry: Option<RetryPolicy>,
    stop: Option<StopSignal>,
}

impl Enumerator {
    pub fn new(client: Arc<dyn RemoteClient>, scope: Scope) -> Self {
        Self {
            client,
            scope,
            retry: None,
            stop: None,
        }
    }

    /// Retry the list call itself under `policy` (off by default).
    pub fn with_retry(mut self, policy: Option<RetryPolicy>) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub async fn list(&self) -> Result<Vec<ListEntry>> {
        let entries = match &self.retry {
            None => self.client.list(&self.scope).await?,
            Some(policy) => {
                let target = scope_label(&self.scope);
                retry_call(policy, &target, self.stop.as_ref(), || {
                    self.client.list(&self.scope)
                })
                .await?
            }
        };
        info!(
            target: "enumerate",
            scope = %scope_label(&self.scope),
            count = entries.len(),
            "listed"
        );
        Ok(entries)
    }
}

fn scope_label(scope: &Scope) -> String {
    match scope {
        Scope::All => "all".to_string(),
        Scope::Prefix { bucket, prefix } => format!("{bucket}/{prefix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::remote::mock::{FailScript, ScriptedRemote};

    #[tokio::test]
    async fn list_failure_surfaces_without_retry() {
        let remote = Arc::new(ScriptedRemote::new().fail_list(FailScript::Times(1)));
        let en = Enumerator::new(remote.clone(), Scope::All);
        assert!(matches!(en.list().await, Err(SyncError::Transient { .. })));
        assert_eq!(remote.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn list_retry_recovers() {
        let remote = Arc::new(
            ScriptedRemote::new()
                .with_pages([vec!["a"]])
                .fail_list(FailScript::Times(2)),
        );
        let en = Enumerator::new(remote.clone(), Scope::All)
            .with_retry(Some(RetryPolicy::unbounded()));
        assert_eq!(en.list().await.unwrap(), vec![ListEntry::new("a")]);
        assert_eq!(remote.list_calls(), 3);
    }
}
