// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-shot manifest loader.
//!
//! Reads every `.yml`/`.yaml` under the configured path (recursively for a
//! directory), parses each file as a single manifest first and as a list on
//! failure, and publishes one kind-filtered batch per subscription. Invalid
//! entries become error-carrying messages in the batch; they never abort the
//! load. Subscribers registered before `start` completes block on the
//! `loaded` signal.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::types::{Kind, Manifest};
use crate::error::{StoreError, StoreResult};

/// One loaded manifest, or the error that took its place.
#[derive(Debug, Clone)]
pub struct Message {
    /// File the entry came from.
    pub source: PathBuf,
    pub result: Result<Manifest, String>,
}

#[derive(Debug, Default)]
struct LoadState {
    messages: Vec<Message>,
    error: Option<String>,
}

/// Loader over a manifest file or directory tree.
#[derive(Debug)]
pub struct LocalLoader {
    path: PathBuf,
    is_dir: bool,
    state: Arc<RwLock<LoadState>>,
    loaded_tx: watch::Sender<bool>,
    loaded_rx: watch::Receiver<bool>,
    live: AtomicBool,
}

impl LocalLoader {
    /// Fails `InvalidParameter` when the path does not exist.
    pub fn new(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path).map_err(|_| {
            StoreError::InvalidParameter(format!("manifest path {path:?} does not exist"))
        })?;

        let (loaded_tx, loaded_rx) = watch::channel(false);
        Ok(Self {
            is_dir: meta.is_dir(),
            path,
            state: Arc::new(RwLock::new(LoadState::default())),
            loaded_tx,
            loaded_rx,
            live: AtomicBool::new(false),
        })
    }

    /// Load everything and release waiting subscribers.
    pub async fn start(&self) -> StoreResult<()> {
        let outcome = self.load();

        {
            let mut state = self.state.write().await;
            match outcome {
                Ok(messages) => state.messages = messages,
                Err(err) => state.error = Some(err.to_string()),
            }
        }

        self.live.store(true, Ordering::SeqCst);
        let _ = self.loaded_tx.send(true);

        let state = self.state.read().await;
        match &state.error {
            Some(err) => Err(StoreError::InvalidFormat(err.clone())),
            None => Ok(()),
        }
    }

    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Live once `start` has run (successfully or not) and until `stop`.
    pub fn check_liveness(&self) -> StoreResult<()> {
        if self.live.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Config("manifest loader is not live".to_string()))
        }
    }

    /// Ready only when every loaded message is error-free.
    pub async fn check_readiness(&self) -> StoreResult<()> {
        self.check_liveness()?;
        let state = self.state.read().await;
        if let Some(err) = &state.error {
            return Err(StoreError::InvalidFormat(err.clone()));
        }
        for message in &state.messages {
            if let Err(err) = &message.result {
                return Err(StoreError::InvalidFormat(format!(
                    "{}: {err}",
                    message.source.display()
                )));
            }
        }
        Ok(())
    }

    /// Register a subscription; `kinds` of `None` receives every kind.
    ///
    /// The producer task waits for the `loaded` signal, filters the batch and
    /// sends it once. Error-carrying messages are delivered to every
    /// subscription regardless of kind filter.
    pub fn subscribe(
        &self,
        kinds: Option<Vec<Kind>>,
        sender: mpsc::Sender<Vec<Message>>,
    ) -> Subscription {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (error_tx, error_rx) = mpsc::channel::<String>(1);
        let mut loaded_rx = self.loaded_rx.clone();
        let state = Arc::clone(&self.state);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = &mut stop_rx => {
                    debug!("manifest subscription stopped before delivery");
                    return;
                }
                changed = loaded_rx.wait_for(|loaded| *loaded) => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            let state = state.read().await;
            if let Some(err) = &state.error {
                let _ = error_tx.send(err.clone()).await;
                return;
            }
            let batch: Vec<Message> = state
                .messages
                .iter()
                .filter(|message| match (&message.result, &kinds) {
                    (Err(_), _) => true,
                    (Ok(_), None) => true,
                    (Ok(manifest), Some(kinds)) => kinds.contains(&manifest.kind),
                })
                .cloned()
                .collect();
            // The receiver may already be gone; nothing to do then.
            let _ = sender.send(batch).await;
        });

        Subscription {
            stop: Some(stop_tx),
            errors: error_rx,
            handle,
        }
    }

    fn load(&self) -> StoreResult<Vec<Message>> {
        debug!(path = %self.path.display(), is_dir = self.is_dir, "loading manifests");

        let mut files = Vec::new();
        if self.is_dir {
            collect_manifest_files(&self.path, &mut files).map_err(|err| {
                error!(path = %self.path.display(), %err, "manifest tree walk failed");
                StoreError::InvalidFormat(format!("failed to walk manifest tree: {err}"))
            })?;
        } else {
            files.push(self.path.clone());
        }

        let mut messages = Vec::new();
        for file in files {
            messages.extend(build_messages(&file));
        }

        // (kind, name) must be unique across the loaded set.
        let mut seen = std::collections::HashSet::new();
        for message in &mut messages {
            if let Ok(manifest) = &message.result {
                if !seen.insert((manifest.kind, manifest.name.clone())) {
                    let name = manifest.name.clone();
                    let kind = manifest.kind;
                    message.result =
                        Err(format!("duplicate manifest {name:?} of kind {kind:?}"));
                }
            }
        }

        Ok(messages)
    }
}

/// Handle to an active subscription.
pub struct Subscription {
    stop: Option<oneshot::Sender<()>>,
    /// Loader-level failures (the whole load failed) arrive here.
    pub errors: mpsc::Receiver<String>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Signal the producer task to stop and wait for it to exit, so a
    /// subscriber that never read its batch does not leak the task.
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.handle.await;
    }
}

fn collect_manifest_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    // Deterministic walk order: manifest delivery order is observable.
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_manifest_files(&path, files)?;
        } else if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml") | Some("yaml")
        ) {
            files.push(path);
        }
    }
    Ok(())
}

fn build_messages(file: &Path) -> Vec<Message> {
    let data = match std::fs::read_to_string(file) {
        Ok(data) => data,
        Err(err) => {
            warn!(file = %file.display(), %err, "failed to read manifest file");
            return vec![Message {
                source: file.to_path_buf(),
                result: Err(err.to_string()),
            }];
        }
    };

    // Single document first, then a list.
    if let Ok(manifest) = serde_yaml::from_str::<Manifest>(&data) {
        return vec![validated(file, manifest)];
    }

    match serde_yaml::from_str::<Vec<Manifest>>(&data) {
        Ok(manifests) => manifests
            .into_iter()
            .map(|manifest| validated(file, manifest))
            .collect(),
        Err(err) => {
            warn!(file = %file.display(), %err, "failed to parse manifest file");
            vec![Message {
                source: file.to_path_buf(),
                result: Err(err.to_string()),
            }]
        }
    }
}

fn validated(file: &Path, manifest: Manifest) -> Message {
    let result = match manifest.validate() {
        Ok(()) => Ok(manifest),
        Err(err) => Err(err),
    };
    Message {
        source: file.to_path_buf(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keymanager-manifests-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const NODE_MANIFEST: &str = r#"
kind: Node
version: "1"
name: besu
specs:
  rpcUrl: http://besu:8545
"#;

    const STORE_LIST: &str = r#"
- kind: LocalKeys
  version: "1"
  name: local-keys
  specs: {}
- kind: Ethereum
  version: "1"
  name: eth-accounts
  specs:
    keyStore: local-keys
"#;

    #[tokio::test]
    async fn loads_single_and_list_files() {
        let dir = temp_dir();
        fs::write(dir.join("node.yml"), NODE_MANIFEST).unwrap();
        fs::write(dir.join("stores.yaml"), STORE_LIST).unwrap();
        fs::write(dir.join("ignored.txt"), "not yaml").unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let subscription = loader.subscribe(None, tx);

        loader.start().await.unwrap();
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|m| m.result.is_ok()));

        subscription.unsubscribe().await;
        loader.check_readiness().await.unwrap();
    }

    #[tokio::test]
    async fn recurses_into_subdirectories() {
        let dir = temp_dir();
        fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        fs::write(dir.join("nested/deeper/node.yml"), NODE_MANIFEST).unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let _subscription = loader.subscribe(None, tx);
        loader.start().await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn single_file_path_loads_just_it() {
        let dir = temp_dir();
        let file = dir.join("node.yml");
        fs::write(&file, NODE_MANIFEST).unwrap();

        let loader = LocalLoader::new(&file).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let _subscription = loader.subscribe(None, tx);
        loader.start().await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn missing_path_is_invalid_parameter() {
        let err = LocalLoader::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, StoreError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn invalid_entries_do_not_abort_the_batch() {
        let dir = temp_dir();
        fs::write(dir.join("good.yml"), NODE_MANIFEST).unwrap();
        fs::write(dir.join("bad.yml"), "kind: [not, a, kind]").unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let _subscription = loader.subscribe(None, tx);
        loader.start().await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.iter().filter(|m| m.result.is_ok()).count(), 1);
        assert_eq!(batch.iter().filter(|m| m.result.is_err()).count(), 1);

        // Liveness holds, readiness does not.
        loader.check_liveness().unwrap();
        assert!(loader.check_readiness().await.is_err());
    }

    #[tokio::test]
    async fn kind_filter_applies() {
        let dir = temp_dir();
        fs::write(dir.join("node.yml"), NODE_MANIFEST).unwrap();
        fs::write(dir.join("stores.yaml"), STORE_LIST).unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let _subscription = loader.subscribe(Some(vec![Kind::Node]), tx);
        loader.start().await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].result.as_ref().unwrap().kind, Kind::Node);
    }

    #[tokio::test]
    async fn duplicate_kind_name_pairs_become_errors() {
        let dir = temp_dir();
        fs::write(dir.join("a.yml"), NODE_MANIFEST).unwrap();
        fs::write(dir.join("b.yml"), NODE_MANIFEST).unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let _subscription = loader.subscribe(None, tx);
        loader.start().await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.iter().filter(|m| m.result.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn late_subscription_still_receives_the_batch() {
        let dir = temp_dir();
        fs::write(dir.join("node.yml"), NODE_MANIFEST).unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        loader.start().await.unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let _subscription = loader.subscribe(None, tx);
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_does_not_hang_without_delivery() {
        let dir = temp_dir();
        fs::write(dir.join("node.yml"), NODE_MANIFEST).unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let subscription = loader.subscribe(None, tx);

        // Never started, never delivered; unsubscribe must still return.
        tokio::time::timeout(std::time::Duration::from_secs(1), subscription.unsubscribe())
            .await
            .expect("unsubscribe leaked the producer task");
    }

    #[tokio::test]
    async fn liveness_follows_start_and_stop() {
        let dir = temp_dir();
        fs::write(dir.join("node.yml"), NODE_MANIFEST).unwrap();

        let loader = LocalLoader::new(&dir).unwrap();
        assert!(loader.check_liveness().is_err());

        loader.start().await.unwrap();
        loader.check_liveness().unwrap();

        loader.stop();
        assert!(loader.check_liveness().is_err());
    }
}
