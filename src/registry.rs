// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Manifest-driven runtime registry.
//!
//! Consumes the loader's batch and builds the live object graph: key stores
//! first, then the Ethereum connectors that reference them, then node
//! proxies, then roles. Build failures are recorded per component and fail
//! readiness without taking the service down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::auth::{Permission, Role};
use crate::database::MetadataDb;
use crate::error::{StoreError, StoreResult};
use crate::manifests::{EthereumSpecs, Kind, LocalLoader, Manifest, Message, NodeSpecs, RoleSpecs};
use crate::nodes::NodeProxy;
use crate::stores::{EthConnector, KeyStore, LocalKeyStore};

/// Live object graph built from manifests.
pub struct Registry {
    db: MetadataDb,
    stores: RwLock<HashMap<String, Arc<EthConnector>>>,
    /// Manifest order; the default store mapping for nodes preserves it.
    store_order: RwLock<Vec<String>>,
    nodes: RwLock<HashMap<String, Arc<NodeProxy>>>,
    roles: RwLock<HashMap<String, Role>>,
    component_errors: RwLock<Vec<String>>,
    live: AtomicBool,
}

impl Registry {
    pub fn new(db: MetadataDb) -> Self {
        Self {
            db,
            stores: RwLock::new(HashMap::new()),
            store_order: RwLock::new(Vec::new()),
            nodes: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            component_errors: RwLock::new(Vec::new()),
            live: AtomicBool::new(false),
        }
    }

    /// Subscribe to the loader, wait for the batch and build everything.
    pub async fn start(&self, loader: &LocalLoader) -> StoreResult<()> {
        let (tx, mut rx) = mpsc::channel(1);
        let subscription = loader.subscribe(None, tx);

        loader.start().await?;
        let batch = rx.recv().await.unwrap_or_default();
        subscription.unsubscribe().await;

        self.apply(batch);
        self.live.store(true, Ordering::SeqCst);

        let stores = self.stores.read().expect("registry lock poisoned");
        let nodes = self.nodes.read().expect("registry lock poisoned");
        info!(
            stores = stores.len(),
            nodes = nodes.len(),
            "registry started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn record_error(&self, message: String) {
        error!("{message}");
        self.component_errors
            .write()
            .expect("registry lock poisoned")
            .push(message);
    }

    fn apply(&self, batch: Vec<Message>) {
        let mut manifests: Vec<Manifest> = Vec::new();
        for message in batch {
            match message.result {
                Ok(manifest) => manifests.push(manifest),
                Err(err) => {
                    self.record_error(format!(
                        "manifest {}: {err}",
                        message.source.display()
                    ));
                }
            }
        }

        // Key stores first: connectors and nodes reference them by name.
        let mut key_stores: HashMap<String, Arc<dyn KeyStore>> = HashMap::new();
        for manifest in manifests.iter().filter(|m| is_key_store_kind(m.kind)) {
            match manifest.kind {
                Kind::LocalKeys => {
                    key_stores.insert(manifest.name.clone(), Arc::new(LocalKeyStore::new()));
                }
                // Backend drivers are external collaborators; a deployment
                // that names one must link it in.
                other => self.record_error(format!(
                    "store {:?}: no driver linked for kind {other:?}",
                    manifest.name
                )),
            }
        }

        for manifest in manifests.iter().filter(|m| m.kind == Kind::Ethereum) {
            let specs: EthereumSpecs = match serde_yaml::from_value(manifest.specs.clone()) {
                Ok(specs) => specs,
                Err(err) => {
                    self.record_error(format!("ethereum store {:?}: {err}", manifest.name));
                    continue;
                }
            };
            let Some(store) = key_stores.get(&specs.key_store) else {
                self.record_error(format!(
                    "ethereum store {:?} references unknown key store {:?}",
                    manifest.name, specs.key_store
                ));
                continue;
            };

            let connector = Arc::new(EthConnector::new(
                manifest.name.clone(),
                Arc::clone(store),
                self.db.eth_accounts(),
            ));
            self.stores
                .write()
                .expect("registry lock poisoned")
                .insert(manifest.name.clone(), connector);
            self.store_order
                .write()
                .expect("registry lock poisoned")
                .push(manifest.name.clone());
        }

        for manifest in manifests.iter().filter(|m| m.kind == Kind::Node) {
            let specs: NodeSpecs = match serde_yaml::from_value(manifest.specs.clone()) {
                Ok(specs) => specs,
                Err(err) => {
                    self.record_error(format!("node {:?}: {err}", manifest.name));
                    continue;
                }
            };

            let mapped = if specs.stores.is_empty() {
                self.store_order
                    .read()
                    .expect("registry lock poisoned")
                    .clone()
            } else {
                specs.stores.clone()
            };

            let stores = self.stores.read().expect("registry lock poisoned");
            let mut connectors = Vec::with_capacity(mapped.len());
            let mut missing = None;
            for name in &mapped {
                match stores.get(name) {
                    Some(connector) => connectors.push(Arc::clone(connector)),
                    None => {
                        missing = Some(name.clone());
                        break;
                    }
                }
            }
            drop(stores);

            if let Some(name) = missing {
                self.record_error(format!(
                    "node {:?} references unknown store {:?}",
                    manifest.name, name
                ));
                continue;
            }

            match NodeProxy::new(manifest.name.clone(), specs, connectors) {
                Ok(proxy) => {
                    self.nodes
                        .write()
                        .expect("registry lock poisoned")
                        .insert(manifest.name.clone(), Arc::new(proxy));
                }
                Err(err) => self.record_error(format!("node {:?}: {err}", manifest.name)),
            }
        }

        for manifest in manifests.iter().filter(|m| m.kind == Kind::Role) {
            let specs: RoleSpecs = match serde_yaml::from_value(manifest.specs.clone()) {
                Ok(specs) => specs,
                Err(err) => {
                    self.record_error(format!("role {:?}: {err}", manifest.name));
                    continue;
                }
            };
            self.roles.write().expect("registry lock poisoned").insert(
                manifest.name.clone(),
                Role {
                    name: manifest.name.clone(),
                    permissions: specs.permissions,
                },
            );
        }
    }

    pub fn store(&self, name: &str) -> Option<Arc<EthConnector>> {
        self.stores
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn node(&self, name: &str) -> Option<Arc<NodeProxy>> {
        self.nodes
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Permissions granted by a manifest-defined role, for claim expansion.
    pub fn role_permissions(&self, name: &str) -> Option<Vec<Permission>> {
        self.roles
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .map(|role| role.permissions.clone())
    }

    /// Live once `start` has completed and until `stop` — or until the
    /// database handle breaks underneath us.
    pub fn check_liveness(&self) -> StoreResult<()> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(StoreError::Config("registry is not live".to_string()));
        }
        self.db
            .eth_accounts()
            .get_all()
            .map(|_| ())
            .map_err(|err| StoreError::Internal(format!("metadata database broken: {err}")))
    }

    /// Ready only when every manifest-spawned component built cleanly.
    pub fn check_readiness(&self) -> StoreResult<()> {
        self.check_liveness()?;
        let errors = self.component_errors.read().expect("registry lock poisoned");
        if let Some(first) = errors.first() {
            warn!(failed = errors.len(), "registry not ready");
            return Err(StoreError::Config(first.clone()));
        }
        Ok(())
    }
}

fn is_key_store_kind(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::LocalKeys
            | Kind::HashicorpKeys
            | Kind::HashicorpSecrets
            | Kind::AKVKeys
            | Kind::AWSKeys
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    const MANIFESTS: &str = r#"
- kind: LocalKeys
  version: "1"
  name: local-keys
  specs: {}
- kind: Ethereum
  version: "1"
  name: eth-accounts
  specs:
    keyStore: local-keys
- kind: Node
  version: "1"
  name: besu
  specs:
    rpcUrl: http://besu:8545
    stores: [eth-accounts]
- kind: Role
  version: "1"
  name: signer
  specs:
    permissions: ["sign:ethAccount", "read:ethAccount"]
"#;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keymanager-registry-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn registry_in(dir: &PathBuf) -> Registry {
        Registry::new(MetadataDb::open(dir.join("metadata.redb")).unwrap())
    }

    #[tokio::test]
    async fn builds_the_object_graph() {
        let dir = temp_dir();
        fs::write(dir.join("all.yml"), MANIFESTS).unwrap();

        let registry = registry_in(&dir);
        let loader = LocalLoader::new(dir.join("all.yml")).unwrap();
        registry.start(&loader).await.unwrap();

        assert!(registry.store("eth-accounts").is_some());
        assert!(registry.store("missing").is_none());

        let node = registry.node("besu").unwrap();
        assert_eq!(node.name(), "besu");

        let permissions = registry.role_permissions("signer").unwrap();
        assert_eq!(permissions.len(), 2);

        registry.check_liveness().unwrap();
        registry.check_readiness().unwrap();
    }

    #[tokio::test]
    async fn unknown_key_store_reference_fails_readiness() {
        let dir = temp_dir();
        fs::write(
            dir.join("bad.yml"),
            r#"
kind: Ethereum
version: "1"
name: eth-accounts
specs:
  keyStore: nowhere
"#,
        )
        .unwrap();

        let registry = registry_in(&dir);
        let loader = LocalLoader::new(&dir).unwrap();
        registry.start(&loader).await.unwrap();

        assert!(registry.store("eth-accounts").is_none());
        registry.check_liveness().unwrap();
        assert!(registry.check_readiness().is_err());
    }

    #[tokio::test]
    async fn cloud_kind_without_driver_fails_readiness() {
        let dir = temp_dir();
        fs::write(
            dir.join("aws.yml"),
            r#"
kind: AWSKeys
version: "1"
name: aws-keys
specs:
  region: eu-west-1
"#,
        )
        .unwrap();

        let registry = registry_in(&dir);
        let loader = LocalLoader::new(&dir).unwrap();
        registry.start(&loader).await.unwrap();
        assert!(registry.check_readiness().is_err());
    }

    #[tokio::test]
    async fn node_without_stores_maps_all_in_order() {
        let dir = temp_dir();
        fs::write(
            dir.join("all.yml"),
            r#"
- kind: LocalKeys
  version: "1"
  name: local-keys
  specs: {}
- kind: Ethereum
  version: "1"
  name: store-a
  specs:
    keyStore: local-keys
- kind: Ethereum
  version: "1"
  name: store-b
  specs:
    keyStore: local-keys
- kind: Node
  version: "1"
  name: geth
  specs:
    rpcUrl: http://geth:8545
"#,
        )
        .unwrap();

        let registry = registry_in(&dir);
        let loader = LocalLoader::new(&dir).unwrap();
        registry.start(&loader).await.unwrap();
        registry.check_readiness().unwrap();
        assert!(registry.node("geth").is_some());
    }

    #[tokio::test]
    async fn invalid_manifest_fails_readiness_but_not_liveness() {
        let dir = temp_dir();
        fs::write(dir.join("junk.yml"), "kind: [broken").unwrap();

        let registry = registry_in(&dir);
        let loader = LocalLoader::new(&dir).unwrap();
        registry.start(&loader).await.unwrap();

        registry.check_liveness().unwrap();
        assert!(registry.check_readiness().is_err());

        registry.stop();
        assert!(registry.check_liveness().is_err());
    }
}
