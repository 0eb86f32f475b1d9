//! Deployment orchestration: walks the artifact registry in declaration
//! order, reattaching to checkpointed instances and creating the rest.
//!
//! The crash-recovery contract: once a name maps to a resolved artifact in
//! the checkpoint, no creation operation is ever issued for it again. The
//! whole checkpoint is persisted after every single artifact so a crash at
//! any point resumes with only the remaining work.

use {
    crate::{
        error::{Error, Result},
        node::{Call, Node},
        registry::{ArtifactSpec, Registry, ResolvedMap},
    },
    alloy::primitives::{Address, Bytes, TxHash},
    checkpoint::Store,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Slot holding the in-progress deployment checkpoint of a scope.
pub const DEPLOYMENT_SLOT: &str = "deployment";

/// How the minter proxy is hosted. Decided once, at the start of the first
/// run of an environment, and carried through the checkpoint; never
/// re-decided on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProxyHost {
    /// The pipeline deploys and administers its own host.
    SelfHosted,
    /// An externally operated host fronts the artifact.
    External { host: Address },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub name: String,
    pub address: Address,
    pub creation_operation: TxHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_args: Option<Bytes>,
    pub creation_block: u64,
    /// Append-only history of instances replaced by [`Orchestrator::swap`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_instances: Vec<ResolvedArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCheckpoint {
    pub artifacts: ResolvedMap,
    pub created_at: DateTime<Utc>,
    pub role_assignments: BTreeMap<String, Address>,
    pub proxy_host: ProxyHost,
}

impl DeploymentCheckpoint {
    pub fn new(proxy_host: ProxyHost, role_assignments: BTreeMap<String, Address>) -> Self {
        Self {
            artifacts: ResolvedMap::new(),
            created_at: Utc::now(),
            role_assignments,
            proxy_host,
        }
    }

    pub fn artifact(&self, name: &str) -> Result<&ResolvedArtifact> {
        self.artifacts.get(name).ok_or_else(|| {
            Error::Precondition(format!("artifact {name:?} is not part of this deployment"))
        })
    }
}

pub struct Orchestrator<'a> {
    pub node: &'a dyn Node,
    pub store: &'a Store,
    /// Deployment environment; partitions checkpoint slots.
    pub scope: String,
}

impl Orchestrator<'_> {
    /// Loads the environment's checkpoint, or starts a fresh one with the
    /// given run metadata. A stored proxy-host variant always wins over the
    /// requested one.
    pub fn load_or_init(
        &self,
        proxy_host: ProxyHost,
        role_assignments: BTreeMap<String, Address>,
    ) -> Result<DeploymentCheckpoint> {
        match self
            .store
            .load::<DeploymentCheckpoint>(&self.scope, DEPLOYMENT_SLOT)?
        {
            Some(existing) => {
                if existing.proxy_host != proxy_host {
                    tracing::warn!(
                        stored = ?existing.proxy_host,
                        requested = ?proxy_host,
                        "proxy host was fixed on the first run; keeping the stored variant"
                    );
                }
                Ok(existing)
            }
            None => Ok(DeploymentCheckpoint::new(proxy_host, role_assignments)),
        }
    }

    /// Resolves every spec of `registry`, reusing checkpointed artifacts
    /// verbatim and creating the rest. Idempotent: re-invoking with the
    /// checkpoint of a previous run performs only the remaining work.
    pub async fn resolve(
        &self,
        registry: &Registry,
        mut checkpoint: DeploymentCheckpoint,
    ) -> Result<DeploymentCheckpoint> {
        for spec in registry.specs() {
            if checkpoint.artifacts.contains_key(&spec.name) {
                tracing::info!(artifact = spec.name.as_str(), "already resolved, reattaching");
                continue;
            }
            let artifact = self.create(spec, &checkpoint.artifacts).await?;
            tracing::info!(
                artifact = spec.name.as_str(),
                address = ?artifact.address,
                block = artifact.creation_block,
                "artifact created"
            );
            checkpoint.artifacts.insert(spec.name.clone(), artifact);
            self.store
                .save(&self.scope, DEPLOYMENT_SLOT, &checkpoint)?;
        }
        Ok(checkpoint)
    }

    /// Deploys a replacement for `name` and archives the current instance
    /// into its history. Explicit operator action; never run automatically.
    pub async fn swap(
        &self,
        registry: &Registry,
        name: &str,
        mut checkpoint: DeploymentCheckpoint,
    ) -> Result<(DeploymentCheckpoint, ResolvedArtifact)> {
        let spec = registry
            .get(name)
            .ok_or_else(|| Error::Precondition(format!("unknown artifact {name:?}")))?;
        let mut previous = checkpoint.artifacts.get(name).cloned().ok_or_else(|| {
            Error::Precondition(format!("artifact {name:?} was never resolved; nothing to swap"))
        })?;

        let mut replacement = self.create(spec, &checkpoint.artifacts).await?;
        replacement.previous_instances = std::mem::take(&mut previous.previous_instances);
        replacement.previous_instances.push(previous);
        tracing::info!(
            artifact = name,
            address = ?replacement.address,
            generations = replacement.previous_instances.len(),
            "artifact swapped"
        );

        checkpoint
            .artifacts
            .insert(name.to_string(), replacement.clone());
        self.store
            .save(&self.scope, DEPLOYMENT_SLOT, &checkpoint)?;
        Ok((checkpoint, replacement))
    }

    /// Promotes a completed checkpoint to an immutable named release record.
    pub fn promote(
        &self,
        registry: &Registry,
        checkpoint: &DeploymentCheckpoint,
        label: &str,
    ) -> Result<()> {
        for spec in registry.specs() {
            if !checkpoint.artifacts.contains_key(&spec.name) {
                return Err(Error::Precondition(format!(
                    "cannot release: artifact {:?} is not resolved yet",
                    spec.name
                )));
            }
        }
        let slot = format!("release-{label}");
        if self.store.exists(&self.scope, &slot) {
            return Err(Error::Precondition(format!(
                "release {label:?} already exists and is immutable"
            )));
        }
        self.store.save(&self.scope, &slot, checkpoint)?;
        tracing::info!(label, "deployment promoted to release");
        Ok(())
    }

    async fn create(&self, spec: &ArtifactSpec, resolved: &ResolvedMap) -> Result<ResolvedArtifact> {
        let args = (spec.constructor_args)(resolved)?;
        let code = Bytes::from([spec.code.as_ref(), args.as_ref()].concat());
        let operation = self.node.submit(Call::Create { code }).await?;
        // Confirmation failure is fatal here; retrying a creation risks a
        // duplicate artifact.
        let confirmation = self.node.confirm(operation).await?.ensure_success()?;
        let address = confirmation.deployed_address.ok_or_else(|| {
            Error::Precondition(format!(
                "creation of {:?} confirmed without an artifact address",
                spec.name
            ))
        })?;
        Ok(ResolvedArtifact {
            name: spec.name.clone(),
            address,
            creation_operation: operation.0,
            constructor_args: (!args.is_empty()).then_some(args),
            creation_block: confirmation.block_number,
            previous_instances: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::node::{Confirmation, MockNode, OperationHandle},
        alloy::{
            primitives::{B256, U256, address},
            sol_types::SolValue,
        },
        mockall::predicate,
        std::sync::atomic::{AtomicU64, Ordering},
    };

    fn test_registry() -> Registry {
        let first = ArtifactSpec::new("first", Bytes::from_static(&[0x01]));
        let second = ArtifactSpec::new("second", Bytes::from_static(&[0x02]))
            .depends_on(&["first"])
            .constructor_args(Box::new(|resolved| {
                let first = crate::registry::dependency(resolved, "first")?;
                Ok(first.abi_encode().into())
            }));
        Registry::new(vec![first, second]).unwrap()
    }

    fn deploying_node() -> MockNode {
        let mut node = MockNode::new();
        let submissions = AtomicU64::new(0);
        node.expect_submit().returning(move |call| {
            assert!(matches!(call, Call::Create { .. }));
            let nth = submissions.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(OperationHandle(B256::from(U256::from(nth))))
        });
        node.expect_confirm().returning(|operation| {
            let nth: U256 = operation.0.into();
            Ok(Confirmation {
                operation,
                success: true,
                block_number: nth.to::<u64>(),
                deployed_address: Some(Address::from_word(alloy::primitives::keccak256(
                    operation.0,
                ))),
            })
        });
        node
    }

    fn orchestrator<'a>(node: &'a MockNode, store: &'a Store) -> Orchestrator<'a> {
        Orchestrator {
            node,
            store,
            scope: "staging".to_string(),
        }
    }

    fn fresh_checkpoint() -> DeploymentCheckpoint {
        DeploymentCheckpoint::new(ProxyHost::SelfHosted, BTreeMap::new())
    }

    #[tokio::test]
    async fn resolves_every_spec_and_persists_after_each() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let node = deploying_node();
        let orchestrator = orchestrator(&node, &store);
        let registry = test_registry();

        let checkpoint = orchestrator
            .resolve(&registry, fresh_checkpoint())
            .await
            .unwrap();

        assert_eq!(checkpoint.artifacts.len(), 2);
        let first = checkpoint.artifact("first").unwrap();
        let second = checkpoint.artifact("second").unwrap();
        // The second constructor received the first artifact's address.
        assert_eq!(
            second.constructor_args.as_ref().unwrap(),
            &Bytes::from(first.address.abi_encode())
        );
        // No args template output means no recorded args.
        assert_eq!(first.constructor_args, None);
        let persisted: DeploymentCheckpoint = store
            .load("staging", DEPLOYMENT_SLOT)
            .unwrap()
            .expect("checkpoint persisted");
        assert_eq!(persisted, checkpoint);
    }

    #[tokio::test]
    async fn resume_issues_zero_creation_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let registry = test_registry();
        let completed = {
            let node = deploying_node();
            orchestrator(&node, &store)
                .resolve(&registry, fresh_checkpoint())
                .await
                .unwrap()
        };

        // A node expecting no calls at all: any submission would panic.
        let idle = MockNode::new();
        let resumed = orchestrator(&idle, &store)
            .resolve(&registry, completed.clone())
            .await
            .unwrap();
        assert_eq!(resumed, completed);
    }

    #[tokio::test]
    async fn partial_checkpoint_only_performs_remaining_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let registry = test_registry();
        let node = deploying_node();
        let orchestrator = orchestrator(&node, &store);

        let mut partial = fresh_checkpoint();
        partial.artifacts.insert(
            "first".to_string(),
            ResolvedArtifact {
                name: "first".to_string(),
                address: address!("0x1111111111111111111111111111111111111111"),
                creation_operation: B256::repeat_byte(1),
                constructor_args: None,
                creation_block: 1,
                previous_instances: Vec::new(),
            },
        );

        let resolved = orchestrator.resolve(&registry, partial).await.unwrap();
        // The pre-resolved artifact is reused verbatim.
        assert_eq!(
            resolved.artifact("first").unwrap().address,
            address!("0x1111111111111111111111111111111111111111")
        );
        assert!(resolved.artifacts.contains_key("second"));
    }

    #[tokio::test]
    async fn confirmation_failure_is_fatal_and_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut node = MockNode::new();
        node.expect_submit()
            .returning(|_| Ok(OperationHandle(B256::repeat_byte(7))));
        node.expect_confirm().returning(|operation| {
            Ok(Confirmation {
                operation,
                success: false,
                block_number: 9,
                deployed_address: None,
            })
        });
        let orchestrator = orchestrator(&node, &store);

        let result = orchestrator
            .resolve(&test_registry(), fresh_checkpoint())
            .await;
        assert!(matches!(result, Err(Error::ConfirmationFailed { .. })));
        assert!(!store.exists("staging", DEPLOYMENT_SLOT));
    }

    #[tokio::test]
    async fn swap_archives_the_previous_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let registry = test_registry();
        let node = deploying_node();
        let orchestrator = orchestrator(&node, &store);

        let checkpoint = orchestrator
            .resolve(&registry, fresh_checkpoint())
            .await
            .unwrap();
        let old_address = checkpoint.artifact("second").unwrap().address;

        let (swapped, replacement) = orchestrator
            .swap(&registry, "second", checkpoint)
            .await
            .unwrap();
        assert_ne!(replacement.address, old_address);
        assert_eq!(replacement.previous_instances.len(), 1);
        assert_eq!(replacement.previous_instances[0].address, old_address);
        assert_eq!(swapped.artifact("second").unwrap(), &replacement);

        // A second swap stacks another generation.
        let (_, twice) = orchestrator.swap(&registry, "second", swapped).await.unwrap();
        assert_eq!(twice.previous_instances.len(), 2);
    }

    #[tokio::test]
    async fn swap_of_unresolved_artifact_is_a_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let node = MockNode::new();
        let orchestrator = orchestrator(&node, &store);
        let result = orchestrator
            .swap(&test_registry(), "second", fresh_checkpoint())
            .await;
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[tokio::test]
    async fn release_is_immutable_and_requires_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let registry = test_registry();
        let node = deploying_node();
        let orchestrator = orchestrator(&node, &store);

        let incomplete = fresh_checkpoint();
        assert!(matches!(
            orchestrator.promote(&registry, &incomplete, "v1"),
            Err(Error::Precondition(_))
        ));

        let checkpoint = orchestrator
            .resolve(&registry, incomplete)
            .await
            .unwrap();
        orchestrator.promote(&registry, &checkpoint, "v1").unwrap();
        assert!(matches!(
            orchestrator.promote(&registry, &checkpoint, "v1"),
            Err(Error::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn stored_proxy_host_wins_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let node = MockNode::new();
        let orchestrator = orchestrator(&node, &store);

        let external = ProxyHost::External {
            host: address!("0x2222222222222222222222222222222222222222"),
        };
        let checkpoint = DeploymentCheckpoint::new(external, BTreeMap::new());
        store.save("staging", DEPLOYMENT_SLOT, &checkpoint).unwrap();

        let loaded = orchestrator
            .load_or_init(ProxyHost::SelfHosted, BTreeMap::new())
            .unwrap();
        assert_eq!(loaded.proxy_host, external);
    }

    #[test]
    fn checkpoint_serializes_addresses_as_hex() {
        let mut checkpoint = fresh_checkpoint();
        checkpoint.artifacts.insert(
            "first".to_string(),
            ResolvedArtifact {
                name: "first".to_string(),
                address: address!("0x1111111111111111111111111111111111111111"),
                creation_operation: B256::repeat_byte(3),
                constructor_args: Some(Bytes::from_static(&[0xab])),
                creation_block: 42,
                previous_instances: Vec::new(),
            },
        );
        let json = serde_json::to_string(&checkpoint).unwrap();
        assert!(json.contains("0x1111111111111111111111111111111111111111"));
        let parsed: DeploymentCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, checkpoint);
    }

    #[tokio::test]
    async fn create_submits_code_with_encoded_args_appended() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut node = MockNode::new();
        let treasury = address!("0x3333333333333333333333333333333333333333");
        let expected_code =
            Bytes::from([&[0x01][..], treasury.abi_encode().as_slice()].concat());
        node.expect_submit()
            .with(predicate::eq(Call::Create {
                code: expected_code,
            }))
            .returning(|_| Ok(OperationHandle(B256::repeat_byte(5))));
        node.expect_confirm().returning(|operation| {
            Ok(Confirmation {
                operation,
                success: true,
                block_number: 1,
                deployed_address: Some(Address::repeat_byte(9)),
            })
        });
        let orchestrator = orchestrator(&node, &store);

        let spec = ArtifactSpec::new("only", Bytes::from_static(&[0x01])).constructor_args(
            Box::new(move |_| Ok(treasury.abi_encode().into())),
        );
        let registry = Registry::new(vec![spec]).unwrap();
        orchestrator
            .resolve(&registry, fresh_checkpoint())
            .await
            .unwrap();
    }
}
