pub mod arguments;
pub mod contracts;
pub mod dataset;
pub mod deployment;
pub mod error;
pub mod loader;
pub mod node;
pub mod reconcile;
pub mod registry;
pub mod retry;

use {
    crate::{
        arguments::{Arguments, Command, Dataset},
        dataset::{LockedRow, RevealedRow, SubjectRow, UnrevealedRow},
        deployment::{DEPLOYMENT_SLOT, DeploymentCheckpoint, Orchestrator},
        error::{Error, Result},
        loader::BatchLoader,
        node::{Call, Confirmation, Node, ethereum::EthereumNode},
        reconcile::StateView,
        registry::{ArtifactSpec, Registry, Roles, StandardCode},
        retry::RetryPolicy,
    },
    alloy::primitives::{Address, B256, Bytes, U256, hex},
    anyhow::Context,
    checkpoint::Store,
    std::{collections::BTreeMap, io::Write, path::Path},
};

pub async fn run(args: Arguments) -> Result<()> {
    let store = Store::new(&args.checkpoint_root);
    let scope = args.environment.clone();
    tracing::debug!(
        root = %store.root().display(),
        environment = scope.as_str(),
        "using checkpoint store"
    );
    match &args.command {
        Command::Deploy {
            code_dir,
            admin,
            treasury,
            proxy_host,
        } => {
            let node = signing_node(&args)?;
            let orchestrator = Orchestrator {
                node: &node,
                store: &store,
                scope: scope.clone(),
            };
            let requested = match proxy_host {
                Some(host) => deployment::ProxyHost::External { host: *host },
                None => deployment::ProxyHost::SelfHosted,
            };
            let checkpoint = orchestrator.load_or_init(
                requested,
                BTreeMap::from([
                    ("admin".to_string(), *admin),
                    ("treasury".to_string(), *treasury),
                ]),
            )?;
            // Wiring comes from the checkpoint, so a resume reuses the
            // original roles and host even if the flags changed.
            let registry = registry::standard(
                load_code(code_dir)?,
                checkpoint.proxy_host,
                stored_roles(&checkpoint)?,
            )?;
            let checkpoint = orchestrator.resolve(&registry, checkpoint).await?;
            tracing::info!(
                artifacts = checkpoint.artifacts.len(),
                "deployment complete"
            );
        }
        Command::Load {
            dataset,
            file,
            batch_size,
            reset,
        } => {
            let slot = dataset.slot();
            if *reset {
                if !confirm_destructive(&format!(
                    "discard load progress of {slot:?} in environment {scope:?}"
                ))? {
                    tracing::info!("reset aborted");
                    return Ok(());
                }
                store.remove(&scope, slot)?;
            }
            let node = signing_node(&args)?;
            let node = &node;
            let checkpoint = require_deployment(&store, &scope)?;
            let loader = BatchLoader {
                store: &store,
                scope: scope.clone(),
                batch_size: *batch_size,
                retry: RetryPolicy::default(),
            };
            match dataset {
                Dataset::Unrevealed => {
                    let target = checkpoint.artifact(registry::COLLECTION)?.address;
                    let rows: Vec<UnrevealedRow> = dataset::read_records(file)?;
                    loader
                        .run(slot, &rows, |batch| async move {
                            submit_invoke(node, target, contracts::mint_unrevealed(&batch)).await
                        })
                        .await?;
                }
                Dataset::Revealed => {
                    let target = checkpoint.artifact(registry::COLLECTION)?.address;
                    let rows: Vec<RevealedRow> = dataset::read_records(file)?;
                    loader
                        .run_with_probe(
                            slot,
                            &rows,
                            |batch| async move {
                                submit_invoke(node, target, contracts::reveal(&batch)?).await
                            },
                            |row: RevealedRow| async move {
                                let data = node
                                    .query(target, contracts::seed_of(row.token_id), None)
                                    .await?;
                                Ok(contracts::decode_seed(&data)? != B256::ZERO)
                            },
                        )
                        .await?;
                }
                Dataset::Locked => {
                    let target = checkpoint.artifact(registry::TOKEN)?.address;
                    let rows: Vec<LockedRow> = dataset::read_records(file)?;
                    loader
                        .run(slot, &rows, |batch| async move {
                            submit_invoke(node, target, contracts::mint_locked(&batch)?).await
                        })
                        .await?;
                }
            }
        }
        Command::Verify { dataset, file } => {
            let node = EthereumNode::read_only(&args.node_url);
            let node = &node;
            let checkpoint = require_deployment(&store, &scope)?;
            match dataset {
                Dataset::Unrevealed => {
                    let target = checkpoint.artifact(registry::COLLECTION)?.address;
                    let rows: Vec<UnrevealedRow> = dataset::read_records(file)?;
                    reconcile::verify(&rows, |row: &UnrevealedRow| {
                        let holder = row.holder;
                        async move {
                            let data = node
                                .query(target, contracts::unrevealed_count(holder), None)
                                .await?;
                            Ok(StateView::default().field(
                                "unrevealed_count",
                                contracts::decode_unrevealed_count(&data)?,
                            ))
                        }
                    })
                    .await?;
                }
                Dataset::Revealed => {
                    let target = checkpoint.artifact(registry::COLLECTION)?.address;
                    let rows: Vec<RevealedRow> = dataset::read_records(file)?;
                    reconcile::verify(&rows, |row: &RevealedRow| {
                        let token_id = row.token_id;
                        async move {
                            let data = node
                                .query(target, contracts::seed_of(token_id), None)
                                .await?;
                            Ok(StateView::default()
                                .field("seed", contracts::decode_seed(&data)?))
                        }
                    })
                    .await?;
                }
                Dataset::Locked => {
                    let target = checkpoint.artifact(registry::TOKEN)?.address;
                    let rows: Vec<LockedRow> = dataset::read_records(file)?;
                    reconcile::verify(&rows, |row: &LockedRow| {
                        let holder = row.holder;
                        async move {
                            let data = node
                                .query(target, contracts::locked_balance(holder), None)
                                .await?;
                            Ok(StateView::default().field(
                                "locked_amount",
                                contracts::decode_locked_balance(&data)?,
                            ))
                        }
                    })
                    .await?;
                }
            }
            tracing::info!(?dataset, "verification passed");
        }
        Command::CompareStorage {
            subjects,
            slot_indices,
            left,
            right,
        } => {
            let node = EthereumNode::read_only(&args.node_url);
            let rows: Vec<SubjectRow> = dataset::read_records(subjects)?;
            let subjects: Vec<Address> = rows.iter().map(|row| row.holder).collect();
            let slot_indices: Vec<U256> =
                slot_indices.iter().map(|&index| U256::from(index)).collect();
            reconcile::compare_storage(&node, &subjects, &slot_indices, *left, *right).await?;
            tracing::info!("storage comparison passed");
        }
        Command::Swap { code_dir, name } => {
            let node = signing_node(&args)?;
            let checkpoint = require_deployment(&store, &scope)?;
            let registry = registry::standard(
                load_code(code_dir)?,
                checkpoint.proxy_host,
                stored_roles(&checkpoint)?,
            )?;
            let orchestrator = Orchestrator {
                node: &node,
                store: &store,
                scope: scope.clone(),
            };
            let (_, replacement) = orchestrator.swap(&registry, name, checkpoint).await?;
            tracing::info!(
                artifact = name.as_str(),
                address = ?replacement.address,
                "swap complete"
            );
        }
        Command::Release { label } => {
            let node = EthereumNode::read_only(&args.node_url);
            let checkpoint = require_deployment(&store, &scope)?;
            // Promotion only checks completeness against the artifact names;
            // it never creates anything, so no bytecode is needed.
            let registry = Registry::new(
                [registry::TOKEN, registry::COLLECTION, registry::MINTER]
                    .into_iter()
                    .map(|name| ArtifactSpec::new(name, Bytes::new()))
                    .collect(),
            )?;
            let orchestrator = Orchestrator {
                node: &node,
                store: &store,
                scope: scope.clone(),
            };
            orchestrator.promote(&registry, &checkpoint, label)?;
        }
    }
    Ok(())
}

async fn submit_invoke(
    node: &dyn Node,
    target: Address,
    calldata: Bytes,
) -> Result<Confirmation> {
    let operation = node.submit(Call::Invoke { target, calldata }).await?;
    node.confirm(operation).await
}

fn signing_node(args: &Arguments) -> Result<EthereumNode> {
    let signer = args.operator_key.clone().ok_or_else(|| {
        Error::Precondition("this command signs operations; pass --operator-key".to_string())
    })?;
    Ok(EthereumNode::new(&args.node_url, signer))
}

fn require_deployment(store: &Store, scope: &str) -> Result<DeploymentCheckpoint> {
    store.load(scope, DEPLOYMENT_SLOT)?.ok_or_else(|| {
        Error::Precondition(format!(
            "no deployment checkpoint in environment {scope:?}; run deploy first"
        ))
    })
}

fn stored_roles(checkpoint: &DeploymentCheckpoint) -> Result<Roles> {
    let role = |name: &str| {
        checkpoint
            .role_assignments
            .get(name)
            .copied()
            .ok_or_else(|| Error::Precondition(format!("checkpoint lacks role {name:?}")))
    };
    Ok(Roles {
        admin: role("admin")?,
        treasury: role("treasury")?,
    })
}

fn load_code(dir: &Path) -> Result<StandardCode> {
    let read = |name: &str| -> Result<Bytes> {
        let path = dir.join(format!("{name}.hex"));
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading creation code {}", path.display()))?;
        let bytes = hex::decode(text.trim().trim_start_matches("0x")).map_err(|err| {
            Error::Precondition(format!("invalid hex in {}: {err}", path.display()))
        })?;
        Ok(bytes.into())
    };
    Ok(StandardCode {
        token: read(registry::TOKEN)?,
        collection: read(registry::COLLECTION)?,
        minter: read(registry::MINTER)?,
    })
}

fn confirm_destructive(action: &str) -> Result<bool> {
    print!("{action}? [y/N] ");
    std::io::stdout().flush().context("flushing prompt")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
