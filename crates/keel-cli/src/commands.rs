//! Plan, apply and destroy.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::join_all;
use keel_core::AttrTree;
use keel_engine::mapper::{from_declared_json, to_declared_json};
use keel_engine::{
    plan as plan_changes, CancelSignal, Clock, ReconcileOutcome, Reconciler, ResourceType,
    TokioClock, VendorClient,
};
use keel_resources::Catalog;

use crate::files::{self, DeclaredFile};

/// Render the changes `declared` needs against an optional state file.
/// Makes no vendor calls.
pub fn plan(
    catalog: &Catalog,
    resource_type: Option<&str>,
    declared: &Path,
    state: Option<&Path>,
) -> Result<String> {
    let file = files::read_declared(declared)?;
    if let Some(requested) = resource_type {
        if requested != file.resource_type {
            bail!(
                "{} declares a {}, not a {requested}",
                declared.display(),
                file.resource_type
            );
        }
    }
    let resource = lookup(catalog, &file.resource_type)?;
    let tree = parse_attributes(resource, &file, declared)?;

    let mut out = String::new();
    let Some(state) = state.map(files::read_state).transpose()? else {
        let attributes = to_declared_json(&tree, resource.shape())?;
        writeln!(out, "+ create {}", resource.name())?;
        writeln!(out, "{}", serde_json::to_string_pretty(&attributes)?)?;
        return Ok(out);
    };

    let plan = plan_changes(&tree, &state.tree, resource.shape());
    if plan.is_empty() {
        writeln!(out, "{} {}: no changes", resource.name(), state.identity)?;
    } else if plan.requires_replace() {
        writeln!(out, "-/+ replace {} {}", resource.name(), state.identity)?;
    } else {
        writeln!(out, "~ update {} {}", resource.name(), state.identity)?;
    }
    for change in plan.changes() {
        writeln!(out, "  {change}")?;
    }
    Ok(out)
}

/// Result of applying one declared file.
#[derive(Debug)]
pub struct ApplyReport {
    /// The declared file.
    pub declared: PathBuf,
    /// What happened.
    pub result: Result<ReconcileOutcome>,
}

/// Runs reconciles against a vendor.
pub struct Runner {
    catalog: Catalog,
    client: Arc<dyn VendorClient>,
    clock: Arc<dyn Clock>,
    cancel: CancelSignal,
}

impl Runner {
    pub fn new(catalog: Catalog, client: Arc<dyn VendorClient>) -> Self {
        Self {
            catalog,
            client,
            clock: Arc::new(TokioClock),
            cancel: CancelSignal::never(),
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    fn reconciler(&self, resource: &ResourceType) -> Reconciler {
        Reconciler::new(self.client.clone(), resource.clone())
            .with_clock(self.clock.clone())
            .with_cancel(self.cancel.clone())
    }

    /// Reconcile every declared file concurrently, one reconciler per
    /// resource type, and write each resulting state into `state_dir`.
    ///
    /// Files that cannot be read or parsed abort the whole run before any
    /// vendor call is made.
    pub async fn apply(&self, declared: &[PathBuf], state_dir: &Path) -> Result<Vec<ApplyReport>> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("failed to create state directory {}", state_dir.display()))?;

        let mut reconcilers: BTreeMap<String, Reconciler> = BTreeMap::new();
        let mut jobs = Vec::with_capacity(declared.len());
        for path in declared {
            let file = files::read_declared(path)?;
            let resource = lookup(&self.catalog, &file.resource_type)?;
            let tree = parse_attributes(resource, &file, path)?;
            let state_path = files::state_path(state_dir, path)?;
            let prior = files::read_state_if_exists(&state_path)?;
            if let Some(prior) = &prior {
                if prior.resource_type != file.resource_type {
                    bail!(
                        "{} holds a {}, but {} declares a {}",
                        state_path.display(),
                        prior.resource_type,
                        path.display(),
                        file.resource_type
                    );
                }
            }
            reconcilers
                .entry(file.resource_type.clone())
                .or_insert_with(|| self.reconciler(resource));
            jobs.push(Job {
                declared: path.clone(),
                resource_type: file.resource_type,
                tree,
                state_path,
                prior,
            });
        }

        let reconcilers = &reconcilers;
        let runs = jobs.iter().map(|job| async move {
            let result = match reconcilers.get(&job.resource_type) {
                Some(reconciler) => job.run(reconciler).await,
                None => Err(anyhow!("no reconciler for {}", job.resource_type)),
            };
            ApplyReport {
                declared: job.declared.clone(),
                result,
            }
        });
        Ok(join_all(runs).await)
    }

    /// Destroy the resource recorded in `state` and remove the file.
    pub async fn destroy(&self, state: &Path) -> Result<()> {
        let remote = files::read_state(state)?;
        let resource = lookup(&self.catalog, &remote.resource_type)?;
        self.reconciler(resource)
            .destroy(&remote)
            .await
            .with_context(|| {
                format!("failed to destroy {} {}", remote.resource_type, remote.identity)
            })?;
        fs::remove_file(state)
            .with_context(|| format!("failed to remove state file {}", state.display()))?;
        tracing::info!(id = %remote.identity, "Destroyed");
        Ok(())
    }
}

struct Job {
    declared: PathBuf,
    resource_type: String,
    tree: AttrTree,
    state_path: PathBuf,
    prior: Option<keel_engine::RemoteState>,
}

impl Job {
    async fn run(&self, reconciler: &Reconciler) -> Result<ReconcileOutcome> {
        match reconciler.reconcile(&self.tree, self.prior.as_ref()).await {
            Ok(outcome) => {
                files::write_state(&self.state_path, &outcome.state)?;
                for path in &outcome.unverified {
                    tracing::info!(
                        declared = %self.declared.display(),
                        path = %path,
                        "Write-only value cannot be verified"
                    );
                }
                Ok(outcome)
            }
            Err(err) => {
                if let Some(snapshot) = &err.snapshot {
                    files::write_state(&self.state_path, snapshot)?;
                }
                Err(anyhow::Error::new(err)
                    .context(format!("failed to apply {}", self.declared.display())))
            }
        }
    }
}

fn lookup<'a>(catalog: &'a Catalog, name: &str) -> Result<&'a ResourceType> {
    catalog.get(name).ok_or_else(|| {
        anyhow!(
            "unknown resource type {name:?} (known: {})",
            catalog.names().collect::<Vec<_>>().join(", ")
        )
    })
}

fn parse_attributes(resource: &ResourceType, file: &DeclaredFile, path: &Path) -> Result<AttrTree> {
    from_declared_json(&file.attributes, resource.shape())
        .with_context(|| format!("invalid attributes in {}", path.display()))
}
