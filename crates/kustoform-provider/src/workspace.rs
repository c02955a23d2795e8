//! Lifecycle of named `kustomize_apply` blocks backed by managed state
//!
//! Every persisted change writes a new serial. The serial it replaces is
//! marked superseded and history beyond the configured limit is pruned.

use kustoform_core::declarations::APPLY_RESOURCE;
use kustoform_kube::{
    DiffEngine, DiffResult, KubeError, ManagedState, ObjectRef, StateStatus, StorageDriver,
    prune_history, validate_name,
};
use serde_json::Value;

use crate::error::Result;
use crate::provider::ProviderData;
use crate::resource::{ApplyResource, ApplyState, DeleteReport, UpdateOutcome};

/// Serials kept per name unless configured otherwise
pub const DEFAULT_MAX_HISTORY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    NoChanges,
}

/// What `apply` would do
#[derive(Debug, Clone)]
pub struct Plan {
    pub action: PlanAction,
    pub diff: DiffResult,
    /// Manifests of the new build
    pub yaml: String,
}

/// Result of a successful apply
#[derive(Debug, Clone)]
pub struct Applied {
    pub state: ManagedState,
    pub pruned: Vec<ObjectRef>,
}

/// Result of a refresh
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub state: ManagedState,
    pub warnings: Vec<String>,
}

/// Named configuration blocks of one workspace
pub struct Workspace<S: StorageDriver> {
    storage: S,
    name: String,
    data: ProviderData,
    max_history: u32,
}

impl<S: StorageDriver> Workspace<S> {
    pub fn new(storage: S, name: impl Into<String>, data: ProviderData) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            storage,
            name,
            data,
            max_history: DEFAULT_MAX_HISTORY,
        })
    }

    pub fn with_max_history(mut self, max_history: u32) -> Self {
        self.max_history = max_history.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Provider data for rebuilding `state`: an explicit workdir wins over
    /// the one recorded at apply time
    fn data_for(&self, state: &ManagedState) -> ProviderData {
        match (&self.data.workdir, &state.workdir) {
            (None, Some(recorded)) => self.data.clone().with_workdir(recorded),
            _ => self.data.clone(),
        }
    }

    async fn latest(&self, name: &str) -> Result<Option<ManagedState>> {
        match self.storage.get_latest(&self.name, name).await {
            Ok(state) => Ok(Some(state)),
            Err(KubeError::StateNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Build `block` and compare it with what was last applied
    #[tracing::instrument(skip(self, block), fields(workspace = %self.name))]
    pub async fn plan(&self, name: &str, block: &Value) -> Result<Plan> {
        validate_name(name)?;
        let config = ApplyResource::parse(block)?;
        let (_, yaml) = self.data.build(&config.model).await?;

        let engine = DiffEngine::new();
        let (action, diff) = match self.latest(name).await? {
            None => (PlanAction::Create, engine.diff_manifests("", &yaml)),
            Some(previous) => {
                let diff = engine.diff_manifests(&previous.yaml, &yaml);
                let action = if !diff.has_changes() && previous.is_applied() {
                    PlanAction::NoChanges
                } else {
                    PlanAction::Update
                };
                (action, diff)
            }
        };

        Ok(Plan { action, diff, yaml })
    }

    /// Create or update `name`, persisting the outcome either way
    #[tracing::instrument(skip(self, block), fields(workspace = %self.name))]
    pub async fn apply(&self, name: &str, block: Value) -> Result<Applied> {
        validate_name(name)?;
        let resource = ApplyResource::new(&self.data)?;
        let previous = self.latest(name).await?;

        let mut state = match &previous {
            Some(previous) => ManagedState::next(previous, block.clone()),
            None => ManagedState::new(name, &self.name, APPLY_RESOURCE, block.clone()),
        };
        if let Ok(workdir) = self.data.workdir().canonicalize() {
            state.workdir = Some(workdir);
        }
        self.storage.create(&state).await?;

        let result = match &previous {
            Some(previous) => resource.update(&block, &ApplyState::from(previous)).await,
            None => resource
                .create(&block)
                .await
                .map(|state| UpdateOutcome {
                    state,
                    pruned: Vec::new(),
                }),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(name, serial = state.serial, error = %e, "apply failed");
                state.mark_failed(e.to_string());
                self.storage.update(&state).await?;
                self.supersede(previous).await?;
                return Err(e);
            }
        };

        state.set_yaml(outcome.state.yaml);
        state.objects = outcome.state.objects;
        state.mark_applied();
        self.storage.update(&state).await?;
        self.supersede(previous).await?;
        prune_history(&self.storage, &self.name, name, self.max_history).await?;

        tracing::info!(name, serial = state.serial, "applied");
        Ok(Applied {
            state,
            pruned: outcome.pruned,
        })
    }

    /// Read the live objects of `name` back into a new serial
    ///
    /// A state whose last apply did not complete keeps its manifests and
    /// stays failed, so a later plan still reports an update.
    #[tracing::instrument(skip(self), fields(workspace = %self.name))]
    pub async fn refresh(&self, name: &str) -> Result<Refreshed> {
        let previous = self.storage.get_latest(&self.name, name).await?;
        let resource = ApplyResource::new(&self.data_for(&previous))?;

        let outcome = resource.read(&previous.config).await?;

        let mut state = ManagedState::next(&previous, previous.config.clone());
        state.objects = outcome.state.objects;
        match &previous.state {
            StateStatus::Applied => {
                state.set_yaml(outcome.state.yaml);
                state.mark_applied();
            }
            StateStatus::Failed { reason, .. } => state.mark_failed(reason.clone()),
            other => state.mark_failed(format!("refreshed a {} serial", other.status_name())),
        }
        self.storage.create(&state).await?;
        self.supersede(Some(previous)).await?;
        prune_history(&self.storage, &self.name, name, self.max_history).await?;

        Ok(Refreshed {
            state,
            warnings: outcome.warnings,
        })
    }

    /// Delete the objects of `name`, then every serial of its state
    #[tracing::instrument(skip(self), fields(workspace = %self.name))]
    pub async fn destroy(&self, name: &str) -> Result<DeleteReport> {
        let mut state = self.storage.get_latest(&self.name, name).await?;
        let resource = ApplyResource::new(&self.data_for(&state))?;

        let report = match resource
            .delete(&state.config, &ApplyState::from(&state))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                state.mark_failed(e.to_string());
                self.storage.update(&state).await?;
                return Err(e);
            }
        };

        let removed = self.storage.delete_all(&self.name, name).await?;
        tracing::info!(name, serials = removed.len(), "destroyed");
        Ok(report)
    }

    pub async fn show(&self, name: &str) -> Result<ManagedState> {
        Ok(self.storage.get_latest(&self.name, name).await?)
    }

    /// Every serial of `name`, newest first
    pub async fn history(&self, name: &str) -> Result<Vec<ManagedState>> {
        Ok(self.storage.history(&self.name, name).await?)
    }

    pub async fn list(&self) -> Result<Vec<ManagedState>> {
        Ok(self.storage.list(Some(&self.name), None, false).await?)
    }

    async fn supersede(&self, previous: Option<ManagedState>) -> Result<()> {
        if let Some(mut previous) = previous {
            previous.mark_superseded();
            self.storage.update(&previous).await?;
        }
        Ok(())
    }
}
