//! Plan ingestion: request checks, one bounded model call, validation, and
//! the hand-off to the board service for an atomic commit.
//!
//! The model call holds no lock. The project lock is only taken inside
//! [`BoardService::commit_plan`], after a valid plan is in hand.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::prompt::{SYSTEM_PROMPT, repair_prompt, user_prompt};
use super::schema::Plan;
use super::validate::validate;
use crate::config::PlannerConfig;
use crate::error::{PlanboardError, Result};
use crate::model::{GenerateOptions, ModelClient};
use crate::service::{BoardService, PlanCommit};

/// A planning request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub objective: String,
    pub days: i64,
    #[serde(default)]
    pub team_size: Option<i64>,
}

impl IngestRequest {
    pub fn new(objective: impl Into<String>, days: i64) -> Self {
        Self {
            objective: objective.into(),
            days,
            team_size: None,
        }
    }
}

pub struct PlanIngestor {
    model: Arc<dyn ModelClient>,
    config: PlannerConfig,
}

impl PlanIngestor {
    pub fn new(model: Arc<dyn ModelClient>, config: PlannerConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Reject bad input before anything external is touched.
    pub fn check_request(&self, request: &IngestRequest) -> Result<()> {
        if request.objective.trim().is_empty() {
            return Err(PlanboardError::InvalidRequest(
                "objective must not be empty".into(),
            ));
        }
        if !(1..=self.config.max_days).contains(&request.days) {
            return Err(PlanboardError::InvalidRequest(format!(
                "days must be between 1 and {}, got {}",
                self.config.max_days, request.days
            )));
        }
        if let Some(team) = request.team_size {
            if !(1..=self.config.max_team_size).contains(&team) {
                return Err(PlanboardError::InvalidRequest(format!(
                    "team_size must be between 1 and {}, got {team}",
                    self.config.max_team_size
                )));
            }
        }
        Ok(())
    }

    /// Prompt the model and validate its answer. Nothing is persisted.
    ///
    /// Makes one model call, or two when `repair_retry` is enabled and the
    /// first answer was rejected. The second answer is final.
    pub async fn generate_plan(
        &self,
        request: &IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<Plan> {
        self.check_request(request)?;
        let limits = self.config.effort_limits();
        let user = user_prompt(&request.objective, request.days, request.team_size);

        info!(
            model = self.model.name(),
            days = request.days,
            team_size = request.team_size,
            "generating plan"
        );
        debug!(
            system_chars = SYSTEM_PROMPT.len(),
            user_chars = user.len(),
            "built prompts"
        );

        let raw = self.call_model(SYSTEM_PROMPT, &user, cancel).await?;
        let rejected = match validate(&raw, &limits) {
            Ok(plan) => return Ok(self.accepted(plan)),
            Err(err) => err,
        };

        warn!(
            kind = %rejected.kind(),
            violations = rejected.violations().len(),
            repair = self.config.repair_retry,
            "model output rejected"
        );
        if !self.config.repair_retry {
            return Err(rejected.into());
        }

        let repair = repair_prompt(&user, rejected.violations());
        let raw = self.call_model(SYSTEM_PROMPT, &repair, cancel).await?;
        match validate(&raw, &limits) {
            Ok(plan) => Ok(self.accepted(plan)),
            Err(err) => {
                warn!(kind = %err.kind(), violations = err.violations().len(), "repaired output rejected");
                Err(err.into())
            }
        }
    }

    /// Generate a plan and commit it into `project_id`, all or nothing.
    pub async fn ingest(
        &self,
        board: &BoardService,
        project_id: Uuid,
        request: &IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<PlanCommit> {
        self.check_request(request)?;
        board.project(project_id).await?;

        let plan = self.generate_plan(request, cancel).await?;
        if cancel.is_cancelled() {
            info!(%project_id, "ingestion cancelled after generation");
            return Err(PlanboardError::Cancelled);
        }
        board.commit_plan(project_id, &plan, cancel).await
    }

    fn accepted(&self, plan: Plan) -> Plan {
        info!(
            milestones = plan.milestones.len(),
            tasks = plan.task_count(),
            effort_hours = plan.total_effort_hours(),
            "plan accepted"
        );
        plan
    }

    /// One model call bounded by the configured timeout and by `cancel`.
    async fn call_model(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(PlanboardError::Cancelled);
        }
        let options = GenerateOptions {
            effort: self.config.effort,
        };
        let timeout = self.config.model_timeout();
        let call = tokio::time::timeout(timeout, self.model.generate(system, user, &options));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PlanboardError::Cancelled),
            result = call => match result {
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "model call timed out");
                    Err(PlanboardError::UpstreamUnavailable {
                        message: format!("model did not answer within {}s", timeout.as_secs()),
                        timed_out: true,
                    })
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "model call failed");
                    Err(PlanboardError::UpstreamUnavailable {
                        message: e.to_string(),
                        timed_out: false,
                    })
                }
                Ok(Ok(text)) if text.trim().is_empty() => {
                    warn!("model returned an empty response");
                    Err(PlanboardError::UpstreamUnavailable {
                        message: "model returned an empty response".into(),
                        timed_out: false,
                    })
                }
                Ok(Ok(text)) => Ok(text),
            },
        }
    }
}
