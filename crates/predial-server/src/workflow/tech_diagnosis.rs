use chrono::NaiveDate;
use predial_common::mcp_api::{DiagnosisResponse, PathologyInfo, TextResponse, UserProfile};
use predial_common::text_service::TextService;
use tokio::sync::Mutex;
use tracing::info;

use super::{format_date, require, run_exclusive, Context, Request, RequestSlot, Slotted, WorkflowError};
use crate::document::{render, Fragment, ReportMeta};
use crate::prompt;
use crate::response::strip_code_fences;

pub const REPORT_TITLE: &str = "Relatório de Diagnóstico e Correção";

#[derive(Debug, Default)]
pub struct TechDiagnosisState {
    slot: RequestSlot,
    /// Symptoms the current diagnosis was generated from.
    description: String,
    diagnosis: Option<String>,
    plan: Option<String>,
}

impl Slotted for TechDiagnosisState {
    fn slot(&mut self) -> &mut RequestSlot {
        &mut self.slot
    }
}

/// Symptom analysis followed by a correction plan.
pub struct TechDiagnosisWorkflow<S> {
    ctx: Context<S>,
    state: Mutex<TechDiagnosisState>,
}

impl<S: TextService> TechDiagnosisWorkflow<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            state: Mutex::new(TechDiagnosisState::default()),
        }
    }

    pub async fn diagnose(&self, description: &str) -> Result<DiagnosisResponse, WorkflowError> {
        let correlator = &self.ctx.correlator;
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |_: &mut TechDiagnosisState| {
                if !require(description) {
                    return Err(WorkflowError::Invalid(
                        "Por favor, descreva os sintomas observados.".to_string(),
                    ));
                }
                let description = description.trim().to_string();
                Ok((Request::Text(prompt::symptom_analysis(&description)), description))
            },
            |state, outcome, description| {
                let diagnosis = strip_code_fences(&outcome?);
                let related = correlator.correlate(&diagnosis);
                info!(related = related.len(), "symptom analysis generated");
                state.description = description;
                state.diagnosis = Some(diagnosis.clone());
                state.plan = None;
                Ok(DiagnosisResponse {
                    html: diagnosis,
                    related_pathologies: related.iter().map(PathologyInfo::from).collect(),
                    notice: None,
                })
            },
        )
        .await
    }

    pub async fn plan_correction(&self) -> Result<TextResponse, WorkflowError> {
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut TechDiagnosisState| {
                let diagnosis = state.diagnosis.as_deref().ok_or_else(|| {
                    WorkflowError::Precondition("Gere a análise de diagnóstico primeiro.".to_string())
                })?;
                let prompt = prompt::correction_plan(&state.description, diagnosis);
                Ok((Request::Text(prompt), ()))
            },
            |state, outcome, ()| {
                let plan = strip_code_fences(&outcome?);
                info!("correction plan generated");
                state.plan = Some(plan.clone());
                Ok(TextResponse { text: plan })
            },
        )
        .await
    }

    pub async fn export(
        &self,
        profile: Option<&UserProfile>,
        today: NaiveDate,
    ) -> Result<(String, String), WorkflowError> {
        let state = self.state.lock().await;
        let diagnosis = state.diagnosis.as_ref().ok_or_else(|| {
            WorkflowError::Precondition("Gere a análise de diagnóstico primeiro.".to_string())
        })?;

        let mut fragments = vec![Fragment::Html(format!(
            "<h2>Análise de Diagnóstico</h2>{diagnosis}"
        ))];
        if let Some(plan) = &state.plan {
            fragments.push(Fragment::PageBreak);
            fragments.push(Fragment::Html(format!("<h2>Plano de Ação e Correção</h2>{plan}")));
        }
        let meta = ReportMeta {
            title: REPORT_TITLE.to_string(),
            info: vec![
                ("Sintomas Observados".to_string(), state.description.clone()),
                ("Data".to_string(), format_date(today)),
            ],
            ..Default::default()
        };
        let document = render(&fragments, profile, &meta)?;
        Ok((REPORT_TITLE.to_string(), document))
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.slot.reset();
        state.description.clear();
        state.diagnosis = None;
        state.plan = None;
    }
}
