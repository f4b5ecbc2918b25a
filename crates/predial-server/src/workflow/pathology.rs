use chrono::NaiveDate;
use predial_common::mcp_api::{HtmlResultResponse, PathologyInfo, TextResponse, UserProfile};
use predial_common::text_service::TextService;
use tokio::sync::Mutex;
use tracing::info;

use super::{format_date, run_exclusive, Context, Request, RequestSlot, Slotted, WorkflowError};
use crate::document::{render, Fragment, ReportMeta};
use crate::model::Pathology;
use crate::prompt;
use crate::response::{extract_table, strip_code_fences, TableFragment};

#[derive(Debug, Default)]
pub struct PathologyState {
    slot: RequestSlot,
    pathology: Option<Pathology>,
    plan: Option<String>,
    budget: Option<TableFragment>,
}

impl Slotted for PathologyState {
    fn slot(&mut self) -> &mut RequestSlot {
        &mut self.slot
    }
}

/// Action plan and cost estimate for one catalog pathology.
pub struct PathologyWorkflow<S> {
    ctx: Context<S>,
    state: Mutex<PathologyState>,
}

impl<S: TextService> PathologyWorkflow<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            state: Mutex::new(PathologyState::default()),
        }
    }

    /// Make `title` of `system_key` the current pathology. Choosing a different one
    /// drops the plan and budget of the previous one. Refused while a plan or budget
    /// is being generated.
    pub async fn choose(&self, system_key: &str, title: &str) -> Result<PathologyInfo, WorkflowError> {
        let pathology = self
            .ctx
            .catalog
            .find_pathology(system_key, title)
            .ok_or_else(|| WorkflowError::Invalid("Patologia não encontrada no catálogo.".to_string()))?;

        let mut state = self.state.lock().await;
        state.slot.ensure_idle()?;
        if state.pathology.as_ref() != Some(pathology) {
            state.pathology = Some(pathology.clone());
            state.plan = None;
            state.budget = None;
        }
        Ok(PathologyInfo::from(pathology))
    }

    pub async fn plan_action(&self) -> Result<TextResponse, WorkflowError> {
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut PathologyState| {
                let pathology = state.pathology.as_ref().ok_or_else(|| {
                    WorkflowError::Precondition("Selecione uma patologia do catálogo.".to_string())
                })?;
                Ok((Request::Text(prompt::pathology_action_plan(pathology)), ()))
            },
            |state, outcome, ()| {
                let plan = strip_code_fences(&outcome?);
                info!("pathology action plan generated");
                state.plan = Some(plan.clone());
                state.budget = None;
                Ok(TextResponse { text: plan })
            },
        )
        .await
    }

    pub async fn estimate_budget(&self) -> Result<HtmlResultResponse, WorkflowError> {
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut PathologyState| {
                let (Some(pathology), Some(plan)) = (&state.pathology, &state.plan) else {
                    return Err(WorkflowError::Precondition(
                        "É necessário gerar o Plano de Ação primeiro.".to_string(),
                    ));
                };
                Ok((Request::Text(prompt::pathology_budget(&pathology.title, plan)), ()))
            },
            |state, outcome, ()| {
                let table = extract_table(&outcome?, prompt::BUDGET_FALLBACK);
                info!(fallback = table.fallback, "pathology budget generated");
                let response = HtmlResultResponse {
                    html: table.html.clone(),
                    fallback: table.fallback,
                };
                state.budget = Some(table);
                Ok(response)
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
        let (Some(pathology), Some(plan)) = (&state.pathology, &state.plan) else {
            return Err(WorkflowError::Precondition(
                "É necessário gerar o Plano de Ação primeiro.".to_string(),
            ));
        };

        let title = format!("Relatório de Patologia - {}", pathology.title);
        let mut fragments = vec![Fragment::Html(format!("<h2>Plano de Ação</h2>{plan}"))];
        if let Some(budget) = &state.budget {
            fragments.push(Fragment::PageBreak);
            fragments.push(Fragment::Html(format!(
                "<h2>Orçamento Estimativo</h2>{}",
                budget.html
            )));
        }
        let meta = ReportMeta {
            title: title.clone(),
            info: vec![
                ("Patologia".to_string(), pathology.title.clone()),
                ("Sintomas Observados".to_string(), pathology.symptoms.clone()),
                ("Data do Relatório".to_string(), format_date(today)),
            ],
            ..Default::default()
        };
        let document = render(&fragments, profile, &meta)?;
        Ok((title, document))
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.slot.reset();
        state.pathology = None;
        state.plan = None;
        state.budget = None;
    }
}
