use chrono::NaiveDate;
use predial_common::mcp_api::{
    HtmlResultResponse, MaintenanceScheduleParams, SelectionResponse, SuggestionInfo,
    SuggestionsResponse, UserProfile,
};
use predial_common::text_service::TextService;
use tokio::sync::Mutex;
use tracing::info;

use super::{format_date, require, run_exclusive, Context, Request, RequestSlot, Slotted, WorkflowError};
use crate::document::{render, Fragment, ReportMeta};
use crate::prompt;
use crate::response::{extract_table, parse_suggestions, Suggestion, TableFragment};
use crate::selection::Selection;

pub const REPORT_TITLE: &str = "Cronograma de Manutenção Predial";

#[derive(Debug, Default)]
pub struct ScheduleState {
    slot: RequestSlot,
    selection: Selection,
    suggestions: Vec<Suggestion>,
    building_name: String,
    address: String,
    schedule: Option<TableFragment>,
}

impl Slotted for ScheduleState {
    fn slot(&mut self) -> &mut RequestSlot {
        &mut self.slot
    }
}

/// Maintenance schedule and periodicity suggestions for the selected typologies.
pub struct ScheduleWorkflow<S> {
    ctx: Context<S>,
    state: Mutex<ScheduleState>,
}

impl<S: TextService> ScheduleWorkflow<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            state: Mutex::new(ScheduleState::default()),
        }
    }

    pub async fn set_checked(
        &self,
        system_key: &str,
        typology_id: &str,
        checked: bool,
    ) -> SelectionResponse {
        let mut state = self.state.lock().await;
        state.selection.set_checked(system_key, typology_id, checked);
        SelectionResponse {
            any_selected: state.selection.is_any_selected(),
            selected_labels: state.selection.flatten_selected_labels(&self.ctx.catalog),
        }
    }

    pub async fn suggest_periodicity(&self) -> Result<SuggestionsResponse, WorkflowError> {
        let catalog = &self.ctx.catalog;
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut ScheduleState| {
                if !state.selection.is_any_selected() {
                    return Err(WorkflowError::Invalid(
                        "Por favor, selecione pelo menos um sistema.".to_string(),
                    ));
                }
                let pairs = state.selection.selected_pairs(catalog);
                let prompt = prompt::schedule_suggestion(&pairs).ok_or_else(|| {
                    WorkflowError::Info(
                        "Não há dados de manutenção para as tipologias selecionadas.".to_string(),
                    )
                })?;
                Ok((Request::Text(prompt), ()))
            },
            |state, outcome, ()| {
                let suggestions = parse_suggestions(&outcome?);
                info!(count = suggestions.len(), "periodicity suggestions parsed");
                let response = SuggestionsResponse {
                    suggestions: suggestions.iter().map(SuggestionInfo::from).collect(),
                };
                state.suggestions = suggestions;
                Ok(response)
            },
        )
        .await
    }

    pub async fn generate(
        &self,
        params: MaintenanceScheduleParams,
    ) -> Result<HtmlResultResponse, WorkflowError> {
        let catalog = &self.ctx.catalog;
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut ScheduleState| {
                if !(require(&params.building_name) && require(&params.address)) {
                    return Err(WorkflowError::Invalid(
                        "Por favor, preencha todos os campos obrigatórios.".to_string(),
                    ));
                }
                let labels = state.selection.flatten_selected_labels(catalog);
                if labels.is_empty() {
                    return Err(WorkflowError::Invalid(
                        "Por favor, selecione pelo menos um sistema.".to_string(),
                    ));
                }
                let building = (
                    params.building_name.trim().to_string(),
                    params.address.trim().to_string(),
                );
                Ok((Request::Text(prompt::maintenance_schedule(&labels)), building))
            },
            |state, outcome, (building_name, address)| {
                let table = extract_table(&outcome?, prompt::SCHEDULE_FALLBACK);
                info!(fallback = table.fallback, "maintenance schedule generated");
                let response = HtmlResultResponse {
                    html: table.html.clone(),
                    fallback: table.fallback,
                };
                state.building_name = building_name;
                state.address = address;
                state.schedule = Some(table);
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
        let schedule = state.schedule.as_ref().ok_or_else(|| {
            WorkflowError::Precondition("Gere o cronograma antes de exportar o relatório.".to_string())
        })?;
        let meta = ReportMeta {
            title: REPORT_TITLE.to_string(),
            info: vec![
                ("Edifício".to_string(), state.building_name.clone()),
                ("Endereço".to_string(), state.address.clone()),
                ("Data".to_string(), format_date(today)),
            ],
            ..Default::default()
        };
        let document = render(&[Fragment::Html(schedule.html.clone())], profile, &meta)?;
        Ok((REPORT_TITLE.to_string(), document))
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.slot.reset();
        state.selection.reset();
        state.suggestions.clear();
        state.building_name.clear();
        state.address.clear();
        state.schedule = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, profile, ScriptedText};

    #[tokio::test]
    async fn test_suggestion_prompt_names_selected_typology() {
        let reply = r#"Claro! [{"typology":"Cobertura","periodicity":"Mensal","justification":"Ralos entopem."}]"#;
        let (ctx, ai) = context(ScriptedText::replying(vec![Ok(reply.to_string())]));
        let workflow = ScheduleWorkflow::new(ctx);

        let selection = workflow
            .set_checked("impermeabilizacao", "cobertura", true)
            .await;
        assert_eq!(selection.selected_labels, vec!["Impermeabilização: Cobertura"]);

        let out = workflow.suggest_periodicity().await.expect("suggested");
        assert_eq!(out.suggestions.len(), 1);
        assert_eq!(out.suggestions[0].periodicity, "Mensal");

        let calls = ai.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("Impermeabilização: Cobertura"));
        assert!(calls[0].prompt.contains("Limpeza de ralos, calhas e rufos"));
        assert!(calls[0]
            .prompt
            .contains("Inspeção da proteção mecânica e das juntas de dilatação"));
    }

    #[tokio::test]
    async fn test_suggestion_needs_a_selection() {
        let (ctx, ai) = context(ScriptedText::default());
        let workflow = ScheduleWorkflow::new(ctx);
        let err = workflow.suggest_periodicity().await.expect_err("empty");
        assert_eq!(err.to_string(), "Por favor, selecione pelo menos um sistema.");

        workflow.set_checked("inexistente", "x", true).await;
        let err = workflow.suggest_periodicity().await.expect_err("no data");
        assert!(matches!(err, WorkflowError::Info(_)));
        assert!(ai.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_suggestions_are_empty_not_an_error() {
        let (ctx, _ai) = context(ScriptedText::replying(vec![Ok("sem json".to_string())]));
        let workflow = ScheduleWorkflow::new(ctx);
        workflow.set_checked("fachadas", "pintura-externa", true).await;
        let out = workflow.suggest_periodicity().await.expect("recovered");
        assert!(out.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_generate_and_export_schedule() {
        let table = "<table><tr><th>Sistema</th></tr></table>";
        let (ctx, ai) = context(ScriptedText::replying(vec![Ok(format!("```html\n{table}\n```"))]));
        let workflow = ScheduleWorkflow::new(ctx);
        workflow.set_checked("elevadores", "elevador-elétrico", true).await;

        let out = workflow
            .generate(MaintenanceScheduleParams {
                building_name: "Bloco B".to_string(),
                address: "Av. Brasil, 1".to_string(),
            })
            .await
            .expect("generated");
        assert_eq!(out.html, table);
        assert!(ai.calls()[0].prompt.contains("\"Elevadores: Elevador Elétrico\""));

        let today = NaiveDate::from_ymd_opt(2025, 1, 31).expect("date");
        let (title, document) = workflow.export(Some(&profile()), today).await.expect("exported");
        assert_eq!(title, REPORT_TITLE);
        assert!(document.contains("<p><strong>Data:</strong> 31/01/2025</p>"));
        assert!(document.contains("<p><strong>Edifício:</strong> Bloco B</p>"));
    }

    #[tokio::test]
    async fn test_reset_clears_selection_and_results() {
        let (ctx, _ai) = context(ScriptedText::replying(vec![Ok("<table></table>".to_string())]));
        let workflow = ScheduleWorkflow::new(ctx);
        workflow.set_checked("fachadas", "pintura-externa", true).await;
        workflow
            .generate(MaintenanceScheduleParams {
                building_name: "A".to_string(),
                address: "B".to_string(),
            })
            .await
            .expect("generated");
        workflow.reset().await;

        let today = NaiveDate::from_ymd_opt(2025, 1, 31).expect("date");
        assert!(workflow.export(Some(&profile()), today).await.is_err());
        let selection = workflow.set_checked("fachadas", "pintura-externa", false).await;
        assert!(!selection.any_selected);
    }
}
