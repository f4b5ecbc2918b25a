use predial_common::mcp_api::{
    HtmlResultResponse, InspectionChecklistParams, SelectionResponse, UserProfile,
};
use predial_common::text_service::TextService;
use tokio::sync::Mutex;
use tracing::info;

use super::{format_form_date, require, run_exclusive, Context, Request, RequestSlot, Slotted, WorkflowError};
use crate::document::{render, Fragment, ReportMeta};
use crate::prompt;
use crate::response::{extract_table, TableFragment};
use crate::selection::Selection;

pub const REPORT_TITLE: &str = "Checklist de Inspeção Predial";

const CHECKLIST_CSS: &str = r#"td[colspan="3"] { background-color: #e0e0e0; font-weight: bold; }"#;

#[derive(Debug, Clone, Default)]
struct Building {
    name: String,
    address: String,
    inspection_date: String,
}

#[derive(Debug, Default)]
pub struct InspectionState {
    slot: RequestSlot,
    selection: Selection,
    /// Building data of the request that produced `checklist`.
    building: Building,
    checklist: Option<TableFragment>,
}

impl Slotted for InspectionState {
    fn slot(&mut self) -> &mut RequestSlot {
        &mut self.slot
    }
}

/// Inspection checklist for the selected typologies of one building.
pub struct InspectionWorkflow<S> {
    ctx: Context<S>,
    state: Mutex<InspectionState>,
}

impl<S: TextService> InspectionWorkflow<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            state: Mutex::new(InspectionState::default()),
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

    pub async fn generate(
        &self,
        params: InspectionChecklistParams,
    ) -> Result<HtmlResultResponse, WorkflowError> {
        let catalog = &self.ctx.catalog;
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut InspectionState| {
                if !(require(&params.building_name)
                    && require(&params.address)
                    && require(&params.inspection_date))
                {
                    return Err(WorkflowError::Invalid(
                        "Por favor, preencha todos os campos obrigatórios.".to_string(),
                    ));
                }
                let labels = state.selection.flatten_selected_labels(catalog);
                if labels.is_empty() {
                    return Err(WorkflowError::Invalid(
                        "Selecione pelo menos uma tipologia para a vistoria.".to_string(),
                    ));
                }
                let building = Building {
                    name: params.building_name.trim().to_string(),
                    address: params.address.trim().to_string(),
                    inspection_date: params.inspection_date.trim().to_string(),
                };
                Ok((Request::Text(prompt::inspection_checklist(&labels)), building))
            },
            |state, outcome, building| {
                let table = extract_table(&outcome?, prompt::CHECKLIST_FALLBACK);
                info!(fallback = table.fallback, "inspection checklist generated");
                let response = HtmlResultResponse {
                    html: table.html.clone(),
                    fallback: table.fallback,
                };
                state.building = building;
                state.checklist = Some(table);
                Ok(response)
            },
        )
        .await
    }

    pub async fn export(&self, profile: Option<&UserProfile>) -> Result<(String, String), WorkflowError> {
        let state = self.state.lock().await;
        let checklist = state.checklist.as_ref().ok_or_else(|| {
            WorkflowError::Precondition("Gere o checklist antes de exportar o relatório.".to_string())
        })?;
        let meta = ReportMeta {
            title: REPORT_TITLE.to_string(),
            info: vec![
                ("Edificação".to_string(), state.building.name.clone()),
                ("Endereço".to_string(), state.building.address.clone()),
                (
                    "Data da Vistoria".to_string(),
                    format_form_date(&state.building.inspection_date),
                ),
            ],
            extra_css: Some(CHECKLIST_CSS.to_string()),
            signature_caption: Some("Responsável pela Vistoria:".to_string()),
        };
        let document = render(&[Fragment::Html(checklist.html.clone())], profile, &meta)?;
        Ok((REPORT_TITLE.to_string(), document))
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.slot.reset();
        state.selection.reset();
        state.building = Building::default();
        state.checklist = None;
    }
}
