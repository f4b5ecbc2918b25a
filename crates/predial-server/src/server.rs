/// MCP server for the building-maintenance catalog and report workflows.
///
/// Catalog tools are read-only lookups. Workflow tools drive the per-session
/// orchestrators, and `export_report` turns a workflow's results into a printable
/// document branded with the saved profile.
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::info;

use crate::catalog::Catalog;
use crate::export::ReportSink;
use crate::model::System;
use crate::profile::{format_cnpj, ProfileStore};
use crate::workflow::image_diagnosis::validate_image;
use crate::workflow::{kind_slug, Workflows};
use predial_common::mcp_api::{
    AddImagesParams, AssistantParams, CatalogOverview, CategorySummary, ConversationResponse,
    DiagnosisResponse, DiagnosticInfo, FormatCnpjParams, GetScheduleParams, GetSystemParams,
    HtmlResultResponse, ImageDiagnosisParams, ImageSetResponse, InspectionChecklistParams,
    MaintenanceScheduleParams, OkResponse, PathologyGroup, PathologyInfo, PathologyPlanParams,
    ProfileResponse, RemoveImageParams, ReportResponse, ScheduleEntryInfo, ScheduleResponse,
    SelectTypologyParams, SelectionResponse, SelectionWorkflow, SuggestionsResponse,
    SymptomDiagnosisParams, SystemDetailResponse, SystemSummary, TechnologyInfo, TextResponse,
    TypologyInfo, TypologyOption, UpdateProfileParams, WorkflowParams,
};
use predial_common::text_service::TextService;

#[derive(Clone)]
pub struct PredialServer<S> {
    catalog: Arc<Catalog>,
    workflows: Arc<Workflows<S>>,
    profiles: Arc<ProfileStore>,
    sink: ReportSink,
    tool_router: ToolRouter<PredialServer<S>>,
}

impl<S: TextService + 'static> PredialServer<S> {
    pub fn new(
        catalog: Arc<Catalog>,
        workflows: Workflows<S>,
        profiles: ProfileStore,
        sink: ReportSink,
    ) -> Self {
        Self {
            catalog,
            workflows: Arc::new(workflows),
            profiles: Arc::new(profiles),
            sink,
            tool_router: Self::tool_router(),
        }
    }

    fn system(&self, key: &str) -> Result<&System, String> {
        self.catalog
            .system(key)
            .ok_or_else(|| format!("Sistema não encontrado: {key}."))
    }
}

#[tool_router]
impl<S: TextService + 'static> PredialServer<S> {
    #[tool(description = "List the maintenance catalog: categories, their systems and each system's typologies with the ids used by select_typology.")]
    async fn list_catalog(&self) -> Result<Json<CatalogOverview>, String> {
        let categories = self
            .catalog
            .categories()
            .iter()
            .map(|c| CategorySummary {
                key: c.key.clone(),
                title: c.title.clone(),
                systems: c
                    .systems
                    .iter()
                    .map(|s| SystemSummary {
                        key: s.key.clone(),
                        title: s.title.clone(),
                        icon: s.icon.clone(),
                        typologies: s.typologies.iter().map(TypologyOption::from).collect(),
                    })
                    .collect(),
            })
            .collect();
        Ok(Json(CatalogOverview {
            version: self.catalog.version().to_string(),
            categories,
        }))
    }

    #[tool(description = "Get one building system: typologies, pathologies grouped by typology (optionally filtered to one typology), diagnostic methods and 4.0 technologies.")]
    async fn get_system(
        &self,
        Parameters(params): Parameters<GetSystemParams>,
    ) -> Result<Json<SystemDetailResponse>, String> {
        let (category, system) = self
            .catalog
            .system_with_category(params.system_key.trim())
            .ok_or_else(|| format!("Sistema não encontrado: {}.", params.system_key))?;

        let filter = params.typology_filter.as_deref().filter(|f| !f.is_empty());
        let pathology_groups = system
            .typologies_with_pathologies(filter)
            .into_iter()
            .map(|(typology, pathologies)| PathologyGroup {
                typology: typology.title.clone(),
                pathologies: pathologies.into_iter().map(PathologyInfo::from).collect(),
            })
            .collect();
        let unlinked_pathologies = match filter {
            Some(_) => Vec::new(),
            None => self
                .catalog
                .find_pathologies_by_system(&system.key)
                .iter()
                .filter(|p| system.typology_for(p).is_none())
                .map(PathologyInfo::from)
                .collect(),
        };

        Ok(Json(SystemDetailResponse {
            category_key: category.key.clone(),
            key: system.key.clone(),
            title: system.title.clone(),
            typologies: system.typologies.iter().map(TypologyInfo::from).collect(),
            typology_filters: system
                .typology_filters()
                .into_iter()
                .map(|t| t.title.clone())
                .collect(),
            pathology_groups,
            unlinked_pathologies,
            diagnostics: system.diagnostics.iter().map(DiagnosticInfo::from).collect(),
            technologies: system.technologies.iter().map(TechnologyInfo::from).collect(),
        }))
    }

    #[tool(description = "Get the catalog maintenance schedule (activity, periodicity, recommendations) of one typology of a system.")]
    async fn get_maintenance_schedule(
        &self,
        Parameters(params): Parameters<GetScheduleParams>,
    ) -> Result<Json<ScheduleResponse>, String> {
        let system = self.system(params.system_key.trim())?;
        let entries = self
            .catalog
            .find_schedule_by_typology(&system.key, &params.typology_title)
            .iter()
            .map(ScheduleEntryInfo::from)
            .collect();
        Ok(Json(ScheduleResponse {
            system_key: system.key.clone(),
            typology_title: params.typology_title,
            entries,
        }))
    }

    #[tool(description = "Get the saved professional profile and letterhead used to brand exported reports.")]
    async fn get_profile(&self) -> Result<Json<ProfileResponse>, String> {
        Ok(Json(ProfileResponse {
            profile: self.profiles.get().await,
        }))
    }

    #[tool(description = "Save the professional profile and letterhead. Full name, profession, agency name and agency address are required; the CNPJ must be empty or 00.000.000/0000-00.")]
    async fn update_profile(
        &self,
        Parameters(params): Parameters<UpdateProfileParams>,
    ) -> Result<Json<ProfileResponse>, String> {
        let profile = self.profiles.update(params).await.map_err(|e| e.to_string())?;
        Ok(Json(ProfileResponse {
            profile: Some(profile),
        }))
    }

    #[tool(description = "Format the digits of a value as a CNPJ (00.000.000/0000-00), as far as the digits go.")]
    async fn format_cnpj(
        &self,
        Parameters(params): Parameters<FormatCnpjParams>,
    ) -> Result<Json<TextResponse>, String> {
        Ok(Json(TextResponse {
            text: format_cnpj(&params.value),
        }))
    }

    #[tool(description = "Check or uncheck a typology for the inspection checklist or the maintenance schedule. Returns the selected 'System: Typology' labels.")]
    async fn select_typology(
        &self,
        Parameters(params): Parameters<SelectTypologyParams>,
    ) -> Result<Json<SelectionResponse>, String> {
        let system = self.system(params.system_key.trim())?;
        let typology = system.typology_by_id(&params.typology_id).ok_or_else(|| {
            format!(
                "Tipologia {} não encontrada no sistema {}.",
                params.typology_id, system.title
            )
        })?;
        let id = typology.id();
        let response = match params.workflow {
            SelectionWorkflow::Inspection => {
                self.workflows
                    .inspection
                    .set_checked(&system.key, &id, params.checked)
                    .await
            }
            SelectionWorkflow::MaintenanceSchedule => {
                self.workflows
                    .schedule
                    .set_checked(&system.key, &id, params.checked)
                    .await
            }
        };
        Ok(Json(response))
    }

    #[tool(description = "Reset a workflow: clears its selection, form data and results. A response still in flight is discarded.")]
    async fn reset_workflow(
        &self,
        Parameters(params): Parameters<WorkflowParams>,
    ) -> Result<Json<OkResponse>, String> {
        self.workflows.reset(params.workflow).await;
        Ok(Json(OkResponse { ok: true }))
    }

    #[tool(description = "Generate an inspection checklist table for the selected typologies of a building. The inspection date is YYYY-MM-DD.")]
    async fn generate_inspection_checklist(
        &self,
        Parameters(params): Parameters<InspectionChecklistParams>,
    ) -> Result<Json<HtmlResultResponse>, String> {
        self.workflows
            .inspection
            .generate(params)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Suggest a maintenance periodicity, with justification, for each typology selected for the maintenance schedule.")]
    async fn suggest_maintenance_periodicity(&self) -> Result<Json<SuggestionsResponse>, String> {
        self.workflows
            .schedule
            .suggest_periodicity()
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Generate the maintenance schedule table (Sistema, Atividade, Periodicidade, Recomendações) for the selected typologies.")]
    async fn generate_maintenance_schedule(
        &self,
        Parameters(params): Parameters<MaintenanceScheduleParams>,
    ) -> Result<Json<HtmlResultResponse>, String> {
        self.workflows
            .schedule
            .generate(params)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Analyse photos of a building component (category, system, typology). Images given here replace the held ones (max 5, JPEG/PNG/WebP base64). Returns the analysis and the catalog pathologies it mentions.")]
    async fn diagnose_images(
        &self,
        Parameters(params): Parameters<ImageDiagnosisParams>,
    ) -> Result<Json<DiagnosisResponse>, String> {
        let workflow = &self.workflows.image_diagnosis;
        if let Some(images) = &params.images {
            images
                .iter()
                .try_for_each(validate_image)
                .map_err(|e| e.to_string())?;
        }
        workflow
            .choose_component(&params.category_key, &params.system_key, &params.typology_title)
            .await
            .map_err(|e| e.to_string())?;
        let mut notice = None;
        if let Some(images) = params.images {
            let set = workflow.replace_images(images).await.map_err(|e| e.to_string())?;
            if let Some(capped) = &set.notice {
                info!(notice = %capped, "image set capped");
            }
            notice = set.notice;
        }
        let mut response = workflow.diagnose().await.map_err(|e| e.to_string())?;
        response.notice = notice;
        Ok(Json(response))
    }

    #[tool(description = "Add images for the image diagnosis (max 5 in total; extras are ignored with a notice).")]
    async fn add_diagnosis_images(
        &self,
        Parameters(params): Parameters<AddImagesParams>,
    ) -> Result<Json<ImageSetResponse>, String> {
        self.workflows
            .image_diagnosis
            .add_images(params.images)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Remove one held image of the image diagnosis by its zero-based index.")]
    async fn remove_diagnosis_image(
        &self,
        Parameters(params): Parameters<RemoveImageParams>,
    ) -> Result<Json<ImageSetResponse>, String> {
        self.workflows
            .image_diagnosis
            .remove_image(params.index)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Analyse described symptoms: probable causes and the diagnostic technologies best suited to investigate them.")]
    async fn diagnose_symptoms(
        &self,
        Parameters(params): Parameters<SymptomDiagnosisParams>,
    ) -> Result<Json<DiagnosisResponse>, String> {
        self.workflows
            .tech_diagnosis
            .diagnose(&params.description)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Create a correction plan from the current symptom analysis.")]
    async fn plan_symptom_correction(&self) -> Result<Json<TextResponse>, String> {
        self.workflows
            .tech_diagnosis
            .plan_correction()
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Create an action plan for a catalog pathology of a system.")]
    async fn plan_pathology_action(
        &self,
        Parameters(params): Parameters<PathologyPlanParams>,
    ) -> Result<Json<TextResponse>, String> {
        let workflow = &self.workflows.pathology;
        workflow
            .choose(params.system_key.trim(), &params.pathology_title)
            .await
            .map_err(|e| e.to_string())?;
        workflow.plan_action().await.map(Json).map_err(|e| e.to_string())
    }

    #[tool(description = "Estimate a preliminary budget table for the current pathology action plan.")]
    async fn estimate_pathology_budget(&self) -> Result<Json<HtmlResultResponse>, String> {
        self.workflows
            .pathology
            .estimate_budget()
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Send a message to the building-maintenance assistant. The conversation history is kept until reset.")]
    async fn ask_assistant(
        &self,
        Parameters(params): Parameters<AssistantParams>,
    ) -> Result<Json<ConversationResponse>, String> {
        self.workflows
            .assistant
            .send(&params.message)
            .await
            .map(Json)
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Export a workflow's results as a printable A4 HTML document with the saved letterhead and signature.")]
    async fn export_report(
        &self,
        Parameters(params): Parameters<WorkflowParams>,
    ) -> Result<Json<ReportResponse>, String> {
        let profile = self.profiles.get().await;
        let today = chrono::Local::now().date_naive();
        let report = self
            .workflows
            .export(params.workflow, profile.as_ref(), today)
            .await
            .map_err(|e| e.to_string())?;

        let saved_to = self
            .sink
            .save(kind_slug(report.kind), &report.document)
            .await
            .map_err(|e| e.to_string())?;
        info!(
            workflow = kind_slug(report.kind),
            bytes = report.document.len(),
            saved = saved_to.is_some(),
            "report exported"
        );
        Ok(Json(ReportResponse {
            title: report.title,
            document: report.document,
            saved_to: saved_to.map(|p| p.display().to_string()),
        }))
    }
}

#[tool_handler]
impl<S: TextService + 'static> ServerHandler for PredialServer<S> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "gestor-predial".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Building maintenance catalog and report assistant. Browse systems with \
                 list_catalog and get_system, select typologies with select_typology, then \
                 generate checklists, schedules, diagnoses and plans. Save a profile with \
                 update_profile before calling export_report."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, profile, ScriptedText};
    use predial_common::mcp_api::{Profession, WorkflowKind};
    use predial_common::text_service::ImagePayload;

    fn server(ai: ScriptedText) -> PredialServer<ScriptedText> {
        let (ctx, _ai) = context(ai);
        let catalog = Arc::clone(&ctx.catalog);
        PredialServer::new(
            catalog,
            Workflows::new(ctx),
            ProfileStore::default(),
            ReportSink::default(),
        )
    }

    #[test]
    fn tools_publish_output_schemas() {
        let tools = PredialServer::<ScriptedText>::tool_router().list_all();
        for name in [
            "list_catalog",
            "get_system",
            "get_maintenance_schedule",
            "get_profile",
            "update_profile",
            "format_cnpj",
            "select_typology",
            "reset_workflow",
            "generate_inspection_checklist",
            "suggest_maintenance_periodicity",
            "generate_maintenance_schedule",
            "diagnose_images",
            "add_diagnosis_images",
            "remove_diagnosis_image",
            "diagnose_symptoms",
            "plan_symptom_correction",
            "plan_pathology_action",
            "estimate_pathology_budget",
            "ask_assistant",
            "export_report",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[tokio::test]
    async fn test_get_system_groups_and_filters_pathologies() {
        let server = server(ScriptedText::default());
        let Json(detail) = server
            .get_system(Parameters(GetSystemParams {
                system_key: "fachadas".to_string(),
                typology_filter: None,
            }))
            .await
            .expect("system");
        assert_eq!(detail.category_key, "estrutura");
        let groups: Vec<&str> = detail.pathology_groups.iter().map(|g| g.typology.as_str()).collect();
        assert_eq!(groups, vec!["Revestimento Cerâmico", "Pintura Externa"]);
        assert_eq!(detail.unlinked_pathologies[0].title, "Manchamento por Fuligem");

        let Json(filtered) = server
            .get_system(Parameters(GetSystemParams {
                system_key: "fachadas".to_string(),
                typology_filter: Some("Pintura Externa".to_string()),
            }))
            .await
            .expect("filtered");
        assert_eq!(filtered.pathology_groups.len(), 1);
        assert_eq!(filtered.pathology_groups[0].pathologies.len(), 2);
        assert!(filtered.unlinked_pathologies.is_empty());

        assert!(server
            .get_system(Parameters(GetSystemParams {
                system_key: "inexistente".to_string(),
                typology_filter: None,
            }))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_diagnose_images_reports_ignored_images() {
        let server = server(ScriptedText::replying(vec![Ok("<p>Há bolor.</p>".to_string())]));
        let jpeg = ImagePayload {
            base64: "/9j/4AAQ".to_string(),
            mime_type: "image/jpeg".to_string(),
        };
        let Json(out) = server
            .diagnose_images(Parameters(ImageDiagnosisParams {
                category_key: "estrutura".to_string(),
                system_key: "fachadas".to_string(),
                typology_title: "Pintura Externa".to_string(),
                images: Some(vec![jpeg; 7]),
            }))
            .await
            .expect("diagnosed");
        assert_eq!(
            out.notice.as_deref(),
            Some("Você pode adicionar mais 5 imagem(ns). As demais foram ignoradas.")
        );
        assert_eq!(out.related_pathologies[0].title, "Bolor");
    }

    #[tokio::test]
    async fn test_select_typology_rejects_unknown_ids() {
        let server = server(ScriptedText::default());
        let params = |typology_id: &str| SelectTypologyParams {
            workflow: SelectionWorkflow::Inspection,
            system_key: "impermeabilizacao".to_string(),
            typology_id: typology_id.to_string(),
            checked: true,
        };
        assert!(server.select_typology(Parameters(params("piscina"))).await.is_err());
        let Json(selection) = server
            .select_typology(Parameters(params("áreas-molhadas")))
            .await
            .expect("selected");
        assert_eq!(selection.selected_labels, vec!["Impermeabilização: Áreas Molhadas"]);
    }

    #[tokio::test]
    async fn test_export_needs_profile_then_succeeds() {
        let server = server(ScriptedText::replying(vec![Ok("<p>análise</p>".to_string())]));
        server
            .diagnose_symptoms(Parameters(SymptomDiagnosisParams {
                description: "Trinca na viga".to_string(),
            }))
            .await
            .expect("diagnosed");

        let export = || {
            server.export_report(Parameters(WorkflowParams {
                workflow: WorkflowKind::TechDiagnosis,
            }))
        };
        let err = export().await.err().expect("no profile yet");
        assert!(err.contains("papel timbrado"));

        let saved = profile();
        server
            .update_profile(Parameters(UpdateProfileParams {
                full_name: saved.full_name,
                profession: Some(Profession::CivilEngineer),
                public_agency_name: saved.public_agency_name,
                public_agency_address: saved.public_agency_address,
                ..Default::default()
            }))
            .await
            .expect("profile saved");

        let Json(report) = export().await.expect("exported");
        assert!(report.document.contains("<p>análise</p>"));
        assert!(report.saved_to.is_none());
    }

    #[tokio::test]
    async fn test_format_cnpj_tool() {
        let server = server(ScriptedText::default());
        let Json(out) = server
            .format_cnpj(Parameters(FormatCnpjParams {
                value: "11222333000181".to_string(),
            }))
            .await
            .expect("formatted");
        assert_eq!(out.text, "11.222.333/0001-81");
    }
}
