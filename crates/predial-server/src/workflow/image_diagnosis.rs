/// Diagnosis of building components from photos.
///
/// The component is chosen by cascading category, system and typology; choosing a
/// different parent clears the levels below it. Up to `MAX_IMAGES` photos are held.
/// Component and images cannot change while an analysis is outstanding.
/// The AI analysis is correlated with the catalog to list the pathologies it mentions.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use predial_common::mcp_api::{DiagnosisResponse, ImageSetResponse, PathologyInfo, UserProfile};
use predial_common::text_service::{ImagePayload, TextService};
use tokio::sync::Mutex;
use tracing::info;

use super::{format_date, run_exclusive, Context, Request, RequestSlot, Slotted, WorkflowError};
use crate::document::{escape_html, render, Fragment, ReportMeta};
use crate::model::Pathology;
use crate::prompt;
use crate::response::strip_code_fences;

pub const MAX_IMAGES: usize = 5;
pub const REPORT_TITLE: &str = "Relatório de Diagnóstico por Imagem";

const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

const IMAGE_CSS: &str = ".image-container { text-align: center; margin: 20px 0; page-break-inside: avoid; } \
.image-container img { max-width: 100%; max-height: 10cm; }";

#[derive(Debug, Clone)]
struct Diagnosis {
    html: String,
    related: Vec<Pathology>,
    component: Component,
}

/// Titles of the chosen category, system and typology.
#[derive(Debug, Clone)]
struct Component {
    category: String,
    system: String,
    typology: String,
}

#[derive(Debug, Default)]
pub struct ImageDiagnosisState {
    slot: RequestSlot,
    category_key: Option<String>,
    system_key: Option<String>,
    typology_title: Option<String>,
    images: Vec<ImagePayload>,
    diagnosis: Option<Diagnosis>,
}

impl Slotted for ImageDiagnosisState {
    fn slot(&mut self) -> &mut RequestSlot {
        &mut self.slot
    }
}

pub fn validate_image(image: &ImagePayload) -> Result<(), WorkflowError> {
    if !ACCEPTED_MIME_TYPES.contains(&image.mime_type.as_str()) {
        return Err(WorkflowError::Invalid(format!(
            "Formato de imagem não suportado: {}. Use JPEG, PNG ou WebP.",
            image.mime_type
        )));
    }
    if image.base64.trim().is_empty() || STANDARD.decode(image.base64.trim()).is_err() {
        return Err(WorkflowError::Invalid(
            "Não foi possível ler a imagem enviada.".to_string(),
        ));
    }
    Ok(())
}

impl ImageDiagnosisState {
    /// Append up to the limit, with a notice when some images were left out.
    fn extend_images(&mut self, images: Vec<ImagePayload>) -> ImageSetResponse {
        let remaining = MAX_IMAGES.saturating_sub(self.images.len());
        if remaining == 0 && !images.is_empty() {
            return self.image_set(Some(format!(
                "Você atingiu o limite de {MAX_IMAGES} imagens."
            )));
        }
        let notice = (images.len() > remaining).then(|| {
            format!("Você pode adicionar mais {remaining} imagem(ns). As demais foram ignoradas.")
        });
        self.images.extend(images.into_iter().take(remaining));
        self.image_set(notice)
    }

    fn image_set(&self, notice: Option<String>) -> ImageSetResponse {
        ImageSetResponse {
            image_count: self.images.len(),
            notice,
        }
    }
}

pub struct ImageDiagnosisWorkflow<S> {
    ctx: Context<S>,
    state: Mutex<ImageDiagnosisState>,
}

impl<S: TextService> ImageDiagnosisWorkflow<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            ctx,
            state: Mutex::new(ImageDiagnosisState::default()),
        }
    }

    /// Choose the component. The system must belong to the category and the typology
    /// to the system.
    pub async fn choose_component(
        &self,
        category_key: &str,
        system_key: &str,
        typology_title: &str,
    ) -> Result<(), WorkflowError> {
        let catalog = &self.ctx.catalog;
        let category = catalog.category(category_key).ok_or_else(|| {
            WorkflowError::Invalid(format!("Categoria desconhecida: {category_key}."))
        })?;
        let system = category
            .systems
            .iter()
            .find(|s| s.key == system_key)
            .ok_or_else(|| {
                WorkflowError::Invalid(format!(
                    "O sistema {system_key} não pertence à categoria {}.",
                    category.title
                ))
            })?;
        let typology = system.typology(typology_title).ok_or_else(|| {
            WorkflowError::Invalid(format!(
                "A tipologia {typology_title} não pertence ao sistema {}.",
                system.title
            ))
        })?;

        let mut state = self.state.lock().await;
        state.slot.ensure_idle()?;
        let changed = state.system_key.as_deref() != Some(system.key.as_str())
            || state.typology_title.as_deref() != Some(typology.title.as_str());
        if changed {
            // The held diagnosis describes the previous component.
            state.diagnosis = None;
        }
        state.category_key = Some(category.key.clone());
        state.system_key = Some(system.key.clone());
        state.typology_title = Some(typology.title.clone());
        Ok(())
    }

    /// Add images up to the limit. Extra images are ignored with a notice.
    pub async fn add_images(&self, images: Vec<ImagePayload>) -> Result<ImageSetResponse, WorkflowError> {
        images.iter().try_for_each(validate_image)?;
        let mut state = self.state.lock().await;
        state.slot.ensure_idle()?;
        Ok(state.extend_images(images))
    }

    /// Replace the held images.
    pub async fn replace_images(&self, images: Vec<ImagePayload>) -> Result<ImageSetResponse, WorkflowError> {
        images.iter().try_for_each(validate_image)?;
        let mut state = self.state.lock().await;
        state.slot.ensure_idle()?;
        state.images.clear();
        Ok(state.extend_images(images))
    }

    pub async fn remove_image(&self, index: usize) -> Result<ImageSetResponse, WorkflowError> {
        let mut state = self.state.lock().await;
        state.slot.ensure_idle()?;
        if index >= state.images.len() {
            return Err(WorkflowError::Invalid(format!(
                "Imagem {index} inexistente; há {} imagem(ns).",
                state.images.len()
            )));
        }
        state.images.remove(index);
        Ok(state.image_set(None))
    }

    pub async fn diagnose(&self) -> Result<DiagnosisResponse, WorkflowError> {
        let catalog = &self.ctx.catalog;
        let correlator = &self.ctx.correlator;
        run_exclusive(
            self.ctx.ai.as_ref(),
            &self.state,
            |state: &mut ImageDiagnosisState| {
                let missing = || {
                    WorkflowError::Invalid(
                        "Adicione ao menos uma imagem e selecione a tipologia do componente.".to_string(),
                    )
                };
                if state.images.is_empty() {
                    return Err(missing());
                }
                let category = state.category_key.as_deref().and_then(|c| catalog.category(c));
                let system = state.system_key.as_deref().and_then(|s| catalog.system(s));
                let (Some(category), Some(system), Some(typology)) =
                    (category, system, state.typology_title.clone())
                else {
                    return Err(missing());
                };
                let component = Component {
                    category: category.title.clone(),
                    system: system.title.clone(),
                    typology,
                };
                let prompt =
                    prompt::image_diagnosis(&component.category, &component.system, &component.typology);
                Ok((Request::WithImages(prompt, state.images.clone()), component))
            },
            |state, outcome, component| {
                let html = strip_code_fences(&outcome?);
                let related = correlator.correlate(&html);
                info!(related = related.len(), images = state.images.len(), "image diagnosis generated");
                let response = DiagnosisResponse {
                    html: html.clone(),
                    related_pathologies: related.iter().map(PathologyInfo::from).collect(),
                    notice: None,
                };
                state.diagnosis = Some(Diagnosis {
                    html,
                    related,
                    component,
                });
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
        let diagnosis = state
            .diagnosis
            .as_ref()
            .filter(|_| !state.images.is_empty())
            .ok_or_else(|| {
                WorkflowError::Precondition(
                    "Gere o diagnóstico antes de exportar o relatório.".to_string(),
                )
            })?;

        let images: String = state
            .images
            .iter()
            .map(|image| {
                format!(
                    r#"<div class="image-container"><img src="{}" alt="Imagem Analisada"></div>"#,
                    escape_html(&image.data_url())
                )
            })
            .collect();

        let mut analysis = format!(
            r#"<h2>Análise da Inteligência Artificial</h2><div class="content">{}</div>"#,
            diagnosis.html
        );
        if !diagnosis.related.is_empty() {
            let items: String = diagnosis
                .related
                .iter()
                .map(|p| format!("<li><strong>{}</strong>: {}</li>", escape_html(&p.title), escape_html(&p.symptoms)))
                .collect();
            analysis.push_str(&format!("<h3>Patologias Relacionadas do Catálogo</h3><ul>{items}</ul>"));
        }

        let meta = ReportMeta {
            title: REPORT_TITLE.to_string(),
            info: vec![
                ("Categoria".to_string(), diagnosis.component.category.clone()),
                ("Sistema".to_string(), diagnosis.component.system.clone()),
                ("Tipologia".to_string(), diagnosis.component.typology.clone()),
                ("Data do Relatório".to_string(), format_date(today)),
            ],
            extra_css: Some(IMAGE_CSS.to_string()),
            signature_caption: None,
        };
        let fragments = [
            Fragment::Html(format!("<h2>Imagens Analisadas</h2>{images}")),
            Fragment::PageBreak,
            Fragment::Html(analysis),
        ];
        let document = render(&fragments, profile, &meta)?;
        Ok((REPORT_TITLE.to_string(), document))
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.slot.reset();
        state.category_key = None;
        state.system_key = None;
        state.typology_title = None;
        state.images.clear();
        state.diagnosis = None;
    }
}
