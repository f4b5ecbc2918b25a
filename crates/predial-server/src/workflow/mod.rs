/// Workflow orchestrators.
///
/// Each workflow keeps its state behind its own async mutex. A request runs in three
/// steps: `prepare` validates the state and builds the AI request under the lock, the
/// AI call runs with the lock released, and `apply` stores the outcome under the lock
/// again. The request slot refuses a second request while one is outstanding, and the
/// generation token taken in `prepare` drops responses that arrive after a reset.
pub mod assistant;
pub mod image_diagnosis;
pub mod inspection;
pub mod pathology;
pub mod schedule;
pub mod tech_diagnosis;

use std::sync::{Arc, Weak};

use chrono::NaiveDate;
use predial_common::error::CommonError;
use predial_common::mcp_api::{UserProfile, WorkflowKind};
use predial_common::text_service::{ChatTurn, ImagePayload, TextService};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::correlate::Correlator;
use crate::document::DocumentError;
use crate::export::ExportError;
use crate::profile::ProfileError;

use assistant::AssistantWorkflow;
use image_diagnosis::ImageDiagnosisWorkflow;
use inspection::InspectionWorkflow;
use pathology::PathologyWorkflow;
use schedule::ScheduleWorkflow;
use tech_diagnosis::TechDiagnosisWorkflow;

/// User-facing failures of the workflow tools.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Aguarde: já existe uma solicitação em andamento.")]
    Busy,

    /// Invalid or incomplete input.
    #[error("{0}")]
    Invalid(String),

    /// A previous step must run first.
    #[error("{0}")]
    Precondition(String),

    /// Nothing to do; not a failure of the service.
    #[error("{0}")]
    Info(String),

    #[error("A resposta foi descartada porque o fluxo foi reiniciado.")]
    Discarded,

    #[error("Serviço de IA não configurado.")]
    NotConfigured(#[source] CommonError),

    #[error("Erro ao comunicar com a IA: {0}")]
    Service(#[source] CommonError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

impl From<CommonError> for WorkflowError {
    fn from(e: CommonError) -> Self {
        if e.is_configuration() {
            WorkflowError::NotConfigured(e)
        } else {
            WorkflowError::Service(e)
        }
    }
}

/// In-flight marker plus the generation that the next request belongs to.
///
/// The request holds the only strong reference to the marker, so a request future
/// dropped before it finishes leaves the slot idle again.
#[derive(Debug, Default)]
pub struct RequestSlot {
    in_flight: Weak<()>,
    generation: u64,
}

/// Proof that a request was started in a given generation.
#[derive(Debug)]
pub struct Ticket {
    generation: u64,
    _in_flight: Arc<()>,
}

impl RequestSlot {
    pub fn is_loading(&self) -> bool {
        self.in_flight.strong_count() > 0
    }

    /// `Busy` while a request is outstanding.
    pub fn ensure_idle(&self) -> Result<(), WorkflowError> {
        if self.is_loading() {
            return Err(WorkflowError::Busy);
        }
        Ok(())
    }

    fn begin(&mut self) -> Ticket {
        let marker = Arc::new(());
        self.in_flight = Arc::downgrade(&marker);
        Ticket {
            generation: self.generation,
            _in_flight: marker,
        }
    }

    /// Close the request of `ticket`. False when a reset happened in between, in
    /// which case the slot belongs to the new generation and is left untouched.
    fn finish(&mut self, ticket: &Ticket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.in_flight = Weak::new();
        true
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = Weak::new();
    }
}

/// Workflow state owning a request slot.
pub trait Slotted {
    fn slot(&mut self) -> &mut RequestSlot;
}

/// What a workflow asks of the text service.
#[derive(Debug, Clone)]
pub enum Request {
    Text(String),
    WithImages(String, Vec<ImagePayload>),
    Conversation(String, Vec<ChatTurn>),
}

/// Run one AI request against the state in `cell`.
///
/// `prepare` returns the request plus a value carried to `apply`. `apply` receives the
/// raw outcome so a workflow can record failures; it is not called for stale responses.
pub(crate) async fn run_exclusive<S, W, C, T>(
    ai: &S,
    cell: &Mutex<W>,
    prepare: impl FnOnce(&mut W) -> Result<(Request, C), WorkflowError>,
    apply: impl FnOnce(&mut W, Result<String, CommonError>, C) -> Result<T, WorkflowError>,
) -> Result<T, WorkflowError>
where
    S: TextService,
    W: Slotted,
{
    let (ticket, request, carry) = {
        let mut state = cell.lock().await;
        state.slot().ensure_idle()?;
        let (request, carry) = prepare(&mut *state)?;
        (state.slot().begin(), request, carry)
    };

    let outcome = match &request {
        Request::Text(prompt) => ai.complete(prompt).await,
        Request::WithImages(prompt, images) => ai.complete_with_images(prompt, images).await,
        Request::Conversation(system, turns) => ai.converse(system, turns).await,
    };

    let mut state = cell.lock().await;
    if !state.slot().finish(&ticket) {
        debug!("dropping AI response that arrived after a reset");
        return Err(WorkflowError::Discarded);
    }
    if let Err(e) = &outcome {
        warn!(error = %e, "AI request failed");
    }
    apply(&mut *state, outcome, carry)
}

/// Read-only collaborators shared by every workflow.
pub struct Context<S> {
    pub ai: Arc<S>,
    pub catalog: Arc<Catalog>,
    pub correlator: Arc<Correlator>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            ai: Arc::clone(&self.ai),
            catalog: Arc::clone(&self.catalog),
            correlator: Arc::clone(&self.correlator),
        }
    }
}

/// A rendered report ready to hand to the client.
#[derive(Debug, Clone)]
pub struct Report {
    pub kind: WorkflowKind,
    pub title: String,
    pub document: String,
}

/// File-name stem of a report kind.
pub fn kind_slug(kind: WorkflowKind) -> &'static str {
    match kind {
        WorkflowKind::Inspection => "inspection",
        WorkflowKind::MaintenanceSchedule => "maintenance-schedule",
        WorkflowKind::ImageDiagnosis => "image-diagnosis",
        WorkflowKind::TechDiagnosis => "tech-diagnosis",
        WorkflowKind::PathologyPlan => "pathology-plan",
        WorkflowKind::Assistant => "assistant",
    }
}

/// `dd/mm/yyyy`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Reformat a `YYYY-MM-DD` form date, or "Não informada" when it does not parse.
pub fn format_form_date(value: &str) -> String {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(format_date)
        .unwrap_or_else(|_| "Não informada".to_string())
}

fn require(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Every orchestrator of the session.
pub struct Workflows<S> {
    pub inspection: InspectionWorkflow<S>,
    pub schedule: ScheduleWorkflow<S>,
    pub image_diagnosis: ImageDiagnosisWorkflow<S>,
    pub tech_diagnosis: TechDiagnosisWorkflow<S>,
    pub pathology: PathologyWorkflow<S>,
    pub assistant: AssistantWorkflow<S>,
}

impl<S: TextService> Workflows<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self {
            inspection: InspectionWorkflow::new(ctx.clone()),
            schedule: ScheduleWorkflow::new(ctx.clone()),
            image_diagnosis: ImageDiagnosisWorkflow::new(ctx.clone()),
            tech_diagnosis: TechDiagnosisWorkflow::new(ctx.clone()),
            pathology: PathologyWorkflow::new(ctx.clone()),
            assistant: AssistantWorkflow::new(ctx),
        }
    }

    pub async fn reset(&self, kind: WorkflowKind) {
        match kind {
            WorkflowKind::Inspection => self.inspection.reset().await,
            WorkflowKind::MaintenanceSchedule => self.schedule.reset().await,
            WorkflowKind::ImageDiagnosis => self.image_diagnosis.reset().await,
            WorkflowKind::TechDiagnosis => self.tech_diagnosis.reset().await,
            WorkflowKind::PathologyPlan => self.pathology.reset().await,
            WorkflowKind::Assistant => self.assistant.reset().await,
        }
        info!(workflow = kind_slug(kind), "workflow reset");
    }

    pub async fn export(
        &self,
        kind: WorkflowKind,
        profile: Option<&UserProfile>,
        today: NaiveDate,
    ) -> Result<Report, WorkflowError> {
        let (title, document) = match kind {
            WorkflowKind::Inspection => self.inspection.export(profile).await?,
            WorkflowKind::MaintenanceSchedule => self.schedule.export(profile, today).await?,
            WorkflowKind::ImageDiagnosis => self.image_diagnosis.export(profile, today).await?,
            WorkflowKind::TechDiagnosis => self.tech_diagnosis.export(profile, today).await?,
            WorkflowKind::PathologyPlan => self.pathology.export(profile, today).await?,
            WorkflowKind::Assistant => {
                return Err(WorkflowError::Invalid(
                    "O assistente não gera relatório para impressão.".to_string(),
                ))
            }
        };
        Ok(Report {
            kind,
            title,
            document,
        })
    }
}
