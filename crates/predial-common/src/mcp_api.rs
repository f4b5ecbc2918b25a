use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::text_service::{ChatTurn, ImagePayload};

/// Tools that keep per-session state and can be reset or exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Inspection,
    MaintenanceSchedule,
    ImageDiagnosis,
    TechDiagnosis,
    PathologyPlan,
    Assistant,
}

/// Workflows driven by typology checkboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionWorkflow {
    Inspection,
    MaintenanceSchedule,
}

// --- Parameters ---

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetSystemParams {
    /// System key such as "impermeabilizacao".
    pub system_key: String,
    /// Only list pathologies linked to this typology title.
    pub typology_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetScheduleParams {
    pub system_key: String,
    /// Typology title exactly as listed in the catalog, e.g. "Cobertura".
    pub typology_title: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectTypologyParams {
    pub workflow: SelectionWorkflow,
    pub system_key: String,
    /// Typology id as returned by `list_catalog`, e.g. "cobertura".
    pub typology_id: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WorkflowParams {
    pub workflow: WorkflowKind,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InspectionChecklistParams {
    pub building_name: String,
    pub address: String,
    /// Inspection date as YYYY-MM-DD.
    pub inspection_date: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MaintenanceScheduleParams {
    pub building_name: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImageDiagnosisParams {
    pub category_key: String,
    pub system_key: String,
    pub typology_title: String,
    /// Replaces the images held by the workflow when present (max 5).
    pub images: Option<Vec<ImagePayload>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddImagesParams {
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoveImageParams {
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SymptomDiagnosisParams {
    /// Free-text description of the observed symptoms.
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PathologyPlanParams {
    pub system_key: String,
    /// Pathology title exactly as listed in the catalog.
    pub pathology_title: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AssistantParams {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FormatCnpjParams {
    pub value: String,
}

/// Profile fields to save. Letterhead fields left out keep their current value.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct UpdateProfileParams {
    #[serde(default)]
    pub full_name: String,
    pub profession: Option<Profession>,
    #[serde(default)]
    pub professional_registry: String,
    #[serde(default)]
    pub registration_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub public_agency_name: String,
    #[serde(default)]
    pub public_agency_address: String,
    /// Empty, or formatted as 00.000.000/0000-00.
    #[serde(default)]
    pub public_agency_cnpj: String,
    pub letterhead: Option<LetterheadPatch>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct LetterheadPatch {
    /// PNG or JPEG data URL. An empty string removes the logo.
    pub logo: Option<String>,
    pub logo_position: Option<LogoPosition>,
    pub header_text: Option<String>,
    pub header_font_family: Option<String>,
    pub header_font_size: Option<String>,
    pub header_text_color: Option<String>,
    pub header_text_align: Option<TextAlign>,
    pub footer_text: Option<String>,
    pub footer_font_family: Option<String>,
    pub footer_font_size: Option<String>,
    pub footer_text_color: Option<String>,
    pub footer_text_align: Option<TextAlign>,
}

// --- Profile ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Profession {
    #[serde(rename = "Arquiteto e Urbanista")]
    Architect,
    #[serde(rename = "Engenheiro Eletricista")]
    ElectricalEngineer,
    #[serde(rename = "Engenheiro Civil")]
    CivilEngineer,
    #[serde(rename = "Técnico em Edificações")]
    BuildingTechnician,
    #[serde(rename = "Assistente Técnico")]
    TechnicalAssistant,
    #[serde(rename = "Engenheiro Mecânico")]
    MechanicalEngineer,
}

impl Profession {
    pub fn label(self) -> &'static str {
        match self {
            Profession::Architect => "Arquiteto e Urbanista",
            Profession::ElectricalEngineer => "Engenheiro Eletricista",
            Profession::CivilEngineer => "Engenheiro Civil",
            Profession::BuildingTechnician => "Técnico em Edificações",
            Profession::TechnicalAssistant => "Assistente Técnico",
            Profession::MechanicalEngineer => "Engenheiro Mecânico",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogoPosition {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn as_css(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

/// Branding applied to every page of an exported report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Letterhead {
    /// PNG or JPEG data URL.
    pub logo: Option<String>,
    pub logo_position: LogoPosition,
    pub header_text: String,
    pub header_font_family: String,
    pub header_font_size: String,
    pub header_text_color: String,
    pub header_text_align: TextAlign,
    pub footer_text: String,
    pub footer_font_family: String,
    pub footer_font_size: String,
    pub footer_text_color: String,
    pub footer_text_align: TextAlign,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UserProfile {
    pub full_name: String,
    pub profession: Profession,
    #[serde(default)]
    pub professional_registry: String,
    #[serde(default)]
    pub registration_id: String,
    #[serde(default)]
    pub role: String,
    pub public_agency_name: String,
    pub public_agency_address: String,
    #[serde(default)]
    pub public_agency_cnpj: String,
    #[serde(default)]
    pub letterhead: Option<Letterhead>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProfileResponse {
    /// `None` until a profile has been saved.
    pub profile: Option<UserProfile>,
}

// --- Catalog responses ---

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CatalogOverview {
    /// SHA-256 of the catalog data blob.
    pub version: String,
    pub categories: Vec<CategorySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CategorySummary {
    pub key: String,
    pub title: String,
    pub systems: Vec<SystemSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SystemSummary {
    pub key: String,
    pub title: String,
    pub icon: String,
    pub typologies: Vec<TypologyOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TypologyOption {
    /// Checkbox id used by `select_typology`.
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TypologyInfo {
    pub title: String,
    pub definition: String,
    pub components: String,
    pub applications: String,
    pub advantages: String,
    pub disadvantages: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathologyInfo {
    pub title: String,
    pub symptoms: String,
    pub typology_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathologyGroup {
    pub typology: String,
    pub pathologies: Vec<PathologyInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticInfo {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TechnologyInfo {
    pub icon: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SystemDetailResponse {
    pub category_key: String,
    pub key: String,
    pub title: String,
    pub typologies: Vec<TypologyInfo>,
    /// Typology titles that have at least one linked pathology.
    pub typology_filters: Vec<String>,
    pub pathology_groups: Vec<PathologyGroup>,
    /// Pathologies whose typology link is empty or names no typology of the system.
    /// Only listed when no typology filter is given.
    pub unlinked_pathologies: Vec<PathologyInfo>,
    pub diagnostics: Vec<DiagnosticInfo>,
    pub technologies: Vec<TechnologyInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleEntryInfo {
    pub kind: String,
    pub activity: String,
    pub periodicity: String,
    pub recommendations: String,
    pub tech_diagnostics: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleResponse {
    pub system_key: String,
    pub typology_title: String,
    pub entries: Vec<ScheduleEntryInfo>,
}

// --- Workflow responses ---

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectionResponse {
    pub any_selected: bool,
    /// "System: Typology" labels in catalog order.
    pub selected_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HtmlResultResponse {
    pub html: String,
    /// True when the AI output held no table and a placeholder was substituted.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestionInfo {
    pub typology: String,
    pub periodicity: String,
    pub justification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<SuggestionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageSetResponse {
    pub image_count: usize,
    /// Set when some images were ignored because the limit was reached.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosisResponse {
    pub html: String,
    /// Catalog pathologies mentioned in the analysis, in order of appearance.
    pub related_pathologies: Vec<PathologyInfo>,
    /// Set when some of the sent images were ignored because the limit was reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConversationResponse {
    pub reply: String,
    pub messages: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportResponse {
    pub title: String,
    /// Complete printable HTML document.
    pub document: String,
    /// Path of the saved copy when a report directory is configured.
    pub saved_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OkResponse {
    pub ok: bool,
}
