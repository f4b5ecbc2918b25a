/// User profile and letterhead: validation, defaults and the in-memory store.
use std::path::Path;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use predial_common::mcp_api::{
    Letterhead, LetterheadPatch, LogoPosition, TextAlign, UpdateProfileParams, UserProfile,
};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AppError;

/// Header titles offered for the letterhead. Any other header text is replaced by
/// the first preset.
pub const HEADER_PRESETS: [&str; 5] = [
    "Relatório Técnico de Manutenção Predial",
    "Laudo de Vistoria Técnica",
    "Parecer Técnico de Engenharia",
    "Relatório Fotográfico de Anomalias",
    "Checklist de Inspeção Predial",
];

pub const DEFAULT_FOOTER: &str = "Gerado pelo Gestor Predial 4.0";

const LOGO_PREFIXES: [&str; 3] = [
    "data:image/png;base64,",
    "data:image/jpeg;base64,",
    "data:image/jpg;base64,",
];

static CNPJ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}$").expect("valid regex")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Preencha os campos obrigatórios: {}.", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("CNPJ inválido. Use o formato 00.000.000/0000-00.")]
    InvalidCnpj,

    #[error("O logotipo deve ser uma imagem .jpg ou .png.")]
    InvalidLogo,
}

pub fn default_letterhead() -> Letterhead {
    Letterhead {
        logo: None,
        logo_position: LogoPosition::Left,
        header_text: HEADER_PRESETS[0].to_string(),
        header_font_family: "Helvetica, sans-serif".to_string(),
        header_font_size: "10pt".to_string(),
        header_text_color: "#333333".to_string(),
        header_text_align: TextAlign::Right,
        footer_text: DEFAULT_FOOTER.to_string(),
        footer_font_family: "Helvetica, sans-serif".to_string(),
        footer_font_size: "9pt".to_string(),
        footer_text_color: "#666666".to_string(),
        footer_text_align: TextAlign::Center,
    }
}

/// Format the digits of `input` as a CNPJ, as far as they go.
///
/// `"12345678"` becomes `"12.345.678"`; input beyond 14 digits is ignored.
pub fn format_cnpj(input: &str) -> String {
    let mut out = String::with_capacity(18);
    for (i, digit) in input.chars().filter(char::is_ascii_digit).take(14).enumerate() {
        match i {
            2 | 5 => out.push('.'),
            8 => out.push('/'),
            12 => out.push('-'),
            _ => {}
        }
        out.push(digit);
    }
    out
}

pub fn is_valid_cnpj(cnpj: &str) -> bool {
    cnpj.is_empty() || CNPJ_RE.is_match(cnpj)
}

/// Accept PNG or JPEG data URLs whose payload decodes.
pub fn validate_logo(data_url: &str) -> Result<(), ProfileError> {
    let payload = LOGO_PREFIXES
        .iter()
        .find_map(|prefix| data_url.strip_prefix(prefix))
        .ok_or(ProfileError::InvalidLogo)?;
    STANDARD
        .decode(payload.trim())
        .map(|_| ())
        .map_err(|_| ProfileError::InvalidLogo)
}

fn coerce_header(letterhead: &mut Letterhead) {
    if !HEADER_PRESETS.contains(&letterhead.header_text.as_str()) {
        letterhead.header_text = HEADER_PRESETS[0].to_string();
    }
}

fn apply_patch(mut base: Letterhead, patch: LetterheadPatch) -> Result<Letterhead, ProfileError> {
    if let Some(logo) = patch.logo {
        if logo.is_empty() {
            base.logo = None;
        } else {
            validate_logo(&logo)?;
            base.logo = Some(logo);
        }
    }
    if let Some(v) = patch.logo_position {
        base.logo_position = v;
    }
    if let Some(v) = patch.header_text {
        base.header_text = v;
    }
    if let Some(v) = patch.header_font_family {
        base.header_font_family = v;
    }
    if let Some(v) = patch.header_font_size {
        base.header_font_size = v;
    }
    if let Some(v) = patch.header_text_color {
        base.header_text_color = v;
    }
    if let Some(v) = patch.header_text_align {
        base.header_text_align = v;
    }
    if let Some(v) = patch.footer_text {
        base.footer_text = v;
    }
    if let Some(v) = patch.footer_font_family {
        base.footer_font_family = v;
    }
    if let Some(v) = patch.footer_font_size {
        base.footer_font_size = v;
    }
    if let Some(v) = patch.footer_text_color {
        base.footer_text_color = v;
    }
    if let Some(v) = patch.footer_text_align {
        base.footer_text_align = v;
    }
    coerce_header(&mut base);
    Ok(base)
}

/// Validate `params` and build the profile to store.
///
/// The letterhead patch is applied over the current letterhead, or over the defaults
/// when there is none.
pub fn build_profile(
    current: Option<&UserProfile>,
    params: UpdateProfileParams,
) -> Result<UserProfile, ProfileError> {
    let mut missing = Vec::new();
    if params.full_name.trim().is_empty() {
        missing.push("nome completo");
    }
    if params.profession.is_none() {
        missing.push("profissão");
    }
    if params.public_agency_name.trim().is_empty() {
        missing.push("nome do órgão");
    }
    if params.public_agency_address.trim().is_empty() {
        missing.push("endereço do órgão");
    }
    let Some(profession) = params.profession.filter(|_| missing.is_empty()) else {
        return Err(ProfileError::MissingFields(missing));
    };

    let cnpj = params.public_agency_cnpj.trim().to_string();
    if !is_valid_cnpj(&cnpj) {
        return Err(ProfileError::InvalidCnpj);
    }

    let base = current
        .and_then(|p| p.letterhead.clone())
        .unwrap_or_else(default_letterhead);
    let letterhead = apply_patch(base, params.letterhead.unwrap_or_default())?;

    Ok(UserProfile {
        full_name: params.full_name.trim().to_string(),
        profession,
        professional_registry: params.professional_registry.trim().to_string(),
        registration_id: params.registration_id.trim().to_string(),
        role: params.role.trim().to_string(),
        public_agency_name: params.public_agency_name.trim().to_string(),
        public_agency_address: params.public_agency_address.trim().to_string(),
        public_agency_cnpj: cnpj,
        letterhead: Some(letterhead),
    })
}

/// Holds the session's profile. Only the profile-edit tool writes it.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profile: RwLock<Option<UserProfile>>,
}

impl ProfileStore {
    pub fn new(profile: Option<UserProfile>) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    /// Seed the store from a JSON profile file.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)?;
        let mut profile: UserProfile = serde_json::from_str(&content)
            .map_err(|e| AppError::Profile(format!("{}: {e}", path.display())))?;

        if !is_valid_cnpj(&profile.public_agency_cnpj) {
            warn!(cnpj = %profile.public_agency_cnpj, "seeded profile has an invalid CNPJ");
        }
        if let Some(letterhead) = profile.letterhead.as_mut() {
            if let Some(logo) = &letterhead.logo {
                if validate_logo(logo).is_err() {
                    warn!("seeded letterhead logo is not a PNG/JPEG data URL, dropping it");
                    letterhead.logo = None;
                }
            }
            coerce_header(letterhead);
        }
        info!(
            path = %path.display(),
            letterhead = profile.letterhead.is_some(),
            "profile loaded"
        );
        Ok(Self::new(Some(profile)))
    }

    pub async fn get(&self) -> Option<UserProfile> {
        self.profile.read().await.clone()
    }

    pub async fn update(&self, params: UpdateProfileParams) -> Result<UserProfile, ProfileError> {
        let mut guard = self.profile.write().await;
        let profile = build_profile(guard.as_ref(), params)?;
        *guard = Some(profile.clone());
        info!(profession = profile.profession.label(), "profile updated");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use predial_common::mcp_api::Profession;

    fn params() -> UpdateProfileParams {
        UpdateProfileParams {
            full_name: "Maria Souza".to_string(),
            profession: Some(Profession::CivilEngineer),
            public_agency_name: "Secretaria de Obras".to_string(),
            public_agency_address: "Rua A, 100".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_cnpj_is_progressive() {
        assert_eq!(format_cnpj("12"), "12");
        assert_eq!(format_cnpj("123"), "12.3");
        assert_eq!(format_cnpj("12345678"), "12.345.678");
        assert_eq!(format_cnpj("123456789"), "12.345.678/9");
        assert_eq!(format_cnpj("12.345.678/0001-95"), "12.345.678/0001-95");
        assert_eq!(format_cnpj("1234567800019599"), "12.345.678/0001-95");
        assert_eq!(format_cnpj("abc"), "");
    }

    #[test]
    fn test_cnpj_validation() {
        assert!(is_valid_cnpj(""));
        assert!(is_valid_cnpj("12.345.678/0001-95"));
        assert!(!is_valid_cnpj("12345678000195"));
        assert!(!is_valid_cnpj("12.345.678/0001"));
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = build_profile(None, UpdateProfileParams::default()).expect_err("invalid");
        assert_eq!(
            err,
            ProfileError::MissingFields(vec![
                "nome completo",
                "profissão",
                "nome do órgão",
                "endereço do órgão"
            ])
        );
    }

    #[test]
    fn test_invalid_cnpj_is_rejected() {
        let mut p = params();
        p.public_agency_cnpj = "123".to_string();
        assert_eq!(build_profile(None, p), Err(ProfileError::InvalidCnpj));
    }

    #[test]
    fn test_letterhead_merges_over_defaults_and_coerces_header() {
        let mut p = params();
        p.letterhead = Some(LetterheadPatch {
            header_text: Some("Cabeçalho livre".to_string()),
            footer_text: Some("Prefeitura\nDepartamento".to_string()),
            logo_position: Some(LogoPosition::Right),
            ..Default::default()
        });
        let profile = build_profile(None, p).expect("valid");
        let letterhead = profile.letterhead.expect("letterhead");
        assert_eq!(letterhead.header_text, HEADER_PRESETS[0]);
        assert_eq!(letterhead.footer_text, "Prefeitura\nDepartamento");
        assert_eq!(letterhead.logo_position, LogoPosition::Right);
        assert_eq!(letterhead.header_font_size, "10pt");
        assert_eq!(letterhead.footer_text_align, TextAlign::Center);
    }

    #[test]
    fn test_update_keeps_existing_letterhead() {
        let mut first = params();
        first.letterhead = Some(LetterheadPatch {
            header_text: Some(HEADER_PRESETS[1].to_string()),
            ..Default::default()
        });
        let current = build_profile(None, first).expect("valid");
        let updated = build_profile(Some(&current), params()).expect("valid");
        assert_eq!(
            updated.letterhead.expect("letterhead").header_text,
            HEADER_PRESETS[1]
        );
    }

    #[test]
    fn test_logo_must_be_png_or_jpeg_data_url() {
        assert!(validate_logo("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(validate_logo("data:image/jpeg;base64,/9j/4AAQ").is_ok());
        assert_eq!(
            validate_logo("data:image/gif;base64,R0lGOD"),
            Err(ProfileError::InvalidLogo)
        );
        assert_eq!(
            validate_logo("data:image/png;base64,@@@"),
            Err(ProfileError::InvalidLogo)
        );

        let mut p = params();
        p.letterhead = Some(LetterheadPatch {
            logo: Some("https://example.com/logo.png".to_string()),
            ..Default::default()
        });
        assert_eq!(build_profile(None, p), Err(ProfileError::InvalidLogo));
    }

    #[tokio::test]
    async fn test_store_starts_empty_and_saves_updates() {
        let store = ProfileStore::default();
        assert!(store.get().await.is_none());
        store.update(params()).await.expect("saved");
        let saved = store.get().await.expect("profile");
        assert_eq!(saved.full_name, "Maria Souza");
        assert!(saved.letterhead.is_some());
    }
}
