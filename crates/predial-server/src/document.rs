/// Printable report assembly.
///
/// `render` merges the user's letterhead with body fragments into one A4 HTML
/// document. The header and footer bands are fixed-position so the print engine
/// repeats them on every page inside the reserved margins (top 3cm, sides and bottom
/// 2cm). A signature block always closes the document.
///
/// Plain-text fields coming from the user are escaped and their newlines become
/// `<br>`. Body fragments are generated HTML and are inserted verbatim.
use predial_common::mcp_api::{Letterhead, LogoPosition, UserProfile};

/// Marker forcing the following content onto a new page.
pub const PAGE_BREAK: &str = r#"<div style="page-break-before: always;"></div>"#;

const BASE_CSS: &str = r#"
  @page { size: A4; margin: 3cm 2cm 2cm 2cm; }
  body { margin: 0; padding: 0; font-family: 'Helvetica Neue', 'Helvetica', 'Arial', sans-serif; font-size: 11pt; line-height: 1.5; color: #333; }
  .page-header, .page-footer { position: fixed; left: 0; right: 0; padding-left: 2cm; padding-right: 2cm; box-sizing: border-box; line-height: 1.4; }
  .page-header { top: -3cm; height: 3cm; padding-top: 1cm; padding-bottom: 0.5cm; border-bottom: 1px solid #ddd; }
  .header-content { display: flex; align-items: center; justify-content: space-between; }
  .header-content.logo-right { flex-direction: row-reverse; }
  .logo { max-height: 1.5cm; max-width: 5cm; flex-shrink: 0; }
  .header-content:not(.logo-right) .logo { margin-right: 1cm; }
  .header-content.logo-right .logo { margin-left: 1cm; }
  .header-text { flex-grow: 1; }
  .page-footer { bottom: -2cm; height: 2cm; padding-bottom: 1cm; padding-top: 0.5cm; border-top: 1px solid #ddd; }
  main { page-break-before: auto; }
  h1 { font-size: 20pt; text-align: center; margin-bottom: 1.5cm; font-weight: bold; color: #333; }
  h1, h2, h3, h4, h5 { page-break-after: avoid; }
  .info-section { margin-bottom: 25px; page-break-inside: avoid; }
  .info-section p { margin: 4px 0; }
  .content { margin-top: 30px; }
  table { width: 100%; border-collapse: collapse; font-size: 9pt; margin-top: 20px; page-break-inside: auto; }
  tr { page-break-inside: avoid; page-break-after: auto; }
  th, td { border: 1px solid #ccc; padding: 8px; text-align: left; vertical-align: top; }
  th { background-color: #f0f0f0; color: #333; font-weight: bold; }
  .signature { margin-top: 80px; text-align: center; page-break-inside: avoid; }
  .signature p { text-align: center; margin: 2px 0; }
"#;

/// A piece of report body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Html(String),
    PageBreak,
}

/// Per-report content around the body.
#[derive(Debug, Clone, Default)]
pub struct ReportMeta {
    /// Used for `<title>` and the `<h1>`.
    pub title: String,
    /// Labelled lines shown under the title, e.g. ("Edificação", "Bloco A").
    pub info: Vec<(String, String)>,
    /// Stylesheet additions for this report.
    pub extra_css: Option<String>,
    /// Caption above the signature line.
    pub signature_caption: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Não foi possível gerar o relatório: cadastre seu perfil e o papel timbrado antes de exportar.")]
    MissingBranding,
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Escape `text` and turn newlines into `<br>`.
pub fn multiline(text: &str) -> String {
    escape_html(text).replace("\r\n", "\n").replace('\n', "<br>")
}

fn header_band(letterhead: &Letterhead) -> String {
    let class = match letterhead.logo_position {
        LogoPosition::Right => "header-content logo-right",
        LogoPosition::Left => "header-content",
    };
    let logo = letterhead
        .logo
        .as_deref()
        .map(|src| format!(r#"<img src="{}" class="logo" alt="Logo">"#, escape_html(src)))
        .unwrap_or_default();
    format!(
        r#"<div class="page-header"><div class="{class}">{logo}<div class="header-text" style="text-align: {}; font-family: {}; font-size: {}; color: {};">{}</div></div></div>"#,
        letterhead.header_text_align.as_css(),
        escape_html(&letterhead.header_font_family),
        escape_html(&letterhead.header_font_size),
        escape_html(&letterhead.header_text_color),
        multiline(&letterhead.header_text),
    )
}

fn footer_band(letterhead: &Letterhead) -> String {
    format!(
        r#"<div class="page-footer" style="text-align: {}; font-family: {}; font-size: {}; color: {};">{}</div>"#,
        letterhead.footer_text_align.as_css(),
        escape_html(&letterhead.footer_font_family),
        escape_html(&letterhead.footer_font_size),
        escape_html(&letterhead.footer_text_color),
        multiline(&letterhead.footer_text),
    )
}

fn signature_block(profile: &UserProfile, caption: Option<&str>) -> String {
    let mut out = String::from(r#"<div class="signature">"#);
    if let Some(caption) = caption {
        out.push_str(&format!("<p><strong>{}</strong></p><br><br>", multiline(caption)));
    }
    out.push_str("<p>_________________________________________</p>");
    out.push_str(&format!("<p><strong>{}</strong></p>", multiline(&profile.full_name)));
    out.push_str(&format!("<p>{}</p>", profile.profession.label()));
    for (label, value) in [
        ("Registro", &profile.professional_registry),
        ("Matrícula", &profile.registration_id),
        ("Função", &profile.role),
    ] {
        if !value.is_empty() {
            out.push_str(&format!("<p>{label}: {}</p>", multiline(value)));
        }
    }
    out.push_str("</div>");
    out
}

/// Assemble a complete printable document.
///
/// Refuses to render without a profile or without a letterhead.
pub fn render(
    fragments: &[Fragment],
    profile: Option<&UserProfile>,
    meta: &ReportMeta,
) -> Result<String, DocumentError> {
    let profile = profile.ok_or(DocumentError::MissingBranding)?;
    let letterhead = profile
        .letterhead
        .as_ref()
        .ok_or(DocumentError::MissingBranding)?;

    let info = if meta.info.is_empty() {
        String::new()
    } else {
        let lines: String = meta
            .info
            .iter()
            .map(|(label, value)| {
                format!(
                    "<p><strong>{}:</strong> {}</p>",
                    escape_html(label),
                    multiline(value)
                )
            })
            .collect();
        format!(r#"<div class="info-section">{lines}</div>"#)
    };

    let body: String = fragments
        .iter()
        .map(|f| match f {
            Fragment::Html(html) => html.as_str(),
            Fragment::PageBreak => PAGE_BREAK,
        })
        .collect::<Vec<_>>()
        .join("\n");

    let title = escape_html(&meta.title);
    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{BASE_CSS}{extra}</style>
</head>
<body>
{header}
{footer}
<main>
<h1>{title}</h1>
{info}
<div class="content">
{body}
</div>
{signature}
</main>
</body>
</html>
"#,
        extra = meta.extra_css.as_deref().unwrap_or_default(),
        header = header_band(letterhead),
        footer = footer_band(letterhead),
        signature = signature_block(profile, meta.signature_caption.as_deref()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::default_letterhead;
    use predial_common::mcp_api::Profession;

    fn profile() -> UserProfile {
        UserProfile {
            full_name: "Maria Souza".to_string(),
            profession: Profession::CivilEngineer,
            professional_registry: "CREA 12345".to_string(),
            registration_id: String::new(),
            role: "Fiscal".to_string(),
            public_agency_name: "Secretaria de Obras".to_string(),
            public_agency_address: "Rua A, 100".to_string(),
            public_agency_cnpj: String::new(),
            letterhead: Some(default_letterhead()),
        }
    }

    fn meta() -> ReportMeta {
        ReportMeta {
            title: "Relatório".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_refuses_without_branding() {
        assert_eq!(
            render(&[], None, &meta()),
            Err(DocumentError::MissingBranding)
        );
        let mut no_letterhead = profile();
        no_letterhead.letterhead = None;
        assert_eq!(
            render(&[], Some(&no_letterhead), &meta()),
            Err(DocumentError::MissingBranding)
        );
    }

    #[test]
    fn test_page_break_sits_between_fragments() {
        let doc = render(
            &[
                Fragment::Html("<p>primeiro</p>".to_string()),
                Fragment::PageBreak,
                Fragment::Html("<p>segundo</p>".to_string()),
            ],
            Some(&profile()),
            &meta(),
        )
        .expect("renders");
        let first = doc.find("<p>primeiro</p>").expect("first");
        let marker = doc.find(PAGE_BREAK).expect("marker");
        let second = doc.find("<p>segundo</p>").expect("second");
        assert!(first < marker && marker < second);
        assert_eq!(doc.matches(PAGE_BREAK).count(), 1);
    }

    #[test]
    fn test_signature_follows_body_with_optional_lines() {
        let doc = render(
            &[Fragment::Html("<table></table>".to_string())],
            Some(&profile()),
            &meta(),
        )
        .expect("renders");
        let body = doc.find("<table></table>").expect("body");
        let signature = doc.find(r#"<div class="signature">"#).expect("signature");
        assert!(body < signature);
        assert!(doc.contains("<p>Engenheiro Civil</p>"));
        assert!(doc.contains("<p>Registro: CREA 12345</p>"));
        assert!(doc.contains("<p>Função: Fiscal</p>"));
        assert!(!doc.contains("Matrícula:"));
    }

    #[test]
    fn test_user_text_is_escaped_and_multiline() {
        let mut p = profile();
        if let Some(l) = p.letterhead.as_mut() {
            l.footer_text = "Prefeitura <Central>\nObras & Serviços".to_string();
            l.logo_position = LogoPosition::Right;
        }
        let m = ReportMeta {
            title: "Checklist".to_string(),
            info: vec![("Edificação".to_string(), "Bloco <A>".to_string())],
            extra_css: Some("td { color: red; }".to_string()),
            signature_caption: Some("Responsável pela Vistoria:".to_string()),
        };
        let doc = render(&[], Some(&p), &m).expect("renders");
        assert!(doc.contains("Prefeitura &lt;Central&gt;<br>Obras &amp; Serviços"));
        assert!(doc.contains("<p><strong>Edificação:</strong> Bloco &lt;A&gt;</p>"));
        assert!(doc.contains("header-content logo-right"));
        assert!(doc.contains("td { color: red; }"));
        assert!(doc.contains("<p><strong>Responsável pela Vistoria:</strong></p>"));
        assert!(doc.contains("<h1>Checklist</h1>"));
    }

    #[test]
    fn test_page_margins_are_reserved() {
        let doc = render(&[], Some(&profile()), &meta()).expect("renders");
        assert!(doc.contains("@page { size: A4; margin: 3cm 2cm 2cm 2cm; }"));
        assert!(doc.contains("position: fixed"));
    }
}
