/// Prompt text for the generative-text service.
///
/// Prompts are Brazilian Portuguese. Table prompts ask for nothing but the `<table>`
/// markup; the response parser still tolerates text around it.
use crate::model::{Pathology, System, Typology};

pub const CHECKLIST_FALLBACK: &str = "Erro ao gerar o checklist. Tente novamente.";
pub const SCHEDULE_FALLBACK: &str = "Erro ao gerar a tabela. Tente novamente.";
pub const BUDGET_FALLBACK: &str = "Erro ao gerar o orçamento. Tente novamente.";

pub const ASSISTANT_INSTRUCTION: &str = "Você é um assistente especialista em manutenção predial. \
Baseie suas respostas em normas técnicas e boas práticas de engenharia. Seja claro e objetivo \
e organize a informação com HTML (parágrafos <p>, listas <ul><li> e negrito <strong>). Não use markdown.";

pub const ASSISTANT_GREETING: &str = "Olá! Sou seu assistente de manutenção predial. Como posso ajudar? \
Descreva sua dúvida ou o problema observado.";

pub const ASSISTANT_APOLOGY: &str = "Desculpe, ocorreu um erro ao processar sua solicitação. \
Verifique sua conexão ou tente novamente mais tarde.";

const TABLE_ONLY: &str = "Não inclua texto introdutório, conclusões, comentários, markdown \
```html ou qualquer conteúdo fora da tag <table>.";

pub fn inspection_checklist(labels: &[String]) -> String {
    format!(
        "Como engenheiro de manutenção predial, crie um checklist de vistoria detalhado para os \
seguintes sistemas e tipologias: {}. Responda APENAS com o código de uma tabela HTML (<table>, \
<thead>, <tbody>, <tr>, <th>, <td>) com as colunas \"Item a Verificar\", \"Status (C/NC/NA)\" e \
\"Observações\". As colunas \"Status\" e \"Observações\" devem ficar vazias para preenchimento \
manual. Agrupe os itens por sistema com uma linha <tr> contendo uma única <td colspan=\"3\"> com o \
título do sistema. {TABLE_ONLY}",
        labels.join(", ")
    )
}

/// Periodicity suggestion prompt for the selected pairs. `None` when none of them
/// has schedule data in the catalog.
pub fn schedule_suggestion(pairs: &[(&System, &Typology)]) -> Option<String> {
    let blocks: Vec<String> = pairs
        .iter()
        .filter_map(|(system, typology)| {
            let entries = system.schedule_for(&typology.title);
            if entries.is_empty() {
                return None;
            }
            let lines: Vec<String> = entries
                .iter()
                .map(|e| format!("  - Atividade: {}, Periodicidade: {}", e.activity, e.periodicity))
                .collect();
            Some(format!(
                "Tipologia: {}: {}\n{}",
                system.title,
                typology.title,
                lines.join("\n")
            ))
        })
        .collect();

    if blocks.is_empty() {
        return None;
    }

    Some(format!(
        "Como especialista em engenharia de manutenção predial, analise os planos de manutenção \
das tipologias selecionadas. Para cada tipologia, sugira uma periodicidade consolidada para a \
manutenção geral e justifique brevemente com base nas atividades mais frequentes e críticas. \
Responda com um array JSON em que cada objeto tem as chaves \"typology\" (string), \
\"periodicity\" (string) e \"justification\" (string). Forneça APENAS o array JSON, sem texto \
adicional, comentários ou markdown. Exemplo: [{{\"typology\": \"Nome da Tipologia\", \
\"periodicity\": \"Periodicidade Sugerida\", \"justification\": \"Justificativa.\"}}]\n\n\
Dados:\n\n{}",
        blocks.join("\n\n")
    ))
}

pub fn maintenance_schedule(labels: &[String]) -> String {
    format!(
        "Crie um plano de manutenção preventiva e preditiva para os sistemas: \"{}\". Responda \
APENAS com o código de uma tabela HTML (<table>, <thead>, <tbody>, <tr>, <th>, <td>) com as \
colunas \"Sistema\", \"Atividade\", \"Periodicidade\" e \"Recomendações\". Agrupe as atividades \
por sistema. {TABLE_ONLY}",
        labels.join(", ")
    )
}

pub fn image_diagnosis(category: &str, system: &str, typology: &str) -> String {
    format!(
        "Analise a(s) imagem(ns) a seguir de um componente de edificação. O componente pertence à \
categoria \"{category}\", sistema \"{system}\", tipologia \"{typology}\". Identifique possíveis \
patologias (fissuras, infiltrações, corrosão etc.), descreva as causas prováveis e os riscos \
associados e sugira os próximos passos para diagnóstico e reparo. Organize a resposta em tópicos \
com HTML (títulos h4, listas ul/li, negrito strong)."
    )
}

pub fn symptom_analysis(description: &str) -> String {
    format!(
        "Com base nos seguintes sintomas observados em uma edificação: \"{description}\", gere uma \
análise técnica em HTML contendo: 1. As causas prováveis. 2. As tecnologias de diagnóstico 4.0 \
mais indicadas para investigar o problema, explicando o motivo de cada uma. Use títulos (h4, h5) \
e listas (ul, li)."
    )
}

pub fn correction_plan(description: &str, diagnosis: &str) -> String {
    format!(
        "Com base na descrição de sintomas \"{description}\" e na análise de diagnóstico \
\"{diagnosis}\", crie um plano de ação e correção em HTML. Detalhe os passos recomendados para a \
correção da patologia, incluindo materiais e técnicas. Use títulos (h4, h5) e listas (ul, li)."
    )
}

pub fn pathology_action_plan(pathology: &Pathology) -> String {
    format!(
        "Crie um plano de ação detalhado em HTML para corrigir a patologia \"{}\", cujos sintomas \
são \"{}\". O plano deve incluir: 1. Preparação da área. 2. Procedimentos de correção. \
3. Materiais recomendados. 4. Cuidados de segurança. Use títulos (h4) e listas (ol, li).",
        pathology.title, pathology.symptoms
    )
}

pub fn pathology_budget(pathology_title: &str, plan: &str) -> String {
    format!(
        "Com base no plano de ação para a patologia \"{pathology_title}\": \"{plan}\", crie um \
orçamento preliminar simplificado em formato de tabela HTML. Responda APENAS com o código da \
tabela, com as colunas \"Item\", \"Unidade\", \"Quantidade (Estimada)\", \"Custo Unitário \
(Estimado)\" e \"Custo Total (Estimado)\". Inclua itens de material, mão de obra e equipamentos \
e uma última linha informando que os valores são estimativas a confirmar com cotações de mercado."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, EMBEDDED_CATALOG};

    #[test]
    fn test_suggestion_prompt_lists_pairs_with_schedule() {
        let catalog = Catalog::from_json(EMBEDDED_CATALOG).expect("catalog");
        let system = catalog.system("impermeabilizacao").expect("system");
        let typology = system.typology("Cobertura").expect("typology");

        let prompt = schedule_suggestion(&[(system, typology)]).expect("has schedule data");
        assert!(prompt.contains("Impermeabilização: Cobertura"));
        assert!(prompt.contains("Atividade: Limpeza de ralos, calhas e rufos, Periodicidade: Mensal"));
        assert!(prompt.contains("\"justification\""));
    }

    #[test]
    fn test_suggestion_prompt_needs_schedule_data() {
        let catalog = Catalog::from_json(
            r#"{"c": {"title": "C", "systems": {"s": {"title": "S", "tipologias": [{"title": "T"}]}}}}"#,
        )
        .expect("catalog");
        let system = catalog.system("s").expect("system");
        assert!(schedule_suggestion(&[(system, &system.typologies[0])]).is_none());
        assert!(schedule_suggestion(&[]).is_none());
    }

    #[test]
    fn test_table_prompts_name_the_selection() {
        let labels = vec!["Fachadas: Pintura Externa".to_string(), "Elevadores: Elevador Elétrico".to_string()];
        let checklist = inspection_checklist(&labels);
        assert!(checklist.contains("Fachadas: Pintura Externa, Elevadores: Elevador Elétrico"));
        assert!(checklist.contains("Status (C/NC/NA)"));
        let schedule = maintenance_schedule(&labels);
        assert!(schedule.contains("\"Recomendações\""));
    }
}
