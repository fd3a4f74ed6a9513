//! Summary categories and their prompt templates.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Sentence the model must return verbatim when the input is not a medical document.
pub const NON_MEDICAL_RESPONSE: &str =
    "This document does not contain relevant medical information.";

/// Placeholder the model must use for a heading without content.
pub const NOT_MENTIONED: &str = "Not mentioned";

/// Headings of the structured general summary, in order.
pub const GENERAL_HEADINGS: [&str; 4] = ["Diagnosis", "Treatment", "Medications", "Precautions"];

/// Summary category requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    /// Structured summary under the four fixed headings.
    #[default]
    General,
    /// Narrative clinical summary.
    Clinical,
    /// Discharge summary. Accepted at the interface but rendered with the general template
    /// until a dedicated template is defined.
    Discharge,
}

/// Prompt templates available to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Four-heading structured summary with the non-medical rejection rule.
    General,
    /// Findings, diagnostics, treatment plans and recommendations.
    Clinical,
}

impl SummaryType {
    /// Parse a client-supplied value, falling back to [`SummaryType::General`] when the value is
    /// missing, blank, or unknown.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// Wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Clinical => "clinical",
            Self::Discharge => "discharge",
        }
    }

    /// Template used to render this category.
    pub fn template(self) -> PromptTemplate {
        match self {
            Self::General | Self::Discharge => PromptTemplate::General,
            Self::Clinical => PromptTemplate::Clinical,
        }
    }
}

impl FromStr for SummaryType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(Self::General),
            "clinical" => Ok(Self::Clinical),
            "discharge" => Ok(Self::Discharge),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SummaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PromptTemplate {
    /// Render the template around the document text.
    pub fn render(self, document_text: &str) -> String {
        match self {
            Self::General => format!(
                "You are a medical document summarizer.\n\n\
                 Read the following document and summarize ONLY the medically relevant content.\n\n\
                 Your response must always be structured under these headings:\n\
                 - {}\n- {}\n- {}\n- {}\n\n\
                 If a section is missing or not applicable, write \"{NOT_MENTIONED}\".\n\n\
                 If the document is not medical, respond with:\n\
                 \"{NON_MEDICAL_RESPONSE}\"\n\n\
                 Document:\n{document_text}\n",
                GENERAL_HEADINGS[0], GENERAL_HEADINGS[1], GENERAL_HEADINGS[2], GENERAL_HEADINGS[3],
            ),
            Self::Clinical => format!(
                "Generate a clinical summary highlighting findings, diagnostic results, \
                 treatment plans, and recommendations:\n\n\
                 Document:\n{document_text}\n"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_values_and_defaults_the_rest() {
        assert_eq!(SummaryType::parse_or_default(None), SummaryType::General);
        assert_eq!(SummaryType::parse_or_default(Some("")), SummaryType::General);
        assert_eq!(SummaryType::parse_or_default(Some("radiology")), SummaryType::General);
        assert_eq!(SummaryType::parse_or_default(Some(" Clinical ")), SummaryType::Clinical);
        assert_eq!(SummaryType::parse_or_default(Some("discharge")), SummaryType::Discharge);
    }

    #[test]
    fn discharge_renders_with_general_template() {
        assert_eq!(SummaryType::Discharge.template(), PromptTemplate::General);
        assert_eq!(SummaryType::General.template(), PromptTemplate::General);
        assert_eq!(SummaryType::Clinical.template(), PromptTemplate::Clinical);
    }

    #[test]
    fn general_template_lists_headings_and_rules() {
        let prompt = PromptTemplate::General.render("BP 150/95");
        for heading in GENERAL_HEADINGS {
            assert!(prompt.contains(&format!("- {heading}\n")), "missing {heading}");
        }
        assert!(prompt.contains("\"Not mentioned\""));
        assert!(prompt.contains(NON_MEDICAL_RESPONSE));
        assert!(prompt.ends_with("Document:\nBP 150/95\n"));
    }

    #[test]
    fn clinical_template_has_no_fixed_headings() {
        let prompt = PromptTemplate::Clinical.render("CT: no acute findings");
        assert!(prompt.contains("findings, diagnostic results, treatment plans, and recommendations"));
        assert!(!prompt.contains("- Diagnosis"));
        assert!(prompt.contains("CT: no acute findings"));
    }

    #[test]
    fn serializes_as_lowercase_name() {
        assert_eq!(
            serde_json::to_string(&SummaryType::Clinical).expect("json"),
            "\"clinical\""
        );
        assert_eq!(SummaryType::Discharge.to_string(), "discharge");
    }
}
