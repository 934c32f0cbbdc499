//! System prompts and user-message builders for each stage.

use crate::state::RetrievedDocument;
use serde::{Deserialize, Serialize};

/// Deployment profile: which kind of document the workflow produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentProfile {
    #[default]
    EsgProposal,
    Course,
}

impl DocumentProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentProfile::EsgProposal => "esg_proposal",
            DocumentProfile::Course => "course",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "esg_proposal" | "esg" | "proposal" => Some(DocumentProfile::EsgProposal),
            "course" => Some(DocumentProfile::Course),
            _ => None,
        }
    }

    /// Default title for exported summaries.
    pub fn export_title(&self) -> &'static str {
        match self {
            DocumentProfile::EsgProposal => "ESG Proposal",
            DocumentProfile::Course => "Course Outline",
        }
    }

    /// Noun used for retrieved reference files in messages.
    pub fn materials_noun(&self) -> &'static str {
        match self {
            DocumentProfile::EsgProposal => "ESG reference",
            DocumentProfile::Course => "teaching",
        }
    }

    pub fn prompts(&self) -> StagePrompts {
        match self {
            DocumentProfile::EsgProposal => StagePrompts {
                plan: ESG_PLAN_PROMPT.to_string(),
                draft: ESG_DRAFT_PROMPT.to_string(),
                finalize: ESG_FINALIZE_PROMPT.to_string(),
            },
            DocumentProfile::Course => StagePrompts {
                plan: COURSE_PLAN_PROMPT.to_string(),
                draft: COURSE_DRAFT_PROMPT.to_string(),
                finalize: COURSE_FINALIZE_PROMPT.to_string(),
            },
        }
    }
}

/// System prompts for the three stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompts {
    pub plan: String,
    pub draft: String,
    pub finalize: String,
}

const ESG_PLAN_PROMPT: &str = "You are an ESG strategy consultant preparing the outline of a \
proposal for a client company. Build the outline from the reference materials supplied with \
the request and cite them as [Source: filename] wherever you rely on them. The outline must \
cover an executive summary, the client's current ESG position, four to six strategic \
initiatives with measurable objectives, key performance indicators, an implementation \
timeline and an indicative budget.";

const ESG_DRAFT_PROMPT: &str = "You are a senior ESG proposal writer. Turn the supplied outline \
into a complete proposal in markdown with a title heading, an objective section, an approach \
section, one heading per strategic initiative, a metrics list, a timeline, a budget and a \
references list. Reference the source materials by name. When feedback on an earlier draft \
is provided, revise the draft to address every point.";

const ESG_FINALIZE_PROMPT: &str = "You are reviewing an ESG proposal before it goes to the client. \
Critique how well it uses the reference materials, whether each initiative has a measurable \
target, whether the timeline and budget are realistic, and what is missing. For each point \
name the issue, why it matters and a concrete improvement.";

const COURSE_PLAN_PROMPT: &str = "You are a course planning expert creating a detailed outline for \
a new course. Analyse the teaching materials supplied with the request and incorporate their \
content directly, citing them as [Source: filename]. Include a two paragraph introduction, \
five to seven main topic areas with two or three subtopics each, and learning objectives \
for every topic.";

const COURSE_DRAFT_PROMPT: &str = "You are an expert course content developer. Transform the \
course plan into a complete course guide in markdown with headings, learning objectives per \
section and aligned activities or assessments. Reference the teaching materials by name. \
When feedback on an earlier draft is provided, use it to improve the draft.";

const COURSE_FINALIZE_PROMPT: &str = "You are an educational consultant evaluating course \
content. Assess how well it incorporates and references the teaching materials, which key \
concepts were overlooked, and which learning methods and evaluation criteria would \
strengthen it. For each point name the issue, why it is a problem and a concrete \
improvement.";

/// Numbered passages with source headers.
pub fn numbered_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(index, doc)| {
            format!(
                "Document {} - Source: {}\n{}\n\n",
                index + 1,
                doc.source,
                doc.content
            )
        })
        .collect()
}

/// User message for the plan stage: the task followed by numbered passages.
pub fn plan_prompt(task: &str, documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return task.to_string();
    }
    format!(
        "{}\n\nHere are some relevant materials from your reference library:\n\n{}",
        task,
        numbered_documents(documents)
    )
}

pub fn draft_prompt(task: &str, plan: &str) -> String {
    format!("{}\n\nHere is my plan:\n\n{}", task, plan)
}

pub fn critique_followup(critique: &str) -> String {
    format!("Here is feedback on my previous draft:\n\n{}", critique)
}
