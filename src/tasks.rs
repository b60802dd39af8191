//! Built-in transformation tasks.
//!
//! A task bundles everything that differs between "annotate this C++ header
//! with Doxygen comments" and "clean this PDF-extracted paper": the system
//! instruction, how the chunk is wrapped into the first user turn, the
//! continue instruction, and the defaults for splitting, completion
//! detection, output naming, and which files are eligible.
//!
//! | Task | Policy | Protocol | Suffix | Files |
//! |------|--------|----------|--------|-------|
//! | `doxygen` | code | sentinel | `_doxygen` | `*.h`, `*.hpp` |
//! | `clean-text` | prose | stop-reason | `_cleaned` | `*.txt`, `*.pdf` |

use anyhow::{bail, Result};

use crate::chunk::BoundaryPolicy;
use crate::tokenize::LengthUnit;
use crate::transform::CompletionProtocol;

/// Placeholder replaced by the chunk text in a user template.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Placeholder replaced by the sentinel in system and continue prompts.
pub const SENTINEL_PLACEHOLDER: &str = "{sentinel}";

const SENTINEL_SYSTEM_CLAUSE: &str = "If you cannot finish the task in one response, return the output produced so far \
and add '{sentinel}' as the last line of your response.";

const SENTINEL_CONTINUE_CLAUSE: &str = "If you still cannot finish, return what you have \
and add '{sentinel}' as the last line of your response.";

const JSON_CONTINUE_CLAUSE: &str = "Reply with the same JSON object: put the continuation in the \"code\" field \
and set \"finished\" to false if the output is still not complete.";

#[derive(Debug, Clone)]
pub struct TaskProfile {
    pub name: String,
    pub description: String,
    /// Task instruction without any reply-format rules; the rules of the
    /// completion protocol are appended by [`TaskProfile::system_prompt`].
    pub system: String,
    /// What the reply carries, used in the JSON schema description.
    pub output_description: String,
    pub user_template: String,
    pub continue_prompt: String,
    pub policy: BoundaryPolicy,
    pub unit: LengthUnit,
    pub max_units: usize,
    pub protocol: CompletionProtocol,
    pub output_suffix: String,
    /// Extension given to derived single-file outputs; `None` keeps the
    /// input's extension.
    pub output_extension: Option<String>,
    pub include_globs: Vec<String>,
}

impl TaskProfile {
    /// First user turn for `chunk`.
    pub fn user_prompt(&self, chunk: &str) -> String {
        if self.user_template.contains(TEXT_PLACEHOLDER) {
            self.user_template.replacen(TEXT_PLACEHOLDER, chunk, 1)
        } else {
            format!("{}\n{}", self.user_template, chunk)
        }
    }

    /// System instruction with the reply rules of `self.protocol`.
    pub fn system_prompt(&self, sentinel: &str) -> String {
        let rules = match self.protocol {
            CompletionProtocol::StopReason => String::new(),
            CompletionProtocol::Sentinel => SENTINEL_SYSTEM_CLAUSE.to_string(),
            CompletionProtocol::Json => format!(
                "You are designed to output JSON with the following two fields:\n\
- code: {}\n\
- finished: true if you successfully finished the task, false if the output is not complete.",
                self.output_description
            ),
        };
        join_clause(&self.system, &rules).replace(SENTINEL_PLACEHOLDER, sentinel)
    }

    /// Continue instruction with the reply rules of `self.protocol`.
    pub fn continue_prompt(&self, sentinel: &str) -> String {
        let rules = match self.protocol {
            CompletionProtocol::StopReason => "",
            CompletionProtocol::Sentinel => SENTINEL_CONTINUE_CLAUSE,
            CompletionProtocol::Json => JSON_CONTINUE_CLAUSE,
        };
        join_clause(&self.continue_prompt, rules).replace(SENTINEL_PLACEHOLDER, sentinel)
    }
}

pub fn doxygen() -> TaskProfile {
    TaskProfile {
        name: "doxygen".to_string(),
        description: "Add Doxygen documentation to C++ headers".to_string(),
        system: "You are a C++ programmer and good at writing doxygen documentation for C++ headers. \
The user will provide part of a C++ header file, and you will return the code with doxygen documentation added. \
You should only include the documented code in your response, without any explanation."
            .to_string(),
        output_description: "The code with doxygen documentation added.".to_string(),
        user_template: "Add Doxygen documentation to the following C++ code:\n{text}".to_string(),
        continue_prompt: "Please continue adding doxygen documentation from where the previous response stopped. \
Only include the documented code in your response, without any explanation."
            .to_string(),
        policy: BoundaryPolicy::Code,
        unit: LengthUnit::Chars,
        max_units: 6000,
        protocol: CompletionProtocol::Sentinel,
        output_suffix: "_doxygen".to_string(),
        output_extension: None,
        include_globs: vec!["**/*.h".to_string(), "**/*.hpp".to_string()],
    }
}

pub fn clean_text() -> TaskProfile {
    TaskProfile {
        name: "clean-text".to_string(),
        description: "Clean text extracted from academic paper PDFs".to_string(),
        system: "You are a text cleaning assistant. Your task is to:\n\
1. Remove line numbers, page numbers, and headers/footers\n\
2. Remove special characters that are artifacts of PDF conversion\n\
3. Preserve the actual content including equations (convert corrupted equation symbols to proper ones if possible)\n\
4. Maintain the captions of figures and tables\n\
5. Maintain paragraph structure and section titles\n\
Return only the cleaned text without any explanations."
            .to_string(),
        output_description: "The cleaned text.".to_string(),
        user_template: "Clean this academic text:\n\n{text}".to_string(),
        continue_prompt: "Please continue cleaning the text from where the previous response stopped. \
Follow the same rules and return only the cleaned text without any explanations."
            .to_string(),
        policy: BoundaryPolicy::Prose,
        unit: LengthUnit::Tokens,
        max_units: 10_000,
        protocol: CompletionProtocol::StopReason,
        output_suffix: "_cleaned".to_string(),
        output_extension: Some("txt".to_string()),
        include_globs: vec!["**/*.txt".to_string(), "**/*.pdf".to_string()],
    }
}

/// All built-in tasks, in display order.
pub fn builtin() -> Vec<TaskProfile> {
    vec![doxygen(), clean_text()]
}

fn join_clause(base: &str, clause: &str) -> String {
    if clause.is_empty() {
        base.to_string()
    } else if base.ends_with('\n') {
        format!("{}{}", base, clause)
    } else {
        format!("{}\n{}", base, clause)
    }
}

/// Look up a built-in task by name.
pub fn find(name: &str) -> Result<TaskProfile> {
    match name {
        "doxygen" => Ok(doxygen()),
        "clean-text" => Ok(clean_text()),
        other => bail!("Unknown task: '{}'. Available: doxygen, clean-text", other),
    }
}
