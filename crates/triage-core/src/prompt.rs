//! Prompt template for error explanations.

use crate::DiagnosticRecord;

/// Bumped whenever the wording below changes.
pub const PROMPT_TEMPLATE_VERSION: &str = "1";

const INSTRUCTIONS: &str = "\
INSTRUCTIONS:
- Keep verbosity at the minimum.
- Keep your response concise and actionable.
- Always return every single code snippet inside triple backticks with a language tag.
- Do not add <ul> or <li> tags.
";

const NO_BACKTRACE: &str = "No backtrace available";
const NO_LOGS: &str = "No logs available";

/// Render the model prompt for one record. Pure: identical records always
/// produce identical text.
pub fn build_prompt(record: &DiagnosticRecord) -> String {
    let mut out = String::from(INSTRUCTIONS);
    match record {
        DiagnosticRecord::Exception {
            message,
            backtrace,
            logs,
        } => {
            let backtrace = if backtrace.is_empty() {
                NO_BACKTRACE.to_string()
            } else {
                backtrace.join("\n")
            };
            out.push_str(
                "You are a helpful web application debugging assistant. \
                 A developer encountered this error:\n",
            );
            out.push_str(&format!("ERROR: {message}\n"));
            out.push_str(&format!("BACKTRACE:\n{backtrace}\n"));
            out.push_str(&format!("RECENT LOGS:\n{}\n", logs_or_placeholder(logs)));
            out.push_str(
                "OBJECTIVE:\n\
                 1. Explain what this error means in simple terms\n\
                 2. Identify the likely causes\n\
                 3. Suggest specific fixes\n",
            );
        }
        DiagnosticRecord::HttpStatus { status, path, logs } => {
            out.push_str(
                "You are a helpful web application debugging assistant. \
                 A request returned an HTTP error:\n",
            );
            out.push_str(&format!("STATUS: {status}\n"));
            out.push_str(&format!("PATH: {path}\n"));
            out.push_str(&format!("RECENT LOGS:\n{}\n", logs_or_placeholder(logs)));
            out.push_str(&format!(
                "OBJECTIVE:\n\
                 1. Explain what HTTP {status} means in this context\n\
                 2. Identify the most likely cause for {path}\n\
                 3. Suggest where to investigate\n"
            ));
        }
    }
    out
}

fn logs_or_placeholder(logs: &str) -> &str {
    if logs.trim().is_empty() {
        NO_LOGS
    } else {
        logs.trim_end()
    }
}
