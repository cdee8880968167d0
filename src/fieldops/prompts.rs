//! System prompt loading.
//!
//! Prompts live in Markdown files under a shared directory so the business
//! instructions can be edited without touching code. Prompt *contents* are the
//! product of the workflow designers; this module only finds and reads them.

use std::fs;
use std::io;
use std::path::Path;

pub const ORCHESTRATOR_PROMPT: &str = "orchestrator_system_prompt.md";
pub const FIELD_SERVICE_PROMPT: &str = "field_service_system_prompt.md";
pub const OFFICE_PROMPT: &str = "office_system_prompt.md";

/// Read a prompt file from `dir`, trimming trailing whitespace.
pub fn load(dir: &Path, file_name: &str) -> io::Result<String> {
    let path = dir.join(file_name);
    let text = fs::read_to_string(&path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("failed to read prompt {}: {}", path.display(), e),
        )
    })?;
    Ok(text.trim_end().to_string())
}
