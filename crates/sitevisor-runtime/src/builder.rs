//! Command builder
//!
//! Turns a site, a command and its env values into one line for `sh -c`.
//! Building never fails: a template that cannot be rendered is used as-is.

use sitevisor_core::{Command, FallbackConfig, Site};
use std::collections::BTreeMap;

/// Why a template could not be rendered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{0}'")]
    UnknownKey(String),
    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),
    #[error("single '}}' at byte {0}")]
    UnmatchedClose(usize),
}

/// Substitute `{key}` placeholders from `envs`. `{{` and `}}` are literal braces.
pub fn render_template(
    template: &str,
    envs: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut key = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(pos));
                }
                match envs.get(&key) {
                    Some(value) => out.push_str(value),
                    None => return Err(TemplateError::UnknownKey(key)),
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(TemplateError::UnmatchedClose(pos));
                }
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}

/// Render, falling back to the literal template on any failure
pub fn render_or_literal(template: &str, envs: &BTreeMap<String, String>) -> String {
    render_template(template, envs).unwrap_or_else(|_| template.to_string())
}

/// Trim whitespace and a trailing slash; the root stays `/`
pub fn normalize_dir(dir: &str) -> Option<String> {
    let trimmed = dir.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() {
        Some("/".to_string())
    } else {
        Some(stripped.to_string())
    }
}

fn assemble(site: &Site, prefix: Option<&str>, rendered: String) -> String {
    let mut clauses: Vec<String> = Vec::with_capacity(3);

    if let Some(dir) = site.directory.as_deref().and_then(normalize_dir) {
        clauses.push(format!("cd {}", shell_words::quote(&dir)));
    }
    if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
        clauses.push(prefix.to_string());
    }
    clauses.push(rendered);

    clauses
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Build the shell line for a command
pub fn build_command(site: &Site, command: &Command, envs: &BTreeMap<String, String>) -> String {
    assemble(
        site,
        site.base_command.as_deref(),
        render_or_literal(&command.template, envs),
    )
}

/// Like [`build_command`], but the rendered template runs as arguments of the
/// fallback interpreter and entry point instead of behind the site prefix
pub fn build_fallback_command(
    site: &Site,
    command: &Command,
    envs: &BTreeMap<String, String>,
    fallback: &FallbackConfig,
) -> String {
    let rendered = render_or_literal(&command.template, envs);
    let invocation = format!("{} {}", fallback.prefix(), rendered.trim());
    assemble(site, None, invocation.trim().to_string())
}
