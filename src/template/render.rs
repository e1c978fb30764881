//! Single-pass `${NAME}` substitution.
//!
//! A placeholder is `${` followed by one or more of `A-Z`, `0-9`, `_` and a
//! closing `}`. Anything else after `${` is copied literally. Substituted
//! values are appended to the output and never scanned again, so a binding
//! value containing `${...}` cannot pull in further bindings.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use crate::metrics::{TEMPLATE_RENDERS_TOTAL, TEMPLATE_UNRESOLVED_PLACEHOLDERS_TOTAL};

use super::types::{RenderedTemplate, Template};

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Whether `name` is a valid placeholder identifier.
pub fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Scan `body` once, asking `lookup` for each placeholder.
///
/// Returns the output text and every placeholder name `lookup` had no value
/// for, one entry per occurrence.
fn scan<'v, F>(body: &str, mut lookup: F) -> (String, Vec<&str>)
where
    F: FnMut(&str) -> Option<&'v str>,
{
    let mut out = String::with_capacity(body.len());
    let mut unresolved = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];

        match after_open.find(CLOSE) {
            Some(close) if is_placeholder_name(&after_open[..close]) => {
                let name = &after_open[..close];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str(&rest[start..start + OPEN.len() + close + 1]);
                        unresolved.push(name);
                    }
                }
                rest = &after_open[close + 1..];
            }
            _ => {
                // Not a placeholder; keep "${" and resume right after it
                out.push_str(OPEN);
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    (out, unresolved)
}

/// Replace every bound placeholder in `body`; unbound ones stay verbatim.
pub fn substitute<K, V>(body: &str, bindings: &HashMap<K, V>) -> String
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
{
    let (text, unresolved) = scan(body, |name| bindings.get(name).map(AsRef::as_ref));

    TEMPLATE_RENDERS_TOTAL.inc();
    if !unresolved.is_empty() {
        TEMPLATE_UNRESOLVED_PLACEHOLDERS_TOTAL.inc_by(unresolved.len() as u64);
    }

    text
}

/// Render a template and collect the distinct unresolved placeholder names.
pub fn render_report<K, V>(template: &Template, bindings: &HashMap<K, V>) -> RenderedTemplate
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
{
    let (text, unresolved) = scan(&template.body, |name| bindings.get(name).map(AsRef::as_ref));

    TEMPLATE_RENDERS_TOTAL.inc();
    if !unresolved.is_empty() {
        TEMPLATE_UNRESOLVED_PLACEHOLDERS_TOTAL.inc_by(unresolved.len() as u64);
        tracing::debug!(
            route = %template.route,
            unresolved = ?unresolved,
            "Template rendered with unresolved placeholders"
        );
    }

    RenderedTemplate {
        template_id: template.id,
        route: template.route.clone(),
        text,
        unresolved: dedup_in_order(unresolved),
    }
}

/// Distinct placeholder names in `body`, in order of first occurrence.
pub fn placeholders(body: &str) -> Vec<String> {
    let (_, names) = scan(body, |_| None);
    dedup_in_order(names)
}

fn dedup_in_order(names: Vec<&str>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}
