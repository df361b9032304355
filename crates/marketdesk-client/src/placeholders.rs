//! Placeholder inspection for template bodies.
//!
//! Placeholders are `{name}` tokens; `{{` and `}}` are literal braces. Format
//! options or attribute access after the name (`{price:.2f}`, `{report.summary}`)
//! still counts as a use of `name`. The client only inspects placeholders, it
//! never substitutes values.

/// Split a comma-separated variable list as typed into the template form.
///
/// Entries are trimmed and empty entries discarded. Duplicates are kept as
/// given.
pub fn parse_variable_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut chars = content.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    continue;
                }
                let rest = &content[i + 1..];
                let Some(end) = rest.find('}') else {
                    break;
                };
                let token = &rest[..end];
                let name = token
                    .split(|ch| matches!(ch, ':' | '!' | '.' | '['))
                    .next()
                    .unwrap_or("")
                    .trim();
                if is_variable_name(name) && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
                let close = i + 1 + end;
                while let Some((j, _)) = chars.peek() {
                    if *j > close {
                        break;
                    }
                    chars.next();
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                }
            }
            _ => {}
        }
    }

    names
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Mismatches between a template body and its declared variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableReport {
    /// Used in the body but not declared.
    pub undeclared: Vec<String>,
    /// Declared but never used in the body.
    pub unused: Vec<String>,
}

impl VariableReport {
    pub fn is_clean(&self) -> bool {
        self.undeclared.is_empty() && self.unused.is_empty()
    }
}

pub fn check_variables(content: &str, declared: &[String]) -> VariableReport {
    let used = placeholders(content);

    let undeclared = used
        .iter()
        .filter(|name| !declared.contains(name))
        .cloned()
        .collect();

    let mut unused: Vec<String> = Vec::new();
    for name in declared {
        if !used.contains(name) && !unused.contains(name) {
            unused.push(name.clone());
        }
    }

    VariableReport { undeclared, unused }
}
