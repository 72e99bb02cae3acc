//! replace::rules
//!
//! Compiled, ordered replacement rules.
//!
//! Templates accept the regex crate's syntax (`$1`, `${1}`, `$name`,
//! `${name}`, `$$`) and the Python forms found in older migration documents
//! (`\1`, `\g<name>`, `\g<1>`). Both are normalized to `${..}` references at
//! compile time, and every reference is checked against the pattern's
//! groups so a typo fails the whole set instead of silently expanding to
//! nothing.

use regex::Regex;
use thiserror::Error;

/// Errors from compiling or applying replacement rules.
#[derive(Debug, Error)]
pub enum ReplacementError {
    #[error("pattern '{pattern}' does not compile: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("replacement for '{pattern}' references group '{group}' which the pattern does not define")]
    MissingGroup { pattern: String, group: String },

    #[error("replacement for '{pattern}' is malformed: {message}")]
    InvalidTemplate { pattern: String, message: String },

    #[error("failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        source: std::io::Error,
    },
}

/// One compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    regex: Regex,
    template: String,
}

impl Rule {
    /// Pattern as written in the document.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Template in native `${..}` form.
    pub fn template(&self) -> &str {
        &self.template
    }
}

/// Rules in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ReplacementSet {
    rules: Vec<Rule>,
}

/// Result of running every rule over one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOutcome {
    pub content: String,
    /// Match count per rule, index-aligned with the set.
    pub counts: Vec<usize>,
}

impl TextOutcome {
    pub fn total_matches(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl ReplacementSet {
    /// Compile `(pattern, template)` pairs, keeping their order.
    ///
    /// # Errors
    ///
    /// Fails on the first pattern that does not compile or template that
    /// references an unknown group. No partial set is ever returned.
    pub fn compile<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ReplacementError> {
        let rules = pairs
            .into_iter()
            .map(|(pattern, template)| {
                let regex = Regex::new(pattern).map_err(|e| ReplacementError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
                let template = normalize_template(pattern, template, &regex)?;
                Ok(Rule {
                    pattern: pattern.to_string(),
                    regex,
                    template,
                })
            })
            .collect::<Result<Vec<_>, ReplacementError>>()?;

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule in order. Each rule's matches are counted against the
    /// text as left by the rules before it.
    pub fn apply_text(&self, text: &str) -> TextOutcome {
        let mut content = text.to_string();
        let mut counts = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let count = rule.regex.find_iter(&content).count();
            counts.push(count);
            if count > 0 {
                content = rule
                    .regex
                    .replace_all(&content, rule.template.as_str())
                    .into_owned();
            }
        }

        TextOutcome { content, counts }
    }
}

/// Rewrite a template into `${..}` form and check its group references.
fn normalize_template(
    pattern: &str,
    template: &str,
    regex: &Regex,
) -> Result<String, ReplacementError> {
    let malformed = |message: &str| ReplacementError::InvalidTemplate {
        pattern: pattern.to_string(),
        message: message.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut groups = Vec::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '$' => match chars.get(i + 1) {
                Some('$') => {
                    out.push_str("$$");
                    i += 2;
                }
                Some('{') => {
                    let end = chars[i + 2..]
                        .iter()
                        .position(|c| *c == '}')
                        .ok_or_else(|| malformed("unterminated '${'"))?;
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    if name.is_empty() {
                        return Err(malformed("empty '${}' reference"));
                    }
                    push_ref(&mut out, &mut groups, name);
                    i += end + 3;
                }
                Some(c) if is_name_char(*c) => {
                    let name: String = chars[i + 1..]
                        .iter()
                        .take_while(|c| is_name_char(**c))
                        .collect();
                    i += 1 + name.chars().count();
                    push_ref(&mut out, &mut groups, name);
                }
                _ => {
                    // A lone '$' is literal.
                    out.push_str("$$");
                    i += 1;
                }
            },
            '\\' => match chars.get(i + 1) {
                Some(c) if c.is_ascii_digit() => {
                    let digits: String = chars[i + 1..]
                        .iter()
                        .take_while(|c| c.is_ascii_digit())
                        .take(2)
                        .collect();
                    i += 1 + digits.len();
                    push_ref(&mut out, &mut groups, digits);
                }
                Some('g') if chars.get(i + 2) == Some(&'<') => {
                    let end = chars[i + 3..]
                        .iter()
                        .position(|c| *c == '>')
                        .ok_or_else(|| malformed("unterminated '\\g<'"))?;
                    let name: String = chars[i + 3..i + 3 + end].iter().collect();
                    if name.is_empty() {
                        return Err(malformed("empty '\\g<>' reference"));
                    }
                    push_ref(&mut out, &mut groups, name);
                    i += end + 4;
                }
                Some('n') => {
                    out.push('\n');
                    i += 2;
                }
                Some('t') => {
                    out.push('\t');
                    i += 2;
                }
                Some('\\') => {
                    out.push('\\');
                    i += 2;
                }
                _ => {
                    out.push('\\');
                    i += 1;
                }
            },
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    for group in groups {
        if !group_exists(regex, &group) {
            return Err(ReplacementError::MissingGroup {
                pattern: pattern.to_string(),
                group,
            });
        }
    }

    Ok(out)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_ref(out: &mut String, groups: &mut Vec<String>, name: String) {
    out.push_str("${");
    out.push_str(&name);
    out.push('}');
    groups.push(name);
}

fn group_exists(regex: &Regex, group: &str) -> bool {
    match group.parse::<usize>() {
        Ok(index) => index < regex.captures_len(),
        Err(_) => regex.capture_names().flatten().any(|name| name == group),
    }
}
