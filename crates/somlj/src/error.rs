//! Diagnostic accumulation shared by every pipeline phase.
//!
//! Errors never abort a phase mid-class; each phase pushes into the shared
//! list and the next phase checks it before starting. Rendering resolves
//! source ids against the model's source table, so a [`Diagnostic`] is cheap
//! to create and carries no path strings of its own.

use std::borrow::Cow;

use crate::{ast::Loc, model::Model};

/// The pipeline phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    Lex,
    Parse,
    Load,
    Resolve,
    Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One entry in the ordered diagnostic list.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    pub message: Cow<'static, str>,
    pub loc: Option<Loc>,
}

impl Diagnostic {
    /// Renders as `basename:line:col: message`, or just the message when the
    /// diagnostic has no source position.
    #[must_use]
    pub fn render(&self, model: &Model) -> String {
        match self.loc {
            Some(loc) => {
                let path = model.source_path(loc.source);
                let base = path
                    .rsplit('/')
                    .next()
                    .and_then(|f| f.split('.').next())
                    .unwrap_or(path);
                format!("{base}:{}:{}: {}", loc.line, loc.col, self.message)
            }
            None => self.message.to_string(),
        }
    }
}

/// Ordered accumulator for the whole pipeline.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, phase: Phase, message: impl Into<Cow<'static, str>>, loc: Option<Loc>) {
        self.items.push(Diagnostic {
            phase,
            severity: Severity::Error,
            message: message.into(),
            loc,
        });
    }

    pub fn warning(&mut self, phase: Phase, message: impl Into<Cow<'static, str>>, loc: Option<Loc>) {
        self.items.push(Diagnostic {
            phase,
            severity: Severity::Warning,
            message: message.into(),
            loc,
        });
    }

    /// True when at least one entry is an error (warnings don't count).
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.severity == Severity::Error).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Renders every entry, one per line, in accumulation order.
    #[must_use]
    pub fn render(&self, model: &Model) -> String {
        let mut out = String::new();
        for d in &self.items {
            let tag = match d.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            out.push_str(&format!("{tag}: {}\n", d.render(model)));
        }
        out
    }
}
