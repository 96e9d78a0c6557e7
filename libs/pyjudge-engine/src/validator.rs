//! Static Validator - syntax-tree screening of submissions
//!
//! Parses the source with the Python grammar and rejects:
//! - syntax errors
//! - imports outside the allow-list (`import x`, `from x import y`)
//! - any reference to a dynamic-evaluation primitive, whether called,
//!   accessed as an attribute, or named bare
//!
//! Policy: the first disallowed import in source order wins; import
//! violations are reported ahead of operation violations.
//!
//! This is a schema check on the submission, not a security perimeter.
//! Containment of hostile code is the executor's job.

use crate::error::ValidationError;
use pyjudge_common::types::Submission;
use rustpython_ast::Visitor;
use rustpython_parser::{ast, Parse};
use std::collections::HashSet;

/// Dynamic compilation/evaluation primitives rejected by default.
pub const FORBIDDEN_OPERATIONS: [&str; 4] = ["compile", "eval", "exec", "__import__"];

#[derive(Debug, Clone)]
pub struct Validator {
    forbidden: HashSet<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            forbidden: FORBIDDEN_OPERATIONS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl Validator {
    /// Validator whose forbidden set excludes `allowed_operations`.
    pub fn allowing(allowed_operations: &HashSet<String>) -> Self {
        let mut validator = Self::default();
        validator
            .forbidden
            .retain(|name| !allowed_operations.contains(name));
        validator
    }

    pub fn for_submission(submission: &Submission) -> Self {
        match &submission.allowed_operations {
            Some(allowed) => Self::allowing(allowed),
            None => Self::default(),
        }
    }

    pub fn validate(&self, source: &str, allowed_imports: &HashSet<String>) -> Result<(), ValidationError> {
        let suite = ast::Suite::parse(source, "<submission>")
            .map_err(|e| ValidationError::Syntax(e.to_string()))?;

        let mut screen = Screen {
            source,
            allowed_imports,
            forbidden: &self.forbidden,
            import_violation: None,
            operation_violation: None,
        };
        for stmt in suite {
            screen.visit_stmt(stmt);
        }

        match (screen.import_violation, screen.operation_violation) {
            (Some(violation), _) | (None, Some(violation)) => Err(violation),
            (None, None) => Ok(()),
        }
    }
}

/// Validate with the default forbidden-operation set.
pub fn validate(source: &str, allowed_imports: &HashSet<String>) -> Result<(), ValidationError> {
    Validator::default().validate(source, allowed_imports)
}

pub fn validate_submission(submission: &Submission) -> Result<(), ValidationError> {
    Validator::for_submission(submission).validate(&submission.source, &submission.allowed_imports)
}

struct Screen<'a> {
    source: &'a str,
    allowed_imports: &'a HashSet<String>,
    forbidden: &'a HashSet<String>,
    import_violation: Option<ValidationError>,
    operation_violation: Option<ValidationError>,
}

impl Screen<'_> {
    fn check_import(&mut self, module: String) {
        if self.import_violation.is_none() && !self.allowed_imports.contains(&module) {
            self.import_violation = Some(ValidationError::NotAllowedImport { module });
        }
    }

    fn check_operation(&mut self, name: &str, offset: usize) {
        if self.operation_violation.is_none() && self.forbidden.contains(name) {
            self.operation_violation = Some(ValidationError::DisallowedOperation {
                name: name.to_string(),
                line: line_number(self.source, offset),
            });
        }
    }
}

impl Visitor for Screen<'_> {
    fn visit_stmt_import(&mut self, node: ast::StmtImport) {
        for alias in &node.names {
            self.check_import(alias.name.as_str().to_string());
        }
    }

    fn visit_stmt_import_from(&mut self, node: ast::StmtImportFrom) {
        let dots = node.level.map_or(0, |level| level.to_u32() as usize);
        let module = node
            .module
            .as_ref()
            .map(|module| module.as_str())
            .unwrap_or_default();
        self.check_import(format!("{}{}", ".".repeat(dots), module));
    }

    fn visit_expr_name(&mut self, node: ast::ExprName) {
        self.check_operation(node.id.as_str(), usize::from(node.range.start()));
    }

    fn visit_expr_attribute(&mut self, node: ast::ExprAttribute) {
        self.check_operation(node.attr.as_str(), usize::from(node.range.start()));
        self.generic_visit_expr_attribute(node);
    }
}

/// 1-based line of a byte offset.
fn line_number(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
