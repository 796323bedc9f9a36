//! Attribute validators run against configuration values

use crate::types::{AttributePath, Diagnostic, Dynamic};

pub trait Validator: Send + Sync {
    fn description(&self) -> String;
    /// Null and unknown values are skipped by the caller
    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>);
}

fn invalid(path: &AttributePath, summary: String, detail: String) -> Diagnostic {
    Diagnostic::error(summary, detail).with_attribute(path.clone())
}

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for StringLengthValidator {
    fn description(&self) -> String {
        format!("string length between {:?} and {:?}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_string() else { return };
        let len = s.chars().count();
        if let Some(min) = self.min.filter(|min| len < *min) {
            diagnostics.push(invalid(
                path,
                format!("{} must have minimum length of {}", path, min),
                format!("Got length {}", len),
            ));
        }
        if let Some(max) = self.max.filter(|max| len > *max) {
            diagnostics.push(invalid(
                path,
                format!("{} must have maximum length of {}", path, max),
                format!("Got length {}", len),
            ));
        }
    }
}

pub struct StringPatternValidator {
    pub pattern: regex::Regex,
    pub description: String,
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(s) = value.as_string() {
            if !self.pattern.is_match(s) {
                diagnostics.push(invalid(
                    path,
                    format!("{} must match {}", path, self.description),
                    format!("Value '{}' does not match pattern", s),
                ));
            }
        }
    }
}

pub struct StringOneOfValidator {
    pub allowed: Vec<String>,
}

impl StringOneOfValidator {
    pub fn new(allowed: &[&str]) -> Self {
        Self {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Validator for StringOneOfValidator {
    fn description(&self) -> String {
        format!("one of {:?}", self.allowed)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(s) = value.as_string() {
            if !self.allowed.iter().any(|a| a == s) {
                diagnostics.push(invalid(
                    path,
                    format!("{} has an unsupported value", path),
                    format!("'{}' is not one of {:?}", s, self.allowed),
                ));
            }
        }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        format!("number between {:?} and {:?}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(n) = value.as_number() else { return };
        if let Some(min) = self.min.filter(|min| n < *min) {
            diagnostics.push(invalid(
                path,
                format!("{} must be at least {}", path, min),
                format!("Got {}", n),
            ));
        }
        if let Some(max) = self.max.filter(|max| n > *max) {
            diagnostics.push(invalid(
                path,
                format!("{} must be at most {}", path, max),
                format!("Got {}", n),
            ));
        }
    }
}

pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for ListLengthValidator {
    fn description(&self) -> String {
        format!("list length between {:?} and {:?}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(items) = value.as_list() else { return };
        if let Some(min) = self.min.filter(|min| items.len() < *min) {
            diagnostics.push(invalid(
                path,
                format!("{} must have at least {} items", path, min),
                format!("Got {} items", items.len()),
            ));
        }
        if let Some(max) = self.max.filter(|max| items.len() > *max) {
            diagnostics.push(invalid(
                path,
                format!("{} must have at most {} items", path, max),
                format!("Got {} items", items.len()),
            ));
        }
    }
}
