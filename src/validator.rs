//! # Request Validation
//!
//! Declarative field checks over the form and query mappings.
//!
//! Each field carries an ordered list of checks. A check either passes the
//! (possibly coerced) value through or fails with an HTTP status, `400 Bad
//! Request` unless overridden with [`FieldRules::status`]. Coerced values
//! replace the raw ones in the mapping being validated.
//!
//! ```rust
//! use brrtweb::validator::{Coerce, FieldRules, RequestValidator};
//! use serde_json::{json, Map, Value};
//!
//! let validator = RequestValidator::new()
//!     .field("field", FieldRules::new().type_(Coerce::Int));
//!
//! let mut form: Map<String, Value> = json!({"field": "123"}).as_object().cloned().unwrap();
//! validator.validate(&mut form, &mut Map::new()).unwrap();
//! assert_eq!(form["field"], json!(123));
//!
//! let mut bad: Map<String, Value> = json!({"field": "abc"}).as_object().cloned().unwrap();
//! let err = validator.validate(&mut bad, &mut Map::new()).unwrap_err();
//! assert_eq!(err.code(), 400);
//! ```

use crate::context::RequestContext;
use crate::status::{HandlerError, HttpStatus};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub rule: &'static str,
    pub message: String,
    /// Status chosen by a callback check, reported unchanged
    pub status: Option<HttpStatus>,
}

impl ValidationIssue {
    fn new(field: &str, rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            rule,
            message: message.into(),
            status: None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.field, self.message)
    }
}

/// Type coercion applied by [`FieldRules::type_`].
#[derive(Clone)]
pub enum Coerce {
    /// Integer; accepts integral numbers and decimal strings
    Int,
    /// Float; accepts numbers and numeric strings
    Float,
    /// String; accepts strings, numbers and booleans
    Str,
    /// Boolean; accepts booleans and `true/false/1/0/yes/no/on/off`
    Bool,
    /// Arbitrary converter; `None` rejects the value
    Custom(Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>),
}

impl Coerce {
    /// A custom converter.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Coerce::Custom(Arc::new(f))
    }

    fn apply(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Coerce::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
            (Coerce::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Coerce::Float, Value::Number(n)) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            (Coerce::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Coerce::Str, Value::String(_)) => Some(value.clone()),
            (Coerce::Str, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Coerce::Str, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Coerce::Bool, Value::Bool(_)) => Some(value.clone()),
            (Coerce::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
            (Coerce::Custom(f), value) => f(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Coerce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coerce::Int => f.write_str("Int"),
            Coerce::Float => f.write_str("Float"),
            Coerce::Str => f.write_str("Str"),
            Coerce::Bool => f.write_str("Bool"),
            Coerce::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Callback check: `(value, container, field) -> replacement value`.
pub type Callback =
    Arc<dyn Fn(&Value, &Map<String, Value>, &str) -> Result<Value, HttpStatus> + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Required,
    NotNone,
    Readonly,
    Type(Coerce),
    Minimum(f64),
    Maximum(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Callback(Callback),
}

impl Rule {
    fn name(&self) -> &'static str {
        match self {
            Rule::Required => "required",
            Rule::NotNone => "not_none",
            Rule::Readonly => "readonly",
            Rule::Type(_) => "type",
            Rule::Minimum(_) => "minimum",
            Rule::Maximum(_) => "maximum",
            Rule::MinLength(_) => "min_length",
            Rule::MaxLength(_) => "max_length",
            Rule::Pattern(_) => "pattern",
            Rule::Callback(_) => "callback",
        }
    }
}

#[derive(Clone)]
struct Check {
    rule: Rule,
    status: Option<String>,
}

/// Where a field is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Source {
    #[default]
    Form,
    Query,
    /// Query wins when the field is present there; the form copy is skipped
    Both,
}

/// Ordered checks for one field.
#[derive(Clone, Default)]
pub struct FieldRules {
    checks: Vec<Check>,
    source: Source,
}

impl fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<&str> = self.checks.iter().map(|c| c.rule.name()).collect();
        f.debug_struct("FieldRules")
            .field("checks", &rules)
            .field("source", &self.source)
            .finish()
    }
}

impl FieldRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, rule: Rule) -> Self {
        self.checks.push(Check { rule, status: None });
        self
    }

    /// Override the failure status of the check added last, as a
    /// `"CODE text"` status line.
    #[must_use]
    pub fn status(mut self, status_line: &str) -> Self {
        if let Some(last) = self.checks.last_mut() {
            last.status = Some(status_line.to_string());
        }
        self
    }

    /// Look the field up in the query string instead of the form.
    #[must_use]
    pub fn in_query(mut self) -> Self {
        self.source = Source::Query;
        self
    }

    /// Look the field up in the query string first, then in the form.
    #[must_use]
    pub fn in_form_and_query(mut self) -> Self {
        self.source = Source::Both;
        self
    }

    /// The field must be present.
    #[must_use]
    pub fn required(self) -> Self {
        self.push(Rule::Required)
    }

    /// The field, when present, must not be `null`.
    #[must_use]
    pub fn not_none(self) -> Self {
        self.push(Rule::NotNone)
    }

    /// The field must be absent.
    #[must_use]
    pub fn readonly(self) -> Self {
        self.push(Rule::Readonly)
    }

    /// Coerce the value; failure to convert fails the check.
    #[must_use]
    pub fn type_(self, coerce: Coerce) -> Self {
        self.push(Rule::Type(coerce))
    }

    /// Numeric lower bound, checked after coercion.
    #[must_use]
    pub fn minimum<N: Into<f64>>(self, bound: N) -> Self {
        self.push(Rule::Minimum(bound.into()))
    }

    /// Numeric upper bound, checked after coercion.
    #[must_use]
    pub fn maximum<N: Into<f64>>(self, bound: N) -> Self {
        self.push(Rule::Maximum(bound.into()))
    }

    /// Minimum string length in characters.
    #[must_use]
    pub fn min_length(self, length: usize) -> Self {
        self.push(Rule::MinLength(length))
    }

    /// Maximum string length in characters.
    #[must_use]
    pub fn max_length(self, length: usize) -> Self {
        self.push(Rule::MaxLength(length))
    }

    /// The string must match `pattern` at its start.
    #[must_use]
    pub fn pattern(self, pattern: Regex) -> Self {
        self.push(Rule::Pattern(pattern))
    }

    /// Compile and add a pattern check.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn pattern_str(self, pattern: &str) -> Result<Self, regex::Error> {
        Ok(self.pattern(Regex::new(pattern)?))
    }

    /// Arbitrary check returning the replacement value.
    #[must_use]
    pub fn callback<F>(self, f: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>, &str) -> Result<Value, HttpStatus> + Send + Sync + 'static,
    {
        self.push(Rule::Callback(Arc::new(f)))
    }

    fn apply(&self, field: &str, container: &mut Map<String, Value>) -> Result<(), HttpStatus> {
        for check in &self.checks {
            if let Err(mut issue) = apply_rule(&check.rule, field, container) {
                debug!(field = %issue.field, rule = issue.rule, "Validation failed");
                return Err(match (&check.status, issue.status.take()) {
                    (Some(line), _) => {
                        HttpStatus::custom_or(line, Some("Bad request")).with_info(issue.to_string())
                    }
                    (None, Some(chosen)) => chosen,
                    (None, None) => HttpStatus::bad_request().with_info(issue.to_string()),
                });
            }
        }
        Ok(())
    }
}

fn apply_rule(
    rule: &Rule,
    field: &str,
    container: &mut Map<String, Value>,
) -> Result<(), ValidationIssue> {
    let name = rule.name();
    let fail = |message: &str| ValidationIssue::new(field, name, message);

    match rule {
        Rule::Required => {
            return if container.contains_key(field) {
                Ok(())
            } else {
                Err(fail("field is required"))
            };
        }
        Rule::Readonly => {
            return if container.contains_key(field) {
                Err(fail("field is read-only"))
            } else {
                Ok(())
            };
        }
        _ => {}
    }

    let Some(value) = container.get(field) else {
        return Ok(());
    };

    match rule {
        Rule::NotNone if value.is_null() => Err(fail("field must not be null")),
        _ if value.is_null() && !matches!(rule, Rule::Callback(_)) => Ok(()),
        Rule::Type(coerce) => {
            let coerced = coerce
                .apply(value)
                .ok_or_else(|| fail(&format!("cannot convert {value} with {coerce:?}")))?;
            container.insert(field.to_string(), coerced);
            Ok(())
        }
        Rule::Minimum(bound) => match value.as_f64() {
            Some(n) if n >= *bound => Ok(()),
            Some(_) => Err(fail(&format!("must be at least {bound}"))),
            None => Err(fail("must be a number")),
        },
        Rule::Maximum(bound) => match value.as_f64() {
            Some(n) if n <= *bound => Ok(()),
            Some(_) => Err(fail(&format!("must be at most {bound}"))),
            None => Err(fail("must be a number")),
        },
        Rule::MinLength(min) => match value.as_str() {
            Some(s) if s.chars().count() >= *min => Ok(()),
            Some(_) => Err(fail(&format!("must be at least {min} characters"))),
            None => Err(fail("must be a string")),
        },
        Rule::MaxLength(max) => match value.as_str() {
            Some(s) if s.chars().count() <= *max => Ok(()),
            Some(_) => Err(fail(&format!("must be at most {max} characters"))),
            None => Err(fail("must be a string")),
        },
        Rule::Pattern(pattern) => match value.as_str() {
            Some(s) if pattern.find(s).is_some_and(|m| m.start() == 0) => Ok(()),
            Some(_) => Err(fail(&format!("does not match {}", pattern.as_str()))),
            None => Err(fail("must be a string")),
        },
        Rule::Callback(f) => {
            let replacement = f(value, container, field).map_err(|status| ValidationIssue {
                status: Some(status.clone()),
                ..fail(status.info().unwrap_or(status.text()))
            })?;
            container.insert(field.to_string(), replacement);
            Ok(())
        }
        Rule::NotNone | Rule::Required | Rule::Readonly => Ok(()),
    }
}

/// Field rules for a whole request.
#[derive(Debug, Clone, Default)]
pub struct RequestValidator {
    fields: Vec<(String, FieldRules)>,
}

impl RequestValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Fields are checked in the order they are added.
    #[must_use]
    pub fn field(mut self, name: &str, rules: FieldRules) -> Self {
        self.fields.push((name.to_string(), rules));
        self
    }

    /// Validate `form` and `query` in place.
    ///
    /// # Errors
    ///
    /// The status of the first failing check.
    pub fn validate(
        &self,
        form: &mut Map<String, Value>,
        query: &mut Map<String, Value>,
    ) -> Result<(), HttpStatus> {
        for (name, rules) in &self.fields {
            let container = match rules.source {
                Source::Form => &mut *form,
                Source::Query => &mut *query,
                Source::Both if query.contains_key(name) => &mut *query,
                Source::Both => &mut *form,
            };
            rules.apply(name, container)?;
        }
        Ok(())
    }

    /// Validate the current request's form and query in place.
    ///
    /// A form that is not a JSON object is validated as an empty mapping and
    /// left untouched.
    ///
    /// # Errors
    ///
    /// The form parse failure or the first failing check.
    pub fn validate_context(&self, ctx: &RequestContext) -> Result<(), HandlerError> {
        let form = ctx.form()?;
        let query = ctx.query();
        let mut form = form.borrow_mut();
        let mut query = query.borrow_mut();
        match form.as_object_mut() {
            Some(fields) => self.validate(fields, &mut query)?,
            None => self.validate(&mut Map::new(), &mut query)?,
        }
        Ok(())
    }
}
