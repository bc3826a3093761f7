//! Fixed-effects formulas naming which covariate columns enter the model.

use crate::error::{JsdmError, Result};
use serde::{Deserialize, Serialize};

/// Name of the intercept column in design matrices.
pub const INTERCEPT: &str = "(Intercept)";

/// A term in a formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    /// Main effect of a covariate column.
    Main(String),
    /// Product of two covariate columns.
    Interaction(String, String),
}

impl Term {
    /// Covariate columns referenced by this term.
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Term::Main(v) => vec![v.as_str()],
            Term::Interaction(a, b) => vec![a.as_str(), b.as_str()],
        }
    }

    /// Design-matrix column name produced by this term.
    pub fn column_name(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Main(v) => write!(f, "{}", v),
            Term::Interaction(a, b) => write!(f, "{}:{}", a, b),
        }
    }
}

/// A parsed fixed-effects formula.
///
/// R-style syntax over numeric covariates:
/// - `~ plant_height + flowers_open`
/// - `~ a * b` expands to `a + b + a:b`
/// - `~ 0 + a` drops the intercept
/// - `~ 1` is intercept only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Whether to include an intercept.
    pub intercept: bool,
    /// Terms, excluding the intercept, in order of appearance.
    pub terms: Vec<Term>,
}

fn split_pair<'a>(term: &'a str, sep: char) -> Result<(&'a str, &'a str)> {
    let parts: Vec<&str> = term.split(sep).map(str::trim).collect();
    match parts.as_slice() {
        [a, b] if !a.is_empty() && !b.is_empty() => Ok((*a, *b)),
        _ => Err(JsdmError::FormulaParse(format!(
            "Invalid interaction term: {}",
            term
        ))),
    }
}

impl Formula {
    /// Parse a formula string.
    ///
    /// # Examples
    /// ```
    /// use composable_jsdm::data::Formula;
    /// let f = Formula::parse("~ plant_height + flowers_open").unwrap();
    /// assert!(f.intercept);
    /// assert_eq!(f.terms.len(), 2);
    /// ```
    pub fn parse(formula: &str) -> Result<Self> {
        let rhs = formula
            .trim()
            .strip_prefix('~')
            .ok_or_else(|| JsdmError::FormulaParse("Formula must start with '~'".to_string()))?
            .trim();
        if rhs.is_empty() {
            return Err(JsdmError::FormulaParse(
                "Formula right-hand side is empty".to_string(),
            ));
        }

        let mut intercept = true;
        let mut terms: Vec<Term> = Vec::new();
        let push = |t: Term, terms: &mut Vec<Term>| {
            if !terms.contains(&t) {
                terms.push(t);
            }
        };

        for raw in rhs.split('+').map(str::trim) {
            match raw {
                "" | "1" => {}
                "0" | "-1" => intercept = false,
                _ if raw.contains('*') => {
                    let (a, b) = split_pair(raw, '*')?;
                    push(Term::Main(a.to_string()), &mut terms);
                    push(Term::Main(b.to_string()), &mut terms);
                    push(Term::Interaction(a.to_string(), b.to_string()), &mut terms);
                }
                _ if raw.contains(':') => {
                    let (a, b) = split_pair(raw, ':')?;
                    push(Term::Interaction(a.to_string(), b.to_string()), &mut terms);
                }
                _ => push(Term::Main(raw.to_string()), &mut terms),
            }
        }

        if terms.is_empty() && !intercept {
            return Err(JsdmError::FormulaParse(
                "Formula must have at least one term".to_string(),
            ));
        }
        Ok(Self { intercept, terms })
    }

    /// Intercept plus one main effect per predictor column.
    pub fn from_predictors<S: AsRef<str>>(predictors: &[S]) -> Self {
        let mut terms: Vec<Term> = Vec::new();
        for p in predictors {
            let t = Term::Main(p.as_ref().to_string());
            if !terms.contains(&t) {
                terms.push(t);
            }
        }
        Self {
            intercept: true,
            terms,
        }
    }

    /// Covariate columns used by the formula, sorted and deduplicated.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.terms.iter().flat_map(|t| t.variables()).collect();
        vars.sort();
        vars.dedup();
        vars
    }

    /// Design-matrix column names, intercept first.
    pub fn coefficient_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.terms.len() + 1);
        if self.intercept {
            names.push(INTERCEPT.to_string());
        }
        names.extend(self.terms.iter().map(Term::column_name));
        names
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.intercept {
            parts.push("0".to_string());
        }
        parts.extend(self.terms.iter().map(|t| t.to_string()));
        if parts.is_empty() {
            parts.push("1".to_string());
        }
        write!(f, "~ {}", parts.join(" + "))
    }
}
