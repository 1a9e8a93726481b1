//! Selector-based allow list
//!
//! Rules use the Prometheus series selector syntax: a bare metric name,
//! `name{label="value"}`, or `{__name__=~"node_.*",job!="test"}`. A sample
//! is kept when any rule matches it; a family left empty is dropped.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0},
    combinator::{cut, map, opt},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use regex::Regex;
use thiserror::Error;

use super::{TransformError, Transformer};
use crate::domain::metrics::family::{Metric, MetricFamily, is_valid_metric_name};
use crate::domain::metrics::syntax::{IResult, label_name, or_fail, parse_all, quoted_value};

const NAME_LABEL: &str = "__name__";

#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("empty whitelist rule")]
    Empty,

    #[error("invalid metric name {0:?} in whitelist rule")]
    InvalidName(String),

    #[error("malformed whitelist rule {rule:?}: {message}")]
    Malformed { rule: String, message: String },

    #[error("invalid regex in whitelist rule {rule:?}: {source}")]
    Regex {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchOp {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

#[derive(Debug, Clone)]
struct Matcher {
    label: String,
    op: MatchOp,
    value: String,
    regex: Option<Regex>,
}

impl Matcher {
    fn new(label: String, op: MatchOp, value: String, rule: &str) -> Result<Self, RuleParseError> {
        let regex = match op {
            MatchOp::Regex | MatchOp::NotRegex => Some(
                Regex::new(&format!("^(?:{value})$")).map_err(|source| RuleParseError::Regex {
                    rule: rule.to_string(),
                    source,
                })?,
            ),
            MatchOp::Equal | MatchOp::NotEqual => None,
        };
        Ok(Self {
            label,
            op,
            value,
            regex,
        })
    }

    fn matches(&self, actual: &str) -> bool {
        match (self.op, &self.regex) {
            (MatchOp::Equal, _) => actual == self.value,
            (MatchOp::NotEqual, _) => actual != self.value,
            (MatchOp::Regex, Some(re)) => re.is_match(actual),
            (MatchOp::NotRegex, Some(re)) => !re.is_match(actual),
            (MatchOp::Regex | MatchOp::NotRegex, None) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Selector {
    matchers: Vec<Matcher>,
}

impl Selector {
    /// A missing label reads as the empty string
    fn matches(&self, family_name: &str, metric: &Metric) -> bool {
        self.matchers.iter().all(|m| {
            let actual = if m.label == NAME_LABEL {
                family_name
            } else {
                metric.label_value(&m.label).unwrap_or("")
            };
            m.matches(actual)
        })
    }
}

/// Keeps only samples matched by at least one rule
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    selectors: Vec<Selector>,
}

impl Whitelist {
    pub fn parse<S: AsRef<str>>(rules: &[S]) -> Result<Self, RuleParseError> {
        let selectors = rules
            .iter()
            .map(|r| parse_selector(r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl Transformer for Whitelist {
    fn transform(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        let name = family.name.clone().unwrap_or_default();
        family
            .metric
            .retain(|metric| self.selectors.iter().any(|s| s.matches(&name, metric)));
        Ok(!family.metric.is_empty())
    }
}

fn parse_selector(rule: &str) -> Result<Selector, RuleParseError> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(RuleParseError::Empty);
    }

    let malformed = |message: String| RuleParseError::Malformed {
        rule: rule.to_string(),
        message,
    };

    let (name, raw) = parse_all(selector, trimmed).map_err(|e| malformed(e.message))?;

    let mut matchers = Vec::new();
    if let Some(name) = name {
        if !is_valid_metric_name(name) {
            return Err(RuleParseError::InvalidName(name.to_string()));
        }
        matchers.push(Matcher::new(
            NAME_LABEL.to_string(),
            MatchOp::Equal,
            name.to_string(),
            rule,
        )?);
    }
    for (label, op, value) in raw.unwrap_or_default() {
        matchers.push(Matcher::new(label.to_string(), op, value, rule)?);
    }

    if matchers.is_empty() {
        return Err(malformed("selector matches nothing".to_string()));
    }
    Ok(Selector { matchers })
}

type RawMatcher<'a> = (&'a str, MatchOp, String);

/// `name`, `name{...}` or `{...}`
fn selector(i: &str) -> IResult<&str, (Option<&str>, Option<Vec<RawMatcher<'_>>>)> {
    pair(
        opt(take_while1(|c: char| c != '{' && !c.is_whitespace())),
        opt(preceded(space0, matcher_set)),
    )(i)
}

fn matcher_set(i: &str) -> IResult<&str, Vec<RawMatcher<'_>>> {
    let matcher = tuple((label_name, match_op, quoted_value));

    preceded(
        char('{'),
        cut(terminated(
            preceded(
                space0,
                separated_list0(tuple((space0, char(','), space0)), matcher),
            ),
            tuple((
                space0,
                opt(char(',')),
                space0,
                or_fail(char('}'), "',' or '}' between matchers"),
            )),
        )),
    )(i)
}

fn match_op(i: &str) -> IResult<&str, MatchOp> {
    let op = alt((
        map(tag("=~"), |_| MatchOp::Regex),
        map(tag("!~"), |_| MatchOp::NotRegex),
        map(tag("!="), |_| MatchOp::NotEqual),
        map(tag("="), |_| MatchOp::Equal),
    ));
    or_fail(delimited(space0, op, space0), "one of =, !=, =~, !~")(i)
}
