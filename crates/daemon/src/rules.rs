//! Rule evaluation for stream selection and encoder settings
//!
//! A rule is a list of clauses joined by AND. A clause compares one stream
//! attribute against a literal. An attribute the stream does not have is a
//! value of its own: it fails every operator except `!=`.

use crate::config::{ClauseValue, EncoderRule, Operator, RuleClause, StreamCriteria};
use crate::stream::{PropertyValue, Stream, StreamProperty};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::warn;

/// Error type for rule evaluation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    /// The clause uses an operator the policy language does not have
    #[error("Invalid operator {0}")]
    InvalidRule(String),

    /// The attribute and the literal have no common ordering
    #[error("Cannot compare {property} ({found}) {operator} {value}")]
    InvalidComparison {
        property: String,
        operator: String,
        found: &'static str,
        value: String,
    },
}

/// Anything carrying a clause list
pub trait Conditional {
    fn clauses(&self) -> &[RuleClause];
}

impl Conditional for StreamCriteria {
    fn clauses(&self) -> &[RuleClause] {
        &self.clauses
    }
}

impl Conditional for EncoderRule {
    fn clauses(&self) -> &[RuleClause] {
        &self.clauses
    }
}

impl Conditional for [RuleClause] {
    fn clauses(&self) -> &[RuleClause] {
        self
    }
}

/// Evaluate every clause of a rule against a stream
///
/// An empty clause list matches unconditionally. Evaluation stops at the
/// first clause that does not match.
pub fn evaluate<R: Conditional + ?Sized>(rule: &R, stream: &Stream) -> Result<bool, RuleError> {
    for clause in rule.clauses() {
        if !evaluate_clause(clause, stream)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Like `evaluate`, but a malformed rule is logged and counts as a non-match
pub fn matches<R: Conditional + ?Sized>(rule: &R, stream: &Stream) -> bool {
    match evaluate(rule, stream) {
        Ok(matched) => matched,
        Err(e) => {
            warn!(stream = stream.index, error = %e, "Rule could not be evaluated, treating as no match");
            false
        }
    }
}

/// Evaluate a single clause against a stream
pub fn evaluate_clause(clause: &RuleClause, stream: &Stream) -> Result<bool, RuleError> {
    if let Operator::Unknown(op) = &clause.operator {
        return Err(RuleError::InvalidRule(op.clone()));
    }

    let value = match StreamProperty::parse(&clause.property) {
        Some(property) => stream.property(property),
        None => {
            warn!(property = %clause.property, "Unknown stream property in rule, treating as absent");
            None
        }
    };

    let Some(value) = value else {
        return Ok(clause.operator == Operator::Ne);
    };

    let matched = match &clause.operator {
        Operator::Eq => equals(value, &clause.value),
        Operator::Ne => !equals(value, &clause.value),
        Operator::Contains => match value {
            PropertyValue::Text(text) => text
                .to_lowercase()
                .contains(&clause.value.to_string().to_lowercase()),
            _ => false,
        },
        op @ (Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le) => {
            let ordering =
                compare(value, &clause.value).ok_or_else(|| RuleError::InvalidComparison {
                    property: clause.property.clone(),
                    operator: op.to_string(),
                    found: value.type_name(),
                    value: clause.value.to_string(),
                })?;

            match op {
                Operator::Gt => ordering == Ordering::Greater,
                Operator::Ge => ordering != Ordering::Less,
                Operator::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
        Operator::Unknown(op) => return Err(RuleError::InvalidRule(op.clone())),
    };

    Ok(matched)
}

fn equals(value: PropertyValue<'_>, literal: &ClauseValue) -> bool {
    match (value, literal) {
        (PropertyValue::Text(a), ClauseValue::Text(b)) => a == b,
        (PropertyValue::Bool(a), ClauseValue::Bool(b)) => a == *b,
        _ => numeric_pair(value, literal).is_some_and(|(a, b)| a == b),
    }
}

fn compare(value: PropertyValue<'_>, literal: &ClauseValue) -> Option<Ordering> {
    match (value, literal) {
        (PropertyValue::Text(a), ClauseValue::Text(b)) => Some(a.cmp(b.as_str())),
        (PropertyValue::Bool(a), ClauseValue::Bool(b)) => Some(a.cmp(b)),
        _ => numeric_pair(value, literal).and_then(|(a, b)| a.partial_cmp(&b)),
    }
}

/// Both sides as numbers, when one is a number and the other a numeric string
///
/// Encoder results store `crf`/`bitrate` as text, so `output.crf == 20`
/// compares "20" with 20.
fn numeric_pair(value: PropertyValue<'_>, literal: &ClauseValue) -> Option<(f64, f64)> {
    match (value, literal) {
        (PropertyValue::Number(a), ClauseValue::Number(b)) => Some((a, *b)),
        (PropertyValue::Text(a), ClauseValue::Number(b)) => Some((parse_number(a)?, *b)),
        (PropertyValue::Number(a), ClauseValue::Text(b)) => Some((a, parse_number(b)?)),
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputSettings, OutputSettingsPatch, StreamKind};
    use proptest::prelude::*;

    fn audio_stream() -> Stream {
        Stream {
            language: Some("eng".to_string()),
            title: Some("Director's Commentary".to_string()),
            channels: Some(6),
            ..Stream::new(1, StreamKind::Audio, "dts")
        }
    }

    fn clause(property: &str, operator: &str, value: impl Into<ClauseValue>) -> RuleClause {
        RuleClause::new(property, operator, value)
    }

    const OPERATORS: [&str; 7] = [">", ">=", "<", "<=", "==", "!=", "contains"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // An absent attribute satisfies `!=` and nothing else, whatever the literal.
        #[test]
        fn prop_absent_property_only_matches_not_equal(
            op_idx in 0usize..7,
            number in -10_000.0f64..10_000.0,
            text in "[a-zA-Z0-9 ]{0,12}",
            literal_kind in 0usize..3,
        ) {
            let operator = OPERATORS[op_idx];
            let literal = match literal_kind {
                0 => ClauseValue::Number(number),
                1 => ClauseValue::Text(text),
                _ => ClauseValue::Bool(number > 0.0),
            };
            // a subtitle stream never has a height
            let stream = Stream::new(2, StreamKind::Subtitle, "subrip");
            let c = RuleClause { property: "height".to_string(), operator: Operator::from(operator), value: literal };

            let result = evaluate_clause(&c, &stream).expect("absent values never error");
            prop_assert_eq!(result, operator == "!=");
        }

        // `contains` ignores case on both sides.
        #[test]
        fn prop_contains_is_case_insensitive(
            prefix in "[a-z ]{0,8}",
            needle in "[a-zA-Z]{1,8}",
            suffix in "[a-z ]{0,8}",
        ) {
            let stream = Stream {
                title: Some(format!("{}{}{}", prefix, needle.to_uppercase(), suffix)),
                ..Stream::new(0, StreamKind::Subtitle, "ass")
            };

            let lower = clause("title", "contains", needle.to_lowercase().as_str());
            let upper = clause("title", "contains", needle.to_uppercase().as_str());
            prop_assert!(evaluate_clause(&lower, &stream).unwrap());
            prop_assert!(evaluate_clause(&upper, &stream).unwrap());
        }

        // `contains` on a numeric attribute is always false.
        #[test]
        fn prop_contains_on_number_is_false(channels in 1u32..16, literal in 0.0f64..16.0) {
            let stream = Stream { channels: Some(channels), ..Stream::new(1, StreamKind::Audio, "aac") };

            let numeric = clause("channels", "contains", literal);
            let textual = clause("channels", "contains", channels.to_string().as_str());
            prop_assert!(!evaluate_clause(&numeric, &stream).unwrap());
            prop_assert!(!evaluate_clause(&textual, &stream).unwrap());
        }

        #[test]
        fn prop_relational_operators_follow_numeric_order(height in 0u32..5000, limit in 0u32..5000) {
            let stream = Stream { height: Some(height), ..Stream::new(0, StreamKind::Video, "h264") };
            let limit = limit as f64;
            let h = height as f64;

            prop_assert_eq!(evaluate_clause(&clause("height", ">", limit), &stream).unwrap(), h > limit);
            prop_assert_eq!(evaluate_clause(&clause("height", ">=", limit), &stream).unwrap(), h >= limit);
            prop_assert_eq!(evaluate_clause(&clause("height", "<", limit), &stream).unwrap(), h < limit);
            prop_assert_eq!(evaluate_clause(&clause("height", "<=", limit), &stream).unwrap(), h <= limit);
        }
    }

    #[test]
    fn test_empty_rule_matches() {
        let criteria = StreamCriteria::default();
        assert_eq!(evaluate(&criteria, &audio_stream()), Ok(true));
    }

    #[test]
    fn test_all_clauses_must_match() {
        let stream = audio_stream();
        let both = StreamCriteria::new(vec![
            clause("language", "==", "eng"),
            clause("codec", "==", "dts"),
        ]);
        let one = StreamCriteria::new(vec![
            clause("language", "==", "eng"),
            clause("codec", "==", "aac"),
        ]);

        assert!(matches(&both, &stream));
        assert!(!matches(&one, &stream));
    }

    #[test]
    fn test_contains_matches_substring() {
        let stream = audio_stream();
        assert!(evaluate_clause(&clause("title", "contains", "commentary"), &stream).unwrap());
        assert!(!evaluate_clause(&clause("title", "contains", "forced"), &stream).unwrap());
    }

    #[test]
    fn test_mixed_type_equality_is_not_equal() {
        let stream = audio_stream();
        assert!(!evaluate_clause(&clause("channels", "==", "six"), &stream).unwrap());
        assert!(evaluate_clause(&clause("channels", "!=", "six"), &stream).unwrap());
        assert!(!evaluate_clause(&clause("language", "==", true), &stream).unwrap());
        assert!(evaluate_clause(&clause("channels", "==", 6.0), &stream).unwrap());
    }

    #[test]
    fn test_numeric_text_compares_as_number() {
        let stream = audio_stream();
        assert!(evaluate_clause(&clause("channels", "==", "6"), &stream).unwrap());

        // what a `crf = 20` rule result deserializes to
        let patch = OutputSettingsPatch {
            codec: Some("libx265".to_string()),
            crf: Some("20".to_string()),
            ..Default::default()
        };
        let mut output = OutputSettings::default();
        output.apply(&patch);
        let encoded = Stream {
            output: Some(output),
            ..Stream::new(0, StreamKind::Video, "h264")
        };

        assert!(evaluate_clause(&clause("output.crf", "==", 20.0), &encoded).unwrap());
        assert!(evaluate_clause(&clause("output.crf", ">", 18.0), &encoded).unwrap());
        assert!(!evaluate_clause(&clause("output.crf", "<", 18.0), &encoded).unwrap());
        assert!(evaluate_clause(&clause("output.crf", "==", "20"), &encoded).unwrap());
        // non-numeric text against a number still has no ordering
        assert!(matches!(
            evaluate_clause(&clause("output.codec", ">", 5.0), &encoded),
            Err(RuleError::InvalidComparison { .. })
        ));
    }

    #[test]
    fn test_incompatible_comparison_is_an_error() {
        let stream = audio_stream();
        let c = clause("language", ">", 5.0);

        let result = evaluate_clause(&c, &stream);
        assert!(matches!(result, Err(RuleError::InvalidComparison { found: "string", .. })));
        assert!(!matches(&StreamCriteria::new(vec![c]), &stream));
    }

    #[test]
    fn test_string_ordering() {
        let stream = audio_stream();
        assert!(evaluate_clause(&clause("language", ">", "def"), &stream).unwrap());
        assert!(evaluate_clause(&clause("language", "<", "fre"), &stream).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_invalid_rule() {
        let stream = audio_stream();
        let c = clause("language", "~=", "eng");

        assert_eq!(
            evaluate_clause(&c, &stream),
            Err(RuleError::InvalidRule("~=".to_string()))
        );
        assert!(!matches(&StreamCriteria::new(vec![c]), &stream));
    }

    #[test]
    fn test_unknown_property_is_absent() {
        let stream = audio_stream();
        assert!(!evaluate_clause(&clause("loudness", "==", 1.0), &stream).unwrap());
        assert!(evaluate_clause(&clause("loudness", "!=", 1.0), &stream).unwrap());
    }

    #[test]
    fn test_boolean_attributes() {
        let stream = Stream { hdr: Some(true), ..Stream::new(0, StreamKind::Video, "hevc") };
        assert!(evaluate_clause(&clause("hdr", "==", true), &stream).unwrap());
        assert!(!evaluate_clause(&clause("hdr", "!=", true), &stream).unwrap());
    }
}
