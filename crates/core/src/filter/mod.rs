//! The boolean rule evaluator (§4.3).
//!
//! Replaces the source's reflection-over-field-names dispatch with a
//! tagged-variant `FieldRule`, compiled once per rule and evaluated by
//! static dispatch. Unknown field/operator combinations compile to
//! `None` and are evaluated as `false`, never an error — the evaluator
//! is pure, stateless, and never panics on malformed input.

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::models::{MediaMetadata, RawRule, RuleLogic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    IsOneOf,
    IsNoneOf,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    InLastDays,
    NotInLastDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleOp {
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Gte,
    Lte,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectListField {
    Actors,
    Directors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringListField {
    Genres,
    Countries,
    Studios,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    ReleaseDate,
    DateAdded,
}

/// A single compiled rule, dispatched statically instead of by field-name
/// reflection.
#[derive(Debug, Clone)]
pub enum FieldRule {
    ObjectList {
        field: ObjectListField,
        op: ListOp,
        values: Vec<String>,
    },
    StringList {
        field: StringListField,
        op: ListOp,
        values: Vec<String>,
    },
    Date {
        field: DateField,
        op: DateOp,
        days: i64,
    },
    Title {
        op: TitleOp,
        value: String,
    },
    Numeric {
        field: String,
        op: NumericOp,
        value: Value,
    },
}

fn value_as_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

impl FieldRule {
    /// Compiles a raw `{field, operator, value}` triple. Returns `None`
    /// for any combination not named in the dispatch table — the caller
    /// treats that as an always-false rule rather than an error.
    pub fn compile(raw: &RawRule) -> Option<Self> {
        match raw.field.as_str() {
            "actors" | "directors" => {
                let field = if raw.field == "actors" {
                    ObjectListField::Actors
                } else {
                    ObjectListField::Directors
                };
                let op = match raw.operator.as_str() {
                    "is_one_of" => ListOp::IsOneOf,
                    "is_none_of" => ListOp::IsNoneOf,
                    "contains" => ListOp::Contains,
                    _ => return None,
                };
                Some(Self::ObjectList {
                    field,
                    op,
                    values: value_as_string_list(&raw.value),
                })
            }
            "genres" | "countries" | "studios" | "tags" => {
                let field = match raw.field.as_str() {
                    "genres" => StringListField::Genres,
                    "countries" => StringListField::Countries,
                    "studios" => StringListField::Studios,
                    "tags" => StringListField::Tags,
                    _ => unreachable!(),
                };
                let op = match raw.operator.as_str() {
                    "is_one_of" => ListOp::IsOneOf,
                    "is_none_of" => ListOp::IsNoneOf,
                    "contains" => ListOp::Contains,
                    _ => return None,
                };
                Some(Self::StringList {
                    field,
                    op,
                    values: value_as_string_list(&raw.value),
                })
            }
            "release_date" | "date_added" => {
                let field = if raw.field == "release_date" {
                    DateField::ReleaseDate
                } else {
                    DateField::DateAdded
                };
                let op = match raw.operator.as_str() {
                    "in_last_days" => DateOp::InLastDays,
                    "not_in_last_days" => DateOp::NotInLastDays,
                    _ => return None,
                };
                let days = raw.value.as_i64().or_else(|| {
                    raw.value.as_str().and_then(|s| s.parse::<i64>().ok())
                })?;
                Some(Self::Date { field, op, days })
            }
            "title" => {
                let op = match raw.operator.as_str() {
                    "contains" => TitleOp::Contains,
                    "does_not_contain" => TitleOp::DoesNotContain,
                    "starts_with" => TitleOp::StartsWith,
                    "ends_with" => TitleOp::EndsWith,
                    _ => return None,
                };
                let value = raw.value.as_str()?.to_string();
                Some(Self::Title { op, value })
            }
            other => {
                let op = match raw.operator.as_str() {
                    "gte" => NumericOp::Gte,
                    "lte" => NumericOp::Lte,
                    "eq" => NumericOp::Eq,
                    _ => return None,
                };
                Some(Self::Numeric {
                    field: other.to_string(),
                    op,
                    value: raw.value.clone(),
                })
            }
        }
    }

    /// Evaluates the compiled rule against a single metadata row. Pure
    /// and total: never panics, always returns a boolean.
    pub fn evaluate(&self, media: &MediaMetadata) -> bool {
        match self {
            Self::ObjectList { field, op, values } => {
                let names: Vec<String> = match field {
                    ObjectListField::Actors => {
                        media.actor_names().into_iter().map(str::to_string).collect()
                    }
                    ObjectListField::Directors => media
                        .director_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                };
                eval_list_op(*op, &names, values)
            }
            Self::StringList { field, op, values } => {
                let items: &[String] = match field {
                    StringListField::Genres => &media.genres,
                    StringListField::Countries => &media.countries,
                    StringListField::Studios => &media.studios,
                    StringListField::Tags => &media.tags,
                };
                eval_list_op(*op, items, values)
            }
            Self::Date { field, op, days } => {
                let item_date = match field {
                    DateField::ReleaseDate => media.release_date,
                    DateField::DateAdded => media.date_added.map(|d| d.date_naive()),
                };
                let Some(item_date) = item_date else {
                    return false;
                };
                let today = Utc::now().date_naive();
                let cutoff = today - Duration::days(*days);
                match op {
                    DateOp::InLastDays => item_date >= cutoff && item_date <= today,
                    DateOp::NotInLastDays => item_date < cutoff,
                }
            }
            Self::Title { op, value } => {
                let title = media.title.to_lowercase();
                let needle = value.to_lowercase();
                match op {
                    TitleOp::Contains => title.contains(&needle),
                    TitleOp::DoesNotContain => !title.contains(&needle),
                    TitleOp::StartsWith => title.starts_with(&needle),
                    TitleOp::EndsWith => title.ends_with(&needle),
                }
            }
            Self::Numeric { field, op, value } => {
                evaluate_numeric(field, *op, value, media)
            }
        }
    }
}

fn eval_list_op(op: ListOp, items: &[String], values: &[String]) -> bool {
    match op {
        ListOp::IsOneOf => values.iter().any(|v| items.contains(v)),
        ListOp::IsNoneOf => !values.iter().any(|v| items.contains(v)),
        ListOp::Contains => values.first().map(|v| items.contains(v)).unwrap_or(false),
    }
}

fn field_numeric_value(field: &str, media: &MediaMetadata) -> Option<f64> {
    match field {
        "rating" => media.rating,
        "release_year" => media.release_year.map(|y| y as f64),
        _ => None,
    }
}

fn evaluate_numeric(field: &str, op: NumericOp, rule_value: &Value, media: &MediaMetadata) -> bool {
    let Some(item_value) = field_numeric_value(field, media) else {
        return false;
    };
    match op {
        NumericOp::Eq => {
            // Coerce both sides to string for equality, per §4.3.
            let rule_str = value_to_comparable_string(rule_value);
            let item_str = format!("{item_value}");
            rule_str.map(|r| r == item_str).unwrap_or(false)
        }
        NumericOp::Gte | NumericOp::Lte => {
            let Some(rule_num) = value_to_f64(rule_value) else {
                return false;
            };
            if matches!(op, NumericOp::Gte) {
                item_value >= rule_num
            } else {
                item_value <= rule_num
            }
        }
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
}

fn value_to_comparable_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Evaluates a whole rule set against a single metadata row: compiles
/// every rule (unknown ones evaluate to `false`), then reduces by the
/// collection's logic. An empty rule set is vacuously true.
pub fn evaluate_rules(rules: &[RawRule], logic: RuleLogic, media: &MediaMetadata) -> bool {
    if rules.is_empty() {
        return true;
    }
    let results = rules.iter().map(|r| {
        FieldRule::compile(r)
            .map(|f| f.evaluate(media))
            .unwrap_or(false)
    });
    match logic {
        RuleLogic::And => results.fold(true, |acc, r| acc && r),
        RuleLogic::Or => results.fold(false, |acc, r| acc || r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemType, Person};
    use chrono::Utc;
    use proptest::prelude::*;

    fn sample_media() -> MediaMetadata {
        MediaMetadata {
            tmdb_id: "603".into(),
            item_type: ItemType::Movie,
            title: "The Matrix".into(),
            original_title: None,
            release_year: Some(1999),
            release_date: Some("1999-03-31".parse().unwrap()),
            date_added: Some(Utc::now()),
            rating: Some(8.2),
            genres: vec!["Action".into(), "Science Fiction".into()],
            actors: vec![Person::named("Keanu Reeves")],
            directors: vec![Person::named("Lana Wachowski")],
            studios: vec!["Warner Bros.".into()],
            countries: vec!["US".into()],
            tags: vec![],
            last_synced_at: Utc::now(),
        }
    }

    fn rule(field: &str, operator: &str, value: Value) -> RawRule {
        RawRule {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }
    }

    #[test]
    fn genre_is_one_of_matches() {
        let media = sample_media();
        let rules = vec![rule("genres", "is_one_of", serde_json::json!(["Action"]))];
        assert!(evaluate_rules(&rules, RuleLogic::And, &media));
    }

    #[test]
    fn genre_is_none_of_excludes() {
        let media = sample_media();
        let rules = vec![rule("genres", "is_none_of", serde_json::json!(["Horror"]))];
        assert!(evaluate_rules(&rules, RuleLogic::And, &media));
    }

    #[test]
    fn title_contains_is_case_insensitive() {
        let media = sample_media();
        let rules = vec![rule("title", "contains", serde_json::json!("matrix"))];
        assert!(evaluate_rules(&rules, RuleLogic::And, &media));
    }

    #[test]
    fn unknown_field_operator_combo_is_false_not_error() {
        let media = sample_media();
        let rules = vec![rule("genres", "gte", serde_json::json!(5))];
        assert!(!evaluate_rules(&rules, RuleLogic::And, &media));
    }

    #[test]
    fn empty_rules_are_vacuously_true() {
        let media = sample_media();
        assert!(evaluate_rules(&[], RuleLogic::And, &media));
    }

    #[test]
    fn numeric_rating_gte() {
        let media = sample_media();
        let rules = vec![rule("rating", "gte", serde_json::json!(8.0))];
        assert!(evaluate_rules(&rules, RuleLogic::And, &media));
        let rules_fail = vec![rule("rating", "gte", serde_json::json!(9.0))];
        assert!(!evaluate_rules(&rules_fail, RuleLogic::And, &media));
    }

    #[test]
    fn or_logic_matches_if_any_rule_true() {
        let media = sample_media();
        let rules = vec![
            rule("genres", "is_one_of", serde_json::json!(["Horror"])),
            rule("title", "starts_with", serde_json::json!("The")),
        ];
        assert!(evaluate_rules(&rules, RuleLogic::Or, &media));
    }

    #[test]
    fn determinism_same_inputs_same_output() {
        let media = sample_media();
        let rules = vec![rule("genres", "is_one_of", serde_json::json!(["Action"]))];
        let first = evaluate_rules(&rules, RuleLogic::And, &media);
        let second = evaluate_rules(&rules, RuleLogic::And, &media);
        assert_eq!(first, second);
    }

    proptest! {
        // §8 invariant 5: the filter engine is a pure function of
        // (metadata row, rule set, logic) — same inputs always reduce to
        // the same boolean, for any rule the compiler recognizes or not.
        #[test]
        fn prop_determinism_holds_for_arbitrary_rules(
            field in prop::sample::select(vec![
                "genres", "actors", "directors", "title", "rating",
                "release_year", "release_date", "bogus_field",
            ]),
            operator in prop::sample::select(vec![
                "is_one_of", "is_none_of", "contains", "gte", "lte", "eq",
                "starts_with", "ends_with", "in_last_days", "bogus_op",
            ]),
            value in prop::sample::select(vec![
                serde_json::json!(["Action", "Horror"]),
                serde_json::json!("Matrix"),
                serde_json::json!(8.0),
                serde_json::json!(30),
            ]),
            logic_is_and in any::<bool>(),
        ) {
            let media = sample_media();
            let rules = vec![rule(field, operator, value)];
            let logic = if logic_is_and { RuleLogic::And } else { RuleLogic::Or };

            let first = evaluate_rules(&rules, logic, &media);
            let second = evaluate_rules(&rules, logic, &media);
            prop_assert_eq!(first, second);
        }
    }
}
