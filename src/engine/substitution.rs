//! `#taskId#` placeholders.
//!
//! Before a leaf runs, every string in its payload is scanned for `#<id>#`. When the
//! whole string is one placeholder it becomes the referenced result as is (numbers
//! stay numbers); otherwise the result's text is spliced in. Placeholders for ids
//! without a value yet are left untouched.

use regex::{Captures, Regex};
use serde_json::Value;

use crate::graph::types::{ResultsMap, TaskId, TaskStatus};

pub struct Substitution {
    placeholder: Regex,
    whole: Regex,
}

impl Substitution {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            placeholder: Regex::new(r"#([A-Za-z0-9_.-]+)#")?,
            whole: Regex::new(r"^#([A-Za-z0-9_.-]+)#$")?,
        })
    }

    pub fn apply(&self, payload: &Value, results: &ResultsMap) -> Value {
        match payload {
            Value::String(text) => self.apply_str(text, results),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.apply(item, results))
                    .collect(),
            ),
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), self.apply(value, results)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn apply_str(&self, text: &str, results: &ResultsMap) -> Value {
        if let Some(caps) = self.whole.captures(text)
            && let Some(value) = lookup(&caps, results)
        {
            return value.clone();
        }

        let replaced = self.placeholder.replace_all(text, |caps: &Captures| {
            match lookup(caps, results) {
                Some(Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        });
        Value::String(replaced.into_owned())
    }
}

fn lookup<'a>(caps: &Captures, results: &'a ResultsMap) -> Option<&'a Value> {
    results
        .get(&TaskId::from(&caps[1]))
        .and_then(TaskStatus::value)
}
