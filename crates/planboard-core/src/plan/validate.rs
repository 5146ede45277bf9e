//! Turning untrusted model text into a [`Plan`].
//!
//! Parsing: the whole payload is tried as JSON first; failing that, the
//! first balanced `{...}` or `[...]` substring is tried once. Validation then
//! walks the value and collects every violation it finds (with a field path)
//! instead of stopping at the first one. References are resolved and the
//! resulting graph is checked for cycles before anything is accepted.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use super::schema::{Plan, PlanValidationError, PlannedMilestone, PlannedTask};
use crate::config::EffortLimits;
use crate::error::Violation;
use crate::graph::find_cycle;

const TITLE_KEYS: &[&str] = &["title", "name"];
const MILESTONE_NAME_KEYS: &[&str] = &["name", "title"];
const SUMMARY_KEYS: &[&str] = &["summary", "description"];
const DESCRIPTION_KEYS: &[&str] = &["description", "details"];
const EFFORT_KEYS: &[&str] = &[
    "effort_hours",
    "effort",
    "estimate_hours",
    "estimated_hours",
    "hours",
];
const DEPENDS_KEYS: &[&str] = &["depends_on", "dependencies", "deps"];

/// Parse and validate raw model output.
pub fn validate(raw: &str, limits: &EffortLimits) -> Result<Plan, PlanValidationError> {
    let value = parse_candidate(raw)?;
    validate_value(&value, limits)
}

/// Recover a JSON value from model text: strict parse, then one attempt on
/// the first embedded object or array that parses.
pub fn parse_candidate(raw: &str) -> Result<Value, PlanValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PlanValidationError::malformed("response is empty"));
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let Some(candidate) = extract_json(trimmed) else {
        return Err(PlanValidationError::malformed(
            "response contains no parseable JSON object or array",
        ));
    };
    serde_json::from_str(candidate).map_err(|e| {
        PlanValidationError::malformed(format!("embedded JSON does not parse: {e}"))
    })
}

/// The first balanced `{...}` or `[...]` substring of `text` that parses as
/// JSON. Openers whose balanced span is not JSON, such as `[draft 1]` in
/// surrounding prose, are skipped.
pub fn extract_json(text: &str) -> Option<&str> {
    text.char_indices()
        .filter(|&(_, ch)| matches!(ch, '{' | '['))
        .filter_map(|(start, _)| balanced_prefix(&text[start..]))
        .find(|candidate| serde_json::from_str::<Value>(candidate).is_ok())
}

/// The balanced bracket span at the start of `text`, skipping brackets
/// inside JSON strings. `None` if it is never closed.
fn balanced_prefix(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A task as read from the response, before references are resolved.
struct TaskDraft {
    milestone: usize,
    path: String,
    key: String,
    title: String,
    description: Option<String>,
    effort_hours: f64,
    /// `(path, reference)` for every entry of `depends_on`.
    refs: Vec<(String, String)>,
}

enum Resolution {
    Found(usize),
    Unknown,
    Ambiguous,
}

/// Validate an already-parsed value. Accepts either `{ "milestones": [...] }`
/// or a bare milestones array.
pub fn validate_value(value: &Value, limits: &EffortLimits) -> Result<Plan, PlanValidationError> {
    let mut violations = Vec::new();

    let items: &[Value] = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("milestones") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => {
                violations.push(Violation::new("milestones", "is required"));
                &[]
            }
            Some(_) => {
                violations.push(Violation::new("milestones", "must be an array"));
                &[]
            }
        },
        _ => {
            violations.push(Violation::new(
                "$",
                "expected an object with a `milestones` array",
            ));
            &[]
        }
    };
    if violations.is_empty() && items.is_empty() {
        violations.push(Violation::new("milestones", "must not be empty"));
    }

    let mut headers: Vec<(String, Option<String>)> = Vec::with_capacity(items.len());
    let mut drafts: Vec<TaskDraft> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let path = format!("milestones[{i}]");
        let Some(obj) = item.as_object() else {
            violations.push(Violation::new(path, "must be an object"));
            headers.push((String::new(), None));
            continue;
        };

        let name = required_text(obj, MILESTONE_NAME_KEYS, &format!("{path}.name"), &mut violations);
        let summary = optional_text(obj, SUMMARY_KEYS);
        headers.push((name, summary));

        let tasks: &[Value] = match obj.get("tasks") {
            Some(Value::Array(tasks)) => tasks.as_slice(),
            Some(Value::Null) | None => {
                violations.push(Violation::new(format!("{path}.tasks"), "is required"));
                &[]
            }
            Some(_) => {
                violations.push(Violation::new(format!("{path}.tasks"), "must be an array"));
                &[]
            }
        };
        for (j, task) in tasks.iter().enumerate() {
            let task_path = format!("{path}.tasks[{j}]");
            if let Some(draft) = read_task(task, i, task_path, limits, &mut violations) {
                drafts.push(draft);
            }
        }
    }

    if !items.is_empty() && drafts.is_empty() {
        violations.push(Violation::new("milestones", "plan contains no tasks"));
    }

    // Local keys must be unique within the response.
    let mut by_key: HashMap<&str, usize> = HashMap::new();
    for (idx, draft) in drafts.iter().enumerate() {
        if draft.key.is_empty() {
            continue;
        }
        if let Some(&first) = by_key.get(draft.key.as_str()) {
            violations.push(Violation::new(
                draft.path.clone(),
                format!(
                    "duplicate task reference {:?} (also used by {})",
                    draft.key, drafts[first].path
                ),
            ));
        } else {
            by_key.insert(&draft.key, idx);
        }
    }

    let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, draft) in drafts.iter().enumerate() {
        let out = adjacency.entry(idx).or_default();
        for (ref_path, reference) in &draft.refs {
            match resolve(reference, &drafts, &by_key) {
                Resolution::Found(target) => {
                    if !out.contains(&target) {
                        out.push(target);
                    }
                }
                Resolution::Unknown => violations.push(Violation::new(
                    ref_path.clone(),
                    format!("unknown task reference {reference:?}"),
                )),
                Resolution::Ambiguous => violations.push(Violation::new(
                    ref_path.clone(),
                    format!("ambiguous task reference {reference:?}"),
                )),
            }
        }
    }

    if !violations.is_empty() {
        return Err(PlanValidationError::invalid(violations));
    }

    if let Some(cycle) = find_cycle(&adjacency) {
        let titles: Vec<&str> = cycle.iter().map(|&i| drafts[i].title.as_str()).collect();
        let first = cycle.first().copied().unwrap_or_default();
        return Err(PlanValidationError::cyclic(Violation::new(
            format!("{}.depends_on", drafts[first].path),
            format!("dependency cycle: {}", titles.join(" -> ")),
        )));
    }

    let mut milestones: Vec<PlannedMilestone> = headers
        .into_iter()
        .map(|(name, summary)| PlannedMilestone {
            name,
            summary,
            tasks: Vec::new(),
        })
        .collect();
    for (idx, draft) in drafts.iter().enumerate() {
        let depends_on = adjacency
            .get(&idx)
            .into_iter()
            .flatten()
            .map(|&d| drafts[d].key.clone())
            .collect();
        if let Some(m) = milestones.get_mut(draft.milestone) {
            m.tasks.push(PlannedTask {
                key: draft.key.clone(),
                title: draft.title.clone(),
                description: draft.description.clone(),
                effort_hours: draft.effort_hours,
                depends_on,
            });
        }
    }

    Ok(Plan { milestones })
}

fn read_task(
    value: &Value,
    milestone: usize,
    path: String,
    limits: &EffortLimits,
    violations: &mut Vec<Violation>,
) -> Option<TaskDraft> {
    let Some(obj) = value.as_object() else {
        violations.push(Violation::new(path, "must be an object"));
        return None;
    };

    let title = required_text(obj, TITLE_KEYS, &format!("{path}.title"), violations);
    let description = optional_text(obj, DESCRIPTION_KEYS);
    let key = obj
        .get("id")
        .and_then(local_id)
        .unwrap_or_else(|| title.clone());

    let effort_path = format!("{path}.effort_hours");
    let effort_hours = match first_present(obj, EFFORT_KEYS) {
        None => {
            violations.push(Violation::new(effort_path, "is required"));
            0.0
        }
        Some(v) => match coerce_effort(v, limits) {
            Ok(hours) => hours,
            Err(reason) => {
                violations.push(Violation::new(effort_path, reason));
                0.0
            }
        },
    };

    let deps_path = format!("{path}.depends_on");
    let refs = match first_present(obj, DEPENDS_KEYS) {
        None => Vec::new(),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            vec![(format!("{deps_path}[0]"), s.trim().to_owned())]
        }
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(k, item)| {
                let item_path = format!("{deps_path}[{k}]");
                match local_id(item) {
                    Some(reference) => Some((item_path, reference)),
                    None => {
                        violations.push(Violation::new(
                            item_path,
                            "must be a non-empty task reference",
                        ));
                        None
                    }
                }
            })
            .collect(),
        Some(_) => {
            violations.push(Violation::new(
                deps_path,
                "must be an array of task references",
            ));
            Vec::new()
        }
    };

    Some(TaskDraft {
        milestone,
        path,
        key,
        title,
        description,
        effort_hours,
        refs,
    })
}

/// Coerce an effort value to hours within `limits`.
///
/// Numbers and numeric strings with an optional hour suffix (`"4"`, `"4h"`,
/// `"2.5 hours"`) are accepted. Zero, negative, and non-finite values are
/// errors; positive values outside the limits are clamped.
pub fn coerce_effort(value: &Value, limits: &EffortLimits) -> Result<f64, String> {
    let hours = match value {
        Value::Number(n) => n.as_f64().ok_or("must be a number of hours")?,
        Value::String(s) => {
            parse_hours(s).ok_or_else(|| format!("{s:?} is not a number of hours"))?
        }
        _ => return Err("must be a number of hours".to_owned()),
    };
    if !hours.is_finite() {
        return Err("must be a finite number of hours".to_owned());
    }
    if hours <= 0.0 {
        return Err(format!("must be positive, got {hours}"));
    }
    Ok(hours.clamp(limits.min_hours, limits.max_hours))
}

fn parse_hours(s: &str) -> Option<f64> {
    let lower = s.trim().to_ascii_lowercase();
    let number = ["hours", "hour", "hrs", "hr", "h"]
        .iter()
        .find_map(|suffix| lower.strip_suffix(suffix))
        .unwrap_or(&lower);
    number.trim().parse().ok()
}

fn resolve(reference: &str, drafts: &[TaskDraft], by_key: &HashMap<&str, usize>) -> Resolution {
    if let Some(&idx) = by_key.get(reference) {
        return Resolution::Found(idx);
    }

    let by_title: Vec<usize> = (0..drafts.len())
        .filter(|&i| drafts[i].title == reference)
        .collect();
    match by_title.as_slice() {
        [only] => return Resolution::Found(*only),
        [] => {}
        _ => return Resolution::Ambiguous,
    }

    let lower = reference.to_lowercase();
    let loose: Vec<usize> = (0..drafts.len())
        .filter(|&i| {
            drafts[i].key.to_lowercase() == lower || drafts[i].title.to_lowercase() == lower
        })
        .collect();
    match loose.as_slice() {
        [only] => Resolution::Found(*only),
        [] => Resolution::Unknown,
        _ => Resolution::Ambiguous,
    }
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn required_text(
    obj: &Map<String, Value>,
    keys: &[&str],
    path: &str,
    violations: &mut Vec<Violation>,
) -> String {
    match first_present(obj, keys) {
        None => {
            violations.push(Violation::new(path, "is required"));
            String::new()
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            violations.push(Violation::new(path, "must not be empty"));
            String::new()
        }
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(_) => {
            violations.push(Violation::new(path, "must be a string"));
            String::new()
        }
    }
}

fn optional_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(obj, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn local_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
