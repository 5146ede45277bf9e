//! Prompt construction. Pure string building, no I/O.

use crate::error::Violation;

/// Fixed system instruction: the JSON shape wanted back and the sizing
/// constraints.
pub const SYSTEM_PROMPT: &str = "\
You are a project planning assistant. Return only JSON, with no prose before \
or after it, in exactly this shape:

{\"milestones\": [{\"name\": string, \"summary\": string, \"tasks\": [{\"id\": string, \
\"title\": string, \"description\": string, \"effort_hours\": number, \
\"depends_on\": [string]}]}]}

Rules:
- Milestones are listed in the order they should be delivered.
- Every task has a short unique id; depends_on lists ids of other tasks in \
this response that must be finished first. Omit it or use [] when there are none.
- Dependencies must not form a cycle.
- Keep tasks small: 2-6 hours each. Assume a team of 1-3 people.
- Keep it minimal and actionable.";

/// User instruction for a planning request.
pub fn user_prompt(objective: &str, days: i64, team_size: Option<i64>) -> String {
    let team = match team_size {
        Some(1) => "Assume a team of 1 person.".to_owned(),
        Some(n) => format!("Assume a team of {n} people."),
        None => "Assume a small team of 1-3 people.".to_owned(),
    };
    format!(
        "Goal: {}\nTimeframe: {days} days. {team} Keep units small (2-6h tasks).",
        objective.trim()
    )
}

/// User instruction for the single repair attempt: the original request plus
/// the reasons the previous answer was rejected.
pub fn repair_prompt(user: &str, violations: &[Violation]) -> String {
    let mut prompt = String::with_capacity(user.len() + 64 * violations.len() + 128);
    prompt.push_str(user);
    prompt.push_str(
        "\n\nYour previous answer was rejected for these reasons:\n",
    );
    for v in violations {
        prompt.push_str("- ");
        prompt.push_str(&v.to_string());
        prompt.push('\n');
    }
    prompt.push_str("Return the corrected plan as JSON only.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_states_schema_and_sizing() {
        assert!(SYSTEM_PROMPT.contains("\"milestones\""));
        assert!(SYSTEM_PROMPT.contains("depends_on"));
        assert!(SYSTEM_PROMPT.contains("2-6 hours"));
        assert!(SYSTEM_PROMPT.contains("team of 1-3"));
    }

    #[test]
    fn user_prompt_interpolates_objective_and_days() {
        let p = user_prompt("  Launch MVP website ", 14, None);
        assert_eq!(
            p,
            "Goal: Launch MVP website\nTimeframe: 14 days. Assume a small team of 1-3 people. \
             Keep units small (2-6h tasks)."
        );
    }

    #[test]
    fn user_prompt_uses_team_size() {
        assert!(user_prompt("x", 3, Some(5)).contains("team of 5 people"));
        assert!(user_prompt("x", 3, Some(1)).contains("team of 1 person"));
    }

    #[test]
    fn repair_prompt_appends_violations() {
        let p = repair_prompt(
            "Goal: x",
            &[Violation::new("milestones[0].tasks[0].effort_hours", "is required")],
        );
        assert!(p.starts_with("Goal: x\n\n"));
        assert!(p.contains("- milestones[0].tasks[0].effort_hours: is required\n"));
        assert!(p.ends_with("JSON only."));
    }
}
