//! Strategic decision records.
//!
//! `formulate_strategy` checks a set of candidate courses of action and
//! renders the selected one as a decision record for the session
//! transcript. It holds no state and schedules nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Risk rating of a course of action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Risk::Low => "Low",
            Risk::Medium => "Medium",
            Risk::High => "High",
            Risk::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// One candidate course of action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub pros: String,
    pub cons: String,
    pub risk: Risk,
}

fn default_feasible() -> bool {
    true
}

/// Input to `formulate_strategy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRequest {
    /// The blocker or decision being addressed.
    pub problem: String,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub selected_id: Option<String>,
    #[serde(default)]
    pub rationale: String,
    /// `false` ends the mission instead of selecting a candidate.
    #[serde(default = "default_feasible")]
    pub feasible: bool,
}

/// Validate a strategy request and render its decision record.
///
/// # Errors
///
/// Returns `Error::Validation` when the problem is empty, or, for a
/// feasible request, when candidates or the selection are missing, a
/// candidate id repeats, or the selected id matches no candidate.
pub fn formulate_strategy(request: &StrategyRequest) -> Result<String> {
    if request.problem.trim().is_empty() {
        return Err(Error::Validation("problem is required".to_string()));
    }

    if !request.feasible {
        return Ok(format!(
            "## Strategic Decision: TERMINATE MISSION\n**Problem:** {}\n**Rationale:** {}\n\nMission marked as infeasible.",
            request.problem, request.rationale
        ));
    }

    let selected_id = match request.selected_id.as_deref() {
        Some(id) if !id.is_empty() && !request.candidates.is_empty() => id,
        _ => {
            return Err(Error::Validation(
                "candidates and selected_id are required when feasible".to_string(),
            ))
        }
    };

    let mut seen = HashSet::new();
    for candidate in &request.candidates {
        if !seen.insert(candidate.id.as_str()) {
            return Err(Error::Validation(format!(
                "duplicate candidate id '{}'",
                candidate.id
            )));
        }
    }

    let selected = request
        .candidates
        .iter()
        .find(|c| c.id == selected_id)
        .ok_or_else(|| {
            Error::Validation(format!("selected id '{}' not found in candidates", selected_id))
        })?;

    let mut lines = vec![
        format!("## Strategic Decision: {}", selected.name),
        format!("**Problem:** {}", request.problem),
        String::new(),
        "**Considered Options:**".to_string(),
    ];

    for candidate in &request.candidates {
        if candidate.id == selected_id {
            lines.push(format!("- **{}** (SELECTED)", candidate.name));
        } else {
            lines.push(format!("- **{}**", candidate.name));
        }
        lines.push(format!("  - Pros: {}", candidate.pros));
        lines.push(format!("  - Cons: {}", candidate.cons));
        lines.push(format!("  - Risk: {}", candidate.risk));
    }

    lines.push(String::new());
    lines.push(format!("**Rationale:** {}", request.rationale));

    Ok(lines.join("\n"))
}
