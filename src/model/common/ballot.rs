use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::model::mongodb::Id;

/// A ballot as submitted: position name to candidate ID to count.
pub type RawSelections = HashMap<String, HashMap<String, i64>>;

/// A checked ballot: exactly one candidate for each position.
pub type Selections = BTreeMap<String, Id>;

/// The candidates standing for each currently-defined position.
pub type PositionCandidates = HashMap<String, HashSet<Id>>;

/// Check that a ballot names exactly the defined positions, with a single
/// candidate counted once for each, and that every candidate stands for the
/// position they were chosen for.
///
/// The first problem found is reported, naming the offending position.
pub fn validate_selections(
    raw: &RawSelections,
    positions: &PositionCandidates,
) -> Result<Selections> {
    if positions.is_empty() {
        return Err(Error::Validation(
            "No positions are open for voting".to_string(),
        ));
    }

    let mut defined: Vec<&String> = positions.keys().collect();
    defined.sort();
    if let Some(missing) = defined.iter().find(|p| !raw.contains_key(p.as_str())) {
        return Err(Error::Validation(format!(
            "Ballot has no vote for position '{missing}'"
        )));
    }

    let mut submitted: Vec<&String> = raw.keys().collect();
    submitted.sort();
    if let Some(extra) = submitted.iter().find(|p| !positions.contains_key(p.as_str())) {
        return Err(Error::Validation(format!(
            "Ballot names unknown position '{extra}'"
        )));
    }

    let mut selections = Selections::new();
    for position in defined {
        let choices = &raw[position];
        let (candidate, count) = match choices.iter().next() {
            Some(choice) if choices.len() == 1 => choice,
            _ => {
                return Err(Error::Validation(format!(
                    "Position '{position}' must have exactly one candidate, got {}",
                    choices.len()
                )))
            }
        };
        if *count != 1 {
            return Err(Error::Validation(format!(
                "Position '{position}' has a count of {count}, expected 1"
            )));
        }
        let candidate_id: Id = candidate.parse().map_err(|_| {
            Error::Validation(format!(
                "Position '{position}' names malformed candidate ID '{candidate}'"
            ))
        })?;
        if !positions[position].contains(&candidate_id) {
            return Err(Error::Validation(format!(
                "Candidate {candidate_id} is not standing for position '{position}'"
            )));
        }
        selections.insert(position.clone(), candidate_id);
    }

    Ok(selections)
}

/// The candidate a vote for `selected` is tallied under.
///
/// Votes are always tallied exactly as cast, whatever flags are set on the
/// candidates for `position`.
pub fn resolve_final_candidate(_position: &str, selected: Id) -> Id {
    selected
}
