//! Canonical narrative state hashing.
//!
//! Two players whose previous state and narrative variables match produce the
//! same hash and therefore share progress nodes and cached scenes.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::DomainError;
use crate::player::NarrativeState;

/// Hashes `state` reached from `previous_hash` into a lowercase hex SHA-256.
///
/// The digest covers a key-sorted JSON object holding the previous hash
/// (`_ph`), every core stat (`cs_<name>`), every non-null story variable whose
/// name does not start with `_` (`sv_<name>`) and the sorted non-transient
/// global flags (`gf`).
///
/// # Errors
///
/// Returns `DomainError::Validation` if the canonical form cannot be serialized.
pub fn compute_state_hash(previous_hash: &str, state: &NarrativeState) -> Result<String, DomainError> {
    let canonical = canonical_json(previous_hash, state)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn canonical_json(previous_hash: &str, state: &NarrativeState) -> Result<String, DomainError> {
    // serde_json's default map is ordered, so nested objects serialize sorted too.
    let mut map = Map::new();
    map.insert("_ph".to_owned(), Value::from(previous_hash));
    for (name, value) in &state.core_stats {
        map.insert(format!("cs_{name}"), Value::from(*value));
    }
    for (name, value) in &state.story_variables {
        if value.is_null() || name.starts_with('_') {
            continue;
        }
        map.insert(format!("sv_{name}"), value.clone());
    }
    let mut flags: Vec<&str> = state
        .global_flags
        .iter()
        .map(String::as_str)
        .filter(|flag| !flag.starts_with('_'))
        .collect();
    flags.sort_unstable();
    map.insert("gf".to_owned(), Value::from(flags));

    serde_json::to_string(&Value::Object(map))
        .map_err(|e| DomainError::Validation(format!("state hash serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(flags: &[&str], vars: Value) -> NarrativeState {
        NarrativeState {
            core_stats: [("courage".to_owned(), 3), ("wits".to_owned(), 5)].into(),
            story_variables: vars.as_object().cloned().unwrap_or_default(),
            global_flags: flags.iter().map(|f| (*f).to_owned()).collect(),
        }
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = compute_state_hash("initial", &NarrativeState::default()).unwrap();

        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_flag_order_does_not_matter() {
        let a = compute_state_hash("p", &state(&["met_witch", "has_key"], json!({}))).unwrap();
        let b = compute_state_hash("p", &state(&["has_key", "met_witch"], json!({}))).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_transient_and_null_values_are_ignored() {
        let plain = compute_state_hash("p", &state(&["has_key"], json!({"door": "open"}))).unwrap();
        let noisy = compute_state_hash(
            "p",
            &state(
                &["has_key", "_seen_intro"],
                json!({"door": "open", "_turn": 7, "weather": null}),
            ),
        )
        .unwrap();

        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_previous_hash_changes_identity() {
        let a = compute_state_hash("scene-a", &NarrativeState::default()).unwrap();
        let b = compute_state_hash("scene-b", &NarrativeState::default()).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_form_is_key_sorted() {
        let canonical = canonical_json("p", &state(&["z", "a"], json!({"b": 1, "a": 2}))).unwrap();

        assert_eq!(
            canonical,
            r#"{"_ph":"p","cs_courage":3,"cs_wits":5,"gf":["a","z"],"sv_a":2,"sv_b":1}"#
        );
    }
}
