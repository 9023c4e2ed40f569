//! The case aggregate: premise, key points, evidence and personas.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::TribunalError;
use crate::persona::{Persona, PersonaId, PersonaState};
use crate::transcript::TranscriptEntry;
use crate::turn::TurnState;

/// Numeric evidence identifier, unique within a case.
pub type EvidenceId = u32;

/// An item of evidence on record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Evidence {
    pub fn new(id: EvidenceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Story parameters and participants of one session.
///
/// Personas keep the order they were added in. The key-point cursor only
/// moves forward and stops on the last key point.
#[derive(Debug)]
pub struct Case {
    premise: String,
    key_points: Vec<String>,
    cursor: usize,
    evidence: Vec<Evidence>,
    personas: Vec<Persona>,
}

impl Case {
    pub fn new(premise: impl Into<String>, key_points: Vec<String>) -> Self {
        Self {
            premise: premise.into(),
            key_points,
            cursor: 0,
            evidence: Vec::new(),
            personas: Vec::new(),
        }
    }

    pub fn premise(&self) -> &str {
        &self.premise
    }

    pub fn key_points(&self) -> &[String] {
        &self.key_points
    }

    pub fn key_point_cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_key_point(&self) -> Option<&str> {
        self.key_points.get(self.cursor).map(String::as_str)
    }

    /// Moves to the next key point. Returns `false` when already on the last.
    pub fn advance_key_point(&mut self) -> bool {
        if self.cursor + 1 < self.key_points.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn evidence_names(&self) -> Vec<String> {
        self.evidence.iter().map(|item| item.name.clone()).collect()
    }

    pub fn add_evidence(&mut self, evidence: Evidence) -> Result<(), TribunalError> {
        if self.evidence.iter().any(|item| item.id == evidence.id) {
            return Err(TribunalError::DuplicateEvidence(evidence.id));
        }
        self.evidence.push(evidence);
        Ok(())
    }

    pub fn add_persona(&mut self, persona: Persona) -> Result<(), TribunalError> {
        if self.persona(persona.id()).is_some() {
            return Err(TribunalError::DuplicatePersona(persona.id()));
        }
        self.personas.push(persona);
        Ok(())
    }

    pub fn persona(&self, id: PersonaId) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id() == id)
    }

    pub fn persona_mut(&mut self, id: PersonaId) -> Option<&mut Persona> {
        self.personas.iter_mut().find(|p| p.id() == id)
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn personas_mut(&mut self) -> impl Iterator<Item = &mut Persona> {
        self.personas.iter_mut()
    }

    /// The first human persona, if the case has one.
    pub fn human(&self) -> Option<&Persona> {
        self.personas.iter().find(|p| p.is_human())
    }

    pub fn persona_ids(&self) -> HashSet<PersonaId> {
        self.personas.iter().map(Persona::id).collect()
    }
}

/// Serializable snapshot of a running case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseState {
    pub premise: String,
    pub key_points: Vec<String>,
    pub key_point_cursor: usize,
    pub current_key_point: Option<String>,
    pub evidence: Vec<Evidence>,
    pub personas: Vec<PersonaState>,
    pub turn: TurnState,
    pub messages_sent: usize,
    /// The prompting window of the transcript.
    pub recent_transcript: Vec<TranscriptEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{PersonaProfile, Role};

    #[test]
    fn test_key_point_cursor_never_wraps() {
        let mut case = Case::new(
            "Murder at the hotel",
            vec!["Alibi".into(), "Weapon".into()],
        );
        assert_eq!(case.current_key_point(), Some("Alibi"));
        assert!(case.advance_key_point());
        assert_eq!(case.current_key_point(), Some("Weapon"));
        assert!(!case.advance_key_point());
        assert!(!case.advance_key_point());
        assert_eq!(case.key_point_cursor(), 1);
    }

    #[test]
    fn test_case_without_key_points() {
        let mut case = Case::new("Premise", Vec::new());
        assert_eq!(case.current_key_point(), None);
        assert!(!case.advance_key_point());
        assert_eq!(case.key_point_cursor(), 0);
    }

    #[test]
    fn test_evidence_ids_are_unique() {
        let mut case = Case::new("Premise", Vec::new());
        case.add_evidence(Evidence::new(1, "Autopsy Report")).unwrap();
        case.add_evidence(Evidence::new(2, "Glass Shard")).unwrap();
        let err = case.add_evidence(Evidence::new(1, "Forgery")).unwrap_err();
        assert!(matches!(err, TribunalError::DuplicateEvidence(1)));
        assert_eq!(case.evidence_names(), vec!["Autopsy Report", "Glass Shard"]);
    }

    #[test]
    fn test_persona_ids_are_unique() {
        let mut case = Case::new("Premise", Vec::new());
        case.add_persona(Persona::new(PersonaProfile::ai(10, "Judge", Role::Judge), None))
            .unwrap();
        let err = case
            .add_persona(Persona::new(PersonaProfile::ai(10, "Clone", Role::Witness), None))
            .unwrap_err();
        assert!(matches!(err, TribunalError::DuplicatePersona(10)));
        assert_eq!(case.personas().len(), 1);
        assert!(case.human().is_none());
    }
}
