//! Read-only catalog of persona presets.
//!
//! A preset is an externally defined identity/appearance template. The catalog
//! is loaded once before any case is created and only answers lookups; it
//! never changes during a session.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::TribunalError;
use crate::persona::{PersonaId, Role};

/// Numeric preset identifier.
pub type PresetId = u32;

/// Numeric pose identifier.
pub type PoseId = u32;

/// One pose a preset can be displayed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pose {
    pub id: PoseId,
    pub name: String,
}

/// A cataloged identity template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub id: PresetId,
    pub name: String,
    /// Role-side tag, e.g. `"prosecution"`, `"bench"`, `"witness"`.
    pub side: String,
    /// Valid poses, in catalog order.
    #[serde(default)]
    pub poses: Vec<Pose>,
}

impl Preset {
    pub fn pose_ids(&self) -> Vec<PoseId> {
        self.poses.iter().map(|pose| pose.id).collect()
    }

    pub fn has_pose(&self, pose: PoseId) -> bool {
        self.poses.iter().any(|p| p.id == pose)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    presets: Vec<Preset>,
    #[serde(default)]
    reserved: Vec<PresetId>,
    player_preset: Option<PresetId>,
}

/// Lookup table of presets keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
    reserved: BTreeSet<PresetId>,
    player_preset: Option<PresetId>,
}

impl PresetCatalog {
    /// Builds a catalog from presets and the ids that may never be handed out
    /// to AI personas.
    pub fn new(presets: Vec<Preset>, reserved: impl IntoIterator<Item = PresetId>) -> Self {
        Self {
            presets,
            reserved: reserved.into_iter().collect(),
            player_preset: None,
        }
    }

    /// Marks the preset used by the human player. It is implicitly reserved.
    pub fn with_player_preset(mut self, id: PresetId) -> Self {
        self.reserved.insert(id);
        self.player_preset = Some(id);
        self
    }

    /// Loads a catalog from JSON of the form
    /// `{"presets": [...], "reserved": [..], "player_preset": 1}`.
    pub fn from_json_str(json: &str) -> Result<Self, TribunalError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let catalog = Self::new(file.presets, file.reserved);
        Ok(match file.player_preset {
            Some(id) => catalog.with_player_preset(id),
            None => catalog,
        })
    }

    pub fn get(&self, id: PresetId) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn is_reserved(&self, id: PresetId) -> bool {
        self.reserved.contains(&id)
    }

    pub fn player_preset_id(&self) -> Option<PresetId> {
        self.player_preset
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Resolves the preset for an AI persona.
    ///
    /// A requested id is kept when it exists, is not reserved and is not yet
    /// claimed. Otherwise the first free preset on the role's side is chosen,
    /// then the first free preset on any side.
    pub fn assign(
        &self,
        persona: PersonaId,
        name: &str,
        requested: Option<PresetId>,
        role: Role,
        claimed: &HashSet<PresetId>,
    ) -> Result<PresetId, TribunalError> {
        let assignable = |id: PresetId| {
            !self.is_reserved(id) && !claimed.contains(&id) && self.get(id).is_some()
        };

        if let Some(id) = requested {
            if assignable(id) {
                return Ok(id);
            }
            tracing::debug!(
                target: "tribunal::catalog",
                persona,
                requested = id,
                "requested preset is reserved, unknown or taken; reassigning"
            );
        }

        let side = role.side();
        self.presets
            .iter()
            .filter(|preset| assignable(preset.id))
            .find(|preset| side.is_some_and(|side| preset.side.eq_ignore_ascii_case(side)))
            .or_else(|| self.presets.iter().find(|preset| assignable(preset.id)))
            .map(|preset| preset.id)
            .ok_or_else(|| TribunalError::NoPresetAvailable {
                persona,
                name: name.to_string(),
            })
    }
}
