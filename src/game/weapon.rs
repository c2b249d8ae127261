//! Weapon archetypes - static per-weapon balance data looked up by key

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// How an archetype resolves attacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    /// Instant range + facing check on each attack input
    Melee,
    /// Melee whose client animation streams hitbox samples; also accepts instant attacks
    SwingMelee,
    /// Spawns a projectile on each attack input
    Ranged,
}

impl WeaponKind {
    /// Whether hitbox swing samples are accepted for this kind
    pub fn tracks_swings(self) -> bool {
        matches!(self, Self::SwingMelee)
    }
}

/// Immutable balance data for one weapon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponArchetype {
    pub name: String,
    pub kind: WeaponKind,
    /// Damage per hit
    pub damage: f32,
    /// Melee reach, or maximum projectile travel for ranged weapons
    pub range: f32,
    /// Minimum time between attacks (milliseconds)
    pub cooldown_ms: u64,
    /// Projectile speed in units per second (ranged only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projectile_speed: Option<f32>,
}

impl WeaponArchetype {
    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::WeaponArchetype {
            key: key.to_string(),
            reason,
        };
        if !(self.damage.is_finite() && self.damage > 0.0) {
            return Err(invalid("damage must be positive"));
        }
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(invalid("range must be positive"));
        }
        match (self.kind, self.projectile_speed) {
            (WeaponKind::Ranged, Some(speed)) if speed.is_finite() && speed > 0.0 => Ok(()),
            (WeaponKind::Ranged, _) => Err(invalid("ranged weapons need a positive projectile_speed")),
            _ => Ok(()),
        }
    }
}

/// Archetypes keyed by the weapon key a player picks in the lobby
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeaponTable {
    archetypes: BTreeMap<String, WeaponArchetype>,
}

impl WeaponTable {
    /// Build a table, rejecting archetypes that could not be simulated
    pub fn new(archetypes: BTreeMap<String, WeaponArchetype>) -> Result<Self, ConfigError> {
        for (key, archetype) in &archetypes {
            archetype.validate(key)?;
        }
        Ok(Self { archetypes })
    }

    /// Parse a JSON object of `key -> archetype`
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let archetypes: BTreeMap<String, WeaponArchetype> = serde_json::from_str(json)?;
        Self::new(archetypes)
    }

    pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::WeaponFile {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn get(&self, key: &str) -> Option<&WeaponArchetype> {
        self.archetypes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.archetypes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.archetypes.keys().map(String::as_str)
    }
}

impl Default for WeaponTable {
    fn default() -> Self {
        let mut archetypes = BTreeMap::new();
        archetypes.insert(
            "sword".to_string(),
            WeaponArchetype {
                name: "Sword".to_string(),
                kind: WeaponKind::SwingMelee,
                damage: 20.0,
                range: 2.5,
                cooldown_ms: 600,
                projectile_speed: None,
            },
        );
        archetypes.insert(
            "spear".to_string(),
            WeaponArchetype {
                name: "Spear".to_string(),
                kind: WeaponKind::Melee,
                damage: 15.0,
                range: 3.5,
                cooldown_ms: 800,
                projectile_speed: None,
            },
        );
        archetypes.insert(
            "bow".to_string(),
            WeaponArchetype {
                name: "Bow".to_string(),
                kind: WeaponKind::Ranged,
                damage: 12.0,
                range: 30.0,
                cooldown_ms: 1000,
                projectile_speed: Some(25.0),
            },
        );
        Self { archetypes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_three_valid_archetypes() {
        let table = WeaponTable::default();
        assert_eq!(table.len(), 3);
        for key in ["sword", "spear", "bow"] {
            let archetype = table.get(key).unwrap();
            assert!(archetype.validate(key).is_ok());
        }
        assert!(table.get("bow").unwrap().projectile_speed.is_some());
        assert!(table.get("sword").unwrap().kind.tracks_swings());
        assert!(!table.get("spear").unwrap().kind.tracks_swings());
    }

    #[test]
    fn parses_table_from_json() {
        let table = WeaponTable::from_json(
            r#"{
                "club": {"name": "Club", "kind": "melee", "damage": 7, "range": 6, "cooldown_ms": 1000},
                "sling": {"name": "Sling", "kind": "ranged", "damage": 5, "range": 12, "cooldown_ms": 700, "projectile_speed": 18}
            }"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("club").unwrap().cooldown_ms, 1000);
        assert_eq!(table.get("sling").unwrap().projectile_speed, Some(18.0));
        assert!(table.get("sword").is_none());
    }

    #[test]
    fn ranged_without_speed_is_rejected() {
        let err = WeaponTable::from_json(
            r#"{"bow": {"name": "Bow", "kind": "ranged", "damage": 5, "range": 12, "cooldown_ms": 700}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::WeaponArchetype { .. }));
    }

    #[test]
    fn non_positive_damage_is_rejected() {
        let err = WeaponTable::from_json(
            r#"{"stick": {"name": "Stick", "kind": "melee", "damage": 0, "range": 1, "cooldown_ms": 100}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::WeaponArchetype { .. }));
    }
}
