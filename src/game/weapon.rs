//! Weapon catalogue

use serde::{Deserialize, Serialize};

/// Behaviour class a weapon belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponClass {
    Unarmed,
    Melee,
    Ranged,
}

/// Every weapon an entity can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Weapon {
    #[default]
    Unarmed,
    Machete,
    Revolver,
}

impl Weapon {
    pub fn class(self) -> WeaponClass {
        match self {
            Self::Unarmed => WeaponClass::Unarmed,
            Self::Machete => WeaponClass::Melee,
            Self::Revolver => WeaponClass::Ranged,
        }
    }

    /// Identifier used on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Unarmed => "NoWeapon",
            Self::Machete => "Machette",
            Self::Revolver => "Revolver",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "NoWeapon" => Some(Self::Unarmed),
            "Machette" => Some(Self::Machete),
            "Revolver" => Some(Self::Revolver),
            _ => None,
        }
    }
}
