// Unit-side value types the engine depends on

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Name of a unit, e.g. `postgresql.service`. Units are externally defined;
/// the engine addresses them only by name and through the vtable port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitName(String);

impl UnitName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Activation state of a unit as reported by its vtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveState {
    Inactive,
    Activating,
    Active,
    Reloading,
    Deactivating,
    Failed,
}

impl ActiveState {
    /// The unit is up, or up and re-reading its configuration.
    pub fn is_active_or_reloading(self) -> bool {
        matches!(self, ActiveState::Active | ActiveState::Reloading)
    }

    /// The unit is down for good, one way or the other.
    pub fn is_inactive_or_failed(self) -> bool {
        matches!(self, ActiveState::Inactive | ActiveState::Failed)
    }

    /// The unit is down or on its way down.
    pub fn is_inactive_or_deactivating(self) -> bool {
        matches!(
            self,
            ActiveState::Inactive | ActiveState::Failed | ActiveState::Deactivating
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActiveState::Inactive => "inactive",
            ActiveState::Activating => "activating",
            ActiveState::Active => "active",
            ActiveState::Reloading => "reloading",
            ActiveState::Deactivating => "deactivating",
            ActiveState::Failed => "failed",
        }
    }

    pub const ALL: [ActiveState; 6] = [
        ActiveState::Inactive,
        ActiveState::Activating,
        ActiveState::Active,
        ActiveState::Reloading,
        ActiveState::Deactivating,
        ActiveState::Failed,
    ];
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActiveState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(ActiveState::Inactive),
            "activating" => Ok(ActiveState::Activating),
            "active" => Ok(ActiveState::Active),
            "reloading" => Ok(ActiveState::Reloading),
            "deactivating" => Ok(ActiveState::Deactivating),
            "failed" => Ok(ActiveState::Failed),
            _ => Err(DomainError::UnknownActiveState(s.to_string())),
        }
    }
}

/// The dependency edge sets a unit exposes to the engine.
///
/// `After`/`Before` drive the runnability predicate; the remaining kinds
/// drive failure propagation on job completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    After,
    Before,
    RequiredBy,
    RequiredByOverridable,
    BoundBy,
    ConflictedBy,
}

/// Manager-level reaction to a job timeout, declared per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmergencyAction {
    None,
    Reboot,
    RebootForce,
    RebootImmediate,
    Poweroff,
    PoweroffForce,
    Exit,
}

impl EmergencyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            EmergencyAction::None => "none",
            EmergencyAction::Reboot => "reboot",
            EmergencyAction::RebootForce => "reboot-force",
            EmergencyAction::RebootImmediate => "reboot-immediate",
            EmergencyAction::Poweroff => "poweroff",
            EmergencyAction::PoweroffForce => "poweroff-force",
            EmergencyAction::Exit => "exit",
        }
    }
}

impl fmt::Display for EmergencyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmergencyAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EmergencyAction::None),
            "reboot" => Ok(EmergencyAction::Reboot),
            "reboot-force" => Ok(EmergencyAction::RebootForce),
            "reboot-immediate" => Ok(EmergencyAction::RebootImmediate),
            "poweroff" => Ok(EmergencyAction::Poweroff),
            "poweroff-force" => Ok(EmergencyAction::PoweroffForce),
            "exit" => Ok(EmergencyAction::Exit),
            _ => Err(DomainError::UnknownEmergencyAction(s.to_string())),
        }
    }
}
