//! The per-location lifecycle, expressed as an explicit enum with a
//! fallible `transition` rather than implicit boolean flags.
//!
//! Only `Running`/`Stopped` are ever persisted on a `DeploymentLocation`
//! row; `Absent`, `Created`, and `Removed` are the transient states either
//! side of a row's existence.

use crate::error::{DeployError, Result};
use orc_types::LocationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationState {
    Absent,
    Created,
    Running,
    Stopped,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationEvent {
    Create,
    Start,
    Stop,
    Delete,
    HealthCheckFailed,
}

impl From<LocationStatus> for LocationState {
    fn from(status: LocationStatus) -> Self {
        match status {
            LocationStatus::Running => LocationState::Running,
            LocationStatus::Stopped => LocationState::Stopped,
        }
    }
}

impl LocationState {
    pub fn as_persisted(self) -> Option<LocationStatus> {
        match self {
            LocationState::Running => Some(LocationStatus::Running),
            LocationState::Stopped => Some(LocationStatus::Stopped),
            LocationState::Absent | LocationState::Created | LocationState::Removed => None,
        }
    }

    /// Applies `event`, returning the resulting state or an error for an
    /// illegal transition. Stop and Delete are idempotent no-ops from any
    /// state they can reach; Start on an already-`Running` location is a
    /// no-op too.
    pub fn transition(self, event: LocationEvent) -> Result<LocationState> {
        use LocationEvent::*;
        use LocationState::*;
        match (self, event) {
            (Absent, Create) => Ok(Created),
            (Created, Start) => Ok(Running),
            (Running, Start) => Ok(Running),
            (Stopped, Start) => Ok(Running),
            (Created, Stop) => Ok(Stopped),
            (Running, Stop) => Ok(Stopped),
            (Running, HealthCheckFailed) => Ok(Stopped),
            (Stopped, Stop) => Ok(Stopped),
            (Absent, Stop) => Ok(Absent),
            (_, Delete) => Ok(Removed),
            (state, event) => {
                Err(DeployError::IllegalTransition { state: format!("{state:?}"), event: format!("{event:?}") })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_from_absent_yields_created() {
        assert_eq!(LocationState::Absent.transition(LocationEvent::Create).unwrap(), LocationState::Created);
    }

    #[test]
    fn start_on_running_is_a_noop() {
        assert_eq!(LocationState::Running.transition(LocationEvent::Start).unwrap(), LocationState::Running);
    }

    #[test]
    fn stop_on_stopped_is_a_noop() {
        assert_eq!(LocationState::Stopped.transition(LocationEvent::Stop).unwrap(), LocationState::Stopped);
    }

    #[test]
    fn delete_from_any_state_succeeds() {
        for state in [LocationState::Absent, LocationState::Created, LocationState::Running, LocationState::Stopped, LocationState::Removed] {
            assert_eq!(state.transition(LocationEvent::Delete).unwrap(), LocationState::Removed);
        }
    }

    #[test]
    fn start_from_absent_is_illegal() {
        assert!(LocationState::Absent.transition(LocationEvent::Start).is_err());
    }

    #[test]
    fn healthcheck_failure_stops_a_running_location() {
        assert_eq!(
            LocationState::Running.transition(LocationEvent::HealthCheckFailed).unwrap(),
            LocationState::Stopped
        );
    }

    #[test]
    fn persisted_status_maps_only_running_and_stopped() {
        assert_eq!(LocationState::Running.as_persisted(), Some(LocationStatus::Running));
        assert_eq!(LocationState::Stopped.as_persisted(), Some(LocationStatus::Stopped));
        assert_eq!(LocationState::Created.as_persisted(), None);
    }
}
