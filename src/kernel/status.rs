use core::fmt;

use spin::Mutex;

use crate::error::SetupError;

pub const MAX_COMPONENTS: usize = 16;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(SetupError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

/// Fixed-capacity list of named components, in registration order.
pub struct StatusRegistry {
    slots: [Option<ComponentStatus>; MAX_COMPONENTS],
}

impl StatusRegistry {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_COMPONENTS],
        }
    }

    /// Registering a name twice is a no-op.
    pub fn register(&mut self, name: &'static str) -> Result<(), SetupError> {
        if self.get(name).is_some() {
            return Ok(());
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(SetupError::TooManyPhases)?;
        *slot = Some(ComponentStatus::new(name));
        Ok(())
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) {
        if let Some(component) = self.iter_mut().find(|c| c.name == name) {
            component.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentStatus> {
        self.iter().find(|c| c.name == name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.slots.iter().flatten()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ComponentStatus> {
        self.slots.iter_mut().flatten()
    }

    pub fn all_ready(&self) -> bool {
        self.iter().next().is_some() && self.first_unfinished().is_none()
    }

    /// First component, in registration order, that has not completed.
    pub fn first_unfinished(&self) -> Option<ComponentStatus> {
        self.iter().find(|c| !c.is_complete()).copied()
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static INIT_STATUS: Mutex<StatusRegistry> = Mutex::new(StatusRegistry::new());

/// Track kernel component initialization
pub fn register_component(name: &'static str) -> Result<(), SetupError> {
    INIT_STATUS.lock().register(name)
}

pub fn update_component_status(name: &'static str, status: InitStatus) {
    INIT_STATUS.lock().update(name, status);
}

/// Ok once every registered component has completed.
pub fn ensure_all_ready() -> Result<(), SetupError> {
    check_ready(&INIT_STATUS.lock())
}

fn check_ready(registry: &StatusRegistry) -> Result<(), SetupError> {
    match registry.first_unfinished() {
        Some(component) => Err(SetupError::PhaseIncomplete {
            name: component.name,
        }),
        None => Ok(()),
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}
