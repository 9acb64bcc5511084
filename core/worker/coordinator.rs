use crate::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Running,
    Shutdown,
}

/// Tells every worker of a build when to stop early.
///
#[derive(Debug)]
pub struct Coordinator {
    status: RwLock<Status>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(Status::Running),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        match self.status.read() {
            Ok(status) => *status == Status::Shutdown,
            Err(poisoned) => *poisoned.into_inner() == Status::Shutdown,
        }
    }

    pub fn signal_shutdown(&self) {
        match self.status.write() {
            Ok(mut status) => *status = Status::Shutdown,
            Err(poisoned) => *poisoned.into_inner() = Status::Shutdown,
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
