//! Runtime capability checks consulted by requests before dispatch.

/// What the host runtime allows a request to do.
///
/// Requests consult this in their preflight check so they can fail fast,
/// through their callback, instead of attempting a send that cannot work.
pub trait Environment {
    /// Whether the host has granted network access.
    fn has_network_permission(&self) -> bool;
}

/// Fixed set of capabilities, for hosts that know them up front and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEnvironment {
    /// Network access granted
    pub network_permitted: bool,
}

impl StaticEnvironment {
    /// Environment with network access.
    pub const fn online() -> Self {
        Self {
            network_permitted: true,
        }
    }

    /// Environment without network access.
    pub const fn offline() -> Self {
        Self {
            network_permitted: false,
        }
    }
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self::online()
    }
}

impl Environment for StaticEnvironment {
    fn has_network_permission(&self) -> bool {
        self.network_permitted
    }
}

impl<T: Environment + ?Sized> Environment for &T {
    fn has_network_permission(&self) -> bool {
        (**self).has_network_permission()
    }
}
