//! Execution contexts and the sentinel addresses that switch between them

use capscope_common::context;
use serde::Serialize;
use std::fmt;

/// Execution context a stack address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressContext {
    #[default]
    None,
    Hypervisor,
    Kernel,
    User,
    Guest,
    GuestKernel,
    GuestUser,
}

impl AddressContext {
    /// Every context a sentinel can switch to
    pub const SWITCHABLE: [AddressContext; 6] = [
        AddressContext::Hypervisor,
        AddressContext::Kernel,
        AddressContext::User,
        AddressContext::Guest,
        AddressContext::GuestKernel,
        AddressContext::GuestUser,
    ];

    /// Context announced by `address`, if it is a context-switch sentinel
    #[must_use]
    pub fn from_sentinel(address: u64) -> Option<Self> {
        match address {
            context::HYPERVISOR => Some(Self::Hypervisor),
            context::KERNEL => Some(Self::Kernel),
            context::USER => Some(Self::User),
            context::GUEST => Some(Self::Guest),
            context::GUEST_KERNEL => Some(Self::GuestKernel),
            context::GUEST_USER => Some(Self::GuestUser),
            _ => None,
        }
    }

    /// Addresses in this context resolve against the shared kernel symbols
    #[must_use]
    pub fn uses_kernel_symbols(self) -> bool {
        matches!(self, Self::Kernel | Self::Hypervisor)
    }

    /// Context used for lookups before any sentinel has been seen
    #[must_use]
    pub fn or_user(self) -> Self {
        if self == Self::None {
            Self::User
        } else {
            self
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Hypervisor => "Hypervisor",
            Self::Kernel => "Kernel",
            Self::User => "User",
            Self::Guest => "Guest",
            Self::GuestKernel => "Guest Kernel",
            Self::GuestUser => "Guest User",
        }
    }
}

impl fmt::Display for AddressContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returns true if `address` is a context-switch sentinel
#[must_use]
pub fn is_context_switch(address: u64) -> bool {
    AddressContext::from_sentinel(address).is_some()
}
