//! Access rights of attributes and methods

/// Attribute access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeAccessMode {
    #[default]
    NoAccess,
    Read,
    Write,
    ReadWrite,
    AuthenticatedRead,
    AuthenticatedWrite,
    AuthenticatedReadWrite,
}

impl AttributeAccessMode {
    /// Whether a read is allowed for a client with the given authentication state.
    pub const fn permits_read(self, authenticated: bool) -> bool {
        match self {
            Self::Read | Self::ReadWrite => true,
            Self::AuthenticatedRead | Self::AuthenticatedReadWrite => authenticated,
            Self::NoAccess | Self::Write | Self::AuthenticatedWrite => false,
        }
    }

    pub const fn permits_write(self, authenticated: bool) -> bool {
        match self {
            Self::Write | Self::ReadWrite => true,
            Self::AuthenticatedWrite | Self::AuthenticatedReadWrite => authenticated,
            Self::NoAccess | Self::Read | Self::AuthenticatedRead => false,
        }
    }
}

/// Method access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodAccessMode {
    #[default]
    NoAccess,
    Access,
    AuthenticatedAccess,
}

impl MethodAccessMode {
    pub const fn permits(self, authenticated: bool) -> bool {
        match self {
            Self::Access => true,
            Self::AuthenticatedAccess => authenticated,
            Self::NoAccess => false,
        }
    }
}
