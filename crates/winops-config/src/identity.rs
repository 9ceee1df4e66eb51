/// Names under which the service is registered with the host service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Short service name used for control requests.
    pub name: &'static str,
    /// Name shown in service management consoles.
    pub display_name: &'static str,
    /// Free-text description attached to the registration.
    pub description: &'static str,
}

/// The one identity this service is ever registered under.
pub const SERVICE_IDENTITY: ServiceIdentity = ServiceIdentity {
    name: "WinOpsToolAPI",
    display_name: "WinOpsTool REST API Service",
    description: "REST API service for remote management of Windows systems",
};

impl ServiceIdentity {
    /// Lower-case unit name used by systemd hosts.
    #[must_use]
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name.to_ascii_lowercase())
    }
}
