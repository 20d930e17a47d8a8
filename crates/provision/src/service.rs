//! Service manager boundary

use crate::error::ServiceManagerError;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use zbus::blocking::{Connection, Proxy, connection};

const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const SYSTEMD_MANAGER: &str = "org.freedesktop.systemd1.Manager";

/// Reloads unit configuration after slice overrides change
pub trait ServiceManager: Send + Sync {
    fn reload(&self) -> Result<(), ServiceManagerError>;
}

/// systemd's manager object on the system bus.
///
/// The connection is opened up front so an unreachable systemd fails the
/// run before any account is created.
#[derive(Debug, Clone)]
pub struct Systemd {
    connection: Connection,
}

impl Systemd {
    /// Connect to the system bus
    pub fn connect() -> Result<Self, ServiceManagerError> {
        let connection = Connection::system().map_err(ServiceManagerError::Connect)?;
        log::debug!("Connected to the system bus");
        Ok(Self { connection })
    }

    /// Connect to a bus at an explicit address, e.g.
    /// `unix:path=/run/dbus/system_bus_socket`
    pub fn connect_address(address: &str) -> Result<Self, ServiceManagerError> {
        let connection = connection::Builder::address(address)
            .and_then(connection::Builder::build)
            .map_err(ServiceManagerError::Connect)?;
        log::debug!("Connected to {}", address);
        Ok(Self { connection })
    }

    fn manager(&self) -> zbus::Result<Proxy<'_>> {
        Proxy::new(
            &self.connection,
            SYSTEMD_DESTINATION,
            SYSTEMD_PATH,
            SYSTEMD_MANAGER,
        )
    }
}

impl ServiceManager for Systemd {
    fn reload(&self) -> Result<(), ServiceManagerError> {
        log::debug!("{}.Reload", SYSTEMD_MANAGER);
        let manager = self.manager().map_err(ServiceManagerError::Reload)?;
        let _: () = manager
            .call("Reload", &())
            .map_err(ServiceManagerError::Reload)?;
        Ok(())
    }
}

/// Counts reloads and optionally fails them
#[derive(Debug, Clone, Default)]
pub struct MockServiceManager {
    reloads: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reloads fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reload attempts so far, failed ones included
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl ServiceManager for MockServiceManager {
    fn reload(&self) -> Result<(), ServiceManagerError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceManagerError::Reload(zbus::Error::from(
                io::Error::new(io::ErrorKind::PermissionDenied, "Access denied"),
            )));
        }
        Ok(())
    }
}
