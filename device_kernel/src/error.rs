//! Kernel error type and its mapping onto the intent error taxonomy

use crate::config::ConfigError;
use hal::HalError;
use intent_router::{ErrorKind, IntentError, RouterError};
use resources::ResourceError;
use services_device_manager::{DeviceError, DriverError};
use services_endpoints::EndpointError;
use services_persistence::PersistenceError;
use services_scheduler::ServiceError;
use thiserror::Error;

/// Errors surfaced by kernel operations
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("intent table: {0}")]
    Router(#[from] RouterError),

    #[error("no persistence backend configured")]
    NoBackend,

    #[error("no saved configuration")]
    NothingStored,

    #[error("{0}")]
    BadArgs(String),

    #[error("{0}")]
    Conflict(String),
}

impl KernelError {
    pub fn bad_args(message: impl Into<String>) -> Self {
        KernelError::BadArgs(message.into())
    }

    /// Error kind reported on the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Config(_) | KernelError::BadArgs(_) => ErrorKind::BadArgs,
            KernelError::Device(err) => device_kind(err),
            KernelError::Endpoint(err) => endpoint_kind(err),
            KernelError::Service(err) => service_kind(err),
            KernelError::Persistence(err) => persistence_kind(err),
            KernelError::Hal(err) => hal_kind(err),
            KernelError::Router(_) => ErrorKind::Internal,
            KernelError::NoBackend => ErrorKind::Unsupported,
            KernelError::NothingStored => ErrorKind::NotFound,
            KernelError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

impl From<KernelError> for IntentError {
    fn from(err: KernelError) -> Self {
        IntentError::new(err.kind(), err.to_string())
    }
}

fn device_kind(err: &DeviceError) -> ErrorKind {
    match err {
        DeviceError::EndpointNotFound(_)
        | DeviceError::UnknownDriver(_)
        | DeviceError::NotFound(_) => ErrorKind::NotFound,
        DeviceError::Endpoint(err) => endpoint_kind(err),
        DeviceError::NoFreeSlot(_) => ErrorKind::Conflict,
        DeviceError::DuplicateDriver(_) => ErrorKind::Internal,
        DeviceError::InitFailed { source, .. } => driver_kind(source),
        DeviceError::Driver(_, err) => driver_kind(err),
    }
}

fn driver_kind(err: &DriverError) -> ErrorKind {
    match err {
        DriverError::UnknownParam(_) | DriverError::UnknownRegister(_) => ErrorKind::NotFound,
        DriverError::InvalidValue { .. } | DriverError::InvalidEndpoint { .. } => {
            ErrorKind::BadArgs
        }
        DriverError::ReadOnly(_) | DriverError::Unsupported(_) => ErrorKind::Unsupported,
        DriverError::Resource(ResourceError::Conflict { .. } | ResourceError::TableFull(_)) => {
            ErrorKind::Conflict
        }
        DriverError::Resource(_) => ErrorKind::Internal,
        DriverError::Io(err) => hal_kind(err),
    }
}

fn endpoint_kind(err: &EndpointError) -> ErrorKind {
    match err {
        EndpointError::TableFull(_) => ErrorKind::Conflict,
        EndpointError::NotFound(_)
        | EndpointError::BusNotRegistered(_)
        | EndpointError::BusNotPresent(_) => ErrorKind::NotFound,
        EndpointError::InvalidAddress(_) => ErrorKind::BadArgs,
        EndpointError::NotProbeable(_) => ErrorKind::Unsupported,
    }
}

fn service_kind(err: &ServiceError) -> ErrorKind {
    match err {
        ServiceError::NotFound(_) => ErrorKind::NotFound,
        ServiceError::InvalidState { .. } => ErrorKind::Conflict,
        ServiceError::Duplicate(_)
        | ServiceError::ZeroInterval(_)
        | ServiceError::TableFull(_)
        | ServiceError::InitFailed { .. } => ErrorKind::Internal,
    }
}

fn persistence_kind(err: &PersistenceError) -> ErrorKind {
    match err {
        PersistenceError::Parse { .. } | PersistenceError::UnsupportedVersion(_) => {
            ErrorKind::BadArgs
        }
        PersistenceError::SerializationFailed(_) => ErrorKind::Internal,
        PersistenceError::DeserializationFailed(_)
        | PersistenceError::ChecksumMismatch { .. }
        | PersistenceError::Storage(_) => ErrorKind::Io,
    }
}

fn hal_kind(err: &HalError) -> ErrorKind {
    match err {
        HalError::NoSuchBus { .. } => ErrorKind::NotFound,
        HalError::InvalidPin(_) | HalError::UnsafePin(_) | HalError::UnsupportedFrequency(_) => {
            ErrorKind::BadArgs
        }
        HalError::Nack(_) | HalError::Bus => ErrorKind::Io,
    }
}
