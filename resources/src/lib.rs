//! # Resources
//!
//! Exclusive ownership of physical resources (GPIO pins, bus handles).
//!
//! ## Philosophy
//!
//! - **One owner per resource**: a `(kind, id)` pair is held by at most one
//!   owner at any time
//! - **Only the owner releases**: a driver can never free another driver's pin
//! - **Absent means free**: the table stores claims only
//! - **Bounded**: the claim table has a fixed capacity
//!
//! ## Core Concepts
//!
//! - [`ResourceManager`]: the claim table and its queries
//! - [`Claim`]: RAII guard that releases its resource on drop
//! - [`ClaimSet`]: claim transaction; dropping it releases every claim in
//!   reverse order, so a failed multi-pin acquisition rolls back by returning
//!
//! The kernel is single threaded, so drivers share the manager through
//! [`SharedResources`] (`Rc<RefCell<_>>`).

use core_types::OwnerId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of simultaneous claims
pub const DEFAULT_MAX_RESOURCES: usize = 64;

/// Kind of physical resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    GpioPin,
    I2cBus,
    SpiBus,
    UartBus,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::GpioPin => "gpio",
            ResourceKind::I2cBus => "i2c",
            ResourceKind::SpiBus => "spi",
            ResourceKind::UartBus => "uart",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the claim table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClaim {
    pub kind: ResourceKind,
    pub id: u32,
    pub owner: OwnerId,
}

/// Errors from claim and release
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("{kind}{id} is already claimed by {owner}")]
    Conflict {
        kind: ResourceKind,
        id: u32,
        owner: OwnerId,
    },

    #[error("{kind}{id} is not claimed")]
    NotClaimed { kind: ResourceKind, id: u32 },

    #[error("{kind}{id} is owned by {owner}, not {requester}")]
    NotOwner {
        kind: ResourceKind,
        id: u32,
        owner: OwnerId,
        requester: OwnerId,
    },

    #[error("resource table is full ({0} claims)")]
    TableFull(usize),
}

/// Claim table
#[derive(Debug, Clone)]
pub struct ResourceManager {
    claims: Vec<ResourceClaim>,
    capacity: usize,
}

impl ResourceManager {
    /// Creates a manager with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RESOURCES)
    }

    /// Creates a manager holding at most `capacity` claims
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            claims: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wraps the manager for sharing with drivers
    pub fn into_shared(self) -> SharedResources {
        Rc::new(RefCell::new(self))
    }

    fn position(&self, kind: ResourceKind, id: u32) -> Option<usize> {
        self.claims
            .iter()
            .position(|c| c.kind == kind && c.id == id)
    }

    /// Claims `(kind, id)` for `owner`
    ///
    /// Re-claiming by the current owner succeeds without side effect.
    pub fn claim(
        &mut self,
        kind: ResourceKind,
        id: u32,
        owner: OwnerId,
    ) -> Result<(), ResourceError> {
        if let Some(pos) = self.position(kind, id) {
            let existing = self.claims[pos].owner;
            if existing == owner {
                return Ok(());
            }
            debug!(%kind, id, %owner, holder = %existing, "claim rejected");
            return Err(ResourceError::Conflict {
                kind,
                id,
                owner: existing,
            });
        }
        if self.claims.len() >= self.capacity {
            warn!(%kind, id, capacity = self.capacity, "resource table full");
            return Err(ResourceError::TableFull(self.capacity));
        }
        self.claims.push(ResourceClaim { kind, id, owner });
        debug!(%kind, id, %owner, "claimed");
        Ok(())
    }

    /// Releases `(kind, id)` if `owner` holds it
    pub fn release(
        &mut self,
        kind: ResourceKind,
        id: u32,
        owner: OwnerId,
    ) -> Result<(), ResourceError> {
        let pos = self
            .position(kind, id)
            .ok_or(ResourceError::NotClaimed { kind, id })?;
        let existing = self.claims[pos].owner;
        if existing != owner {
            return Err(ResourceError::NotOwner {
                kind,
                id,
                owner: existing,
                requester: owner,
            });
        }
        self.claims.remove(pos);
        debug!(%kind, id, %owner, "released");
        Ok(())
    }

    /// Releases every claim held by `owner`, returning how many were freed
    pub fn release_all(&mut self, owner: OwnerId) -> usize {
        let before = self.claims.len();
        self.claims.retain(|c| c.owner != owner);
        before - self.claims.len()
    }

    pub fn is_claimed(&self, kind: ResourceKind, id: u32) -> bool {
        self.position(kind, id).is_some()
    }

    pub fn is_available(&self, kind: ResourceKind, id: u32) -> bool {
        !self.is_claimed(kind, id)
    }

    pub fn owner(&self, kind: ResourceKind, id: u32) -> Option<OwnerId> {
        self.position(kind, id).map(|pos| self.claims[pos].owner)
    }

    /// Claims in table order
    pub fn list_claims(&self) -> &[ResourceClaim] {
        &self.claims
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource manager shared between the kernel and drivers
pub type SharedResources = Rc<RefCell<ResourceManager>>;

/// RAII claim guard
///
/// Releases its resource when dropped. Dropping must not happen while the
/// manager is mutably borrowed elsewhere; if it does the release is skipped
/// and logged, and [`ResourceManager::release_all`] cleans up.
#[derive(Debug)]
pub struct Claim {
    resources: SharedResources,
    kind: ResourceKind,
    id: u32,
    owner: OwnerId,
}

impl Claim {
    /// Claims `(kind, id)` for `owner`, returning a guard on success
    pub fn acquire(
        resources: &SharedResources,
        kind: ResourceKind,
        id: u32,
        owner: OwnerId,
    ) -> Result<Self, ResourceError> {
        resources.borrow_mut().claim(kind, id, owner)?;
        Ok(Self {
            resources: Rc::clone(resources),
            kind,
            id,
            owner,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        match self.resources.try_borrow_mut() {
            Ok(mut manager) => {
                if let Err(err) = manager.release(self.kind, self.id, self.owner) {
                    warn!(%err, "claim guard release failed");
                }
            }
            Err(_) => warn!(kind = %self.kind, id = self.id, "resource manager busy, claim leaked"),
        }
    }
}

/// Claim transaction
///
/// Accumulates claims for one owner. Any claim failure leaves earlier claims
/// in the set; dropping the set (e.g. by returning the error) releases them
/// in reverse acquisition order.
#[derive(Debug)]
pub struct ClaimSet {
    resources: SharedResources,
    owner: OwnerId,
    claims: Vec<Claim>,
}

impl ClaimSet {
    pub fn new(resources: &SharedResources, owner: OwnerId) -> Self {
        Self {
            resources: Rc::clone(resources),
            owner,
            claims: Vec::new(),
        }
    }

    /// Adds a claim to the set
    pub fn claim(&mut self, kind: ResourceKind, id: u32) -> Result<(), ResourceError> {
        let claim = Claim::acquire(&self.resources, kind, id, self.owner)?;
        self.claims.push(claim);
        Ok(())
    }

    /// Builder form of [`ClaimSet::claim`]
    pub fn with(mut self, kind: ResourceKind, id: u32) -> Result<Self, ResourceError> {
        self.claim(kind, id)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Releases every claim now, newest first
    pub fn release(&mut self) {
        while let Some(claim) = self.claims.pop() {
            drop(claim);
        }
    }
}

impl Drop for ClaimSet {
    fn drop(&mut self) {
        self.release();
    }
}
