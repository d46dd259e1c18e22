//! Guards returned by successful acquisitions

use crate::identity::OwnerToken;
use crate::renewal::RenewalTask;

/// One acquisition: which lock, under which token, and its watchdog.
pub(crate) struct Hold {
    pub(crate) name: String,
    pub(crate) token: OwnerToken,
    pub(crate) renewal: RenewalTask,
}

/// Proof of an exclusive (write) hold.
///
/// Pass it back to `unlock` to release. Dropping it instead stops lease
/// renewal; the record then expires within one lease.
#[derive(Debug)]
#[must_use = "dropping the guard stops lease renewal without releasing the lock"]
pub struct LockGuard {
    pub(crate) hold: Hold,
}

/// Proof of one shared (read) hold.
///
/// Pass it back to `runlock` to release. Dropping it instead stops lease
/// renewal for this hold.
#[derive(Debug)]
#[must_use = "dropping the guard stops lease renewal without releasing the lock"]
pub struct ReadGuard {
    pub(crate) hold: Hold,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.hold.name
    }

    /// Token under which the record was created; persist it to release later
    /// with `unlock_as`.
    pub fn token(&self) -> &OwnerToken {
        &self.hold.token
    }
}

impl ReadGuard {
    pub fn name(&self) -> &str {
        &self.hold.name
    }

    pub fn token(&self) -> &OwnerToken {
        &self.hold.token
    }
}

/// A guard handed back by a release that refused it.
///
/// Returned inside [`LockError::ForeignGuard`](crate::LockError::ForeignGuard)
/// when a guard is passed to a lock other than the one that issued it. Its
/// renewal is still running; release it through the right lock.
#[derive(Debug)]
pub enum AnyGuard {
    Write(LockGuard),
    Read(ReadGuard),
}

impl AnyGuard {
    pub fn name(&self) -> &str {
        match self {
            AnyGuard::Write(guard) => guard.name(),
            AnyGuard::Read(guard) => guard.name(),
        }
    }

    pub fn token(&self) -> &OwnerToken {
        match self {
            AnyGuard::Write(guard) => guard.token(),
            AnyGuard::Read(guard) => guard.token(),
        }
    }
}

impl std::fmt::Debug for Hold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hold")
            .field("name", &self.name)
            .field("token", &self.token)
            .field("renewing", &!self.renewal.is_finished())
            .finish()
    }
}
