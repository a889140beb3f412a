//! A bound identity + egress pair with its remote handle

use uuid::Uuid;

use crate::models::{Egress, Identity, StatusEntry};
use crate::remote::RemoteClient;

/// In-memory pairing of one identity, one egress and a remote handle
///
/// Never persisted. Whoever holds the value owns the claimed resources.
pub struct Session {
    id: Uuid,
    identity: Identity,
    egress: Egress,
    client: Box<dyn RemoteClient>,
}

impl Session {
    pub fn new(identity: Identity, egress: Egress, client: Box<dyn RemoteClient>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            egress,
            client,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn egress(&self) -> &Egress {
        &self.egress
    }

    /// Status registry entry for this pairing
    pub fn status_entry(&self) -> StatusEntry {
        StatusEntry::new(&self.identity, &self.egress)
    }

    /// Split borrow used to drive the client with the session's resources
    pub fn parts_mut(&mut self) -> (&Identity, &Egress, &mut dyn RemoteClient) {
        (&self.identity, &self.egress, self.client.as_mut())
    }

    pub fn client_mut(&mut self) -> &mut dyn RemoteClient {
        self.client.as_mut()
    }

    /// Swap in a new egress, returning the old one
    pub(crate) fn rebind_egress(&mut self, egress: Egress) -> Egress {
        std::mem::replace(&mut self.egress, egress)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity.name)
            .field("egress", &self.egress.id)
            .finish_non_exhaustive()
    }
}
