use stockledger_core::{CompanyId, UserId};

/// Company the request operates on.
///
/// Present on every scoped route; resources owned by another company are
/// reported as not found.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CompanyContext {
    company_id: CompanyId,
}

impl CompanyContext {
    pub fn new(company_id: CompanyId) -> Self {
        Self { company_id }
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

/// Acting user, recorded on every ledger entry a request writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: UserId,
}

impl ActorContext {
    pub fn new(actor_id: UserId) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }
}
