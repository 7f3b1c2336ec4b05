use relay_auth::Principal;
use relay_core::PartnerId;

/// Partner a request acts for.
///
/// Bound from the bearer token by the auth middleware and present on every
/// protected route. Handlers never take a partner id from the request body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PartnerContext {
    partner_id: PartnerId,
}

impl PartnerContext {
    pub fn new(partner_id: PartnerId) -> Self {
        Self { partner_id }
    }

    pub fn partner_id(&self) -> PartnerId {
        self.partner_id
    }
}

/// Account behind the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
