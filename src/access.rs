use std::collections::BTreeSet;

use crate::models::{FundCode, Organization, Principal, Program, Role};

/// OrganizationScoped
///
/// Implemented by every row whose visibility is decided by its owning organization.
pub trait OrganizationScoped {
    fn organization_id(&self) -> i64;
}

impl OrganizationScoped for FundCode {
    fn organization_id(&self) -> i64 {
        self.organization_id
    }
}

impl OrganizationScoped for Program {
    fn organization_id(&self) -> i64 {
        self.organization_id
    }
}

impl OrganizationScoped for Organization {
    fn organization_id(&self) -> i64 {
        self.id
    }
}

/// Scope
///
/// The visibility a principal has over organization-scoped rows. Superusers get `All`;
/// everyone else gets the (possibly empty) set of organization ids they are entitled to.
///
/// Every role grants the same read visibility. Role only matters for writes, see
/// [`can_manage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Organizations(BTreeSet<i64>),
}

impl Scope {
    /// for_principal
    ///
    /// Computes the entitlement set: the principal's own TolaUser organization plus every
    /// organization reached through a WorkflowTeam membership.
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.is_superuser {
            return Scope::All;
        }

        let organizations = principal
            .organization_id
            .into_iter()
            .chain(principal.teams.iter().filter_map(|team| team.organization_id))
            .collect();

        Scope::Organizations(organizations)
    }

    pub fn permits(&self, organization_id: i64) -> bool {
        match self {
            Scope::All => true,
            Scope::Organizations(ids) => ids.contains(&organization_id),
        }
    }

    /// True when no row can possibly be visible. Callers use this to skip the query.
    pub fn is_empty(&self) -> bool {
        matches!(self, Scope::Organizations(ids) if ids.is_empty())
    }

    /// narrow
    ///
    /// Intersects the scope with an `organization__id` equality filter. A filter can only
    /// ever remove visibility, never add it.
    pub fn narrow(self, organization_id: Option<i64>) -> Self {
        let Some(wanted) = organization_id else {
            return self;
        };

        match self {
            Scope::All => Scope::Organizations(BTreeSet::from([wanted])),
            Scope::Organizations(mut ids) => {
                ids.retain(|id| *id == wanted);
                Scope::Organizations(ids)
            }
        }
    }

    /// The entitled ids, or `None` when unrestricted.
    pub fn organization_ids(&self) -> Option<Vec<i64>> {
        match self {
            Scope::All => None,
            Scope::Organizations(ids) => Some(ids.iter().copied().collect()),
        }
    }

    /// filter
    ///
    /// Keeps the rows this scope can see, preserving their order.
    pub fn filter<T, I>(&self, rows: I) -> Vec<T>
    where
        T: OrganizationScoped,
        I: IntoIterator<Item = T>,
    {
        rows.into_iter()
            .filter(|row| self.permits(row.organization_id()))
            .collect()
    }
}

/// can_manage
///
/// Whether the principal may create, update or delete rows owned by `organization_id`.
/// Superusers always can. An `OrgAdmin` group grant covers the principal's home
/// organization; `OrgAdmin` and `ProgramAdmin` team memberships cover the organization
/// they reach. `ProgramTeam` and `ViewOnly` never write.
pub fn can_manage(principal: &Principal, organization_id: i64) -> bool {
    if principal.is_superuser {
        return true;
    }

    let home_admin = principal.organization_id == Some(organization_id)
        && principal.groups.contains(&Role::OrgAdmin);

    let team_admin = principal.teams.iter().any(|team| {
        team.organization_id == Some(organization_id)
            && matches!(team.role, Role::OrgAdmin | Role::ProgramAdmin)
    });

    home_admin || team_admin
}
