use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "actor_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Admin,
    Hr,
    Tutor,
    Intern,
    Candidate,
}

// `notification_events.target_roles` is an `actor_role[]` column; the derive
// alone does not cover the array element type.
impl PgHasArrayType for ActorRole {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_actor_role")
    }
}

/// The slice of an actor the core needs for authorization decisions.
#[derive(Debug, Clone, Copy)]
pub struct ActorInfo {
    pub id: Uuid,
    pub role: ActorRole,
    pub company_id: Option<Uuid>,
    pub active: bool,
}

impl ActorInfo {
    /// Admins see everything; HR/tutors/interns are pinned to their company;
    /// candidates have no tenant scope at all.
    pub fn company_scope(&self) -> Option<CompanyScope> {
        match self.role {
            ActorRole::Admin => Some(CompanyScope::All),
            ActorRole::Hr | ActorRole::Tutor | ActorRole::Intern => {
                self.company_id.map(CompanyScope::Only)
            }
            ActorRole::Candidate => None,
        }
    }
}

/// Tenant visibility of an actor. Admins see everything; everyone else is
/// pinned to their own company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyScope {
    All,
    Only(Uuid),
}

impl CompanyScope {
    pub fn covers(&self, company_id: Option<Uuid>) -> bool {
        match self {
            CompanyScope::All => true,
            CompanyScope::Only(own) => company_id == Some(*own),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_scope_covers_everything() {
        let scope = CompanyScope::All;
        assert!(scope.covers(Some(Uuid::new_v4())));
        assert!(scope.covers(None));
    }

    #[test]
    fn company_scope_covers_only_its_tenant() {
        let own = Uuid::new_v4();
        let scope = CompanyScope::Only(own);
        assert!(scope.covers(Some(own)));
        assert!(!scope.covers(Some(Uuid::new_v4())));
        assert!(!scope.covers(None));
    }

    #[test]
    fn scope_derivation_per_role() {
        let company = Uuid::new_v4();
        let info = |role, company_id| ActorInfo {
            id: Uuid::new_v4(),
            role,
            company_id,
            active: true,
        };

        assert_eq!(
            info(ActorRole::Admin, None).company_scope(),
            Some(CompanyScope::All)
        );
        assert_eq!(
            info(ActorRole::Hr, Some(company)).company_scope(),
            Some(CompanyScope::Only(company))
        );
        assert_eq!(info(ActorRole::Hr, None).company_scope(), None);
        assert_eq!(info(ActorRole::Candidate, None).company_scope(), None);
    }

    #[test]
    fn role_array_maps_to_the_pg_array_type() {
        // `target_roles` columns bind and decode as `actor_role[]`
        assert_eq!(
            ActorRole::array_type_info(),
            PgTypeInfo::with_name("_actor_role")
        );
    }

    #[test]
    fn role_wire_format_is_screaming_snake() {
        let json = serde_json::to_string(&ActorRole::Hr).unwrap();
        assert_eq!(json, "\"HR\"");
        let role: ActorRole = serde_json::from_str("\"TUTOR\"").unwrap();
        assert_eq!(role, ActorRole::Tutor);
        assert!(serde_json::from_str::<ActorRole>("\"MANAGER\"").is_err());
    }
}
