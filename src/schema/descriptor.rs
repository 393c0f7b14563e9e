//! Static relationship table driving the cascade resolver.
//!
//! Each root entity lists, in processing order, the entities that hold
//! foreign keys pointing at it and the names of those key fields.

use super::entity::EntityKind;

/// A collection whose records reference the root through any of `fields`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub entity: EntityKind,
    pub fields: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub dependents: &'static [Dependency],
    /// Hierarchical parent link on the entity itself (Category's parent category)
    pub self_reference: Option<&'static str>,
    /// Field defaulted to the acting user on create
    pub owner_field: Option<&'static str>,
}

const AUDIT: &[&str] = &["addedBy", "updatedBy"];

const USER_DEPENDENTS: &[Dependency] = &[
    Dependency { entity: EntityKind::Trip, fields: AUDIT },
    Dependency { entity: EntityKind::Metadata, fields: AUDIT },
    Dependency { entity: EntityKind::Tripuser, fields: &["user", "updatedBy"] },
    Dependency { entity: EntityKind::User, fields: AUDIT },
    Dependency { entity: EntityKind::State, fields: AUDIT },
    Dependency { entity: EntityKind::UserTokens, fields: &["userId", "addedBy", "updatedBy"] },
    Dependency { entity: EntityKind::Role, fields: AUDIT },
    Dependency { entity: EntityKind::ProjectRoute, fields: AUDIT },
    Dependency { entity: EntityKind::RouteRole, fields: AUDIT },
    Dependency { entity: EntityKind::UserRole, fields: &["userId", "addedBy", "updatedBy"] },
    Dependency { entity: EntityKind::Category, fields: AUDIT },
    Dependency { entity: EntityKind::Banner, fields: AUDIT },
];

const ROLE_DEPENDENTS: &[Dependency] = &[
    Dependency { entity: EntityKind::RouteRole, fields: &["roleId"] },
    Dependency { entity: EntityKind::UserRole, fields: &["roleId"] },
];

const PROJECT_ROUTE_DEPENDENTS: &[Dependency] = &[
    Dependency { entity: EntityKind::RouteRole, fields: &["routeId"] },
];

const fn leaf(kind: EntityKind) -> EntityDescriptor {
    EntityDescriptor { kind, dependents: &[], self_reference: None, owner_field: None }
}

static DESCRIPTORS: [EntityDescriptor; 12] = [
    leaf(EntityKind::Trip),
    leaf(EntityKind::Metadata),
    EntityDescriptor {
        kind: EntityKind::Tripuser,
        dependents: &[],
        self_reference: None,
        owner_field: Some("user"),
    },
    leaf(EntityKind::Banner),
    EntityDescriptor {
        kind: EntityKind::Category,
        dependents: &[],
        self_reference: Some("parentCategoryId"),
        owner_field: None,
    },
    leaf(EntityKind::State),
    EntityDescriptor {
        kind: EntityKind::User,
        dependents: USER_DEPENDENTS,
        self_reference: None,
        owner_field: None,
    },
    leaf(EntityKind::UserTokens),
    EntityDescriptor {
        kind: EntityKind::Role,
        dependents: ROLE_DEPENDENTS,
        self_reference: None,
        owner_field: None,
    },
    EntityDescriptor {
        kind: EntityKind::ProjectRoute,
        dependents: PROJECT_ROUTE_DEPENDENTS,
        self_reference: None,
        owner_field: None,
    },
    leaf(EntityKind::RouteRole),
    leaf(EntityKind::UserRole),
];

impl EntityDescriptor {
    /// Whether a cascade must resolve root identifiers before acting
    pub fn has_dependents(&self) -> bool {
        !self.dependents.is_empty() || self.self_reference.is_some()
    }

    /// Dependent collections, including itself when it carries a parent link.
    pub fn references(&'static self) -> Vec<Dependency> {
        let mut out = self.dependents.to_vec();
        if let Some(field) = self.self_reference.as_ref() {
            out.push(Dependency { entity: self.kind, fields: std::slice::from_ref(field) });
        }
        out
    }
}

/// Whether `column` holds record identifiers: the primary key or any field
/// the dependency table links through. These are TEXT in every table.
pub fn is_reference_column(column: &str) -> bool {
    column == super::ID_FIELD
        || DESCRIPTORS.iter().any(|descriptor| {
            descriptor.self_reference == Some(column)
                || descriptor.dependents.iter().any(|d| d.fields.iter().any(|field| *field == column))
        })
}

impl EntityKind {
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        // DESCRIPTORS is laid out in EntityKind::ALL order
        &DESCRIPTORS[*self as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_table_matches_kind_order() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
        }
    }

    #[test]
    fn user_is_referenced_by_every_audited_collection() {
        let user = EntityKind::User.descriptor();
        assert_eq!(user.dependents.len(), 12);
        let tripuser = user
            .dependents
            .iter()
            .find(|d| d.entity == EntityKind::Tripuser)
            .unwrap();
        assert_eq!(tripuser.fields, &["user", "updatedBy"]);
    }

    #[test]
    fn role_and_project_route_feed_route_role() {
        let role: Vec<_> = EntityKind::Role.descriptor().references().iter().map(|d| d.entity).collect();
        assert_eq!(role, vec![EntityKind::RouteRole, EntityKind::UserRole]);
        let route = EntityKind::ProjectRoute.descriptor().references();
        assert_eq!(route[0].fields, &["routeId"]);
    }

    #[test]
    fn category_references_itself_through_parent_link() {
        let category = EntityKind::Category.descriptor();
        assert!(category.has_dependents());
        let refs = category.references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].entity, EntityKind::Category);
        assert_eq!(refs[0].fields, &["parentCategoryId"]);
    }

    #[test]
    fn reference_columns_cover_keys_and_links() {
        for column in ["id", "addedBy", "updatedBy", "userId", "user", "roleId", "routeId", "parentCategoryId"] {
            assert!(is_reference_column(column), "{} should be a reference column", column);
        }
        for column in ["distance", "name", "isDeleted", "createdAt"] {
            assert!(!is_reference_column(column), "{} is not a reference column", column);
        }
    }

    #[test]
    fn leaves_have_no_dependents() {
        for kind in [EntityKind::Trip, EntityKind::Banner, EntityKind::RouteRole, EntityKind::UserRole] {
            assert!(!kind.descriptor().has_dependents(), "{} should be a leaf", kind);
        }
    }
}
