use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every collection the API manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Trip,
    Metadata,
    Tripuser,
    Banner,
    Category,
    State,
    User,
    UserTokens,
    Role,
    ProjectRoute,
    RouteRole,
    UserRole,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntity(pub String);

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Trip,
        EntityKind::Metadata,
        EntityKind::Tripuser,
        EntityKind::Banner,
        EntityKind::Category,
        EntityKind::State,
        EntityKind::User,
        EntityKind::UserTokens,
        EntityKind::Role,
        EntityKind::ProjectRoute,
        EntityKind::RouteRole,
        EntityKind::UserRole,
    ];

    /// Name used in routes and report keys
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Trip => "trip",
            EntityKind::Metadata => "metadata",
            EntityKind::Tripuser => "tripuser",
            EntityKind::Banner => "banner",
            EntityKind::Category => "category",
            EntityKind::State => "state",
            EntityKind::User => "user",
            EntityKind::UserTokens => "userTokens",
            EntityKind::Role => "role",
            EntityKind::ProjectRoute => "projectRoute",
            EntityKind::RouteRole => "routeRole",
            EntityKind::UserRole => "userRole",
        }
    }

    /// Backing table in Postgres
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Trip => "trips",
            EntityKind::Metadata => "metadata",
            EntityKind::Tripuser => "tripusers",
            EntityKind::Banner => "banners",
            EntityKind::Category => "categories",
            EntityKind::State => "states",
            EntityKind::User => "users",
            EntityKind::UserTokens => "user_tokens",
            EntityKind::Role => "roles",
            EntityKind::ProjectRoute => "project_routes",
            EntityKind::RouteRole => "route_roles",
            EntityKind::UserRole => "user_roles",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownEntity;

    /// Route segments are matched case-insensitively (`projectroute`, `Trip`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEntity(s.to_string()))
    }
}
