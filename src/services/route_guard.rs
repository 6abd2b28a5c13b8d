//! Role-based route authorization.
//!
//! `RouteGuard::decide` is a pure function of `{path, token, role}`; cookie parsing
//! and redirects live in `middleware::route_guard`.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const LOGIN_PATH: &str = "/login";
pub const FORBIDDEN_PATH: &str = "/forbidden";

const STATIC_PREFIXES: &[&str] = &["/_next", "/icons", "/sounds"];
const PUBLIC_PATHS: &[&str] = &["/", LOGIN_PATH, "/api/health", FORBIDDEN_PATH];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Expert,
    Farmer,
    Pilot,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Expert, Role::Farmer, Role::Pilot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Expert => "expert",
            Role::Farmer => "farmer",
            Role::Pilot => "pilot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "expert" => Ok(Role::Expert),
            "farmer" => Ok(Role::Farmer),
            "pilot" => Ok(Role::Pilot),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Role → path-prefix allowlist.
///
/// Keep this table flat and literal: it is reviewed as-is.
pub struct RolePolicy;

impl RolePolicy {
    const ADMIN: &'static [&'static str] = &[
        "/analytics",
        "/audit",
        "/pricing",
        "/admin/sla",
        "/users",
        "/admin/payments",
        "/calibration",
        "/qc",
        "/api-keys",
        "/experts",
        "/pilots",
    ];
    const EXPERT: &'static [&'static str] = &[
        "/queue",
        "/review",
        "/expert/settings",
        "/expert/sla",
        "/expert/profile",
    ];
    const FARMER: &'static [&'static str] = &[
        "/fields",
        "/missions",
        "/subscriptions",
        "/results",
        "/payments",
    ];
    const PILOT: &'static [&'static str] = &[
        "/pilot/missions",
        "/planner",
        "/capacity",
        "/pilot/settings",
        "/pilot/profile",
    ];

    pub fn prefixes(role: Role) -> &'static [&'static str] {
        match role {
            Role::Admin => Self::ADMIN,
            Role::Expert => Self::EXPERT,
            Role::Farmer => Self::FARMER,
            Role::Pilot => Self::PILOT,
        }
    }

    pub fn entries() -> impl Iterator<Item = (Role, &'static [&'static str])> {
        Role::ALL.into_iter().map(|role| (role, Self::prefixes(role)))
    }

    /// Exact match or `prefix + "/"` match. Never a substring match.
    pub fn allows(role: Role, path: &str) -> bool {
        Self::prefixes(role)
            .iter()
            .any(|prefix| prefix_matches(prefix, path))
    }

    /// Structural problems in the table (empty when the table is sound).
    pub fn audit() -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen: Vec<(&str, Role)> = Vec::new();

        for (role, prefixes) in Self::entries() {
            for prefix in prefixes {
                if !prefix.starts_with('/') {
                    problems.push(format!("{role}: prefix {prefix} must start with '/'"));
                }
                if prefix.len() > 1 && prefix.ends_with('/') {
                    problems.push(format!("{role}: prefix {prefix} must not end with '/'"));
                }
                if let Some((_, other)) = seen.iter().find(|(p, _)| p == prefix) {
                    problems.push(format!("prefix {prefix} is listed under both {other} and {role}"));
                }
                seen.push((prefix, role));
            }
        }

        problems
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Everything the guard needs about one navigation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardInput<'a> {
    pub path: &'a str,
    pub token: Option<&'a str>,
    pub role: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Static,
    Public,
    Unauthenticated,
    Forbidden,
    Allowed,
}

impl GuardDecision {
    /// Fixed redirect targets; never derived from the request.
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            GuardDecision::Unauthenticated => Some(LOGIN_PATH),
            GuardDecision::Forbidden => Some(FORBIDDEN_PATH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardDecision::Static => "static",
            GuardDecision::Public => "public",
            GuardDecision::Unauthenticated => "unauthenticated",
            GuardDecision::Forbidden => "forbidden",
            GuardDecision::Allowed => "allowed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGuard;

impl RouteGuard {
    pub fn decide(input: &GuardInput<'_>) -> GuardDecision {
        if is_static_path(input.path) {
            return GuardDecision::Static;
        }
        if PUBLIC_PATHS.contains(&input.path) {
            return GuardDecision::Public;
        }

        let token = input.token.filter(|t| !t.is_empty());
        let role = input.role.filter(|r| !r.is_empty());
        let (Some(_), Some(role)) = (token, role) else {
            return GuardDecision::Unauthenticated;
        };

        // Unknown role strings have no prefixes.
        match role.parse::<Role>() {
            Ok(role) if RolePolicy::allows(role, input.path) => GuardDecision::Allowed,
            _ => GuardDecision::Forbidden,
        }
    }
}

fn is_static_path(path: &str) -> bool {
    STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) || path.contains('.')
}
