//! Operator roles, permissions, and the command requirement table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Roles carried in credentials. Every role except `User` is an operator role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Moderator,
    Viewer,
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        !matches!(self, Role::User)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Viewer => "viewer",
            Role::User => "user",
        }
    }

    /// Permissions granted to a role when an operator account does not list its own.
    pub fn default_permissions(self) -> Vec<Permission> {
        use Permission::*;
        match self {
            Role::SuperAdmin => Permission::ALL.to_vec(),
            Role::Admin => vec![
                ViewUsers,
                EditUsers,
                BanUsers,
                ViewCompanions,
                ModerateCompanions,
                DeleteCompanions,
                ViewAnalytics,
                ExportAnalytics,
                ViewAdmins,
            ],
            Role::Moderator => vec![ViewUsers, ViewCompanions, ModerateCompanions, ViewAnalytics],
            Role::Viewer => vec![ViewUsers, ViewCompanions, ViewAnalytics],
            Role::User => Vec::new(),
        }
    }
}

/// Granular operator permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewUsers,
    EditUsers,
    DeleteUsers,
    BanUsers,
    ViewCompanions,
    ModerateCompanions,
    DeleteCompanions,
    ViewAnalytics,
    ExportAnalytics,
    ViewAdmins,
    CreateAdmins,
    EditAdmins,
    DeleteAdmins,
    ViewSystemSettings,
    EditSystemSettings,
}

impl Permission {
    pub const ALL: [Permission; 15] = [
        Permission::ViewUsers,
        Permission::EditUsers,
        Permission::DeleteUsers,
        Permission::BanUsers,
        Permission::ViewCompanions,
        Permission::ModerateCompanions,
        Permission::DeleteCompanions,
        Permission::ViewAnalytics,
        Permission::ExportAnalytics,
        Permission::ViewAdmins,
        Permission::CreateAdmins,
        Permission::EditAdmins,
        Permission::DeleteAdmins,
        Permission::ViewSystemSettings,
        Permission::EditSystemSettings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ViewUsers => "view_users",
            Permission::EditUsers => "edit_users",
            Permission::DeleteUsers => "delete_users",
            Permission::BanUsers => "ban_users",
            Permission::ViewCompanions => "view_companions",
            Permission::ModerateCompanions => "moderate_companions",
            Permission::DeleteCompanions => "delete_companions",
            Permission::ViewAnalytics => "view_analytics",
            Permission::ExportAnalytics => "export_analytics",
            Permission::ViewAdmins => "view_admins",
            Permission::CreateAdmins => "create_admins",
            Permission::EditAdmins => "edit_admins",
            Permission::DeleteAdmins => "delete_admins",
            Permission::ViewSystemSettings => "view_system_settings",
            Permission::EditSystemSettings => "edit_system_settings",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Parse permission strings from a credential, dropping unknown ones.
    pub fn parse_all<'a>(values: impl IntoIterator<Item = &'a String>) -> HashSet<Permission> {
        values.into_iter().filter_map(|v| Self::parse(v)).collect()
    }
}

// ---------------------------------------------------------------------------
// Command requirement table
// ---------------------------------------------------------------------------

/// The closed set of inbound commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ping,
    Auth,
    Broadcast,
    BanUser,
    RefreshAnalytics,
    Announce,
    ForceReload,
    ReadOnly,
}

/// What a connection must satisfy before a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Legal in every state.
    Any,
    /// Only legal before authentication.
    Unauthenticated,
    /// Authenticated operator, optionally holding a specific permission.
    Admin(Option<Permission>),
}

impl CommandKind {
    pub fn parse(kind: &str) -> Option<Self> {
        use warden_common::protocol::CommandType as T;
        Some(match kind {
            T::PING => Self::Ping,
            T::AUTH => Self::Auth,
            T::ADMIN_BROADCAST => Self::Broadcast,
            T::ADMIN_BAN_USER => Self::BanUser,
            T::ADMIN_REFRESH_ANALYTICS => Self::RefreshAnalytics,
            T::ADMIN_ANNOUNCE => Self::Announce,
            T::ADMIN_FORCE_RELOAD => Self::ForceReload,
            T::ADMIN_READ_ONLY => Self::ReadOnly,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        use warden_common::protocol::CommandType as T;
        match self {
            Self::Ping => T::PING,
            Self::Auth => T::AUTH,
            Self::Broadcast => T::ADMIN_BROADCAST,
            Self::BanUser => T::ADMIN_BAN_USER,
            Self::RefreshAnalytics => T::ADMIN_REFRESH_ANALYTICS,
            Self::Announce => T::ADMIN_ANNOUNCE,
            Self::ForceReload => T::ADMIN_FORCE_RELOAD,
            Self::ReadOnly => T::ADMIN_READ_ONLY,
        }
    }

    /// Single source of truth for command preconditions.
    pub fn requirement(self) -> Requirement {
        match self {
            Self::Ping => Requirement::Any,
            Self::Auth => Requirement::Unauthenticated,
            Self::Broadcast => Requirement::Admin(None),
            Self::BanUser => Requirement::Admin(Some(Permission::BanUsers)),
            Self::RefreshAnalytics => Requirement::Admin(Some(Permission::ViewAnalytics)),
            Self::Announce | Self::ForceReload | Self::ReadOnly => {
                Requirement::Admin(Some(Permission::EditSystemSettings))
            }
        }
    }

    pub const ADMIN_COMMANDS: [CommandKind; 6] = [
        Self::Broadcast,
        Self::BanUser,
        Self::RefreshAnalytics,
        Self::Announce,
        Self::ForceReload,
        Self::ReadOnly,
    ];
}
