//! User aggregate for identity management (event-sourced).
//!
//! Implements user lifecycle with a privilege escalation check: an actor can
//! only grant roles they themselves hold, unless they are an admin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gemstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use gemstock_events::{Command, Event};

use crate::Role;

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserStatus {
    /// User is active and can act.
    #[default]
    Active,
    /// User is suspended and cannot act or receive roles.
    Suspended,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "Active"),
            UserStatus::Suspended => write!(f, "Suspended"),
        }
    }
}

/// User aggregate.
///
/// # Invariants
/// - Suspended users cannot be assigned new roles.
/// - Actors cannot escalate privileges (grant roles they do not hold).
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            display_name: String::new(),
            roles: Vec::new(),
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r.as_str() == role.as_str())
    }

    fn ensure_not_suspended(&self) -> Result<(), DomainError> {
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user is suspended"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command to create a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

/// Command to assign a role to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub user_id: UserId,
    pub role: Role,
    /// Roles of the actor performing this operation (for the escalation check).
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

/// Command to revoke a role from a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRole {
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command to suspend a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendUser {
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command to reinstate a suspended user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinstateUser {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// All user commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
    Suspend(SuspendUser),
    Reinstate(ReinstateUser),
}

impl Command for UserCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        let user_id = match self {
            UserCommand::Create(c) => c.user_id,
            UserCommand::AssignRole(c) => c.user_id,
            UserCommand::RevokeRole(c) => c.user_id,
            UserCommand::Suspend(c) => c.user_id,
            UserCommand::Reinstate(c) => c.user_id,
        };
        AggregateId::from_uuid(*user_id.as_uuid())
    }
}

/// Event emitted when a user is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a role is assigned to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a role is revoked from a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRevoked {
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a user is suspended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSuspended {
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event emitted when a suspended user is reinstated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReinstated {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// All user events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleAssigned(RoleAssigned),
    RoleRevoked(RoleRevoked),
    Suspended(UserSuspended),
    Reinstated(UserReinstated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
            UserEvent::Suspended(_) => "auth.user.suspended",
            UserEvent::Reinstated(_) => "auth.user.reinstated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::RoleRevoked(e) => e.occurred_at,
            UserEvent::Suspended(e) => e.occurred_at,
            UserEvent::Reinstated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => self.apply_created(e),
            UserEvent::RoleAssigned(e) => self.apply_role_assigned(e),
            UserEvent::RoleRevoked(e) => self.apply_role_revoked(e),
            UserEvent::Suspended(e) => self.apply_suspended(e),
            UserEvent::Reinstated(e) => self.apply_reinstated(e),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            UserCommand::Suspend(cmd) => self.handle_suspend(cmd),
            UserCommand::Reinstate(cmd) => self.handle_reinstate(cmd),
        }
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }

        if cmd.email.trim().is_empty() || !cmd.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }

        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        Ok(vec![UserEvent::Created(UserCreated {
            user_id: cmd.user_id,
            email: cmd.email.trim().to_lowercase(),
            display_name: cmd.display_name.trim().to_string(),
            initial_roles: cmd.initial_roles.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }

        self.ensure_not_suspended()?;

        if self.has_role(&cmd.role) {
            return Err(DomainError::invariant("role already assigned"));
        }

        // Escalation check: actors may only grant roles they hold themselves,
        // except admins who can grant anything.
        let actor_has_admin = cmd.actor_roles.iter().any(|r| r.as_str() == "admin");
        let actor_has_role = cmd
            .actor_roles
            .iter()
            .any(|r| r.as_str() == cmd.role.as_str());

        if !actor_has_admin && !actor_has_role {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![UserEvent::RoleAssigned(RoleAssigned {
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }

        if !self.has_role(&cmd.role) {
            return Err(DomainError::invariant("role not assigned"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleRevoked {
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }

        if self.status == UserStatus::Suspended {
            return Err(DomainError::conflict("user already suspended"));
        }

        Ok(vec![UserEvent::Suspended(UserSuspended {
            user_id: cmd.user_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reinstate(&self, cmd: &ReinstateUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }

        if self.status == UserStatus::Active {
            return Err(DomainError::conflict("user already active"));
        }

        Ok(vec![UserEvent::Reinstated(UserReinstated {
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn apply_created(&mut self, e: &UserCreated) {
        self.id = e.user_id;
        self.email = e.email.clone();
        self.display_name = e.display_name.clone();
        self.roles = e.initial_roles.clone();
        self.status = UserStatus::Active;
        self.created = true;
    }

    fn apply_role_assigned(&mut self, e: &RoleAssigned) {
        self.roles.push(e.role.clone());
    }

    fn apply_role_revoked(&mut self, e: &RoleRevoked) {
        self.roles.retain(|r| r.as_str() != e.role.as_str());
    }

    fn apply_suspended(&mut self, _e: &UserSuspended) {
        self.status = UserStatus::Suspended;
    }

    fn apply_reinstated(&mut self, _e: &UserReinstated) {
        self.status = UserStatus::Active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_user(initial_roles: Vec<Role>) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        let cmd = UserCommand::Create(CreateUser {
            user_id,
            email: "alice@example.com".to_string(),
            display_name: "Alice Smith".to_string(),
            initial_roles,
            occurred_at: now(),
        });
        for event in user.handle(&cmd).unwrap() {
            user.apply(&event);
        }
        user
    }

    #[test]
    fn create_user_lowercases_email() {
        let user_id = UserId::new();
        let user = User::empty(user_id);

        let cmd = UserCommand::Create(CreateUser {
            user_id,
            email: "  Alice@Example.COM ".to_string(),
            display_name: "Alice Smith".to_string(),
            initial_roles: vec![Role::new("clerk")],
            occurred_at: now(),
        });

        let events = user.handle(&cmd).unwrap();
        let UserEvent::Created(e) = &events[0] else {
            panic!("expected UserCreated event");
        };
        assert_eq!(e.email, "alice@example.com");
        assert_eq!(e.initial_roles.len(), 1);
    }

    #[test]
    fn create_user_rejects_invalid_email() {
        let user_id = UserId::new();
        let user = User::empty(user_id);

        let cmd = UserCommand::Create(CreateUser {
            user_id,
            email: "not-an-email".to_string(),
            display_name: "Alice".to_string(),
            initial_roles: vec![],
            occurred_at: now(),
        });

        assert!(user.handle(&cmd).is_err());
    }

    #[test]
    fn admin_can_assign_any_role() {
        let mut user = created_user(vec![Role::new("clerk")]);

        let cmd = UserCommand::AssignRole(AssignRole {
            user_id: user.id,
            role: Role::new("manager"),
            actor_roles: vec![Role::new("admin")],
            occurred_at: now(),
        });
        for event in user.handle(&cmd).unwrap() {
            user.apply(&event);
        }

        assert!(user.has_role(&Role::new("manager")));
    }

    #[test]
    fn privilege_escalation_is_blocked() {
        let user = created_user(vec![]);

        let cmd = UserCommand::AssignRole(AssignRole {
            user_id: user.id,
            role: Role::new("admin"),
            actor_roles: vec![Role::new("clerk")],
            occurred_at: now(),
        });

        let result = user.handle(&cmd);
        assert!(matches!(result.unwrap_err(), DomainError::Unauthorized));
    }

    #[test]
    fn actor_can_grant_a_role_they_hold() {
        let user = created_user(vec![]);

        let cmd = UserCommand::AssignRole(AssignRole {
            user_id: user.id,
            role: Role::new("clerk"),
            actor_roles: vec![Role::new("clerk")],
            occurred_at: now(),
        });

        assert!(user.handle(&cmd).is_ok());
    }

    #[test]
    fn suspended_user_cannot_receive_roles() {
        let mut user = created_user(vec![]);

        let suspend = UserCommand::Suspend(SuspendUser {
            user_id: user.id,
            reason: "policy violation".to_string(),
            occurred_at: now(),
        });
        for event in user.handle(&suspend).unwrap() {
            user.apply(&event);
        }
        assert_eq!(user.status, UserStatus::Suspended);

        let assign = UserCommand::AssignRole(AssignRole {
            user_id: user.id,
            role: Role::new("manager"),
            actor_roles: vec![Role::new("admin")],
            occurred_at: now(),
        });
        let err = user.handle(&assign).unwrap_err();
        assert!(err.to_string().contains("suspended"));
    }

    #[test]
    fn reinstate_restores_active_status() {
        let mut user = created_user(vec![]);

        let suspend = UserCommand::Suspend(SuspendUser {
            user_id: user.id,
            reason: "test".to_string(),
            occurred_at: now(),
        });
        for event in user.handle(&suspend).unwrap() {
            user.apply(&event);
        }

        let reinstate = UserCommand::Reinstate(ReinstateUser {
            user_id: user.id,
            occurred_at: now(),
        });
        for event in user.handle(&reinstate).unwrap() {
            user.apply(&event);
        }

        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn revoke_role_removes_it() {
        let mut user = created_user(vec![Role::new("manager")]);
        assert!(user.has_role(&Role::new("manager")));

        let cmd = UserCommand::RevokeRole(RevokeRole {
            user_id: user.id,
            role: Role::new("manager"),
            occurred_at: now(),
        });
        for event in user.handle(&cmd).unwrap() {
            user.apply(&event);
        }

        assert!(!user.has_role(&Role::new("manager")));
    }

    #[test]
    fn revoking_an_unassigned_role_fails() {
        let user = created_user(vec![]);

        let cmd = UserCommand::RevokeRole(RevokeRole {
            user_id: user.id,
            role: Role::new("manager"),
            occurred_at: now(),
        });

        assert!(user.handle(&cmd).is_err());
    }
}
