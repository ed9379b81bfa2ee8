// 👤 Users, roles and sessions
//
// Accounts are versioned like every other entity: editing a user or changing
// their roles appends a new version, deleting retires the identity.

use crate::error::{ServiceError, ServiceResult};
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::{FieldChecks, ValidationResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Teacher,
    Student,
    Parent,
    AtaStaff,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Administrator,
        Role::Teacher,
        Role::Student,
        Role::Parent,
        Role::AtaStaff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::AtaStaff => "ata",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "administrator" | "admin" => Ok(Role::Administrator),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            "parent" => Ok(Role::Parent),
            "ata" | "ata_staff" | "atastaff" => Ok(Role::AtaStaff),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

// ============================================================================
// USER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub cell: Option<String>,

    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub roles: BTreeSet<Role>,
    pub meta: VersionMeta,
}

impl Versioned for User {
    const ENTITY: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }
    fn meta(&self) -> &VersionMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut VersionMeta {
        &mut self.meta
    }
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// sha256 hex of `username:password`, username lowercased
pub fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn check_username(checks: FieldChecks, username: &str) -> FieldChecks {
    let username = username.trim();
    checks.length("username", username, 5, 20).custom(
        "username",
        username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_'),
        "Only letters, digits, '.' and '_' are allowed",
    )
}

fn check_contact(checks: FieldChecks, name: &str, surname: &str, email: &str, cell: Option<&str>) -> FieldChecks {
    let checks = checks
        .non_empty("name", name)
        .non_empty("surname", surname)
        .email("email", email);
    match cell {
        Some(cell) if !cell.trim().is_empty() => checks.phone("cell", cell),
        _ => checks,
    }
}

/// Form submitted by an administrator to create an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(default)]
    pub cell: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

impl NewUser {
    pub fn validate(&self) -> ValidationResult {
        let checks = check_username(FieldChecks::new("User"), &self.username).custom(
            "password",
            self.password.chars().count() >= 5,
            "Password must be at least 5 characters",
        );
        check_contact(checks, &self.name, &self.surname, &self.email, self.cell.as_deref()).finish()
    }
}

/// Editable personal data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEdit {
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(default)]
    pub cell: Option<String>,
}

impl UserEdit {
    pub fn validate(&self) -> ValidationResult {
        check_contact(FieldChecks::new("User"), &self.name, &self.surname, &self.email, self.cell.as_deref())
            .finish()
    }
}

fn normalise_cell(cell: &Option<String>) -> Option<String> {
    cell.as_ref()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

// ============================================================================
// SESSION
// ============================================================================

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub roles: BTreeSet<Role>,
}

impl Session {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Administrator)
    }

    pub fn require(&self, role: Role, action: &str) -> ServiceResult<()> {
        self.require_any(&[role], action)
    }

    pub fn require_any(&self, roles: &[Role], action: &str) -> ServiceResult<()> {
        if self.has_any(roles) {
            return Ok(());
        }

        let wanted: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(ServiceError::unauthorized(
            action,
            format!("{} is not {}", self.username, wanted.join(" or ")),
        ))
    }
}

/// Roles actually added and removed by [`UserDirectory::update_roles`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleChange {
    pub assigned: Vec<Role>,
    pub removed: Vec<Role>,
    pub roles: BTreeSet<Role>,
}

impl RoleChange {
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty() && self.removed.is_empty()
    }
}

// ============================================================================
// DIRECTORY
// ============================================================================

#[derive(Clone, Default)]
pub struct UserDirectory {
    users: VersionedStore<User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, new_user: &NewUser) -> ServiceResult<User> {
        new_user.validate()?;

        let username = new_user.username.trim();
        if self.find_by_username(username)?.is_some() {
            return Err(ServiceError::duplicate("User", username));
        }

        self.users.insert(User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            name: new_user.name.trim().to_string(),
            surname: new_user.surname.trim().to_string(),
            email: new_user.email.trim().to_string(),
            cell: normalise_cell(&new_user.cell),
            password_hash: hash_password(username, &new_user.password),
            roles: new_user.roles.clone(),
            meta: VersionMeta::new(),
        })
    }

    /// Check credentials. The reason never says which part was wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> ServiceResult<Session> {
        let user = self
            .find_by_username(username)?
            .filter(|u| u.password_hash == hash_password(&u.username, password))
            .ok_or_else(|| ServiceError::unauthorized("log in", "invalid username or password"))?;

        Ok(Session {
            user_id: user.id,
            username: user.username,
            roles: user.roles,
        })
    }

    pub fn edit(&self, id: &str, edit: &UserEdit) -> ServiceResult<User> {
        edit.validate()?;
        self.users.update(id, |user| {
            user.name = edit.name.trim().to_string();
            user.surname = edit.surname.trim().to_string();
            user.email = edit.email.trim().to_string();
            user.cell = normalise_cell(&edit.cell);
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> ServiceResult<User> {
        self.users.retire(id)
    }

    /// Remove first, then assign. Only effective changes are reported.
    pub fn update_roles(&self, id: &str, assign: &[Role], remove: &[Role]) -> ServiceResult<RoleChange> {
        let mut roles = self.users.get(id)?.roles;

        let mut removed = Vec::new();
        for role in remove {
            if roles.remove(role) {
                removed.push(*role);
            }
        }

        let mut assigned = Vec::new();
        for role in assign {
            if roles.insert(*role) {
                assigned.push(*role);
            }
        }

        let change = RoleChange {
            assigned,
            removed,
            roles,
        };

        if !change.is_empty() {
            let roles = change.roles.clone();
            self.users.update(id, |user| {
                user.roles = roles;
                Ok(())
            })?;
        }

        Ok(change)
    }

    pub fn get(&self, id: &str) -> ServiceResult<User> {
        self.users.get(id)
    }

    pub fn find_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        let wanted = username.trim().to_lowercase();
        Ok(self
            .users
            .find(|u| u.username.to_lowercase() == wanted)?
            .into_iter()
            .next())
    }

    /// Sorted by surname, then name
    pub fn list(&self) -> ServiceResult<Vec<User>> {
        let mut users = self.users.all_current()?;
        users.sort_by(|a, b| {
            a.surname
                .to_lowercase()
                .cmp(&b.surname.to_lowercase())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(users)
    }

    pub fn with_role(&self, role: Role) -> ServiceResult<Vec<User>> {
        self.users.find(|u| u.has_role(role))
    }

    pub fn history(&self, id: &str) -> ServiceResult<Vec<User>> {
        self.users.history(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, surname: &str, roles: &[Role]) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "secret1".to_string(),
            name: "Mario".to_string(),
            surname: surname.to_string(),
            email: format!("{}@school.it", username),
            cell: Some("+39 333 1234567".to_string()),
            roles: roles.iter().copied().collect(),
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!("ata".parse::<Role>().unwrap(), Role::AtaStaff);
        assert!("janitor".parse::<Role>().is_err());
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_new_user_validation() {
        let mut bad = new_user("ab", "Rossi", &[]);
        bad.password = "123".to_string();
        bad.email = "not-an-email".to_string();
        bad.cell = Some("xyz".to_string());

        let fields: Vec<String> = bad.validate().unwrap_err().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["username", "password", "email", "cell"]);

        let mut odd = new_user("mario-rossi", "Rossi", &[]);
        odd.cell = None;
        assert_eq!(odd.validate().unwrap_err()[0].message, "Only letters, digits, '.' and '_' are allowed");
    }

    #[test]
    fn test_create_and_authenticate() {
        let directory = UserDirectory::new();
        let user = directory.create(&new_user("mario.rossi", "Rossi", &[Role::Teacher])).unwrap();
        assert_ne!(user.password_hash, "secret1");

        let session = directory.authenticate("Mario.Rossi", "secret1").unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(session.has_role(Role::Teacher));

        let err = directory.authenticate("mario.rossi", "wrong").unwrap_err();
        assert_eq!(err.to_string(), "Not allowed to log in: invalid username or password");
        let err = directory.authenticate("nobody", "secret1").unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[test]
    fn test_username_unique_case_insensitive() {
        let directory = UserDirectory::new();
        directory.create(&new_user("mario.rossi", "Rossi", &[])).unwrap();
        let err = directory.create(&new_user("MARIO.ROSSI", "Rossi", &[])).unwrap_err();
        assert_eq!(err.kind(), "duplicate");
    }

    #[test]
    fn test_hash_depends_on_username() {
        assert_ne!(hash_password("alice", "pw123"), hash_password("bobby", "pw123"));
        assert_eq!(hash_password("Alice", "pw123"), hash_password("alice", "pw123"));
    }

    #[test]
    fn test_update_roles_removes_first() {
        let directory = UserDirectory::new();
        let user = directory
            .create(&new_user("mario.rossi", "Rossi", &[Role::Teacher, Role::Parent]))
            .unwrap();

        let change = directory
            .update_roles(&user.id, &[Role::Administrator, Role::Teacher], &[Role::Parent, Role::Student])
            .unwrap();

        assert_eq!(change.assigned, vec![Role::Administrator]);
        assert_eq!(change.removed, vec![Role::Parent]);
        assert_eq!(
            change.roles.into_iter().collect::<Vec<_>>(),
            vec![Role::Administrator, Role::Teacher]
        );
        assert_eq!(directory.history(&user.id).unwrap().len(), 2);
    }

    #[test]
    fn test_update_roles_noop_keeps_version() {
        let directory = UserDirectory::new();
        let user = directory.create(&new_user("mario.rossi", "Rossi", &[Role::Teacher])).unwrap();

        let change = directory.update_roles(&user.id, &[Role::Teacher], &[]).unwrap();
        assert!(change.is_empty());
        assert_eq!(directory.get(&user.id).unwrap().meta.version, 1);
    }

    #[test]
    fn test_edit_and_delete() {
        let directory = UserDirectory::new();
        let user = directory.create(&new_user("mario.rossi", "Rossi", &[])).unwrap();

        let edited = directory
            .edit(
                &user.id,
                &UserEdit {
                    name: "Mario".to_string(),
                    surname: "Bianchi".to_string(),
                    email: "m.bianchi@school.it".to_string(),
                    cell: Some("  ".to_string()),
                },
            )
            .unwrap();
        assert_eq!(edited.surname, "Bianchi");
        assert_eq!(edited.cell, None);

        directory.delete(&user.id).unwrap();
        assert_eq!(directory.get(&user.id).unwrap_err().kind(), "not_found");
        assert!(directory.authenticate("mario.rossi", "secret1").is_err());
    }

    #[test]
    fn test_list_sorted_by_surname_then_name() {
        let directory = UserDirectory::new();
        directory.create(&new_user("verdi.g", "Verdi", &[])).unwrap();
        let mut anna = new_user("bianchi.a", "Bianchi", &[]);
        anna.name = "Anna".to_string();
        directory.create(&anna).unwrap();
        directory.create(&new_user("bianchi.m", "Bianchi", &[])).unwrap();

        let order: Vec<String> = directory.list().unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(order, vec!["bianchi.a", "bianchi.m", "verdi.g"]);
    }

    #[test]
    fn test_session_require() {
        let session = Session {
            user_id: "u1".to_string(),
            username: "mario.rossi".to_string(),
            roles: [Role::Teacher].into_iter().collect(),
        };

        assert!(session.require(Role::Teacher, "insert a note").is_ok());
        let err = session.require(Role::Administrator, "delete a class").unwrap_err();
        assert_eq!(err.to_string(), "Not allowed to delete a class: mario.rossi is not administrator");
        assert!(session
            .require_any(&[Role::Administrator, Role::Teacher], "edit a report card")
            .is_ok());
    }
}
