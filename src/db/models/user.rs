//! User, role and session models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Platform roles, from most to least privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "super-admin")]
    SuperAdmin,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "technician")]
    Technician,
    #[serde(rename = "farmer")]
    Farmer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Technician, Role::Farmer];

    /// Roles that may review submissions and read the activity log
    pub const REVIEWERS: &'static [Role] = &[Role::SuperAdmin, Role::Admin];

    /// Roles allowed to create submission records
    pub const SUBMITTERS: &'static [Role] = &[Role::SuperAdmin, Role::Admin, Role::Technician];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::Admin => "admin",
            Role::Technician => "technician",
            Role::Farmer => "farmer",
        }
    }

    /// Permission level (higher = more permissions)
    pub fn level(&self) -> u8 {
        match self {
            Role::SuperAdmin => 4,
            Role::Admin => 3,
            Role::Technician => 2,
            Role::Farmer => 1,
        }
    }

    pub fn is_reviewer(&self) -> bool {
        Self::REVIEWERS.contains(self)
    }

    /// Whether an account with this role may create, edit or delete accounts of `target`.
    ///
    /// Admins manage technicians only; super-admins manage every staff role.
    pub fn can_manage(&self, target: Role) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Admin => target == Role::Technician,
            _ => false,
        }
    }

    /// Roles visible in the user management list for this role
    pub fn managed_roles(&self) -> &'static [Role] {
        match self {
            Role::SuperAdmin => &Role::ALL,
            Role::Admin => &[Role::Technician],
            _ => &[],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "super-admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "technician" => Ok(Role::Technician),
            "farmer" => Ok(Role::Farmer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_verified: bool,
    pub contact_number: Option<String>,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Parsed role; unknown values in the database degrade to the least privileged role
    pub fn role_enum(&self) -> Role {
        self.role.parse().unwrap_or(Role::Farmer)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// User as returned by the API (never carries the password hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_verified: bool,
    pub contact_number: Option<String>,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let name = user.full_name();
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            name,
            email: user.email,
            role: user.role,
            is_verified: user.is_verified,
            contact_number: user.contact_number,
            profile_image: user.profile_image,
            bio: user.bio,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: Option<String>,
    pub contact_number: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Request body for staff account creation
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.contact_number.is_none()
            && self.bio.is_none()
            && self.role.is_none()
    }
}

/// Query parameters for the user management list
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    /// Comma separated role filter
    pub roles: Option<String>,
    /// Matches first name, last name or email
    pub search: Option<String>,
    pub verified: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub items: Vec<UserResponse>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct RoleCount {
    pub role: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct RolesSummary {
    pub total: i64,
    pub verified: i64,
    pub unverified: i64,
    pub roles: Vec<RoleCount>,
}

/// Data for inserting a user row. The password must already be hashed.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub is_verified: bool,
    pub contact_number: Option<&'a str>,
}

pub async fn find_user_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE lower(email) = lower(?)")
        .bind(email.trim())
        .fetch_optional(db)
        .await
}

pub async fn insert_user(db: &SqlitePool, new_user: &NewUser<'_>) -> Result<User, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO users (id, first_name, last_name, email, password_hash, role, is_verified, contact_number)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new_user.first_name.trim())
    .bind(new_user.last_name.trim())
    .bind(new_user.email.trim().to_lowercase())
    .bind(new_user.password_hash)
    .bind(new_user.role.as_str())
    .bind(new_user.is_verified)
    .bind(new_user.contact_number)
    .execute(db)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}

/// Apply a partial update. Returns `None` when the user does not exist.
pub async fn update_user(
    db: &SqlitePool,
    id: &str,
    req: &UpdateUserRequest,
    role: Option<Role>,
) -> Result<Option<User>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            email = COALESCE(?, email),
            contact_number = COALESCE(?, contact_number),
            bio = COALESCE(?, bio),
            role = COALESCE(?, role),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(|e| e.trim().to_lowercase()))
    .bind(req.contact_number.as_deref())
    .bind(req.bio.as_deref())
    .bind(role.map(|r| r.as_str()))
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_user_by_id(db, id).await
}

pub async fn set_user_password(db: &SqlitePool, id: &str, password_hash: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_user_verified(db: &SqlitePool, id: &str, verified: bool) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET is_verified = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(verified)
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_user(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// List users restricted to `allowed` roles, with optional filters and pagination
pub async fn list_users(
    db: &SqlitePool,
    allowed: &[Role],
    query: &UserListQuery,
) -> Result<UserListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(25).clamp(1, 100);
    let offset = (page - 1).saturating_mul(page_size);

    // Requested roles narrow the allowed set, never widen it
    let roles: Vec<Role> = match &query.roles {
        Some(raw) => raw
            .split(',')
            .filter_map(|r| r.parse::<Role>().ok())
            .filter(|r| allowed.contains(r))
            .collect(),
        None => allowed.to_vec(),
    };

    if roles.is_empty() {
        return Ok(UserListResponse {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        });
    }

    let mut conditions = vec![format!(
        "role IN ({})",
        vec!["?"; roles.len()].join(", ")
    )];
    let mut bindings: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push(
            "(first_name LIKE ? OR last_name LIKE ? OR email LIKE ? OR (first_name || ' ' || last_name) LIKE ?)"
                .to_string(),
        );
        let pattern = format!("%{}%", search);
        for _ in 0..4 {
            bindings.push(pattern.clone());
        }
    }

    if let Some(verified) = query.verified {
        conditions.push(format!("is_verified = {}", if verified { 1 } else { 0 }));
    }

    let where_clause = format!("WHERE {}", conditions.join(" AND "));

    let count_sql = format!("SELECT COUNT(*) FROM users {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "SELECT * FROM users {} ORDER BY created_at DESC, last_name ASC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut list_query = sqlx::query_as::<_, User>(&sql);
    for binding in &bindings {
        list_query = list_query.bind(binding);
    }
    let users = list_query.bind(page_size).bind(offset).fetch_all(db).await?;

    Ok(UserListResponse {
        items: users.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        page_size,
    })
}

pub async fn roles_summary(db: &SqlitePool) -> Result<RolesSummary, sqlx::Error> {
    let (total, verified): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_verified = 1 THEN 1 ELSE 0 END), 0) FROM users",
    )
    .fetch_one(db)
    .await?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
            .fetch_all(db)
            .await?;

    let roles = Role::ALL
        .iter()
        .map(|role| RoleCount {
            role: role.to_string(),
            count: rows
                .iter()
                .find(|(r, _)| r == role.as_str())
                .map(|(_, c)| *c)
                .unwrap_or(0),
        })
        .collect();

    Ok(RolesSummary {
        total,
        verified,
        unverified: total - verified,
        roles,
    })
}

pub async fn count_users_with_role(db: &SqlitePool, role: Role) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
        .bind(role.as_str())
        .fetch_one(db)
        .await
}
