//! User accounts, credentials and login sessions

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use log::info;
use serde::Deserialize;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    generate_session_token, GRADES, REMEMBER_ME_LIFETIME_HOURS, SECTIONS, SESSION_LIFETIME_HOURS,
};
use crate::db::now_ms;
use crate::error::{AppError, Result};
use crate::queries::{sessions, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
        }
    }

    /// Admins and teachers may upload music
    pub fn can_upload(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts the stored names and the values used by the registration form
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" | "docente" => Ok(Role::Teacher),
            "student" | "estudiante" => Ok(Role::Student),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub grade: Option<String>,
    pub section: Option<String>,
    pub specialty: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub registered_at_ms: i64,
    pub last_access_at_ms: i64,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn can_upload(&self) -> bool {
        self.role.can_upload()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn user_from_row(row: &SqliteRow) -> std::result::Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::from_str(&role).map_err(|e| sqlx::Error::Decode(e.into()))?,
        grade: row.try_get("grade")?,
        section: row.try_get("section")?,
        specialty: row.try_get("specialty")?,
        avatar: row.try_get("avatar")?,
        is_active: row.try_get("is_active")?,
        registered_at_ms: row.try_get("registered_at")?,
        last_access_at_ms: row.try_get("last_access_at")?,
    })
}

/// A user row ready to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub grade: Option<String>,
    pub section: Option<String>,
    pub specialty: Option<String>,
}

/// Registration form as posted by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "nombre")]
    pub first_name: String,
    #[serde(default, rename = "apellidos")]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password2: String,
    #[serde(default, rename = "rol")]
    pub role: String,
    #[serde(default, rename = "grado")]
    pub grade: String,
    #[serde(default, rename = "seccion")]
    pub section: String,
    #[serde(default, rename = "especialidad")]
    pub specialty: String,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Lowercased, trimmed email used for storage and lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

impl Registration {
    /// Check the form constraints and return the role-consistent fields
    ///
    /// Grade and section are kept only for students, specialty only for teachers.
    pub fn validate(&self) -> Result<(Role, Option<String>, Option<String>, Option<String>)> {
        let email = normalize_email(&self.email);
        if !is_plausible_email(&email) {
            return Err(AppError::Validation("Please enter a valid email address.".into()));
        }
        for (label, value) in [("First name", &self.first_name), ("Last name", &self.last_name)] {
            let len = value.trim().chars().count();
            if !(2..=50).contains(&len) {
                return Err(AppError::Validation(format!(
                    "{} must be between 2 and 50 characters.",
                    label
                )));
            }
        }
        if self.password.chars().count() < 6 {
            return Err(AppError::Validation(
                "Password must be at least 6 characters.".into(),
            ));
        }
        if self.password != self.password2 {
            return Err(AppError::Validation("Passwords do not match.".into()));
        }

        let role = if self.role.trim().is_empty() {
            Role::Student
        } else {
            Role::from_str(self.role.trim())
                .map_err(|_| AppError::Validation("Please choose a valid role.".into()))?
        };
        if role == Role::Admin {
            return Err(AppError::Validation("Please choose a valid role.".into()));
        }

        let grade = non_empty(&self.grade);
        if let Some(g) = grade.as_deref() {
            if !GRADES.contains(&g) {
                return Err(AppError::Validation("Please choose a valid grade.".into()));
            }
        }
        let section = non_empty(&self.section);
        if let Some(s) = section.as_deref() {
            if !SECTIONS.contains(&s) {
                return Err(AppError::Validation("Please choose a valid section.".into()));
            }
        }
        let specialty = non_empty(&self.specialty);
        if specialty.as_ref().is_some_and(|s| s.chars().count() > 100) {
            return Err(AppError::Validation(
                "Specialty must be at most 100 characters.".into(),
            ));
        }

        Ok(match role {
            Role::Student => (role, grade, section, None),
            Role::Teacher => (role, None, None, specialty),
            Role::Admin => (role, None, None, None),
        })
    }
}

fn hasher(secret: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(secret, Algorithm::Argon2id, Version::V0x13, Params::default())
        .map_err(|e| AppError::Internal(format!("Failed to set up password hasher: {}", e)))
}

/// Hash a password with argon2id, peppered with the application secret
pub fn hash_password(secret: &str, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(secret.as_bytes())?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(secret: &str, hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    match hasher(secret.as_bytes()) {
        Ok(argon2) => argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let sql = users::select_by_email(&normalize_email(email));
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    Ok(row.as_ref().map(user_from_row).transpose()?)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = users::select_by_id(id);
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    Ok(row.as_ref().map(user_from_row).transpose()?)
}

/// Insert a user whose fields are already validated
pub async fn insert_user(pool: &SqlitePool, new_user: &NewUser) -> Result<User> {
    let sql = users::insert(new_user, now_ms());
    let result = sqlx::query(&sql).execute(pool).await.map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::Validation("This email is already registered.".into())
        }
        other => AppError::Database(other),
    })?;

    find_by_id(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| AppError::Internal("user vanished after insert".into()))
}

/// Validate a registration form and create the account
pub async fn register(pool: &SqlitePool, secret: &str, form: &Registration) -> Result<User> {
    let (role, grade, section, specialty) = form.validate()?;
    let email = normalize_email(&form.email);

    let sql = users::email_exists(&email);
    let exists: bool = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    if exists {
        return Err(AppError::Validation("This email is already registered.".into()));
    }

    let new_user = NewUser {
        email,
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        password_hash: hash_password(secret, &form.password)?,
        role,
        grade,
        section,
        specialty,
    };
    let user = insert_user(pool, &new_user).await?;
    info!("New user registered: {} ({})", user.email, user.role);
    Ok(user)
}

/// Check credentials
///
/// Returns `None` for an unknown email, a wrong password and an inactive account alike.
pub async fn authenticate(
    pool: &SqlitePool,
    secret: &str,
    email: &str,
    password: &str,
) -> Result<Option<User>> {
    let Some(mut user) = find_by_email(pool, email).await? else {
        return Ok(None);
    };
    if !user.is_active || !verify_password(secret, &user.password_hash, password) {
        return Ok(None);
    }

    let now = now_ms();
    let sql = users::update_last_access(user.id, now);
    sqlx::query(&sql).execute(pool).await?;
    user.last_access_at_ms = now;
    Ok(Some(user))
}

pub async fn count_active_by_role(pool: &SqlitePool, role: Role) -> Result<i64> {
    let sql = users::count_active_by_role(role.as_str());
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
    let sql = users::count_all();
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

/// Create the administrator account if no user has that email yet
/// Returns true when an account was created
pub async fn ensure_admin(
    pool: &SqlitePool,
    secret: &str,
    email: &str,
    password: &str,
) -> Result<bool> {
    if find_by_email(pool, email).await?.is_some() {
        return Ok(false);
    }
    let admin = NewUser {
        email: normalize_email(email),
        first_name: "Administrator".to_string(),
        last_name: "System".to_string(),
        password_hash: hash_password(secret, password)?,
        role: Role::Admin,
        grade: None,
        section: None,
        specialty: None,
    };
    insert_user(pool, &admin).await?;
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at_ms: i64,
}

impl Session {
    /// Seconds until expiry, for the cookie Max-Age
    pub fn max_age_secs(&self) -> i64 {
        ((self.expires_at_ms - now_ms()) / 1000).max(0)
    }
}

pub async fn create_session(pool: &SqlitePool, user_id: i64, remember: bool) -> Result<Session> {
    let hours = if remember {
        REMEMBER_ME_LIFETIME_HOURS
    } else {
        SESSION_LIFETIME_HOURS
    };
    let now = now_ms();
    let session = Session {
        token: generate_session_token(),
        user_id,
        expires_at_ms: now + hours * 3600 * 1000,
    };
    let sql = sessions::insert(&session.token, user_id, now, session.expires_at_ms);
    sqlx::query(&sql).execute(pool).await?;
    Ok(session)
}

/// Resolve a session token to its active, unexpired user
pub async fn find_session_user(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let sql = sessions::select_live_user_id(token, now_ms());
    let user_id: Option<i64> = sqlx::query_scalar(&sql).fetch_optional(pool).await?;
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    Ok(find_by_id(pool, user_id).await?.filter(|u| u.is_active))
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    let sql = sessions::delete(token);
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// Remove expired sessions, returning how many were deleted
pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let sql = sessions::delete_expired(now_ms());
    Ok(sqlx::query(&sql).execute(pool).await?.rows_affected())
}
