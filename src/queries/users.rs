use sea_query::{Expr, Func, Query, SqliteQueryBuilder};

use crate::schema::Users;
use crate::users::NewUser;

const USER_COLUMNS: [Users; 13] = [
    Users::Id,
    Users::Email,
    Users::FirstName,
    Users::LastName,
    Users::PasswordHash,
    Users::Role,
    Users::Grade,
    Users::Section,
    Users::Specialty,
    Users::Avatar,
    Users::IsActive,
    Users::RegisteredAt,
    Users::LastAccessAt,
];

/// INSERT INTO users (email, first_name, ..., registered_at, last_access_at) VALUES (...)
pub fn insert(user: &NewUser, now_ms: i64) -> String {
    Query::insert()
        .into_table(Users::Table)
        .columns([
            Users::Email,
            Users::FirstName,
            Users::LastName,
            Users::PasswordHash,
            Users::Role,
            Users::Grade,
            Users::Section,
            Users::Specialty,
            Users::IsActive,
            Users::RegisteredAt,
            Users::LastAccessAt,
        ])
        .values_panic([
            user.email.clone().into(),
            user.first_name.clone().into(),
            user.last_name.clone().into(),
            user.password_hash.clone().into(),
            user.role.as_str().into(),
            user.grade.clone().into(),
            user.section.clone().into(),
            user.specialty.clone().into(),
            1i32.into(),
            now_ms.into(),
            now_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT <user columns> FROM users WHERE email = ?
pub fn select_by_email(email: &str) -> String {
    Query::select()
        .columns(USER_COLUMNS)
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .to_string(SqliteQueryBuilder)
}

/// SELECT <user columns> FROM users WHERE id = ?
pub fn select_by_id(id: i64) -> String {
    Query::select()
        .columns(USER_COLUMNS)
        .from(Users::Table)
        .and_where(Expr::col(Users::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)
pub fn email_exists(email: &str) -> String {
    let subquery = Query::select()
        .expr(Expr::val(1))
        .from(Users::Table)
        .and_where(Expr::col(Users::Email).eq(email))
        .to_owned();

    Query::select()
        .expr(Expr::exists(subquery))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE users SET last_access_at = ? WHERE id = ?
pub fn update_last_access(id: i64, now_ms: i64) -> String {
    Query::update()
        .table(Users::Table)
        .value(Users::LastAccessAt, now_ms)
        .and_where(Expr::col(Users::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM users WHERE role = ? AND is_active = 1
pub fn count_active_by_role(role: &str) -> String {
    Query::select()
        .expr(Func::count(Expr::col(Users::Id)))
        .from(Users::Table)
        .and_where(Expr::col(Users::Role).eq(role))
        .and_where(Expr::col(Users::IsActive).eq(1))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(id) FROM users
pub fn count_all() -> String {
    Query::select()
        .expr(Func::count(Expr::col(Users::Id)))
        .from(Users::Table)
        .to_string(SqliteQueryBuilder)
}
