use serde::{Deserialize, Serialize};

use super::repo_types::User;

#[derive(Debug, Deserialize, Default)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub phone_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub initial_coins: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub phone_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}
