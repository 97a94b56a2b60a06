//! Fixture service analyzed by the integration tests.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct UserPath {
    pub id: String,
}

#[derive(Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ListFilter {
    pub page: Option<u32>,
    pub active: Option<bool>,
}

/// Returns the service health.
#[route(GET, "/health")]
pub async fn health() {}

/// Returns one user by id.
#[route(GET, "/users/{id}")]
pub async fn get_user(Path(p): Path<UserPath>) -> Json<User> {
    todo!()
}

#[route(GET, "/users")]
pub async fn list_users(Query(filter): Query<ListFilter>) -> Json<Vec<User>> {
    todo!()
}

#[route(POST, "/users")]
pub async fn create_user(Json(body): Json<CreateUser>) -> Json<User> {
    todo!()
}
