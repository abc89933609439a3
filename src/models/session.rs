use uuid::Uuid;

/// A login. Its id travels in the session cookie next to the user id.
#[derive(Debug, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}
