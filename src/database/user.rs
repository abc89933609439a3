use crate::database::postgres_repository::{PostgresRepository, is_unique_violation};
use crate::error::app_error::AppError;
use crate::models::user::User;
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, Salt, SaltString};
use std::sync::LazyLock;
use uuid::Uuid;

/// Real Argon2 hash verified when the email is unknown, so failed logins take
/// the same time whether or not the account exists.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"never-a-real-password", Salt::from(&salt))
        .ok()
        .map(|hash| hash.to_string())
});

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";

impl PostgresRepository {
    pub async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let (salt, password_hash) = password_hash(password)?;

        let query = format!(
            r#"
            INSERT INTO users (name, email, salt, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(name)
            .bind(email)
            .bind(&salt)
            .bind(&password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::UserAlreadyExists(email.to_string())
                } else {
                    AppError::from(e)
                }
            })?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(&self.pool).await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(&self.pool).await?;

        Ok(user)
    }

    pub fn verify_password(&self, user: &User, password: &str) -> Result<(), AppError> {
        let password_hash = PasswordHash::new(&user.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &password_hash)
            .map_err(|_| AppError::InvalidCredentials)?;

        Ok(())
    }

    pub fn dummy_verify(password: &str) {
        if let Some(hash) = DUMMY_HASH.as_deref().and_then(|hash| PasswordHash::new(hash).ok()) {
            let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
        }
    }
}

pub(crate) fn password_hash(password: &str) -> Result<(String, String), AppError> {
    let salt_string = SaltString::generate(&mut OsRng);
    let salt = Salt::from(&salt_string);
    let password_hash = PasswordHash::generate(Argon2::default(), password.as_bytes(), salt)?;

    Ok((salt.to_string(), password_hash.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn generated_hash_verifies_only_the_original_password() {
        let (_, hash) = password_hash("correct horse battery").expect("hash");
        let user = User {
            id: Uuid::new_v4(),
            name: "Budi".to_string(),
            email: "budi@example.com".to_string(),
            password_hash: hash,
            created_at: Utc::now(),
        };
        let repository = PostgresRepository {
            pool: sqlx::PgPool::connect_lazy("postgres://localhost/unused").expect("lazy pool"),
        };

        assert!(repository.verify_password(&user, "correct horse battery").is_ok());
        assert!(matches!(repository.verify_password(&user, "wrong"), Err(AppError::InvalidCredentials)));
    }
}
