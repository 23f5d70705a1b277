use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, NotSet,
    PaginatorTrait, QueryFilter, Set, Statement, Value,
};
use tracing::info;

use crate::{
    auth,
    catalog::now_sec,
    entities::user,
    error::{AppError, AppResult, StoreError},
    models::RegisterRequest,
};

/// A validated registration with the password already hashed.
#[derive(Debug)]
pub struct NewAccount {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub is_admin: bool,
}

impl NewAccount {
    /// Checks the registration fields and hashes the password.
    pub async fn from_request(req: RegisterRequest, is_admin: bool) -> AppResult<Self> {
        let fullname = req.fullname.trim().to_string();
        let username = req.username.trim().to_string();
        let email = req.email.trim().to_lowercase();
        let phone = req.phone.trim().to_string();

        if [&fullname, &username, &email, &phone].iter().any(|f| f.is_empty())
            || req.password.is_empty()
        {
            return Err(AppError::bad_request("All fields are required."));
        }
        if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::bad_request("phone must be 10 digits"));
        }

        let password_hash = auth::hash_password_blocking(req.password).await?;

        Ok(Self { fullname, username, email, phone, password_hash, is_admin })
    }
}

#[derive(Clone)]
pub struct Accounts {
    db: DatabaseConnection,
}

impl Accounts {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn register(&self, account: NewAccount) -> Result<user::Model, StoreError> {
        let model = user::ActiveModel {
            id: NotSet,
            fullname: Set(account.fullname),
            username: Set(account.username),
            email: Set(account.email),
            phone: Set(account.phone),
            password_hash: Set(account.password_hash),
            is_admin: Set(account.is_admin),
            created_at: Set(now_sec()),
        };

        let user = model.insert(&self.db).await.map_err(registration_conflict)?;
        info!(
            user_id = user.id,
            username = %user.username,
            admin = user.is_admin,
            "registered user"
        );
        Ok(user)
    }

    /// Registers `account` as an admin only if no admin exists yet. The
    /// existence check and the insert are a single statement, so of several
    /// concurrent bootstrap attempts exactly one wins. Returns `None` when an
    /// admin already exists.
    pub async fn bootstrap_admin(
        &self,
        account: NewAccount,
    ) -> Result<Option<user::Model>, StoreError> {
        let backend = self.db.get_database_backend();
        let username = account.username.clone();
        let inserted = self
            .db
            .execute(Statement::from_sql_and_values(
                backend,
                r#"INSERT INTO "user"
                    (fullname, username, email, phone, password_hash, is_admin, created_at)
                SELECT ?, ?, ?, ?, ?, TRUE, ?
                WHERE NOT EXISTS (SELECT 1 FROM "user" WHERE is_admin)"#,
                [
                    Value::from(account.fullname),
                    Value::from(account.username),
                    Value::from(account.email),
                    Value::from(account.phone),
                    Value::from(account.password_hash),
                    Value::from(now_sec()),
                ],
            ))
            .await
            .map_err(registration_conflict)?;

        if inserted.rows_affected() == 0 {
            return Ok(None);
        }

        let user = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound("bootstrap admin missing after insert".into()))?;
        info!(user_id = user.id, username = %user.username, "registered first admin");
        Ok(Some(user))
    }

    /// Returns the user only when the email exists and the password matches.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<user::Model>, StoreError> {
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.db)
            .await?;
        let Some(user) = user else {
            return Ok(None);
        };
        let matches =
            auth::verify_password_blocking(password.to_string(), user.password_hash.clone()).await;
        Ok(matches.then_some(user))
    }

    pub async fn has_admin(&self) -> Result<bool, StoreError> {
        let admins =
            user::Entity::find().filter(user::Column::IsAdmin.eq(true)).count(&self.db).await?;
        Ok(admins > 0)
    }
}

fn registration_conflict(err: DbErr) -> StoreError {
    match StoreError::from(err) {
        StoreError::Conflict(_) => {
            StoreError::Conflict("username or email already registered".to_string())
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            fullname: "Ada Lovelace".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            phone: "5551234567".to_string(),
            password: "analytical".to_string(),
            role: None,
        }
    }

    async fn account(username: &str, email: &str, is_admin: bool) -> NewAccount {
        NewAccount::from_request(request(username, email), is_admin).await.unwrap()
    }

    #[tokio::test]
    async fn registration_requires_every_field() {
        let mut req = request("ada", "ada@example.com");
        req.fullname.clear();
        assert!(matches!(
            NewAccount::from_request(req, false).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn registration_checks_phone_shape() {
        let mut req = request("ada", "ada@example.com");
        req.phone = "555-1234".to_string();
        assert!(matches!(
            NewAccount::from_request(req, false).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn register_and_authenticate() {
        let accounts = Accounts::new(db::connect_in_memory().await.unwrap());
        let user = accounts.register(account("ada", "Ada@Example.com", false).await).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_ne!(user.password_hash, "analytical");

        let found = accounts.authenticate("ada@example.com", "analytical").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(accounts.authenticate("ada@example.com", "wrong").await.unwrap().is_none());
        assert!(accounts.authenticate("nobody@example.com", "analytical").await.unwrap().is_none());
        assert!(!accounts.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let accounts = Accounts::new(db::connect_in_memory().await.unwrap());
        accounts.register(account("ada", "ada@example.com", true).await).await.unwrap();
        assert!(accounts.has_admin().await.unwrap());

        let same_email = account("ada2", "ada@example.com", false).await;
        assert!(matches!(accounts.register(same_email).await, Err(StoreError::Conflict(_))));

        let same_name = account("ada", "other@example.com", false).await;
        assert!(matches!(accounts.register(same_name).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn only_one_concurrent_bootstrap_becomes_admin() {
        let accounts = Accounts::new(db::connect_in_memory().await.unwrap());
        let (a, b) = (
            account("first", "first@example.com", true).await,
            account("second", "second@example.com", true).await,
        );

        let (a, b) = tokio::join!(accounts.bootstrap_admin(a), accounts.bootstrap_admin(b));
        let winners = [a.unwrap(), b.unwrap()].into_iter().flatten().collect::<Vec<_>>();
        assert_eq!(winners.len(), 1);
        assert!(winners[0].is_admin);

        let admins =
            user::Entity::find().filter(user::Column::IsAdmin.eq(true)).count(&accounts.db).await;
        assert_eq!(admins.unwrap(), 1);

        let late = account("third", "third@example.com", true).await;
        assert!(accounts.bootstrap_admin(late).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bootstrap_with_a_taken_username_conflicts() {
        let accounts = Accounts::new(db::connect_in_memory().await.unwrap());
        accounts.register(account("ada", "ada@example.com", false).await).await.unwrap();

        let clash = account("ada", "root@example.com", true).await;
        assert!(matches!(accounts.bootstrap_admin(clash).await, Err(StoreError::Conflict(_))));
        assert!(!accounts.has_admin().await.unwrap());
    }
}
