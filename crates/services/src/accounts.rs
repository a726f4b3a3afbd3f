//! User accounts, credentials and the administrative dashboard.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{PageRequest, UserId};
use domain::user::{normalize_email, validate_email, validate_name, validate_password};
use domain::{Money, Order, Role, User, UserSummary};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use store::{OrderFilter, Store};
use thiserror::Error;

use crate::actor::Actor;
use crate::error::{Result, ServiceError};

/// How long a password reset token stays valid.
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;

const RECENT_ORDERS: u32 = 5;
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

/// Input for registration and administrative user creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Ignored on self-registration.
    #[serde(default)]
    pub role: Option<Role>,
}

/// Full replacement of a user's editable fields. The password is kept when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_orders: u64,
    pub total_revenue: Money,
    pub recent_orders: Vec<Order>,
}

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers account messages to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, email: &str, token: &str) -> std::result::Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, email: &str, token: &str) -> std::result::Result<(), NotifyError> {
        tracing::debug!(email, token, "password reset token issued");
        Ok(())
    }
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// A fresh reset token and the digest that is stored in its place.
fn generate_reset_token() -> (String, String) {
    let token = hex::encode(rand::random::<[u8; 32]>());
    let digest = reset_token_digest(&token);
    (token, digest)
}

fn reset_token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct AccountService<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> AccountService<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Self-registration always creates a customer.
    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: NewUser) -> Result<User> {
        self.insert_user(input, Role::Customer).await
    }

    /// Checks credentials. Unknown emails and wrong passwords fail the same way.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .find_user_by_email(&normalize_email(email))
            .await?
            .filter(|user| verify_password(password, &user.password_hash))
            .ok_or_else(|| ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        tracing::info!(user_id = %user.id, "user authenticated");
        Ok(user)
    }

    /// Issues a reset token if the email is known. Succeeds either way.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let Some(mut user) = self.store.find_user_by_email(&normalize_email(email)).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let (token, digest) = generate_reset_token();
        user.reset_token = Some(digest);
        user.reset_token_expires_at = Some(Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS));
        user.updated_at = Utc::now();
        self.store.update_user(&user).await?;

        if let Err(e) = self.notifier.send_password_reset(&user.email, &token).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to deliver reset token");
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;

        let digest = reset_token_digest(token.trim());
        let mut user = self
            .store
            .find_user_by_reset_token(&digest)
            .await?
            .filter(|user| user.reset_token_matches(&digest, Utc::now()))
            .ok_or_else(|| ServiceError::validation(INVALID_RESET_TOKEN))?;

        user.password_hash = hash_password(new_password)?;
        user.reset_token = None;
        user.reset_token_expires_at = None;
        user.updated_at = Utc::now();
        self.store.update_user(&user).await?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        Ok(self.store.list_users(None).await?)
    }

    pub async fn get_user(&self, id: UserId, actor: Actor) -> Result<User> {
        if !actor.can_access(id) {
            return Err(ServiceError::Forbidden("cannot access another user".to_string()));
        }
        self.find_user(id).await
    }

    /// Administrative creation; the role defaults to customer.
    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: NewUser) -> Result<User> {
        let role = input.role.unwrap_or_default();
        self.insert_user(input, role).await
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_user(&self, id: UserId, actor: Actor, update: UserUpdate) -> Result<User> {
        let patch = UserPatch {
            name: Some(update.name),
            email: Some(update.email),
            password: update.password,
        };
        self.patch_user(id, actor, patch).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn patch_user(&self, id: UserId, actor: Actor, patch: UserPatch) -> Result<User> {
        let mut user = self.get_user(id, actor).await?;

        if let Some(name) = patch.name {
            validate_name(&name)?;
            user.name = name.trim().to_string();
        }
        if let Some(email) = patch.email {
            validate_email(&email)?;
            let email = normalize_email(&email);
            if email != user.email {
                self.ensure_email_free(&email).await?;
                user.email = email;
            }
        }
        if let Some(password) = patch.password {
            validate_password(&password)?;
            user.password_hash = hash_password(&password)?;
        }
        user.updated_at = Utc::now();

        if !self.store.update_user(&user).await? {
            return Err(ServiceError::not_found(format!("User {id}")));
        }
        Ok(user)
    }

    /// Deletes any user without orders.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        let deleted = self.store.delete_user(id).await.map_err(|e| match ServiceError::from(e) {
            ServiceError::AlreadyExists(_) => {
                ServiceError::HasDependents("Cannot delete user with existing orders".to_string())
            }
            other => other,
        })?;
        if !deleted {
            return Err(ServiceError::not_found(format!("User {id}")));
        }
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn list_admins(&self) -> Result<Vec<UserSummary>> {
        Ok(self.store.list_users(Some(Role::Admin)).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_role(&self, id: UserId, role: Role) -> Result<User> {
        let mut user = self.find_user(id).await?;
        user.role = role;
        user.updated_at = Utc::now();
        self.store.update_user(&user).await?;
        tracing::info!(user_id = %id, role = %role, "user role changed");
        Ok(user)
    }

    /// Deletion from the admin panel: admins and users with orders are kept.
    #[tracing::instrument(skip(self))]
    pub async fn admin_delete_user(&self, id: UserId) -> Result<()> {
        let user = self.find_user(id).await?;
        if user.role.is_admin() {
            return Err(ServiceError::Forbidden("Cannot delete admin user".to_string()));
        }
        if self.store.count_orders(Some(id)).await? > 0 {
            return Err(ServiceError::HasDependents(
                "Cannot delete user with existing orders".to_string(),
            ));
        }
        self.delete_user(id).await
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let recent = self
            .store
            .page_orders(
                OrderFilter::default(),
                PageRequest::new(Some(1), Some(RECENT_ORDERS)),
            )
            .await?;

        Ok(DashboardStats {
            total_users: self.store.count_users().await?,
            total_orders: self.store.count_orders(None).await?,
            total_revenue: self.store.completed_revenue().await?,
            recent_orders: recent.items,
        })
    }

    async fn find_user(&self, id: UserId) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("User {id}")))
    }

    async fn ensure_email_free(&self, email: &str) -> Result<()> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(ServiceError::AlreadyExists(
                "Email already registered".to_string(),
            ));
        }
        Ok(())
    }

    async fn insert_user(&self, input: NewUser, role: Role) -> Result<User> {
        validate_name(&input.name)?;
        validate_email(&input.email)?;
        validate_password(&input.password)?;
        self.ensure_email_free(&normalize_email(&input.email)).await?;

        let user = User::new(&input.name, &input.email, hash_password(&input.password)?, role);
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, role = %role, "user created");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderService;
    use crate::test_support::seed_product;
    use std::sync::Mutex;
    use store::{InMemoryStore, UserStore};

    #[derive(Default)]
    struct CapturingNotifier {
        tokens: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn send_password_reset(&self, email: &str, token: &str) -> std::result::Result<(), NotifyError> {
            self.tokens
                .lock()
                .unwrap()
                .push((email.to_string(), token.to_string()));
            Ok(())
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Achieng".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
            role: None,
        }
    }

    fn service(store: InMemoryStore) -> AccountService<InMemoryStore> {
        AccountService::new(store, Arc::new(LogNotifier))
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("secret-password").unwrap();
        assert!(verify_password("secret-password", &hash));
        assert!(!verify_password("wrong-password", &hash));
        assert!(!verify_password("secret-password", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let service = service(InMemoryStore::new());

        let user = service.register(new_user("Achieng@Example.com")).await.unwrap();
        assert_eq!(user.email, "achieng@example.com");
        assert_eq!(user.role, Role::Customer);

        let found = service
            .authenticate("achieng@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_register_ignores_requested_role() {
        let service = service(InMemoryStore::new());
        let mut input = new_user("a@example.com");
        input.role = Some(Role::Admin);

        let user = service.register(input).await.unwrap();
        assert_eq!(user.role, Role::Customer);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let service = service(InMemoryStore::new());
        service.register(new_user("a@example.com")).await.unwrap();

        assert!(matches!(
            service.register(new_user("A@example.com")).await,
            Err(ServiceError::AlreadyExists(_))
        ));
        assert!(matches!(
            service.register(new_user("not-an-email")).await,
            Err(ServiceError::Validation(_))
        ));

        let mut short = new_user("b@example.com");
        short.password = "short".to_string();
        assert!(matches!(
            service.register(short).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_credentials_look_the_same() {
        let service = service(InMemoryStore::new());
        service.register(new_user("a@example.com")).await.unwrap();

        let wrong_password = service.authenticate("a@example.com", "nope-nope").await;
        let unknown = service.authenticate("b@example.com", "correct horse").await;

        match (wrong_password, unknown) {
            (Err(ServiceError::Unauthorized(a)), Err(ServiceError::Unauthorized(b))) => {
                assert_eq!(a, b)
            }
            other => panic!("unexpected results: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let notifier = Arc::new(CapturingNotifier::default());
        let service = AccountService::new(InMemoryStore::new(), notifier.clone());
        service.register(new_user("a@example.com")).await.unwrap();

        service.request_password_reset("unknown@example.com").await.unwrap();
        assert!(notifier.tokens.lock().unwrap().is_empty());

        service.request_password_reset("a@example.com").await.unwrap();
        let token = notifier.tokens.lock().unwrap()[0].1.clone();

        assert!(matches!(
            service.reset_password("wrong-token", "new password").await,
            Err(ServiceError::Validation(_))
        ));

        service.reset_password(&token, "new password").await.unwrap();
        service.authenticate("a@example.com", "new password").await.unwrap();

        // Tokens are single use.
        assert!(service.reset_password(&token, "another one").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_reset_token_is_rejected() {
        let store = InMemoryStore::new();
        let notifier = Arc::new(CapturingNotifier::default());
        let service = AccountService::new(store.clone(), notifier.clone());
        let user = service.register(new_user("a@example.com")).await.unwrap();

        service.request_password_reset("a@example.com").await.unwrap();
        let token = notifier.tokens.lock().unwrap()[0].1.clone();

        let mut stored = store.get_user(user.id).await.unwrap().unwrap();
        stored.reset_token_expires_at = Some(Utc::now() - Duration::minutes(1));
        store.update_user(&stored).await.unwrap();

        assert!(matches!(
            service.reset_password(&token, "new password").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_customers_only_edit_themselves() {
        let service = service(InMemoryStore::new());
        let a = service.register(new_user("a@example.com")).await.unwrap();
        let b = service.register(new_user("b@example.com")).await.unwrap();

        let patch = UserPatch {
            name: Some("Wafula".to_string()),
            ..UserPatch::default()
        };
        assert!(matches!(
            service.patch_user(b.id, Actor::customer(a.id), patch.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));

        let updated = service.patch_user(a.id, Actor::customer(a.id), patch).await.unwrap();
        assert_eq!(updated.name, "Wafula");

        let taken = UserUpdate {
            name: "Wafula".to_string(),
            email: "b@example.com".to_string(),
            password: None,
        };
        assert!(matches!(
            service.update_user(a.id, Actor::customer(a.id), taken).await,
            Err(ServiceError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_delete_guards() {
        let store = InMemoryStore::new();
        let service = service(store.clone());

        let mut admin_input = new_user("admin@example.com");
        admin_input.role = Some(Role::Admin);
        let admin = service.create_user(admin_input).await.unwrap();
        let buyer = service.register(new_user("buyer@example.com")).await.unwrap();
        let idle = service.register(new_user("idle@example.com")).await.unwrap();

        let product = seed_product(&store, 5, 100).await;
        OrderService::new(store.clone())
            .create_order(buyer.id, &[(product.id, 1)])
            .await
            .unwrap();

        assert!(matches!(
            service.admin_delete_user(admin.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.admin_delete_user(buyer.id).await,
            Err(ServiceError::HasDependents(_))
        ));
        service.admin_delete_user(idle.id).await.unwrap();
        assert!(matches!(
            service.admin_delete_user(idle.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(service.list_admins().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_change_role_and_dashboard() {
        let store = InMemoryStore::new();
        let service = service(store.clone());
        let user = service.register(new_user("a@example.com")).await.unwrap();

        let promoted = service.change_role(user.id, Role::Admin).await.unwrap();
        assert!(promoted.role.is_admin());

        let product = seed_product(&store, 20, 250).await;
        let orders = OrderService::new(store.clone());
        for _ in 0..6 {
            orders.create_order(user.id, &[(product.id, 1)]).await.unwrap();
        }

        let stats = service.dashboard().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_orders, 6);
        assert_eq!(stats.total_revenue, Money::zero());
        assert_eq!(stats.recent_orders.len(), 5);
    }
}
