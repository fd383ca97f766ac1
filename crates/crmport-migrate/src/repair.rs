//! Post-migration invariant repair: at least one administrator exists.

use crmport_store::document::now_millis;
use crmport_store::{Document, Filter, USERS};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CallError;
use crate::target::{BoundedStore, InsertPath};
use crate::users::ADMIN_ROLE;

/// Account created when no administrator exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultAdmin {
    /// Login email.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Initial plaintext password, hashed by the store. Without one the
    /// account is created locked until a password is set.
    pub password: Option<String>,
}

impl Default for DefaultAdmin {
    fn default() -> Self {
        Self {
            email: "admin@crmport.local".to_string(),
            name: "Administrator".to_string(),
            password: None,
        }
    }
}

/// Alternate addresses tried when the configured email is taken.
const MAX_EMAIL_ALTERNATES: u32 = 9;

/// What the repair step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminRepair {
    /// Administrators already existed.
    Present {
        /// How many.
        count: u64,
    },
    /// A default administrator was created.
    Created {
        /// The new account's id.
        id: String,
        /// The new account's email; differs from the configured one when
        /// that address belonged to a non-admin user.
        email: String,
    },
    /// No administrator exists and every candidate address was taken.
    Conflict {
        /// The configured email.
        email: String,
    },
    /// Not evaluated (dry run).
    NotRun,
}

/// Ensure at least one user has the admin role, creating one default
/// administrator if none does.
///
/// A non-admin user may already own the configured email. The account is
/// then created under `local+N@domain`, first free `N` wins.
pub async fn ensure_admin(
    store: &BoundedStore<'_>,
    admin: &DefaultAdmin,
) -> Result<AdminRepair, CallError> {
    let admins = store
        .count(USERS, &Filter::eq("role", ADMIN_ROLE))
        .await?;
    if admins > 0 {
        info!(admins, "administrator present");
        return Ok(AdminRepair::Present { count: admins });
    }

    let base = admin.email.trim().to_lowercase();
    for attempt in 0..=MAX_EMAIL_ALTERNATES {
        let email = candidate_email(&base, attempt);
        if store
            .find_one(USERS, &Filter::eq("email", email.as_str()))
            .await?
            .is_some()
        {
            debug!(email = %email, "administrator email taken");
            continue;
        }

        let id = match store
            .insert(InsertPath::Validated, USERS, admin_document(admin, &email))
            .await
        {
            Ok(id) => id,
            Err(e) if e.is_unique_violation() => continue,
            Err(e) => return Err(e),
        };

        if email != base {
            warn!(
                configured = %base,
                email = %email,
                "configured administrator email belongs to another user; used an alternate"
            );
        }
        if admin.password.is_none() {
            warn!(
                email = %email,
                "default administrator created without a password; set one before first login"
            );
        } else {
            info!(email = %email, "default administrator created");
        }
        return Ok(AdminRepair::Created { id, email });
    }

    warn!(
        email = %base,
        alternates = MAX_EMAIL_ALTERNATES,
        "no free administrator email; no administrator exists"
    );
    Ok(AdminRepair::Conflict { email: base })
}

/// `admin@x` with attempt 2 -> `admin+2@x`.
fn candidate_email(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_string();
    }
    match base.split_once('@') {
        Some((local, domain)) => format!("{}+{}@{}", local, attempt, domain),
        None => format!("{}+{}", base, attempt),
    }
}

fn admin_document(admin: &DefaultAdmin, email: &str) -> Document {
    let now = now_millis();
    let mut doc = Document::new();
    doc.insert("email".into(), Value::from(email));
    doc.insert("name".into(), Value::from(admin.name.as_str()));
    doc.insert("role".into(), Value::from(ADMIN_ROLE));
    doc.insert("isActive".into(), Value::Bool(true));
    doc.insert("isVerified".into(), Value::Bool(true));
    doc.insert("lastLogin".into(), Value::Null);
    doc.insert("createdAt".into(), Value::from(now));
    doc.insert("updatedAt".into(), Value::from(now));
    doc.insert(
        "mustResetPassword".into(),
        Value::Bool(admin.password.is_none()),
    );
    if let Some(password) = &admin.password {
        doc.insert("password".into(), Value::from(password.as_str()));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmport_store::{verify_secret, SledStore, StoreConfig, TargetStore};
    use serde_json::json;
    use std::time::Duration;

    fn user(role: &str, email: &str) -> Document {
        json!({"email": email, "name": "U", "role": role})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_creates_one_admin_when_none() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        store.trusted_insert(USERS, user("agent", "a@x.com")).await.unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));
        let admin = DefaultAdmin {
            password: Some("changeme".into()),
            ..DefaultAdmin::default()
        };

        let repair = ensure_admin(&bounded, &admin).await.unwrap();
        assert!(matches!(repair, AdminRepair::Created { .. }));

        let admins = store
            .find(USERS, &Filter::eq("role", ADMIN_ROLE))
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
        let stored = admins[0]["password"].as_str().unwrap();
        assert!(verify_secret("changeme", stored));

        // A second pass finds the admin and creates nothing.
        let repair = ensure_admin(&bounded, &admin).await.unwrap();
        assert_eq!(repair, AdminRepair::Present { count: 1 });
        assert_eq!(store.count(USERS, &Filter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_existing_admin_is_kept() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        store.trusted_insert(USERS, user("admin", "boss@x.com")).await.unwrap();
        store.trusted_insert(USERS, user("admin", "boss2@x.com")).await.unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));

        let repair = ensure_admin(&bounded, &DefaultAdmin::default()).await.unwrap();
        assert_eq!(repair, AdminRepair::Present { count: 2 });
        assert_eq!(store.count(USERS, &Filter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_admin_without_password_must_reset() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));
        ensure_admin(&bounded, &DefaultAdmin::default()).await.unwrap();

        let admin = store
            .find_one(USERS, &Filter::eq("role", ADMIN_ROLE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin["mustResetPassword"], true);
        assert!(admin.get("password").is_none());
    }

    #[test]
    fn test_candidate_email() {
        assert_eq!(candidate_email("admin@x.com", 0), "admin@x.com");
        assert_eq!(candidate_email("admin@x.com", 2), "admin+2@x.com");
        assert_eq!(candidate_email("admin", 1), "admin+1");
    }

    #[tokio::test]
    async fn test_taken_email_uses_alternate() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        store
            .trusted_insert(USERS, user("agent", "admin@crmport.local"))
            .await
            .unwrap();
        store
            .trusted_insert(USERS, user("agent", "admin+1@crmport.local"))
            .await
            .unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));

        let repair = ensure_admin(&bounded, &DefaultAdmin::default()).await.unwrap();
        match repair {
            AdminRepair::Created { email, .. } => assert_eq!(email, "admin+2@crmport.local"),
            other => panic!("unexpected repair: {:?}", other),
        }
        let admins = store
            .count(USERS, &Filter::eq("role", ADMIN_ROLE))
            .await
            .unwrap();
        assert_eq!(admins, 1);

        // The existing owner is untouched.
        let owner = store
            .find_one(USERS, &Filter::eq("email", "admin@crmport.local"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner["role"], "agent");
    }

    #[tokio::test]
    async fn test_all_candidates_taken_reports_conflict() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        for attempt in 0..=MAX_EMAIL_ALTERNATES {
            let email = candidate_email("admin@crmport.local", attempt);
            store.trusted_insert(USERS, user("agent", &email)).await.unwrap();
        }
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));

        let repair = ensure_admin(&bounded, &DefaultAdmin::default()).await.unwrap();
        assert_eq!(
            repair,
            AdminRepair::Conflict {
                email: "admin@crmport.local".to_string()
            }
        );
        assert_eq!(
            store.count(USERS, &Filter::All).await.unwrap(),
            u64::from(MAX_EMAIL_ALTERNATES) + 1
        );
    }
}
